mod annotate;
mod api;
mod calibration;
mod config;
mod db;
mod engine;
mod error;
mod remote;
mod scorer;
mod selection;
mod types;

use crate::api::AppState;
use crate::config::Config;
use crate::engine::{Detector, FractionalLineLocator, NoDetector, NoPlateReader, PlateReader};
use crate::remote::{RemoteDetector, RemotePlateReader};
use crate::scorer::Scorer;
use env_logger::Env;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

#[macro_use]
extern crate failure;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("Starting park-rater");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };
    let conn = db::open(&config.db_path).expect("Unable to open db");

    let detector: Arc<dyn Detector> = match &config.detector_url {
        Some(url) => {
            info!("Using detector at {}", url);
            Arc::new(RemoteDetector::new(url.clone(), config.engine_token.clone()))
        }
        None => {
            warn!("DETECTOR_URL unset; no vehicles will be detected");
            Arc::new(NoDetector)
        }
    };
    let plate_reader: Arc<dyn PlateReader> = match &config.plate_reader_url {
        Some(url) => {
            info!("Using plate reader at {}", url);
            Arc::new(RemotePlateReader::new(url.clone(), config.engine_token.clone()))
        }
        None => {
            warn!("PLATE_READER_URL unset; no plates will be read");
            Arc::new(NoPlateReader)
        }
    };
    let locator = FractionalLineLocator {
        left: config.left_line_fraction,
        right: config.right_line_fraction,
    };
    let scorer = Scorer::new(detector, plate_reader, Box::new(locator))
        .with_plate_match(config.plate_match);

    let state = Arc::new(AppState {
        scorer,
        db: Mutex::new(conn),
        max_upload_bytes: config.max_upload_bytes,
    });
    api::run(state, config.listen_port).await;
    info!("Exiting main");
}
