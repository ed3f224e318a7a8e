use crate::annotate::{annotate, Overlay};
use crate::calibration::{raw_score, MonotoneCurve};
use crate::engine::{Detector, LineLocator, PlateReader};
use crate::error::{EngineError, ScoreError};
use crate::selection::{select_vehicle, PlateMatch};
use crate::types::{ScoringResult, Snapshot, SpotBounds, VehicleOutcome};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::task::JoinError;
use uuid::Uuid;

/// Rates how well the vehicle in an image is parked. One instance is
/// shared by every request; the engines it holds are only read.
pub struct Scorer {
    detector: Arc<dyn Detector>,
    plate_reader: Arc<dyn PlateReader>,
    locator: Box<dyn LineLocator>,
    curve: MonotoneCurve,
    plate_match: PlateMatch,
}

impl Scorer {
    pub fn new(
        detector: Arc<dyn Detector>,
        plate_reader: Arc<dyn PlateReader>,
        locator: Box<dyn LineLocator>,
    ) -> Self {
        Scorer {
            detector,
            plate_reader,
            locator,
            curve: MonotoneCurve::alignment(),
            plate_match: PlateMatch::Independent,
        }
    }

    pub fn with_plate_match(mut self, plate_match: PlateMatch) -> Self {
        self.plate_match = plate_match;
        self
    }

    pub fn decode(bytes: Vec<u8>) -> Result<Snapshot, ScoreError> {
        let image = image::load_from_memory(&bytes).map_err(ScoreError::UndecodableImage)?;
        Ok(Snapshot {
            image,
            encoded: bytes,
        })
    }

    /// Decodes an upload, finds the spot lines and scores it. The decoded
    /// upload is handed back alongside the result.
    pub async fn score_upload(
        &self,
        bytes: Vec<u8>,
    ) -> Result<(Arc<Snapshot>, ScoringResult), ScoreError> {
        let snapshot = Arc::new(Scorer::decode(bytes)?);
        let bounds = self.locator.locate_lines(&snapshot)?;
        debug!(
            "Spot lines at x={} and x={}",
            bounds.x_left(),
            bounds.x_right()
        );
        let result = self.score(Arc::clone(&snapshot), bounds).await;
        Ok((snapshot, result))
    }

    /// Scores an already decoded image against known spot lines. Engine
    /// failures only blank out their own half of the result.
    pub async fn score(&self, snapshot: Arc<Snapshot>, bounds: SpotBounds) -> ScoringResult {
        let run = Uuid::new_v4().to_simple().to_string();
        info!("[{}] Scoring image", run);

        let detect_task = {
            let detector = Arc::clone(&self.detector);
            let snapshot = Arc::clone(&snapshot);
            tokio::spawn(async move { detector.detect(&snapshot).await })
        };
        let recognize_task = {
            let plate_reader = Arc::clone(&self.plate_reader);
            let snapshot = Arc::clone(&snapshot);
            tokio::spawn(async move { plate_reader.recognize(&snapshot).await })
        };
        let (detections, plates) = tokio::join!(detect_task, recognize_task);
        let detections = settle(&run, "detector", detections);
        let plates = settle(&run, "plate reader", plates);

        let vehicle = select_vehicle(&detections, &bounds).cloned();
        let outcome = match &vehicle {
            Some(detection) => {
                let raw = raw_score(detection.center_x, &bounds);
                let score = self.curve.evaluate(raw);
                info!(
                    "[{}] Vehicle '{}' at x={}: raw {:.3}, calibrated {:.3}",
                    run, detection.class_label, detection.center_x, raw, score
                );
                VehicleOutcome::Found {
                    score,
                    raw,
                    detection: detection.clone(),
                }
            }
            None => {
                info!("[{}] No vehicle detected", run);
                VehicleOutcome::NoVehicleDetected
            }
        };

        let plate = self
            .plate_match
            .select(&plates, &detections, vehicle.as_ref(), &bounds)
            .cloned();
        match &plate {
            Some(p) => info!("[{}] Plate {}", run, p.text),
            None => info!("[{}] No plate recognized", run),
        }

        let plate_text = plate.as_ref().map(|p| p.text.clone());
        let annotated = tokio::task::spawn_blocking(move || {
            let overlay = Overlay {
                bounds: &bounds,
                detections: &detections,
                vehicle: vehicle.as_ref(),
                plate: plate.as_ref(),
            };
            annotate(&snapshot.image, &overlay)
        })
        .await;
        let annotated_image = match annotated {
            Ok(Ok(jpeg)) => Some(jpeg),
            Ok(Err(e)) => {
                warn!("[{}] Unable to encode annotated image: {}", run, e);
                None
            }
            Err(e) => {
                warn!("[{}] Annotation task failed: {}", run, e);
                None
            }
        };

        ScoringResult {
            bounds,
            vehicle: outcome,
            plate_text,
            annotated_image,
        }
    }
}

/// Collapses a branch's failure into an empty list after logging it.
fn settle<T>(
    run: &str,
    branch: &str,
    joined: Result<Result<Vec<T>, EngineError>, JoinError>,
) -> Vec<T> {
    match joined {
        Ok(Ok(items)) => {
            debug!("[{}] {} returned {} candidates", run, branch, items.len());
            items
        }
        Ok(Err(e)) => {
            error!("[{}] {} failed: {}", run, branch, e);
            vec![]
        }
        Err(e) => {
            error!("[{}] {} task did not complete: {}", run, branch, e);
            vec![]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FractionalLineLocator;
    use crate::types::{Detection, PlateCandidate, NO_VEHICLE_SCORE};
    use futures::future::{self, BoxFuture, FutureExt};
    use image::{DynamicImage, ImageOutputFormat, RgbImage};
    use serde_json::Map;
    use std::time::Duration;
    use tokio::sync::Barrier;

    struct CannedDetector(Vec<Detection>);

    impl Detector for CannedDetector {
        fn detect<'a>(
            &'a self,
            _snapshot: &'a Snapshot,
        ) -> BoxFuture<'a, Result<Vec<Detection>, EngineError>> {
            future::ready(Ok(self.0.clone())).boxed()
        }
    }

    struct CannedReader(Vec<PlateCandidate>);

    impl PlateReader for CannedReader {
        fn recognize<'a>(
            &'a self,
            _snapshot: &'a Snapshot,
        ) -> BoxFuture<'a, Result<Vec<PlateCandidate>, EngineError>> {
            future::ready(Ok(self.0.clone())).boxed()
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn detect<'a>(
            &'a self,
            _snapshot: &'a Snapshot,
        ) -> BoxFuture<'a, Result<Vec<Detection>, EngineError>> {
            future::ready(Err(EngineError::Status(503))).boxed()
        }
    }

    struct PanickingReader;

    async fn explode() -> Result<Vec<PlateCandidate>, EngineError> {
        panic!("model weights missing")
    }

    impl PlateReader for PanickingReader {
        fn recognize<'a>(
            &'a self,
            _snapshot: &'a Snapshot,
        ) -> BoxFuture<'a, Result<Vec<PlateCandidate>, EngineError>> {
            explode().boxed()
        }
    }

    /// Both halves wait on a shared barrier, so a scorer that ran them
    /// one after the other would never finish. Run on the threaded
    /// scheduler they can also run in parallel on separate workers.
    struct RendezvousDetector(Arc<Barrier>);

    impl Detector for RendezvousDetector {
        fn detect<'a>(
            &'a self,
            _snapshot: &'a Snapshot,
        ) -> BoxFuture<'a, Result<Vec<Detection>, EngineError>> {
            async move {
                self.0.wait().await;
                Ok(vec![car(200.0)])
            }
            .boxed()
        }
    }

    struct RendezvousReader(Arc<Barrier>);

    impl PlateReader for RendezvousReader {
        fn recognize<'a>(
            &'a self,
            _snapshot: &'a Snapshot,
        ) -> BoxFuture<'a, Result<Vec<PlateCandidate>, EngineError>> {
            async move {
                self.0.wait().await;
                Ok(vec![plate("SYNC1", 190.0, 210.0)])
            }
            .boxed()
        }
    }

    fn car(center_x: f64) -> Detection {
        Detection {
            center_x,
            center_y: 60.0,
            width: 120.0,
            height: 80.0,
            confidence: 0.9,
            class_label: "car".to_string(),
            attributes: Map::new(),
        }
    }

    fn plate(text: &str, x_min: f64, x_max: f64) -> PlateCandidate {
        PlateCandidate {
            text: text.to_string(),
            bounding_box: (x_min, 70.0, x_max, 80.0),
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut bytes, ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    fn snapshot() -> Arc<Snapshot> {
        Arc::new(Scorer::decode(png(400, 120)).unwrap())
    }

    fn scorer(detector: Arc<dyn Detector>, reader: Arc<dyn PlateReader>) -> Scorer {
        Scorer::new(detector, reader, Box::new(FractionalLineLocator::default()))
    }

    fn spot() -> SpotBounds {
        SpotBounds::new(100.0, 300.0).unwrap()
    }

    #[tokio::test]
    async fn scores_vehicle_nearest_centre() {
        let scorer = scorer(
            Arc::new(CannedDetector(vec![car(150.0), car(205.0)])),
            Arc::new(CannedReader(vec![plate("AB123", 180.0, 220.0)])),
        );
        let result = scorer.score(snapshot(), spot()).await;
        match &result.vehicle {
            VehicleOutcome::Found {
                score,
                raw,
                detection,
            } => {
                assert_eq!(detection.center_x, 205.0);
                assert!((raw - 9.5).abs() < 1e-12);
                assert!((score - 9.130723808210838).abs() < 1e-9);
            }
            other => panic!("expected a vehicle, got {:?}", other),
        }
        assert_eq!(result.plate_text.as_deref(), Some("AB123"));
        assert!(result.annotated_image.is_some());
    }

    #[tokio::test]
    async fn vehicle_and_plate_absence_are_independent() {
        let cases = vec![(true, true), (true, false), (false, true), (false, false)];
        for (with_vehicle, with_plate) in cases {
            let detections = if with_vehicle { vec![car(200.0)] } else { vec![] };
            let plates = if with_plate {
                vec![plate("ZZ9", 190.0, 210.0)]
            } else {
                vec![]
            };
            let scorer = scorer(
                Arc::new(CannedDetector(detections)),
                Arc::new(CannedReader(plates)),
            );
            let result = scorer.score(snapshot(), spot()).await;
            assert_eq!(result.vehicle_found(), with_vehicle);
            assert_eq!(result.plate_text.is_some(), with_plate);
            if with_vehicle {
                assert_eq!(result.score_value(), 10.0);
            } else {
                assert_eq!(result.vehicle, VehicleOutcome::NoVehicleDetected);
                assert_eq!(result.score_value(), NO_VEHICLE_SCORE);
            }
        }
    }

    #[tokio::test]
    async fn failing_detector_keeps_plate_result() {
        let scorer = scorer(
            Arc::new(FailingDetector),
            Arc::new(CannedReader(vec![plate("KEEP1", 190.0, 210.0)])),
        );
        let result = scorer.score(snapshot(), spot()).await;
        assert_eq!(result.vehicle, VehicleOutcome::NoVehicleDetected);
        assert_eq!(result.plate_text.as_deref(), Some("KEEP1"));
    }

    #[tokio::test]
    async fn panicking_reader_keeps_score() {
        let scorer = scorer(
            Arc::new(CannedDetector(vec![car(200.0)])),
            Arc::new(PanickingReader),
        );
        let result = scorer.score(snapshot(), spot()).await;
        assert!(result.vehicle_found());
        assert!(result.plate_text.is_none());
    }

    #[tokio::test(threaded_scheduler)]
    async fn detection_and_recognition_run_concurrently() {
        let barrier = Arc::new(Barrier::new(2));
        let scorer = scorer(
            Arc::new(RendezvousDetector(Arc::clone(&barrier))),
            Arc::new(RendezvousReader(barrier)),
        );
        let run = scorer.score(snapshot(), spot());
        let result = tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("branches were not run concurrently");
        assert!(result.vehicle_found());
        assert_eq!(result.plate_text.as_deref(), Some("SYNC1"));
    }

    #[tokio::test]
    async fn upload_uses_fractional_lines() {
        // 400 px wide: lines at 60 and 340, centre at 200.
        let scorer = scorer(
            Arc::new(CannedDetector(vec![car(200.0)])),
            Arc::new(CannedReader(vec![])),
        );
        let (snapshot, result) = scorer.score_upload(png(400, 120)).await.unwrap();
        assert_eq!(snapshot.encoded, png(400, 120));
        assert_eq!(result.bounds.x_left(), 60.0);
        assert_eq!(result.bounds.x_right(), 340.0);
        assert_eq!(result.score_value(), 10.0);
    }

    #[tokio::test]
    async fn undecodable_upload_is_fatal() {
        let scorer = scorer(
            Arc::new(CannedDetector(vec![car(200.0)])),
            Arc::new(CannedReader(vec![])),
        );
        match scorer.score_upload(b"definitely not an image".to_vec()).await {
            Err(ScoreError::UndecodableImage(_)) => {}
            other => panic!("expected decode failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn contained_mode_reads_the_chosen_vehicles_plate() {
        // Chosen vehicle spans x 210..330; the plate nearest the centre is
        // outside it.
        let scorer = scorer(
            Arc::new(CannedDetector(vec![car(270.0)])),
            Arc::new(CannedReader(vec![
                plate("CENTRE", 190.0, 210.0),
                plate("OWN", 250.0, 270.0),
            ])),
        )
        .with_plate_match(PlateMatch::Contained);
        let result = scorer.score(snapshot(), spot()).await;
        assert_eq!(result.plate_text.as_deref(), Some("OWN"));
    }

    #[tokio::test]
    async fn contained_mode_leaves_a_neighbours_plate_alone() {
        let scorer = scorer(
            Arc::new(CannedDetector(vec![car(200.0), car(270.0)])),
            Arc::new(CannedReader(vec![plate("NEIGHBOUR", 260.0, 280.0)])),
        )
        .with_plate_match(PlateMatch::Contained);
        let result = scorer.score(snapshot(), spot()).await;
        assert_eq!(result.score_value(), 10.0);
        assert_eq!(result.plate_text, None);
    }
}
