use crate::error::ConfigError;
use crate::selection::PlateMatch;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_port: u16,
    pub db_path: PathBuf,
    pub detector_url: Option<Url>,
    pub plate_reader_url: Option<Url>,
    pub engine_token: Option<String>,
    pub plate_match: PlateMatch,
    pub max_upload_bytes: u64,
    pub left_line_fraction: f64,
    pub right_line_fraction: f64,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let left_line_fraction = parse_or(&lookup, "LEFT_LINE_FRACTION", 0.15)?;
        let right_line_fraction = parse_or(&lookup, "RIGHT_LINE_FRACTION", 0.85)?;
        if !(0.0 <= left_line_fraction
            && left_line_fraction < right_line_fraction
            && right_line_fraction <= 1.0)
        {
            return Err(ConfigError::Invalid {
                key: "LEFT_LINE_FRACTION/RIGHT_LINE_FRACTION",
                value: format!("{}/{}", left_line_fraction, right_line_fraction),
            });
        }

        let plate_match = match lookup("PLATE_MATCH").as_deref() {
            None | Some("independent") => PlateMatch::Independent,
            Some("contained") => PlateMatch::Contained,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "PLATE_MATCH",
                    value: other.to_string(),
                })
            }
        };

        Ok(Config {
            listen_port: parse_or(&lookup, "LISTEN_PORT", 8402)?,
            db_path: lookup("DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/data/posts.db")),
            detector_url: parse_url(&lookup, "DETECTOR_URL")?,
            plate_reader_url: parse_url(&lookup, "PLATE_READER_URL")?,
            engine_token: lookup("ENGINE_TOKEN").filter(|t| !t.is_empty()),
            plate_match,
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 20 * 1024 * 1024)?,
            left_line_fraction,
            right_line_fraction,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

fn parse_url<F>(lookup: &F, key: &'static str) -> Result<Option<Url>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.is_empty() => Ok(None),
        Some(value) => match Url::parse(&value) {
            Ok(url) => Ok(Some(url)),
            Err(_) => Err(ConfigError::Invalid { key, value }),
        },
    }
}
