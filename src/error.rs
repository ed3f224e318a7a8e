/// Errors that end a scoring run without a result.
#[derive(Debug, Fail)]
pub enum ScoreError {
    #[fail(display = "undecodable image: {}", _0)]
    UndecodableImage(#[cause] image::ImageError),
    #[fail(display = "invalid spot bounds: left {} is not left of right {}", left, right)]
    InvalidBounds { left: f64, right: f64 },
}

/// Errors raised by a detector or plate reader. The scorer never lets
/// these escape a run; they degrade to "nothing found" for that branch.
#[derive(Debug, Fail)]
pub enum EngineError {
    #[fail(display = "engine request failed: {}", _0)]
    Request(#[cause] reqwest::Error),
    #[fail(display = "engine returned status {}", _0)]
    Status(u16),
    #[fail(display = "malformed engine response: {}", _0)]
    Malformed(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Request(e)
    }
}

#[derive(Debug, Fail)]
pub enum ConfigError {
    #[fail(display = "invalid value '{}' for {}", value, key)]
    Invalid { key: &'static str, value: String },
}
