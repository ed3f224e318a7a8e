use crate::error::{EngineError, ScoreError};
use crate::types::{Detection, PlateCandidate, Snapshot, SpotBounds};
use futures::future::{self, BoxFuture, FutureExt};
use image::GenericImageView;

/// Vehicle detector. Must return an empty list, not an error, when the
/// image simply contains no vehicles.
pub trait Detector: Send + Sync {
    fn detect<'a>(
        &'a self,
        snapshot: &'a Snapshot,
    ) -> BoxFuture<'a, Result<Vec<Detection>, EngineError>>;
}

/// License plate reader, with the same empty-versus-error contract as
/// `Detector`.
pub trait PlateReader: Send + Sync {
    fn recognize<'a>(
        &'a self,
        snapshot: &'a Snapshot,
    ) -> BoxFuture<'a, Result<Vec<PlateCandidate>, EngineError>>;
}

/// Finds the two lines of the parking spot in an image.
pub trait LineLocator: Send + Sync {
    fn locate_lines(&self, snapshot: &Snapshot) -> Result<SpotBounds, ScoreError>;
}

/// Places the lines at fixed fractions of the image width.
#[derive(Debug, Clone, Copy)]
pub struct FractionalLineLocator {
    pub left: f64,
    pub right: f64,
}

impl Default for FractionalLineLocator {
    fn default() -> Self {
        FractionalLineLocator {
            left: 0.15,
            right: 0.85,
        }
    }
}

impl LineLocator for FractionalLineLocator {
    fn locate_lines(&self, snapshot: &Snapshot) -> Result<SpotBounds, ScoreError> {
        let width = f64::from(snapshot.image.width());
        SpotBounds::new((width * self.left).floor(), (width * self.right).floor())
    }
}

/// Stand-in when no detector is configured; never finds a vehicle.
pub struct NoDetector;

impl Detector for NoDetector {
    fn detect<'a>(
        &'a self,
        _snapshot: &'a Snapshot,
    ) -> BoxFuture<'a, Result<Vec<Detection>, EngineError>> {
        future::ready(Ok(vec![])).boxed()
    }
}

/// Stand-in when no plate reader is configured; never reads a plate.
pub struct NoPlateReader;

impl PlateReader for NoPlateReader {
    fn recognize<'a>(
        &'a self,
        _snapshot: &'a Snapshot,
    ) -> BoxFuture<'a, Result<Vec<PlateCandidate>, EngineError>> {
        future::ready(Ok(vec![])).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn blank(width: u32) -> Snapshot {
        Snapshot {
            image: DynamicImage::ImageRgb8(RgbImage::new(width, 10)),
            encoded: vec![],
        }
    }

    #[test]
    fn fractional_lines_truncate_to_whole_pixels() {
        let bounds = FractionalLineLocator::default()
            .locate_lines(&blank(1001))
            .unwrap();
        assert_eq!(bounds.x_left(), 150.0);
        assert_eq!(bounds.x_right(), 850.0);
    }

    #[test]
    fn fractional_lines_fail_on_degenerate_width() {
        assert!(FractionalLineLocator::default()
            .locate_lines(&blank(1))
            .is_err());
    }

    #[tokio::test]
    async fn null_engines_find_nothing() {
        let snapshot = blank(100);
        assert!(NoDetector.detect(&snapshot).await.unwrap().is_empty());
        assert!(NoPlateReader.recognize(&snapshot).await.unwrap().is_empty());
    }
}
