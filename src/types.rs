use crate::error::ScoreError;
use image::DynamicImage;
use serde_json::{Map, Value};

/// One detector output: a candidate vehicle box in centre/size form.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
    pub class_label: String,
    pub attributes: Map<String, Value>,
}

impl Detection {
    /// Box corners as (x_min, y_min, x_max, y_max).
    pub fn corners(&self) -> (f64, f64, f64, f64) {
        (
            self.center_x - self.width / 2.0,
            self.center_y - self.height / 2.0,
            self.center_x + self.width / 2.0,
            self.center_y + self.height / 2.0,
        )
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (x_min, y_min, x_max, y_max) = self.corners();
        x >= x_min && x <= x_max && y >= y_min && y <= y_max
    }
}

/// One plate engine output. The box is (x_min, y_min, x_max, y_max).
#[derive(Debug, Clone, PartialEq)]
pub struct PlateCandidate {
    pub text: String,
    pub bounding_box: (f64, f64, f64, f64),
}

impl PlateCandidate {
    pub fn center_x(&self) -> f64 {
        (self.bounding_box.0 + self.bounding_box.2) / 2.0
    }

    pub fn center_y(&self) -> f64 {
        (self.bounding_box.1 + self.bounding_box.3) / 2.0
    }
}

/// Pixel x-coordinates of the two lines delimiting a parking spot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotBounds {
    x_left: f64,
    x_right: f64,
}

impl SpotBounds {
    pub fn new(x_left: f64, x_right: f64) -> Result<Self, ScoreError> {
        if !(x_left.is_finite() && x_right.is_finite() && x_left < x_right) {
            return Err(ScoreError::InvalidBounds {
                left: x_left,
                right: x_right,
            });
        }
        Ok(SpotBounds { x_left, x_right })
    }

    pub fn x_left(&self) -> f64 {
        self.x_left
    }

    pub fn x_right(&self) -> f64 {
        self.x_right
    }

    pub fn midpoint(&self) -> f64 {
        self.x_left + (self.x_right - self.x_left) / 2.0
    }

    pub fn half_width(&self) -> f64 {
        (self.x_right - self.x_left) / 2.0
    }
}

/// A decoded upload. Both scoring branches read it; nothing mutates it.
#[derive(Debug)]
pub struct Snapshot {
    pub image: DynamicImage,
    pub encoded: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VehicleOutcome {
    Found {
        score: f64,
        raw: f64,
        detection: Detection,
    },
    NoVehicleDetected,
}

/// Value reported in place of a score when no vehicle was found.
pub const NO_VEHICLE_SCORE: f64 = -1.0;

#[derive(Debug)]
pub struct ScoringResult {
    pub bounds: SpotBounds,
    pub vehicle: VehicleOutcome,
    pub plate_text: Option<String>,
    pub annotated_image: Option<Vec<u8>>,
}

impl ScoringResult {
    pub fn vehicle_found(&self) -> bool {
        matches!(self.vehicle, VehicleOutcome::Found { .. })
    }

    /// Calibrated score, or `NO_VEHICLE_SCORE` when there was no vehicle.
    pub fn score_value(&self) -> f64 {
        match self.vehicle {
            VehicleOutcome::Found { score, .. } => score,
            VehicleOutcome::NoVehicleDetected => NO_VEHICLE_SCORE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_reject_inverted_or_empty_spots() {
        assert!(SpotBounds::new(300.0, 100.0).is_err());
        assert!(SpotBounds::new(100.0, 100.0).is_err());
        assert!(SpotBounds::new(f64::NAN, 100.0).is_err());
        let bounds = SpotBounds::new(100.0, 300.0).unwrap();
        assert_eq!(bounds.midpoint(), 200.0);
        assert_eq!(bounds.half_width(), 100.0);
    }

    #[test]
    fn detection_contains_points_inside_its_box() {
        let detection = Detection {
            center_x: 50.0,
            center_y: 40.0,
            width: 20.0,
            height: 10.0,
            confidence: 0.9,
            class_label: "car".to_string(),
            attributes: Map::new(),
        };
        assert!(detection.contains(45.0, 42.0));
        assert!(detection.contains(60.0, 45.0));
        assert!(!detection.contains(61.0, 40.0));
        assert!(!detection.contains(50.0, 30.0));
    }

    #[test]
    fn plate_center_is_box_midpoint() {
        let plate = PlateCandidate {
            text: "AB123".to_string(),
            bounding_box: (10.0, 20.0, 30.0, 60.0),
        };
        assert_eq!(plate.center_x(), 20.0);
        assert_eq!(plate.center_y(), 40.0);
    }
}
