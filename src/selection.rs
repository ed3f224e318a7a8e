use crate::types::{Detection, PlateCandidate, SpotBounds};

/// Anything with a horizontal position that can be compared against the
/// middle of a parking spot.
pub trait Centered {
    fn center_x(&self) -> f64;
}

impl Centered for Detection {
    fn center_x(&self) -> f64 {
        self.center_x
    }
}

impl Centered for PlateCandidate {
    fn center_x(&self) -> f64 {
        PlateCandidate::center_x(self)
    }
}

impl<T: Centered> Centered for &T {
    fn center_x(&self) -> f64 {
        (*self).center_x()
    }
}

/// How a plate is matched to the spot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlateMatch {
    /// Nearest plate to the spot centre, regardless of the chosen vehicle.
    Independent,
    /// Only plates inside the chosen vehicle's box. Falls back to
    /// `Independent` when no plate lies inside any detection box.
    Contained,
}

/// Item whose centre is nearest the middle of the spot. Ties go to the
/// earliest item; items with a non-finite centre are never chosen.
pub fn nearest_to_center<'a, T: Centered>(
    items: &'a [T],
    bounds: &SpotBounds,
) -> Option<&'a T> {
    let x_m = bounds.midpoint();
    let mut best: Option<(f64, &T)> = None;
    for item in items {
        let distance = (item.center_x() - x_m).abs();
        if !distance.is_finite() {
            continue;
        }
        match best {
            Some((d, _)) if distance >= d => {}
            _ => best = Some((distance, item)),
        }
    }
    best.map(|(_, item)| item)
}

pub fn select_vehicle<'a>(
    detections: &'a [Detection],
    bounds: &SpotBounds,
) -> Option<&'a Detection> {
    nearest_to_center(detections, bounds)
}

pub fn select_plate<'a>(
    plates: &'a [PlateCandidate],
    bounds: &SpotBounds,
) -> Option<&'a PlateCandidate> {
    nearest_to_center(plates, bounds)
}

fn is_inside(plate: &PlateCandidate, detection: &Detection) -> bool {
    detection.contains(plate.center_x(), plate.center_y())
}

/// Plate belonging to the chosen vehicle. A plate inside some other
/// detection's box is never returned; with no plate inside any box the
/// nearest plate to the spot centre is used.
pub fn select_plate_within<'a>(
    plates: &'a [PlateCandidate],
    detections: &[Detection],
    vehicle: Option<&Detection>,
    bounds: &SpotBounds,
) -> Option<&'a PlateCandidate> {
    if let Some(vehicle) = vehicle {
        let inside: Vec<&PlateCandidate> =
            plates.iter().filter(|p| is_inside(p, vehicle)).collect();
        if let Some(chosen) = nearest_to_center(&inside, bounds) {
            return Some(*chosen);
        }
    }
    let claimed = plates
        .iter()
        .any(|p| detections.iter().any(|d| is_inside(p, d)));
    if claimed {
        return None;
    }
    select_plate(plates, bounds)
}

impl PlateMatch {
    pub fn select<'a>(
        self,
        plates: &'a [PlateCandidate],
        detections: &[Detection],
        vehicle: Option<&Detection>,
        bounds: &SpotBounds,
    ) -> Option<&'a PlateCandidate> {
        match self {
            PlateMatch::Independent => select_plate(plates, bounds),
            PlateMatch::Contained => select_plate_within(plates, detections, vehicle, bounds),
        }
    }
}
