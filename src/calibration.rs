use crate::types::SpotBounds;
use log::debug;

/// Knots of the alignment curve. Raw scores in 8..10 are spread over a
/// wider calibrated range than the rest of the domain.
const ALIGNMENT_KNOTS: [(f64, f64); 4] = [(0.0, 0.0), (8.0, 4.14), (9.81, 9.81), (10.0, 10.0)];

/// Shape-preserving piecewise cubic Hermite interpolant (PCHIP).
///
/// Slopes at interior knots are the weighted harmonic mean of the
/// neighbouring secants, or zero where the data changes direction, so
/// the curve never overshoots its knots. End slopes use the one-sided
/// three-point estimate, limited to keep the same shape guarantee.
#[derive(Debug, Clone)]
pub struct MonotoneCurve {
    xs: Vec<f64>,
    ys: Vec<f64>,
    slopes: Vec<f64>,
}

impl MonotoneCurve {
    /// Returns `None` unless there are at least two knots with strictly
    /// increasing, finite x values.
    pub fn new(knots: &[(f64, f64)]) -> Option<Self> {
        if knots.len() < 2 {
            return None;
        }
        if knots.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return None;
        }
        if knots.windows(2).any(|w| w[1].0 <= w[0].0) {
            return None;
        }
        Some(MonotoneCurve::from_checked(knots))
    }

    /// The fixed curve applied to raw alignment scores.
    pub fn alignment() -> Self {
        MonotoneCurve::from_checked(&ALIGNMENT_KNOTS)
    }

    fn from_checked(knots: &[(f64, f64)]) -> Self {
        let xs: Vec<f64> = knots.iter().map(|k| k.0).collect();
        let ys: Vec<f64> = knots.iter().map(|k| k.1).collect();
        let slopes = pchip_slopes(&xs, &ys);
        MonotoneCurve { xs, ys, slopes }
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    /// Evaluates the curve. Inputs outside the knot range are clamped to
    /// the nearest end knot instead of extrapolating the end cubic.
    pub fn evaluate(&self, x: f64) -> f64 {
        let (lo, hi) = self.domain();
        let x = if x < lo {
            debug!("Clamping {} up to curve domain start {}", x, lo);
            lo
        } else if x > hi {
            debug!("Clamping {} down to curve domain end {}", x, hi);
            hi
        } else {
            x
        };

        // Last interval whose left knot is <= x; exact knots hit y directly.
        let i = match self.xs.iter().rposition(|&k| k <= x) {
            Some(i) if i == self.xs.len() - 1 => return self.ys[i],
            Some(i) => i,
            None => 0,
        };
        if x == self.xs[i] {
            return self.ys[i];
        }

        let h = self.xs[i + 1] - self.xs[i];
        let t = (x - self.xs[i]) / h;
        let t2 = t * t;
        let t3 = t2 * t;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        h00 * self.ys[i]
            + h10 * h * self.slopes[i]
            + h01 * self.ys[i + 1]
            + h11 * h * self.slopes[i + 1]
    }
}

fn pchip_slopes(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let m: Vec<f64> = (0..n - 1).map(|k| (ys[k + 1] - ys[k]) / h[k]).collect();

    if n == 2 {
        return vec![m[0], m[0]];
    }

    let mut d = vec![0.0; n];
    for k in 1..n - 1 {
        if m[k - 1] * m[k] <= 0.0 {
            continue;
        }
        let w1 = 2.0 * h[k] + h[k - 1];
        let w2 = h[k] + 2.0 * h[k - 1];
        d[k] = (w1 + w2) / (w1 / m[k - 1] + w2 / m[k]);
    }
    d[0] = end_slope(h[0], h[1], m[0], m[1]);
    d[n - 1] = end_slope(h[n - 2], h[n - 3], m[n - 2], m[n - 3]);
    d
}

fn end_slope(h0: f64, h1: f64, m0: f64, m1: f64) -> f64 {
    let d = ((2.0 * h0 + h1) * m0 - h0 * m1) / (h0 + h1);
    if sign(d) != sign(m0) {
        0.0
    } else if sign(m0) != sign(m1) && d.abs() > 3.0 * m0.abs() {
        3.0 * m0
    } else {
        d
    }
}

fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Misalignment of a vehicle centre, normalised so 10 is dead centre and
/// 0 is a centre sitting on one of the lines. Negative when the centre
/// lies outside the spot.
pub fn raw_score(center_x: f64, bounds: &SpotBounds) -> f64 {
    let error = (bounds.midpoint() - center_x).abs();
    (1.0 - error / bounds.half_width()) * 10.0
}
