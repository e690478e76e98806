//! Shape-preserving monotone cubic interpolation (Fritsch–Carlson).
//!
//! Piecewise cubic Hermite with slopes limited so the interpolant never
//! overshoots the data. This matters for tabulated airfoil polars: a plain
//! cubic spline oscillates near stall, and the oscillation feeds straight
//! into the root-finder as spurious equilibria. The interpolant is C1, and
//! the analytic first derivative is available at every query point.

/// One coefficient curve sampled on a strictly increasing grid.
#[derive(Clone, Debug)]
pub struct MonotoneCubic {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Endpoint-limited Fritsch–Carlson slopes at each knot.
    d: Vec<f64>,
}

impl MonotoneCubic {
    /// Build the interpolant. `x` must be strictly increasing, finite, and
    /// have at least two knots; `y` must match in length.
    ///
    /// Returns `None` when the grid is malformed (callers turn this into
    /// their own construction error).
    #[must_use]
    pub fn new(x: &[f64], y: &[f64]) -> Option<Self> {
        let n = x.len();
        if n < 2 || y.len() != n {
            return None;
        }
        for i in 0..n {
            if !x[i].is_finite() || !y[i].is_finite() {
                return None;
            }
            if i > 0 && x[i] <= x[i - 1] {
                return None;
            }
        }

        // Secant slopes per interval.
        let mut h = vec![0.0; n - 1];
        let mut delta = vec![0.0; n - 1];
        for i in 0..n - 1 {
            h[i] = x[i + 1] - x[i];
            delta[i] = (y[i + 1] - y[i]) / h[i];
        }

        let mut d = vec![0.0; n];
        if n == 2 {
            d[0] = delta[0];
            d[1] = delta[0];
        } else {
            d[0] = endpoint_slope(h[0], h[1], delta[0], delta[1]);
            d[n - 1] = endpoint_slope(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);
            for i in 1..n - 1 {
                if delta[i - 1] * delta[i] <= 0.0 {
                    d[i] = 0.0; // local extremum: flat tangent preserves shape
                } else {
                    // Weighted harmonic mean (Fritsch–Carlson)
                    let w1 = 2.0 * h[i] + h[i - 1];
                    let w2 = h[i] + 2.0 * h[i - 1];
                    d[i] = (w1 + w2) / (w1 / delta[i - 1] + w2 / delta[i]);
                }
            }
        }

        Some(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            d,
        })
    }

    /// Lower and upper grid bounds.
    #[must_use]
    pub fn bounds(&self) -> (f64, f64) {
        (self.x[0], *self.x.last().expect("non-empty grid"))
    }

    /// Interpolated value at `xq`. Queries outside the grid clamp to the
    /// nearest endpoint (flat extension).
    #[must_use]
    pub fn eval(&self, xq: f64) -> f64 {
        self.eval_with_slope(xq).0
    }

    /// Interpolated value and first derivative at `xq`.
    #[must_use]
    pub fn eval_with_slope(&self, xq: f64) -> (f64, f64) {
        let n = self.x.len();
        if xq <= self.x[0] {
            return (self.y[0], 0.0);
        }
        if xq >= self.x[n - 1] {
            return (self.y[n - 1], 0.0);
        }

        // Binary search for the containing interval.
        let k = match self
            .x
            .binary_search_by(|v| v.partial_cmp(&xq).expect("finite grid"))
        {
            Ok(i) => i.min(n - 2),
            Err(i) => i - 1,
        };

        let h = self.x[k + 1] - self.x[k];
        let t = (xq - self.x[k]) / h;
        let t2 = t * t;
        let t3 = t2 * t;

        // Hermite basis
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        let value = h00 * self.y[k]
            + h10 * h * self.d[k]
            + h01 * self.y[k + 1]
            + h11 * h * self.d[k + 1];

        // d/dt of the basis, then /h for d/dx
        let dh00 = 6.0 * t2 - 6.0 * t;
        let dh10 = 3.0 * t2 - 4.0 * t + 1.0;
        let dh01 = -6.0 * t2 + 6.0 * t;
        let dh11 = 3.0 * t2 - 2.0 * t;

        let slope = (dh00 * self.y[k] + dh01 * self.y[k + 1]) / h
            + dh10 * self.d[k]
            + dh11 * self.d[k + 1];

        (value, slope)
    }
}

/// Three-point endpoint slope with the standard PCHIP limiters.
fn endpoint_slope(h0: f64, h1: f64, del0: f64, del1: f64) -> f64 {
    let mut d = ((2.0 * h0 + h1) * del0 - h0 * del1) / (h0 + h1);
    if d * del0 <= 0.0 {
        d = 0.0;
    } else if del0 * del1 < 0.0 && d.abs() > 3.0 * del0.abs() {
        d = 3.0 * del0;
    }
    d
}

/* ----------------------------------- tests ---------------------------------- */
