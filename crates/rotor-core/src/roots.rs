//! Brent's method for scalar root-finding.
//!
//! Combines bisection, secant, and inverse quadratic interpolation; keeps
//! bisection's guaranteed bracket while converging superlinearly on smooth
//! residuals. The iteration budget is a hard bound: when it runs out the
//! best iterate so far is returned with `converged = false` instead of an
//! error, so callers decide how strict to be.

/// The supplied interval does not bracket a sign change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BracketError;

impl std::fmt::Display for BracketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "interval endpoints do not bracket a sign change")
    }
}

impl std::error::Error for BracketError {}

/// Outcome of a root search.
#[derive(Clone, Copy, Debug)]
pub struct RootResult {
    /// Best estimate of the root.
    pub root: f64,
    /// Residual at `root`.
    pub f_root: f64,
    /// Iterations consumed.
    pub iterations: usize,
    /// Whether the tolerance was met within the budget.
    pub converged: bool,
}

/// Absolute x tolerance matching the common scipy `brentq` default.
pub const DEFAULT_XTOL: f64 = 2e-12;
/// Default iteration budget.
pub const DEFAULT_MAXITER: usize = 100;

/// Find a root of `f` in `[a, b]`.
///
/// `f(a)` and `f(b)` must differ in sign (either ordering of `a`, `b` is
/// accepted). An exhausted budget is not an error; inspect
/// [`RootResult::converged`].
pub fn brent<F>(mut f: F, a: f64, b: f64, xtol: f64, maxiter: usize) -> Result<RootResult, BracketError>
where
    F: FnMut(f64) -> f64,
{
    let rtol = 4.0 * f64::EPSILON;

    let (mut xa, mut xb) = (a, b);
    let mut fa = f(xa);
    let mut fb = f(xb);

    if fa == 0.0 {
        return Ok(RootResult { root: xa, f_root: 0.0, iterations: 0, converged: true });
    }
    if fb == 0.0 {
        return Ok(RootResult { root: xb, f_root: 0.0, iterations: 0, converged: true });
    }
    if fa.signum() == fb.signum() {
        return Err(BracketError);
    }

    // xb holds the best iterate, xc the previous best, xa the counterpoint.
    let mut xc = xa;
    let mut fc = fa;
    let mut d = xb - xa;
    let mut e = d;

    let mut iterations = 0;
    while iterations < maxiter {
        iterations += 1;

        if fb.signum() == fc.signum() {
            xc = xa;
            fc = fa;
            d = xb - xa;
            e = d;
        }
        if fc.abs() < fb.abs() {
            xa = xb;
            xb = xc;
            xc = xa;
            fa = fb;
            fb = fc;
            fc = fa;
        }

        let tol = 0.5 * (xtol + rtol * xb.abs());
        let m = 0.5 * (xc - xb);

        if fb == 0.0 || m.abs() <= tol {
            return Ok(RootResult { root: xb, f_root: fb, iterations, converged: true });
        }

        if e.abs() >= tol && fa.abs() > fb.abs() {
            // Attempt interpolation
            let s = fb / fa;
            let (mut p, mut q) = if xa == xc {
                // secant
                (2.0 * m * s, 1.0 - s)
            } else {
                // inverse quadratic
                let qq = fa / fc;
                let r = fb / fc;
                (
                    s * (2.0 * m * qq * (qq - r) - (xb - xa) * (r - 1.0)),
                    (qq - 1.0) * (r - 1.0) * (s - 1.0),
                )
            };
            if p > 0.0 {
                q = -q;
            } else {
                p = -p;
            }
            if 2.0 * p < (3.0 * m * q - (tol * q).abs()).min((e * q).abs()) {
                e = d;
                d = p / q;
            } else {
                d = m;
                e = m;
            }
        } else {
            d = m;
            e = m;
        }

        xa = xb;
        fa = fb;
        if d.abs() > tol {
            xb += d;
        } else {
            xb += if m > 0.0 { tol } else { -tol };
        }
        fb = f(xb);
    }

    Ok(RootResult { root: xb, f_root: fb, iterations, converged: false })
}

/* ----------------------------------- tests ---------------------------------- */
