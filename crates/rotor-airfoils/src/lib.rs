//! rotor-airfoils
//!
//! Tabulated airfoil polars for blade-element analysis:
//! - `Polar`: one (alpha, cl, cd [, cm]) table at a single Reynolds number
//! - Viterna flat-plate extrapolation to the full +/-180 deg range, so the
//!   induction solver never queries an undefined coefficient no matter how
//!   far from equilibrium the root-finder wanders
//! - `PolarSet`: the query object shared by blade stations. Interpolation
//!   variant (single table vs. Reynolds-blended) is chosen once at
//!   construction, not per query
//! - a tolerant flat-text parser for AeroDyn-style polar files
//!
//! Angles are degrees in tables and files (matching the data sources) and
//! radians at the query interface (matching the solver).

use std::f64::consts::PI;

use rotor_core::MonotoneCubic;

mod aerodyn;
mod viterna;

pub use aerodyn::parse_flat_table;

/// Construction-time failures. Runtime queries never fail; degenerate data
/// propagates NaN to the caller instead (see the workspace error policy).
#[derive(Debug, thiserror::Error)]
pub enum PolarError {
    #[error("polar arrays must have equal lengths (alpha has {alpha}, {name} has {len})")]
    LengthMismatch {
        alpha: usize,
        name: &'static str,
        len: usize,
    },
    #[error("at least {min} angle-of-attack samples are required, got {got}")]
    TooFewSamples { min: usize, got: usize },
    #[error("angle-of-attack grid must be finite and strictly increasing")]
    MalformedGrid,
    #[error("extrapolation requires the last tabulated angle in (0, 90] deg, got {0} deg")]
    StallPointOutOfRange(f64),
    #[error("polar must cover the full +/-180 deg range before use in a PolarSet (covers {lo} to {hi} deg)")]
    IncompleteCoverage { lo: f64, hi: f64 },
    #[error("Reynolds block values must be finite and strictly increasing")]
    MalformedReynolds,
    #[error("a PolarSet needs at least one polar")]
    Empty,
    #[error("no data rows found in polar table")]
    EmptyTable,
    #[error("line {line}: {msg}")]
    Parse { line: usize, msg: String },
}

/// Interpolated coefficients at one query point.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AeroCoeffs {
    pub cl: f64,
    pub cd: f64,
    /// Zero when the table carries no moment data.
    pub cm: f64,
    /// d(cl)/d(alpha), per radian.
    pub cl_alpha: f64,
    /// d(cd)/d(alpha), per radian.
    pub cd_alpha: f64,
}

/// -------------------------
/// Polar (one Reynolds number)
/// -------------------------

/// Immutable (alpha, cl, cd [, cm]) table. Angles stored in degrees.
#[derive(Clone, Debug)]
pub struct Polar {
    alpha_deg: Vec<f64>,
    cl: Vec<f64>,
    cd: Vec<f64>,
    cm: Option<Vec<f64>>,
}

impl Polar {
    /// Validate and store a raw table. The grid must be finite, strictly
    /// increasing, and hold at least three samples.
    pub fn new(
        alpha_deg: Vec<f64>,
        cl: Vec<f64>,
        cd: Vec<f64>,
        cm: Option<Vec<f64>>,
    ) -> Result<Self, PolarError> {
        let n = alpha_deg.len();
        if n < 3 {
            return Err(PolarError::TooFewSamples { min: 3, got: n });
        }
        if cl.len() != n {
            return Err(PolarError::LengthMismatch { alpha: n, name: "cl", len: cl.len() });
        }
        if cd.len() != n {
            return Err(PolarError::LengthMismatch { alpha: n, name: "cd", len: cd.len() });
        }
        if let Some(cm) = &cm {
            if cm.len() != n {
                return Err(PolarError::LengthMismatch { alpha: n, name: "cm", len: cm.len() });
            }
        }
        for i in 0..n {
            if !alpha_deg[i].is_finite() {
                return Err(PolarError::MalformedGrid);
            }
            if i > 0 && alpha_deg[i] <= alpha_deg[i - 1] {
                return Err(PolarError::MalformedGrid);
            }
        }
        Ok(Self { alpha_deg, cl, cd, cm })
    }

    /// Angle-of-attack grid in degrees.
    #[must_use]
    pub fn alpha_deg(&self) -> &[f64] {
        &self.alpha_deg
    }

    #[must_use]
    pub fn cl(&self) -> &[f64] {
        &self.cl
    }

    #[must_use]
    pub fn cd(&self) -> &[f64] {
        &self.cd
    }

    #[must_use]
    pub fn cm(&self) -> Option<&[f64]> {
        self.cm.as_deref()
    }

    /// Whether the grid already spans the full +/-180 deg cycle.
    #[must_use]
    pub fn covers_full_range(&self) -> bool {
        const TOL: f64 = 1e-6;
        self.alpha_deg[0] <= -180.0 + TOL
            && *self.alpha_deg.last().expect("validated non-empty") >= 180.0 - TOL
    }

    /// Extend the table to +/-180 deg with the Viterna flat-plate method,
    /// stitched to the tabulated endpoints. See [`viterna`] for the model.
    ///
    /// `cd_max` is the flat-plate drag ceiling; the tabulated maximum wins
    /// if it is larger. A common estimate is `1.11 + 0.018 * aspect_ratio`.
    pub fn extrapolated(&self, cd_max: f64) -> Result<Polar, PolarError> {
        viterna::extrapolate(self, cd_max)
    }
}

/// -------------------------
/// PolarSet (query object)
/// -------------------------

/// C1 curves for one full-range polar.
#[derive(Clone, Debug)]
struct PolarCurves {
    cl: MonotoneCubic,
    cd: MonotoneCubic,
    cm: Option<MonotoneCubic>,
}

impl PolarCurves {
    fn build(polar: &Polar) -> Result<Self, PolarError> {
        let lo = polar.alpha_deg[0];
        let hi = *polar.alpha_deg.last().expect("validated non-empty");
        if !polar.covers_full_range() {
            return Err(PolarError::IncompleteCoverage { lo, hi });
        }
        let alpha_rad: Vec<f64> = polar.alpha_deg.iter().map(|a| a.to_radians()).collect();
        let fit = |y: &[f64]| MonotoneCubic::new(&alpha_rad, y).ok_or(PolarError::MalformedGrid);
        Ok(Self {
            cl: fit(&polar.cl)?,
            cd: fit(&polar.cd)?,
            cm: match &polar.cm {
                Some(cm) => Some(fit(cm)?),
                None => None,
            },
        })
    }

    fn evaluate(&self, alpha_rad: f64) -> AeroCoeffs {
        let (cl, cl_alpha) = self.cl.eval_with_slope(alpha_rad);
        let (cd, cd_alpha) = self.cd.eval_with_slope(alpha_rad);
        let cm = self.cm.as_ref().map_or(0.0, |c| c.eval(alpha_rad));
        AeroCoeffs { cl, cd, cm, cl_alpha, cd_alpha }
    }
}

/// Interpolation strategy, fixed at construction.
#[derive(Clone, Debug)]
enum Variant {
    /// One table; Reynolds number is ignored at query time.
    Single(PolarCurves),
    /// Tables at several Reynolds numbers, blended linearly between
    /// neighbours and clamped at the ends.
    ByReynolds { re: Vec<f64>, curves: Vec<PolarCurves> },
}

/// Differentiable lift/drag/moment coefficients over the full +/-180 deg
/// range, optionally resolved in Reynolds number.
///
/// Immutable once built; stations referencing the same airfoil share one
/// instance by reference.
#[derive(Clone, Debug)]
pub struct PolarSet {
    variant: Variant,
}

impl PolarSet {
    /// Single-table set. The polar must cover +/-180 deg (use
    /// [`Polar::extrapolated`] on raw wind-tunnel data first).
    pub fn single(polar: &Polar) -> Result<Self, PolarError> {
        Ok(Self { variant: Variant::Single(PolarCurves::build(polar)?) })
    }

    /// Reynolds-resolved set from `(re, polar)` pairs sorted by `re`.
    pub fn by_reynolds(tables: &[(f64, Polar)]) -> Result<Self, PolarError> {
        match tables {
            [] => Err(PolarError::Empty),
            [(_, polar)] => Self::single(polar),
            _ => {
                let mut re = Vec::with_capacity(tables.len());
                let mut curves = Vec::with_capacity(tables.len());
                for (r, polar) in tables {
                    if !r.is_finite() || re.last().is_some_and(|prev| *prev >= *r) {
                        return Err(PolarError::MalformedReynolds);
                    }
                    re.push(*r);
                    curves.push(PolarCurves::build(polar)?);
                }
                Ok(Self { variant: Variant::ByReynolds { re, curves } })
            }
        }
    }

    /// Coefficients and alpha-derivatives at `alpha_rad` (radians) and `re`.
    ///
    /// Alpha outside +/-pi wraps around the cycle; Reynolds numbers outside
    /// the tabulated span clamp to the nearest table. Never fails: a
    /// degenerate table yields NaN coefficients which the caller observes
    /// in its own outputs.
    #[must_use]
    pub fn evaluate(&self, alpha_rad: f64, re: f64) -> AeroCoeffs {
        let alpha = wrap_pi(alpha_rad);
        match &self.variant {
            Variant::Single(curves) => curves.evaluate(alpha),
            Variant::ByReynolds { re: grid, curves } => {
                if re <= grid[0] {
                    return curves[0].evaluate(alpha);
                }
                if re >= grid[grid.len() - 1] {
                    return curves[curves.len() - 1].evaluate(alpha);
                }
                let hi = grid.partition_point(|r| *r < re).max(1);
                let lo = hi - 1;
                let t = (re - grid[lo]) / (grid[hi] - grid[lo]);
                let a = curves[lo].evaluate(alpha);
                let b = curves[hi].evaluate(alpha);
                AeroCoeffs {
                    cl: (1.0 - t) * a.cl + t * b.cl,
                    cd: (1.0 - t) * a.cd + t * b.cd,
                    cm: (1.0 - t) * a.cm + t * b.cm,
                    cl_alpha: (1.0 - t) * a.cl_alpha + t * b.cl_alpha,
                    cd_alpha: (1.0 - t) * a.cd_alpha + t * b.cd_alpha,
                }
            }
        }
    }
}

/// Wrap an angle into [-pi, pi].
fn wrap_pi(mut a: f64) -> f64 {
    while a > PI {
        a -= 2.0 * PI;
    }
    while a < -PI {
        a += 2.0 * PI;
    }
    a
}

/* ----------------------------------- tests ---------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn thin_airfoil_polar() -> Polar {
        // cl = 2*pi*alpha over a modest attached-flow range, quadratic drag
        let alpha_deg: Vec<f64> = (-20..=20).map(|a| f64::from(a)).collect();
        let cl: Vec<f64> = alpha_deg.iter().map(|a| 2.0 * PI * a.to_radians()).collect();
        let cd: Vec<f64> = alpha_deg
            .iter()
            .map(|a| 0.006 + 0.8 * a.to_radians().powi(2))
            .collect();
        Polar::new(alpha_deg, cl, cd, None).unwrap()
    }

    #[test]
    fn rejects_non_monotone_grid() {
        let err = Polar::new(
            vec![-5.0, 0.0, 0.0, 5.0],
            vec![0.0; 4],
            vec![0.01; 4],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PolarError::MalformedGrid));
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = Polar::new(vec![-5.0, 0.0, 5.0], vec![0.0; 2], vec![0.01; 3], None).unwrap_err();
        assert!(matches!(err, PolarError::LengthMismatch { name: "cl", .. }));
    }

    #[test]
    fn polar_set_requires_full_coverage() {
        let err = PolarSet::single(&thin_airfoil_polar()).unwrap_err();
        assert!(matches!(err, PolarError::IncompleteCoverage { .. }));
    }

    #[test]
    fn extrapolated_set_matches_table_in_range() {
        let raw = thin_airfoil_polar();
        let set = PolarSet::single(&raw.extrapolated(1.3).unwrap()).unwrap();
        for a_deg in [-15.0, -4.0, 0.0, 7.0, 18.0] {
            let a: f64 = a_deg;
            let c = set.evaluate(a.to_radians(), 1e6);
            assert_relative_eq!(c.cl, 2.0 * PI * a.to_radians(), max_relative = 2e-2, epsilon = 1e-3);
        }
    }

    #[test]
    fn slopes_match_finite_difference() {
        let set = PolarSet::single(&thin_airfoil_polar().extrapolated(1.3).unwrap()).unwrap();
        let h = 1e-7;
        for a_deg in [-150.0, -60.0, -10.0, 3.0, 45.0, 120.0, 175.0] {
            let a = f64::to_radians(a_deg);
            let c = set.evaluate(a, 1e6);
            let fd_cl = (set.evaluate(a + h, 1e6).cl - set.evaluate(a - h, 1e6).cl) / (2.0 * h);
            let fd_cd = (set.evaluate(a + h, 1e6).cd - set.evaluate(a - h, 1e6).cd) / (2.0 * h);
            assert_relative_eq!(c.cl_alpha, fd_cl, epsilon = 1e-4, max_relative = 1e-4);
            assert_relative_eq!(c.cd_alpha, fd_cd, epsilon = 1e-4, max_relative = 1e-4);
        }
    }

    #[test]
    fn wraps_beyond_half_turn() {
        let set = PolarSet::single(&thin_airfoil_polar().extrapolated(1.3).unwrap()).unwrap();
        let a = 0.3;
        let direct = set.evaluate(a, 1e6);
        let wrapped = set.evaluate(a + 2.0 * PI, 1e6);
        assert_relative_eq!(direct.cl, wrapped.cl, epsilon = 1e-12);
        assert_relative_eq!(direct.cd, wrapped.cd, epsilon = 1e-12);
    }

    #[test]
    fn reynolds_blend_is_linear_and_clamped() {
        let raw = thin_airfoil_polar().extrapolated(1.3).unwrap();
        // Second table with uniformly doubled drag
        let cd2: Vec<f64> = raw.cd().iter().map(|c| 2.0 * c).collect();
        let hi = Polar::new(raw.alpha_deg().to_vec(), raw.cl().to_vec(), cd2, None).unwrap();
        let set = PolarSet::by_reynolds(&[(1e6, raw.clone()), (3e6, hi)]).unwrap();

        let a = 0.1;
        let lo_cd = set.evaluate(a, 1e6).cd;
        let mid_cd = set.evaluate(a, 2e6).cd;
        let hi_cd = set.evaluate(a, 3e6).cd;
        assert_relative_eq!(mid_cd, 0.5 * (lo_cd + hi_cd), epsilon = 1e-12);
        // clamped outside
        assert_relative_eq!(set.evaluate(a, 1e3).cd, lo_cd, epsilon = 1e-12);
        assert_relative_eq!(set.evaluate(a, 1e9).cd, hi_cd, epsilon = 1e-12);
    }

    #[test]
    fn by_reynolds_rejects_unsorted_blocks() {
        let p = thin_airfoil_polar().extrapolated(1.3).unwrap();
        let err = PolarSet::by_reynolds(&[(2e6, p.clone()), (1e6, p)]).unwrap_err();
        assert!(matches!(err, PolarError::MalformedReynolds));
    }
}
