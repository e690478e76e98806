//! Viterna flat-plate extrapolation.
//!
//! Extends a measured polar to the full +/-180 deg range by blending the
//! tabulated endpoints into the Viterna post-stall model
//!
//!   cl = cdmax/2 * sin(2a) + A * cos^2(a)/sin(a)
//!   cd = cdmax * sin^2(a) + B * cos(a)
//!
//! with A and B chosen so the curves match the table at the stall point.
//! Reversed-flow lift is scaled by 0.7 to account for the asymmetry of a
//! sharp trailing edge leading into the "wind". The extension is produced
//! as additional table samples, so downstream interpolation sees a single
//! continuous grid with matching values at the stitch points.

use crate::{Polar, PolarError};
use std::f64::consts::{FRAC_PI_2, PI};

/// Lift adjustment for reversed flow.
const CL_ADJ: f64 = 0.7;
/// Samples per extension segment.
const NALPHA: usize = 15;
/// Pitching moment at 90 deg used by the (simplified) cm extension.
const CM_90: f64 = -0.45;

struct ViternaModel {
    cd_max: f64,
    a: f64,
    b: f64,
}

impl ViternaModel {
    /// (cl, cd) at `alpha` (radians, expected in (0, pi/2]).
    fn eval(&self, alpha: f64, cl_adj: f64) -> (f64, f64) {
        let alpha = alpha.max(1e-4); // keep 1/sin bounded at the 0 deg edge
        let (sa, ca) = alpha.sin_cos();
        let cl = (self.cd_max / 2.0 * (2.0 * alpha).sin() + self.a * ca * ca / sa) * cl_adj;
        let cd = self.cd_max * sa * sa + self.b * ca;
        (cl, cd)
    }
}

/// `n` evenly spaced points spanning `[lo, hi]`.
fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    let step = (hi - lo) / (n - 1) as f64;
    (0..n).map(|i| lo + step * i as f64).collect()
}

pub(crate) fn extrapolate(polar: &Polar, cd_max: f64) -> Result<Polar, PolarError> {
    let alpha_deg = polar.alpha_deg();
    let n = alpha_deg.len();

    let alpha_high = alpha_deg[n - 1].to_radians();
    let alpha_low = alpha_deg[0].to_radians();
    if alpha_high <= 0.0 || alpha_high > FRAC_PI_2 + 1e-12 {
        return Err(PolarError::StallPointOutOfRange(alpha_deg[n - 1]));
    }

    let cl_high = polar.cl()[n - 1];
    let cd_high = polar.cd()[n - 1];
    let cl_low = polar.cl()[0];
    let cd_low = polar.cd()[0];

    let cd_max = cd_max.max(polar.cd().iter().copied().fold(f64::MIN, f64::max));
    let (sa, ca) = alpha_high.sin_cos();
    let model = ViternaModel {
        cd_max,
        a: (cl_high - cd_max * sa * ca) * sa / (ca * ca),
        b: cd_high - cd_max * sa * sa / ca,
    };

    // Assemble segments from -180 deg upward; each closure pushes
    // (alpha, cl, cd) samples.
    let mut ext_alpha: Vec<f64> = Vec::new();
    let mut ext_cl: Vec<f64> = Vec::new();
    let mut ext_cd: Vec<f64> = Vec::new();
    let mut push = |a: f64, cl: f64, cd: f64, out: &mut (Vec<f64>, Vec<f64>, Vec<f64>)| {
        out.0.push(a);
        out.1.push(cl);
        out.2.push(cd);
    };
    let mut tail = (Vec::new(), Vec::new(), Vec::new());

    // -180 <-> -180+alpha_high: linear cl from zero at -180 up to the
    // adjusted stall value at the stitch
    for &a in &linspace(-PI, -PI + alpha_high, NALPHA) {
        let (_, cd) = model.eval(a + PI, 1.0);
        let cl = (a + PI) / alpha_high * cl_high * CL_ADJ;
        push(a, cl, cd, &mut tail);
    }
    // -180+alpha_high <-> -90
    for &a in linspace(-PI + alpha_high, -FRAC_PI_2, NALPHA).iter().skip(1) {
        let (cl, cd) = model.eval(a + PI, CL_ADJ);
        push(a, cl, cd, &mut tail);
    }
    // -90 <-> min(-alpha_high, alpha_low)
    let neg_stall = (-alpha_high).min(alpha_low);
    for &a in linspace(-FRAC_PI_2, neg_stall, NALPHA).iter().skip(1) {
        let (cl, cd) = model.eval(-a, -CL_ADJ);
        push(a, cl, cd, &mut tail);
    }
    // -alpha_high <-> alpha_low: linear bridge into the tabulated low end
    // (only needed when the table is asymmetric)
    if alpha_low > -alpha_high + 1e-9 {
        let (cl_ns, _) = model.eval(alpha_high, -CL_ADJ);
        for &a in linspace(-alpha_high, alpha_low, NALPHA)
            .iter()
            .skip(1)
            .take(NALPHA - 2)
        {
            let t = (a + alpha_high) / (alpha_low + alpha_high);
            let cl = cl_ns + t * (cl_low - cl_ns);
            let cd = cd_low + (a - alpha_low) / (-alpha_high - alpha_low) * (cd_high - cd_low);
            push(a, cl, cd, &mut tail);
        }
    }

    let mut head = (Vec::new(), Vec::new(), Vec::new());
    // alpha_high <-> 90
    for &a in linspace(alpha_high, FRAC_PI_2, NALPHA).iter().skip(1) {
        let (cl, cd) = model.eval(a, 1.0);
        push(a, cl, cd, &mut head);
    }
    // 90 <-> 180-alpha_high
    for &a in linspace(FRAC_PI_2, PI - alpha_high, NALPHA).iter().skip(1) {
        let (cl, cd) = model.eval(PI - a, -CL_ADJ);
        push(a, cl, cd, &mut head);
    }
    // 180-alpha_high <-> 180: linear cl from the adjusted stall value at
    // the stitch down to zero at 180
    for &a in linspace(PI - alpha_high, PI, NALPHA).iter().skip(1) {
        let (_, cd) = model.eval(PI - a, 1.0);
        let cl = (a - PI) / alpha_high * cl_high * CL_ADJ;
        push(a, cl, cd, &mut head);
    }

    // Concatenate tail + table + head, in degrees, dropping any sample that
    // would break strict monotonicity at a stitch point.
    let mut full_alpha: Vec<f64> = Vec::new();
    let mut full_cl: Vec<f64> = Vec::new();
    let mut full_cd: Vec<f64> = Vec::new();
    let mut append = |a_deg: f64, cl: f64, cd: f64, fa: &mut Vec<f64>, fcl: &mut Vec<f64>, fcd: &mut Vec<f64>| {
        if fa.last().is_none_or(|prev| a_deg > prev + 1e-9) {
            fa.push(a_deg);
            fcl.push(cl);
            fcd.push(cd);
        }
    };
    for i in 0..tail.0.len() {
        append(tail.0[i].to_degrees(), tail.1[i], tail.2[i], &mut full_alpha, &mut full_cl, &mut full_cd);
    }
    for i in 0..n {
        append(alpha_deg[i], polar.cl()[i], polar.cd()[i], &mut full_alpha, &mut full_cl, &mut full_cd);
    }
    for i in 0..head.0.len() {
        append(head.0[i].to_degrees(), head.1[i], head.2[i], &mut full_alpha, &mut full_cl, &mut full_cd);
    }
    // Pin the extreme samples to exactly +/-180 deg so coverage checks and
    // angle wrapping agree bit-for-bit.
    full_alpha[0] = -180.0;
    *full_alpha.last_mut().expect("non-empty") = 180.0;

    // Moment extension: hold the tabulated curve, then blend linearly into a
    // flat-plate sinusoid beyond stall (simplified relative to AirfoilPrep).
    let full_cm = polar.cm().map(|cm| {
        let cm_high = cm[n - 1];
        let cm_low = cm[0];
        full_alpha
            .iter()
            .map(|a_deg| {
                let a = a_deg.to_radians();
                if a >= alpha_low && a <= alpha_high {
                    // within table: re-sample via linear interpolation
                    table_lookup(alpha_deg, cm, *a_deg)
                } else if a > alpha_high {
                    let t = ((a - alpha_high) / (FRAC_PI_2 - alpha_high)).min(1.0);
                    (1.0 - t) * cm_high + t * CM_90 * a.sin()
                } else {
                    let t = ((alpha_low - a) / (FRAC_PI_2 + alpha_low)).min(1.0);
                    (1.0 - t) * cm_low + t * CM_90 * a.sin()
                }
            })
            .collect()
    });

    Polar::new(full_alpha, full_cl, full_cd, full_cm)
}

/// Piecewise-linear lookup used when re-sampling the tabulated cm.
fn table_lookup(x: &[f64], y: &[f64], xq: f64) -> f64 {
    if xq <= x[0] {
        return y[0];
    }
    if xq >= x[x.len() - 1] {
        return y[y.len() - 1];
    }
    let hi = x.partition_point(|v| *v < xq).max(1);
    let lo = hi - 1;
    let t = (xq - x[lo]) / (x[hi] - x[lo]);
    (1.0 - t) * y[lo] + t * y[hi]
}

/* ----------------------------------- tests ---------------------------------- */
