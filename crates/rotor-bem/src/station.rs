//! Single-station induction solve.
//!
//! One blade station is an independent nonlinear problem in the inflow angle
//! phi: momentum and blade-element theory give a single residual whose root
//! fixes the induction factors, and with them the section loads. The solve
//! follows the guaranteed-bracket formulation: the residual changes sign on
//! [eps, pi/2] for windmill operation, with the propeller-brake and
//! reversed-flow intervals as fallbacks.
//!
//! Derivatives use the implicit function theorem at the converged root:
//! d(phi)/dx = -(dR/dx)/(dR/dphi), then the chain rule carries phi into the
//! loads. Gradients here are per radian for angles; callers apply user-unit
//! factors.

use rotor_airfoils::PolarSet;
use rotor_core::roots::{self, RootResult};

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// Indices into the per-station gradient arrays.
pub(crate) const L_CHORD: usize = 0;
pub(crate) const L_TWIST: usize = 1;
pub(crate) const L_VX: usize = 2;
pub(crate) const L_VY: usize = 3;
pub(crate) const L_R: usize = 4;
pub(crate) const L_RHUB: usize = 5;
pub(crate) const L_RTIP: usize = 6;
pub(crate) const L_PITCH: usize = 7;
pub(crate) const NLOCAL: usize = 8;

/// Lower bracket edge; also the offset from singular endpoints.
const PHI_EPS: f64 = 1e-6;

/// How the station solve terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolveStatus {
    /// Root found within tolerance; momentum theory applied directly.
    Converged,
    /// Root found within tolerance in the high-induction regime, where the
    /// empirical thrust continuation replaces momentum theory.
    HighInduction,
    /// Iteration budget ran out; values come from the best iterate.
    BudgetExhausted,
    /// Rotor stopped: no induction, loads from the geometric inflow angle.
    Parked,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct StationInputs<'a> {
    pub r: f64,
    pub chord: f64,
    /// Twist, radians.
    pub twist: f64,
    /// Blade pitch, radians.
    pub pitch: f64,
    pub vx: f64,
    pub vy: f64,
    pub rhub: f64,
    pub rtip: f64,
    pub blades: f64,
    pub rho: f64,
    pub mu: f64,
    pub rotating: bool,
    pub polar: &'a PolarSet,
}

/// Total gradients of the section loads over the eight local inputs.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct StationGrad {
    pub np: [f64; NLOCAL],
    pub tp: [f64; NLOCAL],
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct StationOutput {
    /// Inflow angle, radians.
    pub phi: f64,
    /// Axial induction factor.
    pub a: f64,
    /// Tangential induction factor.
    pub ap: f64,
    pub cl: f64,
    pub cd: f64,
    /// Local inflow speed including induction, m/s.
    pub w: f64,
    pub re: f64,
    /// Normal force per unit span, N/m.
    pub np: f64,
    /// Tangential force per unit span, N/m.
    pub tp: f64,
    pub status: SolveStatus,
    pub grad: Option<StationGrad>,
}

/* -------------------------- residual evaluation -------------------------- */

/// Partial-derivative vector over (phi, chord, twist, r, rhub, rtip, pitch).
/// phi partials are totals, alpha moving with phi.
type Partials = [f64; 7];

const P_PHI: usize = 0;
const P_CHORD: usize = 1;
const P_TWIST: usize = 2;
const P_R: usize = 3;
const P_RHUB: usize = 4;
const P_RTIP: usize = 5;
const P_PITCH: usize = 6;

#[derive(Clone, Copy, Debug, Default)]
struct Induction {
    residual: f64,
    a: f64,
    ap: f64,
    k: f64,
    cn: f64,
    ct: f64,
    cl: f64,
    cd: f64,
    d_residual: Partials,
    d_residual_vx: f64,
    d_residual_vy: f64,
    d_a: Partials,
    d_ap: Partials,
    d_cn: Partials,
    d_ct: Partials,
}

/// Prandtl loss factor and partials of its argument chain.
fn loss_factor(
    f_arg: f64,
    d_arg: &Partials,
) -> (f64, Partials) {
    // exp(-f) underflows for large arguments; the factor is then exactly 1
    // and insensitive to everything.
    if f_arg > 500.0 {
        return (1.0, [0.0; 7]);
    }
    let e = (-f_arg).exp();
    let factor = 2.0 / PI * e.min(1.0).acos();
    let denom = (1.0 - e * e).sqrt();
    let d_factor_d_arg = if denom > 0.0 { 2.0 / PI * e / denom } else { 0.0 };
    let mut d = [0.0; 7];
    for i in 0..7 {
        d[i] = d_factor_d_arg * d_arg[i];
    }
    (factor, d)
}

/// Evaluate the coupled momentum/blade-element state at a trial phi.
///
/// With `partials` set, every returned quantity carries its gradient over
/// the local inputs, built alongside the values.
fn induction(phi: f64, inputs: &StationInputs<'_>, re: f64, partials: bool) -> Induction {
    let sphi = phi.sin();
    let cphi = phi.cos();
    let theta = inputs.twist + inputs.pitch;
    let alpha = phi - theta;

    let coeffs = inputs.polar.evaluate(alpha, re);
    let (cl, cd) = (coeffs.cl, coeffs.cd);

    // Force coefficients resolved normal/tangential to the rotor plane.
    let cn = cl * cphi + cd * sphi;
    let ct = cl * sphi - cd * cphi;

    // Hub and tip loss arguments. |sin phi| keeps both branches of the
    // bracket usable; the sign cancels in the factor.
    let sabs = sphi.abs().max(1e-12);
    let ssign = if sphi < 0.0 { -1.0 } else { 1.0 };
    let half_b = 0.5 * inputs.blades;
    let ftip_arg = half_b * (inputs.rtip - inputs.r) / (inputs.r * sabs);
    let fhub_arg = half_b * (inputs.r - inputs.rhub) / (inputs.rhub * sabs);

    let sigma = inputs.blades * inputs.chord / (2.0 * PI * inputs.r);

    let mut out = Induction { cl, cd, cn, ct, ..Induction::default() };

    // Partial chains, filled only when needed.
    let mut d_ftip_arg = [0.0; 7];
    let mut d_fhub_arg = [0.0; 7];
    let mut d_sigma = [0.0; 7];
    if partials {
        // d|1/sin|/dphi = -cos/sin^2 * sign
        let d_inv_sabs_dphi = -cphi / (sabs * sabs) * ssign;
        d_ftip_arg[P_PHI] = half_b * (inputs.rtip - inputs.r) / inputs.r * d_inv_sabs_dphi;
        d_ftip_arg[P_R] = -half_b * inputs.rtip / (inputs.r * inputs.r * sabs);
        d_ftip_arg[P_RTIP] = half_b / (inputs.r * sabs);
        d_fhub_arg[P_PHI] = half_b * (inputs.r - inputs.rhub) / inputs.rhub * d_inv_sabs_dphi;
        d_fhub_arg[P_R] = half_b / (inputs.rhub * sabs);
        d_fhub_arg[P_RHUB] = -half_b * inputs.r / (inputs.rhub * inputs.rhub * sabs);
        d_sigma[P_CHORD] = sigma / inputs.chord;
        d_sigma[P_R] = -sigma / inputs.r;

        let cn_phi_direct = -cl * sphi + cd * cphi;
        let cn_alpha = coeffs.cl_alpha * cphi + coeffs.cd_alpha * sphi;
        let ct_phi_direct = cl * cphi + cd * sphi;
        let ct_alpha = coeffs.cl_alpha * sphi - coeffs.cd_alpha * cphi;
        out.d_cn[P_PHI] = cn_phi_direct + cn_alpha;
        out.d_cn[P_TWIST] = -cn_alpha;
        out.d_cn[P_PITCH] = -cn_alpha;
        out.d_ct[P_PHI] = ct_phi_direct + ct_alpha;
        out.d_ct[P_TWIST] = -ct_alpha;
        out.d_ct[P_PITCH] = -ct_alpha;
    }

    let (ftip, d_ftip) = loss_factor(ftip_arg, &d_ftip_arg);
    let (fhub, d_fhub) = loss_factor(fhub_arg, &d_fhub_arg);
    let floss = ftip * fhub;
    let mut d_floss = [0.0; 7];
    if partials {
        for i in 0..7 {
            d_floss[i] = d_ftip[i] * fhub + ftip * d_fhub[i];
        }
    }

    // Momentum/blade-element coupling parameters.
    let k_den = 4.0 * floss * sphi * sphi;
    let kp_den = 4.0 * floss * sphi * cphi;
    let k = sigma * cn / k_den;
    let kp = sigma * ct / kp_den;
    out.k = k;

    let mut d_k = [0.0; 7];
    let mut d_kp = [0.0; 7];
    if partials {
        for i in 0..7 {
            let d_num_k = d_sigma[i] * cn + sigma * out.d_cn[i];
            let mut d_den_k = 4.0 * d_floss[i] * sphi * sphi;
            let d_num_kp = d_sigma[i] * ct + sigma * out.d_ct[i];
            let mut d_den_kp = 4.0 * d_floss[i] * sphi * cphi;
            if i == P_PHI {
                d_den_k += 8.0 * floss * sphi * cphi;
                d_den_kp += 4.0 * floss * (cphi * cphi - sphi * sphi);
            }
            d_k[i] = (d_num_k - k * d_den_k) / k_den;
            d_kp[i] = (d_num_kp - kp * d_den_kp) / kp_den;
        }
    }

    // Axial induction, including the empirical high-induction continuation
    // and the propeller-brake branch.
    let (a, d_a) = if phi > 0.0 {
        if k <= 2.0 / 3.0 {
            let a = k / (1.0 + k);
            let mut d = [0.0; 7];
            if partials {
                let s = 1.0 / ((1.0 + k) * (1.0 + k));
                for i in 0..7 {
                    d[i] = d_k[i] * s;
                }
            }
            (a, d)
        } else {
            let g1 = 2.0 * floss * k - (10.0 / 9.0 - floss);
            let g2 = 2.0 * floss * k - (4.0 / 3.0 - floss) * floss;
            let g3 = 2.0 * floss * k - (25.0 / 9.0 - 2.0 * floss);
            let sqrt_g2 = g2.max(0.0).sqrt();
            let mut d = [0.0; 7];
            if g3.abs() < 1e-6 {
                let a = 1.0 - 1.0 / (2.0 * sqrt_g2);
                if partials {
                    for i in 0..7 {
                        let d_g2 = 2.0 * (d_floss[i] * k + floss * d_k[i])
                            - (4.0 / 3.0) * d_floss[i]
                            + 2.0 * floss * d_floss[i];
                        d[i] = d_g2 / (4.0 * sqrt_g2 * g2);
                    }
                }
                (a, d)
            } else {
                let a = (g1 - sqrt_g2) / g3;
                if partials {
                    for i in 0..7 {
                        let common = 2.0 * (d_floss[i] * k + floss * d_k[i]);
                        let d_g1 = common + d_floss[i];
                        let d_g2 = common - (4.0 / 3.0) * d_floss[i] + 2.0 * floss * d_floss[i];
                        let d_g3 = common + 2.0 * d_floss[i];
                        d[i] = (d_g1 - d_g2 / (2.0 * sqrt_g2) - a * d_g3) / g3;
                    }
                }
                (a, d)
            }
        }
    } else if k > 1.0 {
        // Propeller-brake region.
        let a = k / (k - 1.0);
        let mut d = [0.0; 7];
        if partials {
            let s = -1.0 / ((k - 1.0) * (k - 1.0));
            for i in 0..7 {
                d[i] = d_k[i] * s;
            }
        }
        (a, d)
    } else {
        (0.0, [0.0; 7])
    };

    let ap = kp / (1.0 - kp);
    let mut d_ap = [0.0; 7];
    if partials {
        let s = 1.0 / ((1.0 - kp) * (1.0 - kp));
        for i in 0..7 {
            d_ap[i] = d_kp[i] * s;
        }
    }

    // Single residual in phi. The inflow ratio lambda ties the axial and
    // tangential momentum balances together.
    let lambda = inputs.vx / inputs.vy;
    if phi > 0.0 {
        out.residual = sphi / (1.0 - a) - lambda * cphi * (1.0 - kp);
        if partials {
            for i in 0..7 {
                let dphi = if i == P_PHI { 1.0 } else { 0.0 };
                out.d_residual[i] = cphi * dphi / (1.0 - a)
                    + sphi * d_a[i] / ((1.0 - a) * (1.0 - a))
                    + lambda * sphi * dphi * (1.0 - kp)
                    + lambda * cphi * d_kp[i];
            }
        }
    } else {
        out.residual = sphi * (1.0 - k) - lambda * cphi * (1.0 - kp);
        if partials {
            for i in 0..7 {
                let dphi = if i == P_PHI { 1.0 } else { 0.0 };
                out.d_residual[i] = cphi * dphi * (1.0 - k) - sphi * d_k[i]
                    + lambda * sphi * dphi * (1.0 - kp)
                    + lambda * cphi * d_kp[i];
            }
        }
    }
    if partials {
        out.d_residual_vx = -cphi * (1.0 - kp) / inputs.vy;
        out.d_residual_vy = cphi * (1.0 - kp) * inputs.vx / (inputs.vy * inputs.vy);
    }

    out.a = a;
    out.ap = ap;
    out.d_a = d_a;
    out.d_ap = d_ap;
    out
}

/* ------------------------------ station solve ------------------------------ */

/// Solve one station for its inflow angle and section loads.
pub(crate) fn solve(inputs: &StationInputs<'_>, derivatives: bool) -> StationOutput {
    // Reynolds number from the un-induced inflow; treated as a fixed
    // parameter of the polar lookup, not differentiated.
    let w0 = inputs.vx.hypot(inputs.vy);
    let re = inputs.rho * inputs.chord * w0 / inputs.mu;

    if !inputs.rotating {
        return parked(inputs, re, derivatives);
    }

    let residual = |phi: f64| induction(phi, inputs, re, false).residual;

    // Primary bracket [eps, pi/2]; windmill states nearly always live here.
    // Fallbacks cover the propeller-brake and reversed-flow regimes.
    let (phi, root_converged) = {
        let f_lo = residual(PHI_EPS);
        let f_hi = residual(FRAC_PI_2);
        if f_lo * f_hi <= 0.0 {
            run_brent(residual, PHI_EPS, FRAC_PI_2)
        } else if residual(-FRAC_PI_4) < 0.0 && residual(-PHI_EPS) > 0.0 {
            run_brent(residual, -FRAC_PI_4, -PHI_EPS)
        } else {
            run_brent(residual, FRAC_PI_2, PI - PHI_EPS)
        }
    };

    let state = induction(phi, inputs, re, derivatives);
    let status = if !root_converged {
        SolveStatus::BudgetExhausted
    } else if phi > 0.0 && state.k > 2.0 / 3.0 {
        SolveStatus::HighInduction
    } else {
        SolveStatus::Converged
    };

    finish(inputs, phi, re, &state, status, derivatives)
}

fn run_brent<F: FnMut(f64) -> f64>(f: F, lo: f64, hi: f64) -> (f64, bool) {
    match roots::brent(f, lo, hi, roots::DEFAULT_XTOL, roots::DEFAULT_MAXITER) {
        Ok(RootResult { root, converged, .. }) => (root, converged),
        // No sign change in the last-resort interval; report the interval
        // edge as the best available state.
        Err(_) => (FRAC_PI_2, false),
    }
}

/// Parked (or idling-at-zero) rotor: the inflow angle is set directly by the
/// velocity triangle and there is no induction.
fn parked(inputs: &StationInputs<'_>, re: f64, derivatives: bool) -> StationOutput {
    let phi = inputs.vx.atan2(inputs.vy);
    let sphi = phi.sin();
    let cphi = phi.cos();
    let alpha = phi - (inputs.twist + inputs.pitch);
    let coeffs = inputs.polar.evaluate(alpha, re);
    let cn = coeffs.cl * cphi + coeffs.cd * sphi;
    let ct = coeffs.cl * sphi - coeffs.cd * cphi;

    let w2 = inputs.vx * inputs.vx + inputs.vy * inputs.vy;
    let q_c = 0.5 * inputs.rho * inputs.chord;
    let np = cn * q_c * w2;
    let tp = ct * q_c * w2;

    let grad = derivatives.then(|| {
        let denom = w2.max(f64::MIN_POSITIVE);
        let dphi_dvx = inputs.vy / denom;
        let dphi_dvy = -inputs.vx / denom;

        let cn_phi = -coeffs.cl * sphi + coeffs.cd * cphi
            + coeffs.cl_alpha * cphi + coeffs.cd_alpha * sphi;
        let ct_phi = coeffs.cl * cphi + coeffs.cd * sphi
            + coeffs.cl_alpha * sphi - coeffs.cd_alpha * cphi;
        let cn_alpha = coeffs.cl_alpha * cphi + coeffs.cd_alpha * sphi;
        let ct_alpha = coeffs.cl_alpha * sphi - coeffs.cd_alpha * cphi;

        let mut g = StationGrad::default();
        // d(out)/dx = q_c * (dcoeff * w2 + coeff * dw2), plus the chord term.
        let fill = |out: &mut [f64; NLOCAL], c: f64, c_phi: f64, c_alpha: f64| {
            out[L_CHORD] = c * 0.5 * inputs.rho * w2;
            out[L_TWIST] = -c_alpha * q_c * w2;
            out[L_PITCH] = -c_alpha * q_c * w2;
            out[L_VX] = q_c * (c_phi * dphi_dvx * w2 + c * 2.0 * inputs.vx);
            out[L_VY] = q_c * (c_phi * dphi_dvy * w2 + c * 2.0 * inputs.vy);
        };
        fill(&mut g.np, cn, cn_phi, cn_alpha);
        fill(&mut g.tp, ct, ct_phi, ct_alpha);
        g
    });

    StationOutput {
        phi,
        a: 0.0,
        ap: 0.0,
        cl: coeffs.cl,
        cd: coeffs.cd,
        w: w2.sqrt(),
        re,
        np,
        tp,
        status: SolveStatus::Parked,
        grad,
    }
}

/// Loads and, when requested, their local gradients at the converged root.
fn finish(
    inputs: &StationInputs<'_>,
    phi: f64,
    re: f64,
    state: &Induction,
    status: SolveStatus,
    derivatives: bool,
) -> StationOutput {
    let (vx, vy) = (inputs.vx, inputs.vy);
    let ax = vx * (1.0 - state.a);
    let tn = vy * (1.0 + state.ap);
    let w2 = ax * ax + tn * tn;
    let q_c = 0.5 * inputs.rho * inputs.chord;
    let np = state.cn * q_c * w2;
    let tp = state.ct * q_c * w2;

    let grad = derivatives.then(|| {
        // Implicit function theorem: the root moves against the residual.
        let d_res_d_phi = state.d_residual[P_PHI];
        let mut dphi = [0.0; NLOCAL];
        dphi[L_CHORD] = -state.d_residual[P_CHORD] / d_res_d_phi;
        dphi[L_TWIST] = -state.d_residual[P_TWIST] / d_res_d_phi;
        dphi[L_VX] = -state.d_residual_vx / d_res_d_phi;
        dphi[L_VY] = -state.d_residual_vy / d_res_d_phi;
        dphi[L_R] = -state.d_residual[P_R] / d_res_d_phi;
        dphi[L_RHUB] = -state.d_residual[P_RHUB] / d_res_d_phi;
        dphi[L_RTIP] = -state.d_residual[P_RTIP] / d_res_d_phi;
        dphi[L_PITCH] = -state.d_residual[P_PITCH] / d_res_d_phi;

        // Total gradient of a partial-chained quantity: the explicit partial
        // plus its phi-sensitivity times the root motion.
        let total = |d: &Partials, j: usize| -> f64 {
            let explicit = match j {
                L_CHORD => d[P_CHORD],
                L_TWIST => d[P_TWIST],
                L_R => d[P_R],
                L_RHUB => d[P_RHUB],
                L_RTIP => d[P_RTIP],
                L_PITCH => d[P_PITCH],
                _ => 0.0,
            };
            explicit + d[P_PHI] * dphi[j]
        };

        let mut g = StationGrad::default();
        for j in 0..NLOCAL {
            let da = total(&state.d_a, j);
            let dap = total(&state.d_ap, j);
            let dcn = total(&state.d_cn, j);
            let dct = total(&state.d_ct, j);

            let mut dw2 = -2.0 * vx * vx * (1.0 - state.a) * da
                + 2.0 * vy * vy * (1.0 + state.ap) * dap;
            if j == L_VX {
                dw2 += 2.0 * vx * (1.0 - state.a) * (1.0 - state.a);
            }
            if j == L_VY {
                dw2 += 2.0 * vy * (1.0 + state.ap) * (1.0 + state.ap);
            }

            let chord_term = if j == L_CHORD { 0.5 * inputs.rho * w2 } else { 0.0 };
            g.np[j] = chord_term * state.cn + q_c * (dcn * w2 + state.cn * dw2);
            g.tp[j] = chord_term * state.ct + q_c * (dct * w2 + state.ct * dw2);
        }
        g
    });

    StationOutput {
        phi,
        a: state.a,
        ap: state.ap,
        cl: state.cl,
        cd: state.cd,
        w: w2.sqrt(),
        re,
        np,
        tp,
        status,
        grad,
    }
}

/* ----------------------------------- tests ---------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rotor_airfoils::Polar;
    use std::sync::OnceLock;

    fn lifting_polar() -> &'static PolarSet {
        static SET: OnceLock<PolarSet> = OnceLock::new();
        SET.get_or_init(|| {
            let alpha_deg: Vec<f64> = (-20..=20).map(f64::from).collect();
            let cl: Vec<f64> = alpha_deg
                .iter()
                .map(|a| 2.0 * PI * a.to_radians())
                .collect();
            let cd: Vec<f64> = alpha_deg
                .iter()
                .map(|a| 0.008 + 0.6 * a.to_radians().powi(2))
                .collect();
            let polar = Polar::new(alpha_deg, cl, cd, None).unwrap();
            PolarSet::single(&polar.extrapolated(1.3).unwrap()).unwrap()
        })
    }

    fn baseline<'a>() -> StationInputs<'a> {
        StationInputs {
            r: 30.0,
            chord: 3.5,
            twist: f64::to_radians(6.0),
            pitch: 0.0,
            vx: 10.0,
            vy: 36.0,
            rhub: 1.5,
            rtip: 63.0,
            blades: 3.0,
            rho: 1.225,
            mu: 1.81206e-5,
            rotating: true,
            polar: lifting_polar(),
        }
    }

    #[test]
    fn converges_in_windmill_bracket() {
        let out = solve(&baseline(), false);
        assert!(matches!(out.status, SolveStatus::Converged | SolveStatus::HighInduction));
        assert!(out.phi > 0.0 && out.phi < FRAC_PI_2);
        // momentum-region sanity
        assert!(out.a > 0.0 && out.a < 1.0, "a = {}", out.a);
        assert!(out.ap.abs() < 0.5, "ap = {}", out.ap);
        assert!(out.np > 0.0);
        assert!(out.re > 1e6);
    }

    #[test]
    fn residual_vanishes_at_reported_root() {
        let inputs = baseline();
        let out = solve(&inputs, false);
        let re = inputs.rho * inputs.chord * inputs.vx.hypot(inputs.vy) / inputs.mu;
        let res = induction(out.phi, &inputs, re, false).residual;
        assert!(res.abs() < 1e-8, "residual {res} at phi {}", out.phi);
    }

    #[test]
    fn parked_station_has_no_induction() {
        let inputs = StationInputs { rotating: false, vy: 0.5, ..baseline() };
        let out = solve(&inputs, false);
        assert_eq!(out.status, SolveStatus::Parked);
        assert_eq!(out.a, 0.0);
        assert_eq!(out.ap, 0.0);
        assert_relative_eq!(out.phi, inputs.vx.atan2(inputs.vy), epsilon = 1e-12);
    }

    fn fd_grad(mut bump: impl FnMut(&mut StationInputs<'static>, f64), h: f64) -> (f64, f64) {
        let mut plus = baseline();
        bump(&mut plus, h);
        let mut minus = baseline();
        bump(&mut minus, -h);
        let p = solve(&plus, false);
        let m = solve(&minus, false);
        ((p.np - m.np) / (2.0 * h), (p.tp - m.tp) / (2.0 * h))
    }

    #[test]
    fn load_gradients_match_finite_differences() {
        let out = solve(&baseline(), true);
        let g = out.grad.unwrap();

        let cases: Vec<(usize, (f64, f64))> = vec![
            (L_CHORD, fd_grad(|s, h| s.chord += h, 1e-6)),
            (L_TWIST, fd_grad(|s, h| s.twist += h, 1e-7)),
            (L_VX, fd_grad(|s, h| s.vx += h, 1e-6)),
            (L_VY, fd_grad(|s, h| s.vy += h, 1e-6)),
            (L_R, fd_grad(|s, h| s.r += h, 1e-5)),
            (L_RHUB, fd_grad(|s, h| s.rhub += h, 1e-6)),
            (L_RTIP, fd_grad(|s, h| s.rtip += h, 1e-5)),
            (L_PITCH, fd_grad(|s, h| s.pitch += h, 1e-7)),
        ];
        for (j, (fd_np, fd_tp)) in cases {
            assert_relative_eq!(g.np[j], fd_np, max_relative = 5e-4, epsilon = 1e-6);
            assert_relative_eq!(g.tp[j], fd_tp, max_relative = 5e-4, epsilon = 1e-6);
        }
    }

    #[test]
    fn parked_gradients_match_finite_differences() {
        let parked_inputs = StationInputs { rotating: false, ..baseline() };
        let g = solve(&parked_inputs, true).grad.unwrap();

        let fd = |bump: &dyn Fn(&mut StationInputs<'static>, f64), h: f64| -> (f64, f64) {
            let mut plus = parked_inputs;
            bump(&mut plus, h);
            let mut minus = parked_inputs;
            bump(&mut minus, -h);
            let p = solve(&plus, false);
            let m = solve(&minus, false);
            ((p.np - m.np) / (2.0 * h), (p.tp - m.tp) / (2.0 * h))
        };

        let cases: Vec<(usize, (f64, f64))> = vec![
            (L_CHORD, fd(&|s, h| s.chord += h, 1e-6)),
            (L_TWIST, fd(&|s, h| s.twist += h, 1e-7)),
            (L_VX, fd(&|s, h| s.vx += h, 1e-6)),
            (L_VY, fd(&|s, h| s.vy += h, 1e-6)),
            (L_PITCH, fd(&|s, h| s.pitch += h, 1e-7)),
        ];
        for (j, (fd_np, fd_tp)) in cases {
            assert_relative_eq!(g.np[j], fd_np, max_relative = 5e-4, epsilon = 1e-6);
            assert_relative_eq!(g.tp[j], fd_tp, max_relative = 5e-4, epsilon = 1e-6);
        }
        // radius and hub/tip do not enter the parked loads
        assert_eq!(g.np[L_R], 0.0);
        assert_eq!(g.np[L_RHUB], 0.0);
        assert_eq!(g.np[L_RTIP], 0.0);
    }

    #[test]
    fn propeller_brake_bracket_engages_for_reversed_torque() {
        // Strong negative twist near the tip drives the residual into the
        // fallback interval.
        let inputs = StationInputs {
            r: 62.0,
            twist: f64::to_radians(-35.0),
            vx: 4.0,
            vy: 75.0,
            ..baseline()
        };
        let out = solve(&inputs, false);
        assert!(out.phi.is_finite());
        assert!(out.np.is_finite() && out.tp.is_finite());
    }

    #[test]
    fn brake_bracket_gate_reads_the_negative_branch() {
        // Reversed-torque state with no sign change on [eps, pi/2]: the
        // bracket choice hinges on the phi <= 0 residual formula, which
        // differs from the phi > 0 one.
        let inputs = StationInputs {
            r: 62.0,
            twist: f64::to_radians(-35.0),
            vx: 4.0,
            vy: 75.0,
            ..baseline()
        };
        let w0 = inputs.vx.hypot(inputs.vy);
        let re = inputs.rho * inputs.chord * w0 / inputs.mu;
        let f = |phi: f64| induction(phi, &inputs, re, false).residual;

        assert!(f(PHI_EPS) * f(FRAC_PI_2) > 0.0, "primary bracket must fail");
        assert!(f(-PHI_EPS) > 0.0 && f(-FRAC_PI_4) < 0.0);

        let out = solve(&inputs, false);
        assert_eq!(out.status, SolveStatus::Converged);
        assert!(out.phi > -FRAC_PI_4 && out.phi < 0.0, "phi = {}", out.phi);
        assert!(f(out.phi).abs() < 1e-8, "residual {} at root", f(out.phi));
    }
}
