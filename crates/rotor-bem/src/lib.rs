//! rotor-bem
//!
//! Blade-element/momentum solver for horizontal-axis rotors:
//! - distributed normal/tangential loads along the blade for one azimuth
//! - azimuthally averaged thrust, torque, root flap moment, and power (or
//!   their nondimensional coefficients) across a set of operating points
//! - analytic gradients of everything above with respect to the blade
//!   description and the operating inputs, assembled from the implicit
//!   function theorem at each station plus forward-mode integration sweeps
//!
//! Inputs are in user units: metres, degrees, RPM. Construction validates
//! the blade description and returns [`ConfigError`]; runtime queries never
//! fail and propagate NaN from degenerate data instead.

use std::sync::Arc;

use rotor_airfoils::PolarSet;
use rotor_core::{deg_to_rad, rad_to_deg, rpm_to_rad_s, PER_DEG, PER_RPM};

mod derivs;
mod geometry;
mod integrate;
mod station;
mod wind;

pub use derivs::{DistributedDerivs, LoadDerivs, PerfDerivs, PerformanceDerivs};
pub use station::SolveStatus;

use geometry::{resolve, resolve_directional, SpanSeed};
use integrate::{blade_totals, blade_totals_directional, BladeTotals};
use station::{
    StationInputs, L_CHORD, L_PITCH, L_R, L_RHUB, L_RTIP, L_TWIST, L_VX, L_VY, NLOCAL,
};
use wind::{SectionWindGrad, WindInputs};

/// Fraction of the span by which a station coincident with the hub or tip
/// radius is pulled inboard/outboard. The loss factor is singular exactly at
/// the ends; the nudge keeps the solve regular while the derivative
/// assembly charges the moved station to `rhub`/`rtip` instead of `r`.
const END_NUDGE: f64 = 1e-4;

/// Blade-description or environment validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("blade arrays must share one length (r has {expected}, {name} has {got})")]
    LengthMismatch {
        expected: usize,
        name: &'static str,
        got: usize,
    },
    #[error("at least two blade stations are required, got {got}")]
    TooFewStations { got: usize },
    #[error("station radii must be finite and strictly increasing")]
    NonIncreasingRadii,
    #[error("station {index} at r = {r} lies outside the span [{rhub}, {rtip}]")]
    RadiusOutsideSpan {
        index: usize,
        r: f64,
        rhub: f64,
        rtip: f64,
    },
    #[error("tip radius {rtip} must exceed hub radius {rhub}")]
    InvalidSpan { rhub: f64, rtip: f64 },
    #[error("{name} must be positive")]
    NonPositive { name: &'static str },
}

/// Air state and rotor placement shared by every operating point.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Environment {
    /// Air density, kg/m^3.
    pub rho: f64,
    /// Dynamic viscosity, Pa s.
    pub mu: f64,
    /// Shaft tilt, degrees.
    pub tilt_deg: f64,
    /// Yaw misalignment, degrees.
    pub yaw_deg: f64,
    /// Power-law wind shear exponent.
    pub shear_exp: f64,
    /// Hub height above ground, m.
    pub hub_height: f64,
}

impl Default for Environment {
    fn default() -> Self {
        // Sea-level air, no shear, axis-aligned inflow.
        Self {
            rho: 1.225,
            mu: 1.81206e-5,
            tilt_deg: 0.0,
            yaw_deg: 0.0,
            shear_exp: 0.0,
            hub_height: 100.0,
        }
    }
}

/// Blade description in user units. Twist and precone in degrees; radii,
/// chord, curve, and sweep in metres.
#[derive(Clone, Debug)]
pub struct RotorGeometry {
    pub r: Vec<f64>,
    pub chord: Vec<f64>,
    pub twist_deg: Vec<f64>,
    /// One polar set per station; stations may share via `Arc`.
    pub airfoils: Vec<Arc<PolarSet>>,
    pub rhub: f64,
    pub rtip: f64,
    pub blades: u32,
    pub precone_deg: f64,
    /// Out-of-plane offset per station; `None` means a straight blade.
    pub precurve: Option<Vec<f64>>,
    /// In-plane offset per station; `None` means a straight blade.
    pub presweep: Option<Vec<f64>>,
    /// Out-of-plane offset at the very tip, beyond the last station.
    pub precurve_tip: f64,
    /// In-plane offset at the very tip.
    pub presweep_tip: f64,
}

/// One operating point for [`Rotor::evaluate`].
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OperatingPoint {
    /// Hub-height free-stream speed, m/s.
    pub uinf: f64,
    /// Rotor speed, RPM. Zero means parked.
    pub omega_rpm: f64,
    /// Collective blade pitch, degrees.
    pub pitch_deg: f64,
}

/// Per-station loads and induction state at one azimuth.
#[derive(Clone, Debug)]
pub struct DistributedLoads {
    /// Normal force per unit span, N/m.
    pub np: Vec<f64>,
    /// Tangential force per unit span, N/m.
    pub tp: Vec<f64>,
    /// Axial induction factor.
    pub a: Vec<f64>,
    /// Tangential induction factor.
    pub ap: Vec<f64>,
    /// Inflow angle, degrees.
    pub phi_deg: Vec<f64>,
    /// Local inflow speed including induction, m/s.
    pub w: Vec<f64>,
    /// Station Reynolds number.
    pub re: Vec<f64>,
    pub status: Vec<SolveStatus>,
    /// Present when the rotor was built with derivatives enabled.
    pub derivs: Option<DistributedDerivs>,
}

/// Azimuthally averaged rotor outputs per operating point. With
/// `coefficients` the fields hold CP, CT, CQ, and CM instead of the
/// dimensional values.
#[derive(Clone, Debug)]
pub struct RotorPerformance {
    /// W, or CP.
    pub power: Vec<f64>,
    /// N, or CT.
    pub thrust: Vec<f64>,
    /// N m, or CQ.
    pub torque: Vec<f64>,
    /// Root flap bending moment, N m, or CM.
    pub moment: Vec<f64>,
    /// Present when the rotor was built with derivatives enabled.
    pub derivs: Option<PerformanceDerivs>,
}

/// A validated rotor ready for repeated evaluation. Immutable; evaluations
/// at different operating points are independent.
#[derive(Clone, Debug)]
pub struct Rotor {
    r: Vec<f64>,
    chord: Vec<f64>,
    /// Radians.
    twist: Vec<f64>,
    airfoils: Vec<Arc<PolarSet>>,
    rhub: f64,
    rtip: f64,
    blades: f64,
    precone_deg: f64,
    precurve: Vec<f64>,
    presweep: Vec<f64>,
    precurve_tip: f64,
    presweep_tip: f64,
    env: Environment,
    n_sectors: usize,
    derivatives: bool,
    hub_nudged: bool,
    tip_nudged: bool,
}

impl Rotor {
    /// Validate a blade description.
    ///
    /// `n_sectors` is the azimuthal resolution of [`Rotor::evaluate`];
    /// `derivatives` enables gradient assembly on every query. A first or
    /// last station lying on (or within a span fraction of) the hub or tip
    /// radius is nudged off the singular endpoint; its sensitivity then
    /// belongs to `rhub`/`rtip` rather than to the station radius.
    pub fn new(
        geometry: RotorGeometry,
        env: Environment,
        n_sectors: usize,
        derivatives: bool,
    ) -> Result<Self, ConfigError> {
        let n = geometry.r.len();
        if n < 2 {
            return Err(ConfigError::TooFewStations { got: n });
        }
        let check_len = |name: &'static str, got: usize| {
            if got == n {
                Ok(())
            } else {
                Err(ConfigError::LengthMismatch { expected: n, name, got })
            }
        };
        check_len("chord", geometry.chord.len())?;
        check_len("twist", geometry.twist_deg.len())?;
        check_len("airfoils", geometry.airfoils.len())?;
        if let Some(pc) = &geometry.precurve {
            check_len("precurve", pc.len())?;
        }
        if let Some(ps) = &geometry.presweep {
            check_len("presweep", ps.len())?;
        }

        let positive = |name: &'static str, v: f64| {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::NonPositive { name })
            }
        };
        positive("rho", env.rho)?;
        positive("mu", env.mu)?;
        positive("hub height", env.hub_height)?;
        positive("blade count", f64::from(geometry.blades))?;
        positive("sector count", n_sectors as f64)?;
        for c in &geometry.chord {
            positive("chord", *c)?;
        }

        if !(geometry.rtip.is_finite() && geometry.rhub.is_finite())
            || geometry.rtip <= geometry.rhub
            || geometry.rhub < 0.0
        {
            return Err(ConfigError::InvalidSpan { rhub: geometry.rhub, rtip: geometry.rtip });
        }
        if geometry.r.iter().any(|r| !r.is_finite()) {
            return Err(ConfigError::NonIncreasingRadii);
        }
        for w in geometry.r.windows(2) {
            if w[1] <= w[0] {
                return Err(ConfigError::NonIncreasingRadii);
            }
        }
        for (index, &r) in geometry.r.iter().enumerate() {
            if r < geometry.rhub || r > geometry.rtip {
                return Err(ConfigError::RadiusOutsideSpan {
                    index,
                    r,
                    rhub: geometry.rhub,
                    rtip: geometry.rtip,
                });
            }
        }

        let mut r = geometry.r;
        let span = geometry.rtip - geometry.rhub;
        let hub_nudged = r[0] - geometry.rhub < END_NUDGE * span;
        if hub_nudged {
            r[0] = geometry.rhub + END_NUDGE * span;
        }
        let tip_nudged = geometry.rtip - r[n - 1] < END_NUDGE * span;
        if tip_nudged {
            r[n - 1] = geometry.rtip - END_NUDGE * span;
        }
        for w in r.windows(2) {
            if w[1] <= w[0] {
                return Err(ConfigError::NonIncreasingRadii);
            }
        }

        Ok(Self {
            r,
            chord: geometry.chord,
            twist: geometry.twist_deg.iter().map(|t| deg_to_rad(*t)).collect(),
            airfoils: geometry.airfoils,
            rhub: geometry.rhub,
            rtip: geometry.rtip,
            blades: f64::from(geometry.blades),
            precone_deg: geometry.precone_deg,
            precurve: geometry.precurve.unwrap_or_else(|| vec![0.0; n]),
            presweep: geometry.presweep.unwrap_or_else(|| vec![0.0; n]),
            precurve_tip: geometry.precurve_tip,
            presweep_tip: geometry.presweep_tip,
            env,
            n_sectors,
            derivatives,
            hub_nudged,
            tip_nudged,
        })
    }

    /// Station count.
    #[must_use]
    pub fn stations(&self) -> usize {
        self.r.len()
    }

    /// Station radii after any endpoint nudging, m.
    #[must_use]
    pub fn radii(&self) -> &[f64] {
        &self.r
    }

    /* --------------------------- distributed loads --------------------------- */

    /// Section loads along the blade at one operating point and azimuth.
    ///
    /// Each station is an independent induction solve; the returned bundle
    /// carries the gradients when the rotor was built with derivatives.
    #[must_use]
    pub fn distributed_aero_loads(
        &self,
        uinf: f64,
        omega_rpm: f64,
        pitch_deg: f64,
        azimuth_deg: f64,
    ) -> DistributedLoads {
        let n = self.r.len();
        let rotating = omega_rpm != 0.0;
        let pitch = deg_to_rad(pitch_deg);

        let mut out = DistributedLoads {
            np: Vec::with_capacity(n),
            tp: Vec::with_capacity(n),
            a: Vec::with_capacity(n),
            ap: Vec::with_capacity(n),
            phi_deg: Vec::with_capacity(n),
            w: Vec::with_capacity(n),
            re: Vec::with_capacity(n),
            status: Vec::with_capacity(n),
            derivs: self.derivatives.then(|| DistributedDerivs {
                np: LoadDerivs::zeros(n, rotating),
                tp: LoadDerivs::zeros(n, rotating),
            }),
        };

        for i in 0..n {
            let sw = wind::section_wind(
                &WindInputs {
                    r: self.r[i],
                    precurve: self.precurve[i],
                    presweep: self.presweep[i],
                    precone_deg: self.precone_deg,
                    tilt_deg: self.env.tilt_deg,
                    yaw_deg: self.env.yaw_deg,
                    azimuth_deg,
                    uinf,
                    omega_rpm,
                    hub_height: self.env.hub_height,
                    shear_exp: self.env.shear_exp,
                },
                self.derivatives,
            );
            let st = station::solve(
                &StationInputs {
                    r: self.r[i],
                    chord: self.chord[i],
                    twist: self.twist[i],
                    pitch,
                    vx: sw.vx,
                    vy: sw.vy,
                    rhub: self.rhub,
                    rtip: self.rtip,
                    blades: self.blades,
                    rho: self.env.rho,
                    mu: self.env.mu,
                    rotating,
                    polar: &self.airfoils[i],
                },
                self.derivatives,
            );

            out.np.push(st.np);
            out.tp.push(st.tp);
            out.a.push(st.a);
            out.ap.push(st.ap);
            out.phi_deg.push(rad_to_deg(st.phi));
            out.w.push(st.w);
            out.re.push(st.re);
            out.status.push(st.status);

            if let (Some(derivs), Some(grad), Some(wg)) =
                (out.derivs.as_mut(), st.grad.as_ref(), sw.grad.as_ref())
            {
                self.fill_row(&mut derivs.np, i, &grad.np, wg);
                self.fill_row(&mut derivs.tp, i, &grad.tp, wg);
            }
        }
        out
    }

    /// Chain one station's local gradients through the inflow partials and
    /// the endpoint-nudge bookkeeping into row `i` of a bundle.
    fn fill_row(&self, d: &mut LoadDerivs, i: usize, g: &[f64; NLOCAL], wg: &SectionWindGrad) {
        let n = self.r.len();
        let vel = |p: [f64; 2]| g[L_VX] * p[0] + g[L_VY] * p[1];
        let dr_total = g[L_R] + vel(wg.r);

        let nudged = (i == 0 && self.hub_nudged) || (i == n - 1 && self.tip_nudged);
        d.r[(i, i)] = if nudged { 0.0 } else { dr_total };
        d.chord[(i, i)] = g[L_CHORD];
        d.twist[(i, i)] = g[L_TWIST] * PER_DEG;
        d.precurve[(i, i)] = vel(wg.precurve);
        d.presweep[(i, i)] = vel(wg.presweep);

        let mut rhub = g[L_RHUB];
        let mut rtip = g[L_RTIP];
        if i == 0 && self.hub_nudged {
            rhub += dr_total * (1.0 - END_NUDGE);
            rtip += dr_total * END_NUDGE;
        }
        if i == n - 1 && self.tip_nudged {
            rtip += dr_total * (1.0 - END_NUDGE);
            rhub += dr_total * END_NUDGE;
        }
        d.rhub[i] = rhub;
        d.rtip[i] = rtip;

        d.precone[i] = vel(wg.precone);
        d.tilt[i] = vel(wg.tilt);
        d.yaw[i] = vel(wg.yaw);
        d.azimuth[i] = vel(wg.azimuth);
        d.hub_height[i] = vel(wg.hub_height);
        d.shear[i] = vel(wg.shear);
        d.uinf[i] = vel(wg.uinf);
        if let Some(omega) = d.omega.as_mut() {
            omega[i] = vel(wg.omega);
        }
        d.pitch[i] = g[L_PITCH] * PER_DEG;
    }

    /* ------------------------- integrated performance ------------------------ */

    /// Azimuthally averaged performance across operating points.
    ///
    /// Each point is independent: thrust, torque, root flap moment, and
    /// power (torque times rotor speed), averaged over `n_sectors` equally
    /// spaced blade azimuths. With `coefficients` the outputs and their
    /// gradients are nondimensionalized by the hub-height dynamic pressure
    /// and the projected rotor disc.
    #[must_use]
    pub fn evaluate(&self, points: &[OperatingPoint], coefficients: bool) -> RotorPerformance {
        let n = self.r.len();
        let m = points.len();
        let any_rotating = points.iter().any(|p| p.omega_rpm != 0.0);

        let mut perf = RotorPerformance {
            power: vec![0.0; m],
            thrust: vec![0.0; m],
            torque: vec![0.0; m],
            moment: vec![0.0; m],
            derivs: self.derivatives.then(|| PerformanceDerivs {
                power: PerfDerivs::zeros(m, n, any_rotating),
                thrust: PerfDerivs::zeros(m, n, any_rotating),
                torque: PerfDerivs::zeros(m, n, any_rotating),
                moment: PerfDerivs::zeros(m, n, any_rotating),
            }),
        };

        for (j, pt) in points.iter().enumerate() {
            let (totals, acc) = self.condition_totals(pt);
            let omega = rpm_to_rad_s(pt.omega_rpm);
            perf.thrust[j] = totals.thrust;
            perf.torque[j] = totals.torque;
            perf.moment[j] = totals.moment;
            perf.power[j] = totals.torque * omega;

            if let (Some(d), Some(acc)) = (perf.derivs.as_mut(), acc) {
                acc.thrust.write_into(&mut d.thrust, j);
                acc.torque.write_into(&mut d.torque, j);
                acc.moment.write_into(&mut d.moment, j);
                // power = torque * omega, in consistent units; a parked
                // condition keeps its whole row zero, matching the
                // omitted rotor-speed direction
                let mut power_acc = acc.torque;
                power_acc.scale(omega);
                if pt.omega_rpm != 0.0 {
                    power_acc.omega += totals.torque * PER_RPM;
                }
                power_acc.write_into(&mut d.power, j);
            }
        }

        if coefficients {
            self.nondimensionalize(points, &mut perf);
        }
        perf
    }

    /// One condition's sector-averaged totals and derivative accumulators.
    fn condition_totals(&self, pt: &OperatingPoint) -> (BladeTotals, Option<ConditionAcc>) {
        let n = self.r.len();
        let nfull = n + 2;
        let precone = deg_to_rad(self.precone_deg);
        let inv_sectors = 1.0 / self.n_sectors as f64;

        let mut totals = BladeTotals::default();
        let mut acc = self.derivatives.then(|| ConditionAcc::new(n));

        // Hub and tip closure stations carry zero load; the tip picks up the
        // extra out-of-plane/in-plane extension beyond the last station.
        let mut r_full = vec![0.0; nfull];
        let mut curve_full = vec![0.0; nfull];
        let mut sweep_full = vec![0.0; nfull];
        r_full[0] = self.rhub;
        r_full[nfull - 1] = self.rtip;
        curve_full[nfull - 1] = self.precurve_tip;
        sweep_full[nfull - 1] = self.presweep_tip;
        for i in 0..n {
            r_full[i + 1] = self.r[i];
            curve_full[i + 1] = self.precurve[i];
            sweep_full[i + 1] = self.presweep[i];
        }

        let mut np_full = vec![0.0; nfull];
        let mut tp_full = vec![0.0; nfull];

        for sector in 0..self.n_sectors {
            let azimuth = 360.0 * sector as f64 * inv_sectors;
            let loads = self.distributed_aero_loads(pt.uinf, pt.omega_rpm, pt.pitch_deg, azimuth);
            np_full[1..=n].copy_from_slice(&loads.np);
            tp_full[1..=n].copy_from_slice(&loads.tp);

            let geom = resolve(&r_full, &curve_full, &sweep_full, precone);
            let t = blade_totals(&np_full, &tp_full, &geom, self.blades);
            totals.thrust += t.thrust * inv_sectors;
            totals.torque += t.torque * inv_sectors;
            totals.moment += t.moment * inv_sectors;

            let (Some(acc), Some(ld)) = (acc.as_mut(), loads.derivs.as_ref()) else {
                continue;
            };

            let zeros = vec![0.0; nfull];
            let mut d_np = vec![0.0; nfull];
            let mut d_tp = vec![0.0; nfull];
            let mut d_geo = vec![0.0; nfull];

            // Forward sweep along one input direction: station load deltas
            // plus, where the input moves the blade axis, a geometry seed.
            macro_rules! jvp {
                ($d_r:expr, $d_curve:expr, $d_sweep:expr, $d_precone:expr) => {{
                    let seed = SpanSeed {
                        d_r: $d_r,
                        d_precurve: $d_curve,
                        d_presweep: $d_sweep,
                        d_precone: $d_precone,
                    };
                    let delta =
                        resolve_directional(&r_full, &curve_full, &sweep_full, precone, &geom, &seed);
                    blade_totals_directional(
                        &np_full, &tp_full, &d_np, &d_tp, &geom, &delta, self.blades,
                    )
                }};
            }

            // Distributed inputs: one seed per station.
            for i in 0..n {
                d_np[i + 1] = ld.np.chord[(i, i)];
                d_tp[i + 1] = ld.tp.chord[(i, i)];
                let t = jvp!(&zeros, &zeros, &zeros, 0.0);
                acc.add_station(|a| &mut a.chord[i], &t, inv_sectors);

                d_np[i + 1] = ld.np.twist[(i, i)];
                d_tp[i + 1] = ld.tp.twist[(i, i)];
                let t = jvp!(&zeros, &zeros, &zeros, 0.0);
                acc.add_station(|a| &mut a.twist[i], &t, inv_sectors);

                d_np[i + 1] = ld.np.r[(i, i)];
                d_tp[i + 1] = ld.tp.r[(i, i)];
                // a nudged end station no longer follows its own radius
                let pinned = (i == 0 && self.hub_nudged) || (i == n - 1 && self.tip_nudged);
                d_geo[i + 1] = if pinned { 0.0 } else { 1.0 };
                let t = jvp!(&d_geo, &zeros, &zeros, 0.0);
                acc.add_station(|a| &mut a.r[i], &t, inv_sectors);
                d_geo[i + 1] = 0.0;

                d_np[i + 1] = ld.np.precurve[(i, i)];
                d_tp[i + 1] = ld.tp.precurve[(i, i)];
                d_geo[i + 1] = 1.0;
                let t = jvp!(&zeros, &d_geo, &zeros, 0.0);
                acc.add_station(|a| &mut a.precurve[i], &t, inv_sectors);
                d_geo[i + 1] = 0.0;

                d_np[i + 1] = ld.np.presweep[(i, i)];
                d_tp[i + 1] = ld.tp.presweep[(i, i)];
                d_geo[i + 1] = 1.0;
                let t = jvp!(&zeros, &zeros, &d_geo, 0.0);
                acc.add_station(|a| &mut a.presweep[i], &t, inv_sectors);
                d_geo[i + 1] = 0.0;

                d_np[i + 1] = 0.0;
                d_tp[i + 1] = 0.0;
            }

            // Scalar inputs: the full station columns move together.
            let mut scalar = |np_col: Option<&nalgebra::DVector<f64>>,
                              tp_col: Option<&nalgebra::DVector<f64>>,
                              d_r: &[f64],
                              d_curve: &[f64],
                              d_sweep: &[f64],
                              d_precone: f64|
             -> BladeTotals {
                for i in 0..n {
                    d_np[i + 1] = np_col.map_or(0.0, |c| c[i]);
                    d_tp[i + 1] = tp_col.map_or(0.0, |c| c[i]);
                }
                let seed = SpanSeed {
                    d_r,
                    d_precurve: d_curve,
                    d_presweep: d_sweep,
                    d_precone,
                };
                let delta =
                    resolve_directional(&r_full, &curve_full, &sweep_full, precone, &geom, &seed);
                blade_totals_directional(
                    &np_full, &tp_full, &d_np, &d_tp, &geom, &delta, self.blades,
                )
            };

            // Hub radius moves the hub closure, plus any nudged end station.
            d_geo[0] = 1.0;
            d_geo[1] = if self.hub_nudged { 1.0 - END_NUDGE } else { 0.0 };
            d_geo[n] += if self.tip_nudged { END_NUDGE } else { 0.0 };
            let t = scalar(Some(&ld.np.rhub), Some(&ld.tp.rhub), &d_geo, &zeros, &zeros, 0.0);
            acc.add_scalar(|a| &mut a.rhub, &t, inv_sectors);
            d_geo[0] = 0.0;
            d_geo[1] = 0.0;
            d_geo[n] = 0.0;

            d_geo[nfull - 1] = 1.0;
            d_geo[n] = if self.tip_nudged { 1.0 - END_NUDGE } else { 0.0 };
            d_geo[1] += if self.hub_nudged { END_NUDGE } else { 0.0 };
            let t = scalar(Some(&ld.np.rtip), Some(&ld.tp.rtip), &d_geo, &zeros, &zeros, 0.0);
            acc.add_scalar(|a| &mut a.rtip, &t, inv_sectors);
            d_geo[nfull - 1] = 0.0;
            d_geo[n] = 0.0;
            d_geo[1] = 0.0;

            let t = scalar(
                Some(&ld.np.precone),
                Some(&ld.tp.precone),
                &zeros,
                &zeros,
                &zeros,
                PER_DEG,
            );
            acc.add_scalar(|a| &mut a.precone, &t, inv_sectors);

            // Tip extensions never enter the station solves.
            d_geo[nfull - 1] = 1.0;
            let t = scalar(None, None, &zeros, &d_geo, &zeros, 0.0);
            acc.add_scalar(|a| &mut a.precurve_tip, &t, inv_sectors);
            let t = scalar(None, None, &zeros, &zeros, &d_geo, 0.0);
            acc.add_scalar(|a| &mut a.presweep_tip, &t, inv_sectors);
            d_geo[nfull - 1] = 0.0;

            let load_only = [
                (&ld.np.tilt, &ld.tp.tilt, Slot::Tilt),
                (&ld.np.yaw, &ld.tp.yaw, Slot::Yaw),
                (&ld.np.hub_height, &ld.tp.hub_height, Slot::HubHeight),
                (&ld.np.shear, &ld.tp.shear, Slot::Shear),
                (&ld.np.uinf, &ld.tp.uinf, Slot::Uinf),
                (&ld.np.pitch, &ld.tp.pitch, Slot::Pitch),
            ];
            for (np_col, tp_col, slot) in load_only {
                let t = scalar(Some(np_col), Some(tp_col), &zeros, &zeros, &zeros, 0.0);
                acc.add_scalar(|a| slot.of(a), &t, inv_sectors);
            }
            if let (Some(np_col), Some(tp_col)) = (ld.np.omega.as_ref(), ld.tp.omega.as_ref()) {
                let t = scalar(Some(np_col), Some(tp_col), &zeros, &zeros, &zeros, 0.0);
                acc.add_scalar(|a| &mut a.omega, &t, inv_sectors);
            }
        }

        (totals, acc)
    }

    /// Convert dimensional performance and derivatives to CP/CT/CQ/CM.
    fn nondimensionalize(&self, points: &[OperatingPoint], perf: &mut RotorPerformance) {
        let precone = deg_to_rad(self.precone_deg);
        let (sin_c, cos_c) = precone.sin_cos();
        // Projected tip radius including the tip extension.
        let radius = self.rtip * cos_c + self.precurve_tip * sin_c;
        let dradius_drtip = cos_c;
        let dradius_dprecone = (-self.rtip * sin_c + self.precurve_tip * cos_c) * PER_DEG;
        let dradius_dcurvetip = sin_c;
        let area = std::f64::consts::PI * radius * radius;

        // (radius power, uinf power) in the reference denominator
        let norm = |vals: &mut [f64],
                    d: Option<&mut PerfDerivs>,
                    r_pow: f64,
                    u_pow: f64| {
            let mut denoms = Vec::with_capacity(points.len());
            for (j, pt) in points.iter().enumerate() {
                let q = 0.5 * self.env.rho * pt.uinf * pt.uinf;
                let denom = q * area * radius.powf(r_pow) * pt.uinf.powf(u_pow);
                vals[j] /= denom;
                denoms.push(denom);
            }
            let Some(d) = d else { return };
            for (j, pt) in points.iter().enumerate() {
                let inv = 1.0 / denoms[j];
                for mat in [
                    &mut d.r,
                    &mut d.chord,
                    &mut d.twist,
                    &mut d.precurve,
                    &mut d.presweep,
                ] {
                    mat.row_mut(j).scale_mut(inv);
                }
                for vec in [
                    &mut d.rhub,
                    &mut d.rtip,
                    &mut d.precone,
                    &mut d.tilt,
                    &mut d.yaw,
                    &mut d.hub_height,
                    &mut d.shear,
                    &mut d.precurve_tip,
                    &mut d.presweep_tip,
                ] {
                    vec[j] *= inv;
                }
                d.uinf.row_mut(j).scale_mut(inv);
                d.pitch.row_mut(j).scale_mut(inv);
                if let Some(omega) = d.omega.as_mut() {
                    omega.row_mut(j).scale_mut(inv);
                }

                // denominator sensitivities: log-derivative corrections
                let c = vals[j];
                let dr_factor = (2.0 + r_pow) / radius;
                d.uinf[(j, j)] -= c * (2.0 + u_pow) / pt.uinf;
                d.rtip[j] -= c * dr_factor * dradius_drtip;
                d.precone[j] -= c * dr_factor * dradius_dprecone;
                d.precurve_tip[j] -= c * dr_factor * dradius_dcurvetip;
            }
        };

        let d = perf.derivs.as_mut();
        let (dp, dt, dq, dm) = match d {
            Some(PerformanceDerivs { power, thrust, torque, moment }) => {
                (Some(power), Some(thrust), Some(torque), Some(moment))
            }
            None => (None, None, None, None),
        };
        norm(&mut perf.power, dp, 0.0, 1.0);
        norm(&mut perf.thrust, dt, 0.0, 0.0);
        norm(&mut perf.torque, dq, 1.0, 0.0);
        norm(&mut perf.moment, dm, 1.0, 0.0);
    }
}

/* ------------------------ derivative accumulators ------------------------ */

/// Per-direction sensitivities of one integrated scalar for one condition.
#[derive(Clone)]
struct DirAcc {
    r: Vec<f64>,
    chord: Vec<f64>,
    twist: Vec<f64>,
    precurve: Vec<f64>,
    presweep: Vec<f64>,
    rhub: f64,
    rtip: f64,
    precone: f64,
    tilt: f64,
    yaw: f64,
    hub_height: f64,
    shear: f64,
    precurve_tip: f64,
    presweep_tip: f64,
    uinf: f64,
    omega: f64,
    pitch: f64,
}

impl DirAcc {
    fn new(n: usize) -> Self {
        Self {
            r: vec![0.0; n],
            chord: vec![0.0; n],
            twist: vec![0.0; n],
            precurve: vec![0.0; n],
            presweep: vec![0.0; n],
            rhub: 0.0,
            rtip: 0.0,
            precone: 0.0,
            tilt: 0.0,
            yaw: 0.0,
            hub_height: 0.0,
            shear: 0.0,
            precurve_tip: 0.0,
            presweep_tip: 0.0,
            uinf: 0.0,
            omega: 0.0,
            pitch: 0.0,
        }
    }

    fn scale(&mut self, factor: f64) {
        for v in [
            &mut self.r,
            &mut self.chord,
            &mut self.twist,
            &mut self.precurve,
            &mut self.presweep,
        ] {
            for x in v.iter_mut() {
                *x *= factor;
            }
        }
        for x in [
            &mut self.rhub,
            &mut self.rtip,
            &mut self.precone,
            &mut self.tilt,
            &mut self.yaw,
            &mut self.hub_height,
            &mut self.shear,
            &mut self.precurve_tip,
            &mut self.presweep_tip,
            &mut self.uinf,
            &mut self.omega,
            &mut self.pitch,
        ] {
            *x *= factor;
        }
    }

    /// Copy this condition's accumulated row into the bundle.
    fn write_into(&self, d: &mut PerfDerivs, j: usize) {
        let n = self.r.len();
        for i in 0..n {
            d.r[(j, i)] = self.r[i];
            d.chord[(j, i)] = self.chord[i];
            d.twist[(j, i)] = self.twist[i];
            d.precurve[(j, i)] = self.precurve[i];
            d.presweep[(j, i)] = self.presweep[i];
        }
        d.rhub[j] = self.rhub;
        d.rtip[j] = self.rtip;
        d.precone[j] = self.precone;
        d.tilt[j] = self.tilt;
        d.yaw[j] = self.yaw;
        d.hub_height[j] = self.hub_height;
        d.shear[j] = self.shear;
        d.precurve_tip[j] = self.precurve_tip;
        d.presweep_tip[j] = self.presweep_tip;
        d.uinf[(j, j)] = self.uinf;
        if let Some(omega) = d.omega.as_mut() {
            omega[(j, j)] = self.omega;
        }
        d.pitch[(j, j)] = self.pitch;
    }
}

/// Thrust/torque/moment accumulators for one operating condition.
struct ConditionAcc {
    thrust: DirAcc,
    torque: DirAcc,
    moment: DirAcc,
}

impl ConditionAcc {
    fn new(n: usize) -> Self {
        Self { thrust: DirAcc::new(n), torque: DirAcc::new(n), moment: DirAcc::new(n) }
    }

    fn add_station(
        &mut self,
        slot: impl Fn(&mut DirAcc) -> &mut f64,
        t: &BladeTotals,
        weight: f64,
    ) {
        *slot(&mut self.thrust) += t.thrust * weight;
        *slot(&mut self.torque) += t.torque * weight;
        *slot(&mut self.moment) += t.moment * weight;
    }

    fn add_scalar(
        &mut self,
        slot: impl Fn(&mut DirAcc) -> &mut f64,
        t: &BladeTotals,
        weight: f64,
    ) {
        self.add_station(slot, t, weight);
    }
}

/// Scalar slots addressed uniformly in the load-only sweep.
#[derive(Clone, Copy)]
enum Slot {
    Tilt,
    Yaw,
    HubHeight,
    Shear,
    Uinf,
    Pitch,
}

impl Slot {
    fn of(self, a: &mut DirAcc) -> &mut f64 {
        match self {
            Slot::Tilt => &mut a.tilt,
            Slot::Yaw => &mut a.yaw,
            Slot::HubHeight => &mut a.hub_height,
            Slot::Shear => &mut a.shear,
            Slot::Uinf => &mut a.uinf,
            Slot::Pitch => &mut a.pitch,
        }
    }
}
