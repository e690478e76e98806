//! Span integration of section loads into rotor thrust, torque, and root
//! flap moment.
//!
//! Integrands follow the blade axis arc length with the local cone angle
//! projecting the normal load onto the shaft axis and the azimuthal `z`
//! lever arm weighting the tangential load for torque. The directional form
//! mirrors the arithmetic so integrated-load derivatives reuse the station
//! and geometry perturbations unchanged.

use rotor_core::{trapz, trapz_directional};

use crate::geometry::{SpanGeometry, SpanGeometryDelta};

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct BladeTotals {
    /// Thrust, N.
    pub thrust: f64,
    /// Shaft torque, N m.
    pub torque: f64,
    /// Root flap bending moment, N m.
    pub moment: f64,
}

/// Integrate per-span loads (already extended with the zero-load hub and tip
/// closure stations) over the resolved blade axis.
pub(crate) fn blade_totals(
    np: &[f64],
    tp: &[f64],
    geom: &SpanGeometry,
    blades: f64,
) -> BladeTotals {
    let n = np.len();
    let mut thrust_integrand = Vec::with_capacity(n);
    let mut torque_integrand = Vec::with_capacity(n);
    let mut moment_integrand = Vec::with_capacity(n);
    for i in 0..n {
        let axial = np[i] * geom.cone[i].cos();
        thrust_integrand.push(axial);
        torque_integrand.push(tp[i] * geom.z_az[i]);
        moment_integrand.push(axial * (geom.s[i] - geom.s[0]));
    }
    BladeTotals {
        thrust: blades * trapz(&thrust_integrand, &geom.s),
        torque: blades * trapz(&torque_integrand, &geom.s),
        moment: blades * trapz(&moment_integrand, &geom.s),
    }
}

/// Directional derivative of [`blade_totals`] given load and geometry
/// perturbations along one input direction.
pub(crate) fn blade_totals_directional(
    np: &[f64],
    tp: &[f64],
    d_np: &[f64],
    d_tp: &[f64],
    geom: &SpanGeometry,
    delta: &SpanGeometryDelta,
    blades: f64,
) -> BladeTotals {
    let n = np.len();
    let mut f = Vec::with_capacity(n);
    let mut df = Vec::with_capacity(n);
    let mut g = Vec::with_capacity(n);
    let mut dg = Vec::with_capacity(n);
    let mut m = Vec::with_capacity(n);
    let mut dm = Vec::with_capacity(n);
    for i in 0..n {
        let (sin_c, cos_c) = geom.cone[i].sin_cos();
        let axial = np[i] * cos_c;
        let d_axial = d_np[i] * cos_c - np[i] * sin_c * delta.cone[i];
        let arm = geom.s[i] - geom.s[0];
        let d_arm = delta.s[i] - delta.s[0];
        f.push(axial);
        df.push(d_axial);
        g.push(tp[i] * geom.z_az[i]);
        dg.push(d_tp[i] * geom.z_az[i] + tp[i] * delta.z_az[i]);
        m.push(axial * arm);
        dm.push(d_axial * arm + axial * d_arm);
    }
    BladeTotals {
        thrust: blades * trapz_directional(&f, &df, &geom.s, &delta.s),
        torque: blades * trapz_directional(&g, &dg, &geom.s, &delta.s),
        moment: blades * trapz_directional(&m, &dm, &geom.s, &delta.s),
    }
}

/* ----------------------------------- tests ---------------------------------- */
