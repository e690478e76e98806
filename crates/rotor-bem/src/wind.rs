//! Section inflow velocities in the blade-aligned frame.
//!
//! Maps a sheared, possibly yawed free stream plus rigid rotation onto the
//! normal/tangential velocity pair (`vx`, `vy`) each blade station sees, for
//! one blade azimuth. Partials come out in user units: metres for lengths,
//! degrees for angles, RPM for rotor speed.

use rotor_core::{deg_to_rad, rpm_to_rad_s, PER_DEG, PER_RPM};

/// `[d(vx)/d(input), d(vy)/d(input)]` for every inflow input.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SectionWindGrad {
    pub r: [f64; 2],
    pub precurve: [f64; 2],
    pub presweep: [f64; 2],
    /// Per degree.
    pub precone: [f64; 2],
    /// Per degree.
    pub tilt: [f64; 2],
    /// Per degree.
    pub yaw: [f64; 2],
    /// Per degree.
    pub azimuth: [f64; 2],
    pub hub_height: [f64; 2],
    pub shear: [f64; 2],
    pub uinf: [f64; 2],
    /// Per RPM.
    pub omega: [f64; 2],
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct SectionWind {
    /// Velocity normal to the rotation plane, m/s.
    pub vx: f64,
    /// Velocity tangential to the rotation plane, m/s.
    pub vy: f64,
    pub grad: Option<SectionWindGrad>,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct WindInputs {
    pub r: f64,
    pub precurve: f64,
    pub presweep: f64,
    pub precone_deg: f64,
    pub tilt_deg: f64,
    pub yaw_deg: f64,
    pub azimuth_deg: f64,
    pub uinf: f64,
    pub omega_rpm: f64,
    pub hub_height: f64,
    pub shear_exp: f64,
}

/// Resolve the free stream and rotation at one station and azimuth.
///
/// The station sits at azimuthal coordinates built from (`r`, `precurve`,
/// `presweep`) rotated by the precone; its height above hub follows from
/// azimuth and shaft tilt and feeds the power-law shear profile.
pub(crate) fn section_wind(inputs: &WindInputs, derivatives: bool) -> SectionWind {
    let sc = deg_to_rad(inputs.precone_deg).sin();
    let cc = deg_to_rad(inputs.precone_deg).cos();
    let st = deg_to_rad(inputs.tilt_deg).sin();
    let ct = deg_to_rad(inputs.tilt_deg).cos();
    let sy = deg_to_rad(inputs.yaw_deg).sin();
    let cy = deg_to_rad(inputs.yaw_deg).cos();
    let sa = deg_to_rad(inputs.azimuth_deg).sin();
    let ca = deg_to_rad(inputs.azimuth_deg).cos();
    let omega = rpm_to_rad_s(inputs.omega_rpm);

    // Station position in the azimuthal (cone-resolved) frame.
    let x_az = -inputs.r * sc + inputs.precurve * cc;
    let y_az = inputs.presweep;
    let z_az = inputs.r * cc + inputs.precurve * sc;

    // Height above hub and the sheared free-stream magnitude.
    let height = (y_az * sa + z_az * ca) * ct - x_az * st;
    let hfrac = 1.0 + height / inputs.hub_height;
    let v = inputs.uinf * hfrac.powf(inputs.shear_exp);

    // Free-stream direction cosines onto the section axes.
    let cxdir = (cy * st * ca + sy * sa) * sc + cy * ct * cc;
    let cydir = cy * st * sa - sy * ca;

    let vx = v * cxdir - omega * y_az * sc;
    let vy = v * cydir + omega * z_az;

    if !derivatives {
        return SectionWind { vx, vy, grad: None };
    }

    // Position partials. Cone partials are per radian here; scaled at the end.
    let dxaz_dr = -sc;
    let dzaz_dr = cc;
    let dxaz_dcurve = cc;
    let dzaz_dcurve = sc;
    let dxaz_dcone = -z_az;
    let dzaz_dcone = x_az;

    // Height partials through the position, plus the direct angle terms.
    let dh_pos = |dx: f64, dy: f64, dz: f64| (dy * sa + dz * ca) * ct - dx * st;
    let dh_dr = dh_pos(dxaz_dr, 0.0, dzaz_dr);
    let dh_dcurve = dh_pos(dxaz_dcurve, 0.0, dzaz_dcurve);
    let dh_dsweep = dh_pos(0.0, 1.0, 0.0);
    let dh_dcone = dh_pos(dxaz_dcone, 0.0, dzaz_dcone);
    let dh_dtilt = -(y_az * sa + z_az * ca) * st - x_az * ct;
    let dh_dazimuth = (y_az * ca - z_az * sa) * ct;

    // Shear-profile chain.
    let dv_dh = inputs.uinf * inputs.shear_exp * hfrac.powf(inputs.shear_exp - 1.0)
        / inputs.hub_height;
    let dv_duinf = hfrac.powf(inputs.shear_exp);
    let dv_dshear = v * hfrac.ln();
    let dv_dhubht = -dv_dh * height / inputs.hub_height;

    // Direction-cosine partials, per radian.
    let dcx_dcone = (cy * st * ca + sy * sa) * cc - cy * ct * sc;
    let dcx_dtilt = cy * ct * ca * sc - cy * st * cc;
    let dcx_dyaw = (-sy * st * ca + cy * sa) * sc - sy * ct * cc;
    let dcx_dazimuth = (-cy * st * sa + sy * ca) * sc;
    let dcy_dtilt = cy * ct * sa;
    let dcy_dyaw = -sy * st * sa - cy * ca;
    let dcy_dazimuth = cy * st * ca;

    let pair = |dv: f64, dcx: f64, dcy: f64, rot_x: f64, rot_y: f64| {
        [
            dv * cxdir + v * dcx + rot_x,
            dv * cydir + v * dcy + rot_y,
        ]
    };

    let grad = SectionWindGrad {
        r: pair(dv_dh * dh_dr, 0.0, 0.0, 0.0, omega * cc),
        precurve: pair(dv_dh * dh_dcurve, 0.0, 0.0, 0.0, omega * sc),
        presweep: pair(dv_dh * dh_dsweep, 0.0, 0.0, -omega * sc, 0.0),
        precone: scale(
            pair(
                dv_dh * dh_dcone,
                dcx_dcone,
                0.0,
                -omega * y_az * cc,
                omega * dzaz_dcone,
            ),
            PER_DEG,
        ),
        tilt: scale(pair(dv_dh * dh_dtilt, dcx_dtilt, dcy_dtilt, 0.0, 0.0), PER_DEG),
        yaw: scale(pair(0.0, dcx_dyaw, dcy_dyaw, 0.0, 0.0), PER_DEG),
        azimuth: scale(
            pair(dv_dh * dh_dazimuth, dcx_dazimuth, dcy_dazimuth, 0.0, 0.0),
            PER_DEG,
        ),
        hub_height: pair(dv_dhubht, 0.0, 0.0, 0.0, 0.0),
        shear: pair(dv_dshear, 0.0, 0.0, 0.0, 0.0),
        uinf: pair(dv_duinf, 0.0, 0.0, 0.0, 0.0),
        omega: scale([-y_az * sc, z_az], PER_RPM),
    };

    SectionWind { vx, vy, grad: Some(grad) }
}

fn scale(pair: [f64; 2], factor: f64) -> [f64; 2] {
    [pair[0] * factor, pair[1] * factor]
}

/* ----------------------------------- tests ---------------------------------- */
