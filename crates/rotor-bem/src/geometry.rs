//! Blade-shape resolution for span integration.
//!
//! Rotates the (r, precurve, presweep) description through the precone into
//! azimuthal coordinates, then recovers the local cone angle and cumulative
//! arc length along the deformed blade axis. Integrated loads follow the
//! blade axis, not the straight radius, so a curved blade changes thrust and
//! root moment even at identical station loads.
//!
//! `resolve_directional` is the forward-mode twin: it pushes one input
//! perturbation direction through the same arithmetic, which is how the
//! integrated-load derivatives are assembled without ever forming a dense
//! geometric Jacobian.

/// Azimuthal-frame blade axis. All slices share the station count.
#[derive(Clone, Debug)]
pub(crate) struct SpanGeometry {
    pub x_az: Vec<f64>,
    pub y_az: Vec<f64>,
    pub z_az: Vec<f64>,
    /// Local cone angle of the blade axis, radians.
    pub cone: Vec<f64>,
    /// Cumulative arc length from the first station, m.
    pub s: Vec<f64>,
}

/// Perturbations of [`SpanGeometry`] along one input direction.
#[derive(Clone, Debug)]
pub(crate) struct SpanGeometryDelta {
    pub z_az: Vec<f64>,
    pub cone: Vec<f64>,
    pub s: Vec<f64>,
}

/// One input direction for [`resolve_directional`]. Slices are full-length
/// station perturbations; `precone` is the scalar cone perturbation in
/// radians.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SpanSeed<'a> {
    pub d_r: &'a [f64],
    pub d_precurve: &'a [f64],
    pub d_presweep: &'a [f64],
    pub d_precone: f64,
}

pub(crate) fn resolve(
    r: &[f64],
    precurve: &[f64],
    presweep: &[f64],
    precone: f64,
) -> SpanGeometry {
    let n = r.len();
    let (sc, cc) = precone.sin_cos();

    let mut x_az = Vec::with_capacity(n);
    let mut y_az = Vec::with_capacity(n);
    let mut z_az = Vec::with_capacity(n);
    for i in 0..n {
        x_az.push(-r[i] * sc + precurve[i] * cc);
        y_az.push(presweep[i]);
        z_az.push(r[i] * cc + precurve[i] * sc);
    }

    // Segment cone angles, then one-sided at the ends and averaged inside.
    let mut seg_cone = Vec::with_capacity(n.saturating_sub(1));
    for i in 0..n - 1 {
        seg_cone.push(f64::atan2(-(x_az[i + 1] - x_az[i]), z_az[i + 1] - z_az[i]));
    }
    let mut cone = vec![0.0; n];
    cone[0] = seg_cone[0];
    cone[n - 1] = seg_cone[n - 2];
    for i in 1..n - 1 {
        cone[i] = 0.5 * (seg_cone[i - 1] + seg_cone[i]);
    }

    let mut s = vec![0.0; n];
    for i in 1..n {
        let dx = x_az[i] - x_az[i - 1];
        let dy = y_az[i] - y_az[i - 1];
        let dz = z_az[i] - z_az[i - 1];
        s[i] = s[i - 1] + (dx * dx + dy * dy + dz * dz).sqrt();
    }

    SpanGeometry { x_az, y_az, z_az, cone, s }
}

/// Forward-mode derivative of [`resolve`] along `seed`.
pub(crate) fn resolve_directional(
    r: &[f64],
    precurve: &[f64],
    presweep: &[f64],
    precone: f64,
    base: &SpanGeometry,
    seed: &SpanSeed<'_>,
) -> SpanGeometryDelta {
    let n = r.len();
    let (sc, cc) = precone.sin_cos();

    let mut dx_az = Vec::with_capacity(n);
    let mut dy_az = Vec::with_capacity(n);
    let mut dz_az = Vec::with_capacity(n);
    for i in 0..n {
        dx_az.push(
            -seed.d_r[i] * sc + seed.d_precurve[i] * cc - seed.d_precone * base.z_az[i],
        );
        dy_az.push(seed.d_presweep[i]);
        dz_az.push(seed.d_r[i] * cc + seed.d_precurve[i] * sc + seed.d_precone * base.x_az[i]);
    }

    let mut d_seg_cone = Vec::with_capacity(n - 1);
    for i in 0..n - 1 {
        let ddx = base.x_az[i + 1] - base.x_az[i];
        let ddz = base.z_az[i + 1] - base.z_az[i];
        let d_ddx = dx_az[i + 1] - dx_az[i];
        let d_ddz = dz_az[i + 1] - dz_az[i];
        let denom = ddx * ddx + ddz * ddz;
        // atan2(-dx, dz): gradient is (-dz, -dx)/|.|^2 over (dx, dz)
        d_seg_cone.push(if denom > 0.0 {
            (-ddz * d_ddx + ddx * d_ddz) / denom
        } else {
            0.0
        });
    }
    let mut d_cone = vec![0.0; n];
    d_cone[0] = d_seg_cone[0];
    d_cone[n - 1] = d_seg_cone[n - 2];
    for i in 1..n - 1 {
        d_cone[i] = 0.5 * (d_seg_cone[i - 1] + d_seg_cone[i]);
    }

    let mut d_s = vec![0.0; n];
    for i in 1..n {
        let dx = base.x_az[i] - base.x_az[i - 1];
        let dy = base.y_az[i] - base.y_az[i - 1];
        let dz = base.z_az[i] - base.z_az[i - 1];
        let len = base.s[i] - base.s[i - 1];
        let d_len = if len > 0.0 {
            (dx * (dx_az[i] - dx_az[i - 1])
                + dy * (dy_az[i] - dy_az[i - 1])
                + dz * (dz_az[i] - dz_az[i - 1]))
                / len
        } else {
            0.0
        };
        d_s[i] = d_s[i - 1] + d_len;
    }

    SpanGeometryDelta { z_az: dz_az, cone: d_cone, s: d_s }
}

/* ----------------------------------- tests ---------------------------------- */
