//! Finite-difference validation of the analytic gradient bundles.
//!
//! Every derivative the solver reports is checked against central
//! differences of the same public API: distributed loads per station and
//! azimuthally averaged performance per operating condition, including the
//! parked rotor, curved blades, and stations coincident with the hub and
//! tip radii.

use std::f64::consts::PI;
use std::sync::Arc;

use approx::assert_relative_eq;
use rotor_airfoils::{Polar, PolarSet};
use rotor_bem::{Environment, OperatingPoint, Rotor, RotorGeometry};

const N_SECTORS: usize = 4;

fn shared_polar() -> Arc<PolarSet> {
    // Attached-flow table extended to the full cycle; one airfoil for the
    // whole blade keeps the checks focused on the solver.
    let alpha_deg: Vec<f64> = (-20..=20).map(f64::from).collect();
    let cl: Vec<f64> = alpha_deg.iter().map(|a| 2.0 * PI * a.to_radians()).collect();
    let cd: Vec<f64> = alpha_deg
        .iter()
        .map(|a| 0.008 + 0.6 * a.to_radians().powi(2))
        .collect();
    let polar = Polar::new(alpha_deg, cl, cd, None).unwrap();
    Arc::new(PolarSet::single(&polar.extrapolated(1.3).unwrap()).unwrap())
}

/// Utility-scale three-bladed rotor description.
fn scenario() -> (RotorGeometry, Environment) {
    let r = vec![
        2.8667, 5.6, 8.3333, 11.75, 15.85, 19.95, 24.05, 28.15, 32.25, 36.35, 40.45, 44.55,
        48.65, 52.75, 56.1667, 58.9, 61.6333,
    ];
    let chord = vec![
        3.542, 3.854, 4.167, 4.557, 4.652, 4.458, 4.249, 4.007, 3.748, 3.502, 3.256, 3.010,
        2.764, 2.518, 2.313, 2.086, 1.419,
    ];
    let twist_deg = vec![
        13.308, 13.308, 13.308, 13.308, 11.480, 10.162, 9.011, 7.795, 6.544, 5.361, 4.188,
        3.125, 2.319, 1.526, 0.863, 0.370, 0.106,
    ];
    let polar = shared_polar();
    let airfoils = vec![polar; r.len()];
    let geometry = RotorGeometry {
        r,
        chord,
        twist_deg,
        airfoils,
        rhub: 1.5,
        rtip: 63.0,
        blades: 3,
        precone_deg: 2.5,
        precurve: None,
        presweep: None,
        precurve_tip: 0.0,
        presweep_tip: 0.0,
    };
    let env = Environment {
        rho: 1.225,
        mu: 1.81206e-5,
        tilt_deg: -5.0,
        yaw_deg: 0.0,
        shear_exp: 0.2,
        hub_height: 80.0,
    };
    (geometry, env)
}

/// Rotor speed for a tip-speed ratio of 7.55 at 10 m/s.
fn design_rpm() -> f64 {
    10.0 * 7.55 / 63.0 * 30.0 / PI
}

/* ------------------------- distributed load checks ------------------------- */

/// (uinf, omega_rpm, pitch_deg, azimuth_deg)
type Op = [f64; 4];

const BASE_OP: Op = [10.0, 11.44, 0.0, 90.0];

fn loads_at(geometry: &RotorGeometry, env: &Environment, op: Op) -> (Vec<f64>, Vec<f64>) {
    let rotor = Rotor::new(geometry.clone(), *env, N_SECTORS, false).unwrap();
    let loads = rotor.distributed_aero_loads(op[0], op[1], op[2], op[3]);
    (loads.np, loads.tp)
}

/// Central difference of the distributed loads along one input bump.
fn fd_loads(
    bump: impl Fn(&mut RotorGeometry, &mut Environment, &mut Op, f64),
    h: f64,
) -> (Vec<f64>, Vec<f64>) {
    let fd_side = |sign: f64| {
        let (mut geometry, mut env) = scenario();
        let mut op = BASE_OP;
        bump(&mut geometry, &mut env, &mut op, sign * h);
        loads_at(&geometry, &env, op)
    };
    let (np_p, tp_p) = fd_side(1.0);
    let (np_m, tp_m) = fd_side(-1.0);
    let diff = |p: &[f64], m: &[f64]| -> Vec<f64> {
        p.iter().zip(m).map(|(a, b)| (a - b) / (2.0 * h)).collect()
    };
    (diff(&np_p, &np_m), diff(&tp_p, &tp_m))
}

fn assert_grad(analytic: f64, numeric: f64, floor: f64) {
    assert_relative_eq!(analytic, numeric, max_relative = 5e-3, epsilon = floor);
}

#[test]
fn distributed_station_gradients() {
    let (geometry, env) = scenario();
    let n = geometry.r.len();
    let rotor = Rotor::new(geometry, env, N_SECTORS, true).unwrap();
    let loads = rotor.distributed_aero_loads(BASE_OP[0], BASE_OP[1], BASE_OP[2], BASE_OP[3]);
    let d = loads.derivs.as_ref().unwrap();

    for i in 0..n {
        let (np_r, tp_r) = fd_loads(|g, _, _, h| g.r[i] += h, 1e-5);
        let (np_c, tp_c) = fd_loads(|g, _, _, h| g.chord[i] += h, 1e-6);
        let (np_t, tp_t) = fd_loads(|g, _, _, h| g.twist_deg[i] += h, 1e-5);
        assert_grad(d.np.r[(i, i)], np_r[i], 1e-2);
        assert_grad(d.tp.r[(i, i)], tp_r[i], 1e-2);
        assert_grad(d.np.chord[(i, i)], np_c[i], 1e-2);
        assert_grad(d.tp.chord[(i, i)], tp_c[i], 1e-2);
        assert_grad(d.np.twist[(i, i)], np_t[i], 1e-2);
        assert_grad(d.tp.twist[(i, i)], tp_t[i], 1e-2);

        // stations are independent: off-diagonal response is zero
        let other = (i + 1) % n;
        assert_grad(0.0, np_c[other], 1e-4);
    }
}

#[test]
fn distributed_scalar_gradients() {
    let (geometry, env) = scenario();
    let n = geometry.r.len();
    let rotor = Rotor::new(geometry, env, N_SECTORS, true).unwrap();
    let loads = rotor.distributed_aero_loads(BASE_OP[0], BASE_OP[1], BASE_OP[2], BASE_OP[3]);
    let d = loads.derivs.as_ref().unwrap();

    struct Case<'a> {
        np_col: &'a nalgebra::DVector<f64>,
        tp_col: &'a nalgebra::DVector<f64>,
        fd: (Vec<f64>, Vec<f64>),
    }
    let omega_np = d.np.omega.as_ref().unwrap();
    let omega_tp = d.tp.omega.as_ref().unwrap();
    let cases = [
        Case { np_col: &d.np.rhub, tp_col: &d.tp.rhub, fd: fd_loads(|g, _, _, h| g.rhub += h, 1e-5) },
        Case { np_col: &d.np.rtip, tp_col: &d.tp.rtip, fd: fd_loads(|g, _, _, h| g.rtip += h, 1e-5) },
        Case {
            np_col: &d.np.precone,
            tp_col: &d.tp.precone,
            fd: fd_loads(|g, _, _, h| g.precone_deg += h, 1e-5),
        },
        Case {
            np_col: &d.np.tilt,
            tp_col: &d.tp.tilt,
            fd: fd_loads(|_, e, _, h| e.tilt_deg += h, 1e-5),
        },
        Case {
            np_col: &d.np.yaw,
            tp_col: &d.tp.yaw,
            fd: fd_loads(|_, e, _, h| e.yaw_deg += h, 1e-5),
        },
        Case {
            np_col: &d.np.hub_height,
            tp_col: &d.tp.hub_height,
            fd: fd_loads(|_, e, _, h| e.hub_height += h, 1e-4),
        },
        Case {
            np_col: &d.np.shear,
            tp_col: &d.tp.shear,
            fd: fd_loads(|_, e, _, h| e.shear_exp += h, 1e-6),
        },
        Case {
            np_col: &d.np.uinf,
            tp_col: &d.tp.uinf,
            fd: fd_loads(|_, _, op, h| op[0] += h, 1e-5),
        },
        Case { np_col: omega_np, tp_col: omega_tp, fd: fd_loads(|_, _, op, h| op[1] += h, 1e-5) },
        Case {
            np_col: &d.np.pitch,
            tp_col: &d.tp.pitch,
            fd: fd_loads(|_, _, op, h| op[2] += h, 1e-5),
        },
        Case {
            np_col: &d.np.azimuth,
            tp_col: &d.tp.azimuth,
            fd: fd_loads(|_, _, op, h| op[3] += h, 1e-5),
        },
    ];
    for case in &cases {
        for i in 0..n {
            assert_grad(case.np_col[i], case.fd.0[i], 1e-2);
            assert_grad(case.tp_col[i], case.fd.1[i], 1e-2);
        }
    }
}

#[test]
fn parked_rotor_gradients() {
    let (geometry, env) = scenario();
    let n = geometry.r.len();
    let rotor = Rotor::new(geometry, env, N_SECTORS, true).unwrap();
    let op: Op = [10.0, 0.0, 0.0, 90.0];
    let loads = rotor.distributed_aero_loads(op[0], op[1], op[2], op[3]);
    let d = loads.derivs.as_ref().unwrap();

    // no rotor-speed direction when parked
    assert!(d.np.omega.is_none());
    assert!(d.tp.omega.is_none());
    for (a, ap) in loads.a.iter().zip(&loads.ap) {
        assert_eq!(*a, 0.0);
        assert_eq!(*ap, 0.0);
    }

    let fd_parked = |bump: &dyn Fn(&mut RotorGeometry, &mut Environment, &mut Op, f64),
                     h: f64| {
        let side = |sign: f64| {
            let (mut geometry, mut env) = scenario();
            let mut op: Op = [10.0, 0.0, 0.0, 90.0];
            bump(&mut geometry, &mut env, &mut op, sign * h);
            loads_at(&geometry, &env, op)
        };
        let (np_p, _) = side(1.0);
        let (np_m, _) = side(-1.0);
        np_p.iter()
            .zip(&np_m)
            .map(|(a, b)| (a - b) / (2.0 * h))
            .collect::<Vec<f64>>()
    };

    let np_twist = fd_parked(&|g, _, _, h| g.twist_deg[3] += h, 1e-5);
    let np_pitch = fd_parked(&|_, _, op, h| op[2] += h, 1e-5);
    let np_uinf = fd_parked(&|_, _, op, h| op[0] += h, 1e-5);
    assert_grad(d.np.twist[(3, 3)], np_twist[3], 1e-3);
    for i in 0..n {
        assert_grad(d.np.pitch[i], np_pitch[i], 1e-3);
        assert_grad(d.np.uinf[i], np_uinf[i], 1e-3);
    }
}

#[test]
fn parked_rows_stay_zero_in_mixed_evaluations() {
    let (geometry, env) = scenario();
    let rotor = Rotor::new(geometry, env, N_SECTORS, true).unwrap();
    let points = vec![
        OperatingPoint { uinf: 10.0, omega_rpm: design_rpm(), pitch_deg: 0.0 },
        OperatingPoint { uinf: 30.0, omega_rpm: 0.0, pitch_deg: 0.0 },
    ];
    let perf = rotor.evaluate(&points, false);
    assert_eq!(perf.power[1], 0.0);

    // the rotor-speed direction exists because one condition rotates, but
    // the parked condition's row is zero for every output, power included
    let d = perf.derivs.as_ref().unwrap();
    let omega_p = d.power.omega.as_ref().unwrap();
    let omega_t = d.thrust.omega.as_ref().unwrap();
    let omega_q = d.torque.omega.as_ref().unwrap();
    let omega_m = d.moment.omega.as_ref().unwrap();
    assert!(omega_p[(0, 0)].abs() > 0.0);
    for j in 0..points.len() {
        assert_eq!(omega_p[(1, j)], 0.0);
        assert_eq!(omega_t[(1, j)], 0.0);
        assert_eq!(omega_q[(1, j)], 0.0);
        assert_eq!(omega_m[(1, j)], 0.0);
    }
}

#[test]
fn hub_and_tip_coincident_stations() {
    let (mut geometry, env) = scenario();
    geometry.r[0] = geometry.rhub;
    let last = geometry.r.len() - 1;
    geometry.r[last] = geometry.rtip;

    let rotor = Rotor::new(geometry.clone(), env, N_SECTORS, true).unwrap();
    // endpoints were pulled off the singular radii
    assert!(rotor.radii()[0] > geometry.rhub);
    assert!(rotor.radii()[last] < geometry.rtip);

    let loads = rotor.distributed_aero_loads(BASE_OP[0], BASE_OP[1], BASE_OP[2], BASE_OP[3]);
    for np in &loads.np {
        assert!(np.is_finite());
    }
    let d = loads.derivs.as_ref().unwrap();
    // a pinned end station no longer responds to its own radius
    assert_eq!(d.np.r[(0, 0)], 0.0);
    assert_eq!(d.np.r[(last, last)], 0.0);

    // its motion is charged to the span radii instead
    let h = 1e-5;
    let side = |sign: f64, field: fn(&mut RotorGeometry) -> &mut f64| {
        let mut g = geometry.clone();
        *field(&mut g) += sign * h;
        loads_at(&g, &env, BASE_OP).0
    };
    let np_hub_p = side(1.0, |g| &mut g.rhub);
    let np_hub_m = side(-1.0, |g| &mut g.rhub);
    let np_tip_p = side(1.0, |g| &mut g.rtip);
    let np_tip_m = side(-1.0, |g| &mut g.rtip);
    for i in [0, last] {
        assert_grad(d.np.rhub[i], (np_hub_p[i] - np_hub_m[i]) / (2.0 * h), 5e-2);
        assert_grad(d.np.rtip[i], (np_tip_p[i] - np_tip_m[i]) / (2.0 * h), 5e-2);
    }
}

/* ----------------------- integrated performance checks ---------------------- */

fn operating_points() -> Vec<OperatingPoint> {
    vec![
        OperatingPoint { uinf: 10.0, omega_rpm: design_rpm(), pitch_deg: 0.0 },
        OperatingPoint { uinf: 13.0, omega_rpm: 1.15 * design_rpm(), pitch_deg: 3.0 },
    ]
}

fn perf_at(
    geometry: &RotorGeometry,
    env: &Environment,
    points: &[OperatingPoint],
    coefficients: bool,
) -> [Vec<f64>; 4] {
    let rotor = Rotor::new(geometry.clone(), *env, N_SECTORS, false).unwrap();
    let p = rotor.evaluate(points, coefficients);
    [p.power, p.thrust, p.torque, p.moment]
}

/// Central difference of (power, thrust, torque, moment) along one bump.
fn fd_perf(
    bump: impl Fn(&mut RotorGeometry, &mut Environment, &mut Vec<OperatingPoint>, f64),
    h: f64,
    coefficients: bool,
) -> [Vec<f64>; 4] {
    let side = |sign: f64| {
        let (mut geometry, mut env) = scenario();
        let mut points = operating_points();
        bump(&mut geometry, &mut env, &mut points, sign * h);
        perf_at(&geometry, &env, &points, coefficients)
    };
    let plus = side(1.0);
    let minus = side(-1.0);
    std::array::from_fn(|k| {
        plus[k]
            .iter()
            .zip(&minus[k])
            .map(|(a, b)| (a - b) / (2.0 * h))
            .collect()
    })
}

#[test]
fn integrated_distributed_input_gradients() {
    let (geometry, env) = scenario();
    let rotor = Rotor::new(geometry.clone(), env, N_SECTORS, true).unwrap();
    let points = operating_points();
    let perf = rotor.evaluate(&points, false);
    let d = perf.derivs.as_ref().unwrap();

    // thrust and torque are O(1e5..1e6); loose absolute floor for entries
    // that are effectively zero
    let floor = 5.0;
    for i in [0usize, 4, 8, 12, 16] {
        let fd_r = fd_perf(|g, _, _, h| g.r[i] += h, 1e-5, false);
        let fd_chord = fd_perf(|g, _, _, h| g.chord[i] += h, 1e-6, false);
        let fd_twist = fd_perf(|g, _, _, h| g.twist_deg[i] += h, 1e-5, false);
        for j in 0..points.len() {
            assert_grad(d.power.r[(j, i)], fd_r[0][j], floor);
            assert_grad(d.thrust.r[(j, i)], fd_r[1][j], floor);
            assert_grad(d.torque.r[(j, i)], fd_r[2][j], floor);
            assert_grad(d.moment.r[(j, i)], fd_r[3][j], floor);
            assert_grad(d.power.chord[(j, i)], fd_chord[0][j], floor);
            assert_grad(d.thrust.chord[(j, i)], fd_chord[1][j], floor);
            assert_grad(d.power.twist[(j, i)], fd_twist[0][j], floor);
            assert_grad(d.thrust.twist[(j, i)], fd_twist[1][j], floor);
            assert_grad(d.moment.twist[(j, i)], fd_twist[3][j], floor);
        }
    }
}

#[test]
fn integrated_scalar_gradients() {
    let (geometry, env) = scenario();
    let rotor = Rotor::new(geometry, env, N_SECTORS, true).unwrap();
    let points = operating_points();
    let perf = rotor.evaluate(&points, false);
    let d = perf.derivs.as_ref().unwrap();
    let floor = 5.0;

    let fd_rhub = fd_perf(|g, _, _, h| g.rhub += h, 1e-5, false);
    let fd_rtip = fd_perf(|g, _, _, h| g.rtip += h, 1e-5, false);
    let fd_cone = fd_perf(|g, _, _, h| g.precone_deg += h, 1e-5, false);
    let fd_tilt = fd_perf(|_, e, _, h| e.tilt_deg += h, 1e-5, false);
    let fd_yaw = fd_perf(|_, e, _, h| e.yaw_deg += h, 1e-5, false);
    let fd_hub_height = fd_perf(|_, e, _, h| e.hub_height += h, 1e-4, false);
    let fd_shear = fd_perf(|_, e, _, h| e.shear_exp += h, 1e-6, false);
    for j in 0..points.len() {
        for (k, out) in [&d.power, &d.thrust, &d.torque, &d.moment].into_iter().enumerate() {
            assert_grad(out.rhub[j], fd_rhub[k][j], floor);
            assert_grad(out.rtip[j], fd_rtip[k][j], floor);
            assert_grad(out.precone[j], fd_cone[k][j], floor);
            assert_grad(out.tilt[j], fd_tilt[k][j], floor);
            assert_grad(out.yaw[j], fd_yaw[k][j], floor);
            assert_grad(out.hub_height[j], fd_hub_height[k][j], floor);
            assert_grad(out.shear[j], fd_shear[k][j], floor);
        }
    }

    // per-condition inputs: diagonal m x m response
    for j in 0..points.len() {
        let fd_uinf = fd_perf(|_, _, p, h| p[j].uinf += h, 1e-5, false);
        let fd_omega = fd_perf(|_, _, p, h| p[j].omega_rpm += h, 1e-5, false);
        let fd_pitch = fd_perf(|_, _, p, h| p[j].pitch_deg += h, 1e-5, false);
        for (k, out) in [&d.power, &d.thrust, &d.torque, &d.moment].into_iter().enumerate() {
            let omega = out.omega.as_ref().unwrap();
            for jj in 0..points.len() {
                assert_grad(out.uinf[(jj, j)], fd_uinf[k][jj], floor);
                assert_grad(omega[(jj, j)], fd_omega[k][jj], floor);
                assert_grad(out.pitch[(jj, j)], fd_pitch[k][jj], floor);
            }
        }
    }
}

#[test]
fn curved_blade_gradients() {
    let (mut geometry, env) = scenario();
    let n = geometry.r.len();
    // linearly growing out-of-plane curve, no precone
    let precurve: Vec<f64> = (0..n)
        .map(|i| 1.0 + 9.0 * i as f64 / (n - 1) as f64)
        .collect();
    geometry.precurve = Some(precurve);
    geometry.precurve_tip = 10.1;
    geometry.precone_deg = 0.0;

    let rotor = Rotor::new(geometry.clone(), env, N_SECTORS, true).unwrap();
    let points = operating_points();
    let perf = rotor.evaluate(&points, false);
    let d = perf.derivs.as_ref().unwrap();
    let floor = 5.0;

    let fd_perf_curved = |bump: &dyn Fn(&mut RotorGeometry, f64), h: f64| -> [Vec<f64>; 4] {
        let side = |sign: f64| {
            let mut g = geometry.clone();
            bump(&mut g, sign * h);
            perf_at(&g, &env, &points, false)
        };
        let plus = side(1.0);
        let minus = side(-1.0);
        std::array::from_fn(|k| {
            plus[k]
                .iter()
                .zip(&minus[k])
                .map(|(a, b)| (a - b) / (2.0 * h))
                .collect()
        })
    };

    for i in [0usize, 8, 16] {
        let fd = fd_perf_curved(&|g, h| g.precurve.as_mut().unwrap()[i] += h, 1e-5);
        for j in 0..points.len() {
            assert_grad(d.thrust.precurve[(j, i)], fd[1][j], floor);
            assert_grad(d.torque.precurve[(j, i)], fd[2][j], floor);
            assert_grad(d.moment.precurve[(j, i)], fd[3][j], floor);
        }
    }
    let fd_tip = fd_perf_curved(&|g, h| g.precurve_tip += h, 1e-5);
    for j in 0..points.len() {
        assert_grad(d.thrust.precurve_tip[j], fd_tip[1][j], floor);
        assert_grad(d.moment.precurve_tip[j], fd_tip[3][j], floor);
    }

    // tip extension never reaches the station solves
    let base = rotor.distributed_aero_loads(BASE_OP[0], BASE_OP[1], BASE_OP[2], BASE_OP[3]);
    let mut stretched = geometry.clone();
    stretched.precurve_tip += 1.0;
    let rotor2 = Rotor::new(stretched, env, N_SECTORS, false).unwrap();
    let moved = rotor2.distributed_aero_loads(BASE_OP[0], BASE_OP[1], BASE_OP[2], BASE_OP[3]);
    for (a, b) in base.np.iter().zip(&moved.np) {
        assert_relative_eq!(*a, *b, epsilon = 1e-12);
    }
    // and the distributed bundle says so explicitly
    let ld = base.derivs.as_ref().unwrap();
    for i in 0..rotor.stations() {
        assert_eq!(ld.np.precurve_tip[i], 0.0);
        assert_eq!(ld.np.presweep_tip[i], 0.0);
        assert_eq!(ld.tp.precurve_tip[i], 0.0);
        assert_eq!(ld.tp.presweep_tip[i], 0.0);
    }
}

#[test]
fn coefficient_gradients() {
    let (geometry, env) = scenario();
    let rotor = Rotor::new(geometry, env, N_SECTORS, true).unwrap();
    let points = operating_points();
    let perf = rotor.evaluate(&points, true);
    let d = perf.derivs.as_ref().unwrap();

    // coefficients are O(0.1..1); tight absolute floor
    let floor = 1e-7;
    let fd_rtip = fd_perf(|g, _, _, h| g.rtip += h, 1e-5, true);
    let fd_cone = fd_perf(|g, _, _, h| g.precone_deg += h, 1e-5, true);
    for j in 0..points.len() {
        let fd_uinf = fd_perf(|_, _, p, h| p[j].uinf += h, 1e-5, true);
        for (k, out) in [&d.power, &d.thrust, &d.torque, &d.moment].into_iter().enumerate() {
            assert_grad(out.rtip[j], fd_rtip[k][j], floor);
            assert_grad(out.precone[j], fd_cone[k][j], floor);
            assert_grad(out.uinf[(j, j)], fd_uinf[k][j], floor);
        }
    }
}

#[test]
fn bundle_shapes() {
    let (geometry, env) = scenario();
    let n = geometry.r.len();
    let rotor = Rotor::new(geometry, env, N_SECTORS, true).unwrap();
    let points = operating_points();
    let m = points.len();

    let loads = rotor.distributed_aero_loads(BASE_OP[0], BASE_OP[1], BASE_OP[2], BASE_OP[3]);
    let ld = loads.derivs.as_ref().unwrap();
    assert_eq!(ld.np.r.shape(), (n, n));
    assert_eq!(ld.np.chord.shape(), (n, n));
    assert_eq!(ld.tp.rhub.len(), n);
    assert_eq!(ld.tp.uinf.len(), n);

    let perf = rotor.evaluate(&points, false);
    let pd = perf.derivs.as_ref().unwrap();
    assert_eq!(pd.thrust.r.shape(), (m, n));
    assert_eq!(pd.power.twist.shape(), (m, n));
    assert_eq!(pd.torque.rhub.len(), m);
    assert_eq!(pd.moment.uinf.shape(), (m, m));
    // off-diagonal per-condition entries are zero
    assert_eq!(pd.thrust.uinf[(0, 1)], 0.0);
    assert_eq!(pd.thrust.uinf[(1, 0)], 0.0);
}
