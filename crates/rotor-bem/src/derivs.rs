//! Derivative bundles returned alongside loads and performance.
//!
//! Shapes follow the data flow. Distributed outputs are length-`n` over the
//! blade stations, so their sensitivities to distributed inputs (`r`,
//! `chord`, ...) are diagonal `n x n` matrices and their sensitivities to
//! scalars are length-`n` vectors. Integrated outputs are length-`m` over
//! the operating conditions: distributed inputs give `m x n` matrices,
//! shared scalars give length-`m` vectors, and per-condition inputs
//! (`uinf`, `omega`, `pitch`) give diagonal `m x m` matrices.
//!
//! Angle sensitivities are per degree and rotor-speed sensitivities per RPM,
//! matching the input units. `omega` is `None` for a parked evaluation,
//! where rotor speed is not a meaningful direction.

use nalgebra::{DMatrix, DVector};

/// Sensitivities of one distributed output (per-station, length `n`).
#[derive(Clone, Debug)]
pub struct LoadDerivs {
    /// `n x n`, diagonal: station `i` only feels its own radius.
    pub r: DMatrix<f64>,
    pub chord: DMatrix<f64>,
    /// Per degree of section twist.
    pub twist: DMatrix<f64>,
    pub precurve: DMatrix<f64>,
    pub presweep: DMatrix<f64>,
    pub rhub: DVector<f64>,
    pub rtip: DVector<f64>,
    /// Per degree.
    pub precone: DVector<f64>,
    /// Per degree.
    pub tilt: DVector<f64>,
    /// Per degree.
    pub yaw: DVector<f64>,
    /// Per degree.
    pub azimuth: DVector<f64>,
    pub hub_height: DVector<f64>,
    pub shear: DVector<f64>,
    /// Always zero: the tip extensions move the integration arc, never the
    /// station solves.
    pub precurve_tip: DVector<f64>,
    pub presweep_tip: DVector<f64>,
    pub uinf: DVector<f64>,
    /// Per RPM; `None` when parked.
    pub omega: Option<DVector<f64>>,
    /// Per degree.
    pub pitch: DVector<f64>,
}

impl LoadDerivs {
    pub(crate) fn zeros(n: usize, rotating: bool) -> Self {
        Self {
            r: DMatrix::zeros(n, n),
            chord: DMatrix::zeros(n, n),
            twist: DMatrix::zeros(n, n),
            precurve: DMatrix::zeros(n, n),
            presweep: DMatrix::zeros(n, n),
            rhub: DVector::zeros(n),
            rtip: DVector::zeros(n),
            precone: DVector::zeros(n),
            tilt: DVector::zeros(n),
            yaw: DVector::zeros(n),
            azimuth: DVector::zeros(n),
            hub_height: DVector::zeros(n),
            shear: DVector::zeros(n),
            precurve_tip: DVector::zeros(n),
            presweep_tip: DVector::zeros(n),
            uinf: DVector::zeros(n),
            omega: rotating.then(|| DVector::zeros(n)),
            pitch: DVector::zeros(n),
        }
    }
}

/// Derivatives of both distributed load components.
#[derive(Clone, Debug)]
pub struct DistributedDerivs {
    pub np: LoadDerivs,
    pub tp: LoadDerivs,
}

/// Sensitivities of one integrated output (per-condition, length `m`).
#[derive(Clone, Debug)]
pub struct PerfDerivs {
    /// `m x n` over the blade stations.
    pub r: DMatrix<f64>,
    pub chord: DMatrix<f64>,
    /// Per degree of section twist.
    pub twist: DMatrix<f64>,
    pub precurve: DMatrix<f64>,
    pub presweep: DMatrix<f64>,
    pub rhub: DVector<f64>,
    pub rtip: DVector<f64>,
    /// Per degree.
    pub precone: DVector<f64>,
    /// Per degree.
    pub tilt: DVector<f64>,
    /// Per degree.
    pub yaw: DVector<f64>,
    pub hub_height: DVector<f64>,
    pub shear: DVector<f64>,
    pub precurve_tip: DVector<f64>,
    pub presweep_tip: DVector<f64>,
    /// `m x m`, diagonal: condition `j` only feels its own wind speed.
    pub uinf: DMatrix<f64>,
    /// `m x m` diagonal, per RPM; `None` when every condition is parked.
    pub omega: Option<DMatrix<f64>>,
    /// `m x m` diagonal, per degree.
    pub pitch: DMatrix<f64>,
}

impl PerfDerivs {
    pub(crate) fn zeros(m: usize, n: usize, rotating: bool) -> Self {
        Self {
            r: DMatrix::zeros(m, n),
            chord: DMatrix::zeros(m, n),
            twist: DMatrix::zeros(m, n),
            precurve: DMatrix::zeros(m, n),
            presweep: DMatrix::zeros(m, n),
            rhub: DVector::zeros(m),
            rtip: DVector::zeros(m),
            precone: DVector::zeros(m),
            tilt: DVector::zeros(m),
            yaw: DVector::zeros(m),
            hub_height: DVector::zeros(m),
            shear: DVector::zeros(m),
            precurve_tip: DVector::zeros(m),
            presweep_tip: DVector::zeros(m),
            uinf: DMatrix::zeros(m, m),
            omega: rotating.then(|| DMatrix::zeros(m, m)),
            pitch: DMatrix::zeros(m, m),
        }
    }
}

/// Derivatives of the four integrated outputs (or their coefficients).
#[derive(Clone, Debug)]
pub struct PerformanceDerivs {
    pub power: PerfDerivs,
    pub thrust: PerfDerivs,
    pub torque: PerfDerivs,
    pub moment: PerfDerivs,
}
