//! Extended Kalman filter for one contact.
//!
//! State: `[x, y, z, vx, vy, vz]` in metres and m/s, robot-centred, `x` along
//! the heading reference (north when a compass heading is available), `y` 90°
//! clockwise from it and `z` up.
//!
//! Observation: `h(x) = (range, azimuth, elevation)` with
//!
//! ```text
//! range     = √(x² + y² + z²)
//! azimuth   = atan2(y, x)            wrapped to [0, 2π)
//! elevation = atan2(z, √(x² + y²))
//! ```
//!
//! The covariance update uses the Joseph form
//! `P = (I − KH) P (I − KH)ᵀ + K R Kᵀ` followed by symmetrisation, which keeps
//! P symmetric positive semi-definite under rounding.

use nalgebra::{Matrix3, Matrix6, SMatrix, Vector3, Vector6};
use std::f64::consts::PI;
use thiserror::Error;

use crate::config::MotionModel;

pub type StateVector = Vector6<f64>;
pub type StateCovariance = Matrix6<f64>;
type ObservationJacobian = SMatrix<f64, 3, 6>;
type BearingJacobian = SMatrix<f64, 1, 6>;

/// Horizontal distance below which azimuth is undefined (m).
const MIN_HORIZONTAL_M: f64 = 1e-6;
/// Floor added to the initial position variance (m²).
const INITIAL_POSITION_FLOOR: f64 = 1e-6;
/// Turn rates below this use the constant-velocity transition (rad/s).
const MIN_TURN_RATE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterFault {
    #[error("contact too close to the vertical axis for a polar observation")]
    Degenerate,
    #[error("innovation covariance is not positive definite")]
    SingularInnovation,
    #[error("non-finite covariance after update")]
    NonFinite,
}

/// Polar observation in radians with its noise covariance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarObservation {
    pub z: Vector3<f64>,
    pub noise: Matrix3<f64>,
}

impl PolarObservation {
    /// Build from degrees. `azimuth_variance` and `elevation_variance` are deg².
    pub fn from_degrees(
        range_m: f64,
        azimuth_deg: f64,
        elevation_deg: f64,
        range_variance: f64,
        azimuth_variance: f64,
        elevation_variance: f64,
    ) -> Self {
        let k = (PI / 180.0).powi(2);
        PolarObservation {
            z: Vector3::new(range_m, azimuth_deg.to_radians(), elevation_deg.to_radians()),
            noise: Matrix3::from_diagonal(&Vector3::new(
                range_variance,
                azimuth_variance * k,
                elevation_variance * k,
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactFilter {
    x: StateVector,
    p: StateCovariance,
}

impl ContactFilter {
    /// Initialise at the observed position with zero velocity.
    ///
    /// Position covariance is the polar noise mapped through the inverse
    /// Jacobian; velocity covariance is `initial_velocity_var · I₃`.
    pub fn from_polar(obs: &PolarObservation, initial_velocity_var: f64) -> Self {
        let (r, az, el) = (obs.z[0], obs.z[1], obs.z[2]);
        let (saz, caz) = az.sin_cos();
        let (sel, cel) = el.sin_cos();

        let x = StateVector::new(r * cel * caz, r * cel * saz, r * sel, 0.0, 0.0, 0.0);

        // ∂(x, y, z) / ∂(r, az, el)
        #[rustfmt::skip]
        let j = Matrix3::new(
            cel * caz, -r * cel * saz, -r * sel * caz,
            cel * saz, r * cel * caz, -r * sel * saz,
            sel, 0.0, r * cel,
        );
        let pos_cov = j * obs.noise * j.transpose()
            + Matrix3::from_diagonal_element(INITIAL_POSITION_FLOOR);

        let mut p = StateCovariance::zeros();
        p.fixed_view_mut::<3, 3>(0, 0).copy_from(&pos_cov);
        p.fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&Matrix3::from_diagonal_element(initial_velocity_var));

        ContactFilter { x, p: symmetrize(&p) }
    }

    pub(crate) fn with_state(x: StateVector, p: StateCovariance) -> Self {
        ContactFilter { x, p: symmetrize(&p) }
    }

    pub fn state(&self) -> &StateVector {
        &self.x
    }

    pub fn covariance(&self) -> &StateCovariance {
        &self.p
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x[0], self.x[1], self.x[2])
    }

    pub fn velocity(&self) -> Vector3<f64> {
        Vector3::new(self.x[3], self.x[4], self.x[5])
    }

    pub fn is_finite(&self) -> bool {
        self.x.iter().chain(self.p.iter()).all(|v| v.is_finite())
    }

    /// Propagate by `dt` seconds: `x = F x`, `P = F P Fᵀ + Q(dt)`.
    pub fn predict(&mut self, model: MotionModel, dt: f64, accel_var: f64) {
        if dt <= 0.0 {
            return;
        }
        let f = transition(model, dt);
        self.x = f * self.x;
        self.p = symmetrize(&(f * self.p * f.transpose() + process_noise(dt, accel_var)));
    }

    /// Copy propagated by `dt`.
    pub fn predicted(&self, model: MotionModel, dt: f64, accel_var: f64) -> ContactFilter {
        let mut next = self.clone();
        next.predict(model, dt, accel_var);
        next
    }

    /// Innovation, its covariance and the observation Jacobian.
    fn innovation(
        &self,
        obs: &PolarObservation,
    ) -> Result<(Vector3<f64>, Matrix3<f64>, ObservationJacobian), FilterFault> {
        let (hx, h) = observe(&self.x)?;
        let mut y = obs.z - hx;
        y[1] = wrap_pi(y[1]);
        let s = h * self.p * h.transpose() + obs.noise;
        Ok((y, symmetrize3(&s), h))
    }

    /// Squared Mahalanobis distance of `obs` to this filter's prediction.
    pub fn mahalanobis_sq(&self, obs: &PolarObservation) -> Result<f64, FilterFault> {
        let (y, s, _) = self.innovation(obs)?;
        let s_inv = s
            .cholesky()
            .ok_or(FilterFault::SingularInnovation)?
            .inverse();
        Ok((y.transpose() * s_inv * y)[(0, 0)])
    }

    /// EKF correction with a polar observation. On error the filter is left
    /// unchanged except for `NonFinite`, where the caller must restore it.
    pub fn update(&mut self, obs: &PolarObservation) -> Result<(), FilterFault> {
        let (y, s, h) = self.innovation(obs)?;
        let s_inv = s
            .cholesky()
            .ok_or(FilterFault::SingularInnovation)?
            .inverse();
        let k = self.p * h.transpose() * s_inv;

        self.x += k * y;
        let i_kh = StateCovariance::identity() - k * h;
        self.p = symmetrize(&(i_kh * self.p * i_kh.transpose() + k * obs.noise * k.transpose()));

        if self.is_finite() {
            Ok(())
        } else {
            Err(FilterFault::NonFinite)
        }
    }

    /// Bearing-only correction: azimuth (rad) with variance (rad²).
    pub fn update_bearing(&mut self, azimuth_rad: f64, variance: f64) -> Result<(), FilterFault> {
        let (hx, h3) = observe(&self.x)?;
        let h: BearingJacobian = h3.fixed_rows::<1>(1).into_owned();
        let y = wrap_pi(azimuth_rad - hx[1]);
        let s = (h * self.p * h.transpose())[(0, 0)] + variance;
        if !(s > 0.0) {
            return Err(FilterFault::SingularInnovation);
        }
        let k = self.p * h.transpose() / s;

        self.x += k * y;
        let i_kh = StateCovariance::identity() - k * h;
        self.p = symmetrize(&(i_kh * self.p * i_kh.transpose() + k * k.transpose() * variance));

        if self.is_finite() {
            Ok(())
        } else {
            Err(FilterFault::NonFinite)
        }
    }

    /// Predicted azimuth (rad, [0, 2π)) and its variance (rad²).
    pub fn azimuth_with_variance(&self) -> Result<(f64, f64), FilterFault> {
        let (hx, h) = observe(&self.x)?;
        let row: BearingJacobian = h.fixed_rows::<1>(1).into_owned();
        Ok((hx[1], (row * self.p * row.transpose())[(0, 0)]))
    }
}

/// Polar projection of the state and its Jacobian.
fn observe(x: &StateVector) -> Result<(Vector3<f64>, ObservationJacobian), FilterFault> {
    let (px, py, pz) = (x[0], x[1], x[2]);
    let rho2 = px * px + py * py;
    let rho = rho2.sqrt();
    if rho < MIN_HORIZONTAL_M {
        return Err(FilterFault::Degenerate);
    }
    let r2 = rho2 + pz * pz;
    let r = r2.sqrt();

    let az = py.atan2(px).rem_euclid(2.0 * PI);
    let el = pz.atan2(rho);

    let mut h = ObservationJacobian::zeros();
    h[(0, 0)] = px / r;
    h[(0, 1)] = py / r;
    h[(0, 2)] = pz / r;
    h[(1, 0)] = -py / rho2;
    h[(1, 1)] = px / rho2;
    h[(2, 0)] = -px * pz / (r2 * rho);
    h[(2, 1)] = -py * pz / (r2 * rho);
    h[(2, 2)] = rho / r2;

    Ok((Vector3::new(r, az, el), h))
}

/// State transition for `dt` seconds.
///
/// The constant-turn model rotates horizontal velocity at a fixed rate
/// (positive = clockwise seen from above); vertical motion stays
/// constant-velocity.
pub fn transition(model: MotionModel, dt: f64) -> StateCovariance {
    let mut f = StateCovariance::identity();
    match model {
        MotionModel::ConstantTurn { turn_rate_dps } if turn_rate_dps.to_radians().abs() > MIN_TURN_RATE => {
            let w = turn_rate_dps.to_radians();
            let (s, c) = (w * dt).sin_cos();
            f[(0, 3)] = s / w;
            f[(0, 4)] = -(1.0 - c) / w;
            f[(1, 3)] = (1.0 - c) / w;
            f[(1, 4)] = s / w;
            f[(3, 3)] = c;
            f[(3, 4)] = -s;
            f[(4, 3)] = s;
            f[(4, 4)] = c;
            f[(2, 5)] = dt;
        }
        _ => {
            for i in 0..3 {
                f[(i, i + 3)] = dt;
            }
        }
    }
    f
}

/// Discrete white-noise acceleration covariance:
///
/// ```text
///        ┌ dt⁴/4·I₃   dt³/2·I₃ ┐
/// Q = σ² │                      │
///        └ dt³/2·I₃   dt²  ·I₃ ┘
/// ```
pub fn process_noise(dt: f64, accel_var: f64) -> StateCovariance {
    let dt2 = dt * dt;
    let pp = accel_var * dt2 * dt2 / 4.0;
    let pv = accel_var * dt2 * dt / 2.0;
    let vv = accel_var * dt2;

    let mut q = StateCovariance::zeros();
    for i in 0..3 {
        q[(i, i)] = pp;
        q[(i, i + 3)] = pv;
        q[(i + 3, i)] = pv;
        q[(i + 3, i + 3)] = vv;
    }
    q
}

fn symmetrize(p: &StateCovariance) -> StateCovariance {
    (p + p.transpose()) * 0.5
}

fn symmetrize3(s: &Matrix3<f64>) -> Matrix3<f64> {
    (s + s.transpose()) * 0.5
}

/// Wrap radians to (−π, π].
pub fn wrap_pi(a: f64) -> f64 {
    let w = (a + PI).rem_euclid(2.0 * PI) - PI;
    if w <= -PI {
        w + 2.0 * PI
    } else {
        w
    }
}
