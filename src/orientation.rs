use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::error::DegenerateOrientation;

/// Squared length below which an axis is treated as collapsed.
const DEGENERATE_EPS: f64 = 1e-12;

/// One frame of user input. Values are unitless multipliers applied against
/// the per-axis rate constants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InputDelta {
    pub x: f64,
    pub y: f64,
    /// Roll about the view axis.
    pub z: f64,
    pub twist: f64,
    pub zoom: f64,
}

impl InputDelta {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrientationRates {
    pub k_x: f64,
    pub k_y: f64,
    pub k_z: f64,
    pub k_zoom: f64,
}

impl Default for OrientationRates {
    fn default() -> Self {
        Self {
            k_x: 0.1,
            k_y: 0.1,
            k_z: 0.05,
            k_zoom: 0.1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientationState {
    /// Camera position, at the current orbit distance from the origin.
    pub position: DVec3,
    /// Unit up vector, orthogonal to `position`.
    pub up: DVec3,
    /// Direction towards the directional light (co-located with the camera).
    pub light: DVec3,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrbitLimits {
    pub distance: f64,
    pub min_distance: f64,
    pub max_distance: f64,
}

impl Default for OrbitLimits {
    fn default() -> Self {
        Self {
            distance: 5.0,
            min_distance: 4.0,
            max_distance: 20.0,
        }
    }
}

pub struct OrientationIntegrator {
    position: DVec3,
    up: DVec3,
    distance: f64,
    limits: OrbitLimits,
    rates: OrientationRates,
}

impl OrientationIntegrator {
    pub fn new(limits: OrbitLimits, rates: OrientationRates) -> Self {
        Self {
            position: DVec3::X * limits.distance,
            up: DVec3::Y,
            distance: limits.distance,
            limits,
            rates,
        }
    }

    /// Start from an arbitrary frame. The frame is repaired on the next step
    /// if it is not orthonormal.
    pub fn with_state(mut self, position: DVec3, up: DVec3) -> Self {
        self.position = position;
        self.up = up;
        self.distance = position.length();
        self
    }

    pub fn state(&self) -> OrientationState {
        OrientationState {
            position: self.position,
            up: self.up,
            light: self.position,
        }
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn reset(&mut self) {
        self.position = DVec3::X * self.limits.distance;
        self.up = DVec3::Y;
        self.distance = self.limits.distance;
    }

    pub fn step(&mut self, delta: &InputDelta) -> OrientationState {
        if self.position.length_squared() < DEGENERATE_EPS {
            log::debug!("camera collapsed onto the origin, restoring default direction");
            self.position = DVec3::X * self.distance;
        }

        let right = match axis(self.up.cross(self.position)) {
            Ok(right) => right,
            Err(e) => {
                log::debug!("{e}, resetting up");
                self.up = default_up(self.position.normalize());
                self.up.cross(self.position).normalize()
            }
        };

        self.position += right * (delta.x * self.rates.k_x) + self.up * (delta.y * self.rates.k_y);
        let normal = self.position.normalize();

        self.distance = (self.distance + delta.zoom * self.rates.k_zoom)
            .clamp(self.limits.min_distance, self.limits.max_distance);
        self.position = normal * self.distance;

        self.up = match axis(self.up - normal * self.up.dot(normal)) {
            Ok(up) => up,
            Err(e) => {
                log::debug!("{e}, resetting up");
                default_up(normal)
            }
        };

        if delta.z != 0.0 {
            let roll = DQuat::from_axis_angle(normal, delta.z * self.rates.k_z);
            self.up = (roll * self.up).normalize();
        }

        self.state()
    }
}

fn axis(v: DVec3) -> Result<DVec3, DegenerateOrientation> {
    if v.length_squared() < DEGENERATE_EPS || !v.is_finite() {
        return Err(DegenerateOrientation);
    }
    Ok(v.normalize())
}

/// `+Y` projected off `normal`, or `+Z` when looking along Y.
fn default_up(normal: DVec3) -> DVec3 {
    let fallback = if normal.dot(DVec3::Y).abs() > 0.99 {
        DVec3::Z
    } else {
        DVec3::Y
    };
    (fallback - normal * fallback.dot(normal)).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    const EPS: f64 = 1e-9;

    fn assert_orthonormal(state: &OrientationState) {
        let n = state.position.normalize();
        assert!((state.up.length() - 1.0).abs() < EPS, "|up| = {}", state.up.length());
        assert!(state.up.dot(n).abs() < EPS, "up . n = {}", state.up.dot(n));
    }

    fn integrator() -> OrientationIntegrator {
        OrientationIntegrator::new(OrbitLimits::default(), OrientationRates::default())
    }

    #[test]
    fn test_initial_state() {
        let orient = integrator();
        let state = orient.state();
        assert_eq!(state.position, DVec3::new(5.0, 0.0, 0.0));
        assert_eq!(state.up, DVec3::Y);
        assert_eq!(state.light, state.position);
    }

    #[test]
    fn test_orthonormal_over_random_sequences() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut orient = integrator();
        for _ in 0..10_000 {
            let delta = InputDelta {
                x: rng.random_range(-3.0..3.0),
                y: rng.random_range(-3.0..3.0),
                z: rng.random_range(-3.0..3.0),
                twist: 0.0,
                zoom: 0.0,
            };
            let state = orient.step(&delta);
            assert_orthonormal(&state);
            assert!((state.position.length() - 5.0).abs() < 1e-9);
            assert_eq!(state.light, state.position);
        }
    }

    #[test]
    fn test_horizontal_delta_orbits_around_up() {
        let mut orient = integrator();
        let state = orient.step(&InputDelta { x: 1.0, ..Default::default() });
        // right = Y x X = -Z
        assert!(state.position.z < 0.0);
        assert!(state.position.y.abs() < EPS);
        assert!((state.up - DVec3::Y).length() < EPS);
    }

    #[test]
    fn test_vertical_delta_tilts_up() {
        let mut orient = integrator();
        let state = orient.step(&InputDelta { y: 1.0, ..Default::default() });
        assert!(state.position.y > 0.0);
        assert!(state.up.x < 0.0);
        assert_orthonormal(&state);
    }

    #[test]
    fn test_roll_rotates_up_only() {
        let mut orient = integrator();
        let angle = std::f64::consts::FRAC_PI_2 / 0.05;
        let state = orient.step(&InputDelta { z: angle, ..Default::default() });
        assert!((state.position - DVec3::new(5.0, 0.0, 0.0)).length() < EPS);
        assert!((state.up - DVec3::Z).length() < 1e-9);
    }

    #[test]
    fn test_degenerate_up_recovers() {
        let mut orient = integrator().with_state(DVec3::new(0.0, 5.0, 0.0), DVec3::Y);
        let state = orient.step(&InputDelta { x: 1.0, y: 1.0, ..Default::default() });
        assert_orthonormal(&state);
        assert!(state.position.is_finite());

        let mut orient = integrator().with_state(DVec3::new(5.0, 0.0, 0.0), DVec3::X);
        let state = orient.step(&InputDelta::default());
        assert_orthonormal(&state);
        assert!((state.up - DVec3::Y).length() < EPS);
    }

    #[test]
    fn test_zoom_clamps_distance() {
        let mut orient = integrator();
        for _ in 0..1000 {
            orient.step(&InputDelta { zoom: 1.0, ..Default::default() });
        }
        assert!((orient.distance() - 20.0).abs() < EPS);
        for _ in 0..1000 {
            orient.step(&InputDelta { zoom: -1.0, ..Default::default() });
        }
        assert!((orient.distance() - 4.0).abs() < EPS);
        orient.reset();
        assert_eq!(orient.state().position, DVec3::new(5.0, 0.0, 0.0));
    }
}
