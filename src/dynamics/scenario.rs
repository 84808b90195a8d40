use log::warn;
use nalgebra::Vector3;

use super::multibody::MultiBody;
use crate::error::PhysicsResult;

/// Per-object hooks run around a multibody's integration step.
pub trait Scenario: Send + Sync {
    /// Called once by [`MultiBody::initialize`].
    fn setup(&mut self, _body: &mut MultiBody) -> PhysicsResult<()> {
        Ok(())
    }

    /// Called every tick after external forces are cleared and before integration.
    fn control(&mut self, _body: &mut MultiBody, _dt: f64) {}

    /// Called every tick after integration with the simulated time.
    fn record(&mut self, _body: &MultiBody, _time: f64) {}
}

/// Applies the same world-frame torque to one link every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantTorque {
    pub link: usize,
    pub torque: Vector3<f64>,
}

impl ConstantTorque {
    pub fn new(link: usize, torque: Vector3<f64>) -> Self {
        Self { link, torque }
    }
}

impl Scenario for ConstantTorque {
    fn setup(&mut self, body: &mut MultiBody) -> PhysicsResult<()> {
        body.link(self.link).map(|_| ())
    }

    fn control(&mut self, body: &mut MultiBody, _dt: f64) {
        if let Err(err) = body.apply_external_force(self.link, Vector3::zeros(), self.torque) {
            warn!("constant torque skipped: {err}");
        }
    }
}

/// Samples a link's world position after every tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkTrace {
    pub link: usize,
    pub samples: Vec<(f64, Vector3<f64>)>,
}

impl LinkTrace {
    pub fn new(link: usize) -> Self {
        Self {
            link,
            samples: Vec::new(),
        }
    }
}

impl Scenario for LinkTrace {
    fn setup(&mut self, body: &mut MultiBody) -> PhysicsResult<()> {
        body.link(self.link).map(|_| ())
    }

    fn record(&mut self, body: &MultiBody, time: f64) {
        if let Ok(position) = body.link_position(self.link) {
            self.samples.push((time, position));
        }
    }
}
