use num_traits::{Float, FromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A trait for types the expression VM can compute with.
/// Must support floating-point arithmetic, debug printing, and conversion
/// from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Timing information handed to every lifecycle invocation by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickInfo {
    /// Simulation time of the current tick.
    pub time: f64,
    /// Step size between ticks.
    pub dt: f64,
}

/// The messaging substrate as seen from a simulation object.
///
/// Output ports are fire-and-forget; `request_values` is a blocking gather
/// from all connected pull sources, in connection order. It must return
/// before evaluation proceeds.
pub trait Ports {
    fn request_values(&mut self) -> Vec<f64>;
    fn value_out(&mut self, value: f64);
    fn derivative_out(&mut self, value: f64);
    fn rate_out(&mut self, value: f64);
}

/// Ports implementation for an object with no connections.
/// Pulls return nothing and outputs go nowhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPorts;

impl Ports for NullPorts {
    fn request_values(&mut self) -> Vec<f64> {
        Vec::new()
    }
    fn value_out(&mut self, _value: f64) {}
    fn derivative_out(&mut self, _value: f64) {}
    fn rate_out(&mut self, _value: f64) {}
}

/// Lifecycle contract with the scheduler.
///
/// Both entry points are invoked exactly once per tick per object and never
/// overlap on the same object. `reinit` restarts the object at the given
/// time; `process` advances it by one tick.
pub trait Tickable {
    fn reinit(&mut self, info: &TickInfo, ports: &mut dyn Ports);
    fn process(&mut self, info: &TickInfo, ports: &mut dyn Ports);
}
