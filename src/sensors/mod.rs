/// Typed sensors behind the gateway
///
/// A sensor is built from the model name and payload returned by a device
/// read, then subscribes itself to that device's heartbeat and report
/// events. Every successful decode publishes a new immutable snapshot.

pub mod snapshot;
pub mod model;
pub mod sensor;
pub mod factory;

pub use factory::DeviceFactory;
pub use model::SensorModel;
pub use sensor::Sensor;
pub use snapshot::{Capability, SensorSnapshot};
