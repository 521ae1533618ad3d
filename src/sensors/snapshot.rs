use chrono::{DateTime, Utc};
use serde::Serialize;

/// Measurement components a device may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Thermometer,
    Hygrometer,
    /// Pressure as reported by the device, in pascals
    Barometer,
    Battery,
}

/// Latest decoded readings of one device
///
/// Never mutated after publication; a decode builds a new value from the
/// previous one. A reading stays `None` until the device first reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorSnapshot {
    /// Battery voltage in volts
    pub voltage: Option<f32>,

    /// Temperature in degrees Celsius
    pub temperature: Option<f32>,

    /// Relative humidity in percent
    pub humidity: Option<f32>,

    pub pressure: Option<f32>,

    /// Time of the last successful decode
    pub last_update: Option<DateTime<Utc>>,
}

impl SensorSnapshot {
    /// Reading for a capability, if one has been reported
    pub fn reading(&self, capability: Capability) -> Option<f32> {
        match capability {
            Capability::Thermometer => self.temperature,
            Capability::Hygrometer => self.humidity,
            Capability::Barometer => self.pressure,
            Capability::Battery => self.voltage,
        }
    }
}
