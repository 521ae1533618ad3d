/// JSON view of the sensor collection
///
/// This is the shape the presentation layer serves: one entry per sensor,
/// with battery voltage turned into a charge percentage and the snapshot
/// age in seconds. Readings a model does not have are omitted.
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::{GatewayError, Result};
use crate::gateway::SensorSource;
use crate::sensors::{Capability, Sensor};

/// Voltage of a full CR2032 cell under load
pub const MAX_BATTERY_VOLTAGE: f32 = 3.10;

/// Voltage below which the sensor stops reporting reliably
pub const MIN_BATTERY_VOLTAGE: f32 = 2.82;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReport {
    pub sid: String,
    pub model: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_sec: Option<u64>,
}

impl SensorReport {
    pub fn from_sensor(sensor: &Sensor, now: DateTime<Utc>) -> Self {
        let snapshot = sensor.snapshot();
        let reading = |capability: Capability| {
            if sensor.has(capability) {
                snapshot.reading(capability)
            } else {
                None
            }
        };

        Self {
            sid: sensor.identity().to_string(),
            model: sensor.model().name(),
            battery_percent: reading(Capability::Battery).map(battery_level_from_voltage),
            temperature: reading(Capability::Thermometer),
            humidity: reading(Capability::Hygrometer),
            pressure: reading(Capability::Barometer),
            last_update_sec: snapshot
                .last_update
                .map(|at| (now - at).num_seconds().max(0) as u64),
        }
    }
}

/// Linear charge estimate between the minimum and maximum cell voltage
pub fn battery_level_from_voltage(voltage: f32) -> u8 {
    if voltage >= MAX_BATTERY_VOLTAGE {
        return 100;
    }
    if voltage <= MIN_BATTERY_VOLTAGE {
        return 0;
    }

    (((voltage - MIN_BATTERY_VOLTAGE) / (MAX_BATTERY_VOLTAGE - MIN_BATTERY_VOLTAGE)) * 100.0) as u8
}

/// Build reports for every sensor of `source`
pub fn collect<S: SensorSource + ?Sized>(source: &S, now: DateTime<Utc>) -> Vec<SensorReport> {
    source
        .list_sensors()
        .iter()
        .map(|sensor| SensorReport::from_sensor(sensor, now))
        .collect()
}

/// Serialize the reports of every sensor as a JSON array
pub fn render<S: SensorSource + ?Sized>(source: &S, now: DateTime<Utc>) -> Result<String> {
    serde_json::to_string(&collect(source, now))
        .map_err(|e| GatewayError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SensorModel;
    use chrono::Duration;
    use std::sync::Arc;

    struct Fixed(Vec<Arc<Sensor>>);

    impl SensorSource for Fixed {
        fn list_sensors(&self) -> Vec<Arc<Sensor>> {
            self.0.clone()
        }
    }

    #[test]
    fn test_battery_level_bounds() {
        assert_eq!(battery_level_from_voltage(3.3), 100);
        assert_eq!(battery_level_from_voltage(3.10), 100);
        assert_eq!(battery_level_from_voltage(2.82), 0);
        assert_eq!(battery_level_from_voltage(2.5), 0);
        assert_eq!(battery_level_from_voltage(2.9), 28);
    }

    #[test]
    fn test_report_omits_missing_readings() {
        let sensor = Sensor::new(
            "158d0001",
            SensorModel::SensorHt,
            r#"{"voltage":3000,"temperature":"2150"}"#,
        )
        .unwrap();
        let now = sensor.last_update().unwrap() + Duration::seconds(42);

        let report = SensorReport::from_sensor(&sensor, now);
        assert_eq!(report.sid, "158d0001");
        assert_eq!(report.model, "sensor_ht");
        assert_eq!(report.battery_percent, Some(64));
        assert_eq!(report.temperature, Some(21.5));
        assert_eq!(report.humidity, None);
        assert_eq!(report.pressure, None);
        assert_eq!(report.last_update_sec, Some(42));

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert!(json.get("humidity").is_none());
        assert!(json.get("pressure").is_none());
    }

    #[test]
    fn test_render_collection() {
        let source = Fixed(vec![
            Arc::new(Sensor::new("a", SensorModel::SensorHt, r#"{"humidity":"5000"}"#).unwrap()),
            Arc::new(Sensor::new("b", SensorModel::WeatherV1, r#"{"pressure":"100600"}"#).unwrap()),
        ]);

        let json = render(&source, Utc::now()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[0]["sid"], "a");
        assert_eq!(parsed[0]["humidity"], 50.0);
        assert_eq!(parsed[1]["model"], "weather.v1");
        assert_eq!(parsed[1]["pressure"], 100600.0);
    }
}
