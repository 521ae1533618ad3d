/// Supported device models and their payload decoding
///
/// Payload fields are independently optional. An absent field keeps the
/// previous reading; a present field that does not parse fails the whole
/// decode so the previous snapshot stays in place.
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::snapshot::{Capability, SensorSnapshot};
use crate::errors::{GatewayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorModel {
    /// Temperature/humidity sensor
    SensorHt,
    /// Temperature/humidity/pressure weather sensor
    WeatherV1,
}

/// Wire payload shared by the climate models
///
/// Voltage is integer millivolts; the rest are decimal strings.
#[derive(Debug, Deserialize)]
struct ClimatePayload {
    voltage: Option<i64>,
    temperature: Option<String>,
    humidity: Option<String>,
    pressure: Option<String>,
}

impl SensorModel {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sensor_ht" => Some(Self::SensorHt),
            "weather.v1" => Some(Self::WeatherV1),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SensorHt => "sensor_ht",
            Self::WeatherV1 => "weather.v1",
        }
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Self::SensorHt => &[Capability::Battery, Capability::Thermometer, Capability::Hygrometer],
            Self::WeatherV1 => &[
                Capability::Battery,
                Capability::Thermometer,
                Capability::Hygrometer,
                Capability::Barometer,
            ],
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Decode `payload` on top of `previous`, stamping `now` on success
    pub fn decode(&self, previous: &SensorSnapshot, payload: &str, now: DateTime<Utc>) -> Result<SensorSnapshot> {
        let fields: ClimatePayload = serde_json::from_str(payload)
            .map_err(|e| GatewayError::DeserializationError(format!("failed to parse data: {}", e)))?;

        let mut next = previous.clone();

        if let Some(millivolts) = fields.voltage {
            next.voltage = Some(millivolts as f32 / 1000.0);
        }

        if let Some(raw) = fields.temperature {
            next.temperature = Some(parse_scaled("temperature", &raw, 100.0)?);
        }

        if let Some(raw) = fields.humidity {
            next.humidity = Some(parse_scaled("humidity", &raw, 100.0)?);
        }

        if self.has(Capability::Barometer) {
            if let Some(raw) = fields.pressure {
                next.pressure = Some(parse_scaled("pressure", &raw, 1.0)?);
            }
        }

        next.last_update = Some(now);
        Ok(next)
    }
}

fn parse_scaled(field: &'static str, raw: &str, divisor: f32) -> Result<f32> {
    raw.parse::<i32>()
        .map(|value| value as f32 / divisor)
        .map_err(|_| GatewayError::FieldDecode {
            field,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_names() {
        assert_eq!(SensorModel::from_name("sensor_ht"), Some(SensorModel::SensorHt));
        assert_eq!(SensorModel::from_name("weather.v1"), Some(SensorModel::WeatherV1));
        assert_eq!(SensorModel::from_name("magnet"), None);
        assert_eq!(SensorModel::WeatherV1.name(), "weather.v1");
    }

    #[test]
    fn test_capabilities() {
        assert!(!SensorModel::SensorHt.has(Capability::Barometer));
        assert!(SensorModel::WeatherV1.has(Capability::Barometer));
        assert!(SensorModel::SensorHt.has(Capability::Battery));
    }

    #[test]
    fn test_scaling() {
        let now = Utc::now();
        let snapshot = SensorModel::SensorHt
            .decode(
                &SensorSnapshot::default(),
                r#"{"voltage":3000,"temperature":"-150","humidity":"612"}"#,
                now,
            )
            .unwrap();

        assert_eq!(snapshot.voltage, Some(3.0));
        assert_eq!(snapshot.temperature, Some(-1.5));
        assert_eq!(snapshot.humidity, Some(6.12));
        assert_eq!(snapshot.last_update, Some(now));
    }

    #[test]
    fn test_pressure_ignored_without_barometer() {
        let snapshot = SensorModel::SensorHt
            .decode(&SensorSnapshot::default(), r#"{"pressure":"1013"}"#, Utc::now())
            .unwrap();
        assert_eq!(snapshot.pressure, None);

        let snapshot = SensorModel::WeatherV1
            .decode(&SensorSnapshot::default(), r#"{"pressure":"1013"}"#, Utc::now())
            .unwrap();
        assert_eq!(snapshot.pressure, Some(1013.0));
    }

    #[test]
    fn test_unparsable_field_fails_whole_decode() {
        let err = SensorModel::WeatherV1
            .decode(
                &SensorSnapshot::default(),
                r#"{"voltage":2900,"humidity":"wet"}"#,
                Utc::now(),
            )
            .unwrap_err();

        match err {
            GatewayError::FieldDecode { field, value } => {
                assert_eq!(field, "humidity");
                assert_eq!(value, "wet");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_wrong_json_type_rejected() {
        assert!(SensorModel::SensorHt
            .decode(&SensorSnapshot::default(), r#"{"voltage":"3000"}"#, Utc::now())
            .is_err());
        assert!(SensorModel::SensorHt
            .decode(&SensorSnapshot::default(), "", Utc::now())
            .is_err());
    }
}
