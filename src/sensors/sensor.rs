use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::model::SensorModel;
use super::snapshot::{Capability, SensorSnapshot};
use crate::contracts::EventClass;
use crate::errors::Result;
use crate::transport::DeviceTransport;

/// Live handle to one child device
///
/// Readers load the current snapshot without locking; decodes publish a
/// replacement with a compare-and-swap so concurrent updates never lose
/// each other's fields.
#[derive(Debug)]
pub struct Sensor {
    identity: String,
    model: SensorModel,
    snapshot: ArcSwap<SensorSnapshot>,
}

impl Sensor {
    /// Build a sensor from its initial read payload
    ///
    /// # Errors
    /// Fails if the initial payload does not decode.
    pub fn new(identity: &str, model: SensorModel, init_data: &str) -> Result<Self> {
        let sensor = Self {
            identity: identity.to_string(),
            model,
            snapshot: ArcSwap::from_pointee(SensorSnapshot::default()),
        };
        sensor.update(init_data)?;
        Ok(sensor)
    }

    /// Build a sensor and subscribe it to its device's heartbeat and report events
    pub fn attach<T>(transport: &T, identity: &str, model: SensorModel, init_data: &str) -> Result<Arc<Self>>
    where
        T: DeviceTransport + ?Sized,
    {
        let sensor = Arc::new(Self::new(identity, model, init_data)?);

        let heartbeat = Arc::clone(&sensor);
        transport.register_heartbeat_consumer(
            identity,
            Arc::new(move |data: &str| heartbeat.on_event(EventClass::Heartbeat, data)),
        );

        let report = Arc::clone(&sensor);
        transport.register_report_consumer(
            identity,
            Arc::new(move |data: &str| report.on_event(EventClass::Report, data)),
        );

        Ok(sensor)
    }

    /// Event consumer entry point; failures are logged and the old snapshot kept
    pub fn on_event(&self, class: EventClass, data: &str) {
        if let Err(e) = self.update(data) {
            warn!(sid = %self.identity, class = class.as_str(), error = %e, "Dropping undecodable event");
        }
    }

    /// Decode `payload` and publish the resulting snapshot
    pub fn update(&self, payload: &str) -> Result<Arc<SensorSnapshot>> {
        let now = Utc::now();
        let mut current = self.snapshot.load_full();

        loop {
            let next = Arc::new(self.model.decode(&current, payload, now)?);
            let previous = self.snapshot.compare_and_swap(&current, Arc::clone(&next));

            if Arc::ptr_eq(&previous, &current) {
                debug!(
                    sid = %self.identity,
                    model = self.model.name(),
                    temperature = ?next.temperature,
                    humidity = ?next.humidity,
                    pressure = ?next.pressure,
                    voltage = ?next.voltage,
                    "New device data"
                );
                return Ok(next);
            }

            current = Guard::into_inner(previous);
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn model(&self) -> SensorModel {
        self.model
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        self.model.capabilities()
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.model.has(capability)
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<SensorSnapshot> {
        self.snapshot.load_full()
    }

    /// Reading for `capability`, `None` if the model lacks it or it was never reported
    pub fn reading(&self, capability: Capability) -> Option<f32> {
        if !self.has(capability) {
            return None;
        }
        self.snapshot.load().reading(capability)
    }

    pub fn temperature(&self) -> Option<f32> {
        self.reading(Capability::Thermometer)
    }

    pub fn humidity(&self) -> Option<f32> {
        self.reading(Capability::Hygrometer)
    }

    pub fn pressure(&self) -> Option<f32> {
        self.reading(Capability::Barometer)
    }

    pub fn battery_voltage(&self) -> Option<f32> {
        self.reading(Capability::Battery)
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.snapshot.load().last_update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GatewayError;
    use approx::assert_relative_eq;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let sensor = Sensor::new(
            "158d0001",
            SensorModel::SensorHt,
            r#"{"voltage":3000,"temperature":"215","humidity":"612"}"#,
        )
        .unwrap();

        assert_relative_eq!(sensor.battery_voltage().unwrap(), 3.0);
        assert_relative_eq!(sensor.temperature().unwrap(), 2.15);
        assert_relative_eq!(sensor.humidity().unwrap(), 6.12);
        let first_update = sensor.last_update().unwrap();

        thread::sleep(Duration::from_millis(5));
        sensor.update(r#"{"temperature":"220"}"#).unwrap();

        assert_relative_eq!(sensor.temperature().unwrap(), 2.20);
        assert_relative_eq!(sensor.battery_voltage().unwrap(), 3.0);
        assert_relative_eq!(sensor.humidity().unwrap(), 6.12);
        assert!(sensor.last_update().unwrap() > first_update);
    }

    #[test]
    fn test_weather_pressure() {
        let sensor = Sensor::new(
            "158d0002",
            SensorModel::WeatherV1,
            r#"{"voltage":3000,"temperature":"215","humidity":"612","pressure":"1013"}"#,
        )
        .unwrap();

        assert_relative_eq!(sensor.pressure().unwrap(), 1013.0);
        assert_relative_eq!(sensor.temperature().unwrap(), 2.15);

        sensor.update(r#"{"temperature":"220"}"#).unwrap();
        assert_relative_eq!(sensor.pressure().unwrap(), 1013.0);
        assert_relative_eq!(sensor.temperature().unwrap(), 2.20);
    }

    #[test]
    fn test_failed_decode_keeps_snapshot() {
        let sensor = Sensor::new("158d0001", SensorModel::SensorHt, r#"{"temperature":"215"}"#).unwrap();
        let before = sensor.snapshot();

        let err = sensor.update(r#"{"voltage":2800,"temperature":"hot"}"#).unwrap_err();
        assert!(matches!(err, GatewayError::FieldDecode { field: "temperature", .. }));

        let after = sensor.snapshot();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(sensor.battery_voltage(), None);

        sensor.on_event(EventClass::Report, "not json");
        assert!(Arc::ptr_eq(&before, &sensor.snapshot()));
    }

    #[test]
    fn test_invalid_initial_payload() {
        assert!(Sensor::new("158d0001", SensorModel::SensorHt, r#"{"humidity":"x"}"#).is_err());
    }

    #[test]
    fn test_barometer_absent_on_sensor_ht() {
        let sensor = Sensor::new("158d0001", SensorModel::SensorHt, r#"{"pressure":"1013"}"#).unwrap();
        assert_eq!(sensor.pressure(), None);
        assert_eq!(sensor.capabilities().len(), 3);
    }

    #[test]
    fn test_concurrent_updates_keep_all_fields() {
        let sensor = Arc::new(Sensor::new("158d0001", SensorModel::WeatherV1, "{}").unwrap());

        let payloads = [
            r#"{"voltage":3100}"#,
            r#"{"temperature":"2300"}"#,
            r#"{"humidity":"4500"}"#,
            r#"{"pressure":"100600"}"#,
        ];
        let handles: Vec<_> = payloads
            .iter()
            .map(|payload| {
                let sensor = Arc::clone(&sensor);
                let payload = payload.to_string();
                thread::spawn(move || {
                    for _ in 0..100 {
                        sensor.update(&payload).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = sensor.snapshot();
        assert_relative_eq!(snapshot.voltage.unwrap(), 3.1);
        assert_relative_eq!(snapshot.temperature.unwrap(), 23.0);
        assert_relative_eq!(snapshot.humidity.unwrap(), 45.0);
        assert_relative_eq!(snapshot.pressure.unwrap(), 100600.0);
    }
}
