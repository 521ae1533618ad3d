use std::sync::Arc;

use tracing::{info, warn};

use super::model::SensorModel;
use super::sensor::Sensor;
use crate::errors::Result;
use crate::transport::DeviceTransport;

/// Builds the typed sensor collection at startup
pub struct DeviceFactory;

impl DeviceFactory {
    /// List child devices, read each one and build its typed sensor
    ///
    /// Any listing, read or initial-decode failure aborts the whole
    /// bootstrap; no partial collection is returned. Devices of unknown
    /// models are skipped.
    pub async fn bootstrap<T>(transport: &T) -> Result<Vec<Arc<Sensor>>>
    where
        T: DeviceTransport + ?Sized,
    {
        let identities = transport.list_child_device_identities().await?;
        info!(devices = ?identities, "Child devices listed");

        let mut sensors = Vec::with_capacity(identities.len());
        for identity in &identities {
            let info = transport
                .read_device(identity)
                .await
                .map_err(|e| e.context(format!("failed to read device '{}' info", identity)))?;

            let Some(model) = SensorModel::from_name(&info.model) else {
                warn!(sid = %identity, model = %info.model, "Unsupported device model, skipping");
                continue;
            };

            let sensor = Sensor::attach(transport, identity, model, &info.data).map_err(|e| {
                e.context(format!(
                    "failed to create {} with sid '{}', can't parse init data",
                    model.name(),
                    identity
                ))
            })?;
            sensors.push(sensor);
        }

        Ok(sensors)
    }
}
