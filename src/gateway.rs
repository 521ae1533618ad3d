/// Gateway facade
///
/// Runs the full bootstrap (transport handshake, device listing, per-device
/// reads) and exposes the resulting sensor collection. Startup is
/// all-or-nothing: on any failure the transport is stopped and no sensors
/// are ever published.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::info;

use crate::config::GatewayConfig;
use crate::errors::{GatewayError, Result};
use crate::sensors::{DeviceFactory, Sensor};
use crate::transport::Transport;

/// Read-only view of a sensor collection, for the presentation layer
pub trait SensorSource: Send + Sync {
    fn list_sensors(&self) -> Vec<Arc<Sensor>>;
}

pub struct Gateway {
    transport: Transport,
    sensors: OnceLock<Vec<Arc<Sensor>>>,
    started: AtomicBool,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        Ok(Self {
            transport: Transport::new(config)?,
            sensors: OnceLock::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Complete the bootstrap sequence before returning
    ///
    /// Only the first call bootstraps; later calls fail without touching the
    /// running transport.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(GatewayError::HandshakeFailed("gateway already started".to_string()));
        }

        match self.bootstrap().await {
            Ok(count) => {
                info!(sensors = count, "Gateway successfully started");
                Ok(())
            }
            Err(e) => {
                self.transport.stop();
                Err(e.context("failed to start gateway"))
            }
        }
    }

    async fn bootstrap(&self) -> Result<usize> {
        self.transport
            .start()
            .await
            .map_err(|e| e.context("failed to start transport"))?;

        let sensors = DeviceFactory::bootstrap(&self.transport)
            .await
            .map_err(|e| e.context("failed to get devices"))?;
        let count = sensors.len();

        self.sensors
            .set(sensors)
            .map_err(|_| GatewayError::HandshakeFailed("gateway already started".to_string()))?;
        Ok(count)
    }

    /// Signal shutdown and close the unicast socket without waiting for in-flight work
    pub fn stop(&self) {
        self.transport.stop();
    }

    /// Wait up to `timeout` for in-flight decode and event tasks after `stop`
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.transport.drain(timeout).await
    }

    /// Sensors built at startup; empty until `start` succeeds
    pub fn sensors(&self) -> &[Arc<Sensor>] {
        self.sensors.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}

impl SensorSource for Gateway {
    fn list_sensors(&self) -> Vec<Arc<Sensor>> {
        self.sensors().to_vec()
    }
}
