//! Transport layer for the panel link
//!
//! - Serial adapter for the real hardware (USB serial controller)
//! - Mock adapter for testing
//!
//! Commands are fire-and-forget; inbound events fan out over a broadcast
//! channel so the runtime and any diagnostics can listen independently.

mod mock;

#[cfg(feature = "serial")]
mod serial;

pub use mock::MockBusTransport;

#[cfg(feature = "serial")]
pub use serial::SerialBusTransport;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::command::Command;
use crate::error::BusError;
use crate::event::BusEvent;

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Serial link to the panel controller
    Serial(SerialConfig),
    /// Mock transport for testing
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

/// Serial link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path (e.g. "/dev/ttyUSB0")
    pub path: String,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    115200
}

/// Mock transport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated per-command latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
}

/// Transport-agnostic interface to the panel controller
#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Send a command. The controller does not acknowledge; errors only
    /// reflect local write failures.
    async fn send(&self, command: Command) -> Result<(), BusError>;

    /// Subscribe to inbound events (switch changes, status lines)
    fn subscribe(&self) -> broadcast::Receiver<BusEvent>;

    /// Check if the transport is connected
    async fn is_connected(&self) -> bool;

    /// Attempt to reconnect if disconnected
    async fn reconnect(&self) -> Result<(), BusError>;
}

/// Create a transport based on configuration
pub async fn create_transport(
    config: &TransportConfig,
) -> Result<Arc<dyn BusTransport>, BusError> {
    match config {
        #[cfg(feature = "serial")]
        TransportConfig::Serial(cfg) => {
            let adapter = serial::SerialBusTransport::connect(cfg).await?;
            Ok(Arc::new(adapter))
        }
        #[cfg(not(feature = "serial"))]
        TransportConfig::Serial(_) => Err(BusError::Unsupported(
            "serial transport requires the 'serial' feature".to_string(),
        )),
        TransportConfig::Mock(cfg) => {
            let adapter = mock::MockBusTransport::new(cfg);
            Ok(Arc::new(adapter))
        }
    }
}
