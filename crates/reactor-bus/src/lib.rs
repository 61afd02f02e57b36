//! reactor-bus - Device bus layer for the reactor console
//!
//! The console hardware (gauges, LEDs, display, switches) hangs off a
//! serial device bus. This crate provides:
//! - the device description file format and alias map
//! - the line-based wire codec (commands out, events in)
//! - the [`BusTransport`] trait with serial and mock adapters
//!
//! # Example
//!
//! ```ignore
//! use reactor_bus::{create_transport, Command, TransportConfig};
//!
//! let config = TransportConfig::Mock(Default::default());
//! let transport = create_transport(&config).await?;
//! transport.send(Command::SetGauge { board: 0, channel: 3, value: 90 }).await?;
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod transport;

pub use command::Command;
pub use config::{DeviceFile, Panel};
pub use error::BusError;
pub use event::{BusEvent, SwitchEvent};
pub use transport::{create_transport, BusTransport, MockConfig, TransportConfig};
