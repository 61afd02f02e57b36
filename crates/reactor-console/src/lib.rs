//! reactor-console - Runtime for the reactor console prop
//!
//! Ties the device bus to the game-state backend: keeps the console state
//! (gauges, LEDs, display), runs the 25 Hz update loop and its visual
//! effects, reacts to switch events and synchronizes with the backend
//! through a task runner.

pub mod config;
pub mod effects;
pub mod error;
pub mod hardware;
pub mod runtime;
pub mod state;
pub mod sync;

pub use config::ConsoleConfig;
pub use error::RuntimeError;
pub use hardware::Hardware;
pub use runtime::ConsoleRuntime;
pub use state::ConsoleState;
pub use sync::{HttpBackend, MockBackend, RunnerOptions, TaskRunner};
