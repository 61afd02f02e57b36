//! Bus layer errors

use thiserror::Error;

/// Errors from device file loading, codec and transports
#[derive(Debug, Error)]
pub enum BusError {
    /// Device description file could not be parsed
    #[error("device file error: {0}")]
    Config(String),

    /// The same alias appears on more than one channel
    #[error("duplicate alias in device file: {0}")]
    DuplicateAlias(String),

    /// The requested panel is not in the device file
    #[error("unknown panel: {0}")]
    UnknownPanel(String),

    /// Transport is not connected
    #[error("transport disconnected")]
    Disconnected,

    /// Serial port failure
    #[error("serial port error: {0}")]
    Serial(String),

    /// An inbound line did not match the wire protocol
    #[error("malformed event line: {0:?}")]
    MalformedEvent(String),

    /// Transport type not compiled in
    #[error("unsupported transport: {0}")]
    Unsupported(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
