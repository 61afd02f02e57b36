//! Outbound wire commands
//!
//! The panel controller speaks a line-based ASCII protocol. Commands are
//! fire-and-forget: the controller does not acknowledge them, which is why
//! the runtime periodically re-sends everything (glitch clearing).

/// A command for the panel controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Move a gauge servo. Value range 0-180.
    SetGauge { board: u8, channel: u8, value: u8 },
    /// Set a LED PWM duty. Value range 0-255.
    SetLed { board: u8, channel: u8, value: u8 },
    /// Show text on a display board. Rendered right-aligned in 5 cells.
    SetText { board: u8, text: String },
    /// Re-initialize the LED drivers on a board
    ResetLeds { board: u8 },
}

/// Width of the alphanumeric displays
pub const DISPLAY_WIDTH: usize = 5;

impl Command {
    /// Encode to one protocol line (including the terminating newline)
    pub fn encode(&self) -> String {
        match self {
            Command::SetGauge {
                board,
                channel,
                value,
            } => format!("G{:02X}{:02X}{:02X}\n", board, channel, value),
            Command::SetLed {
                board,
                channel,
                value,
            } => format!("L{:02X}{:02X}{:02X}\n", board, channel, value),
            Command::SetText { board, text } => {
                format!("T{:02X}{}\n", board, render_display_text(text))
            }
            Command::ResetLeds { board } => format!("R{:02X}\n", board),
        }
    }
}

/// Right-align text into the display cells, truncating from the left when
/// it is too long (the rightmost characters matter for counters).
pub fn render_display_text(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let visible: String = if chars.len() > DISPLAY_WIDTH {
        chars[chars.len() - DISPLAY_WIDTH..].iter().collect()
    } else {
        chars.iter().collect()
    };
    format!("{:>width$}", visible, width = DISPLAY_WIDTH)
}
