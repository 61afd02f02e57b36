//! Mapping console state onto bus commands
//!
//! Translates aliased, normalized state values into addressed wire
//! commands and pushes them to the transport. Commands are sent
//! sequentially with a small delay in between: the controller does not
//! acknowledge writes, so we avoid flooding it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reactor_bus::config::{ChannelKind, Panel};
use reactor_bus::{BusTransport, Command};
use tracing::{debug, error, warn};

use crate::error::RuntimeError;
use crate::state::{ConsoleState, COLORLED_COUNT};

/// LED board carrying the color LED clusters (they have no aliases; the
/// wiring puts them all on the second LED driver board).
pub const COLORLED_BOARD: u8 = 1;

/// Delay between commands when sending a batch
const SEND_SPACING: Duration = Duration::from_millis(1);

/// Addressed view of the panel plus the transport to reach it
pub struct Hardware {
    panel: Arc<Panel>,
    transport: Arc<dyn BusTransport>,
    display_board: u8,
    led_boards: Vec<u8>,
}

impl Hardware {
    pub fn new(panel: Arc<Panel>, transport: Arc<dyn BusTransport>) -> Result<Self, RuntimeError> {
        let display_board = panel
            .aliases_of(ChannelKind::Display)
            .first()
            .and_then(|alias| panel.resolve(alias))
            .map(|c| c.board)
            .ok_or_else(|| {
                RuntimeError::Config(format!(
                    "panel '{}' has no display board",
                    panel.name()
                ))
            })?;

        let mut led_boards: Vec<u8> = panel
            .aliases_of(ChannelKind::Led)
            .iter()
            .filter_map(|alias| panel.resolve(alias))
            .map(|c| c.board)
            .collect();
        led_boards.push(COLORLED_BOARD);
        led_boards.sort_unstable();
        led_boards.dedup();

        Ok(Self {
            panel,
            transport,
            display_board,
            led_boards,
        })
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    pub fn transport(&self) -> &Arc<dyn BusTransport> {
        &self.transport
    }

    /// Command to bring a gauge to its current state value
    pub fn gauge_command(&self, state: &ConsoleState, alias: &str) -> Option<Command> {
        let value = state.gauge_hw(alias)?;
        let Some(channel) = self.panel.resolve(alias).filter(|c| c.kind == ChannelKind::Gauge)
        else {
            error!(%alias, "invalid gauge alias");
            return None;
        };
        Some(Command::SetGauge {
            board: channel.board,
            channel: channel.channel,
            value,
        })
    }

    /// Command to bring a top-LED to its current state value
    pub fn topled_command(&self, state: &ConsoleState, alias: &str) -> Option<Command> {
        let value = state.topled_hw(alias)?;
        let Some(channel) = self.panel.resolve(alias).filter(|c| c.kind == ChannelKind::Led)
        else {
            error!(%alias, "invalid top-LED alias");
            return None;
        };
        Some(Command::SetLed {
            board: channel.board,
            channel: channel.channel,
            value,
        })
    }

    /// Command to bring one color cluster to its current state value
    pub fn colorled_command(&self, state: &ConsoleState, idx: usize) -> Command {
        Command::SetLed {
            board: COLORLED_BOARD,
            channel: idx as u8,
            value: state.colorled_hw(idx),
        }
    }

    /// Command to show the current display text
    pub fn text_command(&self, state: &ConsoleState) -> Command {
        Command::SetText {
            board: self.display_board,
            text: state.toptext.clone(),
        }
    }

    /// Commands re-initializing every LED driver board
    pub fn reset_led_commands(&self) -> Vec<Command> {
        self.led_boards
            .iter()
            .map(|&board| Command::ResetLeds { board })
            .collect()
    }

    /// Everything: all gauges, top-LEDs, color clusters and the display
    pub fn full_update_commands(&self, state: &ConsoleState) -> Vec<Command> {
        let mut commands = Vec::new();
        for alias in state.gauge_values.keys() {
            commands.extend(self.gauge_command(state, alias));
        }
        for alias in state.topled_values.keys() {
            commands.extend(self.topled_command(state, alias));
        }
        for idx in 0..COLORLED_COUNT {
            commands.push(self.colorled_command(state, idx));
        }
        commands.push(self.text_command(state));
        commands
    }

    /// Send one command; failures are logged, not fatal (the periodic full
    /// update repairs whatever a dropped command left behind)
    pub async fn send(&self, command: Command) {
        if let Err(e) = self.transport.send(command).await {
            warn!(%e, "bus send failed");
        }
    }

    /// Send a batch sequentially, rate-limited
    pub async fn send_all(&self, commands: Vec<Command>) {
        let started = Instant::now();
        let rate_limit = commands.len() > 1;
        let count = commands.len();
        for command in commands {
            self.send(command).await;
            if rate_limit {
                tokio::time::sleep(SEND_SPACING).await;
            }
        }
        debug!(
            count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "command batch done"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reactor_bus::transport::MockBusTransport;
    use reactor_bus::{DeviceFile, MockConfig};

    const PANEL_YAML: &str = r#"
panel:
  gauge_boards:
    - channels:
        - { index: 0, alias: rod_1_1_gauge }
  led_boards:
    - channels:
        - { index: 0, alias: rod_1_1_led }
  display_boards:
    - { alias: toptext }
  switch_banks:
    - switches:
        - { index: 0, alias: rod_1_1_up }
"#;

    fn test_hardware() -> (Hardware, Arc<MockBusTransport>) {
        let panel = DeviceFile::from_yaml(PANEL_YAML)
            .unwrap()
            .panel("panel")
            .unwrap();
        let transport = Arc::new(MockBusTransport::new(&MockConfig::default()));
        let hardware = Hardware::new(Arc::new(panel), transport.clone()).unwrap();
        (hardware, transport)
    }

    #[test]
    fn commands_resolve_addresses() {
        let (hardware, _) = test_hardware();
        let mut state = ConsoleState::default();
        state.reset_from_aliases(["rod_1_1_gauge", "rod_1_1_led"].into_iter());
        state.gauge_values.insert("rod_1_1_gauge".to_string(), 1.0);

        assert_eq!(
            hardware.gauge_command(&state, "rod_1_1_gauge"),
            Some(Command::SetGauge {
                board: 0,
                channel: 0,
                value: 180
            })
        );
        assert_eq!(hardware.gauge_command(&state, "rod_9_9_gauge"), None);
        assert_eq!(
            hardware.text_command(&state),
            Command::SetText {
                board: 0,
                text: String::new()
            }
        );
        // reset covers the top-LED board and the color cluster board
        assert_eq!(hardware.reset_led_commands().len(), 2);
    }

    #[test]
    fn full_update_covers_everything() {
        let (hardware, _) = test_hardware();
        let mut state = ConsoleState::default();
        state.reset_from_aliases(["rod_1_1_gauge", "rod_1_1_led"].into_iter());
        let commands = hardware.full_update_commands(&state);
        // 1 gauge + 1 top-LED + 32 clusters + text
        assert_eq!(commands.len(), 1 + 1 + COLORLED_COUNT + 1);
    }

    #[tokio::test]
    async fn send_all_reaches_transport() {
        let (hardware, transport) = test_hardware();
        let state = ConsoleState::default();
        hardware
            .send_all(vec![
                hardware.text_command(&state),
                hardware.colorled_command(&state, 0),
            ])
            .await;
        assert_eq!(transport.sent().len(), 2);
    }

    #[test]
    fn missing_display_board_is_a_config_error() {
        let panel = DeviceFile::from_yaml("panel:\n  gauge_boards: []\n")
            .unwrap()
            .panel("panel")
            .unwrap();
        let transport = Arc::new(MockBusTransport::new(&MockConfig::default()));
        assert!(Hardware::new(Arc::new(panel), transport).is_err());
    }
}
