//! Device description file
//!
//! A human-authored YAML file enumerates the boards wired to each panel
//! and gives every channel an alias. The runtime only ever talks aliases;
//! the alias map built here resolves them to (board, channel) addresses.
//! The file is treated as read-only data: the packaging tooling copies it
//! verbatim next to the built artifact.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BusError;

/// Top-level device description: panel name -> board complement.
///
/// Keys are unique (YAML mapping, one panel per prop).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceFile {
    pub panels: BTreeMap<String, PanelConfig>,
}

/// Board complement of a single panel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelConfig {
    /// PWM servo boards driving the analog gauges
    #[serde(default)]
    pub gauge_boards: Vec<ChannelBoard>,
    /// PWM driver boards for the top-LEDs and color LED clusters
    #[serde(default)]
    pub led_boards: Vec<ChannelBoard>,
    /// Alphanumeric display boards
    #[serde(default)]
    pub display_boards: Vec<DisplayBoard>,
    /// Input banks reporting switch state changes
    #[serde(default)]
    pub switch_banks: Vec<SwitchBank>,
}

/// A board exposing aliased output channels
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelBoard {
    #[serde(default)]
    pub channels: Vec<ChannelDef>,
}

/// One output channel on a board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDef {
    pub index: u8,
    pub alias: String,
}

/// An alphanumeric display board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayBoard {
    pub alias: String,
}

/// An input bank
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchBank {
    #[serde(default)]
    pub switches: Vec<SwitchDef>,
}

/// One switch on an input bank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchDef {
    pub index: u8,
    pub alias: String,
    /// Most panel switches pull the line low when actuated
    #[serde(default = "default_active_low")]
    pub active_low: bool,
}

fn default_active_low() -> bool {
    true
}

/// What an alias points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Gauge,
    Led,
    Display,
    Switch,
}

/// Resolved address of an aliased channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRef {
    pub kind: ChannelKind,
    pub board: u8,
    pub channel: u8,
    /// Only meaningful for switches
    pub active_low: bool,
}

/// A panel with its alias map built and validated
#[derive(Debug, Clone)]
pub struct Panel {
    name: String,
    aliases: HashMap<String, ChannelRef>,
}

impl DeviceFile {
    /// Parse a device description from YAML text
    pub fn from_yaml(text: &str) -> Result<Self, BusError> {
        serde_yaml::from_str(text).map_err(|e| BusError::Config(e.to_string()))
    }

    /// Load a device description file from disk
    pub fn load(path: &Path) -> Result<Self, BusError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Build the alias map for one panel.
    ///
    /// Fails if the panel is missing or any alias appears twice.
    pub fn panel(&self, name: &str) -> Result<Panel, BusError> {
        let config = self
            .panels
            .get(name)
            .ok_or_else(|| BusError::UnknownPanel(name.to_string()))?;

        let mut aliases = HashMap::new();
        let mut insert = |alias: &str, channel: ChannelRef| -> Result<(), BusError> {
            if aliases.insert(alias.to_string(), channel).is_some() {
                return Err(BusError::DuplicateAlias(alias.to_string()));
            }
            Ok(())
        };

        for (board, b) in config.gauge_boards.iter().enumerate() {
            for ch in &b.channels {
                insert(
                    &ch.alias,
                    ChannelRef {
                        kind: ChannelKind::Gauge,
                        board: board as u8,
                        channel: ch.index,
                        active_low: false,
                    },
                )?;
            }
        }
        for (board, b) in config.led_boards.iter().enumerate() {
            for ch in &b.channels {
                insert(
                    &ch.alias,
                    ChannelRef {
                        kind: ChannelKind::Led,
                        board: board as u8,
                        channel: ch.index,
                        active_low: false,
                    },
                )?;
            }
        }
        for (board, b) in config.display_boards.iter().enumerate() {
            insert(
                &b.alias,
                ChannelRef {
                    kind: ChannelKind::Display,
                    board: board as u8,
                    channel: 0,
                    active_low: false,
                },
            )?;
        }
        for (bank, b) in config.switch_banks.iter().enumerate() {
            for sw in &b.switches {
                insert(
                    &sw.alias,
                    ChannelRef {
                        kind: ChannelKind::Switch,
                        board: bank as u8,
                        channel: sw.index,
                        active_low: sw.active_low,
                    },
                )?;
            }
        }

        Ok(Panel {
            name: name.to_string(),
            aliases,
        })
    }
}

impl Panel {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve an alias to its channel address
    pub fn resolve(&self, alias: &str) -> Option<&ChannelRef> {
        self.aliases.get(alias)
    }

    /// All aliases on this panel
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &ChannelRef)> {
        self.aliases.iter().map(|(a, c)| (a.as_str(), c))
    }

    /// Aliases of a given kind
    pub fn aliases_of(&self, kind: ChannelKind) -> Vec<String> {
        let mut out: Vec<String> = self
            .aliases
            .iter()
            .filter(|(_, c)| c.kind == kind)
            .map(|(a, _)| a.clone())
            .collect();
        out.sort();
        out
    }

    /// Reverse-resolve a switch event to its alias.
    ///
    /// Returns `None` for switches the file does not describe, and for
    /// placeholder aliases (containing "unused") that are wired but not
    /// part of the game.
    pub fn switch_alias(&self, bank: u8, index: u8) -> Option<(&str, bool)> {
        self.aliases
            .iter()
            .find(|(_, c)| c.kind == ChannelKind::Switch && c.board == bank && c.channel == index)
            .filter(|(alias, _)| !alias.contains("unused"))
            .map(|(alias, c)| (alias.as_str(), c.active_low))
    }
}
