//! Inbound wire events

use crate::config::Panel;
use crate::error::BusError;

/// An event line from the panel controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// A switch changed level. `level` is the raw line level; polarity is
    /// applied during alias translation.
    Switch { bank: u8, index: u8, level: bool },
    /// Controller status line (keepalive, boot banner)
    Status { message: String },
}

/// A switch event translated through the alias map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchEvent {
    pub alias: String,
    /// True when the switch is actuated (polarity already applied)
    pub active: bool,
}

impl BusEvent {
    /// Decode one protocol line (without the newline)
    pub fn decode(line: &str) -> Result<BusEvent, BusError> {
        let malformed = || BusError::MalformedEvent(line.to_string());

        // the protocol is pure ASCII; anything else is line noise
        if !line.is_ascii() {
            return Err(malformed());
        }
        match line.as_bytes().first() {
            Some(b'S') => {
                if line.len() != 6 {
                    return Err(malformed());
                }
                let bank = u8::from_str_radix(&line[1..3], 16).map_err(|_| malformed())?;
                let index = u8::from_str_radix(&line[3..5], 16).map_err(|_| malformed())?;
                let level = match &line[5..6] {
                    "0" => false,
                    "1" => true,
                    _ => return Err(malformed()),
                };
                Ok(BusEvent::Switch { bank, index, level })
            }
            Some(b'K') => Ok(BusEvent::Status {
                message: line[1..].to_string(),
            }),
            _ => Err(malformed()),
        }
    }

    /// Translate a switch event through a panel's alias map.
    ///
    /// Returns `None` for status lines and for switches that are unknown
    /// or wired to a placeholder alias.
    pub fn translate(&self, panel: &Panel) -> Option<SwitchEvent> {
        match self {
            BusEvent::Switch { bank, index, level } => {
                let (alias, active_low) = panel.switch_alias(*bank, *index)?;
                Some(SwitchEvent {
                    alias: alias.to_string(),
                    active: if active_low { !level } else { *level },
                })
            }
            BusEvent::Status { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceFile;
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_switch() {
        assert_eq!(
            BusEvent::decode("S00031").unwrap(),
            BusEvent::Switch {
                bank: 0,
                index: 3,
                level: true
            }
        );
        assert_eq!(
            BusEvent::decode("S0A100").unwrap(),
            BusEvent::Switch {
                bank: 10,
                index: 16,
                level: false
            }
        );
    }

    #[test]
    fn decode_status() {
        assert_eq!(
            BusEvent::decode("Kboot ok").unwrap(),
            BusEvent::Status {
                message: "boot ok".to_string()
            }
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(BusEvent::decode("").is_err());
        assert!(BusEvent::decode("S00").is_err());
        assert!(BusEvent::decode("S000G1").is_err());
        assert!(BusEvent::decode("S00012").is_err());
        assert!(BusEvent::decode("X0001").is_err());
    }

    #[test]
    fn translate_applies_polarity() {
        let yaml = r#"
panel:
  switch_banks:
    - switches:
        - { index: 0, alias: rod_1_1_up }
        - { index: 1, alias: commit_push, active_low: false }
"#;
        let panel = DeviceFile::from_yaml(yaml).unwrap().panel("panel").unwrap();

        // active-low: line low means actuated
        let ev = BusEvent::Switch {
            bank: 0,
            index: 0,
            level: false,
        };
        let sw = ev.translate(&panel).unwrap();
        assert_eq!(sw.alias, "rod_1_1_up");
        assert!(sw.active);

        // active-high: line high means actuated
        let ev = BusEvent::Switch {
            bank: 0,
            index: 1,
            level: true,
        };
        let sw = ev.translate(&panel).unwrap();
        assert_eq!(sw.alias, "commit_push");
        assert!(sw.active);

        // unknown switch drops
        let ev = BusEvent::Switch {
            bank: 1,
            index: 0,
            level: true,
        };
        assert!(ev.translate(&panel).is_none());
    }
}
