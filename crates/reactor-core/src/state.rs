//! Backend game-state document
//!
//! The backend owns a JSON document per task box. The console reads it to
//! learn the current scenario (which rods are expected where, whether the
//! reactor is broken) and writes it back once the players have fixed the
//! task. Unknown fields are preserved so a write never strips data some
//! other component put there.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Interpreted `status` field of the game state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    /// The reactor task is active; players must match the expected values
    Broken,
    /// The task has been completed
    Fixed,
    /// Anything else (missing or unrecognized status string)
    Undefined,
}

/// Game-state document as owned by the backend.
///
/// All fields are optional on the wire; missing maps default to empty and
/// missing flags to false. `expected` uses a sorted map because the
/// progress check iterates positions in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// Raw status string ("broken", "fixed", or anything else)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Expected gauge value (normalized 0.0-1.0) per rod position ("3_2")
    #[serde(default)]
    pub expected: BTreeMap<String, f64>,

    /// Top-LED value to show per rod position when the gauge is correct.
    /// The console shows the inverse while the gauge is off target.
    #[serde(default)]
    pub lights: BTreeMap<String, bool>,

    /// Text for the 5-character display, set by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toptext: Option<String>,

    /// While true, uncontrolled gauges drift slowly downward
    #[serde(default)]
    pub jumping: bool,

    /// While true, the panel runs the jump flicker effect
    #[serde(default)]
    pub broken_jump: bool,

    /// Fields we do not interpret but must not lose on write
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GameState {
    /// Interpret the raw status string
    pub fn status(&self) -> GameStatus {
        match self.status.as_deref() {
            Some("broken") => GameStatus::Broken,
            Some("fixed") => GameStatus::Fixed,
            _ => GameStatus::Undefined,
        }
    }

    /// True when the reactor task is active
    pub fn is_broken(&self) -> bool {
        self.status() == GameStatus::Broken
    }

    /// Mark the task as completed by the players
    pub fn mark_fixed(&mut self) {
        self.status = Some("fixed".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_full_document() {
        let json = r#"{
            "status": "broken",
            "expected": {"3_2": 0.5, "1_1": 0.25},
            "lights": {"3_2": true, "1_1": false},
            "toptext": "HELLO",
            "jumping": true
        }"#;
        let state: GameState = serde_json::from_str(json).unwrap();
        assert_eq!(state.status(), GameStatus::Broken);
        assert_eq!(state.expected.len(), 2);
        assert_eq!(state.expected["3_2"], 0.5);
        assert_eq!(state.lights["1_1"], false);
        assert_eq!(state.toptext.as_deref(), Some("HELLO"));
        assert!(state.jumping);
        assert!(!state.broken_jump);
    }

    #[test]
    fn missing_fields_default() {
        let state: GameState = serde_json::from_str("{}").unwrap();
        assert_eq!(state.status(), GameStatus::Undefined);
        assert!(state.expected.is_empty());
        assert!(!state.jumping);
    }

    #[test]
    fn unknown_status_is_undefined() {
        let state: GameState = serde_json::from_str(r#"{"status": "calibrating"}"#).unwrap();
        assert_eq!(state.status(), GameStatus::Undefined);
        // the raw string survives a round-trip
        let out = serde_json::to_value(&state).unwrap();
        assert_eq!(out["status"], "calibrating");
    }

    #[test]
    fn unknown_fields_round_trip() {
        let json = r#"{"status": "broken", "scenario": {"phase": 3}}"#;
        let mut state: GameState = serde_json::from_str(json).unwrap();
        state.mark_fixed();
        let out = serde_json::to_value(&state).unwrap();
        assert_eq!(out["status"], "fixed");
        assert_eq!(out["scenario"]["phase"], 3);
    }

    #[test]
    fn expected_iterates_sorted() {
        let json = r#"{"expected": {"5_1": 0.1, "1_2": 0.2, "3_0": 0.3}}"#;
        let state: GameState = serde_json::from_str(json).unwrap();
        let keys: Vec<&str> = state.expected.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["1_2", "3_0", "5_1"]);
    }
}
