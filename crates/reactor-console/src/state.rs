//! Console state and update rules
//!
//! Pure state container for everything shown on the panel: gauge values,
//! top-LED values, the 32 color LED clusters and the display text, plus
//! the commit/arm state and the last known backend document. The methods
//! here mutate state and report what changed; actually sending values to
//! the hardware is [`hardware`](crate::hardware)'s job so the rules stay
//! unit-testable without a transport.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use reactor_bus::SwitchEvent;
use reactor_core::{CommitState, GameState};
use tracing::{error, info, warn};

/// Console state as shared between the update loop, the event handler and
/// the effect tasks. Lock scope stays short: compute commands under the
/// lock, send after dropping it.
pub type SharedState = Arc<Mutex<ConsoleState>>;

/// How often the local update loop runs
pub const LOCAL_UPDATE_FPS: u32 = 25;
/// How often to force-update all states to the hardware
pub const FORCE_UPDATE_INTERVAL: Duration = Duration::from_secs(30);
/// Gauge travel per tick while a direction switch is held (full travel ~2s)
pub const GAUGE_TICK_SPEED: f64 = 0.02;
/// Hardware range of the gauge servos
pub const GAUGE_MAX_HW_VALUE: f64 = 180.0;
/// How far a gauge may sit from the expected value and still count
pub const GAUGE_LEEWAY: f64 = 0.14;
/// Display text shown while the panel is armed
pub const ARMED_TOP_TEXT: &str = "-----";
/// Number of color LED clusters on the panel
pub const COLORLED_COUNT: usize = 32;
/// Color LED indices wired to red clusters
pub const RED_LED_INDICES: [usize; 16] = [
    4, 5, 6, 7, 12, 13, 14, 15, 20, 21, 22, 23, 28, 29, 30, 31,
];
/// Red clusters are much brighter than the green ones, dim them down
pub const RED_LEDS_DIM: f64 = 0.1;
/// Default global dimming for the color LED clusters
pub const COLORLED_DEFAULT_GLOBAL_DIM: f64 = 0.25;
/// Whether the random flicker runs by default
pub const BLINKENLICHTEN_DEFAULT: bool = true;
/// Downward drift per tick while the ship is jumping (~1.5 min full travel)
pub const JUMPING_GAUGE_DRIFT_SPEED: f64 = (1.0 / LOCAL_UPDATE_FPS as f64) / 90.0;
/// Randomize gauges on an invalid commit. Kept off, the red pulse is enough.
pub const ALLOW_PUNISH: bool = false;
/// Rod positions whose top-LEDs are physically dead; no feedback possible,
/// so they always pass the check and are excluded from progress counts.
pub const DEAD_TOPLED_POSITIONS: [&str; 2] = ["5_3", "3_0"];

/// Gauge alias for a rod position ("3_2" -> "rod_3_2_gauge")
pub fn gauge_alias(position: &str) -> String {
    format!("rod_{}_gauge", position)
}

/// Top-LED alias for a rod position
pub fn led_alias(position: &str) -> String {
    format!("rod_{}_led", position)
}

/// Direction switch aliases that belong to a gauge alias
pub fn direction_aliases(gauge_alias: &str) -> Option<(String, String)> {
    let base = gauge_alias.strip_suffix("_gauge")?;
    Some((format!("{}_up", base), format!("{}_down", base)))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Result of one gauge movement pass
#[derive(Debug, Default)]
pub struct MoveOutcome {
    /// Gauges whose value changed this tick
    pub changed: Vec<String>,
    /// Gauges left untouched (candidates for the random glitch refresh)
    pub untouched: Vec<String>,
    /// A player tried to move a gauge while the panel was armed
    pub blocked: bool,
}

/// Result of one expected-vs-actual check pass
#[derive(Debug, Default)]
pub struct CheckOutcome {
    /// Whether the check ran at all (backend present and status broken)
    pub checked: bool,
    /// Top-LEDs whose value should be pushed to the hardware
    pub changed_leds: Vec<String>,
    /// Top-LEDs left untouched (candidates for the random glitch refresh)
    pub untouched_leds: Vec<String>,
    /// The progress counter on the display changed
    pub toptext_changed: bool,
    pub ok_count: usize,
    pub total: usize,
}

/// What a switch event turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// A gauge direction switch changed
    Direction { alias: String, active: bool },
    /// The arm key moved; new commit state
    Arm(CommitState),
    /// The commit button moved; new commit state
    Commit(CommitState),
    /// Alias not known to the state
    Unhandled,
}

/// All mutable console state
#[derive(Debug, Clone)]
pub struct ConsoleState {
    /// Normalized gauge values by alias
    pub gauge_values: BTreeMap<String, f64>,
    /// Direction switch levels by up/down alias (true = held)
    pub gauge_directions: HashMap<String, bool>,
    /// Normalized top-LED values by alias
    pub topled_values: BTreeMap<String, f64>,
    /// Normalized color LED cluster values (no aliases, board-indexed)
    pub colorled_values: [f64; COLORLED_COUNT],
    /// Current display text (before right-alignment)
    pub toptext: String,
    /// Display text to restore when leaving the armed state
    pub arm_previous_top_text: String,
    pub commit: CommitState,
    /// Last state document from the backend
    pub backend: Option<GameState>,
    /// Set when `backend` was replaced; consumed by the update loop
    pub backend_changed: bool,
    /// Result of the latest check pass
    pub gauges_match_expected: bool,
    pub use_blinkenlichten: bool,
    /// Master dimming for all LEDs
    pub global_led_dim: f64,
    /// Extra dimming for the color clusters; effects fade this
    pub colorled_global_dim: f64,
    /// Extra dimming for the red clusters; the punish effect lifts it
    pub red_led_dim: f64,
    /// The broken fade already ran for this broken episode
    pub already_broken: bool,
    /// An armed-text blink task is running
    pub arm_blink_active: bool,
    /// Next send should refresh everything instead of deltas
    pub full_update_pending: bool,
    /// Cleared on shutdown; long-running effects watch this
    pub keep_running: bool,
}

impl Default for ConsoleState {
    fn default() -> Self {
        Self {
            gauge_values: BTreeMap::new(),
            gauge_directions: HashMap::new(),
            topled_values: BTreeMap::new(),
            colorled_values: [0.0; COLORLED_COUNT],
            toptext: String::new(),
            arm_previous_top_text: String::new(),
            commit: CommitState::Uninitialized,
            backend: None,
            backend_changed: false,
            gauges_match_expected: false,
            use_blinkenlichten: BLINKENLICHTEN_DEFAULT,
            global_led_dim: 1.0,
            colorled_global_dim: COLORLED_DEFAULT_GLOBAL_DIM,
            red_led_dim: RED_LEDS_DIM,
            already_broken: false,
            arm_blink_active: false,
            full_update_pending: false,
            keep_running: true,
        }
    }
}

impl ConsoleState {
    /// Initialize value maps from the panel's aliases. Gauges and LEDs
    /// start at zero, direction switches released, display blank.
    pub fn reset_from_aliases<'a>(&mut self, aliases: impl Iterator<Item = &'a str>) {
        self.toptext.clear();
        self.gauge_values.clear();
        self.gauge_directions.clear();
        self.topled_values.clear();

        for alias in aliases {
            if alias.ends_with("_gauge") {
                self.gauge_values.insert(alias.to_string(), 0.0);
                if let Some((up, down)) = direction_aliases(alias) {
                    self.gauge_directions.insert(up, false);
                    self.gauge_directions.insert(down, false);
                }
            } else if alias.ends_with("_led") {
                self.topled_values.insert(alias.to_string(), 0.0);
            }
        }
        self.colorled_values = [0.0; COLORLED_COUNT];
    }

    /// Replace the backend document and flag the change for the loop
    pub fn apply_backend_state(&mut self, state: GameState) {
        self.backend = Some(state);
        self.backend_changed = true;
    }

    /// Hardcoded scenario used until the backend says something
    pub fn fallback_state() -> GameState {
        let mut state = GameState {
            status: Some("broken".to_string()),
            ..GameState::default()
        };
        state.expected.insert("3_3".to_string(), 0.5);
        state.lights.insert("3_3".to_string(), true);
        state
    }

    /// Process one translated switch event
    pub fn apply_switch(&mut self, event: &SwitchEvent) -> SwitchOutcome {
        if let Some(direction) = self.gauge_directions.get_mut(&event.alias) {
            *direction = event.active;
            return SwitchOutcome::Direction {
                alias: event.alias.clone(),
                active: event.active,
            };
        }

        match event.alias.as_str() {
            "commit_arm_key" => {
                self.commit = if event.active {
                    self.commit.on_arm_turned()
                } else {
                    self.commit.on_arm_released()
                };
                SwitchOutcome::Arm(self.commit)
            }
            "commit_push" => {
                if event.active {
                    self.commit = self.commit.on_commit_pressed();
                }
                SwitchOutcome::Commit(self.commit)
            }
            _ => {
                warn!(alias = %event.alias, "unhandled switch event");
                SwitchOutcome::Unhandled
            }
        }
    }

    /// Move gauges for one tick based on the held direction switches
    pub fn move_gauges(&mut self) -> MoveOutcome {
        let mut outcome = MoveOutcome::default();
        let jumping = self.backend.as_ref().map(|s| s.jumping).unwrap_or(false);
        let locked = self.commit.is_locked();

        let aliases: Vec<String> = self.gauge_values.keys().cloned().collect();
        for alias in aliases {
            let Some((up_alias, down_alias)) = direction_aliases(&alias) else {
                continue;
            };
            let up = self.gauge_directions.get(&up_alias).copied().unwrap_or(false);
            let down = self
                .gauge_directions
                .get(&down_alias)
                .copied()
                .unwrap_or(false);

            if up && down {
                error!(gauge = %alias, "both direction switches closed, switch hardware is broken");
                outcome.untouched.push(alias);
                continue;
            }

            let old = self.gauge_values[&alias];
            let mut new = old;
            if up || down {
                if locked {
                    info!(gauge = %alias, commit = %self.commit, "movement blocked while armed");
                    outcome.blocked = true;
                } else if up {
                    new = old + GAUGE_TICK_SPEED;
                } else {
                    new = old - GAUGE_TICK_SPEED;
                }
            } else if jumping {
                new = old - JUMPING_GAUGE_DRIFT_SPEED;
            }

            new = new.clamp(0.0, 1.0);
            if new != old {
                outcome.changed.push(alias.clone());
            } else {
                outcome.untouched.push(alias.clone());
            }
            self.gauge_values.insert(alias, new);
        }
        outcome
    }

    /// Is the gauge at `position` close enough to the expected value?
    ///
    /// Dead-LED positions always pass: the players get no feedback there,
    /// so they cannot be expected to fix them.
    pub fn within_leeway(&self, position: &str) -> bool {
        if DEAD_TOPLED_POSITIONS.contains(&position) {
            return true;
        }
        let Some(backend) = &self.backend else {
            return true;
        };
        let Some(expected) = backend.expected.get(position) else {
            return true;
        };
        let Some(value) = self.gauge_values.get(&gauge_alias(position)) else {
            error!(gauge = %gauge_alias(position), "no such gauge");
            return false;
        };

        let upper = round2(expected + GAUGE_LEEWAY);
        let lower = round2(expected - GAUGE_LEEWAY);
        let value = round2(*value);
        lower < value && value < upper
    }

    /// Compare gauges against the expected values and set the top-LEDs.
    ///
    /// Only runs while the backend says the reactor is broken. LED updates
    /// are normally only scheduled for positions whose gauge is being
    /// moved; `force_led_update` schedules all of them (done about once a
    /// second to repair glitched LEDs). `report` logs a progress summary.
    pub fn check_gauges(&mut self, force_led_update: bool, report: bool) -> CheckOutcome {
        let mut outcome = CheckOutcome::default();
        self.gauges_match_expected = true;

        let Some(backend) = self.backend.clone() else {
            return outcome;
        };
        if report {
            info!(status = ?backend.status, "backend status");
        }
        if !backend.is_broken() {
            return outcome;
        }
        outcome.checked = true;

        let mut ok_count = 0usize;
        let mut dead_positions = 0usize;
        let mut update_toptext = false;

        for (position, expected) in &backend.expected {
            if DEAD_TOPLED_POSITIONS.contains(&position.as_str()) {
                dead_positions += 1;
                continue;
            }
            let Some(light) = backend.lights.get(position) else {
                error!(%position, "no light state for expected position");
                continue;
            };
            let led_value = if *light { 1.0 } else { 0.0 };

            let led = led_alias(position);
            let gauge = gauge_alias(position);
            // guard against positions the panel does not actually have
            if !self.topled_values.contains_key(&led) || !self.gauge_values.contains_key(&gauge) {
                continue;
            }

            let moved = direction_aliases(&gauge)
                .map(|(up, down)| {
                    self.gauge_directions.get(&up).copied().unwrap_or(false)
                        || self.gauge_directions.get(&down).copied().unwrap_or(false)
                })
                .unwrap_or(false);

            if self.within_leeway(position) {
                if report {
                    info!(%position, led_value, "position on target");
                }
                self.topled_values.insert(led.clone(), led_value);
                ok_count += 1;
            } else {
                if report {
                    info!(
                        %position,
                        expected = *expected,
                        value = self.gauge_values[&gauge],
                        "position off target"
                    );
                }
                self.topled_values.insert(led.clone(), 1.0 - led_value);
                self.gauges_match_expected = false;
            }

            if !force_led_update && !moved {
                continue;
            }
            update_toptext = true;
            outcome.changed_leds.push(led);
        }

        outcome.ok_count = ok_count;
        outcome.total = backend.expected.len().saturating_sub(dead_positions);

        if update_toptext && self.commit < CommitState::Armed {
            self.toptext = format!("{}-{}", outcome.ok_count, outcome.total);
            outcome.toptext_changed = true;
        }

        if report {
            info!(
                ok = outcome.ok_count,
                total = outcome.total,
                all_match = self.gauges_match_expected,
                "gauge check summary"
            );
        }

        outcome.untouched_leds = self
            .topled_values
            .keys()
            .filter(|k| !outcome.changed_leds.contains(k))
            .cloned()
            .collect();
        outcome
    }

    /// Random color LED flicker. Returns the indices that changed.
    pub fn flicker_colorleds(&mut self, rng: &mut impl Rng) -> Vec<usize> {
        let change_prob = if self.backend.as_ref().map(|s| s.broken_jump).unwrap_or(false) {
            0.25
        } else {
            0.05
        };
        let mut changed = Vec::new();
        for idx in 0..COLORLED_COUNT {
            if rng.gen::<f64>() > change_prob {
                continue;
            }
            self.colorled_values[idx] = if self.colorled_values[idx] > 0.0 {
                0.0
            } else {
                *[0.25, 0.5, 1.0].choose(rng).unwrap_or(&1.0)
            };
            changed.push(idx);
        }
        changed
    }

    // ------------------------------------------------------------------
    // Normalized -> hardware value mapping
    // ------------------------------------------------------------------

    /// Gauge servo value (0-180)
    pub fn gauge_hw(&self, alias: &str) -> Option<u8> {
        let value = self.gauge_values.get(alias)?;
        Some((value * GAUGE_MAX_HW_VALUE).round() as u8)
    }

    /// Top-LED PWM value (0-255)
    pub fn topled_hw(&self, alias: &str) -> Option<u8> {
        let value = self.topled_values.get(alias)?;
        Some((value * self.global_led_dim * 255.0).round() as u8)
    }

    /// Color cluster PWM value (0-255), with global and red-group dimming
    pub fn colorled_hw(&self, idx: usize) -> u8 {
        let mut dimmed = self.colorled_values[idx] * self.global_led_dim * self.colorled_global_dim;
        if RED_LED_INDICES.contains(&idx) {
            dimmed *= self.red_led_dim;
        }
        (dimmed * 255.0).round() as u8
    }
}
