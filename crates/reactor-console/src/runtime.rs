//! The console update loop
//!
//! Wires everything together: listens to bus events, runs the 25 Hz tick
//! (gauge movement, expected-value check, flicker, commit handling),
//! pushes deltas to the hardware and periodically refreshes everything.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use reactor_bus::{BusEvent, Command};
use reactor_core::{CommitState, GameState};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::effects;
use crate::error::RuntimeError;
use crate::hardware::Hardware;
use crate::state::{
    ConsoleState, SharedState, ARMED_TOP_TEXT, BLINKENLICHTEN_DEFAULT, COLORLED_COUNT,
    FORCE_UPDATE_INTERVAL, LOCAL_UPDATE_FPS,
};
use crate::sync::RunnerCallback;

/// How often to log a progress summary
const STATUS_REPORT_INTERVAL: Duration = Duration::from_secs(10);
/// How often to force-refresh the whole top-LED pattern
const LED_PATTERN_INTERVAL: Duration = Duration::from_secs(1);

/// Effects the tick decided to start; spawned after the state lock drops
#[derive(Debug, Default)]
struct PendingEffects {
    broken_fade: bool,
    broken_jump_flicker: bool,
    invalid_commit: bool,
    armed_blink: bool,
}

/// The console runtime: shared state plus the loops operating on it
pub struct ConsoleRuntime {
    hw: Arc<Hardware>,
    state: SharedState,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConsoleRuntime {
    pub fn new(hw: Arc<Hardware>) -> Self {
        let mut state = ConsoleState::default();
        state.reset_from_aliases(hw.panel().aliases().map(|(alias, _)| alias));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            hw,
            state: Arc::new(Mutex::new(state)),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Ask the runtime to stop; `run` returns after the final refresh
    pub fn quit(&self) {
        self.state.lock().keep_running = false;
        let _ = self.shutdown_tx.send(true);
    }

    /// Bring the panel up and run until [`quit`](Self::quit) is called
    pub async fn run(&self) -> Result<(), RuntimeError> {
        info!(panel = %self.hw.panel().name(), "console runtime starting");

        self.do_full_update().await;
        effects::lamp_test(self.hw.clone(), self.state.clone()).await;

        let event_task = tokio::spawn(event_loop(
            self.hw.clone(),
            self.state.clone(),
            self.shutdown_rx.clone(),
        ));

        self.update_loop().await;

        // leave the panel dark
        {
            let mut st = self.state.lock();
            st.keep_running = false;
            let aliases: Vec<String> = st.gauge_values.keys().cloned().collect();
            for alias in aliases {
                st.gauge_values.insert(alias, 0.0);
            }
            let aliases: Vec<String> = st.topled_values.keys().cloned().collect();
            for alias in aliases {
                st.topled_values.insert(alias, 0.0);
            }
            st.colorled_values = [0.0; COLORLED_COUNT];
            st.toptext.clear();
        }
        self.do_full_update().await;

        event_task.abort();
        info!("console runtime stopped");
        Ok(())
    }

    /// Callback handed to the backend task runner.
    ///
    /// Merges backend-side changes into the console state, installs the
    /// fallback scenario while the backend has nothing for us, and reports
    /// the fix once the commit state machine reaches `SendCommit`.
    pub fn backend_callback(&self) -> RunnerCallback {
        let state = self.state.clone();
        Box::new(move |backend_state: Option<&GameState>, backend_change: bool| {
            let mut st = state.lock();

            if backend_change || (backend_state.is_some() && st.backend.is_none()) {
                if let Some(new_state) = backend_state {
                    debug!("applying changed backend state");
                    st.apply_backend_state(new_state.clone());
                }
            }
            if st.backend.is_none() {
                warn!("backend gave us nothing, using hardcoded initial state");
                st.apply_backend_state(ConsoleState::fallback_state());
            }

            if st.commit == CommitState::SendCommit {
                st.commit = CommitState::CommitSent;
                let mut fixed = st.backend.clone().unwrap_or_default();
                fixed.mark_fixed();
                if let Some(text) = fixed.toptext.clone() {
                    st.toptext = text.clone();
                    st.arm_previous_top_text = text;
                }
                st.use_blinkenlichten = BLINKENLICHTEN_DEFAULT;
                st.already_broken = false;
                st.apply_backend_state(fixed.clone());
                info!("reporting fixed status to backend");
                return Some(fixed);
            }
            None
        })
    }

    async fn update_loop(&self) {
        debug!("update loop starting");
        let interval = Duration::from_secs_f64(1.0 / LOCAL_UPDATE_FPS as f64);
        let mut last_full_update = Instant::now();
        let mut last_led_pattern = Instant::now();
        let mut last_status_report = Instant::now();
        let mut handled_commit: Option<CommitState> = None;
        let mut shutdown = self.shutdown_rx.clone();

        loop {
            let tick_started = Instant::now();

            if tick_started.duration_since(last_full_update) > FORCE_UPDATE_INTERVAL {
                self.state.lock().full_update_pending = true;
            }

            let force_leds = if tick_started.duration_since(last_led_pattern) > LED_PATTERN_INTERVAL
            {
                last_led_pattern = tick_started;
                true
            } else {
                false
            };
            let report = if tick_started.duration_since(last_status_report)
                > STATUS_REPORT_INTERVAL
            {
                last_status_report = tick_started;
                true
            } else {
                false
            };

            let (commands, pending, full_update) = {
                let mut rng = rand::thread_rng();
                self.tick(&mut rng, force_leds, report, &mut handled_commit)
            };

            if pending.broken_fade {
                tokio::spawn(effects::broken_fade(self.hw.clone(), self.state.clone()));
            }
            if pending.broken_jump_flicker {
                tokio::spawn(effects::broken_jump_flicker(
                    self.hw.clone(),
                    self.state.clone(),
                ));
            }
            if pending.invalid_commit {
                tokio::spawn(effects::invalid_commit_pulse(
                    self.hw.clone(),
                    self.state.clone(),
                ));
            }
            if pending.armed_blink {
                tokio::spawn(effects::blink_armed_text(
                    self.hw.clone(),
                    self.state.clone(),
                ));
            }

            if full_update {
                self.do_full_update().await;
                last_full_update = Instant::now();
            } else if !commands.is_empty() {
                self.hw.send_all(commands).await;
            }

            let spent = tick_started.elapsed();
            let wait = interval.saturating_sub(spent);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("update loop stopped");
    }

    /// One tick: mutate state, collect the hardware deltas and the effects
    /// to start. Runs entirely under the state lock.
    fn tick(
        &self,
        rng: &mut impl Rng,
        force_leds: bool,
        report: bool,
        handled_commit: &mut Option<CommitState>,
    ) -> (Vec<Command>, PendingEffects, bool) {
        let mut commands = Vec::new();
        let mut pending = PendingEffects::default();
        let mut st = self.state.lock();

        // react to a backend state change
        let changed_backend = if st.backend_changed {
            st.backend.clone()
        } else {
            None
        };
        if let Some(backend) = changed_backend {
            st.backend_changed = false;

            if backend.is_broken() {
                // feedback LEDs own the panel now, stop the noise
                st.use_blinkenlichten = false;
                pending.broken_fade = true;
            }
            if backend.broken_jump {
                pending.broken_jump_flicker = true;
            }

            // top-LEDs restart from the new scenario
            let aliases: Vec<String> = st.topled_values.keys().cloned().collect();
            for alias in aliases {
                st.topled_values.insert(alias, 0.0);
            }
            if !st.full_update_pending {
                commands.extend(self.hw.reset_led_commands());
            }

            if let Some(text) = backend.toptext.clone() {
                st.arm_previous_top_text = text.clone();
                if st.toptext != ARMED_TOP_TEXT {
                    st.toptext = text;
                    if !st.full_update_pending {
                        commands.push(self.hw.text_command(&st));
                    }
                }
            }
        }

        // gauges
        let moved = st.move_gauges();
        if moved.blocked {
            pending.armed_blink = true;
        }
        if !st.full_update_pending {
            for alias in &moved.changed {
                commands.extend(self.hw.gauge_command(&st, alias));
            }
            // refresh one untouched gauge per tick to repair glitches
            if let Some(alias) = moved.untouched.choose(rng) {
                commands.extend(self.hw.gauge_command(&st, alias));
            }
        }

        // expected-value check and top-LED feedback
        let checked = st.check_gauges(force_leds, report);
        if !st.full_update_pending {
            for alias in &checked.changed_leds {
                commands.extend(self.hw.topled_command(&st, alias));
            }
            if checked.toptext_changed {
                commands.push(self.hw.text_command(&st));
            }
            if checked.checked {
                if let Some(alias) = checked.untouched_leds.choose(rng) {
                    commands.extend(self.hw.topled_command(&st, alias));
                }
            }
        }

        // color cluster flicker
        if st.use_blinkenlichten {
            for idx in st.flicker_colorleds(rng) {
                if !st.full_update_pending {
                    commands.push(self.hw.colorled_command(&st, idx));
                }
            }
        } else if !st.full_update_pending {
            // refresh one random cluster to eventually clear glitches
            let idx = rng.gen_range(0..COLORLED_COUNT);
            commands.push(self.hw.colorled_command(&st, idx));
        }

        // commit state machine edges
        if *handled_commit != Some(st.commit) {
            *handled_commit = Some(st.commit);
            self.handle_commit_edge(&mut st, &mut commands, &mut pending);
        }

        let full_update = st.full_update_pending;
        (commands, pending, full_update)
    }

    fn handle_commit_edge(
        &self,
        st: &mut ConsoleState,
        commands: &mut Vec<Command>,
        pending: &mut PendingEffects,
    ) {
        match st.commit {
            CommitState::Ready | CommitState::CommitSent => {
                st.toptext = st.arm_previous_top_text.clone();
                if !st.full_update_pending {
                    commands.push(self.hw.text_command(st));
                }
            }
            CommitState::Armed => {
                st.arm_previous_top_text = st.toptext.clone();
                st.toptext = ARMED_TOP_TEXT.to_string();
                if !st.full_update_pending {
                    commands.push(self.hw.text_command(st));
                }
            }
            CommitState::Committed => {
                if st.gauges_match_expected {
                    st.commit = CommitState::SendCommit;
                } else {
                    pending.invalid_commit = true;
                }
            }
            _ => {}
        }
    }

    /// Push every value to the hardware. LED drivers get re-initialized
    /// first; the batch goes out shuffled so a glitch-prone access pattern
    /// cannot hit the same channel every time; the display text goes out
    /// twice because it is what the players read.
    async fn do_full_update(&self) {
        debug!("full update");
        self.hw.send_all(self.hw.reset_led_commands()).await;

        let mut commands = {
            let mut st = self.state.lock();
            st.full_update_pending = false;
            self.hw.full_update_commands(&st)
        };
        commands.shuffle(&mut rand::thread_rng());
        self.hw.send_all(commands).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let text = {
            let st = self.state.lock();
            self.hw.text_command(&st)
        };
        self.hw.send(text).await;
    }
}

/// Translate inbound bus events and feed them to the state
async fn event_loop(hw: Arc<Hardware>, state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let mut rx = hw.transport().subscribe();
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            event = rx.recv() => match event {
                Ok(BusEvent::Status { message }) => {
                    tracing::trace!(%message, "controller status");
                }
                Ok(event) => {
                    if let Some(switch) = event.translate(hw.panel()) {
                        let outcome = state.lock().apply_switch(&switch);
                        debug!(alias = %switch.alias, active = switch.active, ?outcome, "switch event");
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event listener lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    warn!("event channel closed");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reactor_bus::transport::MockBusTransport;
    use reactor_bus::{DeviceFile, MockConfig};

    const PANEL_YAML: &str = r#"
rod_control_panel:
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
        - { index: 1, alias: rod_1_1_down }
        - { index: 2, alias: commit_arm_key }
        - { index: 3, alias: commit_push, active_low: false }
"#;

    fn setup() -> (ConsoleRuntime, Arc<MockBusTransport>) {
        let panel = DeviceFile::from_yaml(PANEL_YAML)
            .unwrap()
            .panel("rod_control_panel")
            .unwrap();
        let transport = Arc::new(MockBusTransport::new(&MockConfig::default()));
        let hw = Arc::new(Hardware::new(Arc::new(panel), transport.clone()).unwrap());
        (ConsoleRuntime::new(hw), transport)
    }

    fn broken_backend(expected: f64) -> GameState {
        let mut backend = GameState {
            status: Some("broken".to_string()),
            toptext: Some("READY".to_string()),
            ..GameState::default()
        };
        backend.expected.insert("1_1".to_string(), expected);
        backend.lights.insert("1_1".to_string(), true);
        backend
    }

    #[test]
    fn callback_installs_fallback_state() {
        let (runtime, _) = setup();
        let mut callback = runtime.backend_callback();
        let result = callback(None, false);
        assert!(result.is_none());
        let st = runtime.state();
        let st = st.lock();
        assert!(st.backend.as_ref().unwrap().is_broken());
        assert!(st.backend_changed);
    }

    #[test]
    fn callback_reports_fix_after_send_commit() {
        let (runtime, _) = setup();
        {
            let state = runtime.state();
            let mut st = state.lock();
            st.apply_backend_state(broken_backend(0.0));
            st.backend_changed = false;
            st.commit = CommitState::SendCommit;
            st.use_blinkenlichten = false;
            st.already_broken = true;
        }
        let mut callback = runtime.backend_callback();
        let result = callback(None, false).expect("fix must be reported");
        assert_eq!(result.status.as_deref(), Some("fixed"));

        let state = runtime.state();
        let st = state.lock();
        assert_eq!(st.commit, CommitState::CommitSent);
        assert!(st.use_blinkenlichten);
        assert!(!st.already_broken);
        assert_eq!(st.toptext, "READY");
    }

    #[test]
    fn callback_keeps_quiet_without_local_changes() {
        let (runtime, _) = setup();
        let backend = broken_backend(0.5);
        let mut callback = runtime.backend_callback();
        assert!(callback(Some(&backend), true).is_none());
        let state = runtime.state();
        assert!(state.lock().backend_changed);
    }

    #[tokio::test(start_paused = true)]
    async fn switch_event_moves_gauge() {
        let (runtime, transport) = setup();
        {
            let state = runtime.state();
            state.lock().apply_backend_state(broken_backend(0.5));
        }
        let runtime = Arc::new(runtime);
        let handle = {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.run().await })
        };

        // let startup (full update + lamp test) pass
        tokio::time::sleep(Duration::from_secs(5)).await;
        transport.clear_sent();

        // hold the up switch (active-low line goes low) for half a second
        transport.inject_event(BusEvent::Switch {
            bank: 0,
            index: 0,
            level: false,
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        transport.inject_event(BusEvent::Switch {
            bank: 0,
            index: 0,
            level: true,
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let value = {
            let state = runtime.state();
            let st = state.lock();
            st.gauge_values["rod_1_1_gauge"]
        };
        assert!(value > 0.1, "gauge should have moved, got {}", value);
        assert!(!transport.sent().is_empty());

        runtime.quit();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn commit_flow_reaches_send_commit() {
        let (runtime, transport) = setup();
        {
            let state = runtime.state();
            let mut st = state.lock();
            // expected 0.0: the untouched gauge is already on target
            st.apply_backend_state(broken_backend(0.0));
        }
        let runtime = Arc::new(runtime);
        let handle = {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.run().await })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;

        // arm (active-low key turned = line low), then push commit
        transport.inject_event(BusEvent::Switch {
            bank: 0,
            index: 2,
            level: true, // idle first -> Ready
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        transport.inject_event(BusEvent::Switch {
            bank: 0,
            index: 2,
            level: false, // turned -> Armed
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        {
            let state = runtime.state();
            assert_eq!(state.lock().commit, CommitState::Armed);
            assert_eq!(state.lock().toptext, ARMED_TOP_TEXT);
        }
        transport.inject_event(BusEvent::Switch {
            bank: 0,
            index: 3,
            level: true, // commit push, active-high
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        {
            let state = runtime.state();
            assert_eq!(state.lock().commit, CommitState::SendCommit);
        }

        // the runner callback picks it up and reports the fix
        let mut callback = runtime.backend_callback();
        let reported = callback(None, false).expect("fix reported");
        assert_eq!(reported.status.as_deref(), Some("fixed"));

        runtime.quit();
        handle.await.unwrap().unwrap();
    }
}
