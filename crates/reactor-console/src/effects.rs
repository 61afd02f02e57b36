//! Visual effects
//!
//! Long-running light sequences spawned by the update loop. Each effect
//! locks the shared state only to compute the next command batch and
//! releases it before touching the bus.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use tokio::time::Instant;
use tracing::info;

use crate::hardware::Hardware;
use crate::state::{
    gauge_alias, SharedState, ALLOW_PUNISH, ARMED_TOP_TEXT, COLORLED_COUNT, GAUGE_LEEWAY,
    LOCAL_UPDATE_FPS, RED_LED_INDICES,
};
use reactor_bus::Command;

/// Startup lamp test: all top-LEDs on for two seconds, then off; same for
/// the color clusters. Lets the crew spot dead lights before the doors
/// open.
pub async fn lamp_test(hw: Arc<Hardware>, state: SharedState) {
    info!("lamp test: top-LEDs on");
    let commands = set_all_topleds(&hw, &state, 1.0);
    hw.send_all(commands).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    info!("lamp test: top-LEDs off");
    let commands = set_all_topleds(&hw, &state, 0.0);
    hw.send_all(commands).await;

    info!("lamp test: color LEDs on");
    let commands = set_all_colorleds(&hw, &state, 1.0);
    hw.send_all(commands).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    info!("lamp test: color LEDs off");
    let commands = set_all_colorleds(&hw, &state, 0.0);
    hw.send_all(commands).await;
}

fn set_all_topleds(hw: &Hardware, state: &SharedState, value: f64) -> Vec<Command> {
    let mut st = state.lock();
    let aliases: Vec<String> = st.topled_values.keys().cloned().collect();
    let mut commands = Vec::with_capacity(aliases.len());
    for alias in aliases {
        st.topled_values.insert(alias.clone(), value);
        commands.extend(hw.topled_command(&st, &alias));
    }
    commands
}

fn set_all_colorleds(hw: &Hardware, state: &SharedState, value: f64) -> Vec<Command> {
    let mut st = state.lock();
    (0..COLORLED_COUNT)
        .map(|idx| {
            st.colorled_values[idx] = value;
            hw.colorled_command(&st, idx)
        })
        .collect()
}

/// Fade the color clusters to black when the reactor breaks. Runs once
/// per broken episode (the flag resets when the fix is reported).
pub async fn broken_fade(hw: Arc<Hardware>, state: SharedState) {
    {
        let mut st = state.lock();
        if st.already_broken {
            return;
        }
        st.already_broken = true;
    }

    let fade_steps = 15u32;
    let fade_time = Duration::from_millis(2500);
    let dim_backup = state.lock().colorled_global_dim;

    for step in 0..fade_steps {
        let step_started = Instant::now();
        let commands = {
            let mut st = state.lock();
            st.colorled_global_dim =
                dim_backup - (dim_backup / fade_steps as f64) * step as f64;
            if st.full_update_pending {
                Vec::new()
            } else {
                (0..COLORLED_COUNT)
                    .map(|idx| hw.colorled_command(&st, idx))
                    .collect()
            }
        };
        hw.send_all(commands).await;
        let step_time = fade_time / fade_steps;
        let spent = step_started.elapsed();
        if spent < step_time {
            tokio::time::sleep(step_time - spent).await;
        }
    }

    // all off, dimming restored (the dim alone never reaches fully dark)
    let commands = {
        let mut st = state.lock();
        st.colorled_global_dim = dim_backup;
        let mut commands = Vec::new();
        for idx in 0..COLORLED_COUNT {
            st.colorled_values[idx] = 0.0;
            if !st.full_update_pending {
                commands.push(hw.colorled_command(&st, idx));
            }
        }
        commands
    };
    hw.send_all(commands).await;
}

/// Random top-LED flicker while the ship is in a broken jump. Pauses
/// itself whenever the fixing task is active so it cannot fight the
/// actual feedback LEDs.
pub async fn broken_jump_flicker(hw: Arc<Hardware>, state: SharedState) {
    let interval = Duration::from_secs_f64(1.0 / LOCAL_UPDATE_FPS as f64);
    let change_prob = 0.15;

    loop {
        let keep_going = {
            let st = state.lock();
            st.keep_running && st.backend.as_ref().map(|b| b.broken_jump).unwrap_or(false)
        };
        if !keep_going {
            break;
        }

        let tick_started = Instant::now();
        let commands = {
            let mut st = state.lock();
            if st.backend.as_ref().map(|b| b.is_broken()).unwrap_or(false) {
                Vec::new()
            } else {
                let mut rng = rand::thread_rng();
                let aliases: Vec<String> = st.topled_values.keys().cloned().collect();
                let mut commands = Vec::new();
                for alias in aliases {
                    if rng.gen::<f64>() > change_prob {
                        continue;
                    }
                    let current = st.topled_values[&alias];
                    let next = if current > 0.0 {
                        0.0
                    } else {
                        *[0.5, 1.0].choose(&mut rng).unwrap_or(&1.0)
                    };
                    st.topled_values.insert(alias.clone(), next);
                    if !st.full_update_pending {
                        commands.extend(hw.topled_command(&st, &alias));
                    }
                }
                commands
            }
        };
        hw.send_all(commands).await;

        let spent = tick_started.elapsed();
        if spent < interval {
            tokio::time::sleep(interval - spent).await;
        }
    }
}

/// Reaction to a commit with off-target gauges: pulse the red clusters to
/// full and fade them out, then hold dark for a moment. Optionally
/// randomizes the gauges (off by default, the lights are punishment
/// enough).
pub async fn invalid_commit_pulse(hw: Arc<Hardware>, state: SharedState) {
    // log what was off so the crew radio can give hints
    {
        let st = state.lock();
        info!(leeway = GAUGE_LEEWAY, "invalid commit");
        if let Some(backend) = &st.backend {
            for (position, expected) in &backend.expected {
                let alias = gauge_alias(position);
                let Some(value) = st.gauge_values.get(&alias) else {
                    continue;
                };
                if !st.within_leeway(position) {
                    info!(gauge = %alias, value = *value, expected = *expected, "off target");
                }
            }
        }
    }

    let (blinker_backup, red_dim_backup) = {
        let mut st = state.lock();
        let backup = (st.use_blinkenlichten, st.red_led_dim);
        st.red_led_dim = 1.0;
        st.use_blinkenlichten = false;
        backup
    };

    let commands = {
        let mut st = state.lock();
        let mut rng = rand::thread_rng();
        let mut commands = Vec::new();

        if ALLOW_PUNISH {
            let expected = st
                .backend
                .as_ref()
                .map(|b| b.expected.clone())
                .unwrap_or_default();
            let aliases: Vec<String> = st.gauge_values.keys().cloned().collect();
            for alias in aliases {
                let position = alias
                    .trim_start_matches("rod_")
                    .trim_end_matches("_gauge")
                    .to_string();
                if rng.gen::<f64>() > 0.5 || expected.contains_key(&position) {
                    st.gauge_values.insert(alias.clone(), rng.gen::<f64>());
                    if !st.full_update_pending {
                        commands.extend(hw.gauge_command(&st, &alias));
                    }
                }
            }
        }

        // reds on, greens off
        for idx in 0..COLORLED_COUNT {
            st.colorled_values[idx] = if RED_LED_INDICES.contains(&idx) {
                1.0
            } else {
                0.0
            };
            if !st.full_update_pending {
                commands.push(hw.colorled_command(&st, idx));
            }
        }
        commands
    };
    hw.send_all(commands).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    // fade the reds out
    let fade_steps = 25u32;
    let fade_time = Duration::from_millis(1500);
    for step in 0..fade_steps {
        let commands = {
            let mut st = state.lock();
            let fade_value = 1.0 - (1.0 / fade_steps as f64) * step as f64;
            let mut commands = Vec::new();
            for idx in RED_LED_INDICES {
                st.colorled_values[idx] = fade_value;
                if !st.full_update_pending {
                    commands.push(hw.colorled_command(&st, idx));
                }
            }
            commands
        };
        hw.send_all(commands).await;
        tokio::time::sleep(fade_time / fade_steps).await;
    }

    // fully off and hold dark
    let commands = {
        let mut st = state.lock();
        let mut commands = Vec::new();
        for idx in RED_LED_INDICES {
            st.colorled_values[idx] = 0.0;
            if !st.full_update_pending {
                commands.push(hw.colorled_command(&st, idx));
            }
        }
        commands
    };
    hw.send_all(commands).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let mut st = state.lock();
    st.use_blinkenlichten = blinker_backup;
    st.red_led_dim = red_dim_backup;
}

/// Blink the armed text a few times when someone fights the lockout.
/// Only one blink sequence runs at a time.
pub async fn blink_armed_text(hw: Arc<Hardware>, state: SharedState) {
    {
        let mut st = state.lock();
        if st.arm_blink_active {
            return;
        }
        st.arm_blink_active = true;
        if st.toptext != ARMED_TOP_TEXT {
            st.arm_previous_top_text = st.toptext.clone();
        }
    }

    for idx in 0..4 {
        let command = {
            let mut st = state.lock();
            st.toptext = if idx % 2 == 0 {
                ARMED_TOP_TEXT.to_string()
            } else {
                st.arm_previous_top_text.clone()
            };
            (!st.full_update_pending).then(|| hw.text_command(&st))
        };
        if let Some(command) = command {
            hw.send(command).await;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    // settle on the right text for the current commit state
    let command = {
        let mut st = state.lock();
        if st.commit == reactor_core::CommitState::Armed && st.toptext != ARMED_TOP_TEXT {
            st.toptext = ARMED_TOP_TEXT.to_string();
        } else if st.toptext != st.arm_previous_top_text {
            st.toptext = st.arm_previous_top_text.clone();
        }
        let command = (!st.full_update_pending).then(|| hw.text_command(&st));
        st.arm_blink_active = false;
        command
    };
    if let Some(command) = command {
        hw.send(command).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ConsoleState;
    use parking_lot::Mutex;
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
        - { index: 1, alias: rod_1_2_led }
  display_boards:
    - { alias: toptext }
"#;

    fn setup() -> (Arc<Hardware>, SharedState, Arc<MockBusTransport>) {
        let panel = DeviceFile::from_yaml(PANEL_YAML)
            .unwrap()
            .panel("panel")
            .unwrap();
        let transport = Arc::new(MockBusTransport::new(&MockConfig::default()));
        let hardware = Arc::new(Hardware::new(Arc::new(panel), transport.clone()).unwrap());
        let mut st = ConsoleState::default();
        st.reset_from_aliases(["rod_1_1_gauge", "rod_1_1_led", "rod_1_2_led"].into_iter());
        (hardware, Arc::new(Mutex::new(st)), transport)
    }

    #[tokio::test(start_paused = true)]
    async fn lamp_test_touches_every_light_twice() {
        let (hw, state, transport) = setup();
        lamp_test(hw, state.clone()).await;
        // 2 top-LEDs on + off, 32 clusters on + off
        assert_eq!(transport.sent().len(), 2 + 2 + COLORLED_COUNT * 2);
        // everything dark afterwards
        let st = state.lock();
        assert!(st.topled_values.values().all(|v| *v == 0.0));
        assert!(st.colorled_values.iter().all(|v| *v == 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn broken_fade_runs_once_per_episode() {
        let (hw, state, transport) = setup();
        state.lock().colorled_values[0] = 1.0;

        broken_fade(hw.clone(), state.clone()).await;
        let sent = transport.sent().len();
        assert!(sent > 0);
        assert_eq!(state.lock().colorled_values[0], 0.0);
        assert!(
            (state.lock().colorled_global_dim - crate::state::COLORLED_DEFAULT_GLOBAL_DIM).abs()
                < 1e-9
        );

        // second invocation is a no-op until the episode resets
        broken_fade(hw, state.clone()).await;
        assert_eq!(transport.sent().len(), sent);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_commit_restores_dimming() {
        let (hw, state, transport) = setup();
        invalid_commit_pulse(hw, state.clone()).await;
        let st = state.lock();
        assert_eq!(st.red_led_dim, crate::state::RED_LEDS_DIM);
        assert!(st.use_blinkenlichten);
        for idx in RED_LED_INDICES {
            assert_eq!(st.colorled_values[idx], 0.0);
        }
        assert!(!transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn armed_blink_is_single_instance_and_restores() {
        let (hw, state, _) = setup();
        {
            let mut st = state.lock();
            st.toptext = "3-9".to_string();
            st.commit = reactor_core::CommitState::Ready;
        }
        blink_armed_text(hw.clone(), state.clone()).await;
        let st = state.lock();
        assert!(!st.arm_blink_active);
        assert_eq!(st.toptext, "3-9");
    }
}
