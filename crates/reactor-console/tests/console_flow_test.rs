//! End-to-end console flow against the mock transport and mock backend:
//! startup, arm, commit, fix reported.

use std::sync::Arc;
use std::time::Duration;

use reactor_bus::transport::MockBusTransport;
use reactor_bus::{BusEvent, Command, DeviceFile, MockConfig};
use reactor_console::{ConsoleRuntime, Hardware, MockBackend, RunnerOptions, TaskRunner};
use reactor_core::{CommitState, GameState};
use tokio::sync::watch;

const PANEL_YAML: &str = r#"
rod_control_panel:
  gauge_boards:
    - channels:
        - { index: 0, alias: rod_1_1_gauge }
        - { index: 1, alias: rod_1_2_gauge }
  led_boards:
    - channels:
        - { index: 0, alias: rod_1_1_led }
        - { index: 1, alias: rod_1_2_led }
  display_boards:
    - { alias: toptext }
  switch_banks:
    - switches:
        - { index: 0, alias: rod_1_1_up }
        - { index: 1, alias: rod_1_1_down }
        - { index: 2, alias: rod_1_2_up }
        - { index: 3, alias: rod_1_2_down }
        - { index: 4, alias: commit_arm_key }
        - { index: 5, alias: commit_push, active_low: false }
"#;

fn broken_state() -> GameState {
    serde_json::from_str(
        r#"{
            "status": "broken",
            "toptext": "FIX ME",
            "expected": {"1_1": 0.0, "1_2": 0.0},
            "lights": {"1_1": true, "1_2": true}
        }"#,
    )
    .unwrap()
}

struct Harness {
    runtime: Arc<ConsoleRuntime>,
    transport: Arc<MockBusTransport>,
    backend: Arc<MockBackend>,
    shutdown_tx: watch::Sender<bool>,
    runtime_task: tokio::task::JoinHandle<Result<(), reactor_console::RuntimeError>>,
    runner_task: tokio::task::JoinHandle<()>,
    _dir: tempfile::TempDir,
}

fn start() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let panel = DeviceFile::from_yaml(PANEL_YAML)
        .unwrap()
        .panel("rod_control_panel")
        .unwrap();
    let transport = Arc::new(MockBusTransport::new(&MockConfig::default()));
    let hardware = Arc::new(Hardware::new(Arc::new(panel), transport.clone()).unwrap());
    let runtime = Arc::new(ConsoleRuntime::new(hardware));

    let backend = Arc::new(MockBackend::with_dir(
        "flow-test",
        Some(broken_state()),
        dir.path(),
    ));
    let runner = TaskRunner::new(backend.clone(), RunnerOptions::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner_task = tokio::spawn(runner.run(runtime.backend_callback(), shutdown_rx));
    let runtime_task = {
        let runtime = runtime.clone();
        tokio::spawn(async move { runtime.run().await })
    };

    Harness {
        runtime,
        transport,
        backend,
        shutdown_tx,
        runtime_task,
        runner_task,
        _dir: dir,
    }
}

impl Harness {
    async fn stop(self) {
        self.runtime.quit();
        let _ = self.shutdown_tx.send(true);
        self.runtime_task.await.unwrap().unwrap();
        self.runner_task.await.unwrap();
    }

    fn switch(&self, index: u8, level: bool) {
        self.transport.inject_event(BusEvent::Switch {
            bank: 0,
            index,
            level,
        });
    }
}

#[tokio::test(start_paused = true)]
async fn full_commit_flow_reports_fix() {
    let harness = start();

    // startup: full update, lamp test, first backend poll
    tokio::time::sleep(Duration::from_secs(6)).await;
    {
        let state = harness.runtime.state();
        let st = state.lock();
        assert!(st.backend.as_ref().is_some_and(|b| b.is_broken()));
        // the progress counter owns the display while the task is active
        // (both expected gauges already sit on target)
        assert_eq!(st.toptext, "2-2");
    }

    // both expected gauges already sit at 0.0, so the check passes;
    // arm (key idle first, then turned) and push commit
    harness.switch(4, true);
    tokio::time::sleep(Duration::from_millis(200)).await;
    harness.switch(4, false);
    tokio::time::sleep(Duration::from_millis(200)).await;
    {
        let state = harness.runtime.state();
        assert_eq!(state.lock().commit, CommitState::Armed);
    }
    harness.switch(5, true);

    // the loop advances to SendCommit, the runner reports and writes
    tokio::time::sleep(Duration::from_secs(2)).await;
    {
        let state = harness.runtime.state();
        assert_eq!(state.lock().commit, CommitState::CommitSent);
    }
    let written = harness.backend.current().expect("backend has a document");
    assert_eq!(written.status.as_deref(), Some("fixed"));

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn commit_with_wrong_gauges_does_not_report() {
    let harness = start();
    tokio::time::sleep(Duration::from_secs(6)).await;

    // drive gauge 1_1 away from the expected 0.0
    harness.switch(0, false); // up switch, active-low
    tokio::time::sleep(Duration::from_secs(1)).await;
    harness.switch(0, true);
    tokio::time::sleep(Duration::from_millis(200)).await;
    {
        let state = harness.runtime.state();
        let st = state.lock();
        assert!(st.gauge_values["rod_1_1_gauge"] > 0.2);
        assert!(!st.gauges_match_expected);
    }

    harness.switch(4, true);
    tokio::time::sleep(Duration::from_millis(200)).await;
    harness.switch(4, false);
    tokio::time::sleep(Duration::from_millis(200)).await;
    harness.switch(5, true);
    tokio::time::sleep(Duration::from_secs(3)).await;

    // invalid commit: stays in Committed, backend still broken
    {
        let state = harness.runtime.state();
        assert_eq!(state.lock().commit, CommitState::Committed);
    }
    let document = harness.backend.current().expect("backend has a document");
    assert_eq!(document.status.as_deref(), Some("broken"));

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn movement_while_armed_is_blocked() {
    let harness = start();
    tokio::time::sleep(Duration::from_secs(6)).await;

    harness.switch(4, true);
    tokio::time::sleep(Duration::from_millis(200)).await;
    harness.switch(4, false);
    tokio::time::sleep(Duration::from_millis(200)).await;

    harness.switch(0, false); // try to move while armed
    tokio::time::sleep(Duration::from_secs(1)).await;
    harness.switch(0, true);

    {
        let state = harness.runtime.state();
        let st = state.lock();
        assert_eq!(st.gauge_values["rod_1_1_gauge"], 0.0);
    }

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn startup_sends_lamp_test_batches() {
    let harness = start();
    tokio::time::sleep(Duration::from_secs(6)).await;

    let sent = harness.transport.sent();
    // lamp test turned every top-LED fully on at some point
    assert!(sent.iter().any(|c| matches!(
        c,
        Command::SetLed {
            board: 0,
            channel: 0,
            value: 255
        }
    )));
    // and the display text went out
    assert!(sent.iter().any(|c| matches!(c, Command::SetText { .. })));

    harness.stop().await;
}
