//! Backend synchronization
//!
//! The central game-state server owns one JSON document per task box.
//! [`TaskRunner`] keeps the console and the backend in step: it polls the
//! backend on a slow interval, invokes the console callback on a fast one
//! and writes local changes back, recovering from concurrent modification
//! by re-polling.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reactor_core::{GameBackend, GameState, SyncError, SyncResult};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// HTTP backend
// ---------------------------------------------------------------------------

/// JSON-over-HTTP client for the game-state server.
///
/// `GET  <base>/boxes/<id>` fetches the document (404 = none yet),
/// `PUT  <base>/boxes/<id>` replaces it (409 = concurrent modification).
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    box_id: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, box_id: &str) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| SyncError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            box_id: box_id.to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/boxes/{}", self.base_url, self.box_id)
    }
}

#[async_trait]
impl GameBackend for HttpBackend {
    fn box_id(&self) -> &str {
        &self.box_id
    }

    async fn read(&self) -> SyncResult<Option<GameState>> {
        let response = self
            .client
            .get(self.url())
            .send()
            .await
            .map_err(|e| SyncError::Request(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SyncError::Request(format!(
                "GET {} -> {}",
                self.url(),
                response.status()
            )));
        }
        let state = response
            .json::<GameState>()
            .await
            .map_err(|e| SyncError::InvalidState(e.to_string()))?;
        Ok(Some(state))
    }

    async fn write(&self, state: &GameState) -> SyncResult<()> {
        let response = self
            .client
            .put(self.url())
            .json(state)
            .send()
            .await
            .map_err(|e| SyncError::Request(e.to_string()))?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(SyncError::ConcurrentModification);
        }
        if !response.status().is_success() {
            return Err(SyncError::Request(format!(
                "PUT {} -> {}",
                self.url(),
                response.status()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File-based mock backend
// ---------------------------------------------------------------------------

/// Mock backend for bench testing without a server.
///
/// Drop a JSON document into `backend-mock-<id>.json` to change the
/// backend state; the file is consumed on the next read. A pending file
/// at write time counts as a concurrent modification, exactly like a
/// server-side change would.
pub struct MockBackend {
    box_id: String,
    state: Mutex<Option<GameState>>,
    state_file: PathBuf,
}

impl MockBackend {
    pub fn new(box_id: &str, initial: Option<GameState>) -> Self {
        Self::with_dir(box_id, initial, Path::new("."))
    }

    /// Place the state file in `dir` instead of the working directory
    pub fn with_dir(box_id: &str, initial: Option<GameState>, dir: &Path) -> Self {
        let state_file = dir.join(format!("backend-mock-{}.json", box_id));
        info!(
            file = %state_file.display(),
            "mock backend created, write to the file to change backend state"
        );
        Self {
            box_id: box_id.to_string(),
            state: Mutex::new(initial),
            state_file,
        }
    }

    /// Current document, as the backend would report it
    pub fn current(&self) -> Option<GameState> {
        self.state.lock().clone()
    }

    fn read_and_delete(&self) -> SyncResult<Option<GameState>> {
        if !self.state_file.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.state_file)?;
        std::fs::remove_file(&self.state_file)?;
        let state =
            serde_json::from_str(&content).map_err(|e| SyncError::InvalidState(e.to_string()))?;
        Ok(Some(state))
    }
}

#[async_trait]
impl GameBackend for MockBackend {
    fn box_id(&self) -> &str {
        &self.box_id
    }

    async fn read(&self) -> SyncResult<Option<GameState>> {
        if let Some(new_state) = self.read_and_delete()? {
            info!("read new mock backend state");
            *self.state.lock() = Some(new_state);
        }
        Ok(self.state.lock().clone())
    }

    async fn write(&self, state: &GameState) -> SyncResult<()> {
        if let Some(new_state) = self.read_and_delete()? {
            info!("mock backend state changed concurrently");
            *self.state.lock() = Some(new_state);
            return Err(SyncError::ConcurrentModification);
        }
        *self.state.lock() = Some(state.clone());
        debug!(box_id = %self.box_id, "mock backend state written");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Task runner
// ---------------------------------------------------------------------------

/// Scheduling options for the task runner
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// How often to poll the backend for changes
    pub poll_interval: Duration,
    /// How often to invoke the console callback
    pub run_interval: Duration,
    /// Extra delay between writes of dirty state
    pub write_interval: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            run_interval: Duration::from_millis(1000 / 15),
            write_interval: Duration::ZERO,
        }
    }
}

/// Console callback: gets the current document (if any) and whether the
/// backend changed it; may return a replacement document to write back.
pub type RunnerCallback = Box<dyn FnMut(Option<&GameState>, bool) -> Option<GameState> + Send>;

/// Keeps the local callback and the backend document in step
pub struct TaskRunner {
    backend: Arc<dyn GameBackend>,
    options: RunnerOptions,
}

impl TaskRunner {
    pub fn new(backend: Arc<dyn GameBackend>, options: RunnerOptions) -> Self {
        Self { backend, options }
    }

    /// Run until `shutdown` flips to true
    pub async fn run(self, mut callback: RunnerCallback, mut shutdown: watch::Receiver<bool>) {
        let mut previous: Option<GameState> = None;
        let mut state: Option<GameState> = None;
        let mut state_changed = false;

        let mut next_poll = Instant::now();
        let mut next_run = Instant::now();
        let mut next_write = Instant::now();

        loop {
            let wake = next_poll.min(next_run);
            tokio::select! {
                _ = tokio::time::sleep_until(wake) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let now = Instant::now();
            if now >= next_poll {
                self.poll(&mut previous, &mut state, &mut state_changed, &mut callback)
                    .await;
                next_poll = inc_time(next_poll, self.options.poll_interval);
            }
            if now >= next_run {
                Self::invoke(&mut state, &mut state_changed, &mut callback, false);
                next_run = inc_time(next_run, self.options.run_interval);
            }
            if state_changed && now >= next_write {
                self.write(&mut previous, &mut state, &mut state_changed, &mut callback)
                    .await;
                next_write = Instant::now() + self.options.write_interval;
            }
        }
    }

    async fn poll(
        &self,
        previous: &mut Option<GameState>,
        state: &mut Option<GameState>,
        state_changed: &mut bool,
        callback: &mut RunnerCallback,
    ) {
        match self.backend.read().await {
            Ok(read_state) => {
                if read_state != *previous {
                    debug!(box_id = %self.backend.box_id(), "backend state changed");
                    *state = read_state.clone();
                    *previous = read_state;
                    *state_changed = false;
                    Self::invoke(state, state_changed, callback, true);
                }
            }
            Err(e) => warn!(%e, "backend poll failed, keeping last known state"),
        }
    }

    async fn write(
        &self,
        previous: &mut Option<GameState>,
        state: &mut Option<GameState>,
        state_changed: &mut bool,
        callback: &mut RunnerCallback,
    ) {
        let Some(current) = state.as_ref() else {
            *state_changed = false;
            return;
        };
        match self.backend.write(current).await {
            Ok(()) => {
                *previous = state.clone();
                *state_changed = false;
            }
            Err(SyncError::ConcurrentModification) => {
                // our copy is stale, throw it away and re-read
                *previous = None;
                self.poll(previous, state, state_changed, callback).await;
            }
            Err(e) => warn!(%e, "backend write failed, will retry"),
        }
    }

    fn invoke(
        state: &mut Option<GameState>,
        state_changed: &mut bool,
        callback: &mut RunnerCallback,
        backend_change: bool,
    ) {
        let new_state = callback(state.as_ref(), backend_change);
        if let Some(new_state) = new_state {
            if state.as_ref() != Some(&new_state) {
                *state = Some(new_state);
                *state_changed = true;
            }
        }
    }
}

/// Advance a deadline by its interval, snapping to now when we fell
/// behind by more than one whole interval
fn inc_time(deadline: Instant, interval: Duration) -> Instant {
    let next = deadline + interval;
    let now = Instant::now();
    if next + interval < now {
        now
    } else {
        next
    }
}
