//! Heartbeat scheduling.
//!
//! A heartbeat is an agent session started on a schedule with a fixed prompt.
//! [`HeartbeatScheduler`] owns one [`HeartbeatState`] per definition and a
//! single polling loop that, on every tick:
//!
//! 1. reloads definitions when the definitions file's mtime changed, and
//! 2. dispatches every Idle heartbeat whose `next_run_at` has passed.
//!
//! Each dispatch runs on its own task. A heartbeat never overlaps itself:
//! [`should_run`] is false while it is Running, and the finalize step that
//! returns it to Idle runs exactly once per dispatch, whatever the outcome.

pub mod cron;
pub mod definition;
pub mod source;
pub mod state;

pub use cron::{MalformedScheduleError, ScheduleExpression};
pub use definition::{HeartbeatDefinition, PermissionMode, Schedule};
pub use source::{DefinitionSource, HeartbeatFile};
pub use state::{HeartbeatState, HeartbeatStatus};

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chat::ChatClient;
use crate::error::{HeartbeatError, HeartbeatResult};
use crate::logging::OpTimer;
use crate::session::{PermissionConfig, SessionEvent, SessionFactory, SessionSpec};
use state::RunHandle;

/// Marker prefixed to every heartbeat announcement.
pub const HEARTBEAT_MARKER: &str = ":heartbeat:";

/// Scheduler tuning and platform credentials.
#[derive(Clone)]
pub struct SchedulerSettings {
    /// Sleep between loop ticks.
    pub tick_interval: Duration,
    /// How often a running heartbeat checks for session completion.
    pub completion_poll_interval: Duration,
    /// Chat platform base URL handed to non-auto sessions.
    pub platform_base_url: String,
    pub bot_token: String,
}

impl std::fmt::Debug for SchedulerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerSettings")
            .field("tick_interval", &self.tick_interval)
            .field("completion_poll_interval", &self.completion_poll_interval)
            .field("platform_base_url", &self.platform_base_url)
            .finish_non_exhaustive()
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            completion_poll_interval: Duration::from_millis(500),
            platform_base_url: String::new(),
            bot_token: String::new(),
        }
    }
}

/// Due and idle.
pub fn should_run(state: &HeartbeatState, now: DateTime<Utc>) -> bool {
    !state.running && state.next_run_at.is_some_and(|next| now >= next)
}

/// Next run of `definition` as seen from `now`.
///
/// Priority is run-at, then cron, then interval; a past run-at fires now.
pub fn compute_next_run(
    definition: &HeartbeatDefinition,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    definition.schedule.next_run(now)
}

/// How [`wait_for_completion`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    TimedOut,
    Cancelled,
}

/// Poll `predicate` every `poll_interval` until it holds, `timeout` elapses,
/// or `cancel` fires.
pub async fn wait_for_completion(
    mut predicate: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> WaitOutcome {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return WaitOutcome::Completed;
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return WaitOutcome::TimedOut;
        }
        let nap = poll_interval.min(deadline - now);
        tokio::select! {
            () = cancel.cancelled() => return WaitOutcome::Cancelled,
            () = tokio::time::sleep(nap) => {}
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[derive(Default)]
struct SchedulerState {
    heartbeats: HashMap<String, HeartbeatState>,
    config_mtime: Option<SystemTime>,
    loop_handle: Option<RunHandle>,
}

struct Inner {
    source: Arc<dyn DefinitionSource>,
    chat: Arc<dyn ChatClient>,
    sessions: Arc<dyn SessionFactory>,
    settings: SchedulerSettings,
    state: Mutex<SchedulerState>,
}

/// Runs heartbeats on their schedules.
///
/// Cheap to clone; clones share one scheduler.
#[derive(Clone)]
pub struct HeartbeatScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for HeartbeatScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("HeartbeatScheduler")
            .field("heartbeats", &state.heartbeats.keys().collect::<Vec<_>>())
            .field("started", &state.loop_handle.is_some())
            .finish()
    }
}

impl HeartbeatScheduler {
    pub fn new(
        source: Arc<dyn DefinitionSource>,
        chat: Arc<dyn ChatClient>,
        sessions: Arc<dyn SessionFactory>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                chat,
                sessions,
                settings,
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    /// Build the state map from the current definitions and launch the loop.
    ///
    /// The loop is launched even with zero definitions so later reloads have
    /// something to act on. Must be called inside a Tokio runtime.
    pub fn start(&self) {
        let now = Utc::now();
        let definitions = self.inner.source.definitions();
        let mtime = modified_time(self.inner.source.path());

        let mut state = self.inner.state.lock();
        if state.loop_handle.is_some() {
            tracing::warn!("Heartbeat scheduler already started");
            return;
        }

        state.heartbeats = definitions
            .into_iter()
            .map(|definition| {
                let hb = HeartbeatState::new(definition, now);
                tracing::info!(
                    heartbeat = %hb.definition.name,
                    schedule = %hb.definition.schedule,
                    next_run_at = ?hb.next_run_at,
                    "Heartbeat scheduled"
                );
                (hb.definition.name.clone(), hb)
            })
            .collect();
        state.config_mtime = mtime;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&self.inner).run_loop(cancel.clone()));
        state.loop_handle = Some(RunHandle { task, cancel });

        tracing::info!(
            heartbeats = state.heartbeats.len(),
            tick_ms = self.inner.settings.tick_interval.as_millis(),
            "Heartbeat scheduler started"
        );
    }

    /// Abruptly cancel the loop and every in-flight heartbeat.
    ///
    /// Running sessions are killed, not drained. States stay in place, Idle
    /// and without handles.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if let Some(handle) = state.loop_handle.take() {
            handle.abort();
        }
        let mut cancelled = 0;
        for hb in state.heartbeats.values_mut() {
            if let Some(run) = hb.run_thread.take() {
                run.abort();
                cancelled += 1;
            }
            hb.running = false;
        }
        tracing::info!(cancelled, "Heartbeat scheduler stopped");
    }

    pub fn is_started(&self) -> bool {
        self.inner.state.lock().loop_handle.is_some()
    }

    /// Snapshot of every tracked heartbeat, sorted by name.
    pub fn status(&self) -> Vec<HeartbeatStatus> {
        let state = self.inner.state.lock();
        let mut rows: Vec<HeartbeatStatus> =
            state.heartbeats.values().map(HeartbeatState::status).collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    /// Read one heartbeat's state under the scheduler lock.
    pub fn inspect<R>(&self, name: &str, f: impl FnOnce(&HeartbeatState) -> R) -> Option<R> {
        self.inner.state.lock().heartbeats.get(name).map(f)
    }

    /// Make an Idle heartbeat due now. False if unknown or Running.
    pub fn trigger(&self, name: &str) -> bool {
        let mut state = self.inner.state.lock();
        match state.heartbeats.get_mut(name) {
            Some(hb) if !hb.running => {
                hb.next_run_at = Some(Utc::now());
                tracing::info!(heartbeat = name, "Heartbeat triggered manually");
                true
            }
            _ => false,
        }
    }

    /// Dispatch every heartbeat for which [`should_run`] holds. Returns the
    /// dispatched names.
    pub fn check_and_dispatch(&self) -> Vec<String> {
        self.inner.check_and_dispatch()
    }

    /// Reload definitions if the definitions file's mtime changed.
    pub fn check_for_reload(&self) -> bool {
        self.inner.check_for_reload()
    }

    /// Merge the source's current definitions into the state map.
    pub fn reload_definitions(&self) {
        self.inner.reload_definitions();
    }
}

impl Inner {
    async fn run_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            self.check_for_reload();
            self.check_and_dispatch();
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.settings.tick_interval) => {}
            }
        }
        tracing::debug!("Heartbeat loop exited");
    }

    fn check_for_reload(self: &Arc<Self>) -> bool {
        let mtime = modified_time(self.source.path());
        {
            let mut state = self.state.lock();
            if state.config_mtime == mtime {
                return false;
            }
            state.config_mtime = mtime;
        }
        tracing::info!(path = %self.source.path().display(), "Heartbeat definitions changed");
        self.reload_definitions();
        true
    }

    fn reload_definitions(self: &Arc<Self>) {
        let timer = OpTimer::new("scheduler", "reload");
        let definitions = self.source.definitions();
        let now = Utc::now();
        let names: HashSet<String> = definitions.iter().map(|d| d.name.clone()).collect();

        let mut state = self.state.lock();
        let (mut added, mut updated) = (0usize, 0usize);
        for definition in definitions {
            match state.heartbeats.get_mut(&definition.name) {
                // In-flight work keeps the definition it started with.
                Some(hb) if hb.running => {}
                Some(hb) => {
                    if hb.definition != definition {
                        if hb.definition.schedule != definition.schedule {
                            hb.next_run_at = compute_next_run(&definition, now);
                        }
                        hb.definition = definition;
                        updated += 1;
                    }
                }
                None => {
                    let name = definition.name.clone();
                    state.heartbeats.insert(name, HeartbeatState::new(definition, now));
                    added += 1;
                }
            }
        }

        let before = state.heartbeats.len();
        state
            .heartbeats
            .retain(|name, hb| hb.running || names.contains(name));
        let removed = before - state.heartbeats.len();

        tracing::info!(
            added,
            updated,
            removed,
            total = state.heartbeats.len(),
            "Heartbeat definitions reloaded"
        );
        drop(state);
        timer.finish();
    }

    fn check_and_dispatch(self: &Arc<Self>) -> Vec<String> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let mut dispatched = Vec::new();
        for hb in state.heartbeats.values_mut() {
            if should_run(hb, now) {
                self.dispatch_heartbeat(hb, now);
                dispatched.push(hb.definition.name.clone());
            }
        }
        dispatched
    }

    /// Idle -> Running. Called with the state lock held, so the execution's
    /// finalize cannot run before `run_thread` is recorded.
    fn dispatch_heartbeat(self: &Arc<Self>, hb: &mut HeartbeatState, now: DateTime<Utc>) {
        hb.running = true;
        hb.last_run_at = Some(now);

        let cancel = CancellationToken::new();
        let inner = Arc::clone(self);
        let definition = hb.definition.clone();
        let session_id = hb.session_id.clone();
        let token = cancel.clone();

        tracing::info!(
            heartbeat = %definition.name,
            run = hb.run_count + 1,
            "Dispatching heartbeat"
        );
        let task = tokio::spawn(async move {
            let timer = OpTimer::new("heartbeat", definition.name.clone());
            let outcome = AssertUnwindSafe(inner.execute_heartbeat(&definition, session_id, &token))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(HeartbeatError::Panicked(panic_message(panic.as_ref())))
                });
            timer.finish_with_result(outcome.as_ref());
            inner.finalize_heartbeat(&definition.name, outcome, Utc::now(), &token);
        });
        hb.run_thread = Some(RunHandle { task, cancel });
    }

    /// Announce, run the agent session to completion or timeout, and return
    /// the session identity the agent reported.
    async fn execute_heartbeat(
        &self,
        definition: &HeartbeatDefinition,
        session_id: Option<String>,
        cancel: &CancellationToken,
    ) -> HeartbeatResult<Option<String>> {
        let header = format!("{HEARTBEAT_MARKER} **{}**", definition.description);
        let announced = self.chat.create_post(&definition.channel_id, &header, None).await;
        let Some(header_post) = announced else {
            return Err(HeartbeatError::PostFailed {
                channel_id: definition.channel_id.clone(),
            });
        };

        let spec = SessionSpec {
            working_dir: definition.working_dir.clone(),
            resume_session_id: session_id.filter(|_| definition.persistent),
            permission: self.permission_config(&definition.permission_mode),
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut session = self.sessions.create(spec, events_tx).await?;

        let completed = Arc::new(AtomicBool::new(false));
        tokio::spawn(relay_events(
            Arc::clone(&self.chat),
            definition.channel_id.clone(),
            header_post.id,
            events_rx,
            Arc::clone(&completed),
        ));

        if let Err(e) = Self::begin(session.as_mut(), &definition.prompt).await {
            session.kill().await;
            return Err(e);
        }

        let outcome = wait_for_completion(
            || completed.load(Ordering::SeqCst),
            definition.timeout,
            self.settings.completion_poll_interval,
            cancel,
        )
        .await;
        match outcome {
            WaitOutcome::Completed => {}
            WaitOutcome::TimedOut => {
                tracing::warn!(
                    heartbeat = %definition.name,
                    timeout_secs = definition.timeout.as_secs(),
                    pid = ?session.process_pid(),
                    "Heartbeat timed out, killing session"
                );
                session.kill().await;
            }
            WaitOutcome::Cancelled => session.kill().await,
        }

        Ok(session.session_id())
    }

    async fn begin(
        session: &mut dyn crate::session::AgentSession,
        prompt: &str,
    ) -> HeartbeatResult<()> {
        session.start().await?;
        session.send_message(prompt).await
    }

    fn permission_config(&self, mode: &PermissionMode) -> Option<PermissionConfig> {
        if mode.is_auto() {
            return None;
        }
        Some(PermissionConfig {
            base_url: self.settings.platform_base_url.clone(),
            bot_token: self.settings.bot_token.clone(),
        })
    }

    /// Running -> Idle. Runs once per dispatch, success or not.
    ///
    /// A run cancelled by `stop` is not finalized; `stop` cancels under the
    /// same lock, so the check below cannot miss it.
    fn finalize_heartbeat(
        &self,
        name: &str,
        outcome: HeartbeatResult<Option<String>>,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) {
        let disable = {
            let mut state = self.state.lock();
            if cancel.is_cancelled() {
                tracing::debug!(heartbeat = name, "Run cancelled by stop, skipping finalize");
                return;
            }
            let Some(hb) = state.heartbeats.get_mut(name) else {
                return;
            };
            hb.running = false;
            hb.run_count += 1;
            hb.last_completed_at = Some(now);
            hb.run_thread = None;

            match outcome {
                Ok(session_id) => {
                    hb.last_error = None;
                    if hb.definition.persistent && session_id.is_some() {
                        hb.session_id = session_id;
                    }
                }
                Err(e) => {
                    tracing::error!(heartbeat = name, error = %e, "Heartbeat failed");
                    hb.last_error = Some(e.to_string());
                }
            }

            if hb.definition.once {
                hb.next_run_at = None;
            } else {
                hb.next_run_at = compute_next_run(&hb.definition, now);
            }
            tracing::info!(
                heartbeat = name,
                run_count = hb.run_count,
                next_run_at = ?hb.next_run_at,
                "Heartbeat finished"
            );
            hb.definition.once
        };

        if disable {
            if let Err(e) = self.source.set_enabled(name, false) {
                tracing::error!(
                    heartbeat = name,
                    error = %e,
                    "Failed to disable one-shot heartbeat"
                );
            }
        }
    }
}

/// Forward session events to the heartbeat's chat thread and flag completion.
async fn relay_events(
    chat: Arc<dyn ChatClient>,
    channel_id: String,
    root_id: String,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    completed: Arc<AtomicBool>,
) {
    let mut text = String::new();
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Text(chunk) => {
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(&chunk);
            }
            SessionEvent::ToolUse { name, .. } => {
                tracing::debug!(tool = %name, "Heartbeat session used a tool");
                chat.send_typing(&channel_id, Some(&root_id)).await;
            }
            SessionEvent::Complete(outcome) => {
                if outcome.is_error {
                    tracing::warn!(
                        session_id = ?outcome.session_id,
                        "Heartbeat session ended with an error"
                    );
                }
                let reply = outcome
                    .result
                    .filter(|result| !result.trim().is_empty())
                    .unwrap_or_else(|| std::mem::take(&mut text));
                if !reply.trim().is_empty()
                    && chat.create_post(&channel_id, &reply, Some(&root_id)).await.is_none()
                {
                    tracing::warn!(channel_id = %channel_id, "Failed to post heartbeat reply");
                }
                break;
            }
        }
    }
    // Also reached when the session drops its sender without completing.
    completed.store(true, Ordering::SeqCst);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
