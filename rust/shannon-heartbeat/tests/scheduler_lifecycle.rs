//! Heartbeat scheduler lifecycle tests.
//!
//! These drive the public scheduler API with in-memory collaborators:
//! - dispatch, announcement and threaded reply
//! - timeout and cancellation kill the session
//! - one-shot heartbeats disable themselves
//! - hot reload keeps in-flight work untouched

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use shannon_heartbeat::persist::write_atomic;
use shannon_heartbeat::{
    AgentSession, ChatClient, DefinitionSource, HeartbeatDefinition, HeartbeatError, HeartbeatFile,
    HeartbeatResult, HeartbeatScheduler, PermissionMode, Post, Schedule, SchedulerSettings,
    SessionEvent, SessionFactory, SessionOutcome, SessionSpec,
};

// ===== FAKE COLLABORATORS =====

struct MemorySource {
    definitions: Mutex<Vec<HeartbeatDefinition>>,
    path: PathBuf,
    disabled: Mutex<Vec<String>>,
}

impl MemorySource {
    fn new(definitions: Vec<HeartbeatDefinition>) -> Arc<Self> {
        Arc::new(Self {
            definitions: Mutex::new(definitions),
            path: PathBuf::from("/nonexistent/heartbeats.yaml"),
            disabled: Mutex::new(Vec::new()),
        })
    }

    fn replace(&self, definitions: Vec<HeartbeatDefinition>) {
        *self.definitions.lock() = definitions;
    }
}

impl DefinitionSource for MemorySource {
    fn definitions(&self) -> Vec<HeartbeatDefinition> {
        self.definitions.lock().iter().filter(|d| d.enabled).cloned().collect()
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> HeartbeatResult<()> {
        for definition in self.definitions.lock().iter_mut().filter(|d| d.name == name) {
            definition.enabled = enabled;
        }
        if !enabled {
            self.disabled.lock().push(name.to_string());
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeChat {
    posts: Mutex<Vec<Post>>,
    typing: AtomicUsize,
    fail: AtomicBool,
}

#[async_trait]
impl ChatClient for FakeChat {
    async fn create_post(
        &self,
        channel_id: &str,
        message: &str,
        root_id: Option<&str>,
    ) -> Option<Post> {
        if self.fail.load(Ordering::SeqCst) {
            return None;
        }
        let mut posts = self.posts.lock();
        let post = Post {
            id: format!("post-{}", posts.len() + 1),
            channel_id: channel_id.to_string(),
            root_id: root_id.unwrap_or_default().to_string(),
            message: message.to_string(),
        };
        posts.push(post.clone());
        Some(post)
    }

    async fn send_typing(&self, _channel_id: &str, _parent_id: Option<&str>) {
        self.typing.fetch_add(1, Ordering::SeqCst);
    }

    async fn update_post(&self, _post_id: &str, _message: &str) -> Option<Post> {
        None
    }
}

#[derive(Clone, Copy)]
enum Behavior {
    /// Use a tool, say "done", then complete after the delay.
    Complete(Duration),
    /// Never complete.
    Hang,
    FailStart,
    Panic,
}

struct FakeSessions {
    behavior: Behavior,
    specs: Mutex<Vec<SessionSpec>>,
    kills: Arc<AtomicUsize>,
    drops: Arc<AtomicUsize>,
}

impl FakeSessions {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            specs: Mutex::new(Vec::new()),
            kills: Arc::new(AtomicUsize::new(0)),
            drops: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn created(&self) -> usize {
        self.specs.lock().len()
    }
}

#[async_trait]
impl SessionFactory for FakeSessions {
    async fn create(
        &self,
        spec: SessionSpec,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> HeartbeatResult<Box<dyn AgentSession>> {
        let mut specs = self.specs.lock();
        specs.push(spec);
        Ok(Box::new(FakeSession {
            id: format!("fake-session-{}", specs.len()),
            behavior: self.behavior,
            events,
            complete: Arc::new(AtomicBool::new(false)),
            kills: Arc::clone(&self.kills),
            drops: Arc::clone(&self.drops),
        }))
    }
}

struct FakeSession {
    id: String,
    behavior: Behavior,
    events: mpsc::UnboundedSender<SessionEvent>,
    complete: Arc<AtomicBool>,
    kills: Arc<AtomicUsize>,
    drops: Arc<AtomicUsize>,
}

#[async_trait]
impl AgentSession for FakeSession {
    async fn start(&mut self) -> HeartbeatResult<()> {
        match self.behavior {
            Behavior::FailStart => Err(HeartbeatError::session("agent refused to start")),
            _ => Ok(()),
        }
    }

    async fn send_message(&mut self, _text: &str) -> HeartbeatResult<()> {
        match self.behavior {
            Behavior::Complete(delay) => {
                let events = self.events.clone();
                let complete = Arc::clone(&self.complete);
                let id = self.id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(SessionEvent::ToolUse {
                        name: "Bash".to_string(),
                        input: serde_json::json!({ "command": "git log" }),
                    });
                    let _ = events.send(SessionEvent::Text("done".to_string()));
                    let _ = events.send(SessionEvent::Complete(SessionOutcome {
                        result: None,
                        session_id: Some(id),
                        is_error: false,
                    }));
                    complete.store(true, Ordering::SeqCst);
                });
            }
            Behavior::Panic => panic!("agent crashed"),
            Behavior::Hang | Behavior::FailStart => {}
        }
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    async fn kill(&mut self) {
        self.kills.fetch_add(1, Ordering::SeqCst);
    }

    fn session_id(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn process_pid(&self) -> Option<u32> {
        None
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

// ===== HELPERS =====

fn definition(name: &str, schedule: Schedule) -> HeartbeatDefinition {
    let mut definition = HeartbeatDefinition::new(name, schedule, "chan-1", "ping");
    definition.description = format!("{name} check-in");
    definition
}

fn hourly(name: &str) -> HeartbeatDefinition {
    definition(name, Schedule::Interval(Duration::from_secs(3600)))
}

/// Fast loop for tests that let the scheduler tick on its own.
fn ticking() -> SchedulerSettings {
    SchedulerSettings {
        tick_interval: Duration::from_millis(20),
        completion_poll_interval: Duration::from_millis(5),
        platform_base_url: "https://chat.example.com".to_string(),
        bot_token: "bot-token".to_string(),
    }
}

/// Loop that ticks once at start; tests dispatch by hand.
fn manual() -> SchedulerSettings {
    SchedulerSettings {
        tick_interval: Duration::from_secs(3600),
        ..ticking()
    }
}

fn scheduler(
    source: &Arc<MemorySource>,
    chat: &Arc<FakeChat>,
    sessions: &Arc<FakeSessions>,
    settings: SchedulerSettings,
) -> HeartbeatScheduler {
    HeartbeatScheduler::new(
        Arc::clone(source) as Arc<dyn DefinitionSource>,
        Arc::clone(chat) as Arc<dyn ChatClient>,
        Arc::clone(sessions) as Arc<dyn SessionFactory>,
        settings,
    )
}

async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn run_count(scheduler: &HeartbeatScheduler, name: &str) -> u64 {
    scheduler.inspect(name, |s| s.run_count).unwrap_or_default()
}

// ===== DISPATCH =====

#[tokio::test]
async fn test_interval_heartbeat_announces_and_replies_in_thread() {
    let standup = definition("standup", Schedule::Interval(Duration::from_millis(50)));
    let source = MemorySource::new(vec![standup]);
    let chat = Arc::new(FakeChat::default());
    let sessions = FakeSessions::new(Behavior::Complete(Duration::from_millis(10)));
    let scheduler = scheduler(&source, &chat, &sessions, ticking());

    scheduler.start();
    assert!(scheduler.is_started());
    assert!(eventually(|| run_count(&scheduler, "standup") >= 1).await);
    scheduler.stop();

    let posts = chat.posts.lock().clone();
    assert!(posts.len() >= 2);
    assert_eq!(posts[0].channel_id, "chan-1");
    assert!(posts[0].root_id.is_empty());
    assert!(posts[0].message.contains(":heartbeat:"));
    assert!(posts[0].message.contains("standup check-in"));
    assert_eq!(posts[1].root_id, posts[0].id);
    assert_eq!(posts[1].message, "done");
    assert!(chat.typing.load(Ordering::SeqCst) >= 1);

    let status = &scheduler.status()[0];
    assert_eq!(status.name, "standup");
    assert!(status.last_error.is_none());
    assert!(status.last_run_at.is_some());
}

#[tokio::test]
async fn test_finalize_reschedules_from_completion() {
    let source = MemorySource::new(vec![hourly("digest")]);
    let chat = Arc::new(FakeChat::default());
    let sessions = FakeSessions::new(Behavior::Complete(Duration::from_millis(5)));
    let scheduler = scheduler(&source, &chat, &sessions, manual());
    scheduler.start();

    assert!(scheduler.trigger("digest"));
    assert_eq!(scheduler.check_and_dispatch(), vec!["digest".to_string()]);
    assert!(eventually(|| run_count(&scheduler, "digest") == 1).await);

    let (running, has_thread, next, completed) = scheduler
        .inspect("digest", |s| (s.running, s.has_run_thread(), s.next_run_at, s.last_completed_at))
        .unwrap();
    assert!(!running);
    assert!(!has_thread);
    let completed = completed.unwrap();
    assert_eq!(next, Some(completed + chrono::Duration::hours(1)));
    scheduler.stop();
}

#[tokio::test]
async fn test_failed_announcement_returns_to_idle_without_session() {
    let source = MemorySource::new(vec![hourly("digest")]);
    let chat = Arc::new(FakeChat::default());
    chat.fail.store(true, Ordering::SeqCst);
    let sessions = FakeSessions::new(Behavior::Complete(Duration::ZERO));
    let scheduler = scheduler(&source, &chat, &sessions, manual());
    scheduler.start();

    scheduler.trigger("digest");
    scheduler.check_and_dispatch();
    assert!(eventually(|| run_count(&scheduler, "digest") == 1).await);

    let status = &scheduler.status()[0];
    assert!(!status.running);
    assert!(status.last_error.as_deref().unwrap().contains("chan-1"));
    assert!(status.next_run_at.is_some());
    assert_eq!(sessions.created(), 0);
    scheduler.stop();
}

#[tokio::test]
async fn test_session_start_failure_is_recorded() {
    let source = MemorySource::new(vec![hourly("digest")]);
    let chat = Arc::new(FakeChat::default());
    let failing = FakeSessions::new(Behavior::FailStart);
    let scheduler = scheduler(&source, &chat, &failing, manual());
    scheduler.start();

    scheduler.trigger("digest");
    scheduler.check_and_dispatch();
    assert!(eventually(|| run_count(&scheduler, "digest") == 1).await);
    let error = scheduler.inspect("digest", |s| s.last_error.clone()).unwrap();
    assert!(error.unwrap().contains("agent refused to start"));
    assert_eq!(failing.kills.load(Ordering::SeqCst), 1);
    scheduler.stop();
}

#[tokio::test]
async fn test_panicking_session_still_finalizes() {
    let source = MemorySource::new(vec![hourly("digest")]);
    let chat = Arc::new(FakeChat::default());
    let sessions = FakeSessions::new(Behavior::Panic);
    let scheduler = scheduler(&source, &chat, &sessions, manual());
    scheduler.start();

    scheduler.trigger("digest");
    scheduler.check_and_dispatch();
    assert!(eventually(|| run_count(&scheduler, "digest") == 1).await);

    let status = &scheduler.status()[0];
    assert!(!status.running);
    assert!(status.last_error.as_deref().unwrap().contains("agent crashed"));
    assert!(scheduler.trigger("digest"));
    scheduler.stop();
}

// ===== TIMEOUT AND CANCELLATION =====

#[tokio::test]
async fn test_timeout_kills_session_and_finalizes() {
    let mut hb = hourly("slow");
    hb.timeout = Duration::from_millis(60);
    let source = MemorySource::new(vec![hb]);
    let chat = Arc::new(FakeChat::default());
    let sessions = FakeSessions::new(Behavior::Hang);
    let scheduler = scheduler(&source, &chat, &sessions, manual());
    scheduler.start();

    let started = std::time::Instant::now();
    scheduler.trigger("slow");
    scheduler.check_and_dispatch();
    assert!(eventually(|| run_count(&scheduler, "slow") == 1).await);
    assert!(started.elapsed() >= Duration::from_millis(60));

    assert_eq!(sessions.kills.load(Ordering::SeqCst), 1);
    let (running, error, next) = scheduler
        .inspect("slow", |s| (s.running, s.last_error.clone(), s.next_run_at))
        .unwrap();
    assert!(!running);
    assert!(error.is_none());
    assert!(next.unwrap() > Utc::now());
    scheduler.stop();
}

#[tokio::test]
async fn test_running_heartbeat_is_never_redispatched() {
    let source = MemorySource::new(vec![hourly("slow")]);
    let chat = Arc::new(FakeChat::default());
    let sessions = FakeSessions::new(Behavior::Hang);
    let scheduler = scheduler(&source, &chat, &sessions, manual());
    scheduler.start();

    scheduler.trigger("slow");
    assert_eq!(scheduler.check_and_dispatch().len(), 1);
    assert!(eventually(|| sessions.created() == 1).await);

    let (running, has_thread, next) = scheduler
        .inspect("slow", |s| (s.running, s.has_run_thread(), s.next_run_at))
        .unwrap();
    assert!(running);
    assert!(has_thread);
    assert!(next.unwrap() <= Utc::now());

    for _ in 0..3 {
        assert!(scheduler.check_and_dispatch().is_empty());
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!scheduler.trigger("slow"));
    assert_eq!(sessions.created(), 1);
    scheduler.stop();
}

#[tokio::test]
async fn test_stop_cancels_in_flight_runs() {
    let source = MemorySource::new(vec![hourly("slow"), hourly("idle")]);
    let chat = Arc::new(FakeChat::default());
    let sessions = FakeSessions::new(Behavior::Hang);
    let scheduler = scheduler(&source, &chat, &sessions, manual());
    scheduler.start();

    scheduler.trigger("slow");
    scheduler.check_and_dispatch();
    assert!(eventually(|| sessions.created() == 1).await);

    scheduler.stop();
    assert!(!scheduler.is_started());
    assert!(eventually(|| sessions.drops.load(Ordering::SeqCst) == 1).await);

    let statuses = scheduler.status();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|s| !s.running && s.run_count == 0));
    assert_eq!(scheduler.inspect("slow", |s| s.has_run_thread()), Some(false));
}

// ===== ONE-SHOT AND PERSISTENCE =====

#[tokio::test]
async fn test_once_heartbeat_disables_itself() {
    let mut hb = definition("reminder", Schedule::RunAt(Utc::now() - chrono::Duration::minutes(5)));
    hb.once = true;
    let source = MemorySource::new(vec![hb]);
    let chat = Arc::new(FakeChat::default());
    let sessions = FakeSessions::new(Behavior::Complete(Duration::ZERO));
    let scheduler = scheduler(&source, &chat, &sessions, ticking());

    scheduler.start();
    assert!(eventually(|| run_count(&scheduler, "reminder") == 1).await);
    assert!(eventually(|| !source.disabled.lock().is_empty()).await);

    assert_eq!(scheduler.inspect("reminder", |s| s.next_run_at), Some(None));
    assert_eq!(*source.disabled.lock(), vec!["reminder".to_string()]);
    assert!(source.definitions().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sessions.created(), 1);
    scheduler.stop();
}

#[tokio::test]
async fn test_persistent_heartbeat_resumes_its_session() {
    let mut persistent = hourly("journal");
    persistent.persistent = true;
    let source = MemorySource::new(vec![persistent]);
    let chat = Arc::new(FakeChat::default());
    let sessions = FakeSessions::new(Behavior::Complete(Duration::ZERO));
    let scheduler = scheduler(&source, &chat, &sessions, manual());
    scheduler.start();

    for round in 1..=2 {
        scheduler.trigger("journal");
        scheduler.check_and_dispatch();
        assert!(eventually(|| run_count(&scheduler, "journal") == round).await);
    }

    let specs = sessions.specs.lock().clone();
    assert_eq!(specs[0].resume_session_id, None);
    assert_eq!(specs[1].resume_session_id.as_deref(), Some("fake-session-1"));
    assert_eq!(
        scheduler.inspect("journal", |s| s.session_id.clone()),
        Some(Some("fake-session-2".to_string()))
    );
    scheduler.stop();
}

#[tokio::test]
async fn test_non_persistent_heartbeat_starts_fresh() {
    let source = MemorySource::new(vec![hourly("digest")]);
    let chat = Arc::new(FakeChat::default());
    let sessions = FakeSessions::new(Behavior::Complete(Duration::ZERO));
    let scheduler = scheduler(&source, &chat, &sessions, manual());
    scheduler.start();

    for round in 1..=2 {
        scheduler.trigger("digest");
        scheduler.check_and_dispatch();
        assert!(eventually(|| run_count(&scheduler, "digest") == round).await);
    }

    assert!(sessions.specs.lock().iter().all(|s| s.resume_session_id.is_none()));
    assert_eq!(scheduler.inspect("digest", |s| s.session_id.clone()), Some(None));
    scheduler.stop();
}

#[tokio::test]
async fn test_permission_config_follows_mode() {
    let mut auto = hourly("auto");
    auto.working_dir = PathBuf::from("/srv/auto");
    let mut interactive = hourly("interactive");
    interactive.working_dir = PathBuf::from("/srv/interactive");
    interactive.permission_mode = PermissionMode::Interactive;

    let source = MemorySource::new(vec![auto, interactive]);
    let chat = Arc::new(FakeChat::default());
    let sessions = FakeSessions::new(Behavior::Complete(Duration::ZERO));
    let scheduler = scheduler(&source, &chat, &sessions, manual());
    scheduler.start();

    scheduler.trigger("auto");
    scheduler.trigger("interactive");
    assert_eq!(scheduler.check_and_dispatch().len(), 2);
    assert!(eventually(|| sessions.created() == 2).await);

    let specs = sessions.specs.lock().clone();
    let find = |dir: &str| {
        specs.iter().find(|s| s.working_dir.as_path() == Path::new(dir)).unwrap()
    };
    assert!(find("/srv/auto").permission.is_none());
    let permission = find("/srv/interactive").permission.clone().unwrap();
    assert_eq!(permission.base_url, "https://chat.example.com");
    assert_eq!(permission.bot_token, "bot-token");
    scheduler.stop();
}

// ===== RELOAD =====

#[tokio::test]
async fn test_reload_leaves_running_heartbeat_untouched() {
    let source = MemorySource::new(vec![hourly("slow")]);
    let chat = Arc::new(FakeChat::default());
    let sessions = FakeSessions::new(Behavior::Hang);
    let scheduler = scheduler(&source, &chat, &sessions, manual());
    scheduler.start();

    scheduler.trigger("slow");
    scheduler.check_and_dispatch();
    assert!(eventually(|| sessions.created() == 1).await);

    let mut changed = hourly("slow");
    changed.description = "renamed".to_string();
    changed.schedule = Schedule::Interval(Duration::from_secs(60));
    source.replace(vec![changed]);
    scheduler.reload_definitions();

    let (running, has_thread, description) = scheduler
        .inspect("slow", |s| (s.running, s.has_run_thread(), s.definition.description.clone()))
        .unwrap();
    assert!(running);
    assert!(has_thread);
    assert_eq!(description, "slow check-in");
    assert_eq!(run_count(&scheduler, "slow"), 0);
    scheduler.stop();
}

#[tokio::test]
async fn test_reload_updates_idle_heartbeat_and_keeps_history() {
    let source = MemorySource::new(vec![hourly("digest")]);
    let chat = Arc::new(FakeChat::default());
    let sessions = FakeSessions::new(Behavior::Complete(Duration::ZERO));
    let scheduler = scheduler(&source, &chat, &sessions, manual());
    scheduler.start();

    scheduler.trigger("digest");
    scheduler.check_and_dispatch();
    assert!(eventually(|| run_count(&scheduler, "digest") == 1).await);

    source.replace(vec![definition("digest", Schedule::Interval(Duration::from_secs(7200)))]);
    scheduler.reload_definitions();

    let (count, schedule, next) = scheduler
        .inspect("digest", |s| (s.run_count, s.definition.schedule.clone(), s.next_run_at))
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(schedule, Schedule::Interval(Duration::from_secs(7200)));
    assert!(next.unwrap() > Utc::now() + chrono::Duration::minutes(90));
    scheduler.stop();
}

#[tokio::test]
async fn test_reload_removes_deleted_idle_but_keeps_running() {
    let source = MemorySource::new(vec![hourly("busy"), hourly("quiet")]);
    let chat = Arc::new(FakeChat::default());
    let sessions = FakeSessions::new(Behavior::Hang);
    let scheduler = scheduler(&source, &chat, &sessions, manual());
    scheduler.start();

    scheduler.trigger("busy");
    scheduler.check_and_dispatch();
    assert!(eventually(|| sessions.created() == 1).await);

    source.replace(vec![hourly("fresh")]);
    scheduler.reload_definitions();

    let names: Vec<String> = scheduler.status().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["busy".to_string(), "fresh".to_string()]);
    assert_eq!(scheduler.inspect("fresh", |s| s.run_count), Some(0));
    scheduler.stop();
}

#[tokio::test]
async fn test_deleted_running_heartbeat_goes_after_it_finishes() {
    let mut hb = hourly("slow");
    hb.timeout = Duration::from_millis(120);
    let source = MemorySource::new(vec![hb]);
    let chat = Arc::new(FakeChat::default());
    let sessions = FakeSessions::new(Behavior::Hang);
    let scheduler = scheduler(&source, &chat, &sessions, manual());
    scheduler.start();

    scheduler.trigger("slow");
    scheduler.check_and_dispatch();
    assert!(eventually(|| sessions.created() == 1).await);

    source.replace(Vec::new());
    scheduler.reload_definitions();
    let (running, count) = scheduler.inspect("slow", |s| (s.running, s.run_count)).unwrap();
    assert!(running);
    assert_eq!(count, 0);

    // The timeout finalizes the run against the surviving state.
    assert!(eventually(|| run_count(&scheduler, "slow") == 1).await);
    assert_eq!(sessions.kills.load(Ordering::SeqCst), 1);

    scheduler.reload_definitions();
    assert!(scheduler.status().is_empty());
    assert!(scheduler.inspect("slow", |s| s.run_count).is_none());
    scheduler.stop();
}

#[tokio::test]
async fn test_empty_start_then_hot_reload_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("heartbeats.yaml");
    let chat = Arc::new(FakeChat::default());
    let sessions = FakeSessions::new(Behavior::Complete(Duration::ZERO));
    let scheduler = HeartbeatScheduler::new(
        Arc::new(HeartbeatFile::new(&path)),
        Arc::clone(&chat) as Arc<dyn ChatClient>,
        Arc::clone(&sessions) as Arc<dyn SessionFactory>,
        ticking(),
    );

    scheduler.start();
    assert!(scheduler.is_started());
    assert!(scheduler.status().is_empty());

    write_atomic(
        &path,
        b"heartbeats:\n  digest:\n    interval: 3600\n    channel_id: chan-1\n    prompt: ping\n",
    )
    .unwrap();
    assert!(eventually(|| scheduler.status().len() == 1).await);
    assert_eq!(scheduler.status()[0].name, "digest");

    write_atomic(&path, b"heartbeats: {}\n").unwrap();
    std::fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(10))
        .unwrap();
    assert!(eventually(|| scheduler.status().is_empty()).await);
    scheduler.stop();
}
