//! Agent sessions backed by a CLI subprocess speaking stream JSON.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;

use super::{AgentSession, SessionEvent, SessionFactory, SessionOutcome, SessionSpec};
use crate::error::{HeartbeatError, HeartbeatResult};

/// Environment variables carrying the permission routing target.
pub const PERMISSION_BASE_URL_ENV: &str = "SHANNON_PERMISSION_BASE_URL";
pub const PERMISSION_BOT_TOKEN_ENV: &str = "SHANNON_PERMISSION_BOT_TOKEN";

/// Spawns [`ProcessSession`]s running `command`.
#[derive(Debug, Clone)]
pub struct ProcessSessionFactory {
    command: String,
    extra_args: Vec<String>,
}

impl ProcessSessionFactory {
    pub fn new(command: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            extra_args,
        }
    }
}

#[async_trait]
impl SessionFactory for ProcessSessionFactory {
    async fn create(
        &self,
        spec: SessionSpec,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> HeartbeatResult<Box<dyn AgentSession>> {
        if !spec.working_dir.is_dir() {
            return Err(HeartbeatError::session(format!(
                "working directory {} does not exist",
                spec.working_dir.display()
            )));
        }
        Ok(Box::new(ProcessSession::new(
            self.command.clone(),
            self.extra_args.clone(),
            spec,
            events,
        )))
    }
}

/// One agent CLI process.
///
/// The prompt is written to stdin; stdout is parsed line by line into
/// [`SessionEvent`]s. The child is killed when the session is dropped.
#[derive(Debug)]
pub struct ProcessSession {
    command: String,
    extra_args: Vec<String>,
    spec: SessionSpec,
    events: mpsc::UnboundedSender<SessionEvent>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    session_id: Arc<Mutex<Option<String>>>,
    complete: Arc<AtomicBool>,
}

impl ProcessSession {
    pub fn new(
        command: String,
        extra_args: Vec<String>,
        spec: SessionSpec,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let session_id = Arc::new(Mutex::new(spec.resume_session_id.clone()));
        Self {
            command,
            extra_args,
            spec,
            events,
            child: None,
            stdin: None,
            session_id,
            complete: Arc::new(AtomicBool::new(false)),
        }
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.extra_args)
            .args(["--print", "--output-format", "stream-json", "--verbose"]);
        if let Some(id) = &self.spec.resume_session_id {
            cmd.arg("--resume").arg(id);
        }
        match &self.spec.permission {
            Some(permission) => {
                cmd.env(PERMISSION_BASE_URL_ENV, &permission.base_url)
                    .env(PERMISSION_BOT_TOKEN_ENV, &permission.bot_token);
            }
            None => {
                cmd.arg("--dangerously-skip-permissions");
            }
        }
        cmd.current_dir(&self.spec.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl AgentSession for ProcessSession {
    async fn start(&mut self) -> HeartbeatResult<()> {
        if self.child.is_some() {
            return Err(HeartbeatError::session("session already started"));
        }

        let mut child = self.build_command().spawn().map_err(|e| {
            HeartbeatError::session(format!("failed to spawn '{}': {e}", self.command))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HeartbeatError::session("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HeartbeatError::session("failed to capture stderr"))?;
        self.stdin = child.stdin.take();

        tracing::info!(
            command = %self.command,
            pid = ?child.id(),
            working_dir = %self.spec.working_dir.display(),
            resume = ?self.spec.resume_session_id,
            "Agent session started"
        );

        let events = self.events.clone();
        let session_id = Arc::clone(&self.session_id);
        let complete = Arc::clone(&self.complete);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut completed = false;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        for event in parse_stream_line(&line, &session_id) {
                            completed |= matches!(event, SessionEvent::Complete(_));
                            let _ = events.send(event);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Error reading agent stdout");
                        break;
                    }
                }
            }
            if !completed {
                let outcome = SessionOutcome {
                    result: None,
                    session_id: session_id.lock().clone(),
                    is_error: true,
                };
                let _ = events.send(SessionEvent::Complete(outcome));
            }
            complete.store(true, Ordering::SeqCst);
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(line = %line, "Agent stderr");
            }
        });

        self.child = Some(child);
        Ok(())
    }

    async fn send_message(&mut self, text: &str) -> HeartbeatResult<()> {
        let mut stdin = self
            .stdin
            .take()
            .ok_or_else(|| HeartbeatError::session("session is not accepting input"))?;
        stdin.write_all(text.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        // Print mode reads the prompt until EOF.
        stdin.shutdown().await?;
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    async fn kill(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let pid = child.id();
            if let Err(e) = child.kill().await {
                tracing::warn!(pid = ?pid, error = %e, "Failed to kill agent process");
            } else {
                tracing::info!(pid = ?pid, "Agent process killed");
            }
        }
        self.stdin = None;
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    fn process_pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }
}

/// Translate one stream-JSON line into session events.
///
/// Lines that are not JSON objects are ignored.
fn parse_stream_line(line: &str, session_id: &Mutex<Option<String>>) -> Vec<SessionEvent> {
    let Ok(value) = serde_json::from_str::<Value>(line) else {
        tracing::debug!(line = %line, "Ignoring non-JSON agent output");
        return Vec::new();
    };

    if let Some(id) = value.get("session_id").and_then(Value::as_str) {
        *session_id.lock() = Some(id.to_string());
    }

    match value.get("type").and_then(Value::as_str) {
        Some("assistant") => value
            .pointer("/message/content")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|block| match block.get("type").and_then(Value::as_str) {
                Some("text") => block
                    .get("text")
                    .and_then(Value::as_str)
                    .map(|text| SessionEvent::Text(text.to_string())),
                Some("tool_use") => Some(SessionEvent::ToolUse {
                    name: block
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    input: block.get("input").cloned().unwrap_or(Value::Null),
                }),
                _ => None,
            })
            .collect(),
        Some("result") => vec![SessionEvent::Complete(SessionOutcome {
            result: value.get("result").and_then(Value::as_str).map(str::to_string),
            session_id: session_id.lock().clone(),
            is_error: value.get("is_error").and_then(Value::as_bool).unwrap_or(false),
        })],
        _ => Vec::new(),
    }
}
