//! Executor backed by the host OS.
//!
//! Programs are launched detached; KeyLayer never waits for them to exit.
//! Key, mouse, window, clipboard, screenshot, audio and display actions need
//! a desktop automation backend and are reported as unsupported here.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use keylayer_core::{Action, FileOperation, SystemCommand};
use tokio::process::Command;
use tracing::{debug, info};

use crate::application::interpreter::{ActionExecutor, ExecutionError};

/// Timeout applied to `WebRequest` actions.
const WEB_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SystemExecutor {
    http: reqwest::Client,
}

impl SystemExecutor {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    fn launch(&self, program: &str, args: &[String]) -> Result<(), ExecutionError> {
        let child = Command::new(program)
            .args(args)
            .spawn()
            .map_err(|e| ExecutionError::Failed {
                kind: "Application",
                reason: format!("{program}: {e}"),
            })?;
        debug!(program, pid = child.id(), "launched");
        Ok(())
    }

    async fn file_operation(
        &self,
        operation: FileOperation,
        source: &str,
        destination: Option<&str>,
    ) -> Result<(), ExecutionError> {
        let needs_destination = || ExecutionError::Failed {
            kind: "FileOperation",
            reason: format!("{operation:?} needs a destination"),
        };
        match operation {
            FileOperation::Copy => {
                let dest = destination.ok_or_else(needs_destination)?;
                tokio::fs::copy(source, dest).await?;
            }
            FileOperation::Move => {
                let dest = destination.ok_or_else(needs_destination)?;
                tokio::fs::rename(source, dest).await?;
            }
            FileOperation::Delete => {
                if Path::new(source).is_dir() {
                    tokio::fs::remove_dir_all(source).await?;
                } else {
                    tokio::fs::remove_file(source).await?;
                }
            }
            FileOperation::Create => {
                if let Some(parent) = Path::new(source).parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::File::create(source).await?;
            }
            FileOperation::Open => self.launch(OPENER.0, &opener_args(source))?,
            FileOperation::Execute => self.launch(source, &[])?,
        }
        info!(?operation, source, "file operation done");
        Ok(())
    }

    async fn web_request(
        &self,
        url: &str,
        method: &str,
        body: Option<&str>,
    ) -> Result<Option<String>, ExecutionError> {
        let failed = |e: reqwest::Error| ExecutionError::Failed {
            kind: "WebRequest",
            reason: e.to_string(),
        };
        let method = if method.is_empty() {
            if body.is_some() {
                reqwest::Method::POST
            } else {
                reqwest::Method::GET
            }
        } else {
            reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes()).map_err(|e| {
                ExecutionError::Failed {
                    kind: "WebRequest",
                    reason: e.to_string(),
                }
            })?
        };

        let mut request = self
            .http
            .request(method, url)
            .timeout(WEB_REQUEST_TIMEOUT);
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.to_string());
        }
        let response = request.send().await.map_err(failed)?;
        let text = response.text().await.map_err(failed)?;
        Ok(Some(text))
    }
}

impl Default for SystemExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionExecutor for SystemExecutor {
    async fn execute(&self, action: &Action) -> Result<Option<String>, ExecutionError> {
        match action {
            Action::Application { target, arguments } => {
                if arguments.is_empty() && looks_like_document(target) {
                    self.launch(OPENER.0, &opener_args(target))?;
                } else {
                    self.launch(target, arguments)?;
                }
                Ok(None)
            }
            Action::FileOperation {
                operation,
                source,
                destination,
            } => {
                self.file_operation(*operation, source, destination.as_deref())
                    .await?;
                Ok(None)
            }
            Action::WebRequest {
                url, method, body, ..
            } => self.web_request(url, method, body.as_deref()).await,
            Action::SystemCommand { command } => {
                let (program, args) =
                    system_command(*command).ok_or(ExecutionError::Unsupported("SystemCommand"))?;
                info!(?command, "running system command");
                self.launch(program, &args)?;
                Ok(None)
            }
            Action::Delay { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(None)
            }
            other => Err(ExecutionError::Unsupported(other.kind())),
        }
    }
}

/// URLs and paths with an extension go through the desktop opener.
fn looks_like_document(target: &str) -> bool {
    target.contains("://")
        || Path::new(target)
            .extension()
            .is_some_and(|ext| !matches!(ext.to_str(), Some("exe" | "sh" | "bat" | "cmd")))
}

#[cfg(target_os = "linux")]
const OPENER: (&str, &[&str]) = ("xdg-open", &[]);
#[cfg(target_os = "macos")]
const OPENER: (&str, &[&str]) = ("open", &[]);
#[cfg(target_os = "windows")]
const OPENER: (&str, &[&str]) = ("cmd", &["/C", "start", ""]);
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const OPENER: (&str, &[&str]) = ("xdg-open", &[]);

fn opener_args(target: &str) -> Vec<String> {
    OPENER
        .1
        .iter()
        .map(|a| a.to_string())
        .chain(std::iter::once(target.to_string()))
        .collect()
}

/// Program and arguments implementing `command` on this platform.
fn system_command(command: SystemCommand) -> Option<(&'static str, Vec<String>)> {
    let (program, args): (&str, &[&str]) = if cfg!(target_os = "linux") {
        match command {
            SystemCommand::Shutdown => ("systemctl", &["poweroff"]),
            SystemCommand::Restart => ("systemctl", &["reboot"]),
            SystemCommand::Sleep => ("systemctl", &["suspend"]),
            SystemCommand::Lock => ("loginctl", &["lock-session"]),
            SystemCommand::Logout => {
                let user = std::env::var("USER").ok()?;
                return Some(("loginctl", vec!["terminate-user".to_string(), user]));
            }
        }
    } else if cfg!(target_os = "windows") {
        match command {
            SystemCommand::Shutdown => ("shutdown", &["/s", "/t", "0"]),
            SystemCommand::Restart => ("shutdown", &["/r", "/t", "0"]),
            SystemCommand::Sleep => ("rundll32.exe", &["powrprof.dll,SetSuspendState", "0,1,0"]),
            SystemCommand::Lock => ("rundll32.exe", &["user32.dll,LockWorkStation"]),
            SystemCommand::Logout => ("shutdown", &["/l"]),
        }
    } else if cfg!(target_os = "macos") {
        match command {
            SystemCommand::Shutdown => ("osascript", &["-e", "tell app \"System Events\" to shut down"]),
            SystemCommand::Restart => ("osascript", &["-e", "tell app \"System Events\" to restart"]),
            SystemCommand::Sleep => ("pmset", &["sleepnow"]),
            SystemCommand::Lock => ("pmset", &["displaysleepnow"]),
            SystemCommand::Logout => ("osascript", &["-e", "tell app \"System Events\" to log out"]),
        }
    } else {
        return None;
    };
    Some((program, args.iter().map(|a| a.to_string()).collect()))
}
