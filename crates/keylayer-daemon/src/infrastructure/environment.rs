//! Host probe for conditions and placeholders.

use async_trait::async_trait;
use chrono::{Local, NaiveTime};
use rand::Rng;
use tokio::process::Command;
use tracing::debug;

use crate::application::interpreter::Environment;

/// Format used for `{DateTime}`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// [`Environment`] backed by the running machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEnvironment;

impl SystemEnvironment {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Environment for SystemEnvironment {
    async fn window_exists(&self, title: &str) -> bool {
        // wmctrl lists top-level windows on X11 desktops.
        match Command::new("wmctrl").arg("-l").output().await {
            Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
                .lines()
                .any(|line| line.contains(title)),
            Ok(_) | Err(_) => {
                debug!(title, "window listing unavailable");
                false
            }
        }
    }

    async fn process_running(&self, name: &str) -> bool {
        let wanted = normalize_process_name(name);
        if cfg!(target_os = "linux") {
            return linux_process_running(&wanted).await;
        }
        let output = if cfg!(target_os = "windows") {
            Command::new("tasklist")
                .args(["/NH", "/FO", "CSV"])
                .output()
                .await
        } else {
            Command::new("ps").args(["-A", "-o", "comm="]).output().await
        };
        match output {
            Ok(out) => String::from_utf8_lossy(&out.stdout).lines().any(|line| {
                let first = line.split(',').next().unwrap_or("").trim_matches('"');
                let base = first.rsplit(['/', '\\']).next().unwrap_or(first);
                normalize_process_name(base) == wanted
            }),
            Err(e) => {
                debug!(error = %e, "process listing unavailable");
                false
            }
        }
    }

    async fn file_exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    fn local_time(&self) -> NaiveTime {
        Local::now().time()
    }

    fn timestamp(&self) -> String {
        Local::now().format(TIMESTAMP_FORMAT).to_string()
    }

    fn random_token(&self) -> u32 {
        rand::thread_rng().gen_range(1000..=9999)
    }
}

/// Lower-cases and drops a trailing `.exe` so `Notepad.exe` matches `notepad`.
fn normalize_process_name(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// Scans `/proc/<pid>/comm` for a process whose normalised name is `wanted`.
async fn linux_process_running(wanted: &str) -> bool {
    let Ok(mut entries) = tokio::fs::read_dir("/proc").await else {
        return false;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_pid = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.bytes().all(|b| b.is_ascii_digit()));
        if !is_pid {
            continue;
        }
        // Processes may exit between listing and reading.
        if let Ok(comm) = tokio::fs::read_to_string(entry.path().join("comm")).await {
            if normalize_process_name(&comm) == wanted {
                return true;
            }
        }
    }
    false
}
