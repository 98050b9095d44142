//! Audit logging for build events
//!
//! Appends JSON lines to `<state dir>/audit.log`: one line per build, run,
//! or invalidation, carrying the derivation key so a cached artifact can be
//! traced back to the invocation that produced it. On by default (a
//! reproducibility tool should keep its provenance trail opt-out, not
//! opt-in).

use crate::config::{Config, ConfigManager};
use chrono::Utc;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

/// File-based audit logger that appends JSON lines
pub struct AuditLog {
    enabled: bool,
    path: PathBuf,
    invocation: Uuid,
}

impl AuditLog {
    /// Create a new audit logger from config. Each logger carries a fresh
    /// invocation id so all events of one CLI run can be correlated.
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.general.audit_log,
            path: ConfigManager::audit_log_path(),
            invocation: Uuid::new_v4(),
        }
    }

    /// Record an audit event.
    ///
    /// Events are dropped silently on IO failure — audit logging must never
    /// block or fail the build it describes.
    pub async fn record(&self, event: &str, data: serde_json::Value) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "invocation": self.invocation,
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write audit log: {}", e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_audit_log(dir: &TempDir, enabled: bool) -> AuditLog {
        AuditLog {
            enabled,
            path: dir.path().join("audit.log"),
            invocation: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn record_appends_json_lines() {
        let dir = TempDir::new().unwrap();
        let audit = test_audit_log(&dir, true);

        audit
            .record("build", serde_json::json!({"package": "base", "key": "abc123"}))
            .await;
        audit.record("run", serde_json::json!({"app": "base"})).await;

        let content = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "build");
        assert_eq!(first["data"]["key"], "abc123");
        assert!(first["invocation"].is_string());
    }

    #[tokio::test]
    async fn disabled_log_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let audit = test_audit_log(&dir, false);

        audit.record("build", serde_json::json!({})).await;

        assert!(!dir.path().join("audit.log").exists());
    }

    #[tokio::test]
    async fn events_share_one_invocation_id() {
        let dir = TempDir::new().unwrap();
        let audit = test_audit_log(&dir, true);

        audit.record("build", serde_json::json!({})).await;
        audit.record("build", serde_json::json!({})).await;

        let content = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
        let ids: Vec<String> = content
            .lines()
            .map(|l| {
                let v: serde_json::Value = serde_json::from_str(l).unwrap();
                v["invocation"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(ids[0], ids[1]);
    }
}
