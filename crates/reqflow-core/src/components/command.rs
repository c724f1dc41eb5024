//! External-process component.
//!
//! The requirement is written to the child's stdin as JSON; the child must
//! print a single JSON object `{"payload": ..., "confidence": 0.0..1.0}` on
//! stdout and exit 0. The child is killed if the call is cancelled.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::domain::{AnalysisComponent, ComponentError, ComponentOutput, Requirement};

#[derive(Debug, Clone)]
pub struct CommandComponent {
    id: String,
    /// First element is the executable.
    command: Vec<String>,
}

#[derive(Deserialize)]
struct CommandReply {
    payload: serde_json::Value,
    confidence: f64,
}

impl CommandComponent {
    pub fn new(id: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            id: id.into(),
            command,
        }
    }

    fn spawn_error(&self, reason: impl Into<String>) -> ComponentError {
        ComponentError::Spawn {
            component: self.id.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl AnalysisComponent for CommandComponent {
    async fn execute(&self, requirement: &Requirement) -> Result<ComponentOutput, ComponentError> {
        let (exe, args) = self
            .command
            .split_first()
            .ok_or_else(|| self.spawn_error("empty command"))?;

        let input = serde_json::to_vec(requirement).map_err(|e| ComponentError::InvalidOutput {
            component: self.id.clone(),
            reason: e.to_string(),
        })?;

        let mut child = Command::new(exe)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&input)
                .await
                .map_err(|e| ComponentError::failed(&self.id, format!("writing stdin: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ComponentError::failed(&self.id, e.to_string()))?;

        debug!(component = %self.id, status = ?output.status, "command component exited");

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ComponentError::failed(
                &self.id,
                format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ));
        }

        let reply: CommandReply =
            serde_json::from_slice(&output.stdout).map_err(|e| ComponentError::InvalidOutput {
                component: self.id.clone(),
                reason: e.to_string(),
            })?;

        Ok(ComponentOutput::new(reply.payload, reply.confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_command_component_parses_reply() {
        let component = CommandComponent::new(
            "echoer",
            sh(r#"cat > /dev/null; echo '{"payload":"ok from child","confidence":0.65}'"#),
        );
        let out = component.execute(&Requirement::new("hi")).await.unwrap();
        assert_eq!(out.payload, serde_json::json!("ok from child"));
        assert_eq!(out.confidence, 0.65);
    }

    #[tokio::test]
    async fn test_command_component_reports_nonzero_exit() {
        let component = CommandComponent::new("broken", sh("cat > /dev/null; echo boom >&2; exit 3"));
        let err = component.execute(&Requirement::new("hi")).await.unwrap_err();
        match err {
            ComponentError::Failed { component, reason } => {
                assert_eq!(component, "broken");
                assert!(reason.contains("exit code 3"));
                assert!(reason.contains("boom"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_command_component_rejects_garbage_stdout() {
        let component = CommandComponent::new("noisy", sh("cat > /dev/null; echo not-json"));
        let err = component.execute(&Requirement::new("hi")).await.unwrap_err();
        assert!(matches!(err, ComponentError::InvalidOutput { .. }));
    }

    /// Running means present in /proc and not a zombie awaiting reaping.
    #[cfg(target_os = "linux")]
    fn process_running(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z" && state != "X"),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_cancelled_call_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("child.pid");
        let component = CommandComponent::new(
            "sleeper",
            sh(&format!("echo $$ > {}; exec sleep 30", pid_file.display())),
        );

        let requirement = Requirement::new("hi");
        let call = component.execute(&requirement);
        let res = tokio::time::timeout(std::time::Duration::from_millis(500), call).await;
        assert!(res.is_err(), "call should have been cancelled");

        let pid: u32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let mut gone = false;
        for _ in 0..50 {
            if !process_running(pid) {
                gone = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        assert!(gone, "child {pid} still running after cancellation");
    }

    #[tokio::test]
    async fn test_empty_command_is_a_spawn_error() {
        let component = CommandComponent::new("empty", vec![]);
        let err = component.execute(&Requirement::new("hi")).await.unwrap_err();
        assert!(matches!(err, ComponentError::Spawn { .. }));
    }
}
