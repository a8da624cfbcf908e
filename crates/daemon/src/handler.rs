// Command job handler
// Runs a job payload `{"command": "...", "args": [...], "env": {...}}` as a
// child process with an environment allowlist and a timeout.

use async_trait::async_trait;
use gatekeeper_core::domain::Job;
use gatekeeper_core::error::{AppError, Result};
use gatekeeper_core::port::JobHandler;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

/// Default per-job timeout when the payload does not set `timeout_ms` (10 min)
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(600);

/// Execution parameters extracted from a job payload
#[derive(Debug, Clone, PartialEq)]
struct Invocation {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    working_dir: String,
    timeout: Duration,
}

pub struct CommandJobHandler {
    env_allowlist: Vec<String>,
    default_timeout: Duration,
}

impl CommandJobHandler {
    /// Create a handler passing only `env_allowlist` variables from payloads
    pub fn new(env_allowlist: Vec<String>) -> Self {
        Self {
            env_allowlist,
            default_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, default_timeout: Duration) -> Self {
        self.default_timeout = default_timeout;
        self
    }

    fn parse_payload(&self, job: &Job) -> Result<Invocation> {
        let payload = job.payload.as_value();

        let command = payload
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::Execution("Missing 'command' in payload".to_string()))?;

        let args = payload
            .get("args")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let env = payload
            .get("env")
            .and_then(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .filter(|(k, _)| self.env_allowlist.contains(k))
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let working_dir = payload
            .get("working_dir")
            .and_then(|v| v.as_str())
            .unwrap_or(".")
            .to_string();

        let timeout = payload
            .get("timeout_ms")
            .and_then(|v| v.as_u64())
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);

        Ok(Invocation {
            command: command.to_string(),
            args,
            env,
            working_dir,
            timeout,
        })
    }
}

#[async_trait]
impl JobHandler for CommandJobHandler {
    async fn perform(&self, job: &Job) -> Result<()> {
        let invocation = self.parse_payload(job)?;
        let started = Instant::now();

        info!(
            job_id = %job.id,
            command = %invocation.command,
            args = ?invocation.args,
            timeout_ms = invocation.timeout.as_millis() as u64,
            "Starting command"
        );

        let child = Command::new(&invocation.command)
            .args(&invocation.args)
            .envs(&invocation.env)
            .current_dir(&invocation.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Execution(format!("Spawn failed: {}", e)))?;

        let output = match timeout(invocation.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(AppError::Execution(format!("IO error: {}", e))),
            Err(_) => {
                warn!(job_id = %job.id, "Command timed out, child killed");
                return Err(AppError::Execution(format!(
                    "Timed out after {}ms",
                    invocation.timeout.as_millis()
                )));
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        if output.status.success() {
            info!(job_id = %job.id, duration_ms, "Command succeeded");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(AppError::Execution(format!(
                "Exit code {:?}: {}",
                output.status.code(),
                stderr.trim()
            )))
        }
    }
}
