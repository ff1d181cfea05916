//! Post-render command executor.
//!
//! Runs the user-configured command under a shell with the agent's stdio,
//! optionally bounded by a deadline. On Unix-like platforms the shell comes
//! from `$SHELL`, falling back to `sh -c`; on Windows, `cmd /C`.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::errors::{AgentError, Result};

fn shell() -> (String, &'static str) {
    if cfg!(windows) {
        return ("cmd".to_string(), "/C");
    }
    let shell = std::env::var("SHELL").ok().filter(|s| !s.is_empty());
    (shell.unwrap_or_else(|| "sh".to_string()), "-c")
}

/// Run `command` under a shell. A `timeout` of zero or `None` means no
/// deadline; on deadline expiry the process is killed and the failure is
/// reported as a timeout.
pub async fn execute_with_timeout(command: &str, timeout_seconds: i64) -> Result<()> {
    let (program, flag) = shell();
    debug!(%command, shell = %program, "executing post-render command");

    let mut child = Command::new(&program)
        .arg(flag)
        .arg(command)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| AgentError::command(format!("unable to spawn '{}': {}", command, e)))?;

    let status = if timeout_seconds > 0 {
        match tokio::time::timeout(Duration::from_secs(timeout_seconds as u64), child.wait()).await
        {
            Ok(waited) => {
                waited.map_err(|e| AgentError::command(format!("wait failed: {}", e)))?
            }
            Err(_) => {
                child
                    .kill()
                    .await
                    .map_err(|e| AgentError::command(format!("unable to kill: {}", e)))?;
                return Err(AgentError::command("command timed out"));
            }
        }
    } else {
        child.wait().await.map_err(|e| AgentError::command(format!("wait failed: {}", e)))?
    };

    if !status.success() {
        return Err(AgentError::command(format!("command exited with {}", status)));
    }

    Ok(())
}
