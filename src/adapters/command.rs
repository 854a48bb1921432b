use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Run an external program to completion.
///
/// The child is killed if the returned future is dropped, so callers can
/// bound it with `tokio::time::timeout`. A non-zero exit is an error carrying
/// the exit status and trimmed stderr.
pub async fn run_command(program: &str, args: &[String]) -> Result<(), String> {
    debug!("Running {} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("failed to spawn {}: {}", program, e))?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        Err(format!("{} exited with {}", program, output.status))
    } else {
        Err(format!("{} exited with {}: {}", program, output.status, stderr))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success() {
        assert!(run_command("true", &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_includes_stderr() {
        let args = vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()];
        let err = run_command("sh", &args).await.unwrap_err();
        assert!(err.contains("boom"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = run_command("/nonexistent/bin/restart", &[]).await.unwrap_err();
        assert!(err.starts_with("failed to spawn"));
    }
}
