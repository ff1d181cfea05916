//! Sink writer: publishes the access token to configured sinks and rendered
//! artifacts to their destinations.
//!
//! Sink failures are isolated: an error on one sink is logged and the
//! remaining sinks are still written. Artifact writes truncate in place
//! rather than write-temp-and-rename; consumers relying on inode stability
//! depend on this.

use std::path::Path;

use tracing::{error, info};

use crate::config::Sink;
use crate::secrets::SecretString;

/// Write the raw token bytes (no trailing newline) to every configured
/// sink. Unsupported sink kinds are logged and skipped.
pub async fn write_token_to_sinks(token: &SecretString, sinks: &[Sink]) {
    for sink in sinks {
        if sink.kind != "file" {
            error!(kind = %sink.kind, "unsupported sink type, only 'file' is supported");
            continue;
        }

        if let Err(e) = write_token_file(token, &sink.config.path).await {
            error!(path = %sink.config.path, error = %e, "unable to write token sink");
            continue;
        }

        info!(path = %sink.config.path, "new access token saved to file sink");
    }
}

async fn write_token_file(token: &SecretString, path: &str) -> std::io::Result<()> {
    tokio::fs::write(path, token.expose_secret().as_bytes()).await?;

    // Token files are owner-writable, world-readable (0644), matching the
    // expectations of co-located consumer processes.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).await?;
    }

    Ok(())
}

/// Write a rendered artifact, creating or truncating the destination.
pub async fn write_artifact(bytes: &[u8], destination: &Path) -> std::io::Result<()> {
    tokio::fs::write(destination, bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SinkDetails;

    fn file_sink(path: &Path) -> Sink {
        Sink {
            kind: "file".to_string(),
            config: SinkDetails { path: path.to_string_lossy().into_owned() },
        }
    }

    #[tokio::test]
    async fn test_token_written_raw() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");

        write_token_to_sinks(&SecretString::new("st.abc123"), &[file_sink(&path)]).await;

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, b"st.abc123");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_token_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");

        write_token_to_sinks(&SecretString::new("tok"), &[file_sink(&path)]).await;

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[tokio::test]
    async fn test_unsupported_sink_skipped_others_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");

        let sinks = vec![
            Sink { kind: "vault".to_string(), config: SinkDetails { path: "ignored".into() } },
            file_sink(&path),
        ];
        write_token_to_sinks(&SecretString::new("tok"), &sinks).await;

        // The unsupported sink did not stop the file sink from being written.
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_abort_rest() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("token");

        let sinks = vec![
            Sink {
                kind: "file".to_string(),
                config: SinkDetails { path: "/nonexistent-dir/token".into() },
            },
            file_sink(&good),
        ];
        write_token_to_sinks(&SecretString::new("tok"), &sinks).await;

        assert!(good.exists());
    }

    #[tokio::test]
    async fn test_artifact_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact");

        write_artifact(b"first version, long", &path).await.unwrap();
        write_artifact(b"second", &path).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }
}
