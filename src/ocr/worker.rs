//! One pool-managed tesseract worker.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

use super::types::{OcrError, OcrOptions};

/// A pool slot bound to one option set.
///
/// Tesseract has no long-lived server mode, so each job runs
/// `tesseract stdin stdout` as a short-lived child process. The pool's lease
/// guarantees a worker executes one job at a time.
#[derive(Debug)]
pub struct TesseractWorker {
    id: Uuid,
    bin: String,
    options: OcrOptions,
    job_timeout: Duration,
}

impl TesseractWorker {
    pub(super) fn new(bin: String, options: OcrOptions, job_timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            bin,
            options,
            job_timeout,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Run one OCR job: stream the image to tesseract, collect the extracted
    /// text. Bounded by the job timeout so the pool never observes a hang;
    /// `kill_on_drop` reaps the child if the request is abandoned mid-job.
    pub async fn run(&self, image: &[u8]) -> Result<String, OcrError> {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(self.options.lang_arg());
        if let Some(oem) = self.options.oem {
            cmd.arg("--oem").arg(oem.to_string());
        }
        if let Some(psm) = self.options.psm {
            cmd.arg("--psm").arg(psm.to_string());
        }
        if let Some(dpi) = self.options.dpi {
            cmd.arg("--dpi").arg(dpi.to_string());
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| OcrError::Crashed(format!("failed to spawn {}: {e}", self.bin)))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| OcrError::Crashed("stdin not captured".to_string()))?;

        // Feed stdin and drain stdout/stderr concurrently; writing first and
        // collecting after can deadlock on pipe buffers for large images.
        let write = async {
            stdin.write_all(image).await?;
            stdin.shutdown().await?;
            drop(stdin);
            Ok::<_, std::io::Error>(())
        };
        let (write_result, output) = tokio::time::timeout(self.job_timeout, async {
            tokio::join!(write, child.wait_with_output())
        })
        .await
        .map_err(|_| {
            OcrError::Crashed(format!(
                "job exceeded {}ms timeout",
                self.job_timeout.as_millis()
            ))
        })?;

        let output =
            output.map_err(|e| OcrError::Crashed(format!("failed to collect output: {e}")))?;
        if !output.status.success() {
            return Err(OcrError::ExecutionFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        // A write failure with a clean exit means the pipe broke underneath a
        // healthy-looking child; treat it as a crash.
        write_result.map_err(|e| OcrError::Crashed(format!("failed to stream image: {e}")))?;

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_failure_is_a_crash() {
        let worker = TesseractWorker::new(
            "/nonexistent/tesseract-binary".to_string(),
            OcrOptions::default(),
            Duration::from_secs(5),
        );
        let err = worker.run(b"not an image").await.unwrap_err();
        assert!(matches!(err, OcrError::Crashed(_)));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_execution_failure() {
        // `false` ignores its arguments and exits 1, standing in for a
        // tesseract run that rejected its input.
        let worker = TesseractWorker::new(
            "false".to_string(),
            OcrOptions::default(),
            Duration::from_secs(5),
        );
        let err = worker.run(b"").await.unwrap_err();
        match err {
            OcrError::ExecutionFailed { code, .. } => assert_eq!(code, Some(1)),
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
    }

    /// Drop an executable script into a temp dir to stand in for the
    /// tesseract binary (which ignores our fixed argument list).
    #[cfg(unix)]
    fn fake_binary(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("fake-tesseract");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_captured_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let worker = TesseractWorker::new(
            fake_binary(&dir, "exec cat -"),
            OcrOptions::default(),
            Duration::from_secs(5),
        );
        let text = worker.run(b"recognized text").await.unwrap();
        assert!(text.contains("recognized text"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hanging_job_times_out_as_crash() {
        let dir = tempfile::tempdir().unwrap();
        let worker = TesseractWorker::new(
            fake_binary(&dir, "exec sleep 30"),
            OcrOptions::default(),
            Duration::from_millis(100),
        );
        let err = worker.run(b"").await.unwrap_err();
        assert!(matches!(err, OcrError::Crashed(_)));
    }
}
