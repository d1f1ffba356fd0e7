//! Signer backed by an external program.

use std::process::Stdio;

use blossom_protocol::{SignedEvent, Signer, SignerError};
use futures_util::future::BoxFuture;
use tokio::process::Command;

/// Runs `program args... <sha256>` and reads the signed event JSON from
/// stdout.
#[derive(Debug, Clone)]
pub struct CommandSigner {
    program: String,
    args: Vec<String>,
}

impl CommandSigner {
    /// Builds a signer from `[program, args...]`. `None` when empty.
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    async fn sign(&self, sha256: &str) -> Result<SignedEvent, SignerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(sha256)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            SignerError::Unavailable(format!("failed to spawn {}: {e}", self.program))
        })?;
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SignerError::Unavailable(format!("{} failed: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SignerError::Rejected(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let event: serde_json::Value = serde_json::from_slice(&output.stdout).map_err(|e| {
            SignerError::Rejected(format!("{} printed invalid JSON: {e}", self.program))
        })?;
        if !event.is_object() {
            return Err(SignerError::Rejected(format!(
                "{} printed JSON that is not an event object",
                self.program
            )));
        }
        tracing::debug!(program = %self.program, sha256, "authorization signed");
        Ok(SignedEvent(event))
    }
}

impl Signer for CommandSigner {
    fn create_upload_auth<'a>(
        &'a self,
        sha256: &'a str,
    ) -> BoxFuture<'a, Result<SignedEvent, SignerError>> {
        Box::pin(self.sign(sha256))
    }
}
