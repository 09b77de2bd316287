use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}{}", diagnostics(.stderr))]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

fn diagnostics(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Runs external programs to completion. Implemented by [`ProcessRunner`] and
/// by scripted runners in tests.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Runs `program` with its stdout captured and returned. A non-zero exit
    /// yields [`CommandError::Failed`] carrying whatever went to stderr.
    async fn capture(&self, program: &str, args: &[String]) -> Result<Vec<u8>, CommandError>;

    /// Runs `program` attached to the terminal so it can prompt the user. Its
    /// stdout is forwarded to our stderr.
    async fn interactive(&self, program: &str, args: &[String]) -> Result<(), CommandError>;
}

/// Spawns real child processes and waits for them without a timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    async fn capture(&self, program: &str, args: &[String]) -> Result<Vec<u8>, CommandError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(CommandError::Failed {
                program: program.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(output.stdout)
    }

    async fn interactive(&self, program: &str, args: &[String]) -> Result<(), CommandError> {
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(std::io::stderr())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !status.success() {
            return Err(CommandError::Failed {
                program: program.to_string(),
                status,
                stderr: String::new(),
            });
        }
        Ok(())
    }
}
