//! External text renderer (cowsay).
//!
//! The user's text is passed as one discrete argument; no shell is
//! involved, so chat input can never be interpreted as a command line.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Errors from running the renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} produced output that is not valid UTF-8")]
    InvalidUtf8 { program: String },

    #[error("{program} did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

/// Turns chat text into rendered text.
#[async_trait]
pub trait TextRenderer: Send + Sync {
    /// Renders `text`.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the renderer cannot produce output.
    async fn render(&self, text: &str) -> Result<String, RenderError>;
}

/// Renders text by running an external program.
#[derive(Debug, Clone)]
pub struct ProcessRenderer {
    program: PathBuf,
    leading_args: Vec<String>,
    timeout: Duration,
}

impl ProcessRenderer {
    /// Creates a renderer running `program <text>`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout,
        }
    }

    /// Creates a cowsay renderer; `--` keeps text like `-f x` from being read as options.
    #[must_use]
    pub fn cowsay(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self::new(program, timeout).with_leading_args(["--"])
    }

    /// Sets arguments placed before the text.
    #[must_use]
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

#[async_trait]
impl TextRenderer for ProcessRenderer {
    async fn render(&self, text: &str) -> Result<String, RenderError> {
        let program = self.program_name();
        debug!("Running {} with {} bytes of input", program, text.len());

        let child = Command::new(&self.program)
            .args(&self.leading_args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RenderError::Spawn {
                program: program.clone(),
                source,
            })?;

        // Dropping the future on timeout kills the child.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| RenderError::Spawn {
                program: program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(RenderError::TimedOut {
                    program,
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(RenderError::Failed {
                program,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| RenderError::InvalidUtf8 { program })
    }
}
