use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Output, Stdio};

use crate::cancel::CancelToken;
use crate::errors::{DexecError, DexecResult};

/// Builder for constructing and executing external processes.
///
/// Provides a fluent API for setting program, arguments, environment variables, and working directory.
/// The child is killed if the returned future is dropped or the token fires.
pub struct CommandBuilder {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
}

impl CommandBuilder {
    /// Create a new builder for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory for the child process.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Execute the command and return its output.
    pub async fn exec(&self, cancel: &CancelToken) -> DexecResult<Output> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        if let Some(ref dir) = self.cwd {
            cmd.current_dir(dir);
        }
        tracing::debug!("Running {} {}", self.program, self.args.join(" "));
        cancel
            .run(async { cmd.output().await.map_err(DexecError::from) })
            .await
    }

    /// Like [`CommandBuilder::exec`] but maps a non-zero exit status to
    /// [`DexecError::Build`] carrying the tail of the process output.
    pub async fn exec_checked(&self, cancel: &CancelToken) -> DexecResult<Output> {
        let output = self.exec(cancel).await?;
        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() {
            stdout
        } else {
            stderr
        };
        let tail: Vec<&str> = detail.lines().rev().take(20).collect();
        Err(DexecError::Build {
            message: format!(
                "`{}` exited with {}:\n{}",
                self.program,
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join("\n")
            ),
        })
    }
}
