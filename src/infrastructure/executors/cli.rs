//! CLI-layer executor: runs a local coding agent (`claude`, `gemini`) inside a target
//! directory. The agent keeps its own conversation state, keyed by the session hint.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::application::router::PARAM_FRESH_SESSION;
use crate::domain::traits::Executor;
use crate::domain::types::{ErrorKind, ExecutionRequest, ExecutionResult, Layer, Provider};

pub struct CliExecutor {
    provider: Provider,
    program: String,
    target_dir: PathBuf,
}

impl CliExecutor {
    pub fn new(provider: Provider, target_dir: &str) -> Self {
        let program = match provider {
            Provider::Gemini => "gemini",
            _ => "claude",
        };
        Self::with_program(provider, program, target_dir)
    }

    pub fn with_program(provider: Provider, program: &str, target_dir: &str) -> Self {
        Self {
            provider,
            program: program.to_string(),
            target_dir: expand_home(target_dir),
        }
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Arguments for one invocation.
    ///
    /// claude: `--add-dir <dir>`, then `--session-id <id>` for a fresh session or
    /// `--resume <id>` for a known one, then `-p <prompt>`. gemini has no resumable
    /// sessions and only gets `-p <prompt>`.
    pub fn build_args(&self, request: &ExecutionRequest) -> Vec<String> {
        let mut args = Vec::new();
        if self.provider == Provider::Claude {
            args.push("--add-dir".to_string());
            args.push(self.target_dir.display().to_string());
            if let Some(id) = &request.session_hint {
                let flag = if request.param_bool(PARAM_FRESH_SESSION) {
                    "--session-id"
                } else {
                    "--resume"
                };
                args.push(flag.to_string());
                args.push(id.clone());
            }
        }
        args.push("-p".to_string());
        args.push(request.prompt.clone());
        args
    }

    fn failed(&self, kind: ErrorKind, message: impl Into<String>) -> ExecutionResult {
        ExecutionResult::failed(self.provider, Layer::Cli, kind, message)
    }
}

#[async_trait]
impl Executor for CliExecutor {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let args = self.build_args(&request);
        info!(
            "Executing {} in {} (session {:?})",
            self.program,
            self.target_dir.display(),
            request.session_hint
        );

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&args)
            .current_dir(&self.target_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return self.failed(
                    ErrorKind::Unreachable,
                    format!("`{}` not found on PATH", self.program),
                );
            }
            Err(e) => {
                return self.failed(
                    ErrorKind::Unreachable,
                    format!("Failed to spawn {}: {}", self.program, e),
                );
            }
        };

        let output = match child.wait_with_output().await {
            Ok(output) => output,
            Err(e) => return self.failed(ErrorKind::Unknown, e.to_string()),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            warn!("{} exited with {}: {}", self.program, output.status, stderr);
            let detail = if stderr.is_empty() { &stdout } else { &stderr };
            return self.failed(
                ErrorKind::Unknown,
                format!("{} exited with {}: {}", self.program, output.status, detail),
            );
        }
        if stdout.is_empty() {
            return self.failed(ErrorKind::Malformed, format!("{} produced no output", self.program));
        }
        ExecutionResult::ok(self.provider, Layer::Cli, stdout)
    }

    fn is_ready(&self) -> bool {
        self.target_dir.is_dir()
    }
}

fn expand_home(path: &str) -> PathBuf {
    let path = path.trim();
    if let Some(rest) = path.strip_prefix("~")
        && (rest.is_empty() || rest.starts_with('/'))
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest.trim_start_matches('/'));
    }
    PathBuf::from(path)
}
