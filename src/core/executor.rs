//! Text generators backing the pipeline.
//!
//! The pipeline only sees the [`Generator`] trait: a slow, fallible call that
//! turns a prompt into text which may be empty or malformed. [`CliGenerator`]
//! implements it by running an AI CLI (Codex, Claude, Gemini) as a
//! subprocess and capturing its stdout.

use std::process::Stdio;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Maximum bytes of stderr quoted in a failure message.
const MAX_STDERR_IN_ERROR: usize = 2_000;

/// Per-call generation parameters.
///
/// Passed by value on every call instead of being set on a shared generator,
/// so nothing has to be restored afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationOptions {
    /// Upper bound on generated tokens, if the backend supports one.
    pub max_new_tokens: Option<u32>,
}

impl GenerationOptions {
    /// Options limiting output to `max_new_tokens`.
    #[must_use]
    pub const fn with_max_new_tokens(max_new_tokens: u32) -> Self {
        Self {
            max_new_tokens: Some(max_new_tokens),
        }
    }
}

/// A blocking-latency text generator.
///
/// Implementations may be shared between concurrent jobs and must not keep
/// per-call state beyond what [`GenerationOptions`] carries.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generates a completion for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not produce any output.
    async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<String>;

    /// Returns the display name for this generator.
    fn name(&self) -> &'static str;
}

/// How a CLI prints its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    /// Stdout is the answer.
    Text,
    /// Stdout is a Claude `--output-format json` result object.
    ClaudeJson,
}

/// Runs an AI CLI once per prompt and returns what it printed.
#[derive(Debug, Clone)]
pub struct CliGenerator {
    name: &'static str,
    program: String,
    args: Vec<String>,
    token_env: Option<&'static str>,
    format: OutputFormat,
}

impl CliGenerator {
    /// `codex exec <prompt>`
    #[must_use]
    pub fn codex() -> Self {
        Self {
            name: "Codex",
            program: "codex".to_string(),
            args: vec!["exec".to_string()],
            token_env: None,
            format: OutputFormat::Text,
        }
    }

    /// `claude -p --output-format json <prompt>`
    ///
    /// The output budget is forwarded through `CLAUDE_CODE_MAX_OUTPUT_TOKENS`.
    #[must_use]
    pub fn claude() -> Self {
        Self {
            name: "Claude Code",
            program: "claude".to_string(),
            args: vec![
                "-p".to_string(),
                "--output-format".to_string(),
                "json".to_string(),
            ],
            token_env: Some("CLAUDE_CODE_MAX_OUTPUT_TOKENS"),
            format: OutputFormat::ClaudeJson,
        }
    }

    /// `gemini -p <prompt>`
    #[must_use]
    pub fn gemini() -> Self {
        Self {
            name: "Gemini",
            program: "gemini".to_string(),
            args: vec!["-p".to_string()],
            token_env: None,
            format: OutputFormat::Text,
        }
    }

    /// Any program that takes the prompt as its last argument and prints
    /// plain text.
    #[must_use]
    pub fn custom<I, S>(name: &'static str, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name,
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            token_env: None,
            format: OutputFormat::Text,
        }
    }

    /// Forwards `max_new_tokens` to the program through an environment
    /// variable.
    #[must_use]
    pub const fn with_token_env(mut self, var: &'static str) -> Self {
        self.token_env = Some(var);
        self
    }

    /// Returns the program this generator runs.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl Generator for CliGenerator {
    async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<String> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        match (self.token_env, options.max_new_tokens) {
            (Some(var), Some(limit)) => {
                command.env(var, limit.to_string());
            }
            (None, Some(limit)) => {
                debug!(generator = self.name, limit, "backend has no output limit knob");
            }
            _ => {}
        }

        let output = command
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.program))?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} exited with code {code}: {}",
                self.name,
                truncate_at_char_boundary(stderr.trim(), MAX_STDERR_IN_ERROR)
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        match self.format {
            OutputFormat::Text => Ok(stdout),
            OutputFormat::ClaudeJson => parse_claude_result(&stdout)
                .with_context(|| format!("{} returned no result", self.name)),
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Extracts the answer from Claude's `--output-format json` result object.
///
/// Structure: `{"type":"result","subtype":"success","result":"..."}`.
/// Returns an error for error results and unparseable output.
fn parse_claude_result(stdout: &str) -> Result<String> {
    let json: serde_json::Value =
        serde_json::from_str(stdout.trim()).context("Output is not JSON")?;

    if json.get("type").and_then(serde_json::Value::as_str) != Some("result") {
        bail!("Unexpected message type");
    }
    let is_error = json
        .get("is_error")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    match json.get("subtype").and_then(serde_json::Value::as_str) {
        Some("success") if !is_error => json
            .get("result")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .context("Result field missing"),
        subtype => bail!("Generation failed (subtype={subtype:?}, is_error={is_error})"),
    }
}

fn truncate_at_char_boundary(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
