//! Transcript cleanup collaborator
//!
//! Removes filler words and fixes up dictation artifacts. An external
//! command (typically a local LLM) can be configured; it receives the raw
//! transcript on stdin and prints the cleaned text on stdout. Cleanup must
//! never fail a session: on any command failure, timeout, or implausible
//! output the built-in regex stripper runs instead, and if that yields
//! nothing the raw transcript is used as-is.

use crate::config::CleanupConfig;
use regex::Regex;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Trait for transcript cleanup implementations. Infallible by contract:
/// implementations fall back internally rather than surfacing errors.
#[async_trait::async_trait]
pub trait Cleaner: Send + Sync {
    async fn clean(&self, text: &str) -> String;
}

/// Factory function to create the configured cleaner
pub fn create_cleaner(config: &CleanupConfig) -> Arc<dyn Cleaner> {
    match &config.command {
        Some(command) => Arc::new(CommandCleaner::new(
            command.clone(),
            Duration::from_millis(config.timeout_ms),
        )),
        None => Arc::new(FillerStripper::new()),
    }
}

/// Regex-based filler-word stripper, also the fallback path for the
/// command cleaner
pub struct FillerStripper {
    patterns: Vec<Regex>,
    whitespace: Regex,
    leading_punct: Regex,
}

impl FillerStripper {
    pub fn new() -> Self {
        let raw = [
            r"(?i)\b(um+|uh+|er+|ah+)\b",
            r"(?i)\b(like,?\s+)+",
            r"(?i)\b(you know,?\s*)+",
            r"(?i)\b(basically,?\s*)+",
            r"(?i)\b(actually,?\s*)+",
            r"(?i)\b(literally,?\s*)+",
            r"(?i)\b(i mean,?\s*)+",
            r"(?i)\b(kind of|kinda)\s+",
            r"(?i)\b(sort of|sorta)\s+",
        ];
        Self {
            patterns: raw
                .iter()
                .map(|p| Regex::new(p).expect("filler pattern compiles"))
                .collect(),
            whitespace: Regex::new(r"\s+").expect("whitespace pattern compiles"),
            leading_punct: Regex::new(r"^[\s,;:]+").expect("punct pattern compiles"),
        }
    }

    /// Strip fillers and stutters, normalize whitespace, recapitalize
    pub fn strip(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return text.trim().to_string();
        }

        let mut cleaned = text.to_string();
        for pattern in &self.patterns {
            cleaned = pattern.replace_all(&cleaned, " ").into_owned();
        }

        let cleaned = collapse_stutters(&cleaned);
        let cleaned = self.whitespace.replace_all(&cleaned, " ");
        let cleaned = self.leading_punct.replace(cleaned.trim(), "");
        let cleaned = cleaned.trim();

        let mut chars = cleaned.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }
}

impl Default for FillerStripper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Cleaner for FillerStripper {
    async fn clean(&self, text: &str) -> String {
        let stripped = self.strip(text);
        if stripped.is_empty() {
            text.to_string()
        } else {
            stripped
        }
    }
}

/// Drop immediately repeated words ("the the" -> "the"), case-insensitive
fn collapse_stutters(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for word in text.split_whitespace() {
        if let Some(&prev) = out.last() {
            if prev.eq_ignore_ascii_case(word) {
                continue;
            }
        }
        out.push(word);
    }
    out.join(" ")
}

/// Cleaner that pipes the transcript through an external command
pub struct CommandCleaner {
    command: String,
    timeout: Duration,
    fallback: FillerStripper,
}

impl CommandCleaner {
    pub fn new(command: String, timeout: Duration) -> Self {
        Self {
            command,
            timeout,
            fallback: FillerStripper::new(),
        }
    }

    async fn execute_command(&self, text: &str) -> Result<String, String> {
        let mut child = Command::new("sh")
            .args(["-c", &self.command])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to spawn: {}", e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| format!("failed to write stdin: {}", e))?;
            drop(stdin);
        }

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| format!("timed out after {:?}", self.timeout))?
            .map_err(|e| format!("failed to wait: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            ));
        }

        String::from_utf8(output.stdout)
            .map(|s| s.trim().to_string())
            .map_err(|e| format!("output is not UTF-8: {}", e))
    }

    /// Sanity-check command output: reject empty results and responses that
    /// lost most of the input (a chatty model answering instead of editing)
    fn plausible(&self, input: &str, output: &str) -> bool {
        !output.is_empty() && output.len() * 10 >= input.len() * 3
    }
}

#[async_trait::async_trait]
impl Cleaner for CommandCleaner {
    async fn clean(&self, text: &str) -> String {
        // Short fragments are not worth a model round-trip
        if text.split_whitespace().count() < 5 {
            return self.fallback.clean(text).await;
        }

        match self.execute_command(text).await {
            Ok(output) if self.plausible(text, &output) => {
                tracing::debug!(
                    "Cleanup command succeeded ({} -> {} chars)",
                    text.len(),
                    output.len()
                );
                output
            }
            Ok(output) => {
                tracing::warn!(
                    "Cleanup command output implausible ({} chars), using fallback",
                    output.len()
                );
                self.fallback.clean(text).await
            }
            Err(e) => {
                tracing::warn!("Cleanup command failed: {}, using fallback", e);
                self.fallback.clean(text).await
            }
        }
    }
}
