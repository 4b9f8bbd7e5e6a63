//! Language detection boundary.
//!
//! Detection is optional: a failing or missing detector leaves documents with
//! an unknown language and never aborts indexing.

use crate::config::DetectorCommand;
use crate::error::{IndexError, Result};
use std::io::Write;
use std::process::{Command, Stdio};

pub trait LanguageDetector: Send + Sync {
    /// Returns one tag per input text, `None` where the language is unknown.
    fn detect(&self, texts: &[&str]) -> Result<Vec<Option<String>>>;
}

/// Detector used when detection is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDetector;

impl LanguageDetector for NoDetector {
    fn detect(&self, texts: &[&str]) -> Result<Vec<Option<String>>> {
        Ok(vec![None; texts.len()])
    }
}

/// Runs an external program that reads a JSON array of texts on stdin and
/// prints a JSON array of language tags (or `null`) on stdout.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    command: DetectorCommand,
}

impl CommandDetector {
    pub fn new(command: DetectorCommand) -> Self {
        Self { command }
    }
}

impl LanguageDetector for CommandDetector {
    fn detect(&self, texts: &[&str]) -> Result<Vec<Option<String>>> {
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| IndexError::Detector(format!("cannot start {}: {e}", self.command.program)))?;

        let payload = serde_json::to_vec(texts)?;
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&payload) {
                drop(stdin);
                let _ = child.kill();
                let status = child.wait()?;
                return Err(IndexError::Detector(format!(
                    "writing to {} failed ({e}), exited with {status}",
                    self.command.program
                )));
            }
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(IndexError::Detector(format!("{} exited with {}", self.command.program, output.status)));
        }

        let tags: Vec<Option<String>> = serde_json::from_slice(&output.stdout)?;
        if tags.len() != texts.len() {
            return Err(IndexError::Detector(format!(
                "expected {} tags, got {}",
                texts.len(),
                tags.len()
            )));
        }
        Ok(tags
            .into_iter()
            .map(|t| t.filter(|s| !s.trim().is_empty()))
            .collect())
    }
}

/// Runs `detector`, degrading every failure to "unknown".
pub fn detect_or_unknown(detector: &dyn LanguageDetector, texts: &[&str]) -> Vec<Option<String>> {
    match detector.detect(texts) {
        Ok(tags) => tags,
        Err(e) => {
            tracing::warn!(error = %e, count = texts.len(), "language detection failed, marking languages unknown");
            vec![None; texts.len()]
        }
    }
}
