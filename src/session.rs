//! Session history of generated analyses
//!
//! Stored as JSON in .biolog/ so that consecutive `generate` runs can carry
//! the most recent analyses as context, and so the whole history can be
//! exported for the document renderer.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::data::{CodeBlock, CONTEXT_WINDOW};

const SESSION_DIR: &str = ".biolog";
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Generated analyses, oldest first
    history: Vec<CodeBlock>,
}

impl Session {
    /// Path of the session file under the working directory
    pub fn default_path() -> PathBuf {
        PathBuf::from(SESSION_DIR).join(SESSION_FILE)
    }

    /// Load the session from disk, or start an empty one
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Session::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file {}", path.display()))
    }

    /// Save the session to disk, creating the parent directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize session")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write session file {}", path.display()))
    }

    pub fn record(&mut self, block: CodeBlock) {
        self.history.push(block);
    }

    pub fn history(&self) -> &[CodeBlock] {
        &self.history
    }

    /// The most recent analyses passed as context to the next request.
    pub fn context_window(&self) -> &[CodeBlock] {
        let start = self.history.len().saturating_sub(CONTEXT_WINDOW);
        &self.history[start..]
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Renderer input: a JSON array of records.
    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.history).context("Failed to serialize code blocks")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TargetLanguage;

    fn block(n: usize) -> CodeBlock {
        CodeBlock {
            language: TargetLanguage::R,
            code: format!("x{} <- {}", n, n),
            caption: format!("analysis {}", n),
            interpretation: String::new(),
            timestamp: "2025-03-01 09:30:00".to_string(),
        }
    }

    #[test]
    fn context_window_keeps_last_three() {
        let mut session = Session::default();
        assert!(session.context_window().is_empty());

        for n in 1..=5 {
            session.record(block(n));
        }
        let captions: Vec<&str> = session.context_window().iter().map(|b| b.caption.as_str()).collect();
        assert_eq!(captions, vec!["analysis 3", "analysis 4", "analysis 5"]);
        assert_eq!(session.len(), 5);
    }

    #[test]
    fn save_then_load_restores_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let mut session = Session::default();
        session.record(block(1));
        session.record(block(2));
        session.save(&path).unwrap();

        assert_eq!(Session::load(&path).unwrap(), session);
    }

    #[test]
    fn missing_file_is_an_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::load(&dir.path().join("session.json")).unwrap();
        assert!(session.is_empty());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();
        assert!(Session::load(&path).is_err());
    }

    #[test]
    fn export_uses_renderer_field_names() {
        let mut session = Session::default();
        session.record(block(1));
        let exported: serde_json::Value = serde_json::from_str(&session.export_json().unwrap()).unwrap();
        let record = &exported[0];
        assert_eq!(record["language"], "r");
        assert_eq!(record["code"], "x1 <- 1");
        assert_eq!(record["caption"], "analysis 1");
        assert_eq!(record["timestamp"], "2025-03-01 09:30:00");
    }

    #[test]
    fn clear_empties_history() {
        let mut session = Session::default();
        session.record(block(1));
        session.clear();
        assert!(session.is_empty());
    }
}
