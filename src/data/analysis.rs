use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of prior analyses carried into a new request as context.
pub const CONTEXT_WINDOW: usize = 3;

const CAPTION_MAX_CHARS: usize = 50;

/// Executable language the generated code targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetLanguage {
    #[default]
    Python,
    R,
}

impl TargetLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetLanguage::Python => "python",
            TargetLanguage::R => "r",
        }
    }

    /// Line comment marker. Both supported languages use `#`.
    pub fn comment_prefix(&self) -> &'static str {
        "#"
    }
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported target language '{0}' (expected 'python' or 'r')")]
pub struct ParseLanguageError(String);

impl FromStr for TargetLanguage {
    type Err = ParseLanguageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(TargetLanguage::Python),
            "r" => Ok(TargetLanguage::R),
            other => Err(ParseLanguageError(other.to_string())),
        }
    }
}

/// Which extraction path produced the code candidate of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    Json,
    FencedBlock,
    LabeledSection,
    RawText,
}

/// A generated analysis in the shape the document renderer consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub language: TargetLanguage,
    pub code: String,
    pub caption: String,
    pub interpretation: String,
    pub timestamp: String,
}

impl CodeBlock {
    /// Builds the record for a finished analysis, stamped with the local time.
    pub fn from_result(
        language: TargetLanguage,
        instruction: &str,
        result: &AnalysisResult,
    ) -> Self {
        Self {
            language,
            code: result.code.clone(),
            caption: caption_for(instruction),
            interpretation: result.interpretation.clone(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Shortens an instruction to a caption: first 50 characters, then `...`.
pub fn caption_for(instruction: &str) -> String {
    let trimmed = instruction.trim();
    if trimmed.chars().count() <= CAPTION_MAX_CHARS {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(CAPTION_MAX_CHARS).collect();
    format!("{}...", head)
}

/// Input of one generation call
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub instruction: String,
    pub language: TargetLanguage,
    pub data_profile: Option<String>,
    pub target_variable: Option<String>,
    /// Prior analyses, oldest first. Never longer than [`CONTEXT_WINDOW`].
    pub history: Vec<CodeBlock>,
}

impl AnalysisRequest {
    pub fn new(instruction: impl Into<String>, language: TargetLanguage) -> Self {
        Self {
            instruction: instruction.into(),
            language,
            data_profile: None,
            target_variable: None,
            history: Vec::new(),
        }
    }

    pub fn with_data_profile(mut self, profile: impl Into<String>) -> Self {
        self.data_profile = Some(profile.into());
        self
    }

    pub fn with_target_variable(mut self, target: impl Into<String>) -> Self {
        self.target_variable = Some(target.into());
        self
    }

    /// Attaches prior analyses; only the most recent [`CONTEXT_WINDOW`] are kept.
    pub fn with_history(mut self, history: &[CodeBlock]) -> Self {
        let start = history.len().saturating_sub(CONTEXT_WINDOW);
        self.history = history[start..].to_vec();
        self
    }
}

/// Output of one generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Cleaned code, safe to embed in an executable cell
    pub code: String,
    pub interpretation: String,
    pub warnings: String,
    /// The untouched model response, kept for diagnosis
    pub raw_response: String,
    pub source: ExtractionSource,
}
