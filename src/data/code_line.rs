/// Classification of a single line during normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Code,
    Comment,
    Blank,
}

/// One line of code in flight through the normalizer.
///
/// `text` includes the line's leading indentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    pub text: String,
    pub kind: LineKind,
}

impl CodeLine {
    pub fn code(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: LineKind::Code,
        }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: LineKind::Comment,
        }
    }

    pub fn blank() -> Self {
        Self {
            text: String::new(),
            kind: LineKind::Blank,
        }
    }

    /// Classifies raw text by its surface form only.
    pub fn from_raw(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            CodeLine::blank()
        } else if trimmed.starts_with('#') {
            CodeLine::comment(text.trim_end())
        } else {
            CodeLine::code(text.trim_end())
        }
    }

    pub fn is_blank(&self) -> bool {
        self.kind == LineKind::Blank
    }
}
