use regex::Regex;
use std::sync::OnceLock;

use super::line_scan::LineScan;
use crate::data::{CodeLine, LineKind, TargetLanguage};

/// Decides which characters mark a line as natural-language prose
pub trait ProseIndicator: Send + Sync {
    fn is_prose_char(&self, c: char) -> bool;
}

/// Hangul syllables and jamo
#[derive(Debug, Clone, Copy, Default)]
pub struct HangulProse;

impl ProseIndicator for HangulProse {
    fn is_prose_char(&self, c: char) -> bool {
        matches!(c,
            '\u{AC00}'..='\u{D7A3}'
            | '\u{1100}'..='\u{11FF}'
            | '\u{3130}'..='\u{318F}')
    }
}

/// Any alphabetic character outside ASCII
#[derive(Debug, Clone, Copy, Default)]
pub struct NonAsciiProse;

impl ProseIndicator for NonAsciiProse {
    fn is_prose_char(&self, c: char) -> bool {
        !c.is_ascii() && c.is_alphabetic()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAction {
    Keep,
    Comment,
}

/// Surface facts about one line, computed once and shared by all rules
#[derive(Debug, Clone)]
pub struct LineFeatures {
    pub is_comment: bool,
    pub numbered_list: bool,
    /// `=`, `(` or an `import` keyword anywhere in the line
    pub has_code_indicator: bool,
    /// Prose characters outside string literals and comments
    pub has_bare_prose: bool,
    /// import / library load / `=` / `<-` outside string literals
    pub has_import_or_assignment: bool,
    /// `name(` outside string literals
    pub has_call: bool,
}

impl LineFeatures {
    pub fn new(text: &str, prose: &dyn ProseIndicator) -> Self {
        let trimmed = text.trim();
        let scan = LineScan::new(trimmed);
        let bare = scan.bare_text(trimmed);

        Self {
            is_comment: trimmed.starts_with('#'),
            numbered_list: numbered_list_re().is_match(trimmed),
            has_code_indicator: trimmed.contains('=')
                || trimmed.contains('(')
                || trimmed.contains("import"),
            has_bare_prose: bare.chars().any(|c| prose.is_prose_char(c)),
            has_import_or_assignment: import_or_assignment_re().is_match(&bare),
            has_call: call_re().is_match(&bare),
        }
    }
}

/// One entry of the classification table
#[derive(Clone)]
pub struct ClassifierRule {
    pub name: &'static str,
    pub matches: fn(&LineFeatures) -> bool,
    pub action: LineAction,
}

impl std::fmt::Debug for ClassifierRule {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ClassifierRule")
            .field("name", &self.name)
            .field("action", &self.action)
            .finish()
    }
}

/// The stock rule table, evaluated top to bottom; first match wins.
pub fn default_rules() -> Vec<ClassifierRule> {
    vec![
        ClassifierRule {
            name: "existing_comment",
            matches: |f| f.is_comment,
            action: LineAction::Keep,
        },
        ClassifierRule {
            name: "numbered_list",
            matches: |f| f.numbered_list && !f.has_code_indicator,
            action: LineAction::Comment,
        },
        ClassifierRule {
            name: "prose_script",
            matches: |f| f.has_bare_prose && !f.has_import_or_assignment && !f.has_call,
            action: LineAction::Comment,
        },
    ]
}

/// Separates narrative lines from executable ones by lexical cues only
pub struct CommentClassifier {
    rules: Vec<ClassifierRule>,
    prose: Box<dyn ProseIndicator>,
}

impl Default for CommentClassifier {
    fn default() -> Self {
        Self::new(Box::new(HangulProse))
    }
}

impl CommentClassifier {
    pub fn new(prose: Box<dyn ProseIndicator>) -> Self {
        Self::with_rules(default_rules(), prose)
    }

    pub fn with_rules(rules: Vec<ClassifierRule>, prose: Box<dyn ProseIndicator>) -> Self {
        Self { rules, prose }
    }

    pub fn features(&self, text: &str) -> LineFeatures {
        LineFeatures::new(text, self.prose.as_ref())
    }

    /// Action of the first matching rule; lines no rule claims stay code.
    pub fn classify(&self, text: &str) -> LineAction {
        if text.trim().is_empty() {
            return LineAction::Keep;
        }
        let features = self.features(text);
        self.rules
            .iter()
            .find(|rule| (rule.matches)(&features))
            .map(|rule| {
                if rule.action == LineAction::Comment {
                    tracing::debug!(rule = rule.name, line = text, "force-commenting narrative line");
                }
                rule.action
            })
            .unwrap_or(LineAction::Keep)
    }

    /// True when the text would be commented out as narrative.
    pub fn is_narrative(&self, text: &str) -> bool {
        self.classify(text) == LineAction::Comment
    }

    pub fn apply(&self, line: CodeLine, language: TargetLanguage) -> CodeLine {
        if line.kind != LineKind::Code {
            return line;
        }
        match self.classify(&line.text) {
            LineAction::Keep => line,
            LineAction::Comment => CodeLine::comment(force_comment(&line.text, language)),
        }
    }
}

/// Prefixes the line with the comment marker, after its indentation.
pub fn force_comment(text: &str, language: TargetLanguage) -> String {
    let indent_len = text.len() - text.trim_start().len();
    let (indent, body) = text.split_at(indent_len);
    let body = body.trim_end();
    if body.starts_with(language.comment_prefix()) {
        return format!("{}{}", indent, body);
    }
    format!("{}{} {}", indent, language.comment_prefix(), body)
}

fn numbered_list_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+[.)](\s|$)").expect("valid regex"))
}

fn import_or_assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bimport\s|\blibrary\s*\(|\brequire\s*\(|<-|=").expect("valid regex")
    })
}

fn call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9_.]\(").expect("valid regex"))
}
