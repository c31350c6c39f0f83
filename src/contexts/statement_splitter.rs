use regex::Regex;
use std::sync::OnceLock;

use super::comment_classifier::{CommentClassifier, force_comment};
use super::line_scan::LineScan;
use crate::data::{CodeLine, TargetLanguage};

/// Keywords after which an expression must follow; a statement never ends on them.
const CONTINUATION_WORDS: &[&str] = &[
    "and", "as", "assert", "await", "del", "elif", "else", "for", "from", "if", "import", "in",
    "is", "lambda", "not", "or", "raise", "return", "while", "with", "yield", "function",
    "repeat",
];

/// Keywords that open a statement; a fragment starting with one is code.
const STATEMENT_KEYWORDS: &[&str] = &[
    "assert", "break", "class", "continue", "def", "del", "elif", "else", "except", "finally",
    "for", "global", "if", "import", "lambda", "nonlocal", "pass", "raise", "return", "try",
    "while", "with", "yield", "function", "repeat", "next", "async", "await",
];

/// Keywords whose parenthesised header is followed by a body on the same line.
const HEADER_KEYWORDS: &[&str] = &["if", "for", "while", "function", "elif", "switch"];

/// Characters that only appear in code, never in a narrative fragment.
const CODE_CHARS: &[char] = &['=', '(', '[', '{', '$', '%', '~', '<', '>', '+', '*', '|', '&'];

/// A pattern whose appearance mid-line starts a new statement
#[derive(Debug)]
pub struct SplitMarker {
    pub name: &'static str,
    pattern: Regex,
}

impl SplitMarker {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("valid split marker regex"),
        }
    }

    /// First offset at or after `from` where the marker matches and `accept` agrees.
    fn find_from(&self, text: &str, from: usize, accept: impl Fn(usize) -> bool) -> Option<usize> {
        let mut at = from;
        while at <= text.len() {
            let m = self.pattern.find_at(text, at)?;
            if accept(m.start()) {
                return Some(m.start());
            }
            at = next_char_boundary(text, m.start());
        }
        None
    }
}

/// Split markers for the language, in tie-break order.
pub fn split_markers(language: TargetLanguage) -> &'static [SplitMarker] {
    static PYTHON: OnceLock<Vec<SplitMarker>> = OnceLock::new();
    static R: OnceLock<Vec<SplitMarker>> = OnceLock::new();
    match language {
        TargetLanguage::Python => PYTHON.get_or_init(|| {
            vec![
                SplitMarker::new("from_import", r"\bfrom\s+[\w.]+\s+import\s"),
                SplitMarker::new("import", r"\bimport\s+[A-Za-z_]"),
                SplitMarker::new("plt", r"\bplt\.\w"),
                SplitMarker::new("sns", r"\bsns\.\w"),
                SplitMarker::new("px", r"\bpx\.\w"),
                SplitMarker::new("fig", r"\bfig\.\w"),
                SplitMarker::new("ax", r"\bax\.\w"),
                SplitMarker::new("print", r"\bprint\("),
                SplitMarker::new("display", r"\bdisplay\("),
                SplitMarker::new("def", r"\bdef\s+\w+\s*\("),
                SplitMarker::new("class", r"\bclass\s+\w+\s*[:(]"),
                SplitMarker::new("assignment", r"\b[A-Za-z_]\w*(?:\[[^\]\n]*\])?\s*=[^=]"),
            ]
        }),
        TargetLanguage::R => R.get_or_init(|| {
            vec![
                SplitMarker::new("library", r"\blibrary\("),
                SplitMarker::new("require", r"\brequire\("),
                SplitMarker::new("ggplot", r"\bggplot\("),
                SplitMarker::new("print", r"\bprint\("),
                SplitMarker::new("summary", r"\bsummary\("),
                SplitMarker::new("arrow_assignment", r"\b[A-Za-z][\w.]*(?:\[[^\]\n]*\])?\s*<-"),
                SplitMarker::new("assignment", r"\b[A-Za-z][\w.]*\s*=[^=]"),
            ]
        }),
    }
}

/// Separates statements that a model glued onto one line
pub struct StatementSplitter<'a> {
    language: TargetLanguage,
    classifier: &'a CommentClassifier,
}

impl<'a> StatementSplitter<'a> {
    pub fn new(language: TargetLanguage, classifier: &'a CommentClassifier) -> Self {
        Self {
            language,
            classifier,
        }
    }

    /// Splits one code line into zero or more lines. Narrative fragments come
    /// back as comment lines; every output line keeps the input indentation.
    pub fn split_line(&self, line: &str) -> Vec<CodeLine> {
        let indent_len = line.len() - line.trim_start().len();
        let indent = &line[..indent_len];
        let mut rest = line[indent_len..].trim_end();
        let mut out = Vec::new();

        if rest.is_empty() {
            return vec![CodeLine::blank()];
        }

        loop {
            if rest.starts_with('#') || is_compound_import(rest) {
                out.push(CodeLine::from_raw(&format!("{}{}", indent, rest)));
                break;
            }

            let Some(cut) = self.earliest_cut(rest) else {
                let text = format!("{}{}", indent, rest);
                if self.classifier.is_narrative(&text) {
                    out.push(CodeLine::comment(force_comment(&text, self.language)));
                } else {
                    out.push(CodeLine::code(text));
                }
                break;
            };

            let fragment = rest[..cut].trim_end();
            if !fragment.is_empty() {
                let text = format!("{}{}", indent, fragment);
                if self.looks_like_code(fragment) {
                    out.push(CodeLine::code(text));
                } else {
                    tracing::debug!(fragment, "commenting narrative fragment before split");
                    out.push(CodeLine::comment(force_comment(&text, self.language)));
                }
            }
            rest = rest[cut..].trim_start();
        }

        out
    }

    /// Offset of the earliest acceptable marker; ties go to the first-listed marker.
    fn earliest_cut(&self, rest: &str) -> Option<usize> {
        let scan = LineScan::new(rest);
        let mut best: Option<usize> = None;

        for marker in split_markers(self.language) {
            let found = marker.find_from(rest, 1, |pos| {
                best.is_none_or(|b| pos < b) && self.is_valid_cut(rest, &scan, pos)
            });
            if let Some(pos) = found {
                if best.is_none_or(|b| pos < b) {
                    tracing::trace!(marker = marker.name, pos, "split marker");
                    best = Some(pos);
                }
            }
        }

        best
    }

    fn is_valid_cut(&self, rest: &str, scan: &LineScan, pos: usize) -> bool {
        if pos == 0 || !scan.is_top_level(pos) {
            return false;
        }
        let before = &rest[..pos];
        if !before.ends_with(|c: char| c.is_whitespace() || c == ';') {
            return false;
        }
        let fragment = before.trim_end();
        if fragment.is_empty() || fragment.ends_with([',', '\\']) {
            return false;
        }
        if !self.looks_like_code(fragment) {
            return true;
        }
        ends_complete_statement(fragment)
    }

    /// A fragment is code when it carries operator syntax, opens with a
    /// statement keyword, or contains a split marker of its own.
    fn looks_like_code(&self, fragment: &str) -> bool {
        let bare = LineScan::new(fragment).bare_text(fragment);
        if bare.contains(CODE_CHARS) || fragment.starts_with('#') {
            return true;
        }
        if STATEMENT_KEYWORDS.contains(&first_word(fragment)) {
            return true;
        }
        split_markers(self.language)
            .iter()
            .any(|m| m.pattern.is_match(fragment))
    }
}

/// `from X import Y` must reach the interpreter as written.
pub fn is_compound_import(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^from\s+[\w.]+\s+import\s").expect("valid regex"))
        .is_match(text.trim_start())
}

/// Breaks a line holding several imports (or R library loads) into one line each.
pub fn explode_repeated_statements(line: &str, language: TargetLanguage) -> Vec<String> {
    let indent_len = line.len() - line.trim_start().len();
    let (indent, body) = line.split_at(indent_len);

    match language {
        TargetLanguage::Python => {
            if !body.starts_with("import ") {
                return vec![line.to_string()];
            }
            // Only separators outside strings, brackets and the trailing comment count.
            let scan = LineScan::new(body);
            let (code, comment) = body.split_at(scan.code_end());
            let separators: Vec<_> = import_separator_re()
                .find_iter(code)
                .filter(|m| scan.is_top_level(m.start()))
                .collect();
            if separators.is_empty() {
                return vec![line.to_string()];
            }

            let mut pieces = Vec::with_capacity(separators.len() + 1);
            let mut start = 0;
            for m in &separators {
                pieces.push(&code[start..m.start()]);
                start = m.end();
            }
            pieces.push(&code[start..]);

            let mut statements: Vec<String> = pieces
                .into_iter()
                .map(|part| part.trim().trim_end_matches([',', ';']).trim())
                .filter(|part| !part.is_empty())
                .map(|part| {
                    if part.starts_with("import ") {
                        format!("{}{}", indent, part)
                    } else {
                        format!("{}import {}", indent, part)
                    }
                })
                .collect();
            if let Some(last) = statements.last_mut() {
                if !comment.is_empty() {
                    let gap = &code[code.trim_end().len()..];
                    last.push_str(if gap.is_empty() { " " } else { gap });
                    last.push_str(comment);
                }
            }
            statements
        }
        TargetLanguage::R => {
            let calls: Vec<&str> = library_call_re().find_iter(body).map(|m| m.as_str()).collect();
            if calls.len() < 2 {
                return vec![line.to_string()];
            }
            let leftover = library_call_re().replace_all(body, "");
            if !leftover.chars().all(|c| c.is_whitespace() || c == ';' || c == ',') {
                return vec![line.to_string()];
            }
            calls
                .into_iter()
                .map(|call| format!("{}{}", indent, call))
                .collect()
        }
    }
}

fn import_separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s,;]+import\s+").expect("valid regex"))
}

fn library_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:library|require)\([^()]*\)").expect("valid regex"))
}

/// Whether code ending here could be a whole statement rather than the
/// left half of an expression or a control-flow header.
fn ends_complete_statement(fragment: &str) -> bool {
    let Some(last) = fragment.chars().last() else {
        return false;
    };
    let closes = matches!(last, ')' | ']' | '}' | '\'' | '"' | '`' | ';');
    if !(closes || last.is_alphanumeric() || last == '_') {
        return false;
    }
    if CONTINUATION_WORDS.contains(&last_word(fragment)) {
        return false;
    }
    if last == ')' {
        if let Some(open) = matching_open_paren(fragment) {
            let head = fragment[..open].trim_end();
            if HEADER_KEYWORDS.contains(&last_word(head)) {
                return false;
            }
        }
    }
    true
}

/// Offset of the `(` matching the fragment's final `)`.
fn matching_open_paren(fragment: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, c) in fragment.char_indices().rev() {
        match c {
            ')' => depth += 1,
            '(' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn first_word(text: &str) -> &str {
    let text = text.trim_start();
    let end = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    &text[..end]
}

fn last_word(text: &str) -> &str {
    let text = text.trim_end();
    let start = text
        .rfind(|c: char| !(c.is_alphanumeric() || c == '_'))
        .map(|i| i + text[i..].chars().next().map_or(1, |c| c.len_utf8()))
        .unwrap_or(0);
    &text[start..]
}

fn next_char_boundary(text: &str, pos: usize) -> usize {
    text[pos..]
        .chars()
        .next()
        .map_or(text.len() + 1, |c| pos + c.len_utf8())
}
