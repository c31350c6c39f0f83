//! Pulls a code payload and its narrative fields out of a raw model response.
//!
//! Responses arrive as a JSON object, as markdown with fenced blocks, as
//! labelled sections, or as bare text. Extraction walks those shapes in that
//! order and never fails: missing pieces come back as empty strings.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

use crate::data::ExtractionSource;

/// How many times a JSON envelope nested inside extracted code is unwrapped.
const MAX_ENVELOPE_DEPTH: usize = 3;

/// Fields recovered from a model response, before code normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub code: String,
    pub interpretation: String,
    pub warnings: String,
    pub source: ExtractionSource,
}

/// Labelled sections a response may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Code,
    Interpretation,
    Warnings,
}

impl Section {
    const ALL: [Section; 3] = [Section::Code, Section::Interpretation, Section::Warnings];

    fn labels(&self) -> &'static [&'static str] {
        match self {
            Section::Code => &["코드", "code"],
            Section::Interpretation => &["해석", "interpretation"],
            Section::Warnings => &["주의사항", "warnings", "warning", "caveats"],
        }
    }

    fn marker_re(&self) -> &'static Regex {
        static CODE: OnceLock<Regex> = OnceLock::new();
        static INTERPRETATION: OnceLock<Regex> = OnceLock::new();
        static WARNINGS: OnceLock<Regex> = OnceLock::new();
        let cell = match self {
            Section::Code => &CODE,
            Section::Interpretation => &INTERPRETATION,
            Section::Warnings => &WARNINGS,
        };
        cell.get_or_init(|| {
            let labels = self
                .labels()
                .iter()
                .map(|l| regex::escape(l))
                .collect::<Vec<_>>()
                .join("|");
            Regex::new(&format!(
                r"(?im)\*\*[ \t]*(?:{labels})[ \t]*:?[ \t]*\*\*[ \t]*:?|^[ \t]*#{{2,6}}[ \t]*(?:{labels})[ \t]*:?[ \t]*$"
            ))
            .expect("valid section marker regex")
        })
    }
}

/// Typed view of `{"code": ..., "interpretation": ..., "warnings": ...}`.
///
/// Each field may be absent, null, a string, or a list of lines.
#[derive(Debug, Default, Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    interpretation: Option<Value>,
    #[serde(default)]
    warnings: Option<Value>,
}

/// Decoded envelope with every field defaulted to text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeFields {
    pub code: String,
    pub interpretation: String,
    pub warnings: String,
}

/// Runs the full extraction on a raw response.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let (candidate, mut interpretation, mut warnings, source) = extract_candidate(raw);

    let mut code = strip_fence_markers(&candidate);
    for _ in 0..MAX_ENVELOPE_DEPTH {
        let Some(inner) = decode_envelope(&code) else {
            break;
        };
        tracing::debug!("unwrapping JSON envelope nested in extracted code");
        if interpretation.is_empty() {
            interpretation = inner.interpretation;
        }
        if warnings.is_empty() {
            warnings = inner.warnings;
        }
        code = strip_fence_markers(&inner.code);
    }

    let prose = blank_fenced_blocks(raw);
    if interpretation.is_empty() {
        interpretation = extract_section(&prose, Section::Interpretation).unwrap_or_default();
    }
    if warnings.is_empty() {
        warnings = extract_section(&prose, Section::Warnings).unwrap_or_default();
    }

    tracing::debug!(?source, code_len = code.len(), "extracted code candidate");

    ParsedResponse {
        code: code.trim().to_string(),
        interpretation,
        warnings,
        source,
    }
}

fn extract_candidate(raw: &str) -> (String, String, String, ExtractionSource) {
    if let Some(fields) = decode_envelope(raw) {
        return (
            fields.code,
            fields.interpretation,
            fields.warnings,
            ExtractionSource::Json,
        );
    }

    if let Some(block) = extract_longest_fenced_block(raw) {
        return (block, String::new(), String::new(), ExtractionSource::FencedBlock);
    }

    if let Some(section) = extract_section(raw, Section::Code) {
        return (
            section,
            String::new(),
            String::new(),
            ExtractionSource::LabeledSection,
        );
    }

    (
        raw.trim().to_string(),
        String::new(),
        String::new(),
        ExtractionSource::RawText,
    )
}

/// True when the text starts like a JSON object carrying a `"code"` key.
pub fn looks_like_envelope(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.starts_with('{') && trimmed.contains("\"code\"")
}

/// Decodes a JSON envelope. Trailing text after the object is tolerated; a
/// malformed object falls back to capturing the `"code"` string literal.
pub fn decode_envelope(text: &str) -> Option<EnvelopeFields> {
    if !looks_like_envelope(text) {
        return None;
    }
    let trimmed = text.trim();

    let decoded = serde_json::Deserializer::from_str(trimmed)
        .into_iter::<ResponseEnvelope>()
        .next()
        .and_then(|r| r.ok());

    if let Some(envelope) = decoded {
        if let Some(code) = envelope.code.as_ref() {
            return Some(EnvelopeFields {
                code: value_to_text(code),
                interpretation: envelope.interpretation.as_ref().map(value_to_text).unwrap_or_default(),
                warnings: envelope.warnings.as_ref().map(value_to_text).unwrap_or_default(),
            });
        }
        return None;
    }

    tracing::debug!("JSON envelope did not decode; capturing string fields directly");
    let code = capture_string_field(trimmed, "code")?;
    Some(EnvelopeFields {
        code,
        interpretation: capture_string_field(trimmed, "interpretation").unwrap_or_default(),
        warnings: capture_string_field(trimmed, "warnings").unwrap_or_default(),
    })
}

/// Strings as-is, lists joined by newlines, null as empty, other scalars as JSON text.
fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

fn capture_string_field(text: &str, field: &str) -> Option<String> {
    let re = Regex::new(&format!(
        r#"(?s)"{}"\s*:\s*"((?:\\.|[^"\\])*)""#,
        regex::escape(field)
    ))
    .ok()?;
    let raw = re.captures(text)?.get(1)?.as_str();
    Some(unescape_json_string(raw))
}

fn unescape_json_string(raw: &str) -> String {
    if let Ok(s) = serde_json::from_str::<String>(&format!("\"{}\"", raw)) {
        return s;
    }
    // Literal control characters make the strict decode fail; handle the common escapes by hand.
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:[ \t]*\{?[A-Za-z][\w+.\-]*\}?)?[ \t]*\r?\n(.*?)```")
            .expect("valid regex")
    })
}

/// Body of the longest fenced block; the first one wins a tie.
pub fn extract_longest_fenced_block(text: &str) -> Option<String> {
    let mut best: Option<&str> = None;
    for caps in fenced_block_re().captures_iter(text) {
        let Some(body) = caps.get(1) else { continue };
        let body = body.as_str();
        let longer = best.is_none_or(|b| body.chars().count() > b.chars().count());
        if longer {
            best = Some(body);
        }
    }
    best.map(|b| b.trim().to_string())
}

fn blank_fenced_blocks(text: &str) -> String {
    fenced_block_re().replace_all(text, "").into_owned()
}

/// Text between a section's marker and the next marker of another section.
pub fn extract_section(text: &str, section: Section) -> Option<String> {
    let start = section.marker_re().find(text)?.end();
    let end = Section::ALL
        .iter()
        .filter(|other| **other != section)
        .filter_map(|other| other.marker_re().find_at(text, start).map(|m| m.start()))
        .min()
        .unwrap_or(text.len());

    let body = dangling_enumerator_re().replace(&text[start..end], "");
    let body = body.trim();
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

fn dangling_enumerator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*\d+[.)][ \t]*\s*$").expect("valid regex"))
}

/// Removes fence lines, fence markers with their language tags, and stray
/// backtick runs left by truncated responses.
pub fn strip_fence_markers(code: &str) -> String {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    static RUN: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"```+[ \t]*(?:\{[A-Za-z][\w+.\-]*\}|[A-Za-z][\w+.\-]*)?").expect("valid regex")
    });
    let run = RUN.get_or_init(|| Regex::new(r"``+").expect("valid regex"));

    if !code.contains("``") {
        return code.to_string();
    }

    let mut lines = Vec::new();
    for line in code.lines() {
        let had_fence = line.contains("``");
        let stripped = fence.replace_all(line, "");
        let stripped = run.replace_all(&stripped, "");
        if had_fence && stripped.trim().is_empty() {
            continue;
        }
        lines.push(stripped.trim_end().to_string());
    }
    lines.join("\n")
}
