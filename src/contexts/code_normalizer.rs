use super::comment_classifier::CommentClassifier;
use super::response_parser::{decode_envelope, strip_fence_markers};
use super::statement_splitter::{StatementSplitter, explode_repeated_statements, is_compound_import};
use crate::data::{CodeLine, LineKind, TargetLanguage};

const MAX_ENVELOPE_DEPTH: usize = 3;

/// Turns a code candidate into text that can be dropped into an executable cell.
///
/// The pipeline is fixed: strip fences, unwrap JSON envelopes, split and
/// classify line by line, explode repeated imports, join. Running it on its
/// own output changes nothing.
#[derive(Default)]
pub struct CodeNormalizer {
    classifier: CommentClassifier,
}

impl CodeNormalizer {
    pub fn new(classifier: CommentClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &CommentClassifier {
        &self.classifier
    }

    pub fn normalize(&self, raw_code: &str, language: TargetLanguage) -> String {
        if raw_code.trim().is_empty() {
            return String::new();
        }

        let mut code = strip_fence_markers(raw_code);
        for _ in 0..MAX_ENVELOPE_DEPTH {
            match decode_envelope(&code) {
                Some(inner) => code = strip_fence_markers(&inner.code),
                None => break,
            }
        }

        let lines = self.normalize_lines(&code, language);
        join_lines(&lines)
    }

    /// Per-line pass producing classified lines.
    pub fn normalize_lines(&self, code: &str, language: TargetLanguage) -> Vec<CodeLine> {
        let splitter = StatementSplitter::new(language, &self.classifier);
        let mut out = Vec::new();
        let mut in_block_string = false;

        for raw_line in code.lines() {
            let line = raw_line.trim_end();
            let toggles = toggles_block_string(line);

            if in_block_string {
                // Contents of a triple-quoted string pass through untouched.
                out.push(CodeLine::code(line));
                in_block_string ^= toggles;
                continue;
            }
            in_block_string = toggles;

            let current = CodeLine::from_raw(line);
            let kind = current.kind;
            match kind {
                LineKind::Blank | LineKind::Comment => out.push(current),
                LineKind::Code if is_compound_import(line) || toggles => out.push(current),
                LineKind::Code => {
                    for piece in splitter.split_line(line) {
                        let piece = self.classifier.apply(piece, language);
                        if piece.kind != LineKind::Code {
                            out.push(piece);
                            continue;
                        }
                        out.extend(
                            explode_repeated_statements(&piece.text, language)
                                .into_iter()
                                .map(CodeLine::code),
                        );
                    }
                }
            }
        }

        out
    }
}

/// Normalizes with the stock classifier.
pub fn normalize(raw_code: &str, language: TargetLanguage) -> String {
    CodeNormalizer::default().normalize(raw_code, language)
}

/// Joins lines, dropping blank lines at either end.
fn join_lines(lines: &[CodeLine]) -> String {
    let start = lines.iter().position(|l| !l.is_blank()).unwrap_or(lines.len());
    let end = lines.iter().rposition(|l| !l.is_blank()).map_or(start, |i| i + 1);
    lines[start..end]
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// An odd number of triple-quote delimiters opens or closes a block string.
fn toggles_block_string(line: &str) -> bool {
    (line.matches("\"\"\"").count() + line.matches("'''").count()) % 2 == 1
}
