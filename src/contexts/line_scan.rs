//! Quote- and bracket-aware scan of a single line of code.
//!
//! Neither target language is parsed. The scan only tracks enough lexical
//! state to answer "is this offset inside a string literal, inside brackets,
//! or inside a trailing comment?".

/// Lexical state of every byte offset of one line
#[derive(Debug)]
pub(crate) struct LineScan {
    /// Bracket depth before each byte offset; `None` inside a string literal.
    depth_at: Vec<Option<i32>>,
    /// Offset of the first unquoted `#`, or the line length.
    code_end: usize,
}

impl LineScan {
    pub(crate) fn new(line: &str) -> Self {
        let mut depth_at = vec![None; line.len() + 1];
        let mut code_end = line.len();
        let mut quote: Option<char> = None;
        let mut escaped = false;
        let mut depth: i32 = 0;

        for (i, c) in line.char_indices() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                continue;
            }

            depth_at[i] = Some(depth);
            match c {
                '\'' | '"' | '`' => quote = Some(c),
                '#' => {
                    code_end = i;
                    break;
                }
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ => {}
            }
        }

        if quote.is_none() && code_end == line.len() {
            depth_at[line.len()] = Some(depth);
        }

        Self { depth_at, code_end }
    }

    /// True when a new statement could start at `pos`: outside strings and
    /// comments, and not nested inside an open bracket.
    pub(crate) fn is_top_level(&self, pos: usize) -> bool {
        pos < self.code_end && matches!(self.depth_at.get(pos), Some(Some(d)) if *d <= 0)
    }

    /// Offset of the first unquoted `#`, or the line length.
    pub(crate) fn code_end(&self) -> usize {
        self.code_end
    }

    /// Characters that are neither inside a string literal nor part of the
    /// trailing comment.
    pub(crate) fn bare_chars<'a>(&'a self, line: &'a str) -> impl Iterator<Item = char> + 'a {
        line.char_indices()
            .filter(move |(i, _)| *i < self.code_end && matches!(self.depth_at.get(*i), Some(Some(_))))
            .map(|(_, c)| c)
    }

    /// The line without its trailing comment and with string literal
    /// contents blanked out.
    pub(crate) fn bare_text(&self, line: &str) -> String {
        self.bare_chars(line).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_inside_strings_are_not_top_level() {
        let line = "print('import x') import y";
        let scan = LineScan::new(line);
        let inner = line.find("import x").unwrap();
        let outer = line.rfind("import").unwrap();
        assert!(!scan.is_top_level(inner));
        assert!(scan.is_top_level(outer));
    }

    #[test]
    fn offsets_inside_brackets_are_not_top_level() {
        let line = "plt.plot(x, plt.gca()) plt.show()";
        let scan = LineScan::new(line);
        assert!(!scan.is_top_level(line.find("plt.gca").unwrap()));
        assert!(scan.is_top_level(line.find("plt.show").unwrap()));
    }

    #[test]
    fn trailing_comment_ends_the_code() {
        let line = "x = 1  # then import numpy";
        let scan = LineScan::new(line);
        assert!(!scan.is_top_level(line.find("import").unwrap()));
        assert_eq!(scan.bare_text(line), "x = 1  ");
        assert_eq!(scan.code_end(), line.find('#').unwrap());
    }

    #[test]
    fn hash_inside_string_is_not_a_comment() {
        let line = r##"label = "#1" plt.show()"##;
        let scan = LineScan::new(line);
        assert!(scan.is_top_level(line.find("plt").unwrap()));
        assert_eq!(scan.code_end(), line.len());
    }

    #[test]
    fn bare_text_drops_string_contents() {
        let line = "plt.title('그룹별 평균')";
        let bare = LineScan::new(line).bare_text(line);
        assert_eq!(bare, "plt.title(')");
    }
}
