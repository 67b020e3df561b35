//! Logical line reader for deck text.
//!
//! Raw deck lines are normalized once, up front, into a sequence of
//! logical lines: whitespace trimmed, blank lines dropped, comment lines
//! collected and attached to the record that follows them, and lines that
//! end in the continuation marker joined with their successor. Readers then
//! walk this sequence with a [`LineCursor`], so a speculative read is undone
//! by restoring a saved index rather than seeking in a stream.

use crate::{COMMENT_MARKER, CONTINUATION_MARKER, KEYWORD_PREFIX};

/// One logical line of a deck.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalLine {
    /// Normalized text with continuations joined
    pub text: String,
    /// Comment lines that preceded (or interrupted) this record
    pub comments: Vec<String>,
    /// Source line number of the first raw line (1-indexed)
    pub line: usize,
}

impl LogicalLine {
    /// Check whether this line introduces a keyword block.
    pub fn is_keyword(&self) -> bool {
        is_keyword_marker(&self.text)
    }

    /// Text after the first `=`, or the whole text if there is none.
    pub fn after_eq_sign(&self) -> &str {
        match self.text.split_once('=') {
            Some((_, rhs)) => rhs.trim(),
            None => self.text.trim(),
        }
    }

    /// Lower-cased text before the first `=`.
    pub fn leading_key(&self) -> String {
        self.text
            .split_once('=')
            .map(|(lhs, _)| lhs)
            .unwrap_or(&self.text)
            .trim()
            .to_ascii_lowercase()
    }
}

/// Check whether a line starts a keyword block (`*NAME`).
///
/// A doubled prefix (`**`) is not a keyword marker.
pub fn is_keyword_marker(text: &str) -> bool {
    text.starts_with(KEYWORD_PREFIX) && !text[KEYWORD_PREFIX.len_utf8()..].starts_with(KEYWORD_PREFIX)
}

/// Saved cursor position, produced by [`LineCursor::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(usize);

/// Cursor over the logical lines of a deck.
#[derive(Debug, Clone)]
pub struct LineCursor {
    lines: Vec<LogicalLine>,
    pos: usize,
}

impl LineCursor {
    /// Normalize `input` into logical lines.
    pub fn new(input: &str) -> Self {
        Self {
            lines: split_logical_lines(input),
            pos: 0,
        }
    }

    /// Read the next logical line, advancing the cursor.
    ///
    /// Returns `None` at end of input.
    pub fn next_line(&mut self) -> Option<LogicalLine> {
        let line = self.lines.get(self.pos).cloned()?;
        self.pos += 1;
        Some(line)
    }

    /// Look at the next logical line without consuming it.
    pub fn peek(&self) -> Option<&LogicalLine> {
        self.lines.get(self.pos)
    }

    /// Capture the current position for a later [`rewind`](Self::rewind).
    pub fn mark(&self) -> Mark {
        Mark(self.pos)
    }

    /// Return to a previously captured position.
    pub fn rewind(&mut self, mark: Mark) {
        self.pos = mark.0;
    }

    /// Read the next line unless it is a keyword marker.
    ///
    /// On a keyword (or end of input) the cursor is left where it was.
    pub fn next_unless_keyword(&mut self) -> Option<LogicalLine> {
        let mark = self.mark();
        match self.next_line() {
            Some(line) if !line.is_keyword() => Some(line),
            _ => {
                self.rewind(mark);
                None
            }
        }
    }

    /// Check whether every line has been consumed.
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.lines.len()
    }

    /// Source line number of the next record, or of the end of input.
    pub fn current_line(&self) -> usize {
        self.peek()
            .map(|l| l.line)
            .or_else(|| self.lines.last().map(|l| l.line + 1))
            .unwrap_or(1)
    }
}

fn is_comment(text: &str) -> bool {
    text.starts_with(COMMENT_MARKER)
}

/// A fragment continues a numeric list when it starts with a number.
fn starts_numeric(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('-') | Some('+') | Some('.') => chars.next().is_some_and(|c| c.is_ascii_digit() || c == '.'),
        _ => false,
    }
}

fn split_logical_lines(input: &str) -> Vec<LogicalLine> {
    let mut out = Vec::new();
    let mut pending_comments = Vec::new();
    let mut raw = input.lines().enumerate().map(|(i, l)| (i + 1, l.trim()));

    while let Some((line_no, text)) = raw.next() {
        if text.is_empty() {
            continue;
        }
        if is_comment(text) {
            pending_comments.push(text.to_string());
            continue;
        }

        let mut joined = text.to_string();
        while joined.ends_with(CONTINUATION_MARKER) {
            joined.pop();
            let trimmed_len = joined.trim_end().len();
            joined.truncate(trimmed_len);
            joined.push(' ');

            // next non-blank, non-comment fragment
            let fragment = loop {
                match raw.next() {
                    Some((_, t)) if t.is_empty() => continue,
                    Some((_, t)) if is_comment(t) => pending_comments.push(t.to_string()),
                    Some((_, t)) => break Some(t),
                    None => break None,
                }
            };
            let Some(fragment) = fragment else { break };

            if starts_numeric(fragment) && !joined.trim_end().ends_with(',') {
                joined.push(',');
            }
            joined.push_str(fragment);
        }

        out.push(LogicalLine {
            text: joined.trim_end().to_string(),
            comments: std::mem::take(&mut pending_comments),
            line: line_no,
        });
    }

    out
}
