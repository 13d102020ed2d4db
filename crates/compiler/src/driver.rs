use diag::Diagnostic;
use span::Span;

use crate::error::Error;

/// Owns the input buffer and a cursor (`start`, `pos`) into it, and
/// exposes the primitive scanners every parser state is built from.
///
/// Invariant: `0 <= start <= pos <= buffer.len()`. On entry to every
/// parser state, `start == pos` — the trampoline asserts this (see
/// `Parser::run`).
pub struct Driver<'src> {
  buffer: &'src str,
  start: usize,
  pos: usize,
  newline_offsets: Vec<usize>,
}

impl<'src> Driver<'src> {
  pub fn new(buffer: &'src str) -> Self {
    let newline_offsets = buffer
      .char_indices()
      .filter(|&(_, c)| c == '\n')
      .map(|(i, _)| i)
      .collect();
    Driver {
      buffer,
      start: 0,
      pos: 0,
      newline_offsets,
    }
  }

  #[inline]
  pub fn start(&self) -> usize {
    self.start
  }

  #[inline]
  pub fn pos(&self) -> usize {
    self.pos
  }

  /// Bug assertion: every state function must begin with a clean cursor.
  pub fn assert_ready(&self) {
    debug_assert_eq!(
      self.start, self.pos,
      "parser state entered with a pending, unconcluded lexeme"
    );
  }

  pub fn off_end(&self) -> bool {
    self.pos >= self.buffer.len()
  }

  /// Next `n` characters without advancing. Shorter near EOF.
  pub fn peek(&self, n: usize) -> &'src str {
    let end = self.buffer[self.pos..]
      .char_indices()
      .nth(n)
      .map(|(i, _)| self.pos + i)
      .unwrap_or(self.buffer.len());
    &self.buffer[self.pos..end]
  }

  /// Advance `pos` by `n` characters and return the skipped slice.
  pub fn advance(&mut self, n: usize) -> &'src str {
    let text = self.peek(n);
    self.pos += text.len();
    text
  }

  /// Move `pos` back by `n` characters.
  pub fn backup(&mut self, n: usize) {
    let mut new_pos = self.pos;
    for _ in 0..n {
      let prefix = &self.buffer[..new_pos];
      let back = prefix
        .char_indices()
        .next_back()
        .map(|(i, _)| i)
        .unwrap_or(0);
      new_pos = back;
    }
    debug_assert!(new_pos >= self.start, "backup moved before the lexeme start");
    self.pos = new_pos;
  }

  /// If any `alt` matches at `pos`, advance past it and return it; else
  /// return `""`.
  pub fn accept(&mut self, alts: &[&'static str]) -> &'static str {
    for &alt in alts {
      if self.buffer[self.pos..].starts_with(alt) {
        self.pos += alt.len();
        return alt;
      }
    }
    ""
  }

  /// Like [`accept`](Self::accept), but a failure is a parser bug, not a
  /// user error: reserved for call sites that already peeked one of
  /// `alts` and are merely asserting the scan is consistent.
  pub fn require(&mut self, alts: &[&'static str]) -> crate::Result<&'static str> {
    let got = self.accept(alts);
    if got.is_empty() {
      return Err(self.bug(format!("require one of {alts:?}")));
    }
    Ok(got)
  }

  /// Advance while `pred(char)` holds; return the consumed slice.
  pub fn accept_run(&mut self, pred: impl Fn(char) -> bool) -> &'src str {
    let start = self.pos;
    while let Some(c) = self.buffer[self.pos..].chars().next() {
      if !pred(c) {
        break;
      }
      self.pos += c.len_utf8();
    }
    &self.buffer[start..self.pos]
  }

  /// Return `buffer[start..pos]` and set `start := pos`.
  pub fn conclude(&mut self) -> &'src str {
    let text = &self.buffer[self.start..self.pos];
    self.start = self.pos;
    text
  }

  /// Discard the pending lexeme: `start := pos`.
  pub fn drop(&mut self) {
    self.start = self.pos;
  }

  /// Undo the pending scan: `pos := start`.
  pub fn rollback(&mut self) {
    self.pos = self.start;
  }

  fn locate(&self, offset: usize) -> (usize, usize, &'src str) {
    let line_idx = self.newline_offsets.partition_point(|&nl| nl < offset);
    let line_start = if line_idx == 0 {
      0
    } else {
      self.newline_offsets[line_idx - 1] + 1
    };
    let line_end = self
      .newline_offsets
      .get(line_idx)
      .copied()
      .unwrap_or(self.buffer.len());
    let line_text = &self.buffer[line_start..line_end];
    let line = line_idx + 1;
    let column = offset - line_start + 1;
    (line, column, line_text)
  }

  /// Build a user-facing diagnostic at `start`, with the given span.
  pub fn error(&self, name: &'static str, msg: impl Into<String>) -> Error {
    let msg = msg.into();
    let (line, column, line_text) = self.locate(self.start);
    tracing::debug!(line, column, message = %msg, "jade compile error");
    Error(Diagnostic::user(
      name,
      msg,
      Span::from(self.start..self.pos),
      line,
      column,
      line_text,
    ))
  }

  /// Build an internal-bug diagnostic (a `require` assertion failed).
  pub fn bug(&self, msg: impl Into<String>) -> Error {
    let msg = msg.into();
    let (line, column, line_text) = self.locate(self.start);
    tracing::warn!(line, column, message = %msg, "jade compiler bug");
    Error(Diagnostic::bug(
      msg,
      Span::from(self.start..self.pos),
      line,
      column,
      line_text,
    ))
  }

  /// Like [`error`](Self::error), but positioned at a span captured earlier
  /// (e.g. the introducing line of a tag that is only found to be
  /// malformed once a later sibling closes it).
  pub fn error_at(&self, span: Span, name: &'static str, msg: impl Into<String>) -> Error {
    let msg = msg.into();
    let (line, column, line_text) = self.locate(span.start);
    tracing::debug!(line, column, message = %msg, "jade compile error");
    Error(Diagnostic::user(name, msg, span, line, column, line_text))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn peek_and_advance_are_char_counted_not_byte_counted() {
    let mut d = Driver::new("é div");
    assert_eq!(d.peek(1), "é");
    assert_eq!(d.advance(1), "é");
    assert_eq!(d.pos(), "é".len());
  }

  #[test]
  fn accept_matches_longest_listed_alternative_order() {
    let mut d = Driver::new("!=x");
    assert_eq!(d.accept(&["!=", "!"]), "!=");
    assert_eq!(d.pos(), 2);
  }

  #[test]
  fn accept_run_stops_at_first_non_matching_char() {
    let mut d = Driver::new("ab12-cd");
    let text = d.accept_run(|c| c.is_ascii_alphanumeric());
    assert_eq!(text, "ab12");
  }

  #[test]
  fn conclude_resets_start_to_pos() {
    let mut d = Driver::new("hello world");
    d.advance(5);
    assert_eq!(d.conclude(), "hello");
    assert_eq!(d.start(), d.pos());
  }

  #[test]
  fn rollback_undoes_a_pending_scan() {
    let mut d = Driver::new("hello");
    d.advance(3);
    d.rollback();
    assert_eq!(d.pos(), 0);
  }

  #[test]
  fn backup_steps_back_by_whole_characters() {
    let mut d = Driver::new("aé");
    d.advance(2);
    d.backup(1);
    assert_eq!(d.pos(), "a".len());
  }

  #[test]
  fn locate_computes_line_and_column() {
    let d = Driver::new("div\n  p Hello\n");
    let mut d2 = Driver::new(d.buffer);
    d2.pos = 6; // inside "  p Hello" at the 'p'
    d2.start = 6;
    let (line, column, text) = d2.locate(6);
    assert_eq!(line, 2);
    assert_eq!(column, 3);
    assert_eq!(text, "  p Hello");
  }

  #[test]
  fn off_end_true_at_buffer_end() {
    let mut d = Driver::new("ab");
    assert!(!d.off_end());
    d.advance(2);
    assert!(d.off_end());
  }
}
