use std::fmt;

use span::Span;
use thiserror::Error;

use crate::style::Style;

/// Distinguishes a malformed-source error from an internal "require"
/// assertion failure (a parser defect, not bad input). Both are fatal to
/// the current compile; the distinction only changes the printed name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
  User,
  Bug,
}

/// A single fatal compiler error: message, the byte span it occurred at,
/// its `(line, column)` (1-based), and the full text of the offending
/// source line. The position is computed once, at the point the error is
/// raised, by the driver that still has the newline offset table handy.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct Diagnostic {
  pub kind: Kind,
  pub name: &'static str,
  pub message: String,
  pub span: Span,
  pub line: usize,
  pub column: usize,
  pub line_text: String,
}

impl Diagnostic {
  pub fn user(
    name: &'static str,
    message: impl Into<String>,
    span: Span,
    line: usize,
    column: usize,
    line_text: impl Into<String>,
  ) -> Self {
    Diagnostic {
      kind: Kind::User,
      name,
      message: message.into(),
      span,
      line,
      column,
      line_text: line_text.into(),
    }
  }

  pub fn bug(
    message: impl Into<String>,
    span: Span,
    line: usize,
    column: usize,
    line_text: impl Into<String>,
  ) -> Self {
    Diagnostic {
      kind: Kind::Bug,
      name: "Bug",
      message: message.into(),
      span,
      line,
      column,
      line_text: line_text.into(),
    }
  }

  /// Render the diagnostic exactly as the CLI prints it:
  ///
  /// ```text
  /// <ErrName>: <msg> around line <L>, column <C>:
  ///     <offending source line>
  ///     <C-1 spaces>^
  /// ```
  ///
  /// wrapped in `\x1b[31;1m` / `\x1b[0m` when `color` is true.
  pub fn render(&self, color: bool) -> String {
    let style = Style::new(color);
    let caret = " ".repeat(self.column.saturating_sub(1));
    let body = format!(
      "{}: {} around line {}, column {}:\n    {}\n    {}^",
      self.name, self.message, self.line, self.column, self.line_text, caret
    );
    format!("{}", style.error(body))
  }
}

impl fmt::Display for Kind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Kind::User => write!(f, "user"),
      Kind::Bug => write!(f, "bug"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn diag() -> Diagnostic {
    Diagnostic::user(
      "BadIndentation",
      "bad indentation",
      Span::from(4..5),
      2,
      3,
      "  p Hello",
    )
  }

  #[test]
  fn renders_without_color() {
    let rendered = diag().render(false);
    assert_eq!(
      rendered,
      "BadIndentation: bad indentation around line 2, column 3:\n    p Hello\n      ^"
    );
  }

  #[test]
  fn renders_with_color_wraps_whole_block() {
    let rendered = diag().render(true);
    assert!(rendered.starts_with('\u{1b}'));
    assert!(rendered.ends_with("\u{1b}[0m"));
    assert!(rendered.contains("BadIndentation: bad indentation around line 2, column 3"));
  }

  #[test]
  fn bug_uses_fixed_name() {
    let d = Diagnostic::bug("require failed", Span::from(0..1), 1, 1, "x");
    assert_eq!(d.name, "Bug");
    assert_eq!(d.kind, Kind::Bug);
  }
}
