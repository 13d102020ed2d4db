/// Two parallel stacks tracking nested indentation levels and how many
/// sibling blocks have been opened at each level since it was entered.
///
/// `levels` always has `""` at the bottom and grows strictly (by
/// string-prefix extension) from bottom to top. `blocks[i]` counts the
/// blocks opened while the cursor sits at `levels[i]` and not yet closed;
/// a sibling at the same level, or a dedent back to it, closes all of
/// them in one go (this is how two `p`s at the same indent — each with
/// no explicit closing tag in the source — end up correctly un-nested).
pub struct IndentState {
  levels: Vec<String>,
  blocks: Vec<usize>,
}

/// What happened when a freshly-scanned whitespace prefix was compared
/// against the current indent stack.
pub enum Indentation {
  /// Strictly deeper than the top of the stack: pushed a new level.
  Increased,
  /// At or below an existing level (including "unchanged"): closes
  /// `blocks_to_close` blocks, including any siblings already open at
  /// the level we land on.
  ClosedTo { blocks_to_close: usize },
}

impl IndentState {
  pub fn new() -> Self {
    IndentState {
      levels: vec![String::new()],
      blocks: vec![0],
    }
  }

  /// Record that a new block is being opened at the current (top) level.
  pub fn enter_block(&mut self) {
    *self.blocks.last_mut().expect("blocks is never empty") += 1;
  }

  /// The whitespace prefix of the level the cursor currently sits at.
  pub fn top(&self) -> &str {
    self.levels.last().expect("levels is never empty")
  }

  /// Total blocks still open across every level — used at EOF, where
  /// there is no further indentation change to trigger closing them.
  pub fn total_open_blocks(&self) -> usize {
    self.blocks.iter().sum()
  }

  /// Compare `text` (a whitespace prefix) against the stack and update it
  /// in place.
  pub fn advance_to(&mut self, text: &str) -> Result<Indentation, &'static str> {
    let top = self.levels.last().expect("levels is never empty");
    if has_proper_prefix(text, top) {
      self.levels.push(text.to_owned());
      self.blocks.push(0);
      return Ok(Indentation::Increased);
    }

    let mut i = self.levels.len() - 1;
    let mut blocks_to_close = 0;
    while i > 0 && has_proper_prefix(&self.levels[i], text) {
      blocks_to_close += self.blocks[i];
      i -= 1;
    }
    if self.levels[i] != text {
      return Err("Bad indentation");
    }
    blocks_to_close += self.blocks[i];
    self.levels.truncate(i + 1);
    self.blocks.truncate(i + 1);
    self.blocks[i] = 0;
    Ok(Indentation::ClosedTo { blocks_to_close })
  }
}

/// `s` is a *strict* prefix of `of`: `s` is shorter than `of` and `of`
/// starts with it.
fn has_proper_prefix(of: &str, s: &str) -> bool {
  of.len() > s.len() && of.starts_with(s)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unchanged_closes_siblings_opened_at_this_level() {
    let mut s = IndentState::new();
    s.enter_block(); // first top-level tag
    match s.advance_to("").unwrap() {
      Indentation::ClosedTo { blocks_to_close } => assert_eq!(blocks_to_close, 1),
      _ => panic!("expected a close"),
    }
  }

  #[test]
  fn increase_pushes_a_new_level_with_a_fresh_counter() {
    let mut s = IndentState::new();
    assert!(matches!(s.advance_to("  "), Ok(Indentation::Increased)));
    s.enter_block();
    assert_eq!(s.total_open_blocks(), 1);
  }

  #[test]
  fn siblings_at_the_same_nested_level_close_one_at_a_time() {
    let mut s = IndentState::new();
    s.enter_block(); // div
    s.advance_to("  ").unwrap();
    s.enter_block(); // p one
    match s.advance_to("  ").unwrap() {
      Indentation::ClosedTo { blocks_to_close } => assert_eq!(blocks_to_close, 1),
      _ => panic!("expected a close"),
    }
    s.enter_block(); // p two
    match s.advance_to("").unwrap() {
      Indentation::ClosedTo { blocks_to_close } => assert_eq!(blocks_to_close, 2),
      _ => panic!("expected p two and div to both close"),
    }
  }

  #[test]
  fn mismatched_dedent_is_bad_indentation() {
    let mut s = IndentState::new();
    s.advance_to("  ").unwrap();
    assert!(s.advance_to(" ").is_err());
  }
}
