use span::Span;

use crate::driver::Driver;
use crate::emitter::Emitter;
use crate::indent::{IndentState, Indentation};
use crate::tag::{ControlTag, HtmlTag, Tag};

/// Which state function runs next. Dispatched from a plain `match` in
/// [`Parser::run`] rather than through function pointers: those fight the
/// borrow checker here, since every state needs `&mut self` and several
/// also need to return an owned value (the next state) computed from
/// borrows into `self.driver`.
enum State {
  Indent,
  Tag,
  Verbatim,
  MaybeQualifier,
  Qualifier,
  MaybeAttrKey,
  AfterAttrKey,
  Expr,
  MaybeTagConcluder,
  SingleLineLiteral,
  End,
}

/// Drives a [`Driver`] across the tag-recognition state machine,
/// feeding [`crate::emitter::Emitter`] events as tags are recognized and
/// closed.
pub struct Parser<'src> {
  driver: Driver<'src>,
  indent: IndentState,
  emitter: Emitter<String>,
  /// The HTML tag currently being assembled, from its name through its
  /// qualifiers and attribute list, until `MaybeTagConcluder` pushes it.
  building: Option<HtmlTag>,
  /// An attribute key already parsed, waiting on `AfterAttrKey` to decide
  /// whether it's bare or has a `=`-introduced value.
  pending_key: Option<String>,
  /// Byte offset where the tag currently under construction started;
  /// captured at the top of `state_tag` so the pushed `Tag`'s span covers
  /// the whole tag line, not just the final token that concluded it.
  tag_span_start: usize,
}

impl<'src> Parser<'src> {
  pub fn new(src: &'src str) -> Self {
    Parser {
      driver: Driver::new(src),
      indent: IndentState::new(),
      emitter: Emitter::new(String::new()),
      building: None,
      pending_key: None,
      tag_span_start: 0,
    }
  }

  pub fn run(mut self) -> crate::Result<String> {
    let mut state = State::Indent;
    loop {
      self.driver.assert_ready();
      state = match state {
        State::Indent => self.state_indent()?,
        State::Tag => self.state_tag()?,
        State::Verbatim => self.state_verbatim()?,
        State::MaybeQualifier => self.state_maybe_qualifier()?,
        State::Qualifier => self.state_qualifier()?,
        State::MaybeAttrKey => self.state_maybe_attr_key()?,
        State::AfterAttrKey => self.state_after_attr_key()?,
        State::Expr => self.state_expr()?,
        State::MaybeTagConcluder => self.state_maybe_tag_concluder()?,
        State::SingleLineLiteral => self.state_single_line_literal()?,
        State::End => {
          self.emitter.end();
          break;
        }
      };
    }
    Ok(self.emitter.into_inner())
  }

  // ---- small helpers ----------------------------------------------------

  fn skip_inline_ws(&mut self) {
    self.driver.accept_run(is_inline_ws);
    self.driver.drop();
  }

  fn current_tag_mut(&mut self) -> &mut HtmlTag {
    self
      .building
      .as_mut()
      .expect("attribute/qualifier state entered with no tag under construction")
  }

  fn push_start(&mut self, tag: Tag, span: Span) -> crate::Result<()> {
    self
      .emitter
      .start_block(tag, span)
      .map_err(|e| self.driver.error_at(e.span, e.name, e.message))
  }

  fn close_one(&mut self) -> crate::Result<()> {
    self
      .emitter
      .end_block()
      .map_err(|e| self.driver.error_at(e.span, e.name, e.message))
  }

  fn close_all_open_blocks(&mut self) -> crate::Result<()> {
    for _ in 0..self.indent.total_open_blocks() {
      self.close_one()?;
    }
    Ok(())
  }

  /// Try to match a bare keyword not immediately followed by another tag
  /// character (so `ifoo` isn't mistaken for `if`). On a failed match,
  /// backs up exactly what this attempt consumed, leaving any earlier,
  /// already-committed prefix (e.g. `else` before a failed `if` probe)
  /// untouched.
  fn try_keyword(&mut self, word: &'static str) -> bool {
    if self.driver.accept(&[word]).is_empty() {
      return false;
    }
    if is_tag_char(self.driver.peek(1).chars().next().unwrap_or(' ')) {
      self.driver.backup(word.chars().count());
      return false;
    }
    true
  }

  /// Recognizes a control-tag keyword at the front of a tag line, handling
  /// the documented aliases (`each` → `for`, `else if` → `elif`,
  /// `block append`/`block prepend` → `append`/`prepend`) and returns the
  /// canonical control-tag name. Consumes nothing on a total failure to
  /// match, so the caller can fall through to ordinary HTML-tag scanning.
  fn match_control_keyword(&mut self) -> Option<String> {
    const SIMPLE: &[(&str, &str)] = &[
      ("doctype", "doctype"),
      ("extends", "extends"),
      ("elif", "elif"),
      ("if", "if"),
      ("for", "for"),
      ("each", "for"),
      ("case", "case"),
      ("when", "when"),
      ("default", "default"),
      ("mixin", "mixin"),
      ("append", "append"),
      ("prepend", "prepend"),
    ];

    if self.try_keyword("!!!") {
      return Some("doctype".to_string());
    }
    for &(word, name) in SIMPLE {
      if self.try_keyword(word) {
        return Some(name.to_string());
      }
    }
    if self.try_keyword("else") {
      let ws = self.driver.accept_run(is_inline_ws);
      if !ws.is_empty() && self.try_keyword("if") {
        return Some("elif".to_string());
      }
      return Some("else".to_string());
    }
    if self.try_keyword("block") {
      let ws = self.driver.accept_run(is_inline_ws);
      if !ws.is_empty() {
        if self.try_keyword("append") {
          return Some("append".to_string());
        }
        if self.try_keyword("prepend") {
          return Some("prepend".to_string());
        }
      }
      // `block` on its own (a named block with no append/prepend) uses
      // the generic control-fragment path under its own name.
      return Some("block".to_string());
    }
    None
  }

  // ---- state functions ---------------------------------------------------

  fn state_indent(&mut self) -> crate::Result<State> {
    if self.driver.off_end() {
      self.close_all_open_blocks()?;
      return Ok(State::End);
    }
    self.driver.accept_run(|c| c == '\n');
    let ws = self.driver.accept_run(is_inline_ws);
    match self.indent.advance_to(ws) {
      Ok(Indentation::Increased) => {}
      Ok(Indentation::ClosedTo { blocks_to_close }) => {
        for _ in 0..blocks_to_close {
          self.close_one()?;
        }
        let full = self.driver.conclude();
        self.emitter.newlines(full);
        return Ok(State::Tag);
      }
      Err(msg) => return Err(self.driver.error("BadIndentation", msg)),
    }
    let full = self.driver.conclude();
    self.emitter.newlines(full);
    Ok(State::Tag)
  }

  fn state_tag(&mut self) -> crate::Result<State> {
    if self.driver.off_end() {
      self.close_all_open_blocks()?;
      return Ok(State::End);
    }
    self.indent.enter_block();
    self.tag_span_start = self.driver.pos();

    let leader = self.driver.accept(&["//-", "//", "-", "=", "!="]);
    if !leader.is_empty() {
      self.driver.drop();
      let span = Span::from(self.tag_span_start..self.driver.pos());
      self.push_start(Tag::Control(ControlTag::new(leader, None)), span)?;
      return Ok(State::Verbatim);
    }

    if self.driver.peek(1) == ":" {
      self.driver.advance(1);
      let name = self.driver.accept_run(is_tag_char).to_string();
      if name.is_empty() {
        self.driver.rollback();
      } else {
        self.driver.drop();
        let span = Span::from(self.tag_span_start..self.driver.pos());
        self.push_start(Tag::Control(ControlTag::new(":", Some(name))), span)?;
        return Ok(State::Verbatim);
      }
    }

    if !self.driver.accept(&["|"]).is_empty() {
      self.driver.drop();
      let span = Span::from(self.tag_span_start..self.driver.pos());
      self.push_start(Tag::Control(ControlTag::new("|", None)), span)?;
      return Ok(State::SingleLineLiteral);
    }

    if let Some(name) = self.match_control_keyword() {
      self.driver.accept_run(is_inline_ws);
      self.driver.drop();
      let head = self.driver.accept_run(|c| c != '\n').to_string();
      self.driver.conclude();
      let span = Span::from(self.tag_span_start..self.driver.pos());
      self.push_start(Tag::Control(ControlTag::new(name, Some(head))), span)?;
      return Ok(State::Indent);
    }

    let name = self.driver.accept_run(is_tag_char);
    if !name.is_empty() {
      let name = name.to_string();
      self.driver.drop();
      self.building = Some(HtmlTag::new(name));
      return Ok(State::MaybeQualifier);
    }

    let next = self.driver.peek(1);
    if matches!(next, "." | "#" | "(") {
      self.building = Some(HtmlTag::new("div"));
      return Ok(State::Qualifier);
    }

    Err(self.driver.error("NoValidTag", "No valid tag found"))
  }

  fn state_verbatim(&mut self) -> crate::Result<State> {
    self.skip_inline_ws();
    self.driver.accept_run(|c| c != '\n');
    loop {
      if self.driver.off_end() {
        break;
      }
      if self.driver.accept(&["\n"]).is_empty() {
        break;
      }
      let ws = self.driver.accept_run(is_inline_ws);
      if !is_proper_prefix_extension(ws, self.indent.top()) {
        self.driver.backup(ws.chars().count() + 1);
        break;
      }
      self.driver.accept_run(|c| c != '\n');
    }
    let text = self.driver.conclude();
    self.emitter.literal(text);
    Ok(State::Indent)
  }

  fn state_maybe_qualifier(&mut self) -> crate::Result<State> {
    if self.driver.off_end() {
      self.close_all_open_blocks()?;
      return Ok(State::End);
    }
    let c = self.driver.peek(1);
    match c {
      "#" | "(" => Ok(State::Qualifier),
      "." => {
        let second = self.driver.peek(2).chars().nth(1);
        if second.is_some_and(is_ident_char) {
          Ok(State::Qualifier)
        } else {
          Ok(State::MaybeTagConcluder)
        }
      }
      _ => Ok(State::MaybeTagConcluder),
    }
  }

  fn state_qualifier(&mut self) -> crate::Result<State> {
    let got = self.driver.require(&[".", "#", "("])?;
    self.driver.drop();
    match got {
      "#" => {
        let id = self.driver.accept_run(is_ident_char);
        if id.is_empty() {
          return Err(self.driver.error("NoValidId", "No valid id found"));
        }
        let id = id.to_string();
        self.driver.conclude();
        self.current_tag_mut().id = Some(id);
        Ok(State::MaybeQualifier)
      }
      "." => {
        let class = self.driver.accept_run(is_ident_char).to_string();
        self.driver.conclude();
        self.current_tag_mut().class = Some(class);
        Ok(State::MaybeQualifier)
      }
      "(" => Ok(State::MaybeAttrKey),
      _ => unreachable!("require restricted to the three listed alternatives"),
    }
  }

  fn state_maybe_attr_key(&mut self) -> crate::Result<State> {
    self.skip_inline_ws();
    if !self.driver.accept(&[")"]).is_empty() {
      self.driver.drop();
      return Ok(State::MaybeQualifier);
    }
    let key = self.driver.accept_run(is_key_char);
    if key.is_empty() {
      return Err(
        self
          .driver
          .error("NoValidAttrKey", "No valid attribute key found"),
      );
    }
    let key = key.to_string();
    self.driver.conclude();
    self.pending_key = Some(key);
    Ok(State::AfterAttrKey)
  }

  fn state_after_attr_key(&mut self) -> crate::Result<State> {
    self.skip_inline_ws();
    let got = self.driver.accept(&["=", ",", ")"]);
    match got {
      "=" => {
        self.driver.drop();
        Ok(State::Expr)
      }
      "," => {
        self.driver.drop();
        let key = self
          .pending_key
          .take()
          .expect("AfterAttrKey entered with no pending key");
        self.current_tag_mut().attr.insert(key, String::new());
        Ok(State::MaybeAttrKey)
      }
      ")" => {
        self.driver.drop();
        let key = self
          .pending_key
          .take()
          .expect("AfterAttrKey entered with no pending key");
        self.current_tag_mut().attr.insert(key, String::new());
        Ok(State::MaybeQualifier)
      }
      _ => Err(self.driver.error(
        "BadAttrChar",
        "Expected '=', ',' or ')' after attribute key",
      )),
    }
  }

  fn state_expr(&mut self) -> crate::Result<State> {
    self.skip_inline_ws();
    let mut brackets: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let terminator;
    loop {
      if self.driver.off_end() {
        return Err(if quote.is_some() {
          self
            .driver
            .error("UnterminatedString", "Unterminated string in expression")
        } else {
          self
            .driver
            .error("UnterminatedExpr", "Unterminated attribute expression")
        });
      }
      let c = self.driver.peek(1).chars().next().unwrap();
      if let Some(q) = quote {
        if c == '\\' {
          self.driver.advance(1);
          if self.driver.off_end() {
            return Err(
              self
                .driver
                .error("UnterminatedString", "Unterminated string in expression"),
            );
          }
          self.driver.advance(1);
          continue;
        }
        self.driver.advance(1);
        if c == q {
          quote = None;
        }
        continue;
      }
      match c {
        '"' | '\'' => {
          quote = Some(c);
          self.driver.advance(1);
        }
        '(' => {
          brackets.push(')');
          self.driver.advance(1);
        }
        '[' => {
          brackets.push(']');
          self.driver.advance(1);
        }
        '{' => {
          brackets.push('}');
          self.driver.advance(1);
        }
        ')' | ']' | '}' => {
          if brackets.last() == Some(&c) {
            brackets.pop();
            self.driver.advance(1);
          } else if c == ')' && brackets.is_empty() {
            terminator = c;
            break;
          } else {
            return Err(
              self
                .driver
                .error("UnmatchedBracket", "Unmatched bracket in expression"),
            );
          }
        }
        ',' if brackets.is_empty() => {
          terminator = c;
          break;
        }
        _ => {
          self.driver.advance(1);
        }
      }
    }
    self.driver.advance(1);
    let text = self.driver.conclude();
    let value = text[..text.len() - 1].to_string();
    let key = self
      .pending_key
      .take()
      .expect("Expr entered with no pending key");
    self.current_tag_mut().attr.insert(key, value);
    match terminator {
      ',' => Ok(State::MaybeAttrKey),
      ')' => Ok(State::MaybeQualifier),
      _ => unreachable!("terminator restricted to ',' and ')'"),
    }
  }

  fn state_maybe_tag_concluder(&mut self) -> crate::Result<State> {
    let tag = self
      .building
      .take()
      .expect("MaybeTagConcluder entered with no tag under construction");
    let span = Span::from(self.tag_span_start..self.driver.pos());
    self.push_start(Tag::Html(tag), span)?;

    let c = self.driver.peek(1);
    match c {
      ":" => {
        self.driver.advance(1);
        self.driver.drop();
        self.skip_inline_ws();
        Ok(State::Tag)
      }
      "=" => Ok(State::Tag),
      "!" if self.driver.peek(2) == "!=" => Ok(State::Tag),
      "." => {
        self.driver.advance(1);
        self.driver.drop();
        Ok(State::Verbatim)
      }
      _ => Ok(State::SingleLineLiteral),
    }
  }

  fn state_single_line_literal(&mut self) -> crate::Result<State> {
    self.skip_inline_ws();
    let text = self.driver.accept_run(|c| c != '\n');
    if !text.is_empty() {
      let text = text.to_string();
      self.driver.conclude();
      self.emitter.literal(&text);
    } else {
      self.driver.conclude();
    }
    Ok(State::Indent)
  }
}

fn is_tag_char(c: char) -> bool {
  c.is_ascii_alphanumeric()
}

fn is_key_char(c: char) -> bool {
  c.is_ascii_alphabetic() || c == '-' || c == ':'
}

fn is_ident_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn is_inline_ws(c: char) -> bool {
  c == ' ' || c == '\t'
}

/// `s` is a strict prefix extension of `of`: exactly the check
/// [`crate::indent`] uses to decide whether a verbatim continuation line
/// still belongs to the block, duplicated here (rather than exposed from
/// `IndentState`) since it compares a raw whitespace run against the
/// current top level, not the whole stack.
fn is_proper_prefix_extension(s: &str, of: &str) -> bool {
  s.len() > of.len() && s.starts_with(of)
}

#[cfg(test)]
mod tests {
  use crate::compile;

  #[test]
  fn for_and_each_are_aliases() {
    let a = compile("for x in y\n  p hi\n").unwrap();
    let b = compile("each x in y\n  p hi\n").unwrap();
    assert_eq!(a, b);
    assert_eq!(a, "{% for x in y %}\n  <p>hi</p>{% endfor %}\n");
  }

  #[test]
  fn block_append_and_prepend() {
    let out = compile("block append foo\n  p hi\n").unwrap();
    assert_eq!(
      out,
      "{% block foo %} {{ super() }}\n  <p>hi</p>{% endblock %}\n"
    );
    let out = compile("block prepend foo\n  p hi\n").unwrap();
    assert_eq!(
      out,
      "{% block foo %}\n  <p>hi</p>{{ super() }} {% endblock %}\n"
    );
  }

  #[test]
  fn bare_block_uses_the_generic_fragment() {
    let out = compile("block foo\n  p hi\n").unwrap();
    assert_eq!(out, "{% block foo %}\n  <p>hi</p>{% endblock %}\n");
  }

  #[test]
  fn filter_tag_wraps_nested_content() {
    let out = compile(":markdown\n  # hi\n").unwrap();
    assert_eq!(out, "{% filter markdown %}\n  # hi{% endfilter %}\n");
  }

  #[test]
  fn pipe_tag_is_a_single_line_literal_passthrough() {
    let out = compile("| raw text\n").unwrap();
    assert_eq!(out, "raw text\n");
  }

  #[test]
  fn mixin_tag_opens_a_macro_block() {
    let out = compile("mixin foo(x)\n  p= x\n").unwrap();
    assert_eq!(out, "{% macro foo(x) %}\n  <p>{{ x }}</p>{% endmacro %}\n");
  }

  #[test]
  fn extends_tag_has_no_closer() {
    let out = compile("extends base.jade\n").unwrap();
    assert_eq!(out, "{% extends base.jade %}\n");
  }

  #[test]
  fn html_comment_carries_head_text_verbatim() {
    let out = compile("// a note\n").unwrap();
    assert_eq!(out, "<!--a note-->\n");
  }

  #[test]
  fn bare_attribute_key_defaults_to_an_empty_value() {
    let out = compile("input(disabled)\n").unwrap();
    assert_eq!(out, "<input disabled=\"{{  |escape}}\"></input>\n");
  }

  #[test]
  fn mismatched_bracket_in_expression_is_an_error() {
    let err = compile("a(x=f(])\n").unwrap_err();
    assert_eq!(err.diagnostic().name, "UnmatchedBracket");
  }

  #[test]
  fn unterminated_string_in_expression_is_an_error() {
    let err = compile("a(x=\"unterminated)\n").unwrap_err();
    assert_eq!(err.diagnostic().name, "UnterminatedString");
  }

  #[test]
  fn dedent_back_past_an_outer_level_without_matching_it_is_bad_indentation() {
    let err = compile("div\n  p a\n b\n").unwrap_err();
    assert_eq!(err.diagnostic().name, "BadIndentation");
  }

  #[test]
  fn elif_chain_without_a_final_else_still_gets_one_endif() {
    let out = compile("if a\n  p x\nelif b\n  p y\n").unwrap();
    assert_eq!(
      out,
      "{% if a %}\n  <p>x</p>\n{% elif b %}\n  <p>y</p>\n{% endif %}"
    );
  }

  #[test]
  fn doctype_mobile_head() {
    let out = compile("doctype mobile\n").unwrap();
    assert!(out.starts_with("<!DOCTYPE html PUBLIC \"-//WAPFORUM//DTD XHTML Mobile 1.2//EN\""));
  }
}
