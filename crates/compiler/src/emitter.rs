use std::fmt::{self, Write};

use span::{Span, Spanned};

use crate::tag::{ControlTag, HtmlTag, Tag};

/// An emitter-level failure: `case`/`when`/`default` misuse. Carries the
/// span of the offending tag so the parser can turn it into a positioned
/// [`crate::Error`] via `Driver::error_at`.
pub struct EmitError {
  pub name: &'static str,
  pub message: String,
  pub span: Span,
}

impl EmitError {
  fn new(name: &'static str, message: impl Into<String>, span: Span) -> Self {
    EmitError {
      name,
      message: message.into(),
      span,
    }
  }
}

/// The deferred close slot: at most one pending `if`/`elif`/`else`
/// close, waiting to find out whether the next sibling is `elif`/
/// `else` (dismiss) or anything else (flush).
enum Deferred {
  None,
  Pending { closer: String, trailing_ws: String },
}

/// Consumes `start_block`/`end_block`/`literal`/`newlines`/`end` events and
/// writes target-dialect text to `W`. Generic over `fmt::Write` so the same
/// logic drives both in-memory tests (`String`) and the CLI's buffered
/// stdout adapter.
pub struct Emitter<W: fmt::Write> {
  out: W,
  stack: Vec<Spanned<Tag>>,
  deferred: Deferred,
  tmp_counter: usize,
}

impl<W: fmt::Write> Emitter<W> {
  pub fn new(out: W) -> Self {
    Emitter {
      out,
      stack: Vec::new(),
      deferred: Deferred::None,
      tmp_counter: 0,
    }
  }

  pub fn into_inner(self) -> W {
    self.out
  }

  fn write(&mut self, text: &str) {
    self
      .out
      .write_str(text)
      .expect("emitter sink write cannot fail");
  }

  fn dismiss_deferred(&mut self) {
    if let Deferred::Pending { trailing_ws, .. } = std::mem::replace(&mut self.deferred, Deferred::None) {
      self.write(&trailing_ws);
    }
  }

  fn flush_deferred(&mut self) {
    if let Deferred::Pending { closer, trailing_ws } =
      std::mem::replace(&mut self.deferred, Deferred::None)
    {
      self.write(&trailing_ws);
      self.write(&closer);
    }
  }

  /// A block closing into the deferred slot while it's already occupied
  /// (two `if`/`elif` chains closing in the same dedent) would otherwise
  /// silently lose the older one's closer text, so flush it out first.
  fn set_deferred(&mut self, closer: String) {
    self.flush_deferred();
    self.deferred = Deferred::Pending {
      closer,
      trailing_ws: String::new(),
    };
  }

  pub fn start_block(&mut self, tag: Tag, span: Span) -> Result<(), EmitError> {
    if let Tag::Control(c) = &tag {
      match c.name.as_str() {
        "case" => return self.start_case(c.head.clone(), span),
        "when" => return self.start_when(c.head.clone(), span),
        "default" => return self.start_default(span),
        _ => {}
      }
    }

    if matches!(&tag, Tag::Control(c) if c.name == "elif" || c.name == "else") {
      self.dismiss_deferred();
    } else {
      self.flush_deferred();
    }

    let opener = match &tag {
      Tag::Html(t) => self.html_opener(t),
      Tag::Control(c) if c.name == "doctype" => doctype_fragment(c.head.as_deref()),
      Tag::Control(c) => control_fragment(&c.name, c.head.as_deref()).0,
    };
    self.write(&opener);
    self.stack.push(Spanned::new(span, tag));
    Ok(())
  }

  pub fn end_block(&mut self) -> Result<(), EmitError> {
    let popped = self
      .stack
      .pop()
      .expect("open-block stack underflow: parser closed more blocks than it opened");
    let span = popped.span;
    let tag = popped.into_inner();
    match &tag {
      Tag::Html(t) => {
        let name = &t.name;
        self.write(&format!("</{name}>"));
      }
      Tag::Control(c) if c.name == "if" || c.name == "elif" || c.name == "else" => {
        self.set_deferred("{% endif %}".to_string());
      }
      Tag::Control(c) if c.name == "case" => {
        if !c.seen_when {
          return Err(EmitError::new(
            "CaseWithoutWhen",
            "case tag has no when child",
            span,
          ));
        }
        self.write("{% endif %}");
      }
      Tag::Control(c) if c.name == "when" || c.name == "default" => {}
      Tag::Control(c) if c.name == "doctype" || c.name == "extends" => {}
      Tag::Control(c) => {
        let (_, closer) = control_fragment(&c.name, c.head.as_deref());
        self.write(&closer);
      }
    }
    Ok(())
  }

  pub fn literal(&mut self, text: &str) {
    self.flush_deferred();
    self.write(text);
  }

  pub fn newlines(&mut self, text: &str) {
    match &mut self.deferred {
      Deferred::Pending { trailing_ws, .. } => *trailing_ws = text.to_string(),
      Deferred::None => self.write(text),
    }
  }

  pub fn end(&mut self) {
    self.flush_deferred();
  }

  pub fn open_blocks(&self) -> usize {
    self.stack.len()
  }

  fn start_case(&mut self, head: Option<String>, span: Span) -> Result<(), EmitError> {
    self.flush_deferred();
    let head = head.unwrap_or_default();
    let var = format!("_jade_{}", self.tmp_counter);
    self.tmp_counter += 1;
    self.write(&format!("{{% set {var} = {head} %}}"));
    let tag = ControlTag {
      name: "case".to_string(),
      head: Some(head),
      var: Some(var),
      seen_when: false,
      seen_default: false,
    };
    self.stack.push(Spanned::new(span, Tag::Control(tag)));
    Ok(())
  }

  fn start_when(&mut self, head: Option<String>, span: Span) -> Result<(), EmitError> {
    self.flush_deferred();
    let head = head.unwrap_or_default();
    let case = self
      .stack
      .last_mut()
      .and_then(as_case_mut)
      .ok_or_else(|| EmitError::new("WhenOutsideCase", "when tag not child of case tag", span))?;
    if case.seen_default {
      return Err(EmitError::new(
        "WhenAfterDefault",
        "when tag after default tag",
        span,
      ));
    }
    let var = case.var.clone().expect("case tag always has a var once pushed");
    let opener = if case.seen_when {
      format!("{{% elif {var} == {head} %}}")
    } else {
      format!("{{% if {var} == {head} %}}")
    };
    case.seen_when = true;
    self.write(&opener);
    self
      .stack
      .push(Spanned::new(span, Tag::Control(ControlTag::new("when", Some(head)))));
    Ok(())
  }

  fn start_default(&mut self, span: Span) -> Result<(), EmitError> {
    self.flush_deferred();
    let case = self
      .stack
      .last_mut()
      .and_then(as_case_mut)
      .ok_or_else(|| EmitError::new("WhenOutsideCase", "default tag not child of case tag", span))?;
    if !case.seen_when {
      return Err(EmitError::new(
        "DefaultBeforeWhen",
        "default tag before when tag",
        span,
      ));
    }
    if case.seen_default {
      return Err(EmitError::new(
        "DuplicateDefault",
        "duplicate default tag",
        span,
      ));
    }
    case.seen_default = true;
    self.write("{% else %}");
    self
      .stack
      .push(Spanned::new(span, Tag::Control(ControlTag::new("default", None))));
    Ok(())
  }

  /// `<name id="..." class="..." key="{{ expr |escape}}"...>`. `id`/`class`
  /// are special-cased (and removed from the remaining key list);
  /// everything else is emitted in insertion order.
  fn html_opener(&self, tag: &HtmlTag) -> String {
    let mut out = format!("<{}", tag.name);
    let mut attr = tag.attr.clone();

    if let Some(expr) = attr.shift_remove("id") {
      write!(out, " id=\"{{{{ {expr} |escape}}}}\"").unwrap();
    } else if let Some(id) = &tag.id {
      write!(out, " id=\"{id}\"").unwrap();
    }

    if let Some(expr) = attr.shift_remove("class") {
      let shorthand = tag.class.as_deref().unwrap_or("");
      let sep = if shorthand.is_empty() { "" } else { " " };
      write!(
        out,
        " class=\"{shorthand}{sep}{{{{ _jade_class({expr}) |escape}}}}\""
      )
      .unwrap();
    } else if let Some(class) = tag.class.as_deref().filter(|c| !c.is_empty()) {
      write!(out, " class=\"{class}\"").unwrap();
    }

    for (key, expr) in &attr {
      write!(out, " {key}=\"{{{{ {expr} |escape}}}}\"").unwrap();
    }

    out.push('>');
    out
  }
}

fn as_case_mut(tag: &mut Spanned<Tag>) -> Option<&mut ControlTag> {
  match &mut **tag {
    Tag::Control(c) if c.name == "case" => Some(c),
    _ => None,
  }
}

/// The target-dialect fragment table, for every control tag
/// whose opener/closer isn't special-cased elsewhere (`case`/`when`/
/// `default` and `doctype` are handled directly in `start_block`).
fn control_fragment(name: &str, head: Option<&str>) -> (String, String) {
  let head = head.unwrap_or("");
  match name {
    "=" => ("{{ ".to_string(), " }}".to_string()),
    "!=" => ("{{ ".to_string(), " |safe}}".to_string()),
    "-" => ("{% ".to_string(), " %}".to_string()),
    "|" => (String::new(), String::new()),
    "//" => (format!("<!--{head}"), "-->".to_string()),
    "//-" => ("{#".to_string(), "#}".to_string()),
    ":" => (format!("{{% filter {head} %}}"), "{% endfilter %}".to_string()),
    "mixin" => (format!("{{% macro {head} %}}"), "{% endmacro %}".to_string()),
    "prepend" => (
      format!("{{% block {head} %}}"),
      "{{ super() }} {% endblock %}".to_string(),
    ),
    "append" => (
      format!("{{% block {head} %}} {{ super() }}"),
      "{% endblock %}".to_string(),
    ),
    "extends" => (format!("{{% extends {head} %}}"), String::new()),
    "else" => ("{% else %}".to_string(), "{% endif %}".to_string()),
    other => (
      format!("{{% {other} {head} %}}"),
      format!("{{% end{other} %}}"),
    ),
  }
}

/// Case-insensitive lookup on `head`; absent/`"default"`/`"5"` yields the
/// HTML5 doctype. Unknown heads pass through as `<!DOCTYPE <head>>`.
fn doctype_fragment(head: Option<&str>) -> String {
  let head = head.map(str::trim).unwrap_or("");
  match head.to_ascii_lowercase().as_str() {
    "" | "default" | "5" => "<!DOCTYPE html>".to_string(),
    "xml" => "<?xml version=\"1.0\" encoding=\"utf-8\" ?>".to_string(),
    "transitional" => concat!(
      "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Transitional//EN\" ",
      "\"http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd\">"
    )
    .to_string(),
    "strict" => concat!(
      "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" ",
      "\"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd\">"
    )
    .to_string(),
    "frameset" => concat!(
      "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Frameset//EN\" ",
      "\"http://www.w3.org/TR/xhtml1/DTD/xhtml1-frameset.dtd\">"
    )
    .to_string(),
    "1.1" => concat!(
      "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.1//EN\" ",
      "\"http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd\">"
    )
    .to_string(),
    "basic" => concat!(
      "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML Basic 1.1//EN\" ",
      "\"http://www.w3.org/TR/xhtml-basic/xhtml-basic11.dtd\">"
    )
    .to_string(),
    "mobile" => concat!(
      "<!DOCTYPE html PUBLIC \"-//WAPFORUM//DTD XHTML Mobile 1.2//EN\" ",
      "\"http://www.openmobilealliance.org/tech/DTD/xhtml-mobile12.dtd\">"
    )
    .to_string(),
    _ => format!("<!DOCTYPE {head}>"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn span() -> Span {
    Span::from(0..1)
  }

  #[test]
  fn html_tag_with_id_and_class_shorthand_and_attrs() {
    let mut e = Emitter::new(String::new());
    let mut tag = HtmlTag::new("div");
    tag.id = Some("main".to_string());
    tag.class = Some("big".to_string());
    tag.attr.insert("data-x".to_string(), "1".to_string());
    e.start_block(Tag::Html(tag), span()).unwrap();
    e.end_block().unwrap();
    assert_eq!(
      e.into_inner(),
      "<div id=\"main\" class=\"big\" data-x=\"{{ 1 |escape}}\"></div>"
    );
  }

  #[test]
  fn if_close_is_deferred_until_flush() {
    let mut e = Emitter::new(String::new());
    e.start_block(
      Tag::Control(ControlTag::new("if", Some("x".to_string()))),
      span(),
    )
    .unwrap();
    e.end_block().unwrap();
    assert_eq!(e.into_inner(), "{% if x %}");
  }

  #[test]
  fn elif_dismisses_the_deferred_endif_but_keeps_captured_newlines() {
    let mut e = Emitter::new(String::new());
    e.start_block(
      Tag::Control(ControlTag::new("if", Some("x".to_string()))),
      span(),
    )
    .unwrap();
    e.end_block().unwrap();
    e.newlines("\n");
    e.start_block(
      Tag::Control(ControlTag::new("elif", Some("y".to_string()))),
      span(),
    )
    .unwrap();
    assert_eq!(e.into_inner(), "{% if x %}\n{% elif y %}");
  }

  #[test]
  fn else_flushes_endif_then_newlines_on_a_following_literal() {
    let mut e = Emitter::new(String::new());
    e.start_block(
      Tag::Control(ControlTag::new("if", Some("x".to_string()))),
      span(),
    )
    .unwrap();
    e.end_block().unwrap();
    e.newlines("\n");
    e.literal("after");
    assert_eq!(e.into_inner(), "{% if x %}\n{% endif %}after");
  }

  #[test]
  fn case_without_when_errors_on_close() {
    let mut e = Emitter::new(String::new());
    e.start_block(
      Tag::Control(ControlTag::new("case", Some("x".to_string()))),
      span(),
    )
    .unwrap();
    let err = e.end_block().unwrap_err();
    assert_eq!(err.name, "CaseWithoutWhen");
  }

  #[test]
  fn case_when_default_chain() {
    let mut e = Emitter::new(String::new());
    e.start_block(
      Tag::Control(ControlTag::new("case", Some("x".to_string()))),
      span(),
    )
    .unwrap();
    e.start_block(
      Tag::Control(ControlTag::new("when", Some("1".to_string()))),
      span(),
    )
    .unwrap();
    e.end_block().unwrap(); // when
    e.start_block(
      Tag::Control(ControlTag::new("when", Some("2".to_string()))),
      span(),
    )
    .unwrap();
    e.end_block().unwrap(); // when
    e.start_block(Tag::Control(ControlTag::new("default", None)), span())
      .unwrap();
    e.end_block().unwrap(); // default
    e.end_block().unwrap(); // case
    assert_eq!(
      e.into_inner(),
      "{% set _jade_0 = x %}{% if _jade_0 == 1 %}{% elif _jade_0 == 2 %}{% else %}{% endif %}"
    );
  }

  #[test]
  fn when_outside_case_errors() {
    let mut e = Emitter::new(String::new());
    let err = e
      .start_block(
        Tag::Control(ControlTag::new("when", Some("1".to_string()))),
        span(),
      )
      .unwrap_err();
    assert_eq!(err.name, "WhenOutsideCase");
  }

  #[test]
  fn empty_class_shorthand_emits_no_class_attribute() {
    let mut e = Emitter::new(String::new());
    let mut tag = HtmlTag::new("div");
    tag.id = Some("id".to_string());
    tag.class = Some(String::new());
    e.start_block(Tag::Html(tag), span()).unwrap();
    e.end_block().unwrap();
    assert_eq!(e.into_inner(), "<div id=\"id\"></div>");
  }

  #[test]
  fn closing_two_if_chains_in_one_batch_keeps_both_endifs() {
    // Simulates an outer `if` whose last child is itself an `if`, both
    // dedenting closed in the same batch: the inner if's deferred endif
    // must be flushed before the outer if occupies the slot.
    let mut e = Emitter::new(String::new());
    e.start_block(
      Tag::Control(ControlTag::new("if", Some("a".to_string()))),
      span(),
    )
    .unwrap();
    e.start_block(
      Tag::Control(ControlTag::new("if", Some("b".to_string()))),
      span(),
    )
    .unwrap();
    e.end_block().unwrap(); // inner if -> deferred
    e.end_block().unwrap(); // outer if -> would clobber without the flush fix
    assert_eq!(e.into_inner(), "{% if a %}{% if b %}{% endif %}");
  }

  #[test]
  fn doctype_table_lookups() {
    assert_eq!(doctype_fragment(None), "<!DOCTYPE html>");
    assert_eq!(doctype_fragment(Some("5")), "<!DOCTYPE html>");
    assert_eq!(doctype_fragment(Some("Default")), "<!DOCTYPE html>");
    assert_eq!(
      doctype_fragment(Some("XML")),
      "<?xml version=\"1.0\" encoding=\"utf-8\" ?>"
    );
    assert_eq!(doctype_fragment(Some("weird")), "<!DOCTYPE weird>");
  }
}
