use indexmap::IndexMap;

/// A tag that has been pushed onto the emitter's open-block stack.
///
/// Closed two-variant sum, not an inheritance hierarchy: the emitter
/// matches on which shape it holds rather than dispatching through a
/// trait object.
#[derive(Clone, Debug)]
pub enum Tag {
  Html(HtmlTag),
  Control(ControlTag),
}

impl Tag {
  pub fn name(&self) -> &str {
    match self {
      Tag::Html(t) => &t.name,
      Tag::Control(t) => &t.name,
    }
  }
}

/// `div#main.big(data-x=1)` — a source tag and its qualifiers.
#[derive(Clone, Debug, Default)]
pub struct HtmlTag {
  pub name: String,
  pub class: Option<String>,
  pub id: Option<String>,
  /// Insertion-ordered: attribute output must match source order.
  pub attr: IndexMap<String, String>,
}

impl HtmlTag {
  pub fn new(name: impl Into<String>) -> Self {
    HtmlTag {
      name: name.into(),
      ..Default::default()
    }
  }
}

/// `if x`, `for y in z`, `case foo`, `mixin bar(…)`, `//- comment`, … —
/// anything that isn't a literal HTML element. `head` is the raw text
/// after the keyword (e.g. `x` in `if x`), transported verbatim.
///
/// The `var`/`seen_when`/`seen_default` fields are scratch space used
/// only while a `case` tag sits on the open-block stack; every other
/// control tag leaves them at their default.
#[derive(Clone, Debug, Default)]
pub struct ControlTag {
  pub name: String,
  pub head: Option<String>,
  pub var: Option<String>,
  pub seen_when: bool,
  pub seen_default: bool,
}

impl ControlTag {
  pub fn new(name: impl Into<String>, head: Option<String>) -> Self {
    ControlTag {
      name: name.into(),
      head,
      ..Default::default()
    }
  }
}
