use diag::Diagnostic;

/// The compiler's only error type. Wraps a [`Diagnostic`] (message, kind,
/// position, offending line) computed once by the driver at the point of
/// failure. Parsing never recovers from an `Error`; every state function
/// propagates it with `?`.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{0}")]
pub struct Error(#[from] pub Diagnostic);

impl Error {
  pub fn render(&self, color: bool) -> String {
    self.0.render(color)
  }

  pub fn diagnostic(&self) -> &Diagnostic {
    &self.0
  }
}
