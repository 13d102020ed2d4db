//! Compiles a jade-style indentation-sensitive HTML template dialect into
//! a curly-brace templating dialect (Jinja/Twig-family target syntax).
//!
//! The compiler never evaluates host expressions; it transports them
//! verbatim from source to output. See [`compile`] for the single
//! fallible entry point.

mod driver;
mod emitter;
mod error;
mod indent;
mod parser;
mod tag;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Compile `src` into the target template dialect.
///
/// This is the crate's only public fallible entry point: a compile owns
/// its own cursor, indent stacks, and emitter state, and never shares
/// them across calls.
pub fn compile(src: &str) -> Result<String> {
  parser::Parser::new(src).run()
}
