mod diagnostic;
mod style;

pub use diagnostic::{Diagnostic, Kind};
