//! Error types emitted by `rxsieve` operators.

mod observable_errors;

pub use observable_errors::*;
