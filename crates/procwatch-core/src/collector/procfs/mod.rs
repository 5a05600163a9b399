//! Parsers for the Linux `/proc` virtual filesystem.

pub mod parser;

pub use parser::{ParseError, UserResolver};
