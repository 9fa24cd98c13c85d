//! Configuration-time errors.
//!
//! These surface synchronously to whoever is configuring an instance and
//! block the reconfiguration from taking effect. Runtime mishaps go through
//! the event channel instead (see `events`); nothing here ever crosses the
//! scheduler boundary.

use crate::engine::{CompileError, ParseError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FunctionError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FunctionError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("`{0}` is not a supported or valid variable name")]
    UnsupportedName(String),
    #[error("constant `{0}` is referenced but was never defined")]
    UndefinedConstant(String),
}
