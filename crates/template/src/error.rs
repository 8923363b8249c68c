//! Error type for the template crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unbalanced braces in template")]
    Unbalanced,

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("invalid arguments to {0}: {1}")]
    InvalidArgs(String, String),
}
