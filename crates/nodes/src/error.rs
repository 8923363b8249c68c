//! The error taxonomy block handlers return.
//!
//! The engine does not retry any of these — a handler that wants internal
//! retry must implement it itself and only surface the final outcome.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum HandlerError {
    /// Entity lookup miss (e.g. a referenced wallet or session key).
    #[error("not found: {0}")]
    NotFound(String),

    /// A node's config, or a request payload, failed validation.
    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    /// A template expression inside `node.config` was malformed.
    #[error("malformed template: {0}")]
    TemplateMalformed(String),

    /// Session key missing, wrong owner, or caller lacks rights.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Session-key validation rejected the attempted use (status, expiry,
    /// caps, allow-list, emergency stop).
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// The handler's per-node wall-clock budget was exceeded.
    #[error("handler timed out: {0}")]
    HandlerTimeout(String),

    /// A downstream service (LLM provider, protocol adapter) returned an error.
    #[error("upstream error: {0}")]
    UpstreamError(String),

    /// A blockchain RPC call or receipt wait failed.
    #[error("on-chain error: {0}")]
    OnChainError(String),

    /// An HTTP/webhook call returned a non-2xx response.
    #[error("webhook error: {0}")]
    WebhookError(String),

    /// Unexpected failure; logged at `error`, fails the node and execution.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<template::TemplateError> for HandlerError {
    fn from(err: template::TemplateError) -> Self {
        HandlerError::TemplateMalformed(err.to_string())
    }
}
