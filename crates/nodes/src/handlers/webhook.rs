//! HTTP/Webhook handler.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::HandlerError;
use crate::traits::{BlockHandler, ExecutionContext, NodeSpec};

pub struct WebhookHandler;

impl WebhookHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WebhookHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockHandler for WebhookHandler {
    fn block_type(&self) -> &str {
        "WEBHOOK"
    }

    async fn execute(&self, node: &NodeSpec, ctx: &ExecutionContext) -> Result<Value, HandlerError> {
        let config = &node.config;

        let url = config
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::ConfigInvalid("WEBHOOK requires 'url'".into()))?;

        let method = config
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();

        let client = ctx
            .services
            .http
            .clone()
            .unwrap_or_else(Client::new);

        let mut request = client.request(
            method.parse().map_err(|_| HandlerError::ConfigInvalid(format!("invalid HTTP method '{method}'")))?,
            url,
        );

        let mut headers_set_content_type = false;
        if let Some(headers) = config.get("headers").and_then(Value::as_object) {
            for (k, v) in headers {
                if k.eq_ignore_ascii_case("content-type") {
                    headers_set_content_type = true;
                }
                if let Some(v_str) = v.as_str() {
                    request = request.header(k, v_str);
                }
            }
        }

        if let Some(body) = config.get("body") {
            request = if let Some(body_str) = body.as_str() {
                request.body(body_str.to_string())
            } else if headers_set_content_type {
                request.body(body.to_string())
            } else {
                request.json(body)
            };
        }

        let response = request
            .send()
            .await
            .map_err(|e| HandlerError::WebhookError(format!("request failed: {e}")))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body_text = response
            .text()
            .await
            .map_err(|e| HandlerError::WebhookError(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            let prefix: String = body_text.chars().take(200).collect();
            return Err(HandlerError::WebhookError(format!(
                "webhook returned status {}: {}",
                status.as_u16(),
                prefix
            )));
        }

        if content_type.contains("application/json") {
            let parsed: Value = serde_json::from_str(&body_text)
                .map_err(|e| HandlerError::WebhookError(format!("invalid JSON response: {e}")))?;
            Ok(parsed)
        } else {
            Ok(json!({ "status": status.as_u16(), "body": body_text }))
        }
    }
}
