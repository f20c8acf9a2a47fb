//! HTTP agent adapter — performs workflow steps by calling an
//! Anthropic-compatible Messages API.
//!
//! The specialist's system prompt becomes the `system` field and the rendered
//! instruction payload becomes the single user message. A reply that is (or
//! contains a fenced block of) JSON is used as the step output verbatim;
//! anything else is wrapped as `{"text": ...}`.

use std::sync::LazyLock;

use async_trait::async_trait;

use crate::workflow::capability::{AgentCapability, AgentOutcome, InstructionPayload};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Output key an agent may use to publish shared variables.
pub const VARIABLES_OUTPUT_KEY: &str = "variables";

static ENV_REF: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("valid env reference regex"));

static FENCED_JSON: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n\s*```").expect("valid fenced block regex")
});

/// Endpoint settings for [`HttpAgentCapability`].
#[derive(Debug, Clone)]
pub struct AgentEndpointConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
}

impl Default for AgentEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }
}

impl AgentEndpointConfig {
    /// Read `DEVPILOT_AGENT_BASE_URL` (or `ANTHROPIC_BASE_URL`),
    /// `ANTHROPIC_AUTH_TOKEN` (or `ANTHROPIC_API_KEY`) and `DEVPILOT_AGENT_MODEL`.
    pub fn from_env() -> Self {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| resolve_env_vars(v.trim()))
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();
        Self {
            base_url: var("DEVPILOT_AGENT_BASE_URL")
                .or_else(|| var("ANTHROPIC_BASE_URL"))
                .unwrap_or(defaults.base_url),
            api_key: var("ANTHROPIC_AUTH_TOKEN")
                .or_else(|| var("ANTHROPIC_API_KEY"))
                .unwrap_or_default(),
            model: var("DEVPILOT_AGENT_MODEL").unwrap_or(defaults.model),
            max_tokens: defaults.max_tokens,
            temperature: None,
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }
}

pub struct HttpAgentCapability {
    client: reqwest::Client,
    config: AgentEndpointConfig,
}

impl HttpAgentCapability {
    pub fn new(config: AgentEndpointConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(600))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
        }
    }

    pub fn config(&self) -> &AgentEndpointConfig {
        &self.config
    }

    fn request_body(&self, payload: &InstructionPayload) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [
                { "role": "user", "content": payload.to_prompt() }
            ]
        });
        if !payload.system_prompt.is_empty() {
            body["system"] = serde_json::Value::String(payload.system_prompt.clone());
        }
        if let Some(temp) = self.config.temperature.and_then(serde_json::Number::from_f64) {
            body["temperature"] = serde_json::Value::Number(temp);
        }
        body
    }
}

#[async_trait]
impl AgentCapability for HttpAgentCapability {
    async fn invoke(
        &self,
        capability_id: &str,
        payload: InstructionPayload,
    ) -> Result<AgentOutcome, String> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let body = self.request_body(&payload);

        tracing::debug!(
            step_id = %payload.step_id,
            "[AgentCaller] Calling {} as '{}' (model: {})",
            url,
            capability_id,
            self.config.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response body: {}", e))?;

        if !status.is_success() {
            return Ok(AgentOutcome::failed(format!(
                "API returned {}: {}",
                status, response_text
            )));
        }

        let json: serde_json::Value = serde_json::from_str(&response_text)
            .map_err(|e| format!("Failed to parse response JSON: {}", e))?;
        Ok(outcome_from_response(&json))
    }
}

/// Turn a Messages API response into a step outcome.
pub fn outcome_from_response(json: &serde_json::Value) -> AgentOutcome {
    let text = json
        .get("content")
        .and_then(|c| c.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    let tokens_used = json
        .get("usage")
        .map(|u| {
            let read = |k: &str| u.get(k).and_then(|v| v.as_u64()).unwrap_or(0);
            read("input_tokens") + read("output_tokens")
        })
        .unwrap_or(0);

    let mut output = parse_output(&text);
    let variables = match output.as_object_mut().and_then(|o| o.remove(VARIABLES_OUTPUT_KEY)) {
        Some(serde_json::Value::Object(vars)) => vars,
        Some(other) => {
            // Not a map: leave it in the output.
            if let Some(o) = output.as_object_mut() {
                o.insert(VARIABLES_OUTPUT_KEY.to_string(), other);
            }
            serde_json::Map::new()
        }
        None => serde_json::Map::new(),
    };

    AgentOutcome {
        tokens_used,
        variables,
        ..AgentOutcome::ok(output)
    }
}

/// Structured output when the reply is JSON, otherwise `{"text": reply}`.
pub fn parse_output(text: &str) -> serde_json::Value {
    let trimmed = text.trim();
    if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return value;
    }
    if let Some(block) = FENCED_JSON.captures(trimmed).and_then(|c| c.get(1)) {
        if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str::<serde_json::Value>(block.as_str()) {
            return value;
        }
    }
    serde_json::json!({ "text": trimmed })
}

/// Resolve environment variable references in a string.
/// Supports `${ENV_VAR}` and `${ENV_VAR:-default}` syntax.
pub fn resolve_env_vars(input: &str) -> String {
    ENV_REF
        .replace_all(input, |caps: &regex::Captures| {
            let var_expr = &caps[1];
            if let Some(idx) = var_expr.find(":-") {
                let var_name = &var_expr[..idx];
                let default_val = &var_expr[idx + 2..];
                std::env::var(var_name).unwrap_or_else(|_| default_val.to_string())
            } else {
                std::env::var(var_expr).unwrap_or_else(|_| format!("${{{}}}", var_expr))
            }
        })
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("DEVPILOT_TEST_AGENT_VAR", "hello");
        assert_eq!(resolve_env_vars("${DEVPILOT_TEST_AGENT_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix-${DEVPILOT_TEST_AGENT_VAR}-suffix"),
            "prefix-hello-suffix"
        );
        assert_eq!(resolve_env_vars("${DEVPILOT_NONEXISTENT_VAR:-fallback}"), "fallback");
        assert_eq!(resolve_env_vars("${DEVPILOT_NONEXISTENT_VAR}"), "${DEVPILOT_NONEXISTENT_VAR}");
        std::env::remove_var("DEVPILOT_TEST_AGENT_VAR");
    }

    #[test]
    fn test_parse_output_prefers_json() {
        assert_eq!(parse_output(r#"{"verdict":"ok"}"#), json!({"verdict": "ok"}));
        assert_eq!(
            parse_output("Here you go:\n```json\n{\"count\": 3}\n```\nDone."),
            json!({"count": 3})
        );
        assert_eq!(parse_output("  plain words "), json!({"text": "plain words"}));
        assert_eq!(parse_output("[1, 2]"), json!({"text": "[1, 2]"}));
    }

    #[test]
    fn test_outcome_from_response_extracts_usage_and_variables() {
        let response = json!({
            "model": "m",
            "content": [
                {"type": "text", "text": "{\"summary\": \"fine\", \"variables\": {\"branch\": \"main\"}}"},
                {"type": "tool_use", "id": "x"}
            ],
            "usage": {"input_tokens": 120, "output_tokens": 30}
        });
        let outcome = outcome_from_response(&response);
        assert!(outcome.success);
        assert_eq!(outcome.tokens_used, 150);
        assert_eq!(outcome.output, json!({"summary": "fine"}));
        assert_eq!(outcome.variables.get("branch"), Some(&json!("main")));
    }

    #[test]
    fn test_request_body_carries_system_prompt() {
        let caller = HttpAgentCapability::new(AgentEndpointConfig {
            model: "test-model".into(),
            temperature: Some(0.5),
            ..Default::default()
        });
        let payload = InstructionPayload {
            role: "REVIEWER".into(),
            system_prompt: "You review code.".into(),
            role_reminder: None,
            workflow_id: "wf".into(),
            workflow_name: "Flow".into(),
            execution_id: "exec".into(),
            session_id: "session".into(),
            step_id: "review".into(),
            step_name: "Review".into(),
            project: None,
            input: json!({}),
            prior_steps: vec![],
            environment: None,
            attempt: 1,
        };
        let body = caller.request_body(&payload);
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["system"], "You review code.");
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
