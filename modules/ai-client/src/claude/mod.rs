mod client;
pub(crate) mod types;

use std::time::Duration;

use tracing::debug;

use crate::error::{AiError, Result};
use crate::schema::StructuredOutput;
use crate::util::strip_code_blocks;

use client::ClaudeClient;
use types::*;

const STRUCTURED_TOOL: &str = "structured_response";

// =============================================================================
// Claude Agent
// =============================================================================

/// Handle to one Claude model. Cloning is cheap and every call builds its own
/// HTTP client, so handles can be created per stage and dropped afterwards.
#[derive(Clone)]
pub struct Claude {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Same credentials, different model. Used for fallback escalation.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// HTTP-level timeout for each request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    fn client(&self) -> Result<ClaudeClient> {
        if self.api_key.is_empty() {
            return Err(AiError::Config("Anthropic API key is empty".into()));
        }
        let client = ClaudeClient::new(&self.api_key, self.timeout)?;
        Ok(match self.base_url {
            Some(ref url) => client.with_base_url(url),
            None => client,
        })
    }

    /// Schema-constrained extraction. The model is forced to answer through a
    /// tool whose input schema is `T`'s schema; the tool input must decode
    /// into `T` or the call fails.
    pub async fn extract<T: StructuredOutput>(
        &self,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Result<T> {
        debug!(
            model = %self.model,
            type_name = T::type_name(),
            "Claude structured output extraction"
        );

        let request = ChatRequest::new(&self.model)
            .system(system_prompt)
            .message(WireMessage::user(user_prompt))
            .forced_tool(ToolDefinitionWire {
                name: STRUCTURED_TOOL.to_string(),
                description: "Return the structured result.".to_string(),
                input_schema: T::closed_schema(),
            });

        let response = self.client()?.chat(&request).await?;
        decode_structured(&response)
    }
}

/// Decode the forced tool input. A model that answered in plain JSON text
/// instead of the tool is still held to the same schema.
fn decode_structured<T: StructuredOutput>(response: &ChatResponse) -> Result<T> {
    if let Some(input) = response.tool_input() {
        return serde_json::from_value(input.clone())
            .map_err(|e| AiError::Parse(format!("Failed to deserialize response: {e}")));
    }

    if let Some(text) = response.text() {
        return serde_json::from_str(strip_code_blocks(&text))
            .map_err(|e| AiError::Parse(format!("Failed to deserialize response: {e}")));
    }

    Err(AiError::Parse("No structured output in Claude response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Pick {
        selection: usize,
        confidence: f64,
    }

    fn response(body: &str) -> ChatResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_claude_new() {
        let ai = Claude::new("sk-ant-test", "claude-sonnet-4-20250514");
        assert_eq!(ai.model(), "claude-sonnet-4-20250514");
        assert_eq!(ai.api_key(), "sk-ant-test");
    }

    #[test]
    fn with_model_keeps_credentials() {
        let ai = Claude::new("sk-ant-test", "primary").with_model("fallback");
        assert_eq!(ai.model(), "fallback");
        assert_eq!(ai.api_key(), "sk-ant-test");
    }

    #[test]
    fn empty_key_is_a_config_error() {
        let ai = Claude::new("", "claude-test");
        assert!(matches!(ai.client(), Err(AiError::Config(_))));
    }

    #[test]
    fn decodes_tool_input() {
        let r = response(
            r#"{"content":[{"type":"tool_use","id":"a","name":"structured_response","input":{"selection":2,"confidence":0.9}}],"stop_reason":"tool_use"}"#,
        );
        let pick: Pick = decode_structured(&r).unwrap();
        assert_eq!(pick.selection, 2);
        assert!((pick.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn decodes_fenced_json_text() {
        let r = response(
            r#"{"content":[{"type":"text","text":"```json\n{\"selection\":0,\"confidence\":0.5}\n```"}],"stop_reason":"end_turn"}"#,
        );
        let pick: Pick = decode_structured(&r).unwrap();
        assert_eq!(pick.selection, 0);
    }

    #[test]
    fn schema_mismatch_is_a_parse_error() {
        let r = response(
            r#"{"content":[{"type":"tool_use","id":"a","name":"structured_response","input":{"selection":"two"}}],"stop_reason":"tool_use"}"#,
        );
        let err = decode_structured::<Pick>(&r).unwrap_err();
        assert!(err.to_string().contains("Failed to deserialize response"));
    }

    #[test]
    fn empty_content_is_a_parse_error() {
        let r = response(r#"{"content":[],"stop_reason":"end_turn"}"#);
        let err = decode_structured::<Pick>(&r).unwrap_err();
        assert!(err.to_string().contains("No structured output"));
    }
}
