use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::{TranslateFuture, WordTranslator, system_prompt, user_prompt};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";
const TOOL_NAME: &str = "deliver_translation";

#[derive(Debug, Clone)]
pub struct OpenAI {
    key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAI {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    async fn call_with_chat_completions(&self, word: &str, target_language: &str) -> Result<String> {
        let url = format!("{}/chat/completions", base_url());
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt(target_language)},
                {"role": "user", "content": user_prompt(word, target_language)}
            ],
            "tools": [
                {
                    "type": "function",
                    "function": {
                        "name": TOOL_NAME,
                        "description": "Deliver the translated word.",
                        "parameters": {
                            "type": "object",
                            "properties": {
                                "translation": {"type": "string"}
                            },
                            "required": ["translation"]
                        }
                    }
                }
            ],
            "tool_choice": {"type": "function", "function": {"name": TOOL_NAME}}
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to reach OpenAI at {}", url))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            return extract_translation(&text);
        }
        Err(anyhow!(
            "OpenAI API error ({}): {}",
            status,
            extract_openai_error(&text).unwrap_or(text)
        ))
    }
}

impl WordTranslator for OpenAI {
    fn translate_word<'a>(
        &'a self,
        word: &'a str,
        target_language: &'a str,
    ) -> TranslateFuture<'a> {
        Box::pin(self.call_with_chat_completions(word, target_language))
    }
}

fn base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn extract_translation(text: &str) -> Result<String> {
    let payload: OpenAIResponse =
        serde_json::from_str(text).with_context(|| "failed to parse OpenAI response JSON")?;
    let tool_call = payload
        .choices
        .first()
        .and_then(|choice| choice.message.tool_calls.first())
        .ok_or_else(|| anyhow!("no tool call returned from OpenAI"))?;

    if tool_call.function.name != TOOL_NAME {
        return Err(anyhow!(
            "unexpected tool name '{}' from OpenAI",
            tool_call.function.name
        ));
    }

    let args: TranslationArgs = serde_json::from_str(&tool_call.function.arguments)
        .with_context(|| "failed to parse OpenAI tool arguments")?;
    Ok(args.translation.trim().to_string())
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let parts = [
        error.message,
        error.kind.map(|kind| format!("type: {}", kind)),
        error.code.map(|code| format!("code: {}", code)),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.trim().is_empty())
    .collect::<Vec<_>>();
    if parts.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    tool_calls: Vec<OpenAIToolCall>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    function: OpenAIFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct TranslationArgs {
    translation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_translation_from_tool_call() {
        let payload = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/openai_tool_response.json"
        ));
        assert_eq!(extract_translation(payload).unwrap(), "monde");
    }

    #[test]
    fn missing_tool_call_is_an_error() {
        let payload = r#"{"choices": [{"message": {"content": "monde"}}]}"#;
        let err = extract_translation(payload).unwrap_err();
        assert!(err.to_string().contains("no tool call"));
    }

    #[test]
    fn formats_api_errors() {
        let body = r#"{"error": {"message": "Invalid key", "type": "invalid_request_error", "code": null}}"#;
        assert_eq!(
            extract_openai_error(body).as_deref(),
            Some("Invalid key | type: invalid_request_error")
        );
        assert_eq!(extract_openai_error("<html>"), None);
    }
}
