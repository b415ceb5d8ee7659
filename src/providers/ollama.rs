use anyhow::{Context, Result, anyhow};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::{TranslateFuture, WordTranslator, system_prompt, user_prompt};

pub(crate) const DEFAULT_URL: &str = "http://localhost:11434/api/generate";
pub(crate) const DEFAULT_MODEL: &str = "aya:latest";

#[derive(Debug, Clone)]
pub struct Ollama {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl Ollama {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            url: if url.trim().is_empty() {
                DEFAULT_URL.to_string()
            } else {
                url
            },
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

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: String) -> Result<String> {
        let body = json!({
            "prompt": prompt,
            "model": self.model,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to reach Ollama at {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama API error ({}): {}", status, text.trim()));
        }

        let mut collector = StreamCollector::default();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| "failed to read Ollama response stream")?;
            if collector.push(&chunk) {
                break;
            }
        }
        Ok(collector.finish())
    }
}

impl WordTranslator for Ollama {
    fn translate_word<'a>(
        &'a self,
        word: &'a str,
        target_language: &'a str,
    ) -> TranslateFuture<'a> {
        Box::pin(async move {
            let prompt = format!(
                "{}\n\n{}",
                system_prompt(target_language),
                user_prompt(word, target_language)
            );
            self.generate(prompt).await
        })
    }
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
}

/// Accumulates the newline-delimited JSON chunks of a streamed
/// `/api/generate` reply.
#[derive(Debug, Default)]
pub(crate) struct StreamCollector {
    pending: Vec<u8>,
    text: String,
    done: bool,
}

impl StreamCollector {
    /// Feeds raw bytes; returns `true` once a chunk with `"done": true` was seen.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> bool {
        self.pending.extend_from_slice(bytes);
        while !self.done {
            let Some(pos) = self.pending.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.consume_line(&line);
        }
        self.done
    }

    pub(crate) fn finish(mut self) -> String {
        if !self.done && !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.consume_line(&rest);
        }
        self.text.trim().to_string()
    }

    fn consume_line(&mut self, line: &[u8]) {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<GenerateChunk>(line) {
            Ok(chunk) => {
                if let Some(part) = chunk.response {
                    self.text.push_str(&part);
                }
                if chunk.done {
                    self.done = true;
                }
            }
            Err(err) => warn!("skipping undecodable Ollama chunk '{}': {}", line, err),
        }
    }
}
