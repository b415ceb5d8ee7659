use anyhow::{Result, anyhow};
use std::future::Future;
use std::pin::Pin;

mod ollama;
mod openai;

pub use ollama::Ollama;
pub use openai::OpenAI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    OpenAI,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAI => "openai",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSelection {
    pub provider: ProviderKind,
    pub requested_model: Option<String>,
}

pub type TranslateFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Remote backend that translates one word at a time, with no surrounding
/// sentence context.
pub trait WordTranslator: Send + Sync {
    fn translate_word<'a>(&'a self, word: &'a str, target_language: &'a str)
    -> TranslateFuture<'a>;
}

#[derive(Debug, Clone)]
pub enum ProviderImpl {
    Ollama(Ollama),
    OpenAI(OpenAI),
}

impl WordTranslator for ProviderImpl {
    fn translate_word<'a>(
        &'a self,
        word: &'a str,
        target_language: &'a str,
    ) -> TranslateFuture<'a> {
        match self {
            ProviderImpl::Ollama(provider) => provider.translate_word(word, target_language),
            ProviderImpl::OpenAI(provider) => provider.translate_word(word, target_language),
        }
    }
}

pub(crate) fn system_prompt(target_language: &str) -> String {
    format!(
        "You are an expert in translating individual words to {lang}. You will be given a single word, and you must return only its direct translation in {lang}, without any additional context, explanation, or surrounding words. If the word is already in {lang} or does not need translation, return the word as is.",
        lang = target_language
    )
}

pub(crate) fn user_prompt(word: &str, target_language: &str) -> String {
    format!("Translate the following word to {}: {}", target_language, word)
}

pub fn build_provider(
    selection: &ProviderSelection,
    ollama_url: &str,
    override_key: Option<&str>,
) -> Result<ProviderImpl> {
    match selection.provider {
        ProviderKind::Ollama => {
            let mut provider = Ollama::new(ollama_url);
            if let Some(model) = selection.requested_model.as_deref() {
                provider = provider.with_model(model);
            }
            Ok(ProviderImpl::Ollama(provider))
        }
        ProviderKind::OpenAI => {
            let key = override_key
                .map(str::to_string)
                .or_else(|| get_env("OPENAI_API_KEY"))
                .ok_or_else(|| anyhow!("API key not found for provider openai (OPENAI_API_KEY)"))?;
            let mut provider = OpenAI::new(key);
            if let Some(model) = selection.requested_model.as_deref() {
                provider = provider.with_model(model);
            }
            Ok(ProviderImpl::OpenAI(provider))
        }
    }
}

/// Parses `provider`, `provider:model`, or a bare provider name. Ollama model
/// tags keep their own colon (`ollama:aya:latest`).
pub fn parse_model_arg(model_arg: &str) -> Result<ProviderSelection> {
    let raw = model_arg.trim();
    if raw.is_empty() {
        return Err(anyhow!("model argument is empty"));
    }

    if let Some(provider) = provider_from_name(&raw.to_lowercase()) {
        return Ok(ProviderSelection {
            provider,
            requested_model: None,
        });
    }

    let (provider_part, model_part) = raw.split_once(':').ok_or_else(|| {
        anyhow!(
            "unable to infer provider from model '{}'. Use provider:model (ollama:, openai:)",
            raw
        )
    })?;
    let provider = provider_from_name(&provider_part.to_lowercase())
        .ok_or_else(|| anyhow!("unknown provider '{}' (expected ollama or openai)", provider_part))?;
    let model = model_part.trim();
    Ok(ProviderSelection {
        provider,
        requested_model: (!model.is_empty()).then(|| model.to_string()),
    })
}

fn provider_from_name(name: &str) -> Option<ProviderKind> {
    match name {
        "ollama" => Some(ProviderKind::Ollama),
        "openai" => Some(ProviderKind::OpenAI),
        _ => None,
    }
}

pub(crate) fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
