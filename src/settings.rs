use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ocr::{ColorRgba, FontCatalog, OverlayMode, OverlayParams};
use crate::providers::{self, ProviderSelection};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub overlay: OverlayParams,
    pub fonts: FontCatalog,
    pub provider: String,
    pub model: Option<String>,
    pub ollama_url: String,
    pub server_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            overlay: OverlayParams::default(),
            fonts: FontCatalog::default(),
            provider: "ollama".to_string(),
            model: None,
            ollama_url: "http://localhost:11434/api/generate".to_string(),
            server_addr: "127.0.0.1:5000".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    overlay: Option<OverlaySettings>,
    fonts: Option<FontSettings>,
    translation: Option<TranslationSettings>,
    server: Option<ServerSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    mode: Option<OverlayMode>,
    height_to_font_ratio: Option<f32>,
    min_font_size: Option<u32>,
    fallback_ratio: Option<f32>,
    fallback_min_font_size: Option<u32>,
    probe_font_size: Option<u32>,
    shrink_factor: Option<f32>,
    fill_color: Option<String>,
    fill_alpha: Option<u8>,
    text_color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FontSettings {
    dirs: Option<Vec<String>>,
    default: Option<Vec<String>>,
    languages: Option<HashMap<String, Vec<String>>>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    provider: Option<String>,
    model: Option<String>,
    ollama_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
}

/// Loads the embedded defaults, then each settings file that exists (later
/// files win), then environment overrides.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    settings
        .merge(parse_settings(DEFAULT_SETTINGS_TOML).with_context(|| "invalid built-in settings")?)
        .with_context(|| "invalid built-in settings")?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed = parse_settings(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings
                .merge(parsed)
                .with_context(|| format!("invalid settings: {}", path.display()))?;
        }
    }

    settings.apply_env(providers::get_env);
    Ok(settings)
}

fn parse_settings(content: &str) -> Result<SettingsFile> {
    Ok(toml::from_str(content)?)
}

impl Settings {
    /// Provider from `--model` when given, otherwise from `[translation]`.
    pub fn provider_selection(&self, model_arg: Option<&str>) -> Result<ProviderSelection> {
        if let Some(model) = model_arg {
            return providers::parse_model_arg(model);
        }
        let mut selection = providers::parse_model_arg(&self.provider)?;
        if selection.requested_model.is_none() {
            selection.requested_model = self.model.clone();
        }
        Ok(selection)
    }

    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(overlay) = incoming.overlay {
            self.merge_overlay(overlay)?;
        }
        if let Some(fonts) = incoming.fonts {
            if let Some(dirs) = fonts.dirs {
                self.fonts.dirs = dirs.into_iter().map(PathBuf::from).collect();
            }
            if let Some(default) = fonts.default {
                self.fonts.default = default;
            }
            if let Some(languages) = fonts.languages {
                for (language, list) in languages {
                    self.fonts.languages.insert(language, list);
                }
            }
        }
        if let Some(translation) = incoming.translation {
            if let Some(provider) = translation.provider.filter(|v| !v.trim().is_empty()) {
                self.provider = provider;
            }
            if let Some(model) = translation.model.filter(|v| !v.trim().is_empty()) {
                self.model = Some(model);
            }
            if let Some(url) = translation.ollama_url.filter(|v| !v.trim().is_empty()) {
                self.ollama_url = url;
            }
        }
        if let Some(server) = incoming.server
            && let Some(addr) = server.addr.filter(|v| !v.trim().is_empty())
        {
            self.server_addr = addr;
        }
        Ok(())
    }

    fn merge_overlay(&mut self, overlay: OverlaySettings) -> Result<()> {
        let params = &mut self.overlay;
        if let Some(mode) = overlay.mode {
            params.mode = mode;
        }
        if let Some(ratio) = overlay.height_to_font_ratio {
            params.height_to_font_ratio = positive_ratio("height_to_font_ratio", ratio)?;
        }
        if let Some(ratio) = overlay.fallback_ratio {
            params.fallback_ratio = positive_ratio("fallback_ratio", ratio)?;
        }
        if let Some(factor) = overlay.shrink_factor {
            if !(factor > 0.0 && factor <= 1.0) {
                return Err(anyhow!("shrink_factor must be in (0, 1], got {}", factor));
            }
            params.shrink_factor = factor;
        }
        if let Some(size) = overlay.min_font_size {
            params.min_font_size = positive_size("min_font_size", size)?;
        }
        if let Some(size) = overlay.fallback_min_font_size {
            params.fallback_min_font_size = positive_size("fallback_min_font_size", size)?;
        }
        if let Some(size) = overlay.probe_font_size {
            params.probe_font_size = positive_size("probe_font_size", size)?;
        }
        if let Some(color) = overlay.fill_color {
            params.fill_color = ColorRgba::parse_hex(&color)?.with_alpha(params.fill_color.a);
        }
        if let Some(alpha) = overlay.fill_alpha {
            params.fill_color = params.fill_color.with_alpha(alpha);
        }
        if let Some(color) = overlay.text_color {
            params.text_color = ColorRgba::parse_hex(&color)?;
        }
        Ok(())
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("OLLAMA_API_URL") {
            self.ollama_url = url;
        }
        if let Some(model) = lookup("OLLAMA_MODEL")
            && self.provider.trim().eq_ignore_ascii_case("ollama")
        {
            self.model = Some(model);
        }
    }
}

fn positive_ratio(name: &str, value: f32) -> Result<f32> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(anyhow!("{} must be a positive number, got {}", name, value))
    }
}

fn positive_size(name: &str, value: u32) -> Result<u32> {
    if value > 0 {
        Ok(value)
    } else {
        Err(anyhow!("{} must be greater than zero", name))
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".inline-image-translator"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderKind;

    fn defaults() -> Settings {
        let mut settings = Settings::default();
        settings
            .merge(parse_settings(DEFAULT_SETTINGS_TOML).unwrap())
            .unwrap();
        settings
    }

    #[test]
    fn built_in_settings_match_reference_policy() {
        let settings = defaults();
        let overlay = &settings.overlay;
        let reference = OverlayParams::default();
        assert_eq!(overlay.mode, OverlayMode::Centered);
        assert_eq!(overlay.height_to_font_ratio, reference.height_to_font_ratio);
        assert_eq!(overlay.min_font_size, 12);
        assert_eq!(overlay.fallback_ratio, 0.6);
        assert_eq!(overlay.shrink_factor, 0.75);
        assert_eq!(overlay.fill_color, ColorRgba::rgb(255, 255, 255).with_alpha(191));
        assert_eq!(overlay.text_color, ColorRgba::rgb(255, 0, 0));
        assert_eq!(settings.fonts.candidates("Chinese")[0], "msyh.ttc");
        assert_eq!(settings.fonts.candidates("English")[0], "arial.ttf");
    }

    #[test]
    fn later_files_override_earlier_ones() {
        let mut settings = defaults();
        let local = r##"
            [overlay]
            mode = "legacy"
            fill_color = "#000"

            [fonts.languages]
            Arabic = ["Amiri"]

            [translation]
            provider = "openai"
            model = "gpt-4o-mini"
        "##;
        settings.merge(parse_settings(local).unwrap()).unwrap();
        assert_eq!(settings.overlay.mode, OverlayMode::Legacy);
        assert_eq!(settings.overlay.fill_color, ColorRgba::rgb(0, 0, 0).with_alpha(191));
        assert_eq!(settings.fonts.candidates("Arabic")[0], "Amiri");
        assert_eq!(settings.fonts.candidates("Chinese")[0], "msyh.ttc");

        let selection = settings.provider_selection(None).unwrap();
        assert_eq!(selection.provider, ProviderKind::OpenAI);
        assert_eq!(selection.requested_model.as_deref(), Some("gpt-4o-mini"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut settings = defaults();
        let err = settings
            .merge(parse_settings("[overlay]\nshrink_factor = 1.5\n").unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("shrink_factor"));
        assert!(
            settings
                .merge(parse_settings("[overlay]\nheight_to_font_ratio = 0.0\n").unwrap())
                .is_err()
        );
        assert!(
            settings
                .merge(parse_settings("[overlay]\ntext_color = \"red\"\n").unwrap())
                .is_err()
        );
        assert!(parse_settings("[overlay]\nmode = \"sideways\"\n").is_err());
    }

    #[test]
    fn environment_overrides_ollama_endpoint_and_model() {
        let mut settings = defaults();
        settings.apply_env(|key| match key {
            "OLLAMA_API_URL" => Some("http://gpu-box:11434/api/generate".to_string()),
            "OLLAMA_MODEL" => Some("llama3".to_string()),
            _ => None,
        });
        assert_eq!(settings.ollama_url, "http://gpu-box:11434/api/generate");
        let selection = settings.provider_selection(None).unwrap();
        assert_eq!(selection.provider, ProviderKind::Ollama);
        assert_eq!(selection.requested_model.as_deref(), Some("llama3"));
    }

    #[test]
    fn model_argument_wins_over_settings() {
        let settings = defaults();
        let selection = settings
            .provider_selection(Some("openai:gpt-4.1-mini"))
            .unwrap();
        assert_eq!(selection.provider, ProviderKind::OpenAI);
    }

    #[test]
    fn missing_extra_settings_file_is_an_error() {
        let err = load_settings(Some(Path::new("/nonexistent/settings.toml"))).unwrap_err();
        assert!(err.to_string().contains("settings file not found"));
    }
}
