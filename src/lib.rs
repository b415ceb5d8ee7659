use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::Path;
use tracing::info;

pub mod languages;
pub mod logging;
pub mod ocr;
pub mod providers;
mod server;
pub mod settings;
mod translator;

pub use languages::TargetLanguage;
pub use ocr::{
    BoundingBox, Canvas, Compositor, FontSelector, OverlayMode, OverlayParams, OverlayReport,
    OverlayWarning, PixmapCanvas, Point, RenderPlan, TextRegion, TranslatedRegion,
};
pub use providers::{Ollama, OpenAI, ProviderImpl, ProviderKind, WordTranslator};
pub use server::run_server;
pub use settings::Settings;
pub use translator::{TranslationReport, Translator};

pub const DEFAULT_OUTPUT_MIME: &str = "image/png";

#[derive(Debug, Clone)]
pub struct Config {
    pub lang: String,
    pub model: Option<String>,
    pub key: Option<String>,
    pub mode: Option<String>,
    pub regions_path: Option<String>,
    pub settings_path: Option<String>,
    pub output_mime: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lang: TargetLanguage::English.name().to_string(),
            model: None,
            key: None,
            mode: None,
            regions_path: None,
            settings_path: None,
            output_mime: DEFAULT_OUTPUT_MIME.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageOutput {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub regions: Vec<TranslatedRegion>,
    pub warnings: Vec<OverlayWarning>,
}

/// Translates one image end to end with settings resolved from `config`.
pub async fn run(config: Config, image_bytes: Vec<u8>) -> Result<ImageOutput> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(mode) = config.mode.as_deref() {
        settings.overlay.mode = mode.parse()?;
    }
    let language: TargetLanguage = config.lang.parse()?;

    let selection = settings.provider_selection(config.model.as_deref())?;
    let provider =
        providers::build_provider(&selection, &settings.ollama_url, config.key.as_deref())?;

    let regions = match config.regions_path.as_deref() {
        Some(path) => Some(load_regions(Path::new(path))?),
        None => None,
    };

    translate_image(
        provider,
        &settings,
        &image_bytes,
        regions,
        language,
        &config.output_mime,
    )
    .await
}

/// Runs the pipeline on raw image bytes: recognize (unless `regions` is
/// given), translate word by word, paint the overlay, and encode.
pub async fn translate_image<T: WordTranslator>(
    backend: T,
    settings: &Settings,
    image_bytes: &[u8],
    regions: Option<Vec<TextRegion>>,
    language: TargetLanguage,
    output_mime: &str,
) -> Result<ImageOutput> {
    let mut canvas = PixmapCanvas::decode(image_bytes)?;
    let regions = match regions {
        Some(regions) => regions,
        None => recognize(image_bytes.to_vec(), language).await?,
    };
    info!(
        "translating {} region(s) to {} using {} mode",
        regions.len(),
        language,
        settings.overlay.mode.as_str()
    );

    let mut translator = Translator::new(backend);
    let translation = translator
        .translate_regions(&regions, language.name())
        .await;

    let mut compositor = Compositor::new(
        settings.overlay.clone(),
        FontSelector::new(settings.fonts.clone()),
    );
    let overlay = compositor.overlay(&mut canvas, &translation.regions, language.name());

    let bytes = canvas
        .encode(output_mime)
        .with_context(|| "failed to encode translated image")?;
    let mut warnings = translation.warnings;
    warnings.extend(overlay.warnings);
    Ok(ImageOutput {
        bytes,
        mime: output_mime.to_string(),
        regions: translation.regions,
        warnings,
    })
}

async fn recognize(image_bytes: Vec<u8>, language: TargetLanguage) -> Result<Vec<TextRegion>> {
    let result = tokio::task::spawn_blocking(move || {
        ocr::extract_regions(&image_bytes, language.ocr_languages())
    })
    .await
    .map_err(|err| anyhow!("OCR task failed: {}", err))??;
    Ok(result.regions)
}

/// Reads pre-recognized regions: a JSON array of `{bbox, text, confidence}`.
pub fn load_regions(path: &Path) -> Result<Vec<TextRegion>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read regions: {}", path.display()))?;
    parse_regions(&content).with_context(|| format!("failed to parse regions: {}", path.display()))
}

pub fn parse_regions(json: &str) -> Result<Vec<TextRegion>> {
    Ok(serde_json::from_str(json)?)
}
