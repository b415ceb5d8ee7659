use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "inline-image-translator",
    version,
    about = "Overlay word-by-word translations onto the text of an image"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings", global = true)]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate a single image file
    Translate {
        /// Image to translate
        #[arg(short = 'i', long = "input")]
        input: String,

        /// Where to write the translated image
        #[arg(short = 'o', long = "output")]
        output: String,

        /// Target language (Chinese, Arabic, French, German, English)
        #[arg(short = 'l', long = "lang", default_value = "English")]
        lang: String,

        /// Model name or provider:model (e.g. ollama:aya:latest)
        #[arg(short = 'm', long = "model")]
        model: Option<String>,

        /// API key (overrides environment variables)
        #[arg(short = 'k', long = "key")]
        key: Option<String>,

        /// Overlay presentation: centered or legacy
        #[arg(long = "mode")]
        mode: Option<String>,

        /// JSON file with pre-recognized regions (skips OCR)
        #[arg(long = "regions")]
        regions: Option<String>,
    },
    /// Serve the upload form over HTTP
    Serve {
        /// Listen address (defaults to [server] addr in settings)
        #[arg(short = 'a', long = "addr")]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    inline_image_translator::logging::init(cli.verbose)?;

    match cli.command {
        Command::Translate {
            input,
            output,
            lang,
            model,
            key,
            mode,
            regions,
        } => {
            let image_bytes =
                fs::read(&input).with_context(|| format!("failed to read image: {}", input))?;
            let result = inline_image_translator::run(
                inline_image_translator::Config {
                    lang,
                    model,
                    key,
                    mode,
                    regions_path: regions,
                    settings_path: cli.read_settings,
                    output_mime: output_mime_for(Path::new(&output)).to_string(),
                },
                image_bytes,
            )
            .await?;
            for warning in &result.warnings {
                eprintln!("warning: {}", warning);
            }
            fs::write(&output, &result.bytes)
                .with_context(|| format!("failed to write image: {}", output))?;
            println!("{}", output);
        }
        Command::Serve { addr } => {
            let settings = inline_image_translator::settings::load_settings(
                cli.read_settings.as_deref().map(Path::new),
            )?;
            let addr = addr.unwrap_or_else(|| settings.server_addr.clone());
            inline_image_translator::run_server(settings, addr).await?;
        }
    }
    Ok(())
}

fn output_mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "gif" => "image/gif",
        _ => inline_image_translator::DEFAULT_OUTPUT_MIME,
    }
}
