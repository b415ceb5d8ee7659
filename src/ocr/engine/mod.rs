mod parse;
mod tesseract;

use anyhow::{Context, Result};
use image::GenericImageView;
use std::io::Write;
use tracing::debug;

use crate::ocr::OcrResult;

pub use tesseract::list_tesseract_languages;

const PAGE_SEGMENTATION_MODE: u32 = 3;

/// Runs tesseract over the image and returns one region per recognized line,
/// in reading order.
pub fn extract_regions(image_bytes: &[u8], ocr_languages: &str) -> Result<OcrResult> {
    let image =
        image::load_from_memory(image_bytes).with_context(|| "failed to decode image for OCR")?;
    let (width, height) = image.dimensions();
    let languages = tesseract::normalize_ocr_languages(ocr_languages)?;

    let mut tmp = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .with_context(|| "failed to create temp file for OCR")?;
    image
        .write_to(&mut tmp, image::ImageFormat::Png)
        .with_context(|| "failed to write temp image for OCR")?;
    tmp.flush().ok();

    let tsv = tesseract::run_tesseract_tsv(tmp.path(), &languages, PAGE_SEGMENTATION_MODE)?;
    let mut regions = parse::parse_tsv_regions(&tsv);
    regions.sort_by_key(|region| {
        let top_left = region.bbox.top_left();
        (top_left.y, top_left.x)
    });
    debug!(
        "tesseract ({}) found {} region(s) in {}x{} image",
        languages,
        regions.len(),
        width,
        height
    );

    Ok(OcrResult {
        width,
        height,
        regions,
    })
}
