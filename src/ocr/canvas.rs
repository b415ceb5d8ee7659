use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, RgbaImage};
use resvg::render;
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::{ColorU8, Paint, Pixmap, Rect, Transform};
use tracing::warn;
use usvg::{Options, Tree, fontdb};

use super::PointPx;
use super::font::{SelectedFont, ensure_sans_serif, resolves_sans_serif, system_fonts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RectPx {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl RectPx {
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn right(&self) -> i32 {
        self.x + self.w as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TextExtent {
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorRgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl ColorRgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Parses `#rrggbb` or `#rgb`.
    pub fn parse_hex(value: &str) -> Result<Self> {
        let raw = value.trim().trim_start_matches('#');
        let expanded = match raw.len() {
            3 => raw.chars().flat_map(|ch| [ch, ch]).collect::<String>(),
            6 => raw.to_string(),
            _ => return Err(anyhow!("invalid color '{}' (expected #rrggbb)", value)),
        };
        let channel = |idx: usize| {
            u8::from_str_radix(&expanded[idx..idx + 2], 16)
                .with_context(|| format!("invalid color '{}'", value))
        };
        Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Drawing surface the compositor paints on. Regions are drawn in call order,
/// so later calls cover earlier ones where they overlap.
pub trait Canvas {
    fn dimensions(&self) -> (u32, u32);

    fn fill_rect(&mut self, rect: RectPx, color: ColorRgba);

    fn measure_text(&self, text: &str, font: &SelectedFont) -> TextExtent {
        TextExtent {
            width: font.text_width(text).round() as i32,
            height: font.text_height().round() as i32,
        }
    }

    /// Draws `text` with its top-left corner at `origin`.
    fn draw_text(&mut self, origin: PointPx, text: &str, font: &SelectedFont, color: ColorRgba);
}

pub struct PixmapCanvas {
    pixmap: Pixmap,
    fontdb: Arc<fontdb::Database>,
    loaded_fonts: HashSet<String>,
}

impl PixmapCanvas {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).with_context(|| "failed to decode image")?;
        Self::from_image(&image)
    }

    pub fn from_image(image: &DynamicImage) -> Result<Self> {
        Self::with_font_database(image, system_fonts())
    }

    /// Draws text with faces from `fontdb`. The generic `sans-serif` family,
    /// used for the fallback font, is pointed at an installed face if needed.
    pub fn with_font_database(
        image: &DynamicImage,
        mut fontdb: Arc<fontdb::Database>,
    ) -> Result<Self> {
        if !resolves_sans_serif(&fontdb) {
            ensure_sans_serif(Arc::make_mut(&mut fontdb));
        }
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut pixmap =
            Pixmap::new(width, height).ok_or_else(|| anyhow!("image has an empty size"))?;
        for (dst, src) in pixmap.pixels_mut().iter_mut().zip(rgba.pixels()) {
            let [r, g, b, a] = src.0;
            *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
        }
        Ok(Self {
            pixmap,
            fontdb,
            loaded_fonts: HashSet::new(),
        })
    }

    pub fn to_rgba_image(&self) -> Result<RgbaImage> {
        let mut data = Vec::with_capacity(self.pixmap.data().len());
        for pixel in self.pixmap.pixels() {
            let color = pixel.demultiply();
            data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
        }
        RgbaImage::from_raw(self.pixmap.width(), self.pixmap.height(), data)
            .ok_or_else(|| anyhow!("failed to build image buffer from canvas"))
    }

    pub fn encode(&self, output_mime: &str) -> Result<Vec<u8>> {
        encode_image(&self.to_rgba_image()?, output_mime)
    }

    fn register_font(&mut self, font: &SelectedFont) {
        let Some(metrics) = font.metrics.as_ref() else {
            return;
        };
        let Some(family) = metrics.family() else {
            return;
        };
        if self.loaded_fonts.insert(family.to_string()) {
            Arc::make_mut(&mut self.fontdb).load_font_data(metrics.data().to_vec());
        }
    }
}

impl Canvas for PixmapCanvas {
    fn dimensions(&self) -> (u32, u32) {
        (self.pixmap.width(), self.pixmap.height())
    }

    fn fill_rect(&mut self, rect: RectPx, color: ColorRgba) {
        if rect.is_empty() {
            return;
        }
        let Some(area) = Rect::from_xywh(rect.x as f32, rect.y as f32, rect.w as f32, rect.h as f32)
        else {
            return;
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(color.r, color.g, color.b, color.a);
        paint.anti_alias = false;
        self.pixmap
            .fill_rect(area, &paint, Transform::identity(), None);
    }

    fn draw_text(&mut self, origin: PointPx, text: &str, font: &SelectedFont, color: ColorRgba) {
        if text.trim().is_empty() || font.size == 0 {
            return;
        }
        self.register_font(font);
        let family = match font.family() {
            Some(family) => family,
            None if resolves_sans_serif(&self.fontdb) => "sans-serif",
            None => {
                warn!("no font available to draw '{}'", text);
                return;
            }
        };
        let (width, height) = self.dimensions();
        let svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><text x="{x}" y="{y}" font-size="{size}" font-family="{family}" fill="{fill}" fill-opacity="{opacity}" xml:space="preserve">{text}</text></svg>"#,
            w = width,
            h = height,
            x = origin.x,
            y = origin.y as f32 + font.ascent(),
            size = font.size,
            family = escape_xml(family),
            fill = color.hex(),
            opacity = color.a as f32 / 255.0,
            text = escape_xml(text)
        );
        let options = Options {
            fontdb: self.fontdb.clone(),
            ..Options::default()
        };
        match Tree::from_str(&svg, &options) {
            Ok(tree) => {
                let mut pixmap_mut = self.pixmap.as_mut();
                render(&tree, Transform::identity(), &mut pixmap_mut);
            }
            Err(err) => warn!("failed to lay out overlay text '{}': {}", text, err),
        }
    }
}

pub fn encode_image(image: &RgbaImage, output_mime: &str) -> Result<Vec<u8>> {
    let format = image_format_from_mime(output_mime)
        .ok_or_else(|| anyhow!("unsupported output image mime '{}'", output_mime))?;
    let dynamic = if format == image::ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image.clone()).to_rgb8())
    } else {
        DynamicImage::ImageRgba8(image.clone())
    };
    let mut bytes = Vec::new();
    let mut cursor = Cursor::new(&mut bytes);
    dynamic
        .write_to(&mut cursor, format)
        .with_context(|| "failed to encode output image")?;
    Ok(bytes)
}

fn image_format_from_mime(mime: &str) -> Option<image::ImageFormat> {
    match mime {
        "image/png" => Some(image::ImageFormat::Png),
        "image/jpeg" => Some(image::ImageFormat::Jpeg),
        "image/jpg" => Some(image::ImageFormat::Jpeg),
        "image/gif" => Some(image::ImageFormat::Gif),
        "image/webp" => Some(image::ImageFormat::WebP),
        "image/bmp" => Some(image::ImageFormat::Bmp),
        "image/tiff" => Some(image::ImageFormat::Tiff),
        _ => None,
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn black_canvas(width: u32, height: u32) -> PixmapCanvas {
        let image = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
        PixmapCanvas::from_image(&DynamicImage::ImageRgba8(image)).unwrap()
    }

    #[test]
    fn parses_short_and_long_hex_colors() {
        assert_eq!(
            ColorRgba::parse_hex("#ff0000").unwrap(),
            ColorRgba::rgb(255, 0, 0)
        );
        assert_eq!(ColorRgba::parse_hex("fff").unwrap(), ColorRgba::rgb(255, 255, 255));
        assert!(ColorRgba::parse_hex("#12345").is_err());
        assert!(ColorRgba::parse_hex("#gg0000").is_err());
        assert_eq!(ColorRgba::rgb(196, 0, 10).hex(), "#c4000a");
    }

    #[test]
    fn opaque_fill_covers_only_the_rect() {
        let mut canvas = black_canvas(6, 6);
        canvas.fill_rect(
            RectPx {
                x: 1,
                y: 1,
                w: 2,
                h: 2,
            },
            ColorRgba::rgb(255, 255, 255),
        );
        let image = canvas.to_rgba_image().unwrap();
        assert_eq!(image.get_pixel(1, 1).0, [255, 255, 255, 255]);
        assert_eq!(image.get_pixel(2, 2).0, [255, 255, 255, 255]);
        assert_eq!(image.get_pixel(3, 3).0, [0, 0, 0, 255]);
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn translucent_fill_blends_with_the_background() {
        let mut canvas = black_canvas(4, 4);
        canvas.fill_rect(
            RectPx {
                x: 0,
                y: 0,
                w: 4,
                h: 4,
            },
            ColorRgba::rgb(255, 255, 255).with_alpha(191),
        );
        let pixel = canvas.to_rgba_image().unwrap().get_pixel(2, 2).0;
        assert!((188..=194).contains(&pixel[0]), "got {:?}", pixel);
        assert_eq!(pixel[3], 255);
    }

    #[test]
    fn empty_and_offscreen_fills_are_noops() {
        let mut canvas = black_canvas(4, 4);
        let white = ColorRgba::rgb(255, 255, 255);
        canvas.fill_rect(
            RectPx {
                x: 1,
                y: 1,
                w: 0,
                h: 3,
            },
            white,
        );
        canvas.fill_rect(
            RectPx {
                x: -10,
                y: -10,
                w: 3,
                h: 3,
            },
            white,
        );
        let image = canvas.to_rgba_image().unwrap();
        assert!(image.pixels().all(|pixel| pixel.0 == [0, 0, 0, 255]));
    }

    fn red_pixels(canvas: &PixmapCanvas) -> usize {
        canvas
            .to_rgba_image()
            .unwrap()
            .pixels()
            .filter(|pixel| pixel.0[0] >= 200 && pixel.0[1] <= 80 && pixel.0[2] <= 80)
            .count()
    }

    fn black_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])))
    }

    #[test]
    fn fallback_font_still_draws_text() {
        if system_fonts().faces().next().is_none() {
            return;
        }
        let mut canvas = black_canvas(400, 120);
        canvas.draw_text(
            PointPx { x: 10, y: 20 },
            "bonjour monde",
            &SelectedFont::fallback(60),
            ColorRgba::rgb(255, 0, 0),
        );
        assert!(red_pixels(&canvas) > 0);
    }

    #[test]
    fn fallback_draws_when_default_sans_serif_is_not_installed() {
        let mut db = (*system_fonts()).clone();
        if db.faces().next().is_none() {
            return;
        }
        db.set_sans_serif_family("No Such Family");
        let mut canvas = PixmapCanvas::with_font_database(&black_image(400, 120), Arc::new(db))
            .unwrap();
        canvas.draw_text(
            PointPx { x: 10, y: 20 },
            "bonjour monde",
            &SelectedFont::fallback(60),
            ColorRgba::rgb(255, 0, 0),
        );
        assert!(red_pixels(&canvas) > 0);
    }

    #[test]
    fn empty_font_database_skips_text() {
        let mut canvas = PixmapCanvas::with_font_database(
            &black_image(40, 20),
            Arc::new(fontdb::Database::new()),
        )
        .unwrap();
        canvas.draw_text(
            PointPx { x: 0, y: 0 },
            "hi",
            &SelectedFont::fallback(12),
            ColorRgba::rgb(255, 0, 0),
        );
        assert_eq!(red_pixels(&canvas), 0);
    }

    #[test]
    fn encodes_png_and_rejects_unknown_mime() {
        let canvas = black_canvas(3, 2);
        let bytes = canvas.encode("image/png").unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
        assert!(canvas.encode("application/pdf").is_err());
    }
}
