use std::str::FromStr;

use anyhow::{Result, anyhow};
use tracing::{debug, warn};

use super::canvas::{Canvas, ColorRgba, RectPx, TextExtent};
use super::font::{FontSelector, SelectedFont};
use super::{BoundingBox, PointPx, TranslatedRegion};

/// How the background patch and text are positioned inside a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayMode {
    /// Translucent patch shrunk by `shrink_factor` and centered in the box,
    /// text centered in the patch.
    #[default]
    Centered,
    /// Opaque patch covering the whole box, text anchored at the top-left.
    Legacy,
}

impl OverlayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayMode::Centered => "centered",
            OverlayMode::Legacy => "legacy",
        }
    }
}

impl FromStr for OverlayMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "centered" | "centre" | "center" => Ok(OverlayMode::Centered),
            "legacy" => Ok(OverlayMode::Legacy),
            other => Err(anyhow!(
                "unknown overlay mode '{}' (expected centered or legacy)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverlayParams {
    pub mode: OverlayMode,
    pub height_to_font_ratio: f32,
    pub min_font_size: u32,
    pub fallback_ratio: f32,
    pub fallback_min_font_size: u32,
    pub probe_font_size: u32,
    pub shrink_factor: f32,
    pub fill_color: ColorRgba,
    pub text_color: ColorRgba,
}

impl Default for OverlayParams {
    fn default() -> Self {
        Self {
            mode: OverlayMode::Centered,
            height_to_font_ratio: 0.8,
            min_font_size: 12,
            fallback_ratio: 0.6,
            fallback_min_font_size: 10,
            probe_font_size: 20,
            shrink_factor: 0.75,
            fill_color: ColorRgba::rgb(255, 255, 255).with_alpha(191),
            text_color: ColorRgba::rgb(255, 0, 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RenderPlan {
    pub font_size: u32,
    pub background: RectPx,
    pub text_origin: PointPx,
    pub text_extent: TextExtent,
}

/// Non-fatal degradations collected while translating and compositing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OverlayWarning {
    #[error("no font found for {language}; using the built-in fallback font, appearance may differ")]
    FontUnavailable { language: String },
    #[error("translation unavailable for '{word}', keeping the original word ({reason})")]
    TranslationUnavailable { word: String, reason: String },
    #[error("region {index} has a degenerate box ({width}x{height})")]
    DegenerateRegion {
        index: usize,
        width: i32,
        height: i32,
    },
}

#[derive(Debug, Clone, Default)]
pub struct OverlayReport {
    pub plans: Vec<RenderPlan>,
    pub warnings: Vec<OverlayWarning>,
}

/// Font size for a region of `height` pixels. The fallback font uses its own
/// ratio and floor.
pub(crate) fn font_size_for_height(height: i32, params: &OverlayParams, fallback: bool) -> u32 {
    let height = height.max(0) as f32;
    if fallback {
        let size = (height * params.fallback_ratio).floor() as u32;
        size.max(params.fallback_min_font_size)
    } else {
        let size = (height * params.height_to_font_ratio).floor() as u32;
        size.max(params.min_font_size)
    }
}

fn box_extent(bbox: &BoundingBox) -> (PointPx, i32, i32) {
    let top_left = bbox.top_left();
    let bottom_right = bbox.bottom_right();
    (
        top_left,
        bottom_right.x - top_left.x,
        bottom_right.y - top_left.y,
    )
}

/// Computes where the patch and text go for one region. `font` must already
/// be sized for the region.
pub fn plan_region<C: Canvas + ?Sized>(
    canvas: &C,
    bbox: &BoundingBox,
    text: &str,
    font: &SelectedFont,
    params: &OverlayParams,
) -> RenderPlan {
    let (top_left, width, height) = box_extent(bbox);
    let width = width.max(0);
    let height = height.max(0);
    let extent = canvas.measure_text(text, font);

    let (background, text_origin) = match params.mode {
        OverlayMode::Centered => {
            let shrink = params.shrink_factor.clamp(0.0, 1.0);
            let bg_w = ((width as f32 * shrink).floor() as i32).clamp(0, width);
            let bg_h = ((height as f32 * shrink).floor() as i32).clamp(0, height);
            let bg_x = top_left.x + (width - bg_w).div_euclid(2);
            let bg_y = top_left.y + (height - bg_h).div_euclid(2);
            let origin = PointPx {
                x: bg_x + (bg_w - extent.width).div_euclid(2),
                y: bg_y + (bg_h - extent.height).div_euclid(2),
            };
            let rect = RectPx {
                x: bg_x,
                y: bg_y,
                w: bg_w as u32,
                h: bg_h as u32,
            };
            (rect, origin)
        }
        OverlayMode::Legacy => {
            let rect = RectPx {
                x: top_left.x,
                y: top_left.y,
                w: width as u32,
                h: height as u32,
            };
            (rect, top_left)
        }
    };

    RenderPlan {
        font_size: font.size,
        background,
        text_origin,
        text_extent: extent,
    }
}

pub struct Compositor {
    params: OverlayParams,
    fonts: FontSelector,
}

impl Compositor {
    pub fn new(params: OverlayParams, fonts: FontSelector) -> Self {
        Self { params, fonts }
    }

    pub fn params(&self) -> &OverlayParams {
        &self.params
    }

    /// Paints every region onto `canvas` in order. The canvas is mutated in
    /// place; nothing here aborts the image.
    pub fn overlay<C: Canvas + ?Sized>(
        &mut self,
        canvas: &mut C,
        regions: &[TranslatedRegion],
        language: &str,
    ) -> OverlayReport {
        let mut report = OverlayReport::default();
        let probe = self.fonts.select(language, self.params.probe_font_size);
        if probe.is_fallback() {
            warn!(
                "no scalable font found for {}; using the fallback font",
                language
            );
            report.warnings.push(OverlayWarning::FontUnavailable {
                language: language.to_string(),
            });
        }

        let fill = match self.params.mode {
            OverlayMode::Centered => self.params.fill_color,
            OverlayMode::Legacy => self.params.fill_color.with_alpha(255),
        };

        for (index, region) in regions.iter().enumerate() {
            let text = region.translated_text();
            let (_, width, height) = box_extent(&region.bbox);
            if width <= 0 || height <= 0 {
                debug!("region {} is degenerate ({}x{})", index, width, height);
                report.warnings.push(OverlayWarning::DegenerateRegion {
                    index,
                    width,
                    height,
                });
            }

            let font = self.sized_font(language, height);
            let plan = plan_region(&*canvas, &region.bbox, &text, &font, &self.params);
            debug!(
                "region {}: font {}px, patch {}x{} at ({}, {}), text at ({}, {})",
                index,
                plan.font_size,
                plan.background.w,
                plan.background.h,
                plan.background.x,
                plan.background.y,
                plan.text_origin.x,
                plan.text_origin.y
            );
            canvas.fill_rect(plan.background, fill);
            canvas.draw_text(plan.text_origin, &text, &font, self.params.text_color);
            report.plans.push(plan);
        }
        report
    }

    fn sized_font(&mut self, language: &str, height: i32) -> SelectedFont {
        let size = font_size_for_height(height, &self.params, false);
        let font = self.fonts.select(language, size);
        if font.is_fallback() {
            return SelectedFont::fallback(font_size_for_height(height, &self.params, true));
        }
        font
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{FontCatalog, Point};
    use insta::assert_json_snapshot;
    use std::path::PathBuf;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Fill(RectPx, ColorRgba),
        Text(PointPx, String, u32),
    }

    #[derive(Default)]
    struct RecordingCanvas {
        ops: Vec<Op>,
    }

    impl Canvas for RecordingCanvas {
        fn dimensions(&self) -> (u32, u32) {
            (640, 480)
        }

        fn fill_rect(&mut self, rect: RectPx, color: ColorRgba) {
            self.ops.push(Op::Fill(rect, color));
        }

        fn measure_text(&self, text: &str, font: &SelectedFont) -> TextExtent {
            TextExtent {
                width: (text.chars().count() as u32 * font.size / 2) as i32,
                height: font.size as i32,
            }
        }

        fn draw_text(&mut self, origin: PointPx, text: &str, font: &SelectedFont, _color: ColorRgba) {
            self.ops.push(Op::Text(origin, text.to_string(), font.size));
        }
    }

    fn quad(x0: f32, y0: f32, x1: f32, y1: f32) -> BoundingBox {
        BoundingBox([
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ])
    }

    fn no_fonts() -> FontSelector {
        FontSelector::new(FontCatalog {
            dirs: vec![PathBuf::from("/nonexistent-font-dir")],
            default: vec!["missing-latin.ttf".to_string()],
            languages: Default::default(),
        })
    }

    #[test]
    fn font_size_follows_height_with_floors() {
        let params = OverlayParams::default();
        assert_eq!(font_size_for_height(30, &params, false), 24);
        assert_eq!(font_size_for_height(10, &params, false), 12);
        assert_eq!(font_size_for_height(0, &params, false), 12);
        assert_eq!(font_size_for_height(-7, &params, false), 12);
        assert_eq!(font_size_for_height(30, &params, true), 18);
        assert_eq!(font_size_for_height(5, &params, true), 10);
    }

    #[test]
    fn centered_plan_matches_reference_geometry() {
        let canvas = RecordingCanvas::default();
        let params = OverlayParams::default();
        let font = SelectedFont::fallback(24);
        let plan = plan_region(
            &canvas,
            &quad(10.0, 10.0, 110.0, 40.0),
            "bonjour monde",
            &font,
            &params,
        );
        assert_json_snapshot!(plan, @r###"
        {
          "font_size": 24,
          "background": {
            "x": 22,
            "y": 14,
            "w": 75,
            "h": 22
          },
          "text_origin": {
            "x": -19,
            "y": 13
          },
          "text_extent": {
            "width": 156,
            "height": 24
          }
        }
        "###);
    }

    #[test]
    fn background_stays_inside_box_and_text_is_centered() {
        let canvas = RecordingCanvas::default();
        let params = OverlayParams::default();
        let boxes = [
            quad(0.0, 0.0, 1.0, 1.0),
            quad(3.0, 7.0, 120.0, 19.0),
            quad(50.5, 20.2, 91.9, 77.7),
            quad(10.0, 10.0, 311.0, 13.0),
        ];
        for bbox in &boxes {
            for text in ["a", "hola", "a much longer sentence than the box"] {
                let font = SelectedFont::fallback(14);
                let plan = plan_region(&canvas, bbox, text, &font, &params);
                let tl = bbox.top_left();
                let br = bbox.bottom_right();
                let bg = plan.background;
                assert!(bg.x >= tl.x && bg.y >= tl.y, "{:?} {:?}", bg, bbox);
                assert!(bg.right() <= br.x && bg.bottom() <= br.y, "{:?} {:?}", bg, bbox);

                let left = plan.text_origin.x - bg.x;
                let right = bg.right() - (plan.text_origin.x + plan.text_extent.width);
                assert!((left - right).abs() <= 1, "{} vs {}", left, right);
                let top = plan.text_origin.y - bg.y;
                let bottom = bg.bottom() - (plan.text_origin.y + plan.text_extent.height);
                assert!((top - bottom).abs() <= 1, "{} vs {}", top, bottom);
            }
        }
    }

    #[test]
    fn legacy_plan_covers_full_box_from_top_left() {
        let canvas = RecordingCanvas::default();
        let params = OverlayParams {
            mode: OverlayMode::Legacy,
            ..OverlayParams::default()
        };
        let plan = plan_region(
            &canvas,
            &quad(10.0, 10.0, 110.0, 40.0),
            "bonjour",
            &SelectedFont::fallback(24),
            &params,
        );
        assert_eq!(
            plan.background,
            RectPx {
                x: 10,
                y: 10,
                w: 100,
                h: 30
            }
        );
        assert_eq!(plan.text_origin, PointPx { x: 10, y: 10 });
    }

    #[test]
    fn overlay_draws_patch_then_text_in_region_order() {
        let mut canvas = RecordingCanvas::default();
        let mut compositor = Compositor::new(OverlayParams::default(), no_fonts());
        let regions = vec![
            TranslatedRegion {
                bbox: quad(10.0, 10.0, 110.0, 40.0),
                words: vec!["bonjour".into(), "monde".into()],
            },
            TranslatedRegion {
                bbox: quad(20.0, 20.0, 60.0, 40.0),
                words: vec!["salut".into()],
            },
        ];
        let report = compositor.overlay(&mut canvas, &regions, "French");

        assert_eq!(report.plans.len(), 2);
        assert_eq!(canvas.ops.len(), 4);
        assert!(matches!(canvas.ops[0], Op::Fill(_, color) if color.a == 191));
        assert_eq!(
            canvas.ops[1],
            Op::Text(report.plans[0].text_origin, "bonjour monde".to_string(), 18)
        );
        assert!(matches!(&canvas.ops[3], Op::Text(_, text, _) if text == "salut"));
        assert_eq!(
            report.warnings,
            vec![OverlayWarning::FontUnavailable {
                language: "French".to_string()
            }]
        );
    }

    #[test]
    fn zero_height_region_is_tolerated() {
        let mut canvas = RecordingCanvas::default();
        let mut compositor = Compositor::new(OverlayParams::default(), no_fonts());
        let regions = vec![TranslatedRegion {
            bbox: quad(10.0, 20.0, 90.0, 20.0),
            words: vec!["vide".into()],
        }];
        let report = compositor.overlay(&mut canvas, &regions, "French");
        let plan = &report.plans[0];
        assert_eq!(plan.background.h, 0);
        assert!(plan.background.is_empty());
        assert_eq!(plan.font_size, 10);
        assert!(report.warnings.contains(&OverlayWarning::DegenerateRegion {
            index: 0,
            width: 80,
            height: 0
        }));
    }

    #[test]
    fn overlay_mode_parses_names() {
        assert_eq!("Centered".parse::<OverlayMode>().unwrap(), OverlayMode::Centered);
        assert_eq!(" legacy ".parse::<OverlayMode>().unwrap(), OverlayMode::Legacy);
        assert!("sideways".parse::<OverlayMode>().is_err());
    }
}
