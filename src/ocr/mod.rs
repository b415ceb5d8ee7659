mod canvas;
mod engine;
mod font;
mod render;

pub use canvas::{Canvas, ColorRgba, PixmapCanvas, RectPx, TextExtent, encode_image};
pub use engine::{extract_regions, list_tesseract_languages};
pub use font::{
    FontCatalog, FontMetrics, FontSelector, SelectedFont, load_font_metrics, system_fonts,
};
pub use render::{
    Compositor, OverlayMode, OverlayParams, OverlayReport, OverlayWarning, RenderPlan, plan_region,
};

/// Serialized as `[x, y]`, the shape OCR engines emit for box corners.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<[f32; 2]> for Point {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f32; 2] {
    fn from(point: Point) -> Self {
        [point.x, point.y]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PointPx {
    pub x: i32,
    pub y: i32,
}

/// Four corners in pixel coordinates, clockwise from the top-left corner.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct BoundingBox(pub [Point; 4]);

impl BoundingBox {
    pub fn from_rect(x: u32, y: u32, w: u32, h: u32) -> Self {
        let (x0, y0) = (x as f32, y as f32);
        let (x1, y1) = ((x + w) as f32, (y + h) as f32);
        Self([
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ])
    }

    /// Corner 0 truncated to whole pixels.
    pub fn top_left(&self) -> PointPx {
        PointPx {
            x: self.0[0].x as i32,
            y: self.0[0].y as i32,
        }
    }

    /// Corner 2 truncated to whole pixels.
    pub fn bottom_right(&self) -> PointPx {
        PointPx {
            x: self.0[2].x as i32,
            y: self.0[2].y as i32,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TextRegion {
    pub bbox: BoundingBox,
    pub text: String,
    #[serde(default)]
    pub confidence: f32,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TranslatedRegion {
    pub bbox: BoundingBox,
    pub words: Vec<String>,
}

impl TranslatedRegion {
    pub fn translated_text(&self) -> String {
        self.words.join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct OcrResult {
    pub width: u32,
    pub height: u32,
    pub regions: Vec<TextRegion>,
}
