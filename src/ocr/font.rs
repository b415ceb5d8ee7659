use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

const FONT_FILE_EXTENSIONS: &[&str] = &["ttf", "ttc", "otf", "otc"];

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    descender: i16,
    family: Option<String>,
    face_index: u32,
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("face_index", &self.face_index)
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn scale(&self, font_size: f32) -> f32 {
        font_size / self.units_per_em.max(1) as f32
    }

    pub(crate) fn ascent_px(&self, font_size: f32) -> f32 {
        self.ascender as f32 * self.scale(font_size)
    }

    pub(crate) fn line_height_px(&self, font_size: f32) -> f32 {
        (self.ascender as f32 - self.descender as f32) * self.scale(font_size)
    }
}

/// Installed system fonts, scanned once per process and shared by every
/// selector and canvas.
pub fn system_fonts() -> Arc<fontdb::Database> {
    static SYSTEM_FONTS: OnceLock<Arc<fontdb::Database>> = OnceLock::new();
    SYSTEM_FONTS
        .get_or_init(|| {
            let mut db = fontdb::Database::new();
            db.load_system_fonts();
            debug!("loaded {} system font face(s)", db.len());
            ensure_sans_serif(&mut db);
            Arc::new(db)
        })
        .clone()
}

pub(crate) fn resolves_sans_serif(db: &fontdb::Database) -> bool {
    let query = fontdb::Query {
        families: &[fontdb::Family::SansSerif],
        ..Default::default()
    };
    db.query(&query).is_some()
}

/// Points the generic `sans-serif` family at an installed face when the
/// platform default (`Arial`) is missing. Returns `false` for an empty
/// database.
pub(crate) fn ensure_sans_serif(db: &mut fontdb::Database) -> bool {
    if resolves_sans_serif(db) {
        return true;
    }
    let family = db
        .faces()
        .find_map(|face| face.families.first().map(|(name, _)| name.clone()));
    match family {
        Some(family) => {
            debug!("sans-serif resolves to '{}'", family);
            db.set_sans_serif_family(family);
            true
        }
        None => {
            warn!("no fonts installed; overlay text cannot be drawn");
            false
        }
    }
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

/// Prioritized font candidates per target language.
///
/// Entries that look like file names (`arial.ttf`, `msyh.ttc`) are looked up
/// as paths and inside `dirs`; anything else is a family name queried from the
/// system font database. Every list implicitly ends with the built-in fallback.
#[derive(Debug, Clone, Default)]
pub struct FontCatalog {
    pub dirs: Vec<PathBuf>,
    pub default: Vec<String>,
    pub languages: HashMap<String, Vec<String>>,
}

impl FontCatalog {
    pub fn candidates(&self, language: &str) -> Vec<&str> {
        let key = language.trim().to_lowercase();
        let mut list: Vec<&str> = self
            .languages
            .iter()
            .filter(|(name, _)| name.to_lowercase() == key)
            .flat_map(|(_, fonts)| fonts.iter().map(String::as_str))
            .collect();
        for font in &self.default {
            if !list.contains(&font.as_str()) {
                list.push(font);
            }
        }
        list
    }
}

/// A font resolved for one region at its final size. `metrics` is `None` when
/// no scalable font could be loaded and the built-in fallback is in use.
#[derive(Debug, Clone)]
pub struct SelectedFont {
    pub metrics: Option<FontMetrics>,
    pub size: u32,
}

impl SelectedFont {
    pub fn fallback(size: u32) -> Self {
        Self {
            metrics: None,
            size,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.metrics.is_none()
    }

    pub fn family(&self) -> Option<&str> {
        self.metrics.as_ref().and_then(|m| m.family())
    }

    pub fn text_width(&self, text: &str) -> f32 {
        measure_text_width_px(text, self.size as f32, self.metrics.as_ref())
    }

    pub fn text_height(&self) -> f32 {
        match &self.metrics {
            Some(metrics) => metrics.line_height_px(self.size as f32),
            None => self.size as f32,
        }
    }

    /// Distance from the top of the text box to the baseline.
    pub fn ascent(&self) -> f32 {
        match &self.metrics {
            Some(metrics) => metrics.ascent_px(self.size as f32),
            None => self.size as f32 * 0.8,
        }
    }
}

pub struct FontSelector {
    catalog: FontCatalog,
    db: Option<Arc<fontdb::Database>>,
    loaded: HashMap<String, Option<FontMetrics>>,
}

impl FontSelector {
    pub fn new(catalog: FontCatalog) -> Self {
        Self {
            catalog,
            db: None,
            loaded: HashMap::new(),
        }
    }

    /// Resolves family names against `db` instead of the system fonts.
    pub fn with_font_database(catalog: FontCatalog, db: Arc<fontdb::Database>) -> Self {
        Self {
            catalog,
            db: Some(db),
            loaded: HashMap::new(),
        }
    }

    /// Resolves the font for `language` at `size`. Resolution results are
    /// memoized per language, so calling this for every region stays cheap.
    pub fn select(&mut self, language: &str, size: u32) -> SelectedFont {
        let key = language.trim().to_lowercase();
        if !self.loaded.contains_key(&key) {
            let resolved = self.resolve(language);
            self.loaded.insert(key.clone(), resolved);
        }
        SelectedFont {
            metrics: self.loaded.get(&key).cloned().flatten(),
            size,
        }
    }

    fn resolve(&mut self, language: &str) -> Option<FontMetrics> {
        let candidates: Vec<String> = self
            .catalog
            .candidates(language)
            .into_iter()
            .map(str::to_string)
            .collect();
        for candidate in candidates {
            let result = if is_font_file_name(&candidate) {
                self.load_from_file(&candidate)
            } else {
                let db = self.system_db();
                load_font_metrics_from_family(db, &candidate)
            };
            match result {
                Ok(metrics) => {
                    debug!(
                        "font '{}' selected for {}",
                        metrics.family().unwrap_or(&candidate),
                        language
                    );
                    return Some(metrics);
                }
                Err(err) => debug!("font candidate '{}' unavailable: {}", candidate, err),
            }
        }
        None
    }

    fn load_from_file(&self, name: &str) -> Result<FontMetrics> {
        let direct = PathBuf::from(name);
        if direct.is_file() {
            return load_font_metrics(&direct);
        }
        for dir in &self.catalog.dirs {
            let path = dir.join(name);
            if path.is_file() {
                return load_font_metrics(&path);
            }
        }
        Err(anyhow!("font file not found: {}", name))
    }

    fn system_db(&mut self) -> &fontdb::Database {
        &**self.db.get_or_insert_with(system_fonts)
    }
}

fn is_font_file_name(candidate: &str) -> bool {
    Path::new(candidate)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            FONT_FILE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

pub(crate) fn measure_text_width_px(text: &str, font_size: f32, font: Option<&FontMetrics>) -> f32 {
    if let Some(font) = font
        && let Ok(face) = Face::parse(&font.data, font.face_index)
    {
        let mut advance = 0u32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            if ch == ' ' {
                advance = advance.saturating_add(font.space_advance as u32);
                continue;
            }
            if let Some(glyph) = face.glyph_index(ch) {
                let glyph_advance = face.glyph_hor_advance(glyph).unwrap_or(font.space_advance);
                advance = advance.saturating_add(glyph_advance as u32);
            } else {
                advance = advance.saturating_add(font.space_advance as u32);
            }
        }
        return advance as f32 * font.scale(font_size);
    }
    estimate_text_width_units(text) * font_size
}

fn estimate_char_units_for_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF
    ) {
        1.0
    } else {
        0.9
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars().map(estimate_char_units_for_width).sum()
}

fn load_font_metrics_from_data(data: &[u8], preferred_family: Option<&str>) -> Result<FontMetrics> {
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    for index in 0..count {
        let Some(metrics) = load_face(data, index) else {
            continue;
        };
        if let (Some(preferred), Some(found)) = (preferred_family, metrics.family())
            && found.eq_ignore_ascii_case(preferred)
        {
            return Ok(metrics);
        }
        if fallback.is_none() {
            fallback = Some(metrics);
        }
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn load_font_metrics_from_family(db: &fontdb::Database, family: &str) -> Result<FontMetrics> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let (data, face_index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    match load_face(&data, face_index) {
        Some(metrics) => Ok(metrics),
        None => load_font_metrics_from_data(&data, Some(family)),
    }
}

fn load_face(data: &[u8], index: u32) -> Option<FontMetrics> {
    let face = Face::parse(data, index).ok()?;
    let units_per_em = face.units_per_em().max(1);
    Some(FontMetrics {
        data: Arc::new(data.to_vec()),
        units_per_em,
        space_advance: face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(units_per_em / 2),
        ascender: face.ascender(),
        descender: face.descender(),
        family: extract_family_name(&face),
        face_index: index,
    })
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}
