use anyhow::{Result, anyhow};
use std::fmt;
use std::str::FromStr;

/// Target languages offered by the front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TargetLanguage {
    English,
    French,
    German,
    Arabic,
    Chinese,
}

impl TargetLanguage {
    pub const ALL: [TargetLanguage; 5] = [
        TargetLanguage::Chinese,
        TargetLanguage::Arabic,
        TargetLanguage::French,
        TargetLanguage::German,
        TargetLanguage::English,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TargetLanguage::English => "English",
            TargetLanguage::French => "French",
            TargetLanguage::German => "German",
            TargetLanguage::Arabic => "Arabic",
            TargetLanguage::Chinese => "Chinese",
        }
    }

    /// Tesseract language codes used to read source text for this target.
    pub fn ocr_languages(&self) -> &'static str {
        match self {
            TargetLanguage::Chinese => "chi_sim+eng",
            TargetLanguage::Arabic => "ara+eng",
            TargetLanguage::French => "fra+eng",
            TargetLanguage::German => "deu+eng",
            TargetLanguage::English => "eng",
        }
    }
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetLanguage {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let lower = value.trim().to_lowercase();
        let language = match lower.as_str() {
            "english" | "en" | "eng" => TargetLanguage::English,
            "french" | "fr" | "fra" => TargetLanguage::French,
            "german" | "de" | "deu" => TargetLanguage::German,
            "arabic" | "ar" | "ara" => TargetLanguage::Arabic,
            "chinese" | "zh" | "zho" => TargetLanguage::Chinese,
            _ => {
                let names = TargetLanguage::ALL
                    .iter()
                    .map(TargetLanguage::name)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(anyhow!(
                    "unsupported target language '{}' (expected one of: {})",
                    value.trim(),
                    names
                ));
            }
        };
        Ok(language)
    }
}
