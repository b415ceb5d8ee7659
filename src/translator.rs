use std::collections::HashMap;
use tracing::{debug, warn};

use crate::ocr::{OverlayWarning, TextRegion, TranslatedRegion};
use crate::providers::WordTranslator;

#[derive(Debug, Clone, Default)]
pub struct TranslationReport {
    pub regions: Vec<TranslatedRegion>,
    pub warnings: Vec<OverlayWarning>,
}

/// Translates recognized text word by word. Each whitespace-separated word is
/// sent on its own and the results are rejoined in order, so every region
/// keeps its word count. A failed word is kept as-is.
pub struct Translator<T: WordTranslator> {
    backend: T,
    cache: HashMap<(String, String), String>,
}

impl<T: WordTranslator> Translator<T> {
    pub fn new(backend: T) -> Self {
        Self {
            backend,
            cache: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &T {
        &self.backend
    }

    pub async fn translate_regions(
        &mut self,
        regions: &[TextRegion],
        target_language: &str,
    ) -> TranslationReport {
        let mut report = TranslationReport::default();
        for region in regions {
            let translated = self
                .translate_region(region, target_language, &mut report.warnings)
                .await;
            report.regions.push(translated);
        }
        report
    }

    pub async fn translate_region(
        &mut self,
        region: &TextRegion,
        target_language: &str,
        warnings: &mut Vec<OverlayWarning>,
    ) -> TranslatedRegion {
        let mut words = Vec::new();
        for word in region.text.split_whitespace() {
            words.push(self.translate_word(word, target_language, warnings).await);
        }
        debug!("'{}' -> '{}'", region.text, words.join(" "));
        TranslatedRegion {
            bbox: region.bbox.clone(),
            words,
        }
    }

    async fn translate_word(
        &mut self,
        word: &str,
        target_language: &str,
        warnings: &mut Vec<OverlayWarning>,
    ) -> String {
        let key = (target_language.to_string(), word.to_string());
        if let Some(existing) = self.cache.get(&key) {
            return existing.clone();
        }
        let reason = match self.backend.translate_word(word, target_language).await {
            Ok(translated) => {
                let translated = collapse_whitespace(&translated);
                if !translated.is_empty() {
                    self.cache.insert(key, translated.clone());
                    return translated;
                }
                "empty reply".to_string()
            }
            Err(err) => format!("{:#}", err),
        };
        warn!("translation failed for '{}': {}", word, reason);
        warnings.push(OverlayWarning::TranslationUnavailable {
            word: word.to_string(),
            reason,
        });
        word.to_string()
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::BoundingBox;
    use crate::providers::TranslateFuture;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DictionaryTranslator {
        entries: HashMap<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    impl DictionaryTranslator {
        fn new(entries: &[(&'static str, &'static str)]) -> Self {
            Self {
                entries: entries.iter().copied().collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl WordTranslator for DictionaryTranslator {
        fn translate_word<'a>(&'a self, word: &'a str, _target: &'a str) -> TranslateFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = self
                .entries
                .get(word)
                .map(|value| value.to_string())
                .ok_or_else(|| anyhow!("backend unreachable"));
            Box::pin(async move { result })
        }
    }

    fn region(text: &str) -> TextRegion {
        TextRegion {
            bbox: BoundingBox::from_rect(10, 10, 100, 30),
            text: text.to_string(),
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn translates_each_word_and_rejoins_in_order() {
        let backend = DictionaryTranslator::new(&[("hello", "bonjour"), ("world", "monde")]);
        let mut translator = Translator::new(backend);
        let report = translator
            .translate_regions(&[region("hello   world")], "French")
            .await;
        assert_eq!(report.regions[0].translated_text(), "bonjour monde");
        assert_eq!(report.regions[0].bbox, BoundingBox::from_rect(10, 10, 100, 30));
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn failed_words_fall_back_to_the_original() {
        let backend = DictionaryTranslator::new(&[("hello", "bonjour")]);
        let mut translator = Translator::new(backend);
        let report = translator
            .translate_regions(&[region("hello big world")], "French")
            .await;
        assert_eq!(report.regions[0].words, vec!["bonjour", "big", "world"]);
        assert_eq!(report.warnings.len(), 2);
        assert!(matches!(
            &report.warnings[0],
            OverlayWarning::TranslationUnavailable { word, reason }
                if word == "big" && reason == "backend unreachable"
        ));
    }

    #[tokio::test]
    async fn empty_replies_count_as_failures() {
        let backend = DictionaryTranslator::new(&[("hello", "  ")]);
        let mut translator = Translator::new(backend);
        let report = translator.translate_regions(&[region("hello")], "French").await;
        assert_eq!(report.regions[0].words, vec!["hello"]);
        assert!(matches!(
            &report.warnings[0],
            OverlayWarning::TranslationUnavailable { reason, .. } if reason == "empty reply"
        ));
    }

    #[tokio::test]
    async fn repeated_words_hit_the_backend_once() {
        let backend = DictionaryTranslator::new(&[("stop", "halt")]);
        let mut translator = Translator::new(backend);
        let report = translator
            .translate_regions(&[region("stop"), region("stop stop")], "German")
            .await;
        assert_eq!(report.regions[1].translated_text(), "halt halt");
        assert_eq!(translator.backend().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_regions_translate_to_no_words() {
        let backend = DictionaryTranslator::new(&[]);
        let mut translator = Translator::new(backend);
        let report = translator.translate_regions(&[region("   ")], "German").await;
        assert!(report.regions[0].words.is_empty());
        assert_eq!(translator.backend().calls.load(Ordering::SeqCst), 0);
    }
}
