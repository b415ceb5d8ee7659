use std::collections::HashMap;

use crate::ocr::{BoundingBox, TextRegion};

#[derive(Debug, Clone, Copy)]
struct WordBox {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

impl WordBox {
    fn union(&self, other: &WordBox) -> WordBox {
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = (self.x + self.w).max(other.x + other.w);
        let y2 = (self.y + self.h).max(other.y + other.h);
        WordBox {
            x: x1,
            y: y1,
            w: x2 - x1,
            h: y2 - y1,
        }
    }
}

#[derive(Clone)]
struct WordToken {
    text: String,
    bbox: WordBox,
    conf: f32,
}

type LineKey = (i32, i32, i32, i32);

/// Groups tesseract TSV word rows (level 5) into one region per text line.
pub(super) fn parse_tsv_regions(tsv: &str) -> Vec<TextRegion> {
    let mut order: Vec<LineKey> = Vec::new();
    let mut word_map: HashMap<LineKey, Vec<WordToken>> = HashMap::new();

    for row in tsv.lines().skip(1) {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }
        let bbox = WordBox {
            x: cols[6].parse().unwrap_or(0),
            y: cols[7].parse().unwrap_or(0),
            w: cols[8].parse().unwrap_or(0),
            h: cols[9].parse().unwrap_or(0),
        };
        if !word_map.contains_key(&key) {
            order.push(key);
        }
        word_map.entry(key).or_default().push(WordToken {
            text: text.to_string(),
            bbox,
            conf,
        });
    }

    order
        .into_iter()
        .filter_map(|key| word_map.remove(&key))
        .filter_map(|mut words| {
            words.sort_by_key(|word| word.bbox.x);
            build_region(&words)
        })
        .collect()
}

fn build_region(words: &[WordToken]) -> Option<TextRegion> {
    let first = words.first()?;
    let mut text = String::new();
    let mut last_token = "";
    let mut bbox = first.bbox;
    let mut conf_sum = 0.0;
    for word in words {
        if !text.is_empty() && needs_space(last_token, &word.text) {
            text.push(' ');
        }
        text.push_str(&word.text);
        last_token = &word.text;
        bbox = bbox.union(&word.bbox);
        conf_sum += word.conf;
    }
    let confidence = (conf_sum / words.len() as f32 / 100.0).clamp(0.0, 1.0);

    Some(TextRegion {
        bbox: BoundingBox::from_rect(bbox.x, bbox.y, bbox.w, bbox.h),
        text,
        confidence,
    })
}

fn needs_space(left: &str, right: &str) -> bool {
    let last = left.chars().rev().find(|ch| !ch.is_whitespace());
    let first = right.chars().find(|ch| !ch.is_whitespace());
    match (last, first) {
        (Some(a), Some(b)) => !(is_cjk(a) && is_cjk(b)),
        _ => false,
    }
}

fn is_cjk(ch: char) -> bool {
    matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF | 0x3000..=0x303F | 0xFF00..=0xFFEF
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_words_into_lines_with_union_boxes() {
        let tsv = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/tesseract.tsv"
        ));
        let regions = parse_tsv_regions(tsv);
        assert_eq!(regions.len(), 2);

        assert_eq!(regions[0].text, "hello world");
        assert_eq!(regions[0].bbox, BoundingBox::from_rect(10, 10, 100, 30));
        assert!((regions[0].confidence - 0.9).abs() < 1e-4);

        assert_eq!(regions[1].text, "你好世界");
        assert_eq!(regions[1].bbox, BoundingBox::from_rect(12, 60, 80, 24));
    }

    #[test]
    fn skips_rows_without_text_or_confidence() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   5\t1\t1\t1\t1\t1\t0\t0\t5\t5\t-1\tghost\n\
                   5\t1\t1\t1\t1\t2\t0\t0\t5\t5\t80\t \n";
        assert!(parse_tsv_regions(tsv).is_empty());
    }
}
