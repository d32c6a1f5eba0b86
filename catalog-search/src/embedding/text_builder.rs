//! Canonical embedding input for products
//!
//! The raw description is checked against a hard ceiling before anything else touches
//! it. Descriptions under the ceiling are sanitized (markup stripped, entities decoded,
//! whitespace collapsed) and then cut to a softer limit, preferring a sentence or word
//! boundary near the end of the allowed window.

use crate::error::{Result, SearchError};
use crate::types::Product;
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Raw descriptions longer than this are rejected outright
pub const MAX_RAW_DESCRIPTION_CHARS: usize = 32_000;

/// Sanitized descriptions are truncated to this many characters
pub const MAX_DESCRIPTION_CHARS: usize = 8_000;

/// Marker appended to truncated descriptions
pub const ELLIPSIS: &str = "...";

/// Category label used for products without a category
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Limits applied while building embedding text
#[derive(Debug, Clone)]
pub struct TextBuilderConfig {
    /// Hard ceiling on the raw description length, in characters
    pub max_raw_description_chars: usize,
    /// Soft limit on the sanitized description length, in characters
    pub max_description_chars: usize,
    /// Fraction of the soft limit, counted back from its end, searched for a clean cut
    pub boundary_window_ratio: f64,
}

impl Default for TextBuilderConfig {
    fn default() -> Self {
        Self {
            max_raw_description_chars: MAX_RAW_DESCRIPTION_CHARS,
            max_description_chars: MAX_DESCRIPTION_CHARS,
            boundary_window_ratio: 0.1,
        }
    }
}

fn script_style_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>")
            .expect("script/style pattern is valid")
    })
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"))
}

fn entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});")
            .expect("entity pattern is valid")
    })
}

/// Derives the text that gets embedded for a product
#[derive(Debug, Clone, Default)]
pub struct EmbeddingTextBuilder {
    config: TextBuilderConfig,
}

impl EmbeddingTextBuilder {
    /// Builder with the default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with custom limits
    pub fn with_config(config: TextBuilderConfig) -> Self {
        Self { config }
    }

    /// Build `"{name}. {description}. Category: {category}"` for a product
    pub fn build_text(&self, product: &Product) -> Result<String> {
        let raw_len = product.description.chars().count();
        if raw_len > self.config.max_raw_description_chars {
            return Err(SearchError::Validation(format!(
                "description of product {} is {} characters, limit is {}",
                product.id, raw_len, self.config.max_raw_description_chars
            )));
        }

        let name = sanitize(&product.name);
        let description = truncate_at_boundary(
            &sanitize(&product.description),
            self.config.max_description_chars,
            self.config.boundary_window_ratio,
        );
        let category = product
            .category
            .as_deref()
            .map(sanitize)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| UNCATEGORIZED.to_string());

        Ok(format!("{name}. {description}. Category: {category}"))
    }
}

/// Strip markup, decode entities and collapse whitespace
pub fn sanitize(input: &str) -> String {
    let without_blocks = script_style_regex().replace_all(input, " ");
    let without_tags = tag_regex().replace_all(&without_blocks, " ");
    let decoded = decode_entities(&without_tags);
    collapse_whitespace(&decoded)
}

/// Decode named and numeric character references; unknown names are left untouched
pub fn decode_entities(input: &str) -> String {
    entity_regex()
        .replace_all(input, |caps: &Captures| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body.strip_prefix("#x").or(body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(body)
            };
            match decoded {
                Some(ch) => ch.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "copy" => '\u{00a9}',
        "reg" => '\u{00ae}',
        "trade" => '\u{2122}',
        "euro" => '\u{20ac}',
        "pound" => '\u{00a3}',
        "deg" => '\u{00b0}',
        "times" => '\u{00d7}',
        _ => return None,
    };
    Some(ch)
}

/// Replace every whitespace run (including non-breaking spaces) with one space
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` to at most `max_chars` characters including the ellipsis marker
///
/// The cut prefers the end of a sentence, then a word boundary, inside the last
/// `window_ratio` of the allowed length; failing both it cuts mid-word.
pub fn truncate_at_boundary(text: &str, max_chars: usize, window_ratio: f64) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }

    let usable = max_chars.saturating_sub(ELLIPSIS.chars().count());
    let window = ((usable as f64) * window_ratio).floor() as usize;
    let window_start = usable.saturating_sub(window);

    let sentence_cut = (window_start..usable)
        .rev()
        .find(|&i| {
            matches!(chars[i], '.' | '!' | '?')
                && chars.get(i + 1).map(|c| c.is_whitespace()).unwrap_or(true)
        })
        .map(|i| i + 1);
    let word_cut = || (window_start..=usable).rev().find(|&i| chars[i].is_whitespace());

    let cut = sentence_cut.or_else(word_cut).unwrap_or(usable);
    let head: String = chars[..cut].iter().collect();
    format!("{}{}", head.trim_end(), ELLIPSIS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProductId;
    use chrono::Utc;
    use proptest::prelude::*;

    fn product_with(name: &str, description: &str, category: Option<&str>) -> Product {
        Product {
            id: ProductId::from("sku-1"),
            name: name.to_string(),
            description: description.to_string(),
            category: category.map(str::to_string),
            price_cents: 129_900,
            currency: "USD".to_string(),
            stock: 4,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_output_format() {
        let builder = EmbeddingTextBuilder::new();
        let product = product_with(
            "Gaming Laptop",
            "<p>Fast &amp; quiet.</p>\n\n<ul><li>16GB   RAM</li></ul>",
            Some("Computers"),
        );

        let text = builder.build_text(&product).unwrap();
        assert_eq!(
            text,
            "Gaming Laptop. Fast & quiet. 16GB RAM. Category: Computers"
        );
    }

    #[test]
    fn test_missing_category() {
        let builder = EmbeddingTextBuilder::new();
        let text = builder
            .build_text(&product_with("Mug", "Ceramic", None))
            .unwrap();
        assert_eq!(text, "Mug. Ceramic. Category: Uncategorized");
    }

    #[test]
    fn test_exact_ceiling_is_accepted() {
        let builder = EmbeddingTextBuilder::new();
        let description = "a".repeat(MAX_RAW_DESCRIPTION_CHARS);
        assert!(builder
            .build_text(&product_with("Item", &description, None))
            .is_ok());
    }

    #[test]
    fn test_one_past_ceiling_is_rejected() {
        let builder = EmbeddingTextBuilder::new();
        let description = "a".repeat(MAX_RAW_DESCRIPTION_CHARS + 1);
        let err = builder
            .build_text(&product_with("Item", &description, None))
            .unwrap_err();
        assert!(matches!(err, SearchError::Validation(_)));
    }

    #[test]
    fn test_ceiling_counts_characters_not_bytes() {
        let builder = EmbeddingTextBuilder::new();
        let description = "é".repeat(MAX_RAW_DESCRIPTION_CHARS);
        assert!(builder
            .build_text(&product_with("Item", &description, None))
            .is_ok());
    }

    #[test]
    fn test_script_and_style_blocks_are_removed() {
        let cleaned = sanitize("before<script>alert('x')</script><style>p{}</style> after");
        assert_eq!(cleaned, "before after");
    }

    #[test]
    fn test_entity_decoding() {
        assert_eq!(decode_entities("&lt;b&gt; &#65;&#x42; &nbsp;x"), "<b> AB  x");
        assert_eq!(decode_entities("&bogus; &amp;"), "&bogus; &");
    }

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(truncate_at_boundary("short text", 100, 0.1), "short text");
    }

    #[test]
    fn test_truncates_at_sentence_boundary_in_window() {
        // 95 chars of sentence, then a long tail
        let mut text = "x".repeat(94);
        text.push('.');
        text.push(' ');
        text.push_str(&"y".repeat(50));

        let truncated = truncate_at_boundary(&text, 100, 0.1);
        assert_eq!(truncated, format!("{}.{}", "x".repeat(94), ELLIPSIS));
    }

    #[test]
    fn test_truncates_at_word_boundary_when_no_sentence_end() {
        let text = format!("{} {}", "a".repeat(93), "b".repeat(40));
        let truncated = truncate_at_boundary(&text, 100, 0.1);
        assert_eq!(truncated, format!("{}{}", "a".repeat(93), ELLIPSIS));
    }

    #[test]
    fn test_hard_cut_without_boundary_in_window() {
        // Only whitespace is far before the window
        let text = format!("{} {}", "a".repeat(10), "b".repeat(200));
        let truncated = truncate_at_boundary(&text, 100, 0.1);
        assert_eq!(truncated.chars().count(), 100);
        assert!(truncated.ends_with(ELLIPSIS));
    }

    #[test]
    fn test_long_description_is_capped() {
        let builder = EmbeddingTextBuilder::new();
        let sentence = "This laptop has a great screen. ";
        let description = sentence.repeat(1000);
        let text = builder
            .build_text(&product_with("Laptop", &description, Some("Computers")))
            .unwrap();

        let description_part = text
            .strip_prefix("Laptop. ")
            .and_then(|rest| rest.strip_suffix(". Category: Computers"))
            .unwrap();
        assert!(description_part.chars().count() <= MAX_DESCRIPTION_CHARS);
        assert!(description_part.ends_with(&format!("screen.{ELLIPSIS}")));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_under_ceiling_never_fails(len in 0usize..=MAX_RAW_DESCRIPTION_CHARS, seed in "[a-z <>&;.]{1,16}") {
            let description: String = seed.chars().cycle().take(len).collect();
            let builder = EmbeddingTextBuilder::new();
            prop_assert!(builder.build_text(&product_with("Item", &description, None)).is_ok());
        }

        #[test]
        fn prop_over_ceiling_always_fails(extra in 1usize..2_000, seed in "[a-z .]{1,8}") {
            let len = MAX_RAW_DESCRIPTION_CHARS + extra;
            let description: String = seed.chars().cycle().take(len).collect();
            let builder = EmbeddingTextBuilder::new();
            let is_validation_error = matches!(
                builder.build_text(&product_with("Item", &description, None)),
                Err(SearchError::Validation(_))
            );
            prop_assert!(is_validation_error);
        }
    }
}
