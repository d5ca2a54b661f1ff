//! Path generation for stored images.
//!
//! Every namespace ("dir") owns a [`NamingStrategy`] that turns an
//! allocation request into a relative path. Strategies are pure: the
//! namespace counter and the collision retries belong to
//! [`Storage`](crate::storage::Storage), which passes them in through
//! [`GenerateOptions`].
//!
//! ## Strategies
//!
//! | Strategy | Path shape | Example |
//! |---|---|---|
//! | [`Serial`] (`depth = 2`) | `SSS/SSS/<name or id>[_index].ext` | `001/234/1234567.png` |
//! | [`Serial`] (`depth = 0`) | `<name or id>[_index].ext` | `11_2.png` |
//! | [`Pattern`] | sanitized caller segments `[_index].ext` | `users/anna/avatar.jpg` |
//!
//! ## Sanitizing
//!
//! Path segments go through [`sanitize_segment`]:
//!
//! 1. transliterate to ASCII (`Ж` → `zh`, `é` → `e`)
//! 2. lowercase
//! 3. replace every run of characters outside `[a-z0-9_-]` with `-`
//! 4. collapse repeated `-` and `_`
//! 5. trim `-` and `_` from both ends
//!
//! A segment with nothing left becomes `_`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Directory fan-out of the serial strategy.
pub const SERIAL_FAN_OUT: u64 = 1000;

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_-]+").expect("static regex"));
static REPEATED_DASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-{2,}").expect("static regex"));
static REPEATED_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_{2,}").expect("static regex"));

/// Input to a single path generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions<'a> {
    /// Allocations made in the namespace before this one.
    pub count: u64,
    /// Disambiguation index; 0 on the first attempt.
    pub index: u64,
    /// Caller's preferred name (serial) or path pattern (pattern).
    pub name: Option<&'a str>,
    /// File extension without the dot.
    pub extension: &'a str,
}

pub trait NamingStrategy: Send + Sync + fmt::Debug {
    fn generate(&self, options: &GenerateOptions<'_>) -> String;
}

/// Sharded numeric paths: `id = count + 1`, split into `depth` directory
/// levels of [`SERIAL_FAN_OUT`] entries each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Serial {
    pub depth: u32,
}

impl NamingStrategy for Serial {
    fn generate(&self, options: &GenerateOptions<'_>) -> String {
        let id = options.count + 1;
        let mut path = String::new();

        for level in (1..=self.depth).rev() {
            let shard = SERIAL_FAN_OUT
                .checked_pow(level)
                .map_or(0, |divisor| id / divisor);
            // The most significant level is not wrapped.
            let shard = if level == self.depth {
                shard
            } else {
                shard % SERIAL_FAN_OUT
            };
            path.push_str(&format!("{shard:03}/"));
        }

        let basename = options
            .name
            .map(sanitize_segment)
            .filter(|name| name != "_")
            .unwrap_or_else(|| id.to_string());
        path.push_str(&basename);
        if options.index != 0 {
            path.push_str(&format!("_{}", options.index));
        }
        push_extension(&mut path, options.extension);
        path
    }
}

/// Caller-supplied paths, sanitized segment by segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pattern;

impl NamingStrategy for Pattern {
    fn generate(&self, options: &GenerateOptions<'_>) -> String {
        let mut segments: Vec<String> = options
            .name
            .unwrap_or_default()
            .split('/')
            .filter(|s| !matches!(*s, "" | "." | ".."))
            .map(sanitize_segment)
            .collect();

        if segments.is_empty() {
            let number = if options.index != 0 {
                options.index
            } else {
                options.count + 1
            };
            segments.push(number.to_string());
        } else if options.index != 0
            && let Some(last) = segments.last_mut()
        {
            last.push_str(&format!("_{}", options.index));
        }

        let mut path = segments.join("/");
        push_extension(&mut path, options.extension);
        path
    }
}

fn push_extension(path: &mut String, extension: &str) {
    let extension = extension.trim_start_matches('.');
    if !extension.is_empty() {
        path.push('.');
        path.push_str(extension);
    }
}

/// Sanitize one path segment. Never returns an empty string.
pub fn sanitize_segment(segment: &str) -> String {
    let ascii = transliterate(segment).to_lowercase();
    let replaced = DISALLOWED.replace_all(&ascii, "-");
    let collapsed = REPEATED_DASH.replace_all(&replaced, "-");
    let collapsed = REPEATED_UNDERSCORE.replace_all(&collapsed, "_");
    let trimmed = collapsed.trim_matches(|c| c == '-' || c == '_');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Best-effort ASCII transliteration of Latin and Cyrillic letters.
///
/// Characters without a mapping are kept and later replaced by the
/// sanitizer.
pub fn transliterate(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match ascii_for(c) {
            Some(s) => out.push_str(s),
            None => out.push(c),
        }
    }
    out
}

fn ascii_for(c: char) -> Option<&'static str> {
    let lower = c.to_lowercase().next().unwrap_or(c);
    let mapped = match lower {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'ı' => "i",
        'ł' | 'ľ' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ř' => "r",
        'ś' | 'š' | 'ş' => "s",
        'ß' => "ss",
        'ť' | 'ţ' => "t",
        'þ' => "th",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' => "e",
        'ё' => "yo",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ъ' | 'ь' => "",
        'ы' => "y",
        'э' => "e",
        'ю' => "yu",
        'я' => "ya",
        'і' => "i",
        'ї' => "yi",
        'є' => "ye",
        'ґ' => "g",
        _ => return None,
    };
    Some(mapped)
}

/// Naming strategy as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase", deny_unknown_fields)]
pub enum NamingConfig {
    Serial {
        #[serde(default)]
        depth: u32,
    },
    Pattern,
}

impl Default for NamingConfig {
    fn default() -> Self {
        NamingConfig::Serial { depth: 0 }
    }
}

impl NamingConfig {
    pub fn strategy(self) -> Box<dyn NamingStrategy> {
        match self {
            NamingConfig::Serial { depth } => Box::new(Serial { depth }),
            NamingConfig::Pattern => Box::new(Pattern),
        }
    }
}

/// A namespace and the strategy that names its files.
#[derive(Debug)]
pub struct Dir {
    namespace: String,
    strategy: Box<dyn NamingStrategy>,
}

impl Dir {
    pub fn new(namespace: impl Into<String>, strategy: Box<dyn NamingStrategy>) -> Self {
        Self {
            namespace: namespace.into(),
            strategy,
        }
    }

    pub fn from_config(namespace: impl Into<String>, naming: NamingConfig) -> Self {
        Self::new(namespace, naming.strategy())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn generate(&self, options: &GenerateOptions<'_>) -> String {
        self.strategy.generate(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts<'a>(count: u64, index: u64, name: Option<&'a str>, ext: &'a str) -> GenerateOptions<'a> {
        GenerateOptions {
            count,
            index,
            name,
            extension: ext,
        }
    }

    // =========================================================================
    // Serial
    // =========================================================================

    #[test]
    fn serial_flat_uses_next_id() {
        let serial = Serial { depth: 0 };
        assert_eq!(serial.generate(&opts(10, 0, None, "png")), "11.png");
        assert_eq!(serial.generate(&opts(10, 2, None, "png")), "11_2.png");
    }

    #[test]
    fn serial_shards_most_significant_first() {
        let serial = Serial { depth: 2 };
        assert_eq!(
            serial.generate(&opts(1_234_566, 0, None, "jpg")),
            "001/234/1234567.jpg"
        );
        assert_eq!(serial.generate(&opts(0, 0, None, "jpg")), "000/000/1.jpg");
    }

    #[test]
    fn serial_top_level_is_not_wrapped() {
        let serial = Serial { depth: 1 };
        assert_eq!(
            serial.generate(&opts(2_500_000, 0, None, "gif")),
            "2500/2500001.gif"
        );
    }

    #[test]
    fn serial_prefers_sanitized_name() {
        let serial = Serial { depth: 1 };
        assert_eq!(
            serial.generate(&opts(41, 0, Some("Holiday Photo"), "jpg")),
            "000/holiday-photo.jpg"
        );
        assert_eq!(
            serial.generate(&opts(41, 7, Some("Holiday Photo"), "jpg")),
            "000/holiday-photo_7.jpg"
        );
    }

    #[test]
    fn serial_falls_back_to_id_for_degenerate_name() {
        let serial = Serial { depth: 0 };
        assert_eq!(serial.generate(&opts(4, 0, Some("???"), "png")), "5.png");
    }

    // =========================================================================
    // Pattern
    // =========================================================================

    #[test]
    fn pattern_strips_dot_segments() {
        assert_eq!(
            Pattern.generate(&opts(0, 0, Some("../test////test/.."), "jpg")),
            "test/test.jpg"
        );
    }

    #[test]
    fn pattern_index_suffixes_last_segment() {
        assert_eq!(
            Pattern.generate(&opts(0, 31, Some("users/Anna/avatar"), "png")),
            "users/anna/avatar_31.png"
        );
    }

    #[test]
    fn pattern_without_segments_is_numeric() {
        assert_eq!(Pattern.generate(&opts(8, 0, Some("/../."), "png")), "9.png");
        assert_eq!(Pattern.generate(&opts(8, 0, None, "png")), "9.png");
        assert_eq!(Pattern.generate(&opts(8, 42, None, "png")), "42.png");
    }

    #[test]
    fn pattern_degenerate_segment_becomes_underscore() {
        assert_eq!(Pattern.generate(&opts(0, 0, Some("a/%%%/b"), "gif")), "a/_/b.gif");
    }

    // =========================================================================
    // Sanitizing
    // =========================================================================

    #[test]
    fn sanitize_transliterates_and_lowercases() {
        assert_eq!(sanitize_segment("Привет Мир"), "privet-mir");
        assert_eq!(sanitize_segment("Ça va, Zoë?"), "ca-va-zoe");
        assert_eq!(sanitize_segment("Straße"), "strasse");
    }

    #[test]
    fn sanitize_collapses_and_trims() {
        assert_eq!(sanitize_segment("__a--b__"), "a-b");
        assert_eq!(sanitize_segment("  hello   world  "), "hello-world");
        assert_eq!(sanitize_segment("keep_under_scores"), "keep_under_scores");
        assert_eq!(sanitize_segment(""), "_");
        assert_eq!(sanitize_segment("!!!"), "_");
    }

    // =========================================================================
    // Config / Dir
    // =========================================================================

    #[test]
    fn naming_config_parses_tagged() {
        #[derive(Deserialize)]
        struct Wrapper {
            naming: NamingConfig,
        }
        let w: Wrapper = toml::from_str(r#"naming = { strategy = "serial", depth = 2 }"#).unwrap();
        assert_eq!(w.naming, NamingConfig::Serial { depth: 2 });
        let w: Wrapper = toml::from_str(r#"naming = { strategy = "pattern" }"#).unwrap();
        assert_eq!(w.naming, NamingConfig::Pattern);
        assert!(toml::from_str::<Wrapper>(r#"naming = { strategy = "random" }"#).is_err());
    }

    #[test]
    fn dir_delegates_to_strategy() {
        let dir = Dir::from_config("avatars", NamingConfig::Serial { depth: 0 });
        assert_eq!(dir.namespace(), "avatars");
        assert_eq!(dir.generate(&opts(0, 0, None, "webp")), "1.webp");
    }
}
