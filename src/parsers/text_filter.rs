//! Text cleaning applied to every relayed message.
//!
//! Stages run in a fixed order. Links, handles and hashtags are removed while
//! their punctuation (`:`, `/`, `@`, `#`) is still present, and digit
//! adjacency is judged before symbols are stripped. Stopwords that sit inside
//! a link are left for the link stage so the link is removed whole.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

const BUILTIN_STOPWORDS: [&str; 1] = ["code"];

static ARABIC_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{0600}-\x{06FF}]+").expect("valid arabic run regex"));

static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:https?://\S+|www\.\S+|\b(?:t|telegram)\.me/\S*|\b[a-z0-9](?:[a-z0-9-]*[a-z0-9])?(?:\.[a-z0-9-]+)*\.[a-z]{2,}/\S*)",
    )
    .expect("valid link regex")
});

static HANDLE_OR_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[@#]\w+").expect("valid handle regex"));

static SYMBOL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid symbol regex"));

/// How Arabic-script content (U+0600..=U+06FF) is treated before the other stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArabicMode {
    /// Replace every Arabic run with a space and keep the rest of the text.
    #[default]
    StripRuns,
    /// Keep only the first line with an ASCII alphanumeric and no Arabic character.
    FirstLatinLine,
}

#[derive(Debug, Clone)]
pub struct TextNormalizer {
    arabic_mode: ArabicMode,
    stopwords: Regex,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(ArabicMode::default(), &[])
    }
}

impl TextNormalizer {
    pub fn new(arabic_mode: ArabicMode, extra_stopwords: &[String]) -> Self {
        let alternatives = BUILTIN_STOPWORDS
            .iter()
            .map(|word| regex::escape(word))
            .chain(
                extra_stopwords
                    .iter()
                    .map(|word| word.trim())
                    .filter(|word| !word.is_empty())
                    .map(regex::escape),
            )
            .collect::<Vec<_>>()
            .join("|");
        let stopwords = Regex::new(&format!(r"(?i)\b(?:{alternatives})\b"))
            .expect("escaped stopwords always form a valid regex");

        Self {
            arabic_mode,
            stopwords,
        }
    }

    /// Cleans `raw` for relaying. An empty result means there is nothing to send.
    pub fn normalize(&self, raw: &str) -> String {
        let text = match self.arabic_mode {
            ArabicMode::StripRuns => ARABIC_RUN.replace_all(raw, " ").into_owned(),
            ArabicMode::FirstLatinLine => first_latin_line(raw).unwrap_or_default().to_string(),
        };
        if text.trim().is_empty() {
            return String::new();
        }

        let links: Vec<(usize, usize)> = LINK
            .find_iter(&text)
            .map(|m| (m.start(), m.end()))
            .collect();
        let text = self
            .stopwords
            .replace_all(&text, |caps: &Captures<'_>| match caps.get(0) {
                Some(m) if links.iter().any(|&(s, e)| s <= m.start() && m.end() <= e) => {
                    m.as_str().to_string()
                }
                _ => " ".to_string(),
            });
        let text = LINK.replace_all(&text, " ");
        let text = HANDLE_OR_TAG.replace_all(&text, " ");
        let text = drop_standalone_digits(&text);
        let text = SYMBOL.replace_all(&text, "");

        collapse_whitespace(&text)
    }
}

/// Collapses whitespace runs to one space and trims both ends.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_arabic(c: char) -> bool {
    ('\u{0600}'..='\u{06FF}').contains(&c)
}

fn first_latin_line(text: &str) -> Option<&str> {
    text.lines().find(|line| {
        line.chars().any(|c| c.is_ascii_alphanumeric()) && !line.chars().any(is_arabic)
    })
}

/// Removes digit runs unless an ASCII letter touches the run on either side,
/// so `v2`, `A1` and `3B` survive while `123` and `50%` lose their digits.
fn drop_standalone_digits(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_numeric() {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && chars[i].is_numeric() {
            i += 1;
        }
        let letter_before = start > 0 && chars[start - 1].is_ascii_alphabetic();
        let letter_after = i < chars.len() && chars[i].is_ascii_alphabetic();
        if letter_before || letter_after {
            out.extend(&chars[start..i]);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::{ArabicMode, TextNormalizer, collapse_whitespace, drop_standalone_digits};

    fn normalize(raw: &str) -> String {
        TextNormalizer::default().normalize(raw)
    }

    #[test_case("order 12345", "order" ; "standalone digits removed")]
    #[test_case("version v2 ready", "version v2 ready" ; "letter before digit kept")]
    #[test_case("model A1 and 3B", "model A1 and 3B" ; "letter on either side kept")]
    #[test_case("call 555 1234 now", "call now" ; "phone like digits removed")]
    #[test_case("use code ABC123", "use ABC123" ; "code removed before alnum token")]
    #[test_case("Use CODE abc", "Use abc" ; "code removed case insensitively")]
    #[test_case("barcode codec", "barcode codec" ; "code only removed on word boundaries")]
    #[test_case("check https://example.com/x now", "check now" ; "https link removed")]
    #[test_case("visit www.example.org today", "visit today" ; "www link removed")]
    #[test_case("join t.me/somechannel please", "join please" ; "telegram link removed")]
    #[test_case("see example.com/path here", "see here" ; "bare domain path removed")]
    #[test_case("ping @admin about #deal", "ping about" ; "handle and hashtag removed")]
    #[test_case("hello, world! 🎉", "hello world" ; "symbols and emoji removed")]
    #[test_case("   lots   of\n\tspace  ", "lots of space" ; "whitespace collapsed")]
    #[test_case("", "" ; "empty input")]
    #[test_case("!!! ??? ...", "" ; "punctuation only")]
    #[test_case("snake_case stays", "snake_case stays" ; "underscore is a word character")]
    #[test_case("see https://code.org/learn now", "see now" ; "stopword in link host")]
    #[test_case("get https://code.visualstudio.com/download today", "get today" ; "stopword as link subdomain")]
    #[test_case("repo https://github.com/code/tool here", "repo here" ; "stopword in link path")]
    #[test_case("visit code.org/learn today", "visit today" ; "stopword in bare domain")]
    #[test_case("price 100 via www.code.io/p1", "price via" ; "stopword in www link next to digits")]
    #[test_case("code/review done", "review done" ; "stopword before slash outside link")]
    #[test_case("follow https://t.me/@chan/5 now", "follow now" ; "handle inside link")]
    #[test_case("join t.me/@chan today", "join today" ; "handle inside telegram link")]
    #[test_case("save 50https://x.co/a", "save" ; "digits glued to removed link")]
    #[test_case("update v2https://x.co/a", "update v2" ; "letter digit token glued to link")]
    #[test_case("ping @code now", "ping now" ; "stopword as handle name")]
    #[test_case("x code@admin#tag y", "x y" ; "stopword glued to handle and hashtag")]
    #[test_case("#code2024 deal", "deal" ; "hashtag containing stopword")]
    fn normalize_cases(input: &str, expected: &str) {
        assert_eq!(normalize(input), expected);
    }

    #[test]
    fn normalize_end_to_end_news_message() {
        let cleaned = normalize("Breaking: price up 50% today! http://x.co #news");
        assert_eq!(cleaned, "Breaking price up today");
    }

    #[test]
    fn normalize_never_leaves_code_or_links() {
        let cleaned = normalize("CODE: Code code https://a.b/c http://d.e");
        assert!(!cleaned.to_lowercase().contains("code"));
        assert!(!cleaned.contains("http"));
    }

    #[test]
    fn arabic_only_text_is_empty_in_both_modes() {
        let raw = "مرحبا بكم في القناة ١٢٣\nخبر عاجل";
        assert_eq!(normalize(raw), "");
        let first_line = TextNormalizer::new(ArabicMode::FirstLatinLine, &[]);
        assert_eq!(first_line.normalize(raw), "");
    }

    #[test]
    fn strip_runs_keeps_latin_text_around_arabic() {
        assert_eq!(normalize("عاجل Gold up عاجل"), "Gold up");
        assert_eq!(normalize("abcمرحبا123"), "abc");
    }

    #[test]
    fn first_latin_line_selects_first_clean_line() {
        let normalizer = TextNormalizer::new(ArabicMode::FirstLatinLine, &[]);
        let raw = "عنوان Title\n---\nSignal BUY v2\nsecond line";
        assert_eq!(normalizer.normalize(raw), "Signal BUY v2");
    }

    #[test]
    fn extra_stopwords_are_removed() {
        let normalizer = TextNormalizer::new(ArabicMode::StripRuns, &["promo".to_string()]);
        assert_eq!(normalizer.normalize("PROMO deal code inside"), "deal inside");
    }

    #[test]
    fn extra_stopwords_are_escaped() {
        let normalizer = TextNormalizer::new(ArabicMode::StripRuns, &["a.b".to_string()]);
        assert_eq!(normalizer.normalize("axb stays"), "axb stays");
    }

    #[test]
    fn collapse_whitespace_is_idempotent() {
        for sample in ["  a  b ", "\n\nx\t\ty", "", "single"] {
            let once = collapse_whitespace(sample);
            assert_eq!(collapse_whitespace(&once), once);
        }
    }

    #[test]
    fn drop_standalone_digits_checks_ascii_letters_only() {
        assert_eq!(drop_standalone_digits("x9 9 é9"), "x9  é");
        assert_eq!(drop_standalone_digits("12ab34"), "12ab34");
    }

    #[test]
    fn normalize_handles_unusual_input_without_panicking() {
        let inputs = ["\u{0}", "🎉🎉", "\u{200f}\u{202e}abc", "٣٤٥", "a\r\nb"];
        for input in inputs {
            let _ = normalize(input);
        }
    }
}
