use std::sync::OnceLock;

use regex::Regex;

/// Pulls canonical note links out of copied share text.
#[derive(Debug, Clone)]
pub struct ShareLinkParser {
    short_link: Regex,
    canonical: Regex,
    permalink: Regex,
}

impl Default for ShareLinkParser {
    fn default() -> Self {
        Self {
            short_link: Regex::new(r"(?i)(https?://xhslink\.com/[a-zA-Z0-9/]+)")
                .expect("valid regex"),
            canonical: Regex::new(r"(?i)(https?://(?:www\.)?xiaohongshu\.com/[^，\s]+)")
                .expect("valid regex"),
            permalink: Regex::new(r"^https?://(?:www\.)?xiaohongshu\.com/(?:explore|discovery/item)/[0-9a-zA-Z]+")
                .expect("valid regex"),
        }
    }
}

impl ShareLinkParser {
    /// Short link first, then the canonical domain; otherwise `text` unchanged.
    pub fn extract<'a>(&self, text: &'a str) -> &'a str {
        if let Some(found) = self.short_link.captures(text).and_then(|caps| caps.get(1)) {
            return found.as_str();
        }
        if let Some(found) = self.canonical.captures(text).and_then(|caps| caps.get(1)) {
            return found.as_str();
        }
        text
    }

    pub fn is_permalink(&self, url: &str) -> bool {
        self.permalink.is_match(url)
    }
}

fn parser() -> &'static ShareLinkParser {
    static PARSER: OnceLock<ShareLinkParser> = OnceLock::new();
    PARSER.get_or_init(ShareLinkParser::default)
}

pub fn extract_note_url(text: &str) -> String {
    parser().extract(text).to_string()
}

pub fn is_note_permalink(url: &str) -> bool {
    parser().is_permalink(url)
}
