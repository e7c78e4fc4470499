use serde::{Deserialize, Serialize};

/// A note as read from a search overlay or a detail page. Missing fields keep
/// their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedNote {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub url: String,
    pub author: String,
    pub likes: u64,
    pub collects: u64,
    pub comments: u64,
    pub published_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedComment {
    pub author: String,
    pub content: String,
    pub likes: u64,
    pub time: String,
}

/// Reads counters as rendered on the site: `1234`, `1.2万`, `3.5w`, `2k`.
/// Anything else, including the placeholder labels shown for zero, is 0.
pub fn parse_count(raw: &str) -> u64 {
    let cleaned = raw.trim().replace([',', '+'], "");
    let (number, multiplier) = if let Some(value) = cleaned.strip_suffix('万') {
        (value, 10_000.0)
    } else if let Some(value) = cleaned
        .strip_suffix('w')
        .or_else(|| cleaned.strip_suffix('W'))
    {
        (value, 10_000.0)
    } else if let Some(value) = cleaned
        .strip_suffix('k')
        .or_else(|| cleaned.strip_suffix('K'))
    {
        (value, 1_000.0)
    } else {
        (cleaned.as_str(), 1.0)
    };
    match number.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => (value * multiplier).round() as u64,
        _ => 0,
    }
}
