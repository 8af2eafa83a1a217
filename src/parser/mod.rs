pub mod menu;
pub mod nutrition;

use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Element text with runs of whitespace collapsed and ends trimmed.
pub(crate) fn element_text(el: ElementRef) -> String {
    let raw: String = el.text().collect();
    WHITESPACE_RE.replace_all(raw.trim(), " ").to_string()
}
