//! Rule-based prompt shortening.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::platform::Platform;

use super::{estimate, estimate_tokens};

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "optimizer";

use crate::log_warn;

/// Applied in order. Politeness and filler first, then phrase rewrites.
const RULES: &[(&str, &str)] = &[
    (r"(?i)\bplease\b,?\s*", ""),
    (r"(?i)\bkindly\s+", ""),
    (r"(?i)\bjust\b\s*", ""),
    (r"(?i)\breally\s+", ""),
    (r"(?i)\bbasically\b,?\s*", ""),
    (r"(?i)\bactually\b,?\s*", ""),
    (r"(?i)\bi was wondering if you could\s+", ""),
    (r"(?i)\bi would like you to\s+", ""),
    (r"(?i)\bcould you (?:possibly )?", ""),
    (r"(?i)\bthank(?:s| you)(?: so much)?\b[.!]?\s*", ""),
    (r"(?i)\bin order to\b", "to"),
    (r"(?i)\bdue to the fact that\b", "because"),
    (r"(?i)\bat this point in time\b", "now"),
    (r"(?i)\bin the event that\b", "if"),
    (r"(?i)\bfor the purpose of\b", "for"),
    (r"(?i)\ba large number of\b", "many"),
];

static COMPILED_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    RULES
        .iter()
        .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
            Ok(regex) => Some((regex, *replacement)),
            Err(err) => {
                log_warn!("skipping rule {pattern}: {err}");
                None
            }
        })
        .collect()
});

static HORIZONTAL_SPACE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[ \t]{2,}").ok());

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Optimization {
    pub original: String,
    pub optimized: String,
    pub original_tokens: u64,
    pub optimized_tokens: u64,
    pub energy_saved: f64,
    pub percent_saved: u32,
}

pub fn optimize_prompt(text: &str, platform: Platform) -> Optimization {
    let mut optimized = text.to_string();
    for (regex, replacement) in COMPILED_RULES.iter() {
        optimized = regex.replace_all(&optimized, *replacement).into_owned();
    }
    if let Some(spaces) = HORIZONTAL_SPACE.as_ref() {
        optimized = spaces.replace_all(&optimized, " ").into_owned();
    }
    let optimized = optimized
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    let original_tokens = estimate_tokens(text);
    let optimized_tokens = estimate_tokens(&optimized);
    let energy_saved =
        (estimate(text, platform).energy_wh - estimate(&optimized, platform).energy_wh).max(0.0);
    let percent_saved = if original_tokens == 0 {
        0
    } else {
        (original_tokens.saturating_sub(optimized_tokens) * 100 / original_tokens) as u32
    };

    Optimization {
        original: text.to_string(),
        optimized,
        original_tokens,
        optimized_tokens,
        energy_saved,
        percent_saved,
    }
}
