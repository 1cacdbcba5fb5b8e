pub mod format;
pub mod optimizer;

pub use optimizer::{optimize_prompt, Optimization};

use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Heuristic: one token per four characters.
const CHARS_PER_TOKEN: f64 = 4.0;

/// Grid carbon intensity in gCO2 per kWh (US average).
pub const CARBON_INTENSITY_G_PER_KWH: f64 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnergyEstimate {
    pub energy_wh: f64,
    pub carbon_g: f64,
    pub tokens: u64,
}

/// Energy per token in Wh.
pub fn energy_per_token(platform: Platform) -> f64 {
    match platform {
        Platform::Chatgpt => 0.0004,
        Platform::Claude => 0.0003,
        Platform::Gemini => 0.0002,
        Platform::Perplexity => 0.0003,
        Platform::Default => 0.0003,
    }
}

/// Zero for whitespace-only text, otherwise `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> u64 {
    if text.trim().is_empty() {
        return 0;
    }
    let chars = text.chars().count() as f64;
    (chars / CHARS_PER_TOKEN).ceil() as u64
}

pub fn carbon_for(energy_wh: f64) -> f64 {
    energy_wh / 1000.0 * CARBON_INTENSITY_G_PER_KWH
}

pub fn estimate(text: &str, platform: Platform) -> EnergyEstimate {
    let tokens = estimate_tokens(text);
    let energy_wh = tokens as f64 * energy_per_token(platform);
    EnergyEstimate {
        energy_wh,
        carbon_g: carbon_for(energy_wh),
        tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_only_text_costs_nothing() {
        for text in ["", " ", "\n\t  "] {
            assert_eq!(estimate(text, Platform::Chatgpt), EnergyEstimate::default());
        }
    }

    #[test]
    fn tokens_are_positive_and_grow_with_length() {
        let mut previous = 0;
        for len in 1..=64 {
            let text = "x".repeat(len);
            let tokens = estimate(&text, Platform::Default).tokens;
            assert!(tokens > 0);
            assert!(tokens >= previous, "length {len} produced fewer tokens");
            previous = tokens;
        }
    }

    #[test]
    fn energy_scales_with_platform_constant() {
        let text = "a".repeat(40);
        let chatgpt = estimate(&text, Platform::Chatgpt);
        let gemini = estimate(&text, Platform::Gemini);

        assert_eq!(chatgpt.tokens, 10);
        assert!((chatgpt.energy_wh - 0.004).abs() < 1e-12);
        assert!((gemini.energy_wh - 0.002).abs() < 1e-12);
        assert!((chatgpt.carbon_g - 0.002).abs() < 1e-12);
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(estimate_tokens("éééé"), 1);
        assert_eq!(estimate_tokens("ééééé"), 2);
    }
}
