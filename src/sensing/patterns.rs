//! Ranked structural patterns for the prompt input and its submit control.
//!
//! This is configuration data: more specific patterns come first because they
//! are less likely to hit unrelated elements on the same page. The settings
//! file can prepend its own.

use serde::Serialize;

use crate::dom::Selector;
use crate::platform::Platform;

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "patterns";

use crate::log_warn;

const CHATGPT: &[&str] = &[
    "#prompt-textarea",
    "textarea[placeholder*=\"Message\"]",
    "div[contenteditable=\"true\"][role=\"textbox\"]",
];

const CLAUDE: &[&str] = &[
    "div.ProseMirror[contenteditable=\"true\"]",
    "fieldset div[contenteditable=\"true\"]",
    "div[contenteditable=\"true\"]",
];

const GEMINI: &[&str] = &[
    ".text-input-field-main-area",
    "rich-textarea.text-input-field_textarea",
    "rich-textarea[enterkeyhint=\"send\"]",
    ".text-input-field-main-area textarea",
];

const PERPLEXITY: &[&str] = &["textarea[placeholder*=\"Ask\"]", "textarea"];

const GENERIC: &[&str] = &[
    "textarea[placeholder*=\"Send a message\"]",
    "textarea[data-testid=\"textarea\"]",
    "#prompt-textarea",
    "input[placeholder*=\"Prompt\"]",
    "textarea[placeholder*=\"Message\"]",
    "[role=\"textbox\"][contenteditable=\"true\"]",
    "div[contenteditable=\"true\"]",
    "textarea",
];

const SUBMIT: &[&str] = &[
    "button[aria-label*=\"Send\"]",
    "button[type=\"submit\"]",
    "[data-testid*=\"send\"]",
    "button:has(svg)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternKind {
    ContainerClass,
    TagAttribute,
    Placeholder,
    AriaRole,
}

impl PatternKind {
    fn classify(selector: &Selector) -> Self {
        if selector.constrains_attribute("placeholder") {
            PatternKind::Placeholder
        } else if selector.constrains_attribute("role") {
            PatternKind::AriaRole
        } else if selector.constrains_class() {
            PatternKind::ContainerClass
        } else {
            PatternKind::TagAttribute
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputPattern {
    pub kind: PatternKind,
    pub selector: Selector,
}

fn platform_sources(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Chatgpt => CHATGPT,
        Platform::Claude => CLAUDE,
        Platform::Gemini => GEMINI,
        Platform::Perplexity => PERPLEXITY,
        Platform::Default => &[],
    }
}

/// Extra patterns, then the platform list, then the generic fallback.
/// Duplicates keep their first (highest) rank; unparsable entries are logged
/// and skipped.
pub fn input_patterns(platform: Platform, extra: &[String]) -> Vec<InputPattern> {
    let sources = extra
        .iter()
        .map(String::as_str)
        .chain(platform_sources(platform).iter().copied())
        .chain(GENERIC.iter().copied());

    let mut patterns: Vec<InputPattern> = Vec::new();
    for selector in compile(sources) {
        if patterns.iter().any(|p| p.selector == selector) {
            continue;
        }
        patterns.push(InputPattern {
            kind: PatternKind::classify(&selector),
            selector,
        });
    }
    patterns
}

pub fn submit_patterns() -> Vec<Selector> {
    compile(SUBMIT.iter().copied())
}

fn compile<'a>(sources: impl Iterator<Item = &'a str>) -> Vec<Selector> {
    sources
        .filter_map(|source| match Selector::parse(source) {
            Ok(selector) => Some(selector),
            Err(err) => {
                log_warn!("skipping pattern: {err:#}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_patterns_all_parse() {
        for source in CHATGPT
            .iter()
            .chain(CLAUDE)
            .chain(GEMINI)
            .chain(PERPLEXITY)
            .chain(GENERIC)
            .chain(SUBMIT)
        {
            assert!(Selector::parse(source).is_ok(), "{source}");
        }
    }

    #[test]
    fn platform_list_precedes_generic_fallback() {
        let patterns = input_patterns(Platform::Gemini, &[]);
        assert_eq!(patterns[0].selector.as_str(), ".text-input-field-main-area");
        assert_eq!(patterns[0].kind, PatternKind::ContainerClass);
        assert_eq!(patterns.last().unwrap().selector.as_str(), "textarea");
    }

    #[test]
    fn duplicates_keep_their_first_rank() {
        let patterns = input_patterns(Platform::Chatgpt, &[]);
        let count = patterns
            .iter()
            .filter(|p| p.selector.as_str() == "#prompt-textarea")
            .count();
        assert_eq!(count, 1);
        assert_eq!(patterns[0].selector.as_str(), "#prompt-textarea");
    }

    #[test]
    fn extra_patterns_go_first_and_bad_ones_are_skipped() {
        let extra = vec!["main > textarea".to_string(), "textarea.custom".to_string()];
        let patterns = input_patterns(Platform::Default, &extra);
        assert_eq!(patterns[0].selector.as_str(), "textarea.custom");
        assert!(patterns.iter().all(|p| p.selector.as_str() != "main > textarea"));
    }

    #[test]
    fn classifies_pattern_kinds() {
        let kinds: Vec<PatternKind> = input_patterns(Platform::Default, &[])
            .into_iter()
            .map(|p| p.kind)
            .collect();
        assert_eq!(kinds[0], PatternKind::Placeholder);
        assert_eq!(kinds[1], PatternKind::TagAttribute);
        assert!(kinds.contains(&PatternKind::AriaRole));
    }
}
