use std::fmt;

use serde::{Deserialize, Serialize};

/// The chat site hosting the page. Derived once from the origin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Platform {
    Chatgpt,
    Claude,
    Gemini,
    Perplexity,
    Default,
}

impl Default for Platform {
    fn default() -> Self {
        Platform::Default
    }
}

impl Platform {
    pub fn from_hostname(hostname: &str) -> Self {
        let host = hostname.to_ascii_lowercase();
        if host.contains("chatgpt.com") || host.contains("openai.com") {
            Platform::Chatgpt
        } else if host.contains("claude.ai") {
            Platform::Claude
        } else if host.contains("gemini.google.com") {
            Platform::Gemini
        } else if host.contains("perplexity.ai") {
            Platform::Perplexity
        } else {
            Platform::Default
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Chatgpt => "chatgpt",
            Platform::Claude => "claude",
            Platform::Gemini => "gemini",
            Platform::Perplexity => "perplexity",
            Platform::Default => "default",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "chatgpt" => Platform::Chatgpt,
            "claude" => Platform::Claude,
            "gemini" => Platform::Gemini,
            "perplexity" => Platform::Perplexity,
            _ => Platform::Default,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_hosts() {
        assert_eq!(Platform::from_hostname("chatgpt.com"), Platform::Chatgpt);
        assert_eq!(Platform::from_hostname("chat.openai.com"), Platform::Chatgpt);
        assert_eq!(Platform::from_hostname("claude.ai"), Platform::Claude);
        assert_eq!(Platform::from_hostname("gemini.google.com"), Platform::Gemini);
        assert_eq!(Platform::from_hostname("www.perplexity.ai"), Platform::Perplexity);
    }

    #[test]
    fn unknown_host_falls_back_to_default() {
        assert_eq!(Platform::from_hostname("example.org"), Platform::Default);
        assert_eq!(Platform::from_hostname(""), Platform::Default);
    }

    #[test]
    fn string_form_round_trips_through_parse() {
        for platform in [
            Platform::Chatgpt,
            Platform::Claude,
            Platform::Gemini,
            Platform::Perplexity,
            Platform::Default,
        ] {
            assert_eq!(Platform::parse(platform.as_str()), platform);
        }
    }
}
