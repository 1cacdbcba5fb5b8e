use crate::dom::{DomNode, Page, Selector};
use crate::platform::Platform;

use super::patterns::{input_patterns, submit_patterns, InputPattern};

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "locator";

use crate::{log_debug, log_info};

/// The prompt input currently being watched.
#[derive(Debug, Clone)]
pub struct LocatedInput<N> {
    pub node: N,
    pub submit: Option<N>,
    pub pattern: InputPattern,
}

impl<N: DomNode> LocatedInput<N> {
    pub fn is_attached(&self) -> bool {
        self.node.is_connected()
    }

    /// Whether a click on `target` lands on this input's submit control.
    pub fn is_submit_click(&self, target: &N) -> bool {
        self.submit
            .as_ref()
            .map(|submit| target.is_inclusive_descendant_of(submit))
            .unwrap_or(false)
    }
}

pub struct InputLocator {
    platform: Platform,
    patterns: Vec<InputPattern>,
    submit: Vec<Selector>,
    scope: Option<Selector>,
}

impl InputLocator {
    pub fn new(platform: Platform, extra_patterns: &[String]) -> Self {
        Self {
            platform,
            patterns: input_patterns(platform, extra_patterns),
            submit: submit_patterns(),
            scope: Selector::parse("form").ok(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// First pattern, in list order, that matches anything wins. `None` means
    /// not found yet; the caller retries.
    pub fn locate<P: Page>(&self, page: &P) -> Option<LocatedInput<P::Node>> {
        for pattern in &self.patterns {
            let Some(node) = page.query_selector(&pattern.selector) else {
                continue;
            };
            let submit = self.find_submit(page, &node);
            log_info!(
                "input found via {:?} pattern '{}' (submit control: {})",
                pattern.kind,
                pattern.selector,
                if submit.is_some() { "yes" } else { "no" }
            );
            return Some(LocatedInput {
                node,
                submit,
                pattern: pattern.clone(),
            });
        }

        log_debug!("no input pattern matched on {}", page.hostname());
        None
    }

    /// Closest form (else the parent) first, then the whole document.
    fn find_submit<P: Page>(&self, page: &P, input: &P::Node) -> Option<P::Node> {
        let scope = self
            .scope
            .as_ref()
            .and_then(|form| input.closest(form))
            .or_else(|| input.parent());

        if let Some(scope) = scope {
            for selector in &self.submit {
                if let Some(button) = scope.query_selector(selector) {
                    return Some(button);
                }
            }
        }

        self.submit
            .iter()
            .find_map(|selector| page.query_selector(selector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::{MemoryPage, NodeSpec};
    use crate::sensing::patterns::PatternKind;

    #[test]
    fn returns_none_when_nothing_matches() {
        let page = MemoryPage::new("chatgpt.com");
        page.mount_in_body(NodeSpec::new("div").text("loading"));
        let locator = InputLocator::new(Platform::Chatgpt, &[]);
        assert!(locator.locate(&page).is_none());
    }

    #[test]
    fn pattern_order_beats_document_order() {
        let page = MemoryPage::new("chatgpt.com");
        // A generic textarea earlier in the document than the real input.
        page.mount_in_body(NodeSpec::new("textarea").attr("name", "search"));
        let prompt = page.mount_in_body(NodeSpec::new("textarea").attr("id", "prompt-textarea"));

        let locator = InputLocator::new(Platform::Chatgpt, &[]);
        let located = locator.locate(&page).unwrap();
        assert_eq!(located.node, prompt);
        assert_eq!(located.pattern.selector.as_str(), "#prompt-textarea");
    }

    #[test]
    fn falls_back_to_generic_patterns() {
        let page = MemoryPage::new("claude.ai");
        let textarea = page.mount_in_body(
            NodeSpec::new("textarea").attr("placeholder", "Send a message..."),
        );
        let locator = InputLocator::new(Platform::Claude, &[]);
        let located = locator.locate(&page).unwrap();
        assert_eq!(located.node, textarea);
        assert_eq!(located.pattern.kind, PatternKind::Placeholder);
    }

    #[test]
    fn finds_submit_control_inside_the_form() {
        let page = MemoryPage::new("chatgpt.com");
        let stray = page.mount_in_body(NodeSpec::new("button").attr("type", "submit"));
        let form = page.mount_in_body(
            NodeSpec::new("form")
                .child(NodeSpec::new("textarea").attr("id", "prompt-textarea"))
                .child(
                    NodeSpec::new("button")
                        .attr("data-testid", "send-button")
                        .child(NodeSpec::new("svg")),
                ),
        );
        let send = form.children()[1].clone();

        let located = InputLocator::new(Platform::Chatgpt, &[])
            .locate(&page)
            .unwrap();
        assert_eq!(located.submit.as_ref(), Some(&send));
        assert!(located.is_submit_click(&send.children()[0]));
        assert!(!located.is_submit_click(&stray));
    }

    #[test]
    fn submit_search_falls_back_to_document() {
        let page = MemoryPage::new("perplexity.ai");
        page.mount_in_body(NodeSpec::new("div").child(NodeSpec::new("textarea")));
        let button = page.mount_in_body(NodeSpec::new("button").attr("aria-label", "Send"));

        let located = InputLocator::new(Platform::Perplexity, &[])
            .locate(&page)
            .unwrap();
        assert_eq!(located.submit, Some(button));
    }

    #[test]
    fn missing_submit_control_is_not_an_error() {
        let page = MemoryPage::new("perplexity.ai");
        page.mount_in_body(NodeSpec::new("textarea"));
        let located = InputLocator::new(Platform::Perplexity, &[])
            .locate(&page)
            .unwrap();
        assert!(located.submit.is_none());
        assert!(located.is_attached());
    }
}
