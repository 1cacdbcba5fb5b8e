//! The host page as seen by the tracker.
//!
//! The page's markup is owned by a third party and can change at any moment,
//! so everything above this module talks to it only through [`Page`] and
//! [`DomNode`]. `memory` provides the in-process implementation used by the
//! replay binary and the tests.

pub mod memory;
pub mod selector;

pub use selector::Selector;

use anyhow::Result;
use tokio::sync::broadcast;

/// Notifications the page pushes to subscribers.
#[derive(Debug, Clone)]
pub enum PageEvent<N> {
    /// Something under the body was added, removed or rewritten.
    Mutation,
    /// An input/keyup signal on a node.
    Input(N),
    /// A click, delivered with its target.
    Click(N),
}

pub trait DomNode: Clone + PartialEq + Send + Sync + 'static {
    /// Lowercase tag name.
    fn tag_name(&self) -> String;
    fn attribute(&self, name: &str) -> Option<String>;
    fn parent(&self) -> Option<Self>;
    fn children(&self) -> Vec<Self>;
    /// Whether the node is still reachable from the document body.
    fn is_connected(&self) -> bool;
    /// The settable scalar value. `Ok(None)` for nodes without native field
    /// semantics.
    fn value(&self) -> Result<Option<String>>;
    fn is_content_editable(&self) -> bool;
    /// Aggregate text of the node and its descendants.
    fn text_content(&self) -> Result<String>;
    /// Overwrite the node's text, the way a user edit would.
    fn replace_text(&self, text: &str) -> Result<()>;

    fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Descendants in document order, excluding `self`.
    fn descendants(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut stack: Vec<Self> = self.children().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            stack.extend(node.children().into_iter().rev());
            out.push(node);
        }
        out
    }

    fn query_selector(&self, selector: &Selector) -> Option<Self> {
        self.descendants().into_iter().find(|node| selector.matches(node))
    }

    /// Nearest inclusive ancestor matching `selector`.
    fn closest(&self, selector: &Selector) -> Option<Self> {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if selector.matches(&node) {
                return Some(node);
            }
            current = node.parent();
        }
        None
    }

    fn is_inclusive_descendant_of(&self, ancestor: &Self) -> bool {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if &node == ancestor {
                return true;
            }
            current = node.parent();
        }
        false
    }
}

pub trait Page: Send + Sync + 'static {
    type Node: DomNode;

    fn hostname(&self) -> String;
    fn body(&self) -> Option<Self::Node>;
    fn subscribe(&self) -> broadcast::Receiver<PageEvent<Self::Node>>;

    /// All connected nodes matching `selector`, in document order.
    fn query_selector_all(&self, selector: &Selector) -> Vec<Self::Node> {
        let Some(body) = self.body() else {
            return Vec::new();
        };
        let mut matches = Vec::new();
        if selector.matches(&body) {
            matches.push(body.clone());
        }
        matches.extend(
            body.descendants()
                .into_iter()
                .filter(|node| selector.matches(node)),
        );
        matches
    }

    fn query_selector(&self, selector: &Selector) -> Option<Self::Node> {
        let body = self.body()?;
        if selector.matches(&body) {
            return Some(body);
        }
        body.query_selector(selector)
    }
}
