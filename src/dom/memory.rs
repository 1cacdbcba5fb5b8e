//! In-process page: a small mutable node tree with the same notification
//! behaviour the tracker expects from a live document.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::{DomNode, Page, PageEvent, Selector};
use crate::utils::{read, write};

const EVENT_CAPACITY: usize = 256;

type NodeId = usize;

/// Declarative description of a subtree to mount.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSpec {
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        let entry = self.attrs.entry("class".to_string()).or_default();
        if !entry.is_empty() {
            entry.push(' ');
        }
        entry.push_str(class);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug)]
struct NodeData {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    value: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    broken: bool,
}

impl NodeData {
    fn has_native_value(&self) -> bool {
        matches!(self.tag.as_str(), "textarea" | "input")
    }
}

struct Document {
    nodes: Vec<NodeData>,
    body: NodeId,
}

impl Document {
    fn insert(&mut self, parent: Option<NodeId>, spec: NodeSpec) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(NodeData {
            tag: spec.tag.to_ascii_lowercase(),
            attrs: spec
                .attrs
                .into_iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value))
                .collect(),
            text: spec.text,
            value: spec.value,
            parent,
            children: Vec::new(),
            broken: false,
        });
        for child in spec.children {
            let child_id = self.insert(Some(id), child);
            self.nodes[id].children.push(child_id);
        }
        id
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|child| *child != id);
        }
    }

    fn is_connected(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.body {
                return true;
            }
            current = self.nodes[node].parent;
        }
        false
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        out.push_str(&node.text);
        for child in &node.children {
            self.collect_text(*child, out);
        }
    }
}

struct Shared {
    hostname: String,
    document: RwLock<Document>,
    events: broadcast::Sender<PageEvent<MemoryNode>>,
}

impl Shared {
    fn emit(&self, event: PageEvent<MemoryNode>) {
        // No subscribers is fine; nobody is watching yet.
        let _ = self.events.send(event);
    }
}

#[derive(Clone)]
pub struct MemoryPage {
    shared: Arc<Shared>,
}

impl MemoryPage {
    pub fn new(hostname: impl Into<String>) -> Self {
        let mut document = Document {
            nodes: Vec::new(),
            body: 0,
        };
        document.body = document.insert(None, NodeSpec::new("body"));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                hostname: hostname.into(),
                document: RwLock::new(document),
                events,
            }),
        }
    }

    pub fn body_node(&self) -> MemoryNode {
        let body = read(&self.shared.document).body;
        self.node(body)
    }

    fn node(&self, id: NodeId) -> MemoryNode {
        MemoryNode {
            shared: Arc::clone(&self.shared),
            id,
        }
    }

    pub fn mount(&self, parent: &MemoryNode, spec: NodeSpec) -> MemoryNode {
        let id = {
            let mut document = write(&self.shared.document);
            let id = document.insert(Some(parent.id), spec);
            document.nodes[parent.id].children.push(id);
            id
        };
        self.shared.emit(PageEvent::Mutation);
        self.node(id)
    }

    pub fn mount_in_body(&self, spec: NodeSpec) -> MemoryNode {
        let body = self.body_node();
        self.mount(&body, spec)
    }

    pub fn remove(&self, node: &MemoryNode) {
        write(&self.shared.document).detach(node.id);
        self.shared.emit(PageEvent::Mutation);
    }

    /// Swap `old` for a freshly mounted subtree at the same position.
    pub fn replace(&self, old: &MemoryNode, spec: NodeSpec) -> Option<MemoryNode> {
        let id = {
            let mut document = write(&self.shared.document);
            let parent = document.nodes[old.id].parent?;
            let position = document.nodes[parent]
                .children
                .iter()
                .position(|child| *child == old.id)?;
            document.detach(old.id);
            let id = document.insert(Some(parent), spec);
            document.nodes[parent].children.insert(position, id);
            id
        };
        self.shared.emit(PageEvent::Mutation);
        Some(self.node(id))
    }

    /// Simulate the user (or the host page) rewriting the node's text.
    pub fn type_text(&self, node: &MemoryNode, text: &str) -> Result<()> {
        node.replace_text(text)
    }

    pub fn click(&self, node: &MemoryNode) {
        self.shared.emit(PageEvent::Click(node.clone()));
    }

    /// Make reads on `node` fail, as when the host restructures it mid-read.
    pub fn set_broken(&self, node: &MemoryNode, broken: bool) {
        write(&self.shared.document).nodes[node.id].broken = broken;
    }

    pub fn find(&self, selector: &str) -> Result<Option<MemoryNode>> {
        let selector = Selector::parse(selector)?;
        Ok(self.query_selector(&selector))
    }
}

impl Page for MemoryPage {
    type Node = MemoryNode;

    fn hostname(&self) -> String {
        self.shared.hostname.clone()
    }

    fn body(&self) -> Option<MemoryNode> {
        Some(self.body_node())
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent<MemoryNode>> {
        self.shared.events.subscribe()
    }
}

#[derive(Clone)]
pub struct MemoryNode {
    shared: Arc<Shared>,
    id: NodeId,
}

impl MemoryNode {
    fn with<R>(&self, f: impl FnOnce(&NodeData) -> R) -> R {
        let document = read(&self.shared.document);
        f(&document.nodes[self.id])
    }

    fn sibling(&self, id: NodeId) -> MemoryNode {
        MemoryNode {
            shared: Arc::clone(&self.shared),
            id,
        }
    }

    fn check_readable(&self) -> Result<()> {
        if self.with(|node| node.broken) {
            return Err(anyhow!("node #{} changed while being read", self.id));
        }
        Ok(())
    }
}

impl PartialEq for MemoryNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared) && self.id == other.id
    }
}

impl fmt::Debug for MemoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.with(|node| node.tag.clone());
        write!(f, "MemoryNode(#{} <{}>)", self.id, tag)
    }
}

impl DomNode for MemoryNode {
    fn tag_name(&self) -> String {
        self.with(|node| node.tag.clone())
    }

    fn attribute(&self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        self.with(|node| node.attrs.get(&name).cloned())
    }

    fn parent(&self) -> Option<Self> {
        self.with(|node| node.parent).map(|id| self.sibling(id))
    }

    fn children(&self) -> Vec<Self> {
        self.with(|node| node.children.clone())
            .into_iter()
            .map(|id| self.sibling(id))
            .collect()
    }

    fn is_connected(&self) -> bool {
        read(&self.shared.document).is_connected(self.id)
    }

    fn value(&self) -> Result<Option<String>> {
        self.check_readable()?;
        Ok(self.with(|node| {
            node.has_native_value()
                .then(|| node.value.clone().unwrap_or_default())
        }))
    }

    fn is_content_editable(&self) -> bool {
        let document = read(&self.shared.document);
        let mut current = Some(self.id);
        while let Some(id) = current {
            let node = &document.nodes[id];
            match node.attrs.get("contenteditable").map(String::as_str) {
                Some("false") => return false,
                Some("true") | Some("") | Some("plaintext-only") => return true,
                _ => {}
            }
            current = node.parent;
        }
        false
    }

    fn text_content(&self) -> Result<String> {
        self.check_readable()?;
        let document = read(&self.shared.document);
        let mut out = String::new();
        document.collect_text(self.id, &mut out);
        Ok(out)
    }

    fn replace_text(&self, text: &str) -> Result<()> {
        self.check_readable()?;
        let native = {
            let mut document = write(&self.shared.document);
            if document.nodes[self.id].has_native_value() {
                document.nodes[self.id].value = Some(text.to_string());
                true
            } else {
                let children = std::mem::take(&mut document.nodes[self.id].children);
                for child in children {
                    document.nodes[child].parent = None;
                }
                document.nodes[self.id].text = text.to_string();
                false
            }
        };
        if !native {
            self.shared.emit(PageEvent::Mutation);
        }
        self.shared.emit(PageEvent::Input(self.clone()));
        Ok(())
    }
}
