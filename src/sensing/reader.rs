use anyhow::Result;

use crate::dom::DomNode;

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "reader";

use crate::log_debug;

/// Current text of the prompt input. Never fails: a read error is treated as
/// an empty field.
pub fn read_value<N: DomNode>(node: &N) -> String {
    match try_read(node) {
        Ok(text) => text,
        Err(err) => {
            log_debug!("read failed, treating as empty: {err:#}");
            String::new()
        }
    }
}

fn try_read<N: DomNode>(node: &N) -> Result<String> {
    if let Some(text) = read_direct(node)? {
        return Ok(text);
    }

    // Wrapper element: descend to the first real field.
    for descendant in node.descendants() {
        if let Some(text) = read_direct(&descendant)? {
            return Ok(text);
        }
    }

    node.text_content()
}

/// Native field value, else the text of an editable region.
fn read_direct<N: DomNode>(node: &N) -> Result<Option<String>> {
    if let Some(value) = node.value()? {
        return Ok(Some(value));
    }
    if node.is_content_editable() {
        return node.text_content().map(Some);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::{MemoryPage, NodeSpec};

    #[test]
    fn native_field_reads_its_value() {
        let page = MemoryPage::new("chatgpt.com");
        let textarea = page.mount_in_body(NodeSpec::new("textarea").value("hello").text("ignored"));
        assert_eq!(read_value(&textarea), "hello");
    }

    #[test]
    fn editable_region_reads_rendered_text() {
        let page = MemoryPage::new("claude.ai");
        let editor = page.mount_in_body(
            NodeSpec::new("div")
                .attr("contenteditable", "true")
                .child(NodeSpec::new("p").text("hello "))
                .child(NodeSpec::new("p").text("world")),
        );
        assert_eq!(read_value(&editor), "hello world");
    }

    #[test]
    fn wrapper_descends_to_first_field() {
        let page = MemoryPage::new("gemini.google.com");
        let wrapper = page.mount_in_body(
            NodeSpec::new("div")
                .class("text-input-field-main-area")
                .child(NodeSpec::new("span").text("Enter a prompt here"))
                .child(NodeSpec::new("textarea").value("draft")),
        );
        assert_eq!(read_value(&wrapper), "draft");
    }

    #[test]
    fn plain_container_falls_back_to_aggregate_text() {
        let page = MemoryPage::new("gemini.google.com");
        let wrapper = page.mount_in_body(
            NodeSpec::new("div")
                .child(NodeSpec::new("span").text("a"))
                .child(NodeSpec::new("span").text("b")),
        );
        assert_eq!(read_value(&wrapper), "ab");
    }

    #[test]
    fn read_errors_become_empty() {
        let page = MemoryPage::new("chatgpt.com");
        let textarea = page.mount_in_body(NodeSpec::new("textarea").value("hello"));
        page.set_broken(&textarea, true);
        assert_eq!(read_value(&textarea), "");
    }
}
