//! XML rendering of the structured-text tree
//!
//! The core crate works on a neutral node tree; this module pins the
//! concrete syntax: an XML declaration, two-space indentation, attributes
//! in model order, self-closing tags for leaf nodes. Parsing accepts any
//! well-formed XML of the same shape and ignores comments, but rejects
//! text content since the format is attribute-only.

use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use zbank::TextNode;

/// Render a node tree as an XML document
pub fn render(root: &TextNode) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    write_node(&mut writer, root)?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    String::from_utf8(bytes).context("rendered XML is not valid UTF-8")
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &TextNode) -> Result<()> {
    let mut start = BytesStart::new(node.name.as_str());
    for (key, value) in &node.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if node.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
    } else {
        writer.write_event(Event::Start(start))?;
        for child in &node.children {
            write_node(writer, child)?;
        }
        writer.write_event(Event::End(BytesEnd::new(node.name.as_str())))?;
    }
    Ok(())
}

/// Parse an XML document into a node tree
pub fn parse(text: &str) -> Result<TextNode> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<TextNode> = Vec::new();
    let mut root: Option<TextNode> = None;

    loop {
        match reader.read_event().context("malformed XML")? {
            Event::Start(start) => stack.push(node_from(&start)?),
            Event::Empty(start) => {
                let node = node_from(&start)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                // The reader has already verified tag balance
                let node = stack.pop().context("closing tag without an opener")?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                if !text.trim().is_empty() {
                    bail!("unexpected text content {:?}", text.trim());
                }
            }
            Event::Eof => break,
            // Declarations, comments and processing instructions carry no data
            _ => {}
        }
    }

    root.context("document has no root element")
}

fn node_from(start: &BytesStart) -> Result<TextNode> {
    let name = std::str::from_utf8(start.name().as_ref())
        .context("tag name is not valid UTF-8")?
        .to_string();

    let mut node = TextNode::new(name);
    for attr in start.attributes() {
        let attr = attr.context("malformed attribute")?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .context("attribute name is not valid UTF-8")?;
        let value = attr.unescape_value()?;
        node.set(key, value);
    }
    Ok(node)
}

fn attach(
    stack: &mut Vec<TextNode>,
    root: &mut Option<TextNode>,
    node: TextNode,
) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.push(node);
    } else if root.is_none() {
        *root = Some(node);
    } else {
        bail!("document has more than one root element");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> TextNode {
        let mut root = TextNode::new("bank")
            .with("name", "test")
            .with("medium", 2);
        let mut envelopes = TextNode::new("envelopes");
        envelopes.push(
            TextNode::new("envelope").with("id", "envelope_00").with(
                "note",
                "a value with <angles> & ampersands \"quoted\"",
            ),
        );
        root.push(envelopes);
        root
    }

    #[test]
    fn test_render_parse_round_trip() {
        let tree = sample_tree();
        let xml = render(&tree).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert_eq!(parse(&xml).unwrap(), tree);
    }

    #[test]
    fn test_parse_accepts_comments_and_whitespace() {
        let xml = r#"<?xml version="1.0"?>
            <!-- hand-written -->
            <bank name="x">
                <envelopes/>
            </bank>"#;
        let tree = parse(xml).unwrap();
        assert_eq!(tree.name, "bank");
        assert_eq!(tree.attr("name"), Some("x"));
        assert_eq!(tree.children.len(), 1);
    }

    #[test]
    fn test_parse_rejects_text_content() {
        assert!(parse("<bank>stray text</bank>").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_document() {
        assert!(parse("<!-- nothing here -->").is_err());
    }
}
