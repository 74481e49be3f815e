//! Structured-text mapping
//!
//! The adapter maps the bank model onto a neutral tree of named nodes with
//! string attributes. Concrete tag syntax (XML escaping, declarations,
//! indentation) belongs to the rendering layer outside this crate; the
//! node/field set and nesting defined here is the contract.
//!
//! Internal table indices never appear in the tree: every shared entity
//! gets a stable identifier (`envelope_00`, `sample_03`, ...) and
//! cross-references use those, so hand-edited documents never deal in raw
//! offsets. Import re-resolves identifiers to fresh indices.

mod export;
mod import;

#[cfg(test)]
mod tests;

pub use export::to_text;
pub use import::from_text;

/// One node of the structured-text tree: a name, ordered attributes, and
/// ordered children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextNode {
    /// Node name (tag)
    pub name: String,
    /// Attributes in document order
    pub attrs: Vec<(String, String)>,
    /// Child nodes in document order
    pub children: Vec<TextNode>,
}

impl TextNode {
    /// Create an empty node
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder-style attribute append
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    /// Append an attribute
    pub fn set(&mut self, key: &str, value: impl ToString) {
        self.attrs.push((key.to_string(), value.to_string()));
    }

    /// Append a child node
    pub fn push(&mut self, child: TextNode) {
        self.children.push(child);
    }

    /// Look up an attribute by key
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given name
    pub fn child(&self, name: &str) -> Option<&TextNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given name, in document order
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a TextNode> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// Build the stable identifier for table entry `index` of a given kind
pub(crate) fn ident(kind: &str, index: usize) -> String {
    format!("{kind}_{index:02}")
}

#[cfg(test)]
mod node_tests {
    use super::*;

    #[test]
    fn test_node_helpers() {
        let mut node = TextNode::new("sample").with("id", "sample_00").with("size", 900);
        node.push(TextNode::new("point"));
        node.push(TextNode::new("point"));

        assert_eq!(node.attr("id"), Some("sample_00"));
        assert_eq!(node.attr("size"), Some("900"));
        assert_eq!(node.attr("missing"), None);
        assert_eq!(node.children_named("point").count(), 2);
        assert!(node.child("region").is_none());
    }

    #[test]
    fn test_ident_format() {
        assert_eq!(ident("instrument", 3), "instrument_03");
        assert_eq!(ident("sample", 120), "sample_120");
    }
}
