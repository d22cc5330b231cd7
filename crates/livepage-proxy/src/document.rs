//! Narrow DOM capability used by the mutator, and its kuchikiki backend.
//!
//! The mutator only needs a handful of operations, so the concrete HTML
//! library stays behind [`HtmlDocument`].

use kuchikiki::iter::NodeIterator;
use kuchikiki::traits::TendrilSink;
use kuchikiki::{NodeRef, Selectors};

/// Errors from parsing, querying or serializing a document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document is not valid UTF-8")]
    InvalidUtf8,

    #[error("document has no <html> element")]
    MissingRoot,

    #[error("invalid CSS selector `{0}`")]
    InvalidSelector(String),

    #[error("failed to serialize document: {0}")]
    Serialize(#[from] std::io::Error),
}

/// Mutable, queryable HTML tree.
pub trait HtmlDocument: Sized {
    /// Handle to one node in the tree.
    type Node: Clone;

    /// Parse a complete page. No base URL is taken: nothing in the tree is
    /// resolved against the live origin and scripts never run.
    fn parse(html: &[u8]) -> Result<Self, DocumentError>;

    /// First element matching `selector`, in document order.
    fn query_selector(&self, selector: &str) -> Result<Option<Self::Node>, DocumentError>;

    /// Every element matching `selector`, in document order.
    fn query_selector_all(&self, selector: &str) -> Result<Vec<Self::Node>, DocumentError>;

    fn get_element_by_id(&self, id: &str) -> Option<Self::Node>;

    /// Detach `node` (and its subtree) from the document.
    fn remove_node(&self, node: &Self::Node);

    /// Create a detached, empty `<div>` with the given id.
    fn create_container(&self, id: &str) -> Self::Node;

    /// Insert `node` as the immediately-following sibling of `anchor`.
    fn insert_after(&self, anchor: &Self::Node, node: Self::Node);

    /// Serialize the `<html>` element and everything under it. The doctype
    /// is not included.
    fn serialize(&self) -> Result<String, DocumentError>;
}

/// [`HtmlDocument`] backed by kuchikiki (html5ever + selectors).
pub struct KuchikiDocument {
    root: NodeRef,
}

impl KuchikiDocument {
    fn compile(selector: &str) -> Result<Selectors, DocumentError> {
        Selectors::compile(selector).map_err(|()| DocumentError::InvalidSelector(selector.to_string()))
    }

    fn html_element(&self) -> Option<NodeRef> {
        self.root
            .children()
            .find(|node| node.as_element().is_some_and(|e| &*e.name.local == "html"))
    }
}

impl HtmlDocument for KuchikiDocument {
    type Node = NodeRef;

    fn parse(html: &[u8]) -> Result<Self, DocumentError> {
        let text = std::str::from_utf8(html).map_err(|_| DocumentError::InvalidUtf8)?;
        let document = Self {
            root: kuchikiki::parse_html().one(text),
        };
        if document.html_element().is_none() {
            return Err(DocumentError::MissingRoot);
        }
        Ok(document)
    }

    fn query_selector(&self, selector: &str) -> Result<Option<NodeRef>, DocumentError> {
        let selectors = Self::compile(selector)?;
        Ok(self
            .root
            .descendants()
            .elements()
            .find(|element| selectors.matches(element))
            .map(|element| element.as_node().clone()))
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeRef>, DocumentError> {
        let selectors = Self::compile(selector)?;
        Ok(self
            .root
            .descendants()
            .elements()
            .filter(|element| selectors.matches(element))
            .map(|element| element.as_node().clone())
            .collect())
    }

    fn get_element_by_id(&self, id: &str) -> Option<NodeRef> {
        self.root
            .descendants()
            .elements()
            .find(|element| element.attributes.borrow().get("id") == Some(id))
            .map(|element| element.as_node().clone())
    }

    fn remove_node(&self, node: &NodeRef) {
        node.detach();
    }

    fn create_container(&self, id: &str) -> NodeRef {
        // Building a QualName needs html5ever's macros; parsing a stub keeps
        // this crate independent of the html5ever version kuchikiki pins.
        let stub = kuchikiki::parse_html().one("<div></div>");
        let div = stub
            .descendants()
            .elements()
            .find(|element| &*element.name.local == "div")
            .map(|element| {
                element
                    .attributes
                    .borrow_mut()
                    .insert("id", id.to_string());
                element.as_node().clone()
            })
            .unwrap_or_else(|| NodeRef::new_text(""));
        div.detach();
        div
    }

    fn insert_after(&self, anchor: &NodeRef, node: NodeRef) {
        anchor.insert_after(node);
    }

    fn serialize(&self) -> Result<String, DocumentError> {
        let html = self.html_element().ok_or(DocumentError::MissingRoot)?;
        let mut out = Vec::new();
        html.serialize(&mut out)?;
        String::from_utf8(out).map_err(|_| DocumentError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> KuchikiDocument {
        KuchikiDocument::parse(html.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_always_yields_html_root() {
        let doc = parse("<p>fragment</p>");
        assert_eq!(
            doc.serialize().unwrap(),
            "<html><head></head><body><p>fragment</p></body></html>"
        );
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let result = KuchikiDocument::parse(&[0x3c, 0x70, 0x3e, 0xff, 0xfe]);
        assert!(matches!(result, Err(DocumentError::InvalidUtf8)));
    }

    #[test]
    fn test_query_selector_and_all() {
        let doc = parse("<body><div class=a></div><span class=a></span></body>");
        assert!(doc.query_selector(".a").unwrap().is_some());
        assert!(doc.query_selector(".missing").unwrap().is_none());
        assert_eq!(doc.query_selector_all(".a").unwrap().len(), 2);
        assert!(matches!(
            doc.query_selector("div["),
            Err(DocumentError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_get_element_by_id_handles_css_special_characters() {
        let doc = parse(r#"<body><div id="app:main.1"></div></body>"#);
        assert!(doc.get_element_by_id("app:main.1").is_some());
        assert!(doc.get_element_by_id("app").is_none());
    }

    #[test]
    fn test_remove_and_insert_after() {
        let doc = parse("<body><header></header><script src=old.js></script></body>");

        for node in doc.query_selector_all("script").unwrap() {
            doc.remove_node(&node);
        }
        let header = doc.query_selector("header").unwrap().unwrap();
        let container = doc.create_container("root");
        doc.insert_after(&header, container);

        assert_eq!(
            doc.serialize().unwrap(),
            r#"<html><head></head><body><header></header><div id="root"></div></body></html>"#
        );
    }
}
