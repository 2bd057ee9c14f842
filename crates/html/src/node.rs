//! Node and attribute data for the parse event model.
//!
//! Nodes live in an arena owned by the parse; `NodeId` handles are the only
//! cross-references. Parentage is navigational, never owning.

use std::cell::OnceCell;

use crate::atom::AtomId;
use crate::escape;

/// Handle into the parse's node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

/// Handle into the parse's event list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct EventId(pub(crate) u32);

/// A tag or attribute name: folded atom for matching, source spelling for
/// serialization.
#[derive(Clone, Debug)]
pub struct Name {
    atom: AtomId,
    raw: String,
}

impl Name {
    pub fn new(atom: AtomId, raw: impl Into<String>) -> Self {
        Name { atom, raw: raw.into() }
    }

    pub fn atom(&self) -> AtomId {
        self.atom
    }

    /// The spelling as it appeared in source (or as synthesized).
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// How an element's closing is rendered by the writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseStyle {
    /// Closed implicitly by a subsequent tag per the auto-close tables.
    AutoClose,
    /// Void element; the grammar closes it.
    ImplicitClose,
    /// Matching `</tag>` seen (or required).
    ExplicitClose,
    /// Self-closed `<tag/>` in source.
    BriefClose,
    /// Still open at end of document.
    Unclosed,
    /// Excluded from serialization while staying in the tree.
    Invisible,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QuoteStyle {
    #[default]
    NoQuote,
    SingleQuote,
    DoubleQuote,
}

impl QuoteStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            QuoteStyle::NoQuote => "",
            QuoteStyle::SingleQuote => "'",
            QuoteStyle::DoubleQuote => "\"",
        }
    }
}

/// One attribute occurrence. Duplicates are legal HTML and round-trip in
/// insertion order.
#[derive(Debug)]
pub struct Attribute {
    name: Name,
    escaped: Option<String>,
    quote: QuoteStyle,
    // Lazily decoded; `None` inside means decode error.
    decoded: OnceCell<Option<String>>,
}

impl Attribute {
    pub fn new(name: Name, escaped: Option<String>, quote: QuoteStyle) -> Self {
        Attribute { name, escaped, quote, decoded: OnceCell::new() }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn quote_style(&self) -> QuoteStyle {
        self.quote
    }

    pub fn set_quote_style(&mut self, quote: QuoteStyle) {
        self.quote = quote;
    }

    /// The value exactly as it will serialize; `None` for a valueless
    /// (boolean) attribute.
    pub fn escaped_value(&self) -> Option<&str> {
        self.escaped.as_deref()
    }

    /// Decoded value, `None` both when the attribute has no value and when
    /// decoding failed; `decoding_error` distinguishes the two.
    pub fn decoded_value_or_none(&self) -> Option<&str> {
        self.decode().as_deref()
    }

    pub fn decoding_error(&self) -> bool {
        self.escaped.is_some() && self.decode().is_none()
    }

    fn decode(&self) -> &Option<String> {
        self.decoded
            .get_or_init(|| self.escaped.as_deref().and_then(escape::unescape))
    }

    /// Replace the value with a raw string, escaping it for serialization.
    pub fn set_value(&mut self, unescaped: &str) {
        self.escaped = Some(escape::escape(unescaped));
        self.decoded = OnceCell::new();
    }

    /// Replace the value with an already-escaped string.
    pub fn set_escaped_value(&mut self, escaped: Option<&str>) {
        self.escaped = escaped.map(str::to_string);
        self.decoded = OnceCell::new();
    }
}

#[derive(Debug)]
pub struct Element {
    name: Name,
    attributes: Vec<Attribute>,
    style: CloseStyle,
}

impl Element {
    pub fn new(name: Name) -> Self {
        Element { name, attributes: Vec::new(), style: CloseStyle::AutoClose }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn style(&self) -> CloseStyle {
        self.style
    }

    pub fn set_style(&mut self, style: CloseStyle) {
        self.style = style;
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut [Attribute] {
        &mut self.attributes
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// First attribute with the given (folded) name, if any.
    pub fn find_attribute(&self, atom: AtomId) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name.atom() == atom)
    }

    pub fn find_attribute_mut(&mut self, atom: AtomId) -> Option<&mut Attribute> {
        self.attributes.iter_mut().find(|a| a.name.atom() == atom)
    }

    pub fn delete_attribute(&mut self, atom: AtomId) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|a| a.name.atom() != atom);
        self.attributes.len() != before
    }
}

/// Tagged node payload; leaf variants carry their raw text.
#[derive(Debug)]
pub enum NodeData {
    Element(Element),
    Characters(String),
    Comment(String),
    Cdata(String),
    IeDirective(String),
    Directive(String),
}

impl NodeData {
    pub fn is_element(&self) -> bool {
        matches!(self, NodeData::Element(_))
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Short human-readable description for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            NodeData::Element(e) => format!("<{}>", e.name().as_str()),
            NodeData::Characters(s) => format!("characters {:?}", truncate(s)),
            NodeData::Comment(s) => format!("comment {:?}", truncate(s)),
            NodeData::Cdata(s) => format!("cdata {:?}", truncate(s)),
            NodeData::IeDirective(s) => format!("ie-directive {:?}", truncate(s)),
            NodeData::Directive(s) => format!("directive {:?}", truncate(s)),
        }
    }
}

fn truncate(s: &str) -> &str {
    let mut end = s.len().min(40);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
