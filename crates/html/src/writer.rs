//! Serialization back to HTML text.
//!
//! `HtmlWriterFilter` sits at the end of a filter chain and re-emits the
//! event stream. Unmodified input must round-trip byte for byte, so tag
//! spellings, attribute quoting, and close styles are all preserved as
//! lexed; only programmatic mutations change the output.

use std::cell::RefCell;
use std::rc::Rc;

use log::warn;

use crate::filter::HtmlFilter;
use crate::node::{Attribute, CloseStyle, NodeData, NodeId, QuoteStyle};
use crate::parse::HtmlParse;

/// Output sink. Returns false on failure; the writer filter counts
/// failures rather than aborting mid-document.
pub trait Writer {
    fn write(&mut self, text: &str) -> bool;
}

impl Writer for String {
    fn write(&mut self, text: &str) -> bool {
        self.push_str(text);
        true
    }
}

/// Shared sink for callers that need to read the output while the filter
/// still owns it.
impl Writer for Rc<RefCell<String>> {
    fn write(&mut self, text: &str) -> bool {
        self.borrow_mut().push_str(text);
        true
    }
}

pub struct HtmlWriterFilter<W: Writer> {
    writer: W,
    // A BriefClose element whose ">" has not been written yet. If its end
    // event comes next it closes as "/>"; any other emission first
    // terminates the tag with ">".
    lazy_close_element: Option<NodeId>,
    lazy_close_needs_space: bool,
    case_fold: bool,
    max_column: Option<usize>,
    column: usize,
    write_errors: u32,
}

impl<W: Writer> HtmlWriterFilter<W> {
    pub fn new(writer: W) -> Self {
        HtmlWriterFilter {
            writer,
            lazy_close_element: None,
            lazy_close_needs_space: false,
            case_fold: false,
            max_column: None,
            column: 0,
            write_errors: 0,
        }
    }

    /// Lowercase tag and attribute names on output.
    pub fn set_case_fold(&mut self, fold: bool) {
        self.case_fold = fold;
    }

    /// Soft-wrap attribute lists at the given column.
    pub fn set_max_column(&mut self, max_column: Option<usize>) {
        self.max_column = max_column;
    }

    pub fn write_errors(&self) -> u32 {
        self.write_errors
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    fn emit(&mut self, text: &str) {
        if !self.writer.write(text) {
            self.write_errors += 1;
        }
        match text.rfind('\n') {
            Some(pos) => self.column = text.len() - pos - 1,
            None => self.column += text.len(),
        }
    }

    fn emit_name(&mut self, raw: &str) {
        if self.case_fold {
            let folded = raw.to_ascii_lowercase();
            self.emit(&folded);
        } else {
            self.emit(raw);
        }
    }

    fn terminate_lazy_close(&mut self) {
        if self.lazy_close_element.take().is_some() {
            self.emit(">");
        }
    }

    fn emit_attribute(&mut self, attribute: &Attribute) {
        // +1 for the separating space.
        let width = 1 + attribute_width(attribute);
        match self.max_column {
            Some(max) if self.column + width > max && self.column > 0 => self.emit("\n"),
            _ => self.emit(" "),
        }
        self.emit_name(attribute.name().as_str());
        if let Some(value) = attribute.escaped_value() {
            let quote = attribute.quote_style().as_str();
            self.emit("=");
            self.emit(quote);
            self.emit(value);
            self.emit(quote);
        }
    }
}

fn attribute_width(attribute: &Attribute) -> usize {
    let mut width = attribute.name().as_str().len();
    if let Some(value) = attribute.escaped_value() {
        width += 1 + value.len() + 2 * attribute.quote_style().as_str().len();
    }
    width
}

// A "/>" directly after an unquoted value or a bare attribute name would
// glue the slash onto the attribute, so those need a separating space.
fn needs_space_before_brief_close(attributes: &[Attribute]) -> bool {
    match attributes.last() {
        Some(attr) => {
            attr.escaped_value().is_none() || attr.quote_style() == QuoteStyle::NoQuote
        }
        None => false,
    }
}

impl<W: Writer> HtmlFilter for HtmlWriterFilter<W> {
    fn name(&self) -> &'static str {
        "html_writer"
    }

    fn start_document(&mut self, _parse: &mut HtmlParse) {
        self.lazy_close_element = None;
        self.lazy_close_needs_space = false;
        self.column = 0;
    }

    fn end_document(&mut self, parse: &mut HtmlParse) {
        self.terminate_lazy_close();
        if self.write_errors > 0 {
            warn!(
                target: "html.writer",
                "{}: {} write errors", parse.id(), self.write_errors
            );
        }
    }

    fn start_element(&mut self, parse: &mut HtmlParse, element: NodeId) {
        self.terminate_lazy_close();
        let e = parse.element(element);
        if e.style() == CloseStyle::Invisible {
            return;
        }
        self.emit("<");
        self.emit_name(e.name().as_str());
        for attribute in e.attributes() {
            self.emit_attribute(attribute);
        }
        if e.style() == CloseStyle::BriefClose {
            self.lazy_close_element = Some(element);
            self.lazy_close_needs_space = needs_space_before_brief_close(e.attributes());
        } else {
            self.emit(">");
        }
    }

    fn end_element(&mut self, parse: &mut HtmlParse, element: NodeId) {
        if self.lazy_close_element == Some(element) {
            self.lazy_close_element = None;
            if self.lazy_close_needs_space {
                self.emit(" ");
            }
            self.emit("/>");
            return;
        }
        self.terminate_lazy_close();
        let e = parse.element(element);
        match e.style() {
            // BriefClose with intervening content cannot use "/>".
            CloseStyle::ExplicitClose | CloseStyle::BriefClose => {
                self.emit("</");
                self.emit_name(e.name().as_str());
                self.emit(">");
            }
            CloseStyle::ImplicitClose
            | CloseStyle::AutoClose
            | CloseStyle::Unclosed
            | CloseStyle::Invisible => {}
        }
    }

    fn characters(&mut self, parse: &mut HtmlParse, node: NodeId) {
        self.terminate_lazy_close();
        if let Some(text) = parse.characters_text(node) {
            self.emit(text);
        }
    }

    fn cdata(&mut self, parse: &mut HtmlParse, node: NodeId) {
        self.terminate_lazy_close();
        if let NodeData::Cdata(text) = parse.node_data(node) {
            self.emit("<![CDATA[");
            self.emit(text);
            self.emit("]]>");
        }
    }

    fn comment(&mut self, parse: &mut HtmlParse, node: NodeId) {
        self.terminate_lazy_close();
        if let NodeData::Comment(text) = parse.node_data(node) {
            self.emit("<!--");
            self.emit(text);
            self.emit("-->");
        }
    }

    fn ie_directive(&mut self, parse: &mut HtmlParse, node: NodeId) {
        self.terminate_lazy_close();
        if let NodeData::IeDirective(text) = parse.node_data(node) {
            self.emit("<!--");
            self.emit(text);
            self.emit("-->");
        }
    }

    fn directive(&mut self, parse: &mut HtmlParse, node: NodeId) {
        self.terminate_lazy_close();
        if let NodeData::Directive(text) = parse.node_data(node) {
            self.emit("<!");
            self.emit(text);
            self.emit(">");
        }
    }
}
