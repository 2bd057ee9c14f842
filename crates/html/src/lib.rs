//! Streaming HTML lexer and rewriter.
//!
//! [`HtmlParse`] lexes incrementally arriving HTML into an event stream and
//! runs a chain of [`HtmlFilter`]s over it at every flush. Filters mutate
//! the document through the parse handle; [`HtmlWriterFilter`] at the end
//! of the chain serializes the result, byte-identical for untouched input.

mod atom;
mod escape;
mod event;
mod filter;
mod keywords;
mod lexer;
mod node;
mod parse;
mod writer;

pub use atom::{AtomId, AtomTable};
pub use escape::{escape, unescape};
pub use filter::{FilterEnabled, HtmlFilter, ScriptUsage};
pub use node::{Attribute, CloseStyle, Element, Name, NodeData, NodeId, QuoteStyle};
pub use parse::HtmlParse;
pub use writer::{HtmlWriterFilter, Writer};
