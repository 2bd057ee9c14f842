//! Filter interface for the streaming rewrite pipeline.

use crate::node::NodeId;
use crate::parse::HtmlParse;

/// Whether a filter may synthesize `<script>` elements. Consumers that
/// enforce script-safety (CSP and the like) disable the `WillInject` tier
/// wholesale rather than auditing injected markup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptUsage {
    NeverInjects,
    MayInject,
    WillInject,
}

/// Per-document enablement decision, with an operator-facing reason when a
/// filter sits a document out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterEnabled {
    Enabled,
    Disabled(String),
}

/// A streaming rewrite pass. One callback per event, invoked in filter
/// registration order; callbacks receive the parse so they can use its
/// mutation API on the node at hand.
///
/// Every callback defaults to a no-op so filters implement only what they
/// observe.
pub trait HtmlFilter {
    /// Stable name used in diagnostics and the disabled-filter list.
    fn name(&self) -> &'static str;

    /// Decide once per document whether this filter should run at all.
    fn determine_enabled(&mut self) -> FilterEnabled {
        FilterEnabled::Enabled
    }

    fn script_usage(&self) -> ScriptUsage {
        ScriptUsage::NeverInjects
    }

    /// True if the filter may rewrite resource URLs; aggregated so callers
    /// can skip URL bookkeeping for pipelines that never touch them.
    fn can_modify_urls(&self) -> bool {
        false
    }

    fn start_document(&mut self, _parse: &mut HtmlParse) {}
    fn end_document(&mut self, _parse: &mut HtmlParse) {}
    fn start_element(&mut self, _parse: &mut HtmlParse, _element: NodeId) {}
    fn end_element(&mut self, _parse: &mut HtmlParse, _element: NodeId) {}
    fn characters(&mut self, _parse: &mut HtmlParse, _node: NodeId) {}
    fn cdata(&mut self, _parse: &mut HtmlParse, _node: NodeId) {}
    fn comment(&mut self, _parse: &mut HtmlParse, _node: NodeId) {}
    fn ie_directive(&mut self, _parse: &mut HtmlParse, _node: NodeId) {}
    fn directive(&mut self, _parse: &mut HtmlParse, _node: NodeId) {}

    /// Notification that the current flush window is complete for this
    /// filter; the event queue is still intact at this point.
    fn flush(&mut self, _parse: &mut HtmlParse) {}
}
