//! Streaming parse driver: owns the node and event arenas, runs the lexer,
//! and applies the filter chain at every flush.
//!
//! The event queue only ever holds the current flush window. Nodes outlive
//! their events: after a window is cleared the nodes remain queryable, they
//! just stop being rewritable. Deferred nodes park their events on side
//! lists threaded through the same arena, so deferral and restoration are
//! pure pointer splices.

use std::collections::{HashMap, HashSet};
use std::mem;

use log::{debug, warn};

use tools::utf8::Utf8Carry;

use crate::atom::{AtomId, AtomTable};
use crate::escape;
use crate::event::{EventArena, EventKind, EventQueue};
use crate::filter::{FilterEnabled, HtmlFilter, ScriptUsage};
use crate::keywords::Keywords;
use crate::lexer::Lexer;
use crate::node::{Attribute, CloseStyle, Element, EventId, Name, NodeData, NodeId, QuoteStyle};

#[derive(Debug)]
struct NodeSlot {
    data: NodeData,
    parent: Option<NodeId>,
    live: bool,
    begin: Option<EventId>,
    end: Option<EventId>,
}

/// One document's parse session. Single-threaded; concurrency is achieved
/// by running one instance per in-flight document.
pub struct HtmlParse {
    id: String,
    atoms: AtomTable,
    keywords: Keywords,
    lexer: Lexer,
    nodes: Vec<NodeSlot>,
    events: EventArena,
    queue: EventQueue,
    current: Option<EventId>,
    skip_increment: bool,
    line_number: u32,
    parsing: bool,

    filters: Vec<Box<dyn HtmlFilter>>,
    filter_names: Vec<&'static str>,
    filter_script_usage: Vec<ScriptUsage>,
    filter_enabled: Vec<bool>,
    disabled_filters: Vec<String>,
    determine_enabled_called: bool,
    can_modify_urls: bool,
    current_filter: Option<usize>,

    deferred_nodes: HashMap<NodeId, EventQueue>,
    // Filter index -> node it deferred whose end has not been lexed yet.
    open_deferred_nodes: HashMap<usize, NodeId>,
    deferred_deleted_nodes: HashSet<NodeId>,
    delayed_start_literal: Option<EventId>,

    coalesce_characters: bool,
    need_coalesce_characters: bool,
    need_sanity_check: bool,
    bytes_parsed: u64,
    carry: Utf8Carry,
}

impl Default for HtmlParse {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlParse {
    pub fn new() -> Self {
        let mut atoms = AtomTable::new();
        let keywords = Keywords::new(&mut atoms);
        HtmlParse {
            id: String::new(),
            atoms,
            keywords,
            lexer: Lexer::default(),
            nodes: Vec::new(),
            events: EventArena::default(),
            queue: EventQueue::window(),
            current: None,
            skip_increment: false,
            line_number: 1,
            parsing: false,
            filters: Vec::new(),
            filter_names: Vec::new(),
            filter_script_usage: Vec::new(),
            filter_enabled: Vec::new(),
            disabled_filters: Vec::new(),
            determine_enabled_called: false,
            can_modify_urls: false,
            current_filter: None,
            deferred_nodes: HashMap::new(),
            open_deferred_nodes: HashMap::new(),
            deferred_deleted_nodes: HashSet::new(),
            delayed_start_literal: None,
            coalesce_characters: true,
            need_coalesce_characters: false,
            need_sanity_check: false,
            bytes_parsed: 0,
            carry: Utf8Carry::default(),
        }
    }

    /// Register a filter; filters run in registration order every flush.
    pub fn add_filter(&mut self, filter: Box<dyn HtmlFilter>) {
        self.filter_names.push(filter.name());
        self.filter_script_usage.push(filter.script_usage());
        self.filter_enabled.push(true);
        self.filters.push(filter);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn line_number(&self) -> u32 {
        self.line_number
    }

    pub fn is_xhtml(&self) -> bool {
        self.lexer.is_xhtml()
    }

    /// Filters disabled for the current document, as "name" or
    /// "name: reason" strings for diagnostics.
    pub fn disabled_filters(&self) -> &[String] {
        &self.disabled_filters
    }

    pub fn can_modify_urls(&self) -> bool {
        self.can_modify_urls
    }

    /// Test-only knob; coalescing stays on in production.
    pub fn set_coalesce_characters(&mut self, on: bool) {
        self.coalesce_characters = on;
    }

    pub(crate) fn keywords(&self) -> &Keywords {
        &self.keywords
    }

    pub(crate) fn intern(&mut self, name: &str) -> AtomId {
        self.atoms.intern_folded(name)
    }

    // ----------------------------------------------------------------
    // Parse session lifecycle.

    pub fn start_parse(&mut self, id: &str) {
        debug_assert!(!self.parsing, "start_parse while already parsing");
        debug_assert!(!self.skip_increment);
        debug_assert!(self.deferred_nodes.is_empty());
        debug_assert!(self.open_deferred_nodes.is_empty());
        debug_assert!(self.deferred_deleted_nodes.is_empty());

        self.id = id.to_string();
        self.atoms = AtomTable::new();
        self.keywords = Keywords::new(&mut self.atoms);
        self.nodes.clear();
        self.events.clear();
        self.queue = EventQueue::window();
        self.current = None;
        self.skip_increment = false;
        self.line_number = 1;
        self.parsing = true;
        self.determine_enabled_called = false;
        self.can_modify_urls = false;
        self.current_filter = None;
        self.disabled_filters.clear();
        self.deferred_nodes.clear();
        self.open_deferred_nodes.clear();
        self.deferred_deleted_nodes.clear();
        self.delayed_start_literal = None;
        self.need_coalesce_characters = false;
        self.need_sanity_check = false;
        self.bytes_parsed = 0;
        self.carry = Utf8Carry::default();

        debug!(target: "html.parse", "{id}: start parse");
        self.add_event(EventKind::StartDocument, self.line_number);
        let mut lexer = mem::take(&mut self.lexer);
        lexer.start_parse(id);
        self.lexer = lexer;
    }

    /// Lex a chunk. Any substring boundary is fine, including mid-tag.
    pub fn parse_text(&mut self, text: &str) {
        debug_assert!(self.parsing, "parse_text before start_parse");
        if !self.parsing {
            return;
        }
        self.determine_filters_behavior();
        self.bytes_parsed += text.len() as u64;
        let mut lexer = mem::take(&mut self.lexer);
        lexer.parse(self, text);
        self.lexer = lexer;
    }

    /// Byte-stream variant; split UTF-8 sequences are carried to the next
    /// chunk, invalid bytes become U+FFFD.
    pub fn parse_bytes(&mut self, bytes: &[u8]) {
        let mut chunk = String::new();
        self.carry.push(&mut chunk, bytes);
        if !chunk.is_empty() {
            self.parse_text(&chunk);
        }
    }

    /// Run the filter chain over the events accumulated since the last
    /// flush, then discard the window.
    pub fn flush(&mut self) {
        debug_assert!(self.parsing, "flush before start_parse");
        if !self.parsing {
            return;
        }
        self.determine_filters_behavior();
        debug!(target: "html.parse", "{}: flush", self.id);

        let mut filters = mem::take(&mut self.filters);
        for (idx, filter) in filters.iter_mut().enumerate() {
            if self.filter_enabled[idx] {
                self.apply_filter(idx, filter.as_mut());
            }
        }
        self.filters = filters;
        self.clear_events();
    }

    pub fn finish_parse(&mut self) {
        debug_assert!(self.parsing, "finish_parse before start_parse");
        if !self.parsing {
            return;
        }
        let mut tail = String::new();
        self.carry.finish(&mut tail);
        if !tail.is_empty() {
            self.parse_text(&tail);
        }

        let mut lexer = mem::take(&mut self.lexer);
        lexer.finish_parse(self);
        self.lexer = lexer;
        debug_assert!(self.delayed_start_literal.is_none());
        self.add_event(EventKind::EndDocument, self.line_number);
        self.flush();
        self.clear_deferred_nodes();
        self.parsing = false;
        debug!(target: "html.parse", "{}: finish parse", self.id);
    }

    fn determine_filters_behavior(&mut self) {
        if self.determine_enabled_called {
            return;
        }
        self.determine_enabled_called = true;
        self.can_modify_urls = false;
        for (idx, filter) in self.filters.iter_mut().enumerate() {
            match filter.determine_enabled() {
                FilterEnabled::Enabled => {
                    self.filter_enabled[idx] = true;
                    self.can_modify_urls = self.can_modify_urls || filter.can_modify_urls();
                }
                FilterEnabled::Disabled(reason) => {
                    self.filter_enabled[idx] = false;
                    let mut entry = self.filter_names[idx].to_string();
                    if !reason.is_empty() {
                        entry.push_str(": ");
                        entry.push_str(&reason);
                    }
                    self.disabled_filters.push(entry);
                }
            }
        }
    }

    /// Turn off every filter that declares it will inject scripts, for
    /// documents where injected markup is unacceptable.
    pub fn disable_filters_injecting_scripts(&mut self) {
        self.determine_filters_behavior();
        for (idx, usage) in self.filter_script_usage.iter().enumerate() {
            if self.filter_enabled[idx] && *usage == ScriptUsage::WillInject {
                self.filter_enabled[idx] = false;
                self.disabled_filters
                    .push(format!("{}: injects scripts", self.filter_names[idx]));
            }
        }
    }

    fn apply_filter(&mut self, idx: usize, filter: &mut dyn HtmlFilter) {
        debug_assert!(self.current_filter.is_none());
        self.current_filter = Some(idx);

        // If this filter deferred a node whose close has not been seen,
        // events from this window belong inside that node, up to and
        // including its end element if it arrives here.
        if let Some(&node) = self.open_deferred_nodes.get(&idx) {
            if let Some(mut list) = self.deferred_nodes.remove(&node) {
                let end = self.nodes[node.0 as usize].end;
                match (self.queue.head(), end) {
                    (Some(head), Some(end_ev)) => {
                        self.open_deferred_nodes.remove(&idx);
                        self.queue
                            .splice_range_into(&mut self.events, head, end_ev, &mut list, None);
                    }
                    (Some(_), None) => {
                        self.queue.drain_into(&mut self.events, &mut list, None);
                    }
                    (None, _) => {}
                }
                self.deferred_nodes.insert(node, list);
            }
        }

        if self.coalesce_characters && self.need_coalesce_characters {
            self.coalesce_adjacent_characters();
            self.delay_literal_tag();
            self.need_coalesce_characters = false;
        }

        self.current = self.queue.head();
        while let Some(ev) = self.current {
            let kind = self.events.kind(ev);
            self.line_number = self.events.line(ev);
            match kind {
                EventKind::StartDocument => filter.start_document(self),
                EventKind::EndDocument => filter.end_document(self),
                EventKind::StartElement(n) => filter.start_element(self, n),
                EventKind::EndElement(n) => filter.end_element(self, n),
                EventKind::Leaf(n) => match self.nodes[n.0 as usize].data {
                    NodeData::Characters(_) => filter.characters(self, n),
                    NodeData::Comment(_) => filter.comment(self, n),
                    NodeData::Cdata(_) => filter.cdata(self, n),
                    NodeData::IeDirective(_) => filter.ie_directive(self, n),
                    NodeData::Directive(_) => filter.directive(self, n),
                    NodeData::Element(_) => debug_assert!(false, "element as leaf event"),
                },
            }
            self.next_event();
        }
        filter.flush(self);

        #[cfg(feature = "parser_invariants")]
        if self.need_sanity_check {
            self.sanity_check();
        }
        self.need_sanity_check = false;
        self.current_filter = None;
    }

    fn next_event(&mut self) {
        if self.skip_increment {
            self.skip_increment = false;
        } else {
            self.current = self.current.and_then(|ev| self.events.next(ev));
        }
    }

    fn coalesce_adjacent_characters(&mut self) {
        let mut prev: Option<NodeId> = None;
        let mut cursor = self.queue.head();
        while let Some(ev) = cursor {
            let next = self.events.next(ev);
            let node = self
                .events
                .kind(ev)
                .leaf()
                .filter(|n| matches!(self.nodes[n.0 as usize].data, NodeData::Characters(_)));
            match (node, prev) {
                (Some(n), Some(p)) => {
                    let text = match mem::replace(
                        &mut self.nodes[n.0 as usize].data,
                        NodeData::Characters(String::new()),
                    ) {
                        NodeData::Characters(s) => s,
                        _ => String::new(),
                    };
                    if let NodeData::Characters(dst) = &mut self.nodes[p.0 as usize].data {
                        dst.push_str(&text);
                    }
                    self.queue.remove(&mut self.events, ev);
                    let slot = &mut self.nodes[n.0 as usize];
                    slot.live = false;
                    slot.begin = None;
                    slot.end = None;
                    self.need_sanity_check = true;
                }
                _ => prev = node,
            }
            cursor = next;
        }
    }

    // A flush window must not end inside a raw-text element. If the last
    // event opens one whose body the lexer is still buffering, hold the
    // start event back until the close arrives.
    fn delay_literal_tag(&mut self) {
        if let Some(tail) = self.queue.tail() {
            if let Some(element) = self.events.kind(tail).start_element() {
                if self.keywords.is_always_literal(self.element_atom(element)) {
                    self.queue.remove(&mut self.events, tail);
                    self.delayed_start_literal = Some(tail);
                }
            }
        }
    }

    fn clear_events(&mut self) {
        let mut cursor = self.queue.head();
        while let Some(ev) = cursor {
            cursor = self.events.next(ev);
            match self.events.kind(ev) {
                EventKind::StartElement(n) => self.nodes[n.0 as usize].begin = None,
                EventKind::EndElement(n) => self.nodes[n.0 as usize].end = None,
                EventKind::Leaf(n) => {
                    let slot = &mut self.nodes[n.0 as usize];
                    slot.begin = None;
                    slot.end = None;
                }
                EventKind::StartDocument | EventKind::EndDocument => {}
            }
            self.queue.remove(&mut self.events, ev);
        }
        self.current = None;
        self.need_sanity_check = false;
        self.need_coalesce_characters = false;
    }

    fn clear_deferred_nodes(&mut self) {
        for (node, _) in self.deferred_nodes.drain() {
            if !self.deferred_deleted_nodes.contains(&node) {
                warn!(
                    target: "html.parse",
                    "{}: deferred node {} never restored",
                    self.id,
                    self.nodes[node.0 as usize].data.describe()
                );
            }
        }
        self.deferred_deleted_nodes.clear();
        self.open_deferred_nodes.clear();
    }

    // ----------------------------------------------------------------
    // Node construction (lexer and filters).

    pub(crate) fn make_name(&mut self, raw: &str) -> Name {
        Name::new(self.atoms.intern_folded(raw), raw)
    }

    fn push_node(&mut self, data: NodeData, parent: Option<NodeId>) -> NodeId {
        debug_assert!(self.nodes.len() < u32::MAX as usize);
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeSlot {
            data,
            parent,
            live: true,
            begin: None,
            end: None,
        });
        id
    }

    /// Create an unattached element. Synthesized elements default to an
    /// explicit close (implicit for void tags) so they serialize
    /// unambiguously; lexed elements get their real close style when their
    /// close tag is seen.
    pub fn new_element(&mut self, parent: Option<NodeId>, name: &str) -> NodeId {
        let name = self.make_name(name);
        let atom = name.atom();
        if atom == self.keywords.script {
            if let Some(f) = self.current_filter {
                if self.filter_script_usage[f] == ScriptUsage::NeverInjects {
                    warn!(
                        target: "html.parse",
                        "{}: filter {} injected a script but declares NeverInjects",
                        self.id, self.filter_names[f]
                    );
                    debug_assert!(false, "script injected by NeverInjects filter");
                }
            }
        }
        let mut element = Element::new(name);
        element.set_style(if self.keywords.is_implicitly_closed(atom) {
            CloseStyle::ImplicitClose
        } else {
            CloseStyle::ExplicitClose
        });
        self.push_node(NodeData::Element(element), parent)
    }

    pub fn new_characters_node(&mut self, parent: Option<NodeId>, text: &str) -> NodeId {
        self.push_node(NodeData::Characters(text.to_string()), parent)
    }

    pub fn new_comment_node(&mut self, parent: Option<NodeId>, text: &str) -> NodeId {
        self.push_node(NodeData::Comment(text.to_string()), parent)
    }

    pub fn new_cdata_node(&mut self, parent: Option<NodeId>, text: &str) -> NodeId {
        self.push_node(NodeData::Cdata(text.to_string()), parent)
    }

    pub fn new_ie_directive_node(&mut self, parent: Option<NodeId>, text: &str) -> NodeId {
        self.push_node(NodeData::IeDirective(text.to_string()), parent)
    }

    pub fn new_directive_node(&mut self, parent: Option<NodeId>, text: &str) -> NodeId {
        self.push_node(NodeData::Directive(text.to_string()), parent)
    }

    pub(crate) fn add_escaped_attribute(
        &mut self,
        element: NodeId,
        name: &str,
        value: Option<&str>,
        quote: QuoteStyle,
    ) {
        let name = self.make_name(name);
        let attr = Attribute::new(name, value.map(str::to_string), quote);
        self.element_mut(element).add_attribute(attr);
    }

    /// Add an attribute with a raw (unescaped) value; double-quoted.
    pub fn add_attribute(&mut self, element: NodeId, name: &str, value: &str) {
        let name = self.make_name(name);
        let mut attr = Attribute::new(name, None, QuoteStyle::DoubleQuote);
        attr.set_value(value);
        self.element_mut(element).add_attribute(attr);
    }

    pub fn clone_element(&mut self, element: NodeId) -> NodeId {
        let (name, style, attrs) = {
            let e = self.element(element);
            let attrs: Vec<(Name, Option<String>, QuoteStyle)> = e
                .attributes()
                .iter()
                .map(|a| {
                    (
                        a.name().clone(),
                        a.escaped_value().map(str::to_string),
                        a.quote_style(),
                    )
                })
                .collect();
            (e.name().clone(), e.style(), attrs)
        };
        let mut out = Element::new(name);
        out.set_style(style);
        for (name, value, quote) in attrs {
            out.add_attribute(Attribute::new(name, value, quote));
        }
        self.push_node(NodeData::Element(out), None)
    }

    // ----------------------------------------------------------------
    // Node access.

    pub fn node_data(&self, node: NodeId) -> &NodeData {
        &self.nodes[node.0 as usize].data
    }

    /// Panics if the node is not an element; element handles come from
    /// element events, so a mismatch is a caller bug.
    pub fn element(&self, node: NodeId) -> &Element {
        match self.nodes[node.0 as usize].data.as_element() {
            Some(e) => e,
            None => panic!("node {} is not an element", node.0),
        }
    }

    pub fn element_mut(&mut self, node: NodeId) -> &mut Element {
        match self.nodes[node.0 as usize].data.as_element_mut() {
            Some(e) => e,
            None => panic!("node {} is not an element", node.0),
        }
    }

    pub(crate) fn element_atom(&self, node: NodeId) -> AtomId {
        self.element(node).name().atom()
    }

    pub fn characters_text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0 as usize].data {
            NodeData::Characters(s) => Some(s),
            _ => None,
        }
    }

    pub fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0 as usize].parent
    }

    pub fn is_live(&self, node: NodeId) -> bool {
        self.nodes[node.0 as usize].live
    }

    pub fn bytes_parsed(&self) -> u64 {
        self.bytes_parsed
    }

    pub fn is_deferred(&self, node: NodeId) -> bool {
        self.deferred_nodes.contains_key(&node)
    }

    pub fn is_deferred_deleted(&self, node: NodeId) -> bool {
        self.deferred_deleted_nodes.contains(&node)
    }

    pub(crate) fn set_node_parent(&mut self, node: NodeId, parent: Option<NodeId>) {
        self.nodes[node.0 as usize].parent = parent;
    }

    // ----------------------------------------------------------------
    // Event plumbing (lexer side).

    fn add_event(&mut self, kind: EventKind, line: u32) -> EventId {
        let ev = self.events.alloc(kind, line);
        self.queue.push_back(&mut self.events, ev);
        self.need_sanity_check = true;
        self.need_coalesce_characters = true;
        if let Some(leaf) = kind.leaf() {
            let slot = &mut self.nodes[leaf.0 as usize];
            slot.begin = Some(ev);
            slot.end = Some(ev);
        }
        ev
    }

    pub(crate) fn add_leaf_event(&mut self, node: NodeId, line: u32) {
        self.add_event(EventKind::Leaf(node), line);
    }

    pub(crate) fn add_element_event(&mut self, element: NodeId, line: u32) {
        let ev = self.add_event(EventKind::StartElement(element), line);
        self.nodes[element.0 as usize].begin = Some(ev);
    }

    pub(crate) fn close_element(&mut self, element: NodeId, style: CloseStyle, line: u32) {
        if let Some(delayed) = self.delayed_start_literal.take() {
            debug_assert_eq!(self.events.kind(delayed).start_element(), Some(element));
            // The held-back "<script>" goes before its body's trailing
            // Characters block, after anything a filter inserted meanwhile.
            match self.queue.tail() {
                Some(tail)
                    if self
                        .events
                        .kind(tail)
                        .leaf()
                        .is_some_and(|n| {
                            matches!(self.nodes[n.0 as usize].data, NodeData::Characters(_))
                        }) =>
                {
                    self.queue.insert_before(&mut self.events, Some(tail), delayed);
                }
                _ => self.queue.push_back(&mut self.events, delayed),
            }
        }

        if self.element(element).style() != CloseStyle::Invisible {
            self.element_mut(element).set_style(style);
        }
        let ev = self.add_event(EventKind::EndElement(element), line);
        self.nodes[element.0 as usize].end = Some(ev);
    }

    // ----------------------------------------------------------------
    // Rewritability predicates.

    fn in_event_window(ev: Option<EventId>) -> bool {
        ev.is_some()
    }

    fn is_rewritable_ignoring_deferral(&self, node: NodeId) -> bool {
        let slot = &self.nodes[node.0 as usize];
        slot.live && Self::in_event_window(slot.begin) && Self::in_event_window(slot.end)
    }

    fn is_rewritable_ignoring_end(&self, node: NodeId) -> bool {
        let slot = &self.nodes[node.0 as usize];
        slot.live
            && !self.deferred_nodes.contains_key(&node)
            && Self::in_event_window(slot.begin)
    }

    /// A node can be mutated only while both its events are in the current
    /// flush window and it has not been deferred.
    pub fn is_rewritable(&self, node: NodeId) -> bool {
        self.is_rewritable_ignoring_deferral(node) && !self.deferred_nodes.contains_key(&node)
    }

    pub fn can_append_child(&self, node: NodeId) -> bool {
        let slot = &self.nodes[node.0 as usize];
        slot.live
            && !self.deferred_nodes.contains_key(&node)
            && Self::in_event_window(slot.end)
    }

    pub fn has_children_in_flush_window(&self, element: NodeId) -> bool {
        if !self.is_rewritable(element) {
            return false;
        }
        let slot = &self.nodes[element.0 as usize];
        match (slot.begin, slot.end) {
            (Some(begin), Some(end)) => self.events.next(begin) != Some(end),
            _ => false,
        }
    }

    pub fn is_descendant_of(&self, possible_child: NodeId, possible_parent: NodeId) -> bool {
        let mut node = Some(possible_child);
        while let Some(n) = node {
            if n == possible_parent {
                return true;
            }
            node = self.nodes[n.0 as usize].parent;
        }
        false
    }

    // ----------------------------------------------------------------
    // Insertion.

    // Splice events for an unattached node into the queue before `at`
    // (None appends). Elements get a start/end pair, leaves one event.
    fn synthesize_events(&mut self, node: NodeId, at: Option<EventId>) -> (EventId, EventId) {
        self.need_sanity_check = true;
        self.need_coalesce_characters = true;
        let line = self.line_number;
        if self.nodes[node.0 as usize].data.is_element() {
            let start = self.events.alloc(EventKind::StartElement(node), line);
            let end = self.events.alloc(EventKind::EndElement(node), line);
            self.queue.insert_before(&mut self.events, at, start);
            self.queue.insert_before(&mut self.events, at, end);
            let slot = &mut self.nodes[node.0 as usize];
            slot.begin = Some(start);
            slot.end = Some(end);
            (start, end)
        } else {
            let ev = self.events.alloc(EventKind::Leaf(node), line);
            self.queue.insert_before(&mut self.events, at, ev);
            let slot = &mut self.nodes[node.0 as usize];
            slot.begin = Some(ev);
            slot.end = Some(ev);
            (ev, ev)
        }
    }

    pub fn insert_node_before_node(&mut self, existing: NodeId, new_node: NodeId) -> bool {
        let Some(begin) = self.nodes[existing.0 as usize].begin else {
            warn!(target: "html.parse", "{}: insert before a node outside the event window", self.id);
            return false;
        };
        let parent = self.nodes[existing.0 as usize].parent;
        self.set_node_parent(new_node, parent);
        self.synthesize_events(new_node, Some(begin));
        true
    }

    pub fn insert_node_after_node(&mut self, existing: NodeId, new_node: NodeId) -> bool {
        let Some(end) = self.nodes[existing.0 as usize].end else {
            warn!(target: "html.parse", "{}: insert after a node outside the event window", self.id);
            return false;
        };
        let parent = self.nodes[existing.0 as usize].parent;
        self.set_node_parent(new_node, parent);
        self.synthesize_events(new_node, self.events.next(end));
        true
    }

    pub fn prepend_child(&mut self, parent: NodeId, new_child: NodeId) -> bool {
        let Some(begin) = self.nodes[parent.0 as usize].begin else {
            warn!(target: "html.parse", "{}: prepend into a node outside the event window", self.id);
            return false;
        };
        self.set_node_parent(new_child, Some(parent));
        self.synthesize_events(new_child, self.events.next(begin));
        true
    }

    pub fn append_child(&mut self, parent: Option<NodeId>, new_child: NodeId) -> bool {
        match parent {
            Some(p) => {
                let Some(end) = self.nodes[p.0 as usize].end else {
                    warn!(
                        target: "html.parse",
                        "{}: append into a node outside the event window", self.id
                    );
                    return false;
                };
                self.set_node_parent(new_child, Some(p));
                self.synthesize_events(new_child, Some(end));
            }
            None => {
                self.synthesize_events(new_child, None);
            }
        }
        true
    }

    pub fn insert_node_before_current(&mut self, new_node: NodeId) {
        if self.skip_increment {
            warn!(
                target: "html.parse",
                "{}: insert_node_before_current after current was deleted", self.id
            );
            return;
        }
        if self.nodes[new_node.0 as usize].parent.is_none() {
            if let Some(cur) = self.current {
                // An EndElement cursor means we become a child of that
                // element; anything else makes us its sibling.
                let kind = self.events.kind(cur);
                let parent = match kind.end_element() {
                    Some(e) => Some(e),
                    None => kind.node().and_then(|n| self.nodes[n.0 as usize].parent),
                };
                self.set_node_parent(new_node, parent);
            }
        }
        self.synthesize_events(new_node, self.current);
    }

    pub fn insert_node_after_current(&mut self, new_node: NodeId) {
        if self.skip_increment {
            warn!(
                target: "html.parse",
                "{}: insert_node_after_current after current was deleted", self.id
            );
            return;
        }
        let Some(cur) = self.current else {
            warn!(
                target: "html.parse",
                "{}: insert_node_after_current at end of window", self.id
            );
            return;
        };
        if self.nodes[new_node.0 as usize].parent.is_none() {
            let kind = self.events.kind(cur);
            let parent = match kind.end_element() {
                Some(e) => self.nodes[e.0 as usize].parent,
                None => match kind.start_element() {
                    Some(e) => Some(e),
                    None => kind.node().and_then(|n| self.nodes[n.0 as usize].parent),
                },
            };
            self.set_node_parent(new_node, parent);
        }
        let (_, last) = self.synthesize_events(new_node, self.events.next(cur));
        // Leave the cursor on the new node so the running filter skips it.
        self.current = Some(last);
    }

    /// Wrap the contiguous sibling run `[first, last]` in `new_parent`
    /// (which must be unattached).
    pub fn add_parent_to_sequence(
        &mut self,
        first: NodeId,
        last: NodeId,
        new_parent: NodeId,
    ) -> bool {
        let original_parent = self.nodes[first.0 as usize].parent;
        if !(self.is_rewritable(first)
            && self.is_rewritable(last)
            && self.nodes[last.0 as usize].parent == original_parent
            && self.nodes[new_parent.0 as usize].begin.is_none()
            && self.nodes[new_parent.0 as usize].end.is_none())
        {
            return false;
        }
        let Some(first_begin) = self.nodes[first.0 as usize].begin else {
            return false;
        };
        self.set_node_parent(new_parent, original_parent);
        let (_, parent_end) = self.synthesize_events(new_parent, Some(first_begin));
        // Move the synthesized end so the run lands inside the new parent.
        let Some(last_end) = self.nodes[last.0 as usize].end else {
            return false;
        };
        self.queue.remove(&mut self.events, parent_end);
        let after_last = self.events.next(last_end);
        self.queue
            .insert_before(&mut self.events, after_last, parent_end);
        self.fix_parents(first_begin, last_end, new_parent);
        self.need_sanity_check = true;
        self.need_coalesce_characters = true;
        true
    }

    fn fix_parents(&mut self, begin: EventId, end_inclusive: EventId, new_parent: NodeId) {
        let original_parent = self
            .events
            .kind(begin)
            .node()
            .and_then(|n| self.nodes[n.0 as usize].parent);
        for ev in self
            .queue
            .collect_range(&self.events, begin, end_inclusive)
        {
            if let Some(node) = self.events.kind(ev).node() {
                if self.nodes[node.0 as usize].parent == original_parent {
                    self.set_node_parent(node, Some(new_parent));
                }
            }
        }
    }

    // ----------------------------------------------------------------
    // Movement.

    pub fn move_current_into(&mut self, new_parent: NodeId) -> bool {
        let Some(cur) = self.current else {
            warn!(target: "html.parse", "{}: move_current_into at end of window", self.id);
            return false;
        };
        if !self.nodes[new_parent.0 as usize].live {
            return false;
        }
        let Some(current_node) = self.events.kind(cur).node() else {
            return false;
        };
        let target = self.nodes[new_parent.0 as usize].end;
        if self.move_current_before_event(target) {
            self.set_node_parent(current_node, Some(new_parent));
            true
        } else {
            false
        }
    }

    pub fn move_current_before(&mut self, node: NodeId) -> bool {
        let Some(cur) = self.current else {
            warn!(target: "html.parse", "{}: move_current_before at end of window", self.id);
            return false;
        };
        if !self.nodes[node.0 as usize].live {
            return false;
        }
        let Some(current_node) = self.events.kind(cur).node() else {
            return false;
        };
        let target = self.nodes[node.0 as usize].begin;
        if self.move_current_before_event(target) {
            let parent = self.nodes[node.0 as usize].parent;
            self.set_node_parent(current_node, parent);
            true
        } else {
            false
        }
    }

    // Only legal when the cursor is at the current node's end event, so
    // the whole node is in the window.
    fn move_current_before_event(&mut self, move_to: Option<EventId>) -> bool {
        let (Some(move_to), Some(cur)) = (move_to, self.current) else {
            return false;
        };
        let Some(move_to_node) = self.events.kind(move_to).node() else {
            return false;
        };
        let Some(current_node) = self.events.kind(cur).node() else {
            return false;
        };
        let slot = &self.nodes[current_node.0 as usize];
        let (Some(begin), Some(end)) = (slot.begin, slot.end) else {
            return false;
        };
        if cur != end || self.is_descendant_of(move_to_node, current_node) {
            return false;
        }
        // Resume iteration from the node's original position, not from the
        // moved events: park the cursor just before the event that used to
        // follow the node.
        let after = self.events.next(end);
        self.queue
            .splice_range_before(&mut self.events, begin, end, Some(move_to));
        self.current = match after {
            Some(a) => self.events.prev(a),
            None => self.queue.tail(),
        };
        self.need_sanity_check = true;
        self.need_coalesce_characters = true;
        true
    }

    // ----------------------------------------------------------------
    // Deletion.

    pub fn delete_node(&mut self, node: NodeId) -> bool {
        if self.is_rewritable(node) {
            let slot = &self.nodes[node.0 as usize];
            let (Some(begin), Some(end)) = (slot.begin, slot.end) else {
                return false;
            };
            for ev in self.queue.collect_range(&self.events, begin, end) {
                if !self.skip_increment && Some(ev) == self.current {
                    self.skip_increment = true;
                    self.current = self.events.next(end);
                }
                self.queue.remove(&mut self.events, ev);
                let kind = self.events.kind(ev);
                let dead = kind.end_element().or_else(|| kind.leaf());
                if let Some(n) = dead {
                    let slot = &mut self.nodes[n.0 as usize];
                    debug_assert!(slot.live);
                    slot.live = false;
                    slot.begin = None;
                    slot.end = None;
                }
            }
            debug_assert!(!self.nodes[node.0 as usize].live);
            self.need_sanity_check = true;
            self.need_coalesce_characters = true;
            true
        } else if self.is_rewritable_ignoring_end(node) && self.current.is_some() {
            // The close hasn't been lexed yet. From the node's start event
            // we can still delete it, by deferring it and remembering not
            // to expect a restore.
            let cur = match self.current {
                Some(c) => c,
                None => return false,
            };
            let kind = self.events.kind(cur);
            if kind.node() == Some(node) && kind.end_element().is_none() {
                self.defer_current_node();
                self.deferred_deleted_nodes.insert(node);
                true
            } else {
                false
            }
        } else {
            false
        }
    }

    /// Delete an element but splice its children into its place.
    pub fn delete_saving_children(&mut self, element: NodeId) -> bool {
        if !self.is_rewritable(element) {
            return false;
        }
        let new_parent = self.nodes[element.0 as usize].parent;
        let slot = &self.nodes[element.0 as usize];
        let (Some(begin), Some(end)) = (slot.begin, slot.end) else {
            return false;
        };
        let first = self.events.next(begin);
        if first != Some(end) {
            let Some(first) = first else { return false };
            let Some(last) = self.events.prev(end) else {
                return false;
            };
            match new_parent {
                Some(p) => self.fix_parents(first, last, p),
                None => {
                    for ev in self.queue.collect_range(&self.events, first, last) {
                        if let Some(n) = self.events.kind(ev).node() {
                            if self.nodes[n.0 as usize].parent == Some(element) {
                                self.set_node_parent(n, None);
                            }
                        }
                    }
                }
            }
            // Deleting from the start tag pushes the children after the
            // element so the running filter still sees them; from anywhere
            // else they land before it to avoid double-processing.
            let at_start = self
                .current
                .is_some_and(|cur| self.events.kind(cur).start_element() == Some(element));
            if at_start {
                let after_end = self.events.next(end);
                self.queue
                    .splice_range_before(&mut self.events, first, last, after_end);
            } else {
                self.queue
                    .splice_range_before(&mut self.events, first, last, Some(begin));
            }
            self.need_sanity_check = true;
            self.need_coalesce_characters = true;
        }
        self.delete_node(element)
    }

    pub fn replace_node(&mut self, existing: NodeId, new_node: NodeId) -> bool {
        if !self.is_rewritable(existing) {
            return false;
        }
        self.insert_node_before_node(existing, new_node) && self.delete_node(existing)
    }

    pub fn make_element_invisible(&mut self, element: NodeId) -> bool {
        if self.is_rewritable_ignoring_end(element) {
            self.element_mut(element).set_style(CloseStyle::Invisible);
            true
        } else {
            false
        }
    }

    // ----------------------------------------------------------------
    // Deferral.

    /// Pull the current node (and, for an element, everything inside it)
    /// out of the visible stream, to be restored later or dropped.
    pub fn defer_current_node(&mut self) {
        let Some(cur) = self.current else {
            warn!(target: "html.parse", "{}: defer_current_node at end of window", self.id);
            return;
        };
        let Some(node) = self.events.kind(cur).node() else {
            warn!(target: "html.parse", "{}: defer_current_node on a document event", self.id);
            return;
        };
        debug_assert!(self.nodes[node.0 as usize].live);
        debug_assert!(!self.deferred_nodes.contains_key(&node));
        let Some(begin) = self.nodes[node.0 as usize].begin else {
            warn!(
                target: "html.parse",
                "{}: cannot defer a node whose opening tag was flushed", self.id
            );
            return;
        };

        let mut list = EventQueue::detached();
        let (last, resume) = match self.nodes[node.0 as usize].end {
            // Node fully in the window.
            Some(end_ev) => (end_ev, self.events.next(end_ev)),
            // Still open: children lexed later must land on this node's
            // list, not the queue, until the close arrives.
            None => {
                debug_assert!(
                    self.events.kind(begin).start_element().is_some(),
                    "only elements can cut across flush windows"
                );
                let Some(tail) = self.queue.tail() else {
                    return;
                };
                if let Some(f) = self.current_filter {
                    self.open_deferred_nodes.insert(f, node);
                }
                (tail, None)
            }
        };

        self.current = resume;
        self.skip_increment = true;
        self.queue
            .splice_range_into(&mut self.events, begin, last, &mut list, None);
        self.deferred_nodes.insert(node, list);
        self.need_sanity_check = true;
        self.need_coalesce_characters = true;
    }

    /// Put a previously deferred node back, just after the current event.
    /// Fails if the node is incomplete, was deleted, or was never deferred.
    pub fn restore_deferred_node(&mut self, node: NodeId) -> bool {
        if self.current.is_none() {
            warn!(target: "html.parse", "{}: cannot restore a node on a flush", self.id);
            return false;
        }
        if !self.is_rewritable_ignoring_deferral(node) {
            warn!(
                target: "html.parse",
                "{}: a node cannot be restored until it is complete", self.id
            );
            return false;
        }
        if self.deferred_deleted_nodes.contains(&node) {
            warn!(target: "html.parse", "{}: cannot restore a deleted node", self.id);
            return false;
        }
        let Some(mut list) = self.deferred_nodes.remove(&node) else {
            warn!(target: "html.parse", "{}: restoring a node that was not deferred", self.id);
            return false;
        };

        // The restored node's parent comes from where we are now: inside
        // the element whose start we sit on, else our neighbor's parent.
        if let Some(cur) = self.current {
            let kind = self.events.kind(cur);
            let new_parent = match kind.start_element() {
                Some(e) => Some(e),
                None => kind.node().and_then(|n| self.nodes[n.0 as usize].parent),
            };
            self.set_node_parent(node, new_parent);
        }

        self.next_event();
        list.drain_into(&mut self.events, &mut self.queue, self.current);
        self.current = self.nodes[node.0 as usize].begin;
        debug_assert!(!self.skip_increment);
        self.need_sanity_check = true;
        self.need_coalesce_characters = true;
        true
    }

    // ----------------------------------------------------------------
    // Convenience insertion used by filters.

    /// Insert a comment near the current event. Returns false when the
    /// insertion point is inside a raw-text element, where a comment
    /// cannot be added without changing semantics.
    pub fn insert_comment(&mut self, unescaped: &str) -> bool {
        let escaped = escape::escape(unescaped);

        if !self.queue.is_empty() {
            let (pos, at_end) = match (self.current, self.queue.tail()) {
                (Some(c), _) => (c, false),
                (None, Some(t)) => (t, true),
                (None, None) => return true,
            };
            let kind = self.events.kind(pos);
            // Some elements cannot tolerate new children, even comments
            // (textarea, script), so insert outside the element: before
            // its start event or after its end event.
            if let Some(start) = kind.start_element() {
                let parent = self.nodes[start.0 as usize].parent;
                let node = self.new_comment_node(parent, &escaped);
                self.synthesize_events(node, Some(pos));
            } else if let Some(end) = kind.end_element() {
                let parent = self.nodes[end.0 as usize].parent;
                let node = self.new_comment_node(parent, &escaped);
                self.synthesize_events(node, self.events.next(pos));
            } else {
                let parent = kind.node().and_then(|n| self.nodes[n.0 as usize].parent);
                let node = self.new_comment_node(parent, &escaped);
                if at_end {
                    self.synthesize_events(node, self.events.next(pos));
                } else {
                    self.synthesize_events(node, Some(pos));
                }
            }
        } else {
            // The open tag of a literal element may already be flushed
            // while its body is still being lexed.
            if let Some(parent) = self.lexer.parent() {
                if self.keywords.is_always_literal(self.element_atom(parent)) {
                    return false;
                }
            }
            let parent = self.lexer.parent();
            let node = self.new_comment_node(parent, &escaped);
            self.add_leaf_event(node, 0);
        }
        true
    }

    fn setup_script(&mut self, script: NodeId, text: &str, external: bool) {
        if external {
            self.add_attribute(script, "src", text);
        } else {
            let body = if self.is_xhtml() {
                format!("//<![CDATA[\n{text}\n//]]>")
            } else {
                text.to_string()
            };
            let text_node = self.new_characters_node(Some(script), &body);
            self.append_child(Some(script), text_node);
        }
    }

    pub fn insert_script_before_current(&mut self, text: &str, external: bool) {
        let script = self.new_element(None, "script");
        self.insert_node_before_current(script);
        self.setup_script(script, text, external);
    }

    pub fn insert_script_after_current(&mut self, text: &str, external: bool) {
        let script = self.new_element(None, "script");
        self.insert_node_after_current(script);
        self.setup_script(script, text, external);
    }

    // ----------------------------------------------------------------
    // Invariant verification; compiled in only for tests that opt in.

    #[cfg(feature = "parser_invariants")]
    fn sanity_check(&self) {
        let mut element_stack: Vec<NodeId> = Vec::new();
        let mut expect_parent: Option<NodeId> = None;
        for ev in self.queue.iter(&self.events) {
            let kind = self.events.kind(ev);
            if let Some(start) = kind.start_element() {
                self.check_event_parent(expect_parent, self.nodes[start.0 as usize].parent);
                assert_eq!(self.nodes[start.0 as usize].begin, Some(ev));
                assert!(self.nodes[start.0 as usize].live);
                element_stack.push(start);
                expect_parent = Some(start);
            } else if let Some(end) = kind.end_element() {
                assert_eq!(self.nodes[end.0 as usize].end, Some(ev));
                assert!(self.nodes[end.0 as usize].live);
                // The stack can be empty when a close was lexed after its
                // open was flushed in an earlier window.
                if !element_stack.is_empty() {
                    assert_eq!(element_stack.pop(), Some(end));
                }
                expect_parent = element_stack.last().copied();
                self.check_event_parent(expect_parent, self.nodes[end.0 as usize].parent);
            } else if let Some(leaf) = kind.leaf() {
                assert!(self.nodes[leaf.0 as usize].live);
                assert_eq!(self.nodes[leaf.0 as usize].end, Some(ev));
                self.check_event_parent(expect_parent, self.nodes[leaf.0 as usize].parent);
            }
        }
    }

    #[cfg(feature = "parser_invariants")]
    fn check_event_parent(&self, expect: Option<NodeId>, actual: Option<NodeId>) {
        if let Some(expect) = expect {
            assert_eq!(
                Some(expect),
                actual,
                "{}: event parent mismatch",
                self.id
            );
        }
    }
}
