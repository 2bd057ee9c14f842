//! Fixed keyword tables driving tag classification and auto-close policy.
//!
//! Tables are a 4-level hierarchy for tables proper
//! (`table > [thead tbody tfoot] > tr > [td th]`), plus the optional-tag
//! rules of <http://www.w3.org/TR/html5/syntax.html#optional-tags> and the
//! formatting-element termination behavior discussed around
//! <http://www.w3.org/TR/html5/the-end.html#misnested-tags:-b-i-b-i>.
//!
//! Filters and golden tests depend on these exact nesting decisions, so
//! membership must not drift.

use std::collections::HashSet;

use crate::atom::{AtomId, AtomTable};

/// Tags closed implicitly by the grammar (void elements).
const IMPLICITLY_CLOSED: &str =
    "xml area base br col embed hr img input keygen link meta param source track wbr";

/// Tags for which `<tag ... />` in source is an open tag, not a self-close.
const NON_BRIEF_TERMINATED: &str = "a div header iframe nav script span style textarea xmp";

/// Raw-text elements whose bodies are never tag-parsed.
const LITERAL: &str = "iframe script style textarea title xmp";

/// Raw-text only under some user-agent settings; treated as raw text here,
/// matching the lexer default.
const SOMETIMES_LITERAL: &str = "noembed noframes noscript";

const TABLE_LEAVES: &str = "td th";
const TABLE_SECTIONS: &str = "tbody tfoot thead";
const TABLE_ELEMENTS: &str = "td th tbody tfoot thead table tr";

/// Formatting elements are terminated by many other tags.
const FORMATTING_ELEMENTS: &str =
    "b i em font strong small s cite q dfn abbr time code var samp kbd sub u mark bdi bdo";

const LIST_ELEMENTS: &str = "li ol ul";
const DECLARATION_ELEMENTS: &str = "dl dt dd";

const PARAGRAPH_TERMINATORS: &str =
    "address article aside blockquote dir div dl fieldset footer form h1 h2 h3 h4 h5 h6 \
     header hgroup hr menu nav ol p pre section table ul";

/// Keyword classification over a parse's atom table.
///
/// Built once per parse; all probes are integer set lookups, so a tag name
/// only matches if it was interned (folded) in the same table.
#[derive(Debug)]
pub struct Keywords {
    implicitly_closed: HashSet<AtomId>,
    non_brief_terminated: HashSet<AtomId>,
    literal: HashSet<AtomId>,
    sometimes_literal: HashSet<AtomId>,
    auto_close: HashSet<(AtomId, AtomId)>,
    contained: HashSet<(AtomId, AtomId)>,
    optionally_closed: HashSet<AtomId>,
    pub script: AtomId,
    pub style: AtomId,
}

impl Keywords {
    pub fn new(atoms: &mut AtomTable) -> Self {
        let mut kw = Keywords {
            implicitly_closed: to_set(atoms, IMPLICITLY_CLOSED),
            non_brief_terminated: to_set(atoms, NON_BRIEF_TERMINATED),
            literal: to_set(atoms, LITERAL),
            sometimes_literal: to_set(atoms, SOMETIMES_LITERAL),
            auto_close: HashSet::new(),
            contained: HashSet::new(),
            optionally_closed: HashSet::new(),
            script: atoms.intern_folded("script"),
            style: atoms.intern_folded("style"),
        };
        kw.init_auto_close(atoms);
        kw.init_contained(atoms);
        kw.init_optionally_closed(atoms);
        kw
    }

    fn init_auto_close(&mut self, atoms: &mut AtomTable) {
        let mut add = |a: &mut AtomTable, open: &str, opened: String| {
            cross_product(a, open, &opened, &mut self.auto_close);
        };
        add(atoms, TABLE_LEAVES, TABLE_LEAVES.to_string());
        add(atoms, TABLE_LEAVES, "tr".to_string());
        add(atoms, "tr", TABLE_SECTIONS.to_string());
        add(atoms, "tr", "tr".to_string());
        add(atoms, TABLE_SECTIONS, TABLE_SECTIONS.to_string());

        add(atoms, "p", PARAGRAPH_TERMINATORS.to_string());

        add(atoms, "li", "li".to_string());
        add(atoms, "dd dt", "dd dt".to_string());
        add(atoms, "rp rt", "rp rt".to_string());
        add(atoms, "optgroup", "optgroup".to_string());
        add(atoms, "option", "optgroup option".to_string());
        add(
            atoms,
            FORMATTING_ELEMENTS,
            format!("tr {LIST_ELEMENTS} {DECLARATION_ELEMENTS}"),
        );
    }

    fn init_contained(&mut self, atoms: &mut AtomTable) {
        cross_product(atoms, TABLE_LEAVES, "table", &mut self.contained);
        cross_product(atoms, "tr", "table", &mut self.contained);
        cross_product(atoms, TABLE_SECTIONS, "table", &mut self.contained);
        cross_product(atoms, "li", "ul ol", &mut self.contained);
        cross_product(atoms, "dd dt", "dl", &mut self.contained);
        cross_product(atoms, "rt rp", "ruby", &mut self.contained);
        cross_product(atoms, FORMATTING_ELEMENTS, "td th", &mut self.contained);
    }

    // These tags do not need to be explicitly closed, but can be; we close
    // them at end-of-document without warning.
    fn init_optionally_closed(&mut self, atoms: &mut AtomTable) {
        for list in [
            FORMATTING_ELEMENTS,
            "body colgroup dd dt html optgroup option p",
            LIST_ELEMENTS,
            TABLE_ELEMENTS,
        ] {
            for name in list.split_ascii_whitespace() {
                self.optionally_closed.insert(atoms.intern_folded(name));
            }
        }
    }

    pub fn is_implicitly_closed(&self, tag: AtomId) -> bool {
        self.implicitly_closed.contains(&tag)
    }

    /// Whether `<tag ... />` in source may be taken as a self-close.
    pub fn is_brief_terminated(&self, tag: AtomId) -> bool {
        !self.non_brief_terminated.contains(&tag)
    }

    pub fn is_literal(&self, tag: AtomId) -> bool {
        self.literal.contains(&tag) || self.sometimes_literal.contains(&tag)
    }

    /// Raw-text always, independent of user-agent settings.
    pub fn is_always_literal(&self, tag: AtomId) -> bool {
        self.literal.contains(&tag)
    }

    /// Does opening `opened` implicitly close a still-open `open`?
    pub fn is_auto_close(&self, open: AtomId, opened: AtomId) -> bool {
        self.auto_close.contains(&(open, opened))
    }

    /// Is `container` the element that bounds the auto-close search for
    /// `tag` (e.g. `li` searches no further than `ul`/`ol`)?
    pub fn is_contained(&self, tag: AtomId, container: AtomId) -> bool {
        self.contained.contains(&(tag, container))
    }

    pub fn is_optionally_closed(&self, tag: AtomId) -> bool {
        self.optionally_closed.contains(&tag)
    }
}

fn to_set(atoms: &mut AtomTable, list: &str) -> HashSet<AtomId> {
    list.split_ascii_whitespace()
        .map(|name| atoms.intern_folded(name))
        .collect()
}

fn cross_product(
    atoms: &mut AtomTable,
    firsts: &str,
    seconds: &str,
    out: &mut HashSet<(AtomId, AtomId)>,
) {
    let first_ids: Vec<AtomId> = firsts
        .split_ascii_whitespace()
        .map(|n| atoms.intern_folded(n))
        .collect();
    for second in seconds.split_ascii_whitespace() {
        let second_id = atoms.intern_folded(second);
        for first_id in &first_ids {
            out.insert((*first_id, second_id));
        }
    }
}
