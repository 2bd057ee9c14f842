//! Character-at-a-time HTML lexer.
//!
//! Every byte is appended to a retained literal buffer as it arrives; when a
//! construct is recognized the consumed text is chopped off the buffer, and
//! anything that fails to parse is emitted verbatim as Characters. That is
//! what makes the output byte-accurate for arbitrarily broken input, and it
//! is also what lets a Characters run span a flush: the buffer simply stays
//! resident until the next construct disambiguates it.
//!
//! State names follow the HTML5 tokenizer sections they approximate.

use log::info;
use tools::ascii::{ends_with_fold, eq_fold, is_html_space_char, starts_with_fold};

use crate::node::{CloseStyle, NodeId, QuoteStyle};
use crate::parse::HtmlParse;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum State {
    #[default]
    Start,
    Tag,
    TagOpen,
    TagCloseNoName,
    TagClose,
    TagCloseTerminate,
    TagBriefClose,
    CommentStart1,
    CommentStart2,
    CommentBody,
    CommentEnd1,
    CommentEnd2,
    CdataStart(u8),
    CdataBody,
    CdataEnd1,
    CdataEnd2,
    TagAttribute,
    TagAttrName,
    TagAttrNameSpace,
    TagAttrEq,
    TagAttrVal,
    TagAttrValDq,
    TagAttrValSq,
    LiteralTag,
    ScriptTag,
    Directive,
    BogusComment,
}

#[derive(Debug, Default)]
pub(crate) struct Lexer {
    state: State,
    token: String,
    attr_name: String,
    attr_value: String,
    attr_quote: QuoteStyle,
    has_attr_value: bool,
    // Bytes not yet claimed by any recognized construct.
    literal: String,
    // The "</tag>" spelling that ends the current literal element.
    literal_close: String,
    element: Option<NodeId>,
    element_stack: Vec<NodeId>,
    line: u32,
    tag_start_line: u32,
    // Double-escaping state for <script> bodies that contain an HTML
    // comment wrapping another <script>. See the WHATWG CDATA-escapes note.
    script_html_comment: bool,
    script_html_comment_script: bool,
    // After error recovery on a closing tag we lex attributes but throw
    // them away until back at Start.
    discard_for_error_recovery: bool,
    doctype_xhtml: bool,
    id: String,
}

fn is_legal_tag_first_char(c: char) -> bool {
    c.is_ascii_alphabetic()
}

// Letters, digits, non-ASCII and a few symbols, per observed browser
// behavior rather than any spec.
fn is_legal_tag_char(c: char) -> bool {
    !c.is_ascii()
        || c.is_ascii_alphanumeric()
        || c == '<'
        || c == '-'
        || c == '#'
        || c == '_'
        || c == ':'
}

fn is_legal_attr_name_char(c: char) -> bool {
    !c.is_ascii() || (c != '=' && c != '>' && c != '/' && !is_html_space_char(c))
}

// Characters after "</script" that terminate script parsing or one
// escaping level.
fn can_end_tag(c: char) -> bool {
    matches!(c, '\t' | '\r' | '\n' | '\x0C' | ' ' | '/' | '>')
}

impl Lexer {
    pub(crate) fn start_parse(&mut self, id: &str) {
        self.line = 1;
        self.tag_start_line = 1;
        self.id = id.to_string();
        self.has_attr_value = false;
        self.attr_quote = QuoteStyle::NoQuote;
        self.state = State::Start;
        self.element_stack.clear();
        self.element = None;
        self.token.clear();
        self.attr_name.clear();
        self.attr_value.clear();
        self.literal.clear();
        self.literal_close.clear();
        self.script_html_comment = false;
        self.script_html_comment_script = false;
        self.discard_for_error_recovery = false;
        self.doctype_xhtml = false;
    }

    pub(crate) fn parse(&mut self, parse: &mut HtmlParse, text: &str) {
        let mut rest = text;
        while !rest.is_empty() {
            // Fast path: outside any construct, everything up to the next
            // '<' is plain text and can be copied in bulk.
            if self.state == State::Start {
                let split = memchr::memchr(b'<', rest.as_bytes()).unwrap_or(rest.len());
                if split > 0 {
                    let (run, tail) = rest.split_at(split);
                    self.line += run.bytes().filter(|&b| b == b'\n').count() as u32;
                    self.literal.push_str(run);
                    rest = tail;
                    continue;
                }
            }
            let Some(c) = rest.chars().next() else {
                break;
            };
            rest = &rest[c.len_utf8()..];
            if c == '\n' {
                self.line += 1;
            }

            // Track every byte; recognized constructs chop themselves back
            // off, the rest is re-serialized uninterpreted.
            self.literal.push(c);

            match self.state {
                State::Start => self.eval_start(parse, c),
                State::Tag => self.eval_tag(parse, c),
                State::TagOpen => self.eval_tag_open(parse, c),
                State::TagCloseNoName => self.eval_tag_close_no_name(parse, c),
                State::TagClose | State::TagCloseTerminate => self.eval_tag_close(parse, c),
                State::TagBriefClose => self.eval_tag_brief_close(parse, c),
                State::CommentStart1 => self.eval_comment_start1(parse, c),
                State::CommentStart2 => self.eval_comment_start2(parse, c),
                State::CommentBody => self.eval_comment_body(c),
                State::CommentEnd1 => self.eval_comment_end1(c),
                State::CommentEnd2 => self.eval_comment_end2(parse, c),
                State::CdataStart(n) => self.eval_cdata_start(parse, n, c),
                State::CdataBody => self.eval_cdata_body(c),
                State::CdataEnd1 => self.eval_cdata_end1(c),
                State::CdataEnd2 => self.eval_cdata_end2(parse, c),
                State::TagAttribute => self.eval_attribute(parse, c),
                State::TagAttrName => self.eval_attr_name(parse, c),
                State::TagAttrNameSpace => self.eval_attr_name_space(parse, c),
                State::TagAttrEq => self.eval_attr_eq(parse, c),
                State::TagAttrVal => self.eval_attr_val(parse, c),
                State::TagAttrValDq => self.eval_attr_val_dq(parse, c),
                State::TagAttrValSq => self.eval_attr_val_sq(parse, c),
                State::LiteralTag => self.eval_literal_tag(parse, c),
                State::ScriptTag => self.eval_script_tag(parse, c),
                State::Directive => self.eval_directive(parse, c),
                State::BogusComment => self.eval_bogus_comment(parse, c),
            }
        }
    }

    pub(crate) fn finish_parse(&mut self, parse: &mut HtmlParse) {
        if !self.token.is_empty() {
            self.syntax_error(format_args!("End-of-file in mid-token: {}", self.token));
            self.token.clear();
        }
        if !self.attr_name.is_empty() {
            self.syntax_error(format_args!(
                "End-of-file in mid-attribute-name: {}",
                self.attr_name
            ));
            self.attr_name.clear();
        }
        if !self.attr_value.is_empty() {
            self.syntax_error(format_args!(
                "End-of-file in mid-attribute-value: {}",
                self.attr_value
            ));
            self.attr_value.clear();
        }

        if !self.literal.is_empty() {
            self.emit_literal(parse);
        }

        while let Some(&element) = self.element_stack.last() {
            self.token = parse.element(element).name().as_str().to_string();
            self.emit_tag_close(parse, CloseStyle::Unclosed);
            if !parse
                .keywords()
                .is_optionally_closed(parse.element_atom(element))
            {
                info!(
                    target: "html.lexer",
                    "{}: End-of-file with open tag: {}",
                    self.id,
                    parse.element(element).name().as_str()
                );
            }
        }
        self.element = None;
    }

    pub(crate) fn parent(&self) -> Option<NodeId> {
        self.element_stack.last().copied()
    }

    pub(crate) fn is_xhtml(&self) -> bool {
        self.doctype_xhtml
    }

    fn syntax_error(&self, msg: std::fmt::Arguments) {
        info!(target: "html.lexer", "{}: line {}: {}", self.id, self.line, msg);
    }

    fn eval_start(&mut self, parse: &mut HtmlParse, c: char) {
        if c == '<' {
            self.literal.pop();
            self.emit_literal(parse);
            self.literal.push(c);
            self.state = State::Tag;
            self.discard_for_error_recovery = false;
            self.tag_start_line = self.line;
        } else {
            self.state = State::Start;
        }
    }

    // HTML5: Tag open state.
    fn eval_tag(&mut self, parse: &mut HtmlParse, c: char) {
        if c == '/' {
            self.state = State::TagCloseNoName;
        } else if is_legal_tag_first_char(c) {
            self.state = State::TagOpen;
            self.discard_for_error_recovery = false;
            self.token.push(c);
        } else if c == '!' {
            self.state = State::CommentStart1;
        } else if c == '?' {
            self.state = State::BogusComment;
        } else {
            self.syntax_error(format_args!(
                "Invalid tag syntax: unexpected sequence `<{c}'"
            ));
            self.eval_start(parse, c);
        }
    }

    fn eval_tag_open(&mut self, parse: &mut HtmlParse, c: char) {
        if is_legal_tag_char(c) {
            self.token.push(c);
        } else if c == '>' {
            self.make_element(parse);
            self.emit_tag_open(parse, true);
        } else if c == '/' {
            self.state = State::TagBriefClose;
        } else if is_html_space_char(c) {
            self.state = State::TagAttribute;
        } else {
            self.syntax_error(format_args!(
                "Invalid character `{c}' while parsing tag `{}'",
                self.token
            ));
            self.token.clear();
            self.state = State::Start;
        }
    }

    // HTML5: Self-closing start tag state. Only reachable before any `=`.
    fn eval_tag_brief_close(&mut self, parse: &mut HtmlParse, c: char) {
        if c == '>' {
            if !self.discard_for_error_recovery {
                self.make_element(parse);
            }
            self.finish_attribute(parse, c, self.has_attr_value, true);
        } else {
            if !self.attr_name.is_empty() {
                self.make_attribute(parse, self.has_attr_value);
            }
            self.state = State::TagAttribute;
            self.eval_attribute(parse, c);
        }
    }

    // HTML5: End tag open state.
    fn eval_tag_close_no_name(&mut self, parse: &mut HtmlParse, c: char) {
        if is_legal_tag_char(c) {
            self.token.push(c);
            self.state = State::TagClose;
        } else if c == '>' {
            self.syntax_error(format_args!("Invalid tag syntax: </>"));
            self.token.clear();
            self.eval_start(parse, c);
        } else {
            self.state = State::BogusComment;
        }
    }

    // "</a" and, once whitespace is seen, "</a " (which may only be
    // followed by more whitespace or '>').
    fn eval_tag_close(&mut self, parse: &mut HtmlParse, c: char) {
        if self.state != State::TagCloseTerminate && is_legal_tag_char(c) {
            self.token.push(c);
        } else if is_html_space_char(c) {
            if !self.token.is_empty() {
                self.state = State::TagCloseTerminate;
            }
        } else if c == '>' {
            self.emit_tag_close(parse, CloseStyle::ExplicitClose);
        } else {
            self.syntax_error(format_args!(
                "Invalid tag syntax: expected `>' after `</{}' got `{c}'",
                self.token
            ));
            self.token.clear();
            self.eval_start(parse, c);
        }
    }

    fn eval_directive(&mut self, parse: &mut HtmlParse, c: char) {
        if c == '>' {
            self.emit_directive(parse);
        } else {
            self.token.push(c);
        }
    }

    // HTML5: Bogus comment state; the bytes pass through as Characters.
    fn eval_bogus_comment(&mut self, parse: &mut HtmlParse, c: char) {
        if c == '>' {
            self.emit_literal(parse);
            self.state = State::Start;
        }
    }

    // A mismatched char after a partial "<!--" style prefix: flush what came
    // before it, then let Start re-examine the char.
    fn restart(&mut self, parse: &mut HtmlParse, c: char) {
        self.literal.pop();
        self.emit_literal(parse);
        self.literal.push(c);
        self.eval_start(parse, c);
    }

    fn eval_comment_start1(&mut self, parse: &mut HtmlParse, c: char) {
        if c == '-' {
            self.state = State::CommentStart2;
        } else if c == '[' {
            self.state = State::CdataStart(0);
        } else if is_legal_tag_char(c) && c != '<' {
            self.state = State::Directive;
            self.eval_directive(parse, c);
        } else {
            self.syntax_error(format_args!("Invalid comment syntax"));
            self.restart(parse, c);
        }
    }

    fn eval_comment_start2(&mut self, parse: &mut HtmlParse, c: char) {
        if c == '-' {
            self.state = State::CommentBody;
        } else {
            self.syntax_error(format_args!("Invalid comment syntax"));
            self.restart(parse, c);
        }
    }

    fn eval_comment_body(&mut self, c: char) {
        if c == '-' {
            self.state = State::CommentEnd1;
        } else {
            self.token.push(c);
        }
    }

    fn eval_comment_end1(&mut self, c: char) {
        if c == '-' {
            self.state = State::CommentEnd2;
        } else {
            // A lone dash was just part of the comment.
            self.token.push('-');
            self.token.push(c);
            self.state = State::CommentBody;
        }
    }

    fn eval_comment_end2(&mut self, parse: &mut HtmlParse, c: char) {
        if c == '>' {
            self.emit_comment(parse);
            self.state = State::Start;
        } else if c == '-' {
            // Arbitrarily many dashes may precede the '>'.
            self.token.push('-');
        } else {
            self.token.push_str("--");
            self.token.push(c);
            self.state = State::CommentBody;
        }
    }

    // "<![" followed by "CDATA[", matched one char at a time.
    fn eval_cdata_start(&mut self, parse: &mut HtmlParse, matched: u8, c: char) {
        const OPEN: &[u8] = b"CDATA[";
        if c == OPEN[matched as usize] as char {
            self.state = if matched as usize + 1 == OPEN.len() {
                State::CdataBody
            } else {
                State::CdataStart(matched + 1)
            };
        } else {
            self.syntax_error(format_args!("Invalid CDATA syntax"));
            self.restart(parse, c);
        }
    }

    fn eval_cdata_body(&mut self, c: char) {
        if c == ']' {
            self.state = State::CdataEnd1;
        } else {
            self.token.push(c);
        }
    }

    fn eval_cdata_end1(&mut self, c: char) {
        if c == ']' {
            self.state = State::CdataEnd2;
        } else {
            self.token.push(']');
            self.token.push(c);
            self.state = State::CdataBody;
        }
    }

    fn eval_cdata_end2(&mut self, parse: &mut HtmlParse, c: char) {
        if c == '>' {
            self.emit_cdata(parse);
            self.state = State::Start;
        } else {
            self.token.push_str("]]");
            self.token.push(c);
            self.state = State::CdataBody;
        }
    }

    // Inside <style> and friends nothing is special until the matching
    // close-tag spelling shows up.
    fn eval_literal_tag(&mut self, parse: &mut HtmlParse, c: char) {
        if c == '>' {
            debug_assert!(self.literal_close.len() > 3);
            if self.literal.len() >= self.literal_close.len() {
                let tail_at = self.literal.len() - self.literal_close.len();
                // Byte compare: tail_at may land mid-char when the body
                // holds multi-byte text, but a successful match means the
                // tail is the ASCII close tag.
                if self.literal.as_bytes()[tail_at..]
                    .eq_ignore_ascii_case(self.literal_close.as_bytes())
                {
                    // The literal body starts after "<style>" and ends
                    // before "</style>"; chop the close tag off.
                    self.literal.truncate(tail_at);
                    self.emit_literal(parse);
                    self.token.clear();
                    self.token
                        .push_str(&self.literal_close[2..self.literal_close.len() - 1]);
                    self.emit_tag_close(parse, CloseStyle::ExplicitClose);
                }
            }
        }
    }

    // Script bodies get one extra wrinkle: "</script>" does not close the
    // element while we are inside an HTML comment that re-opened <script>.
    fn eval_script_tag(&mut self, parse: &mut HtmlParse, c: char) {
        if c == '-' && self.literal.ends_with("<!--") {
            self.script_html_comment = true;
        }

        if can_end_tag(c) && !self.literal.is_empty() {
            let prev_fragment = &self.literal[..self.literal.len() - c.len_utf8()];
            if ends_with_fold(prev_fragment, "</script") {
                if self.script_html_comment_script {
                    // Just close one escaping level, not the script.
                    self.script_html_comment_script = false;
                } else {
                    self.script_html_comment = false;
                    // Save the source spelling of "script" for the close
                    // tag, then drop "</script" plus c from the literal.
                    let n = self.literal.len();
                    self.token = self.literal[n - 7..n - 1].to_string();
                    self.literal.truncate(n - 9);
                    self.emit_literal(parse);
                    self.emit_tag_close(parse, CloseStyle::ExplicitClose);

                    if matches!(c, '\t' | '\n' | '\r' | '\x0C' | ' ') {
                        // Attributes on a closing tag get parsed and thrown
                        // away.
                        self.discard_for_error_recovery = true;
                        self.state = State::TagAttribute;
                    } else if c == '/' {
                        self.discard_for_error_recovery = true;
                        self.state = State::TagBriefClose;
                    }
                }
            } else if self.script_html_comment && ends_with_fold(prev_fragment, "<script") {
                // A nested-looking <script> inside a comment adds an
                // escaping level.
                self.script_html_comment_script = true;
            } else if c == '>' && self.literal.ends_with("-->") {
                self.script_html_comment = false;
                self.script_html_comment_script = false;
            }
        }
    }

    fn emit_literal(&mut self, parse: &mut HtmlParse) {
        if !self.literal.is_empty() {
            let node = parse.new_characters_node(self.parent(), &self.literal);
            parse.add_leaf_event(node, self.tag_start_line);
            self.literal.clear();
        }
        self.state = State::Start;
    }

    fn emit_comment(&mut self, parse: &mut HtmlParse) {
        self.literal.clear();
        // Conditional-comment detection is a heuristic; the syntax is not
        // formally specified anywhere.
        if self.token.contains("[if") || self.token.contains("[endif]") {
            let node = parse.new_ie_directive_node(self.parent(), &self.token);
            parse.add_leaf_event(node, self.tag_start_line);
        } else {
            let node = parse.new_comment_node(self.parent(), &self.token);
            parse.add_leaf_event(node, self.tag_start_line);
        }
        self.token.clear();
        self.state = State::Start;
    }

    fn emit_cdata(&mut self, parse: &mut HtmlParse) {
        self.literal.clear();
        let node = parse.new_cdata_node(self.parent(), &self.token);
        parse.add_leaf_event(node, self.tag_start_line);
        self.token.clear();
        self.state = State::Start;
    }

    fn emit_directive(&mut self, parse: &mut HtmlParse) {
        self.literal.clear();
        let node = parse.new_directive_node(self.parent(), &self.token);
        parse.add_leaf_event(node, self.line);
        if starts_with_fold(&self.token, "doctype") {
            self.doctype_xhtml = self.token.to_ascii_lowercase().contains("xhtml");
        }
        self.token.clear();
        self.state = State::Start;
    }

    /// Add the pending element's start event, auto-closing any open
    /// elements the keyword tables say it terminates. With
    /// `allow_implicit_close`, void tags are closed on the spot.
    fn emit_tag_open(&mut self, parse: &mut HtmlParse, allow_implicit_close: bool) {
        if self.discard_for_error_recovery {
            self.state = State::Start;
            self.literal.clear();
            return;
        }

        let Some(element) = self.element.take() else {
            debug_assert!(false, "emit_tag_open without a pending element");
            return;
        };
        debug_assert!(self.token.is_empty());
        let next_atom = parse.element_atom(element);

        // Keep popping: in "<tr><i>a<tr>b" the second <tr> first closes the
        // <i>, then the <tr> underneath it.
        while let Some(&open) = self.element_stack.last() {
            let open_atom = parse.element_atom(open);
            if parse.keywords().is_auto_close(open_atom, next_atom) {
                self.element_stack.pop();
                parse.close_element(open, CloseStyle::AutoClose, self.line);
                parse.set_node_parent(element, self.parent());
            } else {
                break;
            }
        }

        self.literal.clear();
        parse.add_element_event(element, self.tag_start_line);
        self.element_stack.push(element);
        if parse.keywords().is_always_literal(next_atom) {
            self.state = if next_atom == parse.keywords().script {
                State::ScriptTag
            } else {
                State::LiteralTag
            };
            self.script_html_comment = false;
            self.script_html_comment_script = false;
            self.literal_close = format!("</{}>", parse.element(element).name().as_str());
        } else {
            self.state = State::Start;
        }

        if allow_implicit_close && parse.keywords().is_implicitly_closed(next_atom) {
            self.token = parse.element(element).name().as_str().to_string();
            self.emit_tag_close(parse, CloseStyle::ImplicitClose);
        }
    }

    fn emit_tag_brief_close(&mut self, parse: &mut HtmlParse) {
        if !self.discard_for_error_recovery {
            if let Some(element) = self.element_stack.pop() {
                parse.close_element(element, CloseStyle::BriefClose, self.line);
            }
        }
        self.state = State::Start;
    }

    fn emit_tag_close(&mut self, parse: &mut HtmlParse, style: CloseStyle) {
        if let Some(element) = self.pop_element_matching_tag(parse) {
            parse.close_element(element, style, self.line);
        } else {
            self.syntax_error(format_args!(
                "Unexpected close-tag `{}', no tags are open",
                self.token
            ));
            // The tag this close matches was already auto-closed. To stay
            // byte-accurate the "</tag>" text goes out as Characters.
            self.emit_literal(parse);
        }

        self.literal.clear();
        self.token.clear();
        self.state = State::Start;
    }

    // Search the stack from the top for an element matching token,
    // closing everything popped over as Unclosed. Containment bounds the
    // search: a stray </tr> inside <table> matches nothing.
    fn pop_element_matching_tag(&mut self, parse: &mut HtmlParse) -> Option<NodeId> {
        let close_atom = parse.intern(&self.token);
        let mut close_index = None;
        for (i, &element) in self.element_stack.iter().enumerate().rev() {
            if eq_fold(parse.element(element).name().as_str(), &self.token) {
                close_index = Some(i);
                break;
            } else if parse
                .keywords()
                .is_contained(close_atom, parse.element_atom(element))
            {
                return None;
            }
        }

        let close_index = close_index?;
        let element = self.element_stack[close_index];
        for j in (close_index + 1..self.element_stack.len()).rev() {
            let skipped = self.element_stack[j];
            if !parse
                .keywords()
                .is_optionally_closed(parse.element_atom(skipped))
            {
                info!(
                    target: "html.lexer",
                    "{}: line {}: Unclosed element `{}'",
                    self.id,
                    self.line,
                    parse.element(skipped).name().as_str()
                );
            }
            // Pop before closing so the parent bookkeeping sees a
            // consistent stack.
            self.element_stack.truncate(j);
            parse.close_element(skipped, CloseStyle::Unclosed, self.line);
        }
        self.element_stack.truncate(close_index);
        Some(element)
    }

    fn make_element(&mut self, parse: &mut HtmlParse) {
        debug_assert!(!self.discard_for_error_recovery);
        if self.element.is_none() {
            if self.token.is_empty() {
                self.syntax_error(format_args!("Making element with empty tag name"));
            }
            self.element = Some(parse.new_element(self.parent(), &self.token));
            self.token.clear();
        }
    }

    fn make_attribute(&mut self, parse: &mut HtmlParse, has_value: bool) {
        let value = if has_value {
            self.has_attr_value = false;
            Some(self.attr_value.as_str())
        } else {
            debug_assert!(self.attr_value.is_empty());
            None
        };
        if !self.discard_for_error_recovery {
            if let Some(element) = self.element {
                parse.add_escaped_attribute(element, &self.attr_name, value, self.attr_quote);
            }
        }
        self.attr_name.clear();
        self.attr_value.clear();
        self.attr_quote = QuoteStyle::NoQuote;
        self.state = State::TagAttribute;
    }

    // HTML5: Before attribute name state.
    fn eval_attribute(&mut self, parse: &mut HtmlParse, c: char) {
        if !self.discard_for_error_recovery {
            self.make_element(parse);
        }
        self.attr_name.clear();
        self.attr_value.clear();
        if c == '>' {
            self.emit_tag_open(parse, true);
        } else if c == '/' {
            self.state = State::TagBriefClose;
        } else if is_legal_attr_name_char(c) {
            self.attr_name.push(c);
            self.state = State::TagAttrName;
        } else if !is_html_space_char(c) {
            self.syntax_error(format_args!("Unexpected char `{c}' in attribute list"));
            // HTML5 switches to the attribute-name state even for oddities
            // like '"' and '='.
            self.attr_name.push(c);
            self.state = State::TagAttrName;
        }
    }

    // HTML5: Attribute name state.
    fn eval_attr_name(&mut self, parse: &mut HtmlParse, c: char) {
        if c == '=' {
            self.state = State::TagAttrEq;
            self.has_attr_value = true;
        } else if is_html_space_char(c) {
            self.state = State::TagAttrNameSpace;
        } else if c == '>' {
            self.make_attribute(parse, false);
            self.emit_tag_open(parse, true);
        } else if c == '/' {
            self.state = State::TagBriefClose;
        } else {
            self.attr_name.push(c);
        }
    }

    // HTML5: After attribute name state ("<x y ").
    fn eval_attr_name_space(&mut self, parse: &mut HtmlParse, c: char) {
        if c == '=' {
            self.state = State::TagAttrEq;
            self.has_attr_value = true;
        } else if is_html_space_char(c) {
            // stay
        } else if c == '>' {
            self.make_attribute(parse, false);
            self.emit_tag_open(parse, true);
        } else if c == '/' {
            self.state = State::TagBriefClose;
        } else {
            // "<x y z": finish y as valueless, start z.
            self.make_attribute(parse, false);
            self.state = State::TagAttrName;
            self.attr_name.push(c);
        }
    }

    fn finish_attribute(&mut self, parse: &mut HtmlParse, c: char, has_value: bool, brief_close: bool) {
        if is_html_space_char(c) {
            self.make_attribute(parse, has_value);
            self.state = State::TagAttribute;
        } else if c == '>' {
            if !self.attr_name.is_empty() {
                self.make_attribute(parse, has_value);
            }
            self.emit_tag_open(parse, !brief_close);
            if brief_close {
                self.emit_tag_brief_close(parse);
            }
            self.has_attr_value = false;
        } else {
            debug_assert!(false, "finish_attribute on `{c}'");
        }
    }

    // HTML5: Before attribute value state.
    fn eval_attr_eq(&mut self, parse: &mut HtmlParse, c: char) {
        if c == '"' {
            self.attr_quote = QuoteStyle::DoubleQuote;
            self.state = State::TagAttrValDq;
        } else if c == '\'' {
            self.attr_quote = QuoteStyle::SingleQuote;
            self.state = State::TagAttrValSq;
        } else if is_html_space_char(c) {
            // spaces are allowed between '=' and the value
        } else if c == '>' {
            self.finish_attribute(parse, c, true, false);
        } else {
            self.state = State::TagAttrVal;
            self.attr_quote = QuoteStyle::NoQuote;
            self.eval_attr_val(parse, c);
        }
    }

    // HTML5: Attribute value (unquoted) state.
    fn eval_attr_val(&mut self, parse: &mut HtmlParse, c: char) {
        if is_html_space_char(c) || c == '>' {
            self.finish_attribute(parse, c, true, false);
        } else {
            self.attr_value.push(c);
        }
    }

    fn eval_attr_val_dq(&mut self, parse: &mut HtmlParse, c: char) {
        if c == '"' {
            self.make_attribute(parse, true);
        } else {
            self.attr_value.push(c);
        }
    }

    fn eval_attr_val_sq(&mut self, parse: &mut HtmlParse, c: char) {
        if c == '\'' {
            self.make_attribute(parse, true);
        } else {
            self.attr_value.push(c);
        }
    }
}
