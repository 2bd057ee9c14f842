//! Attribute-value entity escaping and unescaping.
//!
//! Decoding is deliberately conservative: any non-ASCII character outside
//! an escape sequence is a decode error, because a value holding raw 8-bit
//! bytes (possibly a multi-byte sequence in an unknown charset) cannot be
//! unescaped and re-escaped reversibly. Callers treat a decode error as
//! "leave the escaped form alone", never as fatal.

use std::fmt::Write as _;

/// Named entities and their expansions. Single-character Latin-1 entries
/// also drive the reverse (escaping) direction; multi-character or
/// beyond-Latin-1 entries decode only.
const ENTITIES: &[(&str, &str)] = &[
    ("quot", "\""),
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    // Latin-1 block, 160-255.
    ("nbsp", "\u{a0}"),
    ("iexcl", "\u{a1}"),
    ("cent", "\u{a2}"),
    ("pound", "\u{a3}"),
    ("curren", "\u{a4}"),
    ("yen", "\u{a5}"),
    ("brvbar", "\u{a6}"),
    ("sect", "\u{a7}"),
    ("uml", "\u{a8}"),
    ("copy", "\u{a9}"),
    ("ordf", "\u{aa}"),
    ("laquo", "\u{ab}"),
    ("not", "\u{ac}"),
    ("shy", "\u{ad}"),
    ("reg", "\u{ae}"),
    ("macr", "\u{af}"),
    ("deg", "\u{b0}"),
    ("plusmn", "\u{b1}"),
    ("sup2", "\u{b2}"),
    ("sup3", "\u{b3}"),
    ("acute", "\u{b4}"),
    ("micro", "\u{b5}"),
    ("para", "\u{b6}"),
    ("middot", "\u{b7}"),
    ("cedil", "\u{b8}"),
    ("sup1", "\u{b9}"),
    ("ordm", "\u{ba}"),
    ("raquo", "\u{bb}"),
    ("frac14", "\u{bc}"),
    ("frac12", "\u{bd}"),
    ("frac34", "\u{be}"),
    ("iquest", "\u{bf}"),
    ("Agrave", "\u{c0}"),
    ("Aacute", "\u{c1}"),
    ("Acirc", "\u{c2}"),
    ("Atilde", "\u{c3}"),
    ("Auml", "\u{c4}"),
    ("Aring", "\u{c5}"),
    ("AElig", "\u{c6}"),
    ("Ccedil", "\u{c7}"),
    ("Egrave", "\u{c8}"),
    ("Eacute", "\u{c9}"),
    ("Ecirc", "\u{ca}"),
    ("Euml", "\u{cb}"),
    ("Igrave", "\u{cc}"),
    ("Iacute", "\u{cd}"),
    ("Icirc", "\u{ce}"),
    ("Iuml", "\u{cf}"),
    ("ETH", "\u{d0}"),
    ("Ntilde", "\u{d1}"),
    ("Ograve", "\u{d2}"),
    ("Oacute", "\u{d3}"),
    ("Ocirc", "\u{d4}"),
    ("Otilde", "\u{d5}"),
    ("Ouml", "\u{d6}"),
    ("times", "\u{d7}"),
    ("Oslash", "\u{d8}"),
    ("Ugrave", "\u{d9}"),
    ("Uacute", "\u{da}"),
    ("Ucirc", "\u{db}"),
    ("Uuml", "\u{dc}"),
    ("Yacute", "\u{dd}"),
    ("THORN", "\u{de}"),
    ("szlig", "\u{df}"),
    ("agrave", "\u{e0}"),
    ("aacute", "\u{e1}"),
    ("acirc", "\u{e2}"),
    ("atilde", "\u{e3}"),
    ("auml", "\u{e4}"),
    ("aring", "\u{e5}"),
    ("aelig", "\u{e6}"),
    ("ccedil", "\u{e7}"),
    ("egrave", "\u{e8}"),
    ("eacute", "\u{e9}"),
    ("ecirc", "\u{ea}"),
    ("euml", "\u{eb}"),
    ("igrave", "\u{ec}"),
    ("iacute", "\u{ed}"),
    ("icirc", "\u{ee}"),
    ("iuml", "\u{ef}"),
    ("eth", "\u{f0}"),
    ("ntilde", "\u{f1}"),
    ("ograve", "\u{f2}"),
    ("oacute", "\u{f3}"),
    ("ocirc", "\u{f4}"),
    ("otilde", "\u{f5}"),
    ("ouml", "\u{f6}"),
    ("divide", "\u{f7}"),
    ("oslash", "\u{f8}"),
    ("ugrave", "\u{f9}"),
    ("uacute", "\u{fa}"),
    ("ucirc", "\u{fb}"),
    ("uuml", "\u{fc}"),
    ("yacute", "\u{fd}"),
    ("thorn", "\u{fe}"),
    ("yuml", "\u{ff}"),
    // Beyond Latin-1: decode-only.
    ("OElig", "\u{152}"),
    ("oelig", "\u{153}"),
    ("Scaron", "\u{160}"),
    ("scaron", "\u{161}"),
    ("Yuml", "\u{178}"),
    ("ndash", "\u{2013}"),
    ("mdash", "\u{2014}"),
    ("lsquo", "\u{2018}"),
    ("rsquo", "\u{2019}"),
    ("sbquo", "\u{201a}"),
    ("ldquo", "\u{201c}"),
    ("rdquo", "\u{201d}"),
    ("bdquo", "\u{201e}"),
    ("dagger", "\u{2020}"),
    ("Dagger", "\u{2021}"),
    ("bull", "\u{2022}"),
    ("hellip", "\u{2026}"),
    ("permil", "\u{2030}"),
    ("lsaquo", "\u{2039}"),
    ("rsaquo", "\u{203a}"),
    ("euro", "\u{20ac}"),
    ("trade", "\u{2122}"),
];

fn lookup_sensitive(name: &str) -> Option<&'static str> {
    ENTITIES.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
}

/// Case-insensitive lookup, valid only for names whose folded spelling is
/// unambiguous (`QUOT` may stand for `quot`, but `Aelig` must not resolve
/// to either `AElig` or `aelig` unpredictably).
fn lookup_insensitive(name: &str) -> Option<&'static str> {
    let mut found: Option<&'static str> = None;
    for (n, v) in ENTITIES {
        if tools::ascii::eq_fold(n, name) {
            if found.is_some() {
                return None;
            }
            found = Some(v);
        }
    }
    found
}

fn is_multi_byte(value: &str) -> bool {
    value.chars().count() > 1 || value.chars().next().is_some_and(|c| c as u32 > 0xFF)
}

/// Unescape an attribute value. `None` means decode error: the value
/// cannot be represented reversibly and must be used in escaped form.
pub fn unescape(escaped: &str) -> Option<String> {
    if escaped.is_empty() {
        return Some(String::new());
    }

    let bytes = escaped.as_bytes();
    let mut buf = String::new();
    let mut escape = String::new();
    let mut numeric_value: u32 = 0;
    let mut numeric_mode = false;
    let mut hex_mode = false;
    let mut in_escape = false;
    let mut found_ampersand = false;

    let mut i = 0;
    while i < bytes.len() {
        let ch = bytes[i];
        if !in_escape {
            if ch == b'&' {
                if !found_ampersand {
                    found_ampersand = true;
                    buf.push_str(&escaped[..i]);
                }
                in_escape = true;
                escape.clear();
                numeric_value = 0;
                numeric_mode = false;
                hex_mode = false;
            } else if ch > 127 {
                return None;
            } else if found_ampersand {
                buf.push(ch as char);
            }
        } else if escape.is_empty() && ch == b'#' {
            escape.push('#');
            numeric_mode = true;
            if i + 1 < bytes.len() && bytes[i + 1].to_ascii_uppercase() == b'X' {
                hex_mode = true;
                i += 1;
            }
        } else if ch == b';' {
            try_unescape(numeric_mode, numeric_value, &escape, true, &mut buf)?;
            in_escape = false;
        } else if ch > 127 {
            return None;
        } else {
            // Accumulate into the escape in the current mode; a character
            // that cannot extend the sequence terminates it implicitly and
            // is then re-examined as ordinary content.
            let improperly_terminated = if numeric_mode {
                match accumulate_digit(ch, hex_mode, numeric_value) {
                    Some(v) => {
                        numeric_value = v;
                        false
                    }
                    None => true,
                }
            } else {
                !ch.is_ascii_alphanumeric()
            };
            if improperly_terminated {
                try_unescape(numeric_mode, numeric_value, &escape, false, &mut buf)?;
                in_escape = false;
                continue; // re-examine ch outside the escape
            }
            escape.push(ch as char);
        }
        i += 1;
    }

    if !found_ampersand {
        return Some(escaped.to_string());
    }
    if in_escape {
        if escape.is_empty() {
            buf.push('&');
        } else {
            try_unescape(numeric_mode, numeric_value, &escape, false, &mut buf)?;
        }
    }
    Some(buf)
}

fn accumulate_digit(ch: u8, hex_mode: bool, acc: u32) -> Option<u32> {
    let digit = if hex_mode {
        (ch as char).to_digit(16)?
    } else {
        (ch as char).to_digit(10)?
    };
    let base = if hex_mode { 16 } else { 10 };
    Some(acc.saturating_mul(base).saturating_add(digit))
}

fn try_unescape(
    numeric_mode: bool,
    numeric_value: u32,
    escape: &str,
    was_terminated: bool,
    buf: &mut String,
) -> Option<()> {
    if numeric_mode && escape.len() > 1 {
        // Only the Latin-1 range is reversible byte-for-byte.
        if numeric_value <= 0xFF {
            buf.push(char::from_u32(numeric_value)?);
            return Some(());
        }
        return None;
    }

    if let Some(value) = lookup_sensitive(escape) {
        buf.push_str(value);
        return Some(());
    }
    // Reject a case-mismatch of a known multi-byte sequence (e.g. Hellip),
    // which could not be re-escaped without adding a spurious &amp;.
    if ENTITIES
        .iter()
        .any(|(n, v)| tools::ascii::eq_fold(n, escape) && is_multi_byte(v))
    {
        return None;
    }
    if let Some(value) = lookup_insensitive(escape) {
        buf.push_str(value);
        return Some(());
    }
    // &apos; is not legal HTML but is widespread; accept it on input while
    // still escaping ' as &#39; on output.
    if tools::ascii::eq_fold(escape, "apos") {
        buf.push('\'');
        return Some(());
    }
    // Let random words through (a&b stays a&b rather than a&amp;b).
    buf.push('&');
    buf.push_str(escape);
    if was_terminated {
        buf.push(';');
    }
    Some(())
}

/// Escape a raw value for embedding in an attribute.
pub fn escape(unescaped: &str) -> String {
    let mut buf = String::with_capacity(unescaped.len());
    for c in unescaped.chars() {
        let code = c as u32;
        let needs_escape = !matches!(c, ' ' | '\t' | '\n' | '\x0C' | '\r')
            && (code > 127 || code < 32 || matches!(c, '"' | '\'' | '&' | '<' | '>'));
        if !needs_escape {
            buf.push(c);
            continue;
        }
        let mut scratch = [0u8; 4];
        let as_str: &str = c.encode_utf8(&mut scratch);
        match ENTITIES
            .iter()
            .find(|(_, v)| *v == as_str && !is_multi_byte(v))
        {
            Some((name, _)) => {
                buf.push('&');
                buf.push_str(name);
                buf.push(';');
            }
            None => {
                let _ = write!(buf, "&#{code:02};");
            }
        }
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_pass_through() {
        assert_eq!(unescape("styles/blue.css").as_deref(), Some("styles/blue.css"));
        assert_eq!(unescape("").as_deref(), Some(""));
    }

    #[test]
    fn named_and_numeric_escapes_decode() {
        assert_eq!(unescape("a&amp;b").as_deref(), Some("a&b"));
        assert_eq!(unescape("&quot;x&quot;").as_deref(), Some("\"x\""));
        assert_eq!(unescape("&#65;&#x42;").as_deref(), Some("AB"));
        assert_eq!(unescape("&copy;").as_deref(), Some("\u{a9}"));
    }

    #[test]
    fn bare_ampersand_is_literal() {
        assert_eq!(unescape("a&b").as_deref(), Some("a&b"));
        assert_eq!(unescape("v1&v2=3&").as_deref(), Some("v1&v2=3&"));
    }

    #[test]
    fn wrong_case_resolves_only_when_unambiguous() {
        assert_eq!(unescape("&QUOT;").as_deref(), Some("\""));
        // AElig and aelig are distinct code points; a third spelling is an
        // error rather than an arbitrary pick.
        assert_eq!(unescape("&Aelig;"), None);
    }

    #[test]
    fn eight_bit_content_is_a_decode_error() {
        assert_eq!(unescape("caf\u{e9}"), None);
        assert_eq!(unescape("&#999;"), None);
    }

    #[test]
    fn apos_decodes_but_reescapes_numerically() {
        assert_eq!(unescape("&apos;").as_deref(), Some("'"));
        assert_eq!(escape("'"), "&#39;");
    }

    #[test]
    fn escape_round_trips_through_unescape() {
        let raw = "a<b>&\"c\"\u{e9}";
        let escaped = escape(raw);
        assert_eq!(escaped, "a&lt;b&gt;&amp;&quot;c&quot;&eacute;");
        assert_eq!(unescape(&escaped).as_deref(), Some(raw));
    }

    #[test]
    fn improperly_terminated_escape_recovers() {
        assert_eq!(unescape("&#65Z;").as_deref(), Some("AZ;"));
        assert_eq!(unescape("&ampx").as_deref(), Some("&ampx"));
    }
}
