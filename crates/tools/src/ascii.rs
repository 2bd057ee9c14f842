//! ASCII helpers shared by the HTML lexer and keyword tables.

/// Whitespace as the HTML grammar defines it: space, tab, LF, FF, CR.
#[inline]
pub fn is_html_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\x0C' | b'\r')
}

/// `is_html_space` for chars; non-ASCII is never space.
#[inline]
pub fn is_html_space_char(c: char) -> bool {
    c.is_ascii() && is_html_space(c as u8)
}

/// Case-insensitive (ASCII) prefix test.
#[inline]
pub fn starts_with_fold(haystack: &str, prefix: &str) -> bool {
    haystack.len() >= prefix.len()
        && haystack.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Case-insensitive (ASCII) equality for short names.
#[inline]
pub fn eq_fold(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().eq_ignore_ascii_case(b.as_bytes())
}

/// Case-insensitive (ASCII) suffix test. Byte-based, so the suffix
/// boundary need not fall on a UTF-8 char boundary in `haystack`.
#[inline]
pub fn ends_with_fold(haystack: &str, suffix: &str) -> bool {
    let h = haystack.as_bytes();
    let s = suffix.as_bytes();
    h.len() >= s.len() && h[h.len() - s.len()..].eq_ignore_ascii_case(s)
}

/// Trim leading and trailing HTML whitespace.
pub fn trim_html_space(s: &str) -> &str {
    let bytes = s.as_bytes();
    let mut start = 0;
    while start < bytes.len() && is_html_space(bytes[start]) {
        start += 1;
    }
    let mut end = bytes.len();
    while end > start && is_html_space(bytes[end - 1]) {
        end -= 1;
    }
    &s[start..end]
}
