//! Shell-style wildcard patterns for domain specifications.
//!
//! `*` matches any run of bytes (including none) and `?` matches exactly
//! one byte. Everything else matches literally.

#[derive(Debug, Clone)]
pub struct Wildcard {
    pattern: String,
}

impl Wildcard {
    pub fn new(pattern: impl Into<String>) -> Self {
        Wildcard { pattern: pattern.into() }
    }

    pub fn spec(&self) -> &str {
        &self.pattern
    }

    /// True when the pattern contains no metacharacters and can only
    /// match itself.
    pub fn is_simple(&self) -> bool {
        !self.pattern.bytes().any(|b| b == b'*' || b == b'?')
    }

    /// Greedy linear-time match with single-level backtracking: on a
    /// mismatch past a `*`, retry the star against one more byte.
    pub fn matches(&self, text: &str) -> bool {
        let p = self.pattern.as_bytes();
        let t = text.as_bytes();
        let mut pi = 0;
        let mut ti = 0;
        let mut star: Option<(usize, usize)> = None;
        while ti < t.len() {
            if pi < p.len() && (p[pi] == b'?' || p[pi] == t[ti]) {
                pi += 1;
                ti += 1;
            } else if pi < p.len() && p[pi] == b'*' {
                star = Some((pi, ti));
                pi += 1;
            } else if let Some((sp, st)) = star {
                pi = sp + 1;
                ti = st + 1;
                star = Some((sp, st + 1));
            } else {
                return false;
            }
        }
        while pi < p.len() && p[pi] == b'*' {
            pi += 1;
        }
        pi == p.len()
    }
}
