//! Glob Pattern Module
//!
//! Redis-style glob support: escaping literal key parts and compiling
//! patterns for the in-memory store.

use globset::{GlobBuilder, GlobMatcher};

use crate::error::{CacheError, Result};

/// Characters with meaning in a Redis glob (plus braces, which globset
/// treats as alternation).
const GLOB_SPECIAL: &[char] = &['*', '?', '[', ']', '\\', '{', '}'];

// == Escape ==
/// Escapes a literal so it only matches itself inside a glob.
pub fn escape_glob(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if GLOB_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// == Compile ==
/// Compiles a Redis glob into a matcher.
///
/// `*` and `?` cross any character (keys have no path separators), `\`
/// escapes, `[^..]` negates. Braces are literal, as in Redis.
///
/// A `[` that is never closed is an `InvalidPattern` error. Redis instead
/// reads it as a class running to the end of the pattern.
pub fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    let translated = translate(pattern);
    GlobBuilder::new(&translated)
        .literal_separator(false)
        .backslash_escape(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| CacheError::InvalidPattern(format!("{}: {}", pattern, e)))
}

fn translate(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push('\\');
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '[' if !in_class => {
                in_class = true;
                out.push('[');
                if chars.peek() == Some(&'^') {
                    chars.next();
                    out.push('!');
                }
            }
            ']' if in_class => {
                in_class = false;
                out.push(']');
            }
            '{' | '}' if !in_class => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_any_run() {
        let m = compile_glob(":1:*foo-a*").unwrap();
        assert!(m.is_match(":1:foo-aa"));
        assert!(m.is_match(":1:foo-ab"));
        assert!(!m.is_match(":1:foo-bb"));
        assert!(!m.is_match(":2:foo-aa"));
    }

    #[test]
    fn test_star_crosses_slashes_and_colons() {
        let m = compile_glob("app:*").unwrap();
        assert!(m.is_match("app:1:a/b/c"));
    }

    #[test]
    fn test_question_and_class() {
        let m = compile_glob("k?y[0-9]").unwrap();
        assert!(m.is_match("key1"));
        assert!(!m.is_match("keyx"));

        let negated = compile_glob("k[^e]y").unwrap();
        assert!(negated.is_match("kay"));
        assert!(!negated.is_match("key"));
    }

    #[test]
    fn test_braces_are_literal() {
        let m = compile_glob("{a,b}").unwrap();
        assert!(m.is_match("{a,b}"));
        assert!(!m.is_match("a"));
    }

    #[test]
    fn test_unclosed_bracket_is_rejected() {
        assert!(matches!(
            compile_glob(":1:a[b*"),
            Err(CacheError::InvalidPattern(_))
        ));
        assert!(compile_glob(":1:a\\[b*").unwrap().is_match(":1:a[bc"));
    }

    #[test]
    fn test_escaped_prefix_only_matches_itself() {
        let prefix = escape_glob("we*rd[1]");
        assert_eq!(prefix, "we\\*rd\\[1\\]");

        let m = compile_glob(&format!("{}:1:*", prefix)).unwrap();
        assert!(m.is_match("we*rd[1]:1:key"));
        assert!(!m.is_match("weXXrd1:1:key"));
    }
}
