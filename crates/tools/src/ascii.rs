//! ASCII case-insensitive byte search helpers.

use memchr::{memchr, memchr2};

/// `true` when `needle` occurs at `start` in `haystack`, ignoring ASCII case.
pub fn starts_with_ignore_ascii_case_at(haystack: &[u8], start: usize, needle: &[u8]) -> bool {
    haystack.len() >= start + needle.len()
        && haystack[start..start + needle.len()].eq_ignore_ascii_case(needle)
}

/// Find the first occurrence of `needle` in `haystack`, ignoring ASCII case.
///
/// Candidate positions are located with `memchr` on the first needle byte, so
/// the scan stays linear for typical input.
pub fn find_ignore_ascii_case(haystack: &str, needle: &[u8]) -> Option<usize> {
    let hay = haystack.as_bytes();
    let n = needle.len();
    if n == 0 {
        return Some(0);
    }
    let hay_len = hay.len();
    if hay_len < n {
        return None;
    }
    let first = needle[0];
    let (a, b) = if first.is_ascii_alphabetic() {
        (first.to_ascii_lowercase(), first.to_ascii_uppercase())
    } else {
        (first, first)
    };
    let mut i = 0;
    while i + n <= hay_len {
        let rel = if a == b {
            memchr(a, &hay[i..])
        } else {
            memchr2(a, b, &hay[i..])
        }?;
        let pos = i + rel;
        if pos + n <= hay_len && hay[pos..pos + n].eq_ignore_ascii_case(needle) {
            return Some(pos);
        }
        i = pos + 1;
    }
    None
}

pub fn contains_ignore_ascii_case(haystack: &str, needle: &[u8]) -> bool {
    find_ignore_ascii_case(haystack, needle).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_mixed_case_needles() {
        assert_eq!(find_ignore_ascii_case("foo <ScRiPt>", b"<script"), Some(4));
        assert!(contains_ignore_ascii_case("a </SCRIPT", b"</script"));
        assert!(!contains_ignore_ascii_case("a </scrip", b"</script"));
    }

    #[test]
    fn non_alphabetic_first_byte_uses_single_needle_scan() {
        assert_eq!(find_ignore_ascii_case("x-->", b"-->"), Some(1));
        assert_eq!(find_ignore_ascii_case("--", b"-->"), None);
    }

    #[test]
    fn empty_needle_matches_at_start() {
        assert_eq!(find_ignore_ascii_case("abc", b""), Some(0));
    }

    #[test]
    fn starts_with_respects_bounds() {
        assert!(starts_with_ignore_ascii_case_at(b"<!DOCTYPE", 0, b"<!doctype"));
        assert!(!starts_with_ignore_ascii_case_at(b"<!DOC", 0, b"<!doctype"));
    }

    #[test]
    fn handles_utf8_around_matches() {
        assert_eq!(find_ignore_ascii_case("café<SCRIPT", b"<script"), Some(5));
    }
}
