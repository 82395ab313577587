//! Path segment sanitizing.
//!
//! The mapping is lossy: distinct raw values may collapse onto the same
//! segment (`a/b` and `a:b` both become `a_b`).

const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Turns a raw field value into a single safe path segment.
///
/// Returns `None` when nothing usable remains.
pub fn sanitize_segment(raw: &str, max_bytes: usize) -> Option<String> {
    let replaced: String = raw
        .chars()
        .map(|c| {
            if RESERVED.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim().trim_end_matches(['.', ' ']);
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return None;
    }

    let bounded = truncate_to_boundary(trimmed, max_bytes).trim_end_matches(['.', ' ']);
    if bounded.is_empty() {
        None
    } else {
        Some(bounded.to_string())
    }
}

fn truncate_to_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separators_and_reserved_chars_replaced() {
        assert_eq!(
            sanitize_segment("T1/T2 AX: post*", 255).as_deref(),
            Some("T1_T2 AX_ post_")
        );
        assert_eq!(sanitize_segment("a\\b", 255).as_deref(), Some("a_b"));
        assert_eq!(sanitize_segment("tab\there", 255).as_deref(), Some("tab_here"));
    }

    #[test]
    fn test_dot_segments_are_unusable() {
        assert_eq!(sanitize_segment("..", 255), None);
        assert_eq!(sanitize_segment(" . ", 255), None);
        assert_eq!(sanitize_segment("   ", 255), None);
        assert_eq!(sanitize_segment("series.", 255).as_deref(), Some("series"));
    }

    #[test]
    fn test_length_bound_respects_char_boundaries() {
        let raw = "é".repeat(20); // 40 bytes
        let out = sanitize_segment(&raw, 17).unwrap();
        assert_eq!(out.len(), 16);
        assert_eq!(out, "é".repeat(8));
    }

    #[test]
    fn test_lossy_collisions_are_allowed() {
        assert_eq!(sanitize_segment("a/b", 255), sanitize_segment("a:b", 255));
    }
}
