//! Formatting helpers for CLI output.

/// `yes`, `no` or `unknown` for an indeterminate flag.
pub fn format_flag(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "yes",
        Some(false) => "no",
        None => "unknown",
    }
}

/// Truncate to `max_len` characters, ending in `...` when shortened.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return ".".repeat(max_len);
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{}...", kept)
}

/// Comma-separated list, or `-` when empty.
pub fn format_list(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_flag() {
        assert_eq!(format_flag(Some(true)), "yes");
        assert_eq!(format_flag(Some(false)), "no");
        assert_eq!(format_flag(None), "unknown");
    }

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
        assert_eq!(truncate_str("héllo wörld", 8), "héllo...");
        assert_eq!(truncate_str("hello", 2), "..");
    }

    #[test]
    fn test_format_list() {
        assert_eq!(format_list(&[]), "-");
        assert_eq!(format_list(&["a".to_string(), "b".to_string()]), "a, b");
    }
}
