pub fn truncate_utf8_prefix(value: &str, max_bytes: usize) -> String {
    if max_bytes == 0 {
        return String::new();
    }
    if value.len() <= max_bytes {
        return value.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Shortens upstream bodies before they are echoed into logs or error text.
pub fn preview(value: &str, max_bytes: usize) -> String {
    if value.len() <= max_bytes {
        return value.to_string();
    }
    format!(
        "{}... ({} bytes total)",
        truncate_utf8_prefix(value, max_bytes),
        value.len()
    )
}

/// Trimmed value, or `None` when nothing is left.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_does_not_split_utf8() {
        assert_eq!(truncate_utf8_prefix("aéb", 2), "a");
        assert_eq!(truncate_utf8_prefix("aéb", 3), "aé");
    }

    #[test]
    fn preview_reports_total_size() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("0123456789", 4), "0123... (10 bytes total)");
    }

    #[test]
    fn non_blank_trims() {
        assert_eq!(non_blank(Some("  Play ")), Some("Play"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
