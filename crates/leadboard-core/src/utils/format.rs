/// Format a call duration given in milliseconds, e.g. "1h 2m 5s" or "3m 0s"
pub fn format_duration_ms(milliseconds: u64) -> String {
    let seconds = milliseconds / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes % 60, seconds % 60)
    } else {
        format!("{}m {}s", minutes, seconds % 60)
    }
}

/// First `max_chars` characters of `s`, with "..." appended if anything was cut
pub fn preview(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(0), "0m 0s");
        assert_eq!(format_duration_ms(999), "0m 0s");
        assert_eq!(format_duration_ms(65_000), "1m 5s");
        assert_eq!(format_duration_ms(3_725_000), "1h 2m 5s");
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 50), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("", 3), "");
        // Multi-byte characters are never split
        assert_eq!(preview("ééééé", 2), "éé...");
    }
}
