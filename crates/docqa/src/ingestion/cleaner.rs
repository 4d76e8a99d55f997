//! Whitespace normalization applied before chunking

/// Normalize whitespace in extracted document text.
///
/// Runs of spaces and tabs become a single space and every line is trimmed.
/// Three or more consecutive newlines collapse into one blank line, and the
/// result is trimmed. Paragraph breaks survive so paragraph-based chunking
/// still sees them.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_newlines = 0usize;

    for line in text.split('\n') {
        let line = collapse_spaces(line);
        let line = line.trim();

        if line.is_empty() {
            pending_newlines += 1;
            continue;
        }

        if !out.is_empty() {
            // A run of N line breaks carries N-1 empty lines; keep at most one.
            let breaks = (pending_newlines + 1).min(2);
            for _ in 0..breaks {
                out.push('\n');
            }
        }
        pending_newlines = 0;
        out.push_str(line);
    }

    out.trim().to_string()
}

fn collapse_spaces(line: &str) -> String {
    let mut collapsed = String::with_capacity(line.len());
    let mut in_run = false;

    for ch in line.chars() {
        if ch == ' ' || ch == '\t' || ch == '\r' {
            if !in_run {
                collapsed.push(' ');
                in_run = true;
            }
        } else {
            collapsed.push(ch);
            in_run = false;
        }
    }

    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_spaces_and_tabs() {
        assert_eq!(normalize_text("a  \t b\t\tc"), "a b c");
    }

    #[test]
    fn test_trims_lines_and_text() {
        assert_eq!(normalize_text("  first   \nsecond\t\n\n"), "first\nsecond");
    }

    #[test]
    fn test_keeps_single_blank_line() {
        assert_eq!(normalize_text("one\n\n\n\n\ntwo"), "one\n\ntwo");
        assert_eq!(normalize_text("one\n\ntwo"), "one\n\ntwo");
        assert_eq!(normalize_text("one\n  \t \ntwo"), "one\n\ntwo");
    }

    #[test]
    fn test_windows_line_endings() {
        assert_eq!(normalize_text("a\r\nb\r\n\r\n\r\nc"), "a\nb\n\nc");
    }

    #[test]
    fn test_whitespace_only() {
        assert_eq!(normalize_text(" \n\t\n "), "");
    }
}
