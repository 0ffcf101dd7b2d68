// Clean raw report text before it is embedded in a prompt.
// Lab reports usually come out of PDF/OCR extraction and carry
// zero-width characters, stray control bytes and long runs of blank lines.

/// Maximum report length sent to the model (characters).
pub const MAX_REPORT_CHARS: usize = 24_000;

/// Strip invisible characters, tidy whitespace and truncate.
pub fn sanitize_report_text(raw: &str) -> String {
    let unified = normalize_line_endings(raw);
    let visible = remove_invisible_chars(&unified);
    let tidy = collapse_blank_lines(&visible);
    truncate_chars(&tidy, MAX_REPORT_CHARS)
}

/// Count characters that carry content. Used for the minimum-length check.
pub fn meaningful_len(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// CRLF and lone CR (common in PDF/OCR output) both become LF.
fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            if matches!(*c, ' ' | '\n' | '\t') {
                return true;
            }
            if matches!(
                *c,
                '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
            ) {
                return false;
            }
            !c.is_control()
        })
        .collect()
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    out.trim().to_string()
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => {
            tracing::debug!(max_chars = max, "Report text truncated before prompting");
            text[..cut].to_string()
        }
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_zero_width_and_bom() {
        let raw = "\u{FEFF}Hemo\u{200B}globin: 13.1";
        assert_eq!(sanitize_report_text(raw), "Hemoglobin: 13.1");
    }

    #[test]
    fn normalizes_crlf_and_control_chars() {
        let raw = "Glucose: 92\r\nTSH: 2.1\u{0007}";
        assert_eq!(sanitize_report_text(raw), "Glucose: 92\nTSH: 2.1");
    }

    #[test]
    fn lone_carriage_returns_become_line_breaks() {
        let raw = "Glucose: 92\rHemoglobin: 9.5 g/dL\r\rTSH: 2.1";
        assert_eq!(
            sanitize_report_text(raw),
            "Glucose: 92\nHemoglobin: 9.5 g/dL\n\nTSH: 2.1"
        );
    }

    #[test]
    fn collapses_blank_line_runs() {
        let raw = "Panel A\n\n\n\n\nPanel B   \n";
        assert_eq!(sanitize_report_text(raw), "Panel A\n\nPanel B");
    }

    #[test]
    fn keeps_tabs_inside_tables() {
        let raw = "Test\tValue\tRange";
        assert_eq!(sanitize_report_text(raw), "Test\tValue\tRange");
    }

    #[test]
    fn truncates_on_char_boundary() {
        let raw = "é".repeat(MAX_REPORT_CHARS + 10);
        let out = sanitize_report_text(&raw);
        assert_eq!(out.chars().count(), MAX_REPORT_CHARS);
    }

    #[test]
    fn meaningful_len_ignores_whitespace() {
        assert_eq!(meaningful_len("  a b\n\tc  "), 3);
        assert_eq!(meaningful_len("   \n  "), 0);
    }
}
