use analyst_core::QueryMode;

/// Classifies an incoming message as a direct-execute fast path (`sql:` or
/// `python:` prefix, case-insensitive) or `None` for the agent path.
/// Returns the mode plus the code with the prefix and leading whitespace
/// stripped.
pub fn classify_fast_path(message: &str) -> Option<(QueryMode, String)> {
    let trimmed = message.trim_start();
    for (prefix, mode) in [("sql:", QueryMode::Sql), ("python:", QueryMode::Python)] {
        if let Some(rest) = strip_prefix_ignore_ascii_case(trimmed, prefix) {
            return Some((mode, rest.trim_start().to_string()));
        }
    }
    None
}

/// Like `str::strip_prefix` but case-insensitive on ASCII. Matches on
/// chars rather than a byte slice so a multi-byte UTF-8 prefix of the
/// input can never be cut mid-character.
fn strip_prefix_ignore_ascii_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = s.char_indices();
    for expected in prefix.chars() {
        match chars.next() {
            Some((_, c)) if c.eq_ignore_ascii_case(&expected) => {}
            _ => return None,
        }
    }
    let end = chars.next().map(|(i, _)| i).unwrap_or(s.len());
    Some(&s[end..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_prefix_is_case_insensitive() {
        let (mode, code) = classify_fast_path("SQL: SELECT 1").unwrap();
        assert_eq!(mode, QueryMode::Sql);
        assert_eq!(code, "SELECT 1");
    }

    #[test]
    fn python_prefix_strips_whitespace() {
        let (mode, code) = classify_fast_path("python:   result = 1").unwrap();
        assert_eq!(mode, QueryMode::Python);
        assert_eq!(code, "result = 1");
    }

    #[test]
    fn plain_question_is_agent_path() {
        assert!(classify_fast_path("how many orders were placed?").is_none());
    }
}
