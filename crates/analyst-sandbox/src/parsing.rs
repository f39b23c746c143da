use crate::types::RunnerResult;

const STDERR_PREVIEW_BYTES: usize = 4096;

/// Parse runner stdout into a [`RunnerResult`], tolerating the several
/// shapes a sandboxed subprocess's output can take before giving up with
/// a `RUNNER_INTERNAL_ERROR`.
///
/// Cascade: strict JSON → a Python-literal-dict-shaped object (single
/// quotes, `True`/`False`/`None`) → the longest `{...}` substring in the
/// blob → line-by-line from the end.
pub fn parse_runner_output(stdout: &str, stderr: &str) -> RunnerResult {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        let mut result = RunnerResult::empty_stdout_error();
        result.stderr_trunc = Some(truncate(stderr, STDERR_PREVIEW_BYTES));
        return result;
    }

    if let Some(result) = try_parse(trimmed) {
        return result;
    }

    if let Some(json_like) = python_literal_to_json(trimmed) {
        if let Some(result) = try_parse(&json_like) {
            return result;
        }
    }

    if let Some(slice) = longest_brace_substring(trimmed) {
        if let Some(result) = try_parse(slice) {
            return result;
        }
    }

    for line in trimmed.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(result) = try_parse(line) {
            return result;
        }
        if let Some(json_like) = python_literal_to_json(line) {
            if let Some(result) = try_parse(&json_like) {
                return result;
            }
        }
    }

    let mut result = RunnerResult::invalid_json_error();
    result.stdout_trunc = Some(truncate(trimmed, STDERR_PREVIEW_BYTES));
    result.stderr_trunc = Some(truncate(stderr, STDERR_PREVIEW_BYTES));
    result
}

fn try_parse(text: &str) -> Option<RunnerResult> {
    serde_json::from_str(text).ok()
}

/// Best-effort conversion of a Python `repr(dict)` into JSON: swaps
/// single-quoted strings for double-quoted ones and the Python literal
/// keywords for their JSON equivalents. Not a full parser — good enough
/// for the flat dict shapes the runner scripts emit.
fn python_literal_to_json(text: &str) -> Option<String> {
    if !text.trim_start().starts_with('{') {
        return None;
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_double = false;
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_double = !in_double;
                out.push(c);
            }
            '\'' if !in_double => out.push('"'),
            _ => out.push(c),
        }
    }
    out = out
        .replace("True", "true")
        .replace("False", "false")
        .replace("None", "null");
    Some(out)
}

fn longest_brace_substring(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

fn truncate(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        s.to_string()
    } else {
        let mut end = max_bytes;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunOutcomeStatus;

    #[test]
    fn parses_strict_json() {
        let r = parse_runner_output(
            r#"{"status":"success","columns":["n"],"rows":[[1]],"row_count":1,"exec_time_ms":5}"#,
            "",
        );
        assert_eq!(r.status, RunOutcomeStatus::Success);
        assert_eq!(r.row_count, 1);
    }

    #[test]
    fn empty_stdout_yields_internal_error() {
        let r = parse_runner_output("   ", "boom");
        assert!(r.error.is_some());
        assert_eq!(r.stderr_trunc.as_deref(), Some("boom"));
    }

    #[test]
    fn falls_back_to_python_literal_dict() {
        let r = parse_runner_output(
            "{'status': 'success', 'columns': ['n'], 'rows': [[1]], 'row_count': 1, 'exec_time_ms': 3}",
            "",
        );
        assert_eq!(r.status, RunOutcomeStatus::Success);
    }

    #[test]
    fn falls_back_to_longest_brace_substring() {
        let r = parse_runner_output(
            "garbage prefix {\"status\":\"success\",\"row_count\":0,\"exec_time_ms\":1} trailing noise",
            "",
        );
        assert_eq!(r.status, RunOutcomeStatus::Success);
    }

    #[test]
    fn falls_back_to_last_json_line() {
        let stdout = "log line one\nlog line two\n{\"status\":\"success\",\"row_count\":2,\"exec_time_ms\":7}";
        let r = parse_runner_output(stdout, "");
        assert_eq!(r.status, RunOutcomeStatus::Success);
        assert_eq!(r.row_count, 2);
    }

    #[test]
    fn unparsable_output_is_internal_error() {
        let r = parse_runner_output("not json at all", "");
        assert!(r.error.is_some());
    }
}
