use analyst_sandbox::RunnerResult;

/// Deterministic natural-language summary of a runner result, used on the
/// fast path (where there is no model turn to phrase a reply). Implemented
/// directly from the system description's branch table: no original
/// prototype ever had this logic (that snapshot answered fast-path queries
/// with a fixed "Executed query." string), so every branch here is a fresh
/// design decision rather than a port.
pub fn summarize_result(result: &RunnerResult) -> String {
    if let Some(err) = &result.error {
        return format!("I couldn't complete that query: {}", err.message);
    }

    if result.row_count == 0 {
        return "No rows matched your request.".to_string();
    }

    if result.columns.len() == 1 && result.rows.len() == 1 {
        let column = &result.columns[0];
        let value = &result.rows[0][0];
        let lower = column.to_lowercase();

        if let Some(rest) = lower.strip_prefix("total_") {
            return format!("There are {value} total {}.", rest.replace('_', " "));
        }
        if matches!(
            lower.as_str(),
            "count" | "n" | "total" | "total_count" | "row_count"
        ) {
            return format!("The result is {value}.");
        }
        return format!("{column}: {value}");
    }

    if result.rows.len() <= 5 && result.columns.len() <= 4 {
        let first_row = result
            .columns
            .iter()
            .zip(result.rows[0].iter())
            .map(|(col, val)| format!("{col}={val}"))
            .collect::<Vec<_>>()
            .join(", ");
        return format!(
            "I ran the query and returned {} row(s). First row: {first_row}.",
            result.rows.len()
        );
    }

    format!(
        "I ran the query and returned {} rows across {} columns; see the Result table.",
        result.row_count,
        result.columns.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_sandbox::{RunOutcomeStatus, RunnerErrorDetail, RunnerErrorType};
    use serde_json::json;

    fn result(columns: Vec<&str>, rows: Vec<Vec<serde_json::Value>>) -> RunnerResult {
        let row_count = rows.len() as u64;
        RunnerResult {
            status: RunOutcomeStatus::Success,
            columns: columns.into_iter().map(String::from).collect(),
            rows,
            row_count,
            exec_time_ms: 5,
            stdout_trunc: None,
            stderr_trunc: None,
            error: None,
        }
    }

    #[test]
    fn error_present_is_apologetic() {
        let mut r = result(vec![], vec![]);
        r.status = RunOutcomeStatus::Error;
        r.error = Some(RunnerErrorDetail {
            error_type: RunnerErrorType::SqlExecutionError,
            message: "no such table: foo".into(),
        });
        assert_eq!(
            summarize_result(&r),
            "I couldn't complete that query: no such table: foo"
        );
    }

    #[test]
    fn zero_rows() {
        let r = result(vec!["order_id"], vec![]);
        assert_eq!(summarize_result(&r), "No rows matched your request.");
    }

    #[test]
    fn single_cell_total_prefix() {
        let r = result(vec!["total_orders"], vec![vec![json!(42)]]);
        assert_eq!(summarize_result(&r), "There are 42 total orders.");
    }

    #[test]
    fn single_cell_count_synonym() {
        let r = result(vec!["row_count"], vec![vec![json!(7)]]);
        assert_eq!(summarize_result(&r), "The result is 7.");
    }

    #[test]
    fn single_cell_generic_column() {
        let r = result(vec!["max_total"], vec![vec![json!(99.5)]]);
        assert_eq!(summarize_result(&r), "max_total: 99.5");
    }

    #[test]
    fn small_result_inlines_first_row() {
        let r = result(
            vec!["order_id", "total"],
            vec![vec![json!(1), json!(9.99)], vec![json!(2), json!(19.99)]],
        );
        assert_eq!(
            summarize_result(&r),
            "I ran the query and returned 2 row(s). First row: order_id=1, total=9.99."
        );
    }

    #[test]
    fn large_result_uses_generic_sentence() {
        let rows: Vec<Vec<serde_json::Value>> = (0..10).map(|i| vec![json!(i)]).collect();
        let r = result(
            vec!["a", "b", "c", "d", "e"],
            rows.into_iter().map(|mut r| {
                while r.len() < 5 {
                    r.push(json!(0));
                }
                r
            }).collect(),
        );
        assert_eq!(
            summarize_result(&r),
            "I ran the query and returned 10 rows across 5 columns; see the Result table."
        );
    }
}
