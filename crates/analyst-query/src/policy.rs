use regex::Regex;
use std::sync::OnceLock;

const SQL_BLOCKLIST: &[&str] = &[
    "drop", "delete", "insert", "update", "create", "alter", "attach", "install", "load",
    "pragma", "call", "copy", "export",
];

struct CompiledBlocklist {
    patterns: Vec<(&'static str, Regex)>,
}

fn blocklist() -> &'static CompiledBlocklist {
    static CELL: OnceLock<CompiledBlocklist> = OnceLock::new();
    CELL.get_or_init(|| {
        let patterns = SQL_BLOCKLIST
            .iter()
            .map(|tok| {
                let re = Regex::new(&format!(r"(?:^|[^a-z0-9_]){}(?:[^a-z0-9_]|$)", tok)).unwrap();
                (*tok, re)
            })
            .collect();
        CompiledBlocklist { patterns }
    })
}

fn contains_blocked_sql_token(sql_lower: &str, token: &str, re: &Regex) -> bool {
    let _ = token;
    re.is_match(sql_lower)
}

/// Strips a leading `"<dataset_id>".` or `<dataset_id>.` prefix (case
/// insensitive) from the SQL text, wherever it appears — a textual
/// substitution over the whole query, not just table references in a
/// parsed AST, so normalization stays idempotent.
pub fn normalize_sql_for_dataset(sql: &str, dataset_id: &str) -> String {
    let quoted = Regex::new(&format!(
        r#"(?i)"{}"\s*\.\s*"#,
        regex::escape(dataset_id)
    ))
    .unwrap();
    let normalized = quoted.replace_all(sql, "");

    let bare = Regex::new(&format!(
        r"(?i)(?:^|[^a-z0-9_]){}\s*\.\s*",
        regex::escape(dataset_id)
    ))
    .unwrap();
    bare.replace_all(&normalized, "").into_owned()
}

/// Validate that `sql` is a single read-only SELECT/WITH statement with no
/// blacklisted tokens. Returns `Ok(())` when allowed, `Err(reason)`
/// otherwise — a concrete rejection reason, never an exception.
pub fn validate_sql_policy(sql: &str) -> Result<(), String> {
    let sql_clean = sql.trim();
    let lowered = sql_clean.to_lowercase();

    if !(lowered.starts_with("select") || lowered.starts_with("with")) {
        return Err("Only SELECT/WITH queries are allowed.".into());
    }

    if sql_clean.trim_end_matches(';').contains(';') {
        return Err("Multiple SQL statements are not allowed.".into());
    }

    for (token, re) in &blocklist().patterns {
        if contains_blocked_sql_token(&lowered, token, re) {
            return Err(format!("SQL contains blocked token: {token}"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_select() {
        assert!(validate_sql_policy("SELECT * FROM orders").is_ok());
    }

    #[test]
    fn accepts_with_cte() {
        assert!(validate_sql_policy("WITH t AS (SELECT 1) SELECT * FROM t").is_ok());
    }

    #[test]
    fn rejects_non_select() {
        assert!(validate_sql_policy("UPDATE orders SET total = 1").is_err());
    }

    #[test]
    fn rejects_multiple_statements() {
        assert!(validate_sql_policy("SELECT 1; SELECT 2").is_err());
    }

    #[test]
    fn allows_trailing_semicolon() {
        assert!(validate_sql_policy("SELECT 1;").is_ok());
    }

    #[test]
    fn rejects_blocklisted_token() {
        let err = validate_sql_policy("SELECT * FROM orders; DROP TABLE orders").unwrap_err();
        assert!(err.contains("blocked token"));
    }

    #[test]
    fn does_not_false_positive_on_substring() {
        // "create" must not match inside "created_at" — word-boundary only.
        assert!(validate_sql_policy("SELECT created_at FROM orders").is_ok());
    }

    #[test]
    fn does_not_false_positive_on_call_substring() {
        assert!(validate_sql_policy("SELECT called_count FROM orders").is_ok());
    }

    #[test]
    fn case_insensitive_blocklist() {
        assert!(validate_sql_policy("SELECT * FROM x WHERE 1=1; DROP TABLE x").is_err());
        let err = validate_sql_policy("select * from x JOIN DROP_STAGE y on 1=1").unwrap();
        let _ = err;
    }

    #[test]
    fn normalize_strips_quoted_dataset_prefix() {
        let out = normalize_sql_for_dataset(r#"SELECT * FROM "ecommerce".orders"#, "ecommerce");
        assert_eq!(out, "SELECT * FROM orders");
    }

    #[test]
    fn normalize_strips_bare_dataset_prefix() {
        let out = normalize_sql_for_dataset("SELECT * FROM ecommerce.orders", "ecommerce");
        assert_eq!(out, "SELECT * FROM orders");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_sql_for_dataset("SELECT * FROM ecommerce.orders", "ecommerce");
        let twice = normalize_sql_for_dataset(&once, "ecommerce");
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_is_case_insensitive() {
        let out = normalize_sql_for_dataset("SELECT * FROM ECOMMERCE.orders", "ecommerce");
        assert_eq!(out, "SELECT * FROM orders");
    }
}
