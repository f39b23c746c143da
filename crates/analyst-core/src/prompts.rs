use analyst_datasets::DatasetSchemaProjection;

use crate::types::RunCapsule;

const MAX_COLUMNS_PREVIEWED: usize = 30;

/// Fixed role/mandate fragment, identical for every turn. States the
/// agent's role, mandates an execution tool for value-bearing questions,
/// forbids DDL/DML, caps result rows, and prescribes the one-retry recovery
/// path on missing-table/column errors.
pub fn role_and_mandate_fragment() -> String {
    "You are a data analysis assistant. You answer questions about a single \
     dataset by calling the execution tools available to you — you do not \
     guess at numbers, row counts, or column values from memory.\n\
     \n\
     Rules:\n\
     - Any question whose answer depends on the data's actual contents must \
       be answered by calling execute_sql, execute_query_plan, or \
       execute_python — never by inventing a plausible-sounding number.\n\
     - Only read-only queries are permitted. Never attempt to create, alter, \
       drop, insert, update, or delete anything; such statements will be \
       rejected before they run.\n\
     - Query results are capped in row count; do not ask for more rows than \
       the cap allows.\n\
     - If a query fails because a table or column does not exist, call \
       get_dataset_schema once to check the real schema, then retry the \
       query corrected accordingly. Do not retry the same failing query \
       more than once.\n\
     - Once you have the information needed to answer, reply in plain text \
       without further tool calls."
        .to_string()
}

/// Lists the current dataset's tables and columns, previewing up to
/// `MAX_COLUMNS_PREVIEWED` columns per table.
pub fn dataset_schema_fragment(schema: &DatasetSchemaProjection) -> String {
    let mut out = format!("Dataset `{}` ({}):\n", schema.id, schema.name);
    for file in &schema.files {
        let table = file
            .path
            .rsplit('/')
            .next()
            .unwrap_or(&file.path)
            .trim_end_matches(".csv");
        out.push_str(&format!("- table `{table}`:\n"));
        let mut columns: Vec<_> = file.schema.iter().collect();
        columns.sort_by(|a, b| a.0.cmp(b.0));
        let truncated = columns.len() > MAX_COLUMNS_PREVIEWED;
        for (name, col) in columns.into_iter().take(MAX_COLUMNS_PREVIEWED) {
            out.push_str(&format!("    - {name}: {}", col.column_type));
            if let Some(desc) = &col.description {
                out.push_str(&format!(" — {desc}"));
            }
            out.push('\n');
        }
        if truncated {
            out.push_str("    - ... (additional columns omitted)\n");
        }
    }
    out
}

/// Summarizes the most recent successful in-thread run, for use as an
/// optional context fragment when the current message is a follow-up.
pub fn prior_run_fragment(capsule: &RunCapsule) -> String {
    let mut out = format!(
        "Context from the most recent successful query in this thread \
         (mode: {:?}, {} row(s)):\n",
        capsule.query_mode, capsule.result_json.row_count
    );
    if !capsule.result_json.columns.is_empty() {
        out.push_str(&format!(
            "- columns: {}\n",
            capsule.result_json.columns.join(", ")
        ));
    }
    if let Some(sql) = &capsule.compiled_sql {
        out.push_str(&format!("- SQL: {}\n", truncate(sql, 300)));
    }
    if let Some(code) = &capsule.python_code {
        out.push_str(&format!("- Python: {}\n", truncate(code, 300)));
    }
    out
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut truncated: String = s.chars().take(max_chars).collect();
        truncated.push_str("...");
        truncated
    }
}
