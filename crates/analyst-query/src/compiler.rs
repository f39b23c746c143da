use crate::plan::{
    Aggregation, AggregationFunction, Filter, FilterOperator, FilterValue, OrderBy, QueryPlan,
    SelectItem,
};

const MAX_COLUMNS_WITHOUT_AGGREGATION: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum CompilationError {
    #[error("invalid identifier: {0}. Only alphanumeric and underscore allowed.")]
    InvalidIdentifier(String),
    #[error("no columns in SELECT clause")]
    EmptySelect,
    #[error("unsupported value type in filter")]
    UnsupportedValue,
}

/// Compiles a validated [`QueryPlan`] to deterministic DuckDB SQL.
#[derive(Debug, Default)]
pub struct QueryPlanCompiler;

impl QueryPlanCompiler {
    pub fn new() -> Self {
        Self
    }

    pub fn compile(&self, plan: &QueryPlan) -> Result<String, CompilationError> {
        let select_clause = self.build_select(plan)?;
        let from_clause = self.build_from(plan)?;
        let where_clause = self.build_where(plan)?;
        let group_by_clause = self.build_group_by(plan)?;
        let order_by_clause = self.build_order_by(plan)?;
        let limit_clause = self.build_limit(plan);

        let mut parts = vec![select_clause, from_clause];
        if !where_clause.is_empty() {
            parts.push(where_clause);
        }
        if !group_by_clause.is_empty() {
            parts.push(group_by_clause);
        }
        if !order_by_clause.is_empty() {
            parts.push(order_by_clause);
        }
        parts.push(limit_clause);

        Ok(parts.join("\n"))
    }

    fn build_select(&self, plan: &QueryPlan) -> Result<String, CompilationError> {
        let Some(select) = &plan.select else {
            return Ok("SELECT *".to_string());
        };

        let mut columns = Vec::with_capacity(select.len());
        for item in select {
            match item {
                SelectItem::Column(c) => {
                    if let Some(col) = &c.column {
                        let mut rendered = escape_identifier(col)?;
                        if let Some(alias) = &c.alias {
                            rendered.push_str(" AS ");
                            rendered.push_str(&escape_identifier(alias)?);
                        }
                        columns.push(rendered);
                    } else if let Some(expr) = &c.expr {
                        let mut rendered = expr.clone();
                        if let Some(alias) = &c.alias {
                            rendered.push_str(" AS ");
                            rendered.push_str(&escape_identifier(alias)?);
                        }
                        columns.push(rendered);
                    }
                }
                SelectItem::Aggregation(agg) => columns.push(build_aggregation(agg)?),
            }
        }

        if columns.is_empty() {
            return Err(CompilationError::EmptySelect);
        }

        Ok(format!("SELECT\n  {}", columns.join(",\n  ")))
    }

    fn build_from(&self, plan: &QueryPlan) -> Result<String, CompilationError> {
        Ok(format!("FROM {}", escape_identifier(&plan.table)?))
    }

    fn build_where(&self, plan: &QueryPlan) -> Result<String, CompilationError> {
        if plan.filters.is_empty() {
            return Ok(String::new());
        }
        let mut conditions = Vec::with_capacity(plan.filters.len());
        for f in &plan.filters {
            conditions.push(build_filter(f)?);
        }
        Ok(format!("WHERE\n  {}", conditions.join("\n  AND ")))
    }

    fn build_group_by(&self, plan: &QueryPlan) -> Result<String, CompilationError> {
        if plan.group_by.is_empty() {
            return Ok(String::new());
        }
        let columns = plan
            .group_by
            .iter()
            .map(|c| escape_identifier(c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("GROUP BY {}", columns.join(", ")))
    }

    fn build_order_by(&self, plan: &QueryPlan) -> Result<String, CompilationError> {
        if plan.order_by.is_empty() {
            return Ok(String::new());
        }
        let mut items = Vec::with_capacity(plan.order_by.len());
        for order in &plan.order_by {
            items.push(build_order_item(order)?);
        }
        Ok(format!("ORDER BY {}", items.join(", ")))
    }

    fn build_limit(&self, plan: &QueryPlan) -> String {
        format!("LIMIT {}", plan.limit.unwrap_or(200))
    }

    /// Flags plans that look like bulk data exfiltration rather than an
    /// analytical question: many raw columns, no filters, or an
    /// unfiltered high limit. Aggregated queries are always considered
    /// safe since they summarize rather than dump rows.
    pub fn looks_suspicious(&self, plan: &QueryPlan) -> bool {
        let has_agg = plan
            .select
            .as_ref()
            .map(|s| s.iter().any(|i| matches!(i, SelectItem::Aggregation(_))))
            .unwrap_or(false);
        if has_agg {
            return false;
        }

        if let Some(select) = &plan.select {
            if select.len() > MAX_COLUMNS_WITHOUT_AGGREGATION && plan.filters.is_empty() {
                return true;
            }
        }

        if plan.limit.unwrap_or(200) > 200 && plan.filters.is_empty() {
            return true;
        }

        false
    }
}

fn build_order_item(order: &OrderBy) -> Result<String, CompilationError> {
    let expr = escape_identifier(&order.expr)?;
    let direction = match order.direction {
        crate::plan::SortDirection::Asc => "ASC",
        crate::plan::SortDirection::Desc => "DESC",
    };
    Ok(format!("{expr} {direction}"))
}

fn build_aggregation(agg: &Aggregation) -> Result<String, CompilationError> {
    let column = escape_identifier(&agg.column)?;
    let alias = escape_identifier(&agg.alias)?;
    let func = match agg.func {
        AggregationFunction::Count => "COUNT",
        AggregationFunction::CountDistinct => "COUNT",
        AggregationFunction::Sum => "SUM",
        AggregationFunction::Avg => "AVG",
        AggregationFunction::Min => "MIN",
        AggregationFunction::Max => "MAX",
    };
    if matches!(agg.func, AggregationFunction::CountDistinct) {
        Ok(format!("COUNT(DISTINCT {column}) AS {alias}"))
    } else {
        Ok(format!("{func}({column}) AS {alias}"))
    }
}

fn build_filter(f: &Filter) -> Result<String, CompilationError> {
    let column = escape_identifier(&f.column)?;

    Ok(match f.op {
        FilterOperator::IsNull => format!("{column} IS NULL"),
        FilterOperator::IsNotNull => format!("{column} IS NOT NULL"),
        FilterOperator::Eq => format!("{column} = {}", format_value(value_of(f)?)?),
        FilterOperator::Ne => format!("{column} != {}", format_value(value_of(f)?)?),
        FilterOperator::Lt => format!("{column} < {}", format_value(value_of(f)?)?),
        FilterOperator::Lte => format!("{column} <= {}", format_value(value_of(f)?)?),
        FilterOperator::Gt => format!("{column} > {}", format_value(value_of(f)?)?),
        FilterOperator::Gte => format!("{column} >= {}", format_value(value_of(f)?)?),
        FilterOperator::In => {
            let FilterValue::List(items) = value_of(f)? else {
                return Err(CompilationError::UnsupportedValue);
            };
            let rendered = items
                .iter()
                .map(format_value)
                .collect::<Result<Vec<_>, _>>()?
                .join(", ");
            format!("{column} IN ({rendered})")
        }
        FilterOperator::Between => {
            let FilterValue::List(items) = value_of(f)? else {
                return Err(CompilationError::UnsupportedValue);
            };
            format!(
                "{column} BETWEEN {} AND {}",
                format_value(&items[0])?,
                format_value(&items[1])?
            )
        }
        FilterOperator::Contains => {
            let pattern = escape_like_pattern(&value_as_string(value_of(f)?));
            format!("{column} LIKE '%{pattern}%'")
        }
        FilterOperator::Startswith => {
            let pattern = escape_like_pattern(&value_as_string(value_of(f)?));
            format!("{column} LIKE '{pattern}%'")
        }
        FilterOperator::Endswith => {
            let pattern = escape_like_pattern(&value_as_string(value_of(f)?));
            format!("{column} LIKE '%{pattern}'")
        }
    })
}

fn value_of(f: &Filter) -> Result<&FilterValue, CompilationError> {
    f.value.as_ref().ok_or(CompilationError::UnsupportedValue)
}

fn value_as_string(v: &FilterValue) -> String {
    match v {
        FilterValue::Str(s) => s.clone(),
        FilterValue::Int(i) => i.to_string(),
        FilterValue::Float(f) => f.to_string(),
        FilterValue::Bool(b) => b.to_string(),
        FilterValue::List(_) => String::new(),
    }
}

fn format_value(value: &FilterValue) -> Result<String, CompilationError> {
    Ok(match value {
        FilterValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        FilterValue::Int(i) => i.to_string(),
        FilterValue::Float(f) => f.to_string(),
        FilterValue::Str(s) => format!("'{}'", s.replace('\'', "''")),
        FilterValue::List(_) => return Err(CompilationError::UnsupportedValue),
    })
}

/// Double-quote an identifier after stripping any existing quotes and
/// validating it against `^[A-Za-z_][A-Za-z0-9_]*$`.
fn escape_identifier(identifier: &str) -> Result<String, CompilationError> {
    let stripped = identifier.trim_matches('"');
    if !is_valid_identifier(stripped) {
        return Err(CompilationError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(format!("\"{stripped}\""))
}

fn is_valid_identifier(s: &str) -> bool {
    let bytes = s.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
        _ => return false,
    }
    bytes[1..]
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'_')
}

fn escape_like_pattern(pattern: &str) -> String {
    pattern
        .replace('%', "\\%")
        .replace('_', "\\_")
        .replace('\'', "''")
}
