use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    In,
    Between,
    Contains,
    Startswith,
    Endswith,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregationFunction {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl Default for SortDirection {
    fn default() -> Self {
        SortDirection::Asc
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<FilterValue>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FilterValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectColumn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregation {
    pub func: AggregationFunction,
    pub column: String,
    pub alias: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectItem {
    Aggregation(Aggregation),
    Column(SelectColumn),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBy {
    pub expr: String,
    #[serde(default)]
    pub direction: SortDirection,
}

fn default_limit() -> Option<u32> {
    Some(200)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPlan {
    pub dataset_id: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<SelectItem>>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default = "default_limit")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("Select list cannot be empty if provided")]
    EmptySelect,
    #[error("Operator {0:?} should not have a value")]
    UnexpectedValue(FilterOperatorDebug),
    #[error("Operator {0:?} requires a value")]
    MissingValue(FilterOperatorDebug),
    #[error("Operator 'in' requires a list value")]
    InRequiresList,
    #[error("Operator 'between' requires a list of exactly 2 values")]
    BetweenRequiresPair,
    #[error("When mixing aggregations with regular columns, group_by is required")]
    MixedRequiresGroupBy,
    #[error("Column '{0}' must be in group_by when using aggregations")]
    ColumnNotInGroupBy(String),
    #[error("limit must be between 1 and 1000")]
    LimitOutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterOperatorDebug(pub FilterOperator);

impl std::fmt::Debug for FilterOperatorDebug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl QueryPlan {
    /// Port of the pydantic validators on `QueryPlan`/`Filter`: value
    /// presence per operator, limit bounds, and the aggregation/group_by
    /// mixing rule.
    pub fn validate(&self) -> Result<(), PlanError> {
        if let Some(limit) = self.limit {
            if !(1..=1000).contains(&limit) {
                return Err(PlanError::LimitOutOfRange);
            }
        }

        for f in &self.filters {
            validate_filter(f)?;
        }

        let Some(select) = &self.select else {
            return Ok(());
        };
        if select.is_empty() {
            return Err(PlanError::EmptySelect);
        }

        let has_agg = select.iter().any(|s| matches!(s, SelectItem::Aggregation(_)));
        let has_simple = select.iter().any(|s| matches!(s, SelectItem::Column(_)));

        if has_agg && has_simple {
            let simple_columns: Vec<&str> = select
                .iter()
                .filter_map(|s| match s {
                    SelectItem::Column(c) => c.column.as_deref(),
                    _ => None,
                })
                .collect();
            if self.group_by.is_empty() {
                return Err(PlanError::MixedRequiresGroupBy);
            }
            for col in simple_columns {
                if !self.group_by.iter().any(|g| g == col) {
                    return Err(PlanError::ColumnNotInGroupBy(col.to_string()));
                }
            }
        }

        Ok(())
    }
}

fn validate_filter(f: &Filter) -> Result<(), PlanError> {
    match f.op {
        FilterOperator::IsNull | FilterOperator::IsNotNull => {
            if f.value.is_some() {
                return Err(PlanError::UnexpectedValue(FilterOperatorDebug(f.op)));
            }
        }
        _ => {
            let Some(value) = &f.value else {
                return Err(PlanError::MissingValue(FilterOperatorDebug(f.op)));
            };
            if f.op == FilterOperator::In && !matches!(value, FilterValue::List(_)) {
                return Err(PlanError::InRequiresList);
            }
            if f.op == FilterOperator::Between {
                match value {
                    FilterValue::List(v) if v.len() == 2 => {}
                    _ => return Err(PlanError::BetweenRequiresPair),
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_plan() -> QueryPlan {
        QueryPlan {
            dataset_id: "ecommerce".into(),
            table: "orders".into(),
            select: None,
            filters: vec![],
            group_by: vec![],
            order_by: vec![],
            limit: Some(200),
            notes: None,
        }
    }

    #[test]
    fn default_plan_validates() {
        assert!(base_plan().validate().is_ok());
    }

    #[test]
    fn limit_out_of_range_rejected() {
        let mut p = base_plan();
        p.limit = Some(1001);
        assert_eq!(p.validate(), Err(PlanError::LimitOutOfRange));
    }

    #[test]
    fn is_null_with_value_rejected() {
        let mut p = base_plan();
        p.filters.push(Filter {
            column: "resolved_at".into(),
            op: FilterOperator::IsNull,
            value: Some(FilterValue::Bool(true)),
        });
        assert!(p.validate().is_err());
    }

    #[test]
    fn eq_without_value_rejected() {
        let mut p = base_plan();
        p.filters.push(Filter {
            column: "status".into(),
            op: FilterOperator::Eq,
            value: None,
        });
        assert!(p.validate().is_err());
    }

    #[test]
    fn in_requires_list() {
        let mut p = base_plan();
        p.filters.push(Filter {
            column: "status".into(),
            op: FilterOperator::In,
            value: Some(FilterValue::Str("completed".into())),
        });
        assert_eq!(p.validate(), Err(PlanError::InRequiresList));
    }

    #[test]
    fn between_requires_pair() {
        let mut p = base_plan();
        p.filters.push(Filter {
            column: "total".into(),
            op: FilterOperator::Between,
            value: Some(FilterValue::List(vec![FilterValue::Int(1)])),
        });
        assert_eq!(p.validate(), Err(PlanError::BetweenRequiresPair));
    }

    #[test]
    fn mixed_select_without_group_by_rejected() {
        let mut p = base_plan();
        p.select = Some(vec![
            SelectItem::Column(SelectColumn {
                column: Some("category".into()),
                expr: None,
                alias: None,
            }),
            SelectItem::Aggregation(Aggregation {
                func: AggregationFunction::Sum,
                column: "total".into(),
                alias: "total_revenue".into(),
            }),
        ]);
        assert_eq!(p.validate(), Err(PlanError::MixedRequiresGroupBy));
    }

    #[test]
    fn mixed_select_with_group_by_ok() {
        let mut p = base_plan();
        p.select = Some(vec![
            SelectItem::Column(SelectColumn {
                column: Some("category".into()),
                expr: None,
                alias: None,
            }),
            SelectItem::Aggregation(Aggregation {
                func: AggregationFunction::Sum,
                column: "total".into(),
                alias: "total_revenue".into(),
            }),
        ]);
        p.group_by = vec!["category".into()];
        assert!(p.validate().is_ok());
    }

    #[test]
    fn empty_select_list_rejected() {
        let mut p = base_plan();
        p.select = Some(vec![]);
        assert_eq!(p.validate(), Err(PlanError::EmptySelect));
    }

    #[test]
    fn deserialize_filter_operator_symbols() {
        let f: Filter = serde_json::from_str(r#"{"column":"total","op":">","value":100}"#).unwrap();
        assert_eq!(f.op, FilterOperator::Gt);
    }

    #[test]
    fn deserialize_select_item_untagged() {
        let items: Vec<SelectItem> = serde_json::from_str(
            r#"[{"column":"order_id"},{"func":"sum","column":"total","alias":"total_revenue"}]"#,
        )
        .unwrap();
        assert!(matches!(items[0], SelectItem::Column(_)));
        assert!(matches!(items[1], SelectItem::Aggregation(_)));
    }
}
