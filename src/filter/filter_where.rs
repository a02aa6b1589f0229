use std::cmp::Ordering;

use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOp, FilterWhereInfo, FilterWhereOptions, WhereNode};

/// Column holding the archive flag; rows with it set are hidden by default
pub const ARCHIVE_COLUMN: &str = "isDeleted";

pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
        }
    }

    // ───────────────────────────── parsing ─────────────────────────────

    pub fn parse(where_data: &Value) -> Result<WhereNode, FilterError> {
        Self::parse_with_max_depth(where_data, crate::config::CONFIG.filter.max_nested_depth)
    }

    pub fn parse_with_max_depth(where_data: &Value, max_depth: u32) -> Result<WhereNode, FilterError> {
        Self::parse_at_depth(where_data, 0, max_depth)
    }

    fn parse_at_depth(where_data: &Value, depth: u32, max_depth: u32) -> Result<WhereNode, FilterError> {
        match where_data {
            Value::Null => Ok(WhereNode::always()),
            Value::Object(obj) => {
                let mut nodes = Vec::with_capacity(obj.len());
                for (key, value) in obj {
                    if key.starts_with('$') {
                        nodes.push(Self::parse_logical_operator(key, value, depth, max_depth)?);
                    } else {
                        nodes.extend(Self::parse_field_condition(key, value)?);
                    }
                }
                Ok(WhereNode::And(nodes))
            }
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn parse_logical_operator(op: &str, value: &Value, depth: u32, max_depth: u32) -> Result<WhereNode, FilterError> {
        let depth = depth + 1;
        if depth > max_depth {
            return Err(FilterError::NestingTooDeep { depth, max_depth });
        }

        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                let children = arr
                    .iter()
                    .map(|v| Self::parse_at_depth(v, depth, max_depth))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if op == "$and" { WhereNode::And(children) } else { WhereNode::Or(children) })
            }
            "$not" => Ok(WhereNode::Not(Box::new(Self::parse_at_depth(value, depth, max_depth)?))),
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(field: &str, value: &Value) -> Result<Vec<WhereNode>, FilterError> {
        if !is_valid_identifier(field) {
            return Err(FilterError::InvalidColumn(format!("Invalid column name format: {}", field)));
        }

        match value {
            Value::Object(obj) if obj.keys().any(|k| k.starts_with('$')) => obj
                .iter()
                .map(|(op_key, op_val)| {
                    let operator = FilterOp::parse(op_key)?;
                    Self::check_operator_data(operator, op_val)?;
                    Ok(WhereNode::Condition(FilterWhereInfo {
                        column: field.to_string(),
                        operator,
                        data: op_val.clone(),
                    }))
                })
                .collect(),
            // Implicit equality: { field: value }
            _ => Ok(vec![WhereNode::Condition(FilterWhereInfo {
                column: field.to_string(),
                operator: FilterOp::Eq,
                data: value.clone(),
            })]),
        }
    }

    fn check_operator_data(operator: FilterOp, data: &Value) -> Result<(), FilterError> {
        match operator {
            FilterOp::Size if data.as_u64().is_none() => Err(FilterError::InvalidOperatorData(
                "$size requires a non-negative integer".to_string(),
            )),
            FilterOp::Exists if !data.is_boolean() => Err(FilterError::InvalidOperatorData(
                "$exists requires a boolean".to_string(),
            )),
            _ => Ok(()),
        }
    }

    // ───────────────────────────── SQL ─────────────────────────────

    pub fn generate(
        node: &WhereNode,
        starting_param_index: usize,
        options: &FilterWhereOptions,
    ) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self::new(starting_param_index);

        let mut sql_conditions = Self::default_conditions(options);
        if let Some(sql) = filter_where.build_sql(node)? {
            sql_conditions.push(sql);
        }

        let where_clause = if sql_conditions.is_empty() { "1=1".to_string() } else { sql_conditions.join(" AND ") };
        Ok((where_clause, filter_where.param_values))
    }

    pub fn generate_empty(options: &FilterWhereOptions) -> (String, Vec<Value>) {
        let conditions = Self::default_conditions(options);
        let where_clause = if conditions.is_empty() { "1=1".to_string() } else { conditions.join(" AND ") };
        (where_clause, vec![])
    }

    fn default_conditions(options: &FilterWhereOptions) -> Vec<String> {
        let mut conditions = vec![];
        if !options.include_archived {
            conditions.push(format!("\"{}\" IS NOT TRUE", ARCHIVE_COLUMN));
        }
        conditions
    }

    fn build_sql(&mut self, node: &WhereNode) -> Result<Option<String>, FilterError> {
        match node {
            WhereNode::Condition(condition) => self.build_sql_condition(condition).map(Some),
            WhereNode::And(children) => {
                let mut parts = Vec::new();
                for child in children {
                    if let Some(sql) = self.build_sql(child)? { parts.push(sql); }
                }
                Ok(match parts.len() {
                    0 => None,
                    1 => parts.pop(),
                    _ => Some(format!("({})", parts.join(" AND "))),
                })
            }
            WhereNode::Or(children) => {
                if children.is_empty() { return Ok(Some("1=0".to_string())); }
                let mut parts = Vec::new();
                for child in children {
                    parts.push(self.build_sql(child)?.unwrap_or_else(|| "1=1".to_string()));
                }
                Ok(Some(format!("({})", parts.join(" OR "))))
            }
            WhereNode::Not(inner) => {
                let sql = self.build_sql(inner)?.unwrap_or_else(|| "1=1".to_string());
                Ok(Some(format!("NOT ({})", sql)))
            }
        }
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> Result<String, FilterError> {
        let quoted_column = format!("\"{}\"", condition.column);
        let data = &condition.data;
        match condition.operator {
            FilterOp::Eq => {
                if data.is_null() { Ok(format!("{} IS NULL", quoted_column)) }
                else { Ok(format!("{} = {}", quoted_column, self.param(data.clone()))) }
            }
            // Matches NULL/missing values the way a document store's $ne does
            FilterOp::Ne => {
                if data.is_null() { Ok(format!("{} IS NOT NULL", quoted_column)) }
                else { Ok(format!("{} IS DISTINCT FROM {}", quoted_column, self.param(data.clone()))) }
            }
            FilterOp::Gt => Ok(format!("{} > {}", quoted_column, self.param(data.clone()))),
            FilterOp::Gte => Ok(format!("{} >= {}", quoted_column, self.param(data.clone()))),
            FilterOp::Lt => Ok(format!("{} < {}", quoted_column, self.param(data.clone()))),
            FilterOp::Lte => Ok(format!("{} <= {}", quoted_column, self.param(data.clone()))),
            FilterOp::In => match data {
                Value::Array(values) if values.is_empty() => Ok("1=0".to_string()),
                Value::Array(values) => {
                    let params = self.params(values);
                    Ok(format!("{} IN ({})", quoted_column, params.join(", ")))
                }
                _ => Ok(format!("{} = {}", quoted_column, self.param(data.clone()))),
            },
            FilterOp::NIn => match data {
                Value::Array(values) if values.is_empty() => Ok("1=1".to_string()),
                Value::Array(values) => {
                    let params = self.params(values);
                    Ok(format!("({0} IS NULL OR {0} NOT IN ({1}))", quoted_column, params.join(", ")))
                }
                _ => Ok(format!("{} IS DISTINCT FROM {}", quoted_column, self.param(data.clone()))),
            },
            FilterOp::Any => match data {
                Value::Array(values) if values.is_empty() => Ok("1=0".to_string()),
                Value::Array(values) => {
                    let params = self.params(values);
                    Ok(format!("{} && ARRAY[{}]", quoted_column, params.join(", ")))
                }
                _ => Ok(format!("{} && ARRAY[{}]", quoted_column, self.param(data.clone()))),
            },
            FilterOp::All => match data {
                Value::Array(values) => {
                    let params = self.params(values);
                    Ok(format!("{} @> ARRAY[{}]", quoted_column, params.join(", ")))
                }
                _ => Ok(format!("{} @> ARRAY[{}]", quoted_column, self.param(data.clone()))),
            },
            FilterOp::Size => Ok(format!(
                "COALESCE(array_length({}, 1), 0) = {}",
                quoted_column,
                self.param(data.clone())
            )),
            FilterOp::Exists => {
                if data.as_bool().unwrap_or(true) { Ok(format!("{} IS NOT NULL", quoted_column)) }
                else { Ok(format!("{} IS NULL", quoted_column)) }
            }
        }
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }

    fn params(&mut self, values: &[Value]) -> Vec<String> {
        values.iter().map(|v| self.param(v.clone())).collect()
    }

    // ───────────────────────────── evaluation ─────────────────────────────

    /// Evaluate a parsed where-clause against a JSON document
    pub fn matches(node: &WhereNode, doc: &Value) -> bool {
        match node {
            WhereNode::Condition(condition) => Self::evaluate_condition(condition, doc.get(&condition.column)),
            WhereNode::And(children) => children.iter().all(|child| Self::matches(child, doc)),
            WhereNode::Or(children) => children.iter().any(|child| Self::matches(child, doc)),
            WhereNode::Not(inner) => !Self::matches(inner, doc),
        }
    }

    pub fn is_archived(doc: &Value) -> bool {
        doc.get(ARCHIVE_COLUMN).and_then(Value::as_bool).unwrap_or(false)
    }

    fn evaluate_condition(condition: &FilterWhereInfo, field: Option<&Value>) -> bool {
        let data = &condition.data;
        match condition.operator {
            FilterOp::Eq => value_eq(field, data),
            FilterOp::Ne => !value_eq(field, data),
            FilterOp::Gt => compare_field(field, data) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(compare_field(field, data), Some(Ordering::Greater | Ordering::Equal)),
            FilterOp::Lt => compare_field(field, data) == Some(Ordering::Less),
            FilterOp::Lte => matches!(compare_field(field, data), Some(Ordering::Less | Ordering::Equal)),
            FilterOp::In => in_set(field, data),
            FilterOp::NIn => !in_set(field, data),
            FilterOp::Any => match (field, data) {
                (Some(Value::Array(items)), Value::Array(wanted)) => items.iter().any(|item| wanted.contains(item)),
                (Some(Value::Array(items)), single) => items.contains(single),
                (Some(scalar), Value::Array(wanted)) => wanted.contains(scalar),
                _ => false,
            },
            FilterOp::All => match (field, data) {
                (Some(Value::Array(items)), Value::Array(wanted)) => wanted.iter().all(|w| items.contains(w)),
                (Some(Value::Array(items)), single) => items.contains(single),
                _ => false,
            },
            FilterOp::Size => match (field, data.as_u64()) {
                (Some(Value::Array(items)), Some(size)) => items.len() as u64 == size,
                _ => false,
            },
            FilterOp::Exists => field.is_some() == data.as_bool().unwrap_or(true),
        }
    }
}

/// Identifier rule shared by table and column names
pub(crate) fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// Equality with document-store semantics: an array field equals a scalar
/// when it contains it, and a missing field equals null.
fn value_eq(field: Option<&Value>, target: &Value) -> bool {
    match field {
        None | Some(Value::Null) => target.is_null(),
        Some(Value::Array(items)) if !target.is_array() => items.contains(target),
        Some(value) => value == target,
    }
}

fn in_set(field: Option<&Value>, data: &Value) -> bool {
    match data {
        Value::Array(candidates) => candidates.iter().any(|candidate| value_eq(field, candidate)),
        single => value_eq(field, single),
    }
}

fn compare_field(field: Option<&Value>, data: &Value) -> Option<Ordering> {
    field.and_then(|value| compare_values(value, data))
}

pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
