//! A small read-only query language over the mock tables

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const DEFAULT_LIMIT: i64 = 25;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuerySpec {
    pub table: String,
    /// Field -> literal (equality) or `{op: rhs}` conditions, ANDed.
    #[serde(default, rename = "where")]
    pub filter: Map<String, Value>,
    #[serde(default)]
    pub select: Option<Vec<String>>,
    #[serde(default)]
    pub sort: Vec<SortRule>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SortRule {
    pub field: String,
    #[serde(default)]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub total: usize,
    pub items: Vec<Value>,
    pub offset: usize,
    pub limit: usize,
}

fn as_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare(value: Option<&Value>, op: &str, rhs: &Value) -> bool {
    let numeric = |check: fn(f64, f64) -> bool| match (as_number(value), as_number(Some(rhs))) {
        (Some(lhs), Some(rhs)) => check(lhs, rhs),
        _ => false,
    };
    match op.trim().to_lowercase().replace(' ', "").as_str() {
        "=" => value == Some(rhs),
        "<" => numeric(|a, b| a < b),
        ">" => numeric(|a, b| a > b),
        "<=" => numeric(|a, b| a <= b),
        ">=" => numeric(|a, b| a >= b),
        "in" => match (value, rhs) {
            (Some(v), Value::Array(options)) => options.contains(v),
            (Some(v), other) => v == other,
            (None, _) => false,
        },
        "contains" => match value {
            Some(Value::Array(values)) => values.contains(rhs),
            Some(Value::String(s)) => {
                let needle = match rhs {
                    Value::String(r) => r.to_lowercase(),
                    other => other.to_string().to_lowercase(),
                };
                s.to_lowercase().contains(&needle)
            }
            _ => false,
        },
        _ => false,
    }
}

fn matches(row: &Value, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(field, condition)| match condition {
        Value::Object(ops) => ops.iter().all(|(op, rhs)| compare(row.get(field), op, rhs)),
        literal => row.get(field) == Some(literal),
    })
}

/// Total order over loose JSON values: missing/null < bool < number < string.
fn order_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .unwrap_or(0.0)
            .total_cmp(&y.as_f64().unwrap_or(0.0)),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

pub(super) fn run(rows: &[Value], spec: &QuerySpec) -> QueryResult {
    let mut items: Vec<Value> = rows
        .iter()
        .filter(|row| matches(row, &spec.filter))
        .cloned()
        .collect();

    // Stable sorts applied last-rule-first give multi-key ordering.
    for rule in spec.sort.iter().rev() {
        let descending = rule.dir.as_deref().is_some_and(|d| d.eq_ignore_ascii_case("desc"));
        items.sort_by(|a, b| {
            let ord = order_values(a.get(&rule.field), b.get(&rule.field));
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }

    let total = items.len();

    if let Some(fields) = &spec.select {
        items = items
            .into_iter()
            .map(|row| {
                let projected: Map<String, Value> = fields
                    .iter()
                    .map(|f| (f.clone(), row.get(f).cloned().unwrap_or(Value::Null)))
                    .collect();
                Value::Object(projected)
            })
            .collect();
    }

    let offset = spec.offset.unwrap_or(0).max(0) as usize;
    let limit = spec.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) as usize;

    QueryResult {
        total,
        items: items.into_iter().skip(offset).take(limit).collect(),
        offset,
        limit,
    }
}
