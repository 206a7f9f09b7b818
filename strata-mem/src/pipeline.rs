//! Row processing applied on every terminal call, in strict order:
//! filtering, stable ordering, pagination, column projection.

use serde_json::Value;
use std::cmp::Ordering;
use strata_core::response::{ErrorCode, ErrorInfo};
use strata_core::spec::{Filter, FilterOp, OrderKey, QuerySpec, Row, Selection};

/// Filters of one spec with its `or()` expressions parsed up front, so a
/// malformed expression fails the call instead of silently matching nothing.
pub(crate) struct CompiledFilters<'a> {
    filters: &'a [Filter],
    or_groups: Vec<Vec<Filter>>,
}

pub(crate) fn compile(spec: &QuerySpec) -> Result<CompiledFilters<'_>, ErrorInfo> {
    let or_groups = spec
        .or_filters
        .iter()
        .map(|expr| parse_or(expr))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CompiledFilters {
        filters: &spec.filters,
        or_groups,
    })
}

impl CompiledFilters<'_> {
    pub(crate) fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| filter_matches(row, f))
            && self
                .or_groups
                .iter()
                .all(|group| group.iter().any(|f| filter_matches(row, f)))
    }
}

pub(crate) fn filter_matches(row: &Row, filter: &Filter) -> bool {
    let actual = row.get(&filter.field);
    match filter.op {
        FilterOp::Eq => actual == Some(&filter.value),
        // Null/missing never satisfies neq, mirroring SQL three-valued logic.
        FilterOp::Neq => matches!(actual, Some(v) if !v.is_null() && *v != filter.value),
        FilterOp::Gt => compare_non_null(actual, &filter.value).is_some_and(Ordering::is_gt),
        FilterOp::Gte => compare_non_null(actual, &filter.value).is_some_and(Ordering::is_ge),
        FilterOp::Lt => compare_non_null(actual, &filter.value).is_some_and(Ordering::is_lt),
        FilterOp::Lte => compare_non_null(actual, &filter.value).is_some_and(Ordering::is_le),
        FilterOp::Like | FilterOp::Ilike => like_matches(actual, &filter.value),
        FilterOp::In => match &filter.value {
            Value::Array(list) => actual.is_some_and(|v| list.contains(v)),
            _ => false,
        },
        FilterOp::Is => match &filter.value {
            Value::Null => actual.map_or(true, Value::is_null),
            expected => actual == Some(expected),
        },
    }
}

fn compare_non_null(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    let actual = actual?;
    if actual.is_null() || expected.is_null() {
        return None;
    }
    Some(compare_values(actual, expected))
}

/// Numbers numerically, strings by code point, mixed types via string
/// coercion.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => coerce_string(a).cmp(&coerce_string(b)),
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Case-insensitive substring containment with `%` wildcards stripped.
fn like_matches(actual: Option<&Value>, pattern: &Value) -> bool {
    let (Some(Value::String(actual)), Value::String(pattern)) = (actual, pattern) else {
        return false;
    };
    let needle = pattern.replace('%', "").to_lowercase();
    actual.to_lowercase().contains(&needle)
}

/// Stable multi-key sort. Null and missing fields sort as the largest value:
/// last when ascending, first when descending.
pub(crate) fn sort_rows(rows: &mut [Row], order: &[OrderKey]) {
    if order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for key in order {
            let ord = compare_by_key(a, b, key);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn compare_by_key(a: &Row, b: &Row, key: &OrderKey) -> Ordering {
    let av = a.get(&key.field).filter(|v| !v.is_null());
    let bv = b.get(&key.field).filter(|v| !v.is_null());
    let ord = match (av, bv) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => compare_values(x, y),
    };
    if key.ascending {
        ord
    } else {
        ord.reverse()
    }
}

pub(crate) fn paginate(rows: Vec<Row>, offset: Option<usize>, limit: Option<usize>) -> Vec<Row> {
    let iter = rows.into_iter().skip(offset.unwrap_or(0));
    match limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

/// Keep only the requested columns. Relation-only selections keep the full
/// row, since embedding is not executed here.
pub(crate) fn project(rows: Vec<Row>, selection: &Selection) -> Vec<Row> {
    let Some(columns) = selection.columns() else {
        return rows;
    };
    if columns.is_empty() {
        return rows;
    }
    rows.into_iter()
        .map(|row| {
            let mut projected = Row::new();
            for (key, value) in row {
                if columns.contains(&key.as_str()) {
                    projected.insert(key, value);
                }
            }
            projected
        })
        .collect()
}

/// Parse one `or()` expression: comma-separated `field.op.value` branches,
/// parens respected so `in.(a,b)` lists survive the split.
pub(crate) fn parse_or(expr: &str) -> Result<Vec<Filter>, ErrorInfo> {
    let mut branches = Vec::new();
    for raw in split_branches(expr) {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let mut parts = raw.splitn(3, '.');
        let (Some(field), Some(op), Some(literal)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid_or(expr));
        };
        let Some(op) = FilterOp::parse(op) else {
            return Err(invalid_or(expr));
        };
        branches.push(Filter {
            field: field.to_string(),
            op,
            value: parse_literal(literal),
        });
    }
    if branches.is_empty() {
        return Err(invalid_or(expr));
    }
    Ok(branches)
}

fn invalid_or(expr: &str) -> ErrorInfo {
    ErrorInfo::new(ErrorCode::Query, format!("Invalid or() expression: {expr}"))
}

fn split_branches(expr: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in expr.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&expr[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&expr[start..]);
    parts
}

fn parse_literal(raw: &str) -> Value {
    let raw = raw.trim();
    if let Some(inner) = raw.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        return Value::Array(inner.split(',').map(|item| parse_scalar(item.trim())).collect());
    }
    parse_scalar(raw)
}

fn parse_scalar(raw: &str) -> Value {
    match raw {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(n) = raw.parse::<i64>() {
                return Value::from(n);
            }
            if let Ok(f) = raw.parse::<f64>() {
                return Value::from(f);
            }
            Value::String(raw.to_string())
        }
    }
}
