use serde::Serialize;
use serde_json::Value;

/// A raw record as stored and returned by every backend.
pub type Row = serde_json::Map<String, Value>;

/// Filter operators supported by the query chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    In,
    Is,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Like => "like",
            FilterOp::Ilike => "ilike",
            FilterOp::In => "in",
            FilterOp::Is => "is",
        }
    }

    /// Parse the textual operator used in `or()` expressions.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "eq" => Some(FilterOp::Eq),
            "neq" => Some(FilterOp::Neq),
            "gt" => Some(FilterOp::Gt),
            "gte" => Some(FilterOp::Gte),
            "lt" => Some(FilterOp::Lt),
            "lte" => Some(FilterOp::Lte),
            "like" => Some(FilterOp::Like),
            "ilike" => Some(FilterOp::Ilike),
            "in" => Some(FilterOp::In),
            "is" => Some(FilterOp::Is),
            _ => None,
        }
    }
}

/// One predicate in the implicit AND chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

/// One ordering key. Sorting is stable; ties keep insertion order. Rows with
/// a null or missing field sort last when ascending and first when
/// descending, and both backends are required to agree on that rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderKey {
    pub field: String,
    pub ascending: bool,
}

/// What the terminal call asks the backend to do.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operation {
    Select,
    Insert(Vec<Row>),
    Update(Row),
    Delete,
}

/// Operation discriminant, used to key per-call mock overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Select => OpKind::Select,
            Operation::Insert(_) => OpKind::Insert,
            Operation::Update(_) => OpKind::Update,
            Operation::Delete => OpKind::Delete,
        }
    }
}

/// Requested projection.
///
/// Relation selections (`author:profiles(id, name)`) are parsed and carried
/// so adapters that support embedding can forward them; backends without
/// embedding must tolerate the shape without erroring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Selection {
    All,
    Items(Vec<SelectItem>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SelectItem {
    Column(String),
    Relation { target: String, inner: String },
}

impl SelectItem {
    pub fn render(&self) -> String {
        match self {
            SelectItem::Column(name) => name.clone(),
            SelectItem::Relation { target, inner } => format!("{target}({inner})"),
        }
    }
}

impl Selection {
    /// Parse a select list such as `"id, name, author:profiles(id, name)"`.
    ///
    /// `"*"` and the empty string select every field.
    pub fn parse(raw: &str) -> Selection {
        let raw = raw.trim();
        if raw.is_empty() || raw == "*" {
            return Selection::All;
        }
        let mut items = Vec::new();
        for part in split_top_level(raw) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.find('(') {
                Some(open) if part.ends_with(')') => items.push(SelectItem::Relation {
                    target: part[..open].trim().to_string(),
                    inner: part[open + 1..part.len() - 1].trim().to_string(),
                }),
                _ => items.push(SelectItem::Column(part.to_string())),
            }
        }
        if items.is_empty() {
            Selection::All
        } else {
            Selection::Items(items)
        }
    }

    /// Render back to the textual form for wire forwarding.
    pub fn render(&self) -> String {
        match self {
            Selection::All => "*".to_string(),
            Selection::Items(items) => items
                .iter()
                .map(SelectItem::render)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Plain column names to project, or `None` when every field is kept.
    /// Relation items carry no projectable column and are skipped.
    pub fn columns(&self) -> Option<Vec<&str>> {
        match self {
            Selection::All => None,
            Selection::Items(items) => Some(
                items
                    .iter()
                    .filter_map(|item| match item {
                        SelectItem::Column(name) => Some(name.as_str()),
                        SelectItem::Relation { .. } => None,
                    })
                    .collect(),
            ),
        }
    }
}

/// Split on commas that are not inside parentheses.
fn split_top_level(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in raw.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&raw[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

/// The full, explicit state accumulated by one query chain.
///
/// A spec is a value: chain calls build a new one and the terminal call
/// consumes it, so no state survives from one call into the next.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySpec {
    pub table: String,
    pub op: Operation,
    pub select: Selection,
    pub filters: Vec<Filter>,
    /// Raw `or()` escape expressions, AND-ed with `filters`.
    pub or_filters: Vec<String>,
    pub order: Vec<OrderKey>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl QuerySpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            op: Operation::Select,
            select: Selection::All,
            filters: Vec::new(),
            or_filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}

/// Conservative identifier check for table references, dotted segments
/// allowed (`schema.table`).
pub fn is_valid_table_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    name.split('.').all(is_valid_segment)
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
