//! # Reads
//!
//! A [`Select`] describes one read against one table and renders to the
//! PostgREST query string the hosted backend understands:
//!
//! - `select=*,meals(*)` for the column list and embedded relations
//! - `field=eq.value` for every equality filter, all must match
//! - `field=in.("a","b")` for an id list
//! - `order=field.desc` and `limit=n`
//!
//! The in-memory backend evaluates the same description directly against rows,
//! so both backends agree on what a read means.
use std::{cmp::Ordering, collections::BTreeMap};

use serde_json::Value;

/// Equality filter, field to value. Every entry must match.
pub type Filter = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A related table nested into each row under the related table's name.
///
/// `local` is the column on the parent row, `foreign` the column on the related
/// rows. The remote backend resolves the relation from its foreign keys and only
/// needs the table name; the keys are for the in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub table: String,
    pub local: String,
    pub foreign: String,
    pub many: bool,
}

impl Embed {
    /// Parent row points at a single related row.
    pub fn one(table: &str, local: &str, foreign: &str) -> Self {
        Self {
            table: table.to_string(),
            local: local.to_string(),
            foreign: foreign.to_string(),
            many: false,
        }
    }

    /// Related rows point back at the parent.
    pub fn many(table: &str, local: &str, foreign: &str) -> Self {
        Self {
            table: table.to_string(),
            local: local.to_string(),
            foreign: foreign.to_string(),
            many: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    pub columns: Vec<String>,
    pub filter: Filter,
    pub within: Option<(String, Vec<String>)>,
    pub embeds: Vec<Embed>,
    pub order: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Select {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn eq(mut self, field: &str, value: impl Into<String>) -> Self {
        self.filter.insert(field.to_string(), value.into());
        self
    }

    pub fn matching(mut self, filter: &Filter) -> Self {
        self.filter
            .extend(filter.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn within(mut self, field: &str, values: Vec<String>) -> Self {
        self.within = Some((field.to_string(), values));
        self
    }

    pub fn embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn order(mut self, field: &str, direction: Direction) -> Self {
        self.order = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn select_clause(&self) -> String {
        let mut parts = if self.columns.is_empty() {
            vec!["*".to_string()]
        } else {
            self.columns.clone()
        };

        parts.extend(self.embeds.iter().map(|embed| format!("{}(*)", embed.table)));
        parts.join(",")
    }

    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.select_clause())];

        for (field, value) in &self.filter {
            params.push((field.clone(), format!("eq.{value}")));
        }

        if let Some((field, values)) = &self.within {
            let list: Vec<String> = values.iter().map(|v| quote(v)).collect();
            params.push((field.clone(), format!("in.({})", list.join(","))));
        }

        if let Some((field, direction)) = &self.order {
            let suffix = match direction {
                Direction::Ascending => "asc",
                Direction::Descending => "desc",
            };
            params.push(("order".to_string(), format!("{field}.{suffix}")));
        }

        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        params
    }

    /// Whether `row` passes the equality and `in` filters.
    pub fn matches(&self, row: &Value) -> bool {
        let eq_ok = self
            .filter
            .iter()
            .all(|(field, value)| text(row.get(field)).as_deref() == Some(value.as_str()));

        let in_ok = match &self.within {
            Some((field, values)) => match text(row.get(field)) {
                Some(found) => values.iter().any(|v| *v == found),
                None => false,
            },
            None => true,
        };

        eq_ok && in_ok
    }

    /// Orders rows the way Postgres does: nulls sort as larger than any value.
    pub fn sort(&self, rows: &mut [Value]) {
        if let Some((field, direction)) = &self.order {
            rows.sort_by(|a, b| {
                let ordering = compare(a.get(field), b.get(field));
                match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }
    }

    /// Keeps only the selected columns. Embedded relations are added afterwards.
    pub fn project(&self, row: Value) -> Value {
        if self.columns.is_empty() {
            return row;
        }

        match row {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(key, _)| self.columns.iter().any(|c| c == key))
                    .collect(),
            ),
            other => other,
        }
    }
}

/// Text form of a scalar column, as PostgREST compares it in filters.
pub fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}
