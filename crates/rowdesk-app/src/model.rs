// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::column::ColumnName;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text shown in grid cells and form inputs; NULL renders empty.
    pub fn display_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Integer(value) => value.to_string(),
            Self::Real(value) => format_real(*value),
            Self::Text(value) => value.clone(),
        }
    }

    /// Literal form used in user-facing messages, e.g. `'S1'` or `42`.
    pub fn literal(&self) -> String {
        match self {
            Self::Null => "None".to_owned(),
            Self::Integer(value) => value.to_string(),
            Self::Real(value) => format_real(*value),
            Self::Text(value) => {
                let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
                format!("'{escaped}'")
            }
        }
    }
}

fn format_real(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// One row keyed by column, in the order the columns were inserted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(ColumnName, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: ColumnName, value: Value) {
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &ColumnName) -> Option<&Value> {
        self.get_by_name(column.as_str())
    }

    pub fn get_by_name(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name.as_str() == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &ColumnName) -> bool {
        self.get(column).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnName, &Value)> {
        self.fields.iter().map(|(name, value)| (name, value))
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnName> {
        self.fields.iter().map(|(name, _)| name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Subset of this record in the order of `columns`; absent columns are skipped.
    pub fn project<'a>(&self, columns: impl IntoIterator<Item = &'a ColumnName>) -> Self {
        let mut out = Self::new();
        for column in columns {
            if let Some(value) = self.get(column) {
                out.insert(column.clone(), value.clone());
            }
        }
        out
    }

    pub fn merge(&mut self, other: &Self) {
        for (column, value) in other.iter() {
            self.insert(column.clone(), value.clone());
        }
    }
}

impl FromIterator<(ColumnName, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (ColumnName, Value)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}

/// Dict-literal rendering: `{'subject_id': 'S1'}`.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, (column, value)) in self.fields.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "'{column}': {}", value.literal())?;
        }
        f.write_str("}")
    }
}

/// Form input exactly as posted by the browser, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawRecord(BTreeMap<String, String>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> &str {
        self.0.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(column, value)| (column.as_str(), value.as_str()))
    }

    pub fn is_blank(&self) -> bool {
        self.0.values().all(|value| value.trim().is_empty())
    }

    pub fn from_record(record: &Record) -> Self {
        let mut raw = Self::new();
        for (column, value) in record.iter() {
            raw.set(column.as_str(), value.display_text());
        }
        raw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub const fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RawRecord, Record, Value};
    use crate::ColumnName;

    fn column(name: &str) -> ColumnName {
        ColumnName::parse(name).expect("valid column")
    }

    #[test]
    fn record_display_uses_dict_literal() {
        let record: Record = [
            (column("subject_id"), Value::Text("S1".to_owned())),
            (column("session"), Value::Integer(3)),
        ]
        .into_iter()
        .collect();
        assert_eq!(record.to_string(), "{'subject_id': 'S1', 'session': 3}");
        assert_eq!(Record::new().to_string(), "{}");
    }

    #[test]
    fn literal_escapes_quotes() {
        assert_eq!(Value::Text("O'Neil".to_owned()).literal(), "'O\\'Neil'");
        assert_eq!(Value::Real(2.0).literal(), "2.0");
        assert_eq!(Value::Null.literal(), "None");
    }

    #[test]
    fn insert_replaces_existing_column_in_place() {
        let mut record = Record::new();
        record.insert(column("a"), Value::Integer(1));
        record.insert(column("b"), Value::Integer(2));
        record.insert(column("a"), Value::Integer(9));
        assert_eq!(record.len(), 2);
        assert_eq!(record.to_string(), "{'a': 9, 'b': 2}");
    }

    #[test]
    fn project_follows_requested_order_and_skips_missing() {
        let record: Record = [
            (column("a"), Value::Integer(1)),
            (column("b"), Value::Integer(2)),
        ]
        .into_iter()
        .collect();
        let keys = [column("b"), column("missing"), column("a")];
        assert_eq!(record.project(keys.iter()).to_string(), "{'b': 2, 'a': 1}");
    }

    #[test]
    fn raw_record_blank_detection() {
        let mut raw = RawRecord::new();
        assert!(raw.is_blank());
        raw.set("sex", "  ");
        assert!(raw.is_blank());
        raw.set("subject_id", "S1");
        assert!(!raw.is_blank());
        assert_eq!(raw.get("unknown"), "");
    }
}
