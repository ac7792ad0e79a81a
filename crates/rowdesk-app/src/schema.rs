// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use std::collections::{BTreeMap, BTreeSet};

use crate::column::{ColumnName, TableName};
use crate::model::{Record, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAffinity {
    Integer,
    Real,
    Numeric,
    Text,
    Date,
    DateTime,
    Blob,
}

impl ColumnAffinity {
    /// SQLite type-affinity rules, with DATE/TIME names split out so forms
    /// can validate them.
    pub fn from_declared_type(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();
        if upper.contains("INT") {
            return Self::Integer;
        }
        if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
            return Self::DateTime;
        }
        if upper.contains("DATE") {
            return Self::Date;
        }
        if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            return Self::Text;
        }
        if upper.is_empty() || upper.contains("BLOB") {
            return Self::Blob;
        }
        if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            return Self::Real;
        }
        Self::Numeric
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignRef {
    pub table: TableName,
    pub column: ColumnName,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: ColumnName,
    pub declared_type: String,
    pub affinity: ColumnAffinity,
    pub not_null: bool,
    pub default: Value,
    pub references: Option<ForeignRef>,
}

/// Reflected metadata for one table. Built once per tab and never mutated
/// afterwards; the builder methods consume `self`.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    table: TableName,
    columns: Vec<ColumnSpec>,
    primary_key: Vec<ColumnName>,
    dropdowns: BTreeMap<ColumnName, Vec<Value>>,
    parts: Vec<TableName>,
}

impl Descriptor {
    pub fn new(
        table: TableName,
        columns: Vec<ColumnSpec>,
        primary_key: Vec<ColumnName>,
    ) -> Result<Self> {
        if columns.is_empty() {
            bail!("table `{table}` has no columns");
        }

        let mut seen = BTreeSet::new();
        for column in &columns {
            if !seen.insert(column.name.clone()) {
                bail!("table `{table}` declares column `{}` twice", column.name);
            }
        }

        if primary_key.is_empty() {
            bail!("table `{table}` has no primary key -- declare one to edit its rows here");
        }
        for key in &primary_key {
            if !seen.contains(key) {
                bail!("primary key column `{key}` is not a column of table `{table}`");
            }
        }

        Ok(Self {
            table,
            columns,
            primary_key,
            dropdowns: BTreeMap::new(),
            parts: Vec::new(),
        })
    }

    pub fn with_dropdown(mut self, column: ColumnName, options: Vec<Value>) -> Result<Self> {
        if self.column(column.as_str()).is_none() {
            bail!(
                "dropdown column `{column}` is not a column of table `{}`",
                self.table
            );
        }
        self.dropdowns.insert(column, options);
        Ok(self)
    }

    pub fn with_parts(mut self, parts: Vec<TableName>) -> Self {
        self.parts = parts;
        self
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &ColumnName> {
        self.columns.iter().map(|column| &column.name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|column| column.name.as_str() == name)
    }

    pub fn primary_key(&self) -> &[ColumnName] {
        &self.primary_key
    }

    pub fn is_primary(&self, column: &ColumnName) -> bool {
        self.primary_key.contains(column)
    }

    pub fn non_key_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns
            .iter()
            .filter(|column| !self.is_primary(&column.name))
    }

    pub fn default_for(&self, column: &ColumnName) -> Option<&Value> {
        self.column(column.as_str()).map(|spec| &spec.default)
    }

    pub fn dropdown_fields(&self) -> impl Iterator<Item = &ColumnName> {
        self.dropdowns.keys()
    }

    pub fn dropdown_options(&self, column: &ColumnName) -> Option<&[Value]> {
        self.dropdowns.get(column).map(Vec::as_slice)
    }

    pub fn parts(&self) -> &[TableName] {
        &self.parts
    }

    /// Primary-key subset of `record`; every key column must be present.
    pub fn key_of(&self, record: &Record) -> Result<Record> {
        let key = record.project(self.primary_key.iter());
        if let Some(missing) = self
            .primary_key
            .iter()
            .find(|column| !key.contains(column))
        {
            bail!(
                "primary key column `{missing}` of `{}` is blank -- fill it in and retry",
                self.table
            );
        }
        Ok(key)
    }
}
