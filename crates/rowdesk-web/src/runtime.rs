// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use rowdesk_app::{ColumnName, Descriptor, Record, TableName, Value};

/// Database collaborator used by the wiring layer. Every call is
/// synchronous; the server serializes access behind a mutex.
pub trait TableRuntime {
    fn reflect(&mut self, table: &TableName) -> Result<Descriptor>;
    fn fetch_all(&mut self, table: &TableName) -> Result<Vec<Record>>;
    fn fetch_matching(&mut self, table: &TableName, key: &Record) -> Result<Vec<Record>>;
    fn exists(&mut self, table: &TableName, key: &Record) -> Result<bool>;
    fn insert(&mut self, table: &TableName, record: &Record) -> Result<()>;
    /// Returns the number of rows changed.
    fn update_field(
        &mut self,
        table: &TableName,
        key: &Record,
        column: &ColumnName,
        value: &Value,
    ) -> Result<usize>;
    /// Returns the number of rows removed.
    fn delete(&mut self, table: &TableName, key: &Record) -> Result<usize>;
    fn distinct_values(&mut self, table: &TableName, column: &ColumnName) -> Result<Vec<Value>>;
}
