// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use rowdesk_app::{
    ColumnAffinity, ColumnName, ColumnSpec, Descriptor, ForeignRef, Record, TableName, Value,
    is_safe_identifier,
};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, params, params_from_iter};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const APP_NAME: &str = "rowdesk";

/// Separates a master table name from its part name, e.g. `surgery__implant`.
pub const PART_SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PragmaColumn {
    pub cid: i32,
    pub name: String,
    pub column_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub primary_key: i32,
}

/// One column pair of a foreign key. Composite keys share `id` and are
/// ordered by `seq`. `to` is absent when the key targets the parent's
/// primary key implicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PragmaForeignKey {
    pub id: i32,
    pub seq: i32,
    pub table: String,
    pub from: String,
    pub to: Option<String>,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    /// Creates and fills the demo lab schema unless a `subject` table exists.
    pub fn seed_demo_data(&self) -> Result<()> {
        if table_exists(&self.conn, "subject")? {
            return Ok(());
        }
        self.conn
            .execute_batch(include_str!("sql/demo.sql"))
            .context("create demo schema")
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT name
                FROM sqlite_master
                WHERE type = 'table'
                  AND name NOT LIKE 'sqlite_%'
                ORDER BY name ASC
                ",
            )
            .context("prepare table names query")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("query table names")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect table names")
    }

    /// Tables a tab can be built for: safe names that are not parts.
    pub fn master_tables(&self) -> Result<Vec<TableName>> {
        self.table_names()?
            .into_iter()
            .filter(|name| is_safe_identifier(name) && !name.contains(PART_SEPARATOR))
            .map(|name| TableName::parse(&name))
            .collect()
    }

    pub fn table_columns(&self, table: &TableName) -> Result<Vec<PragmaColumn>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote(table)))
            .with_context(|| format!("inspect columns for {table}"))?;
        let rows = stmt
            .query_map([], |row| {
                let not_null: i32 = row.get(3)?;
                Ok(PragmaColumn {
                    cid: row.get(0)?,
                    name: row.get(1)?,
                    column_type: row.get(2)?,
                    not_null: not_null != 0,
                    default_value: row.get(4)?,
                    primary_key: row.get(5)?,
                })
            })
            .with_context(|| format!("query column info for {table}"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("collect columns for {table}"))
    }

    pub fn foreign_keys(&self, table: &TableName) -> Result<Vec<PragmaForeignKey>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA foreign_key_list({})", quote(table)))
            .with_context(|| format!("inspect foreign keys for {table}"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PragmaForeignKey {
                    id: row.get(0)?,
                    seq: row.get(1)?,
                    table: row.get(2)?,
                    from: row.get(3)?,
                    to: row.get(4)?,
                })
            })
            .with_context(|| format!("query foreign keys for {table}"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("collect foreign keys for {table}"))
    }

    /// Primary-key column names in key order.
    pub fn primary_key_columns(&self, table: &TableName) -> Result<Vec<String>> {
        let mut keyed = self
            .table_columns(table)?
            .into_iter()
            .filter(|column| column.primary_key > 0)
            .collect::<Vec<_>>();
        keyed.sort_by_key(|column| column.primary_key);
        Ok(keyed.into_iter().map(|column| column.name).collect())
    }

    pub fn reflect(&self, table: &TableName) -> Result<Descriptor> {
        if !table_exists(&self.conn, table.as_str())? {
            bail!("table `{table}` does not exist -- check the table name or the database path");
        }

        let columns = self.table_columns(table)?;
        let references = self.resolved_references(table)?;

        let mut specs = Vec::with_capacity(columns.len());
        let mut keyed = Vec::new();
        for column in columns {
            let name = ColumnName::parse(&column.name)
                .with_context(|| format!("reflect column of {table}"))?;
            if column.primary_key > 0 {
                keyed.push((column.primary_key, name.clone()));
            }
            let reference = references
                .iter()
                .find(|(from, _)| *from == column.name)
                .map(|(_, target)| target.clone());
            specs.push(ColumnSpec {
                name,
                affinity: ColumnAffinity::from_declared_type(&column.column_type),
                declared_type: column.column_type,
                not_null: column.not_null,
                default: parse_default(column.default_value.as_deref()),
                references: reference,
            });
        }
        keyed.sort_by_key(|(position, _)| *position);
        let primary_key = keyed.into_iter().map(|(_, name)| name).collect();

        let mut descriptor = Descriptor::new(table.clone(), specs.clone(), primary_key)?;
        for spec in &specs {
            if let Some(target) = &spec.references {
                let options = self.distinct_values(&target.table, &target.column)?;
                descriptor = descriptor.with_dropdown(spec.name.clone(), options)?;
            }
        }

        let parts = self.part_tables(table, descriptor.primary_key())?;
        debug!(
            table = %table,
            columns = descriptor.columns().len(),
            parts = parts.len(),
            "reflected table"
        );
        Ok(descriptor.with_parts(parts))
    }

    /// Tables named `{master}__*` that reference `master` and carry every
    /// master key column in their own primary key.
    pub fn part_tables(
        &self,
        master: &TableName,
        master_key: &[ColumnName],
    ) -> Result<Vec<TableName>> {
        let prefix = format!("{master}{PART_SEPARATOR}");
        let mut parts = Vec::new();
        for name in self.table_names()? {
            if !name.starts_with(&prefix) || !is_safe_identifier(&name) {
                continue;
            }
            let candidate = TableName::parse(&name)?;
            let references_master = self
                .foreign_keys(&candidate)?
                .iter()
                .any(|key| key.table.eq_ignore_ascii_case(master.as_str()));
            if !references_master {
                continue;
            }
            let own_key = self.primary_key_columns(&candidate)?;
            if master_key
                .iter()
                .all(|column| own_key.iter().any(|own| own == column.as_str()))
            {
                parts.push(candidate);
            }
        }
        Ok(parts)
    }

    pub fn distinct_values(&self, table: &TableName, column: &ColumnName) -> Result<Vec<Value>> {
        let column_sql = quote(column);
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT DISTINCT {column_sql} FROM {} WHERE {column_sql} IS NOT NULL ORDER BY {column_sql} ASC",
                quote(table)
            ))
            .with_context(|| format!("prepare distinct values for {table}.{column}"))?;
        let rows = stmt
            .query_map([], |row| Ok(value_from_sql(row.get_ref(0)?)))
            .with_context(|| format!("query distinct values for {table}.{column}"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("collect distinct values for {table}.{column}"))
    }

    /// Every row of `table`, ordered by primary key.
    pub fn fetch_all(&self, table: &TableName) -> Result<Vec<Record>> {
        let order = self
            .primary_key_columns(table)?
            .iter()
            .map(|column| format!("\"{column}\" ASC"))
            .collect::<Vec<_>>();
        let mut query = format!("SELECT * FROM {}", quote(table));
        if !order.is_empty() {
            query.push_str(" ORDER BY ");
            query.push_str(&order.join(", "));
        }
        self.query_records(table, &query, Vec::new())
    }

    /// Rows whose columns equal every entry of `key`.
    pub fn fetch_matching(&self, table: &TableName, key: &Record) -> Result<Vec<Record>> {
        let (clause, values) = where_clause(key)?;
        let query = format!("SELECT * FROM {}{clause}", quote(table));
        self.query_records(table, &query, values)
    }

    pub fn exists(&self, table: &TableName, key: &Record) -> Result<bool> {
        let (clause, values) = where_clause(key)?;
        let found = self
            .conn
            .query_row(
                &format!("SELECT EXISTS(SELECT 1 FROM {}{clause})", quote(table)),
                params_from_iter(values),
                |row| row.get::<_, i64>(0),
            )
            .with_context(|| format!("check existence in {table}"))?;
        Ok(found == 1)
    }

    pub fn insert(&self, table: &TableName, record: &Record) -> Result<()> {
        let query = if record.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote(table))
        } else {
            let columns = record.columns().map(quote).collect::<Vec<_>>();
            let placeholders = vec!["?"; columns.len()];
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(table),
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        let values = record.iter().map(|(_, value)| value_to_sql(value));
        self.conn
            .execute(&query, params_from_iter(values))
            .with_context(|| format!("insert into {table}"))?;
        debug!(table = %table, record = %record, "inserted row");
        Ok(())
    }

    /// Sets one column on the rows matching `key`; returns the rows touched.
    pub fn update_field(
        &self,
        table: &TableName,
        key: &Record,
        column: &ColumnName,
        value: &Value,
    ) -> Result<usize> {
        let (clause, key_values) = where_clause(key)?;
        let mut values = vec![value_to_sql(value)];
        values.extend(key_values);
        let changed = self
            .conn
            .execute(
                &format!("UPDATE {} SET {} = ?{clause}", quote(table), quote(column)),
                params_from_iter(values),
            )
            .with_context(|| format!("update {table}.{column}"))?;
        debug!(table = %table, column = %column, key = %key, changed, "updated field");
        Ok(changed)
    }

    pub fn delete(&self, table: &TableName, key: &Record) -> Result<usize> {
        let (clause, values) = where_clause(key)?;
        let removed = self
            .conn
            .execute(
                &format!("DELETE FROM {}{clause}", quote(table)),
                params_from_iter(values),
            )
            .with_context(|| format!("delete from {table}"))?;
        debug!(table = %table, key = %key, removed, "deleted rows");
        Ok(removed)
    }

    fn query_records(
        &self,
        table: &TableName,
        query: &str,
        values: Vec<SqlValue>,
    ) -> Result<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare(query)
            .with_context(|| format!("prepare select from {table}"))?;
        let names = stmt
            .column_names()
            .into_iter()
            .map(ColumnName::parse)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("read result columns of {table}"))?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                let mut record = Record::new();
                for (index, name) in names.iter().enumerate() {
                    record.insert(name.clone(), value_from_sql(row.get_ref(index)?));
                }
                Ok(record)
            })
            .with_context(|| format!("select from {table}"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("collect rows of {table}"))
    }

    /// Foreign-key column pairs of `table`, with implicit targets resolved
    /// against the referenced table's primary key.
    fn resolved_references(&self, table: &TableName) -> Result<Vec<(String, ForeignRef)>> {
        let mut resolved = Vec::new();
        for key in self.foreign_keys(table)? {
            let target_table = TableName::parse(&key.table)
                .with_context(|| format!("foreign key of {table}"))?;
            let target_column = match key.to {
                Some(column) => column,
                None => {
                    let parent_key = self.primary_key_columns(&target_table)?;
                    usize::try_from(key.seq)
                        .ok()
                        .and_then(|seq| parent_key.get(seq).cloned())
                        .ok_or_else(|| {
                            anyhow!(
                                "foreign key {}.{} has no matching key column in {target_table}",
                                table,
                                key.from
                            )
                        })?
                }
            };
            resolved.push((
                key.from,
                ForeignRef {
                    table: target_table,
                    column: ColumnName::parse(&target_column)?,
                },
            ));
        }
        Ok(resolved)
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("ROWDESK_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set ROWDESK_DB_PATH to a database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("rowdesk.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

/// Column default as declared in the schema. Expression defaults such as
/// `CURRENT_TIMESTAMP` map to NULL so the database fills them in.
pub fn parse_default(raw: Option<&str>) -> Value {
    let Some(raw) = raw.map(str::trim) else {
        return Value::Null;
    };
    if raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return Value::Text(raw[1..raw.len() - 1].replace("''", "'"));
    }
    if let Ok(value) = raw.parse::<i64>() {
        return Value::Integer(value);
    }
    if let Ok(value) = raw.parse::<f64>()
        && value.is_finite()
    {
        return Value::Real(value);
    }
    Value::Null
}

fn where_clause(key: &Record) -> Result<(String, Vec<SqlValue>)> {
    if key.is_empty() {
        bail!("refusing to match rows with an empty key");
    }
    let conditions = key
        .columns()
        .map(|column| format!("{} IS ?", quote(column)))
        .collect::<Vec<_>>();
    let values = key.iter().map(|(_, value)| value_to_sql(value)).collect();
    Ok((format!(" WHERE {}", conditions.join(" AND ")), values))
}

// Identifier types only hold safe names, so plain double quotes suffice.
fn quote(identifier: impl AsRef<str>) -> String {
    format!("\"{}\"", identifier.as_ref())
}

fn value_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(value) => SqlValue::Integer(*value),
        Value::Real(value) => SqlValue::Real(*value),
        Value::Text(value) => SqlValue::Text(value.clone()),
    }
}

fn value_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(value) => Value::Integer(value),
        ValueRef::Real(value) => Value::Real(value),
        ValueRef::Text(value) => Value::Text(String::from_utf8_lossy(value).into_owned()),
        ValueRef::Blob(value) => Value::Text(format!("<{} bytes>", value.len())),
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}
