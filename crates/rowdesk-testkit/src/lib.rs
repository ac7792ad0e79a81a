// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use rowdesk_app::{ColumnName, Record, TableName, Value};
use rusqlite::Connection;
use std::path::PathBuf;
use time::{Date, Duration, Month};

const SEXES: [&str; 3] = ["M", "F", "U"];
const RIGS: [&str; 2] = ["rig-a", "rig-b"];
const PROBE_MODELS: [&str; 4] = ["neuropixels", "neuropixels-2", "tetrode", "silicon-h32"];
const SUBJECT_PREFIXES: [&str; 5] = ["JC", "KS", "AR", "MW", "TD"];

const REFERENCE_YEAR: i32 = 2021;

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Seeded generator for rows of the lab fixture schema. The same seed
/// always yields the same sequence of rows.
#[derive(Debug, Clone)]
pub struct LabFaker {
    rng: DeterministicRng,
    next_subject: usize,
}

impl LabFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            next_subject: 1,
        }
    }

    pub fn subject(&mut self) -> Record {
        let prefix = self.pick(&SUBJECT_PREFIXES);
        let subject_id = format!("{prefix}{:03}", self.next_subject);
        self.next_subject += 1;
        let dob = self.date_in_year(REFERENCE_YEAR);
        let weight = 18.0 + self.rng.int_n(80) as f64 / 10.0;

        record([
            ("subject_id", Value::Text(subject_id)),
            ("sex", Value::Text(self.pick(&SEXES).to_owned())),
            ("dob", Value::Text(dob.to_string())),
            ("weight_g", Value::Real(weight)),
            ("rig", Value::Text(self.pick(&RIGS).to_owned())),
        ])
    }

    pub fn session(&mut self, subject_id: &str, session: i64) -> Record {
        let day = self.date_in_year(REFERENCE_YEAR + 1);
        let hour = 8 + self.rng.int_n(10);
        record([
            ("subject_id", Value::Text(subject_id.to_owned())),
            ("session", Value::Integer(session)),
            ("session_start", Value::Text(format!("{day} {hour:02}:00:00"))),
        ])
    }

    pub fn probe(&mut self, subject_id: &str, session: i64, probe: i64) -> Record {
        record([
            ("subject_id", Value::Text(subject_id.to_owned())),
            ("session", Value::Integer(session)),
            ("probe", Value::Integer(probe)),
            ("model", Value::Text(self.pick(&PROBE_MODELS).to_owned())),
        ])
    }

    fn pick<'a>(&mut self, values: &'a [&'a str]) -> &'a str {
        values[self.rng.int_n(values.len())]
    }

    fn date_in_year(&mut self, year: i32) -> Date {
        let start = Date::from_calendar_date(year, Month::January, 1)
            .unwrap_or(Date::MIN);
        start + Duration::days(self.rng.int_n(365) as i64)
    }
}

/// Creates the lab fixture schema: `rig`, `subject`, `session` with its
/// part `session__probe`, and a key-less `note` table.
pub fn create_lab_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(include_str!("sql/lab.sql"))
        .context("create lab fixture schema")
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("rowdesk.db");
    Ok((dir, db_path))
}

pub fn table(name: &str) -> TableName {
    TableName::parse(name).unwrap_or_else(|error| panic!("fixture table name: {error}"))
}

pub fn column(name: &str) -> ColumnName {
    ColumnName::parse(name).unwrap_or_else(|error| panic!("fixture column name: {error}"))
}

/// Builds a record from fixture column names.
pub fn record<const N: usize>(fields: [(&str, Value); N]) -> Record {
    fields
        .into_iter()
        .map(|(name, value)| (column(name), value))
        .collect()
}

pub fn text(value: &str) -> Value {
    Value::Text(value.to_owned())
}
