// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};

use crate::column::ColumnName;
use crate::model::{RawRecord, Record, Value};
use crate::schema::Descriptor;
use crate::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Insert,
    Update,
}

impl FormMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "add",
            Self::Update => "update",
        }
    }

    pub const fn message_template(self) -> &'static str {
        match self {
            Self::Insert => "Add message:",
            Self::Update => "Update message:",
        }
    }
}

/// One form row seeded with the column defaults, minus `excluded` columns.
pub fn blank_form(descriptor: &Descriptor, excluded: &[ColumnName]) -> RawRecord {
    let mut raw = RawRecord::new();
    for column in descriptor.columns() {
        if excluded.contains(&column.name) {
            continue;
        }
        raw.set(column.name.as_str(), column.default.display_text());
    }
    raw
}

pub fn form_from_record(record: &Record, excluded: &[ColumnName]) -> RawRecord {
    let mut raw = RawRecord::new();
    for (column, value) in record.iter() {
        if excluded.contains(column) {
            continue;
        }
        raw.set(column.as_str(), value.display_text());
    }
    raw
}

/// Drops blank cells, rejects unknown columns, and coerces the rest by
/// column affinity. The result follows the descriptor's column order.
pub fn clean_record(descriptor: &Descriptor, raw: &RawRecord) -> Result<Record> {
    reject_unknown_columns(descriptor, raw)?;
    let mut record = Record::new();
    for spec in descriptor.columns() {
        let input = raw.get(spec.name.as_str());
        if input.trim().is_empty() {
            continue;
        }
        let value = validation::coerce(spec.affinity, input)
            .map_err(|error| anyhow::anyhow!("column `{}`: {error}", spec.name))?;
        record.insert(spec.name.clone(), value);
    }
    Ok(record)
}

/// Hidden form field marking a part row that was seeded from a stored row.
pub const STORED_FIELD: &str = "_stored";

pub fn mark_stored(raw: &mut RawRecord) {
    raw.set(STORED_FIELD, "1");
}

pub fn is_stored(raw: &RawRecord) -> bool {
    !raw.get(STORED_FIELD).is_empty()
}

/// Non-key cells whose posted text differs from `seeded`, coerced by column
/// affinity. A cell changed to blank becomes NULL so an update can clear it.
/// Unchanged cells are never coerced.
pub fn changed_cells(
    descriptor: &Descriptor,
    raw: &RawRecord,
    seeded: &RawRecord,
) -> Result<Record> {
    reject_unknown_columns(descriptor, raw)?;
    let mut record = Record::new();
    for spec in descriptor.non_key_columns() {
        let name = spec.name.as_str();
        if !raw.contains(name) || raw.get(name) == seeded.get(name) {
            continue;
        }
        let input = raw.get(name);
        let value = if input.trim().is_empty() {
            Value::Null
        } else {
            validation::coerce(spec.affinity, input)
                .map_err(|error| anyhow::anyhow!("column `{}`: {error}", spec.name))?
        };
        record.insert(spec.name.clone(), value);
    }
    Ok(record)
}

/// Rows left exactly as seeded, or left empty, carry no user input.
pub fn is_untouched(raw: &RawRecord, seed: &RawRecord) -> bool {
    raw.is_blank() || raw == seed
}

fn reject_unknown_columns(descriptor: &Descriptor, raw: &RawRecord) -> Result<()> {
    for (column, value) in raw.iter() {
        if column != STORED_FIELD
            && !value.trim().is_empty()
            && descriptor.column(column).is_none()
        {
            bail!(
                "column `{column}` is not part of `{}`",
                descriptor.table()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        FormMode, blank_form, changed_cells, clean_record, form_from_record, is_stored,
        is_untouched, mark_stored,
    };
    use crate::{
        ColumnAffinity, ColumnName, ColumnSpec, Descriptor, RawRecord, Record, TableName, Value,
    };

    fn column(name: &str) -> ColumnName {
        ColumnName::parse(name).expect("valid column")
    }

    fn session() -> Descriptor {
        let spec = |name: &str, declared: &str, default: Value| ColumnSpec {
            name: column(name),
            declared_type: declared.to_owned(),
            affinity: ColumnAffinity::from_declared_type(declared),
            not_null: false,
            default,
            references: None,
        };
        Descriptor::new(
            TableName::parse("session").expect("valid table"),
            vec![
                spec("subject_id", "TEXT", Value::Null),
                spec("session", "INTEGER", Value::Null),
                spec("rig", "TEXT", Value::Text("rig-a".to_owned())),
                spec("start", "DATETIME", Value::Null),
            ],
            vec![column("subject_id"), column("session")],
        )
        .expect("valid descriptor")
    }

    #[test]
    fn blank_form_uses_defaults_and_skips_excluded() {
        let raw = blank_form(&session(), &[column("subject_id")]);
        assert_eq!(raw.get("rig"), "rig-a");
        assert_eq!(raw.get("session"), "");
        assert!(raw.iter().all(|(name, _)| name != "subject_id"));
    }

    #[test]
    fn clean_record_strips_blank_and_coerces() -> anyhow::Result<()> {
        let mut raw = RawRecord::new();
        raw.set("subject_id", "S1");
        raw.set("session", " 2 ");
        raw.set("rig", "");
        raw.set("start", "2021-03-04T10:00:00");

        let record = clean_record(&session(), &raw)?;
        assert_eq!(
            record.to_string(),
            "{'subject_id': 'S1', 'session': 2, 'start': '2021-03-04 10:00:00'}"
        );
        Ok(())
    }

    #[test]
    fn clean_record_names_failing_column() {
        let mut raw = RawRecord::new();
        raw.set("session", "two");
        let error = clean_record(&session(), &raw).expect_err("bad int should fail");
        let message = error.to_string();
        assert!(message.contains("column `session`"), "{message}");
        assert!(message.contains("invalid integer"), "{message}");
    }

    #[test]
    fn clean_record_rejects_unknown_non_blank_column() {
        let mut raw = RawRecord::new();
        raw.set("bogus", "1");
        assert!(clean_record(&session(), &raw).is_err());

        let mut blank_unknown = RawRecord::new();
        blank_unknown.set("bogus", "");
        assert!(clean_record(&session(), &blank_unknown).is_ok());
    }

    #[test]
    fn form_from_record_renders_display_text() {
        let record: Record = [
            (column("subject_id"), Value::Text("S1".to_owned())),
            (column("session"), Value::Integer(4)),
            (column("rig"), Value::Null),
        ]
        .into_iter()
        .collect();
        let raw = form_from_record(&record, &[]);
        assert_eq!(raw.get("session"), "4");
        assert_eq!(raw.get("rig"), "");
    }

    #[test]
    fn changed_cells_skips_text_matching_the_seed() -> anyhow::Result<()> {
        let mut seeded = RawRecord::new();
        seeded.set("subject_id", "S1");
        seeded.set("session", "1");
        seeded.set("rig", "rig-c");
        seeded.set("start", "2021-03-04T10:00");

        let mut raw = seeded.clone();
        raw.set("rig", "");
        assert_eq!(
            changed_cells(&session(), &raw, &seeded)?.to_string(),
            "{'rig': None}"
        );

        let mut raw = seeded.clone();
        raw.set("start", "2021-03-05");
        assert_eq!(
            changed_cells(&session(), &raw, &seeded)?.to_string(),
            "{'start': '2021-03-05 00:00:00'}"
        );

        assert!(changed_cells(&session(), &seeded, &seeded)?.is_empty());
        Ok(())
    }

    #[test]
    fn changed_cells_never_coerces_untouched_cells() -> anyhow::Result<()> {
        let mut seeded = RawRecord::new();
        seeded.set("start", "last tuesday");
        seeded.set("rig", "rig-a");
        let mut raw = seeded.clone();
        raw.set("rig", "rig-b");

        let record = changed_cells(&session(), &raw, &seeded)?;
        assert_eq!(record.to_string(), "{'rig': 'rig-b'}");

        raw.set("start", "next tuesday");
        let error = changed_cells(&session(), &raw, &seeded).expect_err("edited bad datetime");
        assert!(error.to_string().contains("column `start`"));
        Ok(())
    }

    #[test]
    fn stored_marker_is_not_a_column() -> anyhow::Result<()> {
        let mut raw = RawRecord::new();
        raw.set("subject_id", "S1");
        assert!(!is_stored(&raw));
        mark_stored(&mut raw);
        assert!(is_stored(&raw));
        assert_eq!(clean_record(&session(), &raw)?.to_string(), "{'subject_id': 'S1'}");
        Ok(())
    }

    #[test]
    fn untouched_rows_match_seed_or_are_blank() {
        let seed = blank_form(&session(), &[]);
        assert!(is_untouched(&seed, &seed));
        assert!(is_untouched(&RawRecord::new(), &seed));

        let mut edited = seed.clone();
        edited.set("session", "3");
        assert!(!is_untouched(&edited, &seed));
    }

    #[test]
    fn message_templates() {
        assert_eq!(FormMode::Insert.message_template(), "Add message:");
        assert_eq!(FormMode::Update.message_template(), "Update message:");
    }
}
