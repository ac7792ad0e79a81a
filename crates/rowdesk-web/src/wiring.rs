// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use rowdesk_app::{
    Descriptor, FormMode, FormState, MessageSlot, RawRecord, Record, TabCommand, TabEvent,
    TabMode, TabState, TableName, Value, blank_form, changed_cells, clean_record,
    delete_message_template, form_from_record, is_stored, is_untouched, mark_stored,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::runtime::TableRuntime;
use crate::tab::{Control, TableTab};
use crate::widgets::REMOVE_FIELD;

/// Browser state posted with an event: the row selection and the current
/// contents of both record modals.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TabInput {
    pub selected: Option<usize>,
    pub add: FormState,
    pub update: FormState,
}

impl TabInput {
    /// Reads `selected`, `add.{row}.{col}`, `update.{row}.{col}`,
    /// `add-part.{table}.{row}.{col}` and `update-part.{table}.{row}.{col}`.
    /// Other fields are ignored.
    pub fn from_fields(fields: &[(String, String)]) -> Result<Self> {
        let mut selected = None;
        let mut add = PostedForm::default();
        let mut update = PostedForm::default();

        for (name, value) in fields {
            if name == "selected" {
                selected = parse_selected(value)?;
                continue;
            }
            let segments = name.split('.').collect::<Vec<_>>();
            match segments.as_slice() {
                [form @ ("add" | "update"), row, column] => {
                    let target = if *form == "add" { &mut add } else { &mut update };
                    target
                        .rows
                        .entry(parse_row(name, row)?)
                        .or_default()
                        .set(*column, value.as_str());
                }
                [form @ ("add-part" | "update-part"), part, row, column] => {
                    let target = if *form == "add-part" {
                        &mut add
                    } else {
                        &mut update
                    };
                    let part = TableName::parse(part)
                        .with_context(|| format!("read posted field `{name}`"))?;
                    let row = parse_row(name, row)?;
                    if *column == REMOVE_FIELD {
                        if !value.is_empty() {
                            target.removed.insert((part, row));
                        }
                    } else {
                        target
                            .parts
                            .entry(part)
                            .or_default()
                            .entry(row)
                            .or_default()
                            .set(*column, value.as_str());
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            selected,
            add: add.into_form(),
            update: update.into_form(),
        })
    }
}

#[derive(Default)]
struct PostedForm {
    rows: BTreeMap<usize, RawRecord>,
    parts: BTreeMap<TableName, BTreeMap<usize, RawRecord>>,
    removed: BTreeSet<(TableName, usize)>,
}

impl PostedForm {
    fn into_form(self) -> FormState {
        let removed = self.removed;
        let parts = self
            .parts
            .into_iter()
            .map(|(part, rows)| {
                let kept = rows
                    .into_iter()
                    .filter(|(row, _)| !removed.contains(&(part.clone(), *row)))
                    .map(|(_, raw)| raw)
                    .collect();
                (part, kept)
            })
            .collect();
        FormState {
            rows: self.rows.into_values().collect(),
            parts,
        }
    }
}

fn parse_selected(value: &str) -> Result<Option<usize>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<usize>()
        .map(Some)
        .with_context(|| format!("selected row {trimmed:?} is not a row index"))
}

fn parse_row(name: &str, row: &str) -> Result<usize> {
    row.parse::<usize>()
        .with_context(|| format!("posted field `{name}` has an invalid row index"))
}

/// Runs one UI event against the tab state. Database failures on writes
/// become message text; configuration errors propagate.
pub fn handle_event(
    tab: &TableTab,
    state: &mut TabState,
    runtime: &mut dyn TableRuntime,
    control: Control,
    input: TabInput,
) -> Result<Vec<TabEvent>> {
    debug!(table = %tab.table(), ?control, mode = ?state.mode, "handling event");
    match control {
        Control::TableSelect => state.dispatch(TabCommand::Select(input.selected)),
        Control::AddButton => {
            if state.mode != TabMode::Idle {
                return Ok(Vec::new());
            }
            let seed = add_seed(tab, state);
            state.dispatch(TabCommand::OpenAdd(seed))
        }
        Control::UpdateButton => {
            let seed = match state.selected_row() {
                Some(row) if state.mode == TabMode::Idle => update_seed(tab, runtime, row)?,
                _ => FormState::default(),
            };
            state.dispatch(TabCommand::OpenUpdate(seed))
        }
        Control::AddConfirm => {
            if state.mode != TabMode::AddModalOpen {
                return Ok(Vec::new());
            }
            let message = insert_form(tab, runtime, &input.add);
            complete(tab, state, runtime, MessageSlot::Add, message)
        }
        Control::UpdateConfirm => {
            if state.mode != TabMode::UpdateModalOpen {
                return Ok(Vec::new());
            }
            let selected_key = state
                .selected_row()
                .map(|row| tab.descriptor().key_of(row))
                .transpose()?;
            let message = update_form(tab, runtime, selected_key.as_ref(), &input.update);
            complete(tab, state, runtime, MessageSlot::Update, message)
        }
        Control::AddClose | Control::UpdateClose => {
            let mut events = state.dispatch(TabCommand::CloseModal)?;
            if !events.is_empty() {
                events.extend(refresh(tab, state, runtime)?);
            }
            Ok(events)
        }
        Control::DeleteButton => state.dispatch(TabCommand::RequestDelete),
        Control::DeleteConfirm => {
            if state.mode != TabMode::DeleteConfirmPending {
                return Ok(Vec::new());
            }
            let Some(row) = state.selected_row().cloned() else {
                return state.dispatch(TabCommand::CancelDelete);
            };
            let message = delete_record(tab, runtime, &row);
            complete(tab, state, runtime, MessageSlot::Delete, message)
        }
        Control::DeleteCancel => state.dispatch(TabCommand::CancelDelete),
    }
}

fn complete(
    tab: &TableTab,
    state: &mut TabState,
    runtime: &mut dyn TableRuntime,
    slot: MessageSlot,
    message: String,
) -> Result<Vec<TabEvent>> {
    let mut events = state.dispatch(TabCommand::Complete { slot, message })?;
    events.extend(refresh(tab, state, runtime)?);
    Ok(events)
}

/// Refetches every row and keeps the selection on the same key.
fn refresh(
    tab: &TableTab,
    state: &mut TabState,
    runtime: &mut dyn TableRuntime,
) -> Result<Vec<TabEvent>> {
    let descriptor = tab.descriptor();
    let previous = state
        .selected_row()
        .and_then(|row| descriptor.key_of(row).ok());
    let rows = runtime
        .fetch_all(tab.table())
        .with_context(|| format!("refresh rows of {}", tab.table()))?;
    let index = previous.and_then(|key| {
        rows.iter()
            .position(|row| row.project(descriptor.primary_key()) == key)
    });

    let mut events = state.dispatch(TabCommand::Refresh(rows))?;
    events.extend(state.dispatch(TabCommand::Select(index))?);
    Ok(events)
}

fn add_seed(tab: &TableTab, state: &TabState) -> FormState {
    let descriptor = tab.descriptor();
    let first = match state.selected_row() {
        Some(row) => form_from_record(row, &[]),
        None => blank_form(descriptor, &[]),
    };
    let mut rows = vec![first];
    rows.extend((1..tab.add_rows()).map(|_| blank_form(descriptor, &[])));

    let parts = tab
        .parts()
        .iter()
        .map(|part| {
            (
                part.table().clone(),
                vec![blank_form(part, descriptor.primary_key())],
            )
        })
        .collect();
    FormState { rows, parts }
}

fn update_seed(
    tab: &TableTab,
    runtime: &mut dyn TableRuntime,
    row: &Record,
) -> Result<FormState> {
    let descriptor = tab.descriptor();
    let key = descriptor.key_of(row)?;
    let excluded = descriptor.primary_key();

    let mut parts = BTreeMap::new();
    for part in tab.parts() {
        let mut rows = runtime
            .fetch_matching(part.table(), &key)?
            .iter()
            .map(|stored| {
                let mut raw = form_from_record(stored, excluded);
                mark_stored(&mut raw);
                raw
            })
            .collect::<Vec<_>>();
        rows.push(blank_form(part, excluded));
        parts.insert(part.table().clone(), rows);
    }
    Ok(FormState {
        rows: vec![form_from_record(row, &[])],
        parts,
    })
}

enum InsertOutcome {
    Inserted(Record),
    Exists(Record),
}

fn insert_form(tab: &TableTab, runtime: &mut dyn TableRuntime, form: &FormState) -> String {
    let descriptor = tab.descriptor();
    let table = tab.table();
    let blank_seed = blank_form(descriptor, &[]);
    let first = form.rows.first().cloned().unwrap_or_default();

    let mut lines = Vec::new();
    let mut master_key = None;
    let extra_rows = form
        .rows
        .iter()
        .skip(1)
        .filter(|raw| !is_untouched(raw, &blank_seed));
    for (index, raw) in std::iter::once(&first).chain(extra_rows).enumerate() {
        match insert_one(descriptor, runtime, raw) {
            Ok(InsertOutcome::Inserted(key)) => {
                lines.push(format!("Successful insertion to {table}."));
                if index == 0 {
                    master_key = Some(key);
                }
            }
            Ok(InsertOutcome::Exists(key)) => {
                lines.push(format!("Warning: record {key} exists in database"));
            }
            Err(error) => {
                warn!(table = %table, error = %format!("{error:#}"), "insert failed");
                lines.push(format!("Error inserting into {table}: {error:#}"));
            }
        }
    }

    // Part rows attach only to a freshly inserted master row.
    if let Some(master_key) = master_key {
        for part in tab.parts() {
            let seed = blank_form(part, descriptor.primary_key());
            let rows = form.parts.get(part.table()).map(Vec::as_slice).unwrap_or(&[]);
            for raw in rows.iter().filter(|raw| !is_untouched(raw, &seed)) {
                let part_table = part.table();
                match insert_part(part, runtime, &master_key, raw) {
                    Ok(()) => lines.push(format!("Successful insertion to {part_table}.")),
                    Err(error) => {
                        warn!(table = %part_table, error = %format!("{error:#}"), "part insert failed");
                        lines.push(format!("Error inserting into {part_table}: {error:#}"));
                    }
                }
            }
        }
    }

    format!(
        "{}\n{}",
        FormMode::Insert.message_template(),
        lines.join("\n")
    )
}

/// Existence is checked with a separate read before the write.
fn insert_one(
    descriptor: &Descriptor,
    runtime: &mut dyn TableRuntime,
    raw: &RawRecord,
) -> Result<InsertOutcome> {
    let record = clean_record(descriptor, raw)?;
    let key = descriptor.key_of(&record)?;
    if runtime.exists(descriptor.table(), &key)? {
        return Ok(InsertOutcome::Exists(key));
    }
    runtime.insert(descriptor.table(), &record)?;
    Ok(InsertOutcome::Inserted(key))
}

fn insert_part(
    part: &Descriptor,
    runtime: &mut dyn TableRuntime,
    master_key: &Record,
    raw: &RawRecord,
) -> Result<()> {
    let mut record = clean_record(part, raw)?;
    record.merge(master_key);
    // Reject rows missing a part key column before touching the store.
    let _key = part.key_of(&record)?;
    runtime.insert(part.table(), &record)
}

fn update_form(
    tab: &TableTab,
    runtime: &mut dyn TableRuntime,
    selected_key: Option<&Record>,
    form: &FormState,
) -> String {
    let lines = match apply_update(tab, runtime, selected_key, form) {
        Ok(lines) => lines,
        Err(error) => {
            warn!(table = %tab.table(), error = %format!("{error:#}"), "update failed");
            vec![format!("Error updating {}: {error:#}", tab.table())]
        }
    };
    format!(
        "{}\n{}",
        FormMode::Update.message_template(),
        lines.join("\n")
    )
}

/// One single-column update per changed field, then part reconciliation.
/// Posted text is compared with the text the stored row seeds, so only cells
/// the user edited are coerced and written. A failed column does not stop
/// the remaining ones.
fn apply_update(
    tab: &TableTab,
    runtime: &mut dyn TableRuntime,
    selected_key: Option<&Record>,
    form: &FormState,
) -> Result<Vec<String>> {
    let descriptor = tab.descriptor();
    let table = tab.table();
    let raw = form.rows.first().cloned().unwrap_or_default();
    let key = match selected_key {
        Some(key) => key.clone(),
        None => descriptor.key_of(&clean_record(descriptor, &raw)?)?,
    };

    let Some(stored) = runtime.fetch_matching(table, &key)?.into_iter().next() else {
        return Ok(vec![format!("Warning: record {key} does not exist in database")]);
    };
    let seeded = form_from_record(&stored, &[]);
    for column in descriptor.primary_key() {
        let name = column.as_str();
        if raw.contains(name) && raw.get(name).trim() != seeded.get(name).trim() {
            bail!(
                "record key changed from {key}: `{column}` posted as {:?}; primary key columns are read-only",
                raw.get(name)
            );
        }
    }
    let changes = changed_cells(descriptor, &raw, &seeded)?;

    let mut lines = Vec::new();
    for (column, value) in changes.iter() {
        let old = stored.get(column).cloned().unwrap_or(Value::Null);
        if old == *value {
            continue;
        }
        match runtime.update_field(table, &key, column, value) {
            Ok(_) => lines.push(format!(
                "Successfully updated field {column} from {} to {}!",
                old.literal(),
                value.literal()
            )),
            Err(error) => {
                warn!(table = %table, column = %column, error = %format!("{error:#}"), "field update failed");
                lines.push(format!("Error updating field {column}: {error:#}"));
            }
        }
    }

    for part in tab.parts() {
        let rows = form.parts.get(part.table()).map(Vec::as_slice).unwrap_or(&[]);
        lines.extend(reconcile_part(descriptor, part, runtime, &key, rows));
    }

    if lines.is_empty() {
        lines.push(format!("Nothing to update for record {key}."));
    }
    Ok(lines)
}

/// Inserts new part rows, updates changed ones, and deletes stored rows the
/// form no longer lists. Rows seeded from the store are never filtered as
/// untouched. Deletion is skipped when any posted row has an unreadable key.
fn reconcile_part(
    master: &Descriptor,
    part: &Descriptor,
    runtime: &mut dyn TableRuntime,
    master_key: &Record,
    rows: &[RawRecord],
) -> Vec<String> {
    let table = part.table();
    let stored = match runtime.fetch_matching(table, master_key) {
        Ok(stored) => stored,
        Err(error) => return vec![format!("Error reading {table}: {error:#}")],
    };

    let seed = blank_form(part, master.primary_key());
    let mut lines = Vec::new();
    let mut kept = Vec::new();
    let mut keys_complete = true;

    for raw in rows
        .iter()
        .filter(|raw| is_stored(raw) || !is_untouched(raw, &seed))
    {
        let matched = stored
            .iter()
            .find(|row| key_text_matches(master, part, row, raw));
        let (key, outcome) = match matched {
            Some(existing) => {
                let key = existing.project(part.primary_key());
                let seeded = form_from_record(existing, master.primary_key());
                let outcome = update_part_row(part, runtime, &key, existing, &seeded, raw);
                (key, outcome)
            }
            None => {
                let mut record = match clean_record(part, raw) {
                    Ok(record) => record,
                    Err(error) => {
                        keys_complete = false;
                        lines.push(format!("Error updating {table}: {error:#}"));
                        continue;
                    }
                };
                record.merge(master_key);
                let key = match part.key_of(&record) {
                    Ok(key) => key,
                    Err(error) => {
                        keys_complete = false;
                        lines.push(format!("Error updating {table}: {error:#}"));
                        continue;
                    }
                };
                let existing = stored
                    .iter()
                    .find(|row| row.project(part.primary_key()) == key);
                let outcome = match existing {
                    None => runtime
                        .insert(table, &record)
                        .map(|()| Some(format!("Inserted {table} record {key}."))),
                    Some(existing) => {
                        let seeded = form_from_record(existing, master.primary_key());
                        update_part_row(part, runtime, &key, existing, &seeded, raw)
                    }
                };
                (key, outcome)
            }
        };
        kept.push(key.clone());

        match outcome {
            Ok(Some(line)) => lines.push(line),
            Ok(None) => {}
            Err(error) => {
                warn!(table = %table, key = %key, error = %format!("{error:#}"), "part update failed");
                lines.push(format!("Error updating {table} record {key}: {error:#}"));
            }
        }
    }

    if keys_complete {
        for row in &stored {
            let key = row.project(part.primary_key());
            if kept.contains(&key) {
                continue;
            }
            match runtime.delete(table, &key) {
                Ok(_) => lines.push(format!("Deleted {table} record {key}.")),
                Err(error) => {
                    warn!(table = %table, key = %key, error = %format!("{error:#}"), "part delete failed");
                    lines.push(format!("Error deleting {table} record {key}: {error:#}"));
                }
            }
        }
    }
    lines
}

/// True when the posted part key cells read exactly as `stored` seeds them.
fn key_text_matches(
    master: &Descriptor,
    part: &Descriptor,
    stored: &Record,
    raw: &RawRecord,
) -> bool {
    let seeded = form_from_record(stored, master.primary_key());
    part.primary_key()
        .iter()
        .filter(|column| !master.is_primary(column))
        .all(|column| raw.get(column.as_str()).trim() == seeded.get(column.as_str()).trim())
}

fn update_part_row(
    part: &Descriptor,
    runtime: &mut dyn TableRuntime,
    key: &Record,
    existing: &Record,
    seeded: &RawRecord,
    raw: &RawRecord,
) -> Result<Option<String>> {
    let changes = changed_cells(part, raw, seeded)?;
    let mut changed = Vec::new();
    for (column, value) in changes.iter() {
        if existing.get(column) == Some(value) {
            continue;
        }
        runtime.update_field(part.table(), key, column, value)?;
        changed.push(column.to_string());
    }
    if changed.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!(
        "Updated {} record {key}: {}.",
        part.table(),
        changed.join(", ")
    )))
}

/// Part rows go first, then the master row.
fn delete_record(tab: &TableTab, runtime: &mut dyn TableRuntime, row: &Record) -> String {
    let template = delete_message_template(tab.table());
    let key = match tab.descriptor().key_of(row) {
        Ok(key) => key,
        Err(error) => return format!("{template}\nError in deleting record {row}: {error:#}."),
    };
    match delete_with_parts(tab, runtime, &key) {
        Ok(()) => format!("{template}\nSuccessfully deleted record {key}!"),
        Err(error) => {
            warn!(table = %tab.table(), key = %key, error = %format!("{error:#}"), "delete failed");
            format!("{template}\nError in deleting record {key}: {error:#}.")
        }
    }
}

fn delete_with_parts(tab: &TableTab, runtime: &mut dyn TableRuntime, key: &Record) -> Result<()> {
    for part in tab.parts() {
        runtime.delete(part.table(), key)?;
    }
    if runtime.delete(tab.table(), key)? == 0 {
        bail!("record no longer exists");
    }
    Ok(())
}
