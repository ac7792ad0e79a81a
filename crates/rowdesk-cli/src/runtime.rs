// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use rowdesk_app::{ColumnName, Descriptor, Record, TableName, Value};
use rowdesk_db::Store;
use rowdesk_web::TableRuntime;

/// [`TableRuntime`] over an owned SQLite store.
pub struct DbRuntime {
    store: Store,
}

impl DbRuntime {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl TableRuntime for DbRuntime {
    fn reflect(&mut self, table: &TableName) -> Result<Descriptor> {
        self.store.reflect(table)
    }

    fn fetch_all(&mut self, table: &TableName) -> Result<Vec<Record>> {
        self.store.fetch_all(table)
    }

    fn fetch_matching(&mut self, table: &TableName, key: &Record) -> Result<Vec<Record>> {
        self.store.fetch_matching(table, key)
    }

    fn exists(&mut self, table: &TableName, key: &Record) -> Result<bool> {
        self.store.exists(table, key)
    }

    fn insert(&mut self, table: &TableName, record: &Record) -> Result<()> {
        self.store.insert(table, record)
    }

    fn update_field(
        &mut self,
        table: &TableName,
        key: &Record,
        column: &ColumnName,
        value: &Value,
    ) -> Result<usize> {
        self.store.update_field(table, key, column, value)
    }

    fn delete(&mut self, table: &TableName, key: &Record) -> Result<usize> {
        self.store.delete(table, key)
    }

    fn distinct_values(&mut self, table: &TableName, column: &ColumnName) -> Result<Vec<Value>> {
        self.store.distinct_values(table, column)
    }
}

#[cfg(test)]
mod tests {
    use super::DbRuntime;
    use anyhow::Result;
    use rowdesk_app::{TabMode, Value};
    use rowdesk_db::Store;
    use rowdesk_testkit::{LabFaker, column, create_lab_schema, record, table, text};
    use rowdesk_web::{
        Control, EventRegistry, GridStyle, TabInput, TableRuntime, TableTab, handle_event,
    };

    fn lab_runtime() -> Result<DbRuntime> {
        let store = Store::open_memory()?;
        create_lab_schema(store.raw_connection())?;
        Ok(DbRuntime::new(store))
    }

    fn fields(pairs: &[(&str, &str)]) -> Result<TabInput> {
        let fields = pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect::<Vec<_>>();
        TabInput::from_fields(&fields)
    }

    #[test]
    fn runtime_round_trips_through_the_store() -> Result<()> {
        let mut runtime = lab_runtime()?;
        let subject = LabFaker::new(7).subject();
        let subject_id = subject
            .get_by_name("subject_id")
            .cloned()
            .unwrap_or(Value::Null);
        let key = record([("subject_id", subject_id)]);

        runtime.insert(&table("subject"), &subject)?;
        assert!(runtime.exists(&table("subject"), &key)?);
        assert_eq!(runtime.fetch_matching(&table("subject"), &key)?.len(), 1);
        assert_eq!(
            runtime.update_field(&table("subject"), &key, &column("sex"), &text("F"))?,
            1
        );
        assert_eq!(runtime.delete(&table("subject"), &key)?, 1);
        assert!(runtime.fetch_all(&table("subject"))?.is_empty());
        Ok(())
    }

    #[test]
    fn subject_tab_inserts_then_warns_on_duplicate() -> Result<()> {
        let mut runtime = lab_runtime()?;
        let descriptor = runtime.reflect(&table("subject"))?;
        let mut registry = EventRegistry::new();
        let tab = TableTab::new(descriptor, Vec::new(), GridStyle::default(), &mut registry)?;
        let mut state = tab.initial_state(&mut runtime)?;
        let form = [
            ("add.0.subject_id", "S1"),
            ("add.0.sex", "M"),
            ("add.0.dob", "2020-01-01"),
            ("add.0.rig", "rig-a"),
        ];

        for _ in 0..2 {
            handle_event(&tab, &mut state, &mut runtime, Control::AddButton, fields(&[])?)?;
            handle_event(&tab, &mut state, &mut runtime, Control::AddConfirm, fields(&form)?)?;
        }
        assert_eq!(state.mode, TabMode::Idle);
        assert_eq!(
            state.add_message,
            "Add message:\nWarning: record {'subject_id': 'S1'} exists in database"
        );
        assert_eq!(state.rows.len(), 1);
        assert_eq!(state.rows[0].get_by_name("dob"), Some(&text("2020-01-01")));
        Ok(())
    }

    #[test]
    fn constraint_failures_surface_as_messages() -> Result<()> {
        let mut runtime = lab_runtime()?;
        let descriptor = runtime.reflect(&table("subject"))?;
        let mut registry = EventRegistry::new();
        let tab = TableTab::new(descriptor, Vec::new(), GridStyle::default(), &mut registry)?;
        let mut state = tab.initial_state(&mut runtime)?;

        handle_event(&tab, &mut state, &mut runtime, Control::AddButton, fields(&[])?)?;
        handle_event(
            &tab,
            &mut state,
            &mut runtime,
            Control::AddConfirm,
            fields(&[("add.0.subject_id", "S2"), ("add.0.rig", "rig-z")])?,
        )?;
        assert!(
            state
                .add_message
                .starts_with("Add message:\nError inserting into subject:"),
            "got {}",
            state.add_message
        );
        assert!(state.add_message.contains("FOREIGN KEY"));
        assert!(state.rows.is_empty());
        Ok(())
    }

    #[test]
    fn session_delete_takes_its_probes_along() -> Result<()> {
        let mut runtime = lab_runtime()?;
        let mut faker = LabFaker::new(3);
        let subject = faker.subject();
        let subject_id = subject
            .get_by_name("subject_id")
            .map(Value::display_text)
            .unwrap_or_default();
        runtime.insert(&table("subject"), &subject)?;
        runtime.insert(&table("session"), &faker.session(&subject_id, 1))?;
        runtime.insert(&table("session__probe"), &faker.probe(&subject_id, 1, 0))?;
        runtime.insert(&table("session__probe"), &faker.probe(&subject_id, 1, 1))?;

        let descriptor = runtime.reflect(&table("session"))?;
        let parts = descriptor
            .parts()
            .iter()
            .map(|part| runtime.reflect(part))
            .collect::<Result<Vec<_>>>()?;
        let mut registry = EventRegistry::new();
        let tab = TableTab::new(descriptor, parts, GridStyle::default(), &mut registry)?;
        let mut state = tab.initial_state(&mut runtime)?;

        for (control, pairs) in [
            (Control::TableSelect, &[("selected", "0")][..]),
            (Control::DeleteButton, &[][..]),
            (Control::DeleteConfirm, &[][..]),
        ] {
            handle_event(&tab, &mut state, &mut runtime, control, fields(pairs)?)?;
        }

        assert!(
            state.delete_message.contains("Successfully deleted record"),
            "got {}",
            state.delete_message
        );
        assert!(runtime.fetch_all(&table("session__probe"))?.is_empty());
        assert!(runtime.fetch_all(&table("session"))?.is_empty());
        assert_eq!(runtime.store().fetch_all(&table("subject"))?.len(), 1);
        Ok(())
    }
}
