// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use rowdesk_web::{EventRegistry, TableRuntime, TableTab};
use tracing::{info, warn};

use crate::config::{Config, TabConfig};
use crate::runtime::DbRuntime;

/// Reflects every `[[tabs]]` table into a tab sharing one event registry.
/// Without `[[tabs]]` each master table with a primary key gets a tab.
pub fn assemble_tabs(
    runtime: &mut DbRuntime,
    config: &Config,
) -> Result<(Vec<TableTab>, EventRegistry)> {
    let entries = if config.tabs.is_empty() {
        discovered_tabs(runtime)?
    } else {
        config.tabs.clone()
    };

    let mut registry = EventRegistry::new();
    let mut tabs = Vec::with_capacity(entries.len());
    for entry in &entries {
        let tab = build_tab(runtime, config, entry, &mut registry)
            .with_context(|| format!("build tab for table {:?}", entry.table))?;
        info!(
            table = %tab.table(),
            parts = tab.parts().len(),
            filters = tab.filter_fields().len(),
            "tab ready"
        );
        tabs.push(tab);
    }
    Ok((tabs, registry))
}

fn discovered_tabs(runtime: &DbRuntime) -> Result<Vec<TabConfig>> {
    let store = runtime.store();
    let mut entries = Vec::new();
    for table in store.master_tables()? {
        if store.primary_key_columns(&table)?.is_empty() {
            warn!(table = %table, "skipping table without a primary key");
            continue;
        }
        entries.push(TabConfig {
            table: table.to_string(),
            include_parts: None,
            excluded_fields: Vec::new(),
            filter_fields: None,
            add_rows: None,
        });
    }
    Ok(entries)
}

fn build_tab(
    runtime: &mut DbRuntime,
    config: &Config,
    entry: &TabConfig,
    registry: &mut EventRegistry,
) -> Result<TableTab> {
    let table = entry.table_name()?;
    let descriptor = runtime.reflect(&table)?;
    let parts = if entry.include_parts() {
        descriptor
            .parts()
            .iter()
            .map(|part| runtime.reflect(part))
            .collect::<Result<Vec<_>>>()?
    } else {
        Vec::new()
    };

    let mut style = config.grid_style();
    style.excluded_fields = entry.excluded_fields()?;
    let tab = TableTab::new(descriptor, parts, style, registry)?.with_add_rows(entry.add_rows());
    match entry.filter_fields()? {
        Some(fields) => tab.with_filter_fields(fields),
        None => Ok(tab),
    }
}

#[cfg(test)]
mod tests {
    use super::assemble_tabs;
    use crate::config::Config;
    use crate::runtime::DbRuntime;
    use anyhow::Result;
    use rowdesk_db::Store;
    use rowdesk_testkit::{column, create_lab_schema, record, table, text};
    use rowdesk_web::{AppState, SharedRuntime, TableRuntime};
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    fn lab_runtime() -> Result<DbRuntime> {
        let store = Store::open_memory()?;
        create_lab_schema(store.raw_connection())?;
        Ok(DbRuntime::new(store))
    }

    fn config(toml_text: &str) -> Result<Config> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, toml_text)?;
        Config::load(&path)
    }

    fn posted(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[test]
    fn unconfigured_database_gets_a_tab_per_keyed_master_table() -> Result<()> {
        let mut runtime = lab_runtime()?;
        let (tabs, registry) = assemble_tabs(&mut runtime, &Config::default())?;

        let names = tabs
            .iter()
            .map(|tab| tab.table().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["rig", "session", "subject"]);
        let session = &tabs[1];
        assert_eq!(session.parts().len(), 1);
        assert_eq!(session.parts()[0].table(), &table("session__probe"));
        assert_eq!(tabs[2].filter_fields(), &[column("rig")]);
        assert_eq!(registry.len(), 30);
        Ok(())
    }

    #[test]
    fn configured_tabs_apply_their_options() -> Result<()> {
        let mut runtime = lab_runtime()?;
        let config = config(
            "version = 1\n[ui]\npage_size = 5\n[[tabs]]\ntable = \"session\"\ninclude_parts = false\nadd_rows = 2\n[[tabs]]\ntable = \"subject\"\nexcluded_fields = [\"dob\"]\nfilter_fields = [\"sex\", \"rig\"]\n",
        )?;
        let (tabs, _registry) = assemble_tabs(&mut runtime, &config)?;

        assert_eq!(tabs.len(), 2);
        assert!(tabs[0].parts().is_empty());
        assert_eq!(tabs[0].add_rows(), 2);
        assert_eq!(tabs[1].style().page_size, 5);
        assert_eq!(tabs[1].style().excluded_fields, vec![column("dob")]);
        assert_eq!(tabs[1].filter_fields(), &[column("sex"), column("rig")]);
        Ok(())
    }

    #[test]
    fn configuration_errors_name_the_table() -> Result<()> {
        for (toml_text, expected) in [
            ("version = 1\n[[tabs]]\ntable = \"animal\"\n", "does not exist"),
            ("version = 1\n[[tabs]]\ntable = \"note\"\n", "no primary key"),
            (
                "version = 1\n[[tabs]]\ntable = \"subject\"\nexcluded_fields = [\"mass\"]\n",
                "excluded field `mass`",
            ),
            (
                "version = 1\n[[tabs]]\ntable = \"subject\"\nfilter_fields = [\"mass\"]\n",
                "filter field `mass`",
            ),
        ] {
            let mut runtime = lab_runtime()?;
            let error = assemble_tabs(&mut runtime, &config(toml_text)?)
                .expect_err("bad tab config should fail");
            let message = format!("{error:#}");
            assert!(message.contains("build tab for table"), "got {message}");
            assert!(message.contains(expected), "got {message}");
        }
        Ok(())
    }

    #[test]
    fn posted_events_write_through_to_the_database() -> Result<()> {
        let mut runtime = lab_runtime()?;
        let (tabs, registry) = assemble_tabs(&mut runtime, &Config::default())?;
        let shared = Arc::new(Mutex::new(runtime));
        let dyn_runtime: SharedRuntime = shared.clone();
        let state = AppState::new("rowdesk", dyn_runtime, tabs, registry)?;
        let session = Uuid::new_v4();

        state.post_event(session, "rig", &posted(&[("trigger", "add-rig-button")]))?;
        state.post_event(
            session,
            "rig",
            &posted(&[
                ("trigger", "add-rig-confirm"),
                ("add.0.rig", "rig-c"),
                ("add.0.room", "B103"),
            ]),
        )?;
        let page = state.render_tab(session, "rig", &[])?;
        assert!(page.contains("<td>rig-c</td>"));
        assert!(page.contains("Successful insertion to rig."));

        state.post_event(
            session,
            "rig",
            &posted(&[("trigger", "rig-table"), ("selected", "2")]),
        )?;
        state.post_event(session, "rig", &posted(&[("trigger", "delete-rig-button")]))?;
        state.post_event(session, "rig", &posted(&[("trigger", "delete-rig-confirm")]))?;

        let mut guard = shared
            .lock()
            .map_err(|_| anyhow::anyhow!("runtime lock poisoned"))?;
        let rooms = guard
            .fetch_all(&table("rig"))?
            .iter()
            .filter_map(|row| row.get(&column("room")).cloned())
            .collect::<Vec<_>>();
        assert_eq!(rooms, vec![text("B101"), text("B102")]);
        Ok(())
    }

    #[test]
    fn rig_added_after_startup_survives_a_subject_update() -> Result<()> {
        let mut runtime = lab_runtime()?;
        let (tabs, registry) = assemble_tabs(&mut runtime, &Config::default())?;
        runtime.insert(
            &table("rig"),
            &record([("rig", text("rig-c")), ("room", text("B103"))]),
        )?;
        runtime.insert(
            &table("subject"),
            &record([
                ("subject_id", text("S1")),
                ("sex", text("M")),
                ("rig", text("rig-c")),
            ]),
        )?;
        let shared = Arc::new(Mutex::new(runtime));
        let dyn_runtime: SharedRuntime = shared.clone();
        let state = AppState::new("rowdesk", dyn_runtime, tabs, registry)?;
        let session = Uuid::new_v4();

        state.post_event(
            session,
            "subject",
            &posted(&[("trigger", "subject-table"), ("selected", "0")]),
        )?;
        state.post_event(
            session,
            "subject",
            &posted(&[("trigger", "update-subject-button")]),
        )?;
        let page = state.render_tab(session, "subject", &[])?;
        assert!(page.contains(r#"<option value="rig-c" selected>rig-c</option>"#));

        state.post_event(
            session,
            "subject",
            &posted(&[
                ("trigger", "update-subject-confirm"),
                ("update.0.subject_id", "S1"),
                ("update.0.sex", "F"),
                ("update.0.dob", ""),
                ("update.0.weight_g", ""),
                ("update.0.rig", "rig-c"),
            ]),
        )?;

        let mut guard = shared
            .lock()
            .map_err(|_| anyhow::anyhow!("runtime lock poisoned"))?;
        let stored = guard.fetch_all(&table("subject"))?;
        assert_eq!(stored[0].get(&column("sex")), Some(&text("F")));
        assert_eq!(stored[0].get(&column("rig")), Some(&text("rig-c")));
        Ok(())
    }
}
