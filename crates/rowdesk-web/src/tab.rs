// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use rowdesk_app::{
    ColumnName, Descriptor, FormMode, MessageSlot, TabMode, TabState, TableName, Value,
};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::runtime::TableRuntime;
use crate::widgets::{
    Button, ConfirmDialog, DisplayGrid, EditGrid, FilterDropdown, GridStyle, RecordModal,
};

/// Every trigger a tab registers, one control id each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Control {
    AddButton,
    AddConfirm,
    AddClose,
    UpdateButton,
    UpdateConfirm,
    UpdateClose,
    DeleteButton,
    DeleteConfirm,
    DeleteCancel,
    TableSelect,
}

impl Control {
    pub const ALL: [Self; 10] = [
        Self::AddButton,
        Self::AddConfirm,
        Self::AddClose,
        Self::UpdateButton,
        Self::UpdateConfirm,
        Self::UpdateClose,
        Self::DeleteButton,
        Self::DeleteConfirm,
        Self::DeleteCancel,
        Self::TableSelect,
    ];

    /// `{action}-{table}-{role}`, e.g. `add-subject-confirm`.
    pub fn control_id(self, table: &TableName) -> String {
        match self {
            Self::AddButton => format!("add-{table}-button"),
            Self::AddConfirm => format!("add-{table}-confirm"),
            Self::AddClose => format!("add-{table}-close"),
            Self::UpdateButton => format!("update-{table}-button"),
            Self::UpdateConfirm => format!("update-{table}-confirm"),
            Self::UpdateClose => format!("update-{table}-close"),
            Self::DeleteButton => format!("delete-{table}-button"),
            Self::DeleteConfirm => format!("delete-{table}-confirm"),
            Self::DeleteCancel => format!("delete-{table}-cancel"),
            Self::TableSelect => format!("{table}-table"),
        }
    }
}

/// Maps posted control ids to the tab and control that own them. Passed
/// explicitly into each tab constructor.
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    routes: BTreeMap<String, (TableName, Control)>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: String, table: &TableName, control: Control) -> Result<()> {
        if let Some((owner, _)) = self.routes.get(&id) {
            bail!(
                "control id `{id}` is already registered by tab `{owner}` -- each table may have only one tab"
            );
        }
        self.routes.insert(id, (table.clone(), control));
        Ok(())
    }

    pub fn resolve(&self, id: &str) -> Option<(&TableName, Control)> {
        self.routes.get(id).map(|(table, control)| (table, *control))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Dropdown choices read fresh for one render: the filter dropdowns above
/// the grid and the foreign-key selects of each edit grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DropdownOptions {
    pub filters: BTreeMap<ColumnName, Vec<Value>>,
    pub edits: BTreeMap<TableName, BTreeMap<ColumnName, Vec<Value>>>,
}

/// Everything the page template needs to draw one tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabLayout {
    pub table: String,
    pub title: String,
    pub events_href: String,
    pub select_trigger: String,
    pub add_button: Button,
    pub update_button: Button,
    pub delete_button: Button,
    pub delete_message: String,
    pub grid: DisplayGrid,
    pub filters: Vec<FilterDropdown>,
    pub add_modal: RecordModal,
    pub update_modal: RecordModal,
    pub delete_confirm: ConfirmDialog,
}

/// One table's widget set: descriptors, style and registered controls.
/// Purely structural; per-session state lives in [`TabState`].
#[derive(Debug, Clone)]
pub struct TableTab {
    descriptor: Descriptor,
    parts: Vec<Descriptor>,
    style: GridStyle,
    filter_fields: Vec<ColumnName>,
    add_rows: usize,
}

impl TableTab {
    pub fn new(
        descriptor: Descriptor,
        parts: Vec<Descriptor>,
        style: GridStyle,
        registry: &mut EventRegistry,
    ) -> Result<Self> {
        let table = descriptor.table().clone();
        for excluded in &style.excluded_fields {
            if descriptor.column(excluded.as_str()).is_none() {
                bail!("excluded field `{excluded}` is not a column of `{table}`");
            }
        }
        for part in &parts {
            if let Some(missing) = descriptor
                .primary_key()
                .iter()
                .find(|key| !part.is_primary(key))
            {
                bail!(
                    "`{}` cannot be a part of `{table}`: its key lacks `{missing}`",
                    part.table()
                );
            }
        }
        for control in Control::ALL {
            registry.register(control.control_id(&table), &table, control)?;
        }

        let filter_fields = descriptor.dropdown_fields().cloned().collect();
        Ok(Self {
            descriptor,
            parts,
            style,
            filter_fields,
            add_rows: 1,
        })
    }

    /// Fields offered as filter dropdowns above the grid. Defaults to the
    /// foreign-key columns.
    pub fn with_filter_fields(mut self, fields: Vec<ColumnName>) -> Result<Self> {
        for field in &fields {
            if self.descriptor.column(field.as_str()).is_none() {
                bail!(
                    "filter field `{field}` is not a column of `{}`",
                    self.descriptor.table()
                );
            }
        }
        self.filter_fields = fields;
        Ok(self)
    }

    pub fn with_add_rows(mut self, rows: usize) -> Self {
        self.add_rows = rows.max(1);
        self
    }

    pub fn table(&self) -> &TableName {
        self.descriptor.table()
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn parts(&self) -> &[Descriptor] {
        &self.parts
    }

    pub fn style(&self) -> &GridStyle {
        &self.style
    }

    pub fn filter_fields(&self) -> &[ColumnName] {
        &self.filter_fields
    }

    pub fn add_rows(&self) -> usize {
        self.add_rows
    }

    pub fn control_id(&self, control: Control) -> String {
        control.control_id(self.table())
    }

    pub fn href(&self) -> String {
        format!("/tabs/{}", self.table())
    }

    pub fn initial_state(&self, runtime: &mut dyn TableRuntime) -> Result<TabState> {
        let rows = runtime.fetch_all(self.table())?;
        Ok(TabState::new(self.table().clone(), rows))
    }

    /// Distinct values of each filter field and of each foreign-key target,
    /// read through the runtime.
    pub fn dropdown_options(&self, runtime: &mut dyn TableRuntime) -> Result<DropdownOptions> {
        let mut options = DropdownOptions::default();
        for field in &self.filter_fields {
            options
                .filters
                .insert(field.clone(), runtime.distinct_values(self.table(), field)?);
        }
        for descriptor in std::iter::once(&self.descriptor).chain(&self.parts) {
            let mut edits = BTreeMap::new();
            for column in descriptor.columns() {
                if let Some(target) = &column.references {
                    edits.insert(
                        column.name.clone(),
                        runtime.distinct_values(&target.table, &target.column)?,
                    );
                }
            }
            if !edits.is_empty() {
                options.edits.insert(descriptor.table().clone(), edits);
            }
        }
        Ok(options)
    }

    pub fn layout(&self, state: &TabState, options: &DropdownOptions) -> TabLayout {
        let table = self.table();
        let actions_disabled = !state.row_actions_enabled();
        let button = |control: Control, label: String, disabled: bool| Button {
            id: self.control_id(control),
            label,
            disabled,
        };

        let grid = DisplayGrid::build(
            self.control_id(Control::TableSelect),
            &self.href(),
            &self.descriptor,
            &state.rows,
            state.selected,
            &state.view,
            &self.style,
        );

        let filters = self
            .filter_fields
            .iter()
            .map(|field| {
                FilterDropdown::build(
                    format!("{table}-filter-{field}"),
                    field,
                    options.filters.get(field).cloned().unwrap_or_default(),
                    &state.view,
                )
            })
            .collect();

        TabLayout {
            table: table.to_string(),
            title: table.to_string(),
            events_href: format!("{}/events", self.href()),
            select_trigger: self.control_id(Control::TableSelect),
            add_button: button(
                Control::AddButton,
                format!("Add a {table} record"),
                state.mode != TabMode::Idle,
            ),
            update_button: button(
                Control::UpdateButton,
                "Update the current record".to_owned(),
                actions_disabled,
            ),
            delete_button: button(
                Control::DeleteButton,
                "Delete the current record".to_owned(),
                actions_disabled,
            ),
            delete_message: state.message(MessageSlot::Delete).to_owned(),
            grid,
            filters,
            add_modal: self.modal(state, options, FormMode::Insert),
            update_modal: self.modal(state, options, FormMode::Update),
            delete_confirm: ConfirmDialog::delete(
                self.control_id(Control::DeleteConfirm),
                self.control_id(Control::DeleteCancel),
                state.mode == TabMode::DeleteConfirmPending,
            ),
        }
    }

    fn modal(&self, state: &TabState, options: &DropdownOptions, mode: FormMode) -> RecordModal {
        let table = self.table();
        let refreshed = |grid: EditGrid, table: &TableName| match options.edits.get(table) {
            Some(fresh) => grid.with_options(fresh),
            None => grid,
        };
        let action = mode.as_str();
        let (form, open, slot, confirm, close, title, confirm_label) = match mode {
            FormMode::Insert => (
                &state.add_form,
                state.mode == TabMode::AddModalOpen,
                MessageSlot::Add,
                Control::AddConfirm,
                Control::AddClose,
                format!("Add a new {table} record"),
                "Add record",
            ),
            FormMode::Update => (
                &state.update_form,
                state.mode == TabMode::UpdateModalOpen,
                MessageSlot::Update,
                Control::UpdateConfirm,
                Control::UpdateClose,
                "Update the following record".to_owned(),
                "Update record",
            ),
        };

        let grid = refreshed(
            EditGrid::build(
                format!("{action}-{table}-table"),
                action.to_owned(),
                &self.descriptor,
                mode,
                &[],
                &form.rows,
                false,
            ),
            table,
        );
        let parts = self
            .parts
            .iter()
            .map(|part| {
                let rows = form.parts.get(part.table()).cloned().unwrap_or_default();
                let grid = EditGrid::build(
                    format!("{action}-{}-table", part.table()),
                    format!("{action}-part.{}", part.table()),
                    part,
                    // Part rows can be added or re-keyed in either modal.
                    FormMode::Insert,
                    self.descriptor.primary_key(),
                    &rows,
                    true,
                );
                refreshed(grid, part.table())
            })
            .collect();

        RecordModal {
            id: format!("{action}-{table}-modal"),
            title,
            open,
            grid,
            parts,
            message: state.message(slot).to_owned(),
            confirm: Button {
                id: self.control_id(confirm),
                label: confirm_label.to_owned(),
                disabled: false,
            },
            close: Button {
                id: self.control_id(close),
                label: "Close".to_owned(),
                disabled: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Control, DropdownOptions, EventRegistry, TableTab};
    use crate::widgets::GridStyle;
    use rowdesk_app::{
        ColumnAffinity, ColumnSpec, Descriptor, FormState, RawRecord, TabCommand, TabState,
        Value,
    };
    use rowdesk_testkit::{column, record, table, text};

    fn spec(name: &str) -> ColumnSpec {
        ColumnSpec {
            name: column(name),
            declared_type: "TEXT".to_owned(),
            affinity: ColumnAffinity::Text,
            not_null: false,
            default: Value::Null,
            references: None,
        }
    }

    fn surgery() -> Descriptor {
        Descriptor::new(
            table("surgery"),
            vec![spec("subject_id"), spec("surgery_id"), spec("surgeon")],
            vec![column("subject_id"), column("surgery_id")],
        )
        .expect("valid descriptor")
    }

    fn implant() -> Descriptor {
        Descriptor::new(
            table("surgery__implant"),
            vec![
                spec("subject_id"),
                spec("surgery_id"),
                spec("implant_id"),
                spec("brain_area"),
            ],
            vec![column("subject_id"), column("surgery_id"), column("implant_id")],
        )
        .expect("valid descriptor")
    }

    #[test]
    fn control_ids_follow_action_table_role() {
        let subject = table("subject");
        assert_eq!(Control::AddButton.control_id(&subject), "add-subject-button");
        assert_eq!(Control::UpdateClose.control_id(&subject), "update-subject-close");
        assert_eq!(
            Control::DeleteCancel.control_id(&subject),
            "delete-subject-cancel"
        );
        assert_eq!(Control::TableSelect.control_id(&subject), "subject-table");
    }

    #[test]
    fn new_registers_every_control() -> anyhow::Result<()> {
        let mut registry = EventRegistry::new();
        let tab = TableTab::new(surgery(), vec![implant()], GridStyle::default(), &mut registry)?;
        assert_eq!(registry.len(), Control::ALL.len());
        assert_eq!(
            registry.resolve("update-surgery-confirm"),
            Some((tab.table(), Control::UpdateConfirm))
        );
        assert!(registry.resolve("update-subject-confirm").is_none());
        Ok(())
    }

    #[test]
    fn duplicate_tab_is_rejected() -> anyhow::Result<()> {
        let mut registry = EventRegistry::new();
        TableTab::new(surgery(), Vec::new(), GridStyle::default(), &mut registry)?;
        let error = TableTab::new(surgery(), Vec::new(), GridStyle::default(), &mut registry)
            .expect_err("second surgery tab should fail");
        assert!(error.to_string().contains("already registered"));
        Ok(())
    }

    #[test]
    fn part_must_carry_master_key() {
        let stray = Descriptor::new(
            table("surgery__note"),
            vec![spec("note_id"), spec("body")],
            vec![column("note_id")],
        )
        .expect("valid descriptor");
        let mut registry = EventRegistry::new();
        let error = TableTab::new(surgery(), vec![stray], GridStyle::default(), &mut registry)
            .expect_err("part without master key should fail");
        assert!(error.to_string().contains("its key lacks"));
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_excluded_field_is_rejected() {
        let style = GridStyle {
            excluded_fields: vec![column("weight")],
            ..GridStyle::default()
        };
        let mut registry = EventRegistry::new();
        assert!(TableTab::new(surgery(), Vec::new(), style, &mut registry).is_err());
    }

    #[test]
    fn layout_reflects_state() -> anyhow::Result<()> {
        let mut registry = EventRegistry::new();
        let tab = TableTab::new(surgery(), vec![implant()], GridStyle::default(), &mut registry)?;
        let rows = vec![record([
            ("subject_id", text("S1")),
            ("surgery_id", text("1")),
            ("surgeon", text("Ruiz")),
        ])];
        let mut state = TabState::new(table("surgery"), rows);

        let idle = tab.layout(&state, &DropdownOptions::default());
        assert!(idle.update_button.disabled);
        assert!(idle.delete_button.disabled);
        assert!(!idle.add_button.disabled);
        assert!(!idle.add_modal.open);
        assert_eq!(idle.add_modal.message, "Add message:");
        assert_eq!(idle.delete_message, "Delete surgery message:");
        assert_eq!(idle.events_href, "/tabs/surgery/events");

        state.dispatch(TabCommand::Select(Some(0)))?;
        let selected = tab.layout(&state, &DropdownOptions::default());
        assert!(!selected.update_button.disabled);
        assert!(selected.grid.rows[0].selected);

        let mut part_row = RawRecord::new();
        part_row.set("implant_id", "1");
        let mut form = FormState::single(RawRecord::new());
        form.parts.insert(table("surgery__implant"), vec![part_row]);
        state.dispatch(TabCommand::OpenUpdate(form))?;
        let open = tab.layout(&state, &DropdownOptions::default());
        assert!(open.update_modal.open);
        assert!(open.update_button.disabled);
        let part = &open.update_modal.parts[0];
        assert_eq!(part.field_prefix, "update-part.surgery__implant");
        let names = part
            .columns
            .iter()
            .map(|column| column.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, ["implant_id", "brain_area"]);
        assert!(part.deletable);
        Ok(())
    }
}
