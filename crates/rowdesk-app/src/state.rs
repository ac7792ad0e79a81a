// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use std::collections::BTreeMap;

use crate::column::{ColumnName, TableName};
use crate::forms::FormMode;
use crate::model::{RawRecord, Record, SortDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabMode {
    Idle,
    AddModalOpen,
    UpdateModalOpen,
    DeleteConfirmPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSlot {
    Add,
    Update,
    Delete,
}

/// Rows of an open record modal: the master rows plus one grid per part table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormState {
    pub rows: Vec<RawRecord>,
    pub parts: BTreeMap<TableName, Vec<RawRecord>>,
}

impl FormState {
    pub fn single(row: RawRecord) -> Self {
        Self {
            rows: vec![row],
            parts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GridView {
    pub sort: Option<(ColumnName, SortDirection)>,
    pub filters: BTreeMap<ColumnName, String>,
    pub page: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TabState {
    pub table: TableName,
    pub mode: TabMode,
    pub rows: Vec<Record>,
    pub selected: Option<usize>,
    pub add_form: FormState,
    pub update_form: FormState,
    pub add_message: String,
    pub update_message: String,
    pub delete_message: String,
    pub view: GridView,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TabCommand {
    Select(Option<usize>),
    OpenAdd(FormState),
    OpenUpdate(FormState),
    RequestDelete,
    CancelDelete,
    CloseModal,
    Complete { slot: MessageSlot, message: String },
    Refresh(Vec<Record>),
    SetView(GridView),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabEvent {
    ModeChanged(TabMode),
    SelectionChanged(Option<usize>),
    MessageUpdated(MessageSlot),
    RowsRefreshed(usize),
    ViewChanged,
}

pub fn delete_message_template(table: &TableName) -> String {
    format!("Delete {table} message:")
}

impl TabState {
    pub fn new(table: TableName, rows: Vec<Record>) -> Self {
        let delete_message = delete_message_template(&table);
        Self {
            table,
            mode: TabMode::Idle,
            rows,
            selected: None,
            add_form: FormState::default(),
            update_form: FormState::default(),
            add_message: FormMode::Insert.message_template().to_owned(),
            update_message: FormMode::Update.message_template().to_owned(),
            delete_message,
            view: GridView::default(),
        }
    }

    pub fn selected_row(&self) -> Option<&Record> {
        self.selected.and_then(|index| self.rows.get(index))
    }

    /// Derived from the selection each time it is asked; never stored.
    pub fn row_actions_enabled(&self) -> bool {
        self.mode == TabMode::Idle && self.selected_row().is_some()
    }

    pub fn message(&self, slot: MessageSlot) -> &str {
        match slot {
            MessageSlot::Add => &self.add_message,
            MessageSlot::Update => &self.update_message,
            MessageSlot::Delete => &self.delete_message,
        }
    }

    pub fn dispatch(&mut self, command: TabCommand) -> Result<Vec<TabEvent>> {
        match command {
            TabCommand::Select(index) => {
                if self.mode != TabMode::Idle {
                    return Ok(Vec::new());
                }
                let index = index.filter(|index| *index < self.rows.len());
                if index == self.selected {
                    return Ok(Vec::new());
                }
                self.selected = index;
                Ok(vec![TabEvent::SelectionChanged(self.selected)])
            }
            TabCommand::OpenAdd(seed) => {
                if self.mode != TabMode::Idle {
                    return Ok(Vec::new());
                }
                self.add_form = seed;
                Ok(vec![self.set_mode(TabMode::AddModalOpen)])
            }
            TabCommand::OpenUpdate(seed) => {
                if self.selected_row().is_none() {
                    bail!(
                        "update form for `{}` opened without a selected row",
                        self.table
                    );
                }
                if self.mode != TabMode::Idle {
                    return Ok(Vec::new());
                }
                self.update_form = seed;
                Ok(vec![self.set_mode(TabMode::UpdateModalOpen)])
            }
            TabCommand::RequestDelete => {
                if self.mode != TabMode::Idle || self.selected_row().is_none() {
                    return Ok(Vec::new());
                }
                Ok(vec![self.set_mode(TabMode::DeleteConfirmPending)])
            }
            TabCommand::CancelDelete => {
                if self.mode != TabMode::DeleteConfirmPending {
                    return Ok(Vec::new());
                }
                Ok(vec![self.set_mode(TabMode::Idle)])
            }
            TabCommand::CloseModal => {
                let slot = match self.mode {
                    TabMode::AddModalOpen => MessageSlot::Add,
                    TabMode::UpdateModalOpen => MessageSlot::Update,
                    TabMode::Idle | TabMode::DeleteConfirmPending => return Ok(Vec::new()),
                };
                self.reset_form(slot);
                self.reset_message(slot);
                Ok(vec![
                    self.set_mode(TabMode::Idle),
                    TabEvent::MessageUpdated(slot),
                ])
            }
            TabCommand::Complete { slot, message } => {
                self.reset_form(slot);
                match slot {
                    MessageSlot::Add => self.add_message = message,
                    MessageSlot::Update => self.update_message = message,
                    MessageSlot::Delete => {
                        self.delete_message = message;
                        self.selected = None;
                    }
                }
                let mut events = vec![TabEvent::MessageUpdated(slot)];
                if self.mode != TabMode::Idle {
                    events.insert(0, self.set_mode(TabMode::Idle));
                }
                Ok(events)
            }
            TabCommand::Refresh(rows) => {
                self.rows = rows;
                let mut events = vec![TabEvent::RowsRefreshed(self.rows.len())];
                if self.selected.is_some() && self.selected_row().is_none() {
                    self.selected = None;
                    events.push(TabEvent::SelectionChanged(None));
                }
                Ok(events)
            }
            TabCommand::SetView(view) => {
                if view == self.view {
                    return Ok(Vec::new());
                }
                self.view = view;
                Ok(vec![TabEvent::ViewChanged])
            }
        }
    }

    fn set_mode(&mut self, mode: TabMode) -> TabEvent {
        self.mode = mode;
        TabEvent::ModeChanged(mode)
    }

    fn reset_form(&mut self, slot: MessageSlot) {
        match slot {
            MessageSlot::Add => self.add_form = FormState::default(),
            MessageSlot::Update => self.update_form = FormState::default(),
            MessageSlot::Delete => {}
        }
    }

    fn reset_message(&mut self, slot: MessageSlot) {
        match slot {
            MessageSlot::Add => self.add_message = FormMode::Insert.message_template().to_owned(),
            MessageSlot::Update => {
                self.update_message = FormMode::Update.message_template().to_owned();
            }
            MessageSlot::Delete => self.delete_message = delete_message_template(&self.table),
        }
    }
}
