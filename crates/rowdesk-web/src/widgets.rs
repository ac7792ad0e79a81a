// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use rowdesk_app::{
    ColumnName, Descriptor, FormMode, GridView, RawRecord, Record, STORED_FIELD, SortDirection,
    Value, is_stored,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use url::form_urlencoded;

pub const DELETE_CONFIRM_MESSAGE: &str = "Are you sure to delete the record?";

/// Field name suffix marking a part-grid row for removal.
pub const REMOVE_FIELD: &str = "_remove";

/// Sizing and presentation presets shared by every grid of a tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridStyle {
    pub cell_width: u32,
    pub table_height: u32,
    pub table_width: u32,
    pub page_size: usize,
    pub row_selectable: bool,
    pub excluded_fields: Vec<ColumnName>,
}

impl Default for GridStyle {
    fn default() -> Self {
        Self {
            cell_width: 140,
            table_height: 800,
            table_width: 800,
            page_size: 25,
            row_selectable: true,
            excluded_fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub id: String,
    pub label: String,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridColumn {
    pub name: String,
    pub sorted: Option<&'static str>,
    pub sort_href: String,
    pub filter: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridRow {
    /// Position in the full fetched row list, stable under sort and filter.
    pub index: usize,
    pub cells: Vec<String>,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayGrid {
    pub id: String,
    pub columns: Vec<GridColumn>,
    pub rows: Vec<GridRow>,
    pub page: usize,
    pub page_count: usize,
    pub matched_rows: usize,
    pub total_rows: usize,
    pub prev_href: Option<String>,
    pub next_href: Option<String>,
    pub style: GridStyle,
}

impl DisplayGrid {
    pub fn build(
        id: String,
        base_href: &str,
        descriptor: &Descriptor,
        rows: &[Record],
        selected: Option<usize>,
        view: &GridView,
        style: &GridStyle,
    ) -> Self {
        let visible = descriptor
            .column_names()
            .filter(|name| !style.excluded_fields.contains(name))
            .cloned()
            .collect::<Vec<_>>();

        let mut matched = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| matches_filters(row, view))
            .collect::<Vec<_>>();
        if let Some((column, direction)) = &view.sort {
            matched.sort_by(|(_, left), (_, right)| {
                let ordering = compare_values(left.get(column), right.get(column));
                match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        let page_size = style.page_size.max(1);
        let matched_rows = matched.len();
        let page_count = matched_rows.div_ceil(page_size).max(1);
        let page = view.page.min(page_count - 1);

        let grid_rows = matched
            .into_iter()
            .skip(page * page_size)
            .take(page_size)
            .map(|(index, row)| GridRow {
                index,
                cells: visible
                    .iter()
                    .map(|column| row.get(column).map(Value::display_text).unwrap_or_default())
                    .collect(),
                selected: selected == Some(index),
            })
            .collect();

        let columns = visible
            .iter()
            .map(|column| {
                let sorted = view
                    .sort
                    .as_ref()
                    .filter(|(sorted, _)| sorted == column)
                    .map(|(_, direction)| direction.as_str());
                let next_direction = match &view.sort {
                    Some((sorted, direction)) if sorted == column => direction.toggled(),
                    _ => SortDirection::Asc,
                };
                let sort_view = GridView {
                    sort: Some((column.clone(), next_direction)),
                    filters: view.filters.clone(),
                    page: 0,
                };
                GridColumn {
                    name: column.to_string(),
                    sorted,
                    sort_href: view_href(base_href, &sort_view),
                    filter: view.filters.get(column).cloned().unwrap_or_default(),
                }
            })
            .collect();

        let page_href = |page: usize| {
            view_href(
                base_href,
                &GridView {
                    page,
                    ..view.clone()
                },
            )
        };

        Self {
            id,
            columns,
            rows: grid_rows,
            page,
            page_count,
            matched_rows,
            total_rows: rows.len(),
            prev_href: (page > 0).then(|| page_href(page - 1)),
            next_href: (page + 1 < page_count).then(|| page_href(page + 1)),
            style: style.clone(),
        }
    }
}

fn matches_filters(row: &Record, view: &GridView) -> bool {
    view.filters.iter().all(|(column, needle)| {
        let needle = needle.trim().to_lowercase();
        needle.is_empty()
            || row
                .get(column)
                .is_some_and(|value| value.display_text().to_lowercase().contains(&needle))
    })
}

/// NULL sorts first, numbers before text, numbers compared numerically.
pub fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Integer(_) | Value::Real(_)) => 1,
            Some(Value::Text(_)) => 2,
        }
    }
    fn number(value: &Value) -> f64 {
        match value {
            Value::Integer(value) => *value as f64,
            Value::Real(value) => *value,
            Value::Null | Value::Text(_) => 0.0,
        }
    }

    match (left, right) {
        (Some(Value::Integer(a)), Some(Value::Integer(b))) => a.cmp(b),
        (Some(Value::Text(a)), Some(Value::Text(b))) => a.cmp(b),
        (Some(a), Some(b)) if rank(left) == 1 && rank(right) == 1 => {
            number(a).total_cmp(&number(b))
        }
        _ => rank(left).cmp(&rank(right)),
    }
}

/// Link to the grid with `view` encoded as query parameters.
pub fn view_href(base_href: &str, view: &GridView) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    if let Some((column, direction)) = &view.sort {
        query.append_pair("sort", column.as_str());
        query.append_pair("dir", direction.as_str());
    }
    for (column, needle) in &view.filters {
        if !needle.is_empty() {
            query.append_pair(&format!("filter.{column}"), needle);
        }
    }
    query.append_pair("page", &view.page.to_string());
    format!("{base_href}?{}", query.finish())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditColumn {
    pub name: String,
    pub editable: bool,
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditRow {
    pub index: usize,
    pub cells: Vec<String>,
    pub stored: bool,
}

/// Editable grid posted back as `{field_prefix}.{row}.{column}` inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditGrid {
    pub id: String,
    pub title: String,
    pub field_prefix: String,
    pub columns: Vec<EditColumn>,
    pub rows: Vec<EditRow>,
    pub deletable: bool,
    pub remove_field: &'static str,
    pub stored_field: &'static str,
}

impl EditGrid {
    pub fn build(
        id: String,
        field_prefix: String,
        descriptor: &Descriptor,
        mode: FormMode,
        excluded: &[ColumnName],
        rows: &[RawRecord],
        deletable: bool,
    ) -> Self {
        let columns = descriptor
            .columns()
            .iter()
            .filter(|column| !excluded.contains(&column.name))
            .map(|column| EditColumn {
                name: column.name.to_string(),
                editable: mode == FormMode::Insert || !descriptor.is_primary(&column.name),
                options: descriptor.dropdown_options(&column.name).map(|options| {
                    options.iter().map(Value::display_text).collect::<Vec<_>>()
                }),
            })
            .collect::<Vec<_>>();

        let rows = rows
            .iter()
            .enumerate()
            .map(|(index, raw)| EditRow {
                index,
                cells: columns
                    .iter()
                    .map(|column| raw.get(&column.name).to_owned())
                    .collect(),
                stored: is_stored(raw),
            })
            .collect();

        let mut grid = Self {
            id,
            title: descriptor.table().to_string(),
            field_prefix,
            columns,
            rows,
            deletable,
            remove_field: REMOVE_FIELD,
            stored_field: STORED_FIELD,
        };
        grid.offer_current_values();
        grid
    }

    /// Replaces the reflected dropdown choices with ones read for this render.
    pub fn with_options(mut self, options: &BTreeMap<ColumnName, Vec<Value>>) -> Self {
        for column in &mut self.columns {
            let fresh = options
                .iter()
                .find(|(name, _)| name.as_str() == column.name)
                .map(|(_, values)| values);
            if let (Some(current), Some(values)) = (column.options.as_mut(), fresh) {
                *current = values
                    .iter()
                    .filter(|value| !value.is_null())
                    .map(Value::display_text)
                    .collect();
            }
        }
        self.offer_current_values();
        self
    }

    /// A non-blank cell of a dropdown column is always one of its choices,
    /// so the select posts it back instead of blank.
    fn offer_current_values(&mut self) {
        for (position, column) in self.columns.iter_mut().enumerate() {
            let Some(options) = column.options.as_mut() else {
                continue;
            };
            for value in self.rows.iter().filter_map(|row| row.cells.get(position)) {
                if !value.is_empty() && !options.contains(value) {
                    options.push(value.clone());
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordModal {
    pub id: String,
    pub title: String,
    pub open: bool,
    pub grid: EditGrid,
    pub parts: Vec<EditGrid>,
    pub message: String,
    pub confirm: Button,
    pub close: Button,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmDialog {
    pub id: String,
    pub message: &'static str,
    pub displayed: bool,
    pub confirm: Button,
    pub cancel: Button,
}

impl ConfirmDialog {
    pub fn delete(id: String, cancel_id: String, displayed: bool) -> Self {
        Self {
            confirm: Button {
                id: id.clone(),
                label: "OK".to_owned(),
                disabled: false,
            },
            cancel: Button {
                id: cancel_id,
                label: "Cancel".to_owned(),
                disabled: false,
            },
            id,
            message: DELETE_CONFIRM_MESSAGE,
            displayed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterDropdown {
    pub id: String,
    pub field: String,
    pub input_name: String,
    pub placeholder: String,
    pub options: Vec<String>,
    pub selected: String,
}

impl FilterDropdown {
    /// `options` are deduplicated and sorted the way the grid sorts them.
    pub fn build(id: String, field: &ColumnName, mut options: Vec<Value>, view: &GridView) -> Self {
        options.sort_by(|left, right| compare_values(Some(left), Some(right)));
        options.dedup();
        Self {
            id,
            field: field.to_string(),
            input_name: format!("filter.{field}"),
            placeholder: format!("Select {field} ..."),
            options: options
                .iter()
                .filter(|value| !value.is_null())
                .map(Value::display_text)
                .collect(),
            selected: view.filters.get(field).cloned().unwrap_or_default(),
        }
    }
}
