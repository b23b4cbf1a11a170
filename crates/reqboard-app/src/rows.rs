// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{CellValue, MAX_CELL_CHARS, Row, STATUS_FIELD, StatusFilter};
use std::cmp::Ordering;

/// Drops blank rows and orders the rest by status priority, then by the
/// first field. Equal rows keep their input order.
pub fn clean_and_sort(raw: &[Row]) -> Vec<Row> {
    let mut rows = raw
        .iter()
        .filter(|row| !row.is_blank())
        .cloned()
        .collect::<Vec<_>>();
    rows.sort_by(compare_rows);
    rows
}

pub fn compare_rows(left: &Row, right: &Row) -> Ordering {
    left.status_kind()
        .priority()
        .cmp(&right.status_kind().priority())
        .then_with(|| locale_compare(&first_field_text(left), &first_field_text(right)))
}

/// Case is folded first; the raw text only breaks ties between values that
/// differ by case alone.
pub fn locale_compare(left: &str, right: &str) -> Ordering {
    left.chars()
        .flat_map(char::to_lowercase)
        .cmp(right.chars().flat_map(char::to_lowercase))
        .then_with(|| left.cmp(right))
}

fn first_field_text(row: &Row) -> String {
    row.first_value().map(CellValue::display).unwrap_or_default()
}

pub fn apply_filter(snapshot: &[Row], filter: StatusFilter) -> Vec<&Row> {
    snapshot.iter().filter(|row| filter.matches(row)).collect()
}

pub fn is_status_field(field: &str) -> bool {
    field.eq_ignore_ascii_case(STATUS_FIELD)
}

/// Whether the cell has more text than fits collapsed. Status cells render
/// as badges and never truncate.
pub fn is_truncatable(field: &str, value: &CellValue) -> bool {
    !is_status_field(field) && value.display().chars().count() > MAX_CELL_CHARS
}

/// Display text for one cell. Collapsed long values are cut to the first
/// `MAX_CELL_CHARS` characters; the caller draws the expand affordance.
pub fn render_value(field: &str, value: &CellValue, expanded: bool) -> String {
    let text = value.display();
    if is_status_field(field) || expanded || text.chars().count() <= MAX_CELL_CHARS {
        return text;
    }
    text.chars().take(MAX_CELL_CHARS).collect()
}

/// Column names for the displayed rows: the first row's fields in source
/// order, then any fields later rows add. Falls back to the full snapshot
/// when nothing is displayed.
pub fn discover_columns<'a, I>(displayed: I, snapshot: &[Row]) -> Vec<String>
where
    I: IntoIterator<Item = &'a Row>,
{
    let displayed = displayed.into_iter().collect::<Vec<_>>();
    let source = if displayed.is_empty() {
        snapshot.iter().collect::<Vec<_>>()
    } else {
        displayed
    };

    let mut columns: Vec<String> = Vec::new();
    for row in source {
        for field in row.field_names() {
            if !columns.iter().any(|existing| existing == field) {
                columns.push(field.to_owned());
            }
        }
    }
    columns
}
