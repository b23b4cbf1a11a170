// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::Row;

/// Identity of a displayed row for expansion tracking.
///
/// Rows that carry a non-blank identity field keep their key across
/// re-sorts and refetches. Rows without one fall back to their position in
/// the displayed list, which does not survive reordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowKey {
    Id(String),
    Position(usize),
}

impl RowKey {
    pub fn for_row(row: &Row, position: usize, id_field: Option<&str>) -> Self {
        id_field
            .and_then(|field| row.get(field))
            .filter(|value| !value.is_blank())
            .map(|value| Self::Id(value.display()))
            .unwrap_or(Self::Position(position))
    }

    pub const fn is_positional(&self) -> bool {
        matches!(self, Self::Position(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub row: RowKey,
    pub field: String,
}

impl CellKey {
    pub fn new(row: RowKey, field: impl Into<String>) -> Self {
        Self {
            row,
            field: field.into(),
        }
    }
}
