// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{
    CacheEntry, CellKey, CellValue, DEFAULT_ID_FIELD, Freshness, Row, RowKey, StatusFilter,
    StatusKind, clean_and_sort, discover_columns, is_status_field, is_truncatable, render_value,
};
use std::collections::BTreeSet;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    Empty,
    FreshCache,
    StaleCache,
    Network,
}

impl SnapshotOrigin {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::FreshCache => "cache",
            Self::StaleCache => "stale cache",
            Self::Network => "network",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionState {
    expanded: BTreeSet<CellKey>,
}

impl ExpansionState {
    pub fn is_expanded(&self, key: &CellKey) -> bool {
        self.expanded.contains(key)
    }

    pub fn toggled(&self, key: CellKey) -> Self {
        let mut next = self.clone();
        next.toggle(key);
        next
    }

    /// Flips the flag for `key` and returns the new value.
    pub fn toggle(&mut self, key: CellKey) -> bool {
        if self.expanded.remove(&key) {
            false
        } else {
            self.expanded.insert(key);
            true
        }
    }

    pub fn len(&self) -> usize {
        self.expanded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expanded.is_empty()
    }

    pub fn clear(&mut self) {
        self.expanded.clear();
    }

    fn drop_positional(&mut self) -> usize {
        let before = self.expanded.len();
        self.expanded.retain(|key| !key.row.is_positional());
        before - self.expanded.len()
    }

    fn retain_ids(&mut self, ids: &BTreeSet<String>) {
        self.expanded.retain(|key| match &key.row {
            RowKey::Id(id) => ids.contains(id),
            RowKey::Position(_) => false,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellView {
    pub field: String,
    pub text: String,
    pub truncated: bool,
    pub expanded: bool,
    pub status: Option<StatusKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListCommand {
    SetFilter(StatusFilter),
    NextFilter,
    PrevFilter,
    ToggleExpand { row: usize, field: usize },
    CollapseAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent {
    SnapshotReplaced { rows: usize, origin: SnapshotOrigin },
    LoadingChanged(bool),
    RevalidationStarted,
    RevalidationFinished,
    FetchFailed(String),
    FilterChanged(StatusFilter),
    CellToggled { key: CellKey, expanded: bool },
    ExpansionCleared(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchOutcome {
    pub events: Vec<ListEvent>,
    /// Set when the fetched rows replaced the snapshot and must be persisted.
    pub cache_write: Option<CacheEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestList {
    snapshot: Vec<Row>,
    filter: StatusFilter,
    expansion: ExpansionState,
    loading: bool,
    revalidating: bool,
    origin: SnapshotOrigin,
    id_field: Option<String>,
    /// Identity values carried by more than one snapshot row.
    shared_ids: BTreeSet<String>,
    displayed: Vec<usize>,
    columns: Vec<String>,
}

impl Default for RequestList {
    fn default() -> Self {
        Self::new(Some(DEFAULT_ID_FIELD))
    }
}

impl RequestList {
    pub fn new(id_field: Option<&str>) -> Self {
        Self {
            snapshot: Vec::new(),
            filter: StatusFilter::All,
            expansion: ExpansionState::default(),
            loading: true,
            revalidating: false,
            origin: SnapshotOrigin::Empty,
            id_field: id_field
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .map(str::to_owned),
            shared_ids: BTreeSet::new(),
            displayed: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: StatusFilter) -> Self {
        self.filter = filter;
        self.refresh_projection();
        self
    }

    pub fn snapshot(&self) -> &[Row] {
        &self.snapshot
    }

    pub const fn filter(&self) -> StatusFilter {
        self.filter
    }

    pub fn expansion(&self) -> &ExpansionState {
        &self.expansion
    }

    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    pub const fn is_revalidating(&self) -> bool {
        self.revalidating
    }

    pub const fn origin(&self) -> SnapshotOrigin {
        self.origin
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn total_len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn displayed_len(&self) -> usize {
        self.displayed.len()
    }

    pub fn displayed_rows(&self) -> impl Iterator<Item = &Row> {
        self.displayed.iter().map(|index| &self.snapshot[*index])
    }

    pub fn displayed_row(&self, row: usize) -> Option<&Row> {
        self.displayed.get(row).map(|index| &self.snapshot[*index])
    }

    pub fn cell_key(&self, row: usize, field: usize) -> Option<CellKey> {
        let record = self.displayed_row(row)?;
        let field = self.columns.get(field)?;
        // A repeated id cannot tell its rows apart, so they fall back to position.
        let row_key = match RowKey::for_row(record, row, self.id_field.as_deref()) {
            RowKey::Id(id) if self.shared_ids.contains(&id) => RowKey::Position(row),
            key => key,
        };
        Some(CellKey::new(row_key, field.clone()))
    }

    pub fn cell(&self, row: usize, field: usize) -> Option<CellView> {
        let key = self.cell_key(row, field)?;
        let record = self.displayed_row(row)?;
        let value = record.get(&key.field).cloned().unwrap_or(CellValue::Null);
        let expanded = self.expansion.is_expanded(&key);
        let status = is_status_field(&key.field)
            .then(|| StatusKind::classify(&value.display().to_lowercase()));
        Some(CellView {
            text: render_value(&key.field, &value, expanded),
            truncated: is_truncatable(&key.field, &value) && !expanded,
            expanded,
            status,
            field: key.field,
        })
    }

    /// First half of initialization: publish whatever the cache holds so the
    /// list can render before the network answers. The fetch is considered
    /// in flight from here on.
    pub fn publish_cache(
        &mut self,
        cached: Option<CacheEntry>,
        now: OffsetDateTime,
    ) -> Vec<ListEvent> {
        let mut events = Vec::new();
        match cached {
            Some(entry) => {
                let origin = match entry.freshness(now) {
                    Freshness::Fresh => SnapshotOrigin::FreshCache,
                    Freshness::Stale => SnapshotOrigin::StaleCache,
                };
                events.push(self.replace_snapshot(clean_and_sort(&entry.rows), origin));
                events.extend(self.set_loading(false));
            }
            None => {
                events.extend(self.set_loading(true));
            }
        }
        self.revalidating = true;
        events.push(ListEvent::RevalidationStarted);
        events
    }

    /// Second half of initialization: reconcile the fetch result with what
    /// was published. A failure never erases rows that were already shown.
    pub fn apply_fetch(
        &mut self,
        result: Result<Vec<Row>, String>,
        now: OffsetDateTime,
    ) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();
        match result {
            Ok(raw) => {
                let rows = clean_and_sort(&raw);
                let trusted = matches!(
                    self.origin,
                    SnapshotOrigin::FreshCache | SnapshotOrigin::Network
                );
                if !trusted || rows != self.snapshot {
                    outcome.cache_write = Some(CacheEntry::new(now, rows.clone()));
                    outcome
                        .events
                        .push(self.replace_snapshot(rows, SnapshotOrigin::Network));
                }
            }
            // Nothing published stays an empty list; anything published stays.
            Err(error) => outcome.events.push(ListEvent::FetchFailed(error)),
        }

        outcome.events.extend(self.set_loading(false));
        if self.revalidating {
            self.revalidating = false;
            outcome.events.push(ListEvent::RevalidationFinished);
        }
        outcome
    }

    pub fn dispatch(&mut self, command: ListCommand) -> Vec<ListEvent> {
        match command {
            ListCommand::SetFilter(filter) => self.set_filter(filter),
            ListCommand::NextFilter => self.set_filter(self.filter.rotate(1)),
            ListCommand::PrevFilter => self.set_filter(self.filter.rotate(-1)),
            ListCommand::ToggleExpand { row, field } => {
                let Some(key) = self.cell_key(row, field) else {
                    return Vec::new();
                };
                let truncatable = self
                    .displayed_row(row)
                    .and_then(|record| record.get(&key.field))
                    .is_some_and(|value| is_truncatable(&key.field, value));
                // Short values and status badges have nothing to expand.
                if !truncatable && !self.expansion.is_expanded(&key) {
                    return Vec::new();
                }
                let expanded = self.expansion.toggle(key.clone());
                vec![ListEvent::CellToggled { key, expanded }]
            }
            ListCommand::CollapseAll => {
                let cleared = self.expansion.len();
                self.expansion.clear();
                vec![ListEvent::ExpansionCleared(cleared)]
            }
        }
    }

    fn set_filter(&mut self, filter: StatusFilter) -> Vec<ListEvent> {
        self.filter = filter;
        let mut events = vec![ListEvent::FilterChanged(filter)];
        // Positions refer to the old displayed list.
        let cleared = self.expansion.drop_positional();
        if cleared > 0 {
            events.push(ListEvent::ExpansionCleared(cleared));
        }
        self.refresh_projection();
        events
    }

    fn set_loading(&mut self, loading: bool) -> Option<ListEvent> {
        if self.loading == loading {
            return None;
        }
        self.loading = loading;
        Some(ListEvent::LoadingChanged(loading))
    }

    fn replace_snapshot(&mut self, rows: Vec<Row>, origin: SnapshotOrigin) -> ListEvent {
        let mut ids = BTreeSet::new();
        let mut shared_ids = BTreeSet::new();
        if let Some(field) = self.id_field.as_deref() {
            for value in rows.iter().filter_map(|row| row.get(field)) {
                if value.is_blank() {
                    continue;
                }
                let id = value.display();
                if !ids.insert(id.clone()) {
                    shared_ids.insert(id);
                }
            }
        }
        ids.retain(|id| !shared_ids.contains(id));
        self.shared_ids = shared_ids;
        self.expansion.retain_ids(&ids);

        self.snapshot = rows;
        self.origin = origin;
        self.refresh_projection();
        ListEvent::SnapshotReplaced {
            rows: self.snapshot.len(),
            origin,
        }
    }

    fn refresh_projection(&mut self) {
        let filter = self.filter;
        self.displayed = self
            .snapshot
            .iter()
            .enumerate()
            .filter(|(_, row)| filter.matches(row))
            .map(|(index, _)| index)
            .collect();
        self.columns = discover_columns(self.displayed_rows(), &self.snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::{ExpansionState, ListCommand, ListEvent, RequestList, SnapshotOrigin};
    use crate::{CacheEntry, CellKey, Row, RowKey, StatusFilter, StatusKind, clean_and_sort};
    use anyhow::Result;
    use time::{Duration, OffsetDateTime};

    fn reference_now() -> Result<OffsetDateTime> {
        Ok(OffsetDateTime::from_unix_timestamp(1_767_225_600)?)
    }

    fn request(status: &str, id: &str) -> Row {
        Row::new().with("Status", status).with("ID", id)
    }

    fn sample_rows() -> Vec<Row> {
        vec![
            request("new", "b"),
            request("closed", "a"),
            request("pending", "c"),
            Row::new(),
        ]
    }

    #[test]
    fn starts_loading_with_empty_snapshot() {
        let list = RequestList::default();
        assert!(list.is_loading());
        assert!(list.snapshot().is_empty());
        assert_eq!(list.origin(), SnapshotOrigin::Empty);
    }

    #[test]
    fn fresh_cache_publishes_immediately() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::default();
        let entry = CacheEntry::new(now - Duration::seconds(299), sample_rows());

        let events = list.publish_cache(Some(entry), now);
        assert!(!list.is_loading());
        assert!(list.is_revalidating());
        assert_eq!(list.origin(), SnapshotOrigin::FreshCache);
        assert_eq!(list.snapshot(), clean_and_sort(&sample_rows()).as_slice());
        assert!(events.contains(&ListEvent::LoadingChanged(false)));
        Ok(())
    }

    #[test]
    fn stale_cache_still_publishes_for_instant_display() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::default();
        let entry = CacheEntry::new(
            now - Duration::minutes(5) - Duration::milliseconds(1),
            sample_rows(),
        );

        list.publish_cache(Some(entry), now);
        assert_eq!(list.origin(), SnapshotOrigin::StaleCache);
        assert_eq!(list.total_len(), 3);
        assert!(!list.is_loading());
        assert!(list.is_revalidating());
        Ok(())
    }

    #[test]
    fn missing_cache_keeps_loading_until_fetch_completes() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::default();
        list.publish_cache(None, now);
        assert!(list.is_loading());

        let outcome = list.apply_fetch(Ok(sample_rows()), now);
        assert!(!list.is_loading());
        assert!(!list.is_revalidating());
        assert_eq!(list.origin(), SnapshotOrigin::Network);
        let written = outcome.cache_write.expect("fetch result should be cached");
        assert_eq!(written.captured_at, now);
        assert_eq!(written.rows, list.snapshot().to_vec());
        Ok(())
    }

    #[test]
    fn end_to_end_clean_and_sort_order() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::default();
        list.publish_cache(None, now);
        list.apply_fetch(Ok(sample_rows()), now);

        assert_eq!(
            list.snapshot(),
            &[
                request("new", "b"),
                request("pending", "c"),
                request("closed", "a"),
            ]
        );
        Ok(())
    }

    #[test]
    fn fetch_failure_without_cache_settles_on_empty_list() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::default();
        list.publish_cache(None, now);

        let outcome = list.apply_fetch(Err("connection refused".to_owned()), now);
        assert!(list.snapshot().is_empty());
        assert!(!list.is_loading());
        assert!(outcome.cache_write.is_none());
        assert!(
            outcome
                .events
                .contains(&ListEvent::FetchFailed("connection refused".to_owned()))
        );
        Ok(())
    }

    #[test]
    fn fetch_failure_keeps_stale_rows() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::default();
        list.publish_cache(
            Some(CacheEntry::new(now - Duration::hours(2), sample_rows())),
            now,
        );

        let outcome = list.apply_fetch(Err("timeout".to_owned()), now);
        assert_eq!(list.total_len(), 3);
        assert_eq!(list.origin(), SnapshotOrigin::StaleCache);
        assert!(!list.is_loading());
        assert!(outcome.cache_write.is_none());
        Ok(())
    }

    #[test]
    fn identical_fetch_after_fresh_cache_skips_cache_write() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::default();
        list.publish_cache(
            Some(CacheEntry::new(now - Duration::minutes(1), sample_rows())),
            now,
        );

        let outcome = list.apply_fetch(Ok(sample_rows()), now);
        assert!(outcome.cache_write.is_none());
        assert_eq!(list.origin(), SnapshotOrigin::FreshCache);
        assert!(outcome.events.contains(&ListEvent::RevalidationFinished));
        Ok(())
    }

    #[test]
    fn identical_fetch_after_stale_cache_refreshes_capture_time() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::default();
        list.publish_cache(
            Some(CacheEntry::new(now - Duration::minutes(30), sample_rows())),
            now,
        );

        let outcome = list.apply_fetch(Ok(sample_rows()), now);
        let written = outcome.cache_write.expect("stale cache should be rewritten");
        assert_eq!(written.captured_at, now);
        assert_eq!(list.origin(), SnapshotOrigin::Network);
        Ok(())
    }

    #[test]
    fn changed_fetch_replaces_fresh_cache() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::default();
        list.publish_cache(
            Some(CacheEntry::new(now - Duration::minutes(1), sample_rows())),
            now,
        );

        let outcome = list.apply_fetch(Ok(vec![request("new", "z")]), now);
        assert!(outcome.cache_write.is_some());
        assert_eq!(list.snapshot(), &[request("new", "z")]);
        Ok(())
    }

    #[test]
    fn filter_projection_and_counts() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::default();
        list.publish_cache(None, now);
        list.apply_fetch(Ok(sample_rows()), now);

        let events = list.dispatch(ListCommand::SetFilter(StatusFilter::Closed));
        assert_eq!(events, vec![ListEvent::FilterChanged(StatusFilter::Closed)]);
        assert_eq!(list.displayed_len(), 1);
        assert_eq!(list.total_len(), 3);
        assert_eq!(list.displayed_row(0), Some(&request("closed", "a")));

        list.dispatch(ListCommand::SetFilter(StatusFilter::All));
        assert_eq!(
            list.displayed_rows().collect::<Vec<_>>(),
            list.snapshot().iter().collect::<Vec<_>>()
        );

        list.dispatch(ListCommand::PrevFilter);
        assert_eq!(list.filter(), StatusFilter::Other);
        assert_eq!(list.displayed_len(), 0);
        assert_eq!(list.columns(), &["Status".to_owned(), "ID".to_owned()]);
        Ok(())
    }

    #[test]
    fn toggle_expand_is_self_inverse() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::default();
        list.publish_cache(None, now);
        list.apply_fetch(
            Ok(vec![request("new", "a").with("Notes", "x".repeat(50))]),
            now,
        );

        let notes = 2;
        let before = list.expansion().clone();
        let first = list.dispatch(ListCommand::ToggleExpand { row: 0, field: notes });
        assert_eq!(
            first,
            vec![ListEvent::CellToggled {
                key: CellKey::new(RowKey::Id("a".to_owned()), "Notes"),
                expanded: true,
            }]
        );
        let cell = list.cell(0, notes).expect("cell should exist");
        assert!(cell.expanded);
        assert_eq!(cell.text.chars().count(), 50);

        list.dispatch(ListCommand::ToggleExpand { row: 0, field: notes });
        assert_eq!(list.expansion(), &before);
        let cell = list.cell(0, notes).expect("cell should exist");
        assert!(cell.truncated);
        assert_eq!(cell.text.chars().count(), 36);
        Ok(())
    }

    #[test]
    fn toggle_outside_displayed_rows_is_ignored() {
        let mut list = RequestList::default();
        assert!(
            list.dispatch(ListCommand::ToggleExpand { row: 4, field: 0 })
                .is_empty()
        );
        assert!(list.expansion().is_empty());
    }

    #[test]
    fn pure_toggled_leaves_original_untouched() {
        let key = CellKey::new(RowKey::Position(0), "Notes");
        let original = ExpansionState::default();
        let next = original.toggled(key.clone());
        assert!(next.is_expanded(&key));
        assert!(!original.is_expanded(&key));
        assert_eq!(next.toggled(key), original);
    }

    #[test]
    fn id_keyed_expansion_survives_refetch_reorder() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::default();
        list.publish_cache(None, now);
        list.apply_fetch(
            Ok(vec![
                request("new", "a").with("Notes", "x".repeat(40)),
                request("pending", "b").with("Notes", "y".repeat(40)),
            ]),
            now,
        );
        list.dispatch(ListCommand::ToggleExpand { row: 1, field: 2 });

        list.apply_fetch(
            Ok(vec![
                request("new", "b").with("Notes", "y".repeat(40)),
                request("closed", "a").with("Notes", "x".repeat(40)),
            ]),
            now,
        );
        let cell = list.cell(0, 2).expect("row b now first");
        assert!(cell.expanded);
        assert!(!list.cell(1, 2).expect("row a").expanded);
        Ok(())
    }

    #[test]
    fn positional_expansion_is_forgotten_when_rows_change() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::new(None);
        list.publish_cache(None, now);
        list.apply_fetch(Ok(vec![request("new", "a").with("Notes", "x".repeat(40))]), now);
        list.dispatch(ListCommand::ToggleExpand { row: 0, field: 2 });
        assert_eq!(list.expansion().len(), 1);

        let events = list.dispatch(ListCommand::SetFilter(StatusFilter::New));
        assert!(events.contains(&ListEvent::ExpansionCleared(1)));
        assert!(list.expansion().is_empty());
        Ok(())
    }

    #[test]
    fn status_cells_report_badge_kind() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::default();
        list.publish_cache(None, now);
        list.apply_fetch(Ok(vec![request("Pending", "a")]), now);

        let cell = list.cell(0, 0).expect("status cell");
        assert_eq!(cell.status, Some(StatusKind::Pending));
        assert_eq!(cell.text, "Pending");
        assert!(list.cell(0, 1).expect("id cell").status.is_none());
        Ok(())
    }

    #[test]
    fn rows_sharing_an_id_expand_independently() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::default();
        list.publish_cache(None, now);
        list.apply_fetch(
            Ok(vec![
                request("new", "7").with("Notes", "x".repeat(40)),
                request("new", "7").with("Notes", "y".repeat(40)),
                request("new", "8").with("Notes", "z".repeat(40)),
            ]),
            now,
        );

        let notes = 2;
        let events = list.dispatch(ListCommand::ToggleExpand { row: 0, field: notes });
        assert_eq!(
            events,
            vec![ListEvent::CellToggled {
                key: CellKey::new(RowKey::Position(0), "Notes"),
                expanded: true,
            }]
        );
        assert!(list.cell(0, notes).expect("first duplicate").expanded);
        assert!(!list.cell(1, notes).expect("second duplicate").expanded);

        list.dispatch(ListCommand::ToggleExpand { row: 2, field: notes });
        assert_eq!(
            list.cell_key(2, notes),
            Some(CellKey::new(RowKey::Id("8".to_owned()), "Notes"))
        );
        assert!(list.cell(2, notes).expect("unique id").expanded);
        Ok(())
    }

    #[test]
    fn id_that_becomes_shared_drops_its_expansion() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::default();
        list.publish_cache(None, now);
        list.apply_fetch(Ok(vec![request("new", "7").with("Notes", "x".repeat(40))]), now);
        list.dispatch(ListCommand::ToggleExpand { row: 0, field: 2 });
        assert_eq!(list.expansion().len(), 1);

        list.apply_fetch(
            Ok(vec![
                request("new", "7").with("Notes", "x".repeat(40)),
                request("new", "7").with("Notes", "x".repeat(41)),
            ]),
            now,
        );
        assert!(list.expansion().is_empty());
        assert!(!list.cell(0, 2).expect("row").expanded);
        assert!(!list.cell(1, 2).expect("row").expanded);
        Ok(())
    }

    #[test]
    fn cells_that_fit_are_not_expandable() -> Result<()> {
        let now = reference_now()?;
        let mut list = RequestList::default();
        list.publish_cache(None, now);
        list.apply_fetch(
            Ok(vec![request("pending approval from the facilities lead", "a")]),
            now,
        );

        let status = list.dispatch(ListCommand::ToggleExpand { row: 0, field: 0 });
        let id = list.dispatch(ListCommand::ToggleExpand { row: 0, field: 1 });
        assert!(status.is_empty());
        assert!(id.is_empty());
        assert!(list.expansion().is_empty());
        Ok(())
    }
}
