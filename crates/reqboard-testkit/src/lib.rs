// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use reqboard_app::{CellValue, Row};
use std::path::PathBuf;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

pub const CONFIRM_FIELD: &str = "Chờ Xác Nhận";
pub const CLOSE_FIELD: &str = "Chờ Đóng";

const STATUSES: [&str; 7] = ["new", "New", "pending", "Pending", "closed", "CLOSED", "on hold"];

const BUILDINGS: [&str; 4] = ["A", "B", "C", "Annex"];

const CATEGORIES: [&str; 8] = [
    "Electrical",
    "Plumbing",
    "HVAC",
    "Furniture",
    "Network",
    "Cleaning",
    "Security",
    "Elevator",
];

const REPORTERS: [&str; 10] = [
    "Nguyễn Văn An",
    "Trần Thị Bích",
    "Lê Hoàng",
    "Phạm Minh Châu",
    "Hoàng Đức",
    "Vũ Thu Trang",
    "Đặng Quốc Bảo",
    "Bùi Lan",
    "Đỗ Khánh",
    "Ngô Thanh Hà",
];

const NOTE_WORDS: [&str; 24] = [
    "replace",
    "inspect",
    "leaking",
    "broken",
    "ceiling",
    "light",
    "socket",
    "faucet",
    "air",
    "conditioner",
    "noisy",
    "router",
    "door",
    "lock",
    "window",
    "stuck",
    "second",
    "floor",
    "hallway",
    "urgent",
    "after",
    "hours",
    "tenant",
    "reports",
];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

/// Seeded generator for maintenance-request rows shaped like the live sheet.
#[derive(Debug, Clone)]
pub struct RequestFaker {
    rng: DeterministicRng,
    next_id: u32,
}

impl RequestFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            next_id: 1,
        }
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn request(&mut self) -> Row {
        let status = self.pick(&STATUSES);
        self.request_with_status(status)
    }

    pub fn request_with_status(&mut self, status: &str) -> Row {
        let id = format!("REQ-{:04}", self.next_id);
        self.next_id += 1;

        let room = format!(
            "{}-{}{:02}",
            self.pick(&BUILDINGS),
            1 + self.rng.int_n(6),
            1 + self.rng.int_n(20)
        );
        let reported = reference_now() - Duration::days(self.rng.int_n(120) as i64);
        let notes = if self.rng.int_n(3) == 0 {
            self.sentence(12, 20)
        } else {
            self.sentence(2, 5)
        };
        let awaiting_confirm = if status.eq_ignore_ascii_case("pending") {
            CellValue::from(self.pick(&REPORTERS))
        } else {
            CellValue::Null
        };
        let awaiting_close = if self.rng.bool() {
            CellValue::from((reported.date() + Duration::days(7)).to_string())
        } else {
            CellValue::from("")
        };

        Row::new()
            .with("ID", id)
            .with("Status", status)
            .with("Room", room)
            .with("Category", self.pick(&CATEGORIES))
            .with("Reported", reported.date().to_string())
            .with("Notes", notes)
            .with(CONFIRM_FIELD, awaiting_confirm)
            .with(CLOSE_FIELD, awaiting_close)
    }

    /// A spreadsheet row the user cleared without deleting.
    pub fn blank_row(&self) -> Row {
        Row::new()
            .with("ID", "")
            .with("Status", CellValue::Null)
            .with("Room", "   ")
            .with("Notes", CellValue::Null)
    }

    /// `count` requests with a blank row mixed in every tenth position.
    pub fn batch(&mut self, count: usize) -> Vec<Row> {
        let mut rows = Vec::with_capacity(count + count / 10);
        for index in 0..count {
            if index > 0 && index % 10 == 0 {
                rows.push(self.blank_row());
            }
            rows.push(self.request());
        }
        rows
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn sentence(&mut self, min_words: usize, max_words: usize) -> String {
        let count = min_words + self.rng.int_n(max_words.saturating_sub(min_words) + 1);
        let mut parts = Vec::with_capacity(count);
        for _ in 0..count {
            parts.push(self.pick(&NOTE_WORDS));
        }
        let mut sentence = parts.join(" ");
        if let Some(first) = sentence.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        sentence.push('.');
        sentence
    }
}

/// A small fixed board covering every status bucket, a blank row, and a
/// note long enough to truncate.
pub fn sample_rows() -> Vec<Row> {
    vec![
        Row::new()
            .with("ID", "REQ-0003")
            .with("Status", "closed")
            .with("Room", "B-204")
            .with("Notes", "Replaced ceiling light")
            .with(CONFIRM_FIELD, CellValue::Null)
            .with(CLOSE_FIELD, "2026-01-09"),
        Row::new()
            .with("ID", "REQ-0001")
            .with("Status", "new")
            .with("Room", "A-101")
            .with(
                "Notes",
                "Air conditioner leaking onto the desk near the window, tenant reports it \
                 started after the weekend",
            )
            .with(CONFIRM_FIELD, CellValue::Null)
            .with(CLOSE_FIELD, ""),
        Row::new()
            .with("ID", "")
            .with("Status", CellValue::Null)
            .with("Room", "  ")
            .with("Notes", CellValue::Null)
            .with(CONFIRM_FIELD, CellValue::Null)
            .with(CLOSE_FIELD, ""),
        Row::new()
            .with("ID", "REQ-0002")
            .with("Status", "Pending")
            .with("Room", "A-305")
            .with("Notes", "Door lock stuck")
            .with(CONFIRM_FIELD, "Trần Thị Bích")
            .with(CLOSE_FIELD, ""),
        Row::new()
            .with("ID", "REQ-0004")
            .with("Status", "on hold")
            .with("Room", "Annex-12")
            .with("Notes", "Waiting on router replacement")
            .with(CONFIRM_FIELD, CellValue::Null)
            .with(CLOSE_FIELD, ""),
    ]
}

pub fn temp_cache_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join("request-board.json");
    Ok((dir, path))
}

pub fn fixture_datetime() -> OffsetDateTime {
    datetime!(2026-02-19 12:34:56 UTC)
}

fn reference_now() -> OffsetDateTime {
    datetime!(2026-03-01 08:00:00 UTC)
}
