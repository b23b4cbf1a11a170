// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use reqboard_app::{CacheEntry, Row};
use reqboard_cache::CacheStore;
use reqboard_source::RowSource;
use reqboard_testkit::RequestFaker;
use reqboard_tui::{InternalEvent, ListRuntime};
use std::sync::mpsc::Sender;
use std::thread;

const DEMO_SEED: u64 = 2026;
const DEMO_ROWS: usize = 48;

/// Live runtime: rows from the configured endpoint, snapshot in the cache file.
pub struct SourceRuntime {
    source: RowSource,
    cache: CacheStore,
}

impl SourceRuntime {
    pub fn new(source: RowSource, cache: CacheStore) -> Self {
        Self { source, cache }
    }
}

impl ListRuntime for SourceRuntime {
    fn load_cached(&mut self) -> Result<Option<CacheEntry>> {
        self.cache.load()
    }

    fn fetch_rows(&mut self) -> Result<Vec<Row>> {
        Ok(self.source.fetch_rows()?)
    }

    fn spawn_fetch(&mut self, tx: Sender<InternalEvent>) -> Result<()> {
        let source = self.source.clone();
        thread::Builder::new()
            .name("reqboard-fetch".to_owned())
            .spawn(move || {
                let result = source.fetch_rows().map_err(|error| error.to_string());
                // The loop may already be gone after a quit.
                let _ = tx.send(InternalEvent::Fetched(result));
            })
            .context("spawn fetch thread")?;
        Ok(())
    }

    fn store_cache(&mut self, entry: &CacheEntry) -> Result<()> {
        self.cache.store(entry)
    }
}

/// Offline runtime backed by generated rows. Nothing is read from or written
/// to disk.
pub struct DemoRuntime {
    faker: RequestFaker,
}

impl DemoRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for DemoRuntime {
    fn default() -> Self {
        Self {
            faker: RequestFaker::new(DEMO_SEED),
        }
    }
}

impl ListRuntime for DemoRuntime {
    fn load_cached(&mut self) -> Result<Option<CacheEntry>> {
        Ok(None)
    }

    fn fetch_rows(&mut self) -> Result<Vec<Row>> {
        Ok(self.faker.batch(DEMO_ROWS))
    }

    fn store_cache(&mut self, _entry: &CacheEntry) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DemoRuntime, SourceRuntime};
    use anyhow::{Result, anyhow};
    use reqboard_app::{CacheEntry, ListEvent, RequestList, SnapshotOrigin, clean_and_sort};
    use reqboard_cache::CacheStore;
    use reqboard_source::RowSource;
    use reqboard_testkit::{sample_rows, temp_cache_path};
    use std::thread;
    use std::time::Duration;
    use time::OffsetDateTime;
    use tiny_http::{Header, Response, Server};

    fn serve_once(status: u16, body: String) -> Result<(String, thread::JoinHandle<()>)> {
        let server =
            Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
        let url = format!("http://{}/exec", server.server_addr());
        let handle = thread::spawn(move || {
            let request = server.recv().expect("request expected");
            let header = Header::from_bytes("Content-Type", "application/json")
                .expect("static header is valid");
            request
                .respond(
                    Response::from_string(body)
                        .with_status_code(status)
                        .with_header(header),
                )
                .expect("response should succeed");
        });
        Ok((url, handle))
    }

    #[test]
    fn source_runtime_publishes_network_rows_and_writes_cache() -> Result<()> {
        let body = serde_json::to_string(&sample_rows())?;
        let (url, server) = serve_once(200, body)?;
        let (_dir, cache_path) = temp_cache_path()?;
        let store = CacheStore::new(&cache_path);
        let mut runtime =
            SourceRuntime::new(RowSource::new(&url, Duration::from_secs(5))?, store.clone());

        let mut list = RequestList::default();
        let events = reqboard_tui::initialize(&mut list, &mut runtime)?;
        server.join().expect("server thread should join");

        assert_eq!(list.origin(), SnapshotOrigin::Network);
        assert_eq!(list.total_len(), 4);
        assert!(!list.is_loading());
        assert!(events.contains(&ListEvent::RevalidationFinished));

        let stored = store.load()?.ok_or_else(|| anyhow!("cache should be written"))?;
        assert_eq!(stored.rows, list.snapshot());
        Ok(())
    }

    #[test]
    fn source_failure_keeps_cached_rows() -> Result<()> {
        let (_dir, cache_path) = temp_cache_path()?;
        let store = CacheStore::new(&cache_path);
        // The file keeps whole milliseconds.
        let now = OffsetDateTime::now_utc();
        let captured_at = now.replace_millisecond(now.millisecond())?;
        let cached = CacheEntry::new(captured_at, clean_and_sort(&sample_rows()));
        store.store(&cached)?;

        let (url, server) = serve_once(503, "script quota exceeded".to_owned())?;
        let mut runtime =
            SourceRuntime::new(RowSource::new(&url, Duration::from_secs(5))?, store.clone());

        let mut list = RequestList::default();
        let events = reqboard_tui::initialize(&mut list, &mut runtime)?;
        server.join().expect("server thread should join");

        assert_eq!(list.origin(), SnapshotOrigin::FreshCache);
        assert_eq!(list.snapshot(), cached.rows.as_slice());
        assert!(events.iter().any(|event| matches!(
            event,
            ListEvent::FetchFailed(message) if message.contains("503")
        )));
        assert_eq!(store.load()?, Some(cached));
        Ok(())
    }

    #[test]
    fn demo_runtime_loads_generated_rows_without_disk() -> Result<()> {
        let mut runtime = DemoRuntime::new();
        let mut list = RequestList::default();
        reqboard_tui::initialize(&mut list, &mut runtime)?;

        assert_eq!(list.origin(), SnapshotOrigin::Network);
        assert_eq!(list.total_len(), 48);
        assert!(list.snapshot().iter().all(|row| !row.is_blank()));
        Ok(())
    }
}
