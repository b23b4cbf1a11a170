// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::io::{self, Write};
use std::sync::{Mutex, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The system clipboard accepted the text.
    Primary,
    /// The text went out as an OSC 52 escape; the terminal decides.
    Fallback,
    Failed,
}

impl CopyOutcome {
    pub const fn succeeded(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

pub trait ClipboardSink {
    fn name(&self) -> &str;
    fn copy(&mut self, text: &str) -> Result<()>;
}

/// The desktop clipboard through `arboard`, opened on first use.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self { inner: None }
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn ensure(&mut self) -> Result<&mut arboard::Clipboard> {
        if self.inner.is_none() {
            self.inner = Some(arboard::Clipboard::new().context("open system clipboard")?);
        }
        self.inner
            .as_mut()
            .ok_or_else(|| anyhow!("system clipboard unavailable"))
    }
}

impl ClipboardSink for SystemClipboard {
    fn name(&self) -> &str {
        "system"
    }

    fn copy(&mut self, text: &str) -> Result<()> {
        self.ensure()?
            .set_text(text)
            .context("set clipboard text")
    }
}

/// Writes the OSC 52 "set clipboard" sequence to a terminal stream.
#[derive(Debug)]
pub struct Osc52Clipboard<W: Write> {
    out: W,
}

impl<W: Write> Osc52Clipboard<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ClipboardSink for Osc52Clipboard<W> {
    fn name(&self) -> &str {
        "osc52"
    }

    fn copy(&mut self, text: &str) -> Result<()> {
        self.out
            .write_all(osc52_sequence(text).as_bytes())
            .context("write OSC 52 sequence")?;
        self.out.flush().context("flush OSC 52 sequence")
    }
}

pub fn osc52_sequence(text: &str) -> String {
    format!("\x1b]52;c;{}\x07", STANDARD.encode(text.as_bytes()))
}

/// Tries each primary sink in order, then the fallback. Never fails; the
/// outcome only feeds the status line.
pub fn copy_with(
    text: &str,
    primaries: &mut [&mut dyn ClipboardSink],
    fallback: &mut dyn ClipboardSink,
) -> CopyOutcome {
    for sink in primaries.iter_mut() {
        match sink.copy(text) {
            Ok(()) => {
                tracing::debug!(sink = sink.name(), chars = text.chars().count(), "copied");
                return CopyOutcome::Primary;
            }
            Err(error) => {
                tracing::debug!(
                    sink = sink.name(),
                    error = %format!("{error:#}"),
                    "clipboard sink failed"
                );
            }
        }
    }

    match fallback.copy(text) {
        Ok(()) => {
            tracing::info!(sink = fallback.name(), "system clipboard unavailable; used fallback");
            CopyOutcome::Fallback
        }
        Err(error) => {
            tracing::warn!(
                sink = fallback.name(),
                error = %format!("{error:#}"),
                "copy failed"
            );
            CopyOutcome::Failed
        }
    }
}

pub fn copy_to_clipboard(text: &str) -> CopyOutcome {
    // On X11 and Wayland the copied text lives only as long as its owner.
    static SYSTEM: OnceLock<Mutex<SystemClipboard>> = OnceLock::new();
    let mut fallback = Osc52Clipboard::new(io::stdout());
    let system = SYSTEM.get_or_init(|| Mutex::new(SystemClipboard::new()));
    match system.lock() {
        Ok(mut system) => copy_with(text, &mut [&mut *system], &mut fallback),
        Err(poisoned) => {
            let mut system = poisoned.into_inner();
            copy_with(text, &mut [&mut *system], &mut fallback)
        }
    }
}
