// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use reqboard_app::{RequestList, StatusFilter};
use reqboard_cache::CacheStore;
use reqboard_relay::Relay;
use reqboard_source::{Forwarder, RowSource};
use reqboard_tui::{ListRuntime, ViewOptions};
use runtime::{DemoRuntime, SourceRuntime};
use std::env;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `reqboard --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let cache_path = config.cache_path()?;
    if options.print_cache_path {
        println!("{}", cache_path.display());
        return Ok(());
    }

    if options.clear_cache {
        let store = CacheStore::new(&cache_path);
        if store.clear()? {
            println!("removed {}", cache_path.display());
        } else {
            println!("no cache at {}", cache_path.display());
        }
        return Ok(());
    }

    if options.relay {
        return run_relay(&config, &options);
    }

    let source = if options.demo {
        None
    } else {
        Some(
            RowSource::new(config.source_url()?, config.source_timeout()?).with_context(|| {
                format!(
                    "invalid [source] config in {}; fix url/timeout values",
                    options.config_path.display()
                )
            })?,
        )
    };
    if options.check_only {
        return Ok(());
    }

    let list = RequestList::new(config.id_field())
        .with_filter(options.filter.unwrap_or_else(|| config.default_filter()));
    let mode = if options.dump {
        init_tracing(config.log_level(), LogTarget::Stderr)?;
        Launch::Dump
    } else {
        let log_path = config.log_path()?;
        init_tracing(config.log_level(), LogTarget::File(&log_path))?;
        Launch::Dashboard(ViewOptions {
            highlight_fields: config.highlight_fields(),
        })
    };

    match source {
        Some(source) => launch(list, SourceRuntime::new(source, CacheStore::new(cache_path)), mode),
        None => launch(list, DemoRuntime::new(), mode),
    }
}

enum Launch {
    Dashboard(ViewOptions),
    Dump,
}

fn launch<R: ListRuntime>(mut list: RequestList, mut runtime: R, mode: Launch) -> Result<()> {
    match mode {
        Launch::Dashboard(view_options) => {
            tracing::info!(filter = list.filter().as_str(), "starting dashboard");
            reqboard_tui::run_app(&mut list, &mut runtime, view_options)
        }
        Launch::Dump => {
            reqboard_tui::initialize(&mut list, &mut runtime)?;
            println!("{}", dump_rows(&list)?);
            Ok(())
        }
    }
}

fn run_relay(config: &Config, options: &CliOptions) -> Result<()> {
    let forwarder = Forwarder::new(config.relay_downstream_url()?, config.relay_timeout()?)
        .with_context(|| {
            format!(
                "invalid [relay] config in {}; fix downstream_url/timeout values",
                options.config_path.display()
            )
        })?;
    if options.check_only {
        return Ok(());
    }

    init_tracing(config.log_level(), LogTarget::Stderr)?;
    let relay = Relay::bind(config.relay_listen(), forwarder, config.relay_policy())?;
    relay.run()
}

/// The rows the list would display, as a JSON array in display order.
fn dump_rows(list: &RequestList) -> Result<String> {
    let rows = list.displayed_rows().collect::<Vec<_>>();
    serde_json::to_string_pretty(&rows).context("encode rows as JSON")
}

enum LogTarget<'a> {
    Stderr,
    /// The dashboard owns the terminal, so its logs go to a file.
    File(&'a Path),
}

fn init_tracing(level: &str, target: LogTarget<'_>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match target {
        LogTarget::Stderr => builder.with_writer(io::stderr).try_init(),
        LogTarget::File(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| {
                    format!("open log file {}; set [log] file to a writable path", path.display())
                })?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    };
    installed.map_err(|error| anyhow!("initialize logging: {error}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_example: bool,
    print_cache_path: bool,
    check_only: bool,
    demo: bool,
    dump: bool,
    filter: Option<StatusFilter>,
    clear_cache: bool,
    relay: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_example: false,
        print_cache_path: false,
        check_only: false,
        demo: false,
        dump: false,
        filter: None,
        clear_cache: false,
        relay: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--print-cache-path" => {
                options.print_cache_path = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--dump" => {
                options.dump = true;
            }
            "--filter" => {
                let value = iter.next().ok_or_else(|| {
                    anyhow!("--filter requires one of: all, new, pending, closed, other")
                })?;
                options.filter = Some(value.as_ref().parse()?);
            }
            "--clear-cache" => {
                options.clear_cache = true;
            }
            "--relay" => {
                options.relay = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                bail!("unknown argument {unknown:?}; run with --help to see supported options");
            }
        }
    }

    if options.relay && (options.demo || options.dump || options.filter.is_some()) {
        bail!("--relay serves webhooks only; drop --demo, --dump, and --filter");
    }

    Ok(options)
}

fn print_help() {
    println!("reqboard: maintenance request board");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a config template");
    println!("  --print-cache-path       Print resolved cache file path");
    println!("  --check                  Validate config and build HTTP clients");
    println!("  --demo                   Show generated demo rows (no network, no cache)");
    println!("  --dump                   Load once and print the displayed rows as JSON");
    println!("  --filter <name>          Start on all, new, pending, closed, or other");
    println!("  --clear-cache            Delete the cached snapshot");
    println!("  --relay                  Run the webhook relay instead of the board");
    println!("  --help                   Show this help");
}
