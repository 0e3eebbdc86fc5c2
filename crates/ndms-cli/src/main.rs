// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow};
use config::Config;
use ndms_app::Controller;
use runtime::WorkerRuntime;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "NDMS_LOG";

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
            "load config {}; run `ndms --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let base_url = options
        .api_url
        .clone()
        .unwrap_or_else(|| config.api_base_url());
    let timeout = config.api_timeout()?;
    let client = ndms_api::Client::new(&base_url, timeout).with_context(|| {
        format!(
            "invalid [api] config in {}; fix base_url/timeout or pass --api-url",
            options.config_path.display()
        )
    })?;
    if options.check_only {
        println!("config ok: {} (api {})", options.config_path.display(), client.base_url());
        return Ok(());
    }

    let log_path = config.log_path()?;
    init_logging(&log_path, config.log_level())?;
    tracing::info!(
        config = %options.config_path.display(),
        api = client.base_url(),
        demo = options.demo,
        "config loaded"
    );

    let mut controller = Controller::new(config.start_type());
    if options.demo {
        let mut runtime = WorkerRuntime::demo();
        ndms_tui::run_app(&mut controller, &mut runtime)
    } else {
        let mut runtime = WorkerRuntime::new(client);
        ndms_tui::run_app(&mut controller, &mut runtime)
    }
}

/// Logs go to a file because the terminal UI owns stdout.
fn init_logging(path: &Path, configured_level: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| {
            format!(
                "open log file {} -- set [log].file to a writable path",
                path.display()
            )
        })?;

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(configured_level))
        .with_context(|| format!("invalid log level {configured_level:?} in [log].level"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .try_init()
        .map_err(|error| anyhow!("install log subscriber: {error}"))?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    api_url: Option<String>,
    print_config_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        api_url: None,
        print_config_path: false,
        demo: false,
        print_example: false,
        check_only: false,
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
            "--api-url" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--api-url requires a URL, e.g. http://localhost:8080"))?;
                options.api_url = Some(value.as_ref().to_owned());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("ndms - disaster record viewer");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a config template");
    println!("  --api-url <url>          Backend base URL (overrides config and NDMS_API_URL)");
    println!("  --demo                   Launch against seeded in-memory records");
    println!("  --check                  Validate config and API settings, then exit");
    println!("  --help                   Show this help");
}
