// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use gridsync_app::{GridController, GridOptions};
use gridsync_http::HttpTransport;
use runtime::HttpRuntime;
use std::env;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "GRIDSYNC_LOG";

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
            "load config {}; run `gridsync --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let log_file = config.log_file()?;
    init_logging(&log_file, &config.log_level())?;

    let transport = HttpTransport::new(config.base_url(), config.timeout()?).with_context(|| {
        format!(
            "invalid [server] config in {}; fix base_url/timeout values",
            options.config_path.display()
        )
    })?;

    let grid_path = options
        .grid_path
        .as_deref()
        .unwrap_or_else(|| config.grid_path());
    let page = transport
        .fetch_page(grid_path)
        .with_context(|| format!("load grid page {grid_path}"))?;
    if let Some(expected) = config.grid_name()
        && page.descriptor.name.as_str() != expected
    {
        bail!(
            "{grid_path} serves grid {:?} but [grid].name expects {expected:?}",
            page.descriptor.name.as_str()
        );
    }

    let options_for_grid = GridOptions {
        theme: config.theme(),
        ..GridOptions::default()
    };
    let mut grid = GridController::new(page, options_for_grid)
        .with_context(|| format!("mount grid served at {grid_path}"))?;
    info!(
        grid = grid.descriptor().name.as_str(),
        location = %grid.location(),
        "grid mounted"
    );
    if options.check_only {
        return Ok(());
    }

    let mut runtime = HttpRuntime::new(transport);
    gridsync_tui::run_app(&mut grid, &mut runtime)
}

fn init_logging(path: &Path, level: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;

    let filter = match env::var(LOG_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives.trim())
            .with_context(|| format!("parse {LOG_ENV} directives"))?,
        _ => EnvFilter::try_new(level).with_context(|| format!("parse log level {level:?}"))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|error| anyhow!("install log subscriber: {error}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    grid_path: Option<String>,
    print_config_path: bool,
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
        grid_path: None,
        print_config_path: false,
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
            "--path" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--path requires a grid path such as /admin/users"))?;
                let value = value.as_ref();
                if !value.starts_with('/') {
                    bail!("--path must start with '/', got {value:?}");
                }
                options.grid_path = Some(value.to_owned());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                bail!("unknown argument {unknown:?}; run with --help to see supported options");
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("gridsync");
    println!("  --config <path>          Use a specific config path");
    println!("  --path <grid path>       Open this grid page instead of [grid].path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a config template");
    println!("  --check                  Validate config, reach the server, mount the grid");
    println!("  --help                   Show this help");
    println!();
    println!("Logs go to [log].file; set {LOG_ENV} to override the level filter.");
}

#[cfg(test)]
mod tests {
    use super::{CliOptions, parse_cli_args};
    use anyhow::Result;
    use std::path::PathBuf;

    fn default_options_path() -> PathBuf {
        PathBuf::from("/tmp/gridsync-config.toml")
    }

    #[test]
    fn parse_cli_args_defaults_to_provided_config_path() -> Result<()> {
        let options = parse_cli_args(Vec::<String>::new(), default_options_path())?;
        assert_eq!(
            options,
            CliOptions {
                config_path: default_options_path(),
                grid_path: None,
                print_config_path: false,
                print_example: false,
                check_only: false,
                show_help: false,
            }
        );
        Ok(())
    }

    #[test]
    fn parse_cli_args_reads_config_and_grid_path() -> Result<()> {
        let options = parse_cli_args(
            ["--config", "/etc/gridsync.toml", "--path", "/admin/orders", "--check"],
            default_options_path(),
        )?;
        assert_eq!(options.config_path, PathBuf::from("/etc/gridsync.toml"));
        assert_eq!(options.grid_path.as_deref(), Some("/admin/orders"));
        assert!(options.check_only);
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_print_flags() -> Result<()> {
        let options = parse_cli_args(
            ["--print-config-path", "--print-example-config", "-h"],
            default_options_path(),
        )?;
        assert!(options.print_config_path);
        assert!(options.print_example);
        assert!(options.show_help);
        Ok(())
    }

    #[test]
    fn parse_cli_args_requires_values() {
        let error = parse_cli_args(["--config"], default_options_path())
            .expect_err("--config without value");
        assert!(error.to_string().contains("requires a file path"));

        let error =
            parse_cli_args(["--path"], default_options_path()).expect_err("--path without value");
        assert!(error.to_string().contains("requires a grid path"));
    }

    #[test]
    fn parse_cli_args_rejects_relative_grid_path() {
        let error = parse_cli_args(["--path", "admin/users"], default_options_path())
            .expect_err("relative path");
        assert!(error.to_string().contains("must start with '/'"));
    }

    #[test]
    fn parse_cli_args_rejects_unknown_flags() {
        let error =
            parse_cli_args(["--demo"], default_options_path()).expect_err("unknown flag");
        assert!(error.to_string().contains("unknown argument \"--demo\""));
    }
}
