//! `timescale-doctor` binary.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use timescale_doctor::cli::Cli;
use timescale_doctor::reporter::{to_json, write_listing, NullSink, TextReporter};
use timescale_doctor::{build_registry, CheckRunner, PgDatabase};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli, &mut io::stdout().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("timescale-doctor: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Route `log` records to stderr. `RUST_LOG` takes precedence over `-v`/`-q`.
fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run<W: Write>(cli: &Cli, out: &mut W) -> anyhow::Result<()> {
    let registry = build_registry().context("rule catalogue is invalid")?;

    // Listing needs neither the configuration file nor a connection.
    if let Some(ref pattern) = cli.list {
        write_listing(out, registry.list(pattern)?, cli.show.unwrap_or_default())?;
        return Ok(());
    }

    let working_dir = std::env::current_dir().context("cannot determine working directory")?;
    let config = cli.load_config(&working_dir)?;
    let runner = CheckRunner::new(&registry, &config)?;
    let params = cli.connect_params()?;
    let mut db = PgDatabase::connect(&params, config.connect_options())?;

    if cli.json {
        let report = runner.check_all(&mut db, &mut NullSink)?;
        let json = to_json(&report).map_err(anyhow::Error::msg)?;
        writeln!(out, "{json}")?;
    } else {
        let mut reporter = TextReporter::new(out, config.wrap_width);
        runner.check_all(&mut db, &mut reporter)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_does_not_read_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[check\n").unwrap();

        let config = path.to_str().unwrap();
        let cli = Cli::try_parse_from(["timescale-doctor", "--list", "index.*", "--config", config]).unwrap();
        let mut out = Vec::new();
        run(&cli, &mut out).unwrap();

        let listing = String::from_utf8(out).unwrap();
        assert!(listing.starts_with("index."), "{listing}");
    }
}
