//! CLI entry point: loads machines/molds/components and a GA config file as
//! JSON, runs one scheduling request through [`taskalign_scheduler::contract`],
//! and writes the response as JSON — or, with `--serve`, starts the HTTP
//! adapter instead.
//!
//! `try_load` seeds missing files with `Default` and writes them back;
//! malformed files get a `miette` span pointing at the bad line/column.

#![deny(clippy::undocumented_unsafe_blocks, clippy::missing_safety_doc)]

use clap::{
    Parser,
    builder::{Styles, styling::AnsiColor},
};
use miette::{Diagnostic, IntoDiagnostic, NamedSource, Result, SourceOffset};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};
use taskalign_scheduler::contract::{ScheduleRequest, SchedulerConfig};
use thiserror::Error;

const STYLE: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().bold())
    .usage(AnsiColor::Green.on_default().bold())
    .literal(AnsiColor::BrightCyan.on_default().bold())
    .placeholder(AnsiColor::Cyan.on_default());

/// TaskAlign monthly production scheduler
#[derive(Debug, Parser)]
#[command(version, propagate_version = true, about, long_about = None, styles = STYLE, color = clap::ColorChoice::Always)]
struct Cli {
    /// Provide path to machine fleet data file
    #[arg(short, long, value_name = "PATH", default_value_os_t = PathBuf::from("./machines.json"))]
    machines: PathBuf,

    /// Provide path to mold library data file
    #[arg(short = 'o', long, value_name = "PATH", default_value_os_t = PathBuf::from("./molds.json"))]
    molds: PathBuf,

    /// Provide path to component demand data file
    #[arg(short, long, value_name = "PATH", default_value_os_t = PathBuf::from("./components.json"))]
    components: PathBuf,

    /// Provide path to GA/scoring configuration file
    #[arg(short = 'g', long, value_name = "PATH", default_value_os_t = PathBuf::from("./scheduler.json"))]
    config: PathBuf,

    /// Provide path to output schedule file
    #[arg(short = 'u', long, value_name = "PATH", default_value_os_t = PathBuf::from("./schedule.json"))]
    output: PathBuf,

    /// Serve the scheduler over HTTP at ADDR instead of running one request
    /// (e.g. `0.0.0.0:8080`); machine/mold/component/config files are
    /// ignored in this mode, since each HTTP request carries its own.
    #[arg(long, value_name = "ADDR")]
    serve: Option<String>,
}

/// IO errors aside from [`NotFound`](std::io::ErrorKind::NotFound).
#[derive(Debug, Diagnostic, Error)]
#[error("could not load {name} data")]
struct LoadError {
    name: &'static str,

    #[source_code]
    source: String,

    #[label(primary, "{e}")]
    primary_span: miette::SourceSpan,

    #[source]
    e: std::io::Error,
}

/// Error while trying to parse a file.
#[derive(Debug, Diagnostic, Error)]
#[error("could not parse file")]
struct ParseError {
    #[source_code]
    source: NamedSource<String>,

    #[label(primary, "{e}")]
    primary_span: SourceOffset,

    #[source]
    e: serde_json::Error,
}

/// Load `T` from `path`, seeding a default-valued file (and writing it back)
/// when the file doesn't exist yet.
fn try_load<T: Serialize + DeserializeOwned + Default>(path: &Path, name: &'static str) -> Result<T> {
    match File::open(path) {
        Ok(file) => serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            let source = std::fs::read_to_string(path).unwrap_or_default();
            ParseError {
                primary_span: SourceOffset::from_location(&source, e.line(), e.column()),
                e,
                source: NamedSource::new(path.display().to_string(), source).with_language("JSON"),
            }
            .into()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let default = T::default();
            File::create(path)
                .into_diagnostic()
                .and_then(|file| serde_json::to_writer_pretty(file, &default).into_diagnostic())?;
            Ok(default)
        }
        Err(e) => {
            let source = match path.canonicalize() {
                Ok(absolute) => absolute.display().to_string(),
                Err(_) => path.display().to_string(),
            };
            Err(LoadError {
                e,
                name,
                primary_span: (0..source.len()).into(),
                source,
            }
            .into())
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Cli {
        machines,
        molds,
        components,
        config,
        output,
        serve,
    } = match Cli::try_parse() {
        Err(e) if e.kind() == clap::error::ErrorKind::DisplayHelp => {
            return e.print().into_diagnostic();
        }
        cli => cli.into_diagnostic(),
    }?;

    if let Some(addr) = serve {
        taskalign_scheduler::http::serve(&addr);
    }

    let machines = try_load(&machines, "machine")?;
    let molds = try_load(&molds, "mold")?;
    let components = try_load(&components, "component")?;
    let config: SchedulerConfig = try_load(&config, "scheduler config")?;

    let request = ScheduleRequest {
        month_days: config.month_days,
        mold_change_time_hours: config.mold_change_time_hours,
        color_change_time_hours: config.color_change_time_hours,
        machines,
        molds,
        components,
        pop_size: config.pop_size,
        n_generations: config.n_generations,
        mutation_rate: config.mutation_rate,
        seed: config.seed,
        weights: config.weights,
        time_budget_seconds: config.time_budget_seconds,
        worker_threads: config.worker_threads,
    };

    let response = taskalign_scheduler::contract::schedule(request)
        .map_err(|e| miette::miette!("{} ({})", e, e.code()))?;

    tracing::info!(
        assignments = response.assignments.len(),
        unmet = response.unmet.len(),
        score = response.score,
        partial = response.partial,
        "schedule generated"
    );

    serde_json::to_writer_pretty(File::create(output).into_diagnostic()?, &response).into_diagnostic()?;

    Ok(())
}
