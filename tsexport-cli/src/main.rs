//! CLI for the tsexport time-series exporter.
//!
//! Exports observations from a block store to stdout or a file. Logs go to
//! stderr so stdout can carry the export.

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tsexport::config::{
    ExportConfig, RawOptions, DEFAULT_DB_PATH, DEFAULT_MAX_TIME, DEFAULT_MIN_TIME, STDOUT_TARGET,
};
use tsexport::{export, ExportSummary, Format};

/// tsexport: stream time-series observations to JSON lines or CSV.
#[derive(Parser, Debug)]
#[command(name = "tsexport", version, about)]
struct Cli {
    #[arg(short = 'f', long, default_value = "json", help = format_help())]
    format: String,

    /// Lower time bound (RFC 3339).
    #[arg(long = "mint", visible_alias = "min", default_value = DEFAULT_MIN_TIME)]
    min_time: String,

    /// Upper time bound (RFC 3339).
    #[arg(long = "maxt", visible_alias = "max", default_value = DEFAULT_MAX_TIME)]
    max_time: String,

    /// Metric name to export. Repeatable.
    #[arg(short = 'N', long = "name")]
    names: Vec<String>,

    /// `label:value` equality filter. Repeatable.
    #[arg(short = 'S', long = "select")]
    filters: Vec<String>,

    /// Path to the database directory.
    #[arg(short = 'p', long, default_value = DEFAULT_DB_PATH)]
    path: String,

    /// Output file, `-` for stdout.
    #[arg(short = 'o', long, default_value = STDOUT_TARGET)]
    out: String,

    /// Label to include, `*` for all. Repeatable. Defaults to `*`.
    #[arg(short = 'I', long = "include-label")]
    include: Vec<String>,

    /// Label to exclude. Repeatable.
    #[arg(short = 'E', long = "exclude-label")]
    exclude: Vec<String>,

    /// Hold the store lock file while exporting.
    #[arg(long)]
    lock: bool,

    /// Log level when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn format_help() -> String {
    format!("Output format, one of: {}", Format::names())
}

impl From<Cli> for RawOptions {
    fn from(cli: Cli) -> Self {
        RawOptions {
            format: cli.format,
            min_time: cli.min_time,
            max_time: cli.max_time,
            metric_names: cli.names,
            filters: cli.filters,
            db_path: cli.path,
            output: cli.out,
            include: cli.include,
            exclude: cli.exclude,
            lockfile: cli.lock,
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(RawOptions::from(cli)) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(options: RawOptions) -> Result<ExportSummary, Box<dyn std::error::Error>> {
    let config = ExportConfig::from_raw(options)?;
    let store = config.open_store()?;
    tracing::info!(
        path = %config.db_path.display(),
        series = store.series_count(),
        output = %config.output,
        "Opened store"
    );

    let mut out = config.open_output()?;
    let summary = export(&store, &config.criteria, config.format, &mut out)?;
    out.flush()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tsexport::labels::Labels;
    use tsexport::storage::block::BlockWriter;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["tsexport"]);
        let raw = RawOptions::from(cli);
        assert_eq!(raw, RawOptions::default());
    }

    #[test]
    fn test_short_and_alias_flags() {
        let cli = Cli::parse_from([
            "tsexport", "-f", "csv", "--min", "2024-01-01T00:00:00Z", "--max",
            "2024-01-02T00:00:00Z", "-N", "up", "-N", "down", "-S", "job:api", "-p", "/tmp/db",
            "-o", "out.csv", "-I", "job", "-E", "pod", "--lock",
        ]);
        let raw = RawOptions::from(cli);
        assert_eq!(raw.format, "csv");
        assert_eq!(raw.min_time, "2024-01-01T00:00:00Z");
        assert_eq!(raw.max_time, "2024-01-02T00:00:00Z");
        assert_eq!(raw.metric_names, ["up", "down"]);
        assert_eq!(raw.filters, ["job:api"]);
        assert_eq!(raw.db_path, "/tmp/db");
        assert_eq!(raw.output, "out.csv");
        assert_eq!(raw.include, ["job"]);
        assert_eq!(raw.exclude, ["pod"]);
        assert!(raw.lockfile);
    }

    #[test]
    fn test_run_exports_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("db");
        let mut writer = BlockWriter::create(&db).unwrap();
        writer
            .add_series(
                Labels::from_pairs([("__name__", "up"), ("job", "api")]),
                &[(1, 1.0)],
            )
            .unwrap();
        writer.finish().unwrap();

        let out = dir.path().join("out.json");
        let summary = run(RawOptions {
            metric_names: vec!["up".to_string()],
            db_path: db.display().to_string(),
            output: out.display().to_string(),
            ..RawOptions::default()
        })
        .unwrap();

        assert_eq!(summary.records_exported, 1);
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "{\"__name__\":\"up\",\"__time__\":\"1\",\"__value__\":\"1.000000\",\"job\":\"api\"}\n"
        );
    }

    #[test]
    fn test_run_rejects_bad_config() {
        let err = run(RawOptions {
            db_path: "/definitely/not/here".to_string(),
            ..RawOptions::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("cannot be accessed"));
    }
}
