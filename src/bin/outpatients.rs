//! CLI binary for outpatients-ingest.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `IngestConfig` and prints results as JSON on stdout.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use outpatients_ingest::config::GEOCODER_APP_ID_VAR;
use outpatients_ingest::pipeline::fetch::Fetcher;
use outpatients_ingest::pipeline::{opendata, resolve, spreadsheet};
use outpatients_ingest::{
    geocode, ingest, IngestConfig, IngestOutput, IngestProgressCallback, ProgressCallback, Stage,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner on stderr with one log line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Ingesting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage, records: usize, skipped: usize) {
        self.bar.println(format!(
            "  {} {:<20} {:>5} records  {}",
            green("✓"),
            stage.to_string(),
            records,
            dim(&format!("{skipped} skipped")),
        ));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        self.bar
            .println(format!("  {} {:<20} {}", red("✗"), stage.to_string(), red(error)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Current spreadsheet link (null when not yet published)
  outpatients resolve

  # Facilities from the current spreadsheet, or from a given one
  outpatients facilities
  outpatients facilities https://www.pref.hokkaido.lg.jp/fs/.../asahikawa.xlsx

  # Coordinates from the open data
  outpatients locations hospital
  outpatients locations clinic

  # Coordinates for one facility from the search API
  YOLP_APP_ID=dj00... outpatients geocode 市立旭川病院

  # Full run, listing stored facilities that are no longer published
  outpatients run --current-names stored.txt > run.json

ENVIRONMENT VARIABLES:
  YOLP_APP_ID             Geocoder application ID (also read from .env)
  RUST_LOG                Overrides the log filter
"#;

/// Ingest the Hokkaido fever-outpatient listings for Asahikawa.
#[derive(Parser, Debug)]
#[command(
    name = "outpatients",
    version,
    about = "Scrape and normalise Hokkaido fever-outpatient facility data",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Outpatient page that links the spreadsheets.
    #[arg(long, global = true, env = "OUTPATIENTS_PAGE_URL")]
    page_url: Option<String>,

    /// Open-data CSV of hospitals.
    #[arg(long, global = true, env = "OUTPATIENTS_HOSPITAL_CSV")]
    hospital_csv: Option<String>,

    /// Open-data CSV of clinics.
    #[arg(long, global = true, env = "OUTPATIENTS_CLINIC_CSV")]
    clinic_csv: Option<String>,

    /// Municipality kept from the open data.
    #[arg(long, global = true, env = "OUTPATIENTS_CITY")]
    city: Option<String>,

    /// Geocoder application ID.
    #[arg(long, global = true, env = GEOCODER_APP_ID_VAR, hide_env_values = true)]
    app_id: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, global = true, env = "OUTPATIENTS_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "OUTPATIENTS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OUTPATIENTS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OUTPATIENTS_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current spreadsheet link.
    Resolve,

    /// Extract facility rows from a spreadsheet (default: the current one).
    Facilities {
        /// Spreadsheet URL; resolved from the outpatient page when omitted.
        url: Option<String>,
    },

    /// Extract coordinates from an open-data CSV.
    Locations {
        /// `hospital`, `clinic`, or a CSV URL.
        #[arg(default_value = "hospital")]
        source: String,
    },

    /// Look up one facility with the geocoding API.
    Geocode {
        /// Facility name as it appears in the spreadsheet.
        name: String,
    },

    /// Run the whole pipeline.
    Run {
        /// File of stored facility names, one per line; stale names are
        /// reported in the output.
        #[arg(long)]
        current_names: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct RunReport<'a> {
    #[serde(flatten)]
    output: &'a IngestOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    stale_facilities: Option<BTreeSet<String>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && matches!(cli.command, Command::Run { .. });
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress.clone().map(|cb| cb as Arc<dyn IngestProgressCallback>),
    )?;
    let fetcher = Fetcher::new(&config).context("Failed to build HTTP client")?;

    match &cli.command {
        Command::Resolve => {
            let url = resolve::resolve(&fetcher, &config)
                .await
                .context("Failed to resolve spreadsheet link")?;
            print_json(&serde_json::json!({ "source_url": url }))?;
        }

        Command::Facilities { url } => {
            let url = match url {
                Some(u) => u.clone(),
                None => match resolve::resolve(&fetcher, &config)
                    .await
                    .context("Failed to resolve spreadsheet link")?
                {
                    Some(u) => u,
                    None => bail!(
                        "No spreadsheet captioned '{}' on {}",
                        config.caption_token,
                        config.outpatients_page_url
                    ),
                },
            };
            let facilities = spreadsheet::extract(&fetcher, &url, &config)
                .await
                .context("Facility extraction failed")?;
            print_json(&facilities)?;
        }

        Command::Locations { source } => {
            let url = match source.as_str() {
                "hospital" => config.hospital_csv_url.clone(),
                "clinic" => config.clinic_csv_url.clone(),
                other => other.to_string(),
            };
            let locations = opendata::extract(&fetcher, &url, &config)
                .await
                .context("Location extraction failed")?;
            print_json(&locations)?;
        }

        Command::Geocode { name } => {
            let records = geocode(&fetcher, &config, name)
                .await
                .with_context(|| format!("Geocoding '{name}' failed"))?;
            print_json(&records)?;
        }

        Command::Run { current_names } => {
            let current = match current_names {
                Some(path) => Some(read_names(path).await?),
                None => None,
            };
            let result = ingest(&config).await;
            if let Some(cb) = &progress {
                cb.finish();
            }
            let output = result.context("Ingestion failed")?;

            if current.is_some() && output.facilities.is_none() && !cli.quiet {
                eprintln!("No spreadsheet published; nothing is reported stale");
            }
            let report = RunReport {
                stale_facilities: current.map(|c| output.stale_facilities(&c)),
                output: &output,
            };
            print_json(&report)?;

            if !cli.quiet {
                eprintln!(
                    "{} {} facilities, {} locations in {}ms",
                    green("✔"),
                    output.stats.facilities,
                    output.stats.hospital_locations + output.stats.clinic_locations,
                    output.stats.total_duration_ms
                );
            }
        }
    }

    Ok(())
}

/// Map CLI args to `IngestConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder().timeout_secs(cli.timeout);

    if let Some(url) = &cli.page_url {
        builder = builder.outpatients_page_url(url);
    }
    if let Some(url) = &cli.hospital_csv {
        builder = builder.hospital_csv_url(url);
    }
    if let Some(url) = &cli.clinic_csv {
        builder = builder.clinic_csv_url(url);
    }
    if let Some(city) = &cli.city {
        builder = builder.target_city(city);
    }
    if let Some(id) = cli.app_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        builder = builder.geocoder_app_id(id);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Read stored facility names: one per line, blank lines ignored.
async fn read_names(path: &Path) -> Result<BTreeSet<String>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read facility names from {:?}", path))?;
    Ok(parse_names(&text))
}

fn parse_names(text: &str) -> BTreeSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_file_ignores_blank_lines() {
        let names = parse_names("市立旭川病院\n\n  旭川赤十字病院  \r\n");
        assert_eq!(names.len(), 2);
        assert!(names.contains("旭川赤十字病院"));
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["outpatients", "locations", "clinic", "--timeout", "30"]).unwrap();
        assert_eq!(cli.timeout, 30);
        assert!(matches!(cli.command, Command::Locations { ref source } if source == "clinic"));

        let cli = Cli::try_parse_from(["outpatients", "run", "--current-names", "names.txt"]).unwrap();
        assert!(matches!(cli.command, Command::Run { current_names: Some(_) }));
    }

    #[test]
    fn cli_flags_reach_config() {
        let cli = Cli::try_parse_from([
            "outpatients",
            "resolve",
            "--city",
            "札幌市",
            "--page-url",
            "http://127.0.0.1:9/page.html",
        ])
        .unwrap();
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.target_city, "札幌市");
        assert_eq!(config.outpatients_page_url, "http://127.0.0.1:9/page.html");
    }
}
