// ==============================================================================
// main.rs - HLA Typing Report Entry Point
// ==============================================================================
// Description: Command-line front end: view an upload's QC report, export it
//              to the trial workbook, consolidate exported reports
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hla_report::config::{self, ReportConfig};
use hla_report::models::{report_columns, ConcatenatedPatientRow, ConsolidatedPatientRow};
use hla_report::session::{Panel, ReportSession, SessionView};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show loaded data, QC report, failed-QC rows and the final report
    View {
        /// HLA-LA *_R1_bestGuess_G.txt file
        input: PathBuf,

        #[arg(long, value_enum, default_value = "tsv")]
        format: OutputFormat,
    },

    /// Append the final report to <trial>_hla_typing_report.xlsx
    Export {
        /// HLA-LA *_R1_bestGuess_G.txt file
        input: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Merge every exported patient sheet into one table per patient
    Consolidate {
        #[command(flatten)]
        output: OutputArgs,

        /// Merge each locus's two copies into one "<allele_1>_<allele_2>" column
        #[arg(long)]
        concatenated: bool,

        #[arg(long, value_enum, default_value = "tsv")]
        format: OutputFormat,
    },
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Directory holding the trial workbooks
    #[arg(long, env = config::OUTPUT_DIR_ENV, default_value = config::DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Subfolder of the output directory receiving the consolidation cache
    #[arg(long, env = config::CACHE_SUBFOLDER_ENV, default_value = config::DEFAULT_CACHE_SUBFOLDER)]
    cache_subfolder: String,
}

impl OutputArgs {
    fn config(&self) -> Result<ReportConfig> {
        let config = ReportConfig::new(&self.output_dir, &self.cache_subfolder);
        config.validate()?;
        Ok(config)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Tsv,
    Json,
}

fn main() -> Result<()> {
    // Load .env before clap reads env-backed arguments
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hla_report=info,audit=info".into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    info!("HLA typing report v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::View { input, format } => {
            let mut session = ReportSession::new();
            let view = upload(&mut session, &input)?;
            print_view(view, format)
        }
        Command::Export { input, output } => {
            let config = output.config()?;
            let mut session = ReportSession::new();
            upload(&mut session, &input)?;

            let alert = session.download(&config);
            println!("[{}] {}", alert.color.as_str(), alert.message);

            if !alert.is_success() {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Consolidate {
            output,
            concatenated,
            format,
        } => {
            let config = output.config()?;
            let session = ReportSession::new();
            let outcome = session.consolidate(&config)?;

            if concatenated {
                let table = session.concatenate(&config)?;
                let rows: Vec<Vec<String>> = table.rows.iter().map(ConcatenatedPatientRow::cells).collect();
                print_table(&ConcatenatedPatientRow::column_names(), &rows, &table, format)
            } else {
                let rows: Vec<Vec<String>> = outcome
                    .table
                    .rows
                    .iter()
                    .map(ConsolidatedPatientRow::cells)
                    .collect();
                print_table(&ConsolidatedPatientRow::column_names(), &rows, &outcome.table, format)
            }
        }
    }
}

fn upload<'a>(session: &'a mut ReportSession, input: &Path) -> Result<&'a SessionView> {
    let bytes = std::fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;
    let filename = input
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid input path: {:?}", input))?
        .to_string_lossy()
        .to_string();

    Ok(session.upload(&bytes, &filename))
}

fn print_view(view: &SessionView, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        serde_json::to_writer_pretty(std::io::stdout().lock(), view)?;
        println!();
        return Ok(());
    }

    println!("## Loaded Data");
    match &view.loaded_data {
        Panel::Ready(dataset) => write_tsv(&dataset.columns, &dataset.rows)?,
        Panel::Message(message) => println!("{}", message),
    }

    println!("\n## Quality Control Report");
    match &view.qc_report {
        Panel::Ready(report) => {
            println!("{}", report.title);
            let header: Vec<String> = ["ChromosomeCopy", "Locus", "Allele", "AverageCoverage", "Q1", "proportionkMersCovered"]
                .iter()
                .map(|c| c.to_string())
                .collect();
            let rows: Vec<Vec<String>> = [(1, &report.chromosome_copy_1), (2, &report.chromosome_copy_2)]
                .into_iter()
                .flat_map(|(copy, points)| {
                    points.iter().map(move |p| {
                        vec![
                            copy.to_string(),
                            p.locus.clone(),
                            p.allele.clone(),
                            p.coverage_label.clone(),
                            p.q1.to_string(),
                            p.proportion_kmers_covered.to_string(),
                        ]
                    })
                })
                .collect();
            write_tsv(&header, &rows)?;
        }
        Panel::Message(message) => println!("{}", message),
    }

    println!("\n## Filtered Data");
    match &view.filtered_data {
        Panel::Ready(failed) => {
            let header: Vec<String> = ["Locus", "Chromosome", "Allele", "AverageCoverage", "Q1", "Q2", "proportionkMersCovered", "QC_PASSED"]
                .iter()
                .map(|c| c.to_string())
                .collect();
            let rows: Vec<Vec<String>> = failed
                .iter()
                .map(|f| {
                    vec![
                        f.row.locus.clone(),
                        f.row.chromosome_copy.to_string(),
                        f.row.allele.clone(),
                        f.row.average_coverage.to_string(),
                        f.row.q1.to_string(),
                        f.row.q2.to_string(),
                        f.row.proportion_kmers_covered.to_string(),
                        if f.qc_passed { "True" } else { "False" }.to_string(),
                    ]
                })
                .collect();
            write_tsv(&header, &rows)?;
        }
        Panel::Message(message) => println!("{}", message),
    }

    println!("\n## Final Report Table");
    match &view.final_report {
        Panel::Ready(report) => {
            let header: Vec<String> = report_columns::ORDER.iter().map(|c| c.to_string()).collect();
            let rows: Vec<Vec<String>> = report.iter().map(|r| r.cells().to_vec()).collect();
            write_tsv(&header, &rows)?;
        }
        Panel::Message(message) => println!("{}", message),
    }

    Ok(())
}

fn print_table<T: Serialize>(header: &[String], rows: &[Vec<String>], table: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(std::io::stdout().lock(), table)?;
            println!();
            Ok(())
        }
        OutputFormat::Tsv => write_tsv(header, rows),
    }
}

fn write_tsv(header: &[String], rows: &[Vec<String>]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(std::io::stdout().lock());

    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
