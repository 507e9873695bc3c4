use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use salescope::{
    analysis, build_calendar, generate, markdown_report, read_table, summarize, Analysis, Config,
    DateRange, Exporter, Generator, Normalizer,
};

/// Analytics for e-commerce sales data: generate, normalize, aggregate,
/// export.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate synthetic sales (and optionally customer) datasets
    Generate {
        /// Number of sales records to generate
        #[arg(long, default_value_t = 5000)]
        count: i64,
        /// Also generate this many customer records
        #[arg(long)]
        customers: Option<i64>,
        /// Range start, YYYY-MM-DD (default: one year ago)
        #[arg(long)]
        start: Option<String>,
        /// Range end, YYYY-MM-DD (default: today)
        #[arg(long)]
        end: Option<String>,
        /// Output directory for the generated CSVs
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// RNG seed for reproducible datasets
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Analyse a dataset and export every breakdown as CSV
    Analyze {
        /// Input file (.csv, .json, or .arrow)
        file: PathBuf,
        /// Directory for the exported artifacts
        #[arg(long)]
        export_dir: Option<PathBuf>,
        /// Also write a narrative Markdown report
        #[arg(long)]
        report: bool,
        /// Also write a JSON profile of the normalized table
        #[arg(long)]
        summary: bool,
    },
    /// Build a calendar dimension table for date joins
    Calendar {
        /// Range start, YYYY-MM-DD
        start: String,
        /// Range end, YYYY-MM-DD
        end: String,
        /// Directory for the calendar CSV
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Print a JSON profile of a tabular file
    Inspect {
        /// Input file (.csv, .json, or .arrow)
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = Config::from_env();

    match args.command {
        Command::Generate {
            count,
            customers,
            start,
            end,
            out_dir,
            seed,
        } => {
            if let Some(dir) = out_dir {
                config.data_dir = dir;
            }
            let range = DateRange::parse(start.as_deref(), end.as_deref())?;
            let mut generator = match seed {
                Some(seed) => Generator::with_seed(seed),
                None => Generator::new(),
            };
            let sales = generator.sales(count, &range, &config);
            let path = generate::write_sales_csv(&sales, &config.data_dir)?;
            println!("{} sales records written to {}", sales.len(), path.display());
            if let Some(n) = customers {
                let customers = generator.customers(n, &config);
                let path = generate::write_customers_csv(&customers, &config.data_dir)?;
                println!(
                    "{} customer records written to {}",
                    customers.len(),
                    path.display()
                );
            }
        }
        Command::Analyze {
            file,
            export_dir,
            report,
            summary,
        } => {
            if let Some(dir) = export_dir {
                config.export_dir = dir;
            }
            run_analysis(&file, &config, report, summary)?;
        }
        Command::Calendar {
            start,
            end,
            out_dir,
        } => {
            if let Some(dir) = out_dir {
                config.export_dir = dir;
            }
            let calendar = build_calendar(&start, &end)?;
            let exporter = Exporter::from_config(&config)?;
            let path = exporter.write_table(&calendar, "calendar")?;
            println!(
                "calendar with {} days written to {}",
                calendar.n_rows(),
                path.display()
            );
        }
        Command::Inspect { file } => {
            let table = read_table(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            println!("{}", summarize(&table).to_json()?);
        }
    }
    Ok(())
}

fn run_analysis(file: &std::path::Path, config: &Config, report: bool, summary: bool) -> Result<()> {
    let raw = read_table(file).with_context(|| format!("reading {}", file.display()))?;
    let normalizer = Normalizer::new(config)?;
    let (table, norm_report) = normalizer.normalize(raw);
    if norm_report.dropped_rows > 0 {
        println!(
            "dropped {} rows with null identifier columns",
            norm_report.dropped_rows
        );
    }
    for warning in &norm_report.warnings {
        println!("warning: {warning}");
    }

    let mut analyses: BTreeMap<String, Analysis> = BTreeMap::new();
    if table.has_column("date") && table.has_column("total_value") {
        analyses.insert(
            "period".to_string(),
            analysis::by_period(&table, "date", "total_value")?,
        );
    } else {
        println!("skipping period analysis: no date/total_value columns");
    }
    if table.has_column("product_category") && table.has_column("total_value") {
        analyses.insert(
            "category".to_string(),
            analysis::by_category(&table, "product_category", "total_value")?,
        );
    }
    if table.has_column("total_value") {
        match analysis::by_region(&table, None, "total_value") {
            Ok(analysis) => {
                analyses.insert("region".to_string(), analysis);
            }
            Err(salescope::Error::ColumnNotFound(_)) => {
                println!("skipping region analysis: no region-like column");
            }
            Err(e) => return Err(e.into()),
        }
    }
    for analysis in analyses.values() {
        for warning in &analysis.warnings {
            println!("warning: {warning}");
        }
    }

    let exporter = Exporter::from_config(config)?;
    let mut produced = Vec::new();
    for (name, analysis) in &analyses {
        let export_name = match name.as_str() {
            "period" => "sales",
            "category" => "sales_by_category",
            _ => "sales_by_region",
        };
        produced.extend(exporter.export(export_name, &analysis.node)?);
    }
    println!("exported {} analysis files:", produced.len());
    for (logical, path) in &produced {
        println!("- {logical}: {}", path.display());
    }

    if summary {
        let json = summarize(&table).to_json()?;
        let path = exporter.write_text("table_summary", "json", &json)?;
        println!("table summary written to {}", path.display());
    }
    if report {
        let content = markdown_report("E-commerce sales report", &table, &analyses);
        let path = exporter.write_text("sales_report", "md", &content)?;
        println!("report written to {}", path.display());
    }
    Ok(())
}
