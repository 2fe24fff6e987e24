use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use sizectl::advisor::{AdvisorSettings, AiAdvisor, DeterministicStrategy, HttpCompletionClient, SizingStrategy};
use sizectl::catalog::{Catalog, CatalogProvider, FileCatalogProvider, Manufacturer};
use sizectl::config::{self, Config};
use sizectl::error::{ConfigError, SizectlError};
use sizectl::exit_codes::exit_code_for_anyhow;
use sizectl::grouping::{group_by_account_region, stamp_account_region};
use sizectl::report::{self, ExportFormat};
use sizectl::requirements::{load_records, normalize_records};
use sizectl::sizing::{vcpu_memory_ratio, RecommendationBatch, Workload};
use sizectl::source::is_s3;
use sizectl::utils::{ensure_parent_dir, format_price, monthly_cost, normalize_memory_gb, round1};
use sizectl::validation::{validate_cpu, validate_memory, validate_output_format, validate_path};

#[derive(Parser)]
#[command(name = "sizectl")]
#[command(
    about = "EC2 instance sizing for VM migrations",
    long_about = "sizectl recommends AWS EC2 instance types for on-premises VMs.\n\nGiven a pricing catalog and a list of VMs (CPU, memory, optional manufacturer\nor pre-defined instance type), it picks the cheapest fitting instance of the\npreferred manufacturer plus alternatives from other manufacturers.\n\nModes:\n  - Ratio-based engine (default, deterministic)\n  - AI advisor (--ai), falling back to the engine per VM on failure"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, global = true, default_value = "text")]
    output: String,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend instance types for a list of VMs
    Recommend {
        /// VM list (CSV or JSON, local path or s3://bucket/key)
        #[arg(short, long)]
        input: String,
        /// Instance catalog (CSV or JSON, local path or s3://bucket/key)
        #[arg(long, env = "SIZECTL_CATALOG")]
        catalog: Option<String>,
        /// Default manufacturer preference (Intel, AMD, AWS)
        #[arg(short, long, env = "SIZECTL_MANUFACTURER")]
        manufacturer: Option<String>,
        /// Use the AI advisor
        #[arg(long)]
        ai: bool,
        /// Size each account/region group separately
        #[arg(long)]
        group_by_account: bool,
        /// Export format (csv, html)
        #[arg(long)]
        export: Option<String>,
        /// Export file path (default: sizing_report.<format>)
        #[arg(long)]
        export_file: Option<PathBuf>,
    },
    /// List catalog instances that fit a size
    Catalog {
        /// Instance catalog (CSV or JSON, local path or s3://bucket/key)
        #[arg(long, env = "SIZECTL_CATALOG")]
        catalog: Option<String>,
        /// Only this manufacturer
        #[arg(short, long)]
        manufacturer: Option<String>,
        /// Minimum vCPUs
        #[arg(long, default_value_t = 0)]
        min_cpu: u32,
        /// Minimum memory in GB (values above 100 are read as MiB)
        #[arg(long, default_value_t = 0.0)]
        min_memory: f64,
        /// Maximum rows to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show the workload class for a CPU/memory pair
    Classify {
        #[arg(long)]
        cpu: u32,
        /// Memory in GB, or MiB when above 100
        #[arg(long)]
        memory: f64,
    },
    /// Initialize sizing configuration
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = ".sizectl.toml")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool, json: bool) {
    // Suppress INFO by default; RUST_LOG overrides unless --verbose is given
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // Logs go to stderr so JSON on stdout stays parseable
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code_for_anyhow(&e));
    }
}

async fn run(cli: Cli) -> Result<()> {
    validate_output_format(&cli.output)?;
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Recommend {
            input,
            catalog,
            manufacturer,
            ai,
            group_by_account,
            export,
            export_file,
        } => {
            let options = RecommendOptions {
                input,
                catalog,
                manufacturer,
                ai,
                group_by_account,
                export,
                export_file,
            };
            recommend(options, &config, &cli.output).await?;
        }
        Commands::Catalog {
            catalog,
            manufacturer,
            min_cpu,
            min_memory,
            limit,
        } => {
            list_catalog(catalog, manufacturer, min_cpu, min_memory, limit, &config, &cli.output).await?;
        }
        Commands::Classify { cpu, memory } => {
            classify(cpu, memory, &cli.output)?;
        }
        Commands::Init { output } => {
            config::init_config(&output)?;
        }
    }

    Ok(())
}

struct RecommendOptions {
    input: String,
    catalog: Option<String>,
    manufacturer: Option<String>,
    ai: bool,
    group_by_account: bool,
    export: Option<String>,
    export_file: Option<PathBuf>,
}

fn catalog_location(flag: Option<String>, config: &Config) -> Result<String> {
    let location = flag
        .or_else(|| config.sizing.catalog.clone())
        .ok_or_else(|| SizectlError::from(ConfigError::MissingField("sizing.catalog".to_string())))
        .context("No catalog given: pass --catalog, set SIZECTL_CATALOG or sizing.catalog in the config")?;
    if !is_s3(&location) {
        validate_path(&location)?;
    }
    Ok(location)
}

fn default_manufacturer(flag: Option<&str>, config: &Config) -> Result<Manufacturer> {
    match flag {
        Some(m) => Ok(m.parse::<Manufacturer>()?),
        None => Ok(config.default_manufacturer()?),
    }
}

async fn load_catalog(location: &str) -> Result<Catalog> {
    let catalog = FileCatalogProvider::new(location).load().await?;
    Ok(catalog)
}

async fn recommend(options: RecommendOptions, config: &Config, output: &str) -> Result<()> {
    let catalog_location = catalog_location(options.catalog, config)?;
    let manufacturer = default_manufacturer(options.manufacturer.as_deref(), config)?;
    if !is_s3(&options.input) {
        validate_path(&options.input)?;
    }
    let export_format = options
        .export
        .as_deref()
        .map(str::parse::<ExportFormat>)
        .transpose()?;

    let catalog = load_catalog(&catalog_location).await?;
    let records = load_records(&options.input).await?;

    let progress = if options.ai && output == "text" {
        let pb = ProgressBar::new(records.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message("Analyzing VMs...");
        Some(pb)
    } else {
        None
    };

    let strategy: Box<dyn SizingStrategy> = if options.ai {
        let client = HttpCompletionClient::from_config(&config.ai)?;
        let mut advisor = AiAdvisor::new(client, AdvisorSettings::from(&config.ai));
        if let Some(pb) = &progress {
            advisor = advisor.with_progress(pb.clone());
        }
        Box::new(advisor)
    } else {
        Box::new(DeterministicStrategy)
    };

    let mut batches: Vec<RecommendationBatch> = Vec::new();
    if options.group_by_account {
        for group in group_by_account_region(&records) {
            let requirements = normalize_records(&group.records);
            let mut batch = strategy
                .recommend_batch(&requirements, &catalog, manufacturer)
                .await;
            stamp_account_region(&mut batch.recommendations, &group.account_id, &group.region);
            batch.group_key = Some(group.key());
            batch.account_id = Some(group.account_id);
            batch.region = Some(group.region);
            batches.push(batch);
        }
    } else {
        let requirements = normalize_records(&records);
        batches.push(
            strategy
                .recommend_batch(&requirements, &catalog, manufacturer)
                .await,
        );
    }

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    match output {
        "json" => println!("{}", report::to_json(&batches)?),
        _ => report::print_text(&batches),
    }

    if let Some(format) = export_format {
        let path = options
            .export_file
            .unwrap_or_else(|| PathBuf::from(format!("sizing_report.{}", format.extension())));
        validate_path(&path.to_string_lossy())?;
        ensure_parent_dir(&path)?;
        report::export(&batches, format, &path)
            .with_context(|| format!("Failed to export report to {}", path.display()))?;
        if output == "text" {
            println!("Exported report: {}", path.display());
        }
    }

    Ok(())
}

async fn list_catalog(
    location: Option<String>,
    manufacturer: Option<String>,
    min_cpu: u32,
    min_memory: f64,
    limit: usize,
    config: &Config,
    output: &str,
) -> Result<()> {
    let location = catalog_location(location, config)?;
    let manufacturer = manufacturer
        .as_deref()
        .map(str::parse::<Manufacturer>)
        .transpose()?;
    let catalog = load_catalog(&location).await?;

    let mut rows: Vec<_> = catalog
        .eligible(min_cpu, normalize_memory_gb(min_memory), manufacturer)
        .collect();
    rows.sort_by(|a, b| a.hourly_price.total_cmp(&b.hourly_price));
    rows.truncate(limit);

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Instance", "Manufacturer", "vCPUs", "Memory GB", "Price/h", "Price/month"]);
    for row in &rows {
        table.add_row(vec![
            row.instance_type.clone(),
            row.manufacturer.to_string(),
            row.vcpus.to_string(),
            format!("{:.1}", row.memory_gb),
            format_price(row.hourly_price),
            format_price(monthly_cost(row.hourly_price)),
        ]);
    }
    println!("{}", table);
    println!("{} of {} catalog rows", rows.len(), catalog.len());
    Ok(())
}

fn classify(cpu: u32, memory: f64, output: &str) -> Result<()> {
    validate_cpu(cpu)?;
    validate_memory(memory)?;

    let memory_gb = normalize_memory_gb(memory);
    let ratio = vcpu_memory_ratio(cpu, memory_gb);
    let workload = Workload::classify(ratio);

    if output == "json" {
        let value = json!({
            "cpu": cpu,
            "memory_gb": round1(memory_gb),
            "ratio": round1(ratio),
            "workload": workload.label(),
            "families": workload.family_preference(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!(
            "{} vCPU / {:.1} GB → ratio {:.1}:1 → {} ({})",
            cpu,
            memory_gb,
            ratio,
            workload.label(),
            workload.family_preference().join(", ")
        );
    }
    Ok(())
}
