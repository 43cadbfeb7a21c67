use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{env, fs, path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::{filter::LevelFilter, fmt, EnvFilter};
use tradestat::{
    cleanup::{spawn_cleanup_loop, CleanupQueue},
    hscodes::load_hs_codes_or_empty,
    portal::HttpSessionFactory,
    series::CsvDirStore,
    Config, FiscalYear, Pipeline, TradeRequest, TradeType,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Scrape HS-code trade series from the tradestat portal")]
struct Cli {
    /// YAML config; flags below override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape, aggregate and package the selected HS codes.
    Fetch {
        #[arg(long = "hs", required = true)]
        hs_codes: Vec<String>,
        #[arg(long, default_value = "2015-16")]
        start: FiscalYear,
        #[arg(long, default_value = "2024-25")]
        end: FiscalYear,
        #[arg(long, default_value = "import")]
        trade: TradeType,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also write the chart series as JSON.
        #[arg(long)]
        chart_json: Option<PathBuf>,
    },
    /// List the reference HS codes.
    Codes {
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// List the selectable fiscal years.
    Years,
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tradestat=info"))
        .add_directive(log_level.parse().unwrap_or(LevelFilter::INFO.into()));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_yaml_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Fetch {
            hs_codes,
            start,
            end,
            trade,
            out,
            chart_json,
        } => {
            let mut config = config;
            if let Some(out) = out {
                config.output_dir = out;
            }
            let request = TradeRequest::new(hs_codes, start.start_year(), end.start_year(), trade);
            fetch(config, request, chart_json).await
        }
        Command::Codes { path } => {
            let path = path.unwrap_or(config.hs_codes_path);
            for code in load_hs_codes_or_empty(&path) {
                println!("{}", code);
            }
            Ok(())
        }
        Command::Years => {
            for fy in FiscalYear::supported() {
                println!("{}", fy);
            }
            Ok(())
        }
    }
}

async fn fetch(config: Config, request: TradeRequest, chart_json: Option<PathBuf>) -> Result<()> {
    let store = CsvDirStore::new(&config.output_dir)?;
    let pipeline = Pipeline::new(HttpSessionFactory::new(config.clone()), store)
        .with_retries(config.result_retries, config.retry_backoff());

    let output = pipeline
        .run(&request, &mut |p| {
            info!(hs_code = %p.hs_code, "progress {}% ({}/{})", p.percent(), p.completed, p.total)
        })
        .await?;

    if !output.failed_codes.is_empty() {
        warn!(codes = ?output.failed_codes, "some HS codes produced no data");
    }

    println!("{:<10} {:>18}", "Fiscal Year", "Total");
    for point in &output.chart {
        println!("{:<10} {:>18.2}", point.fiscal_year, point.total);
    }

    if let Some(path) = chart_json {
        let json = serde_json::to_string_pretty(&output.chart)?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "wrote chart series");
    }

    let archive_path = output.archive.write_to(&config.output_dir)?;
    println!("{}", archive_path.display());

    let queue = Arc::new(CleanupQueue::new());
    queue.schedule(output.artifacts, config.cleanup_delay());
    spawn_cleanup_loop(queue, Duration::from_millis(500)).await?;
    info!("all done");
    Ok(())
}
