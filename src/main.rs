use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tablesplit::{Engine, EngineConfig, QueryRequest, RunReport};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tablesplit")]
#[command(about = "Split a large table into key-range shards and query them in parallel")]
struct Args {
    /// JSON config file, layered under the environment
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print one CREATE TABLE statement per shard
    Create {
        /// Run the statements through the worker pool instead of printing them
        #[arg(long)]
        execute: bool,
    },

    /// Build the trigram index on every shard
    Index,

    /// Count rows matching a pattern across the leading shards
    Query {
        /// POSIX regular expression matched against the content column
        pattern: String,

        /// Per-shard cap and overall result threshold (0 = unlimited)
        #[arg(default_value_t = 0)]
        limit: u64,

        /// Number of shards to query (default: all)
        tables: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = EngineConfig::load(args.config.as_deref())?;
    let engine = Engine::new(config)?;

    match args.command {
        Command::Create { execute: false } => {
            for task in engine.materialize_statements() {
                println!("{}", task.sql);
            }
        }
        Command::Create { execute: true } => {
            let pool = engine.pg_pool()?;
            let report = engine.run_create(&pool).await?;
            print_statement_summary(&report);
        }
        Command::Index => {
            let pool = engine.pg_pool()?;
            let report = engine.run_index(&pool).await?;
            print_statement_summary(&report);
        }
        Command::Query {
            pattern,
            limit,
            tables,
        } => {
            let pool = engine.pg_pool()?;
            let request = QueryRequest {
                pattern,
                limit,
                tables: tables.unwrap_or(engine.plan().len()),
            };
            let report = engine.run_query(&pool, &request).await?;
            for outcome in &report.outcomes {
                println!("{} {}", outcome.sql, outcome.count);
            }
            println!("{} results in {}ms", report.total, report.elapsed_ms);
        }
    }

    Ok(())
}

fn print_statement_summary(report: &RunReport) {
    for outcome in &report.outcomes {
        println!("ok: {}", outcome.sql);
    }
    for failure in &report.failures {
        println!("failed: {} ({})", failure.sql, failure.error);
    }
    info!(run_id = %report.run_id, "statements dispatched");
    println!(
        "{} statements executed, {} failed in {}ms",
        report.succeeded(),
        report.failed(),
        report.elapsed_ms
    );
}
