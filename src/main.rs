use std::sync::Arc;

mod classify;
mod config;
mod db;
mod error;
mod feed;
mod feeds;
mod image;
mod ingest;
mod models;
mod scheduler;

use config::Config;
use db::Repository;
use error::Result;
use ingest::IngestEngine;
use scheduler::{Job, Scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (info and up by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    // Load configuration
    let config = Config::load()?;

    // An unusable store is fatal before any job runs
    let repo = Arc::new(Repository::new(&config.db_path).await?);
    let engine = Arc::new(IngestEngine::new(repo.clone(), &config)?);
    let scheduler = Scheduler::new(engine, repo, config);

    match args.get(1).map(String::as_str) {
        Some("run-scheduler") => scheduler.run_forever().await,
        Some("run-job") => {
            let Some(name) = args.get(2) else {
                print_usage();
                std::process::exit(1);
            };
            let job = Job::parse(name)?;
            let items = scheduler.run_job(job).await?;
            println!("Job {} completed: {} items processed", name, items);
            Ok(())
        }
        _ => {
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  techhub-ingest run-scheduler     Start all scheduled jobs (stop with Ctrl+C)");
    eprintln!("  techhub-ingest run-job <name>    Run a single job and exit");
    eprintln!("Available jobs: full-ingest, quick-update, stats, cleanup");
}
