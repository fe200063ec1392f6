//! Backlogsmith - cancellable AI generation jobs
//!
//! Entry point for the command-line tool.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};

use backlogsmith::cli::Args;
use backlogsmith::core::{
    FilePromptSource, JobOutcome, JobRegistry, Orchestrator, ProjectPlan, PromptCache,
    TimeoutWatchdog,
};
use backlogsmith::fs::WorkspacePaths;
use backlogsmith::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.log_format);

    let paths = match &args.base_dir {
        Some(base) => WorkspacePaths::new(base),
        None => WorkspacePaths::from_cwd()?,
    };
    let mut settings = paths.load_settings()?;
    if let Some(model) = args.model {
        settings.model = model;
    }

    let proposal = std::fs::read_to_string(&args.proposal_file).with_context(|| {
        format!(
            "Failed to read proposal file: {}",
            args.proposal_file.display()
        )
    })?;

    let registry = Arc::new(JobRegistry::new());
    let watchdog = TimeoutWatchdog::new(Arc::clone(&registry), settings.watchdog_interval())
        .with_retention(settings.retention())
        .spawn();

    let prompts = Arc::new(PromptCache::new(FilePromptSource::new(
        &paths.prompts_dir(&settings),
    )));
    let generator = settings.model.generator();
    info!(model = settings.model.name(), kind = %args.kind, "starting job");
    let orchestrator = Orchestrator::new(Arc::clone(&registry), prompts, generator, settings);

    let (job_id, _token) = orchestrator.create_job(
        args.subject.as_str(),
        args.kind,
        args.timeout.map(Duration::from_secs),
    );

    let interrupt = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(job_id = %job_id, "interrupted, cancelling job");
                registry.cancel(job_id);
            }
        })
    };

    let outcome = orchestrator.run_job(job_id, &proposal).await;

    interrupt.abort();
    watchdog.shutdown().await;

    match outcome {
        JobOutcome::Completed(plan) => write_plan(&plan, args.output.as_deref()),
        JobOutcome::Cancelled => bail!("job {job_id} was cancelled"),
        JobOutcome::Failed { reason } => bail!("job {job_id} failed: {reason}"),
    }
}

fn write_plan(plan: &ProjectPlan, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(plan).context("Failed to serialize plan")?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write plan: {}", path.display()))?;
            info!(path = %path.display(), "plan written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
