mod doctor;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stepwise_client::{prepare, HttpServiceClient, PullOutcome, Startup};
use stepwise_core::config::AppConfig;
use stepwise_graph::{build_pipeline, Endpoints, ExecutionState, QualityRouter};

#[derive(Parser)]
#[command(
    name = "stepwise",
    version,
    about = "Multi-step inference pipeline over remote model services"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "stepwise.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for dependencies, then run the pipeline once (default)
    Run {
        /// Task text; falls back to the configured or built-in task.
        /// Put it after `--` if it starts with a dash.
        task: Vec<String>,
        /// Override the analysis attempt ceiling
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Skip the readiness gate and the model pull
        #[arg(long)]
        skip_readiness: bool,
    },
    /// Wait for dependencies and pull the model, without running the pipeline
    Check,
    /// Probe every dependency once and report
    Doctor,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stepwise=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "stepwise", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Some(Commands::Doctor) => {
            println!("Stepwise Doctor");
            println!("===============");
            doctor::run_doctor(&config).await;
        }
        Some(Commands::Check) => {
            let startup = prepare(&config).await?;
            report_startup(&startup);
        }
        Some(Commands::Run {
            task,
            max_attempts,
            skip_readiness,
        }) => {
            run(&config, task, max_attempts, skip_readiness).await?;
        }
        None => run(&config, Vec::new(), None, false).await?,
        Some(Commands::Completions { .. }) => unreachable!("handled before config load"),
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let mut config = if path.exists() {
        info!(path = %path.display(), "Loading config");
        AppConfig::load(path)?
    } else {
        info!(path = %path.display(), "No config file found, using defaults");
        AppConfig::default()
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn report_startup(startup: &Startup) {
    for (target, attempts) in &startup.readiness.attempts {
        println!("  [OK] {} ready after {} attempt(s)", target, attempts);
    }
    match &startup.pull {
        Some(PullOutcome::Completed) => println!("  [OK] Model pulled"),
        Some(PullOutcome::StreamEnded) => {
            println!("  [OK] Model pull stream ended without a success status")
        }
        Some(PullOutcome::Skipped { reason }) => println!("  [!!] Model pull skipped: {}", reason),
        None => println!("  [--] Model pull disabled"),
    }
}

async fn run(
    config: &AppConfig,
    task: Vec<String>,
    max_attempts: Option<u32>,
    skip_readiness: bool,
) -> anyhow::Result<()> {
    if skip_readiness {
        warn!("Skipping readiness gate and model pull");
    } else {
        prepare(config)
            .await
            .context("Dependencies did not become ready")?;
    }

    let task = if task.is_empty() {
        config.pipeline.task_or_default().to_string()
    } else {
        task.join(" ")
    };
    let max_attempts = max_attempts.unwrap_or(config.pipeline.max_attempts);
    if max_attempts == 0 {
        anyhow::bail!("--max-attempts must be at least 1");
    }

    let client = Arc::new(HttpServiceClient::with_timeout(
        config.client.request_timeout(),
    )?);
    let executor = build_pipeline(
        client,
        Endpoints::from(&config.services),
        QualityRouter::new(config.pipeline.min_analysis_chars),
    )?;

    let result = executor
        .execute(ExecutionState::new(task, max_attempts))
        .await
        .context("Pipeline run failed")?;

    let answer = result
        .final_answer()
        .context("Run ended without a final answer")?;
    println!("{}", answer);
    println!();
    println!(
        "Analysis attempts: {}/{} ({} ms)",
        result.state.analysis_attempts(),
        result.state.max_attempts(),
        result.total_elapsed_ms
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_run(args: &[&str]) -> (Vec<String>, Option<u32>, bool) {
        let cli = Cli::try_parse_from(args.iter().copied()).unwrap();
        match cli.command {
            Some(Commands::Run {
                task,
                max_attempts,
                skip_readiness,
            }) => (task, max_attempts, skip_readiness),
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_run_flags_after_task_are_parsed() {
        let (task, max_attempts, skip) = parse_run(&[
            "stepwise",
            "run",
            "what",
            "gap",
            "--max-attempts",
            "5",
            "--skip-readiness",
        ]);
        assert_eq!(task, vec!["what", "gap"]);
        assert_eq!(max_attempts, Some(5));
        assert!(skip);
    }

    #[test]
    fn test_run_flags_before_task() {
        let (task, max_attempts, skip) =
            parse_run(&["stepwise", "run", "--max-attempts", "2", "energy", "gap"]);
        assert_eq!(task, vec!["energy", "gap"]);
        assert_eq!(max_attempts, Some(2));
        assert!(!skip);
    }

    #[test]
    fn test_run_dash_task_after_separator() {
        let (task, max_attempts, _) =
            parse_run(&["stepwise", "run", "--", "--max-attempts", "is", "text"]);
        assert_eq!(task, vec!["--max-attempts", "is", "text"]);
        assert_eq!(max_attempts, None);
    }

    #[test]
    fn test_run_without_task() {
        let (task, max_attempts, skip) = parse_run(&["stepwise", "run"]);
        assert!(task.is_empty());
        assert_eq!(max_attempts, None);
        assert!(!skip);
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
