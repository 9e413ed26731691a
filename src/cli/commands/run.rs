//! Implementation of the `phylum run` command.

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use crate::cli::context::AppContext;
use crate::cli::output::output;
use crate::cli::report::RunReport;
use crate::cli::UnsuccessfulOutcome;
use crate::domain::models::{Config, EvalSpec, RunRequest, RunStatus, SuccessCriteria};

/// Arguments for `phylum run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// The change to make, in plain language
    #[arg(required_unless_present = "plan_file")]
    pub plan: Option<String>,

    /// Read the plan from a file instead
    #[arg(long, conflicts_with = "plan")]
    pub plan_file: Option<PathBuf>,

    /// Test command whose success defines a passing agent
    #[arg(short, long)]
    pub eval: String,

    /// Repository to repair
    #[arg(short, long, default_value = ".")]
    pub repo: PathBuf,

    /// Agent vendor (defaults to vendor.name from config)
    #[arg(long)]
    pub vendor: Option<String>,

    /// Agents per generation
    #[arg(short = 'n', long)]
    pub population: Option<u32>,

    /// Maximum generations per step
    #[arg(short, long)]
    pub generations: Option<u32>,

    /// Eval command timeout in seconds
    #[arg(long)]
    pub eval_timeout: Option<u64>,

    /// Pass when the eval output contains this text instead of on exit code 0
    #[arg(long)]
    pub expect_output: Option<String>,

    /// Repo-relative path agents must not alter for scoring (repeatable)
    #[arg(long, value_name = "PATH")]
    pub protect: Vec<String>,

    /// Vendor setting passed through to the agent (repeatable)
    #[arg(long, value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub agent_config: Vec<(String, String)>,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

/// Merge command-line arguments over configured defaults.
pub fn build_request(args: RunArgs, config: &Config) -> Result<RunRequest> {
    let plan = match (args.plan, args.plan_file) {
        (Some(plan), _) => plan,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read plan file {}", path.display()))?,
        (None, None) => bail!("A plan or --plan-file is required"),
    };

    let repo_path = args
        .repo
        .canonicalize()
        .with_context(|| format!("Repository {} does not exist", args.repo.display()))?;

    let defaults = &config.eval;
    let mut protected_paths = defaults.protected_paths.clone();
    for path in args.protect {
        if !protected_paths.contains(&path) {
            protected_paths.push(path);
        }
    }
    let mut eval = EvalSpec::new(args.eval)
        .with_timeout(args.eval_timeout.unwrap_or(defaults.timeout_secs))
        .with_protected_paths(protected_paths);
    match args.expect_output.or_else(|| defaults.expected_output.clone()) {
        Some(expected) => eval = eval.with_output_match(expected),
        None => eval.criteria = SuccessCriteria::from_str(&defaults.success_criteria).unwrap_or_default(),
    }
    if eval.criteria == SuccessCriteria::OutputMatch && eval.expected_output.is_none() {
        bail!("output-match success criteria needs --expect-output");
    }

    let mut agent_config = config.vendor.agent_config_json();
    if let Some(map) = agent_config.as_object_mut() {
        for (key, value) in args.agent_config {
            map.insert(key, serde_json::Value::String(value));
        }
    }

    Ok(RunRequest {
        plan,
        repo_path,
        eval,
        vendor: args.vendor.unwrap_or_else(|| config.vendor.name.clone()),
        agent_config,
        population_size: args.population.unwrap_or(config.evolution.population_size),
        max_generations: args.generations.unwrap_or(config.evolution.max_generations),
    })
}

/// Create a run and drive it to completion.
///
/// A run that ends `failed` returns [`UnsuccessfulOutcome`] after printing
/// its report.
pub async fn execute(args: RunArgs, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open().await?;
    let request = build_request(args, &ctx.config)?;
    let orchestrator = ctx.orchestrator()?;

    let run = orchestrator.create_run(request).await?;
    info!(run_id = %run.id, "Run {} started", run.short_id());

    let run = orchestrator.execute(run, false).await?;
    output(&RunReport::from(&run), json_mode);

    if run.status == RunStatus::Done {
        Ok(())
    } else {
        Err(UnsuccessfulOutcome(format!("run {} ended {}", run.short_id(), run.status.as_str())).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(repo: &std::path::Path) -> RunArgs {
        RunArgs {
            plan: Some("fix it".to_string()),
            plan_file: None,
            eval: "make test".to_string(),
            repo: repo.to_path_buf(),
            vendor: None,
            population: None,
            generations: Some(5),
            eval_timeout: None,
            expect_output: None,
            protect: vec!["tests/".to_string()],
            agent_config: vec![("command".to_string(), "./agent.sh".to_string())],
        }
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(parse_key_value("a=b=c").unwrap(), ("a".to_string(), "b=c".to_string()));
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_build_request_merges_config() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.eval.protected_paths = vec!["Makefile".to_string()];
        config.vendor.agent_config.insert("model".to_string(), "opus".to_string());

        let request = build_request(args(dir.path()), &config).unwrap();

        assert_eq!(request.population_size, config.evolution.population_size);
        assert_eq!(request.max_generations, 5);
        assert_eq!(request.vendor, "claude-code");
        assert_eq!(request.eval.protected_paths, vec!["Makefile".to_string(), "tests/".to_string()]);
        assert_eq!(request.eval.criteria, SuccessCriteria::ExitCode);
        assert_eq!(request.agent_config["model"], "opus");
        assert_eq!(request.agent_config["command"], "./agent.sh");
        assert!(request.repo_path.is_absolute());
    }

    #[test]
    fn test_expect_output_switches_criteria() {
        let dir = TempDir::new().unwrap();
        let mut run_args = args(dir.path());
        run_args.expect_output = Some("OK".to_string());
        let request = build_request(run_args, &Config::default()).unwrap();
        assert_eq!(request.eval.criteria, SuccessCriteria::OutputMatch);
        assert_eq!(request.eval.expected_output.as_deref(), Some("OK"));
    }

    #[test]
    fn test_plan_file_and_missing_repo() {
        let dir = TempDir::new().unwrap();
        let plan = dir.path().join("plan.md");
        std::fs::write(&plan, "from a file").unwrap();

        let mut run_args = args(dir.path());
        run_args.plan = None;
        run_args.plan_file = Some(plan);
        assert_eq!(build_request(run_args, &Config::default()).unwrap().plan, "from a file");

        let mut run_args = args(&dir.path().join("missing"));
        run_args.plan = Some("p".to_string());
        assert!(build_request(run_args, &Config::default()).is_err());
    }
}
