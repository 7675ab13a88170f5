//! multimerge command-line tool.
//!
//! Merges one branch into the current branch of many git working trees,
//! stashing local changes around the merge and handing conflicts to an
//! OpenAI-compatible model before falling back to a manual merge tool.

mod render;
mod signals;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use multimerge_core::config::AppConfig;
use multimerge_core::events::EventSink;
use multimerge_core::git::discovery;
use multimerge_core::git::{CommandGateway, GitCli, RepositoryHandle};
use multimerge_core::merge::{CommandHandoff, MergeController};
use multimerge_core::models::{LanguageMode, MergeOptions};
use multimerge_core::OpenAiCompatibleEngine;

const DEFAULT_CONFIG_FILE: &str = "multimerge.toml";

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Merge one branch into many git repositories.
#[derive(Parser, Debug)]
#[command(
    name = "multimerge",
    version,
    about = "Merge one branch into many git repositories, with AI-assisted conflict resolution"
)]
struct Cli {
    /// Path to the TOML configuration file (default: ./multimerge.toml, then
    /// the user config directory).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show debug output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge the source branch into every configured repository.
    Run(RunArgs),

    /// List the repositories a run would process.
    Repos {
        /// Extra repository paths.
        #[arg(long = "repo")]
        repos: Vec<PathBuf>,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./multimerge.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Branch to merge (overrides merge.source_branch).
    #[arg(short, long)]
    branch: Option<String>,

    /// Do not run `git fetch --all --prune` first.
    #[arg(long)]
    no_fetch: bool,

    /// Do not stash local changes; dirty repositories are skipped unless
    /// --allow-dirty is given.
    #[arg(long)]
    no_stash: bool,

    /// Merge into dirty working trees.
    #[arg(long)]
    allow_dirty: bool,

    /// Always create a merge commit.
    #[arg(long)]
    no_ff: bool,

    /// Squash the merge (never committed automatically).
    #[arg(long)]
    squash: bool,

    /// Push each repository after a successful merge.
    #[arg(long)]
    push: bool,

    /// Skip failing repositories instead of stopping the batch.
    #[arg(long)]
    keep_going: bool,

    /// Count untracked files when checking for local changes.
    #[arg(long)]
    include_untracked: bool,

    /// Language hint for AI merges: auto, or a language such as "C#", json, xml.
    #[arg(long)]
    language: Option<LanguageMode>,

    /// Skip the AI pass; conflicts go straight to the hand-off.
    #[arg(long)]
    no_ai: bool,

    /// Extra repository paths, processed after the configured ones.
    #[arg(long = "repo")]
    repos: Vec<PathBuf>,
}

impl RunArgs {
    /// Layer command-line flags over the configured defaults.
    fn apply(&self, mut options: MergeOptions) -> MergeOptions {
        if let Some(ref branch) = self.branch {
            options.source_branch = branch.clone();
        }
        if self.no_fetch {
            options.fetch_before_merge = false;
        }
        if self.no_stash {
            options.stash_if_dirty = false;
        }
        if self.allow_dirty {
            options.allow_dirty_merge = true;
        }
        if self.no_ff {
            options.no_fast_forward = true;
        }
        if self.squash {
            options.squash = true;
        }
        if self.push {
            options.push_after_merge = true;
        }
        if self.keep_going {
            options.stop_on_conflict = false;
        }
        if self.include_untracked {
            options.include_untracked = true;
        }
        if let Some(mode) = self.language {
            options.language_mode = mode;
        }
        options
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output).map(|_| ExitCode::SUCCESS),
        Commands::Validate => cmd_validate(cli.config.as_deref()).map(|_| ExitCode::SUCCESS),
        Commands::Repos { repos } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_repos(&config, &repos).await.map(|_| ExitCode::SUCCESS)
        }
        Commands::Run(args) => {
            let config = load_config(cli.config.as_deref())?;
            cmd_run(config, args, cli.verbose).await
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// Where to look for the config file when `--config` is not given.
fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(DEFAULT_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("multimerge").join("config.toml"));
    }
    paths
}

/// An explicit path must exist. Without one, the first default path that
/// exists is used, and plain defaults otherwise.
fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_paths().into_iter().find(|p| p.exists()),
    }
}

fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    match find_config(explicit) {
        Some(path) => {
            AppConfig::load_and_resolve(&path).context("failed to load configuration file")
        }
        None => {
            debug!("no configuration file found, using defaults");
            let mut config = AppConfig::default();
            config
                .resolve_env_vars()
                .context("failed to resolve environment variables")?;
            Ok(config)
        }
    }
}

fn collect_repos(config: &AppConfig, extra: &[PathBuf]) -> Result<Vec<RepositoryHandle>> {
    if !config.repos.has_sources() && extra.is_empty() {
        anyhow::bail!(
            "no repositories configured: set [repos] paths or discover_root, or pass --repo"
        );
    }
    discovery::collect(&config.repos, extra).context("failed to collect repositories")
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_run(config: AppConfig, args: RunArgs, verbose: bool) -> Result<ExitCode> {
    let options = args.apply(config.merge.clone());
    if options.source_branch.trim().is_empty() {
        anyhow::bail!("no source branch: pass --branch or set merge.source_branch");
    }

    let repos = collect_repos(&config, &args.repos)?;
    if repos.is_empty() {
        println!("No repositories found.");
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "Merging '{}' into {} repositor{}",
        options.source_branch.trim(),
        repos.len(),
        if repos.len() == 1 { "y" } else { "ies" }
    );
    println!();

    let gateway: Arc<dyn CommandGateway> = Arc::new(GitCli::new());
    let (events, rx) = EventSink::channel();
    let mut controller =
        MergeController::new(gateway, events).with_cancel_flag(signals::setup_signal_handlers());

    if config.ai.enabled && !args.no_ai {
        let engine = OpenAiCompatibleEngine::new(config.ai.provider_settings())
            .context("failed to create AI merge engine")?;
        controller = controller.with_engine(Arc::new(engine), config.ai.merge_prefs());
    }
    if let Some(handoff) = CommandHandoff::from_config(&config.handoff) {
        controller = controller.with_handoff(Arc::new(handoff));
    }

    let renderer = tokio::spawn(render::render_events(rx, repos.len(), verbose));
    let report = controller.run(&repos, &options).await;
    // Dropping the controller closes the event channel.
    drop(controller);
    renderer.await.context("event renderer failed")?;

    render::print_report(&report);

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_repos(config: &AppConfig, extra: &[PathBuf]) -> Result<()> {
    let repos = collect_repos(config, extra)?;
    if repos.is_empty() {
        println!("No repositories found.");
        return Ok(());
    }

    let gateway: Arc<dyn CommandGateway> = Arc::new(GitCli::new());
    let controller = MergeController::new(gateway, EventSink::disabled());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Repository", "Branch", "State", "Path"]);

    for repo in &repos {
        let state = if controller
            .is_clean(repo, config.merge.include_untracked)
            .await
        {
            Cell::new("clean").fg(Color::Green)
        } else {
            Cell::new("dirty").fg(Color::Yellow)
        };
        table.add_row(vec![
            Cell::new(repo.name()),
            Cell::new(repo.current_ref()),
            state,
            Cell::new(repo.root().display()),
        ]);
    }

    println!("{}", table);
    println!();
    println!("{} repositor{}", repos.len(), if repos.len() == 1 { "y" } else { "ies" });
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    let default_config = r#"# multimerge configuration
# Command-line flags override the [merge] values.

[merge]
source_branch = "main"
fetch_before_merge = true
stash_if_dirty = true
allow_dirty_merge = false
no_fast_forward = false
squash = false
push_after_merge = false
# Stop the whole batch on the first failure; false skips to the next repo.
stop_on_conflict = true
include_untracked = false
# "Auto" infers the language from the file extension.
language_mode = "Auto"

[repos]
# Explicit working trees, processed first.
paths = []
# Every git working tree directly under this directory.
# discover_root = "/path/to/workspace"
# include = ["service-*"]
# exclude = ["*-legacy"]

[ai]
enabled = true
base_url = "https://api.openai.com/v1"
model = "gpt-4o-mini"
# Name of the environment variable holding the API key.
api_key_env = "OPENAI_API_KEY"
# Set to false for local providers that take no key.
require_api_key = true
max_tokens = 8000
temperature = 0.1
stage_on_success = true
timeout_secs = 120

[handoff]
# Launched (not awaited) with the still-conflicted paths appended.
# command = "code"
# args = []
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit [repos] and [merge].source_branch");
    println!("  2. Export the API key variable (OPENAI_API_KEY by default)");
    println!(
        "  3. Validate with: multimerge validate --config {}",
        output.display()
    );
    println!(
        "  4. Preview with: multimerge repos --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(explicit: Option<&Path>) -> Result<()> {
    let config_path = find_config(explicit).with_context(|| {
        format!(
            "no configuration file found (looked for {})",
            default_config_paths()
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    })?;
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(&config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => {
            println!("  [OK] All required fields are valid");
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!(
        "  Source branch : {}",
        if config.merge.source_branch.trim().is_empty() {
            "(none, pass --branch)"
        } else {
            config.merge.source_branch.trim()
        }
    );
    println!(
        "  Stop policy   : {}",
        if config.merge.stop_on_conflict {
            "stop"
        } else {
            "keep going"
        }
    );
    println!("  Repo paths    : {}", config.repos.paths.len());
    println!(
        "  Discover root : {}",
        config
            .repos
            .discover_root
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  AI enabled    : {}", config.ai.enabled);
    println!("  AI endpoint   : {}", config.ai.base_url);
    println!("  AI model      : {}", config.ai.model);
    println!(
        "  API key       : {} ({})",
        if config.ai.api_key.is_some() { "set" } else { "NOT SET" },
        config.ai.api_key_env
    );
    println!("  Language mode : {}", config.merge.language_mode);
    println!(
        "  Hand-off      : {}",
        config.handoff.command.as_deref().unwrap_or("-")
    );

    if !config.repos.has_sources() {
        println!();
        println!(
            "{}",
            style::warn("no repositories configured; runs need --repo")
        );
    }
    if config.ai.enabled && config.ai.require_api_key && config.ai.api_key.is_none() {
        println!(
            "{}",
            style::warn(&format!(
                "{} is not set; runs with conflicts will stop at the AI step",
                config.ai.api_key_env
            ))
        );
    }

    println!();
    println!("Configuration is valid.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "multimerge",
            "run",
            "--branch",
            "release",
            "--keep-going",
            "--no-fetch",
            "--language",
            "json",
            "--repo",
            "/work/a",
            "--repo",
            "/work/b",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.branch.as_deref(), Some("release"));
                assert!(args.keep_going);
                assert_eq!(args.repos.len(), 2);
                assert_eq!(
                    args.language,
                    Some(LanguageMode::Fixed(multimerge_core::ai::Language::Json))
                );
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_bad_language_rejected() {
        assert!(Cli::try_parse_from(["multimerge", "run", "--language", "cobol"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let base = MergeOptions {
            source_branch: "main".into(),
            ..Default::default()
        };
        let args = RunArgs {
            branch: Some("release".into()),
            no_fetch: true,
            no_stash: true,
            keep_going: true,
            push: true,
            ..Default::default()
        };
        let options = args.apply(base);
        assert_eq!(options.source_branch, "release");
        assert!(!options.fetch_before_merge);
        assert!(!options.stash_if_dirty);
        assert!(!options.stop_on_conflict);
        assert!(options.push_after_merge);
        assert!(!options.allow_dirty_merge);
    }

    #[test]
    fn test_no_flags_keep_config() {
        let base = MergeOptions {
            source_branch: "main".into(),
            stop_on_conflict: false,
            ..Default::default()
        };
        assert_eq!(RunArgs::default().apply(base.clone()), base);
    }

    #[test]
    fn test_init_writes_parseable_config_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multimerge.toml");

        cmd_init(&path).unwrap();
        let config = AppConfig::load_from_file(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.merge.source_branch, "main");
        assert_eq!(config.ai.api_key_env, "OPENAI_API_KEY");

        assert!(cmd_init(&path).is_err());
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let result = load_config(Some(Path::new("/nonexistent/multimerge.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_collect_repos_requires_a_source() {
        let config = AppConfig::default();
        assert!(collect_repos(&config, &[]).is_err());
    }
}
