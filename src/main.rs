use clap::{Parser, Subcommand};
use colored::Colorize;
use deadsweep::agent::{Agent, AgentOptions};
use deadsweep::config::Config;
use deadsweep::coordination::{RollbackPair, RollbackRecord, Workspace};
use deadsweep::coordinator::{Coordinator, CoordinatorOptions, ProcessLauncher};
use deadsweep::quarantine::{RollbackScript, SessionRestorer};
use deadsweep::report::{ReportFormat, Reporter};
use dialoguer::{theme::ColorfulTheme, Confirm};
use miette::{miette, IntoDiagnostic, Result, WrapErr};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// deadsweep - find unreachable TS/JS modules and quarantine them safely
#[derive(Parser, Debug)]
#[command(name = "deadsweep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project root directory
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - only output results
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one agent over its scope
    Agent {
        /// Agent profile name (e.g. frontend, backend, shared)
        name: String,

        /// Scope directories, replacing the profile's (can be specified multiple times)
        #[arg(short, long)]
        target: Vec<String>,

        /// Dry run - report what would be moved without touching anything
        #[arg(long)]
        dry_run: bool,

        /// Ignore the grace period (only for agents whose profile allows it)
        #[arg(long)]
        force: bool,

        /// Enable parallel parsing
        #[arg(long)]
        parallel: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "terminal")]
        format: OutputFormat,

        /// Output file (for json format)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the structured result here (used by the coordinator)
        #[arg(long, value_name = "FILE")]
        result_file: Option<PathBuf>,
    },

    /// Run several agents and merge their results
    Coordinate {
        /// Agents to run, comma-separated (default: every configured agent)
        #[arg(long, value_delimiter = ',')]
        agents: Vec<String>,

        /// Launch all agents at once
        #[arg(long)]
        concurrent: bool,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        force: bool,

        #[arg(long, conflicts_with_all = ["backend_only", "shared_only", "agents"])]
        frontend_only: bool,

        #[arg(long, conflicts_with_all = ["frontend_only", "shared_only", "agents"])]
        backend_only: bool,

        #[arg(long, conflicts_with_all = ["frontend_only", "backend_only", "agents"])]
        shared_only: bool,

        #[arg(short, long, value_enum, default_value = "terminal")]
        format: OutputFormat,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Restore the files of a quarantine session
    Rollback {
        /// Session id, as printed after a run or listed by `sessions`
        session: String,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Show what would be restored
        #[arg(long)]
        dry_run: bool,

        /// Write a shell script that performs the rollback instead
        #[arg(long, value_name = "FILE")]
        script: Option<PathBuf>,
    },

    /// List recorded rollback sessions
    Sessions,

    /// Drop usage-map entries older than the retention window
    Prune {
        #[arg(long)]
        retention_days: Option<u64>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Terminal,
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Terminal => ReportFormat::Terminal,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.quiet);

    info!("deadsweep v{}", env!("CARGO_PKG_VERSION"));

    let root = cli
        .root
        .canonicalize()
        .into_diagnostic()
        .wrap_err_with(|| format!("Project root not found: {}", cli.root.display()))?;
    let config = load_config(&cli, &root)?;

    match &cli.command {
        Command::Agent {
            name,
            target,
            dry_run,
            force,
            parallel,
            format,
            output,
            result_file,
        } => {
            let options = AgentOptions {
                name: name.clone(),
                targets: target.clone(),
                dry_run: *dry_run,
                force: *force,
                parallel: *parallel,
                show_progress: !cli.quiet && *format == OutputFormat::Terminal,
                result_file: result_file.clone(),
            };
            run_agent(&root, &config, options, *format, output.clone(), cli.verbose)
        }
        Command::Coordinate {
            agents,
            concurrent,
            dry_run,
            force,
            frontend_only,
            backend_only,
            shared_only,
            format,
            output,
        } => {
            let agents = if *frontend_only {
                vec!["frontend".to_string()]
            } else if *backend_only {
                vec!["backend".to_string()]
            } else if *shared_only {
                vec!["shared".to_string()]
            } else if agents.is_empty() {
                config.agent_names()
            } else {
                agents.clone()
            };
            let options = CoordinatorOptions {
                agents,
                concurrent: *concurrent,
                dry_run: *dry_run,
                force: *force,
            };
            run_coordinator(&cli, &root, &config, options, *format, output.clone())
        }
        Command::Rollback {
            session,
            yes,
            dry_run,
            script,
        } => run_rollback(&root, &config, session, *yes, *dry_run, script.as_deref()),
        Command::Sessions => list_sessions(&root, &config),
        Command::Prune { retention_days } => {
            let days = retention_days.unwrap_or(config.usage_map.retention_days);
            let removed = Workspace::new(&root, &config)
                .usage_map()
                .cleanup(days)
                .into_diagnostic()?;
            println!("Removed {} usage-map entries older than {} days", removed, days);
            Ok(())
        }
    }
}

fn load_config(cli: &Cli, root: &Path) -> Result<Config> {
    if let Some(config_path) = &cli.config {
        Config::from_file(config_path)
    } else {
        // Try to load from default locations
        Config::from_default_locations(root)
    }
}

fn run_agent(
    root: &Path,
    config: &Config,
    options: AgentOptions,
    format: OutputFormat,
    output: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let name = options.name.clone();
    let agent = Agent::new(root, config, options).into_diagnostic()?;
    let report = agent
        .run()
        .into_diagnostic()
        .wrap_err_with(|| format!("Agent {} failed", name))?;

    let file_lists = verbose || report.is_dry_run();
    Reporter::new(format.into(), output)
        .with_file_lists(file_lists)
        .report_agent(&report)
}

fn run_coordinator(
    cli: &Cli,
    root: &Path,
    config: &Config,
    options: CoordinatorOptions,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let launcher = ProcessLauncher::current_exe(root, cli.config.as_deref()).into_diagnostic()?;
    let coordinator = Coordinator::new(root, config, &launcher, options).into_diagnostic()?;
    let report = coordinator.run().into_diagnostic()?;

    Reporter::new(format.into(), output).report_coordinator(&report)?;

    if report.all_succeeded() {
        Ok(())
    } else {
        Err(miette!("{} agent(s) failed: {}", report.failed_agents().len(), report.failed_agents().join(", ")))
    }
}

fn run_rollback(
    root: &Path,
    config: &Config,
    session: &str,
    yes: bool,
    dry_run: bool,
    script: Option<&Path>,
) -> Result<()> {
    let workspace = Workspace::new(root, config);
    let restorer = SessionRestorer::new(&workspace);
    let records = restorer.plan(session).into_diagnostic()?;

    if records.is_empty() {
        println!("{}", format!("Nothing to restore for session {}", session).yellow());
        return Ok(());
    }

    if let Some(path) = script {
        let record = RollbackRecord {
            session: session.to_string(),
            agent: records[0].agent.clone(),
            created_at: records[0].moved_at,
            files: records
                .iter()
                .map(|r| RollbackPair {
                    from: r.quarantine_path.clone(),
                    to: r.original_path.clone(),
                    size_bytes: r.size_bytes,
                })
                .collect(),
        };
        let mut rollback = RollbackScript::new(session, root);
        rollback.add_record(&record);
        rollback.write(path).into_diagnostic()?;
        println!("{} Rollback script saved to: {}", "→".dimmed(), path.display());
        return Ok(());
    }

    println!("{}", format!("Session {}: {} files", session, records.len()).cyan().bold());
    for record in &records {
        println!("  {} {}", "←".dimmed(), record.original_path);
    }

    if dry_run {
        println!();
        println!("{}", format!("Total: {} files would be restored", records.len()).dimmed());
        return Ok(());
    }

    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Restore {} files?", records.len()))
            .default(false)
            .interact()
            .into_diagnostic()?;
        if !confirmed {
            println!("{}", "Rollback cancelled.".yellow());
            return Ok(());
        }
    }

    let outcome = restorer.restore(&records);
    restorer.prune_empty_dirs();

    if !outcome.restored.is_empty() {
        if let Err(e) = workspace.usage_map().forget_moved("rollback", &outcome.restored) {
            warn!("Could not update usage map: {}", e);
        }
    }

    println!();
    for file in &outcome.restored {
        println!("  {} Restored {}", "✓".green(), file);
    }
    for (file, error) in &outcome.failed {
        println!("  {} Failed to restore {}: {}", "✗".red(), file, error);
    }
    println!();
    println!("Files restored: {}", outcome.restored.len());

    if outcome.failed.is_empty() {
        Ok(())
    } else {
        Err(miette!("{} files could not be restored", outcome.failed.len()))
    }
}

fn list_sessions(root: &Path, config: &Config) -> Result<()> {
    let workspace = Workspace::new(root, config);
    let sessions = SessionRestorer::new(&workspace).sessions();

    if sessions.is_empty() {
        println!("{}", "No rollback sessions recorded.".green());
        return Ok(());
    }

    for record in &sessions {
        println!(
            "{}  {}  {}  {} files",
            record.session.cyan(),
            record.agent,
            record.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            record.files.len()
        );
    }
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
