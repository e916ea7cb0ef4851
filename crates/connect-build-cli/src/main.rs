//! connect-build - rebuild published content on a Connect server
//!
//! Usage:
//!   connect-build -s URL build add GUID[,BUNDLE]...
//!   connect-build -s URL build run --parallelism 4
//!   connect-build -s URL build ls --status ERROR

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use connect_build_core::build::{RunOptions, RunReport};
use connect_build_core::commands::{
    BuildCommand, ListOptions, LogFormat, LogsOptions, RemoveOptions,
};
use connect_build_core::config::{BuildSettings, SettingsStore};
use connect_build_core::content::{self, ContentGuidWithBundle};
use connect_build_core::context::BuildContext;
use connect_build_core::logs;
use connect_build_core::remote::ConnectClient;
use connect_build_core::types::BuildStatus;

#[derive(Parser)]
#[command(name = "connect-build")]
#[command(about = "Rebuild content on a Connect server", long_about = None)]
struct Cli {
    /// Server URL
    #[arg(long, short = 's', env = "CONNECT_SERVER", global = true)]
    server: Option<String>,

    /// API key used to authenticate with the server
    #[arg(long, short = 'k', env = "CONNECT_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// Directory for build state and logs (overrides config and CONNECT_CONTENT_BUILD_DIR)
    #[arg(long, global = true)]
    build_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track and rebuild content on the server
    Build(BuildArgs),
}

#[derive(Args)]
struct BuildArgs {
    #[command(subcommand)]
    command: BuildSubcommand,
}

#[derive(Subcommand)]
enum BuildSubcommand {
    /// Mark content items for build
    Add {
        /// Content GUID, optionally followed by `,BUNDLE_ID`
        #[arg(required = true, value_name = "GUID[,BUNDLE_ID]")]
        content: Vec<ContentGuidWithBundle>,
    },

    /// Stop tracking content items
    Rm {
        /// Content GUID to remove
        #[arg(
            long,
            short = 'g',
            conflicts_with = "all",
            required_unless_present = "all",
            value_parser = parse_guid
        )]
        guid: Option<String>,

        /// Remove every tracked item
        #[arg(long)]
        all: bool,

        /// Also delete build logs
        #[arg(long)]
        purge: bool,
    },

    /// List tracked content items as JSON
    Ls {
        /// Only these GUIDs
        #[arg(long, short = 'g', value_parser = parse_guid)]
        guid: Vec<String>,

        /// Only items with this build status
        #[arg(long)]
        status: Option<BuildStatus>,
    },

    /// List past build attempts of a content item
    History {
        #[arg(long, short = 'g', value_parser = parse_guid)]
        guid: String,
    },

    /// Print a build log
    Logs {
        #[arg(long, short = 'g', value_parser = parse_guid)]
        guid: String,

        /// Build attempt to show; defaults to the latest
        #[arg(long, short = 't', value_parser = parse_task_id)]
        task_id: Option<String>,

        #[arg(long, short = 'f', default_value = "text")]
        format: OutputFormat,
    },

    /// Build every item marked NEEDS_BUILD
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Number of concurrent builds
    #[arg(long, short = 'p')]
    parallelism: Option<usize>,

    /// Also rebuild ABORTED items
    #[arg(long)]
    aborted: bool,

    /// Also rebuild ERROR items
    #[arg(long)]
    error: bool,

    /// Also rebuild items left RUNNING by an earlier run
    #[arg(long)]
    running: bool,

    /// Rebuild every tracked item
    #[arg(long)]
    all: bool,

    /// Shorthand for --aborted --error --running
    #[arg(long)]
    retry: bool,

    /// Seconds between task status polls (fractions allowed)
    #[arg(long)]
    poll_wait: Option<f64>,

    /// Log the full error chain of failed builds
    #[arg(long)]
    debug: bool,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Plain log lines
    #[default]
    Text,
    /// One `{"message": ...}` object per line
    Json,
}

fn parse_guid(s: &str) -> std::result::Result<String, String> {
    content::parse_guid(s).map(str::to_string)
}

fn parse_task_id(s: &str) -> std::result::Result<String, String> {
    logs::file_name("task id", s)
        .map(str::to_string)
        .map_err(|err| err.to_string())
}

impl Cli {
    fn debug(&self) -> bool {
        matches!(
            &self.command,
            Commands::Build(BuildArgs {
                command: BuildSubcommand::Run(RunArgs { debug: true, .. })
            })
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug() {
        "connect_build=debug,connect_build_core=debug,info"
    } else {
        "connect_build=info,connect_build_core=info,warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match runtime.block_on(run_cli(cli)) {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{} {:#}", style("error:").red().bold(), err);
            std::process::exit(1);
        }
    }
}

/// Returns the process exit code.
async fn run_cli(cli: Cli) -> Result<i32> {
    let Commands::Build(args) = cli.command;
    let server = cli
        .server
        .ok_or_else(|| anyhow::anyhow!("Missing server URL: pass --server or set CONNECT_SERVER"))?;

    let settings = load_settings(cli.build_dir)?;
    let client = ConnectClient::new(&server, cli.api_key)
        .with_context(|| format!("Invalid server URL: {}", server))?;
    let ctx = BuildContext::open(&server, Arc::new(client), settings)
        .with_context(|| format!("Failed to open build state for {}", server))?;
    let cmd = BuildCommand::new(ctx);

    match args.command {
        BuildSubcommand::Add { content } => {
            let added = cmd.add(&content).await?;
            for item in &added {
                println!(
                    "{} {} (bundle {})",
                    style("✓ Added").green(),
                    item.guid,
                    item.bundle_id.as_deref().unwrap_or("-")
                );
            }
        }
        BuildSubcommand::Rm { guid, all, purge } => {
            let options = RemoveOptions { guid, all, purge };
            let removed = cmd.remove(&options)?;
            if removed.is_empty() {
                println!("Nothing removed.");
            }
            for guid in &removed {
                println!("{} {}", style("✓ Removed").green(), guid);
            }
        }
        BuildSubcommand::Ls { guid, status } => {
            let mut options = ListOptions::new().with_guids(guid);
            if let Some(status) = status {
                options = options.with_status(status);
            }
            let items = cmd.list(&options)?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        BuildSubcommand::History { guid } => {
            let history = cmd.history(&guid)?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        BuildSubcommand::Logs {
            guid,
            task_id,
            format,
        } => {
            let mut options = LogsOptions::new(guid).with_format(match format {
                OutputFormat::Text => LogFormat::Text,
                OutputFormat::Json => LogFormat::Json,
            });
            if let Some(task_id) = task_id {
                options = options.with_task_id(task_id);
            }
            for line in cmd.logs(&options)? {
                println!("{}", line);
            }
        }
        BuildSubcommand::Run(run) => {
            let options = run_options(&run);
            let interrupt = async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %err, "Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            };
            let report = cmd.run_until(&options, interrupt).await?;
            print_run_report(&report);
            return Ok(report.exit_code());
        }
    }

    Ok(0)
}

fn load_settings(build_dir: Option<PathBuf>) -> Result<BuildSettings> {
    let mut settings = SettingsStore::from_default_location()?
        .load()?
        .with_env_overrides();
    if let Some(dir) = build_dir {
        settings = settings.with_build_dir(dir);
    }
    settings.validate()?;
    Ok(settings)
}

fn run_options(args: &RunArgs) -> RunOptions {
    let mut options = RunOptions::new()
        .with_aborted(args.aborted)
        .with_error(args.error)
        .with_running(args.running)
        .with_all(args.all)
        .with_retry(args.retry)
        .with_debug(args.debug);
    if let Some(parallelism) = args.parallelism {
        options = options.with_parallelism(parallelism);
    }
    if let Some(secs) = args.poll_wait {
        options = options.with_poll_wait_secs(secs);
    }
    options
}

fn print_run_report(report: &RunReport) {
    let Some(summary) = &report.summary else {
        println!("Nothing to build.");
        return;
    };

    let headline = if summary.aborted {
        style("Build aborted").yellow().bold()
    } else if summary.succeeded() {
        style("Build complete").green().bold()
    } else {
        style("Build finished with errors").red().bold()
    };
    println!("{} in {}", headline, summary.elapsed_display());
    println!(
        "  Complete: {}  Error: {}  Aborted: {}  Total: {}",
        summary.counts.complete, summary.counts.error, summary.counts.aborted, summary.total
    );
}
