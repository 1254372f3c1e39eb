use std::io;
use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use prepf::client::{ChatClient, ChatClientOptions};
use prepf::config::{AppConfig, ConfigOverrides};
use prepf::interview::{InterviewSession, SessionLimits};
use prepf::prompts::DEFAULT_SYSTEM_INSTRUCTION;
use prepf::providers::{self, DEFAULT_PROVIDER_ID};
use prepf::runtime::{self, EventLoop, RuntimeHost, TICK_INTERVAL};
use prepf::tui::Presenter;
use prepf::logging::{self, Verbosity};
use prepf::Grade;

#[derive(Debug, Parser)]
#[command(name = "prepf", version, about = "Mock technical interviews in the terminal")]
struct Cli {
    /// Config file to read instead of ~/.config/prepf/config.json.
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Profile file to use instead of ~/.config/prepf/profile.md.
    #[arg(short, long, global = true, value_name = "PATH")]
    profile: Option<PathBuf>,

    /// Log at debug level (PREPF_LOG still takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log warnings only and skip the banner.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a timed mock interview.
    Mock {
        /// Resume or profile (.txt or .md). Defaults to ~/.config/prepf/profile.md when present.
        #[arg(long, value_name = "PATH")]
        resume: Option<PathBuf>,

        /// Model backend: `gemini` or `mock`.
        #[arg(long, default_value = DEFAULT_PROVIDER_ID)]
        provider: String,

        /// Disable ANSI colors.
        #[arg(long)]
        no_color: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let overrides = ConfigOverrides {
        config_file: cli.config,
        profile_path: cli.profile,
    };
    let config = AppConfig::load(&overrides).context("failed to load configuration")?;
    let verbosity = Verbosity::from_flags(cli.verbose, cli.quiet);
    let log_path =
        logging::init(&config.config_dir, verbosity).context("failed to initialize logging")?;
    tracing::info!(log = %log_path.display(), ?verbosity, "prepf starting");

    match cli.command {
        Command::Mock {
            resume,
            provider,
            no_color,
        } => run_mock(&config, resume, &provider, no_color, verbosity),
    }
}

fn run_mock(
    config: &AppConfig,
    resume: Option<PathBuf>,
    provider_id: &str,
    no_color: bool,
    verbosity: Verbosity,
) -> Result<()> {
    tracing::info!(provider = provider_id, "starting mock interview");

    let provider = providers::provider_for_id(provider_id, config)?;
    let client = ChatClient::new(
        provider,
        ChatClientOptions {
            token_limit: config.token_limit,
            system_instruction: Some(DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            ..ChatClientOptions::default()
        },
    );

    let resume = resume.or_else(|| config.profile_path.is_file().then(|| config.profile_path.clone()));
    let session = InterviewSession::new(SessionLimits::default(), resume);

    let mut presenter = Presenter::new(io::stdout(), !(no_color || config.no_color));
    if verbosity != Verbosity::Quiet {
        presenter.render_banner(&client.profile())?;
    }

    let (events_tx, events_rx) = mpsc::channel();
    let host = RuntimeHost::new(client, events_tx.clone()).context("failed to start chunk waiter")?;
    runtime::spawn_input_reader(events_tx.clone()).context("failed to start input reader")?;
    runtime::spawn_ticker(events_tx, TICK_INTERVAL).context("failed to start ticker")?;

    let (session, _) = EventLoop::new(session, host, events_rx, presenter).run()?;

    let grade = session.report().map(|report| report.grade);
    tracing::info!(
        questions = session.question_count(),
        surrenders = session.surrender_count(),
        grade = grade.map(Grade::letter),
        "prepf exiting"
    );
    Ok(())
}
