//! `conference-client` - terminal front end for a conference server
//!
//! Prints every event of a run to stdout and reads HITL decisions from stdin.
//! Logs go to stderr.

use clap::{Args, Parser, Subcommand};
use conference_client::artifacts::ArtifactDownloader;
use conference_client::session::ConnectionState;
use conference_client::transcript::{format_event, parse_decision_line, DECISION_PROMPT};
use conference_client::{
    ClientConfig, ClientError, ConferenceClient, ConferenceEvent, HitlPhase, SessionConfig,
    SessionUpdate,
};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "conference-client", version, about = "Run AI conference sessions from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// WebSocket base URL of the conference server
    #[arg(long, global = true, env = "CONFERENCE_WS_URL")]
    ws_url: Option<String>,

    /// HTTP base URL used for file downloads
    #[arg(long, global = true, env = "CONFERENCE_HTTP_URL")]
    http_url: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one conference and stream it to stdout
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Conversation pattern; "hitl" enables the approval flow
    #[arg(short, long)]
    pattern: String,

    /// Topic for the agents
    #[arg(short, long)]
    topic: String,

    #[arg(long)]
    max_rounds: Option<u32>,

    #[arg(long)]
    num_agents: Option<u32>,

    /// Proposal revisions allowed in a HITL session
    #[arg(long)]
    max_revisions: Option<u32>,

    /// Save attached files into this directory
    #[arg(long)]
    download_dir: Option<PathBuf>,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "conference_client=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.ws_url {
        config = config.with_ws_url(url);
    }
    if let Some(url) = cli.http_url {
        config = config.with_http_url(url);
    }
    config.validate()?;

    match cli.command {
        Commands::Run(args) => run(config, args).await,
    }
}

async fn run(config: ClientConfig, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let downloader = match &args.download_dir {
        Some(_) => Some(ArtifactDownloader::from_config(&config)?),
        None => None,
    };

    let mut session = SessionConfig::new(&args.pattern, &args.topic);
    if let Some(n) = args.max_rounds {
        session = session.with_max_rounds(n);
    }
    if let Some(n) = args.num_agents {
        session = session.with_num_agents(n);
    }
    if let Some(n) = args.max_revisions {
        session = session.with_max_revisions(n);
    }

    let client = ConferenceClient::new(config);
    let mut updates = Box::pin(client.updates());
    client.start(session).await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut was_connected = false;

    loop {
        tokio::select! {
            update = updates.next() => {
                let Some(update) = update else { break };
                match update {
                    SessionUpdate::Appended { event, .. } => {
                        println!("{}", format_event(&event));
                        if let (Some(dir), Some(downloader)) = (&args.download_dir, &downloader) {
                            save_attachment(downloader, &event, dir).await;
                        }
                    }
                    SessionUpdate::StateChanged { snapshot } => {
                        was_connected |= snapshot.connected;
                        // Finished once a run has stopped, or the connection never came up
                        let closed = matches!(snapshot.connection, ConnectionState::Closed { .. });
                        if !snapshot.running && (was_connected || closed) {
                            break;
                        }
                    }
                    SessionUpdate::Cleared { .. } => {}
                    SessionUpdate::Error { message } => eprintln!("{message}"),
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if !line.trim().is_empty() => submit_line(&client, &line).await,
                    Ok(Some(_)) => {}
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read stdin");
                        stdin_open = false;
                    }
                }
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

async fn submit_line(client: &ConferenceClient, line: &str) {
    if client.snapshot().hitl_phase != HitlPhase::AwaitingDecision {
        eprintln!("No proposal is waiting for a decision");
        return;
    }
    match parse_decision_line(line) {
        Ok(decision) => match client.submit_decision(decision).await {
            Ok(()) => {}
            Err(ClientError::NotConnected) => eprintln!("Not connected; decision not sent"),
            Err(e) => eprintln!("{e}"),
        },
        Err(e) => eprintln!("{e}\n{DECISION_PROMPT}"),
    }
}

async fn save_attachment(downloader: &ArtifactDownloader, event: &ConferenceEvent, dir: &Path) {
    let Some(file) = event.file() else { return };
    match downloader.download(file, dir).await {
        Ok(path) => println!("[saved] {}", path.display()),
        Err(e) => {
            tracing::error!(filename = %file.filename, error = %e, "Download failed");
            eprintln!("Download of {} failed: {e}", file.filename);
        }
    }
}
