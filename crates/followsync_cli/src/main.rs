use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use agent_channel::{DetachedChannel, InboundHub};
use cache_store::{FileStore, KeyValueStore, MemoryStore};
use dashboard_api::{DashboardApiClient, DashboardApiConfig};
use followsync::logging::init_logging;
use followsync::{
    AuthEvent, Collaborators, CredentialSource, EnvConfig, Orchestrator, OrchestratorSettings,
};
use followsync_cli::commands::{parse_command, Command, USAGE};
use followsync_cli::identity::{StaticCredentialSource, TOKEN_ENV};
use followsync_cli::render::{render_notice, render_snapshot};

fn main() -> ExitCode {
    init_logging();

    let command = parse_command(std::env::args().skip(1));
    if command == Command::Help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }
    if let Command::Unknown(name) = &command {
        eprintln!("unknown command '{name}'\n\n{USAGE}");
        return ExitCode::from(2);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to start runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> io::Result<()> {
    let config = EnvConfig::from_env().map_err(io::Error::other)?;
    let identity = Arc::new(StaticCredentialSource::from_env());
    let Some(principal) = identity.current_principal() else {
        return Err(io::Error::other(format!(
            "not signed in; set {TOKEN_ENV} to a backend credential"
        )));
    };

    let orchestrator = build_orchestrator(&config, identity)?;
    orchestrator
        .on_auth_event(AuthEvent::SignedIn(principal))
        .await
        .map_err(io::Error::other)?;

    let result = execute(&orchestrator, command).await;
    for notice in orchestrator.take_notices() {
        eprintln!("{}", render_notice(&notice));
    }
    result
}

fn build_orchestrator(
    config: &EnvConfig,
    identity: Arc<StaticCredentialSource>,
) -> io::Result<Orchestrator> {
    let store: Arc<dyn KeyValueStore> = match &config.cache_dir {
        Some(dir) => {
            tracing::debug!(cache = %dir.display(), "using file cache");
            Arc::new(FileStore::open(dir).map_err(io::Error::other)?)
        }
        None => Arc::new(MemoryStore::new()),
    };

    let client = DashboardApiClient::new(
        DashboardApiConfig::new(config.api_base_url.clone()).with_timeout(config.http_timeout),
    )
    .map_err(io::Error::other)?;

    tracing::debug!(api = %config.api_base_url, "starting");
    Orchestrator::new(
        OrchestratorSettings::from_env_config(config),
        Collaborators {
            credentials: identity,
            channel: Arc::new(DetachedChannel),
            backend: Arc::new(client),
            store,
            hub: InboundHub::new(),
        },
    )
    .map_err(io::Error::other)
}

async fn execute(orchestrator: &Orchestrator, command: Command) -> io::Result<()> {
    match command {
        Command::Show => {
            match orchestrator.mount().await {
                Some(snapshot) => println!("{}", render_snapshot(&snapshot)),
                None => println!("no dashboard data available"),
            }
            orchestrator.unmount();
        }
        Command::Refresh => {
            let snapshot = orchestrator.check_data().await.map_err(io::Error::other)?;
            println!("{}", render_snapshot(&snapshot));
        }
        Command::Exclude(id) => match orchestrator.exclude_user(&id).map_err(io::Error::other)? {
            Some(snapshot) => println!("{}", render_snapshot(&snapshot)),
            None => println!("no cached dashboard; run `followsync refresh` first"),
        },
        Command::Regenerate => {
            let regeneration = orchestrator
                .regenerate_non_followers()
                .await
                .map_err(io::Error::other)?;
            println!("{}", render_snapshot(&regeneration.snapshot));
            orchestrator.acknowledge_everyone_follows_back();
        }
        Command::Stats => {
            let stats = orchestrator.follow_stats().await.map_err(io::Error::other)?;
            println!("followers: {}", stats.followers);
            println!("following: {}", stats.following);
        }
        Command::BotStatus => {
            let report = orchestrator.bot_status().await.map_err(io::Error::other)?;
            println!("running: {}", report.is_running);
            if let Some(status) = report.status {
                println!("status: {status}");
            }
            if let Some(message) = report.message {
                println!("message: {message}");
            }
        }
        Command::NewData => {
            let fresh = orchestrator.check_new_data().await.map_err(io::Error::other)?;
            println!("{}", if fresh { "new data available" } else { "up to date" });
        }
        Command::Help | Command::Unknown(_) => println!("{USAGE}"),
    }
    Ok(())
}
