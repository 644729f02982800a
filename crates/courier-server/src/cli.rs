//! CLI argument parsing

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use courier_jobs::JobQueue;
use courier_server::{
    init_tracing, load_dotenv, start_background, AppConfig, AppContext, Environment,
    QueueMonitor, QueueName, Queues, Server,
};

/// Courier - job queues, webhook intake and client notifications
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server and a worker per queue
    Serve {
        /// Overrides BIND_ADDR
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Print the health of every queue as JSON
    Snapshot,

    /// Stop workers from picking up new jobs
    Pause(QueueArgs),

    /// Let workers pick up jobs again
    Resume(QueueArgs),

    /// Drop waiting and delayed jobs
    Clear(QueueArgs),
}

#[derive(Args, Debug)]
struct QueueArgs {
    /// Queue to act on; every queue when omitted
    #[arg(short, long, value_parser = parse_queue_name)]
    queue: Option<QueueName>,
}

fn parse_queue_name(value: &str) -> Result<QueueName, String> {
    QueueName::parse(value).ok_or_else(|| {
        let known: Vec<&str> = QueueName::ALL.iter().map(|q| q.as_str()).collect();
        format!("unknown queue '{}', expected one of: {}", value, known.join(", "))
    })
}

#[derive(Clone, Copy)]
enum QueueAction {
    Pause,
    Resume,
    Clear,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> anyhow::Result<()> {
        load_dotenv();
        let env = Environment::current();
        init_tracing(&env);
        let config = AppConfig::from_env().context("Failed to read configuration")?;

        match self.command {
            Commands::Serve { bind } => serve(config, env, bind).await,
            Commands::Snapshot => snapshot(&config).await,
            Commands::Pause(args) => apply(&config, args.queue, QueueAction::Pause).await,
            Commands::Resume(args) => apply(&config, args.queue, QueueAction::Resume).await,
            Commands::Clear(args) => apply(&config, args.queue, QueueAction::Clear).await,
        }
    }
}

async fn serve(mut config: AppConfig, env: Environment, bind: Option<String>) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }
    let addr = config.socket_addr()?;
    tracing::info!(
        environment = %env,
        backend = ?config.queue_backend,
        "Starting courier"
    );

    let ctx = AppContext::from_config(&config)?;
    let (monitor, workers) =
        start_background(&ctx, config.stall_timeout(), config.poll_interval()).await?;

    let server = Server::with_monitor(ctx, monitor);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
    };
    let served = server.run(addr, shutdown).await;

    workers.shutdown().await;
    served.context("HTTP server failed")
}

async fn snapshot(config: &AppConfig) -> anyhow::Result<()> {
    let queues = Queues::open(&config.backend_config())?;
    let snapshot = QueueMonitor::new(queues).snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn apply(
    config: &AppConfig,
    queue: Option<QueueName>,
    action: QueueAction,
) -> anyhow::Result<()> {
    let queues = Queues::open(&config.backend_config())?;
    match queue {
        Some(name) => run_action(queues.get(name), action).await?,
        None => match action {
            QueueAction::Pause => queues.pause_all().await?,
            QueueAction::Resume => queues.resume_all().await?,
            QueueAction::Clear => queues.clear_all().await?,
        },
    }
    Ok(())
}

async fn run_action(queue: &JobQueue, action: QueueAction) -> courier_jobs::Result<()> {
    match action {
        QueueAction::Pause => queue.pause().await?,
        QueueAction::Resume => queue.resume().await?,
        QueueAction::Clear => queue.empty().await?,
    }
    tracing::info!(queue = %queue.name(), "Done");
    Ok(())
}
