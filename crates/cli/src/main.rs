use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    clap::{Parser, Subcommand},
    tokio_util::sync::CancellationToken,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    stemsplit_config::{AppConfig, TransportMode},
    stemsplit_jobs::{JobQueue, JobRunner},
    stemsplit_separation::SeparationEngine,
    stemsplit_sessions::UploadStore,
    stemsplit_telegram::{BotContext, TelegramDelivery},
};

#[derive(Parser)]
#[command(
    name = "stemsplit",
    about = "Telegram bot that splits songs into vocals and accompaniment"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Path to a config file (overrides stemsplit.toml discovery).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Address to bind the webhook server to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Port for the webhook server (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot (default when no subcommand is provided).
    Run,
    /// Check the local setup: token, model files, ffmpeg.
    Doctor,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);
    info!(version = env!("CARGO_PKG_VERSION"), "stemsplit starting");

    let mut config = match cli.config {
        Some(ref path) => {
            let mut cfg = stemsplit_config::load_config(path)?;
            stemsplit_config::apply_env(&mut cfg, |key| std::env::var(key).ok());
            cfg
        },
        None => stemsplit_config::discover_and_load(),
    };
    if let Some(ref bind) = cli.bind {
        config.webhook.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.webhook.port = port;
    }

    match cli.command {
        None | Some(Commands::Run) => run(config).await,
        Some(Commands::Doctor) => doctor(&config),
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    config.validate()?;

    let mode = config.transport_mode();
    let tmp_dir = config.tmp_dir();
    std::fs::create_dir_all(&tmp_dir)?;
    let model_dir = config.model_dir();

    let bot = stemsplit_telegram::bot::build_bot(&config.telegram.token)?;
    let (queue, job_rx) = JobQueue::bounded(config.jobs.queue_depth);
    let shutdown = CancellationToken::new();

    let engine = SeparationEngine::new(model_dir, config.jobs.bitrate_kbps);
    let delivery = Arc::new(TelegramDelivery::new(
        bot.clone(),
        config.telegram.operator_chat_id,
    ));
    JobRunner::new(
        Arc::new(engine),
        delivery,
        tmp_dir.clone(),
        Duration::from_secs(config.jobs.timeout_secs),
        config.jobs.workers,
    )
    .spawn(job_rx, shutdown.clone());

    let ctx = Arc::new(BotContext {
        bot: bot.clone(),
        store: UploadStore::new(),
        queue,
        tmp_dir,
        api_root: reqwest::Url::parse("https://api.telegram.org/")?,
        operator_chat_id: config.telegram.operator_chat_id,
    });

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    info!(%mode, workers = config.jobs.workers, "bot starting");
    match mode {
        TransportMode::Polling => {
            stemsplit_telegram::bot::run_polling(ctx, shutdown).await?;
        },
        TransportMode::Webhook => {
            let base_url = config.webhook.base_url.clone().unwrap_or_default();
            stemsplit_gateway::register_webhook(&bot, &base_url, &config.telegram.token).await?;
            stemsplit_telegram::bot::register_commands(&bot).await;
            let app = stemsplit_gateway::app(ctx, config.telegram.token.clone());
            stemsplit_gateway::serve(app, &config.webhook.bind, config.webhook.port, shutdown)
                .await?;
        },
    }
    Ok(())
}

/// Checks the pieces the bot needs at runtime and reports each one.
fn doctor(config: &AppConfig) -> anyhow::Result<()> {
    let mut problems = 0usize;
    let mut check = |label: &str, ok: bool, hint: &str| {
        if ok {
            println!("✓ {label}");
        } else {
            println!("✗ {label}: {hint}");
            problems += 1;
        }
    };

    check(
        "bot token",
        config.validate().is_ok(),
        "set BOT_TOKEN or fill in stemsplit.toml",
    );

    let model_path = config
        .model_dir()
        .join(stemsplit_separation::model::MODEL_FILENAME);
    check(
        "separation model",
        model_path.exists(),
        &format!("expected model at {}", model_path.display()),
    );

    check(
        "ffmpeg",
        which::which("ffmpeg").is_ok(),
        "install ffmpeg and make sure it is on PATH",
    );

    if config.transport_mode() == TransportMode::Webhook {
        check(
            "webhook base url",
            config
                .webhook
                .base_url
                .as_deref()
                .is_some_and(|u| u.starts_with("https://")),
            "WEBHOOK_URL must be an https:// URL",
        );
    }

    if problems > 0 {
        anyhow::bail!("{problems} problem(s) found");
    }
    println!("all checks passed");
    Ok(())
}
