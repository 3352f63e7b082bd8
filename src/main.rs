mod backends;
mod cli;
mod client;
mod config;
mod error;
mod handlers;
mod models;
mod router;
mod streaming;
#[cfg(test)]
mod test_support;
mod transform;

use clap::Parser;
use cli::{Cli, Command};
use client::{AnalysisClient, BatchRow, RequestState, RequestStatus, ResultBoard};
use config::Config;
use daemonize::Daemonize;
use models::analyze::AnalyzeRequest;
use reqwest::Client;
use router::{BackendConfig, AVAILABLE_MODELS};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Command::Stop { pid_file }) => {
            stop_daemon(pid_file)?;
            return Ok(());
        }
        Some(Command::Status { pid_file }) => {
            check_status(pid_file)?;
            return Ok(());
        }
        Some(Command::Compare { .. } | Command::Batch { .. }) | None => {}
    }

    if cli.command.is_some() {
        let runtime = tokio::runtime::Runtime::new()?;
        return runtime.block_on(run_client(cli));
    }

    if cli.daemon {
        use std::fs::OpenOptions;

        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open("/tmp/vision-relay.log")?;

        let stderr = OpenOptions::new()
            .create(true)
            .append(true)
            .open("/tmp/vision-relay.log")?;

        let daemonize = Daemonize::new()
            .pid_file(&cli.pid_file)
            .working_directory(std::env::current_dir()?)
            .stdout(stdout)
            .stderr(stderr)
            .umask(0o027);

        if let Err(e) = daemonize.start() {
            eprintln!("✗ Failed to daemonize: {}", e);
            std::process::exit(1);
        }
    } else {
        eprintln!("✓ Starting relay in foreground mode");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async_main(cli))
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::from_env_with_path(cli.config.clone())?;

    if cli.debug {
        config.debug = true;
    }
    if cli.verbose {
        config.verbose = true;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    Ok(config)
}

fn init_tracing(config: &Config) {
    let log_level = if config.verbose {
        tracing::Level::TRACE
    } else if config.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("vision_relay={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn async_main(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    init_tracing(&config);
    config.validate_backends()?;

    tracing::info!("Starting Vision Relay v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Port: {}", config.port);

    if let Some(ref url) = config.step_api_url {
        tracing::info!("StepFun URL: {} ✓", url);
    }
    if let Some(ref url) = config.openai_api_url {
        tracing::info!("OpenAI URL: {} ✓", url);
    }
    for (name, key) in [("StepFun", &config.step_api_key), ("OpenAI", &config.openai_api_key)] {
        if key.is_some() {
            tracing::info!("{} API Key: configured", name);
        } else {
            tracing::info!("{} API Key: not set", name);
        }
    }
    for model in AVAILABLE_MODELS {
        let configured = BackendConfig::resolve(model, &config)
            .map(|b| b.is_configured())
            .unwrap_or(false);
        tracing::debug!("Model {}: {}", model, if configured { "available" } else { "no backend" });
    }

    // 不设置整体超时：流式输出可能持续很久
    let client = Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .build()?;

    let config = Arc::new(config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = handlers::routes(config.clone(), client)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Listening on {}", addr);
    tracing::info!("Relay ready to accept requests");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_client(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    init_tracing(&config);

    let http = Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;

    let board = ResultBoard::with_observer(|state: &RequestState| {
        if state.status != RequestStatus::Streaming {
            tracing::info!("[{}] {} -> {}", state.id, state.model, state.status);
        } else {
            tracing::trace!("[{}] {} chars", state.id, state.accumulated.chars().count());
        }
    });

    let results = match cli.command {
        Some(Command::Compare {
            models,
            system,
            prompt,
            image,
            stream,
            relay_url,
        }) => {
            let base64_image = image.as_deref().map(client::encode_image).transpose()?;
            let template = AnalyzeRequest {
                model: String::new(),
                sys_prompt: Some(system),
                user_prompt: Some(prompt),
                base64_image,
                stream: Some(stream),
            };
            let relay = AnalysisClient::new(http, relay_url.unwrap_or(config.relay_url));
            relay.compare(&models, &template, &board).await?
        }
        Some(Command::Batch {
            file,
            sync_model,
            sync_system,
            sync_user,
            relay_url,
        }) => {
            let raw = std::fs::read_to_string(&file)?;
            let mut rows: Vec<BatchRow> = serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("Invalid batch file {}: {}", file.display(), e))?;
            client::sync_rows(&mut rows, sync_model, sync_system, sync_user);

            let items = rows
                .into_iter()
                .enumerate()
                .map(|(i, row)| row.into_item(i))
                .collect::<Result<Vec<_>, _>>()?;

            let relay = AnalysisClient::new(http, relay_url.unwrap_or(config.relay_url));
            relay.run_batch(items, &board).await?
        }
        _ => return Err(anyhow::anyhow!("Not a client command")),
    };

    print_results(&results);
    Ok(())
}

fn print_results(results: &[RequestState]) {
    for state in results {
        println!("==== [{}] {} ({})", state.id, state.model, state.status);
        println!("{}", state.accumulated);
        println!();
    }
}

fn stop_daemon(pid_file: &std::path::Path) -> anyhow::Result<()> {
    if !pid_file.exists() {
        eprintln!("✗ PID file not found: {}", pid_file.display());
        eprintln!("  Daemon is not running or PID file was removed");
        std::process::exit(1);
    }

    let pid_str = std::fs::read_to_string(pid_file)?;
    let pid: i32 = pid_str
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid PID in file: {}", pid_str))?;

    let output = std::process::Command::new("kill")
        .arg(pid.to_string())
        .output()?;

    std::fs::remove_file(pid_file)?;
    if output.status.success() {
        eprintln!("✓ Daemon stopped (PID: {})", pid);
    } else {
        eprintln!("✗ Failed to stop daemon (PID: {})", pid);
        eprintln!("  Process may have already exited");
        std::process::exit(1);
    }

    Ok(())
}

fn check_status(pid_file: &std::path::Path) -> anyhow::Result<()> {
    if !pid_file.exists() {
        eprintln!("✗ Daemon is not running");
        eprintln!("  PID file not found: {}", pid_file.display());
        std::process::exit(1);
    }

    let pid_str = std::fs::read_to_string(pid_file)?;
    let pid: i32 = pid_str
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid PID in file: {}", pid_str))?;

    let output = std::process::Command::new("ps")
        .arg("-p")
        .arg(pid.to_string())
        .output()?;

    if output.status.success() {
        eprintln!("✓ Daemon is running (PID: {})", pid);
        eprintln!("  PID file: {}", pid_file.display());
    } else {
        eprintln!("✗ Daemon is not running");
        eprintln!("  Stale PID file found: {} (PID: {})", pid_file.display(), pid);
        std::process::exit(1);
    }

    Ok(())
}
