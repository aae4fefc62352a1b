//! relay-bot: entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Build session store, text and image clients, dispatcher
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Run comms channels until shutdown

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use relay_bot::config;
use relay_bot::dispatch::Dispatcher;
use relay_bot::error::AppError;
use relay_bot::logger;
use relay_bot::session::SessionStore;
use relay_bot::{image, llm, subsystems};

struct CliArgs {
    log_level: Option<&'static str>,
    interactive: bool,
    config_path: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();
    let mut config = config::load(args.config_path.as_deref())?;

    // The console channel reads stdin; only run it when asked to.
    if !args.interactive {
        config.comms.pty.enabled = false;
    }

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        bot_name = %config.bot_name,
        work_dir = %config.work_dir.display(),
        effective_log_level = %effective_log_level,
        interactive = %args.interactive,
        "config loaded"
    );

    let sessions = Arc::new(SessionStore::new(config.sessions.history_cap));
    let text = llm::providers::build(&config.text)?;
    let image = image::build(&config.image)?;

    info!(
        text_provider = %config.text.provider,
        text_url = %config.text.api_url,
        model = %text.model(),
        image_provider = %image.name(),
        image_url = %config.image.api_url,
        history_cap = sessions.cap(),
        "upstream clients ready"
    );

    let dispatcher = Arc::new(Dispatcher::new(sessions, text, image));

    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    let comms = subsystems::comms::start(&config, dispatcher, shutdown.clone());
    let result = comms.join().await;
    shutdown.cancel();

    if args.interactive {
        println!("\nBye :) ...");
    }
    result
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut interactive = false;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: relay-bot [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -i, --interactive          Enable the console channel");
                println!("  -f, --config <PATH>        Configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Set logging verbosity (warn, info, debug, trace)");
                println!();
                println!("Environment:");
                println!("  TELEGRAM_BOT_TOKEN, OLLAMA_API_URL, OLLAMA_MODEL, COMFYUI_API_URL,");
                println!("  RELAY_WORK_DIR, RELAY_LOG_LEVEL, RUST_LOG");
                std::process::exit(0);
            }
            "-i" | "--interactive" => interactive = true,
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    CliArgs { log_level: logger::level_for_verbosity(verbosity), interactive, config_path }
}
