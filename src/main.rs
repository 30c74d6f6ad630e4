use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use iroca::categories::Category;
use iroca::chat::{self, ChatOrchestrator};
use iroca::constants;
use iroca::prediction::{FallbackStrategy, ModelBundle, Predictor};
use iroca::web_server::{self, AppState};
use iroca::OllamaChat;

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the model artifacts live and what to do when they are missing.
#[derive(clap::Args, Debug)]
struct ModelArgs {
    #[arg(long, env = "IROCA_MODEL_DIR", default_value_t = constants::IROCA_MODEL_DIR.clone(), help = "Directory holding random_forest_model.json and label_encoders.json.")]
    model_dir: String,
    #[arg(long, value_enum, default_value_t = FallbackStrategy::Demo, help = "What to do when the model artifacts cannot be loaded.")]
    fallback: FallbackStrategy,
}

/// Chat service settings.
#[derive(clap::Args, Debug)]
struct ChatArgs {
    #[arg(long, env = "OLLAMA_URL", default_value_t = constants::OLLAMA_URL.clone(), help = "Base URL of the Ollama server.")]
    ollama_url: String,
    #[arg(long, env = "IROCA_CHAT_MODEL", default_value_t = constants::IROCA_CHAT_MODEL.clone(), help = "Chat model to request.")]
    chat_model: String,
    #[arg(long, default_value_t = constants::CHAT_TIMEOUT.as_secs(), help = "Seconds to wait for a chat answer.")]
    chat_timeout: u64,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the iRoça web server.
    Serve {
        #[arg(long, default_value_t = 8501, help = "Port for the web server.")]
        port: u16,
        #[arg(long, default_value = "templates", help = "Directory holding the page templates.")]
        templates: PathBuf,
        #[arg(long, default_value = "static", help = "Directory served under /static.")]
        static_dir: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        chat: ChatArgs,
    },
    /// Predict the harvested area for one selection.
    Predict {
        #[arg(long, help = "Product label, e.g. \"Soja\".")]
        product: String,
        #[arg(long, help = "Month label, e.g. \"Janeiro\".")]
        month: String,
        #[arg(long, help = "State label, e.g. \"São Paulo\".")]
        state: String,
        #[arg(long, allow_negative_numbers = true, help = "Planted area in hectares.")]
        area: f64,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Engage in a text-based chat session with the assistant.
    Chat {
        #[command(flatten)]
        chat: ChatArgs,
    },
    /// List the selectable products, months and states.
    Labels,
}

fn load_predictor(args: &ModelArgs) -> Result<Predictor> {
    let bundle = ModelBundle::load_or_fallback(Path::new(&args.model_dir), args.fallback)
        .context("Failed to load model artifacts")?;
    info!(source = %bundle.source, "prediction model ready");
    Ok(Predictor::new(bundle))
}

fn build_orchestrator(args: &ChatArgs) -> Result<ChatOrchestrator> {
    let backend = OllamaChat::new(
        args.ollama_url.as_str(),
        args.chat_model.as_str(),
        Duration::from_secs(args.chat_timeout),
    )
    .context("Failed to initialize chat client")?;
    Ok(ChatOrchestrator::new(Arc::new(backend)))
}

// The main entry point of the application, using tokio's async runtime
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for OLLAMA_URL, IROCA_MODEL_DIR, ...)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,iroca=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Parse command-line arguments
    let cli = Cli::parse();

    info!("iRoça starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Serve {
            port,
            templates,
            static_dir,
            model,
            chat,
        } => {
            let predictor = load_predictor(&model)?;
            let orchestrator = build_orchestrator(&chat)?;
            let state = AppState::new(templates, predictor, orchestrator);

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(port, state, static_dir).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            // Pin the ctrl_c future to the stack so its address is stable
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed unexpectedly."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
        Commands::Predict {
            product,
            month,
            state,
            area,
            model,
        } => {
            let predictor = load_predictor(&model)?;
            let prediction = predictor
                .predict(&product, &month, &state, area)
                .context("Prediction failed")?;
            println!(
                "Área colhida prevista: {} hectares",
                web_server::format_hectares(prediction.estimated_hectares)
            );
            if prediction.demo_model {
                println!("Atenção: modelo de demonstração, a estimativa não é uma previsão real.");
            }
        }
        Commands::Chat { chat: args } => {
            let orchestrator = build_orchestrator(&args)?;
            let stdin = std::io::stdin();
            chat::run_terminal_chat(&orchestrator, stdin.lock(), std::io::stdout())
                .await
                .context("Chat session failed")?;
            info!("Chat session finished.");
        }
        Commands::Labels => {
            for category in Category::ALL {
                println!("[{}]", category.artifact_key());
                for (label, token) in category.table() {
                    println!("  {label} -> {token}");
                }
            }
        }
    }

    Ok(())
}
