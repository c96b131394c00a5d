//! CablyAI command-line client.
//!
//! Usage:
//!   cablyai chat "question"             One-shot chat completion
//!   cablyai chat --tools "question"     Let the model search and fetch pages
//!   cablyai image "prompt"              Generate images
//!   cablyai transcribe clip.mp3         Transcribe audio
//!   cablyai speak --out hi.mp3 "hi"     Text to speech
//!   cablyai moderate "text"             Run moderation
//!   cablyai init                        Write a default config file

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cablyai::client::{ChatRequest, FileUpload, ImageRequest, SpeechRequest};
use cablyai::config::{self, ClientConfig};
use cablyai::tools;
use cablyai::types::{Message, Role};
use cablyai::{CablyClient, Conversation, LoopOptions, ToolLoop};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "cablyai")]
#[command(version)]
#[command(about = "Command-line client for the CablyAI API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file (default: ~/.cablyai/config.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log level (debug, info, warn, error). Overrides the config file.
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a chat completion.
    Chat {
        /// The user prompt.
        prompt: String,

        /// Model to use (default from config).
        #[arg(long)]
        model: Option<String>,

        /// Optional system prompt.
        #[arg(long)]
        system: Option<String>,

        /// Allow the model to call the built-in search and fetch tools.
        #[arg(long)]
        tools: bool,

        #[arg(long)]
        max_tokens: Option<u32>,

        #[arg(long)]
        temperature: Option<f64>,
    },

    /// Generate images from a prompt.
    Image {
        prompt: String,

        #[arg(long)]
        model: Option<String>,

        /// Number of images.
        #[arg(short, long, default_value_t = 1)]
        n: u32,

        #[arg(long, default_value = "1024x1024")]
        size: String,
    },

    /// Transcribe an audio file.
    Transcribe {
        file: PathBuf,

        #[arg(long)]
        model: Option<String>,
    },

    /// Convert text to speech.
    Speak {
        text: String,

        /// Where to write the audio.
        #[arg(long, short)]
        out: PathBuf,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        voice: Option<String>,
    },

    /// Check text against the moderation endpoint.
    Moderate {
        text: String,

        #[arg(long)]
        model: Option<String>,
    },

    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_deref()
        .map(config::resolve_path)
        .unwrap_or_else(config::default_config_path);
    let cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Initialize logging
    let log_level = cli.log_level.clone().unwrap_or_else(|| cfg.log_level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init { force } => cmd_init(&config_path, force),
        Commands::Chat {
            prompt,
            model,
            system,
            tools,
            max_tokens,
            temperature,
        } => {
            let model = model.unwrap_or_else(|| cfg.chat_model.clone());
            let client = build_client(cfg)?;
            if tools {
                cmd_chat_with_tools(&client, &model, system, prompt, max_tokens, temperature).await
            } else {
                cmd_chat(&client, &model, system, prompt, max_tokens, temperature).await
            }
        }
        Commands::Image {
            prompt,
            model,
            n,
            size,
        } => {
            let model = model.unwrap_or_else(|| cfg.image_model.clone());
            let client = build_client(cfg)?;
            cmd_image(&client, ImageRequest::new(prompt).with_model(model).with_count(n).with_size(size)).await
        }
        Commands::Transcribe { file, model } => {
            let model = model.unwrap_or_else(|| cfg.transcription_model.clone());
            let client = build_client(cfg)?;
            cmd_transcribe(&client, &model, &file).await
        }
        Commands::Speak {
            text,
            out,
            model,
            voice,
        } => {
            let request = SpeechRequest::new(
                model.unwrap_or_else(|| cfg.speech_model.clone()),
                voice.unwrap_or_else(|| cfg.speech_voice.clone()),
                text,
            );
            let client = build_client(cfg)?;
            cmd_speak(&client, &request, &out).await
        }
        Commands::Moderate { text, model } => {
            let model = model.unwrap_or_else(|| cfg.moderation_model.clone());
            let client = build_client(cfg)?;
            cmd_moderate(&client, &model, text).await
        }
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    config::save_config(&ClientConfig::default(), path)?;
    println!("{} Wrote {}", ">>>".green().bold(), path.display());
    println!("    Set api_key there or export {}.", config::API_KEY_ENV);
    Ok(())
}

async fn cmd_chat(
    client: &CablyClient,
    model: &str,
    system: Option<String>,
    prompt: String,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
) -> Result<()> {
    let mut request = ChatRequest::new(model, initial_messages(system, prompt));
    request.max_tokens = max_tokens;
    request.temperature = temperature;

    let result = client.chat_completion(&request).await?;
    match result.text() {
        Some(text) => println!("{}", text),
        None => warn!("Model returned no text"),
    }
    Ok(())
}

async fn cmd_chat_with_tools(
    client: &CablyClient,
    model: &str,
    system: Option<String>,
    prompt: String,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
) -> Result<()> {
    let registry = Arc::new(tools::builtin_registry(client.config())?);
    let mut options = LoopOptions::from_config(client.config());
    options.max_tokens = max_tokens;
    options.temperature = temperature;
    let tool_loop = ToolLoop::new(client.transport().clone(), registry, options);

    let mut conversation = Conversation::from(initial_messages(system, prompt));
    let start = conversation.len();

    // Ctrl+C cancels the in-flight request
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let outcome = tool_loop
        .run_with_cancel(model, &mut conversation, &cancel)
        .await;

    for message in &conversation.messages()[start..] {
        print_turn(message);
    }

    let result = outcome?;
    match result.text() {
        Some(text) if !text.trim().is_empty() => {
            println!();
            println!("{}", text);
        }
        _ => warn!("Loop ended without a final answer"),
    }
    info!("Conversation has {} messages", conversation.len());
    Ok(())
}

async fn cmd_image(client: &CablyClient, request: ImageRequest) -> Result<()> {
    let images = client.generate_images(&request).await?;
    for url in images.urls() {
        println!("{}", url);
    }
    Ok(())
}

async fn cmd_transcribe(client: &CablyClient, model: &str, file: &Path) -> Result<()> {
    let upload = FileUpload::from_path(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let transcription = client.transcribe(model, upload).await?;
    println!("{}", transcription.text);
    Ok(())
}

async fn cmd_speak(client: &CablyClient, request: &SpeechRequest, out: &Path) -> Result<()> {
    let speech = client.speech(request).await?;
    speech
        .stream_to_file(out)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!(
        "{} Wrote {} bytes to {}",
        ">>>".green().bold(),
        speech.audio.len(),
        out.display()
    );
    Ok(())
}

async fn cmd_moderate(client: &CablyClient, model: &str, text: String) -> Result<()> {
    let moderation = client.moderate(model, text).await?;
    for (i, result) in moderation.results.iter().enumerate() {
        let verdict = if result.flagged {
            "flagged".red().bold().to_string()
        } else {
            "ok".green().to_string()
        };
        let categories: Vec<&str> = result
            .categories
            .iter()
            .filter(|(_, v)| v.as_bool() == Some(true))
            .map(|(k, _)| k.as_str())
            .collect();
        if categories.is_empty() {
            println!("[{}] {}", i, verdict);
        } else {
            println!("[{}] {} ({})", i, verdict, categories.join(", "));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_client(cfg: ClientConfig) -> Result<CablyClient> {
    if cfg.api_key.is_empty() {
        eprintln!(
            "{} No API key. Set api_key in the config file or export {}.",
            "Error:".red().bold(),
            config::API_KEY_ENV
        );
        std::process::exit(1);
    }
    CablyClient::from_config(cfg).context("Failed to build HTTP client")
}

fn initial_messages(system: Option<String>, prompt: String) -> Vec<Message> {
    let mut messages = Vec::new();
    if let Some(system) = system {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(prompt));
    messages
}

fn print_turn(message: &Message) {
    match message.role {
        Role::Assistant => {
            for call in &message.tool_calls {
                println!("{} {}({})", "->".cyan().bold(), call.name, call.arguments.dimmed());
            }
        }
        Role::Tool => {
            let text = message.content.as_deref().unwrap_or_default();
            let preview: String = text.chars().take(120).collect();
            let label = if text.starts_with("Error") || text.starts_with("Failed") {
                "<-".red().bold()
            } else {
                "<-".green().bold()
            };
            println!("{} {}", label, preview.replace('\n', " ").dimmed());
        }
        Role::System | Role::User => {}
    }
}
