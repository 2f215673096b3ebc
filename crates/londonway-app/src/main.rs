//! LondonWay application binary - composition root.
//!
//! 1. Load configuration from TOML, apply CLI overrides
//! 2. Open the SQLite store and load favorites
//! 3. Build the Gemini backend and chat session
//! 4. Run the interactive REPL, rendering session events as they arrive

mod cli;
mod render;
mod repl;

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use londonway_chat::{BackendAdapter, ChatEvent, ChatSession, GeminiBackend};
use londonway_core::config::LondonWayConfig;
use londonway_core::types::Role;
use londonway_storage::{Database, FavoritesBook, KeyValueStore};

use crate::cli::{expand_home, CliArgs};
use crate::render::Renderer;
use crate::repl::Command;

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Print rendered events until the session is dropped.
async fn render_loop(mut events: tokio::sync::broadcast::Receiver<ChatEvent>) {
    let mut renderer = Renderer::new();
    let mut out = tokio::io::stdout();
    loop {
        match events.recv().await {
            Ok(event) => {
                let finished = matches!(event, ChatEvent::TurnFinished { .. });
                if let Some(text) = renderer.render(&event) {
                    let _ = out.write_all(text.as_bytes()).await;
                }
                if finished {
                    let _ = out.write_all(b"> ").await;
                }
                let _ = out.flush().await;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Renderer fell behind; some updates were skipped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config first so its log level can seed the filter.
    let config_file = args.resolve_config_path();
    let loaded = config_file
        .exists()
        .then(|| LondonWayConfig::load(&config_file));
    let mut config = match &loaded {
        Some(Ok(config)) => config.clone(),
        _ => LondonWayConfig::default(),
    };
    args.apply(&mut config);

    // Tracing. RUST_LOG > --log-level > config.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting LondonWay v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Some(Ok(_)) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(Err(e)) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config; using defaults"
        ),
        None => tracing::info!(path = %config_file.display(), "No config file; using defaults"),
    }

    // Storage.
    let data_dir = expand_home(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join(&config.storage.db_file);
    let store: Arc<dyn KeyValueStore> = Arc::new(Database::new(&db_path)?);
    let favorites = FavoritesBook::load(store, config.storage.favorites_key.clone())?;

    // Backend.
    let api_key = std::env::var(&config.backend.api_key_env).unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!(
            var = %config.backend.api_key_env,
            "API key not set; requests will fail and replies will show the failure notice"
        );
    }
    let backend = GeminiBackend::from_config(&config.backend, api_key)?;
    tracing::info!(
        model = %backend.model(),
        web_search = config.backend.web_search,
        "Gemini backend ready"
    );

    let mut session = ChatSession::new(&config.chat, BackendAdapter::new(backend), favorites);
    let renderer = tokio::spawn(render_loop(session.subscribe()));

    println!("LondonWay - type a question, or /help for commands.");
    println!("Network: {}", session.network_alert());
    session.greet().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let result = match repl::parse(&line) {
            Command::Ask(text) => session.send(&text).await.map(|_| ()),
            Command::Quick(quick) => session.send_quick(quick).await.map(|_| ()),
            Command::SaveFavorite(label) => {
                let anchor = session
                    .messages()
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::Assistant)
                    .map(|m| m.id);
                match anchor {
                    Some(id) => session.save_favorite(id, &label).map(|fav| {
                        println!("Saved favorite: {}", fav.label);
                        prompt();
                    }),
                    None => {
                        println!("Nothing to save yet.");
                        prompt();
                        Ok(())
                    }
                }
            }
            Command::ListFavorites => {
                if session.favorites().is_empty() {
                    println!("No favorites yet. Save one with /fav <label>.");
                }
                for (i, fav) in session.favorites().iter().enumerate() {
                    println!("  {}. {}", i + 1, fav.label);
                }
                prompt();
                Ok(())
            }
            Command::PlanFavorite(n) => match session.favorites().get(n - 1).map(|f| f.id.clone()) {
                Some(id) => session.plan_favorite(&id).await.map(|_| ()),
                None => {
                    println!("No favorite number {n}.");
                    prompt();
                    Ok(())
                }
            },
            Command::RemoveFavorite(n) => match session.favorites().get(n - 1).map(|f| f.id.clone()) {
                Some(id) => session.remove_favorite(&id).map(|fav| {
                    println!("Removed favorite: {}", fav.label);
                    prompt();
                }),
                None => {
                    println!("No favorite number {n}.");
                    prompt();
                    Ok(())
                }
            },
            Command::Help => {
                println!("{}", repl::HELP);
                prompt();
                Ok(())
            }
            Command::Quit => break,
            Command::Empty => {
                prompt();
                Ok(())
            }
            Command::Invalid(message) => {
                println!("{message}");
                prompt();
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::debug!(error = %e, "Command rejected");
            println!("error: {e}");
            prompt();
        }
    }

    drop(session);
    let _ = renderer.await;
    tracing::info!("LondonWay stopped");
    Ok(())
}
