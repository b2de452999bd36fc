use std::path::Path;

use colored::Colorize;

use crate::bridge::websocket;
use crate::cli::Cli;
use crate::content::{ContentContext, ContentHandle, Document};
use crate::error::{BridgeError, Result};

pub async fn run(cli: &Cli, document: Option<&Path>) -> Result<()> {
    let config = cli.load_config()?;
    let host = config.bridge.host.as_str();
    let port = config.bridge.port;

    if websocket::is_bridge_running(host, port).await {
        return Err(BridgeError::Transport(format!(
            "Port {} on {} is already in use. Is another bridge running?",
            port, host
        )));
    }

    let document = match document {
        Some(path) => Document::load(path)?,
        None => config.load_document()?,
    };
    let title = document.title.clone();
    let context = ContentHandle::new(ContentContext::new(document, config.worker_catalog()));

    let listener = websocket::bind(host, port).await?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({ "status": "listening", "url": config.bridge_url(), "title": title })
        );
    } else {
        println!();
        println!("  {}", "framebridge content side".bold());
        println!("  {}", "─".repeat(40).dimmed());
        println!();
        println!("  {}  WebSocket server on {}", "◆".cyan(), config.bridge_url());
        if !title.is_empty() {
            println!("  {}  Document: {}", "◆".cyan(), title);
        }
        println!();
        println!("  {}  Press Ctrl+C to stop", "ℹ".dimmed());
        println!();
    }

    let result = tokio::select! {
        result = websocket::serve(listener, context.clone()) => result,
        _ = shutdown_signal() => Ok(()),
    };

    context.shutdown().await;
    tracing::info!("Bridge stopped");
    result
}

/// Resolve on SIGINT or SIGTERM (Ctrl+C elsewhere).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => tracing::info!("Received SIGINT"),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                }
            }
            _ => {
                tracing::warn!("Failed to register signal handlers, falling back to Ctrl+C");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
