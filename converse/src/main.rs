#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::io::Write as _;
use std::sync::Arc;

use anyhow::Context as _;
use args::Args;
use clap::Parser;
use converse_config::Config;
use converse_llm::{ChatParams, ChatService, Message};
use futures_util::StreamExt;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)?;

    // Initialize logging
    converse_telemetry::init(config.logging.as_ref(), "warn")?;

    // Cancel the stream on Ctrl-C or SIGTERM
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel_clone.cancel();
    });

    let params = build_params(&config, args, cancel).await?;
    tracing::info!(provider = %params.provider.id, model = %params.model, "starting chat");

    match stream_reply(params).await {
        Err(e) if e.downcast_ref::<converse_llm::LlmError>().is_some_and(converse_llm::LlmError::is_abort) => {
            tracing::info!("chat cancelled");
            Ok(())
        }
        other => other,
    }
}

async fn build_params(config: &Config, args: Args, cancel: CancellationToken) -> anyhow::Result<ChatParams> {
    let provider_id = args
        .provider
        .or_else(|| config.defaults.provider.clone())
        .or_else(|| config.providers.keys().next().cloned())
        .context("no provider configured")?;
    let provider = config
        .provider(&provider_id)
        .with_context(|| format!("unknown provider '{provider_id}'"))?;

    let model = args
        .model
        .or_else(|| config.defaults.model.clone())
        .context("no model given; pass --model or set defaults.model")?;

    let prompt = if args.prompt.is_empty() {
        let mut input = String::new();
        tokio::io::stdin()
            .read_to_string(&mut input)
            .await
            .context("failed to read prompt from stdin")?;
        input
    } else {
        args.prompt.join(" ")
    };
    anyhow::ensure!(!prompt.trim().is_empty(), "empty prompt");

    let mut messages = Vec::new();
    if let Some(system) = args.system.or_else(|| config.defaults.system_prompt.clone()) {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(prompt));

    let mut params = ChatParams::new(Arc::new(provider.clone()), model, messages)
        .with_max_tool_loop_iterations(config.defaults.max_tool_loop_iterations)
        .with_cancel(cancel);
    params.thinking_budget = args.thinking_budget;
    params.max_tokens = args.max_tokens;
    params.temperature = args.temperature;
    params.image_paths = args.images;
    params.prompt_tool_use = args.prompt_tools;
    Ok(params)
}

/// Print reasoning dimmed to stderr and content to stdout as it arrives
async fn stream_reply(params: ChatParams) -> anyhow::Result<()> {
    let service = ChatService::default();
    let mut stream = service.send_message_stream(params).await?;

    let mut stdout = std::io::stdout().lock();
    let mut stderr = std::io::stderr().lock();
    let mut in_reasoning = false;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;

        if let Some(reasoning) = &chunk.reasoning {
            if !in_reasoning {
                write!(stderr, "\x1b[2m")?;
                in_reasoning = true;
            }
            write!(stderr, "{reasoning}")?;
            stderr.flush()?;
        }

        if let Some(content) = &chunk.content {
            if in_reasoning {
                writeln!(stderr, "\x1b[0m")?;
                in_reasoning = false;
            }
            write!(stdout, "{content}")?;
            stdout.flush()?;
        }

        if chunk.is_done {
            if in_reasoning {
                writeln!(stderr, "\x1b[0m")?;
                in_reasoning = false;
            }
            if let Some(usage) = &chunk.usage {
                tracing::debug!(
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    cached_tokens = usage.cached_tokens,
                    thought_tokens = usage.thought_tokens,
                    total_tokens = usage.total_tokens,
                    "token usage"
                );
            }
            writeln!(stdout)?;
        }
    }

    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::debug!("shutdown signal received");
}
