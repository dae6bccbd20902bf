//! clipresolve command line
//!
//! `resolve` prints one resolution as JSON; `serve` runs the HTTP adapter.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use clipresolve::browser::{BrowserConfig, DeviceProfile};
use clipresolve::handlers::{self, AppState, ClientRateLimiter};
use clipresolve::{metrics, Resolver, ResolverConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Resolve short-video share links into direct media URLs
#[derive(Parser, Debug)]
#[command(name = "clipresolve")]
#[command(version)]
#[command(about = "Resolve short-video share links into direct media URLs")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Path to Chrome/Chromium executable
    #[arg(long, global = true)]
    chrome_path: Option<String>,

    /// Show the browser window
    #[arg(long, global = true)]
    headful: bool,

    /// Run Chrome with its sandbox enabled
    #[arg(long, global = true)]
    sandbox: bool,

    /// Overall navigation budget in milliseconds
    #[arg(long, global = true, default_value_t = 30000)]
    navigation_timeout_ms: u64,

    /// Network idle sub-budget in milliseconds
    #[arg(long, global = true, default_value_t = 5000)]
    idle_timeout_ms: u64,

    /// Concurrent browsing contexts
    #[arg(long, global = true, default_value_t = 4)]
    max_contexts: usize,

    /// Check that the media URL answers before returning it
    #[arg(long, global = true)]
    verify: bool,

    /// Do not follow short links over HTTP; navigate them in the browser
    #[arg(long, global = true)]
    no_http_redirects: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve one link and print the result as JSON
    Resolve {
        /// Share link
        link: String,

        /// Device profile: desktop or mobile
        #[arg(short, long, default_value = "desktop")]
        profile: DeviceProfile,
    },
    /// Run the HTTP API
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Requests per client per minute
        #[arg(long, default_value_t = 10)]
        rate_limit: u32,

        /// Allow browser calls from any origin
        #[arg(long)]
        cors_any: bool,
    },
}

impl EngineArgs {
    fn resolver_config(&self) -> ResolverConfig {
        let mut browser = BrowserConfig::builder()
            .headless(!self.headful)
            .sandbox(self.sandbox);
        if let Some(path) = &self.chrome_path {
            browser = browser.chrome_path(path);
        }

        ResolverConfig::builder()
            .browser(browser.build())
            .navigation_timeout_ms(self.navigation_timeout_ms)
            .idle_timeout_ms(self.idle_timeout_ms)
            .max_contexts(self.max_contexts)
            .verify_reachability(self.verify)
            .follow_redirects(!self.no_http_redirects)
            .build()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    metrics::init();
    let resolver = Resolver::new(cli.engine.resolver_config())?;

    let outcome = match cli.command {
        Command::Resolve { link, profile } => resolve(&resolver, &link, profile).await,
        Command::Serve {
            host,
            port,
            rate_limit,
            cors_any,
        } => serve(&resolver, &host, port, rate_limit, cors_any).await,
    };

    resolver.shutdown().await;
    outcome
}

async fn resolve(resolver: &Resolver, link: &str, profile: DeviceProfile) -> anyhow::Result<()> {
    let result = resolver.resolve(link, Some(profile)).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn serve(
    resolver: &Resolver,
    host: &str,
    port: u16,
    rate_limit: u32,
    cors_any: bool,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(
        resolver.clone(),
        ClientRateLimiter::new(rate_limit, Duration::from_secs(60)),
    ));
    let cors = if cors_any {
        handlers::cors_layer_permissive()
    } else {
        handlers::cors_layer()
    };
    let app = handlers::router(state, cors);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("clipresolve listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
    })
    .await?;

    Ok(())
}
