//! Herald - notification fan-out for the debate platform

use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use herald::{
    chain::{ChainSubscriber, SubscriberConfig},
    config::Args,
    db::{Database, SqliteDirectory},
    directory::Directory,
    inbox::InboxService,
    mention::MentionResolver,
    pipeline::{Pipeline, PipelineConfig},
    planner::RecipientPlanner,
    push::{HttpPushGateway, PushDispatcher},
    server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    let json = args.json_logs();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("herald={},info", log_level).into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Herald - notification fan-out");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Database: {}", args.database_path);
    if args.chain.enabled {
        info!("Chain: {} ({})", args.chain.rpc_url, args.chain.query());
    } else {
        info!("Chain: disabled");
    }
    info!("Push gateway: {}", args.push_gateway_url);
    info!("Queue capacity: {}", args.queue_capacity);
    info!("Workers: {} inbox, {} push", args.inbox_workers, args.push_workers);
    info!("Webhook auth: {}", if args.webhook_api_key.is_some() { "api key" } else { "none" });
    info!("======================================");

    let db = match Database::open(Path::new(&args.database_path)) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let directory: Arc<dyn Directory> = Arc::new(SqliteDirectory::new(Arc::clone(&db)));
    let inbox = Arc::new(InboxService::new(Arc::clone(&db)));
    let planner = Arc::new(RecipientPlanner::new(
        Arc::clone(&directory),
        MentionResolver::new(args.app_profile_url.clone(), args.address_prefix.clone()),
    ));
    let gateway = HttpPushGateway::new(&args.push_gateway_url, args.push_timeout())?;
    let push = Arc::new(PushDispatcher::new(
        Arc::clone(&inbox),
        Arc::new(gateway),
        args.app_asset_url.clone(),
    ));

    let mut pipeline = Pipeline::spawn(
        PipelineConfig::from(&args),
        planner,
        Arc::clone(&inbox),
        push,
    );

    // Chain subscriber feeds the classifier stage
    let chain_tx = pipeline.take_chain_sender();
    let (chain, chain_task) = match (args.chain.enabled, chain_tx) {
        (true, Some(tx)) => {
            let subscriber = Arc::new(ChainSubscriber::new(SubscriberConfig::from(&args.chain)));
            let runner = Arc::clone(&subscriber);
            let task = tokio::spawn(async move { runner.run(tx).await });
            (Some(subscriber), Some(task))
        }
        _ => (None, None),
    };

    let state = Arc::new(server::AppState::new(
        args,
        Arc::clone(&inbox),
        pipeline.events(),
        chain.clone(),
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut server_task = tokio::spawn(server::run(Arc::clone(&state), shutdown_tx.subscribe()));

    tokio::select! {
        result = &mut server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task failed: {}", e),
                Ok(Ok(())) => {}
            }
            std::process::exit(1);
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    // Stop intake first, then drain source to sink
    let _ = shutdown_tx.send(());
    let _ = server_task.await;

    if let Some(subscriber) = &chain {
        subscriber.shutdown();
    }
    if let Some(task) = chain_task {
        let _ = task.await;
    }

    pipeline.shutdown().await;
    info!("Herald stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
