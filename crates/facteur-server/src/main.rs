//! facteur service binary.
//!
//! Wires configuration, telemetry, the workflow dispatcher, the optional
//! command consumer and the HTTP surface together. Shutdown is cooperative:
//! SIGINT/SIGTERM flips a watch signal observed by both the HTTP server and
//! the log reader.

use std::sync::Arc;

use prometheus::Registry;
use tokio::sync::watch;
use tracing::info;

use facteur_adapters::argo::ArgoWorkflowApi;
use facteur_adapters::bus::LogBus;
use facteur_adapters::config::AppConfig;
use facteur_adapters::session::RedbSessionStore;
use facteur_bridge::consumer::CommandConsumer;
use facteur_bridge::dispatcher::WorkflowDispatcher;
use facteur_bridge::metrics::ConsumerMetrics;
use facteur_bridge::runner::WorkflowRunner;
use facteur_core::dispatch::ServiceConfig;
use facteur_ports::dispatcher::Dispatcher;
use facteur_ports::session::SessionStore;

mod routes;
mod telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = AppConfig::load()?;
    telemetry::init(&config.logging)?;
    info!("starting facteur");

    let workflow_api = Arc::new(ArgoWorkflowApi::try_default().await?);
    let runner = Arc::new(WorkflowRunner::new(workflow_api));
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(WorkflowDispatcher::new(
        runner,
        ServiceConfig {
            namespace: config.argo.namespace.clone(),
            workflow_template: config.argo.workflow_template.clone(),
            service_account: config.argo.service_account.clone(),
            parameters: config.argo.parameters.clone(),
        },
    )?);

    let store: Option<Arc<dyn SessionStore>> = if config.session.path.is_empty() {
        None
    } else {
        Some(Arc::new(
            RedbSessionStore::open(&config.session.path)?.with_prefix(&config.session.prefix),
        ))
    };

    let registry = Registry::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let consumer_task = if config.consumer.enabled {
        let bus = LogBus::connect(config.bus_config()).await?;
        let reader = bus.reader(shutdown_rx.clone()).await?;

        let mut consumer = CommandConsumer::new(Box::new(reader), dispatcher.clone());
        if let Some(store) = &store {
            consumer = consumer.with_store(store.clone());
        }
        if config.consumer.dlq.enabled {
            let writer = bus.writer(&config.consumer.dlq.topic).await?;
            consumer = consumer.with_dlq(Arc::new(writer));
        }
        let metrics = ConsumerMetrics::new()?;
        metrics.register(&registry)?;
        consumer = consumer.with_metrics(metrics);

        info!(
            topic = %config.consumer.topic,
            group = %config.consumer.group_id,
            dlq = config.consumer.dlq.enabled,
            "starting command consumer",
        );
        Some(tokio::spawn(async move { consumer.run().await }))
    } else {
        None
    };

    let state = Arc::new(routes::AppState::new(
        Some(dispatcher),
        store,
        registry,
    ));
    let app = routes::router(state);

    let address = listen_address(&config.server.listen_address);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(address = %address, "listening");

    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        });
    }

    let mut server_shutdown = shutdown_rx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.changed().await;
        })
        .await?;

    // The reader observes the same signal; wait for the loop to drain.
    let _ = shutdown_tx.send(true);
    if let Some(task) = consumer_task {
        task.await??;
    }

    info!("facteur stopped");
    Ok(())
}

/// Accepts the `:8080` shorthand for "all interfaces".
fn listen_address(configured: &str) -> String {
    match configured.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => configured.to_string(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
