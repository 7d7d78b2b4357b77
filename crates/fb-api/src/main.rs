//! FormBridge API service entry point

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fb_adapters::{RoutingDeliveryTransport, WebhookReviewerNotifier};
use fb_api::config::ServiceConfig;
use fb_api::{create_router, AppState};
use fb_domain::IntakeDefinition;
use fb_engine::Engine;
use fb_ports::ReviewerNotifier;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fb_api=debug,fb_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env();

    let storage = config
        .storage
        .build()
        .expect("failed to open storage backend");

    let notifier: Option<Arc<dyn ReviewerNotifier>> = WebhookReviewerNotifier::from_env()
        .map(|n| Arc::new(n) as Arc<dyn ReviewerNotifier>);

    let mut builder = Engine::builder(storage)
        .transport(Arc::new(RoutingDeliveryTransport::from_env()))
        .base_url(config.base_url.clone());
    if let Some(notifier) = notifier {
        builder = builder.notifier(notifier);
    }
    let engine = builder.build();

    if let Some(path) = &config.intakes_path {
        register_intakes(&engine, path);
    }

    // Background tasks: delivery retries and TTL expiry.
    engine.delivery.clone().spawn();
    engine.sweeper.clone().spawn();

    let app = create_router(AppState::from_engine(&engine));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind listen address");

    tracing::info!(addr = %config.bind_addr, "FormBridge API listening");

    axum::serve(listener, app).await.expect("server failed");
}

fn register_intakes(engine: &Engine, path: &str) {
    let raw = std::fs::read(path).expect("failed to read intakes file");
    let definitions: Vec<IntakeDefinition> =
        serde_json::from_slice(&raw).expect("intakes file is not a JSON array of definitions");
    for definition in definitions {
        let id = definition.id.clone();
        engine
            .registry
            .register(definition, true)
            .expect("invalid intake definition");
        tracing::info!(intake_id = %id, "intake loaded from file");
    }
}
