use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use http::HeaderValue;
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing::{error, info, warn};

use storefront_orders as api;
use api::{
    auth::{AuthConfig, AuthService},
    handlers::AppServices,
    invoices::{HtmlInvoiceRenderer, InvoiceRenderer},
    notifications::{HttpMailer, LogMailer, Mailer, NotificationDispatcher},
    payments::{DisabledPaymentProcessor, PaymentProcessor, StripeClient, StripeConfig},
    repositories::{
        ChargeRepository, OrderRepository, SeaOrmCartStore, SubscriptionRepository,
    },
    services::{OrderLifecycleService, PaymentSessionGateway},
};

/// Lifetime of tokens minted by this service; tokens are normally issued upstream.
const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(3600);
const STORE_NAME: &str = "Storefront";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to the database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Payment processor
    let processor: Arc<dyn PaymentProcessor> = match StripeConfig::from_app_config(&cfg) {
        Some(stripe_cfg) => {
            info!("Stripe checkout enabled");
            Arc::new(StripeClient::new(stripe_cfg).context("failed to build Stripe client")?)
        }
        None => {
            warn!("No Stripe secret configured; payment sessions are disabled");
            Arc::new(DisabledPaymentProcessor)
        }
    };

    // Mail transport and notification scheduling
    let mailer: Arc<dyn Mailer> = match HttpMailer::from_app_config(&cfg)
        .context("failed to build mail relay client")?
    {
        Some(relay) => {
            info!("Mail relay enabled");
            Arc::new(relay)
        }
        None => {
            warn!("No mail relay configured; emails will only be logged");
            Arc::new(LogMailer)
        }
    };
    let renderer: Arc<dyn InvoiceRenderer> = Arc::new(HtmlInvoiceRenderer::new(STORE_NAME));
    let (notifier, notification_worker) = NotificationDispatcher::for_mode(
        cfg.notification_mode(),
        cfg.notification_queue_capacity,
        mailer,
        renderer,
    );

    // Services
    let orders = OrderRepository::new(db_arc.clone());
    let gateway = Arc::new(PaymentSessionGateway::new(
        processor,
        orders.clone(),
        ChargeRepository::new(db_arc.clone()),
        SubscriptionRepository::new(db_arc.clone()),
        cfg.currency.clone(),
        cfg.storefront_base_url(),
    ));
    let lifecycle = Arc::new(OrderLifecycleService::new(
        orders,
        Arc::new(SeaOrmCartStore::new(db_arc.clone())),
        gateway.clone(),
        notifier,
        cfg.storefront_base_url(),
    ));

    let auth_service = Arc::new(AuthService::new(AuthConfig::new(
        cfg.jwt_secret.clone(),
        ACCESS_TOKEN_TTL,
    )));

    // Compose shared app state
    let app_state = api::AppState {
        db: db_arc.clone(),
        config: cfg.clone(),
        services: AppServices::new(lifecycle, gateway),
        auth: auth_service,
    };

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        info!("Using permissive CORS because explicit origins were not configured");
        CorsLayer::permissive()
    } else {
        anyhow::bail!(
            "Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true"
        );
    };

    let app = api::app_router(app_state)
        // HTTP tracing layer for consistent request/response telemetry
        .layer(api::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors_layer);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    info!("storefront-orders listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the last dispatcher handle, so the queue is closed and drains.
    if let Some(worker) = notification_worker {
        if let Err(e) = worker.await {
            error!(error = %e, "Notification worker terminated abnormally");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
