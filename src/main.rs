use std::sync::Arc;
use std::time::Instant;

use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};

use stackswap_backend::api::{self, AppState};
use stackswap_backend::cache::{Cache, InMemoryCache, RedisCache};
use stackswap_backend::chains::stacks::{PlatformStacksSigner, StacksClient, StacksConfig};
use stackswap_backend::config::AppConfig;
use stackswap_backend::database::{PriceSnapshotRepository, TransactionRepository};
use stackswap_backend::logging;
use stackswap_backend::payments::{LencoProvider, PaymentProviderFactory};
use stackswap_backend::services::{LiquidityGuard, PriceOracleCache};
use stackswap_backend::settlement::{OnrampEngine, SettlementEngine};
use stackswap_backend::workers::ChainIndexer;

const DB_POOL_MAX_CONNECTIONS: u32 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_tracing();

    let config = AppConfig::from_env().map_err(|e| {
        error!(error = %e, "failed to load configuration");
        anyhow::anyhow!("configuration error: {e}")
    })?;
    let config = Arc::new(config);
    info!(environment = %config.node_env, port = config.port, "starting stackswap-backend");

    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .connect(&config.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect to database: {e}"))?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let cache: Arc<dyn Cache> = match &config.redis_url {
        Some(url) => Arc::new(RedisCache::new(url).await.map_err(|e| anyhow::anyhow!("failed to connect to redis: {e}"))?),
        None => {
            warn!("REDIS_URL not set, falling back to an in-process cache (single-instance only)");
            Arc::new(InMemoryCache::new())
        }
    };

    let transactions = Arc::new(TransactionRepository::new(pool.clone()));
    let price_snapshots = Arc::new(PriceSnapshotRepository::new(pool.clone()));

    let price_oracle = Arc::new(PriceOracleCache::new(config.price.clone(), Some(price_snapshots)));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    {
        let price_oracle = Arc::clone(&price_oracle);
        let mut shutdown_rx = shutdown_rx.clone();
        let tick_interval = config.price.cache_ttl;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.tick().await; // first tick fires immediately, skip it: get_current already warms the cache lazily
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        price_oracle.force_refresh().await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("price refresh task shutting down");
                            return;
                        }
                    }
                }
            }
        });
    }
    info!("background price refresh task started");

    let mut payment_factory = PaymentProviderFactory::new("lenco");
    let lenco = config.lenco.as_ref().map(|c| {
        Arc::new(LencoProvider::new(c.api_key.clone(), c.account_id.clone(), c.webhook_secret.clone()))
    });
    if let Some(lenco) = lenco.clone() {
        payment_factory.register(lenco);
    } else {
        warn!("LENCO_API_KEY/LENCO_ACCOUNT_ID/LENCO_WEBHOOK_SECRET not fully set, offramp payout routes will fail until configured");
    }
    let payment_factory = Arc::new(payment_factory);

    let liquidity_guard = Arc::new(LiquidityGuard::new(
        payment_factory.default_provider().map_err(|e| anyhow::anyhow!("{e}"))?,
        config.offramp.min_buffer_ngn,
    ));

    let stacks_config = StacksConfig::from_env();
    let stacks_client = Arc::new(StacksClient::new(stacks_config.clone()));

    let settlement = Arc::new(SettlementEngine::new(
        Arc::clone(&transactions),
        Arc::clone(&price_oracle),
        Arc::clone(&liquidity_guard),
        payment_factory.default_provider().map_err(|e| anyhow::anyhow!("{e}"))?,
        Arc::clone(&stacks_client),
        &config,
    ));

    let onramp = match PlatformStacksSigner::new(stacks_config.clone()) {
        Ok(signer) => Some(Arc::new(OnrampEngine::new(
            Arc::clone(&transactions),
            Arc::clone(&price_oracle),
            Arc::clone(&stacks_client),
            Arc::new(signer),
            config.monnify.clone(),
            config.offramp.flat_fee_ngn,
        ))),
        Err(e) => {
            warn!(error = %e, "platform Stacks signer not available, onramp routes will return 503");
            None
        }
    };

    if config.indexer_enabled() {
        let indexer = ChainIndexer::new(
            Arc::clone(&stacks_client),
            Arc::clone(&settlement),
            config.indexer.clone(),
            stacks_config.usdc_contract_id(),
            config.offramp.confirmation_blocks,
        );
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            indexer.run(shutdown_rx).await;
        });
        info!("chain indexer started");
    } else {
        warn!("PLATFORM_STX_ADDRESS/INTERNAL_API_KEY not both set, chain indexer disabled");
    }

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        cache,
        transactions,
        price_oracle,
        liquidity_guard,
        payment_factory,
        stacks_client,
        settlement,
        onramp,
        started_at: Instant::now(),
    });

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Wakes the indexer and price-refresh background tasks so they
            // exit cleanly instead of being dropped when the runtime tears down.
            let _ = shutdown_tx.send(true);
        })
        .await?;

    Ok(())
}

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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
