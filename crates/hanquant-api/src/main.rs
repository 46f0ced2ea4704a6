//! 리스크 매니저 API 서버 엔트리포인트.

use hanquant_api::middleware::rate_limit::{ApiRateLimiter, RateLimitConfig};
use hanquant_api::routes::metrics::setup_metrics_recorder;
use hanquant_api::{build_router, AppState};
use hanquant_core::{init_logging, AppConfig, KrxCalendar};
use hanquant_data::{
    PgScoreReader, PriceSource, RedisPriceCache, ScoreReader, StalenessGate, StaticPriceSource,
    StaticScoreReader,
};
use hanquant_portfolio::{MemoryPortfolioStore, PgPortfolioStore, PortfolioStore};
use hanquant_risk::{PositionSizer, RiskConfig, RiskEngine};
use hanquant_signal::PositionMonitor;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = match AppConfig::load(std::env::var("CONFIG_PATH").ok(), "RISK_MANAGER") {
        Ok(config) => config,
        Err(e) => {
            // 설정 에러는 기동 실패 (종료 코드 1)
            eprintln!("configuration error: {}", e);
            std::process::exit(1);
        }
    };
    init_logging(&config.logging).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let calendar = Arc::new(KrxCalendar::with_builtin_holidays());
    let gate = StalenessGate::new(calendar.clone(), config.validation.require_recent_data_hours);

    // DB 연결: 실패 시 인메모리 페이퍼 모드로 기동
    let db_pool = match sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(
            config.database.connection_timeout_secs,
        ))
        .connect(&config.database.url)
        .await
    {
        Ok(pool) => {
            tracing::info!("database connected");
            Some(pool)
        }
        Err(e) => {
            tracing::warn!(error = %e, "database unavailable, running with in-memory store");
            None
        }
    };

    let store: Arc<dyn PortfolioStore> = match &db_pool {
        Some(pool) => Arc::new(PgPortfolioStore::new(pool.clone())),
        None => Arc::new(MemoryPortfolioStore::new()),
    };
    let reader: Arc<dyn ScoreReader> = match &db_pool {
        Some(pool) => Arc::new(PgScoreReader::new(pool.clone(), gate.clone())),
        None => Arc::new(StaticScoreReader::new(gate.clone())),
    };
    // Redis: 최신가 캐시 (없으면 인메모리 소스)
    let redis = match RedisPriceCache::connect(&config.redis.url, config.redis.price_ttl_secs).await
    {
        Ok(cache) => Some(Arc::new(cache)),
        Err(e) => {
            tracing::warn!(error = %e, "redis unavailable, price cache disabled");
            None
        }
    };
    let prices: Arc<dyn PriceSource> = match &redis {
        Some(cache) => cache.clone(),
        None => Arc::new(StaticPriceSource::new()),
    };

    let risk_config = RiskConfig {
        max_position_size_pct: config.risk_parameters.max_position_size_pct,
        max_total_loss_pct: config.risk_parameters.max_total_loss_pct,
        risk_tolerance_pct: config.signal_generator.risk_tolerance_pct,
        ..RiskConfig::default()
    };
    let risk_engine = Arc::new(
        RiskEngine::new(store.clone(), risk_config.clone())
            .map_err(|e| anyhow::anyhow!(e.to_string()))?,
    );
    let monitor = Arc::new(PositionMonitor::new(
        store.clone(),
        prices,
        reader,
        config.monitor.clone(),
    ));
    let sizer = PositionSizer::new(risk_config).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let prometheus = setup_metrics_recorder();
    let rate_limiter = ApiRateLimiter::new(RateLimitConfig::default());

    let state = Arc::new(AppState {
        store,
        risk_engine,
        monitor,
        sizer,
        db_pool,
        redis,
        prometheus,
        rate_limiter,
        config: config.clone(),
        started_at: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(%addr, "risk manager API listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    })
    .await?;

    Ok(())
}
