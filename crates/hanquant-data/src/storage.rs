//! PostgreSQL 읽기 저장소.
//!
//! 스코어/지표/종목 마스터 테이블에 대한 읽기 전용 접근을 제공합니다.
//! 쓰기는 데이터 수집기(외부 협력자)의 책임입니다.

use crate::directory::StockDirectory;
use crate::error::Result;
use crate::reader::{score_as_of, ScoreReader, ScoreReading, StalenessGate};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use hanquant_core::{CompositeScore, Market, Stock, TechnicalSnapshot, Ticker};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

/// composite_scores 테이블 행.
#[derive(Debug, Clone, FromRow)]
struct ScoreRow {
    ticker: String,
    score_date: NaiveDate,
    value_score: Decimal,
    growth_score: Decimal,
    quality_score: Decimal,
    momentum_score: Decimal,
    composite_score: Decimal,
    percentile: Decimal,
    computed_at: DateTime<Utc>,
}

/// technical_snapshots 테이블 행.
#[derive(Debug, Clone, FromRow)]
struct SnapshotRow {
    ticker: String,
    snapshot_date: NaiveDate,
    rsi_14: Option<f64>,
    macd: Option<f64>,
    macd_signal: Option<f64>,
    bb_upper: Option<Decimal>,
    bb_lower: Option<Decimal>,
    sma_20: Option<Decimal>,
    atr_14: Option<Decimal>,
    volume_ma_20: Option<Decimal>,
    current_volume: Option<Decimal>,
    annualized_volatility: Option<f64>,
}

/// stocks 테이블 행.
#[derive(Debug, Clone, FromRow)]
struct StockRow {
    ticker: String,
    name: String,
    name_en: Option<String>,
    market: String,
    sector: Option<String>,
    industry: Option<String>,
    listed_shares: Option<i64>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// PostgreSQL 기반 ScoreReader.
pub struct PgScoreReader {
    pool: PgPool,
    gate: StalenessGate,
}

impl PgScoreReader {
    /// 새 리더를 생성합니다.
    pub fn new(pool: PgPool, gate: StalenessGate) -> Self {
        Self { pool, gate }
    }
}

#[async_trait]
impl ScoreReader for PgScoreReader {
    async fn latest(&self, ticker: &Ticker) -> Result<Option<ScoreReading>> {
        let score_row = sqlx::query_as::<_, ScoreRow>(
            r#"
            SELECT ticker, score_date, value_score, growth_score, quality_score,
                   momentum_score, composite_score, percentile, computed_at
            FROM composite_scores
            WHERE ticker = $1
            ORDER BY score_date DESC
            LIMIT 1
            "#,
        )
        .bind(ticker.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(score_row) = score_row else {
            return Ok(None);
        };

        let score = CompositeScore {
            ticker: Ticker::new(&score_row.ticker).unwrap_or_else(|_| ticker.clone()),
            score_date: score_row.score_date,
            value_score: score_row.value_score,
            growth_score: score_row.growth_score,
            quality_score: score_row.quality_score,
            momentum_score: score_row.momentum_score,
            composite_score: score_row.composite_score,
            percentile: score_row.percentile,
            computed_at: score_row.computed_at,
        };

        let as_of = score_as_of(&score);
        if !self.gate.is_fresh(as_of, Utc::now()) {
            tracing::debug!(ticker = %ticker, %as_of, "score treated as absent: stale");
            return Ok(None);
        }

        let snapshot_row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT ticker, snapshot_date, rsi_14, macd, macd_signal, bb_upper,
                   bb_lower, sma_20, atr_14, volume_ma_20, current_volume,
                   annualized_volatility
            FROM technical_snapshots
            WHERE ticker = $1
            ORDER BY snapshot_date DESC
            LIMIT 1
            "#,
        )
        .bind(ticker.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let snapshot = match snapshot_row {
            Some(row) => TechnicalSnapshot {
                ticker: Ticker::new(&row.ticker).ok(),
                snapshot_date: Some(row.snapshot_date),
                rsi_14: row.rsi_14,
                macd: row.macd,
                macd_signal: row.macd_signal,
                bb_upper: row.bb_upper,
                bb_lower: row.bb_lower,
                sma_20: row.sma_20,
                atr_14: row.atr_14,
                volume_ma_20: row.volume_ma_20,
                current_volume: row.current_volume,
                annualized_volatility: row.annualized_volatility,
            },
            None => TechnicalSnapshot::default(),
        };

        let data_quality = snapshot.data_quality_score();
        Ok(Some(ScoreReading {
            score,
            snapshot,
            data_quality,
            as_of,
        }))
    }
}

/// PostgreSQL 기반 종목 마스터 조회.
pub struct PgStockDirectory {
    pool: PgPool,
}

impl PgStockDirectory {
    /// 새 디렉토리를 생성합니다.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StockDirectory for PgStockDirectory {
    async fn get(&self, ticker: &Ticker) -> Result<Option<Stock>> {
        let row = sqlx::query_as::<_, StockRow>(
            r#"
            SELECT ticker, name, name_en, market, sector, industry,
                   listed_shares, is_active, created_at, updated_at
            FROM stocks
            WHERE ticker = $1
            "#,
        )
        .bind(ticker.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Stock {
            ticker: ticker.clone(),
            name: r.name,
            name_en: r.name_en,
            market: Market::from_code(&r.market).unwrap_or(Market::Kospi),
            sector: r.sector,
            industry: r.industry,
            listed_shares: r.listed_shares,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }))
    }
}
