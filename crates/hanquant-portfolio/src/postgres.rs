//! PostgreSQL 포트폴리오 저장소.
//!
//! 모든 쓰기는 SERIALIZABLE 트랜잭션으로 실행하고, 체결 적용은
//! `processed_fills` 테이블을 통해 주문 ID 기준으로 멱등합니다.

use crate::store::{AppliedFill, Fill, PortfolioSnapshot, PortfolioStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hanquant_core::{
    PortfolioMetrics, Position, PositionLimits, Price, QuantError, QuantResult, Shares, Side,
    Ticker, Trade,
};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

/// positions 테이블 행.
#[derive(Debug, Clone, FromRow)]
struct PositionRow {
    user_id: String,
    ticker: String,
    quantity: Shares,
    avg_price: Decimal,
    current_price: Decimal,
    current_value: Decimal,
    invested_amount: Decimal,
    realized_pnl: Decimal,
    unrealized_pnl: Decimal,
    unrealized_pnl_pct: Decimal,
    stop_loss_price: Option<Decimal>,
    stop_loss_pct: Option<Decimal>,
    take_profit_price: Option<Decimal>,
    take_profit_pct: Option<Decimal>,
    trailing_stop_enabled: bool,
    trailing_stop_distance_pct: Option<Decimal>,
    trailing_stop_price: Option<Decimal>,
    highest_price_since_purchase: Decimal,
    composite_score_at_entry: Option<Decimal>,
    first_purchase_at: DateTime<Utc>,
    last_transaction_at: DateTime<Utc>,
    archived_at: Option<DateTime<Utc>>,
}

impl PositionRow {
    fn into_position(self) -> QuantResult<Position> {
        Ok(Position {
            user: self.user_id,
            ticker: Ticker::new(&self.ticker)?,
            quantity: self.quantity,
            avg_price: self.avg_price,
            current_price: self.current_price,
            current_value: self.current_value,
            invested_amount: self.invested_amount,
            realized_pnl: self.realized_pnl,
            unrealized_pnl: self.unrealized_pnl,
            unrealized_pnl_pct: self.unrealized_pnl_pct,
            stop_loss_price: self.stop_loss_price,
            stop_loss_pct: self.stop_loss_pct,
            take_profit_price: self.take_profit_price,
            take_profit_pct: self.take_profit_pct,
            trailing_stop_enabled: self.trailing_stop_enabled,
            trailing_stop_distance_pct: self.trailing_stop_distance_pct,
            trailing_stop_price: self.trailing_stop_price,
            highest_price_since_purchase: self.highest_price_since_purchase,
            composite_score_at_entry: self.composite_score_at_entry,
            first_purchase_at: self.first_purchase_at,
            last_transaction_at: self.last_transaction_at,
            archived_at: self.archived_at,
        })
    }
}

/// PostgreSQL 포트폴리오 저장소.
pub struct PgPortfolioStore {
    pool: PgPool,
}

impl PgPortfolioStore {
    /// 새 저장소를 생성합니다.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// SERIALIZABLE 트랜잭션을 시작합니다.
    async fn begin_serializable(&self) -> QuantResult<Transaction<'_, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn load_open_position(
        tx: &mut Transaction<'_, Postgres>,
        user: &str,
        ticker: &Ticker,
    ) -> QuantResult<Option<Position>> {
        let row = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT user_id, ticker, quantity, avg_price, current_price, current_value,
                   invested_amount, realized_pnl, unrealized_pnl, unrealized_pnl_pct,
                   stop_loss_price, stop_loss_pct, take_profit_price, take_profit_pct,
                   trailing_stop_enabled, trailing_stop_distance_pct, trailing_stop_price,
                   highest_price_since_purchase, composite_score_at_entry,
                   first_purchase_at, last_transaction_at, archived_at
            FROM positions
            WHERE user_id = $1 AND ticker = $2 AND archived_at IS NULL AND quantity > 0
            FOR UPDATE
            "#,
        )
        .bind(user)
        .bind(ticker.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        row.map(PositionRow::into_position).transpose()
    }

    async fn save_position(
        tx: &mut Transaction<'_, Postgres>,
        position: &Position,
    ) -> QuantResult<()> {
        sqlx::query(
            r#"
            INSERT INTO positions (
                user_id, ticker, quantity, avg_price, current_price, current_value,
                invested_amount, realized_pnl, unrealized_pnl, unrealized_pnl_pct,
                stop_loss_price, stop_loss_pct, take_profit_price, take_profit_pct,
                trailing_stop_enabled, trailing_stop_distance_pct, trailing_stop_price,
                highest_price_since_purchase, composite_score_at_entry,
                first_purchase_at, last_transaction_at, archived_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20, $21, $22)
            ON CONFLICT (user_id, ticker, first_purchase_at) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                avg_price = EXCLUDED.avg_price,
                current_price = EXCLUDED.current_price,
                current_value = EXCLUDED.current_value,
                invested_amount = EXCLUDED.invested_amount,
                realized_pnl = EXCLUDED.realized_pnl,
                unrealized_pnl = EXCLUDED.unrealized_pnl,
                unrealized_pnl_pct = EXCLUDED.unrealized_pnl_pct,
                stop_loss_price = EXCLUDED.stop_loss_price,
                stop_loss_pct = EXCLUDED.stop_loss_pct,
                take_profit_price = EXCLUDED.take_profit_price,
                take_profit_pct = EXCLUDED.take_profit_pct,
                trailing_stop_enabled = EXCLUDED.trailing_stop_enabled,
                trailing_stop_distance_pct = EXCLUDED.trailing_stop_distance_pct,
                trailing_stop_price = EXCLUDED.trailing_stop_price,
                highest_price_since_purchase = EXCLUDED.highest_price_since_purchase,
                composite_score_at_entry = EXCLUDED.composite_score_at_entry,
                last_transaction_at = EXCLUDED.last_transaction_at,
                archived_at = EXCLUDED.archived_at
            "#,
        )
        .bind(&position.user)
        .bind(position.ticker.as_str())
        .bind(position.quantity)
        .bind(position.avg_price)
        .bind(position.current_price)
        .bind(position.current_value)
        .bind(position.invested_amount)
        .bind(position.realized_pnl)
        .bind(position.unrealized_pnl)
        .bind(position.unrealized_pnl_pct)
        .bind(position.stop_loss_price)
        .bind(position.stop_loss_pct)
        .bind(position.take_profit_price)
        .bind(position.take_profit_pct)
        .bind(position.trailing_stop_enabled)
        .bind(position.trailing_stop_distance_pct)
        .bind(position.trailing_stop_price)
        .bind(position.highest_price_since_purchase)
        .bind(position.composite_score_at_entry)
        .bind(position.first_purchase_at)
        .bind(position.last_transaction_at)
        .bind(position.archived_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn load_cash(
        tx: &mut Transaction<'_, Postgres>,
        user: &str,
    ) -> QuantResult<(Decimal, Decimal)> {
        let row: Option<(Decimal, Decimal)> = sqlx::query_as(
            "SELECT cash_balance, initial_capital FROM accounts WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user)
        .fetch_optional(&mut **tx)
        .await?;

        row.ok_or_else(|| QuantError::NotFound(format!("account not found: {}", user)))
    }

    async fn save_cash(
        tx: &mut Transaction<'_, Postgres>,
        user: &str,
        cash: Decimal,
    ) -> QuantResult<()> {
        sqlx::query("UPDATE accounts SET cash_balance = $2, updated_at = NOW() WHERE user_id = $1")
            .bind(user)
            .bind(cash)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PortfolioStore for PgPortfolioStore {
    async fn open_account(&self, user: &str, initial_capital: Decimal) -> QuantResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (user_id, cash_balance, initial_capital)
            VALUES ($1, $2, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user)
        .bind(initial_capital)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_position(&self, user: &str, ticker: &Ticker) -> QuantResult<Option<Position>> {
        let row = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT user_id, ticker, quantity, avg_price, current_price, current_value,
                   invested_amount, realized_pnl, unrealized_pnl, unrealized_pnl_pct,
                   stop_loss_price, stop_loss_pct, take_profit_price, take_profit_pct,
                   trailing_stop_enabled, trailing_stop_distance_pct, trailing_stop_price,
                   highest_price_since_purchase, composite_score_at_entry,
                   first_purchase_at, last_transaction_at, archived_at
            FROM positions
            WHERE user_id = $1 AND ticker = $2 AND archived_at IS NULL AND quantity > 0
            "#,
        )
        .bind(user)
        .bind(ticker.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PositionRow::into_position).transpose()
    }

    async fn list_positions(&self, user: &str) -> QuantResult<Vec<Position>> {
        let rows = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT user_id, ticker, quantity, avg_price, current_price, current_value,
                   invested_amount, realized_pnl, unrealized_pnl, unrealized_pnl_pct,
                   stop_loss_price, stop_loss_pct, take_profit_price, take_profit_pct,
                   trailing_stop_enabled, trailing_stop_distance_pct, trailing_stop_price,
                   highest_price_since_purchase, composite_score_at_entry,
                   first_purchase_at, last_transaction_at, archived_at
            FROM positions
            WHERE user_id = $1 AND archived_at IS NULL AND quantity > 0
            ORDER BY ticker
            "#,
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PositionRow::into_position).collect()
    }

    async fn snapshot(&self, user: &str) -> QuantResult<PortfolioSnapshot> {
        // 현금과 포지션 합계를 하나의 트랜잭션에서 읽어 일관성을 보장
        let mut tx = self.begin_serializable().await?;

        let (cash_balance, initial_capital) = Self::load_cash(&mut tx, user).await?;
        let rows = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT user_id, ticker, quantity, avg_price, current_price, current_value,
                   invested_amount, realized_pnl, unrealized_pnl, unrealized_pnl_pct,
                   stop_loss_price, stop_loss_pct, take_profit_price, take_profit_pct,
                   trailing_stop_enabled, trailing_stop_distance_pct, trailing_stop_price,
                   highest_price_since_purchase, composite_score_at_entry,
                   first_purchase_at, last_transaction_at, archived_at
            FROM positions
            WHERE user_id = $1 AND archived_at IS NULL AND quantity > 0
            ORDER BY ticker
            "#,
        )
        .bind(user)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(PortfolioSnapshot {
            positions: rows
                .into_iter()
                .map(PositionRow::into_position)
                .collect::<QuantResult<Vec<_>>>()?,
            cash_balance,
            initial_capital,
        })
    }

    async fn apply_fill(&self, user: &str, fill: &Fill) -> QuantResult<AppliedFill> {
        let mut tx = self.begin_serializable().await?;

        // 멱등성: 처리된 체결이면 저장된 결과를 그대로 반환
        let replay: Option<(serde_json::Value, Decimal)> = sqlx::query_as(
            "SELECT position_snapshot, cash_balance FROM processed_fills WHERE order_id = $1",
        )
        .bind(&fill.order_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((snapshot, cash_balance)) = replay {
            tx.commit().await?;
            let position: Position = serde_json::from_value(snapshot)?;
            return Ok(AppliedFill {
                position,
                cash_balance,
                duplicate: true,
            });
        }

        let (mut cash, _initial) = Self::load_cash(&mut tx, user).await?;
        let existing = Self::load_open_position(&mut tx, user, &fill.ticker).await?;

        let position = match fill.side {
            Side::Buy => {
                let cost = fill.gross_amount() + fill.total_fees();
                if cost > cash {
                    return Err(QuantError::Business(format!(
                        "insufficient cash: need {}, have {}",
                        cost, cash
                    )));
                }
                cash -= cost;

                match existing {
                    Some(mut position) => {
                        position.apply_buy(fill.quantity, fill.price)?;
                        position
                    }
                    None => Position::open(user, fill.ticker.clone(), fill.quantity, fill.price),
                }
            }
            Side::Sell => {
                let mut position = existing.ok_or_else(|| {
                    QuantError::NotFound(format!("position not found: {}/{}", user, fill.ticker))
                })?;
                position.apply_sell(fill.quantity, fill.price, fill.total_fees())?;
                cash += fill.gross_amount() - fill.total_fees();
                position
            }
        };

        Self::save_position(&mut tx, &position).await?;
        Self::save_cash(&mut tx, user, cash).await?;

        sqlx::query(
            r#"
            INSERT INTO processed_fills (order_id, user_id, position_snapshot, cash_balance)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&fill.order_id)
        .bind(user)
        .bind(serde_json::to_value(&position)?)
        .bind(cash)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(AppliedFill {
            position,
            cash_balance: cash,
            duplicate: false,
        })
    }

    async fn initialize_limits(
        &self,
        user: &str,
        ticker: &Ticker,
        limits: &PositionLimits,
        composite_at_entry: Option<Decimal>,
    ) -> QuantResult<Position> {
        let mut tx = self.begin_serializable().await?;
        let mut position = Self::load_open_position(&mut tx, user, ticker)
            .await?
            .ok_or_else(|| {
                QuantError::NotFound(format!("position not found: {}/{}", user, ticker))
            })?;

        position.initialize_limits(limits);
        position.composite_score_at_entry = composite_at_entry;

        Self::save_position(&mut tx, &position).await?;
        tx.commit().await?;
        Ok(position)
    }

    async fn update_trailing(
        &self,
        user: &str,
        ticker: &Ticker,
        last_price: Price,
    ) -> QuantResult<Option<Position>> {
        let mut tx = self.begin_serializable().await?;
        let Some(mut position) = Self::load_open_position(&mut tx, user, ticker).await? else {
            tx.commit().await?;
            return Ok(None);
        };

        position.update_price(last_price);
        position.update_trailing(last_price);

        Self::save_position(&mut tx, &position).await?;
        tx.commit().await?;
        Ok(Some(position))
    }

    async fn set_halt(&self, user: &str, reason: &str) -> QuantResult<()> {
        let mut metrics = self.metrics(user).await?;
        metrics.trading_halted = true;
        metrics.halt_reason = Some(reason.to_string());
        metrics.halt_started_at = Some(Utc::now());
        self.store_metrics(user, &metrics).await
    }

    async fn clear_halt(&self, user: &str) -> QuantResult<()> {
        let mut metrics = self.metrics(user).await?;
        metrics.trading_halted = false;
        metrics.halt_reason = None;
        metrics.halt_started_at = None;
        self.store_metrics(user, &metrics).await
    }

    async fn is_halted(&self, user: &str) -> QuantResult<bool> {
        Ok(self.metrics(user).await?.trading_halted)
    }

    async fn metrics(&self, user: &str) -> QuantResult<PortfolioMetrics> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT data FROM portfolio_metrics WHERE user_id = $1")
                .bind(user)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((data,)) => Ok(serde_json::from_value(data)?),
            None => {
                let mut tx = self.pool.begin().await.map_err(QuantError::from)?;
                let (_, initial) = Self::load_cash(&mut tx, user).await?;
                tx.commit().await?;
                Ok(PortfolioMetrics::bootstrap(user, initial))
            }
        }
    }

    async fn store_metrics(&self, user: &str, metrics: &PortfolioMetrics) -> QuantResult<()> {
        sqlx::query(
            r#"
            INSERT INTO portfolio_metrics (user_id, data, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
            "#,
        )
        .bind(user)
        .bind(serde_json::to_value(metrics)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_trade(&self, trade: &Trade) -> QuantResult<()> {
        sqlx::query(
            r#"
            INSERT INTO trades (order_id, user_id, data, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(&trade.order_id)
        .bind(&trade.user)
        .bind(serde_json::to_value(trade)?)
        .bind(trade.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_trade(&self, order_id: &str) -> QuantResult<Option<Trade>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT data FROM trades WHERE order_id = $1")
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(data,)| serde_json::from_value(data).map_err(QuantError::from))
            .transpose()
    }

    async fn update_trade(&self, trade: &Trade) -> QuantResult<()> {
        sqlx::query("UPDATE trades SET data = $2 WHERE order_id = $1")
            .bind(&trade.order_id)
            .bind(serde_json::to_value(trade)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
