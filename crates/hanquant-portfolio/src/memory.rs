//! 인메모리 포트폴리오 저장소.
//!
//! 페이퍼 트레이딩과 테스트에서 사용합니다. 사용자 단위 비동기 락으로
//! 쓰기를 직렬화하여 동일 (사용자, 종목) 키의 동시 체결을 선형화합니다.

use crate::store::{AppliedFill, Fill, PortfolioSnapshot, PortfolioStore};
use async_trait::async_trait;
use chrono::Utc;
use hanquant_core::{
    PortfolioMetrics, Position, PositionLimits, Price, QuantError, QuantResult, Side, Ticker,
    Trade,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

/// 사용자 1명의 장부.
#[derive(Debug, Default)]
struct UserBook {
    cash: Decimal,
    initial_capital: Decimal,
    positions: BTreeMap<Ticker, Position>,
    /// 전량 청산되어 아카이브된 포지션 (실현 손익 보존)
    archived: Vec<Position>,
    /// 적용된 체결 (order_id -> 결과), 멱등성 보장용
    applied_fills: HashMap<String, (Position, Decimal)>,
    metrics: Option<PortfolioMetrics>,
}

/// 인메모리 포트폴리오 저장소.
#[derive(Default)]
pub struct MemoryPortfolioStore {
    books: RwLock<HashMap<String, UserBook>>,
    trades: RwLock<HashMap<String, Trade>>,
}

impl MemoryPortfolioStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 아카이브된 포지션 목록 (실현 손익 보존 확인용).
    pub async fn archived_positions(&self, user: &str) -> Vec<Position> {
        let books = self.books.read().await;
        books
            .get(user)
            .map(|book| book.archived.clone())
            .unwrap_or_default()
    }

    fn book_missing(user: &str) -> QuantError {
        QuantError::NotFound(format!("account not found: {}", user))
    }

    fn position_missing(user: &str, ticker: &Ticker) -> QuantError {
        QuantError::NotFound(format!("position not found: {}/{}", user, ticker))
    }
}

#[async_trait]
impl PortfolioStore for MemoryPortfolioStore {
    async fn open_account(&self, user: &str, initial_capital: Decimal) -> QuantResult<()> {
        let mut books = self.books.write().await;
        books.entry(user.to_string()).or_insert_with(|| UserBook {
            cash: initial_capital,
            initial_capital,
            ..Default::default()
        });
        Ok(())
    }

    async fn get_position(&self, user: &str, ticker: &Ticker) -> QuantResult<Option<Position>> {
        let books = self.books.read().await;
        Ok(books
            .get(user)
            .and_then(|book| book.positions.get(ticker))
            .filter(|p| p.is_open())
            .cloned())
    }

    async fn list_positions(&self, user: &str) -> QuantResult<Vec<Position>> {
        let books = self.books.read().await;
        Ok(books
            .get(user)
            .map(|book| {
                book.positions
                    .values()
                    .filter(|p| p.is_open())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn snapshot(&self, user: &str) -> QuantResult<PortfolioSnapshot> {
        let books = self.books.read().await;
        let book = books.get(user).ok_or_else(|| Self::book_missing(user))?;
        Ok(PortfolioSnapshot {
            positions: book
                .positions
                .values()
                .filter(|p| p.is_open())
                .cloned()
                .collect(),
            cash_balance: book.cash,
            initial_capital: book.initial_capital,
        })
    }

    async fn apply_fill(&self, user: &str, fill: &Fill) -> QuantResult<AppliedFill> {
        let mut books = self.books.write().await;
        let book = books
            .get_mut(user)
            .ok_or_else(|| Self::book_missing(user))?;

        // 멱등성: 이미 적용된 체결은 저장된 결과를 그대로 반환
        if let Some((position, cash)) = book.applied_fills.get(&fill.order_id) {
            debug!(order_id = %fill.order_id, "fill replay detected, returning stored result");
            return Ok(AppliedFill {
                position: position.clone(),
                cash_balance: *cash,
                duplicate: true,
            });
        }

        if fill.quantity <= 0 {
            return Err(QuantError::Validation(format!(
                "fill quantity must be positive, got {}",
                fill.quantity
            )));
        }

        let position = match fill.side {
            Side::Buy => {
                let cost = fill.gross_amount() + fill.total_fees();
                if cost > book.cash {
                    return Err(QuantError::Business(format!(
                        "insufficient cash: need {}, have {}",
                        cost, book.cash
                    )));
                }
                book.cash -= cost;

                let position = match book.positions.remove(&fill.ticker) {
                    Some(mut position) if position.is_open() => {
                        position.apply_buy(fill.quantity, fill.price)?;
                        position
                    }
                    old => {
                        // 신규 또는 재진입: 이전 포지션은 아카이브로 이동
                        if let Some(old) = old {
                            book.archived.push(old);
                        }
                        Position::open(user, fill.ticker.clone(), fill.quantity, fill.price)
                    }
                };
                book.positions.insert(fill.ticker.clone(), position.clone());
                position
            }
            Side::Sell => {
                let position = book
                    .positions
                    .get_mut(&fill.ticker)
                    .filter(|p| p.is_open())
                    .ok_or_else(|| Self::position_missing(user, &fill.ticker))?;

                position.apply_sell(fill.quantity, fill.price, fill.total_fees())?;
                book.cash += fill.gross_amount() - fill.total_fees();
                position.clone()
            }
        };

        book.applied_fills
            .insert(fill.order_id.clone(), (position.clone(), book.cash));

        Ok(AppliedFill {
            position,
            cash_balance: book.cash,
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
        let mut books = self.books.write().await;
        let book = books
            .get_mut(user)
            .ok_or_else(|| Self::book_missing(user))?;
        let position = book
            .positions
            .get_mut(ticker)
            .filter(|p| p.is_open())
            .ok_or_else(|| Self::position_missing(user, ticker))?;

        position.initialize_limits(limits);
        position.composite_score_at_entry = composite_at_entry;
        Ok(position.clone())
    }

    async fn update_trailing(
        &self,
        user: &str,
        ticker: &Ticker,
        last_price: Price,
    ) -> QuantResult<Option<Position>> {
        let mut books = self.books.write().await;
        let Some(book) = books.get_mut(user) else {
            return Ok(None);
        };
        let Some(position) = book.positions.get_mut(ticker).filter(|p| p.is_open()) else {
            return Ok(None);
        };

        position.update_price(last_price);
        position.update_trailing(last_price);
        Ok(Some(position.clone()))
    }

    async fn set_halt(&self, user: &str, reason: &str) -> QuantResult<()> {
        let mut books = self.books.write().await;
        let book = books
            .get_mut(user)
            .ok_or_else(|| Self::book_missing(user))?;
        let metrics = book
            .metrics
            .get_or_insert_with(|| PortfolioMetrics::bootstrap(user, book.initial_capital));
        metrics.trading_halted = true;
        metrics.halt_reason = Some(reason.to_string());
        metrics.halt_started_at = Some(Utc::now());
        Ok(())
    }

    async fn clear_halt(&self, user: &str) -> QuantResult<()> {
        let mut books = self.books.write().await;
        let book = books
            .get_mut(user)
            .ok_or_else(|| Self::book_missing(user))?;
        if let Some(metrics) = book.metrics.as_mut() {
            metrics.trading_halted = false;
            metrics.halt_reason = None;
            metrics.halt_started_at = None;
        }
        Ok(())
    }

    async fn is_halted(&self, user: &str) -> QuantResult<bool> {
        let books = self.books.read().await;
        Ok(books
            .get(user)
            .and_then(|book| book.metrics.as_ref())
            .map(|m| m.trading_halted)
            .unwrap_or(false))
    }

    async fn metrics(&self, user: &str) -> QuantResult<PortfolioMetrics> {
        let books = self.books.read().await;
        let book = books.get(user).ok_or_else(|| Self::book_missing(user))?;
        Ok(book
            .metrics
            .clone()
            .unwrap_or_else(|| PortfolioMetrics::bootstrap(user, book.initial_capital)))
    }

    async fn store_metrics(&self, user: &str, metrics: &PortfolioMetrics) -> QuantResult<()> {
        let mut books = self.books.write().await;
        let book = books
            .get_mut(user)
            .ok_or_else(|| Self::book_missing(user))?;
        book.metrics = Some(metrics.clone());
        Ok(())
    }

    async fn record_trade(&self, trade: &Trade) -> QuantResult<()> {
        let mut trades = self.trades.write().await;
        trades.insert(trade.order_id.clone(), trade.clone());
        Ok(())
    }

    async fn find_trade(&self, order_id: &str) -> QuantResult<Option<Trade>> {
        let trades = self.trades.read().await;
        Ok(trades.get(order_id).cloned())
    }

    async fn update_trade(&self, trade: &Trade) -> QuantResult<()> {
        let mut trades = self.trades.write().await;
        trades.insert(trade.order_id.clone(), trade.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(order_id: &str, side: Side, quantity: i64, price: Decimal) -> Fill {
        Fill {
            order_id: order_id.to_string(),
            ticker: Ticker::new("005930").unwrap(),
            side,
            quantity,
            price,
            commission: dec!(105),
            tax: Decimal::ZERO,
            executed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_buy_fill_debits_cash_once() {
        let store = MemoryPortfolioStore::new();
        store.open_account("user1", dec!(10_000_000)).await.unwrap();

        let buy = fill("ENTRY_005930_20250304_084500", Side::Buy, 10, dec!(700_000));
        let applied = store.apply_fill("user1", &buy).await.unwrap();

        assert!(!applied.duplicate);
        assert_eq!(applied.position.quantity, 10);
        assert_eq!(applied.cash_balance, dec!(2_999_895));

        // 같은 order_id 재시도: 상태 변화 없이 같은 결과
        let replay = store.apply_fill("user1", &buy).await.unwrap();
        assert!(replay.duplicate);
        assert_eq!(replay.cash_balance, dec!(2_999_895));

        let snapshot = store.snapshot("user1").await.unwrap();
        assert_eq!(snapshot.cash_balance, dec!(2_999_895));
    }

    #[tokio::test]
    async fn test_insufficient_cash_rejected() {
        let store = MemoryPortfolioStore::new();
        store.open_account("user1", dec!(1_000_000)).await.unwrap();

        let buy = fill("ENTRY_005930_20250304_084500", Side::Buy, 100, dec!(70_000));
        let err = store.apply_fill("user1", &buy).await.unwrap_err();
        assert!(matches!(err, QuantError::Business(_)));
    }

    #[tokio::test]
    async fn test_full_exit_archives_and_rebuy_starts_fresh() {
        let store = MemoryPortfolioStore::new();
        store.open_account("user1", dec!(10_000_000)).await.unwrap();

        store
            .apply_fill("user1", &fill("E1", Side::Buy, 10, dec!(70_000)))
            .await
            .unwrap();
        store
            .initialize_limits(
                "user1",
                &Ticker::new("005930").unwrap(),
                &PositionLimits {
                    stop_loss_pct: dec!(10),
                    take_profit_pct: dec!(20),
                    trailing_enabled: true,
                    trailing_distance_pct: dec!(10),
                },
                Some(dec!(75)),
            )
            .await
            .unwrap();

        // 트레일링을 끌어올린 뒤 전량 청산
        let ticker = Ticker::new("005930").unwrap();
        store
            .update_trailing("user1", &ticker, dec!(90_000))
            .await
            .unwrap();
        store
            .apply_fill("user1", &fill("X1", Side::Sell, 10, dec!(81_000)))
            .await
            .unwrap();

        assert!(store.get_position("user1", &ticker).await.unwrap().is_none());

        // 재매수: 새 평균 단가와 새 트레일링 기준선
        let applied = store
            .apply_fill("user1", &fill("E2", Side::Buy, 5, dec!(80_000)))
            .await
            .unwrap();
        assert_eq!(applied.position.avg_price, dec!(80_000));
        assert_eq!(applied.position.trailing_stop_price, None);
        assert_eq!(applied.position.realized_pnl, Decimal::ZERO);

        // 이전 포지션은 실현 손익을 보존한 채 아카이브됨
        let archived = store.archived_positions("user1").await;
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].realized_pnl, dec!(109_895));
    }

    #[tokio::test]
    async fn test_halt_flag_roundtrip() {
        let store = MemoryPortfolioStore::new();
        store.open_account("user1", dec!(10_000_000)).await.unwrap();

        assert!(!store.is_halted("user1").await.unwrap());
        store.set_halt("user1", "total loss 28% breached").await.unwrap();
        assert!(store.is_halted("user1").await.unwrap());

        let metrics = store.metrics("user1").await.unwrap();
        assert_eq!(
            metrics.halt_reason.as_deref(),
            Some("total loss 28% breached")
        );

        store.clear_halt("user1").await.unwrap();
        assert!(!store.is_halted("user1").await.unwrap());
    }
}
