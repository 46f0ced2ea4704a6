//! 시그널 검증기.
//!
//! 시그널이 실행으로 넘어가려면 모든 게이트를 통과해야 합니다:
//! 데이터 신선도/품질, 포지션 수, 단일 종목/섹터 집중도, 현금,
//! 매매 정지 플래그, 총손실 한도.
//!
//! 매도와 비상 청산은 노출을 줄이는 방향이므로 정지 플래그와 포지션 수
//! 게이트를 면제받습니다. 거부 시 사유와 함께, 통과 가능했을 최대
//! 수량이 있으면 `suggested_quantity`로 제안합니다.

use hanquant_core::{
    pct_of, Market, QuantResult, Shares, Ticker, TradingSignal, ValidationConfig,
    ValidationOutcome,
};
use hanquant_data::{ScoreReader, StockDirectory};
use hanquant_execution::FeeSchedule;
use hanquant_portfolio::{PortfolioSnapshot, PortfolioStore};
use hanquant_risk::RiskConfig;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// 시그널 검증기.
pub struct SignalValidator {
    store: Arc<dyn PortfolioStore>,
    reader: Arc<dyn ScoreReader>,
    directory: Arc<dyn StockDirectory>,
    fees: FeeSchedule,
    config: ValidationConfig,
    risk: RiskConfig,
}

impl SignalValidator {
    /// 새 검증기를 생성합니다.
    pub fn new(
        store: Arc<dyn PortfolioStore>,
        reader: Arc<dyn ScoreReader>,
        directory: Arc<dyn StockDirectory>,
        fees: FeeSchedule,
        config: ValidationConfig,
        risk: RiskConfig,
    ) -> Self {
        Self {
            store,
            reader,
            directory,
            fees,
            config,
            risk,
        }
    }

    /// 시그널을 검증합니다.
    pub async fn validate(&self, signal: &TradingSignal) -> QuantResult<ValidationOutcome> {
        let halted = self.store.is_halted(&signal.user).await?;

        // 매도/비상 청산은 정지 중에도 항상 허용 (노출 축소)
        if signal.kind.is_sell() {
            let mut outcome = ValidationOutcome::valid();
            if halted {
                outcome = outcome.with_warning("trading halted: sell allowed for risk reduction");
            }
            return Ok(outcome);
        }

        if halted {
            return Ok(ValidationOutcome::rejected("trading halted"));
        }

        self.validate_buy(signal).await
    }

    async fn validate_buy(&self, signal: &TradingSignal) -> QuantResult<ValidationOutcome> {
        // 데이터 신선도: 한도를 넘긴 데이터는 리더가 None으로 응답
        let Some(reading) = self.reader.latest(&signal.ticker).await? else {
            return Ok(ValidationOutcome::rejected(format!(
                "no recent data within {} market hours",
                self.config.require_recent_data_hours
            )));
        };

        if reading.data_quality < self.config.min_data_quality_score {
            return Ok(ValidationOutcome::rejected(format!(
                "data quality {} below minimum {}",
                reading.data_quality, self.config.min_data_quality_score
            )));
        }

        // 총손실 한도: 한도 이상이면 신규 매수 금지
        let metrics = self.store.metrics(&signal.user).await?;
        if metrics.total_loss_from_initial_pct >= self.risk.max_total_loss_pct {
            return Ok(ValidationOutcome::rejected(format!(
                "total loss {}% at or above ceiling {}%",
                metrics.total_loss_from_initial_pct, self.risk.max_total_loss_pct
            )));
        }

        let snapshot = self.store.snapshot(&signal.user).await?;
        let order_value = signal.current_price * Decimal::from(signal.recommended_shares);
        let total_value = snapshot.total_value();

        // 포지션 수 (주문 반영 후)
        let is_new_position = !snapshot
            .positions
            .iter()
            .any(|p| p.ticker == signal.ticker);
        let count_after = snapshot.positions.len() + usize::from(is_new_position);
        if count_after > self.config.max_positions {
            return Ok(ValidationOutcome::rejected(format!(
                "position count {} would exceed maximum {}",
                count_after, self.config.max_positions
            )));
        }

        // 단일 종목 집중도
        let existing_value = snapshot
            .positions
            .iter()
            .find(|p| p.ticker == signal.ticker)
            .map(|p| p.current_value)
            .unwrap_or(Decimal::ZERO);
        let concentration_cap = pct_of(total_value, self.config.max_concentration_pct);
        if existing_value + order_value > concentration_cap {
            let headroom = concentration_cap - existing_value;
            let mut outcome = ValidationOutcome::rejected(format!(
                "position weight would exceed {}% concentration limit",
                self.config.max_concentration_pct
            ));
            if let Some(suggested) = shares_within(headroom, signal.current_price) {
                outcome = outcome.with_suggested_quantity(suggested);
            }
            return Ok(outcome);
        }

        // 섹터 집중도 (섹터 정보가 없는 종목은 경고 후 통과)
        let mut warnings = Vec::new();
        match self.sector_weight(signal, &snapshot, order_value).await? {
            SectorCheck::Ok => {}
            SectorCheck::Unknown => {
                warnings.push(format!("sector unknown for {}", signal.ticker));
            }
            SectorCheck::Exceeded(sector) => {
                return Ok(ValidationOutcome::rejected(format!(
                    "sector {} weight would exceed {}% limit",
                    sector, self.config.max_sector_concentration_pct
                )));
            }
        }

        // 현금: 주문 금액 + 예상 수수료
        let market = self.market_of(&signal.ticker).await;
        let estimated_fees =
            self.fees
                .buy_commission(market, signal.recommended_shares, signal.current_price);
        if order_value + estimated_fees > snapshot.cash_balance {
            let mut outcome = ValidationOutcome::rejected(format!(
                "insufficient cash: need {}, have {}",
                order_value + estimated_fees,
                snapshot.cash_balance
            ));
            // 수수료 몫을 제외한 예산으로 제안 수량 계산
            let budget = snapshot.cash_balance
                / (Decimal::ONE + self.fees.rates(market).commission_rate);
            if let Some(suggested) = shares_within(budget, signal.current_price) {
                outcome = outcome.with_suggested_quantity(suggested);
            }
            return Ok(outcome);
        }

        debug!(ticker = %signal.ticker, shares = signal.recommended_shares, "signal validated");
        let mut outcome = ValidationOutcome::valid();
        for warning in warnings {
            outcome = outcome.with_warning(warning);
        }
        Ok(outcome)
    }

    async fn sector_weight(
        &self,
        signal: &TradingSignal,
        snapshot: &PortfolioSnapshot,
        order_value: Decimal,
    ) -> QuantResult<SectorCheck> {
        let sector = match self.directory.get(&signal.ticker).await {
            Ok(Some(stock)) => stock.sector,
            _ => None,
        };
        let Some(sector) = sector else {
            return Ok(SectorCheck::Unknown);
        };

        let mut sector_value = order_value;
        for position in snapshot.positions.iter() {
            if position.ticker == signal.ticker {
                sector_value += position.current_value;
                continue;
            }
            if let Ok(Some(stock)) = self.directory.get(&position.ticker).await {
                if stock.sector.as_deref() == Some(sector.as_str()) {
                    sector_value += position.current_value;
                }
            }
        }

        let sector_cap = pct_of(
            snapshot.total_value(),
            self.config.max_sector_concentration_pct,
        );
        if sector_value > sector_cap {
            Ok(SectorCheck::Exceeded(sector))
        } else {
            Ok(SectorCheck::Ok)
        }
    }

    async fn market_of(&self, ticker: &Ticker) -> Market {
        match self.directory.get(ticker).await {
            Ok(Some(stock)) => stock.market,
            _ => Market::Kospi,
        }
    }
}

enum SectorCheck {
    Ok,
    Unknown,
    Exceeded(String),
}

/// 금액 한도 안에 들어가는 최대 수량.
fn shares_within(budget: Decimal, price: Decimal) -> Option<Shares> {
    if price <= Decimal::ZERO || budget <= Decimal::ZERO {
        return None;
    }
    let shares = (budget / price).floor().to_i64().unwrap_or(0);
    (shares > 0).then_some(shares)
}
