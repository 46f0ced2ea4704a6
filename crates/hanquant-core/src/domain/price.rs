//! 일봉(OHLCV) 데이터.

use crate::error::{QuantError, QuantResult};
use crate::types::{Price, Ticker};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 하루치 시세 봉.
///
/// (종목, 거래일) 당 1건이며 거래일 단위로 append-only입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyBar {
    /// 종목코드
    pub ticker: Ticker,
    /// 거래일
    pub trade_date: NaiveDate,
    /// 시가
    pub open: Price,
    /// 고가
    pub high: Price,
    /// 저가
    pub low: Price,
    /// 종가
    pub close: Price,
    /// 거래량
    pub volume: i64,
    /// 거래대금
    pub trading_value: Decimal,
    /// 수정종가
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjusted_close: Option<Price>,
    /// 전일 대비 등락률 (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<Decimal>,
}

impl DailyBar {
    /// 봉 불변 조건을 검증합니다.
    ///
    /// low <= open, close <= high 그리고 volume >= 0 이어야 합니다.
    pub fn validate(&self) -> QuantResult<()> {
        if self.low > self.open || self.low > self.close {
            return Err(QuantError::Validation(format!(
                "bar {} {}: low {} above open/close",
                self.ticker, self.trade_date, self.low
            )));
        }
        if self.high < self.open || self.high < self.close {
            return Err(QuantError::Validation(format!(
                "bar {} {}: high {} below open/close",
                self.ticker, self.trade_date, self.high
            )));
        }
        if self.volume < 0 {
            return Err(QuantError::Validation(format!(
                "bar {} {}: negative volume {}",
                self.ticker, self.trade_date, self.volume
            )));
        }
        Ok(())
    }

    /// 하루 등락폭 (고가 - 저가).
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }
}
