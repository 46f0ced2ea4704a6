//! 최신 종합 점수/지표 스냅샷 조회.
//!
//! 신선도 한도(`max_data_age_hours`, 시장시간 기준)를 넘긴 데이터는 없는
//! 것으로 취급합니다. 주말과 휴장일은 캘린더(C1)로 제외하고 계산합니다.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Asia::Seoul;
use hanquant_core::{CompositeScore, KrxCalendar, TechnicalSnapshot, Ticker};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 점수와 지표를 묶은 읽기 결과.
#[derive(Debug, Clone)]
pub struct ScoreReading {
    /// 최신 종합 점수
    pub score: CompositeScore,
    /// 최신 기술적 지표 스냅샷
    pub snapshot: TechnicalSnapshot,
    /// 데이터 품질 점수 [0, 100] (입력 중 비어 있지 않은 비율)
    pub data_quality: Decimal,
    /// 데이터 기준 시각
    pub as_of: DateTime<Utc>,
}

/// 종합 점수/지표 읽기 인터페이스.
///
/// 신선도 기준을 넘긴 데이터는 `None`으로 응답해야 합니다.
#[async_trait]
pub trait ScoreReader: Send + Sync {
    /// 종목의 최신 읽기 결과를 반환합니다. 데이터가 없거나 오래되면 None.
    async fn latest(&self, ticker: &Ticker) -> Result<Option<ScoreReading>>;
}

/// 신선도 판정기.
///
/// 기준 시각과 현재 시각 사이의 시장시간(주말/휴장일 제외 벽시계 시간)이
/// 한도를 넘으면 오래된 것으로 판정합니다.
#[derive(Clone)]
pub struct StalenessGate {
    calendar: Arc<KrxCalendar>,
    max_age_hours: i64,
}

impl StalenessGate {
    /// 새 신선도 판정기를 생성합니다.
    pub fn new(calendar: Arc<KrxCalendar>, max_age_hours: i64) -> Self {
        Self {
            calendar,
            max_age_hours,
        }
    }

    /// 기준 시각 데이터가 아직 신선한지 확인합니다.
    pub fn is_fresh(&self, as_of: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let elapsed = self.calendar.market_hours_between(as_of, now);
        elapsed <= Duration::hours(self.max_age_hours)
    }
}

/// 인메모리 ScoreReader.
///
/// 페이퍼 트레이딩과 테스트에서 사용합니다. 시각을 고정할 수 있도록
/// `now` 오버라이드를 지원합니다.
pub struct StaticScoreReader {
    readings: RwLock<HashMap<Ticker, (CompositeScore, TechnicalSnapshot)>>,
    gate: StalenessGate,
    fixed_now: Option<DateTime<Utc>>,
}

impl StaticScoreReader {
    /// 새 인메모리 리더를 생성합니다.
    pub fn new(gate: StalenessGate) -> Self {
        Self {
            readings: RwLock::new(HashMap::new()),
            gate,
            fixed_now: None,
        }
    }

    /// 테스트용으로 현재 시각을 고정합니다.
    pub fn with_fixed_now(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    /// 읽기 데이터를 등록합니다.
    pub async fn insert(&self, score: CompositeScore, snapshot: TechnicalSnapshot) {
        let mut readings = self.readings.write().await;
        readings.insert(score.ticker.clone(), (score, snapshot));
    }

    fn now(&self) -> DateTime<Utc> {
        self.fixed_now.unwrap_or_else(Utc::now)
    }
}

#[async_trait]
impl ScoreReader for StaticScoreReader {
    async fn latest(&self, ticker: &Ticker) -> Result<Option<ScoreReading>> {
        let readings = self.readings.read().await;
        let Some((score, snapshot)) = readings.get(ticker) else {
            return Ok(None);
        };

        // 산출 기준일의 KST 장 마감을 데이터 기준 시각으로 사용
        let as_of = score_as_of(score);
        if !self.gate.is_fresh(as_of, self.now()) {
            tracing::debug!(ticker = %ticker, %as_of, "score treated as absent: stale");
            return Ok(None);
        }

        Ok(Some(ScoreReading {
            score: score.clone(),
            snapshot: snapshot.clone(),
            data_quality: snapshot.data_quality_score(),
            as_of,
        }))
    }
}

/// 점수 레코드의 데이터 기준 시각 (산출일 15:30 KST).
pub fn score_as_of(score: &CompositeScore) -> DateTime<Utc> {
    use chrono::TimeZone;
    Seoul
        .from_local_datetime(&score.score_date.and_hms_opt(15, 30, 0).expect("valid time"))
        .single()
        .expect("KST local time is unambiguous")
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use hanquant_core::ScoreWeights;
    use rust_decimal_macros::dec;

    fn sample_score(date: NaiveDate) -> CompositeScore {
        CompositeScore::combine(
            Ticker::new("005930").unwrap(),
            date,
            dec!(80),
            dec!(60),
            dec!(70),
            dec!(90),
            dec!(95),
            &ScoreWeights::default(),
        )
        .unwrap()
    }

    fn kst_now(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Seoul
            .with_ymd_and_hms(y, m, d, h, 0, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_fresh_score_is_returned() {
        let gate = StalenessGate::new(Arc::new(KrxCalendar::with_builtin_holidays()), 48);
        // 수요일 산출 -> 목요일 아침 조회
        let reader = StaticScoreReader::new(gate).with_fixed_now(kst_now(2025, 3, 6, 8));
        let score = sample_score(NaiveDate::from_ymd_opt(2025, 3, 5).unwrap());
        reader.insert(score, TechnicalSnapshot::default()).await;

        let reading = reader
            .latest(&Ticker::new("005930").unwrap())
            .await
            .unwrap();
        assert!(reading.is_some());
    }

    #[tokio::test]
    async fn test_weekend_does_not_age_score() {
        let gate = StalenessGate::new(Arc::new(KrxCalendar::with_builtin_holidays()), 48);
        // 금요일(3/7) 산출 -> 다음 주 월요일(3/10) 저녁 조회.
        // 벽시계로는 3일이 지났지만 주말을 제외하면 48시장시간 이내
        let reader = StaticScoreReader::new(gate).with_fixed_now(kst_now(2025, 3, 10, 20));
        let score = sample_score(NaiveDate::from_ymd_opt(2025, 3, 7).unwrap());
        reader.insert(score, TechnicalSnapshot::default()).await;

        let reading = reader
            .latest(&Ticker::new("005930").unwrap())
            .await
            .unwrap();
        assert!(reading.is_some());
    }

    #[tokio::test]
    async fn test_stale_score_treated_as_absent() {
        let gate = StalenessGate::new(Arc::new(KrxCalendar::with_builtin_holidays()), 48);
        // 월요일(3/3은 휴장이므로 3/4 화요일) 산출 -> 금요일 저녁 조회: 48시장시간 초과
        let reader = StaticScoreReader::new(gate).with_fixed_now(kst_now(2025, 3, 7, 20));
        let score = sample_score(NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());
        reader.insert(score, TechnicalSnapshot::default()).await;

        let reading = reader
            .latest(&Ticker::new("005930").unwrap())
            .await
            .unwrap();
        assert!(reading.is_none());
    }

    #[tokio::test]
    async fn test_missing_ticker_is_none() {
        let gate = StalenessGate::new(Arc::new(KrxCalendar::with_builtin_holidays()), 48);
        let reader = StaticScoreReader::new(gate);

        let reading = reader
            .latest(&Ticker::new("000660").unwrap())
            .await
            .unwrap();
        assert!(reading.is_none());
    }
}
