//! KRX 개장일 캘린더.
//!
//! 세 가지 질문에 정확히 답합니다:
//! - `is_open(t)` - 순간 t에 KRX가 개장 중인가?
//! - `next_open(t)` / `next_close(t)` - 다음 개장/폐장 시각
//!
//! 정규장은 Asia/Seoul 기준 평일 09:00-15:30이며, 휴장일 테이블은 코드가
//! 아닌 데이터입니다. 명절(설날/추석 연휴, 부처님오신날)을 포함한 내장
//! 테이블(2024-2026)을 제공하고, 선거일/연말 휴장 등 추가 휴장일은
//! `register_closure`로 재컴파일 없이 등록합니다.
//!
//! 대체공휴일 규칙: 테이블의 휴일이 일요일이면 다음 월요일을 휴장 처리
//! 합니다. 모든 비교는 KST 벽시계 기준이며 DST는 해당되지 않습니다.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Asia::Seoul;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// 정규장 시작 (KST).
pub const SESSION_OPEN: NaiveTime = match NaiveTime::from_hms_opt(9, 0, 0) {
    Some(t) => t,
    None => unreachable!(),
};

/// 정규장 종료 (KST). 종료 시각 정각부터는 폐장으로 취급합니다.
pub const SESSION_CLOSE: NaiveTime = match NaiveTime::from_hms_opt(15, 30, 0) {
    Some(t) => t,
    None => unreachable!(),
};

/// 내장 휴장일 테이블 (2024-2026).
///
/// 고정 공휴일, 음력 연휴(설날/부처님오신날/추석), 그리고 법정
/// 대체공휴일 중 일요일 규칙으로 유도되지 않는 항목을 포함합니다.
const BUILTIN_HOLIDAYS: &[(i32, u32, u32, &str)] = &[
    // 2024
    (2024, 1, 1, "신정"),
    (2024, 2, 9, "설날 연휴"),
    (2024, 2, 10, "설날"),
    (2024, 2, 11, "설날 연휴"),
    (2024, 3, 1, "삼일절"),
    (2024, 5, 1, "근로자의 날"),
    (2024, 5, 5, "어린이날"),
    (2024, 5, 15, "부처님오신날"),
    (2024, 6, 6, "현충일"),
    (2024, 8, 15, "광복절"),
    (2024, 9, 16, "추석 연휴"),
    (2024, 9, 17, "추석"),
    (2024, 9, 18, "추석 연휴"),
    (2024, 10, 3, "개천절"),
    (2024, 10, 9, "한글날"),
    (2024, 12, 25, "성탄절"),
    // 2025
    (2025, 1, 1, "신정"),
    (2025, 1, 27, "임시공휴일"),
    (2025, 1, 28, "설날 연휴"),
    (2025, 1, 29, "설날"),
    (2025, 1, 30, "설날 연휴"),
    (2025, 3, 1, "삼일절"),
    (2025, 3, 3, "삼일절 대체공휴일"),
    (2025, 5, 1, "근로자의 날"),
    (2025, 5, 5, "어린이날/부처님오신날"),
    (2025, 5, 6, "대체공휴일"),
    (2025, 6, 6, "현충일"),
    (2025, 8, 15, "광복절"),
    (2025, 10, 3, "개천절"),
    (2025, 10, 5, "추석 연휴"),
    (2025, 10, 6, "추석"),
    (2025, 10, 7, "추석 연휴"),
    (2025, 10, 8, "추석 대체공휴일"),
    (2025, 10, 9, "한글날"),
    (2025, 12, 25, "성탄절"),
    // 2026
    (2026, 1, 1, "신정"),
    (2026, 2, 16, "설날 연휴"),
    (2026, 2, 17, "설날"),
    (2026, 2, 18, "설날 연휴"),
    (2026, 3, 1, "삼일절"),
    (2026, 5, 1, "근로자의 날"),
    (2026, 5, 5, "어린이날"),
    (2026, 5, 24, "부처님오신날"),
    (2026, 6, 6, "현충일"),
    (2026, 8, 15, "광복절"),
    (2026, 8, 17, "광복절 대체공휴일"),
    (2026, 9, 24, "추석 연휴"),
    (2026, 9, 25, "추석"),
    (2026, 9, 26, "추석 연휴"),
    (2026, 10, 3, "개천절"),
    (2026, 10, 5, "개천절 대체공휴일"),
    (2026, 10, 9, "한글날"),
    (2026, 12, 25, "성탄절"),
];

/// KRX 개장일 캘린더.
pub struct KrxCalendar {
    /// 휴장일 -> 사유. 추가 등록을 위해 내부 가변성을 사용합니다.
    holidays: RwLock<BTreeMap<NaiveDate, String>>,
}

impl Default for KrxCalendar {
    fn default() -> Self {
        Self::with_builtin_holidays()
    }
}

impl KrxCalendar {
    /// 내장 휴장일 테이블로 캘린더를 생성합니다.
    pub fn with_builtin_holidays() -> Self {
        Self::from_holidays(BUILTIN_HOLIDAYS.iter().filter_map(|(y, m, d, name)| {
            NaiveDate::from_ymd_opt(*y, *m, *d).map(|date| (date, name.to_string()))
        }))
    }

    /// 휴장일 목록에서 캘린더를 생성합니다.
    ///
    /// 일요일에 해당하는 휴일에는 대체공휴일 규칙을 적용해 다음 월요일을
    /// 함께 휴장 처리합니다.
    pub fn from_holidays(entries: impl IntoIterator<Item = (NaiveDate, String)>) -> Self {
        let mut holidays = BTreeMap::new();
        for (date, name) in entries {
            if date.weekday() == Weekday::Sun {
                let substitute = date + Duration::days(1);
                holidays
                    .entry(substitute)
                    .or_insert_with(|| format!("{} 대체공휴일", name));
            }
            holidays.insert(date, name);
        }
        Self {
            holidays: RwLock::new(holidays),
        }
    }

    /// 추가 휴장일을 등록합니다 (선거일, 연말 휴장 등).
    pub fn register_closure(&self, date: NaiveDate, reason: impl Into<String>) {
        let mut holidays = self.holidays.write().expect("holiday table lock poisoned");
        holidays.insert(date, reason.into());
    }

    /// 해당 날짜의 휴장 사유를 조회합니다.
    pub fn closure_reason(&self, date: NaiveDate) -> Option<String> {
        let holidays = self.holidays.read().expect("holiday table lock poisoned");
        holidays.get(&date).cloned()
    }

    /// 해당 날짜가 거래일인지 확인합니다 (KST 달력 날짜 기준).
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let holidays = self.holidays.read().expect("holiday table lock poisoned");
        !holidays.contains_key(&date)
    }

    /// 순간 t에 KRX가 개장 중인지 확인합니다.
    ///
    /// 개장 구간은 [09:00:00, 15:30:00) 입니다. 15:29:59는 개장,
    /// 15:30:00부터는 폐장입니다.
    pub fn is_open(&self, instant: DateTime<Utc>) -> bool {
        let kst = instant.with_timezone(&Seoul);
        let date = kst.date_naive();
        if !self.is_trading_day(date) {
            return false;
        }
        let time = kst.time();
        time >= SESSION_OPEN && time < SESSION_CLOSE
    }

    /// 순간 t 이후의 다음 개장 시각(세션 시작)을 반환합니다.
    ///
    /// 이미 개장 중이면 다음 거래일의 개장 시각입니다.
    pub fn next_open(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let kst = after.with_timezone(&Seoul);
        let mut date = kst.date_naive();

        // 당일 개장 전이면 당일 09:00
        if self.is_trading_day(date) && kst.time() < SESSION_OPEN {
            return self.session_instant(date, SESSION_OPEN);
        }

        // 휴장일이 아무리 이어져도 연휴 길이를 넘는 탐색은 비정상
        for _ in 0..370 {
            date += Duration::days(1);
            if self.is_trading_day(date) {
                return self.session_instant(date, SESSION_OPEN);
            }
        }
        unreachable!("no trading day within a year of {}", after)
    }

    /// 순간 t 이후의 다음 폐장 시각(세션 종료)을 반환합니다.
    pub fn next_close(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let kst = after.with_timezone(&Seoul);
        let date = kst.date_naive();

        if self.is_trading_day(date) && kst.time() < SESSION_CLOSE {
            return self.session_instant(date, SESSION_CLOSE);
        }

        let next_open = self.next_open(after);
        let next_date = next_open.with_timezone(&Seoul).date_naive();
        self.session_instant(next_date, SESSION_CLOSE)
    }

    /// [from, to] 구간에서 거래일에 해당하는 벽시계 시간의 합을 반환합니다.
    ///
    /// 주말/휴장일은 통째로 제외됩니다. 데이터 신선도 판정(48 시장시간)에
    /// 사용됩니다.
    pub fn market_hours_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
        if to <= from {
            return Duration::zero();
        }
        let from_kst = from.with_timezone(&Seoul);
        let to_kst = to.with_timezone(&Seoul);

        let mut total = Duration::zero();
        let mut date = from_kst.date_naive();
        let last = to_kst.date_naive();

        while date <= last {
            if self.is_trading_day(date) {
                let day_start = self.day_instant(date, NaiveTime::MIN);
                let day_end = self.day_instant(date + Duration::days(1), NaiveTime::MIN);
                let lo = day_start.max(from);
                let hi = day_end.min(to);
                if hi > lo {
                    total += hi - lo;
                }
            }
            date += Duration::days(1);
        }
        total
    }

    /// KST 날짜+시각을 UTC 순간으로 변환합니다.
    fn session_instant(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        self.day_instant(date, time)
    }

    fn day_instant(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        // 한국은 DST가 없으므로 로컬 시각 해석이 모호해지지 않음
        Seoul
            .from_local_datetime(&date.and_time(time))
            .single()
            .expect("KST local time is unambiguous")
            .with_timezone(&Utc)
    }
}
