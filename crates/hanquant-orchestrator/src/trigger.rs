//! 작업 트리거.
//!
//! 두 가지 형태를 지원합니다:
//! - `Cron`: KST 벽시계 기준 매일 hh:mm (평일 한정 선택)
//! - `Interval`: KST 자정 기준으로 정렬된 고정 주기. 세션 윈도우와
//!   캘린더 게이트를 선택적으로 적용합니다.
//!
//! 모든 트리거 평가는 Asia/Seoul 벽시계에서 수행됩니다.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Asia::Seoul;
use hanquant_core::KrxCalendar;

/// 세션 윈도우 (KST, 평일 한정).
#[derive(Debug, Clone, Copy)]
pub struct SessionWindow {
    /// 윈도우 시작 (포함)
    pub start: NaiveTime,
    /// 윈도우 종료 (포함)
    pub end: NaiveTime,
}

impl SessionWindow {
    /// KRX 정규장 윈도우 (09:00-15:30).
    pub fn krx_session() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
            end: NaiveTime::from_hms_opt(15, 30, 0).expect("valid time"),
        }
    }
}

/// 작업 트리거.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// 매일 hh:mm (KST).
    Cron {
        /// 분
        minute: u32,
        /// 시
        hour: u32,
        /// 평일(월-금)에만 발사
        weekdays_only: bool,
    },
    /// 고정 주기. KST 자정 기준으로 정렬됩니다 (15분 주기는 :00, :15,
    /// :30, :45에 발사).
    Interval {
        /// 주기
        every: Duration,
        /// 발사를 허용하는 세션 윈도우 (None이면 종일)
        window: Option<SessionWindow>,
        /// 거래일에만 발사
        calendar_gated: bool,
    },
}

impl Trigger {
    /// 평일 cron 트리거를 생성합니다.
    pub fn weekday_cron(minute: u32, hour: u32) -> Self {
        Trigger::Cron {
            minute,
            hour,
            weekdays_only: true,
        }
    }

    /// 게이트 없는 주기 트리거를 생성합니다.
    pub fn interval(every: Duration) -> Self {
        Trigger::Interval {
            every,
            window: None,
            calendar_gated: false,
        }
    }

    /// 장중 전용 주기 트리거를 생성합니다 (세션 윈도우 + 캘린더 게이트).
    pub fn session_interval(every: Duration) -> Self {
        Trigger::Interval {
            every,
            window: Some(SessionWindow::krx_session()),
            calendar_gated: true,
        }
    }

    /// `after` 이후(초과)의 다음 발사 시각을 반환합니다.
    pub fn next_fire(&self, after: DateTime<Utc>, calendar: &KrxCalendar) -> DateTime<Utc> {
        match self {
            Trigger::Cron {
                minute,
                hour,
                weekdays_only,
            } => next_cron_fire(after, *minute, *hour, *weekdays_only),
            Trigger::Interval {
                every,
                window,
                calendar_gated,
            } => next_interval_fire(after, *every, *window, *calendar_gated, calendar),
        }
    }
}

fn is_weekday(weekday: Weekday) -> bool {
    !matches!(weekday, Weekday::Sat | Weekday::Sun)
}

fn next_cron_fire(
    after: DateTime<Utc>,
    minute: u32,
    hour: u32,
    weekdays_only: bool,
) -> DateTime<Utc> {
    let kst = after.with_timezone(&Seoul);
    let fire_time = NaiveTime::from_hms_opt(hour, minute, 0).expect("valid cron time");
    let mut date = kst.date_naive();

    // 당일 발사 시각이 이미 지났으면 다음 날부터 탐색
    if kst.time() >= fire_time {
        date += Duration::days(1);
    }
    for _ in 0..370 {
        if !weekdays_only || is_weekday(date.weekday()) {
            return Seoul
                .from_local_datetime(&date.and_time(fire_time))
                .single()
                .expect("KST local time is unambiguous")
                .with_timezone(&Utc);
        }
        date += Duration::days(1);
    }
    unreachable!("no weekday within a year of {}", after)
}

fn next_interval_fire(
    after: DateTime<Utc>,
    every: Duration,
    window: Option<SessionWindow>,
    calendar_gated: bool,
    calendar: &KrxCalendar,
) -> DateTime<Utc> {
    assert!(every > Duration::zero(), "interval must be positive");

    let kst = after.with_timezone(&Seoul);
    let mut date = kst.date_naive();

    for _ in 0..370 {
        let day_ok = (window.is_none() || is_weekday(date.weekday()))
            && (!calendar_gated || calendar.is_trading_day(date));

        if day_ok {
            let day_start = Seoul
                .from_local_datetime(&date.and_time(NaiveTime::MIN))
                .single()
                .expect("KST local time is unambiguous")
                .with_timezone(&Utc);

            // 자정 기준 정렬: day_start + k * every
            let elapsed = after - day_start;
            let mut k = if elapsed < Duration::zero() {
                0
            } else {
                elapsed.num_seconds() / every.num_seconds() + 1
            };

            loop {
                let candidate = day_start + every * (k as i32);
                let candidate_kst = candidate.with_timezone(&Seoul);
                if candidate_kst.date_naive() != date {
                    break; // 다음 날로 넘어감
                }
                let in_window = window
                    .map(|w| {
                        let t = candidate_kst.time();
                        t >= w.start && t <= w.end
                    })
                    .unwrap_or(true);
                if candidate > after && in_window {
                    return candidate;
                }
                if let Some(w) = window {
                    if candidate_kst.time() > w.end {
                        break;
                    }
                }
                k += 1;
            }
        }
        date += Duration::days(1);
    }
    unreachable!("no eligible interval slot within a year of {}", after)
}
