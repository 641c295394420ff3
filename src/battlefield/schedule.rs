//! Battle calendar
//!
//! Weekly battles run on a fixed weekday; the monthly battle runs on the
//! last Sunday of each month. Both start at a fixed local hour in the
//! server's battle time zone.

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, TimeZone, Weekday};
use serde::{Deserialize, Serialize};

use crate::core::config::ScheduleConfig;
use crate::core::error::{Result, WarError};
use crate::core::types::{Timestamp, MS_PER_MINUTE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowKind {
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleWindow {
    pub kind: WindowKind,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl BattleWindow {
    pub fn contains(&self, at: Timestamp) -> bool {
        self.start <= at && at < self.end
    }

    pub fn duration_ms(&self) -> i64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone)]
pub struct BattleSchedule {
    config: ScheduleConfig,
    offset: FixedOffset,
}

fn is_last_sunday(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Sun
        && date
            .checked_add_days(Days::new(7))
            .map_or(true, |next| next.month() != date.month())
}

impl BattleSchedule {
    pub fn new(config: ScheduleConfig) -> Result<Self> {
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600).ok_or_else(|| {
            WarError::Config(format!("invalid utc offset {}", config.utc_offset_hours))
        })?;
        Ok(Self { config, offset })
    }

    fn local(&self, at: Timestamp) -> Option<DateTime<FixedOffset>> {
        DateTime::from_timestamp_millis(at).map(|t| t.with_timezone(&self.offset))
    }

    fn window_at(&self, date: NaiveDate, hour: u32, minutes: u32, kind: WindowKind) -> Option<BattleWindow> {
        let naive = date.and_hms_opt(hour, 0, 0)?;
        let start = self.offset.from_local_datetime(&naive).single()?.timestamp_millis();
        Some(BattleWindow {
            kind,
            start,
            end: start + minutes as i64 * MS_PER_MINUTE,
        })
    }

    /// Windows that start on the given local date
    pub fn windows_on(&self, date: NaiveDate) -> Vec<BattleWindow> {
        let c = &self.config;
        let mut windows = Vec::new();
        if date.weekday().num_days_from_monday() == c.weekly_weekday {
            windows.extend(self.window_at(date, c.weekly_start_hour, c.weekly_duration_minutes, WindowKind::Weekly));
        }
        if is_last_sunday(date) {
            windows.extend(self.window_at(date, c.monthly_start_hour, c.monthly_duration_minutes, WindowKind::Monthly));
        }
        windows
    }

    /// The window containing `at`, if any. Monthly wins over weekly when
    /// both are open.
    pub fn window_containing(&self, at: Timestamp) -> Option<BattleWindow> {
        let today = self.local(at)?.date_naive();
        let yesterday = today.checked_sub_days(Days::new(1))?;
        let mut open: Vec<BattleWindow> = [yesterday, today]
            .into_iter()
            .flat_map(|d| self.windows_on(d))
            .filter(|w| w.contains(at))
            .collect();
        open.sort_by_key(|w| w.kind == WindowKind::Weekly);
        open.into_iter().next()
    }

    pub fn is_active_window(&self, at: Timestamp) -> bool {
        self.window_containing(at).is_some()
    }

    /// Next window starting strictly after `at`
    pub fn next_window(&self, at: Timestamp) -> Option<BattleWindow> {
        let today = self.local(at)?.date_naive();
        (0..=35u64)
            .filter_map(|d| today.checked_add_days(Days::new(d)))
            .flat_map(|d| self.windows_on(d))
            .filter(|w| w.start > at)
            .min_by_key(|w| w.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .unwrap()
            .timestamp_millis()
    }

    fn schedule() -> BattleSchedule {
        BattleSchedule::new(ScheduleConfig::default()).unwrap()
    }

    #[test]
    fn test_weekly_saturday_window() {
        // 2024-06-01 is a Saturday; 20:00 at UTC+8 is 12:00 UTC
        let s = schedule();
        let w = s.window_containing(utc(2024, 6, 1, 12, 30)).unwrap();
        assert_eq!(w.kind, WindowKind::Weekly);
        assert_eq!(w.start, utc(2024, 6, 1, 12, 0));
        assert_eq!(w.duration_ms(), 60 * MS_PER_MINUTE);
        assert!(!s.is_active_window(utc(2024, 6, 1, 13, 0)));
        assert!(!s.is_active_window(utc(2024, 6, 1, 11, 59)));
        assert!(!s.is_active_window(utc(2024, 6, 2, 12, 30)));
    }

    #[test]
    fn test_monthly_last_sunday_window() {
        let s = schedule();
        let w = s.window_containing(utc(2024, 6, 30, 13, 30)).unwrap();
        assert_eq!(w.kind, WindowKind::Monthly);
        assert_eq!(w.end, utc(2024, 6, 30, 14, 0));
        // an earlier Sunday of the month has no battle
        assert!(!s.is_active_window(utc(2024, 6, 23, 12, 30)));
    }

    #[test]
    fn test_next_window() {
        let s = schedule();
        let next = s.next_window(utc(2024, 6, 2, 0, 0)).unwrap();
        assert_eq!(next.kind, WindowKind::Weekly);
        assert_eq!(next.start, utc(2024, 6, 8, 12, 0));
    }

    #[test]
    fn test_window_crossing_midnight() {
        let config = ScheduleConfig {
            utc_offset_hours: 0,
            weekly_start_hour: 23,
            weekly_duration_minutes: 120,
            ..ScheduleConfig::default()
        };
        let s = BattleSchedule::new(config).unwrap();
        assert!(s.is_active_window(utc(2024, 6, 2, 0, 30)));
    }

    #[test]
    fn test_last_sunday() {
        assert!(is_last_sunday(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()));
        assert!(!is_last_sunday(NaiveDate::from_ymd_opt(2024, 3, 24).unwrap()));
    }
}
