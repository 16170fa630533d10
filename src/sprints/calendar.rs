// SPDX-License-Identifier: MIT
//! Sprint window arithmetic.
//!
//! Sprints are fixed-length windows counted from an anchor date: window `n`
//! starts `n * duration_days` after the anchor and ends the day before
//! window `n + 1` starts. Dates before the anchor fall into windows with
//! negative indices, so the calendar works for history as well as for the
//! current sprint.

use chrono::{Days, NaiveDate};

use crate::error::MetricsError;

#[derive(Debug, Clone, Copy)]
pub struct SprintCalendar {
    anchor: NaiveDate,
    duration_days: u32,
}

/// One sprint window. `end_date` is the inclusive last day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SprintWindow {
    pub index: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_current: bool,
}

impl SprintCalendar {
    pub fn new(anchor: NaiveDate, duration_days: u32) -> Result<Self, MetricsError> {
        if duration_days == 0 {
            return Err(MetricsError::Validation(
                "sprint duration must be at least one day".to_string(),
            ));
        }
        Ok(Self { anchor, duration_days })
    }

    pub fn anchor(&self) -> NaiveDate {
        self.anchor
    }

    pub fn duration_days(&self) -> u32 {
        self.duration_days
    }

    /// Index of the window containing `date`.
    pub fn index_for(&self, date: NaiveDate) -> i64 {
        (date - self.anchor)
            .num_days()
            .div_euclid(i64::from(self.duration_days))
    }

    /// The window with the given index.
    pub fn window(&self, index: i64) -> Result<SprintWindow, MetricsError> {
        let offset = index
            .checked_mul(i64::from(self.duration_days))
            .ok_or_else(|| out_of_range(index))?;
        let start_date = add_days(self.anchor, offset).ok_or_else(|| out_of_range(index))?;
        let end_date = add_days(start_date, i64::from(self.duration_days) - 1)
            .ok_or_else(|| out_of_range(index))?;
        Ok(SprintWindow { index, start_date, end_date, is_current: false })
    }

    /// The window containing `today`, flagged current.
    pub fn current(&self, today: NaiveDate) -> Result<SprintWindow, MetricsError> {
        let mut window = self.window(self.index_for(today))?;
        window.is_current = true;
        Ok(window)
    }

    /// The `count` most recent windows as of `today`, oldest first with the
    /// current window last.
    pub fn recent(&self, today: NaiveDate, count: usize) -> Result<Vec<SprintWindow>, MetricsError> {
        let current_index = self.index_for(today);
        let mut windows = Vec::with_capacity(count);
        for back in (0..count as i64).rev() {
            let index = current_index - back;
            let mut window = self.window(index)?;
            window.is_current = index == current_index;
            windows.push(window);
        }
        Ok(windows)
    }
}

fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    if days >= 0 {
        date.checked_add_days(Days::new(days as u64))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

fn out_of_range(index: i64) -> MetricsError {
    MetricsError::Validation(format!("sprint window {index} is out of calendar range"))
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().expect("valid test date")
    }

    fn calendar() -> SprintCalendar {
        SprintCalendar::new(date("2026-01-07"), 14).expect("valid calendar")
    }

    #[test]
    fn test_window_zero_starts_at_anchor() {
        let window = calendar().window(0).unwrap();
        assert_eq!(window.start_date, date("2026-01-07"));
        assert_eq!(window.end_date, date("2026-01-20"));
    }

    #[test]
    fn test_windows_tile_without_gaps() {
        let calendar = calendar();
        let w0 = calendar.window(0).unwrap();
        let w1 = calendar.window(1).unwrap();
        assert_eq!(
            w0.end_date.succ_opt().unwrap(),
            w1.start_date,
            "window 1 must start the day after window 0 ends"
        );
    }

    #[test]
    fn test_index_for_boundaries() {
        let calendar = calendar();
        assert_eq!(calendar.index_for(date("2026-01-07")), 0);
        assert_eq!(calendar.index_for(date("2026-01-20")), 0);
        assert_eq!(calendar.index_for(date("2026-01-21")), 1);
        // The day before the anchor belongs to window -1.
        assert_eq!(calendar.index_for(date("2026-01-06")), -1);
    }

    #[test]
    fn test_negative_index_window() {
        let window = calendar().window(-1).unwrap();
        assert_eq!(window.start_date, date("2025-12-24"));
        assert_eq!(window.end_date, date("2026-01-06"));
    }

    #[test]
    fn test_recent_is_oldest_first_current_last() {
        let windows = calendar().recent(date("2026-01-15"), 2).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].index, -1);
        assert!(!windows[0].is_current);
        assert_eq!(windows[1].index, 0);
        assert!(windows[1].is_current);
        assert_eq!(windows[1].start_date, date("2026-01-07"));
    }

    #[test]
    fn test_current_flags_window() {
        let window = calendar().current(date("2026-02-10")).unwrap();
        assert!(window.is_current);
        assert_eq!(window.index, 2);
        assert_eq!(window.start_date, date("2026-02-04"));
    }

    #[test]
    fn test_single_day_sprints() {
        let calendar = SprintCalendar::new(date("2026-01-07"), 1).expect("valid calendar");
        let window = calendar.window(3).unwrap();
        assert_eq!(window.start_date, window.end_date);
        assert_eq!(window.start_date, date("2026-01-10"));
    }

    #[test]
    fn test_zero_duration_rejected() {
        let err = SprintCalendar::new(date("2026-01-07"), 0).unwrap_err();
        assert!(matches!(err, MetricsError::Validation(_)));
    }

    #[test]
    fn test_far_window_out_of_range() {
        let err = calendar().window(i64::MAX).unwrap_err();
        assert!(matches!(err, MetricsError::Validation(_)));
    }
}
