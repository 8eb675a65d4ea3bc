//! Habit statistics: completion rate, streaks and mood/difficulty averages
//! computed from a habit's completion log.
//!
//! Everything here is pure. The caller fetches the log entries (sorted by
//! `completed_at` ascending) and supplies the reference "now"; its timezone
//! decides where calendar days begin for the current streak.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::models::habit_log::{HabitLog, Mood};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// One completion of a habit, as seen by the statistics engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionLogEntry {
    pub completed_at: DateTime<Utc>,
    pub mood: Option<Mood>,
    pub difficulty: Option<i16>,
}

impl From<&HabitLog> for CompletionLogEntry {
    fn from(log: &HabitLog) -> Self {
        Self {
            completed_at: log.completed_at,
            mood: log.mood,
            difficulty: log.difficulty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSummary {
    pub total_completions: i64,
    pub total_days: i64,
    /// Percentage with one decimal digit, e.g. `"33.3"`. May exceed 100.
    pub completion_rate: String,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub average_mood: Option<f64>,
    pub average_difficulty: Option<f64>,
}

/// Compute the full summary for `entries` over a window of `total_days`.
///
/// `entries` must be sorted by `completed_at` ascending and `total_days`
/// must be positive; both are checked only in debug builds.
pub fn calculate<Tz: TimeZone>(
    entries: &[CompletionLogEntry],
    total_days: i64,
    reference_now: &DateTime<Tz>,
) -> StatsSummary {
    debug_assert!(total_days > 0, "total_days must be positive");
    debug_assert!(
        entries
            .windows(2)
            .all(|w| w[0].completed_at <= w[1].completed_at),
        "completion entries must be sorted ascending"
    );

    let total_completions = entries.len() as i64;

    StatsSummary {
        total_completions,
        total_days,
        completion_rate: completion_rate(total_completions, total_days),
        current_streak: current_streak(entries, reference_now),
        longest_streak: longest_streak(entries),
        average_mood: average_mood(entries),
        average_difficulty: average_difficulty(entries),
    }
}

/// Consecutive days, ending today, on which the habit was completed.
///
/// Walks back from the newest entry; the entry `n` steps back must fall
/// exactly `n` calendar days before today or the count stops. No entry
/// today means a streak of zero.
pub fn current_streak<Tz: TimeZone>(
    entries: &[CompletionLogEntry],
    reference_now: &DateTime<Tz>,
) -> i64 {
    let tz = reference_now.timezone();
    let today = reference_now.date_naive();

    let mut streak = 0;
    for entry in entries.iter().rev() {
        let entry_day = entry.completed_at.with_timezone(&tz).date_naive();
        let days_diff = (today - entry_day).num_days();
        if days_diff != streak {
            break;
        }
        streak += 1;
    }
    streak
}

/// Longest run of entries that are each one day after the previous one.
///
/// Gaps are measured on raw timestamps, floored to whole days. Anything other
/// than exactly one day, including a second entry on the same day, restarts
/// the run.
pub fn longest_streak(entries: &[CompletionLogEntry]) -> i64 {
    if entries.is_empty() {
        return 0;
    }

    let mut max_run = 1;
    let mut current_run = 1;
    for pair in entries.windows(2) {
        let elapsed = pair[1].completed_at - pair[0].completed_at;
        let days_diff = elapsed.num_milliseconds().div_euclid(MILLIS_PER_DAY);
        if days_diff == 1 {
            current_run += 1;
            max_run = max_run.max(current_run);
        } else {
            current_run = 1;
        }
    }
    max_run
}

pub fn average_mood(entries: &[CompletionLogEntry]) -> Option<f64> {
    mean(entries.iter().filter_map(|e| e.mood.map(|m| f64::from(m.score()))))
}

pub fn average_difficulty(entries: &[CompletionLogEntry]) -> Option<f64> {
    mean(entries.iter().filter_map(|e| e.difficulty.map(f64::from)))
}

pub fn completion_rate(total_completions: i64, total_days: i64) -> String {
    let pct = total_completions as f64 / total_days as f64 * 100.0;
    format!("{:.1}", round_one_decimal(pct))
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0u32), |(sum, n), v| (sum + v, n + 1));
    if count == 0 {
        return None;
    }
    Some(round_one_decimal(sum / f64::from(count)))
}

/// Round half up to one decimal place (inputs are never negative).
fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, NaiveDate};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
            .and_utc()
    }

    fn entry(completed_at: DateTime<Utc>) -> CompletionLogEntry {
        CompletionLogEntry {
            completed_at,
            mood: None,
            difficulty: None,
        }
    }

    fn now() -> DateTime<Utc> {
        at(2024, 6, 15, 18)
    }

    fn days_ago(n: i64) -> CompletionLogEntry {
        entry(now() - Duration::days(n) - Duration::hours(8))
    }

    #[test]
    fn test_empty_log() {
        let s = calculate(&[], 30, &now());
        assert_eq!(s.total_completions, 0);
        assert_eq!(s.total_days, 30);
        assert_eq!(s.completion_rate, "0.0");
        assert_eq!(s.current_streak, 0);
        assert_eq!(s.longest_streak, 0);
        assert_eq!(s.average_mood, None);
        assert_eq!(s.average_difficulty, None);
    }

    #[test]
    fn test_single_entry_today() {
        let s = calculate(&[days_ago(0)], 30, &now());
        assert_eq!(s.current_streak, 1);
        assert_eq!(s.longest_streak, 1);
    }

    #[test]
    fn test_single_entry_five_days_ago() {
        let s = calculate(&[days_ago(5)], 30, &now());
        assert_eq!(s.current_streak, 0);
        assert_eq!(s.longest_streak, 1);
    }

    #[test]
    fn test_consecutive_days_ending_today() {
        let entries = [days_ago(2), days_ago(1), days_ago(0)];
        let s = calculate(&entries, 30, &now());
        assert_eq!(s.current_streak, 3);
        assert_eq!(s.longest_streak, 3);
    }

    #[test]
    fn test_gap_breaks_current_streak() {
        let entries = [days_ago(3), days_ago(0)];
        let s = calculate(&entries, 30, &now());
        assert_eq!(s.current_streak, 1);
        assert_eq!(s.longest_streak, 1);
    }

    #[test]
    fn test_streak_not_reaching_today_is_zero() {
        let entries = [days_ago(3), days_ago(2), days_ago(1)];
        assert_eq!(current_streak(&entries, &now()), 0);
        assert_eq!(longest_streak(&entries), 3);
    }

    #[test]
    fn test_duplicate_day_stops_current_streak() {
        let entries = [days_ago(1), days_ago(0), entry(now() - Duration::hours(2))];
        assert_eq!(current_streak(&entries, &now()), 1);
    }

    #[test]
    fn test_same_day_duplicate_resets_longest_run() {
        // Four consecutive days with a second entry on day two. The duplicate
        // restarts the run, so only days two to four count.
        let entries = [
            entry(at(2024, 6, 1, 9)),
            entry(at(2024, 6, 2, 9)),
            entry(at(2024, 6, 2, 10)),
            entry(at(2024, 6, 3, 10)),
            entry(at(2024, 6, 4, 10)),
        ];
        assert_eq!(longest_streak(&entries), 3);
    }

    #[test]
    fn test_longest_run_found_in_the_middle() {
        let entries = [
            entry(at(2024, 5, 1, 8)),
            entry(at(2024, 5, 5, 8)),
            entry(at(2024, 5, 6, 8)),
            entry(at(2024, 5, 7, 8)),
            entry(at(2024, 5, 8, 8)),
            entry(at(2024, 5, 20, 8)),
            entry(at(2024, 5, 21, 8)),
        ];
        assert_eq!(longest_streak(&entries), 4);
    }

    #[test]
    fn test_longest_streak_uses_raw_timestamp_gap() {
        // Calendar-adjacent but only two hours apart: not a one-day step.
        let entries = [entry(at(2024, 6, 1, 23)), entry(at(2024, 6, 2, 1))];
        assert_eq!(longest_streak(&entries), 1);

        // 47 hours apart floors to one day.
        let entries = [entry(at(2024, 6, 1, 8)), entry(at(2024, 6, 3, 7))];
        assert_eq!(longest_streak(&entries), 2);
    }

    #[test]
    fn test_current_streak_follows_reference_timezone() {
        // In UTC these fall on the 14th and 15th. In UTC-5 both are on the 14th.
        let entries = [entry(at(2024, 6, 14, 20)), entry(at(2024, 6, 15, 2))];
        let utc_now = at(2024, 6, 15, 3);
        assert_eq!(current_streak(&entries, &utc_now), 2);

        let new_york = FixedOffset::west_opt(5 * 3600).unwrap();
        let local_now = utc_now.with_timezone(&new_york);
        assert_eq!(current_streak(&entries, &local_now), 1);

        let local_evening = at(2024, 6, 15, 23).with_timezone(&new_york);
        assert_eq!(current_streak(&entries, &local_evening), 0);
    }

    #[test]
    fn test_current_streak_spans_dst_change() {
        // New York springs forward on 2024-03-10, so that day is 23 hours long.
        // Noon local each day: 17:00 UTC under EST, 16:00 UTC under EDT.
        let entries = [
            entry(at(2024, 3, 9, 17)),
            entry(at(2024, 3, 10, 16)),
            entry(at(2024, 3, 11, 16)),
        ];
        let local_now = at(2024, 3, 11, 20).with_timezone(&chrono_tz::America::New_York);
        assert_eq!(current_streak(&entries, &local_now), 3);
    }

    #[test]
    fn test_average_mood() {
        let entries: Vec<_> = [Mood::Good, Mood::Excellent, Mood::Okay]
            .into_iter()
            .enumerate()
            .map(|(i, mood)| CompletionLogEntry {
                mood: Some(mood),
                ..days_ago(2 - i as i64)
            })
            .collect();
        assert_eq!(average_mood(&entries), Some(4.0));
    }

    #[test]
    fn test_average_mood_skips_entries_without_mood() {
        let entries = [
            CompletionLogEntry {
                mood: Some(Mood::Struggling),
                ..days_ago(2)
            },
            days_ago(1),
            CompletionLogEntry {
                mood: Some(Mood::Difficult),
                ..days_ago(0)
            },
        ];
        assert_eq!(average_mood(&entries), Some(1.5));
        assert_eq!(average_mood(&[days_ago(0)]), None);
    }

    #[test]
    fn test_average_difficulty_only_counts_rated_entries() {
        let entries = [
            CompletionLogEntry {
                difficulty: Some(2),
                ..days_ago(3)
            },
            days_ago(2),
            CompletionLogEntry {
                difficulty: Some(5),
                ..days_ago(1)
            },
            days_ago(0),
        ];
        assert_eq!(average_difficulty(&entries), Some(3.5));
    }

    #[test]
    fn test_averages_round_half_up() {
        let entries: Vec<_> = [2, 2, 2, 3]
            .into_iter()
            .map(|d| CompletionLogEntry {
                difficulty: Some(d),
                ..days_ago(0)
            })
            .collect();
        // mean 2.25
        assert_eq!(average_difficulty(&entries), Some(2.3));

        let entries: Vec<_> = [1, 2, 2]
            .into_iter()
            .map(|d| CompletionLogEntry {
                difficulty: Some(d),
                ..days_ago(0)
            })
            .collect();
        // mean 1.666...
        assert_eq!(average_difficulty(&entries), Some(1.7));
    }

    #[test]
    fn test_completion_rate() {
        assert_eq!(completion_rate(10, 30), "33.3");
        assert_eq!(completion_rate(30, 30), "100.0");
        assert_eq!(completion_rate(45, 30), "150.0");
        assert_eq!(completion_rate(2, 3), "66.7");
        // 6.25 exactly: half rounds up
        assert_eq!(completion_rate(1, 16), "6.3");
    }

    #[test]
    fn test_summary_totals() {
        let entries: Vec<_> = (0..10).rev().map(|n| days_ago(n * 2)).collect();
        let s = calculate(&entries, 30, &now());
        assert_eq!(s.total_completions, 10);
        assert_eq!(s.completion_rate, "33.3");
        assert_eq!(s.current_streak, 1);
        assert_eq!(s.longest_streak, 1);
    }

    #[test]
    fn test_entry_from_habit_log() {
        let log = HabitLog {
            id: uuid::Uuid::new_v4(),
            habit_id: uuid::Uuid::new_v4(),
            user_id: uuid::Uuid::new_v4(),
            completed_at: now(),
            completion_count: 1,
            notes: None,
            mood: Some(Mood::Good),
            difficulty: Some(4),
            created_at: now(),
            updated_at: now(),
        };
        let e = CompletionLogEntry::from(&log);
        assert_eq!(e.completed_at, now());
        assert_eq!(e.mood, Some(Mood::Good));
        assert_eq!(e.difficulty, Some(4));
    }

    #[test]
    fn test_summary_serializes_null_averages() {
        let json = serde_json::to_value(calculate(&[], 7, &now())).unwrap();
        assert!(json["average_mood"].is_null());
        assert!(json["average_difficulty"].is_null());
        assert_eq!(json["completion_rate"], "0.0");
    }
}
