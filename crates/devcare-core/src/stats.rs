//! Session statistics and the weekly productivity rating.
//!
//! The SQL aggregation lives on [`Database`](crate::Database); this module
//! holds the row types and the rating arithmetic, which is pure so it can be
//! tested without a database.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Work sessions per week that earn a full session score.
const TARGET_WEEKLY_SESSIONS: f64 = 20.0;
/// Work session length (minutes) that earns a full average-time score.
const TARGET_WORK_MINUTES: f64 = 25.0;
/// Desired work-to-break ratio.
const TARGET_BREAK_RATIO: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTotals {
    pub date: NaiveDate,
    pub work_min: u64,
    pub break_min: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AverageDurations {
    pub work_min: Option<f64>,
    pub break_min: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCounts {
    pub date: NaiveDate,
    pub work_sessions: u64,
    pub break_sessions: u64,
}

/// One day of the trailing week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekDay {
    pub date: NaiveDate,
    pub work_min: u64,
    pub break_min: u64,
    pub work_sessions: u64,
    pub break_sessions: u64,
}

/// Component scores, each in `0.0..=10.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingBreakdown {
    pub work_time_percentage: f64,
    pub work_sessions_score: f64,
    pub average_work_time_score: f64,
    pub break_ratio_score: f64,
    pub consistency_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklyRating {
    /// Mean of the four component scores.
    pub rating: f64,
    pub breakdown: RatingBreakdown,
    pub suggestions: Vec<String>,
}

impl WeeklyRating {
    /// Multi-line summary of the breakdown.
    pub fn explanation(&self) -> String {
        let b = &self.breakdown;
        format!(
            "Work Time Percentage: {:.2}%\n\
             Work Sessions Score: {:.2}\n\
             Average Work Time Score: {:.2}\n\
             Break Ratio Score: {:.2}\n\
             Consistency Score: {:.2}",
            b.work_time_percentage,
            b.work_sessions_score,
            b.average_work_time_score,
            b.break_ratio_score,
            b.consistency_score,
        )
    }
}

/// Population standard deviation of work sessions per day.
pub fn work_consistency(days: &[WeekDay]) -> f64 {
    if days.is_empty() {
        return 0.0;
    }
    let n = days.len() as f64;
    let mean = days.iter().map(|d| d.work_sessions as f64).sum::<f64>() / n;
    let variance = days
        .iter()
        .map(|d| (d.work_sessions as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    variance.sqrt()
}

/// Rate a week of sessions.
///
/// Zero denominators score 0 for that component instead of producing NaN;
/// a week without breaks gets a break-ratio score of 0.
pub fn rate_week(days: &[WeekDay]) -> WeeklyRating {
    let total_work = days.iter().map(|d| d.work_min).sum::<u64>() as f64;
    let total_break = days.iter().map(|d| d.break_min).sum::<u64>() as f64;
    let work_sessions = days.iter().map(|d| d.work_sessions).sum::<u64>() as f64;

    let average_work = if work_sessions > 0.0 {
        total_work / work_sessions
    } else {
        0.0
    };
    let break_ratio = if total_break > 0.0 {
        total_work / total_break
    } else {
        0.0
    };
    let consistency = work_consistency(days);
    let work_time_percentage = if total_work + total_break > 0.0 {
        total_work / (total_work + total_break) * 100.0
    } else {
        0.0
    };

    let work_sessions_score = (work_sessions / TARGET_WEEKLY_SESSIONS * 10.0).min(10.0);
    let average_work_time_score = (average_work / TARGET_WORK_MINUTES * 10.0).min(10.0);
    let break_ratio_score = if break_ratio > 0.0 {
        (TARGET_BREAK_RATIO / break_ratio * 10.0).min(10.0)
    } else {
        0.0
    };
    let consistency_score = (10.0 - consistency).max(0.0);

    let rating =
        (work_sessions_score + average_work_time_score + break_ratio_score + consistency_score)
            / 4.0;

    let mut suggestions = Vec::new();
    if work_time_percentage < 70.0 {
        suggestions.push(
            "Try to increase your work time percentage by reducing unnecessary breaks.".to_string(),
        );
    }
    if work_sessions < TARGET_WEEKLY_SESSIONS {
        suggestions.push("Aim to complete more work sessions to maintain consistency.".to_string());
    }
    if !(20.0..=25.0).contains(&average_work) {
        suggestions.push(
            "Adjust your session durations to be within the 20-25 minute range for optimal productivity."
                .to_string(),
        );
    }
    if break_ratio < TARGET_BREAK_RATIO {
        suggestions.push("Ensure you are taking adequate breaks to avoid burnout.".to_string());
    }
    if consistency > 2.0 {
        suggestions.push(
            "Work on maintaining a consistent number of sessions each day to build a routine."
                .to_string(),
        );
    }

    WeeklyRating {
        rating,
        breakdown: RatingBreakdown {
            work_time_percentage,
            work_sessions_score,
            average_work_time_score,
            break_ratio_score,
            consistency_score,
        },
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32, work_sessions: u64, work_min: u64, break_min: u64) -> WeekDay {
        WeekDay {
            date: NaiveDate::from_ymd_opt(2024, 6, d).unwrap(),
            work_min,
            break_min,
            work_sessions,
            break_sessions: work_sessions,
        }
    }

    #[test]
    fn empty_week_scores_consistency_only() {
        let r = rate_week(&[]);
        assert_eq!(r.breakdown.work_sessions_score, 0.0);
        assert_eq!(r.breakdown.break_ratio_score, 0.0);
        assert_eq!(r.breakdown.consistency_score, 10.0);
        assert_eq!(r.rating, 2.5);
        assert!(!r.rating.is_nan());
    }

    #[test]
    fn ideal_week_scores_full_marks() {
        // 4 sessions a day for 5 days, 25 min each, breaks at a 4:1 ratio.
        let days: Vec<_> = (3..8).map(|d| day(d, 4, 100, 25)).collect();
        let r = rate_week(&days);
        assert_eq!(r.breakdown.work_sessions_score, 10.0);
        assert_eq!(r.breakdown.average_work_time_score, 10.0);
        assert_eq!(r.breakdown.break_ratio_score, 10.0);
        assert_eq!(r.breakdown.consistency_score, 10.0);
        assert_eq!(r.rating, 10.0);
        assert!(r.suggestions.is_empty());
        assert!((r.breakdown.work_time_percentage - 80.0).abs() < 1e-9);
    }

    #[test]
    fn uneven_week_gets_consistency_suggestion() {
        let days = vec![day(3, 10, 250, 60), day(4, 0, 0, 0), day(5, 0, 0, 0)];
        let r = rate_week(&days);
        assert!(work_consistency(&days) > 2.0);
        assert!(r
            .suggestions
            .iter()
            .any(|s| s.contains("consistent number of sessions")));
    }

    #[test]
    fn explanation_lists_every_component() {
        let r = rate_week(&[day(3, 4, 100, 25)]);
        let text = r.explanation();
        assert!(text.starts_with("Work Time Percentage: 80.00%"));
        assert_eq!(text.lines().count(), 5);
    }
}
