use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::stats;
use crate::model::{Conclusion, Run};

/// One calendar day of the runs-over-time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRuns {
    pub date: NaiveDate,
    pub runs: usize,
    pub successes: usize,
    pub failures: usize,
    pub cancelled: usize,
    pub avg_duration: f64,
    pub median_duration: f64,
    pub min_duration: f64,
    pub max_duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyFailureRate {
    pub date: NaiveDate,
    pub total: usize,
    pub failures: usize,
    pub failure_rate: f64,
}

/// Group runs by UTC calendar day. Runs without a parseable `created_at`
/// cannot be placed on the time axis and are omitted from daily views.
pub fn runs_over_time(runs: &[Run]) -> Vec<DailyRuns> {
    let mut by_day: BTreeMap<NaiveDate, Vec<&Run>> = BTreeMap::new();
    for run in runs {
        if let Some(day) = run.day() {
            by_day.entry(day).or_default().push(run);
        }
    }

    by_day
        .into_iter()
        .map(|(date, day_runs)| {
            let durations: Vec<f64> =
                day_runs.iter().filter_map(|r| r.valid_duration()).collect();
            let sorted = stats::sorted_ascending(&durations);
            DailyRuns {
                date,
                runs: day_runs.len(),
                successes: count_conclusion(&day_runs, Conclusion::Success),
                failures: count_conclusion(&day_runs, Conclusion::Failure),
                cancelled: count_conclusion(&day_runs, Conclusion::Cancelled),
                avg_duration: stats::mean(&sorted),
                median_duration: stats::median(&sorted),
                min_duration: sorted.first().copied().unwrap_or(0.0),
                max_duration: sorted.last().copied().unwrap_or(0.0),
            }
        })
        .collect()
}

pub fn failure_rate_over_time(daily: &[DailyRuns]) -> Vec<DailyFailureRate> {
    daily
        .iter()
        .map(|day| DailyFailureRate {
            date: day.date,
            total: day.runs,
            failures: day.failures,
            failure_rate: if day.runs > 0 {
                day.failures as f64 / day.runs as f64
            } else {
                0.0
            },
        })
        .collect()
}

fn count_conclusion(runs: &[&Run], conclusion: Conclusion) -> usize {
    runs.iter()
        .filter(|r| r.conclusion == Some(conclusion))
        .count()
}
