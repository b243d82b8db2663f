use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::stats::{self, BoxStats};
use super::timeseries::DailyRuns;
use crate::config::{
    SPIKE_DURATION_FACTOR, SPIKE_FAILURE_RATE_FACTOR, SPIKE_RUN_COUNT_FACTOR,
    WORSENING_MAX_POINTS, WORSENING_MIN_SPACING_DAYS, WORSENING_RATIO, WORSENING_WINDOW,
};
use crate::model::{Conclusion, Run};

// ============================================================================
// Spike detection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpikeKind {
    FailureSpike,
    DurationSpike,
    ExecutionSpike,
}

/// A day whose failure rate, average duration, or run count is far above the
/// all-days baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spike {
    pub date: NaiveDate,
    pub kind: SpikeKind,
    pub detail: String,
    pub failure_rate: f64,
    pub avg_duration: f64,
    pub run_count: usize,
}

fn day_failure_rate(day: &DailyRuns) -> f64 {
    if day.runs > 0 {
        day.failures as f64 / day.runs as f64
    } else {
        0.0
    }
}

fn delta_detail(label: &str, value: f64, baseline: f64) -> String {
    if baseline > 0.0 {
        let pct = (value / baseline - 1.0) * 100.0;
        format!("{label} {pct:.0}% above baseline")
    } else {
        format!("{label} spiked from a zero baseline")
    }
}

/// Baselines are plain means across all days. A day is anomalous when it is
/// strictly above factor x baseline on any metric; classification follows the
/// priority failure > duration > execution, first match wins.
pub fn detect_spikes(daily: &[DailyRuns]) -> Vec<Spike> {
    if daily.is_empty() {
        return Vec::new();
    }

    let failure_rates: Vec<f64> = daily.iter().map(day_failure_rate).collect();
    let durations: Vec<f64> = daily.iter().map(|d| d.avg_duration).collect();
    let counts: Vec<f64> = daily.iter().map(|d| d.runs as f64).collect();

    let baseline_failure_rate = stats::mean(&failure_rates);
    let baseline_duration = stats::mean(&durations);
    let baseline_count = stats::mean(&counts);

    daily
        .iter()
        .enumerate()
        .filter_map(|(i, day)| {
            let rate = failure_rates[i];
            let kind = if rate > SPIKE_FAILURE_RATE_FACTOR * baseline_failure_rate {
                SpikeKind::FailureSpike
            } else if day.avg_duration > SPIKE_DURATION_FACTOR * baseline_duration {
                SpikeKind::DurationSpike
            } else if (day.runs as f64) > SPIKE_RUN_COUNT_FACTOR * baseline_count {
                SpikeKind::ExecutionSpike
            } else {
                return None;
            };

            let detail = match kind {
                SpikeKind::FailureSpike => {
                    delta_detail("Failure rate", rate, baseline_failure_rate)
                }
                SpikeKind::DurationSpike => {
                    delta_detail("Average duration", day.avg_duration, baseline_duration)
                }
                SpikeKind::ExecutionSpike => {
                    delta_detail("Run count", day.runs as f64, baseline_count)
                }
            };

            Some(Spike {
                date: day.date,
                kind,
                detail,
                failure_rate: rate,
                avg_duration: day.avg_duration,
                run_count: day.runs,
            })
        })
        .collect()
}

// ============================================================================
// Worsening-trend detection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorseningMetric {
    DurationExplosion,
    FailureWorsening,
}

/// A point where the following window's metric significantly exceeds the
/// preceding window's, attributed to a candidate commit when one is present
/// on the pivot run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorseningPoint {
    pub date: NaiveDate,
    pub metric: WorseningMetric,
    pub severity: f64,
    pub preceding: f64,
    pub following: f64,
    pub commit_sha: Option<String>,
    pub html_url: Option<String>,
}

/// Slide a window over chronologically sorted runs comparing the median
/// duration of the preceding 10 runs against the following 10.
fn duration_worsening_candidates(runs: &[Run]) -> Vec<WorseningPoint> {
    let mut dated: Vec<&Run> = runs.iter().filter(|r| r.created_at.is_some()).collect();
    dated.sort_by_key(|r| r.created_at);

    let w = WORSENING_WINDOW;
    if dated.len() < 2 * w {
        return Vec::new();
    }

    let durations: Vec<f64> = dated.iter().map(|r| r.duration).collect();
    let mut candidates = Vec::new();
    for i in w..=(dated.len() - w) {
        let preceding = stats::median(&stats::sorted_ascending(&durations[i - w..i]));
        let following = stats::median(&stats::sorted_ascending(&durations[i..i + w]));
        if preceding > 0.0 && following > WORSENING_RATIO * preceding {
            let pivot = dated[i];
            let Some(date) = pivot.day() else {
                continue;
            };
            candidates.push(WorseningPoint {
                date,
                metric: WorseningMetric::DurationExplosion,
                severity: following / preceding,
                preceding,
                following,
                commit_sha: pivot.commit_sha.clone(),
                html_url: pivot.html_url.clone(),
            });
        }
    }
    candidates
}

/// Same windowing over sorted days, comparing failure counts. The pivot day
/// is attributed to its first failing run when one exists.
fn failure_worsening_candidates(daily: &[DailyRuns], runs: &[Run]) -> Vec<WorseningPoint> {
    let w = WORSENING_WINDOW;
    if daily.len() < 2 * w {
        return Vec::new();
    }

    let failures: Vec<f64> = daily.iter().map(|d| d.failures as f64).collect();
    let mut candidates = Vec::new();
    for i in w..=(daily.len() - w) {
        let preceding: f64 = failures[i - w..i].iter().sum();
        let following: f64 = failures[i..i + w].iter().sum();
        if following > 0.0 && following > WORSENING_RATIO * preceding {
            let pivot_date = daily[i].date;
            let first_failure = runs.iter().find(|r| {
                r.day() == Some(pivot_date) && r.conclusion == Some(Conclusion::Failure)
            });
            candidates.push(WorseningPoint {
                date: pivot_date,
                metric: WorseningMetric::FailureWorsening,
                severity: if preceding > 0.0 {
                    following / preceding
                } else {
                    following
                },
                preceding,
                following,
                commit_sha: first_failure.and_then(|r| r.commit_sha.clone()),
                html_url: first_failure.and_then(|r| r.html_url.clone()),
            });
        }
    }
    candidates
}

/// Greedy selection: take candidates by severity descending, skipping any
/// within 30 days of an already-selected point; if fewer than the cap
/// qualify, backfill with the next most severe regardless of spacing.
fn select_top(candidates: Vec<WorseningPoint>) -> Vec<WorseningPoint> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| candidates[b].severity.total_cmp(&candidates[a].severity));

    let mut picked: Vec<usize> = Vec::new();
    for &i in &order {
        if picked.len() >= WORSENING_MAX_POINTS {
            break;
        }
        let spaced = picked.iter().all(|&j| {
            (candidates[i].date - candidates[j].date).num_days().abs()
                >= WORSENING_MIN_SPACING_DAYS
        });
        if spaced {
            picked.push(i);
        }
    }
    for &i in &order {
        if picked.len() >= WORSENING_MAX_POINTS {
            break;
        }
        if !picked.contains(&i) {
            picked.push(i);
        }
    }

    picked.into_iter().map(|i| candidates[i].clone()).collect()
}

pub fn detect_worsening(runs: &[Run], daily: &[DailyRuns]) -> Vec<WorseningPoint> {
    let mut candidates = duration_worsening_candidates(runs);
    candidates.extend(failure_worsening_candidates(daily, runs));
    select_top(candidates)
}

// ============================================================================
// Time to fix
// ============================================================================

/// Box stats over failure-to-next-success intervals for one workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeToFix {
    pub workflow: String,
    #[serde(flatten)]
    pub stats: BoxStats,
}

/// Scan each workflow's runs chronologically; an interval opens at the first
/// failure and closes at the next success of the same workflow.
pub fn time_to_fix(runs: &[Run]) -> Vec<TimeToFix> {
    let mut by_workflow: BTreeMap<String, Vec<&Run>> = BTreeMap::new();
    for run in runs {
        if run.created_at.is_none() {
            continue;
        }
        let key = run
            .workflow_name
            .clone()
            .unwrap_or_else(|| super::groups::UNKNOWN.to_string());
        by_workflow.entry(key).or_default().push(run);
    }

    let mut rows = Vec::new();
    for (workflow, mut wf_runs) in by_workflow {
        wf_runs.sort_by_key(|r| r.created_at);

        let mut intervals: Vec<f64> = Vec::new();
        let mut open_failure: Option<chrono::DateTime<chrono::Utc>> = None;
        for run in wf_runs {
            match run.conclusion {
                Some(Conclusion::Failure) => {
                    if open_failure.is_none() {
                        open_failure = run.created_at;
                    }
                }
                Some(Conclusion::Success) => {
                    if let (Some(start), Some(end)) = (open_failure.take(), run.created_at) {
                        intervals.push((end - start).num_seconds() as f64);
                    }
                }
                _ => {}
            }
        }

        if !intervals.is_empty() {
            rows.push(TimeToFix {
                workflow,
                stats: BoxStats::from_values(&intervals),
            });
        }
    }
    rows.sort_by(|a, b| b.stats.count.cmp(&a.stats.count));
    rows
}
