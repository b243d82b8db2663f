use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::stats::{self, BoxStats};
use crate::config::TOP_GROUP_LIMIT;
use crate::model::{Conclusion, Run};

pub const UNKNOWN: &str = "unknown";

/// Per-dimension breakdown row (workflow, job, branch, event, contributor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupStats {
    pub name: String,
    pub runs: usize,
    pub successes: usize,
    pub failures: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub timed_out: usize,
    pub success_rate: f64,
    pub median_duration: f64,
    pub avg_duration: f64,
    pub total_duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedWorkflow {
    pub name: String,
    pub failures: usize,
}

/// Box-plot row for the per-workflow duration chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDurationBox {
    pub name: String,
    #[serde(flatten)]
    pub stats: BoxStats,
}

#[derive(Default)]
struct Accumulator {
    runs: usize,
    successes: usize,
    failures: usize,
    cancelled: usize,
    skipped: usize,
    timed_out: usize,
    durations: Vec<f64>,
}

impl Accumulator {
    fn push(&mut self, conclusion: Option<Conclusion>, duration: f64) {
        self.runs += 1;
        match conclusion {
            Some(Conclusion::Success) => self.successes += 1,
            Some(Conclusion::Failure) => self.failures += 1,
            Some(Conclusion::Cancelled) => self.cancelled += 1,
            Some(Conclusion::Skipped) => self.skipped += 1,
            Some(Conclusion::TimedOut) => self.timed_out += 1,
            _ => {}
        }
        if duration > 0.0 && duration.is_finite() {
            self.durations.push(duration);
        }
    }

    fn finish(self, name: String) -> GroupStats {
        let sorted = stats::sorted_ascending(&self.durations);
        GroupStats {
            name,
            runs: self.runs,
            successes: self.successes,
            failures: self.failures,
            cancelled: self.cancelled,
            skipped: self.skipped,
            timed_out: self.timed_out,
            success_rate: if self.runs > 0 {
                self.successes as f64 / self.runs as f64
            } else {
                0.0
            },
            median_duration: stats::median(&sorted),
            avg_duration: stats::mean(&sorted),
            total_duration: sorted.iter().sum(),
        }
    }
}

fn grouped<F>(runs: &[Run], key: F) -> Vec<GroupStats>
where
    F: Fn(&Run) -> String,
{
    let mut groups: BTreeMap<String, Accumulator> = BTreeMap::new();
    for run in runs {
        groups
            .entry(key(run))
            .or_default()
            .push(run.conclusion, run.duration);
    }
    let mut rows: Vec<GroupStats> = groups
        .into_iter()
        .map(|(name, acc)| acc.finish(name))
        .collect();
    // BTreeMap iteration gives name order; the descending count sort on top
    // of it keeps ties deterministic
    rows.sort_by(|a, b| b.runs.cmp(&a.runs));
    rows
}

pub fn workflow_stats(runs: &[Run]) -> Vec<GroupStats> {
    grouped(runs, |r| {
        r.workflow_name.clone().unwrap_or_else(|| UNKNOWN.to_string())
    })
}

pub fn branch_stats(runs: &[Run]) -> Vec<GroupStats> {
    grouped(runs, |r| {
        r.branch.clone().unwrap_or_else(|| UNKNOWN.to_string())
    })
}

pub fn event_stats(runs: &[Run]) -> Vec<GroupStats> {
    grouped(runs, |r| {
        r.event.clone().unwrap_or_else(|| UNKNOWN.to_string())
    })
}

pub fn contributor_stats(runs: &[Run]) -> Vec<GroupStats> {
    grouped(runs, |r| {
        r.actor.clone().unwrap_or_else(|| UNKNOWN.to_string())
    })
}

/// Jobs arrive attached to runs in the second streaming phase; group them by
/// job name across all runs.
pub fn job_stats(runs: &[Run]) -> Vec<GroupStats> {
    let mut groups: BTreeMap<String, Accumulator> = BTreeMap::new();
    for run in runs {
        for job in &run.jobs {
            groups
                .entry(job.name.clone())
                .or_default()
                .push(job.conclusion, job.duration);
        }
    }
    let mut rows: Vec<GroupStats> = groups
        .into_iter()
        .map(|(name, acc)| acc.finish(name))
        .collect();
    rows.sort_by(|a, b| b.runs.cmp(&a.runs));
    rows
}

/// Top workflows by failure count, capped for the chart view.
pub fn top_failed_workflows(workflow_rows: &[GroupStats]) -> Vec<FailedWorkflow> {
    let mut failed: Vec<FailedWorkflow> = workflow_rows
        .iter()
        .filter(|w| w.failures > 0)
        .map(|w| FailedWorkflow {
            name: w.name.clone(),
            failures: w.failures,
        })
        .collect();
    failed.sort_by(|a, b| b.failures.cmp(&a.failures));
    failed.truncate(TOP_GROUP_LIMIT);
    failed
}

/// Per-workflow duration box plots for the busiest workflows, capped for the
/// chart view; the full table keeps the uncapped `workflow_stats` rows.
pub fn duration_box(runs: &[Run], workflow_rows: &[GroupStats]) -> Vec<WorkflowDurationBox> {
    workflow_rows
        .iter()
        .take(TOP_GROUP_LIMIT)
        .map(|row| {
            let durations: Vec<f64> = runs
                .iter()
                .filter(|r| r.workflow_name.as_deref().unwrap_or(UNKNOWN) == row.name)
                .filter_map(|r| r.valid_duration())
                .collect();
            WorkflowDurationBox {
                name: row.name.clone(),
                stats: BoxStats::from_values(&durations),
            }
        })
        .collect()
}
