pub mod anomaly;
pub mod groups;
pub mod stats;
pub mod timeseries;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::filter::{self, FilterSpec, ALL};
use crate::model::{Conclusion, Run};

pub use anomaly::{Spike, SpikeKind, TimeToFix, WorseningMetric, WorseningPoint};
pub use groups::{FailedWorkflow, GroupStats, WorkflowDurationBox};
pub use stats::BoxStats;
pub use timeseries::{DailyFailureRate, DailyRuns};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCount {
    pub name: String,
    pub value: usize,
}

/// The full bundle of derived statistics for one filtered run set.
///
/// Always rebuilt from scratch from the current snapshot; nothing in here is
/// incrementally mutated, so a partial stream, a reconnect, or a filter
/// change all go through the same recompute path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedView {
    pub repo: String,
    pub total_runs: usize,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub avg_duration: f64,
    pub median_duration: f64,
    pub mad_duration: f64,
    pub runs_over_time: Vec<DailyRuns>,
    pub status_breakdown: Vec<StatusCount>,
    pub workflow_stats: Vec<GroupStats>,
    pub job_stats: Vec<GroupStats>,
    pub branch_stats: Vec<GroupStats>,
    pub event_stats: Vec<GroupStats>,
    pub contributor_stats: Vec<GroupStats>,
    pub duration_box: Vec<WorkflowDurationBox>,
    pub failure_rate_over_time: Vec<DailyFailureRate>,
    pub top_failed_workflows: Vec<FailedWorkflow>,
    pub spikes: Vec<Spike>,
    pub worsening_points: Vec<WorseningPoint>,
    pub time_to_fix: Vec<TimeToFix>,
    /// Distinct values from the unfiltered snapshot, for the UI dropdowns.
    pub workflows: Vec<String>,
    pub branches: Vec<String>,
    pub actors: Vec<String>,
}

impl AggregatedView {
    pub fn empty(repo: &str) -> Self {
        aggregate(repo, &[])
    }
}

fn count_status(runs: &[Run], conclusion: Conclusion) -> usize {
    runs.iter()
        .filter(|r| r.conclusion == Some(conclusion))
        .count()
}

/// Pure, total aggregation over an already-filtered run set. Zero runs yield
/// zeroed scalars and empty collections, never an error.
pub fn aggregate(repo: &str, runs: &[Run]) -> AggregatedView {
    let total_runs = runs.len();
    let successes = count_status(runs, Conclusion::Success);
    let failures = count_status(runs, Conclusion::Failure);

    let durations: Vec<f64> = runs.iter().filter_map(|r| r.valid_duration()).collect();
    let sorted_durations = stats::sorted_ascending(&durations);

    let status_breakdown = vec![
        StatusCount {
            name: Conclusion::Success.to_string(),
            value: successes,
        },
        StatusCount {
            name: Conclusion::Failure.to_string(),
            value: failures,
        },
        StatusCount {
            name: Conclusion::Cancelled.to_string(),
            value: count_status(runs, Conclusion::Cancelled),
        },
        StatusCount {
            name: Conclusion::Skipped.to_string(),
            value: count_status(runs, Conclusion::Skipped),
        },
        StatusCount {
            name: Conclusion::TimedOut.to_string(),
            value: count_status(runs, Conclusion::TimedOut),
        },
    ];

    let runs_over_time = timeseries::runs_over_time(runs);
    let failure_rate_over_time = timeseries::failure_rate_over_time(&runs_over_time);
    let workflow_stats = groups::workflow_stats(runs);
    let spikes = anomaly::detect_spikes(&runs_over_time);
    let worsening_points = anomaly::detect_worsening(runs, &runs_over_time);
    let time_to_fix = anomaly::time_to_fix(runs);
    let top_failed_workflows = groups::top_failed_workflows(&workflow_stats);
    let duration_box = groups::duration_box(runs, &workflow_stats);

    AggregatedView {
        repo: repo.to_string(),
        total_runs,
        success_rate: rate(successes, total_runs),
        failure_rate: rate(failures, total_runs),
        avg_duration: stats::mean(&sorted_durations),
        median_duration: stats::median(&sorted_durations),
        mad_duration: stats::mad(&sorted_durations),
        runs_over_time,
        status_breakdown,
        job_stats: groups::job_stats(runs),
        branch_stats: groups::branch_stats(runs),
        event_stats: groups::event_stats(runs),
        contributor_stats: groups::contributor_stats(runs),
        duration_box,
        failure_rate_over_time,
        top_failed_workflows,
        spikes,
        worsening_points,
        time_to_fix,
        workflow_stats,
        workflows: vec![ALL.to_string()],
        branches: vec![ALL.to_string()],
        actors: vec![ALL.to_string()],
    }
}

fn rate(part: usize, total: usize) -> f64 {
    if total > 0 {
        part as f64 / total as f64
    } else {
        0.0
    }
}

fn distinct<F>(all_runs: &[Run], field: F) -> Vec<String>
where
    F: Fn(&Run) -> Option<String>,
{
    let values: BTreeSet<String> = all_runs.iter().filter_map(field).collect();
    std::iter::once(ALL.to_string()).chain(values).collect()
}

/// Filter the snapshot, aggregate it, and fill the dropdown lists from the
/// unfiltered snapshot so selections never erase their own options.
pub fn build_view(repo: &str, all_runs: &[Run], spec: &FilterSpec) -> AggregatedView {
    let filtered = filter::filter_runs(all_runs, spec);
    let mut view = aggregate(repo, &filtered);
    view.workflows = distinct(all_runs, |r| r.workflow_name.clone());
    view.branches = distinct(all_runs, |r| r.branch.clone());
    view.actors = distinct(all_runs, |r| r.actor.clone());
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(id: i64, date: &str, conclusion: &str, duration: f64) -> Run {
        Run::from_value(&json!({
            "id": id,
            "workflow_name": "CI",
            "branch": "main",
            "actor": "alice",
            "created_at": format!("{date}T09:00:00Z"),
            "conclusion": conclusion,
            "duration": duration,
        }))
        .unwrap()
    }

    #[test]
    fn test_aggregate_empty_is_total() {
        let view = aggregate("o/r", &[]);
        assert_eq!(view.total_runs, 0);
        assert_eq!(view.success_rate, 0.0);
        assert_eq!(view.failure_rate, 0.0);
        assert_eq!(view.avg_duration, 0.0);
        assert_eq!(view.median_duration, 0.0);
        assert!(view.runs_over_time.is_empty());
        assert!(view.workflow_stats.is_empty());
        assert!(view.job_stats.is_empty());
        assert!(view.spikes.is_empty());
        assert!(view.worsening_points.is_empty());
        assert!(view.time_to_fix.is_empty());
        assert_eq!(view.status_breakdown.iter().map(|s| s.value).sum::<usize>(), 0);
    }

    #[test]
    fn test_two_day_scenario() {
        // Day 1: 4 success / 1 failure; day 2: 5 success
        let runs = vec![
            run(1, "2025-03-01", "success", 100.0),
            run(2, "2025-03-01", "success", 120.0),
            run(3, "2025-03-01", "success", 110.0),
            run(4, "2025-03-01", "success", 130.0),
            run(5, "2025-03-01", "failure", 115.0),
            run(6, "2025-03-02", "success", 90.0),
            run(7, "2025-03-02", "success", 95.0),
            run(8, "2025-03-02", "success", 100.0),
            run(9, "2025-03-02", "success", 105.0),
            run(10, "2025-03-02", "success", 110.0),
        ];
        let view = aggregate("o/r", &runs);

        assert_eq!(view.total_runs, 10);
        assert_eq!(view.success_rate, 0.9);
        assert_eq!(view.failure_rate, 0.1);
        assert_eq!(view.runs_over_time.len(), 2);
        assert_eq!(view.runs_over_time[0].failures, 1);
        assert_eq!(view.runs_over_time[1].failures, 0);
        assert_eq!(view.status_breakdown[0].name, "success");
        assert_eq!(view.status_breakdown[0].value, 9);
        assert_eq!(view.status_breakdown[1].name, "failure");
        assert_eq!(view.status_breakdown[1].value, 1);
        assert_eq!(view.status_breakdown[2].name, "cancelled");
        assert_eq!(view.status_breakdown[2].value, 0);
    }

    #[test]
    fn test_median_is_index_based() {
        let runs = vec![
            run(1, "2025-03-01", "success", 100.0),
            run(2, "2025-03-01", "success", 200.0),
            run(3, "2025-03-01", "success", 300.0),
            run(4, "2025-03-01", "success", 400.0),
        ];
        let view = aggregate("o/r", &runs);
        assert_eq!(view.median_duration, 300.0);
        assert_eq!(view.avg_duration, 250.0);
    }

    #[test]
    fn test_build_view_fills_dropdowns_from_unfiltered() {
        let mut a = run(1, "2025-03-01", "success", 10.0);
        a.workflow_name = Some("Deploy".to_string());
        let runs = vec![a, run(2, "2025-03-01", "success", 10.0)];

        let spec = FilterSpec {
            workflow: vec!["CI".to_string()],
            ..Default::default()
        };
        let view = build_view("o/r", &runs, &spec);
        assert_eq!(view.total_runs, 1);
        assert_eq!(view.workflows, vec!["all", "CI", "Deploy"]);
        assert_eq!(view.branches, vec!["all", "main"]);
        assert_eq!(view.actors, vec!["all", "alice"]);
    }

    #[test]
    fn test_malformed_runs_never_panic() {
        let bare = Run::from_value(&json!({"id": 1})).unwrap();
        let view = aggregate("o/r", &[bare]);
        assert_eq!(view.total_runs, 1);
        assert_eq!(view.success_rate, 0.0);
        assert!(view.runs_over_time.is_empty());
        // A run without a conclusion lands in no status bucket
        assert_eq!(view.status_breakdown.iter().map(|s| s.value).sum::<usize>(), 0);
        // ...but still shows up grouped under "unknown"
        assert_eq!(view.workflow_stats[0].name, "unknown");
    }
}
