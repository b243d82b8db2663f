use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::Run;

pub const ALL: &str = "all";

/// Filter predicates applied locally over a run snapshot.
///
/// A field selection of `["all"]` passes every run; concrete selections keep
/// runs whose normalized value is in the selection (exact match). Date bounds
/// are inclusive against the run's UTC calendar day. Active filters AND
/// together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default = "all_selection")]
    pub workflow: Vec<String>,
    #[serde(default = "all_selection")]
    pub branch: Vec<String>,
    #[serde(default = "all_selection")]
    pub actor: Vec<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

fn all_selection() -> Vec<String> {
    vec![ALL.to_string()]
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            workflow: all_selection(),
            branch: all_selection(),
            actor: all_selection(),
            start_date: None,
            end_date: None,
        }
    }
}

impl FilterSpec {
    /// An empty selection is never valid; it collapses back to `["all"]`.
    pub fn normalized(mut self) -> Self {
        for sel in [&mut self.workflow, &mut self.branch, &mut self.actor] {
            if sel.is_empty() {
                *sel = all_selection();
            }
        }
        self
    }

    pub fn matches(&self, run: &Run) -> bool {
        selection_matches(&self.workflow, run.workflow_name.as_deref())
            && selection_matches(&self.branch, run.branch.as_deref())
            && selection_matches(&self.actor, run.actor.as_deref())
            && self.date_matches(run)
    }

    fn date_matches(&self, run: &Run) -> bool {
        if self.start_date.is_none() && self.end_date.is_none() {
            return true;
        }
        let Some(day) = run.day() else {
            // A dated filter references created_at; runs without one drop out
            return false;
        };
        if let Some(start) = self.start_date {
            if day < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if day > end {
                return false;
            }
        }
        true
    }
}

fn selection_matches(selection: &[String], value: Option<&str>) -> bool {
    if selection.iter().any(|s| s == ALL) {
        return true;
    }
    match value {
        Some(v) => selection.iter().any(|s| s == v),
        None => false,
    }
}

pub fn filter_runs(runs: &[Run], spec: &FilterSpec) -> Vec<Run> {
    runs.iter().filter(|r| spec.matches(r)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(id: i64, workflow: &str, branch: &str, actor: &str, date: &str) -> Run {
        Run::from_value(&json!({
            "id": id,
            "workflow_name": workflow,
            "branch": branch,
            "actor": actor,
            "created_at": format!("{date}T10:00:00Z"),
        }))
        .unwrap()
    }

    fn sample() -> Vec<Run> {
        vec![
            run(1, "CI", "main", "alice", "2025-03-01"),
            run(2, "CI", "dev", "bob", "2025-03-02"),
            run(3, "Deploy", "main", "alice", "2025-03-03"),
        ]
    }

    #[test]
    fn test_all_selection_passes_everything() {
        let out = filter_runs(&sample(), &FilterSpec::default());
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_workflow_selection() {
        let spec = FilterSpec {
            workflow: vec!["CI".to_string()],
            ..Default::default()
        };
        let out = filter_runs(&sample(), &spec);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.workflow_name.as_deref() == Some("CI")));
    }

    #[test]
    fn test_filters_and_together() {
        let spec = FilterSpec {
            workflow: vec!["CI".to_string()],
            branch: vec!["main".to_string()],
            ..Default::default()
        };
        let out = filter_runs(&sample(), &spec);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 1);
    }

    #[test]
    fn test_multi_value_selection() {
        let spec = FilterSpec {
            actor: vec!["alice".to_string(), "bob".to_string()],
            ..Default::default()
        };
        assert_eq!(filter_runs(&sample(), &spec).len(), 3);
    }

    #[test]
    fn test_date_range_inclusive() {
        let spec = FilterSpec {
            start_date: NaiveDate::from_ymd_opt(2025, 3, 2),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 3),
            ..Default::default()
        };
        let ids: Vec<i64> = filter_runs(&sample(), &spec).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_open_ended_date_bounds() {
        let spec = FilterSpec {
            end_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            ..Default::default()
        };
        let ids: Vec<i64> = filter_runs(&sample(), &spec).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_missing_field_excluded_from_concrete_selection() {
        let bare = Run::from_value(&json!({"id": 10})).unwrap();
        let spec = FilterSpec {
            branch: vec!["main".to_string()],
            ..Default::default()
        };
        assert!(filter_runs(&[bare.clone()], &spec).is_empty());
        // ...but passes through an "all" selection
        assert_eq!(filter_runs(&[bare], &FilterSpec::default()).len(), 1);
    }

    #[test]
    fn test_missing_created_at_excluded_by_date_filter() {
        let bare = Run::from_value(&json!({"id": 10})).unwrap();
        let spec = FilterSpec {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            ..Default::default()
        };
        assert!(filter_runs(&[bare], &spec).is_empty());
    }

    #[test]
    fn test_empty_selection_collapses_to_all() {
        let spec = FilterSpec {
            workflow: vec![],
            ..Default::default()
        }
        .normalized();
        assert_eq!(spec.workflow, vec![ALL.to_string()]);
        assert_eq!(filter_runs(&sample(), &spec).len(), 3);
    }

    #[test]
    fn test_case_sensitive_match() {
        let spec = FilterSpec {
            workflow: vec!["ci".to_string()],
            ..Default::default()
        };
        assert!(filter_runs(&sample(), &spec).is_empty());
    }
}
