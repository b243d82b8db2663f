use std::collections::HashMap;

use crate::model::Run;

/// Outcome of one merge batch, reported in progress updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added: usize,
    pub updated: usize,
}

/// Append/merge-only collection of runs, one list per repository key.
///
/// Runs are keyed by id within a repository: re-receiving an id replaces the
/// stored entry in place (job details arrive in a second streaming phase on
/// the same id), so merging is idempotent. Entries are never individually
/// deleted; a whole repository list is dropped on clear or session restart.
#[derive(Debug, Default)]
pub struct RunStore {
    by_repo: HashMap<String, Vec<Run>>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, repo: &str, incoming: Vec<Run>) -> MergeOutcome {
        let runs = self.by_repo.entry(repo.to_string()).or_default();
        let mut outcome = MergeOutcome::default();
        for run in incoming {
            match runs.iter().position(|r| r.id == run.id) {
                Some(idx) => {
                    runs[idx] = run;
                    outcome.updated += 1;
                }
                None => {
                    runs.push(run);
                    outcome.added += 1;
                }
            }
        }
        outcome
    }

    /// Replace a repository's entire list, used when rehydrating from cache.
    pub fn replace(&mut self, repo: &str, runs: Vec<Run>) {
        self.by_repo.insert(repo.to_string(), runs);
    }

    pub fn snapshot(&self, repo: &str) -> Vec<Run> {
        self.by_repo.get(repo).cloned().unwrap_or_default()
    }

    pub fn len(&self, repo: &str) -> usize {
        self.by_repo.get(repo).map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, repo: &str) -> bool {
        self.len(repo) == 0
    }

    pub fn clear(&mut self, repo: Option<&str>) {
        match repo {
            Some(key) => {
                self.by_repo.remove(key);
            }
            None => self.by_repo.clear(),
        }
    }
}
