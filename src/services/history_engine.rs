use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use crate::models::{
    Catalog, GLOBAL_SCOPE_ID, HistoryPoint, RankPoint, ScopeKind, Scope, ScoreObservation, UserId,
};

/// One cumulative score change inside a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesEntry {
    pub user: UserId,
    pub scope_id: String,
    pub time: i64,
    pub score: f64,
}

/// Score histories of every competitor, split by scope, derived from the
/// full observation list. Never mutated after `build`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySnapshot {
    task_series: Vec<SeriesEntry>,
    contest_series: Vec<SeriesEntry>,
    global_series: Vec<SeriesEntry>,
    population: Vec<UserId>,
    observations: usize,
    skipped: usize,
}

impl HistorySnapshot {
    /// Rebuilds every series from scratch. Observations must already be in
    /// non-decreasing time order; unknown users and tasks are skipped.
    pub fn build(observations: &[ScoreObservation], catalog: &Catalog) -> Self {
        // task -> contest, resolved once
        let task_contest: BTreeMap<&str, &str> = catalog
            .tasks
            .values()
            .map(|task| (task.key.as_str(), task.contest.as_str()))
            .collect();

        let mut per_user: BTreeMap<&str, BTreeMap<&str, f64>> = catalog
            .users
            .keys()
            .map(|user_id| {
                let tasks = task_contest.keys().map(|task_id| (*task_id, 0.0)).collect();
                (user_id.as_str(), tasks)
            })
            .collect();

        let mut snapshot = HistorySnapshot {
            population: catalog.users.keys().cloned().collect(),
            observations: observations.len(),
            ..Default::default()
        };

        for observation in observations {
            let Some(task_scores) = per_user.get_mut(observation.user.as_str()) else {
                debug!("Skipping observation for unknown user {}", observation.user);
                snapshot.skipped += 1;
                continue;
            };
            let Some(contest_id) = task_contest.get(observation.task.as_str()).copied() else {
                debug!("Skipping observation for unknown task {}", observation.task);
                snapshot.skipped += 1;
                continue;
            };

            if let Some(score) = task_scores.get_mut(observation.task.as_str()) {
                *score = observation.score;
            }

            snapshot.task_series.push(SeriesEntry {
                user: observation.user.clone(),
                scope_id: observation.task.clone(),
                time: observation.time,
                score: observation.score,
            });

            let contest_score: f64 = task_scores
                .iter()
                .filter(|(task_id, _)| task_contest.get(*task_id) == Some(&contest_id))
                .map(|(_, score)| *score)
                .sum();
            snapshot.contest_series.push(SeriesEntry {
                user: observation.user.clone(),
                scope_id: contest_id.to_string(),
                time: observation.time,
                score: contest_score,
            });

            let global_score: f64 = task_scores.values().sum();
            snapshot.global_series.push(SeriesEntry {
                user: observation.user.clone(),
                scope_id: GLOBAL_SCOPE_ID.to_string(),
                time: observation.time,
                score: global_score,
            });
        }

        if snapshot.skipped > 0 {
            warn!(
                "Skipped {} of {} observations referencing unknown users or tasks",
                snapshot.skipped,
                observations.len()
            );
        }
        info!(
            "History rebuilt: {} observations, {} users, {} tasks",
            observations.len(),
            snapshot.population.len(),
            task_contest.len()
        );

        snapshot
    }

    pub fn series(&self, kind: ScopeKind) -> &[SeriesEntry] {
        match kind {
            ScopeKind::Task => &self.task_series,
            ScopeKind::Contest => &self.contest_series,
            ScopeKind::Global => &self.global_series,
        }
    }

    pub fn population(&self) -> &[UserId] {
        &self.population
    }

    pub fn observation_count(&self) -> usize {
        self.observations
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped
    }

    fn scope_entries<'a>(
        &'a self,
        scope: &'a Scope,
    ) -> impl Iterator<Item = &'a SeriesEntry> + Clone + 'a {
        let scope_id = scope.scope_id();
        self.series(scope.kind())
            .iter()
            .filter(move |entry| entry.scope_id == scope_id)
    }

    /// Score samples of `user` in `scope`, in series order. The iterator is
    /// lazy and can be cloned to restart it.
    pub fn score_history<'a>(
        &'a self,
        scope: &'a Scope,
        user: &'a str,
    ) -> impl Iterator<Item = HistoryPoint> + Clone + 'a {
        self.scope_entries(scope)
            .filter(move |entry| entry.user == user)
            .map(|entry| HistoryPoint {
                time: entry.time,
                score: entry.score,
                reserved: 0,
            })
    }

    /// Rank trajectory of `user` in `scope`.
    ///
    /// Updates of other competitors adjust the counters in O(1) relative to
    /// the subject's current score; the subject's own updates recount the
    /// whole population. Entries sharing a timestamp are replayed one by one,
    /// so simultaneous updates may produce transient points.
    pub fn rank_history(&self, scope: &Scope, user: &str) -> Vec<RankPoint> {
        let mut last: HashMap<&str, f64> = self
            .population
            .iter()
            .map(|user_id| (user_id.as_str(), 0.0))
            .collect();
        let mut above = 0usize;
        let mut equal = self.population.len();
        let mut result = Vec::new();

        for entry in self.scope_entries(scope) {
            if entry.user == user {
                last.insert(user, entry.score);
                let (new_above, new_equal) = count_relative(&last, entry.score);
                if new_above != above || new_equal != equal {
                    above = new_above;
                    equal = new_equal;
                    result.push(rank_point(entry.time, above, equal));
                }
                continue;
            }

            let target = last.get(user).copied().unwrap_or(0.0);
            let old = last.get(entry.user.as_str()).copied().unwrap_or(0.0);
            let new = entry.score;
            let (prev_above, prev_equal) = (above, equal);

            if old <= target && new > target {
                above += 1;
            } else if old > target && new <= target {
                above = above.saturating_sub(1);
            }
            if old == target {
                equal = equal.saturating_sub(1);
            }
            if new == target {
                equal += 1;
            }

            if above != prev_above || equal != prev_equal {
                result.push(rank_point(entry.time, above, equal));
            }
            last.insert(entry.user.as_str(), new);
        }

        result
    }

    /// Latest score of every population member in `scope`, zero for users
    /// with no observation there yet.
    pub fn current_scores(&self, scope: &Scope) -> BTreeMap<&str, f64> {
        let mut scores: BTreeMap<&str, f64> = self
            .population
            .iter()
            .map(|user_id| (user_id.as_str(), 0.0))
            .collect();
        for entry in self.scope_entries(scope) {
            if let Some(score) = scores.get_mut(entry.user.as_str()) {
                *score = entry.score;
            }
        }
        scores
    }

    /// 1 + number of competitors strictly above `user` right now.
    pub fn current_rank(&self, scope: &Scope, user: &str) -> usize {
        let scores = self.current_scores(scope);
        let own = scores.get(user).copied().unwrap_or(0.0);
        1 + scores.values().filter(|score| **score > own).count()
    }

    pub fn latest_score(&self, scope: &Scope, user: &str) -> f64 {
        self.score_history(scope, user)
            .last()
            .map_or(0.0, |point| point.score)
    }

    pub fn latest_rank(&self, scope: &Scope, user: &str) -> usize {
        self.rank_history(scope, user)
            .last()
            .map_or(1, |point| point.rank)
    }
}

fn count_relative(last: &HashMap<&str, f64>, score: f64) -> (usize, usize) {
    last.values().fold((0, 0), |(above, equal), other| {
        if *other > score {
            (above + 1, equal)
        } else if *other == score {
            (above, equal + 1)
        } else {
            (above, equal)
        }
    })
}

fn rank_point(time: i64, above: usize, equal: usize) -> RankPoint {
    RankPoint {
        time,
        rank: above + 1,
        tied_below: equal.saturating_sub(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contest, Task, User};
    use proptest::prelude::*;

    fn user(key: &str) -> User {
        User {
            key: key.to_string(),
            f_name: key.to_string(),
            l_name: "Tester".to_string(),
            team: None,
        }
    }

    fn task(contest: &str) -> Task {
        Task {
            key: String::new(),
            name: "task".to_string(),
            short_name: String::new(),
            contest: contest.to_string(),
            max_score: 100.0,
            score_precision: 0,
            extra_headers: Vec::new(),
            order: 0,
        }
    }

    fn contest() -> Contest {
        Contest {
            key: String::new(),
            name: "contest".to_string(),
            begin: 0,
            end: 1000,
            score_precision: 0,
            max_score: None,
        }
    }

    /// Users `u`, tasks as `(task, contest)` pairs.
    fn catalog(users: &[&str], tasks: &[(&str, &str)]) -> Catalog {
        let users = users.iter().map(|u| (u.to_string(), user(u))).collect();
        let tasks = tasks
            .iter()
            .map(|(t, c)| (t.to_string(), task(c)))
            .collect();
        let contests = ["c1", "c2"]
            .iter()
            .map(|c| (c.to_string(), contest()))
            .collect();
        Catalog::new(users, tasks, contests)
    }

    fn obs(user: &str, task: &str, time: i64, score: f64) -> ScoreObservation {
        ScoreObservation::new(user, task, time, score)
    }

    fn point(time: i64, rank: usize, tied_below: usize) -> RankPoint {
        RankPoint {
            time,
            rank,
            tied_below,
        }
    }

    #[test]
    fn three_way_task_scenario() {
        let catalog = catalog(&["A", "B", "C"], &[("T1", "c1")]);
        let observations = vec![obs("A", "T1", 1, 40.0), obs("B", "T1", 2, 40.0), obs("C", "T1", 3, 90.0)];
        let snapshot = HistorySnapshot::build(&observations, &catalog);
        let scope = Scope::Task("T1".to_string());

        assert_eq!(
            snapshot.rank_history(&scope, "A"),
            vec![point(1, 1, 0), point(2, 1, 1), point(3, 2, 1)]
        );
        assert_eq!(
            snapshot.rank_history(&scope, "B"),
            vec![point(1, 2, 1), point(2, 1, 1), point(3, 2, 1)]
        );
        assert_eq!(
            snapshot.rank_history(&scope, "C"),
            vec![point(1, 2, 1), point(2, 3, 0), point(3, 1, 0)]
        );
    }

    #[test]
    fn contest_and_global_series_sum_tasks() {
        let catalog = catalog(&["A"], &[("T1", "c1"), ("T2", "c1"), ("T3", "c2")]);
        let observations = vec![
            obs("A", "T1", 1, 10.0),
            obs("A", "T3", 2, 5.0),
            obs("A", "T2", 3, 20.0),
            obs("A", "T1", 4, 30.0),
        ];
        let snapshot = HistorySnapshot::build(&observations, &catalog);

        let contest: Vec<f64> = snapshot
            .score_history(&Scope::Contest("c1".to_string()), "A")
            .map(|p| p.score)
            .collect();
        assert_eq!(contest, vec![10.0, 30.0, 50.0]);

        let global: Vec<(i64, f64)> = snapshot
            .score_history(&Scope::Global, "A")
            .map(|p| (p.time, p.score))
            .collect();
        assert_eq!(global, vec![(1, 10.0), (2, 15.0), (3, 35.0), (4, 55.0)]);

        assert_eq!(snapshot.latest_score(&Scope::Contest("c2".to_string()), "A"), 5.0);
    }

    #[test]
    fn score_history_is_restartable_and_reserved_is_zero() {
        let catalog = catalog(&["A", "B"], &[("T1", "c1")]);
        let observations = vec![obs("A", "T1", 1, 10.0), obs("B", "T1", 2, 20.0), obs("A", "T1", 3, 60.0)];
        let snapshot = HistorySnapshot::build(&observations, &catalog);
        let scope = Scope::Task("T1".to_string());

        let history = snapshot.score_history(&scope, "A");
        let first: Vec<HistoryPoint> = history.clone().collect();
        let second: Vec<HistoryPoint> = history.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|p| p.reserved == 0));
        assert_eq!(snapshot.score_history(&Scope::Task("T1".to_string()), "C").count(), 0);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let catalog = catalog(&["A"], &[("T1", "c1")]);
        let observations = vec![obs("ghost", "T1", 1, 10.0), obs("A", "nope", 2, 20.0), obs("A", "T1", 3, 30.0)];
        let snapshot = HistorySnapshot::build(&observations, &catalog);

        assert_eq!(snapshot.skipped_count(), 2);
        assert_eq!(snapshot.series(ScopeKind::Task).len(), 1);
        assert_eq!(snapshot.latest_score(&Scope::Global, "A"), 30.0);
    }

    #[test]
    fn unobserved_user_defaults_to_rank_one_and_zero_score() {
        let catalog = catalog(&["A", "B"], &[("T1", "c1")]);
        let snapshot = HistorySnapshot::build(&[], &catalog);
        assert_eq!(snapshot.latest_rank(&Scope::Global, "A"), 1);
        assert_eq!(snapshot.latest_score(&Scope::Global, "A"), 0.0);
        assert!(snapshot.rank_history(&Scope::Global, "A").is_empty());
    }

    #[test]
    fn repeated_equal_score_emits_nothing() {
        let catalog = catalog(&["A", "B"], &[("T1", "c1"), ("T2", "c1")]);
        // B ties A, then re-reports the same score
        let observations = vec![
            obs("A", "T1", 1, 50.0),
            obs("B", "T1", 2, 50.0),
            obs("B", "T1", 3, 50.0),
        ];
        let snapshot = HistorySnapshot::build(&observations, &catalog);
        assert_eq!(
            snapshot.rank_history(&Scope::Task("T1".to_string()), "A"),
            vec![point(1, 1, 0), point(2, 1, 1)]
        );
    }

    #[test]
    fn simultaneous_updates_are_not_coalesced() {
        let catalog = catalog(&["A", "B", "C"], &[("T1", "c1")]);
        let observations = vec![
            obs("A", "T1", 1, 50.0),
            obs("B", "T1", 5, 60.0),
            obs("C", "T1", 5, 70.0),
        ];
        let snapshot = HistorySnapshot::build(&observations, &catalog);
        assert_eq!(
            snapshot.rank_history(&Scope::Task("T1".to_string()), "A"),
            vec![point(1, 1, 0), point(5, 2, 0), point(5, 3, 0)]
        );
    }

    #[test]
    fn current_rank_counts_strictly_above() {
        let catalog = catalog(&["A", "B", "C"], &[("T1", "c1")]);
        let observations = vec![obs("A", "T1", 1, 50.0), obs("B", "T1", 2, 50.0), obs("C", "T1", 3, 90.0)];
        let snapshot = HistorySnapshot::build(&observations, &catalog);
        assert_eq!(snapshot.current_rank(&Scope::Global, "C"), 1);
        assert_eq!(snapshot.current_rank(&Scope::Global, "A"), 2);
        assert_eq!(snapshot.current_rank(&Scope::Global, "B"), 2);
        let scores = snapshot.current_scores(&Scope::Contest("c2".to_string()));
        assert!(scores.values().all(|score| *score == 0.0));
    }

    /// Full recount after every step in the scope: (time, above, equal, below).
    fn brute_force(
        snapshot: &HistorySnapshot,
        scope: &Scope,
        user: &str,
    ) -> Vec<(i64, usize, usize, usize)> {
        let mut last: BTreeMap<&str, f64> = snapshot
            .population()
            .iter()
            .map(|u| (u.as_str(), 0.0))
            .collect();
        let mut out = Vec::new();
        for entry in snapshot.scope_entries(scope) {
            last.insert(entry.user.as_str(), entry.score);
            let own = last[user];
            let above = last.values().filter(|s| **s > own).count();
            let equal = last.values().filter(|s| **s == own).count();
            let below = last.values().filter(|s| **s < own).count();
            out.push((entry.time, above, equal, below));
        }
        out
    }

    fn arb_observations() -> impl Strategy<Value = Vec<ScoreObservation>> {
        let users = prop_oneof![Just("A"), Just("B"), Just("C"), Just("D")];
        let tasks = prop_oneof![Just("T1"), Just("T2"), Just("T3")];
        proptest::collection::vec((users, tasks, 0u8..4), 0..40).prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (u, t, step))| obs(u, t, i as i64 / 2, step as f64 * 25.0))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn rank_points_match_recount(observations in arb_observations()) {
            let catalog = catalog(&["A", "B", "C", "D"], &[("T1", "c1"), ("T2", "c1"), ("T3", "c2")]);
            let snapshot = HistorySnapshot::build(&observations, &catalog);
            let scopes = [
                Scope::Task("T1".to_string()),
                Scope::Contest("c1".to_string()),
                Scope::Global,
            ];

            for scope in &scopes {
                for user in ["A", "B", "C", "D"] {
                    // Keep only the recounted steps where the rank changes.
                    let mut expected = Vec::new();
                    let mut current = (1, 3);
                    for (time, above, equal, below) in brute_force(&snapshot, scope, user) {
                        prop_assert_eq!(above + equal + below, 4);
                        let next = (above + 1, equal - 1);
                        if next != current {
                            current = next;
                            expected.push(point(time, next.0, next.1));
                        }
                    }

                    let points = snapshot.rank_history(scope, user);
                    for p in &points {
                        // above + equal never exceeds the population
                        prop_assert!(p.rank + p.tied_below <= 4);
                    }
                    prop_assert_eq!(points, expected);
                }
            }
        }

        #[test]
        fn build_is_idempotent(observations in arb_observations()) {
            let catalog = catalog(&["A", "B", "C", "D"], &[("T1", "c1"), ("T2", "c1"), ("T3", "c2")]);
            let first = HistorySnapshot::build(&observations, &catalog);
            let second = HistorySnapshot::build(&observations, &catalog);
            prop_assert_eq!(first, second);
        }
    }
}
