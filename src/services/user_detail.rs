use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::models::{Catalog, HistoryPoint, RankPoint, Scope, Submission, TaskId, User};
use crate::services::history_engine::HistorySnapshot;
use crate::services::store::StandingsStore;
use crate::services::transport::RankingSource;

/// Closed time interval, Unix seconds.
pub type Interval = (i64, i64);

/// Contest windows in chronological order, with overlapping or touching
/// windows merged.
pub fn global_intervals(catalog: &Catalog) -> Vec<Interval> {
    let mut intervals: Vec<Interval> = Vec::new();
    for contest in catalog.contest_list() {
        match intervals.last_mut() {
            Some((_, end)) if contest.begin <= *end => {
                *end = (*end).max(contest.end);
            }
            _ => intervals.push((contest.begin, contest.end)),
        }
    }
    intervals
}

/// Horizontal guide lines of the detail charts.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartGuides {
    pub score: [f64; 3],
    pub rank: [usize; 3],
}

impl ChartGuides {
    pub fn new(max_score: f64, user_count: usize) -> Self {
        Self {
            score: [max_score / 4.0, max_score / 2.0, max_score * 3.0 / 4.0],
            rank: [
                user_count.div_ceil(12),
                user_count.div_ceil(4),
                user_count / 2,
            ],
        }
    }
}

/// Score and rank trajectory of one user in one scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeDetail {
    pub scope: Scope,
    pub name: String,
    pub max_score: f64,
    pub intervals: Vec<Interval>,
    pub score_history: Vec<HistoryPoint>,
    pub rank_history: Vec<RankPoint>,
    pub guides: ChartGuides,
}

impl ScopeDetail {
    fn build(
        snapshot: &HistorySnapshot,
        catalog: &Catalog,
        user_id: &str,
        scope: Scope,
        name: String,
        intervals: Vec<Interval>,
    ) -> Self {
        let max_score = catalog.max_score(&scope);
        let score_history = snapshot.score_history(&scope, user_id).collect();
        let rank_history = snapshot.rank_history(&scope, user_id);
        Self {
            guides: ChartGuides::new(max_score, catalog.user_count()),
            scope,
            name,
            max_score,
            intervals,
            score_history,
            rank_history,
        }
    }

    pub fn latest_score(&self) -> f64 {
        self.score_history.last().map_or(0.0, |point| point.score)
    }

    pub fn latest_rank(&self) -> usize {
        self.rank_history.last().map_or(1, |point| point.rank)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserDetail {
    pub user: User,
    pub global: ScopeDetail,
    /// Contests in chronological order, each followed by its tasks
    pub contests: Vec<(ScopeDetail, Vec<ScopeDetail>)>,
    pub submissions: BTreeMap<TaskId, Vec<Submission>>,
}

impl UserDetail {
    pub fn build(
        snapshot: &HistorySnapshot,
        catalog: &Catalog,
        user_id: &str,
        submissions: Vec<Submission>,
    ) -> Result<Self> {
        let Some(user) = catalog.users.get(user_id) else {
            bail!("Unknown user {user_id}");
        };

        let global = ScopeDetail::build(
            snapshot,
            catalog,
            user_id,
            Scope::Global,
            "Global".to_string(),
            global_intervals(catalog),
        );

        let contests = catalog
            .contest_list()
            .into_iter()
            .map(|contest| {
                let window = vec![(contest.begin, contest.end)];
                let tasks: Vec<ScopeDetail> = catalog
                    .tasks_of(&contest.key)
                    .into_iter()
                    .map(|task| {
                        ScopeDetail::build(
                            snapshot,
                            catalog,
                            user_id,
                            Scope::Task(task.key.clone()),
                            task.name.clone(),
                            window.clone(),
                        )
                    })
                    .collect();
                let detail = ScopeDetail::build(
                    snapshot,
                    catalog,
                    user_id,
                    Scope::Contest(contest.key.clone()),
                    contest.name.clone(),
                    window,
                );
                (detail, tasks)
            })
            .collect();

        Ok(Self {
            user: user.clone(),
            global,
            contests,
            submissions: group_submissions(catalog, submissions),
        })
    }
}

/// Every catalog task gets a (possibly empty) list, in submission order.
pub fn group_submissions(
    catalog: &Catalog,
    submissions: Vec<Submission>,
) -> BTreeMap<TaskId, Vec<Submission>> {
    let mut grouped: BTreeMap<TaskId, Vec<Submission>> = catalog
        .tasks
        .keys()
        .map(|task_id| (task_id.clone(), Vec::new()))
        .collect();
    for submission in submissions {
        match grouped.get_mut(&submission.task) {
            Some(list) => list.push(submission),
            None => warn!("Dropping submission for unknown task {}", submission.task),
        }
    }
    grouped
}

/// Refreshes the history and fetches the user's submissions concurrently,
/// building the detail only once both have arrived.
pub async fn load_user_detail<S: RankingSource>(
    store: &StandingsStore,
    source: &S,
    user_id: &str,
) -> Result<UserDetail> {
    let (snapshot, submissions): (Arc<HistorySnapshot>, Vec<Submission>) = tokio::try_join!(
        store.refresh_history(source),
        source.fetch_submissions(user_id)
    )?;
    info!(
        "Loaded detail inputs for {}: {} submissions",
        user_id,
        submissions.len()
    );
    UserDetail::build(&snapshot, &store.catalog(), user_id, submissions)
}
