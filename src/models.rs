use std::collections::BTreeMap;

use serde::{self, Deserialize, Deserializer, Serialize};
use tracing::warn;

pub type UserId = String;
pub type TaskId = String;
pub type ContestId = String;

/// Scope id stored in the global series, where no task or contest applies.
pub const GLOBAL_SCOPE_ID: &str = "";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    #[serde(default)]
    pub key: UserId,
    pub f_name: String,
    pub l_name: String,
    #[serde(default)]
    pub team: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Task {
    #[serde(default)]
    pub key: TaskId,
    pub name: String,
    #[serde(default)]
    pub short_name: String,
    pub contest: ContestId,
    pub max_score: f64,
    #[serde(default)]
    pub score_precision: u32,
    #[serde(default)]
    pub extra_headers: Vec<String>,
    #[serde(default)]
    pub order: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Contest {
    #[serde(default)]
    pub key: ContestId,
    pub name: String,
    /// Unix seconds
    pub begin: i64,
    /// Unix seconds
    pub end: i64,
    #[serde(default)]
    pub score_precision: u32,
    /// Filled from the contest's tasks when the endpoint omits it.
    #[serde(default)]
    pub max_score: Option<f64>,
}

pub trait HasId {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
}

impl HasId for User {
    fn id(&self) -> &str {
        &self.key
    }

    fn set_id(&mut self, id: String) {
        self.key = id;
    }
}

impl HasId for Task {
    fn id(&self) -> &str {
        &self.key
    }

    fn set_id(&mut self, id: String) {
        self.key = id;
    }
}

impl HasId for Contest {
    fn id(&self) -> &str {
        &self.key
    }

    fn set_id(&mut self, id: String) {
        self.key = id;
    }
}

/// Catalog endpoints key every entity by id; copy the key into the entity
/// so it can be passed around on its own.
pub fn keyed_entities<T: HasId>(raw: BTreeMap<String, T>) -> BTreeMap<String, T> {
    raw.into_iter()
        .map(|(id, mut entity)| {
            if !entity.id().is_empty() && entity.id() != id {
                warn!("Entity key {} disagrees with map key {}, using map key", entity.id(), id);
            }
            entity.set_id(id.clone());
            (id, entity)
        })
        .collect()
}

/// Static description of the competition: who competes, on which tasks,
/// grouped in which contests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub users: BTreeMap<UserId, User>,
    pub tasks: BTreeMap<TaskId, Task>,
    pub contests: BTreeMap<ContestId, Contest>,
}

impl Catalog {
    pub fn new(
        users: BTreeMap<UserId, User>,
        tasks: BTreeMap<TaskId, Task>,
        contests: BTreeMap<ContestId, Contest>,
    ) -> Self {
        let users = keyed_entities(users);
        let tasks = keyed_entities(tasks);
        let mut contests = keyed_entities(contests);

        for contest in contests.values_mut() {
            if contest.max_score.is_none() {
                let sum = tasks
                    .values()
                    .filter(|task| task.contest == contest.key)
                    .map(|task| task.max_score)
                    .sum();
                contest.max_score = Some(sum);
            }
        }

        for task in tasks.values() {
            if !contests.contains_key(&task.contest) {
                warn!("Task {} belongs to unknown contest {}", task.key, task.contest);
            }
        }

        Self {
            users,
            tasks,
            contests,
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn global_max_score(&self) -> f64 {
        self.tasks.values().map(|task| task.max_score).sum()
    }

    pub fn contest_of(&self, task_id: &str) -> Option<&str> {
        self.tasks.get(task_id).map(|task| task.contest.as_str())
    }

    pub fn contest_max_score(&self, contest_id: &str) -> f64 {
        self.contests
            .get(contest_id)
            .and_then(|contest| contest.max_score)
            .unwrap_or(0.0)
    }

    /// Max score reachable in `scope`.
    pub fn max_score(&self, scope: &Scope) -> f64 {
        match scope {
            Scope::Task(task_id) => self.tasks.get(task_id).map_or(0.0, |task| task.max_score),
            Scope::Contest(contest_id) => self.contest_max_score(contest_id),
            Scope::Global => self.global_max_score(),
        }
    }

    /// Contests in chronological order.
    pub fn contest_list(&self) -> Vec<&Contest> {
        let mut contests: Vec<&Contest> = self.contests.values().collect();
        contests.sort_by(|a, b| a.begin.cmp(&b.begin).then_with(|| a.key.cmp(&b.key)));
        contests
    }

    pub fn tasks_of(&self, contest_id: &str) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .values()
            .filter(|task| task.contest == contest_id)
            .collect();
        tasks.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.key.cmp(&b.key)));
        tasks
    }
}

/// Aggregation level of a score or rank trajectory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Task(TaskId),
    Contest(ContestId),
    Global,
}

impl Scope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::Task(_) => ScopeKind::Task,
            Scope::Contest(_) => ScopeKind::Contest,
            Scope::Global => ScopeKind::Global,
        }
    }

    pub fn scope_id(&self) -> &str {
        match self {
            Scope::Task(id) | Scope::Contest(id) => id,
            Scope::Global => GLOBAL_SCOPE_ID,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Task,
    Contest,
    Global,
}

/// Absolute score of one user on one task as of `time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, String, i64, f64)", into = "(String, String, i64, f64)")]
pub struct ScoreObservation {
    pub user: UserId,
    pub task: TaskId,
    pub time: i64,
    pub score: f64,
}

impl ScoreObservation {
    pub fn new(user: impl Into<String>, task: impl Into<String>, time: i64, score: f64) -> Self {
        Self {
            user: user.into(),
            task: task.into(),
            time,
            score,
        }
    }
}

impl From<(String, String, i64, f64)> for ScoreObservation {
    fn from((user, task, time, score): (String, String, i64, f64)) -> Self {
        Self {
            user,
            task,
            time,
            score,
        }
    }
}

impl From<ScoreObservation> for (String, String, i64, f64) {
    fn from(observation: ScoreObservation) -> Self {
        (
            observation.user,
            observation.task,
            observation.time,
            observation.score,
        )
    }
}

/// Score sample handed to charts, serialized as `[time, score, 0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(into = "(i64, f64, u8)")]
pub struct HistoryPoint {
    pub time: i64,
    pub score: f64,
    pub reserved: u8,
}

impl From<HistoryPoint> for (i64, f64, u8) {
    fn from(point: HistoryPoint) -> Self {
        (point.time, point.score, point.reserved)
    }
}

/// Rank sample, serialized as `[time, rank, tied_below]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "(i64, usize, usize)")]
pub struct RankPoint {
    pub time: i64,
    /// 1 + number of users strictly above
    pub rank: usize,
    /// Users with the same score, the subject excluded
    pub tied_below: usize,
}

impl From<RankPoint> for (i64, usize, usize) {
    fn from(point: RankPoint) -> Self {
        (point.time, point.rank, point.tied_below)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Submission {
    #[serde(default)]
    pub key: Option<String>,
    pub user: UserId,
    pub task: TaskId,
    pub time: i64,
    #[serde(default, deserialize_with = "from_opt_score")]
    pub score: Option<f64>,
    #[serde(default)]
    pub token: bool,
    #[serde(default)]
    pub extra: Vec<String>,
}

fn from_opt_score<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(number)) => Ok(number.as_f64()),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid score value: {}",
            other
        ))),
    }
}
