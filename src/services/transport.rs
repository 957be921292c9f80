use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use crate::models::{Catalog, Contest, ScoreObservation, Submission, Task, User};
use crate::services::config_loader::SourceConfig;

const USERS_PATH: &str = "users/";
const TASKS_PATH: &str = "tasks/";
const CONTESTS_PATH: &str = "contests/";
const HISTORY_PATH: &str = "history";
const SUBMISSIONS_PATH: &str = "sublist/";

/// Producer of the raw ranking payloads. Every call returns the complete
/// current state of its endpoint.
pub trait RankingSource: Send + Sync {
    fn fetch_users(&self) -> impl Future<Output = Result<BTreeMap<String, User>>> + Send;
    fn fetch_tasks(&self) -> impl Future<Output = Result<BTreeMap<String, Task>>> + Send;
    fn fetch_contests(&self) -> impl Future<Output = Result<BTreeMap<String, Contest>>> + Send;
    fn fetch_history(&self) -> impl Future<Output = Result<Vec<ScoreObservation>>> + Send;
    fn fetch_submissions(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<Submission>>> + Send;
}

/// Fetches the three catalog endpoints together.
pub async fn fetch_catalog<S: RankingSource>(source: &S) -> Result<Catalog> {
    let (users, tasks, contests) = tokio::try_join!(
        source.fetch_users(),
        source.fetch_tasks(),
        source.fetch_contests()
    )?;
    info!(
        "Catalog fetched: {} users, {} tasks, {} contests",
        users.len(),
        tasks.len(),
        contests.len()
    );
    Ok(Catalog::new(users, tasks, contests))
}

pub struct HttpSource {
    client: reqwest::Client,
    base: Url,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base = Url::parse(&normalized)
            .with_context(|| format!("Invalid ranking base url {base_url}"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build http client")?;
        Ok(Self { client, base })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self
            .base
            .join(path)
            .with_context(|| format!("Invalid endpoint path {path}"))?;
        debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("{url} answered {status}");
        }
        response
            .json::<T>()
            .await
            .with_context(|| format!("Malformed payload from {url}"))
    }
}

impl RankingSource for HttpSource {
    async fn fetch_users(&self) -> Result<BTreeMap<String, User>> {
        self.get_json(USERS_PATH).await
    }

    async fn fetch_tasks(&self) -> Result<BTreeMap<String, Task>> {
        self.get_json(TASKS_PATH).await
    }

    async fn fetch_contests(&self) -> Result<BTreeMap<String, Contest>> {
        self.get_json(CONTESTS_PATH).await
    }

    async fn fetch_history(&self) -> Result<Vec<ScoreObservation>> {
        self.get_json(HISTORY_PATH).await
    }

    async fn fetch_submissions(&self, user_id: &str) -> Result<Vec<Submission>> {
        self.get_json(&format!("{SUBMISSIONS_PATH}{user_id}")).await
    }
}

/// Reads the payloads from `users.json`, `tasks.json`, `contests.json`,
/// `history.json` and `sublist/<user>.json` under one directory.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn read_json<T: DeserializeOwned>(&self, relative: &str) -> Result<T> {
        let path = self.root.join(relative);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Malformed payload in {}", path.display()))
    }
}

impl RankingSource for DirectorySource {
    async fn fetch_users(&self) -> Result<BTreeMap<String, User>> {
        self.read_json("users.json").await
    }

    async fn fetch_tasks(&self) -> Result<BTreeMap<String, Task>> {
        self.read_json("tasks.json").await
    }

    async fn fetch_contests(&self) -> Result<BTreeMap<String, Contest>> {
        self.read_json("contests.json").await
    }

    async fn fetch_history(&self) -> Result<Vec<ScoreObservation>> {
        self.read_json("history.json").await
    }

    async fn fetch_submissions(&self, user_id: &str) -> Result<Vec<Submission>> {
        self.read_json(&format!("sublist/{user_id}.json")).await
    }
}

/// Source picked from configuration at startup.
pub enum ConfiguredSource {
    Http(HttpSource),
    Directory(DirectorySource),
}

impl ConfiguredSource {
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        if let Some(data_dir) = &config.data_dir {
            info!("Reading ranking data from directory {}", data_dir);
            return Ok(Self::Directory(DirectorySource::new(data_dir)));
        }
        if let Some(base_url) = &config.base_url {
            info!("Reading ranking data from {}", base_url);
            let timeout = Duration::from_secs(config.request_timeout_seconds);
            return Ok(Self::Http(HttpSource::new(base_url, timeout)?));
        }
        bail!("No ranking source configured: set source.data_dir or source.base_url")
    }
}

impl RankingSource for ConfiguredSource {
    async fn fetch_users(&self) -> Result<BTreeMap<String, User>> {
        match self {
            Self::Http(source) => source.fetch_users().await,
            Self::Directory(source) => source.fetch_users().await,
        }
    }

    async fn fetch_tasks(&self) -> Result<BTreeMap<String, Task>> {
        match self {
            Self::Http(source) => source.fetch_tasks().await,
            Self::Directory(source) => source.fetch_tasks().await,
        }
    }

    async fn fetch_contests(&self) -> Result<BTreeMap<String, Contest>> {
        match self {
            Self::Http(source) => source.fetch_contests().await,
            Self::Directory(source) => source.fetch_contests().await,
        }
    }

    async fn fetch_history(&self) -> Result<Vec<ScoreObservation>> {
        match self {
            Self::Http(source) => source.fetch_history().await,
            Self::Directory(source) => source.fetch_history().await,
        }
    }

    async fn fetch_submissions(&self, user_id: &str) -> Result<Vec<Submission>> {
        match self {
            Self::Http(source) => source.fetch_submissions(user_id).await,
            Self::Directory(source) => source.fetch_submissions(user_id).await,
        }
    }
}
