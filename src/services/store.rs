use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::models::Catalog;
use crate::services::history_engine::HistorySnapshot;
use crate::services::transport::{self, RankingSource};

/// Current catalog and history snapshot. Readers clone the `Arc` and keep a
/// consistent view while a refresh swaps in the next one.
#[derive(Debug, Default)]
pub struct StandingsStore {
    catalog: RwLock<Arc<Catalog>>,
    snapshot: RwLock<Arc<HistorySnapshot>>,
}

impl StandingsStore {
    pub fn new(catalog: Catalog) -> Self {
        let snapshot = HistorySnapshot::build(&[], &catalog);
        Self {
            catalog: RwLock::new(Arc::new(catalog)),
            snapshot: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read())
    }

    pub fn snapshot(&self) -> Arc<HistorySnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Replaces the catalog. The history snapshot keeps the population it was
    /// built with until the next history refresh.
    pub async fn refresh_catalog<S: RankingSource>(&self, source: &S) -> Result<Arc<Catalog>> {
        match transport::fetch_catalog(source).await {
            Ok(catalog) => {
                let catalog = Arc::new(catalog);
                *self.catalog.write() = Arc::clone(&catalog);
                Ok(catalog)
            }
            Err(err) => {
                error!("Catalog refresh failed, keeping previous catalog: {err:#}");
                Err(err)
            }
        }
    }

    /// Fetches the full observation list and rebuilds every series. On
    /// failure the previous snapshot stays in place.
    pub async fn refresh_history<S: RankingSource>(
        &self,
        source: &S,
    ) -> Result<Arc<HistorySnapshot>> {
        let observations = match source.fetch_history().await {
            Ok(observations) => observations,
            Err(err) => {
                error!("History refresh failed, keeping previous snapshot: {err:#}");
                return Err(err);
            }
        };

        let catalog = self.catalog();
        let snapshot = Arc::new(HistorySnapshot::build(&observations, &catalog));
        *self.snapshot.write() = Arc::clone(&snapshot);
        Ok(snapshot)
    }
}

#[derive(Debug)]
pub enum RefreshEvent {
    Started,
    Rebuilt { observations: usize, skipped: usize },
    Failed { message: String },
}

/// Refreshes the history every `interval` until the receiver is dropped.
pub fn spawn_history_poller<S>(
    store: Arc<StandingsStore>,
    source: Arc<S>,
    interval: Duration,
) -> (Receiver<RefreshEvent>, JoinHandle<()>)
where
    S: RankingSource + 'static,
{
    let (tx, rx) = mpsc::channel::<RefreshEvent>(16);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !send_event(&tx, RefreshEvent::Started).await {
                break;
            }

            let event = match store.refresh_history(source.as_ref()).await {
                Ok(snapshot) => RefreshEvent::Rebuilt {
                    observations: snapshot.observation_count(),
                    skipped: snapshot.skipped_count(),
                },
                Err(err) => RefreshEvent::Failed {
                    message: format!("{err:#}"),
                },
            };
            if !send_event(&tx, event).await {
                break;
            }
        }

        info!("History poller stopped");
    });

    (rx, handle)
}

async fn send_event(tx: &Sender<RefreshEvent>, event: RefreshEvent) -> bool {
    if tx.send(event).await.is_err() {
        warn!("Refresh listener gone");
        return false;
    }
    true
}
