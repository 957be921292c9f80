use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::DateTime;
use clap::{Parser, Subcommand};
use standings::models::UserId;
use standings::services::config_loader::{StandingsConfig, load_standings_config};
use standings::services::overview::{self, ChartGeometry, MarkerTransition, TransitionPolicy};
use standings::services::store::{RefreshEvent, StandingsStore, spawn_history_poller};
use standings::services::transport::ConfiguredSource;
use standings::services::user_detail::{self, ScopeDetail};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to config TOML
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scores and ranks of one user in every scope
    User { user_id: UserId },
    /// Marker layout and score distribution of the overview chart
    Overview {
        /// Highlighted user (repeatable)
        #[arg(long = "select")]
        selected: Vec<UserId>,
    },
    /// Keep refreshing the history, re-planning the overview on every rebuild
    Watch {
        #[arg(long = "select")]
        selected: Vec<UserId>,
    },
}

fn init_tracing() -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let _ = fs::create_dir_all("logs");
    let file_appender = tracing_appender::rolling::daily("logs", "standings.log");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_target(true);

    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let Err(err) = init_result {
        eprintln!("tracing init failed: {err}");
        return None;
    }

    Some(file_guard)
}

fn format_time(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn print_scope_row(detail: &ScopeDetail, indent: usize) {
    let changed = detail
        .score_history
        .last()
        .map(|point| format_time(point.time))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:indent$}{:<24} score {:>8.2} / {:<8.2} rank {:>4}  last change {}",
        "",
        detail.name,
        detail.latest_score(),
        detail.max_score,
        detail.latest_rank(),
        changed,
        indent = indent
    );
}

async fn show_user(
    store: &StandingsStore,
    source: &ConfiguredSource,
    user_id: &str,
) -> Result<()> {
    let detail = user_detail::load_user_detail(store, source, user_id).await?;
    println!("{} {}", detail.user.f_name, detail.user.l_name);
    print_scope_row(&detail.global, 0);
    for (contest, tasks) in &detail.contests {
        print_scope_row(contest, 2);
        for task in tasks {
            print_scope_row(task, 4);
            let count = detail.submissions.get(task.scope.scope_id()).map_or(0, Vec::len);
            println!("{:6}{} submissions", "", count);
        }
    }
    Ok(())
}

fn show_overview(store: &StandingsStore, config: &StandingsConfig, selected: &BTreeSet<UserId>) {
    let frame = overview::plan_frame(
        &store.snapshot(),
        &store.catalog(),
        selected,
        ChartGeometry::from_config(&config.overview),
        config.overview.label_metrics(),
    );

    println!("score distribution {:?}", frame.histogram.counts());
    for marker in &frame.markers {
        println!(
            "{:<12} {:<10} rank {:>4} score {:>8.2}  label y {:>7.2}  rank y {:>7.2}  score y {:>7.2}",
            marker.user_id,
            marker.label,
            marker.rank,
            marker.score,
            marker.label_y,
            marker.rank_y,
            marker.score_y
        );
    }
}

async fn watch(
    store: Arc<StandingsStore>,
    source: Arc<ConfiguredSource>,
    config: &StandingsConfig,
    selected: &BTreeSet<UserId>,
) {
    let interval = Duration::from_secs(config.source.refresh_seconds.max(1));
    let (mut events, _handle) = spawn_history_poller(Arc::clone(&store), source, interval);
    let mut policy = TransitionPolicy::default();

    while let Some(event) = events.recv().await {
        match event {
            RefreshEvent::Started => {}
            RefreshEvent::Rebuilt {
                observations,
                skipped,
            } => {
                info!("Rebuilt from {} observations ({} skipped)", observations, skipped);
                let frame = overview::plan_frame(
                    &store.snapshot(),
                    &store.catalog(),
                    selected,
                    ChartGeometry::from_config(&config.overview),
                    config.overview.label_metrics(),
                );
                for transition in policy.advance(&frame, config.overview.transition_seconds) {
                    match transition {
                        MarkerTransition::Animate { user_id, from, to, .. } => {
                            info!("Marker {} moves {:.1} -> {:.1}", user_id, from, to)
                        }
                        MarkerTransition::Appear { user_id, label_y } => {
                            info!("Marker {} appears at {:.1}", user_id, label_y)
                        }
                        MarkerTransition::Disappear { user_id } => {
                            info!("Marker {} disappears", user_id)
                        }
                        MarkerTransition::Snap { .. } => {}
                    }
                }
            }
            RefreshEvent::Failed { message } => warn!("Refresh failed: {}", message),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_tracing();
    info!("Starting standings");

    let args = Args::parse();
    let config = load_standings_config(&args.config)?;
    let source = Arc::new(ConfiguredSource::from_config(&config.source)?);
    let store = Arc::new(StandingsStore::default());
    store.refresh_catalog(source.as_ref()).await?;

    match args.command {
        Command::User { user_id } => show_user(&store, &source, &user_id).await?,
        Command::Overview { selected } => {
            store.refresh_history(source.as_ref()).await?;
            show_overview(&store, &config, &selected.into_iter().collect());
        }
        Command::Watch { selected } => {
            watch(store, source, &config, &selected.into_iter().collect()).await;
        }
    }

    Ok(())
}
