use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::models::{Catalog, Scope, User, UserId};
use crate::services::cluster_layout::{self, LabelMetrics, LayoutItem, Viewport};
use crate::services::config_loader::OverviewConfig;
use crate::services::history_engine::HistorySnapshot;
use crate::services::histogram::ScoreHistogram;

/// Vertical geometry of the overview chart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartGeometry {
    pub height: f64,
    pub pad_top: f64,
    pub pad_bottom: f64,
}

impl ChartGeometry {
    pub fn from_config(config: &OverviewConfig) -> Self {
        Self {
            height: config.height,
            pad_top: config.pad_top,
            pad_bottom: config.pad_bottom,
        }
    }

    fn plot_height(&self) -> f64 {
        (self.height - self.pad_top - self.pad_bottom).max(0.0)
    }

    fn plot_bottom(&self) -> f64 {
        self.pad_top + self.plot_height()
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            top: self.pad_top,
            bottom: self.plot_bottom(),
        }
    }

    /// Rank 1 sits at the top, `max_rank` at the bottom.
    pub fn rank_height(&self, rank: usize, max_rank: usize) -> f64 {
        if max_rank <= 1 {
            return self.pad_top;
        }
        self.pad_top + (rank as f64 - 1.0) / (max_rank as f64 - 1.0) * self.plot_height()
    }

    /// Zero sits at the bottom, `max_score` at the top.
    pub fn score_height(&self, score: f64, max_score: f64) -> f64 {
        if max_score <= 0.0 {
            return self.plot_bottom();
        }
        self.plot_bottom() - score / max_score * self.plot_height()
    }
}

/// Order of highlighted users, top to bottom: higher global score first,
/// then last name, first name and key.
pub fn compare_users(a: &User, a_score: f64, b: &User, b_score: f64) -> Ordering {
    b_score
        .total_cmp(&a_score)
        .then_with(|| a.l_name.cmp(&b.l_name))
        .then_with(|| a.f_name.cmp(&b.f_name))
        .then_with(|| a.key.cmp(&b.key))
}

/// Short marker text: team code (if any) and the initials of the name.
pub fn marker_label(user: &User) -> String {
    let initials: String = user
        .f_name
        .split(' ')
        .chain(user.l_name.split(' '))
        .filter_map(|word| word.chars().next())
        .collect();
    match &user.team {
        Some(team) => format!("{team}-{initials}"),
        None => initials,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerPlacement {
    pub user_id: UserId,
    pub label: String,
    pub score: f64,
    pub rank: usize,
    /// Where the marker touches the score axis
    pub score_y: f64,
    /// Where the marker's arrow points on the rank axis
    pub rank_y: f64,
    /// Collision-free label center
    pub label_y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverviewFrame {
    pub histogram: ScoreHistogram,
    pub markers: Vec<MarkerPlacement>,
}

/// Lays out one overview frame from the current snapshot. Stateless; every
/// redraw trigger may call it.
pub fn plan_frame(
    snapshot: &HistorySnapshot,
    catalog: &Catalog,
    selected: &BTreeSet<UserId>,
    geometry: ChartGeometry,
    metrics: LabelMetrics,
) -> OverviewFrame {
    let scores = snapshot.current_scores(&Scope::Global);
    let max_score = catalog.global_max_score();
    let user_count = catalog.user_count();
    let histogram = ScoreHistogram::from_scores(scores.values().copied(), max_score);

    let mut highlighted: Vec<(&User, f64)> = selected
        .iter()
        .filter_map(|user_id| {
            let user = catalog.users.get(user_id)?;
            Some((user, scores.get(user_id.as_str()).copied().unwrap_or(0.0)))
        })
        .collect();
    highlighted.sort_by(|(a, a_score), (b, b_score)| compare_users(a, *a_score, b, *b_score));

    let ranked: Vec<(&User, f64, usize)> = highlighted
        .into_iter()
        .map(|(user, score)| {
            let rank = 1 + scores.values().filter(|other| **other > score).count();
            (user, score, rank)
        })
        .collect();

    let items: Vec<LayoutItem<usize>> = ranked
        .iter()
        .enumerate()
        .map(|(index, (_, _, rank))| LayoutItem {
            key: index,
            target: geometry.rank_height(*rank, user_count),
        })
        .collect();
    let placed = cluster_layout::layout(&items, geometry.viewport(), metrics);

    let markers = placed
        .into_iter()
        .map(|label| {
            let (user, score, rank) = ranked[label.key];
            MarkerPlacement {
                user_id: user.key.clone(),
                label: marker_label(user),
                score,
                rank,
                score_y: geometry.score_height(score, max_score),
                rank_y: geometry.rank_height(rank, user_count),
                label_y: label.center,
            }
        })
        .collect::<Vec<_>>();

    debug!("Overview frame: {} markers", markers.len());
    OverviewFrame { histogram, markers }
}

/// How a marker moves from the previous frame to the current one.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerTransition {
    Appear { user_id: UserId, label_y: f64 },
    Animate {
        user_id: UserId,
        from: f64,
        to: f64,
        duration_seconds: f64,
    },
    Snap { user_id: UserId, label_y: f64 },
    Disappear { user_id: UserId },
}

/// Remembers the label center last assigned to each marker, which is the
/// only state carried between redraws.
#[derive(Debug, Default)]
pub struct TransitionPolicy {
    previous: BTreeMap<UserId, f64>,
}

impl TransitionPolicy {
    /// `duration_seconds == 0` snaps every existing marker into place.
    pub fn advance(
        &mut self,
        frame: &OverviewFrame,
        duration_seconds: f64,
    ) -> Vec<MarkerTransition> {
        let mut transitions = Vec::with_capacity(frame.markers.len());
        let mut current = BTreeMap::new();

        for marker in &frame.markers {
            let user_id = marker.user_id.clone();
            let transition = match self.previous.get(&user_id) {
                None => MarkerTransition::Appear {
                    user_id: user_id.clone(),
                    label_y: marker.label_y,
                },
                Some(from) if duration_seconds > 0.0 && *from != marker.label_y => {
                    MarkerTransition::Animate {
                        user_id: user_id.clone(),
                        from: *from,
                        to: marker.label_y,
                        duration_seconds,
                    }
                }
                Some(_) => MarkerTransition::Snap {
                    user_id: user_id.clone(),
                    label_y: marker.label_y,
                },
            };
            transitions.push(transition);
            current.insert(user_id, marker.label_y);
        }

        for user_id in self.previous.keys() {
            if !current.contains_key(user_id) {
                transitions.push(MarkerTransition::Disappear {
                    user_id: user_id.clone(),
                });
            }
        }

        self.previous = current;
        transitions
    }
}
