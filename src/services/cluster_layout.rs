//! Collision-free placement of fixed-height marker labels along one axis.
//!
//! Every label wants to sit centered on its own target coordinate. Labels
//! that would overlap are merged into clusters, each cluster centered on the
//! count-weighted mean of what it absorbed, and clusters are kept inside the
//! viewport. When the viewport cannot hold every label at nominal spacing,
//! the topmost cluster is compressed.

/// Range available to label *centers*. Label edges may reach half a label
/// height beyond either side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub top: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelMetrics {
    pub height: f64,
    /// Minimum gap between two labels
    pub padding: f64,
}

impl LabelMetrics {
    /// Length of a run of `count` labels at nominal spacing.
    fn span(&self, count: usize) -> f64 {
        count as f64 * self.height + count.saturating_sub(1) as f64 * self.padding
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutItem<K> {
    pub key: K,
    /// Natural, unclamped center of the label
    pub target: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLabel<K> {
    pub key: K,
    pub center: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster<K> {
    pub begin: f64,
    pub end: f64,
    pub members: Vec<K>,
}

impl<K> Cluster<K> {
    fn singleton(key: K, target: f64, metrics: &LabelMetrics) -> Self {
        Self {
            begin: target - metrics.height / 2.0,
            end: target + metrics.height / 2.0,
            members: vec![key],
        }
    }

    pub fn count(&self) -> usize {
        self.members.len()
    }

    pub fn center(&self) -> f64 {
        (self.begin + self.end) / 2.0
    }

    /// Appends `other`'s members and re-centers on the count-weighted mean.
    fn absorb(&mut self, other: Cluster<K>, metrics: &LabelMetrics) {
        let (n_self, n_other) = (self.count() as f64, other.count() as f64);
        let middle = (n_self * self.center() + n_other * other.center()) / (n_self + n_other);
        self.members.extend(other.members);
        let span = metrics.span(self.count());
        self.begin = middle - span / 2.0;
        self.end = self.begin + span;
    }

    fn shift(&mut self, delta: f64) {
        self.begin += delta;
        self.end += delta;
    }

    /// Member centers, evenly spread over the cluster.
    pub fn centers(&self, metrics: &LabelMetrics) -> Vec<f64> {
        if self.count() == 1 {
            return vec![self.center()];
        }
        let first = self.begin + metrics.height / 2.0;
        let step = (self.end - self.begin - metrics.height) / (self.count() - 1) as f64;
        (0..self.count()).map(|i| first + step * i as f64).collect()
    }
}

fn overlaps<K>(upper: &Cluster<K>, lower: &Cluster<K>, metrics: &LabelMetrics) -> bool {
    upper.end + metrics.padding > lower.begin
}

/// Groups `items` (given top to bottom) into non-overlapping clusters.
pub fn clusters<K: Clone>(
    items: &[LayoutItem<K>],
    viewport: Viewport,
    metrics: LabelMetrics,
) -> Vec<Cluster<K>> {
    let top_limit = viewport.top - metrics.height / 2.0;
    let bottom_limit = viewport.bottom + metrics.height / 2.0;
    let mut cs: Vec<Cluster<K>> = Vec::with_capacity(items.len());

    for item in items {
        cs.push(Cluster::singleton(item.key.clone(), item.target, &metrics));

        while cs.len() > 1 && overlaps(&cs[cs.len() - 2], &cs[cs.len() - 1], &metrics) {
            merge_last(&mut cs, &metrics);
        }

        if let Some(last) = cs.last_mut()
            && last.begin < top_limit
        {
            last.shift(top_limit - last.begin);
        }
    }

    while let Some(last) = cs.last_mut()
        && last.end > bottom_limit
    {
        last.shift(bottom_limit - last.end);
        if cs.len() > 1 && overlaps(&cs[cs.len() - 2], &cs[cs.len() - 1], &metrics) {
            merge_last(&mut cs, &metrics);
        }
    }

    // Not enough room for everything: squeeze the first cluster.
    if let Some(first) = cs.first_mut()
        && first.begin < top_limit
    {
        first.begin = top_limit;
    }

    cs
}

fn merge_last<K>(cs: &mut Vec<Cluster<K>>, metrics: &LabelMetrics) {
    if let Some(last) = cs.pop()
        && let Some(previous) = cs.last_mut()
    {
        previous.absorb(last, metrics);
    }
}

/// Label center for every item, in input order.
pub fn layout<K: Clone>(
    items: &[LayoutItem<K>],
    viewport: Viewport,
    metrics: LabelMetrics,
) -> Vec<PlacedLabel<K>> {
    clusters(items, viewport, metrics)
        .into_iter()
        .flat_map(|cluster| {
            let centers = cluster.centers(&metrics);
            cluster
                .members
                .into_iter()
                .zip(centers)
                .map(|(key, center)| PlacedLabel { key, center })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-6;

    fn items(targets: &[f64]) -> Vec<LayoutItem<usize>> {
        targets
            .iter()
            .enumerate()
            .map(|(key, target)| LayoutItem {
                key,
                target: *target,
            })
            .collect()
    }

    fn centers(placed: &[PlacedLabel<usize>]) -> Vec<f64> {
        placed.iter().map(|label| label.center).collect()
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < EPS, "{actual:?} vs {expected:?}");
        }
    }

    const METRICS: LabelMetrics = LabelMetrics {
        height: 10.0,
        padding: 2.0,
    };

    #[test]
    fn five_markers_form_two_clusters() {
        let viewport = Viewport {
            top: 0.0,
            bottom: 100.0,
        };
        let input = items(&[10.0, 12.0, 14.0, 50.0, 52.0]);

        let cs = clusters(&input, viewport, METRICS);
        assert_eq!(cs.len(), 2);
        assert_eq!(cs[0].members, vec![0, 1, 2]);
        assert_eq!(cs[1].members, vec![3, 4]);
        assert!(cs[0].end + METRICS.padding <= cs[1].begin);

        let placed = layout(&input, viewport, METRICS);
        assert_close(&centers(&placed), &[0.0, 12.0, 24.0, 45.0, 57.0]);
    }

    #[test]
    fn empty_input_places_nothing() {
        let viewport = Viewport {
            top: 0.0,
            bottom: 0.0,
        };
        assert!(layout::<usize>(&[], viewport, METRICS).is_empty());
    }

    #[test]
    fn separated_markers_keep_their_targets() {
        let viewport = Viewport {
            top: 0.0,
            bottom: 100.0,
        };
        let placed = layout(&items(&[10.0, 40.0, 90.0]), viewport, METRICS);
        assert_close(&centers(&placed), &[10.0, 40.0, 90.0]);
    }

    #[test]
    fn top_overflow_shifts_down() {
        let viewport = Viewport {
            top: 20.0,
            bottom: 200.0,
        };
        let placed = layout(&items(&[0.0, 60.0]), viewport, METRICS);
        assert_close(&centers(&placed), &[20.0, 60.0]);
    }

    #[test]
    fn bottom_overflow_shifts_up_and_merges() {
        let viewport = Viewport {
            top: 0.0,
            bottom: 100.0,
        };
        let placed = layout(&items(&[80.0, 95.0, 100.0, 100.0]), viewport, METRICS);
        // Four labels packed against the bottom edge.
        assert_close(&centers(&placed), &[64.0, 76.0, 88.0, 100.0]);
    }

    #[test]
    fn over_capacity_compresses_first_cluster() {
        let viewport = Viewport {
            top: 0.0,
            bottom: 20.0,
        };
        let placed = layout(&items(&[10.0, 10.0, 10.0, 10.0]), viewport, METRICS);
        assert_close(
            &centers(&placed),
            &[0.0, 20.0 / 3.0, 40.0 / 3.0, 20.0],
        );
    }

    #[test]
    fn layout_is_idempotent() {
        let viewport = Viewport {
            top: 5.0,
            bottom: 80.0,
        };
        let input = items(&[3.0, 4.0, 30.0, 31.0, 79.0, 90.0]);
        assert_eq!(layout(&input, viewport, METRICS), layout(&input, viewport, METRICS));
    }

    fn arb_case() -> impl Strategy<Value = (Vec<f64>, Viewport, LabelMetrics)> {
        (0.0f64..100.0, 0.0f64..300.0, 1.0f64..30.0, 0.0f64..6.0).prop_flat_map(
            |(top, height, label, padding)| {
                let bottom = top + height;
                proptest::collection::vec(top - 40.0..bottom + 40.0, 0..14).prop_map(
                    move |mut targets| {
                        targets.sort_by(|a, b| a.total_cmp(b));
                        (
                            targets,
                            Viewport { top, bottom },
                            LabelMetrics {
                                height: label,
                                padding,
                            },
                        )
                    },
                )
            },
        )
    }

    proptest! {
        #[test]
        fn layout_invariants((targets, viewport, metrics) in arb_case()) {
            let input = items(&targets);
            let cs = clusters(&input, viewport, metrics);
            let placed = layout(&input, viewport, metrics);

            let keys: Vec<usize> = placed.iter().map(|label| label.key).collect();
            prop_assert_eq!(keys, (0..targets.len()).collect::<Vec<_>>());

            for pair in cs.windows(2) {
                prop_assert!(pair[1].begin - pair[0].end >= metrics.padding - EPS);
            }

            for label in &placed {
                prop_assert!(label.center >= viewport.top - EPS);
                prop_assert!(label.center <= viewport.bottom + EPS);
            }

            let demand = metrics.span(targets.len());
            let capacity = viewport.bottom - viewport.top + metrics.height;
            if demand <= capacity - EPS {
                for pair in placed.windows(2) {
                    prop_assert!(pair[1].center - pair[0].center >= metrics.height + metrics.padding - EPS);
                }
            }
        }
    }
}
