/// Number of half-open score intervals between zero and the max score.
pub const SCORE_STEPS: usize = 15;

/// Bucket 0 holds scores of zero (or less), bucket `SCORE_STEPS + 1` holds
/// the max score, bucket `i` in between holds scores in
/// `[(i - 1) * max / SCORE_STEPS, i * max / SCORE_STEPS)`.
///
/// `max_score` must be positive.
pub fn bucket(score: f64, max_score: f64) -> usize {
    if score <= 0.0 {
        0
    } else if score >= max_score {
        SCORE_STEPS + 1
    } else {
        (score / max_score * SCORE_STEPS as f64).floor() as usize + 1
    }
}

/// Score distribution of a scope population.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreHistogram {
    counts: Vec<usize>,
    max_score: f64,
}

impl ScoreHistogram {
    pub fn empty(max_score: f64) -> Self {
        Self {
            counts: vec![0; SCORE_STEPS + 2],
            max_score,
        }
    }

    pub fn from_scores(scores: impl IntoIterator<Item = f64>, max_score: f64) -> Self {
        let mut histogram = Self::empty(max_score);
        for score in scores {
            let index = histogram.bucket_of(score);
            histogram.counts[index] += 1;
        }
        histogram
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Moves one competitor whose score went from `old` to `new`. The
    /// competitor must already be counted under `old`.
    pub fn move_score(&mut self, old: f64, new: f64) {
        let from = self.bucket_of(old);
        let to = self.bucket_of(new);
        if from == to {
            return;
        }
        debug_assert!(self.counts[from] > 0, "no competitor in bucket {from}");
        self.counts[from] = self.counts[from].saturating_sub(1);
        self.counts[to] += 1;
    }

    fn bucket_of(&self, score: f64) -> usize {
        // A scope without tasks has nothing to spread over.
        if self.max_score <= 0.0 {
            return 0;
        }
        bucket(score, self.max_score)
    }
}
