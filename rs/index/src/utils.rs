use std::cmp::Ordering;

/// A candidate and its squared distance to the query. Ordered by score, then id, so a
/// `BinaryHeap<IdWithScore>` keeps the worst candidate on top.
#[derive(Debug, Clone, Copy)]
pub struct IdWithScore {
    pub score: f32,
    pub id: usize,
}

impl Ord for IdWithScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for IdWithScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IdWithScore {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IdWithScore {}

/// Per-query bookkeeping filled in by the scan.
#[derive(Debug, Default, Clone)]
pub struct SearchContext {
    // Number of posting list members whose distance was evaluated
    pub num_scanned: usize,

    // Lists visited, in visiting order
    pub probed_lists: Vec<usize>,

    // Lists selected by the coarse step but skipped because their predicted radius was zero
    pub skipped_lists: Vec<usize>,
}

impl SearchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.num_scanned = 0;
        self.probed_lists.clear();
        self.skipped_lists.clear();
    }
}
