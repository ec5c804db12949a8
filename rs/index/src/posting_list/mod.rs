use anyhow::{ensure, Result};
use log::debug;

/// Members of one coarse centroid. `ids`, `dist_to_center` and the payload rows are aligned and
/// sorted ascending by distance to the centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct PostingList<T> {
    ids: Vec<usize>,
    dist_to_center: Vec<f32>,

    // Flattened, `width` values per member
    payload: Vec<T>,
    width: usize,
}

impl<T: Copy> PostingList<T> {
    pub fn new(width: usize) -> Self {
        Self {
            ids: Vec::new(),
            dist_to_center: Vec::new(),
            payload: Vec::new(),
            width,
        }
    }

    /// Builds a list from `(id, distance)` members, sorting them and copying each member's
    /// payload row in the sorted order. Equal distances are ordered by id.
    pub fn from_members<'a, F>(width: usize, mut members: Vec<(usize, f32)>, row: F) -> Self
    where
        F: Fn(usize) -> &'a [T],
        T: 'a,
    {
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        let mut list = Self::new(width);
        list.ids.reserve_exact(members.len());
        list.dist_to_center.reserve_exact(members.len());
        list.payload.reserve_exact(members.len() * width);
        for (id, distance) in members {
            list.ids.push(id);
            list.dist_to_center.push(distance);
            list.payload.extend_from_slice(row(id));
        }
        list
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    pub fn distances(&self) -> &[f32] {
        &self.dist_to_center
    }

    /// Distance of the farthest member, 0 for an empty list.
    pub fn max_distance(&self) -> f32 {
        self.dist_to_center.last().copied().unwrap_or(0.0)
    }

    pub fn get_member(&self, offset: usize) -> Result<&[T]> {
        ensure!(
            offset < self.len(),
            "offset {} out of range for posting list of length {}",
            offset,
            self.len()
        );
        Ok(self.member(offset))
    }

    /// Unchecked accessor for scans that already iterate within `0..len()`.
    #[inline]
    pub(crate) fn member(&self, offset: usize) -> &[T] {
        &self.payload[offset * self.width..(offset + 1) * self.width]
    }

    pub fn is_sorted(&self) -> bool {
        self.dist_to_center.windows(2).all(|w| w[0] <= w[1])
    }

    /// Distance to the centroid at the start of each of `num_segments` equal segments. This is
    /// the per-list feature a radius predictor is trained on. Empty for an empty list.
    pub fn distance_profile(&self, num_segments: usize) -> Vec<f32> {
        if self.is_empty() || num_segments == 0 {
            return Vec::new();
        }
        let step = self.len() / num_segments;
        (0..num_segments)
            .map(|i| self.dist_to_center[i * step])
            .collect()
    }
}

/// All posting lists of an index, one per coarse centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct PostingLists<T> {
    lists: Vec<PostingList<T>>,
}

impl<T: Copy> PostingLists<T> {
    pub fn new(lists: Vec<PostingList<T>>) -> Self {
        Self { lists }
    }

    pub fn num_lists(&self) -> usize {
        self.lists.len()
    }

    /// Total number of members across lists.
    pub fn num_members(&self) -> usize {
        self.lists.iter().map(|l| l.len()).sum()
    }

    pub fn get(&self, list: usize) -> Result<&PostingList<T>> {
        ensure!(
            list < self.lists.len(),
            "posting list {} out of range ({} lists)",
            list,
            self.lists.len()
        );
        Ok(&self.lists[list])
    }

    pub fn get_member(&self, list: usize, offset: usize) -> Result<&[T]> {
        self.get(list)?.get_member(offset)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PostingList<T>> {
        self.lists.iter()
    }

    /// Checks that the lists partition `0..num_items`: every id appears exactly once.
    pub fn check_partition(&self, num_items: usize) -> Result<()> {
        let mut seen = vec![false; num_items];
        for (list_id, list) in self.lists.iter().enumerate() {
            for &id in list.ids() {
                ensure!(id < num_items, "list {} holds unknown id {}", list_id, id);
                ensure!(!seen[id], "id {} appears in more than one list", id);
                seen[id] = true;
            }
        }
        ensure!(
            seen.iter().all(|&s| s),
            "{} ids are not in any list",
            seen.iter().filter(|&&s| !s).count()
        );
        Ok(())
    }

    pub fn log_statistics(&self) {
        let sizes: Vec<usize> = self.lists.iter().map(|l| l.len()).collect();
        let min = sizes.iter().min().copied().unwrap_or(0);
        let max = sizes.iter().max().copied().unwrap_or(0);
        let empty = sizes.iter().filter(|&&s| s == 0).count();
        debug!(
            "{} posting lists, {} members, sizes min {} / max {} / avg {:.1}, {} empty",
            sizes.len(),
            self.num_members(),
            min,
            max,
            self.num_members() as f64 / sizes.len().max(1) as f64,
            empty
        );
    }
}
