use std::collections::BinaryHeap;
use std::ops::Range;

use anyhow::{ensure, Result};
use config::search_params::{PruningParams, SearchParams};

use crate::index::SearchResult;
use crate::posting_list::PostingLists;
use crate::utils::{IdWithScore, SearchContext};

/// Keeps the `num_probes` lists with the smallest coarse distance, sorted ascending.
/// Asking for more lists than exist probes all of them.
pub fn select_nearest_lists(mut coarse: Vec<(usize, f32)>, num_probes: usize) -> Vec<(usize, f32)> {
    let num_probes = num_probes.min(coarse.len());
    if num_probes == 0 {
        return Vec::new();
    }
    coarse.select_nth_unstable_by(num_probes - 1, |a, b| a.1.total_cmp(&b.1));
    coarse.truncate(num_probes);
    coarse.sort_by(|a, b| a.1.total_cmp(&b.1));
    coarse
}

/// Range of list offsets to scan for a predicted radius, or `None` when the list is skipped.
///
/// The list is seen as `num_segments` segments of its sorted members. The window is centered
/// on the query's coarse distance relative to the farthest member, shifted towards the head by
/// `window_offset` segments, and spans `radius` segments on each side.
pub fn pruning_window(
    coarse_distance: f32,
    max_distance: f32,
    len: usize,
    radius: u32,
    pruning: &PruningParams,
) -> Option<Range<usize>> {
    if radius == 0 {
        return None;
    }
    let radius = radius.max(pruning.cut);

    // All members sit on the centroid, nothing to position the window against.
    if max_distance <= 0.0 {
        return Some(0..len);
    }

    let segments = pruning.num_segments as f32;
    let relative_distance = coarse_distance / max_distance;
    let radius_fraction = radius as f32 / segments;
    let shift = pruning.window_offset / segments;
    let left = (relative_distance - radius_fraction - shift).clamp(0.0, 1.0);
    let right = (relative_distance + radius_fraction - shift).clamp(0.0, 1.0);
    Some((left * len as f32) as usize..(right * len as f32) as usize)
}

/// Scans the probed lists in order and keeps the `top_k` best candidates. With a radius
/// prediction only the window of each list is scanned.
pub fn scan_lists<T, S>(
    lists: &PostingLists<T>,
    probes: &[(usize, f32)],
    radius: Option<(&[u32], &PruningParams)>,
    top_k: usize,
    score: S,
    context: &mut SearchContext,
) -> Result<Vec<IdWithScore>>
where
    T: Copy,
    S: Fn(&[T]) -> f32,
{
    let mut heap = BinaryHeap::with_capacity(top_k + 1);
    for &(list_id, coarse_distance) in probes {
        let list = lists.get(list_id)?;
        let range = match radius {
            None => 0..list.len(),
            Some((pred_radius, pruning)) => match pruning_window(
                coarse_distance,
                list.max_distance(),
                list.len(),
                pred_radius[list_id],
                pruning,
            ) {
                Some(range) => range,
                None => {
                    context.skipped_lists.push(list_id);
                    continue;
                }
            },
        };

        context.probed_lists.push(list_id);
        context.num_scanned += range.len();
        for offset in range {
            let candidate = IdWithScore {
                score: score(list.member(offset)),
                id: list.ids()[offset],
            };
            if heap.len() < top_k {
                heap.push(candidate);
            } else if let Some(max) = heap.peek() {
                if candidate < *max {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }
    }

    // Convert heap to a sorted vector in ascending order.
    let mut results: Vec<IdWithScore> = heap.into_vec();
    results.sort();
    Ok(results)
}

/// Preconditions shared by every index query.
pub(crate) fn check_query(
    is_ready: bool,
    dimension: usize,
    num_vectors: usize,
    query: &[f32],
    params: &SearchParams,
) -> Result<()> {
    ensure!(is_ready, "index must be trained and populated before querying");
    ensure!(
        query.len() == dimension,
        "query has dimension {}, expected {}",
        query.len(),
        dimension
    );
    params.validate()?;
    ensure!(
        params.top_k <= num_vectors,
        "top_k ({}) exceeds the number of indexed vectors ({})",
        params.top_k,
        num_vectors
    );
    ensure!(
        params.max_candidates() <= num_vectors,
        "max_candidates ({}) exceeds the number of indexed vectors ({})",
        params.max_candidates(),
        num_vectors
    );
    Ok(())
}

pub(crate) fn check_radius(
    pred_radius: &[u32],
    num_lists: usize,
    pruning: &PruningParams,
) -> Result<()> {
    ensure!(
        pred_radius.len() == num_lists,
        "got {} predicted radii for {} posting lists",
        pred_radius.len(),
        num_lists
    );
    pruning.validate()
}

/// Coarse step, probing and scan of one query. `coarse` holds the distance from the query to
/// every centroid.
pub(crate) fn run_search<T, S>(
    lists: &PostingLists<T>,
    coarse: Vec<(usize, f32)>,
    params: &SearchParams,
    radius: Option<(&[u32], &PruningParams)>,
    score: S,
    context: &mut SearchContext,
) -> Result<SearchResult>
where
    T: Copy,
    S: Fn(&[T]) -> f32,
{
    let probes = select_nearest_lists(coarse, params.num_probes);
    let results = scan_lists(lists, &probes, radius, params.top_k, score, context)?;
    Ok(results.into())
}

/// Where the true neighbors of a query sit inside one probed list.
#[derive(Debug, Clone, PartialEq)]
pub struct HitWindow {
    pub list: usize,

    // Coarse distance of the query over the list's farthest member distance
    pub relative_coarse_distance: f32,

    // Coarse distance of the query over its distance to the nearest list
    pub relative_to_nearest_list: f32,

    pub hits: usize,

    // Offsets of the first and last hit as fractions of the list length
    pub window: Option<(f32, f32)>,

    /// Radius label for this list, `ceil(num_segments * (last - first) / len + 1e-6)`, or 0
    /// without hits. This is the value a radius predictor is trained to output.
    pub radius: u32,
}

/// Records, for every probed list, the fractional window covering the ground-truth neighbors it
/// contains. These observations are the training data of a radius predictor. `probes` must
/// contain the nearest list, as `select_nearest_lists` guarantees.
pub fn observe_hit_windows<T: Copy>(
    lists: &PostingLists<T>,
    probes: &[(usize, f32)],
    ground_truth: &[usize],
    pruning: &PruningParams,
) -> Result<Vec<HitWindow>> {
    pruning.validate()?;
    let nearest = probes
        .iter()
        .map(|&(_, distance)| distance)
        .fold(f32::INFINITY, f32::min);

    let mut observations = Vec::with_capacity(probes.len());
    for &(list_id, coarse_distance) in probes {
        let list = lists.get(list_id)?;
        let offsets: Vec<usize> = list
            .ids()
            .iter()
            .enumerate()
            .filter(|(_, id)| ground_truth.contains(*id))
            .map(|(offset, _)| offset)
            .collect();
        let len = list.len();
        let (window, radius) = match (offsets.first(), offsets.last()) {
            (Some(&first), Some(&last)) => {
                let width = (last - first) as f64 / len as f64;
                (
                    Some((first as f32 / len as f32, last as f32 / len as f32)),
                    (pruning.num_segments as f64 * width + 1e-6).ceil() as u32,
                )
            }
            _ => (None, 0),
        };
        let max_distance = list.max_distance();
        observations.push(HitWindow {
            list: list_id,
            relative_coarse_distance: if max_distance > 0.0 {
                coarse_distance / max_distance
            } else {
                0.0
            },
            relative_to_nearest_list: if nearest > 0.0 {
                coarse_distance / nearest
            } else if coarse_distance > 0.0 {
                f32::INFINITY
            } else {
                1.0
            },
            hits: offsets.len(),
            window,
            radius,
        });
    }
    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting_list::PostingList;

    // One list of 10 members at distances 0..10 from the centroid, payload is the distance.
    fn single_list() -> PostingLists<f32> {
        let rows: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let members = (0..10).map(|i| (i, i as f32)).collect();
        PostingLists::new(vec![PostingList::from_members(1, members, |i| {
            &rows[i..i + 1]
        })])
    }

    #[test]
    fn test_select_nearest_lists() {
        let coarse = vec![(0, 5.0), (1, 1.0), (2, 3.0), (3, 0.5), (4, 9.0)];
        let probes = select_nearest_lists(coarse.clone(), 3);
        assert_eq!(probes, vec![(3, 0.5), (1, 1.0), (2, 3.0)]);
        assert_eq!(select_nearest_lists(coarse.clone(), 10).len(), 5);
        assert!(select_nearest_lists(coarse, 0).is_empty());
    }

    #[test]
    fn test_pruning_window() {
        let pruning = PruningParams::default();

        // Zero radius skips the list
        assert_eq!(pruning_window(1.0, 1.0, 100, 0, &pruning), None);

        // cq = 0.5, r = 2/20, shift = 3.5/20: [0.225, 0.425]
        assert_eq!(pruning_window(5.0, 10.0, 100, 2, &pruning), Some(22..42));

        // Clamped at both ends
        assert_eq!(pruning_window(0.0, 10.0, 100, 1, &pruning), Some(0..0));
        assert_eq!(pruning_window(100.0, 10.0, 100, 1, &pruning), Some(100..100));
        assert_eq!(pruning_window(5.0, 10.0, 100, 40, &pruning), Some(0..100));

        // Degenerate list scans everything
        assert_eq!(pruning_window(5.0, 0.0, 7, 1, &pruning), Some(0..7));
    }

    #[test]
    fn test_pruning_window_cut() {
        let pruning = PruningParams::default().with_cut(4);
        // Radius 1 is raised to 4: [0.5 - 0.2 - 0.175, 0.5 + 0.2 - 0.175]
        assert_eq!(
            pruning_window(5.0, 10.0, 100, 1, &pruning),
            pruning_window(5.0, 10.0, 100, 4, &pruning)
        );
        assert_eq!(pruning_window(5.0, 10.0, 100, 0, &pruning), None);
        // Above the cut the radius is left alone
        assert_ne!(
            pruning_window(5.0, 10.0, 100, 5, &pruning),
            pruning_window(5.0, 10.0, 100, 4, &pruning)
        );
    }

    #[test]
    fn test_scan_lists_baseline_and_pruned() {
        let lists = single_list();
        let probes = vec![(0, 5.0)];

        let mut context = SearchContext::new();
        let all = scan_lists(&lists, &probes, None, 10, |v| v[0], &mut context).unwrap();
        assert_eq!(all.len(), 10);
        assert_eq!(context.num_scanned, 10);
        assert_eq!(context.probed_lists, vec![0]);

        let mut context = SearchContext::new();
        let top = scan_lists(&lists, &probes, None, 3, |v| v[0], &mut context).unwrap();
        assert_eq!(top.iter().map(|c| c.id).collect::<Vec<_>>(), vec![0, 1, 2]);

        // max distance 9, cq = 5/9, window of radius 4 segments
        let pruning = PruningParams::default();
        let radius: &[u32] = &[4];
        let mut context = SearchContext::new();
        let pruned = scan_lists(
            &lists,
            &probes,
            Some((radius, &pruning)),
            10,
            |v| v[0],
            &mut context,
        )
        .unwrap();
        assert!(pruned.len() < all.len());
        assert_eq!(context.num_scanned, pruned.len());
        assert!(pruned.iter().all(|c| all.contains(c)));

        let radius: &[u32] = &[0];
        let mut context = SearchContext::new();
        let skipped = scan_lists(
            &lists,
            &probes,
            Some((radius, &pruning)),
            10,
            |v| v[0],
            &mut context,
        )
        .unwrap();
        assert!(skipped.is_empty());
        assert_eq!(context.skipped_lists, vec![0]);
        assert!(context.probed_lists.is_empty());
    }

    #[test]
    fn test_check_query_preconditions() {
        let params = SearchParams::new(5, 2);
        assert!(check_query(true, 4, 10, &[0.0; 4], &params).is_ok());
        assert!(check_query(false, 4, 10, &[0.0; 4], &params).is_err());
        assert!(check_query(true, 4, 10, &[0.0; 3], &params).is_err());
        assert!(check_query(true, 4, 4, &[0.0; 4], &params).is_err());
        let params = params.with_max_candidates(Some(20));
        assert!(check_query(true, 4, 10, &[0.0; 4], &params).is_err());

        let pruning = PruningParams::default();
        assert!(check_radius(&[1, 2], 2, &pruning).is_ok());
        assert!(check_radius(&[1], 2, &pruning).is_err());
    }

    #[test]
    fn test_observe_hit_windows() {
        let lists = single_list();
        let pruning = PruningParams::default();
        let observations =
            observe_hit_windows(&lists, &[(0, 4.5)], &[2, 5, 42], &pruning).unwrap();
        assert_eq!(
            observations,
            vec![HitWindow {
                list: 0,
                relative_coarse_distance: 0.5,
                relative_to_nearest_list: 1.0,
                hits: 2,
                window: Some((0.2, 0.5)),
                // 20 segments * 0.3 = 6, bumped past the integer
                radius: 7,
            }]
        );

        let observations = observe_hit_windows(&lists, &[(0, 4.5)], &[42], &pruning).unwrap();
        assert_eq!(observations[0].hits, 0);
        assert_eq!(observations[0].window, None);
        assert_eq!(observations[0].radius, 0);

        // A single hit gets the smallest non-zero radius
        let observations = observe_hit_windows(&lists, &[(0, 4.5)], &[3], &pruning).unwrap();
        assert_eq!(observations[0].radius, 1);
    }

    #[test]
    fn test_observe_hit_windows_relative_to_nearest() {
        let rows: Vec<f32> = (0..20).map(|i| i as f32).collect();
        let lists = PostingLists::new(vec![
            PostingList::from_members(1, (0..10).map(|i| (i, i as f32)).collect(), |i| {
                &rows[i..i + 1]
            }),
            PostingList::from_members(1, (10..20).map(|i| (i, 1.0)).collect(), |i| {
                &rows[i..i + 1]
            }),
        ]);
        let pruning = PruningParams {
            num_segments: 10,
            ..Default::default()
        };
        let observations =
            observe_hit_windows(&lists, &[(1, 2.0), (0, 6.0)], &[10, 19, 4], &pruning).unwrap();

        assert_eq!(observations[0].list, 1);
        assert_eq!(observations[0].relative_to_nearest_list, 1.0);
        assert_eq!(observations[0].relative_coarse_distance, 2.0);
        assert_eq!(observations[0].radius, 10);

        assert_eq!(observations[1].list, 0);
        assert_eq!(observations[1].relative_to_nearest_list, 3.0);
        assert_eq!(observations[1].window, Some((0.4, 0.4)));
        assert_eq!(observations[1].radius, 1);

        // The query sits on a centroid
        let observations =
            observe_hit_windows(&lists, &[(1, 0.0), (0, 6.0)], &[4], &pruning).unwrap();
        assert_eq!(observations[0].relative_to_nearest_list, 1.0);
        assert_eq!(observations[1].relative_to_nearest_list, f32::INFINITY);
    }
}
