use anyhow::{ensure, Result};
use log::debug;
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::posting_list::{PostingList, PostingLists};

/// Builds posting lists in two passes. First every item is assigned to a list in parallel and
/// its id appended under that list's lock. Then each list is finalized on its own: member
/// distances are computed, members sorted ascending and their payload rows copied in order.
///
/// `assign(item)` returns the list of an item, `distance(list, item)` its distance to the
/// list's centroid, and `payload` holds `width` values per item.
pub fn build_posting_lists<T, A, D>(
    num_lists: usize,
    payload: &[T],
    width: usize,
    assign: A,
    distance: D,
) -> Result<PostingLists<T>>
where
    T: Copy + Send + Sync,
    A: Fn(usize) -> Result<usize> + Sync,
    D: Fn(usize, usize) -> f32 + Sync,
{
    ensure!(width > 0, "payload width must be positive");
    ensure!(
        payload.len() % width == 0,
        "payload length {} is not a multiple of width {}",
        payload.len(),
        width
    );
    let num_items = payload.len() / width;

    let members: Vec<Mutex<Vec<usize>>> = (0..num_lists).map(|_| Mutex::new(Vec::new())).collect();
    (0..num_items).into_par_iter().try_for_each(|item| {
        let list = assign(item)?;
        ensure!(
            list < num_lists,
            "item {} assigned to list {} of {}",
            item,
            list,
            num_lists
        );
        members[list].lock().push(item);
        Ok(())
    })?;

    let lists = members
        .into_par_iter()
        .enumerate()
        .map(|(list, ids)| {
            let scored = ids
                .into_inner()
                .into_iter()
                .map(|item| (item, distance(list, item)))
                .collect::<Vec<(usize, f32)>>();
            PostingList::from_members(width, scored, |item| {
                &payload[item * width..(item + 1) * width]
            })
        })
        .collect::<Vec<PostingList<T>>>();

    debug!("Built {} posting lists over {} items", num_lists, num_items);
    let lists = PostingLists::new(lists);
    lists.log_statistics();
    Ok(lists)
}
