use std::borrow::Cow;

use anyhow::{ensure, Result};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// All ids in `0..n`, shuffled with a seeded generator.
pub fn shuffled_ids(n: usize, seed: u64) -> Vec<usize> {
    let mut ids: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    ids.shuffle(&mut rng);
    ids
}

/// Picks at most `max_rows` rows of `width` elements from a row-major buffer. When the buffer
/// already fits it is returned as is; otherwise the rows are the first `max_rows` ids of a
/// seeded shuffle, copied in shuffled order.
pub fn sample_rows<T: Clone>(
    data: &[T],
    width: usize,
    max_rows: usize,
    seed: u64,
) -> Result<Cow<'_, [T]>> {
    ensure!(width > 0, "row width must be positive");
    ensure!(
        data.len() % width == 0,
        "Data length {} is not a multiple of row width {}",
        data.len(),
        width
    );
    let num_rows = data.len() / width;
    if num_rows <= max_rows {
        return Ok(Cow::Borrowed(data));
    }

    debug!("Sampling {} of {} rows (seed {})", max_rows, num_rows, seed);
    let ids = shuffled_ids(num_rows, seed);
    let mut sample = Vec::with_capacity(max_rows * width);
    for &id in ids.iter().take(max_rows) {
        sample.extend_from_slice(&data[id * width..(id + 1) * width]);
    }
    Ok(Cow::Owned(sample))
}
