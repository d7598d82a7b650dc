//! Sample workload: a batch of integer lists for the tracer to observe.

/// Allocate `rows` vectors, each holding `0..cols`.
///
/// Every row is one heap block of `cols * 8` bytes, attributed to the
/// `push` line below; the outer vector is one more block.
#[must_use]
pub fn allocate_lists(rows: usize, cols: usize) -> Vec<Vec<u64>> {
    let mut data = Vec::with_capacity(rows);
    for _ in 0..rows {
        data.push((0..cols as u64).collect::<Vec<u64>>());
    }
    data
}
