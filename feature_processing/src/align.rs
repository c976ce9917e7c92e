/// Backward as-of join: for every base timestamp, the index of the latest bar whose
/// effective time is `<= t`, or `None` while no bar has completed yet.
///
/// Both slices must be sorted ascending.
pub fn asof_indices(base_times: &[i64], effective_times: &[i64]) -> Vec<Option<usize>> {
    base_times
        .iter()
        .map(|t| match effective_times.partition_point(|e| e <= t) {
            0 => None,
            n => Some(n - 1),
        })
        .collect()
}

/// Project per-bar values onto the base cadence, using `neutral` before the first completed bar.
pub fn align_values<T: Copy>(indices: &[Option<usize>], values: &[T], neutral: T) -> Vec<T> {
    indices
        .iter()
        .map(|idx| idx.map_or(neutral, |i| values[i]))
        .collect()
}
