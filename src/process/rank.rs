//! Frequency ranking of dense indices.
//!
//! The pre-rank count vectors are never touched: [`rank`] produces a separate
//! permutation and [`remap`] builds new owned tables from it.

/// Count marking an entry that must not survive ranking.
pub const FILTERED: i64 = -1;

/// Computes the rank of every index, most frequent first.
///
/// Ties keep first-seen order. Entries with a negative count are filtered and
/// map to `None`; the kept entries receive the ranks `0..kept`.
///
/// # Example
///
/// ```rust
/// use chatdb::process::rank::rank;
///
/// assert_eq!(rank(&[1, 10, 5]), vec![Some(2), Some(0), Some(1)]);
/// assert_eq!(rank(&[3, -1, 7]), vec![Some(1), None, Some(0)]);
/// ```
pub fn rank(counts: &[i64]) -> Vec<Option<u32>> {
    let mut order: Vec<usize> = (0..counts.len()).filter(|&i| counts[i] >= 0).collect();
    // sort_by is stable
    order.sort_by(|&a, &b| counts[b].cmp(&counts[a]));

    let mut ranks = vec![None; counts.len()];
    for (new_index, &old_index) in order.iter().enumerate() {
        ranks[old_index] = Some(new_index as u32);
    }
    ranks
}

/// Number of entries kept by a rank permutation.
pub fn kept(ranks: &[Option<u32>]) -> usize {
    ranks.iter().filter(|r| r.is_some()).count()
}

/// Old index of every rank, the inverse of a rank permutation.
pub fn inverse(ranks: &[Option<u32>]) -> Vec<usize> {
    let mut order = vec![0; kept(ranks)];
    for (old_index, rank) in ranks.iter().enumerate() {
        if let Some(new_index) = rank {
            order[*new_index as usize] = old_index;
        }
    }
    order
}

/// Builds a new table in rank order.
///
/// `f` receives each kept value together with its old index.
pub fn remap<V, T, F>(values: &[V], ranks: &[Option<u32>], mut f: F) -> Vec<T>
where
    F: FnMut(&V, usize) -> T,
{
    let mut slots: Vec<Option<T>> = Vec::with_capacity(values.len());
    slots.resize_with(kept(ranks), || None);
    for (old_index, value) in values.iter().enumerate() {
        if let Some(Some(new_index)) = ranks.get(old_index) {
            slots[*new_index as usize] = Some(f(value, old_index));
        }
    }
    slots.into_iter().flatten().collect()
}

/// Translates `(index, count)` pairs through `ranks`, dropping filtered ones.
///
/// The result is sorted ascending by the new index.
pub fn remap_index_counts(counts: &[(u32, u32)], ranks: &[Option<u32>]) -> Vec<(u32, u32)> {
    let mut out: Vec<(u32, u32)> = counts
        .iter()
        .filter_map(|&(index, count)| {
            ranks
                .get(index as usize)
                .copied()
                .flatten()
                .map(|new_index| (new_index, count))
        })
        .collect();
    out.sort_unstable_by_key(|&(index, _)| index);
    out
}
