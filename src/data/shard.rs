use std::ops::Range;

/// Splits `total` samples among `shards` workers and returns the range owned by `index`.
///
/// Ranges are contiguous, disjoint and cover `0..total`; their sizes differ by at most one.
/// Pass uneven totals through `shard_ranges_weighted` when shards should own different volumes.
///
/// # Panics
/// If `shards` is zero or `index >= shards`.
pub fn shard_range(total: usize, index: usize, shards: usize) -> Range<usize> {
    assert!(shards > 0, "there must be at least one shard");
    assert!(index < shards, "shard index out of range");

    let base = total / shards;
    let rem = total % shards;

    let start = index * base + index.min(rem);
    let end = start + base + usize::from(index < rem);
    start..end
}

/// Splits `total` samples into contiguous ranges proportional to `parts`.
///
/// Used to hand workers deliberately imbalanced shards. The last range absorbs rounding.
///
/// # Panics
/// If `parts` is empty or sums to zero.
pub fn shard_ranges_weighted(total: usize, parts: &[usize]) -> Vec<Range<usize>> {
    let sum: usize = parts.iter().sum();
    assert!(sum > 0, "shard parts must not sum to zero");

    let mut start = 0;
    let mut ranges = Vec::with_capacity(parts.len());

    for (i, &part) in parts.iter().enumerate() {
        let end = if i + 1 == parts.len() {
            total
        } else {
            (start + total * part / sum).min(total)
        };

        ranges.push(start..end);
        start = end;
    }

    ranges
}
