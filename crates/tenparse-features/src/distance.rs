//! Signed head-modifier distance buckets
//!
//! Distances are bucketed by magnitude into `{1, 2, 3, 4, 5, 6..=10, >10}`;
//! arcs whose modifier lies to the right of the head (`head − modifier < 0`)
//! use the upper half of the range. With `D = 7` this gives 14 directed buckets.

/// Magnitude buckets per direction
pub const MAX_DISTANCE: usize = 7;

/// Number of directed buckets (`2·D`)
pub const DIRECTED_BINS: usize = 2 * MAX_DISTANCE;

/// Zero-based directed bucket of `x = head − modifier`.
///
/// A zero distance never occurs for a real arc and is bucketed like 1.
///
/// ```
/// use tenparse_features::binned_distance;
///
/// assert_eq!(binned_distance(3), 2);
/// assert_eq!(binned_distance(-3), 9);
/// assert_eq!(binned_distance(8), 5);
/// assert_eq!(binned_distance(-40), 13);
/// ```
#[inline]
pub fn binned_distance(x: i64) -> usize {
    let offset = if x < 0 { MAX_DISTANCE } else { 0 };
    let magnitude = x.unsigned_abs();
    let bucket = match magnitude {
        0..=5 => magnitude.max(1) as usize,
        6..=10 => 6,
        _ => 7,
    };
    bucket + offset - 1
}

/// Undirected bucket in `0..D` of a directed bucket
#[inline]
pub fn magnitude_bin(directed: usize) -> usize {
    directed % MAX_DISTANCE
}

/// Directed bucket of the arc `head → modifier`
#[inline]
pub fn arc_bin(head: usize, modifier: usize) -> usize {
    binned_distance(head as i64 - modifier as i64)
}
