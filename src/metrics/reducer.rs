//! Post-run statistics over unordered series.
//!
//! Percentiles use the nearest-rank rule `rank = floor(k * n)` on a
//! zero-indexed slice, with no interpolation. Downstream summaries were
//! produced with this exact rule, so it must not be swapped for an
//! interpolating definition.

use std::cmp::Ordering;

/// Interquartile-range multiplier for the outlier fences.
pub const IQR_FENCE: f64 = 1.5;

/// Nearest-rank percentile of an already sorted slice.
///
/// `k` is clamped to `[0, 1]` and the rank to the last element, so
/// `percentile(1.0, ..)` is the final element instead of running off the end.
/// Returns `None` for an empty slice.
pub fn percentile<T>(k: f64, sorted: &[T]) -> Option<&T> {
    if sorted.is_empty() {
        return None;
    }
    let k = if k.is_nan() { 0.0 } else { k.clamp(0.0, 1.0) };
    let rank = (k * sorted.len() as f64).floor() as usize;
    sorted.get(rank.min(sorted.len() - 1))
}

/// Split `items` in two by `pred`, keeping the input order on both sides.
pub fn partition<T: Clone, F>(items: &[T], mut pred: F) -> (Vec<T>, Vec<T>)
where
    F: FnMut(&T) -> bool,
{
    let mut hit = Vec::new();
    let mut miss = Vec::new();
    for item in items {
        if pred(item) {
            hit.push(item.clone());
        } else {
            miss.push(item.clone());
        }
    }
    (hit, miss)
}

/// Lower and upper Tukey fences for the keys of `items`.
///
/// Keys are sorted descending before the quartiles are picked, so `q1` is
/// read at rank `floor(0.25 n)` of the descending order and `q3` at rank
/// `floor(0.75 n)`. `None` when there is nothing to fence.
pub fn fences<T, K>(items: &[T], key: K) -> Option<(f64, f64)>
where
    K: Fn(&T) -> f64,
{
    let mut keys: Vec<f64> = items.iter().map(&key).collect();
    keys.sort_by(|a, b| b.total_cmp(a));

    let q1 = *percentile(0.25, &keys)?;
    let q3 = *percentile(0.75, &keys)?;
    let iqr = (q3 - q1).abs();

    Some((q1 - IQR_FENCE * iqr, q3 + IQR_FENCE * iqr))
}

/// Returns the outliers of `items`: every element whose key lies strictly
/// outside `[lower, upper]`.
///
/// Note the name: this *extracts* the outliers, it does not drop them.
/// Use [`reject_outliers`] to keep the normal range instead.
pub fn remove_outliers<T: Clone, K>(items: &[T], key: K) -> Vec<T>
where
    K: Fn(&T) -> f64,
{
    split_outliers(items, key).0
}

/// The complement of [`remove_outliers`]: the elements inside the fences.
pub fn reject_outliers<T: Clone, K>(items: &[T], key: K) -> Vec<T>
where
    K: Fn(&T) -> f64,
{
    split_outliers(items, key).1
}

/// `(outliers, inliers)` in one pass over the fences.
pub fn split_outliers<T: Clone, K>(items: &[T], key: K) -> (Vec<T>, Vec<T>)
where
    K: Fn(&T) -> f64,
{
    let Some((lower, upper)) = fences(items, &key) else {
        return (Vec::new(), Vec::new());
    };

    partition(items, |item| {
        let k = key(item);
        k.total_cmp(&lower) == Ordering::Less || k.total_cmp(&upper) == Ordering::Greater
    })
}

/// Sort a copy of `values` ascending (NaN last) and take its nearest-rank percentile.
pub fn percentile_of(k: f64, values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile(k, &sorted).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rank_median() {
        assert_eq!(percentile(0.5, &[1, 2, 3, 4, 5]), Some(&3));
    }

    #[test]
    fn percentile_edges() {
        let empty: [u32; 0] = [];
        assert_eq!(percentile(0.5, &empty), None);
        assert_eq!(percentile(0.0, &[7, 8, 9]), Some(&7));
        assert_eq!(percentile(1.0, &[7, 8, 9]), Some(&9));
        assert_eq!(percentile(2.5, &[7, 8, 9]), Some(&9));
        assert_eq!(percentile(-1.0, &[7, 8, 9]), Some(&7));
        // floor(0.99 * 10) = 9 → last element, no interpolation
        let ten: Vec<u32> = (1..=10).collect();
        assert_eq!(percentile(0.99, &ten), Some(&10));
        assert_eq!(percentile(0.25, &ten), Some(&3));
    }

    #[test]
    fn isolates_the_spike() {
        let keys = [1.0, 2.0, 3.0, 4.0, 5.0, 100.0];
        assert_eq!(remove_outliers(&keys, |v| *v), vec![100.0]);
        assert_eq!(reject_outliers(&keys, |v| *v), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn filtered_series_has_no_outliers() {
        let keys = [1.0, 2.0, 3.0, 4.0, 5.0, 100.0];
        let clean = reject_outliers(&keys, |v| *v);
        assert!(remove_outliers(&clean, |v| *v).is_empty());
    }

    #[test]
    fn fences_follow_descending_quartiles() {
        let (lower, upper) = fences(&[1.0, 2.0, 3.0, 4.0, 5.0, 100.0], |v| *v).unwrap();
        assert_eq!(lower, 0.5);
        assert_eq!(upper, 6.5);
    }

    #[test]
    fn outliers_keep_input_order_and_use_key() {
        let samples = [("a", 900.0), ("b", 10.0), ("c", 11.0), ("d", 12.0), ("e", 10.5), ("f", -800.0)];
        let outliers = remove_outliers(&samples, |s| s.1);
        let names: Vec<_> = outliers.iter().map(|s| s.0).collect();
        assert_eq!(names, vec!["a", "f"]);
    }

    #[test]
    fn empty_and_single() {
        let empty: [f64; 0] = [];
        assert!(remove_outliers(&empty, |v| *v).is_empty());
        assert!(remove_outliers(&[42.0], |v| *v).is_empty());
    }

    #[test]
    fn partition_keeps_order() {
        let (even, odd) = partition(&[1, 2, 3, 4, 5, 6], |v| v % 2 == 0);
        assert_eq!(even, vec![2, 4, 6]);
        assert_eq!(odd, vec![1, 3, 5]);
    }

    #[test]
    fn percentile_of_unsorted() {
        assert_eq!(percentile_of(0.5, &[5.0, 1.0, 4.0, 2.0, 3.0]), Some(3.0));
        assert_eq!(percentile_of(0.5, &[]), None);
    }
}
