use mlw_core::rng::RngHandle;
use rand::seq::SliceRandom;

/// Shuffles `0..len` with a seeded RNG and returns `(train, test)` index
/// sets. The test set holds `ceil(len * test_size)` rows.
pub fn train_test_split(len: usize, test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..len).collect();
    let mut rng = RngHandle::from_seed(seed);
    indices.shuffle(&mut rng);
    // tolerance keeps 10 * 0.3 at 3 rows
    let test_len = ((len as f64) * test_size.clamp(0.0, 1.0) - 1e-9).ceil().max(0.0) as usize;
    let test = indices.split_off(len - test_len.min(len));
    (indices, test)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_is_a_seeded_partition() {
        let (train, test) = train_test_split(10, 0.3, 7);
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 7);
        let mut all: Vec<_> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
        assert_eq!(train_test_split(10, 0.3, 7), (train, test));
    }
}
