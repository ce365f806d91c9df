//! Label-smoothed target construction.

use crate::error::SweepError;

/// Build row-major soft targets for `indices` over `vocab_size` classes.
///
/// The true class receives `1 - smoothing + smoothing / vocab_size`, every
/// other class `smoothing / vocab_size`, so each row sums to one.
pub fn label_smoothed(
    indices: &[usize],
    vocab_size: usize,
    smoothing: f64,
) -> Result<Vec<f64>, SweepError> {
    if vocab_size == 0 {
        return Err(SweepError::shape("vocab_size must be positive"));
    }
    if !(0.0..=1.0).contains(&smoothing) {
        return Err(SweepError::config(format!(
            "label smoothing must lie in [0, 1], got {smoothing}"
        )));
    }

    let off = smoothing / vocab_size as f64;
    let mut targets = vec![off; indices.len() * vocab_size];
    for (row, &index) in indices.iter().enumerate() {
        if index >= vocab_size {
            return Err(SweepError::shape(format!(
                "target index {index} out of range for vocab size {vocab_size}"
            )));
        }
        targets[row * vocab_size + index] += 1.0 - smoothing;
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoothed_values() {
        let t = label_smoothed(&[2, 0], 4, 0.1).unwrap();
        assert_eq!(t.len(), 8);
        assert!((t[2] - (0.9 + 0.025)).abs() < 1e-12);
        assert!((t[0] - 0.025).abs() < 1e-12);
        assert!((t[4] - (0.9 + 0.025)).abs() < 1e-12);
        for row in t.chunks(4) {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_zero_smoothing_is_one_hot() {
        let t = label_smoothed(&[1], 3, 0.0).unwrap();
        assert_eq!(t, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_rejects_out_of_range_index() {
        assert!(label_smoothed(&[3], 3, 0.1).is_err());
        assert!(label_smoothed(&[0], 0, 0.1).is_err());
        assert!(label_smoothed(&[0], 3, 1.5).is_err());
    }
}
