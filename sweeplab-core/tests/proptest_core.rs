//! Property-based tests for the schedule, the metric table and target smoothing.

use proptest::prelude::*;

use sweeplab_core::MetricTable;
use sweeplab_core::training::metrics::running_min_by_group;
use sweeplab_core::training::schedule::{WarmupInverseSqrt, rate};
use sweeplab_core::training::targets::label_smoothed;

// --- Rate schedule properties ---

proptest! {
    #[test]
    fn rate_step_zero_equals_step_one(
        d_model in 1.0f64..4096.0,
        factor in 0.01f64..10.0,
        warmup in 0u64..10_000,
    ) {
        prop_assert_eq!(rate(0, d_model, factor, warmup), rate(1, d_model, factor, warmup));
    }

    #[test]
    fn rate_rises_until_peak(
        d_model in 1.0f64..4096.0,
        warmup in 4u64..5_000,
        frac in 0.0f64..1.0,
    ) {
        let peak = WarmupInverseSqrt::new(d_model, 1.0, warmup).peak_step().floor() as u64;
        prop_assume!(peak >= 2);
        let step = 1 + ((peak - 2) as f64 * frac) as u64;
        prop_assert!(rate(step + 1, d_model, 1.0, warmup) > rate(step, d_model, 1.0, warmup));
    }

    #[test]
    fn rate_never_rises_after_peak(
        d_model in 1.0f64..4096.0,
        warmup in 0u64..5_000,
        offset in 0u64..100_000,
    ) {
        let peak = WarmupInverseSqrt::new(d_model, 1.0, warmup).peak_step().ceil() as u64;
        let step = peak.max(1) + offset;
        let current = rate(step, d_model, 1.0, warmup);
        let next = rate(step + 1, d_model, 1.0, warmup);
        prop_assert!(next <= current * (1.0 + 1e-12));
    }

    #[test]
    fn rate_at_step_one_matches_closed_form(
        d_model in 1.0f64..4096.0,
        factor in 0.01f64..10.0,
        warmup in 1u64..10_000,
    ) {
        let w = warmup as f64;
        let expected = factor * d_model.powf(-0.5) * f64::min(1.0, 2.0 / w.powf(1.5));
        let actual = rate(1, d_model, factor, warmup);
        prop_assert!((actual - expected).abs() <= expected * 1e-12);
    }
}

// --- Metric table properties ---

fn grouped_series() -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
    prop::collection::vec((1u8..4, 0.0f64..10.0), 0..60).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(group, value)| (group as f64, value))
            .unzip()
    })
}

proptest! {
    #[test]
    fn running_min_bounded_by_value((groups, values) in grouped_series()) {
        let mins = running_min_by_group(&groups, &values);
        prop_assert_eq!(mins.len(), values.len());
        for i in 0..values.len() {
            prop_assert!(mins[i] <= values[i]);
            if i == 0 || groups[i] != groups[i - 1] {
                prop_assert_eq!(mins[i], values[i]);
            } else {
                prop_assert!(mins[i] <= mins[i - 1]);
                prop_assert_eq!(mins[i], mins[i - 1].min(values[i]));
            }
        }
    }

    #[test]
    fn derived_columns_cover_every_row(
        rows in prop::collection::vec((1u32..64, 0u64..10_000, 0.0f64..5.0), 0..40),
        batch_size in 1usize..512,
    ) {
        let mut table = MetricTable::new();
        for &(size, step, loss) in &rows {
            table.log(0.01, size as f64, step, loss, loss);
        }
        let finalized = table.add_derived_columns(batch_size);
        prop_assert_eq!(finalized.len(), rows.len());
        for (row, &(size, step, _)) in finalized.rows().iter().zip(&rows) {
            let s = size as f64;
            prop_assert_eq!(row.params, (s * s).round());
            prop_assert_eq!(row.compute, s * s * step as f64 * batch_size as f64);
        }
    }
}

// --- Label smoothing properties ---

proptest! {
    #[test]
    fn smoothed_rows_sum_to_one(
        vocab in 1usize..50,
        smoothing in 0.0f64..=1.0,
        picks in prop::collection::vec(0usize..1000, 1..20),
    ) {
        let indices: Vec<usize> = picks.iter().map(|p| p % vocab).collect();
        let targets = label_smoothed(&indices, vocab, smoothing).unwrap();
        for (row, &index) in targets.chunks(vocab).zip(&indices) {
            let sum: f64 = row.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-9);
            let off = smoothing / vocab as f64;
            prop_assert!((row[index] - (1.0 - smoothing + off)).abs() < 1e-12);
        }
    }
}
