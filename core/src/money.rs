//! Integer-cent money arithmetic.
//!
//! All monetary values in the system are non-negative integers in the
//! smallest currency unit ("cents"). Floats never touch persisted state.
//! The one non-trivial operation is [`distribute`], which splits a total
//! across weighted parts while keeping the sum exact; the payment provider
//! rejects refund sets that cumulatively exceed the original charges, so
//! rounding drift is not an option.

/// Split `total` across `weights` proportionally, preserving the exact sum.
///
/// Each share is computed as `round(total * w_i / W)` where `W` is the sum
/// of all weights. Rounding drift (`total - Σ shares`) is repaired by
/// adding the difference to the first index holding the largest weight.
/// The drift is bounded by the number of weights and may be negative.
///
/// Degenerate inputs return all zeros: `total == 0`, or `Σ weights == 0`.
///
/// # Examples
///
/// ```
/// use splitpay_core::money::distribute;
///
/// // $30.00 refund across $80.00/$40.00 captures: exact thirds.
/// assert_eq!(distribute(3000, &[8000, 4000]), vec![2000, 1000]);
///
/// // 10 cents across three equal weights: repair lands on the first.
/// assert_eq!(distribute(10, &[1, 1, 1]), vec![4, 3, 3]);
/// ```
#[must_use]
pub fn distribute(total: i64, weights: &[i64]) -> Vec<i64> {
    let weight_sum: i128 = weights.iter().map(|w| i128::from((*w).max(0))).sum();
    if total <= 0 || weight_sum == 0 {
        return vec![0; weights.len()];
    }

    let mut shares: Vec<i64> = weights
        .iter()
        .map(|w| {
            let w = i128::from((*w).max(0));
            // Round half up; operands are non-negative so this matches
            // the conventional rounding of `total * w / W`.
            let share = (i128::from(total) * w + weight_sum / 2) / weight_sum;
            // Each share is at most `total`, so this never saturates.
            i64::try_from(share).unwrap_or(i64::MAX)
        })
        .collect();

    let allocated: i64 = shares.iter().sum();
    let drift = total - allocated;
    if drift != 0 {
        if let Some(max_weight) = weights.iter().max() {
            if let Some(index) = weights.iter().position(|w| w == max_weight) {
                shares[index] += drift;
            }
        }
    }

    shares
}

/// Sum a list of cent amounts, failing on `i64` overflow.
///
/// # Errors
///
/// Returns `None` if the running sum overflows.
#[must_use]
pub fn sum_amounts(amounts: &[i64]) -> Option<i64> {
    amounts.iter().try_fold(0_i64, |acc, a| acc.checked_add(*a))
}

/// Render a cent amount as a human-readable decimal string.
///
/// Used in failure reasons and operator-facing messages only; the decimal
/// form never goes back into arithmetic.
#[must_use]
pub fn format_cents(amount_cents: i64) -> String {
    let sign = if amount_cents < 0 { "-" } else { "" };
    let abs = amount_cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exact_proportional_split() {
        // round(3000 * 80/120) = 2000, round(3000 * 40/120) = 1000, drift 0
        assert_eq!(distribute(3000, &[8000, 4000]), vec![2000, 1000]);
    }

    #[test]
    fn test_weighted_split_without_drift() {
        assert_eq!(distribute(1000, &[33, 33, 34]), vec![330, 330, 340]);
    }

    #[test]
    fn test_drift_repair_on_first_largest_weight() {
        // raw shares [3, 3, 3], drift +1 goes to the first max weight
        assert_eq!(distribute(10, &[1, 1, 1]), vec![4, 3, 3]);
    }

    #[test]
    fn test_negative_drift_repair() {
        // raw rounding can overshoot; the repair subtracts from the largest
        let shares = distribute(100, &[1, 1, 1, 1, 1, 1]);
        assert_eq!(shares.iter().sum::<i64>(), 100);
    }

    #[test]
    fn test_zero_total_gives_zeros() {
        assert_eq!(distribute(0, &[10, 20]), vec![0, 0]);
    }

    #[test]
    fn test_zero_weight_sum_gives_zeros() {
        assert_eq!(distribute(500, &[0, 0, 0]), vec![0, 0, 0]);
    }

    #[test]
    fn test_empty_weights() {
        assert!(distribute(500, &[]).is_empty());
    }

    #[test]
    fn test_single_weight_takes_all() {
        assert_eq!(distribute(999, &[7]), vec![999]);
    }

    #[test]
    fn test_zero_weight_entry_gets_zero_share() {
        let shares = distribute(1000, &[500, 0, 500]);
        assert_eq!(shares[1], 0);
        assert_eq!(shares.iter().sum::<i64>(), 1000);
    }

    #[test]
    fn test_sum_amounts_overflow() {
        assert_eq!(sum_amounts(&[1, 2, 3]), Some(6));
        assert_eq!(sum_amounts(&[i64::MAX, 1]), None);
        assert_eq!(sum_amounts(&[]), Some(0));
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(15000), "150.00");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(-120), "-1.20");
    }

    proptest! {
        #[test]
        fn prop_distribute_preserves_sum(
            total in 0_i64..10_000_000,
            weights in proptest::collection::vec(0_i64..1_000_000, 1..8),
        ) {
            prop_assume!(weights.iter().sum::<i64>() > 0);
            let shares = distribute(total, &weights);
            prop_assert_eq!(shares.iter().sum::<i64>(), total);
        }

        #[test]
        fn prop_distribute_non_negative(
            total in 0_i64..10_000_000,
            weights in proptest::collection::vec(0_i64..1_000_000, 1..8),
        ) {
            prop_assume!(weights.iter().sum::<i64>() > 0);
            for share in distribute(total, &weights) {
                prop_assert!(share >= 0);
            }
        }

        #[test]
        fn prop_distribute_length_matches(
            total in 0_i64..1_000_000,
            weights in proptest::collection::vec(0_i64..10_000, 0..8),
        ) {
            prop_assert_eq!(distribute(total, &weights).len(), weights.len());
        }

        #[test]
        fn prop_share_multiset_stable_under_permutation(
            total in 0_i64..1_000_000,
            mut weights in proptest::collection::vec(1_i64..10_000, 2..6),
        ) {
            // The repair cent always lands on an index holding the maximum
            // weight, so permuting the weights permutes the shares: the
            // share multiset is position-independent.
            let mut original = distribute(total, &weights);
            weights.reverse();
            let mut reversed = distribute(total, &weights);
            original.sort_unstable();
            reversed.sort_unstable();
            prop_assert_eq!(original, reversed);
        }
    }
}
