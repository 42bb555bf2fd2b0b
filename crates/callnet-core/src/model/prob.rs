//! Probability helpers used while turning mined counts into CPTs.
//!
//! Every probability a builder writes into a network lies in
//! `[P_MIN, P_MAX]`: nothing is ever exactly impossible or exactly certain.
//! The helpers here either clamp into that range or fail fast when a vector
//! cannot be brought into it.

use crate::engine::errors::{CallNetError, Result};

/// Smallest probability a smoothed CPT entry may take.
pub const P_MIN: f64 = 0.00001;

/// Largest probability a smoothed CPT entry may take.
pub const P_MAX: f64 = 1.0 - P_MIN;

/// Decimal places estimated probabilities are rounded to.
pub const P_ROUNDING_PRECISION: u32 = 5;

/// Largest correction [`scale_maximal_value`] applies before giving up.
pub const MAX_PROBABILITY_DELTA: f64 = 0.1;

/// Tolerance of the sum-to-one check after a correction.
pub const SUM_TOLERANCE: f64 = 1e-4;

/// Rounds `value` to `precision` decimal places, ties to even.
pub fn round(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round_ties_even() / factor
}

pub fn is_in_min_max_range(value: f64) -> bool {
    (P_MIN..=P_MAX).contains(&value)
}

/// Fails if `values` is empty or any entry lies outside `[P_MIN, P_MAX]`.
///
/// This rejects exact `0.0` and `1.0` as well as NaN.
pub fn ensure_all_probabilities_in_valid_range(values: &[f64]) -> Result<()> {
    if values.is_empty() {
        return Err(CallNetError::InvalidInput(
            "probability vector must not be empty".into(),
        ));
    }
    if let Some((index, value)) = values
        .iter()
        .enumerate()
        .rev()
        .find(|(_, v)| !is_in_min_max_range(**v))
    {
        return Err(CallNetError::InvalidInput(format!(
            "index {} has invalid probability {:.6}",
            index, value
        )));
    }
    Ok(())
}

/// Corrects the sum of `values` to one with the default precision and delta.
///
/// See [`scale_maximal_value_with`].
pub fn scale_maximal_value(values: &mut [f64]) -> Result<()> {
    scale_maximal_value_with(values, P_ROUNDING_PRECISION, MAX_PROBABILITY_DELTA)
}

/// Corrects the sum of `values` to one by moving the whole difference onto a
/// single entry.
///
/// Entries are tried from the last to the first; the first one that stays in
/// `[P_MIN, P_MAX]` after adding the difference and rounding to `precision`
/// absorbs it. Fails without touching `values` if an entry is out of range,
/// the difference exceeds `max_delta`, or no entry can absorb it.
pub fn scale_maximal_value_with(values: &mut [f64], precision: u32, max_delta: f64) -> Result<()> {
    ensure_all_probabilities_in_valid_range(values)?;
    let sum: f64 = values.iter().sum();
    let delta = 1.0 - sum;
    if delta == 0.0 {
        return Ok(());
    }
    if delta.abs() > max_delta {
        return Err(CallNetError::InvalidInput(format!(
            "sum of values is too far away from 1.0: {:.6}",
            sum
        )));
    }

    for index in (0..values.len()).rev() {
        let corrected = round(values[index] + delta, precision);
        if !is_in_min_max_range(corrected) {
            continue;
        }
        let corrected_sum = sum - values[index] + corrected;
        if (1.0 - corrected_sum).abs() > SUM_TOLERANCE {
            return Err(CallNetError::Numerical(format!(
                "rounding left the probability sum at {:.6}",
                corrected_sum
            )));
        }
        values[index] = corrected;
        return Ok(());
    }

    Err(CallNetError::InvalidInput(format!(
        "delta {:.5} cannot be added to any value of {:?} within [P_MIN, P_MAX]",
        delta, values
    )))
}

/// `numerator / denominator` clamped into `[P_MIN, P_MAX]`; `P_MIN` when the
/// denominator is zero.
pub fn safe_div_max_min(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return P_MIN;
    }
    probability_in_min_max_range(numerator as f64 / denominator as f64)
}

/// Clamps `probability` into `[P_MIN, P_MAX]`.
pub fn probability_in_min_max_range(probability: f64) -> f64 {
    if probability > P_MAX {
        P_MAX
    } else if probability < P_MIN {
        P_MIN
    } else {
        probability
    }
}

/// Prior of a calling-context node whose dummy outcome sits at index 0.
///
/// Every real context gets `P_MIN`; the dummy outcome takes the rest. The
/// context node is always pinned by evidence at query time, so this prior only
/// needs to be a valid distribution.
pub fn prior_probabilities_for_context_node(len: usize) -> Vec<f64> {
    let mut prior = vec![P_MIN; len];
    if let Some((first, rest)) = prior.split_first_mut() {
        *first = 1.0 - rest.iter().sum::<f64>();
    }
    prior
}
