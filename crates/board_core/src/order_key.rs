//! Real-valued ordering keys for siblings in a list.
//!
//! New positions are bisected from their neighbours. Bisection eventually
//! runs out of `f64` precision, so callers check [`is_exhausted`] and fall
//! back to [`dense`] keys for the whole sibling list.

/// Key handed out when a list has no neighbours at all.
pub const SEED_ORDER: f64 = 1.0;

/// Key for an entry placed after `before` and ahead of `after`.
pub fn between(before: Option<f64>, after: Option<f64>) -> f64 {
    match (before, after) {
        (None, None) => SEED_ORDER,
        (None, Some(after)) => after - 1.0,
        (Some(before), None) => before + 1.0,
        (Some(before), Some(after)) => (before + after) / 2.0,
    }
}

/// True when `key` no longer sorts strictly between its bounds.
pub fn is_exhausted(before: Option<f64>, after: Option<f64>, key: f64) -> bool {
    !key.is_finite()
        || before.is_some_and(|before| key <= before)
        || after.is_some_and(|after| key >= after)
}

/// `0.0, 1.0, .., len - 1`.
pub fn dense(len: usize) -> impl Iterator<Item = f64> {
    (0..len).map(|position| position as f64)
}

#[cfg(test)]
#[path = "tests/order_key_tests.rs"]
mod tests;
