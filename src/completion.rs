/// Integer completion percentage, rounded half up.
///
/// `possible == 0` yields 0. The ratio is computed in integer arithmetic so
/// the .5 boundary is exact: `(1, 8)` is 12.5% and rounds to 13.
pub fn completion_rate(approved: u64, possible: u64) -> u32 {
    if possible == 0 {
        return 0;
    }
    let approved = u128::from(approved);
    let possible = u128::from(possible);
    let pct = (200 * approved + possible) / (2 * possible);
    u32::try_from(pct).unwrap_or(u32::MAX)
}

/// Possible cells for a scope: every target must fill every required column.
pub fn possible_count(target_count: u64, required_columns: u64) -> u64 {
    target_count.saturating_mul(required_columns)
}
