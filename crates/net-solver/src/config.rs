//! Named tolerances and iteration caps used throughout the solver (spec §8,
//! §9 Open Question 3: a single configurable tolerance object instead of
//! scattered magic-number literals).

use net_core::{Real, Tolerances};

/// Write-once validation / KCL sanity tolerance named explicitly in spec §8
/// ("within tolerance (default 1e-3)").
pub const KCL_TOLERANCE: Real = 1e-3;

/// Same numeric value as `KCL_TOLERANCE`, named separately because the two
/// call sites (node write-once validation vs. post-solve KCL sanity check)
/// are conceptually distinct even though spec §8/§9 gives them the same
/// default.
pub const VALIDATION_TOLERANCE: Real = 1e-3;

/// Bound on the propagation iterator's fixed-point loop (spec §4.2, §7.2).
pub const PROPAGATION_ITERATION_CAP: usize = 1000;

/// Bound on the recursive simplifier's recursion depth (spec §4.6, §7.2).
pub const RECURSION_DEPTH_CAP: usize = 1000;

/// Layer terminal size above which `RecursiveSimplifier` logs a WARNING
/// instead of an INFO (spec §4.6).
pub const TERMINAL_SIZE_WARNING_THRESHOLD: usize = 4;

pub fn default_tolerances() -> Tolerances {
    Tolerances {
        abs: KCL_TOLERANCE,
        rel: 1e-6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use net_core::nearly_equal;

    #[test]
    fn default_tolerances_match_named_constant() {
        let tol = default_tolerances();
        assert_eq!(tol.abs, KCL_TOLERANCE);
        assert!(nearly_equal(0.0, 9e-4, tol));
    }
}
