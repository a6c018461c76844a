// tests/property_outcome.rs

use std::convert::Infallible;

use proptest::prelude::*;

use healmatrix::healing::decision::{self, RetryVerdict};
use healmatrix::healing::RetryLedger;
use healmatrix::outcome::{BuildOutcome, SeverityBand};
use healmatrix_test_utils::builders::SettingsBuilder;

fn outcome_strategy() -> impl Strategy<Value = BuildOutcome> {
    (0..BuildOutcome::ALL.len()).prop_map(|i| BuildOutcome::ALL[i])
}

proptest! {
    #[test]
    fn combine_returns_one_of_its_inputs_and_is_commutative(
        a in outcome_strategy(),
        b in outcome_strategy(),
    ) {
        let combined = a.combine(b);
        prop_assert!(combined == a || combined == b);
        prop_assert_eq!(combined, b.combine(a));
    }

    #[test]
    fn combine_is_never_better_than_either_input(
        a in outcome_strategy(),
        b in outcome_strategy(),
    ) {
        let combined = a.combine(b);
        prop_assert!(combined.is_worse_or_equal_to(a));
        prop_assert!(combined.is_worse_or_equal_to(b));
    }

    #[test]
    fn combine_is_associative(
        a in outcome_strategy(),
        b in outcome_strategy(),
        c in outcome_strategy(),
    ) {
        prop_assert_eq!(a.combine(b).combine(c), a.combine(b.combine(c)));
    }

    #[test]
    fn band_membership_matches_the_total_order(
        lo in outcome_strategy(),
        hi in outcome_strategy(),
        r in outcome_strategy(),
    ) {
        let band = SeverityBand::new(lo, hi);
        let effective_hi = if hi.is_worse_or_equal_to(lo) { hi } else { lo };
        let expected = r.is_worse_or_equal_to(lo) && r.is_better_or_equal_to(effective_hi);
        prop_assert_eq!(band.contains(r), expected);
    }

    #[test]
    fn band_is_never_looser_than_its_lower_bound(
        lo in outcome_strategy(),
        hi in outcome_strategy(),
    ) {
        let band = SeverityBand::new(lo, hi);
        prop_assert!(band.at_most().is_worse_or_equal_to(band.at_least()));
        // The lower bound itself is always in the band.
        prop_assert!(band.contains(band.at_least()));
    }

    #[test]
    fn always_failing_configuration_runs_exactly_budget_plus_one_times(
        max_retries in 0u32..=4,
    ) {
        let settings = SettingsBuilder::new().max_retries(max_retries).build();

        let mut ledger = RetryLedger::new();
        ledger.record_scheduled("cfg");

        // Every run fails with a matching log; count how often the decision
        // asks for a rerun before declaring the budget exhausted.
        let mut runs = 1u32;
        loop {
            let verdict = decision::evaluate(
                &settings,
                true,
                BuildOutcome::Failure,
                ledger.count("cfg"),
                || Ok::<_, Infallible>(true),
            ).unwrap();

            match verdict {
                RetryVerdict::Retry { retry_count } => {
                    prop_assert_eq!(ledger.increment("cfg"), retry_count);
                    prop_assert!(retry_count <= settings.max_retries);
                    runs += 1;
                }
                RetryVerdict::Exhausted => break,
                other => prop_assert!(false, "unexpected verdict {:?}", other),
            }
        }

        prop_assert_eq!(runs, settings.max_retries + 1);
        prop_assert!(ledger.count("cfg") <= settings.max_retries);
    }
}
