//! Property tests for activity mode classification and wire ordinals.
//!
//! 1. `top`/`current` partition every non-DETACH mode; DETACH has neither.
//! 2. Exactly one of `succeed`/`replace` for non-respond, non-detach modes.
//! 3. `relaunch` iff the name contains `RELAUNCH_EXISTING`.
//! 4. `respond` iff the name starts with `RESPOND_TO`.
//! 5. `relaunch` never co-occurs with `respond`.
//! 6. Ordinals round trip; every ordinal outside `[0, 10]` fails closed.

use actstack_core::{ActivityMode, Error};
use proptest::prelude::*;

#[test]
fn anchor_facets_partition_modes() {
    for mode in ActivityMode::ALL {
        if mode.detach() {
            assert!(!mode.top() && !mode.current(), "{mode}");
        } else {
            assert!(mode.top() ^ mode.current(), "{mode}");
        }
    }
}

#[test]
fn action_facets_are_exclusive() {
    for mode in ActivityMode::ALL {
        if !mode.respond() && !mode.detach() {
            assert!(mode.succeed() ^ mode.replace(), "{mode}");
        } else {
            assert!(!mode.succeed() && !mode.replace(), "{mode}");
        }
        if mode.relaunch() {
            assert!(!mode.respond(), "{mode}");
        }
    }
}

#[test]
fn name_predicates_agree_with_table() {
    for mode in ActivityMode::ALL {
        assert_eq!(
            mode.relaunch(),
            mode.name().contains("RELAUNCH_EXISTING"),
            "{mode}"
        );
        assert_eq!(mode.respond(), mode.name().starts_with("RESPOND_TO"), "{mode}");
    }
}

#[test]
fn ordinal_round_trip() {
    for mode in ActivityMode::ALL {
        assert_eq!(
            ActivityMode::from_ordinal(i64::from(mode.ordinal())).unwrap(),
            mode
        );
    }
    assert!(matches!(
        ActivityMode::from_ordinal(-1),
        Err(Error::Corruption(_))
    ));
    assert!(matches!(
        ActivityMode::from_ordinal(11),
        Err(Error::Corruption(_))
    ));
}

proptest! {
    #[test]
    fn from_ordinal_is_total_and_closed(ordinal in any::<i64>()) {
        match ActivityMode::from_ordinal(ordinal) {
            Ok(mode) => {
                prop_assert!((0..=10).contains(&ordinal));
                prop_assert_eq!(i64::from(mode.ordinal()), ordinal);
            }
            Err(err) => {
                prop_assert!(!(0..=10).contains(&ordinal));
                prop_assert!(matches!(err, Error::Corruption(_)));
            }
        }
    }
}
