#![forbid(unsafe_code)]

//! Activity launch modes.
//!
//! An [`ActivityMode`] combines two independent facets:
//!
//! - **anchor**: `TOP` (the stack's topmost slot) or `CURRENT` (the slot that
//!   issued the request). `DETACH` has neither.
//! - **action**: `SUCCEED` (push above the anchor), `REPLACE` (swap the
//!   anchor out), `RESPOND` (push and route a reply back to the anchor), or
//!   `RELAUNCH` combined with exactly one of `SUCCEED`/`REPLACE` (reactivate
//!   an existing instance, falling back to the named action).
//!
//! Classification is a static table lookup indexed by ordinal. Modes travel
//! as ordinals in `[0, 10]`; anything else is rejected as corruption.

use crate::error::{Error, Result};
use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

bitflags! {
    /// Orthogonal facets of an activity mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModeFacets: u8 {
        /// Anchored at the topmost slot.
        const TOP      = 0b00_0001;
        /// Anchored at the requesting slot.
        const CURRENT  = 0b00_0010;
        /// Push above the anchor.
        const SUCCEED  = 0b00_0100;
        /// Replace the anchor.
        const REPLACE  = 0b00_1000;
        /// Try reactivating an existing instance first.
        const RELAUNCH = 0b01_0000;
        /// Route the launched activity's reply to the anchor.
        const RESPOND  = 0b10_0000;
    }
}

/// How a deferred launch is positioned on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActivityMode {
    SucceedTop = 0,
    SucceedCurrent = 1,
    ReplaceTop = 2,
    ReplaceCurrent = 3,
    RelaunchExistingOrSucceedTop = 4,
    RelaunchExistingOrSucceedCurrent = 5,
    RelaunchExistingOrReplaceTop = 6,
    RelaunchExistingOrReplaceCurrent = 7,
    RespondToTop = 8,
    RespondToCurrent = 9,
    Detach = 10,
}

const TOP_SUCCEED: ModeFacets = ModeFacets::TOP.union(ModeFacets::SUCCEED);
const CURRENT_SUCCEED: ModeFacets = ModeFacets::CURRENT.union(ModeFacets::SUCCEED);
const TOP_REPLACE: ModeFacets = ModeFacets::TOP.union(ModeFacets::REPLACE);
const CURRENT_REPLACE: ModeFacets = ModeFacets::CURRENT.union(ModeFacets::REPLACE);

/// Facet table indexed by ordinal.
const FACETS: [ModeFacets; ActivityMode::COUNT] = [
    TOP_SUCCEED,
    CURRENT_SUCCEED,
    TOP_REPLACE,
    CURRENT_REPLACE,
    TOP_SUCCEED.union(ModeFacets::RELAUNCH),
    CURRENT_SUCCEED.union(ModeFacets::RELAUNCH),
    TOP_REPLACE.union(ModeFacets::RELAUNCH),
    CURRENT_REPLACE.union(ModeFacets::RELAUNCH),
    ModeFacets::TOP.union(ModeFacets::RESPOND),
    ModeFacets::CURRENT.union(ModeFacets::RESPOND),
    ModeFacets::empty(),
];

const NAMES: [&str; ActivityMode::COUNT] = [
    "SUCCEED_TOP",
    "SUCCEED_CURRENT",
    "REPLACE_TOP",
    "REPLACE_CURRENT",
    "RELAUNCH_EXISTING_OR_SUCCEED_TOP",
    "RELAUNCH_EXISTING_OR_SUCCEED_CURRENT",
    "RELAUNCH_EXISTING_OR_REPLACE_TOP",
    "RELAUNCH_EXISTING_OR_REPLACE_CURRENT",
    "RESPOND_TO_TOP",
    "RESPOND_TO_CURRENT",
    "DETACH",
];

impl ActivityMode {
    /// Number of defined modes.
    pub const COUNT: usize = 11;

    /// All modes in ordinal order.
    pub const ALL: [ActivityMode; Self::COUNT] = [
        ActivityMode::SucceedTop,
        ActivityMode::SucceedCurrent,
        ActivityMode::ReplaceTop,
        ActivityMode::ReplaceCurrent,
        ActivityMode::RelaunchExistingOrSucceedTop,
        ActivityMode::RelaunchExistingOrSucceedCurrent,
        ActivityMode::RelaunchExistingOrReplaceTop,
        ActivityMode::RelaunchExistingOrReplaceCurrent,
        ActivityMode::RespondToTop,
        ActivityMode::RespondToCurrent,
        ActivityMode::Detach,
    ];

    /// Wire ordinal.
    #[inline]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// Decode a wire ordinal. Out-of-range values are corruption, never
    /// clamped.
    pub fn from_ordinal(ordinal: i64) -> Result<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or_else(|| Error::corrupt(format!("activity mode ordinal {ordinal} out of range")))
    }

    /// Upper-snake name, stable across releases.
    #[inline]
    pub const fn name(self) -> &'static str {
        NAMES[self as usize]
    }

    /// Facet classification.
    #[inline]
    pub const fn facets(self) -> ModeFacets {
        FACETS[self as usize]
    }

    #[inline]
    pub const fn top(self) -> bool {
        self.facets().contains(ModeFacets::TOP)
    }

    #[inline]
    pub const fn current(self) -> bool {
        self.facets().contains(ModeFacets::CURRENT)
    }

    #[inline]
    pub const fn succeed(self) -> bool {
        self.facets().contains(ModeFacets::SUCCEED)
    }

    #[inline]
    pub const fn replace(self) -> bool {
        self.facets().contains(ModeFacets::REPLACE)
    }

    #[inline]
    pub const fn relaunch(self) -> bool {
        self.facets().contains(ModeFacets::RELAUNCH)
    }

    #[inline]
    pub const fn respond(self) -> bool {
        self.facets().contains(ModeFacets::RESPOND)
    }

    /// No anchor and no response routing.
    #[inline]
    pub const fn detach(self) -> bool {
        matches!(self, ActivityMode::Detach)
    }
}

impl fmt::Display for ActivityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActivityMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name() == s)
            .ok_or_else(|| Error::invalid(format!("unknown activity mode {s:?}")))
    }
}

impl TryFrom<i64> for ActivityMode {
    type Error = Error;

    fn try_from(ordinal: i64) -> Result<Self> {
        Self::from_ordinal(ordinal)
    }
}

impl Serialize for ActivityMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.ordinal())
    }
}

impl<'de> Deserialize<'de> for ActivityMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let ordinal = i64::deserialize(deserializer)?;
        Self::from_ordinal(ordinal).map_err(serde::de::Error::custom)
    }
}
