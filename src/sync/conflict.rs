//! Conflict detection and resolution
//!
//! Decides which of two diverging versions of an entity survives. Strategies
//! are pluggable behind `ResolutionPolicy`; `LastWriteWins` is the only one
//! shipped.

use chrono::{DateTime, Utc};

use super::types::Winner;
use crate::catalog::{Origin, SyncRecord};

/// Named conflict strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictStrategy {
    #[default]
    LastWriteWins,
}

/// The bookkeeping a policy is allowed to look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionStamp {
    pub rev: u64,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Origin,
}

impl<T> From<&SyncRecord<T>> for VersionStamp {
    fn from(record: &SyncRecord<T>) -> Self {
        Self {
            rev: record.rev,
            updated_at: record.updated_at,
            updated_by: record.updated_by,
        }
    }
}

/// A conflict policy. Must be a pure, total function of its inputs so that
/// replayed pushes reach the same decisions.
pub trait ResolutionPolicy: Send + Sync {
    fn strategy(&self) -> ConflictStrategy;

    fn decide(&self, current: &VersionStamp, incoming: &VersionStamp) -> Winner;
}

/// Newer `updatedAt` wins. Exact ties go to the incoming (cloud) version.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriteWins;

impl ResolutionPolicy for LastWriteWins {
    fn strategy(&self) -> ConflictStrategy {
        ConflictStrategy::LastWriteWins
    }

    fn decide(&self, current: &VersionStamp, incoming: &VersionStamp) -> Winner {
        if current.updated_at > incoming.updated_at {
            Winner::Current
        } else {
            Winner::Incoming
        }
    }
}

impl ConflictStrategy {
    /// The policy implementing this strategy
    pub fn policy(&self) -> &'static dyn ResolutionPolicy {
        match self {
            ConflictStrategy::LastWriteWins => &LastWriteWins,
        }
    }
}

/// Result of conflict resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub winner: Winner,
}

/// Resolve a conflict between the stored and the incoming version
pub fn resolve_conflict<T>(
    current: &SyncRecord<T>,
    incoming: &SyncRecord<T>,
    strategy: ConflictStrategy,
) -> Resolution {
    Resolution {
        winner: strategy
            .policy()
            .decide(&VersionStamp::from(current), &VersionStamp::from(incoming)),
    }
}

/// Conflict resolver with a configurable policy
pub struct ConflictResolver {
    policy: Box<dyn ResolutionPolicy>,
}

impl ConflictResolver {
    /// Create a resolver for a named strategy
    pub fn new(strategy: ConflictStrategy) -> Self {
        match strategy {
            ConflictStrategy::LastWriteWins => Self::with_policy(LastWriteWins),
        }
    }

    /// Create a resolver around a custom policy
    pub fn with_policy(policy: impl ResolutionPolicy + 'static) -> Self {
        Self {
            policy: Box::new(policy),
        }
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.policy.strategy()
    }

    /// Decide the winner between the stored and the incoming version
    pub fn resolve<T>(&self, current: &SyncRecord<T>, incoming: &SyncRecord<T>) -> Resolution {
        Resolution {
            winner: self
                .policy
                .decide(&VersionStamp::from(current), &VersionStamp::from(incoming)),
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(ConflictStrategy::LastWriteWins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Product;
    use chrono::{Duration, TimeZone};

    fn version(rev: u64, minute: u32, origin: Origin) -> SyncRecord<Product> {
        SyncRecord {
            id: "p-1".to_string(),
            rev,
            updated_by: origin,
            checksum: String::new(),
            updated_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap(),
            deleted_at: None,
            data: Product::default(),
        }
    }

    #[test]
    fn test_newer_write_wins() {
        let older = version(7, 0, Origin::Local);
        let newer = version(5, 30, Origin::Cloud);

        let resolution = resolve_conflict(&older, &newer, ConflictStrategy::LastWriteWins);
        assert_eq!(resolution.winner, Winner::Incoming);

        let resolution = resolve_conflict(&newer, &older, ConflictStrategy::LastWriteWins);
        assert_eq!(resolution.winner, Winner::Current);
    }

    #[test]
    fn test_tie_goes_to_incoming() {
        let current = version(7, 10, Origin::Local);
        let incoming = version(5, 10, Origin::Cloud);

        let resolution = resolve_conflict(&current, &incoming, ConflictStrategy::LastWriteWins);
        assert_eq!(resolution.winner, Winner::Incoming);
    }

    #[test]
    fn test_decisions_are_repeatable() {
        let resolver = ConflictResolver::default();
        let current = version(7, 45, Origin::Local);
        let incoming = version(5, 15, Origin::Cloud);

        let first = resolver.resolve(&current, &incoming);
        for _ in 0..10 {
            assert_eq!(resolver.resolve(&current, &incoming), first);
        }
        assert_eq!(first.winner, Winner::Current);
    }

    #[test]
    fn test_rev_does_not_decide() {
        let mut current = version(100, 0, Origin::Local);
        let incoming = version(1, 0, Origin::Cloud);
        current.updated_at = incoming.updated_at - Duration::seconds(1);

        assert_eq!(
            resolve_conflict(&current, &incoming, ConflictStrategy::LastWriteWins).winner,
            Winner::Incoming
        );
    }

    #[test]
    fn test_custom_policy() {
        struct LocalAlwaysWins;

        impl ResolutionPolicy for LocalAlwaysWins {
            fn strategy(&self) -> ConflictStrategy {
                ConflictStrategy::LastWriteWins
            }

            fn decide(&self, _current: &VersionStamp, _incoming: &VersionStamp) -> Winner {
                Winner::Current
            }
        }

        let resolver = ConflictResolver::with_policy(LocalAlwaysWins);
        let current = version(1, 0, Origin::Local);
        let incoming = version(2, 59, Origin::Cloud);
        assert_eq!(resolver.resolve(&current, &incoming).winner, Winner::Current);
    }

    #[test]
    fn test_resolver_reports_its_strategy() {
        assert_eq!(ConflictResolver::default().strategy(), ConflictStrategy::LastWriteWins);
        assert_eq!(
            ConflictStrategy::LastWriteWins.policy().strategy(),
            ConflictStrategy::LastWriteWins
        );
    }
}
