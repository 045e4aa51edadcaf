//! Opaque identifier generation.
//!
//! Identifiers combine a millisecond offset from a fixed epoch, shifted into
//! the high bits, with a random suffix in the low 16 bits, rendered as
//! lowercase hexadecimal. Identifiers generated in different milliseconds
//! therefore sort by creation time when compared numerically.
//!
//! Generation never falls back to a constant suffix: if the random source is
//! unavailable the caller gets an error and must abort the create.

use crate::environment::Clock;
use rand::RngCore;
use rand::rngs::OsRng;
use std::sync::Arc;
use thiserror::Error;

/// Epoch of the timestamp component (2015-01-01T00:00:00Z) in milliseconds.
pub const EPOCH_MILLIS: i64 = 1_420_070_400_000;

/// Number of low bits holding the random suffix.
pub const SUFFIX_BITS: u32 = 16;

/// Errors that can occur while generating an identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The random source could not produce bytes.
    #[error("Random source unavailable: {0}")]
    RandomSourceUnavailable(String),

    /// The clock reads earlier than the identifier epoch.
    #[error("Clock is before the identifier epoch")]
    ClockBeforeEpoch,
}

/// Produces opaque unique identifiers.
pub trait IdGenerator: Send + Sync {
    /// Generates the next identifier.
    ///
    /// # Errors
    ///
    /// Returns an [`IdError`] if no identifier can be produced.
    fn next_id(&self) -> Result<String, IdError>;
}

/// Source of the random identifier suffix.
pub trait RandomSource: Send + Sync {
    /// Returns 16 random bits.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::RandomSourceUnavailable`] if the source fails.
    fn next_u16(&self) -> Result<u16, IdError>;
}

/// Operating system random source.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn next_u16(&self) -> Result<u16, IdError> {
        let mut bytes = [0u8; 2];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| IdError::RandomSourceUnavailable(e.to_string()))?;
        Ok(u16::from_le_bytes(bytes))
    }
}

/// Time-ordered identifier generator.
#[derive(Clone)]
pub struct TimeOrderedIdGenerator {
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl TimeOrderedIdGenerator {
    /// Creates a generator reading time from `clock` and suffixes from `random`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, random: Arc<dyn RandomSource>) -> Self {
        Self { clock, random }
    }

    /// Creates a generator backed by the operating system random source.
    #[must_use]
    pub fn with_os_random(clock: Arc<dyn Clock>) -> Self {
        Self::new(clock, Arc::new(OsRandom))
    }
}

impl IdGenerator for TimeOrderedIdGenerator {
    fn next_id(&self) -> Result<String, IdError> {
        let offset = self.clock.now().timestamp_millis() - EPOCH_MILLIS;
        let offset = u64::try_from(offset).map_err(|_| IdError::ClockBeforeEpoch)?;
        let suffix = u64::from(self.random.next_u16()?) % (1 << SUFFIX_BITS);

        Ok(format!("{:x}", (offset << SUFFIX_BITS) | suffix))
    }
}

impl std::fmt::Debug for TimeOrderedIdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeOrderedIdGenerator").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    struct At(DateTime<Utc>);

    impl Clock for At {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct Constant(u16);

    impl RandomSource for Constant {
        fn next_u16(&self) -> Result<u16, IdError> {
            Ok(self.0)
        }
    }

    struct Broken;

    impl RandomSource for Broken {
        fn next_u16(&self) -> Result<u16, IdError> {
            Err(IdError::RandomSourceUnavailable("entropy pool closed".to_string()))
        }
    }

    fn generator(millis: i64, suffix: u16) -> TimeOrderedIdGenerator {
        let at = Utc.timestamp_millis_opt(millis).single().expect("valid millis");
        TimeOrderedIdGenerator::new(Arc::new(At(at)), Arc::new(Constant(suffix)))
    }

    #[test]
    fn packs_offset_and_suffix() {
        let id = generator(EPOCH_MILLIS + 1, 0xabcd).next_id().unwrap();
        assert_eq!(id, "1abcd");

        let id = generator(EPOCH_MILLIS, 0).next_id().unwrap();
        assert_eq!(id, "0");
    }

    #[test]
    fn later_instants_produce_larger_identifiers() {
        let earlier = generator(EPOCH_MILLIS + 5_000, u16::MAX).next_id().unwrap();
        let later = generator(EPOCH_MILLIS + 5_001, 0).next_id().unwrap();

        let earlier = u64::from_str_radix(&earlier, 16).unwrap();
        let later = u64::from_str_radix(&later, 16).unwrap();
        assert!(later > earlier);
    }

    #[test]
    fn unavailable_random_source_aborts_generation() {
        let at = Utc.timestamp_millis_opt(EPOCH_MILLIS + 10).single().unwrap();
        let ids = TimeOrderedIdGenerator::new(Arc::new(At(at)), Arc::new(Broken));

        assert!(matches!(
            ids.next_id(),
            Err(IdError::RandomSourceUnavailable(_))
        ));
    }

    #[test]
    fn clock_before_epoch_is_rejected() {
        let ids = generator(EPOCH_MILLIS - 1, 1);
        assert_eq!(ids.next_id(), Err(IdError::ClockBeforeEpoch));
    }

    #[test]
    fn os_random_source_is_available() {
        assert!(OsRandom.next_u16().is_ok());
    }
}
