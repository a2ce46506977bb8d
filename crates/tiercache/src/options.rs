//! Per-entry expiration options and the expiration clock shared by the
//! in-process tiers.

use std::time::{Duration, Instant};

use time::OffsetDateTime;

use crate::error::{CacheError, CacheResult};

/// Expiration settings supplied by the caller at write time.
///
/// Both tiers receive the same options. If both absolute forms are set,
/// `absolute_expiration_relative_to_now` takes precedence. A sliding window
/// never keeps an entry alive past its absolute deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheEntryOptions {
    /// Point in time at which the entry expires.
    pub absolute_expiration: Option<OffsetDateTime>,
    /// Lifetime of the entry, measured from the write.
    pub absolute_expiration_relative_to_now: Option<Duration>,
    /// How long the entry may stay unread before it expires.
    pub sliding_expiration: Option<Duration>,
}

impl CacheEntryOptions {
    /// Options with no expiration at all.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_absolute_expiration(mut self, at: OffsetDateTime) -> Self {
        self.absolute_expiration = Some(at);
        self
    }

    pub fn with_absolute_expiration_relative_to_now(mut self, ttl: Duration) -> Self {
        self.absolute_expiration_relative_to_now = Some(ttl);
        self
    }

    pub fn with_sliding_expiration(mut self, window: Duration) -> Self {
        self.sliding_expiration = Some(window);
        self
    }

    /// Returns `true` when no expiration is configured.
    pub fn is_unbounded(&self) -> bool {
        self.absolute_expiration.is_none()
            && self.absolute_expiration_relative_to_now.is_none()
            && self.sliding_expiration.is_none()
    }

    /// Checks the options against the expiration contract.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::InvalidOptions` if the absolute expiration is not
    /// in the future or if a relative or sliding duration is zero.
    pub fn validate(&self, now: OffsetDateTime) -> CacheResult<()> {
        if let Some(at) = self.absolute_expiration {
            if at <= now {
                return Err(CacheError::invalid_options(
                    "the absolute expiration value must be in the future",
                ));
            }
        }
        if self.absolute_expiration_relative_to_now == Some(Duration::ZERO) {
            return Err(CacheError::invalid_options(
                "the relative expiration value must be positive",
            ));
        }
        if self.sliding_expiration == Some(Duration::ZERO) {
            return Err(CacheError::invalid_options(
                "the sliding expiration value must be positive",
            ));
        }
        Ok(())
    }

    /// Resolves the absolute deadline of an entry written at `now`.
    ///
    /// A relative expiration too large to represent is treated as no deadline.
    pub fn absolute_deadline(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        match self.absolute_expiration_relative_to_now {
            Some(ttl) => time::Duration::try_from(ttl)
                .ok()
                .and_then(|ttl| now.checked_add(ttl)),
            None => self.absolute_expiration,
        }
    }
}

/// Expiration state of a single in-process entry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExpiryClock {
    deadline: Option<Instant>,
    sliding: Option<Duration>,
    last_access: Instant,
}

impl ExpiryClock {
    pub(crate) fn start(options: &CacheEntryOptions) -> Self {
        Self::start_at(options, Instant::now(), OffsetDateTime::now_utc())
    }

    pub(crate) fn start_at(
        options: &CacheEntryOptions,
        now: Instant,
        wall_now: OffsetDateTime,
    ) -> Self {
        // Map the wall-clock deadline onto the monotonic clock once, at write time.
        let deadline = options.absolute_deadline(wall_now).map(|at| {
            Duration::try_from(at - wall_now)
                .ok()
                .and_then(|remaining| now.checked_add(remaining))
                .unwrap_or(now)
        });
        Self {
            deadline,
            sliding: options.sliding_expiration,
            last_access: now,
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        if self.deadline.is_some_and(|deadline| now >= deadline) {
            return true;
        }
        self.sliding
            .is_some_and(|window| now.saturating_duration_since(self.last_access) >= window)
    }

    /// Resets the sliding window.
    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_access = now;
    }
}
