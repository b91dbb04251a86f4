//! In-process cache entry with its expiry deadline.

use bytes::Bytes;
use std::time::{Duration, Instant};

/// A single in-process entry: the stored value and when it stops being
/// visible.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The stored value.
    pub(crate) value: Bytes,

    /// When this entry expires. `None` means no expiration.
    pub(crate) expires_at: Option<Instant>,
}

impl Entry {
    /// Create an entry for `ttl`, measured from `now`.
    ///
    /// A missing or zero TTL means the entry never expires; it is never
    /// treated as "already expired". A deadline past what `Instant` can
    /// represent also never expires.
    pub fn new(value: Bytes, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            value,
            expires_at: ttl
                .filter(|ttl| !ttl.is_zero())
                .and_then(|ttl| now.checked_add(ttl)),
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Check if this entry has expired at a given time.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    /// Get a reference to the value.
    pub fn value(&self) -> &Bytes {
        &self.value
    }
}
