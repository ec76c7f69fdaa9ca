//! Physical timestamps in milliseconds since the Unix epoch
//!
//! All age and budget computations in the broker are millisecond
//! differences of these stamps. Differences are signed: a producer clock
//! running ahead of the broker yields a negative age, which the check
//! engine treats as a decision input rather than an error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Current wall-clock time
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;
        Self(millis)
    }

    /// Create from raw milliseconds
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Raw milliseconds since the epoch
    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Signed difference `self - earlier` in milliseconds
    pub fn millis_since(&self, earlier: Timestamp) -> i64 {
        self.0 - earlier.0
    }

    /// A timestamp `millis` earlier than this one
    pub fn sub_millis(&self, millis: i64) -> Self {
        Self(self.0 - millis)
    }

    /// A timestamp `millis` later than this one
    pub fn add_millis(&self, millis: i64) -> Self {
        Self(self.0 + millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_since_is_signed() {
        let earlier = Timestamp::from_millis(1_000);
        let later = Timestamp::from_millis(3_500);

        assert_eq!(later.millis_since(earlier), 2_500);
        assert_eq!(earlier.millis_since(later), -2_500);
    }

    #[test]
    fn test_ordering() {
        let t1 = Timestamp::from_millis(10);
        let t2 = Timestamp::from_millis(20);

        assert!(t1 < t2);
        assert_eq!(t1, Timestamp::from_millis(10));
    }

    #[test]
    fn test_arithmetic() {
        let t = Timestamp::from_millis(5_000);

        assert_eq!(t.sub_millis(1_000), Timestamp::from_millis(4_000));
        assert_eq!(t.add_millis(1_000), Timestamp::from_millis(6_000));
    }

    #[test]
    fn test_now_is_monotonic_enough() {
        let t1 = Timestamp::now();
        let t2 = Timestamp::now();
        assert!(t2 >= t1);
    }
}
