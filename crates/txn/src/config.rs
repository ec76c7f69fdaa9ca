//! Check engine configuration

use std::time::Duration;

/// Tunables for the transactional message check engine
///
/// The file retention window is not configured here; it is reported by the
/// store bridge, since it belongs to the store's own file management.
#[derive(Debug, Clone)]
pub struct CheckConfig {
    /// Minimum age of a half message before it may be back-checked; also
    /// the default immunity window when the producer did not request one
    pub transaction_timeout: Duration,

    /// Back-checks allowed per half before it is permanently discarded
    pub transaction_check_max: u32,

    /// Cadence of the periodic check driver
    pub check_interval: Duration,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: Duration::from_secs(6),
            transaction_check_max: 5,
            check_interval: Duration::from_secs(60),
        }
    }
}
