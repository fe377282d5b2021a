//! Transaction settings for the `PostgreSQL` store.

use std::time::Duration;

/// Per-transaction limits applied with `SET LOCAL`.
///
/// A lock wait longer than `lock_timeout` aborts the transaction with
/// SQLSTATE `55P03`, surfaced as a retryable `TransactionConflict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Longest wait for a row or table lock.
    pub lock_timeout: Duration,
    /// Longest time a single statement may run.
    pub statement_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(2),
            statement_timeout: Duration::from_secs(30),
        }
    }
}

impl StoreConfig {
    /// Sets the lock timeout.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the statement timeout.
    #[must_use]
    pub const fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// `PostgreSQL` interval text for the lock timeout, e.g. `"2000ms"`.
    ///
    /// Zero disables the timeout in `PostgreSQL`, so it is raised to 1ms.
    #[must_use]
    pub fn lock_timeout_setting(&self) -> String {
        as_setting(self.lock_timeout)
    }

    /// `PostgreSQL` interval text for the statement timeout.
    #[must_use]
    pub fn statement_timeout_setting(&self) -> String {
        as_setting(self.statement_timeout)
    }
}

fn as_setting(timeout: Duration) -> String {
    format!("{}ms", timeout.as_millis().max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_are_in_milliseconds() {
        let config = StoreConfig::default()
            .with_lock_timeout(Duration::from_millis(250))
            .with_statement_timeout(Duration::ZERO);
        assert_eq!(config.lock_timeout_setting(), "250ms");
        assert_eq!(config.statement_timeout_setting(), "1ms");
    }
}
