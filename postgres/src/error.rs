//! Mapping from `sqlx` failures to [`LotteryError`].

use lotto_core::LotteryError;

/// SQLSTATE codes after which the rolled-back transaction can be retried.
///
/// - `40001` serialization failure
/// - `40P01` deadlock detected
/// - `55P03` lock not available (`lock_timeout`)
/// - `57014` query canceled (`statement_timeout`)
/// - `23505` unique violation from a concurrent insert
const RETRYABLE_SQLSTATES: [&str; 5] = ["40001", "40P01", "55P03", "57014", "23505"];

/// Converts a `sqlx` error into a [`LotteryError`].
///
/// Lock timeouts, deadlocks, serialization failures and an exhausted
/// connection pool become [`LotteryError::TransactionConflict`]; everything
/// else is [`LotteryError::Database`].
#[must_use]
pub fn map_sqlx_error(err: sqlx::Error) -> LotteryError {
    match &err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(code) if RETRYABLE_SQLSTATES.contains(&code) => {
                LotteryError::TransactionConflict(format!("{code}: {}", db.message()))
            }
            _ => LotteryError::Database(err.to_string()),
        },
        sqlx::Error::PoolTimedOut => {
            LotteryError::TransactionConflict("timed out waiting for a connection".to_string())
        }
        _ => LotteryError::Database(err.to_string()),
    }
}
