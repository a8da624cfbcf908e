// sqlx::Error -> AppError mapping
//
// Orphan rules prevent `impl From<sqlx::Error> for AppError` here, so the
// adapters map explicitly depending on which port failed.

use gatekeeper_core::error::AppError;

/// Describe a sqlx error with SQLite result codes where available
fn describe(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            // SQLite error codes: https://www.sqlite.org/rescode.html
            Some(code) => match code.as_ref() {
                "5" => format!("Database locked (SQLITE_BUSY): {}", db_err.message()),
                "13" => format!("Database full: {}", db_err.message()),
                "2067" | "1555" => format!(
                    "Unique constraint violation: {} ({})",
                    db_err.message(),
                    code
                ),
                other => format!("Database error [{}]: {}", other, db_err.message()),
            },
            None => format!("Database error: {}", db_err.message()),
        },
        sqlx::Error::PoolTimedOut => "Connection pool timed out".to_string(),
        sqlx::Error::ColumnNotFound(col) => format!("Column not found: {}", col),
        // Connection, pool, protocol errors
        other => other.to_string(),
    }
}

pub(crate) fn store_error(err: sqlx::Error) -> AppError {
    AppError::StoreUnavailable(describe(&err))
}

pub(crate) fn queue_error(err: sqlx::Error) -> AppError {
    AppError::QueueUnavailable(describe(&err))
}
