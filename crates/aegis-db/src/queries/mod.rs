pub mod alerts;
pub mod attempts;
pub mod contacts;
pub mod timers;
pub mod users;

use crate::StoreResult;

/// Extension trait for optional query results.
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> StoreResult<Option<T>>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> StoreResult<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
