use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::services::registry::{RegistryError, RegistryResult};
use crate::storage::StorageError;

/// Envelope handed back to command handlers: `{"status": true, "data": ..}`
/// on success, `{"status": false, "message": ..}` on a rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    Success(T),
    Failure(String),
}

impl<T> Reply<T> {
    /// Folds catalog rejections into `Failure`. Storage errors are not user
    /// facing and stay on the `Err` side.
    pub fn from_result(result: RegistryResult<T>) -> Result<Self, StorageError> {
        match result {
            Ok(data) => Ok(Reply::Success(data)),
            Err(RegistryError::Storage(err)) => Err(err),
            Err(rejection) => Ok(Reply::Failure(rejection.to_string())),
        }
    }

    pub fn status(&self) -> bool {
        matches!(self, Reply::Success(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Reply::Success(_) => None,
            Reply::Failure(message) => Some(message),
        }
    }
}

impl<T: Serialize> Serialize for Reply<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Reply", 2)?;
        match self {
            Reply::Success(data) => {
                state.serialize_field("status", &true)?;
                state.serialize_field("data", data)?;
            }
            Reply::Failure(message) => {
                state.serialize_field("status", &false)?;
                state.serialize_field("message", message)?;
            }
        }
        state.end()
    }
}
