use crate::errors::DbError;
use serde::Serialize;

/// Stable envelope shape a transport adapter serializes.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response<T> {
    pub success: bool,
    pub data: T,
    pub error: Option<ErrorBody>,
}

impl<T> Response<T> {
    #[must_use]
    pub const fn ok(data: T) -> Self {
        Self { success: true, data, error: None }
    }

    #[must_use]
    pub fn fail(data: T, err: &DbError) -> Self {
        Self {
            success: false,
            data,
            error: Some(ErrorBody { message: err.to_string(), code: err.code() }),
        }
    }
}

impl<T: Default> Response<T> {
    pub fn from_result(res: Result<T, DbError>) -> Self {
        match res {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(T::default(), &e),
        }
    }
}
