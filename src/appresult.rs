use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

/// Failure taxonomy shared by every operation. Everything but `Internal` is a
/// caller-facing verdict; `Internal` wraps whatever the store or the identity
/// authority threw at us.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    FailedPrecondition(String),
    #[error("{0:#}")]
    Internal(anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> &'static str {
        use AppError::*;
        match self {
            Unauthenticated(_) => "UNAUTHENTICATED",
            InvalidArgument(_) => "INVALID_ARGUMENT",
            PermissionDenied(_) => "PERMISSION_DENIED",
            NotFound(_) => "NOT_FOUND",
            FailedPrecondition(_) => "FAILED_PRECONDITION",
            Internal(_) => "INTERNAL",
        }
    }

    fn status_code(&self) -> StatusCode {
        use AppError::*;
        match self {
            Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            InvalidArgument(_) | FailedPrecondition(_) => StatusCode::BAD_REQUEST,
            PermissionDenied(_) => StatusCode::FORBIDDEN,
            NotFound(_) => StatusCode::NOT_FOUND,
            Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The store refused the write because another writer got there first
    /// (SQLITE_BUSY / SQLITE_LOCKED and their extended codes).
    pub fn is_contention(&self) -> bool {
        let AppError::Internal(err) = self else {
            return false;
        };
        match err.downcast_ref::<sqlx::Error>() {
            Some(sqlx::Error::Database(db_err)) => db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
            Some(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(err) = &self {
            tracing::error!(error = ?err, "internal error");
        }

        (
            self.status_code(),
            Json(json!({
                "error": {
                    "status": self.status(),
                    "message": self.to_string(),
                }
            })),
        )
            .into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self::Internal(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self::Internal(anyhow::Error::msg(err.to_owned()))
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(anyhow::Error);
apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(sqlx::migrate::MigrateError);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(reqwest::Error);
apperr_impl!(time::error::ComponentRange);

impl<E: core::error::Error + Send + Sync + 'static, R: oauth2::ErrorResponse + Send + Sync + 'static> From<oauth2::RequestTokenError<E, R>> for AppError {
    fn from(err: oauth2::RequestTokenError<E, R>) -> Self {
        Self::Internal(anyhow::Error::from(err))
    }
}
