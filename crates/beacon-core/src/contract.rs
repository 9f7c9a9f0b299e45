use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::problem::{response_shape_error, ApiError};

/// Output contract for responses whose shape clients depend on.
///
/// `check` returns a description of the first violation found.
pub trait ResponseContract {
    fn check(&self) -> Result<(), String>;
}

/// Serialize `body` with `status` only when it honors its contract.
///
/// A violation is logged and reported as `InternalResponseShapeError` so a
/// malformed payload never reaches the client.
pub fn contract_json<T>(status: StatusCode, body: T) -> Result<(StatusCode, Json<T>), ApiError>
where
    T: Serialize + ResponseContract,
{
    if let Err(reason) = body.check() {
        error!("Response failed its output contract: {}", reason);
        return Err(response_shape_error());
    }
    Ok((status, Json(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[derive(Debug, Serialize)]
    struct Counted {
        ok: bool,
        count: i64,
    }

    impl ResponseContract for Counted {
        fn check(&self) -> Result<(), String> {
            if !self.ok {
                return Err("ok must be true".into());
            }
            if self.count < 0 {
                return Err(format!("count must be non-negative, got {}", self.count));
            }
            Ok(())
        }
    }

    #[test]
    fn test_contract_passes_valid_body() {
        let (status, Json(body)) =
            contract_json(StatusCode::CREATED, Counted { ok: true, count: 2 }).unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.count, 2);
    }

    #[test]
    fn test_contract_fails_closed() {
        let error = contract_json(StatusCode::OK, Counted { ok: true, count: -1 }).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InternalResponseShapeError);
    }
}
