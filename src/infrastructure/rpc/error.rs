//! Mapping between domain errors and JSON-RPC error objects

use crate::domain::shared::DomainError;
use jsonrpsee::core::ClientError;
use jsonrpsee::types::ErrorObjectOwned;

pub const NOT_FOUND_CODE: i32 = 404;
pub const ALREADY_EXISTS_CODE: i32 = 409;
pub const INVALID_CODE: i32 = 400;
pub const INTERNAL_CODE: i32 = 500;

pub fn to_rpc_error(err: DomainError) -> ErrorObjectOwned {
    let code = match &err {
        DomainError::NotFound(_) => NOT_FOUND_CODE,
        DomainError::AlreadyExists(_) => ALREADY_EXISTS_CODE,
        DomainError::ValidationError(_)
        | DomainError::InvalidOperation(_)
        | DomainError::InvalidStateTransition(_) => INVALID_CODE,
        DomainError::Upstream(_) | DomainError::Internal(_) => INTERNAL_CODE,
    };
    ErrorObjectOwned::owned(code, err.to_string(), None::<()>)
}

pub fn from_client_error(method: &str, err: ClientError) -> DomainError {
    match err {
        ClientError::Call(object) => match object.code() {
            NOT_FOUND_CODE => DomainError::NotFound(format!("{}: {}", method, object.message())),
            ALREADY_EXISTS_CODE => {
                DomainError::AlreadyExists(format!("{}: {}", method, object.message()))
            }
            INVALID_CODE => DomainError::ValidationError(format!("{}: {}", method, object.message())),
            _ => DomainError::Upstream(format!("{}: {}", method, object.message())),
        },
        other => DomainError::Upstream(format!("{}: {}", method, other)),
    }
}
