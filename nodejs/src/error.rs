use napi::bindgen_prelude::*;

/// Convert bridge errors to NAPI errors with descriptive codes
pub fn convert_error(err: ae_bridge::Error) -> Error {
    let (code, message) = match &err {
        ae_bridge::Error::InvalidFourCharCode(_) => ("ERR_INVALID_CODE", err.to_string()),
        ae_bridge::Error::MissingAttribute(_) => ("ERR_MISSING_ATTRIBUTE", err.to_string()),
        ae_bridge::Error::RuntimeClosed => ("ERR_RUNTIME_CLOSED", err.to_string()),
        ae_bridge::Error::AlreadyInitialized => (
            "ERR_ALREADY_INITIALIZED",
            "configure() must be called before any other bridge function".to_string(),
        ),
        ae_bridge::Error::Native { .. } => ("ERR_NATIVE", err.to_string()),
        ae_bridge::Error::Encode(msg) => ("ERR_ENCODE", msg.clone()),
    };

    Error::new(Status::GenericFailure, format!("[{}] {}", code, message))
}

/// Extension trait for converting bridge Results to NAPI Results
pub trait IntoNapiResult<T> {
    fn into_napi(self) -> Result<T>;
}

impl<T> IntoNapiResult<T> for ae_bridge::Result<T> {
    fn into_napi(self) -> Result<T> {
        self.map_err(convert_error)
    }
}
