#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
    retry_after_secs: Option<u64>,
}

impl HttpApiError {
    fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ApiError::new(code, message, None),
            retry_after_secs: None,
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, message)
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, ErrorCode::Forbidden, message)
    }

    fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidInput, message)
    }
}

impl From<EngineError> for HttpApiError {
    fn from(err: EngineError) -> Self {
        let (status, code) = match &err {
            EngineError::NotFound { .. } => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
            EngineError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized),
            EngineError::Forbidden(_) => (StatusCode::FORBIDDEN, ErrorCode::Forbidden),
            EngineError::CooldownActive { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, ErrorCode::CooldownActive)
            }
            EngineError::InvalidReward(_) => (StatusCode::BAD_REQUEST, ErrorCode::InvalidReward),
            EngineError::InvalidInput(_) => (StatusCode::BAD_REQUEST, ErrorCode::InvalidInput),
            EngineError::InvalidState(_) => (StatusCode::CONFLICT, ErrorCode::InvalidState),
        };

        let mut mapped = Self::new(status, code, err.to_string());
        if let EngineError::CooldownActive { retry_after_ms, .. } = &err {
            mapped.error.details = Some(format!("retry_after_ms={retry_after_ms}"));
            let secs = u64::try_from(*retry_after_ms).unwrap_or(0).div_ceil(1000);
            mapped.retry_after_secs = Some(secs.max(1));
        }
        warn!(status = status.as_u16(), error = %err, "request rejected");
        mapped
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.error)).into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
