fn apply_cors_headers(headers: &mut axum::http::HeaderMap) {
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("authorization,content-type"),
    );
    headers.insert(
        HeaderName::from_static("access-control-max-age"),
        HeaderValue::from_static("3600"),
    );
}

#[derive(Debug, Deserialize, Default)]
struct NearbyQuery {
    lat: Option<f64>,
    lon: Option<f64>,
    radius: Option<f64>,
}

impl NearbyQuery {
    /// `None` when no area was given; every field or none must be present.
    fn area(&self) -> Result<Option<(Position, f64)>, HttpApiError> {
        match (self.lat, self.lon, self.radius) {
            (Some(lat), Some(lon), Some(radius)) => Ok(Some((Position::new(lat, lon), radius))),
            (None, None, None) => Ok(None),
            _ => Err(HttpApiError::invalid_input(
                "lat, lon and radius must be given together",
            )),
        }
    }
}
