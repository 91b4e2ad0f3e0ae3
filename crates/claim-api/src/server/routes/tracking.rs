#[derive(Debug, Deserialize, Default)]
struct StartRouteRequest {
    player_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoutePointRequest {
    #[serde(flatten)]
    position: Position,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct RoutePointResponse {
    route_id: String,
    point_count: usize,
}

async fn start_route(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<StartRouteRequest>,
) -> Result<impl IntoResponse, HttpApiError> {
    let actor = acting_identity(&state, &headers, request.player_id.as_deref())?;
    let route = state.engine().start_route(&actor)?;
    Ok((StatusCode::CREATED, Json(route)))
}

async fn append_route_point(
    Path(route_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RoutePointRequest>,
) -> Result<Json<RoutePointResponse>, HttpApiError> {
    ensure_route_access(&state, &headers, &route_id)?;
    let point_count =
        state
            .engine()
            .append_route_point(&route_id, request.position, request.timestamp)?;

    Ok(Json(RoutePointResponse {
        route_id,
        point_count,
    }))
}

async fn stop_route(
    Path(route_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Route>, HttpApiError> {
    ensure_route_access(&state, &headers, &route_id)?;
    Ok(Json(state.engine().stop_route(&route_id)?))
}

async fn get_route(
    Path(route_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Route>, HttpApiError> {
    Ok(Json(state.engine().get_route(&route_id)?))
}

/// An authenticated caller may only touch its own routes unless it is an
/// admin. Anonymous callers are let through like the other body-keyed
/// endpoints.
fn ensure_route_access(
    state: &AppState,
    headers: &HeaderMap,
    route_id: &str,
) -> Result<(), HttpApiError> {
    let Some(identity) = optional_identity(state, headers) else {
        return Ok(());
    };
    let route = state.engine().get_route(route_id)?;
    acting_player(Some(&identity), Some(&route.player_id)).map(|_| ())
}
