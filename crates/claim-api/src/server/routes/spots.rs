#[derive(Debug, Deserialize)]
struct CreateSpotRequest {
    #[serde(flatten)]
    spot: NewSpot,
    creator_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManualLogRequest {
    player_id: Option<String>,
    distance: Option<f64>,
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AutoLogRequest {
    player_id: Option<String>,
    distance: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct LogsQuery {
    spot_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpotsResponse {
    schema_version: String,
    spots: Vec<Spot>,
}

#[derive(Debug, Serialize)]
struct LogsResponse {
    schema_version: String,
    logs: Vec<LogEntry>,
}

#[derive(Debug, Serialize)]
struct HeatmapResponse {
    schema_version: String,
    player_id: String,
    entries: Vec<HeatmapEntry>,
}

async fn list_spots(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<SpotsResponse>, HttpApiError> {
    let spots = match query.area()? {
        Some((center, radius)) => state.engine().query_nearby_spots(center, radius)?,
        None => state.engine().list_spots(),
    };

    Ok(Json(SpotsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        spots,
    }))
}

async fn create_spot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSpotRequest>,
) -> Result<impl IntoResponse, HttpApiError> {
    let creator = acting_identity(&state, &headers, request.creator_id.as_deref())?;
    let spot = state.engine().create_spot(&creator, request.spot)?;
    Ok((StatusCode::CREATED, Json(spot)))
}

async fn manual_log(
    Path(spot_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ManualLogRequest>,
) -> Result<impl IntoResponse, HttpApiError> {
    let identity = optional_identity(&state, &headers);
    let player_id = acting_player(identity.as_ref(), request.player_id.as_deref())?;
    let outcome = state
        .engine()
        .manual_log(&spot_id, &player_id, request.distance, request.note)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn auto_log(
    Path(spot_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AutoLogRequest>,
) -> Result<impl IntoResponse, HttpApiError> {
    let identity = optional_identity(&state, &headers);
    let player_id = acting_player(identity.as_ref(), request.player_id.as_deref())?;
    let outcome = state
        .engine()
        .auto_log(&spot_id, &player_id, request.distance)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<LogsResponse> {
    let logs = match query.spot_id.as_deref() {
        Some(spot_id) => state.engine().logs_for_spot(spot_id),
        None => state.engine().list_logs(),
    };

    Json(LogsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        logs,
    })
}

/// Only the player themself or an admin may read a heatmap.
async fn get_heatmap(
    Path(player_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<HeatmapResponse>, HttpApiError> {
    let identity = require_identity(&state, &headers)?;
    if identity.player_id != player_id && !identity.is_admin() {
        return Err(HttpApiError::forbidden(format!(
            "heatmap of player {player_id} is private"
        )));
    }

    let entries = state.engine().heatmap_for(&player_id)?;
    Ok(Json(HeatmapResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        player_id,
        entries,
    }))
}
