#[derive(Debug, Serialize)]
struct PresenceResponse {
    schema_version: String,
    players: Vec<PresenceSnapshot>,
}

#[derive(Debug, Serialize)]
struct RoutesResponse {
    schema_version: String,
    player_id: String,
    routes: Vec<Route>,
}

async fn register_player(
    State(state): State<AppState>,
    Json(request): Json<NewPlayer>,
) -> Result<impl IntoResponse, HttpApiError> {
    let player = state.engine().register_player(request)?;
    Ok((StatusCode::CREATED, Json(player)))
}

async fn get_player(
    Path(player_id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, HttpApiError> {
    Ok(Json(state.engine().get_player(&player_id)?))
}

async fn update_position(
    Path(player_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(position): Json<Position>,
) -> Result<Json<PresenceSnapshot>, HttpApiError> {
    let identity = optional_identity(&state, &headers);
    let player_id = acting_player(identity.as_ref(), Some(&player_id))?;
    Ok(Json(state.engine().update_position(&player_id, position)?))
}

async fn credit_loot(
    Path(player_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(claim): Json<LootClaim>,
) -> Result<impl IntoResponse, HttpApiError> {
    let identity = optional_identity(&state, &headers);
    let player_id = acting_player(identity.as_ref(), Some(&player_id))?;
    Ok(Json(state.engine().credit_loot(&player_id, claim)?))
}

async fn live_players(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<PresenceResponse>, HttpApiError> {
    let players = match query.area()? {
        Some((center, radius)) => state.engine().query_nearby_players(center, radius)?,
        None => state.engine().live_players(),
    };

    Ok(Json(PresenceResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        players,
    }))
}

async fn list_player_routes(
    Path(player_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RoutesResponse>, HttpApiError> {
    let routes = state.engine().list_routes(&player_id)?;
    Ok(Json(RoutesResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        player_id,
        routes,
    }))
}
