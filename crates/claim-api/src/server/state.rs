/// Shared request state: the engine facade and the credential resolver.
#[derive(Debug, Clone)]
pub struct AppState {
    api: EngineApi,
    credentials: Arc<dyn CredentialService>,
}

impl AppState {
    /// Uses the built-in resolver that treats the bearer token as a player id.
    pub fn new(api: EngineApi) -> Self {
        let credentials = Arc::new(PlayerIdCredentials::new(api.shared_engine()));
        Self::with_credentials(api, credentials)
    }

    pub fn with_credentials(api: EngineApi, credentials: Arc<dyn CredentialService>) -> Self {
        Self { api, credentials }
    }

    fn engine(&self) -> &ClaimEngine {
        self.api.engine()
    }

    fn resolve_token(&self, token: &str) -> Option<Identity> {
        self.credentials.resolve(token)
    }
}

fn optional_identity(state: &AppState, headers: &HeaderMap) -> Option<Identity> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    state.resolve_token(bearer_token(header)?)
}

fn require_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity, HttpApiError> {
    optional_identity(state, headers)
        .ok_or_else(|| HttpApiError::unauthorized("a valid bearer token is required"))
}

/// Picks the player a request acts for. An authenticated caller acts for
/// itself (an admin may name another player); without credentials the
/// player named in the request is taken as is.
fn acting_player(identity: Option<&Identity>, named: Option<&str>) -> Result<String, HttpApiError> {
    match (identity, named) {
        (Some(identity), Some(named)) if named != identity.player_id && !identity.is_admin() => {
            Err(HttpApiError::forbidden(format!(
                "player {} may not act for player {named}",
                identity.player_id
            )))
        }
        (_, Some(named)) => Ok(named.to_string()),
        (Some(identity), None) => Ok(identity.player_id.clone()),
        (None, None) => Err(HttpApiError::unauthorized(
            "no bearer token and no player_id in the request",
        )),
    }
}

/// Identity for operations that need a role or mode, falling back to the
/// player named in the body when no token was presented.
fn acting_identity(
    state: &AppState,
    headers: &HeaderMap,
    named: Option<&str>,
) -> Result<Identity, HttpApiError> {
    let identity = optional_identity(state, headers);
    let player_id = acting_player(identity.as_ref(), named)?;
    match identity {
        Some(identity) if identity.player_id == player_id => Ok(identity),
        _ => state
            .engine()
            .identity_for(&player_id)
            .ok_or_else(|| HttpApiError::unauthorized(format!("unknown player {player_id}"))),
    }
}
