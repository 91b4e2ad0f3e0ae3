#[derive(Debug, Deserialize, Default)]
struct StreamQuery {
    token: Option<String>,
}

/// Messages a connected client may send. Anything else is ignored with a
/// warning back to the sender.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundMessage {
    PositionUpdate { latitude: f64, longitude: f64 },
}

async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let identity = query
        .token
        .as_deref()
        .and_then(|token| state.resolve_token(token))
        .or_else(|| optional_identity(&state, &headers));

    ws.on_upgrade(move |socket| stream_socket(socket, state, identity))
}

async fn stream_socket(mut socket: WebSocket, state: AppState, identity: Option<Identity>) {
    let client = identity
        .as_ref()
        .map(|identity| identity.player_id.clone())
        .unwrap_or_else(|| "anonymous".to_string());
    // Subscribe before the hello so nothing committed in between is missed.
    let mut rx = state.engine().subscribe();
    let mut sequence = 0_u64;

    let hello =
        StreamMessage::live_players(next_sequence(&mut sequence), state.engine().live_players());
    if send_stream_message(&mut socket, &hello).await.is_err() {
        return;
    }
    info!(%client, "stream client connected");

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let rejected = handle_inbound(&state, identity.as_ref(), text.as_str());
                        if let Some(reason) = rejected {
                            let seq = next_sequence(&mut sequence);
                            let warning = StreamMessage::warning(seq, reason);
                            if send_stream_message(&mut socket, &warning).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        break;
                    }
                    _ => {}
                }
            }
            outgoing = rx.recv() => {
                match outgoing {
                    Ok(event) => {
                        let message = StreamMessage::event(next_sequence(&mut sequence), &event);
                        if send_stream_message(&mut socket, &message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%client, skipped, "stream client lagged");
                        let warning = StreamMessage::warning(
                            next_sequence(&mut sequence),
                            format!("stream client lagged and skipped {skipped} message(s)"),
                        );

                        if send_stream_message(&mut socket, &warning).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        }
    }

    info!(%client, "stream client disconnected");
}

/// Applies an inbound client message. Returns a warning to send back when
/// the message was not applied.
fn handle_inbound(state: &AppState, identity: Option<&Identity>, text: &str) -> Option<String> {
    let message = match serde_json::from_str::<InboundMessage>(text) {
        Ok(message) => message,
        Err(err) => return Some(format!("unrecognized message: {err}")),
    };

    match message {
        InboundMessage::PositionUpdate {
            latitude,
            longitude,
        } => {
            let Some(identity) = identity else {
                return Some("position_update requires a token".to_string());
            };
            state
                .engine()
                .update_position(&identity.player_id, Position::new(latitude, longitude))
                .err()
                .map(|err| err.to_string())
        }
    }
}

fn next_sequence(sequence: &mut u64) -> u64 {
    *sequence += 1;
    *sequence
}

async fn send_stream_message(
    socket: &mut WebSocket,
    message: &StreamMessage,
) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(message).map_err(axum::Error::new)?;
    socket.send(Message::Text(payload.into())).await
}

#[derive(Debug, Clone, Serialize)]
struct StreamMessage {
    schema_version: String,
    #[serde(rename = "type")]
    message_type: String,
    sequence: u64,
    emitted_at: DateTime<Utc>,
    payload: Value,
}

impl StreamMessage {
    fn live_players(sequence: u64, players: Vec<PresenceSnapshot>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: "players.live".to_string(),
            sequence,
            emitted_at: Utc::now(),
            payload: json!({ "players": players }),
        }
    }

    fn event(sequence: u64, event: &EngineEvent) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: event.kind().to_string(),
            sequence,
            emitted_at: Utc::now(),
            payload: json!(event),
        }
    }

    fn warning(sequence: u64, warning: String) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: "warning".to_string(),
            sequence,
            emitted_at: Utc::now(),
            payload: json!({ "message": warning }),
        }
    }
}
