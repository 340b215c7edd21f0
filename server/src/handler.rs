//! Per-message dispatch for registered clients
//!
//! This is the boundary where every [`HandleError`] ends: framing problems
//! and cancellations are logged, cheats disconnect the sender, and internal
//! failures drop only the connection they happened on.

use crate::client_manager::Client;
use crate::error::{HandleError, HandleResult};
use crate::messages;
use crate::state::ServerState;
use log::{debug, error, info, trace, warn};
use rand::Rng;
use shared::protocol::AlterGameTag;
use shared::{DisconnectReason, GameCode, GameOptions, MessageFlags, MessageReader};

/// Messages only the host of a game may send
fn is_host_only(flag: MessageFlags) -> bool {
    matches!(
        flag,
        MessageFlags::StartGame
            | MessageFlags::RemovePlayer
            | MessageFlags::KickWithReason
            | MessageFlags::EndGame
            | MessageFlags::AlterGame
            | MessageFlags::KickPlayer
    )
}

/// Messages whose bodies are legitimately left partly unread
fn may_leave_bytes(flag: MessageFlags) -> bool {
    matches!(
        flag,
        MessageFlags::GameData | MessageFlags::GameDataTo | MessageFlags::EndGame
    )
}

/// Handles every message in one datagram payload, in order
pub async fn handle_payload(state: &ServerState, client_id: i32, payload: &[u8], reliable: bool) {
    for message in shared::read_messages(payload) {
        let mut message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed payload from client {}: {}", client_id, e);
                return;
            }
        };

        let Some(flag) = MessageFlags::from_u8(message.tag()) else {
            warn!("Client {} sent unknown message {}", client_id, message.tag());
            continue;
        };
        trace!("Client {} sent {:?}", client_id, flag);

        match handle_message(state, client_id, flag, &mut message, reliable).await {
            Ok(()) if !message.is_exhausted() && !may_leave_bytes(flag) => warn!(
                "Client {} left {} bytes of {:?} unread",
                client_id,
                message.remaining(),
                flag
            ),
            Ok(()) => {}
            Err(error) => handle_error(state, client_id, error).await,
        }
    }
}

async fn handle_message(
    state: &ServerState,
    client_id: i32,
    flag: MessageFlags,
    message: &mut MessageReader<'_>,
    reliable: bool,
) -> HandleResult {
    let Some(client) = state.clients.get(client_id) else {
        return Err(HandleError::cancel(format!("client {} is gone", client_id)));
    };

    match flag {
        MessageFlags::HostGame => host_game(state, &client, message).await,
        MessageFlags::JoinGame => join_game(state, &client, message).await,
        MessageFlags::GetGameListV2 => game_list(state, &client).await,
        MessageFlags::StartGame
        | MessageFlags::RemovePlayer
        | MessageFlags::GameData
        | MessageFlags::GameDataTo
        | MessageFlags::EndGame
        | MessageFlags::AlterGame
        | MessageFlags::KickPlayer
        | MessageFlags::KickWithReason => in_game(state, &client, flag, message, reliable).await,
        MessageFlags::RemoveGame | MessageFlags::JoinedGame | MessageFlags::WaitForHost => {
            debug!("Client {} sent server-only message {:?}", client_id, flag);
            Ok(())
        }
    }
}

async fn host_game(state: &ServerState, client: &Client, message: &mut MessageReader<'_>) -> HandleResult {
    let options = GameOptions::deserialize(message.read_bytes_and_size()?)?;

    // A client only ever waits on its latest lobby
    state.games.release_hosted(client.id).await;
    let (code, _game) = state.games.create_for(client.id, options, client.version);

    info!("Client {} ({}) is hosting game {}", client.id, client.name, code);
    client
        .connection
        .send_reliable(messages::host_game_reply(code));
    Ok(())
}

async fn join_game(state: &ServerState, client: &Client, message: &mut MessageReader<'_>) -> HandleResult {
    let code = GameCode::new(message.read_i32()?);

    let Some(game) = state.games.find(code) else {
        info!("Client {} tried to join unknown game {}", client.id, code);
        client
            .connection
            .send_reliable(messages::join_error(DisconnectReason::GameNotFound, None));
        client.connection.disconnect(DisconnectReason::GameNotFound, None);
        return Ok(());
    };

    let in_other_game = match client.game {
        Some(other) if other != code => match state.games.find(other) {
            Some(other) => other.read().await.contains(client.id),
            None => false,
        },
        _ => false,
    };

    let result = game.write().await.add_client(client, in_other_game);
    match result {
        Ok(joined) => {
            debug!("Client {} join of {}: {:?}", client.id, code, joined);
            state.clients.set_game(client.id, Some(code));
        }
        Err(refusal) => {
            info!("Client {} could not join {}: {}", client.id, code, refusal);
            let (reason, text) = refusal.reason();
            client
                .connection
                .send_reliable(messages::join_error(reason, text.as_deref()));
            client.connection.disconnect(reason, text);
        }
    }
    Ok(())
}

async fn game_list(state: &ServerState, client: &Client) -> HandleResult {
    let listings = state
        .games
        .listings(client.version.compatibility(), state.config.server.max_listings)
        .await;
    let json = shared::listing::to_json(&listings)
        .map_err(|e| HandleError::internal(format!("could not render game list: {}", e)))?;

    client.connection.send_reliable(messages::game_list(&json));
    Ok(())
}

/// Messages addressed to the sender's current game
async fn in_game(
    state: &ServerState,
    client: &Client,
    flag: MessageFlags,
    message: &mut MessageReader<'_>,
    reliable: bool,
) -> HandleResult {
    let code = GameCode::new(message.read_i32()?);
    if client.game != Some(code) {
        debug!("Client {} sent {:?} for game {} it is not in", client.id, flag, code);
        return Ok(());
    }
    let Some(handle) = state.games.find(code) else {
        return Ok(());
    };

    let mut game = handle.write().await;
    if !game.contains(client.id) {
        debug!("Client {} is no longer in game {}", client.id, code);
        return Ok(());
    }
    if is_host_only(flag) && !game.is_host(client.id) {
        warn!("Client {} sent {:?} but is not the host of {}", client.id, flag, code);
        return Ok(());
    }

    match flag {
        MessageFlags::StartGame => game.start_game(message.raw()),
        MessageFlags::EndGame => game.end_game(message.raw()),
        MessageFlags::AlterGame => {
            let tag = message.read_u8()?;
            match AlterGameTag::from_u8(tag) {
                Some(AlterGameTag::ChangePrivacy) => {
                    let is_public = message.read_bool()?;
                    game.set_public(is_public);
                }
                None => warn!("Client {} sent unknown AlterGame tag {}", client.id, tag),
            }
        }
        MessageFlags::RemovePlayer => {
            let target = message.read_packed_i32()?;
            let reason = DisconnectReason::from_u8(message.read_u8()?)
                .unwrap_or(DisconnectReason::ExitGame);
            game.remove_player(target, reason);
        }
        MessageFlags::KickPlayer => {
            let target = message.read_packed_i32()?;
            let ban = message.read_bool()?;
            info!("Host of {} kicked client {} (ban: {})", code, target, ban);
            game.kick(target, ban);
        }
        MessageFlags::KickWithReason => {
            let target = message.read_packed_i32()?;
            let reason = message.read_string()?;
            game.kick_with_reason(target, &reason);
        }
        MessageFlags::GameData => {
            game.handle_game_data(client.id, None, message)?;
            game.send_to_all_except(client.id, message.raw(), reliable);
        }
        MessageFlags::GameDataTo => {
            let target = message.read_packed_i32()?;
            game.handle_game_data(client.id, Some(target), message)?;
            game.send_to(target, message.raw(), reliable);
        }
        _ => {}
    }
    Ok(())
}

/// Random code a cheater can quote to an admin; it is also in the log
fn support_code() -> String {
    let value = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:03}-{:03}", value / 1000, value % 1000)
}

async fn handle_error(state: &ServerState, client_id: i32, error: HandleError) {
    match error {
        HandleError::Framing(e) => warn!("Malformed message from client {}: {}", client_id, e),
        HandleError::Cancel(reason) => debug!("Message from client {} cancelled: {}", client_id, reason),
        HandleError::Internal(reason) => {
            error!("Internal error handling client {}: {}", client_id, reason);
            if let Some(client) = state.clients.get(client_id) {
                client.connection.disconnect(DisconnectReason::Error, None);
            }
        }
        HandleError::Cheat(reason) => report_cheat(state, client_id, &reason).await,
    }
}

async fn report_cheat(state: &ServerState, client_id: i32, reason: &str) {
    let Some(client) = state.clients.get(client_id) else {
        return;
    };
    let anti_cheat = &state.config.anti_cheat;

    if !anti_cheat.enabled {
        warn!(
            "Client {} ({}) broke a protocol rule: {}",
            client.id, client.name, reason
        );
        return;
    }

    let support = support_code();
    warn!(
        "Client {} ({}) caught cheating [{}]: {}",
        client.id, client.name, support, reason
    );

    let ban = anti_cheat.ban_ip_from_game;
    if let Some(handle) = client.game.and_then(|code| state.games.find(code)) {
        let mut game = handle.write().await;
        if ban {
            game.ban_ip(client.connection.ip());
        }
        let removal = if ban {
            DisconnectReason::Banned
        } else {
            DisconnectReason::Kicked
        };
        game.remove_player(client.id, removal);
    }

    if anti_cheat.ban_globally {
        state.bans.ban_client(
            &client.name,
            client.connection.ip(),
            &client.device_id,
            &format!("Cheating: {}", reason),
        );
    }

    let text = format!(
        "You have been caught cheating and were {} from the lobby.\nFor questions, contact your server admin and share the following code: {}.",
        if ban { "banned" } else { "kicked" },
        support
    );
    client.connection.disconnect(DisconnectReason::Custom, Some(text));
}

/// Cleans up after a connection closed, for whatever reason
pub async fn handle_disconnect(state: &ServerState, client_id: i32) {
    let Some(client) = state.clients.get(client_id) else {
        return;
    };

    if let Some(handle) = client.game.and_then(|code| state.games.find(code)) {
        handle
            .write()
            .await
            .remove_player(client_id, DisconnectReason::ExitGame);
    }
    state.games.release_hosted(client_id).await;

    state.clients.remove(client_id);
    info!("Client {} ({}) disconnected", client.id, client.name);
}
