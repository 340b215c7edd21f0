//! Operator commands read from stdin

use crate::state::ServerState;
use log::info;
use shared::DisconnectReason;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Commands:
  help                          show this list
  ids                           list connected clients
  games                         list running games
  kick <id> [reason]            disconnect a client
  ban <ip|deviceId> [reason]    ban an address or device and drop matching clients
  unban <ip|deviceId>           lift a ban
  warning <text>                send a chat line to every spawned player
  exit                          stop the server";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Output(String),
    Exit,
}

/// Runs one command line and returns what to print
pub async fn execute(state: &ServerState, line: &str) -> Reply {
    let line = line.trim();
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let output = match command {
        "help" => HELP.to_string(),
        "exit" => return Reply::Exit,
        "ids" => ids(state),
        "games" => games(state).await,
        "kick" => kick(state, rest).await,
        "ban" => ban(state, rest).await,
        "unban" if !rest.is_empty() => {
            if state.bans.unban(rest) {
                format!("Unbanned {}", rest)
            } else {
                format!("{} was not banned", rest)
            }
        }
        "warning" if !rest.is_empty() => warning(state, rest).await,
        _ => "Command not recognized.".to_string(),
    };
    Reply::Output(output)
}

fn ids(state: &ServerState) -> String {
    let mut lines = vec![format!("{:<12} | {:<6} | {}", "NAME", "ID", "GAME")];
    for client in state.clients.snapshot() {
        let game = client
            .game
            .map(|code| code.to_string())
            .unwrap_or_else(|| "Not in game".to_string());
        lines.push(format!("{:<12} | {:<6} | {}", client.name, client.id, game));
    }
    lines.join("\n")
}

async fn games(state: &ServerState) -> String {
    let mut lines = vec![format!("{:<8} | {:<7} | {:<10} | {}", "CODE", "PLAYERS", "STATE", "HOST")];
    for code in state.games.codes() {
        let Some(handle) = state.games.find(code) else {
            continue;
        };
        let game = handle.read().await;
        lines.push(format!(
            "{:<8} | {:<7} | {:<10} | {}",
            code.to_string(),
            format!("{}/{}", game.player_count(), game.options().max_players),
            format!("{:?}", game.state()),
            game.host_name().unwrap_or("-")
        ));
    }
    lines.join("\n")
}

async fn kick(state: &ServerState, args: &str) -> String {
    let (id, reason) = args.split_once(' ').unwrap_or((args, ""));
    let Ok(client_id) = id.parse::<i32>() else {
        return "Usage: kick <id> [reason]".to_string();
    };
    let Some(client) = state.clients.get(client_id) else {
        return format!("No client with id {}", client_id);
    };

    let reason = reason.trim();
    if reason.is_empty() {
        client.connection.disconnect(DisconnectReason::Kicked, None);
    } else {
        client
            .connection
            .disconnect(DisconnectReason::Custom, Some(reason.to_string()));
    }

    if let Some(handle) = client.game.and_then(|code| state.games.find(code)) {
        handle
            .write()
            .await
            .remove_player(client_id, DisconnectReason::Kicked);
    }

    info!("Console kicked client {} ({})", client.id, client.name);
    format!("Kicked {} ({})", client.name, client.id)
}

async fn ban(state: &ServerState, args: &str) -> String {
    let (identifier, reason) = args.split_once(' ').unwrap_or((args, ""));
    if identifier.is_empty() {
        return "Usage: ban <ip|deviceId> [reason]".to_string();
    }
    let reason = match reason.trim() {
        "" => "Banned by an administrator",
        reason => reason,
    };

    if !state.bans.ban(identifier, reason) {
        return format!("{} is already banned", identifier);
    }

    let mut dropped = 0;
    for client in state.clients.snapshot() {
        let matches = client.connection.ip().to_string() == identifier || client.device_id == identifier;
        if !matches {
            continue;
        }

        if let Some(handle) = client.game.and_then(|code| state.games.find(code)) {
            handle
                .write()
                .await
                .remove_player(client.id, DisconnectReason::Banned);
        }
        client.connection.disconnect(DisconnectReason::Banned, None);
        dropped += 1;
    }

    info!("Console banned {}: {}", identifier, reason);
    format!("Banned {} ({} client(s) disconnected)", identifier, dropped)
}

async fn warning(state: &ServerState, text: &str) -> String {
    let mut delivered = 0;
    for code in state.games.codes() {
        let Some(handle) = state.games.find(code) else {
            continue;
        };
        let game = handle.read().await;
        for session in game.sessions() {
            if game.send_server_chat(session.client_id, text) {
                delivered += 1;
            }
        }
    }
    format!("Warning sent to {} player(s)", delivered)
}

/// Reads commands until `exit` or end of input
pub async fn run(state: Arc<ServerState>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                log::error!("Failed to read console input: {}", e);
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match execute(&state, &line).await {
            Reply::Output(output) => println!("{}", output),
            Reply::Exit => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ban_manager::BanManager;
    use crate::config::Config;
    use crate::connection::{ConnectionHandle, Outbound};
    use shared::GameVersion;

    fn test_state() -> ServerState {
        ServerState::new(Config::default(), BanManager::new())
    }

    fn output(reply: Reply) -> String {
        match reply {
            Reply::Output(output) => output,
            Reply::Exit => panic!("unexpected exit"),
        }
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let state = test_state();
        assert_eq!(
            execute(&state, "dance").await,
            Reply::Output("Command not recognized.".to_string())
        );
        assert_eq!(
            execute(&state, "warning").await,
            Reply::Output("Command not recognized.".to_string())
        );
    }

    #[tokio::test]
    async fn test_exit() {
        assert_eq!(execute(&test_state(), " exit ").await, Reply::Exit);
    }

    #[tokio::test]
    async fn test_ids_lists_clients() {
        let state = test_state();
        let (connection, _rx) = ConnectionHandle::new("127.0.0.1:5000".parse().unwrap());
        state
            .clients
            .register(connection, "Red", GameVersion::new(2024, 6, 22, 0), "")
            .unwrap();

        let table = output(execute(&state, "ids").await);
        assert!(table.starts_with("NAME"));
        assert!(table.contains("Red"));
        assert!(table.contains("Not in game"));
    }

    #[tokio::test]
    async fn test_kick_disconnects_with_reason() {
        let state = test_state();
        let (connection, mut rx) = ConnectionHandle::new("127.0.0.1:5000".parse().unwrap());
        let id = state
            .clients
            .register(connection, "Red", GameVersion::new(2024, 6, 22, 0), "")
            .unwrap();

        output(execute(&state, &format!("kick {} be nice", id)).await);
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Disconnect {
                reason: DisconnectReason::Custom,
                message: Some("be nice".to_string())
            }
        );

        assert!(output(execute(&state, "kick 999").await).contains("No client"));
    }

    #[tokio::test]
    async fn test_ban_and_unban() {
        let state = test_state();
        let (connection, mut rx) = ConnectionHandle::new("10.0.0.9:5000".parse().unwrap());
        state
            .clients
            .register(connection, "Red", GameVersion::new(2024, 6, 22, 0), "")
            .unwrap();

        let reply = output(execute(&state, "ban 10.0.0.9 spam").await);
        assert!(reply.contains("1 client(s)"));
        assert!(matches!(
            rx.try_recv().unwrap(),
            Outbound::Disconnect { reason: DisconnectReason::Banned, .. }
        ));
        assert!(output(execute(&state, "ban 10.0.0.9").await).contains("already banned"));

        assert_eq!(
            execute(&state, "unban 10.0.0.9").await,
            Reply::Output("Unbanned 10.0.0.9".to_string())
        );
        assert!(state.bans.is_empty());
    }

    #[tokio::test]
    async fn test_games_table() {
        let state = test_state();
        let (code, _game) = state
            .games
            .create(shared::GameOptions::default(), GameVersion::new(2024, 6, 22, 0));

        let table = output(execute(&state, "games").await);
        assert!(table.contains(&code.to_string()));
        assert!(table.contains("0/10"));
    }
}
