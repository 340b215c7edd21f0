//! Minimal protocol client: connects, hosts a game, joins it, makes it
//! public and prints the resulting game list.

use clap::Parser;
use server::messages::requests;
use server::network::ack_datagram;
use shared::protocol::{MessageFlags, SendOption};
use shared::{listing, read_messages, DisconnectReason, GameCode, GameOptions, GameVersion, MessageReader};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:22023")]
    server: SocketAddr,
    /// Display name to connect with
    #[clap(short, long, default_value = "Tester")]
    name: String,
}

const DEVICE_ID: &str = "00112233445566778899aabbccddeeff";

struct Client {
    socket: UdpSocket,
    server: SocketAddr,
    nonce: u16,
}

impl Client {
    async fn connect(server: SocketAddr, name: &str) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        println!("Client socket bound to {}", socket.local_addr()?);

        let mut client = Client {
            socket,
            server,
            nonce: 0,
        };

        let handshake = requests::handshake(GameVersion::new(2024, 6, 22, 0), name, Some(DEVICE_ID));
        client.nonce += 1;
        let [high, low] = client.nonce.to_be_bytes();
        let mut hello = vec![SendOption::Hello.as_u8(), high, low, 0];
        hello.extend_from_slice(&handshake);
        client.socket.send_to(&hello, server).await?;

        Ok(client)
    }

    async fn send_reliable(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.nonce = self.nonce.wrapping_add(1);
        let [high, low] = self.nonce.to_be_bytes();
        let mut datagram = vec![SendOption::Reliable.as_u8(), high, low];
        datagram.extend_from_slice(payload);
        self.socket.send_to(&datagram, self.server).await?;
        Ok(())
    }

    /// Collects messages until the server has been quiet for `wait`
    async fn receive(&self, wait: Duration) -> std::io::Result<Vec<(u8, Vec<u8>)>> {
        let mut buffer = [0u8; 4096];
        let mut received = Vec::new();

        while let Ok(result) = timeout(wait, self.socket.recv_from(&mut buffer)).await {
            let (len, _) = result?;
            let datagram = &buffer[..len];

            let payload = match datagram.first().copied().and_then(SendOption::from_u8) {
                Some(SendOption::Reliable) if len >= 3 => {
                    let nonce = u16::from_be_bytes([datagram[1], datagram[2]]);
                    self.socket.send_to(&ack_datagram(nonce), self.server).await?;
                    &datagram[3..]
                }
                Some(SendOption::None) => &datagram[1..],
                Some(SendOption::Disconnect) => {
                    let reason = datagram
                        .get(2..)
                        .and_then(|rest| MessageReader::new(0, rest).read_message().ok())
                        .and_then(|mut message| message.read_u8().ok())
                        .and_then(DisconnectReason::from_u8);
                    println!("Disconnected by server: {:?}", reason);
                    break;
                }
                _ => continue,
            };

            for message in read_messages(payload).flatten() {
                received.push((message.tag(), message.rest().to_vec()));
            }
        }

        Ok(received)
    }

    async fn disconnect(&self) -> std::io::Result<()> {
        self.socket
            .send_to(&[SendOption::Disconnect.as_u8()], self.server)
            .await?;
        Ok(())
    }
}

fn find(messages: &[(u8, Vec<u8>)], flag: MessageFlags) -> Option<&[u8]> {
    messages
        .iter()
        .find(|(tag, _)| *tag == flag.as_u8())
        .map(|(_, body)| body.as_slice())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let wait = Duration::from_millis(500);

    println!("Connecting to {} as {}", args.server, args.name);
    let mut client = Client::connect(args.server, &args.name).await?;
    client.receive(wait).await?;

    client
        .send_reliable(requests::host_game(&GameOptions::default()).as_bytes())
        .await?;
    let replies = client.receive(wait).await?;
    let Some(body) = find(&replies, MessageFlags::HostGame) else {
        println!("Server did not answer the host request");
        return Ok(());
    };
    let code = GameCode::new(MessageReader::new(0, body).read_i32()?);
    println!("Hosted game {}", code);

    client
        .send_reliable(requests::join_game(code).as_bytes())
        .await?;
    let replies = client.receive(wait).await?;
    if find(&replies, MessageFlags::JoinedGame).is_some() {
        println!("Joined game {}", code);
    } else {
        println!("Join was refused");
        return Ok(());
    }

    client
        .send_reliable(requests::alter_game(code, true).as_bytes())
        .await?;
    client.receive(wait).await?;

    client
        .send_reliable(requests::get_game_list().as_bytes())
        .await?;
    let replies = client.receive(wait).await?;
    if let Some(body) = find(&replies, MessageFlags::GetGameListV2) {
        let json = MessageReader::new(0, body).read_string()?;
        for game in listing::from_json(&json)? {
            println!(
                "  {} hosted by {} ({} players)",
                GameCode::new(game.game_id),
                game.host_name,
                game.player_count_and_max
            );
        }
    }

    client.disconnect().await?;
    println!("Done");
    Ok(())
}
