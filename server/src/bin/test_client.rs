use bincode::{deserialize, serialize};
use clap::Parser;
use shared::{ClientCommand, ObjectGuid, Packet, PlayerProfile, ServerEvent, Team, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout};

/// Logs in as a player, optionally invites somebody, and prints every
/// group event it receives.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: String,
    /// Character name to log in as
    #[clap(short, long, default_value = "Testbot")]
    name: String,
    /// Play for the Alliance instead of the Horde
    #[clap(long)]
    alliance: bool,
    /// Player to invite after logging in
    #[clap(short, long)]
    invite: Option<String>,
    /// Accept invites instead of declining them
    #[clap(short, long)]
    accept: bool,
    /// Seconds to stay connected
    #[clap(short, long, default_value = "30")]
    duration: u64,
}

async fn send(socket: &UdpSocket, server: SocketAddr, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
    let data = serialize(packet)?;
    socket.send_to(&data, server).await?;
    Ok(())
}

async fn send_command(
    socket: &UdpSocket,
    server: SocketAddr,
    command: &ClientCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Sending {:?}", command);
    send(socket, server, &Packet::World(command.encode()?)).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Create local socket
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);
    let server_addr = args.server.parse::<SocketAddr>()?;

    let team = if args.alliance { Team::Alliance } else { Team::Horde };
    let login = Packet::Login {
        client_version: PROTOCOL_VERSION,
        profile: PlayerProfile::new(args.name.clone(), team),
    };
    println!("Logging in to {} as {}", server_addr, args.name);
    send(&socket, server_addr, &login).await?;

    // Buffer for receiving data
    let mut buf = [0u8; 2048];

    let (len, _) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf)).await??;
    let me = match deserialize::<Packet>(&buf[..len])? {
        Packet::LoggedIn { guid } => guid,
        other => {
            println!("Login failed: {:?}", other);
            return Ok(());
        }
    };
    println!("Logged in as {}", me);

    if let Some(name) = &args.invite {
        let invite = ClientCommand::Invite {
            name: name.clone(),
            realm: String::new(),
            cross_realm: ObjectGuid::EMPTY,
        };
        send_command(&socket, server_addr, &invite).await?;
    }

    let mut heartbeat = interval(Duration::from_secs(1));
    let deadline = tokio::time::sleep(Duration::from_secs(args.duration));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = heartbeat.tick() => send(&socket, server_addr, &Packet::Heartbeat).await?,
            received = socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                let packet = match deserialize::<Packet>(&buf[..len]) {
                    Ok(packet) => packet,
                    Err(e) => {
                        println!("Failed to deserialize packet: {}", e);
                        continue;
                    }
                };
                let world = match packet {
                    Packet::World(world) => world,
                    other => {
                        println!("Received {:?}", other);
                        continue;
                    }
                };
                match ServerEvent::decode(&world) {
                    Ok(ServerEvent::InviteNotification { inviter, in_group: false, .. }) => {
                        println!("{} invited us", inviter);
                        let response = ClientCommand::InviteResponse { accept: args.accept };
                        send_command(&socket, server_addr, &response).await?;
                    }
                    Ok(ServerEvent::ReadyCheckStarted { group, .. }) => {
                        let confirm = ClientCommand::ConfirmReadyCheck { group, ready: true };
                        send_command(&socket, server_addr, &confirm).await?;
                    }
                    Ok(event) => println!("Event: {:?}", event),
                    Err(e) => println!("Undecodable world packet 0x{:04X}: {}", world.opcode, e),
                }
            }
        }
    }

    println!("Sending logout");
    send(&socket, server_addr, &Packet::Logout).await?;
    println!("Test client finished");

    Ok(())
}
