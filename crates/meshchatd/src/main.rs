//! meshchatd: console front end for a meshchat node.
//!
//! Usage: `meshchatd [join-address]`. Lines typed on stdin are sent to the
//! room; see `/help` for commands. Logs go to stderr, chat to stdout.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use meshchat_core::{ChatMessage, MeshConfig};
use meshchat_node::ChatClient;

mod command;

use command::Command;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = MeshConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = MeshConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        MeshConfig::default()
    });
    if let Some(join) = std::env::args().nth(1) {
        config.network.join = join;
    }
    tracing::info!(
        listen = %config.network.listen_on(),
        join = %config.network.join,
        nickname = %config.chat.nickname,
        "meshchatd starting"
    );

    let mut client = ChatClient::connect(config)
        .await
        .context("failed to start chat node")?;
    println!(
        "listening on {} as {}; /help for commands",
        client.node().listen_addr(),
        client.nickname()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }

            message = client.recv() => match message {
                Some(message) => println!("{message}"),
                None => break,
            },

            line = lines.next_line() => {
                let line = match line.context("failed to read stdin")? {
                    Some(l) => l,
                    None => break,
                };
                match command::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(cmd)) => run(&client, cmd).await,
                    Ok(None) => {}
                    Err(usage) => println!("{usage}"),
                }
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

async fn run(client: &ChatClient, cmd: Command) {
    match cmd {
        Command::Say(text) => {
            client.send(ChatMessage::shared(text));
        }
        Command::Private { to, text } => {
            client.send(ChatMessage::private(to, text));
        }
        Command::Block(nick) => {
            if client.block(&nick) {
                println!("blocked {nick}");
            }
        }
        Command::Unblock(nick) => {
            if client.unblock(&nick) {
                println!("unblocked {nick}");
            } else {
                println!("{nick} was not blocked");
            }
        }
        Command::Blocked => println!("blocked: {}", client.blocked().join(", ")),
        Command::Who => println!("online: {}", client.presence_snapshot().join(", ")),
        Command::Peers => {
            let node = client.node();
            println!(
                "{} connection(s): {}; known: {}",
                node.connection_count(),
                node.peers().join(", "),
                node.known_addresses().join(", ")
            );
        }
        Command::Nick(nick) => {
            if !client.set_nickname(&nick) {
                println!("nickname unchanged");
            }
        }
        Command::Join(addr) => {
            if let Err(e) = client.join(&addr).await {
                tracing::warn!(peer = %addr, error = %e, "join failed");
                println!("could not join {addr}: {e}");
            }
        }
        Command::Help => println!("{}", command::HELP),
        Command::Quit => {}
    }
}
