//! cove-ctl — command-line client for the cove vault manager.
//!
//! Sends one framed control message per invocation and prints the typed
//! response. No response within the client timeout means the request was
//! dropped or refused silently; that is reported as failure.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use cove_core::crypto::Keypair;
use cove_core::message::{
    decode_body, encode_message, unwrap_message, MessageKind, StartVaultRequest,
    StartVaultResponse, StopVaultRequest, StopVaultResponse, UpdateIntervalRequest,
    UpdateIntervalResponse,
};
use cove_core::wire;

/// How long to wait for the manager's reply before giving up.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "cove-ctl", about = "Control a running cove vault manager")]
struct Cli {
    /// Vault manager port.
    #[arg(long, default_value_t = wire::MIN_PORT)]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the manager is alive.
    Ping,

    /// Spawn a new vault for an account.
    StartVault {
        #[arg(long)]
        account: String,
        /// Keys file to use; generated (and written) when absent.
        #[arg(long, default_value = "cove-keys.dat")]
        keys_file: PathBuf,
        /// Endpoint of an existing peer for the new vault to join.
        #[arg(long, default_value = "")]
        bootstrap: String,
    },

    /// Stop a vault and mark it not-to-run.
    StopVault {
        #[arg(long, default_value = "cove-keys.dat")]
        keys_file: PathBuf,
    },

    /// Read or change the update-poll cadence.
    UpdateInterval {
        /// New interval in seconds; omit to read the current value.
        #[arg(long)]
        set: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));

    match cli.command {
        Command::Ping => {
            let reply = request(addr, wire_message(MessageKind::Ping, b"cove-ctl")?).await?;
            let (kind, body) = unwrap_message(&reply).map_err(|e| anyhow::anyhow!("{e}"))?;
            if kind != MessageKind::Ping || body != b"cove-ctl" {
                bail!("unexpected ping reply");
            }
            println!("vault manager on port {} is alive", cli.port);
        }

        Command::StartVault {
            account,
            keys_file,
            bootstrap,
        } => {
            let keys = load_or_generate_keys(&keys_file)?;
            println!("vault identity: {}", hex::encode(&keys.identity));

            let payload = encode_message(
                MessageKind::StartVaultRequest,
                &StartVaultRequest {
                    account_name: account,
                    keys: keys.to_blob().context("failed to serialize keys")?,
                    bootstrap_endpoint: bootstrap,
                },
            )
            .map_err(|e| anyhow::anyhow!("{e}"))?;

            let reply = request(addr, payload).await?;
            let response: StartVaultResponse = typed_reply(&reply, MessageKind::StartVaultResponse)?;
            if !response.result {
                bail!("vault manager refused to start the vault");
            }
            println!("vault started");
        }

        Command::StopVault { keys_file } => {
            let keys = load_keys(&keys_file)?;
            let token = b"stop".to_vec();
            let payload = encode_message(
                MessageKind::StopVaultRequest,
                &StopVaultRequest {
                    identity: keys.identity.clone(),
                    signature: keys.sign(&token),
                    data: token,
                },
            )
            .map_err(|e| anyhow::anyhow!("{e}"))?;

            let reply = request(addr, payload).await?;
            let response: StopVaultResponse = typed_reply(&reply, MessageKind::VaultShutdownResponse)?;
            if !response.result {
                bail!("vault manager refused to stop the vault");
            }
            println!("vault stopped");
        }

        Command::UpdateInterval { set } => {
            let payload = encode_message(
                MessageKind::UpdateIntervalRequest,
                &UpdateIntervalRequest {
                    new_update_interval: set,
                },
            )
            .map_err(|e| anyhow::anyhow!("{e}"))?;

            let reply = request(addr, payload).await?;
            let response: UpdateIntervalResponse =
                typed_reply(&reply, MessageKind::UpdateIntervalResponse)?;
            match (set, response.update_interval) {
                (Some(_), 0) => bail!("interval rejected (out of range)"),
                (_, interval) => println!("update interval: {interval}s"),
            }
        }
    }

    Ok(())
}

fn wire_message(kind: MessageKind, body: &[u8]) -> Result<Vec<u8>> {
    Ok(cove_core::message::wrap_message(kind, body))
}

/// One framed request/response exchange.
async fn request(addr: SocketAddr, payload: Vec<u8>) -> Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr)
        .await
        .context("failed to connect — is the vault manager running?")?;

    let frame = wire::encode_frame(&payload).map_err(|e| anyhow::anyhow!("{e}"))?;
    stream.write_all(&frame).await.context("send failed")?;

    tokio::time::timeout(CLIENT_TIMEOUT, read_frame(&mut stream))
        .await
        .context("no response from the vault manager — treating as failed")?
}

async fn read_frame(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut header = [0u8; wire::FRAME_HEADER_LEN];
    stream.read_exact(&mut header).await.context("receive failed")?;
    let len = wire::decode_frame_len(&header).map_err(|e| anyhow::anyhow!("{e}"))?;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.context("receive failed")?;
    Ok(payload)
}

fn typed_reply<T: serde::de::DeserializeOwned>(reply: &[u8], expected: MessageKind) -> Result<T> {
    let (kind, body) = unwrap_message(reply).map_err(|e| anyhow::anyhow!("{e}"))?;
    if kind != expected {
        bail!("unexpected reply kind {kind:?}");
    }
    decode_body(body).map_err(|e| anyhow::anyhow!("{e}"))
}

fn load_keys(path: &PathBuf) -> Result<Keypair> {
    let blob = std::fs::read(path)
        .with_context(|| format!("failed to read keys file {}", path.display()))?;
    Keypair::from_blob(&blob).map_err(|e| anyhow::anyhow!("{e}"))
}

fn load_or_generate_keys(path: &PathBuf) -> Result<Keypair> {
    if path.exists() {
        return load_keys(path);
    }
    let mut identity = vec![0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut identity);
    let keys = Keypair::generate(identity);
    std::fs::write(path, keys.to_blob().map_err(|e| anyhow::anyhow!("{e}"))?)
        .with_context(|| format!("failed to write keys file {}", path.display()))?;
    println!("generated new keys at {}", path.display());
    Ok(keys)
}
