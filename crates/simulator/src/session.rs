//! Connection handling - turns TCP peers into validator and user agents
//!
//! Every connection gets the same line-based handshake. Validators are then
//! driven in-process; the socket stays open so the peer can watch. Users
//! may type `<receiver> <amount> <reward>` lines and receive balance updates.

use crate::config::{Population, RunType};
use pos_consensus::{
    submit_transfer, Registry, SimulationConfig, User, UserNode, Validator, ValidatorNode,
};
use pos_ledger::Block;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const ROLE_PROMPT: &str = "Is this node a user or validator (u/v)\n";
const MALICIOUS_PROMPT: &str = "Is this validator malicious (y/n)\n";
const NAME_PROMPT: &str = "Enter a user name\n";

type LineReader = Lines<BufReader<OwnedReadHalf>>;

/// Shared state for attaching agents
pub struct Session {
    registry: Arc<Registry>,
    /// Chain every new validator starts from
    genesis: Vec<Block>,
    config: SimulationConfig,
    run_type: RunType,
    tx_interval: Duration,
}

impl Session {
    pub fn new(
        registry: Arc<Registry>,
        genesis: Vec<Block>,
        config: SimulationConfig,
        run_type: RunType,
        tx_interval: Duration,
    ) -> Self {
        Self {
            registry,
            genesis,
            config,
            run_type,
            tx_interval,
        }
    }

    /// Accept connections forever
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            tracing::debug!("Connection from {}", peer);
            let session = self.clone();
            tokio::spawn(async move {
                if let Err(e) = session.handle_connection(stream, peer).await {
                    tracing::warn!("Connection {} ended with error: {}", peer, e);
                }
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        loop {
            write.write_all(ROLE_PROMPT.as_bytes()).await?;
            let Some(answer) = lines.next_line().await? else {
                return Ok(());
            };
            match answer.trim() {
                "u" => return self.attach_user(lines, write).await,
                "v" => return self.attach_validator(lines, write, peer).await,
                other => {
                    let reply = format!("{other} is not a valid response. Please enter 'u' or 'v'\n");
                    write.write_all(reply.as_bytes()).await?;
                }
            }
        }
    }

    async fn attach_validator(
        &self,
        mut lines: LineReader,
        mut write: OwnedWriteHalf,
        peer: SocketAddr,
    ) -> anyhow::Result<()> {
        let malicious = loop {
            write.write_all(MALICIOUS_PROMPT.as_bytes()).await?;
            let Some(answer) = lines.next_line().await? else {
                return Ok(());
            };
            match answer.trim() {
                "y" => break true,
                "n" => break false,
                other => {
                    let reply = format!("{other} is not a valid response. Please enter 'y' or 'n'\n");
                    write.write_all(reply.as_bytes()).await?;
                }
            }
        };

        let address = derive_address(&peer);
        let (validator, endpoints) = Validator::new(
            address.clone(),
            malicious,
            self.config.initial_stake,
            self.config.initial_reputation,
            self.genesis.clone(),
        );
        self.registry.validators.add(validator.clone())?;
        let node = ValidatorNode::new(validator, endpoints).spawn();

        tracing::info!(
            "Validator {} joined from {} (malicious: {})",
            pos_consensus::agent::short_id(&address),
            peer,
            malicious
        );
        write
            .write_all(format!("Joined as validator {address}\n").as_bytes())
            .await?;

        let result = loop {
            match lines.next_line().await {
                Ok(Some(_)) => continue,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e.into()),
            }
        };

        // Pending votes from this validator become abstentions
        self.registry.validators.remove(&address);
        node.abort();
        tracing::info!(
            "Validator {} left from {}",
            pos_consensus::agent::short_id(&address),
            peer
        );
        result
    }

    async fn attach_user(&self, mut lines: LineReader, mut write: OwnedWriteHalf) -> anyhow::Result<()> {
        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();

        let user = loop {
            write.write_all(NAME_PROMPT.as_bytes()).await?;
            let Some(answer) = lines.next_line().await? else {
                return Ok(());
            };
            let name = answer.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                write.write_all(b"User names must be a single word\n").await?;
                continue;
            }
            let user = User::new(name, self.config.initial_balance).with_notifier(notify_tx.clone());
            match self.registry.users.add(user) {
                Ok(user) => break user,
                Err(e) => write.write_all(format!("{e}\n").as_bytes()).await?,
            }
        };

        tracing::info!("User {} joined with balance {:.6}", user.name(), user.balance());
        write
            .write_all(format!("Joined as user {} with balance {:.6}\n", user.name(), user.balance()).as_bytes())
            .await?;

        if self.run_type == RunType::Auto {
            UserNode::new(user.clone(), self.registry.clone(), self.tx_interval).spawn();
        }

        let result = self.serve_user(&user, &mut lines, &mut write, &mut notify_rx).await;

        self.registry.users.remove(user.name());
        tracing::info!("User {} disconnected", user.name());
        result
    }

    /// Relay transfer lines and balance notifications until the peer hangs up
    async fn serve_user(
        &self,
        user: &User,
        lines: &mut LineReader,
        write: &mut OwnedWriteHalf,
        notify_rx: &mut mpsc::UnboundedReceiver<String>,
    ) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let reply = match parse_transfer(&line) {
                        Ok((receiver, amount, reward)) => {
                            match submit_transfer(&self.registry, user.name(), &receiver, amount, reward) {
                                Ok(tx) => format!("Transaction {} submitted\n", tx.id),
                                Err(e) => format!("Transaction rejected: {e}\n"),
                            }
                        }
                        Err(e) => format!("{e}\n"),
                    };
                    write.write_all(reply.as_bytes()).await?;
                }
                Some(note) = notify_rx.recv() => {
                    write.write_all(format!("{note}\n").as_bytes()).await?;
                }
            }
        }

        Ok(())
    }
}

/// Parse `<receiver> <amount> <reward>`
pub fn parse_transfer(line: &str) -> anyhow::Result<(String, f64, f64)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let [receiver, amount, reward] = parts.as_slice() else {
        anyhow::bail!("Expected '<receiver> <amount> <reward>'");
    };
    let amount: f64 = amount
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid amount '{amount}'"))?;
    let reward: f64 = reward
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid reward '{reward}'"))?;
    Ok((receiver.to_string(), amount, reward))
}

/// Network address of a new validator
fn derive_address(peer: &SocketAddr) -> String {
    let seed = format!("{}{}", peer, chrono::Utc::now().to_rfc3339());
    blake3::hash(seed.as_bytes()).to_hex().to_string()
}

/// Dial the listener once per agent and answer the handshake for it
pub async fn populate(addr: SocketAddr, population: Population) -> anyhow::Result<()> {
    let mut malicious_left = population.malicious;
    for _ in 0..population.validators {
        let malicious = malicious_left > 0;
        malicious_left = malicious_left.saturating_sub(1);
        let answers = vec!["v".to_string(), if malicious { "y" } else { "n" }.to_string()];
        dial(addr, answers).await?;
    }

    for i in 1..=population.users {
        dial(addr, vec!["u".to_string(), format!("user{i}")]).await?;
    }

    tracing::info!(
        "Auto run joined {} validators ({} malicious) and {} users",
        population.validators,
        population.malicious,
        population.users
    );
    Ok(())
}

/// Connect, answer each prompt in order and keep the connection open
async fn dial(addr: SocketAddr, answers: Vec<String>) -> anyhow::Result<()> {
    let stream = TcpStream::connect(addr).await?;
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    for answer in answers {
        // Wait for the prompt before answering it
        if lines.next_line().await?.is_none() {
            anyhow::bail!("listener closed the connection during the handshake");
        }
        write.write_all(format!("{answer}\n").as_bytes()).await?;
    }

    let Some(joined) = lines.next_line().await? else {
        anyhow::bail!("listener closed the connection before confirming");
    };
    tracing::trace!("{}", joined);

    tokio::spawn(async move {
        let _write = write;
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::trace!("{}", line);
        }
    });
    Ok(())
}
