//! IRC connection manager
//!
//! Owns one TCP connection: registration, keep-alive, channel membership and
//! the outbound queue. Inbound lines come back as `ProtocolEvent`s.

pub mod codec;
pub mod outbound;

use std::collections::{HashSet, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use futures_util::StreamExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{lookup_host, TcpStream};
use tokio_util::codec::FramedRead;
use crate::application::errors::ConnectionError;
use crate::application::messaging::parse_line;
use crate::domain::entities::{irc_eq, irc_to_lower, ChannelMembership, ProtocolEvent, RegistrationState, Session};
use crate::infrastructure::config::Config;

pub use codec::IrcLineCodec;
pub use outbound::{sanitize, FloodGate, Outbound, WriterHandle, MAX_LINE_BYTES};

/// A registered connection to the upstream server
pub struct IrcConnection {
    session: Session,
    membership: ChannelMembership,
    /// JOINs sent but not yet acknowledged, casemapped
    pending: HashSet<String>,
    reader: FramedRead<OwnedReadHalf, IrcLineCodec>,
    outbound: Outbound,
    writer: WriterHandle,
    /// Lines that arrived during registration, replayed before new input
    backlog: VecDeque<ProtocolEvent>,
    idle_timeout: Option<Duration>,
    awaiting_pong: bool,
}

impl IrcConnection {
    /// Connect and register. The whole sequence is bounded by the configured
    /// connect timeout.
    pub async fn connect(config: &Config) -> Result<Self, ConnectionError> {
        let limit = config.server.connect_timeout();
        match tokio::time::timeout(limit, Self::establish(config)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!("Connecting to {} timed out", config.server.address());
                Err(ConnectionError::Timeout(limit))
            }
        }
    }

    async fn establish(config: &Config) -> Result<Self, ConnectionError> {
        let address = config.server.address();
        let stream = Self::open(&address).await?;
        let (read_half, write_half) = stream.into_split();

        let gate = FloodGate::new(
            config.server.flood.burst,
            Duration::from_millis(config.server.flood.interval_ms),
        );
        let (outbound, writer) = outbound::spawn_writer(write_half, gate);

        let idle = config.server.idle_timeout();
        let mut conn = Self {
            session: Session::new(address, &config.bot.nick, &config.bot.realname),
            membership: ChannelMembership::new(),
            pending: HashSet::new(),
            reader: FramedRead::new(read_half, IrcLineCodec::new()),
            outbound,
            writer,
            backlog: VecDeque::new(),
            idle_timeout: (!idle.is_zero()).then_some(idle),
            awaiting_pong: false,
        };

        conn.register(config).await?;
        Ok(conn)
    }

    async fn open(address: &str) -> Result<TcpStream, ConnectionError> {
        let addrs: Vec<SocketAddr> = lookup_host(address)
            .await
            .map_err(|e| ConnectionError::Resolve(format!("{}: {}", address, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(ConnectionError::Resolve(address.to_string()));
        }

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    tracing::info!("Connected to {} ({})", address, addr);
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(ConnectionError::Io(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "no address to connect to")
        })))
    }

    async fn register(&mut self, config: &Config) -> Result<(), ConnectionError> {
        self.session.advance(RegistrationState::Registering);

        if let Some(password) = &config.server.password {
            self.outbound.send(&format!("PASS {}", password))?;
        }
        self.outbound.send(&format!("NICK {}", config.bot.nick))?;
        self.outbound
            .send(&format!("USER {} 0 * :{}", config.bot.nick, config.bot.realname))?;

        loop {
            let Some(line) = self.reader.next().await.transpose()? else {
                self.session.advance(RegistrationState::Closed);
                return Err(ConnectionError::ClosedDuringRegistration);
            };
            tracing::debug!("<< {}", line);

            let event = match parse_line(&line) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Skipping malformed line: {}", e);
                    continue;
                }
            };

            match event.command.as_str() {
                "PING" => self.pong(&event)?,
                "001" => {
                    if let Some(nick) = event.params.first() {
                        self.session.nick = nick.clone();
                    }
                    self.session.advance(RegistrationState::Registered);
                    tracing::info!("Registered as {}", self.session.nick);
                    self.backlog.push_back(event);
                    return Ok(());
                }
                "433" | "436" => {
                    return Err(ConnectionError::NicknameInUse(config.bot.nick.clone()));
                }
                "432" | "464" | "465" | "ERROR" => {
                    let reason = event.text().unwrap_or(event.command.as_str()).to_string();
                    return Err(ConnectionError::RegistrationRejected(format!(
                        "{} {}",
                        event.command, reason
                    )));
                }
                _ => self.backlog.push_back(event),
            }
        }
    }

    /// Next event from the server. `Ok(None)` means the server closed the
    /// connection. PING is answered here and never surfaces.
    pub async fn next_event(&mut self) -> Result<Option<ProtocolEvent>, ConnectionError> {
        if let Some(event) = self.backlog.pop_front() {
            self.track(&event);
            return Ok(Some(event));
        }

        loop {
            let item = match self.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, self.reader.next()).await {
                    Ok(item) => item,
                    Err(_) => {
                        if self.awaiting_pong {
                            tracing::error!("No reply from server in {:?}", limit);
                            return Err(ConnectionError::PingTimeout(limit));
                        }
                        self.awaiting_pong = true;
                        self.outbound
                            .send_urgent(&format!("PING :{}", self.session.nick))?;
                        continue;
                    }
                },
                None => self.reader.next().await,
            };

            let Some(line) = item.transpose()? else {
                self.session.advance(RegistrationState::Closed);
                self.membership.clear();
                tracing::info!("Server closed the connection");
                return Ok(None);
            };
            self.awaiting_pong = false;
            self.session.touch();
            tracing::debug!("<< {}", line);

            let event = match parse_line(&line) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Skipping malformed line: {}", e);
                    continue;
                }
            };

            if event.command == "PING" {
                self.pong(&event)?;
                continue;
            }

            self.track(&event);
            return Ok(Some(event));
        }
    }

    /// Answer a PING. A reply the queue refuses is logged and dropped; only a
    /// closed writer is an error.
    fn pong(&self, ping: &ProtocolEvent) -> Result<(), ConnectionError> {
        match self.outbound.send_urgent(&pong_line(ping)) {
            Err(ConnectionError::WriterClosed) => Err(ConnectionError::WriterClosed),
            Err(e) => {
                tracing::warn!("Not answering PING: {}", e);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// Keep session and membership in step with what the server reports
    fn track(&mut self, event: &ProtocolEvent) {
        let own = event
            .sender_nick()
            .is_some_and(|nick| irc_eq(nick, &self.session.nick));

        match event.command.as_str() {
            "JOIN" if own => {
                for channel in event.arg(0).unwrap_or_default().split(',').filter(|c| !c.is_empty()) {
                    self.pending.remove(&irc_to_lower(channel));
                    if self.membership.join(channel) {
                        tracing::info!("Joined {}", channel);
                    }
                }
            }
            "PART" if own => {
                for channel in event.arg(0).unwrap_or_default().split(',') {
                    if self.membership.part(channel) {
                        tracing::info!("Left {}", channel);
                    }
                }
            }
            "KICK" => {
                let kicked = event.arg(1).is_some_and(|nick| irc_eq(nick, &self.session.nick));
                if let (true, Some(channel)) = (kicked, event.arg(0)) {
                    self.membership.part(channel);
                    tracing::warn!("Kicked from {} by {}", channel, event.sender_nick().unwrap_or("server"));
                }
            }
            "NICK" if own => {
                if let Some(nick) = event.arg(0) {
                    tracing::info!("Nick changed to {}", nick);
                    self.session.nick = nick.to_string();
                }
            }
            // Join refused: no such channel, too many channels, full, invite only, banned, bad key
            "403" | "405" | "471" | "473" | "474" | "475" => {
                if let Some(channel) = event.arg(1) {
                    if self.pending.remove(&irc_to_lower(channel)) {
                        tracing::warn!("Cannot join {}: {}", channel, event.text().unwrap_or_default());
                    }
                }
            }
            "ERROR" => {
                self.session.advance(RegistrationState::Closing);
                tracing::warn!("Server error: {}", event.text().unwrap_or_default());
            }
            _ => {}
        }
    }

    pub fn join(&mut self, channel: &str) -> Result<(), ConnectionError> {
        self.outbound.send(&format!("JOIN {}", channel))?;
        self.pending.insert(irc_to_lower(channel));
        Ok(())
    }

    /// Request every channel; membership follows the server's replies
    pub fn join_all<S: AsRef<str>>(&mut self, channels: &[S]) -> Result<(), ConnectionError> {
        for channel in channels {
            self.join(channel.as_ref())?;
        }
        Ok(())
    }

    pub fn part(&self, channel: &str) -> Result<(), ConnectionError> {
        self.outbound.send(&format!("PART {}", channel))
    }

    /// Forget every joined or requested channel and send PART for each.
    /// Returns the channels that were left.
    pub fn part_all(&mut self) -> Vec<String> {
        let mut channels = self.membership.clear();
        for channel in self.pending.drain() {
            if !channels.iter().any(|c| irc_eq(c, &channel)) {
                channels.push(channel);
            }
        }
        for channel in &channels {
            if let Err(e) = self.part(channel) {
                tracing::warn!("Failed to part {}: {}", channel, e);
            }
        }
        channels
    }

    pub fn send(&self, line: &str) -> Result<(), ConnectionError> {
        self.outbound.send(line)
    }

    pub fn quit(&self, message: &str) -> Result<(), ConnectionError> {
        self.outbound.send(&format!("QUIT :{}", message))
    }

    /// A cloneable sender for this connection
    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }

    pub fn quit_sent(&self) -> bool {
        self.writer.quit_sent()
    }

    /// Whether a JOIN for `channel` is still waiting for the server
    pub fn is_pending(&self, channel: &str) -> bool {
        self.pending.contains(&irc_to_lower(channel))
    }

    /// Channels the server has confirmed, sorted
    pub fn joined_channels(&self) -> Vec<String> {
        self.membership.names()
    }

    pub fn membership(&self) -> &ChannelMembership {
        &self.membership
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn nick(&self) -> &str {
        &self.session.nick
    }
}

impl Drop for IrcConnection {
    fn drop(&mut self) {
        self.writer.abort();
    }
}

/// PONG mirroring the PING payload, cut on a char boundary to fit one line
fn pong_line(ping: &ProtocolEvent) -> String {
    let (head, payload) = match &ping.trailing {
        Some(payload) => ("PONG :", payload.clone()),
        None => ("PONG ", ping.params.join(" ")),
    };
    let payload = payload.trim_end();

    let mut end = payload.len().min(MAX_LINE_BYTES - head.len());
    while !payload.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", head, &payload[..end]).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pong_mirrors_payload() {
        let ping = parse_line("PING :abc123").unwrap();
        assert_eq!(pong_line(&ping), "PONG :abc123");

        let ping = parse_line("PING irc.example.org").unwrap();
        assert_eq!(pong_line(&ping), "PONG irc.example.org");
    }

    #[test]
    fn test_pong_is_clamped_to_one_line() {
        let ping = parse_line(&format!("PING :{}", "x".repeat(600))).unwrap();
        let pong = pong_line(&ping);
        assert_eq!(pong.len(), MAX_LINE_BYTES);
        assert!(sanitize(&pong).is_ok());

        let ping = parse_line(&format!("PING :{}", "é".repeat(400))).unwrap();
        let pong = pong_line(&ping);
        assert!(pong.len() <= MAX_LINE_BYTES);
        assert!(pong.starts_with("PONG :é"));
        assert!(sanitize(&pong).is_ok());
    }
}
