//! Shared fixtures: a scripted IRC server and a small linked-in module
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;

use mirbot::application::errors::ModuleError;
use mirbot::infrastructure::modules::{ModuleCatalog, MANIFEST_FILE};
use mirbot::modules::{HandlerContext, HandlerResult, Module};
use mirbot::{Config, Disconnect, MirCore};

static INIT: Once = Once::new();

pub fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("mirbot=debug")
            .try_init();
    });
}

/// How the mock server behaves during registration
#[derive(Clone, Copy, Default)]
pub struct MockOptions {
    /// Answer USER with 433
    pub nick_in_use: bool,
    /// Accept the connection and never answer
    pub silent: bool,
    /// Register normally but leave the client's PINGs unanswered
    pub ignore_ping: bool,
}

enum Inject {
    Line(String),
    Close,
}

/// One-connection IRC server that acknowledges JOIN/PART, answers PING (unless
/// told not to) and closes after QUIT. Every line it receives is recorded.
pub struct MockServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    inject: mpsc::UnboundedSender<Inject>,
}

impl MockServer {
    pub async fn start() -> Self {
        Self::with_options(MockOptions::default()).await
    }

    pub async fn with_options(options: MockOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let (inject, mut inject_rx) = mpsc::unbounded_channel();

        let log = received.clone();
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let mut nick = String::from("*");
            let mut closed = false;

            loop {
                tokio::select! {
                    line = lines.next_line() => {
                        let Ok(Some(line)) = line else { break };
                        log.lock().unwrap().push(line.clone());
                        if closed {
                            continue;
                        }

                        let (verb, rest) = line.split_once(' ').unwrap_or((line.as_str(), ""));
                        let replies: Vec<String> = match verb {
                            "NICK" => {
                                nick = rest.to_string();
                                Vec::new()
                            }
                            "USER" if options.silent => Vec::new(),
                            "USER" if options.nick_in_use => {
                                vec![format!(":mock.server 433 * {} :Nickname is already in use", nick)]
                            }
                            "USER" => vec![
                                format!(":mock.server 001 {} :Welcome to the mock network {}", nick, nick),
                                format!(":mock.server 376 {} :End of MOTD", nick),
                            ],
                            "JOIN" => rest
                                .split(',')
                                .map(|channel| format!(":{}!bot@mock.host JOIN {}", nick, channel))
                                .collect(),
                            "PART" => {
                                let channel = rest.split(' ').next().unwrap_or_default();
                                vec![format!(":{}!bot@mock.host PART {}", nick, channel)]
                            }
                            "PING" if options.ignore_ping => Vec::new(),
                            "PING" => vec![format!(":mock.server PONG mock.server {}", rest)],
                            "QUIT" => vec!["ERROR :Closing Link: mock.host (Quit)".to_string()],
                            _ => Vec::new(),
                        };

                        for reply in replies {
                            if write.write_all(format!("{}\r\n", reply).as_bytes()).await.is_err() {
                                break;
                            }
                        }
                        if verb == "QUIT" {
                            let _ = write.shutdown().await;
                            closed = true;
                        }
                    }
                    Some(inject) = inject_rx.recv() => {
                        if closed {
                            continue;
                        }
                        match inject {
                            Inject::Line(line) => {
                                let _ = write.write_all(format!("{}\r\n", line).as_bytes()).await;
                            }
                            Inject::Close => {
                                let _ = write.shutdown().await;
                                closed = true;
                            }
                        }
                    }
                }
            }
        });

        Self {
            addr,
            received,
            inject,
        }
    }

    /// Send a raw line to the client
    pub fn inject(&self, line: &str) {
        let _ = self.inject.send(Inject::Line(line.to_string()));
    }

    /// Close the connection from the server side
    pub fn close(&self) {
        let _ = self.inject.send(Inject::Close);
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn has_received(&self, line: &str) -> bool {
        self.received().iter().any(|l| l == line)
    }

    /// Poll until the server has seen `line`
    pub async fn wait_for(&self, line: &str, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if self.has_received(line) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.has_received(line)
    }
}

/// Config pointing at a local server with fast flood settings
pub fn test_config(addr: SocketAddr, module_dir: &Path) -> Config {
    let mut config = Config::default();
    config.bot.nick = "mirbot".to_string();
    config.bot.owner = Some("boss".to_string());
    config.server.host = addr.ip().to_string();
    config.server.port = addr.port();
    config.server.connect_timeout_secs = 5;
    config.server.idle_timeout_secs = 0;
    config.server.flood.burst = 20;
    config.server.flood.interval_ms = 50;
    config.channels = vec!["#test".to_string()];
    config.modules.directory = module_dir.to_path_buf();
    config
}

/// Handle events for `limit`, or until the connection ends
pub async fn pump(core: &mut MirCore, limit: Duration) -> Option<Disconnect> {
    let deadline = Instant::now() + limit;
    loop {
        match tokio::time::timeout_at(deadline, core.process_next()).await {
            Err(_) => return None,
            Ok(Ok(Some(outcome))) => return Some(outcome),
            Ok(Ok(None)) => continue,
            Ok(Err(e)) => panic!("processing failed: {}", e),
        }
    }
}

/// Module used across the tests: `!afk <reason>` plus a counter on every PRIVMSG
pub struct AfkModule;

impl Module for AfkModule {
    fn name(&self) -> &str {
        "afk"
    }

    fn description(&self) -> Option<&str> {
        Some("Away messages")
    }

    fn handlers(&self) -> Vec<String> {
        vec![
            "u_afk".to_string(),
            "u_pytest".to_string(),
            "u_event_privmsg".to_string(),
            "not_a_handler".to_string(),
        ]
    }

    fn call(&self, ctx: &HandlerContext<'_>) -> HandlerResult {
        match ctx.handler {
            "u_afk" => {
                let nick = ctx.sender().unwrap_or("someone");
                let reason = if ctx.args.is_empty() {
                    "away".to_string()
                } else {
                    ctx.args.join(" ")
                };
                ctx.core
                    .set_variable(&format!("afk.{}", nick), json!(reason))
                    .map_err(|e| ctx.fail(e))?;
                ctx.reply(&format!("{} is away: {}", nick, reason))?;
                Ok(true)
            }
            "u_pytest" => Ok(true),
            "u_event_privmsg" => {
                let seen = ctx.core.get_variable("afk.messages", json!(0)).as_i64().unwrap_or(0);
                ctx.core
                    .set_variable("afk.messages", json!(seen + 1))
                    .map_err(|e| ctx.fail(e))?;
                Ok(true)
            }
            other => Err(ModuleError::HandlerNotFound(other.to_string())),
        }
    }
}

pub fn catalog() -> ModuleCatalog {
    ModuleCatalog::new().with("afk", || Box::new(AfkModule))
}

/// Module directory with the afk module and one broken entry
pub fn module_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();

    let afk = dir.path().join("afk");
    std::fs::create_dir_all(&afk).unwrap();
    std::fs::write(afk.join(MANIFEST_FILE), "name: afk\ndescription: Away messages\n").unwrap();

    let broken = dir.path().join("broken");
    std::fs::create_dir_all(&broken).unwrap();
    std::fs::write(broken.join(MANIFEST_FILE), "name: broken\nlibrary: libmissing.so\n").unwrap();

    dir
}
