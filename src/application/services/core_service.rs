//! Core engine - Connection, modules and storage wired together

use std::sync::Arc;
use serde_json::Value;
use crate::application::errors::{BotError, ModuleError};
use crate::application::messaging::EventDispatcher;
use crate::domain::entities::{irc_eq, ProtocolEvent};
use crate::domain::traits::VariableStore;
use crate::infrastructure::adapters::IrcConnection;
use crate::infrastructure::config::Config;
use crate::infrastructure::database::SqliteStore;
use crate::infrastructure::modules::{ModuleCatalog, ModuleRegistry};
use crate::modules::{HandlerContext, HandlerResult};
use super::command_service::{self, Invocation};
use super::handle::{self, CoreHandle};

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// We sent QUIT and the server closed the connection
    Clean,
    /// The server closed the connection on its own
    RemoteClosed,
}

impl Disconnect {
    pub fn exit_code(&self) -> i32 {
        match self {
            Disconnect::Clean => 0,
            Disconnect::RemoteClosed => 1,
        }
    }
}

/// The bot
pub struct MirCore {
    config: Arc<Config>,
    store: Arc<dyn VariableStore>,
    registry: ModuleRegistry,
    dispatcher: EventDispatcher,
    connection: Option<IrcConnection>,
}

impl MirCore {
    /// Bot backed by the SQLite database named in the config
    pub fn new(config: Config) -> Result<Self, BotError> {
        let store = SqliteStore::open(&config.storage.path)?;
        Self::with_parts(config, Arc::new(store), ModuleCatalog::new())
    }

    /// Bot with an explicit store and set of linked-in modules
    pub fn with_parts(
        config: Config,
        store: Arc<dyn VariableStore>,
        catalog: ModuleCatalog,
    ) -> Result<Self, BotError> {
        store.init()?;

        let mut registry = ModuleRegistry::new(config.modules.directory.clone(), catalog);
        if config.modules.auto_load {
            registry.load_all();
        }

        let dispatcher = EventDispatcher::new(config.bot.command_prefix.clone(), config.bot.nick.clone());
        Ok(Self {
            config: Arc::new(config),
            store,
            registry,
            dispatcher,
            connection: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }

    /// Current nickname: what the server confirmed, else the configured one
    pub fn nick(&self) -> &str {
        self.connection
            .as_ref()
            .map(IrcConnection::nick)
            .unwrap_or(self.config.bot.nick.as_str())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Connect, register and request the configured channels. An existing
    /// connection is dropped first.
    pub async fn connect(&mut self) -> Result<(), BotError> {
        if self.connection.take().is_some() {
            tracing::info!("Dropping previous connection");
        }

        tracing::info!("Connecting to {} as {}", self.config.server.address(), self.config.bot.nick);
        let mut connection = IrcConnection::connect(&self.config).await?;
        self.dispatcher.set_nick(connection.nick());
        connection.join_all(&self.config.channels)?;
        self.connection = Some(connection);
        Ok(())
    }

    /// Queue one raw line
    pub fn send(&self, line: &str) -> Result<(), BotError> {
        let connection = self.connection.as_ref().ok_or(BotError::NotConnected)?;
        connection.send(line)?;
        Ok(())
    }

    /// Send the configured raw `commands`, in order
    pub fn send_commands(&self) -> Result<(), BotError> {
        for command in &self.config.commands {
            self.send(command)?;
        }
        Ok(())
    }

    /// Read and handle one event. Returns the outcome once the connection
    /// has ended.
    pub async fn process_next(&mut self) -> Result<Option<Disconnect>, BotError> {
        let connection = self.connection.as_mut().ok_or(BotError::NotConnected)?;

        let Some(event) = connection.next_event().await? else {
            let outcome = if connection.quit_sent() {
                Disconnect::Clean
            } else {
                Disconnect::RemoteClosed
            };
            self.connection = None;
            return Ok(Some(outcome));
        };

        if event.command == "NICK" {
            let nick = connection.nick().to_string();
            self.dispatcher.set_nick(nick);
        }

        self.handle_event(&event);
        Ok(None)
    }

    /// Handle events until the connection ends
    pub async fn listen(&mut self) -> Result<Disconnect, BotError> {
        loop {
            if let Some(outcome) = self.process_next().await? {
                match outcome {
                    Disconnect::Clean => tracing::info!("Disconnected"),
                    Disconnect::RemoteClosed => tracing::warn!("Connection closed by server"),
                }
                return Ok(outcome);
            }
        }
    }

    pub async fn run(&mut self) -> Result<Disconnect, BotError> {
        self.connect().await?;
        self.send_commands()?;
        self.listen().await
    }

    /// Request every configured channel we are not in or already waiting
    /// on. Returns how many JOINs were sent.
    pub fn rejoin(&mut self) -> Result<usize, BotError> {
        let connection = self.connection.as_mut().ok_or(BotError::NotConnected)?;

        let mut sent = 0;
        for channel in &self.config.channels {
            if connection.membership().contains(channel) || connection.is_pending(channel) {
                continue;
            }
            connection.join(channel)?;
            sent += 1;
        }
        tracing::debug!("Rejoin requested {} channel(s)", sent);
        Ok(sent)
    }

    /// Leave every channel, including ones whose JOIN is still unanswered, and
    /// unload every module; with `reload_modules`, load the module directory
    /// again. The connection stays open.
    pub fn clean(&mut self, reload_modules: bool) {
        if let Some(connection) = self.connection.as_mut() {
            let parted = connection.part_all();
            tracing::info!("Parted {} channel(s)", parted.len());
        }

        self.registry.unload_all();
        if reload_modules {
            self.registry.load_all();
        }
    }

    pub fn joined_channels(&self) -> Vec<String> {
        self.connection
            .as_ref()
            .map(IrcConnection::joined_channels)
            .unwrap_or_default()
    }

    pub fn loaded_modules(&self) -> Vec<String> {
        self.registry.loaded_modules()
    }

    /// Whether the core itself answers to `name`
    pub fn method_exists_in_class(&self, name: &str) -> bool {
        command_service::lookup(name).is_some()
    }

    /// Whether a loaded module answers to `name`
    pub fn method_exists(&self, name: &str) -> bool {
        self.registry.method_exists(name)
    }

    /// Invoke a handler by name: core handlers first, then modules
    pub fn call_method_in_class(
        &mut self,
        name: &str,
        event: Option<&ProtocolEvent>,
        args: &[String],
    ) -> HandlerResult {
        if let Some(command) = command_service::lookup(name) {
            let invocation = Invocation {
                handler: name,
                event,
                args,
            };
            return command.invoke(self, &invocation);
        }

        let core = self.handle();
        self.registry.call(&HandlerContext {
            handler: name,
            event,
            args,
            core: &core,
        })
    }

    pub fn get_variable(&self, key: &str, default: Value) -> Value {
        self.store.get(key, default)
    }

    pub fn set_variable(&self, key: &str, value: Value) -> Result<Value, BotError> {
        Ok(self.store.set(key, value)?)
    }

    pub fn unixtime(&self) -> i64 {
        handle::unixtime()
    }

    /// Handle for handlers and background tasks
    pub fn handle(&self) -> CoreHandle {
        CoreHandle::new(
            self.connection.as_ref().map(IrcConnection::outbound),
            self.store.clone(),
            self.nick(),
            self.config.bot.owner.clone(),
        )
    }

    fn handle_event(&mut self, event: &ProtocolEvent) {
        self.greet(event);

        for call in self.dispatcher.route(event) {
            match self.call_method_in_class(&call.name, Some(event), &call.args) {
                Ok(_) | Err(ModuleError::HandlerNotFound(_)) => {}
                Err(ModuleError::PermissionDenied(what)) => {
                    tracing::info!("Permission denied: {}", what);
                }
                Err(e) => tracing::warn!("{}", e),
            }
        }
    }

    fn greet(&self, event: &ProtocolEvent) {
        if event.command != "JOIN" {
            return;
        }
        let (Some(nick), Some(channel)) = (event.sender_nick(), event.arg(0)) else {
            return;
        };

        let greeting = &self.config.greeting;
        let handle = self.handle();
        let result = if irc_eq(nick, handle.nick()) {
            if !greeting.say_online {
                return;
            }
            handle.privmsg(channel, &greeting.online_message)
        } else {
            if !greeting.welcome_new {
                return;
            }
            handle.notice(nick, &greeting.render_welcome(nick, channel))
        };

        if let Err(e) = result {
            tracing::warn!("Greeting in {} failed: {}", channel, e);
        }
    }
}
