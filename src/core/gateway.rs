//! Engine interface gateway.
//!
//! Resolves the console manager and the role's dispatch interface exactly once
//! when the module opens. There is no degraded mode: if either interface is
//! missing, opening fails.

use std::rc::Rc;

use bevy::prelude::*;

use super::{BridgeConfig, BridgeError, CommandPtr, Role};

/// The engine's console-variable manager (`ICvar`).
pub trait ConsoleManager {
    /// Find an entry (command or variable) by its current name.
    fn find(&self, name: &[u8]) -> Option<CommandPtr>;

    /// Every registered entry, in manager iteration order.
    fn entries(&self) -> Vec<CommandPtr>;

    /// Unlink an entry from the manager. The record itself is not freed.
    fn unregister(&self, cmd: CommandPtr);

    /// Whether the record behind `cmd` is still allocated.
    ///
    /// Unregistered records that the engine keeps around are alive.
    fn is_alive(&self, cmd: CommandPtr) -> bool;

    /// Whether `cmd` is alive and an invocable command rather than a variable.
    fn is_command(&self, cmd: CommandPtr) -> bool {
        // SAFETY: checked alive, and the borrow ends before returning.
        self.is_alive(cmd) && unsafe { cmd.record() }.is_command()
    }
}

/// Opaque per-player network connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection(pub u32);

/// Server-side dispatch (`IVEngineServer`).
pub trait ServerEngine {
    /// Queue a line for server-side execution.
    fn server_command(&self, line: &str);

    /// Run a line as if typed by `connection`.
    fn client_command(&self, connection: Connection, line: &str);

    /// Resolve an entity index to its player connection.
    fn entity_connection(&self, index: i32) -> Option<Connection>;
}

/// Client-side dispatch (`IVEngineClient`).
pub trait ClientEngine {
    /// Local execution, subject to the client command restriction.
    fn client_cmd(&self, line: &str);

    /// Local execution bypassing the restriction.
    fn client_cmd_unrestricted(&self, line: &str);

    /// Forward a line to the connected server.
    fn server_cmd(&self, line: &str);
}

/// Resolves interfaces from the host's loaded native modules.
pub trait InterfaceFactory {
    fn console_manager(&self, module: &str, version: &str) -> Option<Rc<dyn ConsoleManager>>;

    fn server_engine(&self, module: &str, version: &str) -> Option<Rc<dyn ServerEngine>>;

    fn client_engine(&self, module: &str, version: &str) -> Option<Rc<dyn ClientEngine>>;
}

/// Role-selected dispatch strategy.
///
/// Both roles share the registry and facade; only the capabilities differ.
#[derive(Clone)]
pub enum Dispatcher {
    Server(Rc<dyn ServerEngine>),
    Client(Rc<dyn ClientEngine>),
}

impl Dispatcher {
    pub fn role(&self) -> Role {
        match self {
            Dispatcher::Server(_) => Role::Server,
            Dispatcher::Client(_) => Role::Client,
        }
    }

    /// Execute a line in this role's own context.
    ///
    /// `unrestricted` only matters on the client.
    pub fn execute(&self, line: &str, unrestricted: bool) {
        match self {
            Dispatcher::Server(engine) => engine.server_command(line),
            Dispatcher::Client(engine) if unrestricted => engine.client_cmd_unrestricted(line),
            Dispatcher::Client(engine) => engine.client_cmd(line),
        }
    }

    /// Server capability: per-connection dispatch.
    pub fn server(&self) -> Option<&Rc<dyn ServerEngine>> {
        match self {
            Dispatcher::Server(engine) => Some(engine),
            Dispatcher::Client(_) => None,
        }
    }

    /// Client capability: forwarding to the server.
    pub fn client(&self) -> Option<&Rc<dyn ClientEngine>> {
        match self {
            Dispatcher::Client(engine) => Some(engine),
            Dispatcher::Server(_) => None,
        }
    }
}

/// Interfaces resolved at open, read-only afterwards.
#[derive(Clone)]
pub struct EngineInterfaces {
    console: Rc<dyn ConsoleManager>,
    dispatcher: Dispatcher,
}

impl EngineInterfaces {
    #[inline]
    pub fn console(&self) -> &dyn ConsoleManager {
        self.console.as_ref()
    }

    #[inline]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[inline]
    pub fn role(&self) -> Role {
        self.dispatcher.role()
    }
}

/// Resolve the interfaces for `config.role`.
pub fn initialize(
    factory: &dyn InterfaceFactory,
    config: &BridgeConfig,
) -> Result<EngineInterfaces, BridgeError> {
    let names = &config.interfaces;

    let console = factory
        .console_manager(&names.cvar_module, &names.cvar_version)
        .ok_or_else(|| BridgeError::FatalInit("ICvar not initialized. Critical error.".into()))?;

    let dispatcher = match config.role {
        Role::Server => factory
            .server_engine(&names.engine_module, &names.server_version)
            .map(Dispatcher::Server),
        Role::Client => factory
            .client_engine(&names.engine_module, &names.client_version)
            .map(Dispatcher::Client),
    }
    .ok_or_else(|| {
        BridgeError::FatalInit("IVEngineServer/Client not initialized. Critical error.".into())
    })?;

    debug!(
        "Console bridge: resolved {} and {} interfaces",
        names.cvar_version,
        match config.role {
            Role::Server => &names.server_version,
            Role::Client => &names.client_version,
        }
    );

    Ok(EngineInterfaces { console, dispatcher })
}
