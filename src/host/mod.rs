//! In-process engine host.
//!
//! [`LocalEngine`] plays every engine role the bridge talks to: console
//! manager, server and client dispatch, and interface factory. It owns the
//! native records, so their addresses are stable until destroyed.

mod builder;
mod line;

pub use builder::{ConCommand, ConVar};
pub use line::{command_word, split_statements};

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::CString;
use std::ptr::NonNull;
use std::rc::Rc;

use bevy::prelude::*;

use crate::core::{
    ClientEngine, CommandFlags, CommandPtr, Connection, ConsoleManager, InterfaceFactory,
    InterfaceNames, NativeCommand, ServerEngine,
};
use builder::Definition;

/// Where a dispatched line was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchRoute {
    /// Server console.
    Server,
    /// Client console, restricted.
    Client,
    /// Client console, unrestricted.
    ClientUnrestricted,
    /// Forwarded from the client to the server.
    ForwardedToServer,
    /// Run on behalf of a connected player.
    Connection(Connection),
}

/// A line the engine accepted for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedCommand {
    pub route: DispatchRoute,
    pub line: String,
}

/// Owned record plus the strings the engine installed on it.
struct EngineEntry {
    record: NonNull<NativeCommand>,
    _name: CString,
    _help: CString,
}

impl EngineEntry {
    fn new(def: Definition) -> Self {
        let name = c_string(&def.name);
        let help = c_string(&def.description);
        // SAFETY: both strings are owned by this entry and outlive the record.
        let record = unsafe { NativeCommand::new(def.kind, name.as_ptr(), help.as_ptr(), def.flags) };

        Self {
            record: NonNull::from(Box::leak(Box::new(record))),
            _name: name,
            _help: help,
        }
    }

    fn record(&self) -> &NativeCommand {
        // SAFETY: freed only when this entry drops, which the borrow of
        // `self` rules out.
        unsafe { self.record.as_ref() }
    }

    fn ptr(&self) -> CommandPtr {
        // SAFETY: the record is freed only when this entry drops, and the
        // engine reports it dead from then on.
        unsafe { CommandPtr::from_raw(self.record) }
    }
}

impl Drop for EngineEntry {
    fn drop(&mut self) {
        // SAFETY: allocated by `Box::leak` in `new` and freed only here.
        drop(unsafe { Box::from_raw(self.record.as_ptr()) });
    }
}

/// Truncate at the first NUL, like the engine's own string copies.
fn c_string(s: &str) -> CString {
    let bytes = s.as_bytes();
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    CString::new(&bytes[..end]).unwrap_or_default()
}

#[derive(Default)]
struct EngineState {
    storage: HashMap<usize, EngineEntry>,
    registered: Vec<CommandPtr>,
    connections: HashMap<i32, Connection>,
    next_connection: u32,
    dispatched: Vec<DispatchedCommand>,
}

impl EngineState {
    fn record(&self, cmd: CommandPtr) -> Option<&NativeCommand> {
        self.storage.get(&cmd.address()).map(EngineEntry::record)
    }

    fn find(&self, name: &[u8]) -> Option<CommandPtr> {
        self.registered.iter().copied().find(|&cmd| {
            self.record(cmd)
                .is_some_and(|record| record.name().to_bytes() == name)
        })
    }
}

/// In-process console manager and dispatcher.
///
/// # Examples
///
/// ```ignore
/// let engine = Rc::new(LocalEngine::new());
/// engine.register_command(ConCommand::new("sv_test").description("Test command"));
///
/// let lua = Lua::new();
/// let module = ConCommandModule::open(&lua, &engine, &BridgeConfig::default())?;
/// ```
#[derive(Default)]
pub struct LocalEngine {
    state: RefCell<EngineState>,
}

impl LocalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command and return its record.
    ///
    /// An entry with the same name is unlinked first; its record stays
    /// allocated.
    pub fn register_command(&self, cmd: ConCommand) -> CommandPtr {
        self.register(cmd.into_definition())
    }

    /// Register a variable and return its record.
    pub fn register_var(&self, var: ConVar) -> CommandPtr {
        self.register(var.into_definition())
    }

    fn register(&self, def: Definition) -> CommandPtr {
        let mut state = self.state.borrow_mut();

        if let Some(existing) = state.find(def.name.as_bytes()) {
            warn!("Engine: Overwriting existing entry '{}'", def.name);
            state.registered.retain(|cmd| *cmd != existing);
        }

        let entry = EngineEntry::new(def);
        let cmd = entry.ptr();
        state.storage.insert(cmd.address(), entry);
        state.registered.push(cmd);
        cmd
    }

    /// Free a record, as when the module that owns it unloads.
    ///
    /// Returns `false` if the record was already freed.
    pub fn destroy(&self, cmd: CommandPtr) -> bool {
        let entry = {
            let mut state = self.state.borrow_mut();
            state.registered.retain(|c| *c != cmd);
            state.storage.remove(&cmd.address())
        };
        match entry {
            Some(entry) => {
                debug!("Engine: destroyed {:?}", cmd);
                drop(entry);
                true
            }
            None => false,
        }
    }

    /// Whether `cmd` is linked into the manager.
    pub fn is_registered(&self, cmd: CommandPtr) -> bool {
        self.state.borrow().registered.contains(&cmd)
    }

    /// Number of linked entries.
    pub fn len(&self) -> usize {
        self.state.borrow().registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().registered.is_empty()
    }

    /// Attach a player connection to an entity index.
    pub fn connect_player(&self, index: i32) -> Connection {
        let mut state = self.state.borrow_mut();
        state.next_connection += 1;
        let connection = Connection(state.next_connection);
        state.connections.insert(index, connection);
        connection
    }

    pub fn disconnect_player(&self, index: i32) -> Option<Connection> {
        self.state.borrow_mut().connections.remove(&index)
    }

    /// Run `f` on the record behind `cmd`, or return `None` if it is gone.
    ///
    /// The engine stays borrowed while `f` runs; destroying a record from
    /// inside `f` panics instead of freeing it under the borrow.
    pub fn with_record<R>(&self, cmd: CommandPtr, f: impl FnOnce(&NativeCommand) -> R) -> Option<R> {
        self.state.borrow().record(cmd).map(f)
    }

    /// Current name of the record behind `cmd`.
    pub fn name_of(&self, cmd: CommandPtr) -> Option<Vec<u8>> {
        self.with_record(cmd, |record| record.name().to_bytes().to_vec())
    }

    /// Take every line dispatched since the last drain, oldest first.
    pub fn drain_dispatched(&self) -> Vec<DispatchedCommand> {
        std::mem::take(&mut self.state.borrow_mut().dispatched)
    }

    fn dispatch(&self, route: DispatchRoute, line: &str) {
        debug!("Engine: {:?} <- {}", route, line);
        self.state.borrow_mut().dispatched.push(DispatchedCommand {
            route,
            line: line.to_string(),
        });
    }

    /// Whether restricted client execution may run `statement`.
    fn client_may_execute(&self, statement: &str) -> bool {
        let Some(word) = command_word(statement) else {
            return false;
        };
        let state = self.state.borrow();
        state
            .find(word.as_bytes())
            .and_then(|cmd| state.record(cmd))
            .is_some_and(|record| {
                CommandFlags::from_bits(record.flags()).contains(CommandFlags::CLIENTCMD_CAN_EXECUTE)
            })
    }
}

impl ConsoleManager for LocalEngine {
    fn find(&self, name: &[u8]) -> Option<CommandPtr> {
        self.state.borrow().find(name)
    }

    fn entries(&self) -> Vec<CommandPtr> {
        self.state.borrow().registered.clone()
    }

    fn unregister(&self, cmd: CommandPtr) {
        self.state.borrow_mut().registered.retain(|c| *c != cmd);
    }

    fn is_alive(&self, cmd: CommandPtr) -> bool {
        self.state.borrow().storage.contains_key(&cmd.address())
    }

    fn is_command(&self, cmd: CommandPtr) -> bool {
        self.with_record(cmd, NativeCommand::is_command).unwrap_or(false)
    }
}

impl ServerEngine for LocalEngine {
    fn server_command(&self, line: &str) {
        self.dispatch(DispatchRoute::Server, line);
    }

    fn client_command(&self, connection: Connection, line: &str) {
        self.dispatch(DispatchRoute::Connection(connection), line);
    }

    fn entity_connection(&self, index: i32) -> Option<Connection> {
        self.state.borrow().connections.get(&index).copied()
    }
}

impl ClientEngine for LocalEngine {
    fn client_cmd(&self, line: &str) {
        let (allowed, blocked): (Vec<&str>, Vec<&str>) = split_statements(line)
            .into_iter()
            .partition(|statement| self.client_may_execute(statement));

        for statement in blocked {
            warn!(
                "Engine: refusing '{}' from restricted execution (missing FCVAR_CLIENTCMD_CAN_EXECUTE)",
                statement
            );
        }
        if !allowed.is_empty() {
            self.dispatch(DispatchRoute::Client, &allowed.join("; "));
        }
    }

    fn client_cmd_unrestricted(&self, line: &str) {
        self.dispatch(DispatchRoute::ClientUnrestricted, line);
    }

    fn server_cmd(&self, line: &str) {
        self.dispatch(DispatchRoute::ForwardedToServer, line);
    }
}

impl InterfaceFactory for Rc<LocalEngine> {
    fn console_manager(&self, module: &str, version: &str) -> Option<Rc<dyn ConsoleManager>> {
        let names = InterfaceNames::default();
        (module == names.cvar_module && version == names.cvar_version)
            .then(|| self.clone() as Rc<dyn ConsoleManager>)
    }

    fn server_engine(&self, module: &str, version: &str) -> Option<Rc<dyn ServerEngine>> {
        let names = InterfaceNames::default();
        (module == names.engine_module && version == names.server_version)
            .then(|| self.clone() as Rc<dyn ServerEngine>)
    }

    fn client_engine(&self, module: &str, version: &str) -> Option<Rc<dyn ClientEngine>> {
        let names = InterfaceNames::default();
        (module == names.engine_module && version == names.client_version)
            .then(|| self.clone() as Rc<dyn ClientEngine>)
    }
}
