//! Core bridge types.
//!
//! This module provides the building blocks:
//! - [`NativeCommand`] / [`CommandPtr`] - Engine-resident console records
//! - [`initialize`] - Engine interface gateway
//! - [`ConCommandHandle`] - Script handle with shadowed name and help text
//! - [`registry`] - Identity caching and invalidation
//! - [`ConCommandModule`] - The `concommand` script namespace
//! - Messages for the Bevy integration

mod native;
mod error;
mod config;
mod gateway;
mod shadow;
mod args;
pub mod registry;
mod handle;
mod library;
mod events;

pub use native::{CommandFlags, CommandPtr, EntryKind, NativeCommand};
pub use error::BridgeError;
pub use config::{BridgeConfig, InterfaceNames, Role};
pub use gateway::{
    ClientEngine, Connection, ConsoleManager, Dispatcher, EngineInterfaces, InterfaceFactory,
    ServerEngine, initialize,
};
pub use shadow::{HELP_CAPACITY, NAME_CAPACITY, Originals, ShadowBuffer, ShadowLedger};
pub use args::{check_int, check_line, check_string, coerce_bytes, coerce_line};
pub use registry::{BridgeContext, IDENTITY_TABLE};
pub use handle::ConCommandHandle;
pub use library::{ConCommandModule, PLAYER_META};
pub use events::{
    DispatchedCommandEvent, ScriptEventsPlugin, ScriptInputEvent, ScriptOutputEvent,
    ScriptOutputLevel,
};
