//! Messages between the script runtime and the rest of the app.
//!
//! - App -> Runtime: script chunks to run
//! - Runtime -> App: chunk results and errors
//! - Engine -> App: lines the engine accepted for execution

use bevy::prelude::*;

use crate::host::{DispatchRoute, DispatchedCommand};

/// A script chunk to run on the bridge's Lua state.
///
/// # Examples
///
/// ```ignore
/// fn rename_test_command(mut input: MessageWriter<ScriptInputEvent>) {
///     input.write(ScriptInputEvent::new(r#"concommand.Get("sv_test"):SetName("sv_renamed")"#));
/// }
/// ```
#[derive(Message, Debug, Clone)]
pub struct ScriptInputEvent {
    /// Lua source.
    pub chunk: String,
}

impl ScriptInputEvent {
    pub fn new(chunk: impl Into<String>) -> Self {
        Self {
            chunk: chunk.into(),
        }
    }
}

/// Outcome of a script chunk.
#[derive(Message, Debug, Clone)]
pub struct ScriptOutputEvent {
    pub message: String,
    pub level: ScriptOutputLevel,
}

/// Severity of a [`ScriptOutputEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptOutputLevel {
    #[default]
    Info,
    /// The chunk raised an error.
    Error,
}

impl ScriptOutputEvent {
    pub fn new(level: ScriptOutputLevel, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ScriptOutputLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ScriptOutputLevel::Error, message)
    }
}

/// A line the engine accepted, forwarded out of the host.
///
/// # Examples
///
/// ```ignore
/// fn log_dispatches(mut events: MessageReader<DispatchedCommandEvent>) {
///     for event in events.read() {
///         info!("{:?}: {}", event.route, event.line);
///     }
/// }
/// ```
#[derive(Message, Debug, Clone, PartialEq, Eq)]
pub struct DispatchedCommandEvent {
    pub route: DispatchRoute,
    pub line: String,
}

impl From<DispatchedCommand> for DispatchedCommandEvent {
    fn from(cmd: DispatchedCommand) -> Self {
        Self {
            route: cmd.route,
            line: cmd.line,
        }
    }
}

/// Registers every bridge message.
pub struct ScriptEventsPlugin;

impl Plugin for ScriptEventsPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<ScriptInputEvent>()
            .add_message::<ScriptOutputEvent>()
            .add_message::<DispatchedCommandEvent>();
    }
}
