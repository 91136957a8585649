//! Lua scripting bridge for Source-style console commands.
//!
//! Exposes the engine's console commands to an embedded Lua state:
//!
//! - **concommand**: `Exists`, `Get`, `GetAll`, `Execute`, `ExecuteOnServer`
//! - **Handles**: identity-cached proxies whose name and help text can be
//!   overridden and are restored when the handle goes away
//! - **Player:Command**: run a line on behalf of a connected player
//! - **Bevy host**: an in-process engine plus a plugin that runs script chunks
//!
//! # Features
//!
//! - `persist`: RON configuration files
//! - `full`: Enable persist
//!
//! # Quick Start
//!
//! ```ignore
//! use bevy::prelude::*;
//! use bevy_concommand_lua::prelude::*;
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(DefaultPlugins)
//!         .add_plugins(ConCommandScriptPlugin::default())
//!         .add_systems(Startup, setup)
//!         .run();
//! }
//!
//! fn setup(host: NonSend<HostEngine>, mut input: MessageWriter<ScriptInputEvent>) {
//!     host.register_command(ConCommand::new("sv_test").description("Test command"));
//!
//!     input.write(ScriptInputEvent::new(r#"
//!         local cmd = concommand.Get("sv_test")
//!         cmd:SetHelpText("Overridden from Lua")
//!         concommand.Execute("sv_test")
//!     "#));
//! }
//! ```

use std::ops::Deref;
use std::rc::Rc;

use bevy::prelude::*;
use mlua::{Function, Lua, MultiValue};

pub mod core;
pub mod host;

#[cfg(feature = "persist")]
pub mod persist;

pub use core::{
    BridgeConfig, BridgeError, CommandFlags, CommandPtr, ConCommandHandle, ConCommandModule,
    ConsoleManager, DispatchedCommandEvent, InterfaceFactory, InterfaceNames, NativeCommand, Role,
    ScriptEventsPlugin, ScriptInputEvent, ScriptOutputEvent, ScriptOutputLevel,
};
pub use host::{ConCommand, ConVar, DispatchRoute, DispatchedCommand, LocalEngine};

#[cfg(feature = "persist")]
pub use persist::{ConfigError, ConfigPath};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::core::{
        BridgeConfig, BridgeError, CommandFlags, ConCommandModule, DispatchedCommandEvent, Role,
        ScriptInputEvent, ScriptOutputEvent, ScriptOutputLevel,
    };
    pub use crate::host::{ConCommand, ConVar, DispatchRoute, LocalEngine};
    pub use crate::{ConCommandScriptPlugin, HostEngine, ScriptRuntime};
}

/// Main bridge plugin.
///
/// # Configuration
///
/// ```ignore
/// ConCommandScriptPlugin::new(BridgeConfig::for_role(Role::Client))
/// ```
#[derive(Default)]
pub struct ConCommandScriptPlugin {
    pub config: BridgeConfig,
}

impl ConCommandScriptPlugin {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }
}

impl Plugin for ConCommandScriptPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.config.clone())
            .insert_non_send_resource(HostEngine::default())
            .insert_non_send_resource(ScriptRuntime::new())
            .add_plugins(core::ScriptEventsPlugin);

        app.add_systems(Startup, open_script_runtime);

        // 1. run_script_input: run chunks, report results
        // 2. forward_dispatched_commands: drain the engine's dispatch queue
        app.add_systems(Update, (run_script_input, forward_dispatched_commands).chain());

        #[cfg(feature = "persist")]
        {
            app.init_resource::<persist::ConfigPath>().add_systems(
                Startup,
                persist::load_config_on_startup.before(open_script_runtime),
            );
        }
    }
}

/// The in-process engine the bridge is bound to.
#[derive(Default)]
pub struct HostEngine(pub Rc<LocalEngine>);

impl Deref for HostEngine {
    type Target = LocalEngine;

    fn deref(&self) -> &LocalEngine {
        &self.0
    }
}

/// The Lua state and the bridge module opened on it.
pub struct ScriptRuntime {
    lua: Lua,
    module: Option<ConCommandModule>,
}

impl ScriptRuntime {
    /// A fresh Lua state with the module not yet opened.
    pub fn new() -> Self {
        Self {
            lua: Lua::new(),
            module: None,
        }
    }

    /// Open the module. A failure is logged and leaves the runtime closed.
    pub fn open(&mut self, factory: &dyn InterfaceFactory, config: &BridgeConfig) -> bool {
        match ConCommandModule::open(&self.lua, factory, config) {
            Ok(module) => {
                self.module = Some(module);
                true
            }
            Err(err) => {
                error!("Console bridge: failed to open: {}", err);
                false
            }
        }
    }

    #[inline]
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn module(&self) -> Option<&ConCommandModule> {
        self.module.as_ref()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.module.is_some()
    }

    /// Run a chunk and render its return values with `tostring`.
    pub fn exec(&self, chunk: &str) -> Result<Vec<String>, BridgeError> {
        if self.module.is_none() {
            return Err(BridgeError::NotOpen);
        }

        let values: MultiValue = self.lua.load(chunk).eval()?;
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let tostring: Function = self.lua.globals().get("tostring")?;
        values
            .into_iter()
            .map(|value| tostring.call::<String>(value).map_err(BridgeError::from))
            .collect()
    }

    /// Close the module, keeping the Lua state.
    pub fn close(&mut self) -> Result<(), BridgeError> {
        match self.module.take() {
            Some(module) => Ok(module.close(&self.lua)?),
            None => Err(BridgeError::NotOpen),
        }
    }
}

impl Default for ScriptRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Opens the module against the host engine.
pub fn open_script_runtime(
    mut runtime: NonSendMut<ScriptRuntime>,
    host: NonSend<HostEngine>,
    config: Res<BridgeConfig>,
) {
    runtime.open(&host.0, &config);
}

/// Runs queued chunks and reports their outcome.
pub fn run_script_input(
    runtime: NonSend<ScriptRuntime>,
    mut input_events: MessageReader<ScriptInputEvent>,
    mut output_events: MessageWriter<ScriptOutputEvent>,
) {
    for event in input_events.read() {
        match runtime.exec(&event.chunk) {
            Ok(values) => {
                if !values.is_empty() {
                    output_events.write(ScriptOutputEvent::info(values.join("\t")));
                }
            }
            Err(err) => {
                warn!("Console bridge: script error: {}", err);
                output_events.write(ScriptOutputEvent::error(err.to_string()));
            }
        }
    }
}

/// Moves lines the engine accepted into [`DispatchedCommandEvent`]s.
pub fn forward_dispatched_commands(
    host: NonSend<HostEngine>,
    mut dispatched_events: MessageWriter<DispatchedCommandEvent>,
) {
    for cmd in host.drain_dispatched() {
        dispatched_events.write(cmd.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Resource, Default)]
    struct Captured {
        outputs: Vec<ScriptOutputEvent>,
        dispatched: Vec<DispatchedCommandEvent>,
    }

    fn capture(
        mut outputs: MessageReader<ScriptOutputEvent>,
        mut dispatched: MessageReader<DispatchedCommandEvent>,
        mut captured: ResMut<Captured>,
    ) {
        captured.outputs.extend(outputs.read().cloned());
        captured.dispatched.extend(dispatched.read().cloned());
    }

    fn app_with(config: BridgeConfig) -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(ConCommandScriptPlugin::new(config));
        app.init_resource::<Captured>();
        app.add_systems(Update, capture.after(forward_dispatched_commands));
        app
    }

    fn queue_chunk(app: &mut App, chunk: &str) {
        app.world_mut().write_message(ScriptInputEvent::new(chunk));
    }

    #[test]
    fn test_runtime_opens_on_startup() {
        let mut app = app_with(BridgeConfig::default());
        app.update();

        let runtime = app.world().non_send_resource::<ScriptRuntime>();
        assert!(runtime.is_open());
        assert_eq!(runtime.module().map(|m| m.role()), Some(Role::Server));
    }

    #[test]
    fn test_chunk_renames_command() {
        let mut app = app_with(BridgeConfig::default());
        let cmd = app
            .world()
            .non_send_resource::<HostEngine>()
            .register_command(ConCommand::new("sv_test"));
        app.update();

        queue_chunk(&mut app, r#"H = concommand.Get("sv_test"); H:SetName("sv_renamed"); return H:GetName()"#);
        app.update();

        let host = app.world().non_send_resource::<HostEngine>();
        assert_eq!(host.name_of(cmd).unwrap(), b"sv_renamed");
        let captured = app.world().resource::<Captured>();
        assert_eq!(captured.outputs.len(), 1);
        assert_eq!(captured.outputs[0].level, ScriptOutputLevel::Info);
        assert_eq!(captured.outputs[0].message, "sv_renamed");
    }

    #[test]
    fn test_execute_forwards_dispatch() {
        let mut app = app_with(BridgeConfig::default());
        app.update();

        queue_chunk(&mut app, r#"concommand.Execute("map gm_flatgrass")"#);
        app.update();

        let captured = app.world().resource::<Captured>();
        assert_eq!(
            captured.dispatched,
            vec![DispatchedCommandEvent {
                route: DispatchRoute::Server,
                line: "map gm_flatgrass".into(),
            }]
        );
        assert!(captured.outputs.is_empty());
    }

    #[test]
    fn test_script_error_reported() {
        let mut app = app_with(BridgeConfig::default());
        app.update();

        queue_chunk(&mut app, "concommand.Exists(nil)");
        app.update();

        let captured = app.world().resource::<Captured>();
        assert_eq!(captured.outputs.len(), 1);
        assert_eq!(captured.outputs[0].level, ScriptOutputLevel::Error);
        assert!(captured.outputs[0].message.contains("bad argument #1"));
    }

    #[test]
    fn test_failed_open_reports_not_open() {
        let mut config = BridgeConfig::default();
        config.interfaces.cvar_module = "missing".into();
        let mut app = app_with(config);
        app.update();

        assert!(!app.world().non_send_resource::<ScriptRuntime>().is_open());

        queue_chunk(&mut app, "return 1");
        app.update();

        let captured = app.world().resource::<Captured>();
        assert_eq!(captured.outputs.len(), 1);
        assert_eq!(captured.outputs[0].level, ScriptOutputLevel::Error);
        assert_eq!(captured.outputs[0].message, "concommand module is not open");
    }

    #[test]
    fn test_runtime_close() {
        let engine = Rc::new(LocalEngine::new());
        let mut runtime = ScriptRuntime::new();
        assert!(runtime.open(&engine, &BridgeConfig::for_role(Role::Client)));

        assert_eq!(runtime.exec("return concommand.ExecuteOnServer ~= nil").unwrap(), vec!["true"]);
        runtime.close().unwrap();

        assert!(!runtime.is_open());
        assert!(matches!(runtime.close(), Err(BridgeError::NotOpen)));
        assert!(matches!(runtime.exec("return 1"), Err(BridgeError::NotOpen)));
    }
}
