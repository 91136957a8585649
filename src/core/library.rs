//! Script-facing surface: the `concommand` namespace and `Player:Command`.

use std::rc::Rc;

use bevy::prelude::*;
use mlua::{Function, Lua, Table, Value};

use super::args::{check_line, check_string, coerce_bytes, coerce_line};
use super::registry::{self, BridgeContext};
use super::{BridgeConfig, BridgeError, InterfaceFactory, Role, ServerEngine, initialize};

/// Lua registry key of the player metatable.
pub const PLAYER_META: &str = "Player";

const NAMESPACE_FUNCTIONS: &[&str] = &["Exists", "GetAll", "Get", "Execute"];
const CLIENT_FUNCTIONS: &[&str] = &["ExecuteOnServer"];

// Looks the method up without letting a missing field or a throwing
// `__index` escape as a raw Lua error.
const ENTITY_INDEX_LOOKUP_CHUNK: &str = r#"
local ent = ...
local ok, method = pcall(function() return ent.EntIndex end)
if ok and type(method) == "function" then
    return method
end
return nil
"#;

/// An open bridge on one Lua state.
///
/// # Examples
///
/// ```ignore
/// let lua = Lua::new();
/// let engine = Rc::new(LocalEngine::new());
/// let module = ConCommandModule::open(&lua, &engine, &BridgeConfig::default())?;
///
/// lua.load(r#"
///     local cmd = concommand.Get("sv_test")
///     cmd:SetHelpText("Runs the test")
/// "#).exec()?;
///
/// module.close(&lua)?;
/// ```
pub struct ConCommandModule {
    ctx: Rc<BridgeContext>,
    namespace: String,
}

impl ConCommandModule {
    /// Resolve interfaces, create the identity table and install functions.
    pub fn open(
        lua: &Lua,
        factory: &dyn InterfaceFactory,
        config: &BridgeConfig,
    ) -> Result<Self, BridgeError> {
        let interfaces = initialize(factory, config)?;
        registry::install(lua)?;

        let module = Self {
            ctx: Rc::new(BridgeContext::new(interfaces)),
            namespace: config.namespace.clone(),
        };

        if let Err(err) = module.install(lua) {
            registry::uninstall(lua)?;
            return Err(err.into());
        }

        info!(
            "Console bridge: opened '{}' ({} role)",
            module.namespace,
            module.role()
        );
        Ok(module)
    }

    /// Remove installed functions and the identity table.
    ///
    /// Live handles keep working and still restore their records when
    /// collected.
    pub fn close(self, lua: &Lua) -> mlua::Result<()> {
        if self.role() == Role::Server {
            let meta: Option<Table> = lua.named_registry_value(PLAYER_META)?;
            if let Some(meta) = meta {
                meta.set("Command", Value::Nil)?;
            }
        }

        let namespace: Option<Table> = lua.globals().get(self.namespace.as_str())?;
        if let Some(namespace) = namespace {
            for name in NAMESPACE_FUNCTIONS.iter().chain(CLIENT_FUNCTIONS) {
                namespace.set(*name, Value::Nil)?;
            }
        }

        registry::uninstall(lua)?;
        info!("Console bridge: closed '{}'", self.namespace);
        Ok(())
    }

    #[inline]
    pub fn role(&self) -> Role {
        self.ctx.interfaces().role()
    }

    #[inline]
    pub fn context(&self) -> &Rc<BridgeContext> {
        &self.ctx
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn install(&self, lua: &Lua) -> mlua::Result<()> {
        let namespace = namespace_table(lua, &self.namespace)?;
        install_queries(lua, &namespace, &self.ctx)?;
        install_execute(lua, &namespace, &self.ctx)?;

        if let Some(server) = self.ctx.interfaces().dispatcher().server() {
            install_player_command(lua, server.clone())?;
        }
        Ok(())
    }
}

fn namespace_table(lua: &Lua, name: &str) -> mlua::Result<Table> {
    let globals = lua.globals();
    let existing: Option<Table> = globals.get(name)?;
    match existing {
        Some(table) => Ok(table),
        None => {
            let table = lua.create_table()?;
            globals.set(name, table.clone())?;
            Ok(table)
        }
    }
}

fn install_queries(lua: &Lua, namespace: &Table, ctx: &Rc<BridgeContext>) -> mlua::Result<()> {
    let exists_ctx = ctx.clone();
    namespace.set(
        "Exists",
        lua.create_function(move |_, name: Value| {
            let name = check_string(&name, 1)?;
            let console = exists_ctx.interfaces().console();
            Ok(console.find(&name).is_some_and(|cmd| console.is_command(cmd)))
        })?,
    )?;

    let get_ctx = ctx.clone();
    namespace.set(
        "Get",
        lua.create_function(move |lua, name: Value| {
            let name = coerce_bytes(lua, &name, 1)?;
            let console = get_ctx.interfaces().console();
            let cmd = console.find(&name).filter(|&cmd| console.is_command(cmd));
            registry::push(lua, &get_ctx, cmd)
        })?,
    )?;

    let all_ctx = ctx.clone();
    namespace.set(
        "GetAll",
        lua.create_function(move |lua, ()| {
            let list = lua.create_table()?;
            let console = all_ctx.interfaces().console();
            let commands = console
                .entries()
                .into_iter()
                .filter(|&cmd| console.is_command(cmd));

            for (i, cmd) in commands.enumerate() {
                list.raw_set(i + 1, registry::push(lua, &all_ctx, Some(cmd))?)?;
            }
            Ok(list)
        })?,
    )?;

    Ok(())
}

fn install_execute(lua: &Lua, namespace: &Table, ctx: &Rc<BridgeContext>) -> mlua::Result<()> {
    let execute_ctx = ctx.clone();
    namespace.set(
        "Execute",
        lua.create_function(move |lua, (line, unrestricted): (Value, Value)| {
            let line = coerce_line(lua, &line, 1)?;
            let unrestricted = matches!(unrestricted, Value::Boolean(true));
            execute_ctx.interfaces().dispatcher().execute(&line, unrestricted);
            Ok(())
        })?,
    )?;

    if let Some(client) = ctx.interfaces().dispatcher().client() {
        let client = client.clone();
        namespace.set(
            "ExecuteOnServer",
            lua.create_function(move |lua, line: Value| {
                let line = coerce_line(lua, &line, 1)?;
                client.server_cmd(&line);
                Ok(())
            })?,
        )?;
    }

    Ok(())
}

fn install_player_command(lua: &Lua, server: Rc<dyn ServerEngine>) -> mlua::Result<()> {
    let existing: Option<Table> = lua.named_registry_value(PLAYER_META)?;
    let meta = match existing {
        Some(meta) => meta,
        None => {
            let meta = lua.create_table()?;
            lua.set_named_registry_value(PLAYER_META, meta.clone())?;
            meta
        }
    };

    let lookup: Function = lua.load(ENTITY_INDEX_LOOKUP_CHUNK).into_function()?;
    meta.set(
        "Command",
        lua.create_function(move |_, (player, line): (Value, Value)| {
            if !matches!(player, Value::Table(_) | Value::UserData(_)) {
                return Err(BridgeError::type_mismatch(1, "entity", &player).into());
            }
            // An entity is anything with an `EntIndex` method.
            let Some(entity_index) = lookup.call::<Option<Function>>(player.clone())? else {
                return Err(BridgeError::type_mismatch(1, "entity", &player).into());
            };
            let line = check_line(&line, 2)?;

            let index: Value = entity_index.call(player)?;
            let index = match index {
                Value::Integer(i) => i as i32,
                Value::Number(n) => n as i32,
                _ => return Err(BridgeError::InvalidTarget.into()),
            };

            let connection = server
                .entity_connection(index)
                .ok_or(BridgeError::InvalidTarget)?;
            server.client_command(connection, &line);
            Ok(())
        })?,
    )
}
