//! Handle registry: identity caching and invalidation.
//!
//! Handles are cached in a weak-valued Lua table stored in the Lua registry,
//! keyed by the native record address. The table never keeps a handle alive;
//! once scripts drop every reference the collector clears the entry and the
//! handle's finalizer restores the record.

use std::rc::Rc;

use bevy::prelude::*;
use mlua::{Lua, Table, Value};

use super::{BridgeError, CommandPtr, ConCommandHandle, EngineInterfaces, ShadowLedger};

/// Lua registry key of the identity table.
pub const IDENTITY_TABLE: &str = "concommands_objects";

const WEAK_TABLE_CHUNK: &str = "return setmetatable({}, { __mode = 'v' })";

/// State shared by the facade and every handle.
///
/// Handles keep this alive, so finalizers can still restore records after
/// the module is closed.
pub struct BridgeContext {
    interfaces: EngineInterfaces,
    ledger: Rc<ShadowLedger>,
}

impl BridgeContext {
    /// Bind to `interfaces`, recording originals in the thread's shared ledger.
    pub fn new(interfaces: EngineInterfaces) -> Self {
        Self::with_ledger(interfaces, ShadowLedger::shared())
    }

    /// Bind to `interfaces` with an explicit ledger.
    ///
    /// Every bridge that can reach the same records must use the same ledger.
    pub fn with_ledger(interfaces: EngineInterfaces, ledger: Rc<ShadowLedger>) -> Self {
        Self { interfaces, ledger }
    }

    #[inline]
    pub fn interfaces(&self) -> &EngineInterfaces {
        &self.interfaces
    }

    #[inline]
    pub fn ledger(&self) -> &ShadowLedger {
        &self.ledger
    }
}

/// Create the identity table. Fails if the module is already open on `lua`.
pub fn install(lua: &Lua) -> Result<(), BridgeError> {
    let existing: Value = lua.named_registry_value(IDENTITY_TABLE)?;
    if !existing.is_nil() {
        return Err(BridgeError::AlreadyOpen);
    }

    let table: Table = lua.load(WEAK_TABLE_CHUNK).eval()?;
    lua.set_named_registry_value(IDENTITY_TABLE, table)?;
    Ok(())
}

/// Drop the identity table. Existing handles stay valid but are no longer
/// deduplicated.
pub fn uninstall(lua: &Lua) -> mlua::Result<()> {
    lua.unset_named_registry_value(IDENTITY_TABLE)
}

fn identity_table(lua: &Lua) -> mlua::Result<Option<Table>> {
    lua.named_registry_value(IDENTITY_TABLE)
}

#[inline]
fn identity_key(cmd: CommandPtr) -> i64 {
    cmd.address() as i64
}

/// Return the script value for `cmd`: nil for `None`, otherwise the cached
/// handle or a freshly created one.
pub fn push(lua: &Lua, ctx: &Rc<BridgeContext>, cmd: Option<CommandPtr>) -> mlua::Result<Value> {
    let Some(cmd) = cmd else {
        return Ok(Value::Nil);
    };

    let table = identity_table(lua)?.ok_or(BridgeError::NotOpen)?;
    let key = identity_key(cmd);

    let cached: Value = table.raw_get(key)?;
    if let Value::UserData(ud) = &cached {
        let live = ud
            .borrow::<ConCommandHandle>()
            .map(|handle| handle.target() == Some(cmd))
            .unwrap_or(false);
        if live {
            return Ok(cached);
        }
    }

    let ud = lua.create_userdata(ConCommandHandle::new(cmd, ctx.clone())?)?;
    ud.set_user_value(lua.create_table()?)?;
    table.raw_set(key, ud.clone())?;

    Ok(Value::UserData(ud))
}

/// Invalidate `handle`: forget its identity entry, restore the record and
/// clear the target. Returns the record so the caller can unregister it.
///
/// Invalidating an already invalid handle is a no-op returning `None`.
pub fn invalidate(lua: &Lua, handle: &ConCommandHandle) -> mlua::Result<Option<CommandPtr>> {
    let Some(cmd) = handle.target() else {
        return Ok(None);
    };

    if let Some(table) = identity_table(lua)? {
        table.raw_set(identity_key(cmd), Value::Nil)?;
    }

    let released = handle.release();
    debug!("Console bridge: invalidated handle for {:?}", cmd);
    Ok(released)
}

/// Number of handles currently cached.
pub fn cached_len(lua: &Lua) -> mlua::Result<usize> {
    Ok(match identity_table(lua)? {
        Some(table) => table.pairs::<Value, Value>().count(),
        None => 0,
    })
}
