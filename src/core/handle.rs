//! Script handle for a native console command.

use std::cell::{Cell, RefCell};
use std::ffi::c_char;
use std::rc::Rc;

use bevy::prelude::*;
use mlua::{AnyUserData, MetaMethod, Table, UserData, UserDataMethods, UserDataRef, Value};

use super::args::{check_int, coerce_bytes};
use super::registry::{self, BridgeContext};
use super::shadow::{HELP_CAPACITY, NAME_CAPACITY, Originals, ShadowBuffer};
use super::{BridgeError, CommandPtr, NativeCommand};

/// Script-side proxy for a [`NativeCommand`].
///
/// Owns the shadow buffers the record's name and help text may point into.
/// The target is only ever cleared, never repointed.
pub struct ConCommandHandle {
    target: Cell<Option<CommandPtr>>,
    name: RefCell<ShadowBuffer<NAME_CAPACITY>>,
    help: RefCell<ShadowBuffer<HELP_CAPACITY>>,
    originals: Originals,
    ctx: Rc<BridgeContext>,
}

impl ConCommandHandle {
    /// Bind a handle to a live record.
    pub(crate) fn new(cmd: CommandPtr, ctx: Rc<BridgeContext>) -> Result<Self, BridgeError> {
        if !ctx.interfaces().console().is_alive(cmd) {
            return Err(BridgeError::InvalidHandle);
        }
        // SAFETY: checked alive above; the borrow ends inside `acquire`.
        let originals = ctx.ledger().acquire(cmd, unsafe { cmd.record() });
        debug!("Console bridge: new handle for {:?}", cmd);

        Ok(Self {
            target: Cell::new(Some(cmd)),
            name: RefCell::new(ShadowBuffer::new()),
            help: RefCell::new(ShadowBuffer::new()),
            originals,
            ctx,
        })
    }

    /// The bound record, or `None` once invalidated.
    #[inline]
    pub fn target(&self) -> Option<CommandPtr> {
        self.target.get()
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.target.get().is_some()
    }

    /// Engine strings this handle restores on invalidation.
    #[inline]
    pub fn originals(&self) -> Originals {
        self.originals
    }

    pub fn context(&self) -> &Rc<BridgeContext> {
        &self.ctx
    }

    /// The live record, or [`BridgeError::InvalidHandle`].
    ///
    /// A record the engine destroyed behind our back detaches the handle
    /// without touching the freed memory.
    pub fn resolve(&self) -> Result<CommandPtr, BridgeError> {
        let cmd = self.target.get().ok_or(BridgeError::InvalidHandle)?;
        if !self.ctx.interfaces().console().is_alive(cmd) {
            self.detach(cmd);
            return Err(BridgeError::InvalidHandle);
        }
        Ok(cmd)
    }

    /// Run `f` against the live record.
    ///
    /// `f` must not run script code: a collection cycle could finalize the
    /// handle whose buffer the record points into.
    pub fn with_record<R>(&self, f: impl FnOnce(&NativeCommand) -> R) -> Result<R, BridgeError> {
        let cmd = self.resolve()?;
        // SAFETY: `resolve` just checked liveness and nothing in `f` frees records.
        Ok(f(unsafe { cmd.record() }))
    }

    /// Current name, copied out of the record.
    pub fn name(&self) -> Result<Vec<u8>, BridgeError> {
        self.with_record(|record| record.name().to_bytes().to_vec())
    }

    /// Current help text, copied out of the record.
    pub fn help_text(&self) -> Result<Vec<u8>, BridgeError> {
        self.with_record(|record| record.help_text().to_bytes().to_vec())
    }

    /// Copy `name` into the name buffer and point the record at it.
    pub fn set_name(&self, name: &[u8]) -> Result<(), BridgeError> {
        self.with_record(|record| {
            let ptr = self.name.borrow_mut().write(name);
            // SAFETY: the buffer lives as long as this handle, and `release`
            // points the record away from it before the handle goes.
            unsafe { record.set_name_ptr(ptr) };
        })
    }

    /// Copy `help` into the help buffer and point the record at it.
    pub fn set_help_text(&self, help: &[u8]) -> Result<(), BridgeError> {
        self.with_record(|record| {
            let ptr = self.help.borrow_mut().write(help);
            // SAFETY: see `set_name`.
            unsafe { record.set_help_ptr(ptr) };
        })
    }

    /// Restore the record and clear the target.
    ///
    /// Only fields still pointing into this handle's buffers are restored, so
    /// a newer handle's override is never clobbered. Returns the record if it
    /// is still alive.
    pub(crate) fn release(&self) -> Option<CommandPtr> {
        let cmd = self.target.get()?;
        if !self.ctx.interfaces().console().is_alive(cmd) {
            self.detach(cmd);
            return None;
        }

        self.target.set(None);
        // SAFETY: checked alive above and nothing here frees records. The
        // originals are engine strings taken from the shared ledger, never
        // another handle's buffer.
        unsafe {
            let record = cmd.record();
            if record.name_ptr() == self.name_ptr() {
                record.set_name_ptr(self.originals.name);
            }
            if record.help_ptr() == self.help_ptr() {
                record.set_help_ptr(self.originals.help);
            }
        }
        self.ctx.ledger().release(cmd);

        Some(cmd)
    }

    fn detach(&self, cmd: CommandPtr) {
        warn!(
            "Console bridge: record {:?} was destroyed outside the bridge, detaching handle",
            cmd
        );
        self.target.set(None);
        self.ctx.ledger().release(cmd);
    }

    fn name_ptr(&self) -> *const c_char {
        self.name.borrow().as_ptr()
    }

    fn help_ptr(&self) -> *const c_char {
        self.help.borrow().as_ptr()
    }
}

impl Drop for ConCommandHandle {
    fn drop(&mut self) {
        // Finalizer path: restore, never unregister.
        if let Some(cmd) = self.release() {
            debug!("Console bridge: finalized handle for {:?}", cmd);
        }
    }
}

impl std::fmt::Debug for ConCommandHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConCommandHandle")
            .field("target", &self.target.get())
            .finish_non_exhaustive()
    }
}

/// Borrow the handle passed as `self` to a method.
fn check_handle(value: &Value) -> Result<UserDataRef<ConCommandHandle>, BridgeError> {
    if let Value::UserData(ud) = value {
        if let Ok(handle) = ud.borrow::<ConCommandHandle>() {
            return Ok(handle);
        }
    }
    Err(BridgeError::type_mismatch(1, "concommand", value))
}

impl UserData for ConCommandHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        // Methods take `self` as a plain value so a wrong receiver reports a
        // bad argument #1 like every other check.
        methods.add_function("GetName", |lua, this: Value| {
            let name = check_handle(&this)?.name()?;
            lua.create_string(name)
        });

        methods.add_function("SetName", |lua, (this, name): (Value, Value)| {
            let this = check_handle(&this)?;
            let name = coerce_bytes(lua, &name, 2)?;
            this.set_name(&name)?;
            Ok(())
        });

        methods.add_function("GetHelpText", |lua, this: Value| {
            let help = check_handle(&this)?.help_text()?;
            lua.create_string(help)
        });

        methods.add_function("SetHelpText", |lua, (this, help): (Value, Value)| {
            let this = check_handle(&this)?;
            let help = coerce_bytes(lua, &help, 2)?;
            this.set_help_text(&help)?;
            Ok(())
        });

        methods.add_function("GetFlags", |_, this: Value| {
            Ok(check_handle(&this)?.with_record(|record| record.flags())?)
        });

        methods.add_function("SetFlags", |lua, (this, flags): (Value, Value)| {
            let this = check_handle(&this)?;
            let flags = check_int(lua, &flags, 2)?;
            this.with_record(|record| record.set_flags(flags))?;
            Ok(())
        });

        methods.add_function("HasFlag", |lua, (this, flag): (Value, Value)| {
            let this = check_handle(&this)?;
            let flag = check_int(lua, &flag, 2)?;
            Ok(this.with_record(|record| record.is_flag_set(flag))?)
        });

        methods.add_function("Remove", |lua, this: Value| {
            let this = check_handle(&this)?;
            if let Some(cmd) = registry::invalidate(lua, &this)? {
                this.ctx.interfaces().console().unregister(cmd);
            }
            Ok(())
        });

        methods.add_meta_function(MetaMethod::Eq, |_, (lhs, rhs): (AnyUserData, Value)| {
            let lhs = lhs.borrow::<ConCommandHandle>()?.resolve()?;
            let Value::UserData(rhs) = rhs else {
                return Ok(false);
            };
            let Ok(rhs) = rhs.borrow::<ConCommandHandle>() else {
                return Ok(false);
            };
            Ok(lhs == rhs.resolve()?)
        });

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            let cmd = this.resolve()?;
            Ok(format!("concommand: {:p}", cmd.as_ptr()))
        });

        // Built-in methods win; anything else lives in the per-handle table.
        methods.add_meta_function(MetaMethod::Index, |_, (ud, key): (AnyUserData, Value)| {
            let extension: Table = ud.user_value()?;
            let value: Value = extension.raw_get(key)?;
            Ok(value)
        });

        methods.add_meta_function(
            MetaMethod::NewIndex,
            |_, (ud, key, value): (AnyUserData, Value, Value)| {
                let extension: Table = ud.user_value()?;
                extension.raw_set(key, value)
            },
        );
    }
}
