//! Engine-resident console records.
//!
//! A [`NativeCommand`] is owned by the engine. The bridge only ever holds a
//! [`CommandPtr`] to it and reads or repoints its fields in place.

use std::cell::Cell;
use std::ffi::{CStr, c_char};
use std::fmt;
use std::ptr::NonNull;

/// Flags carried by console entries.
///
/// These match the Source Engine FCVAR_ values so that scripts written
/// against the engine's constants keep working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandFlags(i32);

impl CommandFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);

    /// Entry is not registered with the manager (FCVAR_UNREGISTERED).
    pub const UNREGISTERED: Self = Self(1 << 0);

    /// Hidden in released products (FCVAR_DEVELOPMENTONLY).
    pub const DEVELOPMENT_ONLY: Self = Self(1 << 1);

    /// Defined by the game DLL (FCVAR_GAMEDLL).
    pub const GAMEDLL: Self = Self(1 << 2);

    /// Defined by the client DLL (FCVAR_CLIENTDLL).
    pub const CLIENTDLL: Self = Self(1 << 3);

    /// Hidden from listing and autocomplete (FCVAR_HIDDEN).
    pub const HIDDEN: Self = Self(1 << 4);

    /// Value is not sent to clients (FCVAR_PROTECTED).
    pub const PROTECTED: Self = Self(1 << 5);

    /// Single player only (FCVAR_SPONLY).
    pub const SP_ONLY: Self = Self(1 << 6);

    /// Saved to the config file (FCVAR_ARCHIVE).
    pub const ARCHIVE: Self = Self(1 << 7);

    /// Announced to players on change (FCVAR_NOTIFY).
    pub const NOTIFY: Self = Self(1 << 8);

    /// Requires sv_cheats (FCVAR_CHEAT).
    pub const CHEAT: Self = Self(1 << 14);

    /// Server may run this on clients (FCVAR_SERVER_CAN_EXECUTE).
    pub const SERVER_CAN_EXECUTE: Self = Self(1 << 28);

    /// Restricted client execution may run this (FCVAR_CLIENTCMD_CAN_EXECUTE).
    pub const CLIENTCMD_CAN_EXECUTE: Self = Self(1 << 30);

    /// Build flags from a raw bit set.
    #[inline]
    pub const fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    /// The raw bit set.
    #[inline]
    pub const fn bits(self) -> i32 {
        self.0
    }

    /// Check if every flag in `other` is set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Check if any flag in `other` is set.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Combine two flag sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Check if no flags are set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for CommandFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for CommandFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

/// Discriminates invocable commands from variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    /// An invocable console command.
    Command = 0,
    /// A console variable.
    Variable = 1,
}

/// Engine-side console entry (`ConCommandBase` layout).
///
/// The string fields are raw, non-owning pointers. The engine points them at
/// its own storage; a script handle may temporarily point them at its shadow
/// buffers.
#[repr(C)]
pub struct NativeCommand {
    name: Cell<*const c_char>,
    help_string: Cell<*const c_char>,
    flags: Cell<i32>,
    kind: EntryKind,
}

impl NativeCommand {
    /// Create a record.
    ///
    /// # Safety
    ///
    /// `name` and `help_string` must point at NUL-terminated strings that stay
    /// valid for as long as they are installed on the record.
    pub unsafe fn new(
        kind: EntryKind,
        name: *const c_char,
        help_string: *const c_char,
        flags: CommandFlags,
    ) -> Self {
        Self {
            name: Cell::new(name),
            help_string: Cell::new(help_string),
            flags: Cell::new(flags.bits()),
            kind,
        }
    }

    /// Current name.
    pub fn name(&self) -> &CStr {
        // SAFETY: the installed pointer is NUL-terminated and alive (`new` contract,
        // shadow buffers are only installed while their handle is live).
        unsafe { CStr::from_ptr(self.name.get()) }
    }

    /// Current help text.
    pub fn help_text(&self) -> &CStr {
        // SAFETY: same contract as `name`.
        unsafe { CStr::from_ptr(self.help_string.get()) }
    }

    #[inline]
    pub fn name_ptr(&self) -> *const c_char {
        self.name.get()
    }

    #[inline]
    pub fn help_ptr(&self) -> *const c_char {
        self.help_string.get()
    }

    /// Repoint the name field.
    ///
    /// # Safety
    ///
    /// `ptr` must point at a NUL-terminated string that stays valid until the
    /// field is repointed again.
    #[inline]
    pub unsafe fn set_name_ptr(&self, ptr: *const c_char) {
        self.name.set(ptr);
    }

    /// Repoint the help text field.
    ///
    /// # Safety
    ///
    /// Same contract as [`set_name_ptr`](Self::set_name_ptr).
    #[inline]
    pub unsafe fn set_help_ptr(&self, ptr: *const c_char) {
        self.help_string.set(ptr);
    }

    #[inline]
    pub fn flags(&self) -> i32 {
        self.flags.get()
    }

    #[inline]
    pub fn set_flags(&self, flags: i32) {
        self.flags.set(flags);
    }

    /// Bitwise test against the raw flag set.
    #[inline]
    pub fn is_flag_set(&self, flag: i32) -> bool {
        (self.flags.get() & flag) != 0
    }

    #[inline]
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// `true` for invocable commands, `false` for variables.
    #[inline]
    pub fn is_command(&self) -> bool {
        self.kind == EntryKind::Command
    }
}

impl fmt::Debug for NativeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCommand")
            .field("name", &self.name())
            .field("flags", &self.flags())
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Non-owning pointer to an engine record. Identity is the address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandPtr(NonNull<NativeCommand>);

impl CommandPtr {
    /// Wrap a record pointer handed out by the engine.
    ///
    /// # Safety
    ///
    /// The record must stay allocated for as long as the console manager
    /// reports it alive through [`ConsoleManager::is_alive`](crate::core::ConsoleManager::is_alive).
    pub unsafe fn from_raw(ptr: NonNull<NativeCommand>) -> Self {
        Self(ptr)
    }

    /// Address used as the identity key.
    #[inline]
    pub fn address(self) -> usize {
        self.0.as_ptr() as usize
    }

    #[inline]
    pub fn as_ptr(self) -> *const NativeCommand {
        self.0.as_ptr()
    }

    /// Borrow the record.
    ///
    /// # Safety
    ///
    /// The manager must report the record alive, and nothing may free it
    /// while the returned borrow is in use.
    #[inline]
    pub unsafe fn record(&self) -> &NativeCommand {
        // SAFETY: caller contract.
        unsafe { self.0.as_ref() }
    }
}

impl fmt::Debug for CommandPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandPtr({:p})", self.0.as_ptr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_bit_ops() {
        let flags = CommandFlags::CHEAT | CommandFlags::NOTIFY;
        assert!(flags.contains(CommandFlags::CHEAT));
        assert!(flags.intersects(CommandFlags::NOTIFY | CommandFlags::ARCHIVE));
        assert!(!flags.contains(CommandFlags::ARCHIVE));
        assert_eq!(flags.bits(), (1 << 14) | (1 << 8));
        assert!(CommandFlags::NONE.is_empty());
    }

    #[test]
    fn test_record_fields() {
        let name = c"sv_test";
        let help = c"Test command";
        // SAFETY: literals are 'static.
        let record = unsafe {
            NativeCommand::new(EntryKind::Command, name.as_ptr(), help.as_ptr(), CommandFlags::GAMEDLL)
        };

        assert_eq!(record.name(), name);
        assert_eq!(record.help_text(), help);
        assert!(record.is_command());
        assert!(record.is_flag_set(CommandFlags::GAMEDLL.bits()));
        assert!(!record.is_flag_set(CommandFlags::CHEAT.bits()));

        record.set_flags(4 | 1);
        assert!(record.is_flag_set(1));
        assert_eq!(record.flags(), 5);
    }

    #[test]
    fn test_repoint_name() {
        let renamed = c"renamed";
        // SAFETY: literals are 'static.
        let record = unsafe {
            NativeCommand::new(EntryKind::Variable, c"x".as_ptr(), c"".as_ptr(), CommandFlags::NONE)
        };
        unsafe { record.set_name_ptr(renamed.as_ptr()) };
        assert_eq!(record.name(), renamed);
        assert!(!record.is_command());
    }
}
