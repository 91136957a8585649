//! Shadow state for handle-owned name and help text overrides.
//!
//! A [`ShadowBuffer`] is a fixed-capacity, NUL-terminated byte buffer that an
//! engine record may point into. The [`ShadowLedger`] remembers the engine's
//! original string pointers per record address, so that a handle created
//! while an older handle for the same record still awaits finalization
//! snapshots the engine strings and not the older handle's buffer.
//!
//! Records outlive any single module open and may be reached from several
//! Lua states, so the ledger is one per thread rather than one per bridge.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{CStr, c_char};
use std::rc::Rc;

use super::{CommandPtr, NativeCommand};

/// Name buffer capacity, including the terminator.
pub const NAME_CAPACITY: usize = 64;

/// Help text buffer capacity, including the terminator.
pub const HELP_CAPACITY: usize = 256;

/// Fixed-capacity C string storage with a stable address.
pub struct ShadowBuffer<const N: usize> {
    bytes: Box<[u8; N]>,
}

impl<const N: usize> ShadowBuffer<N> {
    pub fn new() -> Self {
        Self {
            bytes: Box::new([0; N]),
        }
    }

    /// Copy `src` in with `strncpy` semantics: stop at the first NUL, keep at
    /// most `N - 1` bytes, always terminate.
    pub fn write(&mut self, src: &[u8]) -> *const c_char {
        let len = src
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(src.len())
            .min(N - 1);

        self.bytes[..len].copy_from_slice(&src[..len]);
        self.bytes[len] = 0;
        self.as_ptr()
    }

    /// Address the engine record is pointed at.
    #[inline]
    pub fn as_ptr(&self) -> *const c_char {
        self.bytes.as_ptr().cast()
    }

    pub fn as_c_str(&self) -> &CStr {
        // A terminator is always present: the buffer starts zeroed and `write`
        // never touches the last byte except to terminate.
        CStr::from_bytes_until_nul(&self.bytes[..]).unwrap_or_default()
    }

    /// Usable bytes, excluding the terminator.
    pub const fn capacity() -> usize {
        N - 1
    }
}

impl<const N: usize> Default for ShadowBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine string pointers captured before any handle touched a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Originals {
    pub name: *const c_char,
    pub help: *const c_char,
}

struct LedgerEntry {
    originals: Originals,
    holders: usize,
}

/// Per-address originals shared by every handle alive for that address.
#[derive(Default)]
pub struct ShadowLedger {
    entries: RefCell<HashMap<usize, LedgerEntry>>,
}

thread_local! {
    static SHARED_LEDGER: Rc<ShadowLedger> = Rc::new(ShadowLedger::new());
}

impl ShadowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ledger every bridge on this thread uses by default.
    pub fn shared() -> Rc<ShadowLedger> {
        SHARED_LEDGER.with(Rc::clone)
    }

    /// Register a new handle for `cmd` and return the originals it must
    /// restore on invalidation.
    ///
    /// `record` is the live record at `cmd`. Its current pointers are only
    /// taken when no other handle holds the address.
    pub fn acquire(&self, cmd: CommandPtr, record: &NativeCommand) -> Originals {
        let mut entries = self.entries.borrow_mut();
        let entry = entries.entry(cmd.address()).or_insert_with(|| {
            LedgerEntry {
                originals: Originals {
                    name: record.name_ptr(),
                    help: record.help_ptr(),
                },
                holders: 0,
            }
        });
        entry.holders += 1;
        entry.originals
    }

    /// Drop one holder for `cmd`.
    pub fn release(&self, cmd: CommandPtr) {
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.get_mut(&cmd.address()) {
            entry.holders -= 1;
            if entry.holders == 0 {
                entries.remove(&cmd.address());
            }
        }
    }

    /// Number of handles alive for `cmd`.
    pub fn holders(&self, cmd: CommandPtr) -> usize {
        self.entries
            .borrow()
            .get(&cmd.address())
            .map(|e| e.holders)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CommandFlags, ConsoleManager};
    use crate::host::{ConCommand, LocalEngine};

    #[test]
    fn test_write_truncates() {
        let mut buf = ShadowBuffer::<8>::new();
        buf.write(b"abcdefghijkl");
        assert_eq!(buf.as_c_str().to_bytes(), b"abcdefg");
        assert_eq!(ShadowBuffer::<8>::capacity(), 7);
    }

    #[test]
    fn test_write_stops_at_nul() {
        let mut buf = ShadowBuffer::<NAME_CAPACITY>::new();
        buf.write(b"first\0second");
        assert_eq!(buf.as_c_str().to_bytes(), b"first");
    }

    #[test]
    fn test_rewrite_shorter() {
        let mut buf = ShadowBuffer::<NAME_CAPACITY>::new();
        let first = buf.write(b"a_long_name");
        let second = buf.write(b"x");
        assert_eq!(first, second);
        assert_eq!(buf.as_c_str().to_bytes(), b"x");
    }

    #[test]
    fn test_ledger_keeps_first_originals() {
        let engine = LocalEngine::new();
        let cmd = engine.register_command(
            ConCommand::new("sv_test").description("help").flags(CommandFlags::NONE),
        );
        let ledger = ShadowLedger::new();

        let first = engine.with_record(cmd, |record| ledger.acquire(cmd, record)).unwrap();
        let mut buf = ShadowBuffer::<NAME_CAPACITY>::new();
        let ptr = buf.write(b"shadowed");
        engine.with_record(cmd, |record| unsafe { record.set_name_ptr(ptr) });

        // A second holder must see the engine string, not the buffer.
        let second = engine.with_record(cmd, |record| ledger.acquire(cmd, record)).unwrap();
        assert_eq!(first, second);
        assert_ne!(second.name, ptr);
        assert_eq!(ledger.holders(cmd), 2);

        engine.with_record(cmd, |record| unsafe { record.set_name_ptr(first.name) });
        ledger.release(cmd);
        ledger.release(cmd);
        assert!(ledger.is_empty());
        assert!(engine.is_alive(cmd));
    }

    #[test]
    fn test_shared_ledger_is_per_thread() {
        let first = ShadowLedger::shared();
        let second = ShadowLedger::shared();
        assert!(Rc::ptr_eq(&first, &second));

        let other = std::thread::spawn(|| Rc::as_ptr(&ShadowLedger::shared()) as usize)
            .join()
            .unwrap();
        assert_ne!(other, Rc::as_ptr(&first) as usize);
    }
}
