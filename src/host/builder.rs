//! Registration builders for host console entries.

use crate::core::{CommandFlags, EntryKind};

/// A console command to register with a [`LocalEngine`](super::LocalEngine).
///
/// # Examples
///
/// ```ignore
/// let cmd = engine.register_command(
///     ConCommand::new("sv_restart")
///         .description("Restart the round")
///         .flags(CommandFlags::GAMEDLL),
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ConCommand {
    name: String,
    description: String,
    flags: CommandFlags,
}

impl ConCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            flags: CommandFlags::NONE,
        }
    }

    /// Set the help text.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Set the flags.
    pub fn flags(mut self, flags: CommandFlags) -> Self {
        self.flags = flags;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_definition(self) -> Definition {
        Definition {
            kind: EntryKind::Command,
            name: self.name,
            description: self.description,
            flags: self.flags,
        }
    }
}

/// A console variable to register with a [`LocalEngine`](super::LocalEngine).
///
/// Variables share the manager's namespace with commands but are never
/// exposed as command handles.
#[derive(Debug, Clone)]
pub struct ConVar {
    name: String,
    description: String,
    flags: CommandFlags,
}

impl ConVar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            flags: CommandFlags::NONE,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn flags(mut self, flags: CommandFlags) -> Self {
        self.flags = flags;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_definition(self) -> Definition {
        Definition {
            kind: EntryKind::Variable,
            name: self.name,
            description: self.description,
            flags: self.flags,
        }
    }
}

/// Kind-erased registration data.
pub(crate) struct Definition {
    pub kind: EntryKind,
    pub name: String,
    pub description: String,
    pub flags: CommandFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concommand_builder() {
        let def = ConCommand::new("test")
            .description("A test command")
            .flags(CommandFlags::CHEAT)
            .into_definition();

        assert_eq!(def.name, "test");
        assert_eq!(def.description, "A test command");
        assert_eq!(def.kind, EntryKind::Command);
        assert!(def.flags.contains(CommandFlags::CHEAT));
    }

    #[test]
    fn test_convar_builder() {
        let def = ConVar::new("sv_gravity").flags(CommandFlags::ARCHIVE).into_definition();
        assert_eq!(def.kind, EntryKind::Variable);
        assert!(def.description.is_empty());
    }
}
