//! Bridge error type.

use std::fmt;

/// Errors raised by the bridge.
///
/// Everything except [`BridgeError::FatalInit`] and [`BridgeError::AlreadyOpen`]
/// surfaces to scripts as a catchable error.
#[derive(Debug)]
pub enum BridgeError {
    /// A required engine interface could not be resolved.
    FatalInit(String),
    /// The module is already open on this Lua state.
    AlreadyOpen,
    /// The module is not open (failed to load, or closed).
    NotOpen,
    /// The handle was removed, finalized or its record destroyed.
    InvalidHandle,
    /// An argument had the wrong kind.
    TypeMismatch {
        /// 1-based argument position.
        position: usize,
        /// Expected kind.
        expected: &'static str,
        /// Kind actually passed.
        got: &'static str,
    },
    /// An entity did not resolve to a connected player.
    InvalidTarget,
    /// The scripting engine failed.
    Lua(mlua::Error),
}

impl BridgeError {
    /// Build a [`BridgeError::TypeMismatch`] from the offending value.
    ///
    /// Kinds are named the way Lua's `type()` names them.
    pub fn type_mismatch(position: usize, expected: &'static str, got: &mlua::Value) -> Self {
        let got = match got {
            mlua::Value::Integer(_) => "number",
            mlua::Value::LightUserData(_) => "userdata",
            other => other.type_name(),
        };
        BridgeError::TypeMismatch {
            position,
            expected,
            got,
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::FatalInit(msg) => write!(f, "{}", msg),
            BridgeError::AlreadyOpen => write!(f, "concommand module is already open"),
            BridgeError::NotOpen => write!(f, "concommand module is not open"),
            BridgeError::InvalidHandle => write!(f, "invalid concommand"),
            BridgeError::TypeMismatch { position, expected, got } => {
                write!(f, "bad argument #{} ({} expected, got {})", position, expected, got)
            }
            BridgeError::InvalidTarget => write!(f, "Player object is not valid"),
            BridgeError::Lua(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Lua(err) => Some(err),
            _ => None,
        }
    }
}

impl From<mlua::Error> for BridgeError {
    fn from(err: mlua::Error) -> Self {
        BridgeError::Lua(err)
    }
}

impl From<BridgeError> for mlua::Error {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Lua(err) => err,
            other => mlua::Error::external(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(BridgeError::InvalidHandle.to_string(), "invalid concommand");
        assert_eq!(BridgeError::InvalidTarget.to_string(), "Player object is not valid");

        let err = BridgeError::type_mismatch(2, "string", &mlua::Value::Nil);
        assert_eq!(err.to_string(), "bad argument #2 (string expected, got nil)");
    }

    #[test]
    fn test_into_lua_error_keeps_message() {
        let err: mlua::Error = BridgeError::InvalidHandle.into();
        assert!(err.to_string().contains("invalid concommand"));
    }
}
