//! Argument checks for script-facing functions.
//!
//! Lookups by existence take strings only. Everything else that wants text
//! also takes a number and renders it the way Lua's `tostring` would.

use mlua::{Lua, Value};

use super::BridgeError;

/// Accept a string, and only a string, as raw bytes.
pub fn check_string(value: &Value, position: usize) -> Result<Vec<u8>, BridgeError> {
    match value {
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        other => Err(BridgeError::type_mismatch(position, "string", other)),
    }
}

/// Accept a string or a number, coerced the way Lua coerces it (`1.0`
/// stays `"1.0"`).
pub fn coerce_bytes(lua: &Lua, value: &Value, position: usize) -> Result<Vec<u8>, BridgeError> {
    match value {
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        Value::Integer(_) | Value::Number(_) => match lua.coerce_string(value.clone())? {
            Some(s) => Ok(s.as_bytes().to_vec()),
            None => Err(BridgeError::type_mismatch(position, "string", value)),
        },
        other => Err(BridgeError::type_mismatch(position, "string", other)),
    }
}

/// Strict command line. Invalid UTF-8 is replaced, not rejected.
pub fn check_line(value: &Value, position: usize) -> Result<String, BridgeError> {
    let bytes = check_string(value, position)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Command line that also takes a number.
pub fn coerce_line(lua: &Lua, value: &Value, position: usize) -> Result<String, BridgeError> {
    let bytes = coerce_bytes(lua, value, position)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Accept a number (or a numeric string) and narrow it to the engine's
/// 32-bit flag width.
pub fn check_int(lua: &Lua, value: &Value, position: usize) -> Result<i32, BridgeError> {
    match value {
        Value::Integer(i) => Ok(*i as i32),
        Value::Number(n) => Ok(*n as i32),
        Value::String(_) => match lua.coerce_number(value.clone())? {
            Some(n) => Ok(n as i32),
            None => Err(BridgeError::type_mismatch(position, "number", value)),
        },
        other => Err(BridgeError::type_mismatch(position, "number", other)),
    }
}
