//! Bridge configuration.

use std::fmt;

use bevy::prelude::*;

#[cfg(feature = "persist")]
use serde::{Deserialize, Serialize};

/// Which side of the engine the bridge runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "persist", derive(Serialize, Deserialize))]
pub enum Role {
    /// Dedicated or listen server realm.
    #[default]
    Server,
    /// Client realm.
    Client,
}

impl Role {
    /// Get the display name for this role.
    pub fn name(&self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Module and version names used to resolve engine interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "persist", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "persist", serde(default))]
pub struct InterfaceNames {
    /// Module exporting the console manager.
    pub cvar_module: String,
    /// Console manager interface version.
    pub cvar_version: String,
    /// Module exporting the engine dispatch interfaces.
    pub engine_module: String,
    /// Server dispatch interface version.
    pub server_version: String,
    /// Client dispatch interface version.
    pub client_version: String,
}

impl Default for InterfaceNames {
    fn default() -> Self {
        Self {
            cvar_module: "vstdlib".into(),
            cvar_version: "VEngineCvar007".into(),
            engine_module: "engine".into(),
            server_version: "VEngineServer021".into(),
            client_version: "VEngineClient015".into(),
        }
    }
}

/// Configuration for the script bridge.
///
/// # Examples
///
/// ```ignore
/// let config = BridgeConfig {
///     role: Role::Client,
///     ..Default::default()
/// };
/// app.add_plugins(ConCommandScriptPlugin::new(config));
/// ```
#[derive(Resource, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "persist", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "persist", serde(default))]
pub struct BridgeConfig {
    /// Server or client behavior for `Execute` and friends.
    pub role: Role,
    /// Global table the functions are installed into.
    pub namespace: String,
    /// Interface names.
    pub interfaces: InterfaceNames,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            role: Role::Server,
            namespace: "concommand".into(),
            interfaces: InterfaceNames::default(),
        }
    }
}

impl BridgeConfig {
    /// Default configuration for the given role.
    pub fn for_role(role: Role) -> Self {
        Self {
            role,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.role, Role::Server);
        assert_eq!(config.namespace, "concommand");
        assert_eq!(config.interfaces.server_version, "VEngineServer021");
        assert_eq!(config.interfaces.client_version, "VEngineClient015");
    }

    #[test]
    fn test_for_role() {
        let config = BridgeConfig::for_role(Role::Client);
        assert_eq!(config.role, Role::Client);
        assert_eq!(config.role.to_string(), "client");
    }
}
