//! Remote debuggers that can be injected into a built app
//!
//! `--debug "[DEBUGGER[,[IP:]PORT][,MODE]]"` selects a debugger; the debugger
//! contributes the support package (and any extra requirements) installed
//! into the app, and the app learns how to connect from the
//! `BRIEFCASE_DEBUGGER` environment variable at startup.

use std::sync::Arc;

use briefcase_core::{BriefcaseError, ConnectionMode, DebuggerConfig, Result};
use serde::Serialize;
use tracing::debug;

/// Environment variable carrying the debugger settings into the app
pub const DEBUGGER_ENV: &str = "BRIEFCASE_DEBUGGER";

pub const DEFAULT_DEBUGGER: &str = "pdb";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5678;

/// A debugger briefcase knows how to wire into an app
pub trait Debugger: Send + Sync {
    fn name(&self) -> &'static str;

    fn supported_modes(&self) -> &'static [ConnectionMode];

    fn default_mode(&self) -> ConnectionMode;

    /// Package carrying the debug bridge into the app
    fn debugger_support_pkg(&self) -> String {
        format!("briefcase-debugger[{}]~=0.1", self.name())
    }

    /// Requirements the debugger itself needs at runtime
    fn additional_requirements(&self) -> Vec<String> {
        Vec::new()
    }

    /// Everything to add to the app's requirements
    fn requirements(&self) -> Vec<String> {
        let mut requires = vec![self.debugger_support_pkg()];
        requires.extend(self.additional_requirements());
        requires
    }
}

/// Python's built-in debugger, served over a socket
pub struct Pdb;

impl Debugger for Pdb {
    fn name(&self) -> &'static str {
        "pdb"
    }

    fn supported_modes(&self) -> &'static [ConnectionMode] {
        &[ConnectionMode::Server]
    }

    fn default_mode(&self) -> ConnectionMode {
        ConnectionMode::Server
    }
}

/// The debugpy (VS Code) debug adapter
pub struct Debugpy;

impl Debugger for Debugpy {
    fn name(&self) -> &'static str {
        "debugpy"
    }

    fn supported_modes(&self) -> &'static [ConnectionMode] {
        &[ConnectionMode::Server, ConnectionMode::Client]
    }

    fn default_mode(&self) -> ConnectionMode {
        ConnectionMode::Server
    }

    fn additional_requirements(&self) -> Vec<String> {
        vec!["debugpy~=1.8.12".to_string()]
    }
}

/// The parts of a `--debug` specification, before defaults are applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebuggerSpec {
    pub debugger: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub mode: Option<String>,
}

fn non_empty(part: &str) -> Option<String> {
    (!part.is_empty()).then(|| part.to_string())
}

/// Parse `[DEBUGGER[,[IP:]PORT][,MODE]]`
pub fn parse_debugger_spec(spec: &str) -> Result<DebuggerSpec> {
    let invalid = || BriefcaseError::command(format!("Invalid remote debugger specification: {}", spec));

    let parts: Vec<&str> = spec.split(',').collect();
    let (debugger, address, mode) = match parts.as_slice() {
        [debugger] => (*debugger, None, None),
        [debugger, address] => (*debugger, Some(*address), None),
        [debugger, address, mode] => (*debugger, Some(*address), Some(*mode)),
        _ => return Err(invalid()),
    };

    let (host, port) = match address {
        None => (None, None),
        Some(address) => match address.split(':').collect::<Vec<_>>().as_slice() {
            [port] => (None, non_empty(port)),
            [host, port] => (non_empty(host), non_empty(port)),
            _ => return Err(invalid()),
        },
    };

    let port = port
        .map(|port| {
            port.parse::<u16>()
                .map_err(|_| BriefcaseError::command(format!("Invalid remote debugger port: {}", port)))
        })
        .transpose()?;

    Ok(DebuggerSpec {
        debugger: non_empty(debugger),
        host,
        port,
        mode: mode.and_then(non_empty),
    })
}

/// What the app reads from `BRIEFCASE_DEBUGGER`
#[derive(Debug, Serialize)]
struct RemoteDebuggerEnv<'a> {
    debugger: &'a str,
    mode: ConnectionMode,
    ip: &'a str,
    port: u16,
}

/// Serialise `config` for the app's environment
pub fn debugger_env(config: &DebuggerConfig) -> Result<String> {
    serde_json::to_string(&RemoteDebuggerEnv {
        debugger: &config.debugger,
        mode: config.mode,
        ip: &config.host,
        port: config.port,
    })
    .map_err(|e| BriefcaseError::command(format!("Unable to encode debugger settings: {}", e)))
}

/// Registry of available debuggers
pub struct DebuggerRegistry {
    debuggers: Vec<Arc<dyn Debugger>>,
}

impl DebuggerRegistry {
    pub fn new() -> Self {
        Self {
            debuggers: Vec::new(),
        }
    }

    /// Create a registry holding `pdb` and `debugpy`
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Pdb)?;
        registry.register(Debugpy)?;
        Ok(registry)
    }

    pub fn register<D: Debugger + 'static>(&mut self, debugger: D) -> Result<()> {
        let name = debugger.name();
        if self.debuggers.iter().any(|d| d.name() == name) {
            return Err(BriefcaseError::config(format!(
                "Debugger '{}' is registered more than once",
                name
            )));
        }
        debug!(debugger = name, "registering debugger");
        self.debuggers.push(Arc::new(debugger));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Debugger>> {
        self.debuggers.iter().find(|d| d.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.debuggers.iter().map(|d| d.name()).collect()
    }

    /// Resolve a debugger by name
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Debugger>> {
        self.get(name).ok_or_else(|| {
            BriefcaseError::command(format!(
                "Unknown debugger '{}'; (choose from: {})",
                name,
                self.names().join(", ")
            ))
        })
    }

    /// Turn a `--debug` value into a debugger and its connection settings
    pub fn configure(&self, spec: &str) -> Result<(Arc<dyn Debugger>, DebuggerConfig)> {
        let spec = parse_debugger_spec(spec)?;
        let debugger = self.resolve(spec.debugger.as_deref().unwrap_or(DEFAULT_DEBUGGER))?;

        let mode = match spec.mode.as_deref() {
            None => debugger.default_mode(),
            Some(requested) => ConnectionMode::parse(requested)
                .filter(|mode| debugger.supported_modes().contains(mode))
                .ok_or_else(|| {
                    BriefcaseError::config(format!(
                        "Unsupported debugger mode: {} for {}",
                        requested,
                        debugger.name()
                    ))
                })?,
        };

        let config = DebuggerConfig {
            debugger: debugger.name().to_string(),
            mode,
            host: spec.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: spec.port.filter(|port| *port != 0).unwrap_or(DEFAULT_PORT),
        };
        debug!(debugger = %config.debugger, mode = config.mode.as_str(), port = config.port, "debugger configured");
        Ok((debugger, config))
    }
}

impl Default for DebuggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spec() {
        assert_eq!(parse_debugger_spec("").unwrap(), DebuggerSpec::default());
        assert_eq!(
            parse_debugger_spec("pdb").unwrap(),
            DebuggerSpec {
                debugger: Some("pdb".into()),
                ..Default::default()
            }
        );
        assert_eq!(
            parse_debugger_spec("pdb,5679").unwrap(),
            DebuggerSpec {
                debugger: Some("pdb".into()),
                port: Some(5679),
                ..Default::default()
            }
        );
        assert_eq!(
            parse_debugger_spec("pdb,,server").unwrap(),
            DebuggerSpec {
                debugger: Some("pdb".into()),
                mode: Some("server".into()),
                ..Default::default()
            }
        );
        assert_eq!(
            parse_debugger_spec("debugpy,0.0.0.0:9999,client").unwrap(),
            DebuggerSpec {
                debugger: Some("debugpy".into()),
                host: Some("0.0.0.0".into()),
                port: Some(9999),
                mode: Some("client".into()),
            }
        );
    }

    #[test]
    fn test_parse_spec_errors() {
        assert_eq!(
            parse_debugger_spec("pdb,1,server,extra").unwrap_err().to_string(),
            "Invalid remote debugger specification: pdb,1,server,extra"
        );
        assert_eq!(
            parse_debugger_spec("pdb,a:b:c").unwrap_err().to_string(),
            "Invalid remote debugger specification: pdb,a:b:c"
        );
        assert_eq!(
            parse_debugger_spec("pdb,localhost:port").unwrap_err().to_string(),
            "Invalid remote debugger port: port"
        );
    }

    #[test]
    fn test_configure_defaults() {
        let registry = DebuggerRegistry::with_builtins().unwrap();
        let (debugger, config) = registry.configure("").unwrap();
        assert_eq!(debugger.name(), "pdb");
        assert_eq!(
            config,
            DebuggerConfig {
                debugger: "pdb".into(),
                mode: ConnectionMode::Server,
                host: "localhost".into(),
                port: 5678,
            }
        );
    }

    #[test]
    fn test_configure_modes() {
        let registry = DebuggerRegistry::with_builtins().unwrap();
        let (_, config) = registry.configure("debugpy,myhost:1234,client").unwrap();
        assert_eq!(config.mode, ConnectionMode::Client);
        assert_eq!(config.host, "myhost");
        assert_eq!(config.port, 1234);

        let err = registry.configure("pdb,,client").err().unwrap();
        assert_eq!(
            err.to_string(),
            "Briefcase configuration error: Unsupported debugger mode: client for pdb"
        );
        let err = registry.configure("pdb,,sideways").err().unwrap();
        assert!(matches!(err, BriefcaseError::Config(_)));
    }

    #[test]
    fn test_unknown_debugger() {
        let registry = DebuggerRegistry::with_builtins().unwrap();
        let err = registry.configure("gdb").err().unwrap();
        assert_eq!(err.to_string(), "Unknown debugger 'gdb'; (choose from: pdb, debugpy)");
    }

    #[test]
    fn test_duplicate_debugger() {
        let mut registry = DebuggerRegistry::with_builtins().unwrap();
        assert!(registry.register(Pdb).is_err());
    }

    #[test]
    fn test_requirements() {
        assert_eq!(Pdb.requirements(), vec!["briefcase-debugger[pdb]~=0.1"]);
        assert_eq!(
            Debugpy.requirements(),
            vec!["briefcase-debugger[debugpy]~=0.1", "debugpy~=1.8.12"]
        );
    }

    #[test]
    fn test_debugger_env() {
        let config = DebuggerConfig {
            debugger: "debugpy".into(),
            mode: ConnectionMode::Client,
            host: "somehost".into(),
            port: 9999,
        };
        assert_eq!(
            debugger_env(&config).unwrap(),
            r#"{"debugger":"debugpy","mode":"client","ip":"somehost","port":9999}"#
        );
    }
}
