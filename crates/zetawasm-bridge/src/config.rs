//! Configuration for the engine runtime.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BridgeError, Result};

/// Guest path where the engine looks for timezone data.
pub const GUEST_ZONEINFO_DIR: &str = "/usr/share/zoneinfo";

/// Default prefix of the engine's exports.
pub const DEFAULT_EXPORT_PREFIX: &str = "wasm_";

/// A host directory made visible to the guest under `guest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preopen {
    /// Directory on the host
    pub host: PathBuf,
    /// Path the guest sees
    pub guest: String,
}

/// WASI capability grants for the engine instance.
///
/// Following the deny-by-default security model, all capabilities
/// start disabled and must be explicitly enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WasiCapabilities {
    /// Allow access to stdin
    pub stdin: bool,

    /// Allow access to stdout
    pub stdout: bool,

    /// Allow access to stderr
    pub stderr: bool,

    /// Directories to pre-open read-only
    pub preopened_dirs_ro: Vec<Preopen>,

    /// Environment variables to expose
    pub env_vars: Vec<(String, String)>,

    /// Command-line arguments to pass
    pub args: Vec<String>,
}

impl WasiCapabilities {
    /// Create capabilities with nothing allowed (maximum isolation)
    pub fn none() -> Self {
        Self::default()
    }

    /// Capabilities the engine runs with by default: its diagnostics go to
    /// the host's stdout/stderr, nothing else is granted.
    pub fn engine() -> Self {
        Self {
            stdout: true,
            stderr: true,
            ..Default::default()
        }
    }

    /// Create capabilities with stdio allowed
    pub fn with_stdio() -> Self {
        Self {
            stdin: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        }
    }

    /// Builder: enable stdin
    pub fn stdin(mut self, allow: bool) -> Self {
        self.stdin = allow;
        self
    }

    /// Builder: enable stdout
    pub fn stdout(mut self, allow: bool) -> Self {
        self.stdout = allow;
        self
    }

    /// Builder: enable stderr
    pub fn stderr(mut self, allow: bool) -> Self {
        self.stderr = allow;
        self
    }

    /// Builder: add a read-only directory mapped to `guest`
    pub fn preopened_dir_ro(mut self, host: impl Into<PathBuf>, guest: impl Into<String>) -> Self {
        self.preopened_dirs_ro.push(Preopen {
            host: host.into(),
            guest: guest.into(),
        });
        self
    }

    /// Builder: expose a host tz database as the guest's zoneinfo directory
    pub fn zoneinfo(self, host: impl Into<PathBuf>) -> Self {
        self.preopened_dir_ro(host, GUEST_ZONEINFO_DIR)
    }

    /// Builder: add environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Builder: add command-line argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Configuration for the engine runtime and its instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// WASI capability configuration
    pub capabilities: WasiCapabilities,

    /// Prefix shared by all bridge exports (`wasm_malloc`, `wasm_prepare_query`, ...)
    pub export_prefix: String,

    /// Maximum linear memory in bytes
    pub max_memory: usize,

    /// Enable fuel-based execution limiting
    pub fuel_limit: Option<u64>,

    /// Cranelift optimization level (0-3)
    pub optimization_level: u8,

    /// Enable SIMD support
    pub enable_simd: bool,

    /// Call the guest's `_initialize` export after instantiation
    pub run_initializer: bool,

    /// wasmtime cache configuration file for compiled modules
    pub cache_path: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            capabilities: WasiCapabilities::engine(),
            export_prefix: DEFAULT_EXPORT_PREFIX.to_string(),
            max_memory: 1024 * 1024 * 1024, // 1 GB, the engine keeps catalogs in guest memory
            fuel_limit: None,
            optimization_level: 2,
            enable_simd: true,
            run_initializer: true,
            cache_path: None,
        }
    }
}

impl BridgeConfig {
    /// Create a minimal config for maximum isolation
    pub fn minimal() -> Self {
        Self {
            capabilities: WasiCapabilities::none(),
            max_memory: 64 * 1024 * 1024, // 64 MB
            ..Default::default()
        }
    }

    /// Create config for development/debugging
    pub fn development() -> Self {
        Self {
            capabilities: WasiCapabilities::with_stdio(),
            optimization_level: 0, // Faster compilation
            ..Default::default()
        }
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse a config from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| BridgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.export_prefix.is_empty() {
            return Err(BridgeError::Config("export_prefix must not be empty".into()));
        }
        if self.max_memory == 0 {
            return Err(BridgeError::Config("max_memory must be non-zero".into()));
        }
        Ok(())
    }

    /// Builder: set capabilities
    pub fn capabilities(mut self, caps: WasiCapabilities) -> Self {
        self.capabilities = caps;
        self
    }

    /// Builder: set export prefix
    pub fn export_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.export_prefix = prefix.into();
        self
    }

    /// Builder: set max memory
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = bytes;
        self
    }

    /// Builder: set fuel limit
    pub fn fuel_limit(mut self, fuel: u64) -> Self {
        self.fuel_limit = Some(fuel);
        self
    }

    /// Builder: enable SIMD
    pub fn simd(mut self, enable: bool) -> Self {
        self.enable_simd = enable;
        self
    }

    /// Builder: set optimization level
    pub fn optimize(mut self, level: u8) -> Self {
        self.optimization_level = level.min(3);
        self
    }

    /// Builder: call `_initialize` after instantiation
    pub fn run_initializer(mut self, enable: bool) -> Self {
        self.run_initializer = enable;
        self
    }

    /// Builder: set cache path
    pub fn cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }
}
