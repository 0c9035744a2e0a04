//! Engine runtime: module loading and instantiation using wasmtime.
//!
//! Uses wasmtime-wasi preview1 (feature `wasi`) since the engine is built as
//! a WASI command-style module.

use std::path::Path;

use wasmtime::*;

use crate::config::{BridgeConfig, WasiCapabilities};
use crate::error::{BridgeError, Result};
use crate::error_channel::ErrorChannel;
use crate::exports::ExportCache;
use crate::memory::Arena;

/// Host state for the wasmtime store.
pub struct HostState {
    #[cfg(feature = "wasi")]
    preview1: wasmtime_wasi::preview1::WasiP1Ctx,
    limits: StoreLimits,
}

impl HostState {
    /// Get the preview1 context.
    #[cfg(feature = "wasi")]
    fn preview1(&mut self) -> &mut wasmtime_wasi::preview1::WasiP1Ctx {
        &mut self.preview1
    }
}

/// Compiles engine modules and instantiates them.
pub struct EngineRuntime {
    engine: Engine,
    config: BridgeConfig,
}

/// A compiled engine module.
pub struct GuestModule {
    module: Module,
    name: String,
}

/// One instantiated engine module bound to its linear memory and exports.
///
/// Calls block until the guest returns. An instance is not safe to drive from
/// two threads at once; use [`crate::SharedGuest`] to serialize callers.
pub struct GuestInstance {
    pub(crate) store: Store<HostState>,
    pub(crate) instance: Instance,
    pub(crate) arena: Arena,
    pub(crate) errors: ErrorChannel,
    pub(crate) exports: ExportCache,
    name: String,
}

impl EngineRuntime {
    /// Create a runtime with the given configuration.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let mut engine_config = Config::new();

        engine_config.cranelift_opt_level(match config.optimization_level {
            0 => OptLevel::None,
            _ => OptLevel::Speed,
        });
        engine_config.wasm_simd(config.enable_simd);

        if config.fuel_limit.is_some() {
            engine_config.consume_fuel(true);
        }

        if let Some(ref cache_path) = config.cache_path {
            if let Err(e) = engine_config.cache_config_load(cache_path) {
                tracing::warn!("Failed to load cache config: {}", e);
            }
        }

        let engine = Engine::new(&engine_config)
            .map_err(|e| BridgeError::Runtime(format!("engine creation failed: {}", e)))?;

        Ok(Self { engine, config })
    }

    /// Load a module from a file.
    pub fn load_module(&self, path: impl AsRef<Path>) -> Result<GuestModule> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        if !path.exists() {
            return Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("module not found: {}", path.display()),
            )));
        }

        let module = Module::from_file(&self.engine, path)
            .map_err(|e| BridgeError::Runtime(format!("module load failed: {}", e)))?;

        tracing::debug!(module = %name, "compiled engine module");
        Ok(GuestModule { module, name })
    }

    /// Load a module from bytes (binary or text format).
    pub fn load_module_bytes(&self, name: &str, bytes: &[u8]) -> Result<GuestModule> {
        let module = Module::new(&self.engine, bytes)
            .map_err(|e| BridgeError::Runtime(format!("module creation failed: {}", e)))?;

        Ok(GuestModule {
            module,
            name: name.to_string(),
        })
    }

    /// Instantiate a module and resolve the bridge's fixed exports.
    pub fn instantiate(&self, module: &GuestModule) -> Result<GuestInstance> {
        let host_state = self.build_host_state(&self.config.capabilities)?;
        let mut store = Store::new(&self.engine, host_state);

        store.limiter(|state| &mut state.limits);

        if let Some(fuel) = self.config.fuel_limit {
            store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::Runtime(format!("fuel setup failed: {}", e)))?;
        }

        #[allow(unused_mut)]
        let mut linker: Linker<HostState> = Linker::new(&self.engine);
        #[cfg(feature = "wasi")]
        wasmtime_wasi::preview1::add_to_linker_sync(&mut linker, |state| state.preview1())
            .map_err(|e| BridgeError::Runtime(format!("WASI link failed: {}", e)))?;

        let instance = linker
            .instantiate(&mut store, &module.module)
            .map_err(|e| BridgeError::Runtime(format!("instantiation failed: {}", e)))?;

        if self.config.run_initializer {
            if let Some(init) = instance.get_func(&mut store, "_initialize") {
                let init = init
                    .typed::<(), ()>(&store)
                    .map_err(|e| BridgeError::ExportSignature {
                        name: "_initialize".to_string(),
                        reason: e.to_string(),
                    })?;
                init.call(&mut store, ())
                    .map_err(|e| BridgeError::from_call("_initialize", e))?;
            }
        }

        let prefix = self.config.export_prefix.as_str();
        let arena = Arena::resolve(&mut store, &instance, prefix)?;
        let errors = ErrorChannel::resolve(&mut store, &instance, prefix)?;

        tracing::info!(module = %module.name, prefix, "engine instance ready");

        Ok(GuestInstance {
            store,
            instance,
            arena,
            errors,
            exports: ExportCache::new(prefix),
            name: module.name.clone(),
        })
    }

    /// Load and instantiate a module file in one step.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<GuestInstance> {
        let module = self.load_module(path)?;
        self.instantiate(&module)
    }

    /// Build host state from capabilities.
    #[cfg(feature = "wasi")]
    fn build_host_state(&self, caps: &WasiCapabilities) -> Result<HostState> {
        let mut builder = wasmtime_wasi::WasiCtxBuilder::new();

        if caps.stdin {
            builder.inherit_stdin();
        }
        if caps.stdout {
            builder.inherit_stdout();
        }
        if caps.stderr {
            builder.inherit_stderr();
        }

        for (key, value) in &caps.env_vars {
            builder.env(key, value);
        }

        builder.args(&caps.args);

        for dir in &caps.preopened_dirs_ro {
            builder
                .preopened_dir(
                    &dir.host,
                    &dir.guest,
                    wasmtime_wasi::DirPerms::READ,
                    wasmtime_wasi::FilePerms::READ,
                )
                .map_err(|e| {
                    BridgeError::Config(format!("failed to open dir {:?}: {}", dir.host, e))
                })?;
            tracing::debug!(host = ?dir.host, guest = %dir.guest, "preopened directory");
        }

        let preview1 = builder.build_p1();

        Ok(HostState {
            preview1,
            limits: self.store_limits(),
        })
    }

    #[cfg(not(feature = "wasi"))]
    fn build_host_state(&self, caps: &WasiCapabilities) -> Result<HostState> {
        if caps.stdin || caps.stdout || caps.stderr || !caps.preopened_dirs_ro.is_empty() {
            tracing::warn!("WASI capabilities requested but the `wasi` feature is disabled");
        }
        Ok(HostState {
            limits: self.store_limits(),
        })
    }

    fn store_limits(&self) -> StoreLimits {
        StoreLimitsBuilder::new()
            .memory_size(self.config.max_memory)
            .build()
    }

    /// Get the configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl GuestModule {
    /// Get the module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get exported function names.
    pub fn exports(&self) -> impl Iterator<Item = &str> {
        self.module.exports().filter_map(|e| {
            if matches!(e.ty(), ExternType::Func(_)) {
                Some(e.name())
            } else {
                None
            }
        })
    }
}

impl GuestInstance {
    /// Name of the module this instance was created from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call an auxiliary export that takes no arguments and returns an i32.
    pub fn call_i32(&mut self, name: &str) -> Result<i32> {
        let func = crate::exports::resolve_typed::<(), i32>(&mut self.store, &self.instance, name)?;
        func.call(&mut self.store, ())
            .map_err(|e| BridgeError::from_call(name, e))
    }

    /// Call an auxiliary export that takes an i32 and returns nothing.
    pub fn call_void_i32(&mut self, name: &str, arg: i32) -> Result<()> {
        let func = crate::exports::resolve_typed::<i32, ()>(&mut self.store, &self.instance, name)?;
        func.call(&mut self.store, arg)
            .map_err(|e| BridgeError::from_call(name, e))
    }

    /// Get list of exported function names.
    pub fn exported_functions(&mut self) -> Vec<String> {
        let names: Vec<_> = self
            .instance
            .exports(&mut self.store)
            .map(|e| e.name().to_string())
            .collect();
        names
            .into_iter()
            .filter(|name| self.instance.get_func(&mut self.store, name).is_some())
            .collect()
    }

    /// Current size of the guest's linear memory in bytes.
    pub fn memory_size(&self) -> usize {
        self.arena.size(&self.store)
    }

    /// Get remaining fuel (if fuel metering enabled).
    pub fn remaining_fuel(&self) -> Option<u64> {
        self.store.get_fuel().ok()
    }

    /// Reset the fuel budget, e.g. after a call ran out of fuel.
    pub fn refuel(&mut self, fuel: u64) -> Result<()> {
        self.store
            .set_fuel(fuel)
            .map_err(|e| BridgeError::Runtime(format!("fuel setup failed: {}", e)))
    }

    /// Number of method exports resolved and cached so far.
    pub fn resolved_exports(&self) -> usize {
        self.exports.len()
    }
}
