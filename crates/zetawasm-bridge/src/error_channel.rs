//! The guest's last-error side channel.
//!
//! A single mutable slot with no call correlation: it is only meaningful
//! right after a failed call and must be read before the next guest call.

use wasmtime::{Instance, Store, TypedFunc};

use crate::error::{BridgeError, EngineError, Result};
use crate::exports::{export_name, resolve_typed};
use crate::memory::Arena;
use crate::runtime::HostState;

pub(crate) struct ErrorChannel {
    pointer: TypedFunc<(), u32>,
    size: TypedFunc<(), u32>,
    pointer_name: String,
    size_name: String,
}

impl ErrorChannel {
    pub(crate) fn resolve(
        store: &mut Store<HostState>,
        instance: &Instance,
        prefix: &str,
    ) -> Result<Self> {
        let pointer_name = export_name(prefix, "get_last_error");
        let size_name = export_name(prefix, "get_last_error_size");
        let pointer = resolve_typed::<(), u32>(store, instance, &pointer_name)?;
        let size = resolve_typed::<(), u32>(store, instance, &size_name)?;

        Ok(Self {
            pointer,
            size,
            pointer_name,
            size_name,
        })
    }

    /// Raw side-channel text. Empty when the guest reports no message.
    pub(crate) fn fetch(&self, store: &mut Store<HostState>, arena: &Arena) -> Result<String> {
        let len = self
            .size
            .call(&mut *store, ())
            .map_err(|e| BridgeError::from_call(&self.size_name, e))?;
        if len == 0 {
            return Ok(String::new());
        }

        let ptr = self
            .pointer
            .call(&mut *store, ())
            .map_err(|e| BridgeError::from_call(&self.pointer_name, e))?;
        let bytes = arena.read(store, ptr, len as usize)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Fetch and decode the last error.
    pub(crate) fn last_error(&self, store: &mut Store<HostState>, arena: &Arena) -> Result<EngineError> {
        let raw = self.fetch(store, arena)?;
        let err = EngineError::from_error_text(&raw);
        if err.is_malformed() {
            tracing::debug!(raw = %raw, "engine error text did not match the status format");
        }
        Ok(err)
    }
}
