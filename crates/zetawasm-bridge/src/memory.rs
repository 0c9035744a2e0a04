//! Guest linear-memory access through the guest's own allocator.
//!
//! Every operation goes through the [`Memory`] handle and the store, so the
//! current extent of linear memory is looked up each time. The guest may grow
//! its memory during any call, which moves the host-side base address.

use wasmtime::{Memory, Store, TypedFunc};

use crate::error::{BridgeError, Result};
use crate::exports::{export_name, resolve_typed};
use crate::runtime::HostState;

/// Allocator and memory exports of one guest instance.
pub(crate) struct Arena {
    memory: Memory,
    malloc: TypedFunc<u32, u32>,
    free: TypedFunc<u32, ()>,
    malloc_name: String,
    free_name: String,
}

impl Arena {
    /// Resolve `memory`, `<prefix>malloc` and `<prefix>free`.
    pub(crate) fn resolve(
        store: &mut Store<HostState>,
        instance: &wasmtime::Instance,
        prefix: &str,
    ) -> Result<Self> {
        let memory = instance
            .get_memory(&mut *store, "memory")
            .ok_or_else(|| BridgeError::ExportNotFound("memory".to_string()))?;
        let malloc_name = export_name(prefix, "malloc");
        let free_name = export_name(prefix, "free");
        let malloc = resolve_typed::<u32, u32>(store, instance, &malloc_name)?;
        let free = resolve_typed::<u32, ()>(store, instance, &free_name)?;

        Ok(Self {
            memory,
            malloc,
            free,
            malloc_name,
            free_name,
        })
    }

    /// Allocate `size` bytes in the guest. Zero-sized requests are forwarded;
    /// the guest allocator still hands back a freeable pointer.
    pub(crate) fn allocate(&self, store: &mut Store<HostState>, size: u32) -> Result<u32> {
        let ptr = self
            .malloc
            .call(&mut *store, size)
            .map_err(|e| BridgeError::from_call(&self.malloc_name, e))?;
        if ptr == 0 {
            return Err(BridgeError::Allocation { size });
        }
        tracing::trace!(ptr, size, "guest alloc");
        Ok(ptr)
    }

    /// Release a pointer obtained from [`Arena::allocate`] or handed over by
    /// the guest. Must be called exactly once per pointer.
    pub(crate) fn free(&self, store: &mut Store<HostState>, ptr: u32) -> Result<()> {
        tracing::trace!(ptr, "guest free");
        self.free
            .call(&mut *store, ptr)
            .map_err(|e| BridgeError::from_call(&self.free_name, e))
    }

    /// Copy `data` into guest memory at `ptr`.
    pub(crate) fn write(&self, store: &mut Store<HostState>, ptr: u32, data: &[u8]) -> Result<()> {
        self.memory
            .write(&mut *store, ptr as usize, data)
            .map_err(|_| BridgeError::OutOfBounds {
                ptr,
                len: data.len(),
            })
    }

    /// Copy `len` bytes out of guest memory at `ptr`.
    pub(crate) fn read(&self, store: &Store<HostState>, ptr: u32, len: usize) -> Result<Vec<u8>> {
        let data = self.memory.data(store);
        let start = ptr as usize;
        start
            .checked_add(len)
            .and_then(|end| data.get(start..end))
            .map(<[u8]>::to_vec)
            .ok_or(BridgeError::OutOfBounds { ptr, len })
    }

    /// Fill `buf` from guest memory at `ptr`.
    pub(crate) fn read_into(&self, store: &Store<HostState>, ptr: u32, buf: &mut [u8]) -> Result<()> {
        self.memory
            .read(store, ptr as usize, buf)
            .map_err(|_| BridgeError::OutOfBounds { ptr, len: buf.len() })
    }

    /// Read a little-endian `u32` at `ptr`.
    pub(crate) fn read_u32(&self, store: &Store<HostState>, ptr: u32) -> Result<u32> {
        let mut bytes = [0u8; 4];
        self.read_into(store, ptr, &mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Current size of linear memory in bytes.
    pub(crate) fn size(&self, store: &Store<HostState>) -> usize {
        self.memory.data_size(store)
    }
}
