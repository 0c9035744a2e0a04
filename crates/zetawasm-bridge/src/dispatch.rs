//! Call dispatcher: the two guest calling conventions.
//!
//! ## Payload calls
//!
//! ```text
//! req  = malloc(len(request)); write(req, request)
//! slot = malloc(4)
//! resp = <prefix><method>(req, len(request), slot)
//! resp == 0 -> read error channel, fail
//! resp != 0 -> n = le_u32(slot); bytes = read(resp, n); free(resp)
//! free(req); free(slot)            (on every exit path)
//! ```
//!
//! ## Handle-only calls
//!
//! `status = <prefix>unprepare*(id)`; a non-zero status reads the error channel.
//! No guest memory is allocated.

use std::time::Instant;

use crate::error::{BridgeError, Result};
use crate::exports::{Method, PayloadFn};
use crate::runtime::GuestInstance;

/// Size of the response-length out-parameter (a wasm32 `size_t`).
const RESPONSE_LEN_SLOT: u32 = 4;

/// Fuel lent to each cleanup free, so a call that ran the store dry can still
/// release its buffers. Whatever the free burns is charged to the store.
const CLEANUP_FUEL: u64 = 10_000;

impl GuestInstance {
    /// Issue a payload call and return the guest's response bytes.
    ///
    /// The request and the length slot are freed whatever the outcome; the
    /// response buffer, owned by the host once returned, is freed after it
    /// has been copied out.
    pub fn call(&mut self, method: Method, request: &[u8]) -> Result<Vec<u8>> {
        let func = self.exports.payload(&mut self.store, &self.instance, method)?;
        let request_len =
            u32::try_from(request.len()).map_err(|_| BridgeError::RequestTooLarge(request.len()))?;

        let span = tracing::debug_span!("guest_call", %method, request_len);
        let _enter = span.enter();
        let start = Instant::now();

        let request_ptr = self.arena.allocate(&mut self.store, request_len)?;
        let len_slot = match self.arena.allocate(&mut self.store, RESPONSE_LEN_SLOT) {
            Ok(ptr) => ptr,
            Err(e) => {
                if let Err(free_err) = self.cleanup_free(request_ptr) {
                    tracing::warn!(ptr = request_ptr, error = %free_err, "cleanup free failed");
                }
                return Err(e);
            }
        };

        let outcome = self.invoke_payload(method, &func, request, request_ptr, request_len, len_slot);

        let freed_request = self.cleanup_free(request_ptr);
        let freed_slot = self.cleanup_free(len_slot);

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                for freed in [freed_request, freed_slot] {
                    if let Err(free_err) = freed {
                        tracing::warn!(error = %free_err, "cleanup free failed after call error");
                    }
                }
                return Err(e);
            }
        };
        freed_request?;
        freed_slot?;

        tracing::debug!(
            response_len = response.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "guest call complete"
        );
        Ok(response)
    }

    /// Issue a handle-only call with a bare id.
    pub fn call_release(&mut self, method: Method, id: i64) -> Result<()> {
        let func = self.exports.release(&mut self.store, &self.instance, method)?;

        let status = func
            .call(&mut self.store, id)
            .map_err(|e| BridgeError::from_call(&self.exports.export_name(method), e))?;
        if status == 0 {
            tracing::debug!(%method, id, "handle released");
            return Ok(());
        }

        let err = self.errors.last_error(&mut self.store, &self.arena)?;
        tracing::debug!(%method, id, status, code = err.code, "handle release rejected");
        Err(err.into())
    }

    /// Allocate `size` bytes in guest memory.
    pub fn allocate(&mut self, size: u32) -> Result<u32> {
        self.arena.allocate(&mut self.store, size)
    }

    /// Free a pointer from [`GuestInstance::allocate`]. Freeing the same
    /// pointer twice is undefined behavior in the guest allocator.
    pub fn free(&mut self, ptr: u32) -> Result<()> {
        self.arena.free(&mut self.store, ptr)
    }

    /// Copy bytes into guest memory.
    pub fn write(&mut self, ptr: u32, data: &[u8]) -> Result<()> {
        self.arena.write(&mut self.store, ptr, data)
    }

    /// Copy bytes out of guest memory.
    pub fn read(&self, ptr: u32, len: usize) -> Result<Vec<u8>> {
        self.arena.read(&self.store, ptr, len)
    }

    fn invoke_payload(
        &mut self,
        method: Method,
        func: &PayloadFn,
        request: &[u8],
        request_ptr: u32,
        request_len: u32,
        len_slot: u32,
    ) -> Result<Vec<u8>> {
        self.arena.write(&mut self.store, request_ptr, request)?;
        self.arena.write(&mut self.store, len_slot, &0u32.to_le_bytes())?;

        let response_ptr = func
            .call(&mut self.store, (request_ptr, request_len, len_slot))
            .map_err(|e| BridgeError::from_call(&self.exports.export_name(method), e))?;

        if response_ptr == 0 {
            let err = self.errors.last_error(&mut self.store, &self.arena)?;
            tracing::debug!(code = err.code, message = %err.message, "engine rejected call");
            return Err(err.into());
        }

        let response = self.read_response(response_ptr, len_slot);
        let freed = self.cleanup_free(response_ptr);
        match response {
            Ok(bytes) => {
                freed?;
                Ok(bytes)
            }
            Err(e) => {
                if let Err(free_err) = freed {
                    tracing::warn!(error = %free_err, "failed to free response buffer");
                }
                Err(e)
            }
        }
    }

    fn read_response(&self, response_ptr: u32, len_slot: u32) -> Result<Vec<u8>> {
        let len = self.arena.read_u32(&self.store, len_slot)?;
        self.arena.read(&self.store, response_ptr, len as usize)
    }

    /// Free a buffer owned by the current call, even when the guest has just
    /// exhausted its fuel. With metering off this is a plain free.
    fn cleanup_free(&mut self, ptr: u32) -> Result<()> {
        let Ok(before) = self.store.get_fuel() else {
            return self.arena.free(&mut self.store, ptr);
        };

        self.store
            .set_fuel(before.saturating_add(CLEANUP_FUEL))
            .map_err(|e| BridgeError::Runtime(format!("fuel setup failed: {}", e)))?;
        let freed = self.arena.free(&mut self.store, ptr);

        let left = self.store.get_fuel().unwrap_or(0).saturating_sub(CLEANUP_FUEL);
        self.store
            .set_fuel(left)
            .map_err(|e| BridgeError::Runtime(format!("fuel setup failed: {}", e)))?;
        freed
    }
}
