//! # zetawasm bridge
//!
//! Host-side bridge for calling a sandboxed WebAssembly SQL analysis engine.
//!
//! The engine is an opaque WASI module. The bridge loads it with wasmtime,
//! moves serialized requests and responses through the guest's linear memory
//! using the guest's own allocator, and turns the guest's last-error side
//! channel into typed errors.
//!
//! ## Layers
//!
//! | Layer | Module | Role |
//! |-------|--------|------|
//! | Memory arena | `memory` | allocate / free / read / write in guest memory |
//! | Export resolver | [`exports`] | static method table, per-instance export cache |
//! | Error channel | `error_channel` | read and decode the last guest error |
//! | Call dispatcher | `dispatch` | payload and handle-only calling conventions |
//! | Handles | [`handle`] | prepared expression / query / modify lifecycles |
//! | Typed facade | `service` | protobuf encode/decode around each method |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use zetawasm_bridge::{BridgeConfig, EngineRuntime, Query, WasiCapabilities};
//!
//! let config = BridgeConfig::default()
//!     .capabilities(WasiCapabilities::engine().zoneinfo("/usr/share/zoneinfo"));
//! let runtime = EngineRuntime::new(config)?;
//! let mut guest = runtime.open("zetasql_local_service_wasi.wasm")?;
//!
//! let (handle, _resp): (_, PrepareQueryResponse) =
//!     guest.prepare::<Query, _, _>(&PrepareQueryRequest { sql: "SELECT 1".into(), ..Default::default() })?;
//! let rows: EvaluateQueryResponse = guest.evaluate(&handle, EvaluateQueryRequest::default())?;
//! guest.unprepare(handle)?;
//! ```
//!
//! ## Concurrency
//!
//! Every call is synchronous and blocks until the guest returns. A
//! [`GuestInstance`] takes `&mut self` for calls; share one between threads
//! with [`SharedGuest`].
//!
//! ## Features
//!
//! - `wasi` (default) - link WASI preview1 imports into the guest

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod exports;
pub mod handle;
pub mod runtime;
pub mod shared;
pub mod status;

mod dispatch;
mod error_channel;
mod memory;
mod service;

pub use config::{BridgeConfig, Preopen, WasiCapabilities};
pub use error::{BridgeError, EngineError, Result};
pub use exports::{CallKind, Method};
pub use handle::{Expression, Handle, HandleKind, Modify, PreparedRequest, PreparedResponse, Query};
pub use runtime::{EngineRuntime, GuestInstance, GuestModule, HostState};
pub use shared::SharedGuest;
pub use status::StatusCode;
