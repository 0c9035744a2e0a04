//! Shared fixtures: an instrumented mock engine module.
//!
//! The mock speaks the bridge protocol with a bump allocator that counts
//! every malloc and free. Its methods:
//!
//! | Export | Behavior |
//! |--------|----------|
//! | `wasm_prepare`, `wasm_prepare_query` | new id, or syntax error when the request contains `FORM` |
//! | `wasm_evaluate` | echoes the request |
//! | `wasm_format_sql` | grows memory by a page, then echoes |
//! | `wasm_analyze` | fails with unformatted error text |
//! | `wasm_get_language_options` | fails with empty error text |
//! | `wasm_build_sql` | fails with an out-of-bounds error pointer |
//! | `wasm_extract_table_names` | reports a response length past the end of memory |
//! | `wasm_evaluate_query` | traps |
//! | `wasm_parse` | exported with the wrong signature |
//! | `wasm_unprepare`, `wasm_unprepare_query` | release ids, status 5 for unknown ids |
//!
//! Everything else in the method table is missing.

#![allow(dead_code)]

use zetawasm_bridge::{BridgeConfig, EngineRuntime, GuestInstance};

pub const MOCK_ENGINE_WAT: &str = r#"
(module
  (memory (export "memory") 1)

  (global $heap (mut i32) (i32.const 4096))
  (global $live (mut i32) (i32.const 0))
  (global $mallocs (mut i32) (i32.const 0))
  (global $frees (mut i32) (i32.const 0))
  (global $budget (mut i32) (i32.const -1))
  (global $err_ptr (mut i32) (i32.const 0))
  (global $err_len (mut i32) (i32.const 0))
  (global $initialized (mut i32) (i32.const 0))
  (global $next_id (mut i64) (i64.const 0))
  (global $exprs (mut i64) (i64.const 0))
  (global $queries (mut i64) (i64.const 0))

  (data (i32.const 64) "Code: 3, Message: Syntax error: Unexpected keyword FORM [at 1:10]")
  (data (i32.const 256) "not a recognized format")
  (data (i32.const 384) "Code: 5, Message: Unknown prepared query ID")
  (data (i32.const 512) "Code: 5, Message: Unknown prepared expression ID")
  (data (i32.const 640) "Code: 8, Message: Out of memory")

  (func (export "_initialize")
    (global.set $initialized (i32.const 1)))

  ;; bump allocator: never reuses memory, counts every malloc and free
  (func $malloc (export "wasm_malloc") (param $size i32) (result i32)
    (local $ptr i32) (local $end i32) (local $pages i32)
    (if (i32.eqz (global.get $budget)) (then (return (i32.const 0))))
    (if (i32.gt_s (global.get $budget) (i32.const 0))
      (then (global.set $budget (i32.sub (global.get $budget) (i32.const 1)))))
    (local.set $ptr (global.get $heap))
    (local.set $end
      (i32.add (local.get $ptr)
        (i32.and (i32.add (local.get $size) (i32.const 15)) (i32.const -8))))
    (local.set $pages
      (i32.sub
        (i32.shr_u (i32.add (local.get $end) (i32.const 65535)) (i32.const 16))
        (memory.size)))
    (if (i32.gt_s (local.get $pages) (i32.const 0))
      (then
        (if (i32.eq (memory.grow (local.get $pages)) (i32.const -1))
          (then (return (i32.const 0))))))
    (global.set $heap (local.get $end))
    (global.set $live (i32.add (global.get $live) (i32.const 1)))
    (global.set $mallocs (i32.add (global.get $mallocs) (i32.const 1)))
    (local.get $ptr))

  (func (export "wasm_free") (param $ptr i32)
    (global.set $live (i32.sub (global.get $live) (i32.const 1)))
    (global.set $frees (i32.add (global.get $frees) (i32.const 1))))

  (func (export "wasm_get_last_error") (result i32) (global.get $err_ptr))
  (func (export "wasm_get_last_error_size") (result i32) (global.get $err_len))

  ;; instrumentation
  (func (export "live_allocations") (result i32) (global.get $live))
  (func (export "malloc_count") (result i32) (global.get $mallocs))
  (func (export "free_count") (result i32) (global.get $frees))
  (func (export "initialized") (result i32) (global.get $initialized))
  (func (export "set_malloc_budget") (param $n i32) (global.set $budget (local.get $n)))

  (func $fail (param $ptr i32) (param $len i32) (result i32)
    (global.set $err_ptr (local.get $ptr))
    (global.set $err_len (local.get $len))
    (i32.const 0))

  (func $echo (param $req i32) (param $len i32) (param $out i32) (result i32)
    (local $resp i32)
    (local.set $resp (call $malloc (local.get $len)))
    (if (i32.eqz (local.get $resp)) (then (return (call $fail (i32.const 640) (i32.const 31)))))
    (memory.copy (local.get $resp) (local.get $req) (local.get $len))
    (i32.store (local.get $out) (local.get $len))
    (local.get $resp))

  ;; 1 when the request bytes contain "FORM"
  (func $has_form (param $p i32) (param $len i32) (result i32)
    (local $i i32)
    (if (i32.lt_u (local.get $len) (i32.const 4)) (then (return (i32.const 0))))
    (block $done
      (loop $scan
        (br_if $done (i32.gt_u (local.get $i) (i32.sub (local.get $len) (i32.const 4))))
        (if (i32.eq (i32.load (i32.add (local.get $p) (local.get $i))) (i32.const 0x4D524F46))
          (then (return (i32.const 1))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $scan)))
    (i32.const 0))

  ;; response: { prepared (1): { id (1): varint } }
  (func $prepare (param $req i32) (param $len i32) (param $out i32) (param $query i32) (result i32)
    (local $resp i32) (local $id i64) (local $bit i64)
    (if (call $has_form (local.get $req) (local.get $len))
      (then (return (call $fail (i32.const 64) (i32.const 65)))))
    (local.set $resp (call $malloc (i32.const 4)))
    (if (i32.eqz (local.get $resp)) (then (return (call $fail (i32.const 640) (i32.const 31)))))
    (local.set $id (global.get $next_id))
    (global.set $next_id (i64.add (local.get $id) (i64.const 1)))
    (local.set $bit (i64.shl (i64.const 1) (local.get $id)))
    (if (local.get $query)
      (then (global.set $queries (i64.or (global.get $queries) (local.get $bit))))
      (else (global.set $exprs (i64.or (global.get $exprs) (local.get $bit)))))
    (i32.store (local.get $resp)
      (i32.or (i32.const 0x0008020a)
        (i32.shl (i32.wrap_i64 (local.get $id)) (i32.const 24))))
    (i32.store (local.get $out) (i32.const 4))
    (local.get $resp))

  (func (export "wasm_prepare") (param i32 i32 i32) (result i32)
    (call $prepare (local.get 0) (local.get 1) (local.get 2) (i32.const 0)))

  (func (export "wasm_prepare_query") (param i32 i32 i32) (result i32)
    (call $prepare (local.get 0) (local.get 1) (local.get 2) (i32.const 1)))

  (func (export "wasm_evaluate") (param i32 i32 i32) (result i32)
    (call $echo (local.get 0) (local.get 1) (local.get 2)))

  ;; grows linear memory before answering
  (func (export "wasm_format_sql") (param i32 i32 i32) (result i32)
    (drop (memory.grow (i32.const 1)))
    (call $echo (local.get 0) (local.get 1) (local.get 2)))

  (func (export "wasm_analyze") (param i32 i32 i32) (result i32)
    (call $fail (i32.const 256) (i32.const 23)))

  ;; fails without setting any error text
  (func (export "wasm_get_language_options") (param i32 i32 i32) (result i32)
    (call $fail (i32.const 0) (i32.const 0)))

  ;; error text pointer lies outside linear memory
  (func (export "wasm_build_sql") (param i32 i32 i32) (result i32)
    (call $fail (i32.const 0x7FFFFFF0) (i32.const 64)))

  ;; returns a response whose length runs past the end of memory
  (func (export "wasm_extract_table_names") (param $req i32) (param $len i32) (param $out i32) (result i32)
    (local $resp i32)
    (local.set $resp (call $malloc (i32.const 8)))
    (i32.store (local.get $out) (i32.const 0x7FFFFFFF))
    (local.get $resp))

  (func (export "wasm_evaluate_query") (param i32 i32 i32) (result i32)
    unreachable)

  ;; wrong signature for a payload method
  (func (export "wasm_parse") (param i32) (result i32)
    (i32.const 0))

  (func (export "wasm_unprepare_query") (param $id i64) (result i32)
    (local $bit i64)
    (local.set $bit (i64.shl (i64.const 1) (local.get $id)))
    (if (i64.eqz (i64.and (global.get $queries) (local.get $bit)))
      (then
        (drop (call $fail (i32.const 384) (i32.const 43)))
        (return (i32.const 5))))
    (global.set $queries (i64.xor (global.get $queries) (local.get $bit)))
    (i32.const 0))

  (func (export "wasm_unprepare") (param $id i64) (result i32)
    (local $bit i64)
    (local.set $bit (i64.shl (i64.const 1) (local.get $id)))
    (if (i64.eqz (i64.and (global.get $exprs) (local.get $bit)))
      (then
        (drop (call $fail (i32.const 512) (i32.const 48)))
        (return (i32.const 5))))
    (global.set $exprs (i64.xor (global.get $exprs) (local.get $bit)))
    (i32.const 0))
)
"#;

pub const SYNTAX_ERROR_MESSAGE: &str = "Syntax error: Unexpected keyword FORM [at 1:10]";

/// Instantiate the mock engine with a minimal config.
pub fn mock_engine() -> GuestInstance {
    mock_engine_with(BridgeConfig::minimal())
}

pub fn mock_engine_with(config: BridgeConfig) -> GuestInstance {
    let wasm = wat::parse_str(MOCK_ENGINE_WAT).expect("mock engine WAT should parse");
    let runtime = EngineRuntime::new(config).expect("failed to create runtime");
    let module = runtime
        .load_module_bytes("mock_engine", &wasm)
        .expect("failed to load mock engine");
    runtime.instantiate(&module).expect("failed to instantiate mock engine")
}

pub fn live_allocations(guest: &mut GuestInstance) -> i32 {
    guest.call_i32("live_allocations").expect("live_allocations call failed")
}

pub fn malloc_count(guest: &mut GuestInstance) -> i32 {
    guest.call_i32("malloc_count").expect("malloc_count call failed")
}

pub fn free_count(guest: &mut GuestInstance) -> i32 {
    guest.call_i32("free_count").expect("free_count call failed")
}

/// Let the next `n` mallocs succeed, fail every one after that.
pub fn set_malloc_budget(guest: &mut GuestInstance, n: i32) {
    guest
        .call_void_i32("set_malloc_budget", n)
        .expect("set_malloc_budget call failed");
}

pub mod proto {
    //! Minimal message layouts matching the mock engine's wire format.

    use zetawasm_bridge::{PreparedRequest, PreparedResponse};

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SqlRequest {
        #[prost(string, tag = "1")]
        pub sql: String,
        #[prost(int64, optional, tag = "4")]
        pub prepared_id: Option<i64>,
    }

    impl PreparedRequest for SqlRequest {
        fn bind_prepared_id(&mut self, id: i64) {
            self.prepared_id = Some(id);
        }
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct PreparedState {
        #[prost(int64, tag = "1")]
        pub prepared_id: i64,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct PrepareResponse {
        #[prost(message, optional, tag = "1")]
        pub prepared: Option<PreparedState>,
    }

    impl PreparedResponse for PrepareResponse {
        fn prepared_id(&self) -> Option<i64> {
            self.prepared.as_ref().map(|p| p.prepared_id)
        }
    }

    pub fn sql(text: &str) -> SqlRequest {
        SqlRequest {
            sql: text.to_string(),
            prepared_id: None,
        }
    }
}
