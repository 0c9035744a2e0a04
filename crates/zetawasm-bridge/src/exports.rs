//! Static method table and the per-instance export cache.
//!
//! Every RPC the bridge can issue is a [`Method`]. Its guest export name is
//! the configured prefix followed by a fixed suffix from the table below, so
//! an engine build that lacks a method shows up as
//! [`BridgeError::ExportNotFound`] for a name known at compile time.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use wasmtime::{Instance, Store, TypedFunc, WasmParams, WasmResults};

use crate::error::{BridgeError, Result};
use crate::runtime::HostState;

/// Guest export signature of a payload call:
/// `(request_ptr, request_len, response_len_out_ptr) -> response_ptr`.
pub(crate) type PayloadFn = TypedFunc<(u32, u32, u32), u32>;

/// Guest export signature of a handle-only call: `(id) -> status`.
pub(crate) type ReleaseFn = TypedFunc<i64, i32>;

/// Calling convention of a guest method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Serialized request in, serialized response out
    Payload,
    /// Bare 64-bit id in, status code out
    HandleOnly,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKind::Payload => f.write_str("payload"),
            CallKind::HandleOnly => f.write_str("handle-only"),
        }
    }
}

/// RPC methods exposed by the engine module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Prepare an expression
    Prepare,
    /// Evaluate a prepared expression
    Evaluate,
    /// Release a prepared expression
    Unprepare,
    /// Prepare a query
    PrepareQuery,
    /// Evaluate a prepared query
    EvaluateQuery,
    /// Release a prepared query
    UnprepareQuery,
    /// Prepare a DML statement
    PrepareModify,
    /// Evaluate a prepared DML statement
    EvaluateModify,
    /// Release a prepared DML statement
    UnprepareModify,
    /// Analyze a statement into a resolved tree
    Analyze,
    /// Parse a statement
    Parse,
    /// Build SQL text from a resolved tree
    BuildSql,
    /// Format SQL text
    FormatSql,
    /// Format SQL text, tolerating parse errors
    LenientFormatSql,
    /// List tables referenced by a statement
    ExtractTableNamesFromStatement,
    /// List tables referenced by the next statement of a script
    ExtractTableNamesFromNextStatement,
    /// Register a catalog with the engine
    RegisterCatalog,
    /// Drop a registered catalog
    UnregisterCatalog,
    /// Build a table definition from a proto descriptor
    GetTableFromProto,
    /// List builtin functions
    GetBuiltinFunctions,
    /// Fetch language options
    GetLanguageOptions,
    /// Fetch analyzer options
    GetAnalyzerOptions,
}

impl Method {
    /// Every method in the table.
    pub const ALL: [Method; 22] = [
        Method::Prepare,
        Method::Evaluate,
        Method::Unprepare,
        Method::PrepareQuery,
        Method::EvaluateQuery,
        Method::UnprepareQuery,
        Method::PrepareModify,
        Method::EvaluateModify,
        Method::UnprepareModify,
        Method::Analyze,
        Method::Parse,
        Method::BuildSql,
        Method::FormatSql,
        Method::LenientFormatSql,
        Method::ExtractTableNamesFromStatement,
        Method::ExtractTableNamesFromNextStatement,
        Method::RegisterCatalog,
        Method::UnregisterCatalog,
        Method::GetTableFromProto,
        Method::GetBuiltinFunctions,
        Method::GetLanguageOptions,
        Method::GetAnalyzerOptions,
    ];

    /// Logical RPC name, e.g. `PrepareQuery`.
    pub fn name(self) -> &'static str {
        match self {
            Method::Prepare => "Prepare",
            Method::Evaluate => "Evaluate",
            Method::Unprepare => "Unprepare",
            Method::PrepareQuery => "PrepareQuery",
            Method::EvaluateQuery => "EvaluateQuery",
            Method::UnprepareQuery => "UnprepareQuery",
            Method::PrepareModify => "PrepareModify",
            Method::EvaluateModify => "EvaluateModify",
            Method::UnprepareModify => "UnprepareModify",
            Method::Analyze => "Analyze",
            Method::Parse => "Parse",
            Method::BuildSql => "BuildSql",
            Method::FormatSql => "FormatSql",
            Method::LenientFormatSql => "LenientFormatSql",
            Method::ExtractTableNamesFromStatement => "ExtractTableNamesFromStatement",
            Method::ExtractTableNamesFromNextStatement => "ExtractTableNamesFromNextStatement",
            Method::RegisterCatalog => "RegisterCatalog",
            Method::UnregisterCatalog => "UnregisterCatalog",
            Method::GetTableFromProto => "GetTableFromProto",
            Method::GetBuiltinFunctions => "GetBuiltinFunctions",
            Method::GetLanguageOptions => "GetLanguageOptions",
            Method::GetAnalyzerOptions => "GetAnalyzerOptions",
        }
    }

    /// Export name without the prefix, e.g. `prepare_query`.
    pub fn export_suffix(self) -> &'static str {
        match self {
            Method::Prepare => "prepare",
            Method::Evaluate => "evaluate",
            Method::Unprepare => "unprepare",
            Method::PrepareQuery => "prepare_query",
            Method::EvaluateQuery => "evaluate_query",
            Method::UnprepareQuery => "unprepare_query",
            Method::PrepareModify => "prepare_modify",
            Method::EvaluateModify => "evaluate_modify",
            Method::UnprepareModify => "unprepare_modify",
            Method::Analyze => "analyze",
            Method::Parse => "parse",
            Method::BuildSql => "build_sql",
            Method::FormatSql => "format_sql",
            Method::LenientFormatSql => "lenient_format_sql",
            Method::ExtractTableNamesFromStatement => "extract_table_names",
            Method::ExtractTableNamesFromNextStatement => "extract_table_names_from_next_statement",
            Method::RegisterCatalog => "register_catalog",
            Method::UnregisterCatalog => "unregister_catalog",
            Method::GetTableFromProto => "get_table_from_proto",
            Method::GetBuiltinFunctions => "get_builtin_functions",
            Method::GetLanguageOptions => "get_language_options",
            Method::GetAnalyzerOptions => "get_analyzer_options",
        }
    }

    /// Calling convention of the method's export.
    pub fn kind(self) -> CallKind {
        match self {
            Method::Unprepare | Method::UnprepareQuery | Method::UnprepareModify => {
                CallKind::HandleOnly
            }
            _ => CallKind::Payload,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = BridgeError;

    /// Accepts either the logical name or the export suffix.
    fn from_str(s: &str) -> Result<Self> {
        Method::ALL
            .into_iter()
            .find(|m| m.name() == s || m.export_suffix() == s)
            .ok_or_else(|| BridgeError::Config(format!("unknown method '{}'", s)))
    }
}

/// Export name of a bridge-protocol symbol under `prefix`.
pub(crate) fn export_name(prefix: &str, suffix: &str) -> String {
    format!("{prefix}{suffix}")
}

/// Resolve an export as a typed function.
pub(crate) fn resolve_typed<P, R>(
    store: &mut Store<HostState>,
    instance: &Instance,
    name: &str,
) -> Result<TypedFunc<P, R>>
where
    P: WasmParams,
    R: WasmResults,
{
    let func = instance
        .get_func(&mut *store, name)
        .ok_or_else(|| BridgeError::ExportNotFound(name.to_string()))?;
    func.typed::<P, R>(&*store)
        .map_err(|e| BridgeError::ExportSignature {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

/// Lazily populated cache of resolved method exports, owned by one instance.
pub(crate) struct ExportCache {
    prefix: String,
    payload: HashMap<Method, PayloadFn>,
    release: HashMap<Method, ReleaseFn>,
}

impl ExportCache {
    pub(crate) fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            payload: HashMap::new(),
            release: HashMap::new(),
        }
    }

    /// Full export name of `method`.
    pub(crate) fn export_name(&self, method: Method) -> String {
        export_name(&self.prefix, method.export_suffix())
    }

    /// Resolve (once) the export of a payload method.
    pub(crate) fn payload(
        &mut self,
        store: &mut Store<HostState>,
        instance: &Instance,
        method: Method,
    ) -> Result<PayloadFn> {
        if method.kind() != CallKind::Payload {
            return Err(BridgeError::CallingConvention {
                method,
                expected: CallKind::Payload,
            });
        }
        let name = self.export_name(method);
        cached(&mut self.payload, store, instance, method, &name)
    }

    /// Resolve (once) the export of a handle-only method.
    pub(crate) fn release(
        &mut self,
        store: &mut Store<HostState>,
        instance: &Instance,
        method: Method,
    ) -> Result<ReleaseFn> {
        if method.kind() != CallKind::HandleOnly {
            return Err(BridgeError::CallingConvention {
                method,
                expected: CallKind::HandleOnly,
            });
        }
        let name = self.export_name(method);
        cached(&mut self.release, store, instance, method, &name)
    }

    /// Resolve whichever convention `method` uses.
    pub(crate) fn resolve(
        &mut self,
        store: &mut Store<HostState>,
        instance: &Instance,
        method: Method,
    ) -> Result<()> {
        match method.kind() {
            CallKind::Payload => self.payload(store, instance, method).map(|_| ()),
            CallKind::HandleOnly => self.release(store, instance, method).map(|_| ()),
        }
    }

    /// Number of resolved exports.
    pub(crate) fn len(&self) -> usize {
        self.payload.len() + self.release.len()
    }
}

fn cached<P, R>(
    map: &mut HashMap<Method, TypedFunc<P, R>>,
    store: &mut Store<HostState>,
    instance: &Instance,
    method: Method,
    name: &str,
) -> Result<TypedFunc<P, R>>
where
    P: WasmParams,
    R: WasmResults,
{
    if let Some(func) = map.get(&method) {
        return Ok(func.clone());
    }
    let func = resolve_typed::<P, R>(store, instance, name)?;
    tracing::trace!(%method, export = name, "resolved guest export");
    map.insert(method, func.clone());
    Ok(func)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_method_table_is_consistent() {
        let names: HashSet<_> = Method::ALL.iter().map(|m| m.name()).collect();
        let suffixes: HashSet<_> = Method::ALL.iter().map(|m| m.export_suffix()).collect();
        assert_eq!(names.len(), Method::ALL.len());
        assert_eq!(suffixes.len(), Method::ALL.len());
    }

    #[test]
    fn test_handle_only_methods() {
        let handle_only: Vec<_> = Method::ALL
            .into_iter()
            .filter(|m| m.kind() == CallKind::HandleOnly)
            .collect();
        assert_eq!(
            handle_only,
            vec![Method::Unprepare, Method::UnprepareQuery, Method::UnprepareModify]
        );
    }

    #[test]
    fn test_parse_method_names() {
        assert_eq!("PrepareQuery".parse::<Method>().unwrap(), Method::PrepareQuery);
        assert_eq!("prepare_query".parse::<Method>().unwrap(), Method::PrepareQuery);
        assert_eq!(
            "ExtractTableNamesFromStatement".parse::<Method>().unwrap(),
            Method::ExtractTableNamesFromStatement
        );
        assert!(matches!(
            "EvaluateStream".parse::<Method>(),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn test_export_names() {
        let cache = ExportCache::new("wasm_");
        assert_eq!(cache.export_name(Method::PrepareQuery), "wasm_prepare_query");
        assert_eq!(cache.export_name(Method::Unprepare), "wasm_unprepare");
        assert_eq!(cache.export_name(Method::BuildSql), "wasm_build_sql");
        assert_eq!(cache.len(), 0);
    }
}
