//! Typed wrappers over the payload methods.
//!
//! Payloads are protobuf messages from the engine's local-service schema.
//! The bridge does not ship those schemas; any `prost::Message` with the
//! right layout works.

use prost::Message;

use crate::error::Result;
use crate::exports::Method;
use crate::runtime::GuestInstance;

impl GuestInstance {
    /// Encode `request`, run a payload call and decode the response.
    pub fn call_message<Req, Resp>(&mut self, method: Method, request: &Req) -> Result<Resp>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let response = self.call(method, &request.encode_to_vec())?;
        Ok(Resp::decode(response.as_slice())?)
    }

    /// `Prepare`: prepare an expression.
    pub fn prepare_expression<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::Prepare, request)
    }

    /// `Evaluate`: evaluate an expression, prepared or inline.
    pub fn evaluate_expression<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::Evaluate, request)
    }

    /// `Unprepare`: release a prepared expression by id.
    pub fn unprepare_expression(&mut self, id: i64) -> Result<()> {
        self.call_release(Method::Unprepare, id)
    }

    /// `PrepareQuery`
    pub fn prepare_query<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::PrepareQuery, request)
    }

    /// `EvaluateQuery`
    pub fn evaluate_query<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::EvaluateQuery, request)
    }

    /// `UnprepareQuery`: release a prepared query by id.
    pub fn unprepare_query(&mut self, id: i64) -> Result<()> {
        self.call_release(Method::UnprepareQuery, id)
    }

    /// `PrepareModify`
    pub fn prepare_modify<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::PrepareModify, request)
    }

    /// `EvaluateModify`
    pub fn evaluate_modify<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::EvaluateModify, request)
    }

    /// `UnprepareModify`: release a prepared modify statement by id.
    pub fn unprepare_modify(&mut self, id: i64) -> Result<()> {
        self.call_release(Method::UnprepareModify, id)
    }

    /// `Analyze`
    pub fn analyze<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::Analyze, request)
    }

    /// `Parse`
    pub fn parse<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::Parse, request)
    }

    /// `BuildSql`
    pub fn build_sql<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::BuildSql, request)
    }

    /// `FormatSql`
    pub fn format_sql<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::FormatSql, request)
    }

    /// `LenientFormatSql`
    pub fn lenient_format_sql<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::LenientFormatSql, request)
    }

    /// `ExtractTableNamesFromStatement`
    pub fn extract_table_names<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::ExtractTableNamesFromStatement, request)
    }

    /// `ExtractTableNamesFromNextStatement`
    pub fn extract_table_names_from_next_statement<Req: Message, Resp: Message + Default>(
        &mut self,
        request: &Req,
    ) -> Result<Resp> {
        self.call_message(Method::ExtractTableNamesFromNextStatement, request)
    }

    /// `RegisterCatalog`
    pub fn register_catalog<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::RegisterCatalog, request)
    }

    /// `UnregisterCatalog`
    pub fn unregister_catalog<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::UnregisterCatalog, request)
    }

    /// `GetTableFromProto`
    pub fn get_table_from_proto<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::GetTableFromProto, request)
    }

    /// `GetBuiltinFunctions`
    pub fn get_builtin_functions<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::GetBuiltinFunctions, request)
    }

    /// `GetLanguageOptions`
    pub fn get_language_options<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::GetLanguageOptions, request)
    }

    /// `GetAnalyzerOptions`
    pub fn get_analyzer_options<Req: Message, Resp: Message + Default>(&mut self, request: &Req) -> Result<Resp> {
        self.call_message(Method::GetAnalyzerOptions, request)
    }

    /// Resolve every method export without calling any of them and report
    /// the ones this module cannot serve.
    pub fn verify_exports(&mut self) -> Vec<(Method, crate::BridgeError)> {
        Method::ALL
            .into_iter()
            .filter_map(|method| {
                self.exports
                    .resolve(&mut self.store, &self.instance, method)
                    .err()
                    .map(|e| (method, e))
            })
            .collect()
    }
}
