//! Prepared-statement handles.
//!
//! The engine keeps prepared expressions, queries and modify statements in
//! its own memory and hands the host an opaque non-negative id. The three
//! namespaces are disjoint, which [`Handle`] encodes in its kind parameter:
//! a `Handle<Query>` can only be evaluated or released through the query
//! methods.
//!
//! ```text
//! prepare ──► Created/Active ──evaluate (0..n)──► Active ──unprepare──► Released
//! ```
//!
//! Release consumes the handle. The guest may reuse a released id for a later
//! prepare, so the host must not hold on to it. No registry exists on the
//! host side; a stale id built with [`Handle::from_raw`] is forwarded and the
//! guest's answer surfaces unchanged.

use std::fmt;
use std::marker::PhantomData;

use prost::Message;

use crate::error::{BridgeError, Result};
use crate::exports::Method;
use crate::runtime::GuestInstance;

mod sealed {
    pub trait Sealed {}
}

/// One of the three handle namespaces.
pub trait HandleKind: sealed::Sealed {
    /// Human-readable namespace name
    const LABEL: &'static str;
    /// Payload method creating a handle
    const PREPARE: Method;
    /// Payload method evaluating a handle
    const EVALUATE: Method;
    /// Handle-only method releasing a handle
    const UNPREPARE: Method;
}

/// Prepared expression namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expression {}

/// Prepared query namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {}

/// Prepared modify-statement namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modify {}

impl sealed::Sealed for Expression {}
impl sealed::Sealed for Query {}
impl sealed::Sealed for Modify {}

impl HandleKind for Expression {
    const LABEL: &'static str = "expression";
    const PREPARE: Method = Method::Prepare;
    const EVALUATE: Method = Method::Evaluate;
    const UNPREPARE: Method = Method::Unprepare;
}

impl HandleKind for Query {
    const LABEL: &'static str = "query";
    const PREPARE: Method = Method::PrepareQuery;
    const EVALUATE: Method = Method::EvaluateQuery;
    const UNPREPARE: Method = Method::UnprepareQuery;
}

impl HandleKind for Modify {
    const LABEL: &'static str = "modify";
    const PREPARE: Method = Method::PrepareModify;
    const EVALUATE: Method = Method::EvaluateModify;
    const UNPREPARE: Method = Method::UnprepareModify;
}

/// Id of guest-side prepared state in namespace `K`.
///
/// Not `Clone`: [`GuestInstance::unprepare`] takes it by value.
#[derive(PartialEq, Eq, Hash)]
pub struct Handle<K: HandleKind> {
    id: i64,
    kind: PhantomData<K>,
}

impl<K: HandleKind> Handle<K> {
    /// Wrap an id obtained elsewhere. The caller vouches that it is live.
    pub fn from_raw(id: i64) -> Self {
        Self {
            id,
            kind: PhantomData,
        }
    }

    /// The numeric id.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Give up the handle without releasing it.
    pub fn into_raw(self) -> i64 {
        self.id
    }
}

impl<K: HandleKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{}>({})", K::LABEL, self.id)
    }
}

/// A prepare response that carries the id of the prepared state.
pub trait PreparedResponse {
    /// The id, or `None` when the response lacks it.
    fn prepared_id(&self) -> Option<i64>;
}

/// An evaluate request that can be pointed at a prepared id.
pub trait PreparedRequest {
    /// Store `id` in the request's prepared-id field.
    fn bind_prepared_id(&mut self, id: i64);
}

impl GuestInstance {
    /// Prepare state in namespace `K` and return its handle with the full
    /// decoded response.
    pub fn prepare<K, Req, Resp>(&mut self, request: &Req) -> Result<(Handle<K>, Resp)>
    where
        K: HandleKind,
        Req: Message,
        Resp: Message + Default + PreparedResponse,
    {
        let response: Resp = self.call_message(K::PREPARE, request)?;
        let id = response
            .prepared_id()
            .ok_or_else(|| BridgeError::MalformedResponse {
                method: K::PREPARE,
                reason: format!("no prepared {} id", K::LABEL),
            })?;
        if id < 0 {
            return Err(BridgeError::MalformedResponse {
                method: K::PREPARE,
                reason: format!("negative prepared {} id {}", K::LABEL, id),
            });
        }
        tracing::debug!(kind = K::LABEL, id, "prepared");
        Ok((Handle::from_raw(id), response))
    }

    /// Evaluate prepared state. The handle's id is bound into `request`
    /// before it is sent; the handle itself is left unchanged.
    pub fn evaluate<K, Req, Resp>(&mut self, handle: &Handle<K>, mut request: Req) -> Result<Resp>
    where
        K: HandleKind,
        Req: Message + PreparedRequest,
        Resp: Message + Default,
    {
        request.bind_prepared_id(handle.id);
        self.call_message(K::EVALUATE, &request)
    }

    /// Release prepared state.
    pub fn unprepare<K: HandleKind>(&mut self, handle: Handle<K>) -> Result<()> {
        self.call_release(K::UNPREPARE, handle.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_map_to_disjoint_methods() {
        let methods = [
            (Expression::PREPARE, Expression::EVALUATE, Expression::UNPREPARE),
            (Query::PREPARE, Query::EVALUATE, Query::UNPREPARE),
            (Modify::PREPARE, Modify::EVALUATE, Modify::UNPREPARE),
        ];
        for (i, a) in methods.iter().enumerate() {
            for b in methods.iter().skip(i + 1) {
                assert_ne!(a.0, b.0);
                assert_ne!(a.1, b.1);
                assert_ne!(a.2, b.2);
            }
        }
        assert_eq!(Query::UNPREPARE, Method::UnprepareQuery);
    }

    #[test]
    fn test_handle_debug() {
        let handle: Handle<Modify> = Handle::from_raw(7);
        assert_eq!(format!("{:?}", handle), "Handle<modify>(7)");
        assert_eq!(handle.into_raw(), 7);
    }
}
