//! Request identity pipeline stages, outermost first:
//!
//! 1. [`session`]: decode the session cookie and resolve the identity into a
//!    `RequestCtx` (request extensions)
//! 2. [`guard`]: evaluate an access predicate against that `RequestCtx`
//! 3. handler, whose `Shaped` body is filtered when it is turned into a response
//! 4. [`session`] again, on the way out: apply the handler's `SessionWrite`
pub mod guard;
pub mod session;
