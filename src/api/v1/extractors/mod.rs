/*!
 * Request context extractor
 *
 * Responsibility:
 * - session middleware が解決した RequestCtx を handler に渡す
 *
 * Public API:
 * - ReqCtx
 */
mod request_ctx;

pub use request_ctx::ReqCtx;
