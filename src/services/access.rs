//! Access predicates evaluated against the resolved request context.
use crate::services::identity::RequestCtx;

/// True when the session carried an identity reference.
///
/// This looks at the raw session field only: a session pointing at a deleted
/// user still passes, even though `ctx.identity` is `None`. Handlers behind
/// this gate must cope with an absent identity.
pub fn is_authenticated(ctx: &RequestCtx) -> bool {
    ctx.identity_ref.is_some()
}

/// True only for a resolved identity with the admin flag set.
pub fn is_privileged(ctx: &RequestCtx) -> bool {
    ctx.identity.as_ref().is_some_and(|u| u.admin)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Authenticated,
    Privileged,
}

impl Access {
    pub fn check(self, ctx: &RequestCtx) -> bool {
        match self {
            Access::Authenticated => is_authenticated(ctx),
            Access::Privileged => is_privileged(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::UserRow;

    fn user(admin: bool) -> UserRow {
        UserRow {
            id: 1,
            email: "a@x.com".to_string(),
            password: "s.h".to_string(),
            admin,
        }
    }

    fn resolved(admin: bool) -> RequestCtx {
        RequestCtx {
            identity_ref: Some(1),
            identity: Some(user(admin)),
        }
    }

    fn stale() -> RequestCtx {
        RequestCtx {
            identity_ref: Some(1),
            identity: None,
        }
    }

    #[test]
    fn authenticated_follows_session_reference() {
        assert!(!is_authenticated(&RequestCtx::anonymous()));
        assert!(is_authenticated(&resolved(false)));
        // stale reference still counts
        assert!(is_authenticated(&stale()));
    }

    #[test]
    fn privileged_requires_resolved_admin() {
        assert!(!is_privileged(&RequestCtx::anonymous()));
        assert!(!is_privileged(&stale()));
        assert!(!is_privileged(&resolved(false)));
        assert!(is_privileged(&resolved(true)));
    }

    #[test]
    fn access_dispatches_to_predicate() {
        let ctx = resolved(false);
        assert!(Access::Authenticated.check(&ctx));
        assert!(!Access::Privileged.check(&ctx));
    }
}
