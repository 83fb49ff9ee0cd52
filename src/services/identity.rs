//! Identity resolver: session identity reference -> request-scoped identity.
use crate::repos::{RepoResult, UserRow, UserStore};
use crate::services::session::SessionData;

/// Per-request identity context, produced once by [`resolve`] and read by the
/// access predicates and handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCtx {
    /// Raw identity reference as found in the session.
    pub identity_ref: Option<i64>,
    /// The identity it points at, if it still exists.
    pub identity: Option<UserRow>,
}

impl RequestCtx {
    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Load the identity referenced by the session.
///
/// - no reference: anonymous, no store call
/// - reference to a deleted identity: identity absent, reference kept
/// - store failure: returned to the caller (the request fails)
pub async fn resolve(users: &dyn UserStore, session: &SessionData) -> RepoResult<RequestCtx> {
    let Some(id) = session.user_id else {
        return Ok(RequestCtx::anonymous());
    };

    let identity = users.find_by_id(id).await?;
    if identity.is_none() {
        tracing::debug!(user_id = id, "session refers to a missing user");
    }

    Ok(RequestCtx {
        identity_ref: Some(id),
        identity,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::repos::{
        MemoryUserStore, RepoError,
        user_repo::{NewUser, UserChanges},
    };

    #[derive(Default)]
    struct CountingStore {
        inner: MemoryUserStore,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl UserStore for CountingStore {
        async fn list(&self) -> RepoResult<Vec<UserRow>> {
            self.inner.list().await
        }
        async fn find_by_email(&self, email: &str) -> RepoResult<Vec<UserRow>> {
            self.inner.find_by_email(email).await
        }
        async fn find_by_id(&self, id: i64) -> RepoResult<Option<UserRow>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_id(id).await
        }
        async fn insert(&self, new: NewUser<'_>) -> RepoResult<UserRow> {
            self.inner.insert(new).await
        }
        async fn update(&self, id: i64, c: UserChanges<'_>) -> RepoResult<Option<UserRow>> {
            self.inner.update(id, c).await
        }
        async fn delete(&self, id: i64) -> RepoResult<bool> {
            self.inner.delete(id).await
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl UserStore for BrokenStore {
        async fn list(&self) -> RepoResult<Vec<UserRow>> {
            Err(RepoError::Db(sqlx::Error::PoolClosed))
        }
        async fn find_by_email(&self, _email: &str) -> RepoResult<Vec<UserRow>> {
            Err(RepoError::Db(sqlx::Error::PoolClosed))
        }
        async fn find_by_id(&self, _id: i64) -> RepoResult<Option<UserRow>> {
            Err(RepoError::Db(sqlx::Error::PoolClosed))
        }
        async fn insert(&self, _new: NewUser<'_>) -> RepoResult<UserRow> {
            Err(RepoError::Db(sqlx::Error::PoolClosed))
        }
        async fn update(&self, _id: i64, _c: UserChanges<'_>) -> RepoResult<Option<UserRow>> {
            Err(RepoError::Db(sqlx::Error::PoolClosed))
        }
        async fn delete(&self, _id: i64) -> RepoResult<bool> {
            Err(RepoError::Db(sqlx::Error::PoolClosed))
        }
    }

    async fn seeded() -> (CountingStore, UserRow) {
        let store = CountingStore::default();
        let user = store
            .insert(NewUser {
                email: "a@x.com",
                password: "s.h",
                admin: false,
            })
            .await
            .unwrap();
        (store, user)
    }

    #[tokio::test]
    async fn no_reference_is_anonymous_without_lookup() {
        let (store, _) = seeded().await;
        let ctx = resolve(&store, &SessionData::default()).await.unwrap();

        assert_eq!(ctx, RequestCtx::anonymous());
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolves_with_exactly_one_lookup() {
        let (store, user) = seeded().await;
        let ctx = resolve(&store, &SessionData::signed_in(user.id, 0))
            .await
            .unwrap();

        assert_eq!(ctx.identity_ref, Some(user.id));
        assert_eq!(ctx.identity, Some(user));
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn deleted_identity_resolves_absent() {
        let (store, user) = seeded().await;
        store.delete(user.id).await.unwrap();

        let ctx = resolve(&store, &SessionData::signed_in(user.id, 0))
            .await
            .unwrap();
        assert_eq!(ctx.identity_ref, Some(user.id));
        assert!(ctx.identity.is_none());
    }

    #[tokio::test]
    async fn store_failure_is_surfaced() {
        let res = resolve(&BrokenStore, &SessionData::signed_in(1, 0)).await;
        assert!(matches!(res, Err(RepoError::Db(_))));
    }
}
