//! Service layer: binds repository operations to a session lease. Handlers
//! call these; nothing here knows about HTTP.

pub mod card;
pub mod deck;
pub mod export;
pub mod review;

use crate::context::RequestContext;
use crate::session::{CollectionRef, Lease, SessionRegistry};
use crate::Error;
use futures::future::BoxFuture;

/// Acquires the user's session, runs `f` under the lease, releases. An
/// `Integrity` failure additionally invalidates the session entry so the
/// next request re-opens the file instead of trusting cached state.
pub async fn with_collection<T, F>(
    registry: &SessionRegistry,
    ctx: &RequestContext,
    coll: &CollectionRef,
    f: F,
) -> Result<T, Error>
where
    F: for<'a> FnOnce(&'a Lease) -> BoxFuture<'a, Result<T, Error>>,
{
    let lease = registry.acquire(ctx, coll).await?;
    let result = f(&lease).await;
    drop(lease);
    if let Err(err) = &result {
        if err.is_integrity() {
            log::error!("integrity failure for {}: {}", coll.username, err);
            if let Err(evict_err) = registry.invalidate(&coll.username).await {
                log::warn!(
                    "could not invalidate session for {}: {}",
                    coll.username,
                    evict_err
                );
            }
        }
    }
    result
}
