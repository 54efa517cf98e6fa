//! Credential cache with single-flight refresh
//!
//! Holds at most one live token per client. When the token is missing or
//! inside the refresh margin, the first caller starts a login and parks a
//! shared future in the slot; every caller arriving before it resolves
//! awaits that same future, so one expiry costs exactly one login and all
//! waiters observe the same token or the same error.
//!
//! Slot bookkeeping (clearing the in-flight handle, storing the result) is
//! done by whichever waiter finishes first, keyed by a generation counter so
//! a slow waiter from an older login can never clobber a newer one.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::Shared;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::constants::{DEFAULT_REFRESH_MARGIN_SECS, DEFAULT_TOKEN_LIFETIME_SECS};
use crate::error::{Error, Result};
use crate::token::{Authenticator, Token};

type LoginFuture = Shared<Pin<Box<dyn Future<Output = Result<Arc<Token>>> + Send>>>;

struct InFlight {
    generation: u64,
    future: LoginFuture,
}

#[derive(Default)]
struct Slot {
    current: Option<Arc<Token>>,
    in_flight: Option<InFlight>,
    /// Sticky configuration error; no further logins are attempted.
    fatal: Option<Error>,
    generation: u64,
}

/// Per-client token cache.
///
/// Owned by a client value; two caches never share state.
pub struct CredentialCache {
    authenticator: Arc<dyn Authenticator>,
    clock: Arc<dyn Clock>,
    refresh_margin: Duration,
    default_lifetime: Duration,
    slot: Mutex<Slot>,
}

impl CredentialCache {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            authenticator,
            clock: Arc::new(SystemClock),
            refresh_margin: Duration::from_secs(DEFAULT_REFRESH_MARGIN_SECS),
            default_lifetime: Duration::from_secs(DEFAULT_TOKEN_LIFETIME_SECS),
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Lifetime assumed for tokens without an `exp` claim.
    pub fn with_default_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_lifetime = lifetime;
        self
    }

    /// Return a valid token, logging in first if needed.
    ///
    /// Dropping the returned future abandons only this caller's wait; an
    /// in-flight login keeps its place in the slot for the other waiters.
    pub async fn get_token(&self) -> Result<Arc<Token>> {
        let (generation, future) = {
            let mut slot = self.slot.lock().await;

            if let Some(err) = &slot.fatal {
                return Err(err.clone());
            }

            let now = self.clock.now_millis();
            if let Some(token) = &slot.current {
                if token.is_fresh(now, self.refresh_margin) {
                    return Ok(Arc::clone(token));
                }
                debug!(
                    expires_at = token.expires_at_millis(),
                    now, "cached token inside refresh margin"
                );
            }

            match &slot.in_flight {
                Some(in_flight) => {
                    debug!(generation = in_flight.generation, "joining in-flight login");
                    (in_flight.generation, in_flight.future.clone())
                }
                None => {
                    slot.generation += 1;
                    let generation = slot.generation;
                    let future = self.start_login();
                    slot.in_flight = Some(InFlight {
                        generation,
                        future: future.clone(),
                    });
                    (generation, future)
                }
            }
        };

        let outcome = future.await;

        let mut slot = self.slot.lock().await;
        if slot
            .in_flight
            .as_ref()
            .is_some_and(|f| f.generation == generation)
        {
            slot.in_flight = None;
            match &outcome {
                Ok(token) => slot.current = Some(Arc::clone(token)),
                Err(e) if e.is_fatal() => {
                    warn!(error = %e, "login produced unusable token, giving up");
                    slot.current = None;
                    slot.fatal = Some(e.clone());
                }
                Err(e) => {
                    warn!(error = %e, "login failed, next call will retry");
                }
            }
        }
        outcome
    }

    /// The cached token, if any, without checking freshness or logging in.
    pub async fn cached(&self) -> Option<Arc<Token>> {
        self.slot.lock().await.current.clone()
    }

    /// Drop the cached token so the next `get_token` logs in again.
    ///
    /// Used when the API rejects a token the cache still considered fresh.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        if slot.current.take().is_some() {
            info!("cached token invalidated");
        }
    }

    /// Drop the cached token only if it is `rejected`.
    ///
    /// A caller whose request was refused may hold a token that another
    /// caller has already replaced; the newer token stays cached.
    pub async fn invalidate_token(&self, rejected: &Token) {
        let mut slot = self.slot.lock().await;
        if slot
            .current
            .as_ref()
            .is_some_and(|current| current.raw() == rejected.raw())
        {
            slot.current = None;
            info!("rejected token invalidated");
        } else {
            debug!("rejected token already replaced, keeping cached token");
        }
    }

    fn start_login(&self) -> LoginFuture {
        let authenticator = Arc::clone(&self.authenticator);
        let clock = Arc::clone(&self.clock);
        let default_lifetime = self.default_lifetime;

        let future: Pin<Box<dyn Future<Output = Result<Arc<Token>>> + Send>> =
            Box::pin(async move {
                let outcome: Result<Token> = async {
                    let raw = authenticator.login().await?;
                    Token::decode(raw, clock.now_millis(), default_lifetime)
                }
                .await;

                match outcome {
                    Ok(token) => {
                        metrics::counter!("cloud_auth_logins_total", "outcome" => "success")
                            .increment(1);
                        info!(
                            user_id = token.user_id(),
                            tenant_id = token.tenant_id(),
                            expires_at = token.expires_at_millis(),
                            "login succeeded"
                        );
                        Ok(Arc::new(token))
                    }
                    Err(e) => {
                        metrics::counter!("cloud_auth_logins_total", "outcome" => "failure")
                            .increment(1);
                        Err(e)
                    }
                }
            });
        future.shared()
    }
}
