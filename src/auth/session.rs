//! Anti-forgery state tokens for the login redirect.
//!
//! The state travels to the browser in an HTTP-only cookie and to the provider
//! in the authorization URL. Issued states are also tracked server-side so a
//! state can be consumed once only.

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Cookie carrying the state between `/login` and the callback.
pub const STATE_COOKIE: &str = "state";

/// Lifetime of an issued state, matching the cookie's `Max-Age`.
pub const STATE_TTL_SECONDS: i64 = 3600;

/// Random bytes per state token.
const STATE_BYTES: usize = 16;

/// Generate a random state token (base64url, no padding).
pub fn generate_state() -> String {
    let mut rng = rand::thread_rng();
    let state_bytes: Vec<u8> = (0..STATE_BYTES).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(&state_bytes)
}

/// Timing-safe comparison of two state values.
pub fn states_match(expected: &str, received: &str) -> bool {
    expected.as_bytes().ct_eq(received.as_bytes()).into()
}

/// `Set-Cookie` value storing `state`.
pub fn state_cookie(state: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        STATE_COOKIE, state, STATE_TTL_SECONDS
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the state cookie.
pub fn clear_state_cookie(secure: bool) -> String {
    let mut cookie = format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", STATE_COOKIE);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Upper bound on outstanding states; the oldest is evicted beyond it.
pub const MAX_PENDING_STATES: usize = 10_000;

/// States issued by `/login` and not yet consumed.
///
/// Every state shares one TTL, so issue order is also expiry order and stale
/// entries are pruned from the front of the queue.
pub struct StateStore {
    pending: Mutex<Pending>,
    ttl: Duration,
    capacity: usize,
}

#[derive(Default)]
struct Pending {
    expiry: HashMap<String, DateTime<Utc>>,
    // Issue order; may still hold states already consumed
    order: VecDeque<String>,
}

impl Pending {
    fn prune(&mut self, now: DateTime<Utc>) {
        while let Some(front) = self.order.front() {
            let live = self.expiry.get(front).map(|expires_at| *expires_at > now);
            if live == Some(true) {
                break;
            }
            if let Some(state) = self.order.pop_front() {
                self.expiry.remove(&state);
            }
        }

        // Consumed states behind a live front pile up in the queue
        if self.order.len() > 2 * self.expiry.len() + 64 {
            let expiry = &self.expiry;
            self.order.retain(|state| expiry.contains_key(state));
        }
    }

    fn evict_oldest(&mut self) -> bool {
        while let Some(state) = self.order.pop_front() {
            if self.expiry.remove(&state).is_some() {
                return true;
            }
        }
        false
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_limits(Duration::seconds(STATE_TTL_SECONDS), MAX_PENDING_STATES)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_limits(ttl, MAX_PENDING_STATES)
    }

    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Mint and record a new state, evicting the oldest one at capacity.
    pub fn issue(&self) -> String {
        let state = generate_state();
        let now = Utc::now();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());

        pending.prune(now);
        while pending.expiry.len() >= self.capacity {
            if !pending.evict_oldest() {
                break;
            }
            warn!("Pending login states at capacity, evicted the oldest");
        }

        pending.order.push_back(state.clone());
        pending.expiry.insert(state.clone(), now + self.ttl);
        state
    }

    /// Remove `state`, returning true if it was pending and unexpired.
    pub fn consume(&self, state: &str) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        match pending.expiry.remove(state) {
            Some(expires_at) if expires_at > Utc::now() => true,
            Some(_) => {
                debug!("State expired before callback");
                false
            }
            None => false,
        }
    }

    /// Number of outstanding states.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .expiry
            .len()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
