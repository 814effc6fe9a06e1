//! Time/size-windowed request coalescing.
//!
//! Calls that arrive while a window is open join it. The window is sent as a
//! single wire batch when it reaches `max_batch_size` or when `wait` has
//! elapsed since it opened, whichever comes first. Every caller then receives
//! the raw bytes of its own response element, matched by request id.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ethwire_core::BatchConfig;
//! use ethwire_http::{BatchLoader, HttpFetcher};
//!
//! # fn build() -> Result<(), ethwire_core::TransportError> {
//! let fetch = Arc::new(HttpFetcher::new("http://127.0.0.1:8545", Duration::from_secs(30))?);
//! let loader = BatchLoader::new(fetch, &BatchConfig::new(50, Duration::from_millis(4)))?;
//! # Ok(()) }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, trace};

use ethwire_core::codec::{decode_batch, encode_batch, Envelope, JsonRpcRequest};
use ethwire_core::config::BatchConfig;
use ethwire_core::error::TransportError;

use crate::fetch::Fetch;
use crate::loader::Loader;

type ElementResult = Result<Vec<u8>, TransportError>;

/// Outcome of one dispatched window: either a result per joined request, in
/// join order, or one error shared by all of them.
type WindowResult = Result<Vec<ElementResult>, TransportError>;

struct Window {
    generation: u64,
    requests: Vec<JsonRpcRequest>,
    done: watch::Sender<Option<Arc<WindowResult>>>,
}

impl Window {
    fn open(generation: u64) -> Self {
        let (done, _) = watch::channel(None);
        Self {
            generation,
            requests: Vec::new(),
            done,
        }
    }
}

#[derive(Default)]
struct State {
    window: Option<Window>,
    next_generation: u64,
}

struct Inner {
    fetch: Arc<dyn Fetch>,
    wait: Duration,
    max_batch: Option<usize>,
    state: Mutex<State>,
}

/// A caller's place in a window.
struct Ticket {
    done: watch::Receiver<Option<Arc<WindowResult>>>,
    position: usize,
}

/// Coalescing [`Loader`].
#[derive(Clone)]
pub struct BatchLoader {
    inner: Arc<Inner>,
}

impl BatchLoader {
    /// Build a loader, rejecting a negative size or a sub-millisecond wait.
    pub fn new(fetch: Arc<dyn Fetch>, config: &BatchConfig) -> Result<Self, TransportError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                fetch,
                wait: config.wait(),
                max_batch: config.size_limit(),
                state: Mutex::new(State::default()),
            }),
        })
    }

    /// Load several requests, all joining before any result is awaited.
    pub async fn load_many(&self, requests: Vec<JsonRpcRequest>) -> Vec<ElementResult> {
        let tickets: Vec<Ticket> = requests.into_iter().map(|r| self.join(r)).collect();
        join_all(tickets.into_iter().map(settle)).await
    }

    fn join(&self, req: JsonRpcRequest) -> Ticket {
        let mut guard = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;

        let next_generation = &mut state.next_generation;
        let mut opened = None;
        let window = state.window.get_or_insert_with(|| {
            let generation = *next_generation;
            *next_generation += 1;
            opened = Some(generation);
            Window::open(generation)
        });

        let position = window.requests.len();
        window.requests.push(req);
        let done = window.done.subscribe();
        let full = self
            .inner
            .max_batch
            .is_some_and(|max| window.requests.len() >= max);
        let ready = if full { state.window.take() } else { None };
        drop(guard);

        if let Some(generation) = opened {
            trace!(generation, "batch window opened");
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                tokio::time::sleep(inner.wait).await;
                if let Some(window) = inner.close(generation) {
                    inner.flush(window).await;
                }
            });
        }
        if let Some(window) = ready {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.flush(window).await });
        }

        Ticket { done, position }
    }
}

impl Inner {
    /// Take the open window if it is still the one the timer was armed for.
    fn close(&self, generation: u64) -> Option<Window> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &state.window {
            Some(w) if w.generation == generation => state.window.take(),
            _ => None,
        }
    }

    async fn flush(&self, window: Window) {
        let Window {
            generation,
            requests,
            done,
        } = window;
        debug!(generation, size = requests.len(), "dispatching batch");
        let outcome = self.dispatch(&requests).await;
        if let Err(e) = &outcome {
            debug!(generation, error = %e, "batch failed");
        }
        done.send_replace(Some(Arc::new(outcome)));
    }

    async fn dispatch(&self, requests: &[JsonRpcRequest]) -> WindowResult {
        let payload = encode_batch(requests)?;
        let body = self.fetch.fetch(payload).await?;
        let mut envelopes = decode_batch(&body)?;

        // A single id-less element answering several requests rejects them all.
        if requests.len() > 1 && envelopes.len() == 1 && envelopes[0].valid_id().is_none() {
            let rejection = envelopes.remove(0);
            return Err(match rejection.into_result() {
                Err(e) => e,
                Ok(_) => TransportError::Protocol("unexpected single response to batch".into()),
            });
        }
        Ok(correlate(requests, envelopes))
    }
}

/// Match response elements to requests by id.
///
/// A request with no element carrying its id falls back to the element at
/// its own wire position, unless that element's id belongs to another
/// request.
fn correlate(requests: &[JsonRpcRequest], envelopes: Vec<Envelope>) -> Vec<ElementResult> {
    let ids: Vec<Option<String>> = envelopes.iter().map(Envelope::valid_id).collect();
    let mut slots: Vec<Option<Vec<u8>>> = envelopes.into_iter().map(|e| Some(e.raw)).collect();

    let by_id: HashMap<&str, usize> = ids
        .iter()
        .enumerate()
        .filter_map(|(i, id)| id.as_deref().map(|id| (id, i)))
        .collect();
    let requested: HashSet<&str> = requests.iter().map(|r| r.id.as_str()).collect();
    let claimed_by_other = |position: usize| {
        ids.get(position)
            .and_then(Option::as_deref)
            .is_some_and(|id| requested.contains(id))
    };

    let chosen: Vec<Option<usize>> = requests
        .iter()
        .enumerate()
        .map(|(position, req)| {
            by_id
                .get(req.id.as_str())
                .copied()
                .or_else(|| (!claimed_by_other(position)).then_some(position))
        })
        .collect();

    requests
        .iter()
        .zip(chosen)
        .map(|(req, index)| {
            index
                .and_then(|i| slots.get_mut(i).and_then(Option::take))
                .ok_or_else(|| {
                    TransportError::Protocol(format!("no response for request id {}", req.id))
                })
        })
        .collect()
}

async fn settle(ticket: Ticket) -> ElementResult {
    let Ticket { mut done, position } = ticket;
    let outcome = done
        .wait_for(Option::is_some)
        .await
        .map_err(|_| TransportError::Http("batch dispatch abandoned".into()))?
        .clone()
        .ok_or_else(|| TransportError::Http("batch dispatch abandoned".into()))?;

    match outcome.as_ref() {
        Err(e) => Err(e.clone()),
        Ok(results) => results.get(position).cloned().unwrap_or_else(|| {
            Err(TransportError::Protocol(format!(
                "no response at batch position {position}"
            )))
        }),
    }
}

#[async_trait]
impl Loader for BatchLoader {
    async fn load(&self, req: JsonRpcRequest) -> Result<Vec<u8>, TransportError> {
        settle(self.join(req)).await
    }
}
