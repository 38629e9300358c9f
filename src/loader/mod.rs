//! Process-wide graph cache.
//!
//! One [`GraphLoader`] per render thread maps canonical graph URLs to their
//! last loaded payload. Per URL the lifecycle is
//! `Unrequested -> Pending -> Loaded | Failed`; both terminal states go back
//! to `Pending` when a new fetch is issued (a request after a failure, or an
//! explicit [`GraphLoader::reload`]).
//!
//! Fetch results come back through a channel and are only applied in
//! [`GraphLoader::poll`], so listeners always run on the thread that owns the
//! loader. Listeners are held weakly: a dropped material is skipped and pruned
//! instead of being kept alive by its subscription.

pub mod fetch;
pub mod url;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};
use serde::Deserialize;

pub use fetch::{FetchCompletion, FileGraphFetcher, GraphFetcher, MemoryGraphFetcher};
pub use url::{DEFAULT_GRAPH_BASE_URL, GraphResolver, GraphUrl, resolve};

use crate::payload::GraphPayload;
use fetch::FetchOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Unrequested,
    Pending,
    Loaded,
    Failed,
}

#[derive(Clone, Debug)]
pub enum GraphEvent {
    Loaded {
        url: GraphUrl,
        payload: Arc<GraphPayload>,
    },
    Failed {
        url: GraphUrl,
        message: String,
    },
}

impl GraphEvent {
    pub fn url(&self) -> &GraphUrl {
        match self {
            GraphEvent::Loaded { url, .. } | GraphEvent::Failed { url, .. } => url,
        }
    }
}

/// Receiver of load notifications for the URLs it subscribed to.
pub trait GraphListener {
    fn on_graph_event(&mut self, event: &GraphEvent);
}

pub type ListenerRef = Weak<RefCell<dyn GraphListener>>;

/// Identity of a subscriber, stable across re-subscriptions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SubscriberId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderConfig {
    /// Base URL that short graph ids are resolved against.
    pub base_url: String,
    /// Log fetch failures as warnings instead of debug messages.
    pub verbose: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            verbose: false,
        }
    }
}

struct Subscriber {
    id: SubscriberId,
    listener: ListenerRef,
}

struct CacheEntry {
    status: LoadStatus,
    payload: Option<Arc<GraphPayload>>,
    error: Option<String>,
    subscribers: Vec<Subscriber>,
}

impl CacheEntry {
    fn new() -> Self {
        Self {
            status: LoadStatus::Unrequested,
            payload: None,
            error: None,
            subscribers: Vec::new(),
        }
    }
}

#[derive(Default)]
struct LoaderState {
    entries: HashMap<GraphUrl, CacheEntry>,
    fetches_issued: u64,
}

/// Event a busy listener could not take; retried on the next poll.
struct Deferred {
    id: SubscriberId,
    listener: ListenerRef,
    event: GraphEvent,
}

struct LoaderInner {
    resolver: GraphResolver,
    verbose: bool,
    fetcher: Box<dyn GraphFetcher>,
    tx: Sender<FetchOutcome>,
    rx: Receiver<FetchOutcome>,
    state: RefCell<LoaderState>,
    deferred: RefCell<Vec<Deferred>>,
}

/// Clone-friendly handle to the shared graph cache.
#[derive(Clone)]
pub struct GraphLoader {
    inner: Rc<LoaderInner>,
}

impl GraphLoader {
    pub fn new(fetcher: impl GraphFetcher) -> Self {
        Self::with_config(fetcher, LoaderConfig::default())
    }

    pub fn with_config(fetcher: impl GraphFetcher, config: LoaderConfig) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            inner: Rc::new(LoaderInner {
                resolver: GraphResolver::new(config.base_url),
                verbose: config.verbose,
                fetcher: Box::new(fetcher),
                tx,
                rx,
                state: RefCell::new(LoaderState::default()),
                deferred: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn resolver(&self) -> &GraphResolver {
        &self.inner.resolver
    }

    pub fn resolve(&self, url_or_id: &str) -> Option<GraphUrl> {
        self.inner.resolver.resolve(url_or_id)
    }

    pub fn status(&self, url: &GraphUrl) -> LoadStatus {
        self.inner
            .state
            .borrow()
            .entries
            .get(url)
            .map_or(LoadStatus::Unrequested, |e| e.status)
    }

    /// Last payload loaded for `url`, if any. Stays available while a reload
    /// is in flight or after a reload failed.
    pub fn cached(&self, url: &GraphUrl) -> Option<Arc<GraphPayload>> {
        self.inner
            .state
            .borrow()
            .entries
            .get(url)
            .and_then(|e| e.payload.clone())
    }

    pub fn last_error(&self, url: &GraphUrl) -> Option<String> {
        self.inner
            .state
            .borrow()
            .entries
            .get(url)
            .and_then(|e| e.error.clone())
    }

    /// Total number of fetches handed to the fetcher so far.
    pub fn fetches_issued(&self) -> u64 {
        self.inner.state.borrow().fetches_issued
    }

    /// Number of subscribers of `url` whose listener is still alive.
    pub fn subscriber_count(&self, url: &GraphUrl) -> usize {
        self.inner.state.borrow().entries.get(url).map_or(0, |e| {
            e.subscribers
                .iter()
                .filter(|s| s.listener.strong_count() > 0)
                .count()
        })
    }

    /// Subscribe `id` to `url` and make sure a payload is on its way.
    ///
    /// Re-requesting with the same `id` re-confirms the subscription without
    /// duplicating it. A cached payload is replayed to `listener` before this
    /// returns. A fetch is issued only if none is outstanding and the URL is
    /// unrequested or failed.
    pub fn request(&self, url: &GraphUrl, id: SubscriberId, listener: ListenerRef) {
        let (replay, issue) = {
            let mut state = self.inner.state.borrow_mut();
            let entry = state
                .entries
                .entry(url.clone())
                .or_insert_with(CacheEntry::new);

            match entry.subscribers.iter_mut().find(|s| s.id == id) {
                Some(existing) => existing.listener = listener.clone(),
                None => entry.subscribers.push(Subscriber {
                    id,
                    listener: listener.clone(),
                }),
            }

            let issue = matches!(entry.status, LoadStatus::Unrequested | LoadStatus::Failed);
            if issue {
                entry.status = LoadStatus::Pending;
            }
            (entry.payload.clone(), issue)
        };

        if issue {
            self.issue_fetch(url);
        }

        if let Some(payload) = replay {
            let event = GraphEvent::Loaded {
                url: url.clone(),
                payload,
            };
            self.notify(id, &listener, &event);
        }
    }

    pub fn unsubscribe(&self, url: &GraphUrl, id: SubscriberId) {
        let Ok(mut state) = self.inner.state.try_borrow_mut() else {
            return;
        };
        if let Some(entry) = state.entries.get_mut(url) {
            entry.subscribers.retain(|s| s.id != id);
        }
    }

    /// Drop every subscription held by `id`. Safe to call from `Drop`.
    pub fn unsubscribe_all(&self, id: SubscriberId) {
        let Ok(mut state) = self.inner.state.try_borrow_mut() else {
            return;
        };
        for entry in state.entries.values_mut() {
            entry.subscribers.retain(|s| s.id != id);
        }
    }

    /// Fetch `url` again even though it is loaded. Subscribers keep the
    /// cached payload until the new one arrives. Returns `false` when a
    /// fetch for `url` is already outstanding.
    pub fn reload(&self, url: &GraphUrl) -> bool {
        {
            let mut state = self.inner.state.borrow_mut();
            let entry = state
                .entries
                .entry(url.clone())
                .or_insert_with(CacheEntry::new);
            if entry.status == LoadStatus::Pending {
                return false;
            }
            entry.status = LoadStatus::Pending;
        }
        self.issue_fetch(url);
        true
    }

    /// Insert or replace the payload for `url` without fetching, and notify
    /// its subscribers.
    pub fn publish(&self, url: &GraphUrl, payload: GraphPayload) {
        self.deliver(FetchOutcome {
            url: url.clone(),
            result: Ok(payload),
        });
    }

    /// Apply every fetch result that has arrived since the last poll and
    /// notify subscribers. Returns the number of results applied.
    pub fn poll(&self) -> usize {
        self.retry_deferred();
        let mut handled = 0;
        while let Ok(outcome) = self.inner.rx.try_recv() {
            self.deliver(outcome);
            handled += 1;
        }
        handled
    }

    fn issue_fetch(&self, url: &GraphUrl) {
        self.inner.state.borrow_mut().fetches_issued += 1;
        log::debug!("GraphLoader: fetching {url}");
        let completion = FetchCompletion::new(url.clone(), self.inner.tx.clone());
        self.inner.fetcher.fetch(url, completion);
    }

    fn deliver(&self, outcome: FetchOutcome) {
        let FetchOutcome { url, result } = outcome;

        let (event, subscribers) = {
            let mut state = self.inner.state.borrow_mut();
            let entry = state
                .entries
                .entry(url.clone())
                .or_insert_with(CacheEntry::new);

            let event = match result {
                Ok(payload) => {
                    let payload = Arc::new(payload);
                    entry.status = LoadStatus::Loaded;
                    entry.payload = Some(payload.clone());
                    entry.error = None;
                    log::debug!("GraphLoader: loaded {url}");
                    GraphEvent::Loaded {
                        url: url.clone(),
                        payload,
                    }
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    if self.inner.verbose {
                        log::warn!("GraphLoader: failed to load {url}: {message}");
                    } else {
                        log::debug!("GraphLoader: failed to load {url}: {message}");
                    }
                    entry.status = LoadStatus::Failed;
                    entry.error = Some(message.clone());
                    GraphEvent::Failed {
                        url: url.clone(),
                        message,
                    }
                }
            };

            entry.subscribers.retain(|s| s.listener.strong_count() > 0);
            let subscribers: Vec<(SubscriberId, ListenerRef)> = entry
                .subscribers
                .iter()
                .map(|s| (s.id, s.listener.clone()))
                .collect();
            (event, subscribers)
        };

        for (id, listener) in subscribers {
            // An earlier callback may have unsubscribed this one.
            if !self.is_subscribed(&url, id) {
                continue;
            }
            self.notify(id, &listener, &event);
        }
    }

    /// Events held back because their listener was borrowed at delivery.
    pub fn deferred_count(&self) -> usize {
        self.inner.deferred.borrow().len()
    }

    fn notify(&self, id: SubscriberId, listener: &ListenerRef, event: &GraphEvent) {
        let Some(strong) = listener.upgrade() else {
            return;
        };
        let Ok(mut target) = strong.try_borrow_mut() else {
            log::debug!("GraphLoader: listener busy, deferring event for {}", event.url());
            self.inner.deferred.borrow_mut().push(Deferred {
                id,
                listener: listener.clone(),
                event: event.clone(),
            });
            return;
        };
        target.on_graph_event(event);
    }

    fn retry_deferred(&self) {
        let deferred = std::mem::take(&mut *self.inner.deferred.borrow_mut());
        for Deferred {
            id,
            listener,
            event,
        } in deferred
        {
            let url = event.url().clone();
            if !self.is_subscribed(&url, id) {
                continue;
            }
            // The URL may have changed state since; hand over what is current.
            let current = match self.status(&url) {
                LoadStatus::Loaded => self.cached(&url),
                _ => None,
            };
            let event = match current {
                Some(payload) => GraphEvent::Loaded { url, payload },
                None => event,
            };
            self.notify(id, &listener, &event);
        }
    }

    fn is_subscribed(&self, url: &GraphUrl, id: SubscriberId) -> bool {
        self.inner
            .state
            .borrow()
            .entries
            .get(url)
            .is_some_and(|e| e.subscribers.iter().any(|s| s.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        events: Vec<String>,
    }

    impl GraphListener for Recorder {
        fn on_graph_event(&mut self, event: &GraphEvent) {
            let tag = match event {
                GraphEvent::Loaded { .. } => "loaded",
                GraphEvent::Failed { .. } => "failed",
            };
            self.events.push(tag.to_string());
        }
    }

    fn recorder() -> Rc<RefCell<Recorder>> {
        Rc::new(RefCell::new(Recorder { events: Vec::new() }))
    }

    fn listener_ref(r: &Rc<RefCell<Recorder>>) -> ListenerRef {
        let r: Rc<RefCell<dyn GraphListener>> = r.clone();
        Rc::downgrade(&r)
    }

    const GRAPH: &str = r#"{"vertex": "v", "fragment": "f", "uniforms": []}"#;

    #[test]
    fn memory_fetcher_round_trip_through_poll() {
        let fetcher = MemoryGraphFetcher::new();
        let loader = GraphLoader::new(fetcher.clone());
        let url = loader.resolve("g1").unwrap();
        fetcher.insert(&url, GRAPH);

        let rec = recorder();
        loader.request(&url, SubscriberId::next(), listener_ref(&rec));
        assert_eq!(loader.status(&url), LoadStatus::Pending);
        assert!(rec.borrow().events.is_empty());

        assert_eq!(loader.poll(), 1);
        assert_eq!(loader.status(&url), LoadStatus::Loaded);
        assert_eq!(rec.borrow().events, ["loaded"]);
    }

    #[test]
    fn resubscribing_does_not_duplicate_notifications() {
        let fetcher = MemoryGraphFetcher::new();
        let loader = GraphLoader::new(fetcher.clone());
        let url = loader.resolve("g1").unwrap();
        fetcher.insert(&url, GRAPH);

        let rec = recorder();
        let id = SubscriberId::next();
        loader.request(&url, id, listener_ref(&rec));
        loader.request(&url, id, listener_ref(&rec));
        loader.poll();

        assert_eq!(loader.fetches_issued(), 1);
        assert_eq!(loader.subscriber_count(&url), 1);
        assert_eq!(rec.borrow().events, ["loaded"]);
    }

    #[test]
    fn reload_keeps_cached_payload_until_replaced() {
        let fetcher = MemoryGraphFetcher::new();
        let loader = GraphLoader::new(fetcher.clone());
        let url = loader.resolve("g1").unwrap();
        fetcher.insert(&url, GRAPH);

        let rec = recorder();
        loader.request(&url, SubscriberId::next(), listener_ref(&rec));
        loader.poll();

        fetcher.insert(&url, r#"{"vertex": "v2", "fragment": "f2"}"#);
        assert!(loader.reload(&url));
        assert!(!loader.reload(&url));
        assert_eq!(loader.cached(&url).unwrap().vertex_source, "v");

        loader.poll();
        assert_eq!(loader.fetches_issued(), 2);
        assert_eq!(loader.cached(&url).unwrap().vertex_source, "v2");
        assert_eq!(rec.borrow().events, ["loaded", "loaded"]);
    }

    #[test]
    fn publish_notifies_without_fetching() {
        let loader = GraphLoader::new(MemoryGraphFetcher::new());
        let url = loader.resolve("pushed").unwrap();
        let rec = recorder();
        {
            let mut state = loader.inner.state.borrow_mut();
            let entry = state.entries.entry(url.clone()).or_insert_with(CacheEntry::new);
            entry.subscribers.push(Subscriber {
                id: SubscriberId::next(),
                listener: listener_ref(&rec),
            });
        }

        loader.publish(&url, GraphPayload::from_json_str(GRAPH).unwrap());
        assert_eq!(loader.fetches_issued(), 0);
        assert_eq!(loader.status(&url), LoadStatus::Loaded);
        assert_eq!(rec.borrow().events, ["loaded"]);
    }
}
