mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{ManualFetcher, rim_graph};
use shader_graph_material::{
    FetchCompletion, GraphEvent, GraphFetcher, GraphListener, GraphLoader, GraphUrl, LoadStatus,
    SubscriberId, loader::ListenerRef,
};

struct Recorder {
    name: &'static str,
    log: Rc<RefCell<Vec<String>>>,
}

impl GraphListener for Recorder {
    fn on_graph_event(&mut self, event: &GraphEvent) {
        let tag = match event {
            GraphEvent::Loaded { .. } => "loaded",
            GraphEvent::Failed { .. } => "failed",
        };
        self.log.borrow_mut().push(format!("{}:{tag}", self.name));
    }
}

fn recorder(name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Rc<RefCell<dyn GraphListener>> {
    Rc::new(RefCell::new(Recorder {
        name,
        log: log.clone(),
    }))
}

fn weak(listener: &Rc<RefCell<dyn GraphListener>>) -> ListenerRef {
    Rc::downgrade(listener)
}

#[test]
fn one_fetch_per_url_and_subscribers_notified_in_order() {
    let fetcher = ManualFetcher::new();
    let loader = GraphLoader::new(fetcher.clone());
    let url = loader.resolve("g1").unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    let listeners: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| recorder(name, &log))
        .collect();
    for listener in &listeners {
        loader.request(&url, SubscriberId::next(), weak(listener));
    }

    assert_eq!(loader.fetches_issued(), 1);
    assert_eq!(fetcher.pending(), 1);
    assert_eq!(loader.status(&url), LoadStatus::Pending);

    assert!(fetcher.complete(&url, &rim_graph()));
    assert_eq!(loader.poll(), 1);

    assert_eq!(*log.borrow(), ["a:loaded", "b:loaded", "c:loaded"]);
    assert_eq!(loader.status(&url), LoadStatus::Loaded);
}

#[test]
fn late_subscriber_gets_cached_payload_synchronously() {
    let fetcher = ManualFetcher::new();
    let loader = GraphLoader::new(fetcher.clone());
    let url = loader.resolve("g1").unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    let early = recorder("early", &log);
    loader.request(&url, SubscriberId::next(), weak(&early));
    fetcher.complete(&url, &rim_graph());
    loader.poll();

    let late = recorder("late", &log);
    loader.request(&url, SubscriberId::next(), weak(&late));

    assert_eq!(*log.borrow(), ["early:loaded", "late:loaded"]);
    assert_eq!(loader.fetches_issued(), 1);
    assert_eq!(fetcher.pending(), 0);
}

#[test]
fn dropped_listeners_are_skipped_and_pruned() {
    let fetcher = ManualFetcher::new();
    let loader = GraphLoader::new(fetcher.clone());
    let url = loader.resolve("g1").unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    let kept = recorder("kept", &log);
    let gone = recorder("gone", &log);
    loader.request(&url, SubscriberId::next(), weak(&gone));
    loader.request(&url, SubscriberId::next(), weak(&kept));
    drop(gone);

    assert_eq!(loader.subscriber_count(&url), 1);
    fetcher.complete(&url, &rim_graph());
    loader.poll();

    assert_eq!(*log.borrow(), ["kept:loaded"]);
}

#[test]
fn unsubscribed_listener_is_not_notified() {
    let fetcher = ManualFetcher::new();
    let loader = GraphLoader::new(fetcher.clone());
    let url = loader.resolve("g1").unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    let a = recorder("a", &log);
    let b = recorder("b", &log);
    let b_id = SubscriberId::next();
    loader.request(&url, SubscriberId::next(), weak(&a));
    loader.request(&url, b_id, weak(&b));
    loader.unsubscribe_all(b_id);

    fetcher.complete(&url, &rim_graph());
    loader.poll();
    assert_eq!(*log.borrow(), ["a:loaded"]);
}

#[test]
fn failure_is_broadcast_and_next_request_refetches() {
    let fetcher = ManualFetcher::new();
    let loader = GraphLoader::new(fetcher.clone());
    let url = loader.resolve("broken").unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    let a = recorder("a", &log);
    let b = recorder("b", &log);
    let a_id = SubscriberId::next();
    loader.request(&url, a_id, weak(&a));
    loader.request(&url, SubscriberId::next(), weak(&b));

    fetcher.fail(&url, "404 not found");
    loader.poll();

    assert_eq!(*log.borrow(), ["a:failed", "b:failed"]);
    assert_eq!(loader.status(&url), LoadStatus::Failed);
    assert!(loader.last_error(&url).unwrap().contains("404"));
    assert!(loader.cached(&url).is_none());

    loader.request(&url, a_id, weak(&a));
    assert_eq!(loader.fetches_issued(), 2);
    assert_eq!(loader.status(&url), LoadStatus::Pending);

    fetcher.complete(&url, &rim_graph());
    loader.poll();
    assert_eq!(loader.status(&url), LoadStatus::Loaded);
    assert!(loader.last_error(&url).is_none());
    assert_eq!(log.borrow()[2..], ["a:loaded", "b:loaded"]);
}

struct DroppingFetcher;

impl GraphFetcher for DroppingFetcher {
    fn fetch(&self, _url: &GraphUrl, completion: FetchCompletion) {
        drop(completion);
    }
}

#[test]
fn abandoned_fetch_reports_failure() {
    let loader = GraphLoader::new(DroppingFetcher);
    let url = loader.resolve("g1").unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    let a = recorder("a", &log);
    loader.request(&url, SubscriberId::next(), weak(&a));

    loader.poll();
    assert_eq!(*log.borrow(), ["a:failed"]);
    assert!(loader.last_error(&url).unwrap().contains("dropped"));
}

#[test]
fn malformed_payload_fails_the_url() {
    let fetcher = ManualFetcher::new();
    let loader = GraphLoader::new(fetcher.clone());
    let url = loader.resolve("g1").unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    let a = recorder("a", &log);
    loader.request(&url, SubscriberId::next(), weak(&a));

    fetcher.complete(&url, r#"{"vertex": 3}"#);
    loader.poll();
    assert_eq!(*log.borrow(), ["a:failed"]);
    assert_eq!(loader.status(&url), LoadStatus::Failed);
}

#[test]
fn busy_listener_receives_event_on_next_poll() {
    let fetcher = ManualFetcher::new();
    let loader = GraphLoader::new(fetcher.clone());
    let url = loader.resolve("g1").unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    let a = recorder("a", &log);
    let b = recorder("b", &log);
    loader.request(&url, SubscriberId::next(), weak(&a));
    loader.request(&url, SubscriberId::next(), weak(&b));
    fetcher.complete(&url, &rim_graph());

    {
        let _busy = a.borrow();
        assert_eq!(loader.poll(), 1);
    }
    assert_eq!(*log.borrow(), ["b:loaded"]);
    assert_eq!(loader.deferred_count(), 1);

    assert_eq!(loader.poll(), 0);
    assert_eq!(*log.borrow(), ["b:loaded", "a:loaded"]);
    assert_eq!(loader.deferred_count(), 0);
}

#[test]
fn deferred_event_is_dropped_after_unsubscribe() {
    let fetcher = ManualFetcher::new();
    let loader = GraphLoader::new(fetcher.clone());
    let url = loader.resolve("g1").unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    let a = recorder("a", &log);
    let id = SubscriberId::next();
    loader.request(&url, id, weak(&a));
    fetcher.complete(&url, &rim_graph());
    {
        let _busy = a.borrow();
        loader.poll();
    }
    loader.unsubscribe(&url, id);
    loader.poll();

    assert!(log.borrow().is_empty());
    assert_eq!(loader.deferred_count(), 0);
}
