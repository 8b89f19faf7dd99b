//! # Event Channels
//!
//! Delivery order, listener independence and disposal.

#[cfg(test)]
mod tests {
    use super::super::harness::{flush_to_ui, inject, Harness};
    use plugin_bridge::{CorrelationId, Envelope, EventResult, RemoteError};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    type Log = Arc<Mutex<Vec<(&'static str, EventResult)>>>;

    fn recorder(log: &Log, tag: &'static str) -> impl Fn(EventResult) + Send + Sync + 'static {
        let log = log.clone();
        move |item: EventResult| log.lock().push((tag, item))
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(EventResult) + Send + Sync + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = hits.clone();
        (hits, move |_: EventResult| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    // =============================================================================
    // DELIVERY
    // =============================================================================

    /// Two selectionPreview events reach both subscribers, in emission order.
    #[test]
    fn test_selection_preview_reaches_both_subscribers_in_order() {
        let Harness {
            bridge,
            sandbox,
            mut ui_inbound,
            ..
        } = Harness::new();

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let _a = bridge.subscribe("selectionPreview", recorder(&log, "a"));
        let _b = bridge.subscribe("selectionPreview", recorder(&log, "b"));

        sandbox.emit("selectionPreview", json!({"preview": 1})).unwrap();
        sandbox.emit("selectionPreview", json!({"preview": 2})).unwrap();
        assert_eq!(flush_to_ui(&bridge, &mut ui_inbound), 2);

        let log = log.lock();
        let for_a: Vec<_> = log.iter().filter(|(t, _)| *t == "a").map(|(_, v)| v.clone()).collect();
        let for_b: Vec<_> = log.iter().filter(|(t, _)| *t == "b").map(|(_, v)| v.clone()).collect();
        let expected = vec![Ok(json!({"preview": 1})), Ok(json!({"preview": 2}))];
        assert_eq!(for_a, expected);
        assert_eq!(for_b, expected);
    }

    #[test]
    fn test_error_events_reach_listeners_as_err() {
        let Harness {
            bridge,
            sandbox,
            mut ui_inbound,
            ..
        } = Harness::new();

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let _sub = bridge.subscribe("exportProgress", recorder(&log, "p"));

        sandbox.emit("exportProgress", json!({"done": 1, "total": 3})).unwrap();
        sandbox.emit_error("exportProgress", "Export aborted").unwrap();
        flush_to_ui(&bridge, &mut ui_inbound);

        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].1, Ok(json!({"done": 1, "total": 3})));
        assert_eq!(log[1].1, Err(RemoteError::new("Export aborted")));
    }

    #[test]
    fn test_channels_are_independent() {
        let h = Harness::new();
        let (previews, on_preview) = counter();
        let (progress, on_progress) = counter();
        let _p = h.bridge.subscribe("selectionPreview", on_preview);
        let _q = h.bridge.subscribe("exportProgress", on_progress);

        inject(&h.bridge, &Envelope::event("selectionPreview", Value::Null));
        inject(&h.bridge, &Envelope::event("selectionPreview", Value::Null));
        inject(&h.bridge, &Envelope::event("exportProgress", Value::Null));
        inject(&h.bridge, &Envelope::event("unsubscribedChannel", Value::Null));

        assert_eq!(previews.load(Ordering::SeqCst), 2);
        assert_eq!(progress.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_events_never_settle_calls_and_responses_never_reach_listeners() {
        let h = Harness::new();
        let (hits, listener) = counter();
        let _sub = h.bridge.subscribe("getSelection", listener);

        inject(
            &h.bridge,
            &Envelope::response("getSelection", CorrelationId::from("c1"), Value::Null),
        );
        let mut correlated = Envelope::event("getSelection", Value::Null);
        correlated.correlation_id = Some(CorrelationId::from("c1"));
        inject(&h.bridge, &correlated);

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    // =============================================================================
    // DISPOSAL
    // =============================================================================

    #[test]
    fn test_dispose_one_keeps_the_other() {
        let h = Harness::new();
        let (first_hits, first) = counter();
        let (second_hits, second) = counter();
        let a = h.bridge.subscribe("selectionPreview", first);
        let b = h.bridge.subscribe("selectionPreview", second);

        inject(&h.bridge, &Envelope::event("selectionPreview", Value::Null));
        assert!(a.unsubscribe());
        inject(&h.bridge, &Envelope::event("selectionPreview", Value::Null));

        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 2);
        assert_eq!(h.bridge.listener_count("selectionPreview"), 1);

        drop(b);
        inject(&h.bridge, &Envelope::event("selectionPreview", Value::Null));
        assert_eq!(second_hits.load(Ordering::SeqCst), 2);
        assert_eq!(h.bridge.listener_count("selectionPreview"), 0);
    }

    #[test]
    fn test_dispose_is_idempotent_and_targets_only_its_listener() {
        let h = Harness::new();
        let (other_hits, other) = counter();
        let _keep = h.bridge.subscribe("ch", other);
        let sub = h.bridge.subscribe("ch", |_| {});

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert!(!sub.is_active());
        drop(sub);

        assert_eq!(h.bridge.listener_count("ch"), 1);
        inject(&h.bridge, &Envelope::event("ch", Value::Null));
        assert_eq!(other_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_closure_twice_gets_two_registrations() {
        let h = Harness::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let make = || {
            let hits = hits.clone();
            move |_: EventResult| {
                hits.fetch_add(1, Ordering::SeqCst);
            }
        };
        let first = h.bridge.subscribe("ch", make());
        let _second = h.bridge.subscribe("ch", make());

        inject(&h.bridge, &Envelope::event("ch", Value::Null));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        first.unsubscribe();
        inject(&h.bridge, &Envelope::event("ch", Value::Null));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_listener_may_unsubscribe_itself_during_delivery() {
        let h = Harness::new();
        let slot: Arc<Mutex<Option<plugin_bridge::Subscription>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(AtomicUsize::new(0));

        let own = slot.clone();
        let counter = hits.clone();
        let sub = h.bridge.subscribe("once", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = own.lock().take() {
                sub.unsubscribe();
            }
        });
        *slot.lock() = Some(sub);

        inject(&h.bridge, &Envelope::event("once", Value::Null));
        inject(&h.bridge, &Envelope::event("once", Value::Null));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(h.bridge.listener_count("once"), 0);
    }

    // =============================================================================
    // FAULT ISOLATION
    // =============================================================================

    #[test]
    fn test_panicking_listener_does_not_block_siblings_or_later_events() {
        let h = Harness::new();
        let _bad = h.bridge.subscribe("selectionPreview", |_| panic!("listener bug"));
        let (hits, good) = counter();
        let _good = h.bridge.subscribe("selectionPreview", good);

        inject(&h.bridge, &Envelope::event("selectionPreview", json!(1)));
        inject(&h.bridge, &Envelope::event("selectionPreview", json!(2)));

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_malformed_messages_do_not_disturb_delivery() {
        let h = Harness::new();
        let (hits, listener) = counter();
        let _sub = h.bridge.subscribe("ch", listener);

        assert!(!h.bridge.receive(json!("not an envelope")));
        assert!(!h.bridge.receive(json!({"kind": "Bogus", "name": "ch"})));
        assert!(h.bridge.receive(json!({"kind": "Event", "name": "ch", "payload": 5})));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    // =============================================================================
    // STREAMS
    // =============================================================================

    #[tokio::test]
    async fn test_stream_subscription_receives_and_ends_on_shutdown() {
        let h = Harness::new();
        let mut stream = h.bridge.subscribe_stream("selectionPreview");
        assert_eq!(stream.channel(), "selectionPreview");

        inject(&h.bridge, &Envelope::event("selectionPreview", json!("a")));
        inject(&h.bridge, &Envelope::error_event("selectionPreview", "b"));

        assert_eq!(stream.recv().await, Some(Ok(json!("a"))));
        assert_eq!(stream.recv().await, Some(Err(RemoteError::new("b"))));

        h.bridge.shutdown();
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn test_dropping_stream_unsubscribes() {
        let h = Harness::new();
        let stream = h.bridge.subscribe_stream("ch");
        assert_eq!(h.bridge.listener_count("ch"), 1);
        drop(stream);
        assert_eq!(h.bridge.listener_count("ch"), 0);
    }
}
