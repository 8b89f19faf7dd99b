//! # Await-Result Calls and Notifications
//!
//! Request/response correlation across the bridge and the sandbox endpoint.

#[cfg(test)]
mod tests {
    use super::super::harness::{flush_to_ui, inject, next_request, Harness};
    use plugin_bridge::{
        memory_pair, BridgeConfig, CallError, CorrelationId, CorrelationScheme, Envelope,
        PluginBridge, RemoteError, SandboxEndpoint,
    };
    use serde::Deserialize;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    // =============================================================================
    // SCENARIOS
    // =============================================================================

    /// getSelection goes out as c1 and the response payload comes back unaltered.
    #[tokio::test]
    async fn test_get_selection_resolves_with_exact_payload() {
        let Harness {
            bridge,
            sandbox,
            mut ui_inbound,
            mut sandbox_inbound,
        } = Harness::new();

        let payload = json!({"page": "P1", "nodes": [{"id": "1:2", "name": "Frame"}]});
        let expected = payload.clone();

        let (result, ()) = tokio::join!(bridge.call_value("getSelection", ()), async {
            let request = next_request(&mut sandbox_inbound).await;
            assert_eq!(request.name, "getSelection");
            assert_eq!(request.correlation_id, Some(CorrelationId::from("c1")));
            sandbox.reply(&request, payload).unwrap();
            assert_eq!(flush_to_ui(&bridge, &mut ui_inbound), 1);
        });

        assert_eq!(result.unwrap(), expected);
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_typed_call() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Selection {
            page: String,
            count: u32,
        }

        let Harness {
            bridge,
            sandbox,
            mut ui_inbound,
            mut sandbox_inbound,
        } = Harness::new();

        let (result, ()) = tokio::join!(bridge.call::<Selection, _>("getSelection", ()), async {
            let request = next_request(&mut sandbox_inbound).await;
            sandbox.reply(&request, json!({"page": "P2", "count": 3})).unwrap();
            flush_to_ui(&bridge, &mut ui_inbound);
        });

        assert_eq!(
            result.unwrap(),
            Selection {
                page: "P2".into(),
                count: 3
            }
        );
    }

    #[tokio::test]
    async fn test_remote_error_rejects_call() {
        let Harness {
            bridge,
            sandbox,
            mut ui_inbound,
            mut sandbox_inbound,
        } = Harness::new();

        let (result, ()) = tokio::join!(bridge.call_value("exportCode", json!({"nodeId": "9:9"})), async {
            let request = next_request(&mut sandbox_inbound).await;
            assert_eq!(request.payload, json!({"nodeId": "9:9"}));
            sandbox.reply_error(&request, "Node 9:9 not found").unwrap();
            flush_to_ui(&bridge, &mut ui_inbound);
        });

        match result {
            Err(CallError::Remote(e)) => assert_eq!(e, RemoteError::new("Node 9:9 not found")),
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    /// Responses arriving out of order still reach their own callers.
    #[tokio::test]
    async fn test_out_of_order_responses() {
        let Harness {
            bridge,
            sandbox,
            mut ui_inbound,
            mut sandbox_inbound,
        } = Harness::new();

        let (a, b, ()) = tokio::join!(
            bridge.call_value("first", 1),
            bridge.call_value("second", 2),
            async {
                let first = next_request(&mut sandbox_inbound).await;
                let second = next_request(&mut sandbox_inbound).await;
                sandbox.reply(&second, json!("two")).unwrap();
                sandbox.reply(&first, json!("one")).unwrap();
                flush_to_ui(&bridge, &mut ui_inbound);
            }
        );

        assert_eq!(a.unwrap(), json!("one"));
        assert_eq!(b.unwrap(), json!("two"));
    }

    // =============================================================================
    // LATE AND DUPLICATE RESPONSES
    // =============================================================================

    #[tokio::test]
    async fn test_duplicate_response_is_ignored() {
        let Harness {
            bridge,
            sandbox,
            mut ui_inbound,
            mut sandbox_inbound,
        } = Harness::new();

        let (first, ()) = tokio::join!(bridge.call_value("getSelection", ()), async {
            let request = next_request(&mut sandbox_inbound).await;
            sandbox.reply(&request, json!("original")).unwrap();
            sandbox.reply(&request, json!("duplicate")).unwrap();
            assert_eq!(flush_to_ui(&bridge, &mut ui_inbound), 2);
        });
        assert_eq!(first.unwrap(), json!("original"));

        // The next call gets a fresh id and its own answer.
        let (second, ()) = tokio::join!(bridge.call_value("getSelection", ()), async {
            let request = next_request(&mut sandbox_inbound).await;
            assert_eq!(request.correlation_id, Some(CorrelationId::from("c2")));
            sandbox.reply(&request, json!("second")).unwrap();
            flush_to_ui(&bridge, &mut ui_inbound);
        });
        assert_eq!(second.unwrap(), json!("second"));
    }

    #[tokio::test]
    async fn test_late_response_after_timeout_is_dropped() {
        let Harness {
            bridge,
            sandbox,
            mut ui_inbound,
            mut sandbox_inbound,
        } = Harness::new();

        let result = bridge
            .call_with_timeout("slow", (), Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(CallError::Timeout { .. })));
        assert_eq!(bridge.pending_count(), 0);

        let request = next_request(&mut sandbox_inbound).await;
        sandbox.reply(&request, json!("too late")).unwrap();
        assert_eq!(flush_to_ui(&bridge, &mut ui_inbound), 1);
        assert_eq!(bridge.pending_count(), 0);
    }

    #[test]
    fn test_response_for_unknown_id_is_harmless() {
        let h = Harness::new();
        assert!(inject(
            &h.bridge,
            &Envelope::response("ghost", CorrelationId::from("c404"), Value::Null)
        ));
        assert!(inject(
            &h.bridge,
            &Envelope::error_response("ghost", CorrelationId::from("c405"), "boom")
        ));
        assert_eq!(h.bridge.pending_count(), 0);
    }

    // =============================================================================
    // NOTIFICATIONS
    // =============================================================================

    #[tokio::test]
    async fn test_notifications_create_no_pending_entries() {
        let Harness {
            bridge,
            sandbox,
            mut ui_inbound,
            mut sandbox_inbound,
        } = Harness::new();

        for i in 0..50 {
            bridge.notify("trackEvent", json!({"n": i}));
        }
        assert_eq!(bridge.pending_count(), 0);

        // Even if the sandbox answers notifications, nothing settles or leaks.
        for _ in 0..50 {
            let request = next_request(&mut sandbox_inbound).await;
            assert!(request.correlation_id.is_some());
            sandbox.reply(&request, json!("ack")).unwrap();
        }
        assert_eq!(flush_to_ui(&bridge, &mut ui_inbound), 50);
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_ready_handshake_after_subscribing() {
        let Harness {
            bridge,
            mut sandbox_inbound,
            ..
        } = Harness::new();

        let _preview = bridge.subscribe("selectionPreview", |_| {});
        bridge.announce_ready();

        let request = next_request(&mut sandbox_inbound).await;
        assert_eq!(request.name, "notifyReady");
        assert_eq!(request.payload, Value::Null);
        assert_eq!(bridge.listener_count("selectionPreview"), 1);
    }

    #[tokio::test]
    async fn test_random_correlation_ids_are_unique() {
        let config = BridgeConfig {
            correlation_scheme: CorrelationScheme::Random,
            ..Default::default()
        };
        let Harness {
            bridge,
            mut sandbox_inbound,
            ..
        } = Harness::with_config(config);

        for _ in 0..20 {
            bridge.notify("ping", ());
        }
        let mut seen = std::collections::HashSet::new();
        for _ in 0..20 {
            let id = next_request(&mut sandbox_inbound).await.correlation_id.unwrap();
            assert!(seen.insert(id));
        }
    }

    // =============================================================================
    // FULL DUPLEX OVER PUMPED CHANNELS
    // =============================================================================

    /// Both sides run their own loops, as they would in a real host.
    #[tokio::test]
    async fn test_pumped_bridge_and_serving_sandbox() {
        let (ui, sandbox) = memory_pair();
        let bridge = Arc::new(PluginBridge::new(Arc::new(ui.channel), BridgeConfig::default()).unwrap());
        let endpoint = SandboxEndpoint::new(Arc::new(sandbox.channel));
        let ui_inbound = ui.inbound;
        let sandbox_inbound = sandbox.inbound;

        tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.run(ui_inbound).await }
        });
        tokio::spawn(async move {
            endpoint
                .serve(sandbox_inbound, |name, payload| match name {
                    "getSelection" => Ok(json!({"page": "P1"})),
                    "echo" => Ok(payload),
                    other => Err(format!("Unknown request {other}")),
                })
                .await
        });

        let selection = bridge.call_value("getSelection", ()).await.unwrap();
        assert_eq!(selection, json!({"page": "P1"}));

        let echoed = bridge.call_value("echo", json!([1, 2, 3])).await.unwrap();
        assert_eq!(echoed, json!([1, 2, 3]));

        let err = bridge.call_value("nope", ()).await.unwrap_err();
        assert_eq!(err.remote().map(|e| e.message.as_str()), Some("Unknown request nope"));

        let report = bridge.shutdown();
        assert_eq!(report.rejected_calls, 0);
    }
}
