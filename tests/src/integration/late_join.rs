//! # Late-Join Choreography Tests
//!
//! Modules load in non-deterministic relative order. These tests attach a
//! module *after* others have published and verify it observes their
//! state exactly once per fact, through the hybrid initialization:
//!
//! ```text
//! [graphicalContainer] ──publish──→ [Sync Bus] ←──subscribe── [sidebar (late)]
//!        │                              │
//!        └── registerStateProvider ─────┤
//!                                       │  1. snapshot
//!                                       │  2. replay
//!                                       │  3. wait
//! ```

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use sync_bus::{
        BusConfig, Delivery, DeliveryKind, DiagnosticsSink, Fault, ManualClock, MemorySink,
        SnapshotUnavailable, SubscribeOptions, SyncBus, TimeSource, DEFAULT_REPLAY_TTL_MS,
    };

    /// A shell instance under test: bus + frozen clock + capturing sink.
    struct ShellHarness {
        bus: SyncBus,
        clock: Arc<ManualClock>,
        sink: Arc<MemorySink>,
    }

    impl ShellHarness {
        fn new() -> Self {
            Self::with_config(BusConfig::default())
        }

        fn with_config(config: BusConfig) -> Self {
            let clock = Arc::new(ManualClock::new(1_000));
            let sink = Arc::new(MemorySink::new());
            let bus = SyncBus::with_parts(
                config,
                Arc::clone(&clock) as Arc<dyn TimeSource>,
                Arc::clone(&sink) as Arc<dyn DiagnosticsSink>,
            )
            .expect("test config is valid");
            Self { bus, clock, sink }
        }

        /// Attaches a module that records everything it is delivered.
        fn attach_recorder(
            &self,
            pattern: &str,
            opts: SubscribeOptions,
        ) -> Arc<Mutex<Vec<Delivery>>> {
            let records: Arc<Mutex<Vec<Delivery>>> = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&records);
            // Dropping the handle does not cancel; the recorder stays
            // attached for the harness lifetime.
            let _handle = self.bus.subscribe(
                pattern,
                move |delivery| {
                    sink.lock().push(delivery);
                    Ok(())
                },
                opts,
            );
            records
        }
    }

    #[test]
    fn replay_catchup_is_exactly_once_in_publish_order() {
        let shell = ShellHarness::new();

        for i in 0..30 {
            shell
                .bus
                .publish("graphicalContainer:metrics", json!({"row": i}));
        }

        let records = shell.attach_recorder("graphicalContainer:*", SubscribeOptions::replay());

        let rows: Vec<u64> = records
            .lock()
            .iter()
            .map(|d| d.payload["row"].as_u64().expect("row payload"))
            .collect();
        assert_eq!(rows, (0..30).collect::<Vec<u64>>());
        assert!(records
            .lock()
            .iter()
            .all(|d| d.kind == DeliveryKind::Replayed));
    }

    #[test]
    fn snapshot_is_preferred_and_replay_is_skipped() {
        let shell = ShellHarness::new();

        // The container publishes history AND exposes current truth.
        shell
            .bus
            .publish("graphicalContainer:metrics", json!({"totalRows": 100}));
        shell
            .bus
            .publish("graphicalContainer:metrics", json!({"totalRows": 200}));
        shell
            .bus
            .register_state_provider("graphicalContainer", || Ok(json!({"totalRows": 320})));

        let records = shell.attach_recorder(
            "graphicalContainer:*",
            SubscribeOptions::snapshot("graphicalContainer"),
        );

        // Exactly one delivery: the snapshot, zero replayed entries.
        let records = records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, DeliveryKind::Snapshot);
        assert_eq!(records[0].payload, json!({"totalRows": 320}));
    }

    #[test]
    fn failing_provider_falls_back_to_replay() {
        let shell = ShellHarness::new();

        shell
            .bus
            .register_state_provider("graphicalContainer", || {
                Err(anyhow::anyhow!("renderer not ready"))
            });
        shell
            .bus
            .publish("graphicalContainer:metrics", json!({"totalRows": 200}));

        let records = shell.attach_recorder(
            "graphicalContainer:*",
            SubscribeOptions::snapshot("graphicalContainer"),
        );

        let records = records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, DeliveryKind::Replayed);

        let faults = shell.sink.faults();
        assert_eq!(faults.len(), 1);
        assert!(matches!(
            &faults[0],
            Fault::Provider {
                reason: SnapshotUnavailable::Failed { .. },
                ..
            }
        ));
    }

    #[test]
    fn expired_history_leaves_the_late_joiner_waiting_for_live_events() {
        let shell = ShellHarness::new();

        shell
            .bus
            .publish("notifications:unread", json!({"count": 5}));

        // The module loads after the replay TTL has expired: accepted
        // degraded behavior, it receives no initialization data.
        shell.clock.advance(DEFAULT_REPLAY_TTL_MS + 1);
        let records = shell.attach_recorder("notifications:unread", SubscribeOptions::replay());
        assert!(records.lock().is_empty());
        assert!(shell.sink.is_empty());

        // It still receives the next live event.
        shell
            .bus
            .publish("notifications:unread", json!({"count": 6}));
        let records = records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, DeliveryKind::Live);
        assert_eq!(records[0].payload, json!({"count": 6}));
    }

    #[test]
    fn overflowed_history_keeps_only_the_newest_capacity_entries() {
        let capacity = 50;
        let shell = ShellHarness::new();

        // capacity + k publishes, k = 25.
        for i in 0..(capacity + 25) {
            shell.bus.publish("feed:item", json!({"n": i}));
        }

        let records = shell.attach_recorder("feed:*", SubscribeOptions::replay());
        let ns: Vec<u64> = records
            .lock()
            .iter()
            .map(|d| d.payload["n"].as_u64().expect("n payload"))
            .collect();
        assert_eq!(ns.len(), capacity as usize);
        assert_eq!(ns, (25..75).collect::<Vec<u64>>());
    }

    #[test]
    fn delivered_copies_are_isolated_from_the_buffer() {
        let shell = ShellHarness::new();
        shell
            .bus
            .publish("notifications:unread", json!({"count": 5}));

        // First late joiner mutates its copy.
        let first: Arc<Mutex<Vec<Delivery>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&first);
        let handle = shell.bus.subscribe(
            "notifications:unread",
            move |mut delivery| {
                delivery.payload["count"] = json!(999);
                sink.lock().push(delivery);
                Ok(())
            },
            SubscribeOptions::replay(),
        );
        handle.unsubscribe();

        // Second late joiner still sees the original buffered payload.
        let second = shell.attach_recorder("notifications:unread", SubscribeOptions::replay());
        assert_eq!(second.lock()[0].payload, json!({"count": 5}));
    }

    #[test]
    fn provider_subscribing_to_itself_degrades_to_replay() {
        let shell = ShellHarness::new();
        shell.bus.publish("widget:state", json!({"ready": false}));

        // A provider that, mid-pull, triggers a subscribe seeded by its
        // own snapshot. The nested fetch is refused, the inner
        // subscription falls back to replay, and the outer pull still
        // completes.
        let bus = shell.bus.clone();
        let inner_records: Arc<Mutex<Vec<Delivery>>> = Arc::new(Mutex::new(Vec::new()));
        let inner_sink = Arc::clone(&inner_records);
        shell.bus.register_state_provider("widget", move || {
            let sink = Arc::clone(&inner_sink);
            let handle = bus.subscribe(
                "widget:*",
                move |delivery| {
                    sink.lock().push(delivery);
                    Ok(())
                },
                SubscribeOptions::snapshot("widget"),
            );
            handle.unsubscribe();
            Ok(json!({"ready": true}))
        });

        let outer = shell.attach_recorder("widget:*", SubscribeOptions::snapshot("widget"));

        // Outer subscription got the snapshot.
        assert_eq!(outer.lock().len(), 1);
        assert_eq!(outer.lock()[0].payload, json!({"ready": true}));

        // Inner subscription was refused the snapshot and replayed instead.
        assert_eq!(inner_records.lock().len(), 1);
        assert_eq!(inner_records.lock()[0].kind, DeliveryKind::Replayed);

        let faults = shell.sink.faults();
        assert!(faults.iter().any(|f| matches!(
            f,
            Fault::Provider {
                reason: SnapshotUnavailable::Reentrant(_),
                ..
            }
        )));
    }

    #[test]
    fn reconfigured_capacity_applies_to_new_publishes_only() {
        let shell = ShellHarness::new();
        shell.bus.configure(BusConfig::new(2, 60_000)).unwrap();

        shell.bus.publish("feed:item", json!("A"));
        shell.bus.publish("feed:item", json!("B"));
        shell.bus.publish("feed:item", json!("C"));

        // Growing the buffer later does not resurrect A.
        shell.bus.configure(BusConfig::new(10, 60_000)).unwrap();
        let records = shell.attach_recorder("feed:*", SubscribeOptions::replay());
        let payloads: Vec<String> = records
            .lock()
            .iter()
            .map(|d| d.payload.as_str().expect("string payload").to_owned())
            .collect();
        assert_eq!(payloads, vec!["B", "C"]);
    }
}
