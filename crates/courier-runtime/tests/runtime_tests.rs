#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use courier_config::{CourierConfig, DeliveryMode};
    use courier_core::{Clock, CourierError, Cursor, EventId, ManualClock, WideInt};
    use courier_ledger::mock::{MockAuthority, MockCipher, MockLedger};
    use courier_ledger::{
        Ed25519Signer, EventPage, EventQuery, LedgerClient, MoveCall, ObjectData, ObjectPage,
        RawEvent, Signer, TransactionEffects,
    };
    use courier_llm::mock::MockOracle;
    use courier_runtime::*;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    const A: &str = "0xaaa";
    const B: &str = "0xbbb";
    const USER: &str = "0xuser";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    struct Harness {
        ledger: MockLedger,
        cipher: MockCipher,
        authority: MockAuthority,
        oracle: MockOracle,
        clock: ManualClock,
        signer: Arc<Ed25519Signer>,
        config: CourierConfig,
    }

    impl Harness {
        fn new() -> Self {
            let mut config = CourierConfig::default();
            config.network.package_id = "0xpkg".into();
            Self {
                ledger: MockLedger::new(),
                cipher: MockCipher::new(),
                authority: MockAuthority::new(),
                oracle: MockOracle::new(),
                clock: ManualClock::new(t0()),
                signer: Arc::new(Ed25519Signer::from_seed(&[42u8; 32]).unwrap()),
                config,
            }
        }

        fn with_delivery(mut self, mode: DeliveryMode) -> Self {
            self.config.polling.delivery = mode;
            self
        }

        fn deps(&self) -> RuntimeDeps {
            RuntimeDeps {
                ledger: Arc::new(self.ledger.clone()),
                cipher: Arc::new(self.cipher.clone()),
                authority: Arc::new(self.authority.clone()),
                signer: self.signer.clone(),
                oracle: Arc::new(self.oracle.clone()),
                clock: Arc::new(self.clock.clone()),
            }
        }

        fn orchestrator(&self) -> PollOrchestrator {
            PollOrchestrator::from_config(&self.config, self.deps())
        }

        /// Member of `channel` with a key, ready to receive replies.
        fn join(&self, channel: &str) {
            self.ledger.grant_membership(channel);
            self.ledger.set_channel_key(channel, &[7, 7, 7], 1);
        }

        /// A user message on `channel` stamped one second after start.
        fn say(&self, channel: &str, index: u64, text: &str) -> courier_core::EventId {
            self.cipher.put_message(channel, index, text);
            self.ledger
                .push_message(channel, USER, index, t0() + Duration::seconds(1))
        }

        fn credential_manager(&self) -> CredentialManager {
            CredentialManager::new(
                Arc::new(self.authority.clone()),
                self.signer.clone(),
                Arc::new(self.clock.clone()),
                CredentialSettings::from_config(&self.config),
            )
        }

        fn tracker(&self) -> EventCursorTracker {
            EventCursorTracker::new(
                Arc::new(self.ledger.clone()),
                "0xpkg",
                "message",
                50,
                self.signer.address(),
                t0(),
            )
        }

        fn membership(&self) -> MembershipCache {
            MembershipCache::new(
                Arc::new(self.ledger.clone()),
                self.signer.address().clone(),
                self.config.network.member_cap_type(),
                Arc::new(self.clock.clone()),
            )
        }
    }

    // ── Batch processing scenarios ─────────────────────────────

    #[tokio::test]
    async fn test_first_cycle_skips_existing_history() {
        let h = Harness::new();
        h.join(A);
        let old = h.say(A, 0, "from before start");
        let mut orch = h.orchestrator();

        let report = orch.run_cycle().await;
        assert!(!report.failed());
        assert_eq!(report.fetched, 0);
        assert_eq!(orch.cursor(), Some(&Cursor::After(old)));
        assert!(h.ledger.sent().is_empty());
    }

    #[tokio::test]
    async fn test_mixed_channels_reply_in_order() {
        let h = Harness::new();
        h.join(A);
        let mut orch = h.orchestrator();
        assert!(!orch.run_cycle().await.failed());
        assert_eq!(orch.cursor(), Some(&Cursor::Start));

        h.say(A, 0, "hello");
        h.say(B, 0, "not for us");
        let e3 = h.say(A, 1, "again");

        let report = orch.run_cycle().await;
        assert!(!report.failed());
        assert_eq!(report.fetched, 2);
        assert_eq!(report.replied, 2);
        assert_eq!(orch.cursor(), Some(&Cursor::After(e3)));
        assert_eq!(
            h.ledger.delivered_replies(),
            vec![
                (A.to_string(), "re: hello".to_string()),
                (A.to_string(), "re: again".to_string()),
            ]
        );

        let calls = h.oracle.calls();
        assert_eq!(calls[0].user_text, "hello");
        assert!(calls[0].history.is_empty());
        assert_eq!(calls[1].history.len(), 2);
        assert_eq!(calls[1].history[1].text, "re: hello");
        assert_eq!(orch.history().recent(&A.to_string()).len(), 4);
    }

    #[tokio::test]
    async fn test_failed_dispatch_keeps_cursor_and_refetches_batch() {
        let h = Harness::new();
        h.join(A);
        let mut orch = h.orchestrator();
        orch.run_cycle().await;

        h.say(A, 0, "one");
        let e2 = h.say(A, 1, "two");
        h.ledger.fail_send_attempt(1);

        let report = orch.run_cycle().await;
        assert!(report.failed());
        assert!(!report.advanced());
        assert_eq!(orch.cursor(), Some(&Cursor::Start));
        assert_eq!(h.ledger.delivered_replies().len(), 1);

        let report = orch.run_cycle().await;
        assert!(!report.failed());
        assert_eq!(report.fetched, 2);
        assert_eq!(h.ledger.event_query_cursors().last(), Some(&None));
        assert_eq!(orch.cursor(), Some(&Cursor::After(e2)));

        // The first message is answered twice: at-least-once delivery.
        let texts: Vec<String> = h
            .ledger
            .delivered_replies()
            .into_iter()
            .map(|(_, t)| t)
            .collect();
        assert_eq!(texts, vec!["re: one", "re: one", "re: two"]);
    }

    #[tokio::test]
    async fn test_per_event_delivery_advances_to_last_success() {
        let h = Harness::new().with_delivery(DeliveryMode::PerEvent);
        h.join(A);
        let mut orch = h.orchestrator();
        orch.run_cycle().await;

        let e1 = h.say(A, 0, "one");
        let e2 = h.say(A, 1, "two");
        h.ledger.fail_send_attempt(1);

        let report = orch.run_cycle().await;
        assert!(report.failed());
        assert_eq!(orch.cursor(), Some(&Cursor::After(e1.clone())));

        let report = orch.run_cycle().await;
        assert!(!report.failed());
        assert_eq!(report.fetched, 1);
        assert_eq!(h.ledger.event_query_cursors().last(), Some(&Some(e1)));
        assert_eq!(orch.cursor(), Some(&Cursor::After(e2)));
        assert_eq!(h.ledger.delivered_replies().len(), 2);
    }

    #[tokio::test]
    async fn test_oracle_failure_holds_cursor() {
        let mut h = Harness::new();
        h.oracle = MockOracle::new().with_error("HTTP 500");
        h.join(A);
        let mut orch = h.orchestrator();
        orch.run_cycle().await;
        h.say(A, 0, "hi");

        let report = orch.run_cycle().await;
        assert!(report.failed());
        assert_eq!(orch.cursor(), Some(&Cursor::Start));
        assert!(h.ledger.sent().is_empty());

        // Queue drained: the retry succeeds.
        let report = orch.run_cycle().await;
        assert_eq!(report.replied, 1);
    }

    #[tokio::test]
    async fn test_undecryptable_message_is_skipped_not_fatal() {
        let h = Harness::new();
        h.join(A);
        let mut orch = h.orchestrator();
        orch.run_cycle().await;

        h.ledger.push_message(A, USER, 0, t0() + Duration::seconds(1));
        let e2 = h.say(A, 1, "readable");

        let report = orch.run_cycle().await;
        assert!(!report.failed());
        assert_eq!(report.skipped, 1);
        assert_eq!(report.replied, 1);
        assert_eq!(orch.cursor(), Some(&Cursor::After(e2)));
    }

    #[tokio::test]
    async fn test_long_reply_truncated_and_empty_reply_skipped() {
        let mut h = Harness::new();
        h.config.oracle.max_reply_chars = 10;
        h.oracle = MockOracle::new()
            .with_reply("a very long reply text")
            .with_reply("   ");
        h.join(A);
        let mut orch = h.orchestrator();
        orch.run_cycle().await;

        h.say(A, 0, "first");
        h.say(A, 1, "second");
        let report = orch.run_cycle().await;

        assert!(!report.failed());
        assert_eq!(report.replied, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(
            h.ledger.delivered_replies(),
            vec![(A.to_string(), "a very ...".to_string())]
        );
    }

    // ── Filtering ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_own_messages_never_answered() {
        let h = Harness::new();
        h.join(A);
        let mut orch = h.orchestrator();
        orch.run_cycle().await;

        let own = h.signer.address().to_uppercase().replacen("0X", "0x", 1);
        h.cipher.put_message(A, 0, "my own reply");
        let id = h
            .ledger
            .push_message(A, &own, 0, t0() + Duration::seconds(1));

        let report = orch.run_cycle().await;
        assert_eq!(report.fetched, 0);
        assert_eq!(orch.cursor(), Some(&Cursor::After(id)));
        assert!(h.ledger.sent().is_empty());
    }

    #[tokio::test]
    async fn test_messages_before_start_dropped_even_when_late() {
        let h = Harness::new();
        h.join(A);
        let mut orch = h.orchestrator();
        orch.run_cycle().await;

        h.cipher.put_message(A, 0, "stale");
        h.ledger
            .push_message(A, USER, 0, t0() - Duration::milliseconds(1));
        h.ledger.push_message(A, USER, 1, t0());
        h.cipher.put_message(A, 1, "on time");

        let report = orch.run_cycle().await;
        assert_eq!(report.fetched, 1);
        assert_eq!(h.oracle.calls()[0].user_text, "on time");
    }

    #[tokio::test]
    async fn test_tracker_reports_drop_reasons() {
        let h = Harness::new();
        h.join(A);
        let membership = h.membership();
        membership.refresh().await.unwrap();

        h.ledger.push_message(B, USER, 0, t0() + Duration::seconds(1));
        h.ledger
            .push_message(A, h.signer.address(), 0, t0() + Duration::seconds(1));
        h.ledger
            .push_message(A, USER, 1, t0() - Duration::seconds(1));
        h.ledger.push_raw_event(RawEvent {
            id: courier_core::EventId {
                tx_digest: "broken".into(),
                event_seq: WideInt::ZERO,
            },
            event_type: "0xpkg::message::MessageAddedEvent".into(),
            sender: None,
            timestamp_ms: None,
            parsed_json: json!({ "channel_id": A }),
        });
        h.ledger.push_raw_event(RawEvent {
            id: courier_core::EventId {
                tx_digest: "other".into(),
                event_seq: WideInt::ZERO,
            },
            event_type: "0xpkg::channel::ChannelCreatedEvent".into(),
            sender: None,
            timestamp_ms: None,
            parsed_json: json!({}),
        });
        let kept = h.ledger.push_message(A, USER, 2, t0() + Duration::seconds(2));

        let batch = h
            .tracker()
            .fetch(&Cursor::Start, &membership.snapshot())
            .await
            .unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].id, kept);
        assert_eq!(batch.next_cursor, Cursor::After(kept));
        assert_eq!(
            batch.dropped,
            DropCounts {
                other_kind: 1,
                malformed: 1,
                not_member: 1,
                own_message: 1,
                before_start: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_tracker_paginates_in_order() {
        let h = Harness::new();
        h.join(A);
        let membership = h.membership();
        membership.refresh().await.unwrap();
        let ids: Vec<_> = (0..5)
            .map(|i| h.ledger.push_message(A, USER, i, t0() + Duration::seconds(1)))
            .collect();

        let tracker = EventCursorTracker::new(
            Arc::new(h.ledger.clone()),
            "0xpkg",
            "message",
            2,
            h.signer.address(),
            t0(),
        );
        let batch = tracker
            .fetch(&Cursor::Start, &membership.snapshot())
            .await
            .unwrap();
        let got: Vec<_> = batch.events.iter().map(|e| e.id.clone()).collect();
        assert_eq!(got, ids);
        assert_eq!(h.ledger.event_query_cursors().len(), 3);
    }

    /// Serves the mock's events as one page that claims more pages follow
    /// but carries no cursor.
    struct StuckPageLedger {
        inner: MockLedger,
        queries: AtomicUsize,
    }

    #[async_trait]
    impl LedgerClient for StuckPageLedger {
        async fn query_events(
            &self,
            query: &EventQuery,
            cursor: Option<&EventId>,
            limit: u32,
        ) -> courier_core::Result<EventPage> {
            if self.queries.fetch_add(1, Ordering::SeqCst) > 100 {
                panic!("tracker kept asking for the same page");
            }
            let mut page = self.inner.query_events(query, cursor, limit).await?;
            page.next_cursor = None;
            page.has_next_page = true;
            Ok(page)
        }

        async fn owned_objects(
            &self,
            owner: &courier_core::Address,
            struct_type: &str,
            cursor: Option<&str>,
        ) -> courier_core::Result<ObjectPage> {
            self.inner.owned_objects(owner, struct_type, cursor).await
        }

        async fn get_object(&self, id: &courier_core::ObjectId) -> courier_core::Result<ObjectData> {
            self.inner.get_object(id).await
        }

        async fn build_move_call(
            &self,
            sender: &courier_core::Address,
            call: &MoveCall,
            gas_budget: u64,
        ) -> courier_core::Result<Vec<u8>> {
            self.inner.build_move_call(sender, call, gas_budget).await
        }

        async fn execute(&self, tx_bytes: &[u8], signature: &str) -> courier_core::Result<String> {
            self.inner.execute(tx_bytes, signature).await
        }

        async fn wait_for_transaction(
            &self,
            digest: &str,
        ) -> courier_core::Result<TransactionEffects> {
            self.inner.wait_for_transaction(digest).await
        }
    }

    #[tokio::test]
    async fn test_tracker_stops_when_page_has_no_cursor() {
        let h = Harness::new();
        h.join(A);
        let membership = h.membership();
        membership.refresh().await.unwrap();
        h.say(A, 0, "only");

        let ledger = Arc::new(StuckPageLedger {
            inner: h.ledger.clone(),
            queries: AtomicUsize::new(0),
        });
        let tracker = EventCursorTracker::new(
            ledger.clone(),
            "0xpkg",
            "message",
            50,
            h.signer.address(),
            t0(),
        );
        let batch = tracker
            .fetch(&Cursor::Start, &membership.snapshot())
            .await
            .unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.next_cursor, Cursor::Start);
        assert_eq!(ledger.queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_echoes_input_cursor() {
        let h = Harness::new();
        h.join(A);
        let membership = h.membership();
        membership.refresh().await.unwrap();
        let first = h.say(A, 0, "x");
        h.say(A, 1, "y");

        h.ledger.fail_event_queries(1);
        let cursor = Cursor::After(first);
        let batch = h.tracker().events_since(&cursor, &membership.snapshot()).await;
        assert!(batch.events.is_empty());
        assert_eq!(batch.next_cursor, cursor);

        let batch = h.tracker().events_since(&cursor, &membership.snapshot()).await;
        assert_eq!(batch.events.len(), 1);
    }

    #[tokio::test]
    async fn test_membership_gating_and_later_inclusion() {
        let h = Harness::new();
        h.join(A);
        let mut orch = h.orchestrator();
        orch.run_cycle().await;

        // B is not a member yet; A's dispatch fails so the range is refetched.
        h.say(B, 0, "for b");
        h.say(A, 0, "for a");
        h.ledger.fail_send_attempt(0);
        let report = orch.run_cycle().await;
        assert!(report.failed());
        assert_eq!(report.fetched, 1);

        h.join(B);
        let report = orch.run_cycle().await;
        assert!(!report.failed());
        assert_eq!(report.fetched, 2);
        let channels: Vec<String> = h
            .ledger
            .delivered_replies()
            .into_iter()
            .map(|(c, _)| c)
            .collect();
        assert_eq!(channels, vec![B.to_string(), A.to_string()]);
    }

    #[tokio::test]
    async fn test_channel_joined_later_gets_only_new_messages() {
        let h = Harness::new();
        h.join(A);
        let mut orch = h.orchestrator();
        orch.run_cycle().await;

        // Passed by the cursor while B is not a member; never revisited.
        h.say(B, 0, "before joining");
        let report = orch.run_cycle().await;
        assert!(!report.failed());
        assert_eq!(report.fetched, 0);
        assert!(report.advanced());

        h.join(B);
        h.say(B, 1, "after joining");
        let report = orch.run_cycle().await;
        assert!(!report.failed());
        assert_eq!(report.fetched, 1);
        assert_eq!(
            h.ledger.delivered_replies(),
            vec![(B.to_string(), "re: after joining".to_string())]
        );
    }

    // ── Membership cache ───────────────────────────────────────

    #[tokio::test]
    async fn test_membership_refresh_paginates_and_skips_malformed() {
        let h = Harness::new();
        for ch in [A, B, "0xccc"] {
            h.ledger.grant_membership(ch);
        }
        h.ledger.push_malformed_capability();
        let membership = h.membership();

        let channels = membership.refresh().await.unwrap();
        assert_eq!(channels.len(), 3);
        assert!(membership.capability(&"0xccc".to_string()).is_some());
        assert!(membership.snapshot().refreshed_at().is_some());
    }

    #[tokio::test]
    async fn test_membership_failure_keeps_previous_set() {
        let h = Harness::new();
        h.ledger.grant_membership(A);
        let membership = h.membership();
        membership.refresh().await.unwrap();

        h.ledger.grant_membership(B);
        h.ledger.fail_membership_queries(1);
        assert!(membership.refresh().await.is_err());
        assert_eq!(membership.snapshot().len(), 1);

        h.ledger.revoke_membership(A);
        let channels = membership.refresh().await.unwrap();
        assert_eq!(channels.into_iter().collect::<Vec<_>>(), vec![B.to_string()]);
        assert!(!membership.snapshot().contains(&A.to_string()));
    }

    // ── Credentials ────────────────────────────────────────────

    #[tokio::test]
    async fn test_credential_reused_until_renewal_margin() {
        let h = Harness::new();
        let mut manager = h.credential_manager();

        let first = manager.get_or_create().await.unwrap();
        let again = manager.get_or_create().await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(h.authority.issued(), 1);
        assert_eq!(first.owner, *h.signer.address());
        assert!(first.challenge.contains("0xpkg"));

        // 30 min TTL, 60 s margin: still fresh at 28 min.
        h.clock.advance(Duration::minutes(28));
        let still = manager.get_or_create().await.unwrap();
        assert!(Arc::ptr_eq(&first, &still));

        h.clock.advance(Duration::minutes(1) + Duration::seconds(1));
        let renewed = manager.get_or_create().await.unwrap();
        assert_eq!(h.authority.issued(), 2);
        assert!(renewed.expires_at() > first.expires_at());
        assert_eq!(
            manager.store().current().unwrap().session_public_key,
            renewed.session_public_key
        );
    }

    #[tokio::test]
    async fn test_expired_credential_is_refused() {
        let h = Harness::new();
        let mut manager = h.credential_manager();
        let store = manager.store();
        assert!(matches!(store.current(), Err(CourierError::Credential(_))));

        manager.get_or_create().await.unwrap();
        h.clock.advance(Duration::minutes(31));
        h.authority.fail_next(1);
        assert!(manager.get_or_create().await.is_err());
        assert!(matches!(
            store.current(),
            Err(CourierError::CredentialExpired(_))
        ));

        let decoder = MessageDecoder::new(Arc::new(h.cipher.clone()), store);
        h.cipher.put_message(A, 0, "secret");
        assert_eq!(decoder.decrypt(&A.to_string(), WideInt(0)).await, None);
    }

    #[tokio::test]
    async fn test_renewed_credential_reaches_decoder_and_dispatcher() {
        let h = Harness::new();
        h.join(A);
        let mut orch = h.orchestrator();
        orch.run_cycle().await;
        h.say(A, 0, "before renewal");
        orch.run_cycle().await;

        h.clock.advance(Duration::minutes(29) + Duration::seconds(30));
        h.ledger
            .push_message(A, USER, 1, h.clock.now());
        h.cipher.put_message(A, 1, "after renewal");
        let report = orch.run_cycle().await;
        assert_eq!(report.replied, 1);

        let keys = h.cipher.session_keys_seen();
        assert_eq!(keys.len(), 4);
        assert_eq!(&keys[..2], &["session-1", "session-1"]);
        assert_eq!(&keys[2..], &["session-2", "session-2"]);
        assert_eq!(h.authority.issued(), 2);
    }

    #[tokio::test]
    async fn test_authority_failure_aborts_cycle_before_io() {
        let h = Harness::new();
        h.join(A);
        h.authority.fail_next(1);
        let mut orch = h.orchestrator();

        let report = orch.run_cycle().await;
        assert!(report.failed());
        assert_eq!(orch.cursor(), Some(&Cursor::Start));
        assert!(orch.membership().snapshot().is_empty());
        assert!(h.ledger.event_query_cursors().is_empty());

        assert!(!orch.run_cycle().await.failed());
    }

    #[tokio::test]
    async fn test_message_during_failed_first_cycle_is_answered() {
        let h = Harness::new();
        h.join(A);
        h.ledger.push_message(A, USER, 0, t0() - Duration::minutes(5));
        h.cipher.put_message(A, 0, "old");
        h.authority.fail_next(1);
        let mut orch = h.orchestrator();

        assert!(orch.run_cycle().await.failed());
        let fresh = h.say(A, 1, "while retrying");

        let report = orch.run_cycle().await;
        assert!(!report.failed());
        assert_eq!(report.fetched, 1);
        assert_eq!(orch.cursor(), Some(&Cursor::After(fresh)));
        assert_eq!(
            h.ledger.delivered_replies(),
            vec![(A.to_string(), "re: while retrying".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unreadable_head_starts_from_beginning() {
        let h = Harness::new();
        h.join(A);
        h.ledger.push_message(A, USER, 0, t0() - Duration::minutes(5));
        h.cipher.put_message(A, 0, "old");
        h.ledger.fail_event_queries(1);
        let mut orch = h.orchestrator();

        let report = orch.run_cycle().await;
        assert!(!report.failed());
        assert_eq!(report.cursor_before, Some(Cursor::Start));
        assert_eq!(report.fetched, 0);

        h.say(A, 1, "new");
        let report = orch.run_cycle().await;
        assert_eq!(report.replied, 1);
        assert_eq!(
            h.ledger.delivered_replies(),
            vec![(A.to_string(), "re: new".to_string())]
        );
    }

    // ── Dispatcher ─────────────────────────────────────────────

    async fn dispatcher(h: &Harness) -> ReplyDispatcher {
        let mut manager = h.credential_manager();
        manager.get_or_create().await.unwrap();
        let membership = h.membership();
        membership.refresh().await.unwrap();
        ReplyDispatcher::new(
            Arc::new(h.ledger.clone()),
            Arc::new(h.cipher.clone()),
            h.signer.clone(),
            manager.store(),
            membership,
            "0xpkg",
            1_000,
        )
    }

    #[tokio::test]
    async fn test_send_requires_membership() {
        let h = Harness::new();
        let d = dispatcher(&h).await;
        let err = d.send(&A.to_string(), "hi").await.unwrap_err();
        assert!(matches!(err, CourierError::NotMember(_)));
    }

    #[tokio::test]
    async fn test_send_requires_channel_key() {
        let h = Harness::new();
        h.ledger.grant_membership(A);
        let d = dispatcher(&h).await;
        let err = d.send(&A.to_string(), "hi").await.unwrap_err();
        assert!(matches!(err, CourierError::NoEncryptionKey(_)));
        assert!(h.ledger.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_reports_failed_execution() {
        let h = Harness::new();
        h.join(A);
        h.ledger.fail_send_attempt(0);
        let d = dispatcher(&h).await;
        let err = d.send(&A.to_string(), "hi").await.unwrap_err();
        assert!(matches!(err, CourierError::SendFailed { .. }));
    }

    #[tokio::test]
    async fn test_send_uses_latest_key_version() {
        let h = Harness::new();
        h.join(A);
        let d = dispatcher(&h).await;
        let first = d.send(&A.to_string(), "one").await.unwrap();
        assert_eq!(first.key_version, WideInt(1));

        h.ledger.set_channel_key(A, &[8, 8], 2);
        let second = d.send(&A.to_string(), "two").await.unwrap();
        assert_eq!(second.key_version, WideInt(2));
        assert_ne!(first.digest, second.digest);

        let sent = h.ledger.sent();
        assert_eq!(sent[1].call.arguments[4], "2");
        assert_eq!(sent[1].sender, *h.signer.address());
    }

    // ── Loop control and status ────────────────────────────────

    #[tokio::test]
    async fn test_run_stops_on_cancel_after_cycle() {
        let h = Harness::new();
        h.join(A);
        let orch = h.orchestrator();
        let status = orch.status();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(orch.run(cancel.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        let snap = status.snapshot();
        assert_eq!(snap.state, CycleState::Stopped);
        assert!(snap.cycles_completed >= 1);
        assert_eq!(snap.member_channels, 1);
    }

    #[tokio::test]
    async fn test_status_tracks_progress_and_errors() {
        let h = Harness::new();
        h.join(A);
        let mut orch = h.orchestrator();
        let status = orch.status();
        orch.run_cycle().await;
        h.say(A, 0, "hi");
        orch.run_cycle().await;

        h.ledger.fail_event_queries(1);
        orch.run_cycle().await;

        let snap = status.snapshot();
        assert_eq!(snap.cycles_completed, 2);
        assert_eq!(snap.cycles_failed, 1);
        assert_eq!(snap.replies_sent, 1);
        assert_eq!(snap.active_conversations, 1);
        assert!(snap.last_error.is_some());
        assert!(snap.credential_expires_at.is_some());
        assert_eq!(snap.address, *h.signer.address());
    }
}
