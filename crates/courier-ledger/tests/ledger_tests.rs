#[cfg(test)]
mod tests {
    use chrono::Utc;
    use courier_core::{Credential, EncryptionKeyRef, WideInt};
    use courier_ledger::mock::{MockAuthority, MockCipher, MockLedger};
    use courier_ledger::schema::{parse_encryption_key, parse_member_cap, parse_message_event};
    use courier_ledger::transaction::{CLOCK_OBJECT_ID, bytes_arg};
    use courier_ledger::*;
    use serde_json::json;

    fn query(descending: bool) -> EventQuery {
        EventQuery {
            package: "0xpkg".into(),
            module: "message".into(),
            descending,
        }
    }

    fn credential() -> Credential {
        Credential {
            owner: "0xagent".into(),
            scope: "0xpkg".into(),
            issued_at: Utc::now(),
            ttl_secs: 1800,
            session_public_key: "session-1".into(),
            challenge: "challenge".into(),
            signature: "sig".into(),
        }
    }

    #[tokio::test]
    async fn test_event_pages_resume_after_cursor() {
        let ledger = MockLedger::new();
        let now = Utc::now();
        let first = ledger.push_message("0xa", "0xu", 0, now);
        let second = ledger.push_message("0xa", "0xu", 1, now);
        let third = ledger.push_message("0xb", "0xu", 0, now);

        let page = ledger.query_events(&query(false), None, 2).await.unwrap();
        assert_eq!(page.data.len(), 2);
        assert!(page.has_next_page);
        assert_eq!(page.next_cursor.as_ref(), Some(&second));

        let page = ledger
            .query_events(&query(false), page.next_cursor.as_ref(), 2)
            .await
            .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, third);
        assert!(!page.has_next_page);

        let newest = ledger.query_events(&query(true), None, 1).await.unwrap();
        assert_eq!(newest.data[0].id, third);
        assert_ne!(newest.data[0].id, first);
    }

    #[tokio::test]
    async fn test_empty_page_echoes_cursor() {
        let ledger = MockLedger::new();
        let id = ledger.push_message("0xa", "0xu", 0, Utc::now());
        let page = ledger
            .query_events(&query(false), Some(&id), 50)
            .await
            .unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.next_cursor, Some(id));
    }

    #[tokio::test]
    async fn test_injected_event_failure_is_transport() {
        let ledger = MockLedger::new();
        ledger.fail_event_queries(1);
        let err = ledger.query_events(&query(false), None, 10).await.unwrap_err();
        assert!(err.is_transient());
        assert!(ledger.query_events(&query(false), None, 10).await.is_ok());
    }

    #[tokio::test]
    async fn test_owned_objects_paginate_and_parse() {
        let ledger = MockLedger::new();
        for ch in ["0xa", "0xb", "0xc"] {
            ledger.grant_membership(ch);
        }
        let cap_type = "0xpkg::channel::MemberCap";

        let first = ledger
            .owned_objects(&"0xagent".into(), cap_type, None)
            .await
            .unwrap();
        assert_eq!(first.data.len(), 2);
        assert!(first.has_next_page);

        let second = ledger
            .owned_objects(&"0xagent".into(), cap_type, first.next_cursor.as_deref())
            .await
            .unwrap();
        assert_eq!(second.data.len(), 1);
        assert!(!second.has_next_page);

        let cap = parse_member_cap(&second.data[0]).unwrap();
        assert_eq!(cap.channel_id, "0xc");
    }

    #[tokio::test]
    async fn test_channel_key_read_through_schema() {
        let ledger = MockLedger::new();
        ledger.set_channel_key("0xa", &[9, 9, 9], 3);
        let obj = ledger.get_object(&"0xa".into()).await.unwrap();
        let key = parse_encryption_key(&"0xa".into(), &obj).unwrap();
        assert_eq!(key.encrypted_key, vec![9, 9, 9]);
        assert_eq!(key.key_version, WideInt(3));

        assert!(ledger.get_object(&"0xmissing".into()).await.is_err());
    }

    #[tokio::test]
    async fn test_signed_send_and_finality() {
        let ledger = MockLedger::new();
        let signer = Ed25519Signer::from_seed(&[1u8; 32]).unwrap();
        let call = MoveCall {
            package: "0xpkg".into(),
            module: "api".into(),
            function: "send_message".into(),
            type_arguments: vec![],
            arguments: vec![
                json!("0xa"),
                json!("0xcap1"),
                bytes_arg(b"sealed:hi"),
                bytes_arg(&[0; 12]),
                json!("1"),
                json!(CLOCK_OBJECT_ID),
            ],
        };
        assert_eq!(call.target(), "0xpkg::api::send_message");

        let bytes = ledger
            .build_move_call(signer.address(), &call, 1000)
            .await
            .unwrap();
        let sig = signer.sign_transaction(&bytes).unwrap();
        let digest = ledger.execute(&bytes, &sig).await.unwrap();
        let effects = ledger.wait_for_transaction(&digest).await.unwrap();
        assert!(effects.success);

        ledger.fail_send_attempt(1);
        let digest = ledger.execute(&bytes, &sig).await.unwrap();
        let effects = ledger.wait_for_transaction(&digest).await.unwrap();
        assert!(!effects.success);
        assert_eq!(effects.status, "failure");

        assert_eq!(ledger.sent().len(), 2);
        assert_eq!(
            ledger.delivered_replies(),
            vec![("0xa".to_string(), "hi".to_string())]
        );
    }

    #[tokio::test]
    async fn test_mock_cipher_roundtrip_and_failures() {
        let cipher = MockCipher::new();
        cipher.put_message("0xa", 4, "hello");
        let cred = credential();

        let text = cipher.decrypt(&cred, &"0xa".into(), WideInt(4)).await.unwrap();
        assert_eq!(text, "hello");
        assert!(cipher.decrypt(&cred, &"0xa".into(), WideInt(5)).await.is_err());

        let key = EncryptionKeyRef {
            channel_id: "0xa".into(),
            encrypted_key: vec![1],
            key_version: WideInt(2),
        };
        let env = cipher.encrypt(&cred, &key, "reply").await.unwrap();
        assert_eq!(MockCipher::open(&env.ciphertext).as_deref(), Some("reply"));
        assert_eq!(env.key_version, WideInt(2));

        cipher.fail_encrypt(true);
        assert!(cipher.encrypt(&cred, &key, "reply").await.is_err());
        assert_eq!(cipher.session_keys_seen().len(), 4);
    }

    #[tokio::test]
    async fn test_mock_authority_counts_and_fails() {
        let authority = MockAuthority::new();
        let request = ChallengeRequest {
            address: "0xagent".into(),
            scope: "0xpkg".into(),
            ttl_minutes: 30,
            requested_at: Utc::now(),
        };
        authority.fail_next(1);
        assert!(authority.request_challenge(&request).await.is_err());
        let challenge = authority.request_challenge(&request).await.unwrap();
        assert_eq!(challenge.session_public_key, "session-1");
        assert_eq!(authority.issued(), 1);
    }

    #[test]
    fn test_raw_event_deserializes_from_rpc_shape() {
        let raw: RawEvent = serde_json::from_value(json!({
            "id": { "txDigest": "Abc", "eventSeq": "0" },
            "packageId": "0xpkg",
            "transactionModule": "api",
            "sender": "0xu",
            "type": "0xpkg::message::MessageAddedEvent",
            "parsedJson": {
                "channel_id": "0xa",
                "sender": "0xu",
                "message_index": "12",
                "key_version": "1"
            },
            "timestampMs": "1700000000000"
        }))
        .unwrap();
        let ev = parse_message_event(&raw).unwrap();
        assert_eq!(ev.message_index, WideInt(12));
        assert_eq!(ev.id.tx_digest, "Abc");
    }
}
