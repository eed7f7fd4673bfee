// Wire mapping of the AgriConnect HTTP API

use agri_client::wire::{
    create_outcome, endpoint_url, error_detail, list_query, parse_recommend, parse_rows,
    send_outcome, transition_outcome, CreateBody, ListScope,
};
use agri_client::HttpBackend;
use agri_deals::{
    ChatMessage, CreateOutcome, DealsConfig, DealsError, NewTradeRequest, RequestFilter,
    RequestId, RequestStatus, SendOutcome, TradeRequest, TransitionOutcome,
};
use serde_json::json;
use std::time::Duration;

#[test]
fn test_endpoint_url_collapses_slashes() {
    assert_eq!(
        endpoint_url("http://127.0.0.1:5000//api", "/requests"),
        "http://127.0.0.1:5000/api/requests"
    );
    assert_eq!(
        endpoint_url("http://127.0.0.1:5000/api/", "chat/history"),
        "http://127.0.0.1:5000/api/chat/history"
    );
    assert_eq!(
        endpoint_url("https://agri.example.org", "health"),
        "https://agri.example.org/health"
    );
    assert_eq!(endpoint_url("http://localhost:5000/api/", ""), "http://localhost:5000/api");
}

#[test]
fn test_backend_normalizes_base_url() {
    let config = DealsConfig {
        api_base_url: "http://127.0.0.1:5000//api/".into(),
        ..Default::default()
    };
    let backend = HttpBackend::new(&config).expect("Failed to build backend");
    assert_eq!(backend.base_url(), "http://127.0.0.1:5000/api");
}

#[test]
fn test_backend_rejects_invalid_config() {
    let config = DealsConfig {
        chat_poll_interval: Duration::ZERO,
        ..Default::default()
    };
    assert!(matches!(
        HttpBackend::new(&config),
        Err(DealsError::Validation(_))
    ));
}

#[test]
fn test_create_body_shape() {
    let request = NewTradeRequest {
        farmer_id: "F001".into(),
        farmer_name: "Asha".into(),
        seller_id: "GV01".into(),
        seller_name: String::new(),
        crop: "Rice".into(),
        region: "West".into(),
        price: 2000,
    };

    let body = serde_json::to_value(CreateBody::from(&request)).unwrap();
    assert_eq!(
        body,
        json!({
            "farmer_id": "F001",
            "farmer_name": "Asha",
            "crop": "Rice",
            "region": "West",
            "price": 2000,
            "seller_id": "GV01"
        })
    );
}

#[test]
fn test_list_query_uses_participants_only() {
    let filter = RequestFilter::for_seller(" GV01 ").with_status(RequestStatus::Pending);
    assert_eq!(
        list_query(&filter, ListScope::Participant),
        vec![("seller_id", "GV01".to_string())]
    );
    assert!(list_query(&RequestFilter::default(), ListScope::Participant).is_empty());
}

#[test]
fn test_list_scope_all_leaves_matching_local() {
    let filter = RequestFilter::for_seller("GV01");
    assert!(list_query(&filter, ListScope::All).is_empty());

    // Rows the service would drop for the case mismatch still match here
    let rows: Vec<TradeRequest> = parse_rows(
        json!([
            {"id": "a", "timestamp": "2025-01-12 09:30:00", "farmer_id": "F001",
             "seller_id": "gv01", "status": "pending"},
            {"id": "b", "timestamp": "2025-01-12 09:31:00", "farmer_id": "F001",
             "seller_id": "HG02", "status": "pending"}
        ]),
        "request",
    )
    .unwrap();
    let mine: Vec<&str> = rows
        .iter()
        .filter(|r| filter.matches(r))
        .map(|r| r.id.0.as_str())
        .collect();
    assert_eq!(mine, vec!["a"]);

    let backend = HttpBackend::new(&DealsConfig::default())
        .unwrap()
        .with_list_scope(ListScope::All);
    assert_eq!(backend.list_scope(), ListScope::All);
}

#[test]
fn test_create_ack_and_record() {
    let outcome = create_outcome(json!({"ok": true, "request_id": "8d1f"})).unwrap();
    assert_eq!(
        outcome,
        CreateOutcome::Acknowledged {
            request_id: Some(RequestId::from("8d1f"))
        }
    );

    let outcome = create_outcome(json!({"ok": true})).unwrap();
    assert_eq!(outcome, CreateOutcome::Acknowledged { request_id: None });

    let outcome = create_outcome(json!({
        "id": "8d1f",
        "timestamp": "2025-01-12 09:30:00",
        "farmer_id": "F001",
        "farmer_name": "Asha",
        "crop": "Rice",
        "region": "West",
        "price": 2000,
        "seller_id": "GV01",
        "status": "pending"
    }))
    .unwrap();
    assert!(matches!(outcome, CreateOutcome::Created(r) if r.status == RequestStatus::Pending));

    let err = create_outcome(json!({"ok": false, "error": "Missing required fields"})).unwrap_err();
    assert!(matches!(err, DealsError::Transport(m) if m.contains("Missing required fields")));
}

#[test]
fn test_transition_ack_carries_tx_hash() {
    let outcome = transition_outcome(json!({"ok": true, "tx_hash": "0xabc"})).unwrap();
    assert_eq!(
        outcome,
        TransitionOutcome::Acknowledged {
            tx_hash: Some("0xabc".into())
        }
    );

    let outcome = transition_outcome(json!({"ok": true, "tx_hash": null})).unwrap();
    assert_eq!(outcome, TransitionOutcome::Acknowledged { tx_hash: None });
}

#[test]
fn test_send_outcome_with_and_without_echo() {
    let outcome = send_outcome(json!({
        "ok": true,
        "msg": {
            "id": "m-1",
            "timestamp": "2025-01-12 09:31:00",
            "sender": "F001",
            "receiver": "GV01",
            "text": "Hello",
            "room": "f001_gv01"
        }
    }))
    .unwrap();
    let stored = outcome.message().expect("expected persisted message");
    assert_eq!(stored.room, "f001_gv01");
    assert_eq!(stored.text, "Hello");

    assert_eq!(send_outcome(json!({"ok": true})).unwrap(), SendOutcome::Acknowledged);
}

#[test]
fn test_recommend_accepts_encoded_string() {
    let rows = json!([
        {"FPC_Name": "Green Valley", "District": "Jalpaiguri", "Commodities": "Rice",
         "Email": "gv@example.org", "Contact_Phone": 9876543210u64, "match_score": 71.5},
        {"FPC_Name": "Hill Growers", "District": "Darjeeling", "Commodities": "Tea",
         "Email": null, "Contact_Phone": null, "match_score": 12.0, "fpc_id": "HG02"}
    ]);

    let direct = parse_recommend(rows.clone()).unwrap();
    let encoded = parse_recommend(json!(rows.to_string())).unwrap();
    assert_eq!(direct, encoded);
    assert_eq!(direct.len(), 2);
    assert_eq!(direct[0].contact_phone, "9876543210");
    assert_eq!(direct[0].identity_key(), None);
    assert_eq!(direct[1].identity_key(), Some("HG02"));

    assert!(parse_recommend(json!(null)).unwrap().is_empty());
}

#[test]
fn test_parse_rows_skips_malformed() {
    let value = json!([
        {"id": "a", "timestamp": "2025-01-12 09:30:00", "farmer_id": "F001",
         "seller_id": "GV01", "status": "accepted"},
        {"id": "b", "timestamp": "not a time", "status": "accepted"},
        {"id": "c", "timestamp": "2025-01-12T10:00:00Z", "farmer_id": "F001",
         "fpc_id": "GV01", "status": "pending", "price": "1500"}
    ]);

    let rows: Vec<TradeRequest> = parse_rows(value, "request").unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r.id.0.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert_eq!(rows[1].seller_id, "GV01");
    assert_eq!(rows[1].price, 1500);

    // A row naming the seller under both keys is kept
    let both: Vec<TradeRequest> = parse_rows(
        json!([{"id": "d", "timestamp": "2025-01-12 11:00:00", "farmer_id": "F001",
                "seller_id": "GV01", "fpc_id": "GV01", "status": "accepted"}]),
        "request",
    )
    .unwrap();
    assert_eq!(both.len(), 1);
    assert_eq!(both[0].seller_id, "GV01");

    let err = parse_rows::<ChatMessage>(json!({"ok": false}), "chat message").unwrap_err();
    assert!(matches!(err, DealsError::Transport(_)));
}

#[test]
fn test_error_detail() {
    assert_eq!(error_detail(r#"{"ok": false, "error": "room required"}"#), "room required");
    assert_eq!(error_detail("  Internal Server Error "), "Internal Server Error");

    let long = "x".repeat(1000);
    assert_eq!(error_detail(&long).len(), 303);
}
