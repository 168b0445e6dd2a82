use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use seatplan::config::{EnvSettings, Settings};
use seatplan::engine::{Availability, EngineError, SlotCriteria, TableSuggestion};
use seatplan::model::SlotStatus;
use seatplan::store::InMemoryStore;

// ── Test infrastructure ──────────────────────────────────────

const HALL: &str = "01HQ0000000000000000000001";
const TERRACE: &str = "01HQ0000000000000000000002";
const T1: &str = "01HQ0000000000000000000011";
const T2: &str = "01HQ0000000000000000000012";
const T3: &str = "01HQ0000000000000000000013";

fn snapshot() -> String {
    json!({
        "rooms": [
            {"id": HALL, "name": "Hall", "capacity": 12, "display_order": 0},
            {"id": TERRACE, "name": "Terrace", "capacity": 8, "display_order": 1, "location_id": "garden"}
        ],
        "tables": [
            {"id": T1, "room_id": HALL, "name": "H1", "seats_max": 2, "display_order": 0},
            {"id": T2, "room_id": HALL, "name": "H2", "seats_max": 4, "display_order": 1, "join_group": "long"},
            {"id": T3, "room_id": HALL, "name": "H3", "seats_max": 4, "display_order": 2, "join_group": "long"}
        ],
        "reservations": [
            {"id": "01HQ0000000000000000000101", "date": "2026-05-15", "time": "19:00",
             "party": 4, "status": "confirmed", "table_id": T2},
            {"id": "01HQ0000000000000000000102", "date": "2026-05-15", "time": "19:00:00",
             "party": 4, "status": "pending", "room_id": HALL},
            {"id": "01HQ0000000000000000000103", "date": "2026-05-15", "time": "20:00",
             "party": 8, "status": "no_show", "room_id": TERRACE}
        ],
        "closures": [
            {"id": "01HQ0000000000000000000201", "scope": "room", "room_id": TERRACE,
             "start": "2026-05-16 00:00", "end": "2026-05-17 00:00", "label": "rain"}
        ]
    })
    .to_string()
}

fn settings() -> HashMap<String, String> {
    HashMap::from([
        ("service_hours".to_string(), "fri=18:00-22:00\nsat=18:00-22:00".to_string()),
        ("slot_interval".to_string(), "60".to_string()),
        ("turnover".to_string(), "90".to_string()),
        (
            "meals".to_string(),
            r#"[{"key": "dinner", "label": "Dinner", "start": "18:00", "end": "22:00"}]"#.to_string(),
        ),
    ])
}

fn engine() -> Availability {
    let store = Arc::new(InMemoryStore::from_json(&snapshot()).unwrap());
    Availability::from_settings(store, &settings()).unwrap()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn slots_over_a_loaded_snapshot() {
    let resp = engine().find_slots(&SlotCriteria::new("2026-05-15", 2)).await.unwrap();
    let value = serde_json::to_value(&resp).unwrap();

    let times: Vec<&str> = value["slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["time"].as_str().unwrap())
        .collect();
    assert_eq!(times, vec!["18:00", "19:00", "20:00", "21:00"]);

    // 20 seats, 8 held around 19:00; the no-show holds nothing.
    assert_eq!(value["slots"][1]["capacity"], json!({"ceiling": 20, "consumed": 8, "remaining": 12}));
    assert_eq!(value["slots"][1]["status"], "available");
    assert_eq!(value["meta"]["has_availability"], true);
    assert!(value["slots"][0].get("tables").is_none());
}

#[tokio::test]
async fn hall_fills_before_terrace() {
    let engine = engine();
    let hall = engine
        .find_slots(&SlotCriteria::new("2026-05-15", 5).room(HALL))
        .await
        .unwrap();
    let seven = &hall.slots[1];
    assert_eq!(seven.time, "19:00");
    assert_eq!(seven.status, SlotStatus::Full);

    let garden = engine
        .find_slots(&SlotCriteria::new("2026-05-15", 4).location("garden"))
        .await
        .unwrap();
    // Untagged Hall serves every location, and its untagged bookings still hold seats.
    assert_eq!(garden.slots[1].capacity.ceiling, 20);
    assert_eq!(garden.slots[1].capacity.consumed, 8);
}

#[tokio::test]
async fn closed_terrace_blocks_its_own_slots_only() {
    let engine = engine();
    let terrace = engine
        .find_slots(&SlotCriteria::new("2026-05-16", 2).room(TERRACE))
        .await
        .unwrap();
    assert!(terrace.slots.iter().all(|s| s.status == SlotStatus::Blocked));
    assert_eq!(terrace.slots[0].reasons, vec!["room Terrace closed: rain".to_string()]);
    assert!(!terrace.meta.has_availability);

    let whole = engine.find_slots(&SlotCriteria::new("2026-05-16", 2)).await.unwrap();
    assert!(whole.meta.has_availability);
    assert_eq!(whole.slots[0].capacity.ceiling, 12);
}

#[tokio::test]
async fn table_suggestions_skip_held_tables() {
    let engine = engine();
    let resp = engine
        .find_slots(&SlotCriteria::new("2026-05-15", 3).room(HALL).assign_tables())
        .await
        .unwrap();
    let at = |time: &str| resp.slots.iter().find(|s| s.time == time).unwrap();

    match &at("21:00").tables {
        Some(TableSuggestion::Single { table }) => assert_eq!(table.name, "H2"),
        other => panic!("unexpected {other:?}"),
    }
    // H2 is held from 19:00 to 20:30; H3 is the only 4-top left.
    match &at("19:00").tables {
        Some(TableSuggestion::Single { table }) => assert_eq!(table.name, "H3"),
        other => panic!("unexpected {other:?}"),
    }

    let joined = engine
        .suggest_tables(&SlotCriteria::new("2026-05-15", 7), "21:00")
        .await
        .unwrap();
    assert!(matches!(joined, TableSuggestion::Joined { ref join_group, .. } if join_group == "long"));
}

#[test]
fn days_for_all_meals() {
    let days = tokio_test::block_on(engine().find_available_days_for_all_meals("2026-05-14", "2026-05-16"))
        .unwrap();
    let value = serde_json::to_value(&days).unwrap();
    assert_eq!(
        value,
        json!({
            "2026-05-14": {"dinner": false},
            "2026-05-15": {"dinner": true},
            "2026-05-16": {"dinner": true}
        })
    );
}

#[tokio::test]
async fn criteria_from_widget_json() {
    let criteria: SlotCriteria =
        serde_json::from_value(json!({"date": "2026-05-15", "party": 2, "meal": "dinner"})).unwrap();
    let resp = engine().find_slots(&criteria).await.unwrap();
    assert_eq!(resp.slots.len(), 4);

    let criteria: SlotCriteria = serde_json::from_value(json!({"date": "2026-05-15"})).unwrap();
    let err = engine().find_slots(&criteria).await.unwrap_err();
    assert!(err.is_client_error());
    assert!(matches!(err, EngineError::Validation { field: "party", .. }));
}

#[test]
fn broken_snapshot_is_a_data_error() {
    let err = InMemoryStore::from_json("{\"rooms\": 3}").err().unwrap();
    assert!(matches!(err, EngineError::DataAccess(_)));
}

#[test]
fn file_settings_layer_over_environment() {
    let file = HashMap::from([("slot_interval".to_string(), "20".to_string())]);
    let layered = (file, EnvSettings::new("SEATPLAN_TEST_UNSET_"));
    assert_eq!(layered.get("slot_interval").as_deref(), Some("20"));
    assert_eq!(layered.get("turnover"), None);
}
