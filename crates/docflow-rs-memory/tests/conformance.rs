//! Contract tests run against every bundled backend.

use chrono::Duration;
use docflow_rs_memory::{
    EntryId, ManualClock, MemoryBackend, MemoryEntry, SearchCriteria, SharedMemory,
};
use docflow_rs_test_utils::{backend_matrix, values};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn memories() -> Vec<(SharedMemory, Arc<ManualClock>)> {
    backend_matrix()
        .into_iter()
        .map(|backend| {
            let clock = Arc::new(ManualClock::default());
            (SharedMemory::with_clock(backend, clock.clone()), clock)
        })
        .collect()
}

fn store_scenario(memory: &SharedMemory, clock: &ManualClock) -> Vec<EntryId> {
    let steps = [
        ("agent1", "type1", json!({"k": "v1"})),
        ("agent2", "type2", json!({"k": "v2"})),
        ("agent1", "type2", json!({"k": "v3"})),
    ];
    steps
        .into_iter()
        .map(|(source, kind, payload)| {
            clock.advance(Duration::milliseconds(10));
            memory
                .store(source, kind, Some(values(payload)), None, None)
                .expect("store")
        })
        .collect()
}

fn payloads(entries: &[MemoryEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| entry.extracted_values()["k"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn stored_entries_round_trip() {
    for (memory, clock) in memories() {
        let payload = values(json!({
            "sender": "billing@example.com",
            "fields": {"total": 41.5, "lines": [1, 2, 3], "approved": null}
        }));
        let id = memory
            .store(
                "email_agent",
                "email_processed",
                Some(payload.clone()),
                Some("run-9"),
                Some("conv-3"),
            )
            .expect("store");
        let entry = memory.retrieve(&id).expect("retrieve").expect("entry");
        assert_eq!(entry.id(), id, "backend {}", memory.backend_name());
        assert_eq!(entry.source(), "email_agent");
        assert_eq!(entry.kind(), "email_processed");
        assert_eq!(entry.timestamp(), clock.current());
        assert_eq!(entry.thread_id(), Some("run-9"));
        assert_eq!(entry.conversation_id(), Some("conv-3"));
        assert_eq!(entry.extracted_values(), &payload);
    }
}

#[test]
fn missing_payload_defaults_to_empty_map() {
    for (memory, _) in memories() {
        let id = memory.store("classifier", "classified", None, None, None).expect("store");
        let entry = memory.retrieve(&id).expect("retrieve").expect("entry");
        assert!(entry.extracted_values().is_empty(), "backend {}", memory.backend_name());
        assert_eq!(entry.thread_id(), None);
        assert_eq!(entry.conversation_id(), None);
    }
}

#[test]
fn unknown_identifier_is_not_found() {
    for (memory, _) in memories() {
        let found = memory
            .retrieve(&EntryId::from("nonexistent_id"))
            .expect("retrieve");
        assert_eq!(found, None, "backend {}", memory.backend_name());
    }
}

#[test]
fn empty_criteria_return_everything_in_insertion_order() {
    for (memory, clock) in memories() {
        assert!(memory.search(&SearchCriteria::new()).expect("search").is_empty());
        let ids = store_scenario(&memory, &clock);
        let all = memory.search(&SearchCriteria::new()).expect("search");
        let found: Vec<EntryId> = all.iter().map(MemoryEntry::id).collect();
        assert_eq!(found, ids, "backend {}", memory.backend_name());
    }
}

#[test]
fn scenario_filters_by_source_and_type() {
    for (memory, clock) in memories() {
        store_scenario(&memory, &clock);
        let name = memory.backend_name();

        let by_source = memory.search(&SearchCriteria::new().source("agent1")).expect("search");
        assert_eq!(payloads(&by_source), vec!["v1", "v3"], "backend {name}");

        let by_type = memory.search(&SearchCriteria::new().kind("type2")).expect("search");
        assert_eq!(payloads(&by_type), vec!["v2", "v3"], "backend {name}");

        let both = memory
            .search(&SearchCriteria::new().source("agent1").kind("type2"))
            .expect("search");
        assert_eq!(payloads(&both), vec!["v3"], "backend {name}");

        let none = memory.search(&SearchCriteria::new().source("agent3")).expect("search");
        assert!(none.is_empty(), "backend {name}");
    }
}

#[test]
fn backends_agree_on_every_filter() {
    let memories = memories();
    let mut results: Vec<Vec<Vec<MemoryEntry>>> = Vec::new();
    for (memory, clock) in &memories {
        let start = clock.current();
        let runs = [
            ("email_agent", "email_processed", Some("run-1"), None),
            ("classifier", "classified", Some("run-1"), Some("conv-1")),
            ("json_agent", "json_processed", Some("run-2"), Some("conv-1")),
            ("email_agent", "classified", None, Some("conv-2")),
        ];
        for (source, kind, thread, conversation) in runs {
            clock.advance(Duration::seconds(1));
            memory.store(source, kind, None, thread, conversation).expect("store");
        }
        let criteria = [
            SearchCriteria::new(),
            SearchCriteria::new().source("email_agent"),
            SearchCriteria::new().kind("classified"),
            SearchCriteria::new().thread_id("run-1"),
            SearchCriteria::new().conversation_id("conv-1"),
            SearchCriteria::new().start_time(start + Duration::seconds(2)),
            SearchCriteria::new().end_time(start + Duration::seconds(2)),
            SearchCriteria::new()
                .start_time(start + Duration::seconds(2))
                .end_time(start + Duration::seconds(3)),
            SearchCriteria::new().source("email_agent").conversation_id("conv-2"),
        ];
        results.push(
            criteria
                .iter()
                .map(|criteria| memory.search(criteria).expect("search"))
                .collect(),
        );
    }
    let expected_counts = vec![4, 2, 2, 2, 2, 3, 2, 2, 1];
    for backend_results in &results {
        let counts: Vec<usize> = backend_results.iter().map(Vec::len).collect();
        assert_eq!(counts, expected_counts);
        assert_eq!(backend_results, &results[0]);
    }
}

#[test]
fn same_instant_entries_come_back_in_store_order() {
    for (memory, _) in memories() {
        for source in ["b", "a", "c"] {
            memory.store(source, "step", None, None, None).expect("store");
        }
        let found = memory.search(&SearchCriteria::new()).expect("search");
        let sources: Vec<&str> = found.iter().map(MemoryEntry::source).collect();
        assert_eq!(sources, vec!["b", "a", "c"], "backend {}", memory.backend_name());
    }
}

#[test]
fn same_source_within_one_tick_collides() {
    for (memory, _) in memories() {
        let first = memory
            .store("agent1", "type1", Some(values(json!({"k": "first"}))), Some("run-1"), None)
            .expect("store");
        let second = memory
            .store("agent1", "type2", Some(values(json!({"k": "second"}))), None, None)
            .expect("store");
        let other = memory.store("agent2", "type1", None, None, None).expect("store");
        let name = memory.backend_name();

        assert_eq!(first, second, "backend {name}");
        assert_ne!(first, other, "backend {name}");
        let entry = memory.retrieve(&first).expect("retrieve").expect("entry");
        assert_eq!(entry.kind(), "type2", "backend {name}");
        assert_eq!(entry.thread_id(), None, "backend {name}");
        assert_eq!(entry.extracted_values()["k"], json!("second"), "backend {name}");

        let all = memory.search(&SearchCriteria::new()).expect("search");
        assert_eq!(all.len(), 2, "backend {name}");
    }
}

#[test]
fn backends_accept_entries_built_outside_the_facade() {
    let clock = ManualClock::default();
    let entry = MemoryEntry::draft("json_agent", "json_processed")
        .thread_id("run-4")
        .extracted_values(values(json!({"schema": "invoice"})))
        .stamp(&clock)
        .expect("entry");
    for backend in backend_matrix() {
        let id = backend.store(&entry).expect("store");
        assert_eq!(id, entry.id());
        assert_eq!(backend.retrieve(&id).expect("retrieve"), Some(entry.clone()));
        let outcome = backend.search_partial(&SearchCriteria::new()).expect("search");
        assert!(!outcome.is_partial(), "backend {}", backend.name());
        assert_eq!(outcome.entries, vec![entry.clone()]);
    }
}
