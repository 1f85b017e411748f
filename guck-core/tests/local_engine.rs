//! Query engine over the local JSONL store

use guck_core::time::format_iso_ms;
use guck_core::{
    build_backends, EmitContext, EnvSnapshot, Event, EventInput, GroupBy, GuckConfig, JsonlStore,
    QueryEngine, SearchParams, SessionsParams, StatsParams,
};
use serde_json::{json, Value};
use tempfile::TempDir;

const NOW: i64 = 1_767_268_800_000; // 2026-01-01T12:00:00Z

fn event_at(store: &JsonlStore, ctx: &EmitContext, offset_ms: i64, level: &str, message: &str) -> Event {
    let mut input = EventInput::message(message).with_level(level);
    input.ts = Some(format_iso_ms(NOW - offset_ms));
    let event = input.normalize(ctx);
    store.append(&event).unwrap();
    event
}

fn engine(dir: &TempDir, config: GuckConfig) -> QueryEngine {
    let backends = build_backends(&config, dir.path(), &EnvSnapshot::default());
    QueryEngine::new(config, dir.path(), backends).with_fixed_now(NOW)
}

fn search(since: &str) -> SearchParams {
    SearchParams {
        since: Some(since.into()),
        ..SearchParams::default()
    }
}

#[tokio::test]
async fn test_round_trip_returns_stored_fields() {
    let dir = TempDir::new().unwrap();
    let store = JsonlStore::new(dir.path());
    let ctx = EmitContext::new("billing").with_run_id("run-7").with_session_id("s-1");

    let mut input = EventInput::message("invoice sent").with_type("invoice");
    input.ts = Some(format_iso_ms(NOW - 1_000));
    input.data = Some(json!({"invoice": {"id": 42, "lines": [1, 2]}}).as_object().unwrap().clone());
    input.tags = Some([("region".to_string(), "eu".to_string())].into_iter().collect());
    let event = input.normalize(&ctx);
    store.append(&event).unwrap();

    let params = SearchParams {
        service: Some("billing".into()),
        session_id: Some("s-1".into()),
        run_id: Some("run-7".into()),
        types: vec!["invoice".into()],
        ..search("1h")
    };
    let payload = engine(&dir, GuckConfig::default()).search(&params).await.unwrap();
    assert_eq!(payload["events"], json!([event]));
}

#[tokio::test]
async fn test_limit_marks_truncated() {
    let dir = TempDir::new().unwrap();
    let store = JsonlStore::new(dir.path());
    for (i, run) in ["a", "b", "c"].iter().enumerate() {
        let ctx = EmitContext::new("api").with_run_id(*run);
        for j in 0..2 {
            event_at(&store, &ctx, (i * 10 + j) as i64 * 1_000, "info", "tick");
        }
    }

    let params = SearchParams {
        limit: Some(4),
        ..search("1h")
    };
    let payload = engine(&dir, GuckConfig::default()).search(&params).await.unwrap();
    assert_eq!(payload["count"], 4);
    assert_eq!(payload["truncated"], true);

    let params = SearchParams {
        limit: Some(6),
        ..search("1h")
    };
    let payload = engine(&dir, GuckConfig::default()).search(&params).await.unwrap();
    assert_eq!(payload["count"], 6);
}

#[tokio::test]
async fn test_levels_filter_keeps_errors_only() {
    let dir = TempDir::new().unwrap();
    let store = JsonlStore::new(dir.path());
    let ctx = EmitContext::new("api").with_session_id("s-9");
    event_at(&store, &ctx, 2_000, "info", "all good");
    let error = event_at(&store, &ctx, 1_000, "error", "it broke");

    let params = SearchParams {
        levels: vec!["error".into(), "fatal".into()],
        ..search("1h")
    };
    let payload = engine(&dir, GuckConfig::default()).search(&params).await.unwrap();
    assert_eq!(payload["events"], json!([error]));
}

#[tokio::test]
async fn test_since_relative_duration() {
    let dir = TempDir::new().unwrap();
    let store = JsonlStore::new(dir.path());
    let ctx = EmitContext::new("api");
    event_at(&store, &ctx, 20 * 60_000, "info", "twenty minutes ago");
    event_at(&store, &ctx, 5 * 60_000, "info", "five minutes ago");

    let payload = engine(&dir, GuckConfig::default())
        .search(&search("15m"))
        .await
        .unwrap();
    let messages: Vec<&Value> = payload["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| &e["message"])
        .collect();
    assert_eq!(messages, vec!["five minutes ago"]);
}

#[tokio::test]
async fn test_undecodable_line_keeps_neighbours_visible() {
    use std::io::Write;

    let dir = TempDir::new().unwrap();
    let store = JsonlStore::new(dir.path());
    let ctx = EmitContext::new("api").with_run_id("run-1");
    let first = event_at(&store, &ctx, 2_000, "info", "first");
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(store.event_path(&first))
        .unwrap();
    file.write_all(b"\xff\xfe garbage\n").unwrap();
    drop(file);
    event_at(&store, &ctx, 1_000, "info", "second");

    let payload = engine(&dir, GuckConfig::default())
        .search(&search("1h"))
        .await
        .unwrap();
    assert_eq!(payload["count"], 2);
    assert!(payload.get("errors").is_none());
}

#[tokio::test]
async fn test_path_like_service_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = JsonlStore::new(dir.path());
    event_at(&store, &EmitContext::new("api"), 1_000, "info", "hidden");

    for service in ["..", "/", "api/../api"] {
        let params = SearchParams {
            service: Some(service.into()),
            ..search("1h")
        };
        let payload = engine(&dir, GuckConfig::default()).search(&params).await.unwrap();
        assert_eq!(payload["count"], 0, "service {:?}", service);
        assert_eq!(payload["errors"].as_array().unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_default_lookback_and_checkpoint() {
    let dir = TempDir::new().unwrap();
    let store = JsonlStore::new(dir.path());
    let ctx = EmitContext::new("api");
    event_at(&store, &ctx, 10 * 60_000, "info", "old");
    event_at(&store, &ctx, 60_000, "info", "recent");

    let engine = engine(&dir, GuckConfig::default());
    let payload = engine.search(&SearchParams::default()).await.unwrap();
    assert_eq!(payload["count"], 1);

    guck_core::checkpoint::write_checkpoint(dir.path(), NOW - 15 * 60_000).unwrap();
    let payload = engine.search(&SearchParams::default()).await.unwrap();
    assert_eq!(payload["count"], 2);
}

#[tokio::test]
async fn test_messages_trimmed_around_match() {
    let dir = TempDir::new().unwrap();
    let store = JsonlStore::new(dir.path());
    let long = format!("{}needle{}", "a".repeat(200), "b".repeat(200));
    event_at(&store, &EmitContext::new("api"), 1_000, "info", &long);

    let params = SearchParams {
        contains: Some("NEEDLE".into()),
        max_message_chars: Some(40),
        ..search("1h")
    };
    let payload = engine(&dir, GuckConfig::default()).search(&params).await.unwrap();
    let message = payload["events"][0]["message"].as_str().unwrap();
    assert!(message.contains("needle"));
    assert!(message.starts_with("..."));
    assert!(message.ends_with("..."));
}

#[tokio::test]
async fn test_redaction_applies_on_read() {
    let dir = TempDir::new().unwrap();
    let store = JsonlStore::new(dir.path());
    event_at(
        &store,
        &EmitContext::new("api"),
        1_000,
        "info",
        "calling with Bearer abc.def.ghi",
    );

    let payload = engine(&dir, GuckConfig::default())
        .search(&search("1h"))
        .await
        .unwrap();
    assert_eq!(payload["events"][0]["message"], "calling with [REDACTED]");
}

#[tokio::test]
async fn test_output_guard_via_config() {
    let dir = TempDir::new().unwrap();
    let store = JsonlStore::new(dir.path());
    let ctx = EmitContext::new("api");
    for i in 0..20 {
        event_at(&store, &ctx, i * 1_000, "info", "a fairly chatty log line");
    }

    let mut config = GuckConfig::default();
    config.mcp.max_output_chars = 500;
    let engine = engine(&dir, config);

    let blocked = engine.search(&search("1h")).await.unwrap();
    assert_eq!(blocked["blocked"], true);
    assert_eq!(blocked["max_output_chars"], 500);
    assert!(blocked["estimated_output_chars"].as_u64().unwrap() > 500);
    assert!(!blocked["suggestions"].as_array().unwrap().is_empty());

    let forced = engine
        .search(&SearchParams {
            force: true,
            ..search("1h")
        })
        .await
        .unwrap();
    assert_eq!(forced["count"], 20);
}

#[tokio::test]
async fn test_stats_and_sessions() {
    let dir = TempDir::new().unwrap();
    let store = JsonlStore::new(dir.path());
    let first = EmitContext::new("api").with_session_id("s-1");
    let second = EmitContext::new("api").with_session_id("s-2");
    event_at(&store, &first, 5_000, "info", "x");
    event_at(&store, &first, 4_000, "error", "y");
    event_at(&store, &second, 1_000, "warn", "z");

    let engine = engine(&dir, GuckConfig::default());
    let stats = engine
        .stats(&StatsParams {
            since: Some("1h".into()),
            ..StatsParams::new(GroupBy::Level)
        })
        .await
        .unwrap();
    assert_eq!(stats["group_by"], "level");
    assert_eq!(stats["buckets"].as_array().unwrap().len(), 3);

    let sessions = engine
        .sessions(&SessionsParams {
            since: Some("1h".into()),
            ..SessionsParams::default()
        })
        .await
        .unwrap();
    assert_eq!(sessions["sessions"][0]["session_id"], "s-2");
    assert_eq!(sessions["sessions"][1]["session_id"], "s-1");
    assert_eq!(sessions["sessions"][1]["error_count"], 1);
}
