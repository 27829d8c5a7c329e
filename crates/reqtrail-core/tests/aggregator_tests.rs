use pretty_assertions::assert_eq;
use reqtrail_core::aggregator::{EventAggregator, Sweeper};
use reqtrail_core::record::{CacheEntry, CacheOperation, FieldValue, Fields};
use reqtrail_core::registry::ContextId;
use reqtrail_core::sink::CaptureSink;
use reqtrail_core::utils::config::{AggregatorConfig, DeliveryMode, SweepPolicy};
use reqtrail_core::utils::error::AggregatorError;
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn aggregator_with(config: AggregatorConfig) -> (EventAggregator, CaptureSink) {
    let aggregator = EventAggregator::new(config.with_delivery(DeliveryMode::Inline));
    let capture = CaptureSink::new();
    aggregator.register_sink(capture.clone());
    (aggregator, capture)
}

fn aggregator() -> (EventAggregator, CaptureSink) {
    aggregator_with(AggregatorConfig::default())
}

fn cache_entry(kind: &str, key: &str) -> Fields {
    let mut entry = Fields::new();
    entry.insert("type".to_string(), FieldValue::from(kind));
    entry.insert("key_or_path".to_string(), FieldValue::from(key));
    entry
}

#[test]
fn test_begin_end_yields_empty_record() {
    let (aggregator, capture) = aggregator();
    let context = ContextId::next();

    aggregator.begin(context).unwrap();
    let record = aggregator.end(context).unwrap();

    assert!(record.is_empty());
    assert_eq!(record.context_id, context);
    assert!(record.finished_at.is_some());
    assert_eq!(capture.len(), 1);
}

#[test]
fn test_duplicate_begin_keeps_existing_state() {
    let (aggregator, _capture) = aggregator();
    let context = ContextId::next();

    aggregator.begin(context).unwrap();
    aggregator.set_field(context, "action", "show").unwrap();

    assert_eq!(
        aggregator.begin(context),
        Err(AggregatorError::DuplicateContext(context))
    );
    let record = aggregator.end(context).unwrap();
    assert_eq!(record.get_str("action"), Some("show"));
}

#[test]
fn test_external_and_generated_ids_coexist() {
    let (aggregator, capture) = aggregator();
    let wire = ContextId::from(1);
    let local = ContextId::next();

    aggregator.begin(wire).unwrap();
    aggregator.begin(local).unwrap();
    assert_eq!(aggregator.active_contexts(), 2);

    aggregator.end(local).unwrap();
    aggregator.end(wire).unwrap();
    assert_eq!(capture.len(), 2);
}

#[test]
fn test_end_twice_fails() {
    let (aggregator, capture) = aggregator();
    let context = ContextId::next();

    aggregator.begin(context).unwrap();
    aggregator.end(context).unwrap();

    assert_eq!(
        aggregator.end(context).map(|_| ()),
        Err(AggregatorError::UnknownContext(context))
    );
    assert_eq!(capture.len(), 1);
}

#[test]
fn test_last_write_wins() {
    let (aggregator, _capture) = aggregator();
    let context = ContextId::next();

    aggregator.begin(context).unwrap();
    aggregator.set_field(context, "status", 200i64).unwrap();
    aggregator.set_field(context, "status", 500i64).unwrap();

    let record = aggregator.end(context).unwrap();
    assert_eq!(record.get("status"), Some(&FieldValue::Integer(500)));
    assert_eq!(record.len(), 1);
}

#[test]
fn test_last_write_wins_for_undeclared_list_values() {
    let (aggregator, _capture) = aggregator();
    let context = ContextId::next();
    let tags = |tag: &str| FieldValue::List(vec![FieldValue::from(tag)]);

    aggregator.begin(context).unwrap();
    aggregator.set_field(context, "tags", tags("a")).unwrap();
    aggregator.set_field(context, "tags", tags("b")).unwrap();
    let record = aggregator.get(context).unwrap();
    assert_eq!(record.get("tags"), Some(&tags("b")));

    aggregator.set_field(context, "tags", "scalar").unwrap();
    let record = aggregator.end(context).unwrap();
    assert_eq!(record.get_str("tags"), Some("scalar"));
}

#[test]
fn test_append_preserves_insertion_order() {
    let (aggregator, _capture) = aggregator();
    let context = ContextId::next();

    aggregator.begin(context).unwrap();
    let first = cache_entry("Read fragment", "views/foo");
    let second = cache_entry("Write fragment", "views/foo");
    aggregator.append_list_field(context, "cache", first.clone()).unwrap();
    aggregator.append_list_field(context, "cache", second.clone()).unwrap();

    let record = aggregator.end(context).unwrap();
    assert_eq!(
        record.get("cache"),
        Some(&FieldValue::List(vec![
            FieldValue::Map(first),
            FieldValue::Map(second)
        ]))
    );
}

#[test]
fn test_append_to_scalar_field_rejected() {
    let (aggregator, _capture) = aggregator();
    let context = ContextId::next();

    aggregator.begin(context).unwrap();
    aggregator.set_field(context, "notes", "plain").unwrap();

    let result = aggregator.append_list_field(context, "notes", cache_entry("Read fragment", "x"));
    assert!(matches!(result, Err(AggregatorError::FieldTypeMismatch { .. })));

    let record = aggregator.end(context).unwrap();
    assert_eq!(record.get_str("notes"), Some("plain"));
}

#[test]
fn test_span_records_duration() {
    let (aggregator, _capture) = aggregator();
    let context = ContextId::next();

    aggregator.begin(context).unwrap();
    let _token = aggregator.start_span(context, "x").unwrap();
    aggregator.finish_span(context, "x").unwrap();

    let record = aggregator.end(context).unwrap();
    assert!(record.is_present("x_duration"));
    assert!(record.duration("x").is_some());
}

#[test]
fn test_finish_without_start_leaves_record_unchanged() {
    let (aggregator, _capture) = aggregator();
    let context = ContextId::next();

    aggregator.begin(context).unwrap();
    aggregator.set_field(context, "action", "show").unwrap();
    let before = aggregator.get(context).unwrap();

    assert_eq!(
        aggregator.finish_span(context, "x"),
        Err(AggregatorError::UnknownSpan {
            context,
            span: "x".to_string()
        })
    );

    assert_eq!(aggregator.get(context).unwrap().fields, before.fields);
}

#[test]
fn test_span_can_be_reopened_after_finish() {
    let (aggregator, _capture) = aggregator();
    let context = ContextId::next();

    aggregator.begin(context).unwrap();
    let _first = aggregator.start_span(context, "send_data").unwrap();
    aggregator.finish_span(context, "send_data").unwrap();
    let _second = aggregator.start_span(context, "send_data").unwrap();
    aggregator.finish_span(context, "send_data").unwrap();

    assert!(aggregator.end(context).unwrap().is_present("send_data_duration"));
}

#[test]
fn test_open_span_discarded_at_end() {
    let (aggregator, _capture) = aggregator();
    let context = ContextId::next();

    aggregator.begin(context).unwrap();
    let _token = aggregator.start_span(context, "controller").unwrap();

    let record = aggregator.end(context).unwrap();
    assert!(!record.contains("controller_duration"));
}

#[test]
fn test_parameter_redaction() {
    let (aggregator, _capture) =
        aggregator_with(AggregatorConfig::default().with_sensitive_parameters(["lifo", "amount"]));
    let context = ContextId::next();

    aggregator.begin(context).unwrap();
    aggregator
        .set_field(
            context,
            "parameters",
            FieldValue::from(json!({"amount": "420", "lifo": "Pratik", "step": "1"})),
        )
        .unwrap();

    let record = aggregator.end(context).unwrap();
    assert_eq!(
        record.get("parameters"),
        Some(&FieldValue::from(
            json!({"amount": "[FILTERED]", "lifo": "[FILTERED]", "step": "1"})
        ))
    );
}

#[test]
fn test_redaction_preserves_other_value_types() {
    let (aggregator, _capture) =
        aggregator_with(AggregatorConfig::default().with_sensitive_parameters(["token"]));
    let context = ContextId::next();

    aggregator.begin(context).unwrap();
    aggregator
        .set_field(
            context,
            "parameters",
            FieldValue::from(json!({"token": 1234, "page": 2, "draft": true})),
        )
        .unwrap();

    let record = aggregator.end(context).unwrap();
    let params = record.get("parameters").unwrap().as_map().unwrap();
    assert_eq!(params["token"], FieldValue::from("[FILTERED]"));
    assert_eq!(params["page"], FieldValue::Integer(2));
    assert_eq!(params["draft"], FieldValue::Bool(true));
}

#[test]
fn test_normal_request_scenario() {
    let (aggregator, capture) = aggregator();
    let context = ContextId::next();

    aggregator.begin(context).unwrap();
    aggregator.set_field(context, "controller", "X").unwrap();
    aggregator.set_field(context, "action", "show").unwrap();
    let _token = aggregator.start_span(context, "controller").unwrap();
    aggregator.finish_span(context, "controller").unwrap();
    aggregator.end(context).unwrap();

    let record = capture.last().unwrap();
    assert_eq!(record.get_str("controller"), Some("X"));
    assert_eq!(record.get_str("action"), Some("show"));
    assert!(record.is_present("controller_duration"));
}

#[test]
fn test_cache_tracking_scenario() {
    let (aggregator, _capture) = aggregator();
    let context = ContextId::next();

    aggregator.begin(context).unwrap();
    aggregator
        .record_cache(context, &CacheEntry::new(CacheOperation::ReadFragment, "views/foo"))
        .unwrap();
    aggregator
        .record_cache(context, &CacheEntry::new(CacheOperation::WriteFragment, "views/foo"))
        .unwrap();

    let record = aggregator.end(context).unwrap();
    let cache = record.cache_entries();
    assert_eq!(cache.len(), 2);
    assert_eq!(cache[0].operation.label(), "Read fragment");
    assert_eq!(cache[1].operation.label(), "Write fragment");
    assert_eq!(cache[1].key_or_path, "views/foo");
}

#[test]
fn test_halted_scenario() {
    let (aggregator, _capture) = aggregator();
    let context = ContextId::next();

    aggregator.begin(context).unwrap();
    aggregator.record_halt(context, "redirector").unwrap();
    // halting is informational; later events are still recorded
    aggregator.set_field(context, "redirect_to", "http://foo.bar/").unwrap();

    let record = aggregator.end(context).unwrap();
    assert_eq!(record.get_str("halted_callback"), Some("redirector"));
    assert_eq!(record.get_str("redirect_to"), Some("http://foo.bar/"));
}

#[test]
fn test_orphan_cleanup_finalizes() {
    let (aggregator, capture) = aggregator_with(
        AggregatorConfig::default().with_stale_context_timeout(Duration::from_millis(500)),
    );
    let context = ContextId::next();
    aggregator.begin(context).unwrap();
    aggregator.set_field(context, "action", "show").unwrap();

    // not yet stale
    assert_eq!(aggregator.sweep_stale(), 0);
    assert_eq!(aggregator.active_contexts(), 1);

    thread::sleep(Duration::from_millis(600));
    assert_eq!(aggregator.sweep_stale(), 1);
    assert_eq!(aggregator.active_contexts(), 0);

    let record = capture.last().unwrap();
    assert_eq!(record.get("abandoned"), Some(&FieldValue::Bool(true)));
    assert_eq!(record.get_str("action"), Some("show"));
}

#[test]
fn test_try_new_rejects_invalid_config() {
    let zero_timeout = AggregatorConfig::default().with_stale_context_timeout(Duration::ZERO);
    assert!(EventAggregator::try_new(zero_timeout).is_err());

    let sub_second =
        AggregatorConfig::default().with_stale_context_timeout(Duration::from_millis(500));
    let aggregator = EventAggregator::try_new(sub_second).unwrap();
    assert_eq!(
        aggregator.config().stale_context_timeout(),
        Duration::from_millis(500)
    );
}

#[test]
fn test_orphan_cleanup_discards() {
    let (aggregator, capture) =
        aggregator_with(AggregatorConfig::default().with_sweep_policy(SweepPolicy::Discard));
    aggregator.begin(ContextId::next()).unwrap();
    aggregator.begin(ContextId::next()).unwrap();

    assert_eq!(aggregator.sweep_idle(Duration::ZERO), 2);
    assert_eq!(aggregator.active_contexts(), 0);
    assert!(capture.is_empty());
    assert_eq!(aggregator.finalized_count(), 0);
}

#[test]
fn test_background_sweeper_empties_registry() {
    let aggregator = Arc::new(EventAggregator::new(
        AggregatorConfig::default()
            .with_delivery(DeliveryMode::Inline)
            .with_stale_context_timeout(Duration::from_secs(1)),
    ));
    for _ in 0..5 {
        aggregator.begin(ContextId::next()).unwrap();
    }

    let mut sweeper = Sweeper::spawn(Arc::clone(&aggregator), Duration::from_millis(50)).unwrap();
    for _ in 0..100 {
        if aggregator.active_contexts() == 0 {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }
    sweeper.stop();

    assert_eq!(aggregator.active_contexts(), 0);
    assert_eq!(aggregator.finalized_count(), 5);
}

#[test]
fn test_concurrent_contexts_stay_isolated() {
    let aggregator = Arc::new(EventAggregator::new(AggregatorConfig::default()));
    let capture = CaptureSink::new();
    aggregator.register_sink(capture.clone());

    let handles: Vec<_> = (0..16)
        .map(|worker| {
            let aggregator = Arc::clone(&aggregator);
            thread::spawn(move || {
                for request in 0..25i64 {
                    let context = ContextId::next();
                    aggregator.begin(context).unwrap();
                    aggregator.set_field(context, "worker", worker as i64).unwrap();
                    aggregator.set_field(context, "request", request).unwrap();
                    let _token = aggregator.start_span(context, "controller").unwrap();
                    aggregator
                        .record_cache(
                            context,
                            &CacheEntry::new(CacheOperation::ReadFragment, format!("views/{}", request)),
                        )
                        .unwrap();
                    aggregator.finish_span(context, "controller").unwrap();
                    aggregator.end(context).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    aggregator.flush();

    let records = capture.records();
    assert_eq!(records.len(), 16 * 25);
    assert_eq!(aggregator.active_contexts(), 0);
    for record in &records {
        let request = record.get("request").and_then(FieldValue::as_i64).unwrap();
        let cache = record.cache_entries();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache[0].key_or_path, format!("views/{}", request));
        assert!(record.is_present("controller_duration"));
    }
}

#[test]
fn test_sinks_receive_independent_copies() {
    let (aggregator, first) = aggregator();
    let second = CaptureSink::new();
    aggregator.register_sink(second.clone());

    let context = ContextId::next();
    aggregator.begin(context).unwrap();
    aggregator.set_field(context, "action", "index").unwrap();
    aggregator.end(context).unwrap();

    first.clear();
    assert!(first.is_empty());
    assert_eq!(second.len(), 1);
    assert_eq!(second.last().unwrap().get_str("action"), Some("index"));
}
