//! Tests for event sinks

use std::sync::Arc;

use serde_json::json;

use prometheus_activity_pool::core::{
    ChannelEventSink, EventKind, EventSink, FanoutEventSink, InMemoryEventSink, PoolEvent,
};
use prometheus_activity_pool::util::TaskId;

#[test]
fn test_in_memory_sink_is_bounded() {
    let sink = InMemoryEventSink::new(2);
    for kind in [EventKind::Queued, EventKind::Started, EventKind::Exit] {
        sink.emit(PoolEvent::new(kind));
    }
    let kinds: Vec<_> = sink.events().into_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Started, EventKind::Exit]);
}

#[test]
fn test_event_builders() {
    let id = TaskId::from("t-1");
    let event = PoolEvent::for_task(EventKind::TaskExecuted, &id)
        .with_job("nightly")
        .with_detail(json!({"status": "completed"}));
    assert_eq!(event.task_id, Some(id));
    assert_eq!(event.job.as_deref(), Some("nightly"));
    assert_eq!(event.detail["status"], "completed");

    let encoded = serde_json::to_value(&event).unwrap();
    assert_eq!(encoded["kind"], "job:executed");
}

#[test]
fn test_fanout_delivers_to_every_sink() {
    let a = Arc::new(InMemoryEventSink::new(10));
    let b = Arc::new(InMemoryEventSink::new(10));
    let fanout = FanoutEventSink::new().with_sink(a.clone()).with_sink(b.clone());
    fanout.emit(PoolEvent::new(EventKind::ManagerStarted));
    assert_eq!(a.count(EventKind::ManagerStarted), 1);
    assert_eq!(b.count(EventKind::ManagerStarted), 1);
}

#[test]
fn test_channel_sink_never_blocks() {
    let (sink, rx) = ChannelEventSink::bounded(4);
    for _ in 0..10 {
        sink.emit(PoolEvent::new(EventKind::Queued));
    }
    assert_eq!(rx.try_iter().count(), 4);
    assert_eq!(sink.dropped(), 6);

    drop(rx);
    sink.emit(PoolEvent::new(EventKind::Queued));
    assert_eq!(sink.dropped(), 7);
}
