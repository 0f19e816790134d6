//! Tests for subscriber management

use super::*;

/// Helper to create a test entry
fn make_entry(message: &str) -> Arc<LogEntry> {
    Arc::new(LogEntry::new(Arc::from("test"), message))
}

// ============================================================================
// Subscription tests
// ============================================================================

#[test]
fn test_subscription_unique_ids() {
    let (a, _rx_a) = Subscription::new(LogMode::Follow, 4);
    let (b, _rx_b) = Subscription::new(LogMode::Follow, 4);

    assert!(a.id() > 0);
    assert_ne!(a.id(), b.id());
    assert_eq!(a.mode(), LogMode::Follow);
}

#[test]
fn test_try_send_drops_when_full() {
    let (subscription, mut rx) = Subscription::new(LogMode::Follow, 2);

    assert_eq!(subscription.try_send(make_entry("a")), Delivery::Delivered);
    assert_eq!(subscription.try_send(make_entry("b")), Delivery::Delivered);
    assert_eq!(subscription.try_send(make_entry("c")), Delivery::Dropped);

    assert_eq!(rx.try_recv().unwrap().message, "a");
    assert_eq!(rx.try_recv().unwrap().message, "b");
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_try_send_reports_closed() {
    let (subscription, rx) = Subscription::new(LogMode::Follow, 2);

    // Drop receiver (writer exited)
    drop(rx);

    assert_eq!(subscription.try_send(make_entry("a")), Delivery::Closed);
}

#[test]
fn test_zero_capacity_raised_to_one() {
    let (subscription, _rx) = Subscription::new(LogMode::Dump, 0);
    assert_eq!(subscription.try_send(make_entry("a")), Delivery::Delivered);
    assert_eq!(subscription.try_send(make_entry("b")), Delivery::Dropped);
}

// ============================================================================
// Registry tests
// ============================================================================

#[test]
fn test_register_counts() {
    let mut registry = SubscriberRegistry::new();
    assert!(registry.is_empty());

    let (subscription, _rx) = Subscription::new(LogMode::Follow, 4);
    registry.register(subscription);

    assert!(!registry.is_empty());
    assert_eq!(registry.count(), 1);
}

#[test]
fn test_broadcast_to_multiple_subscribers() {
    let mut registry = SubscriberRegistry::new();
    let (a, mut rx_a) = Subscription::new(LogMode::Follow, 4);
    let (b, mut rx_b) = Subscription::new(LogMode::DumpFollow, 4);
    registry.register(a);
    registry.register(b);

    let result = registry.broadcast(&make_entry("hello"));
    assert_eq!(result.delivered, 2);

    assert_eq!(rx_a.try_recv().unwrap().message, "hello");
    assert_eq!(rx_b.try_recv().unwrap().message, "hello");
}

#[test]
fn test_full_subscriber_does_not_affect_others() {
    let mut registry = SubscriberRegistry::new();
    let (stalled, _rx_stalled) = Subscription::new(LogMode::Follow, 1);
    let (healthy, mut rx_healthy) = Subscription::new(LogMode::Follow, 16);
    registry.register(stalled);
    registry.register(healthy);

    for i in 0..5 {
        registry.broadcast(&make_entry(&i.to_string()));
    }

    // Stalled subscriber stays registered, it is only dropping
    assert_eq!(registry.count(), 2);

    let received: Vec<_> = std::iter::from_fn(|| rx_healthy.try_recv().ok())
        .map(|e| e.message.clone())
        .collect();
    assert_eq!(received, vec!["0", "1", "2", "3", "4"]);
}

#[test]
fn test_broadcast_counts_drops() {
    let mut registry = SubscriberRegistry::new();
    let (subscription, _rx) = Subscription::new(LogMode::Follow, 1);
    registry.register(subscription);

    assert_eq!(registry.broadcast(&make_entry("a")).delivered, 1);
    let result = registry.broadcast(&make_entry("b"));
    assert_eq!(result.delivered, 0);
    assert_eq!(result.dropped, 1);
}

#[test]
fn test_broadcast_reaps_closed_subscribers() {
    let mut registry = SubscriberRegistry::new();
    let (gone, rx_gone) = Subscription::new(LogMode::Follow, 4);
    let (alive, mut rx_alive) = Subscription::new(LogMode::Follow, 4);
    registry.register(gone);
    registry.register(alive);

    drop(rx_gone);

    // Still registered until the next entry arrives
    assert_eq!(registry.count(), 2);

    let result = registry.broadcast(&make_entry("x"));
    assert_eq!(result.reaped, 1);
    assert_eq!(result.delivered, 1);
    assert_eq!(registry.count(), 1);
    assert!(rx_alive.try_recv().is_ok());
}
