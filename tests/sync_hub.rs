mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;

use devmon::sync::hub::{Hub, OUTBOUND_CAPACITY};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn broadcast_reaches_every_client_once() -> TestResult {
    init_tracing();
    let (hub, _task) = Hub::spawn();

    let mut queues = Vec::new();
    for _ in 0..3 {
        let (_, rx) = hub.register().ok_or("hub should accept clients")?;
        queues.push(rx);
    }
    assert_eq!(hub.client_count().await, 3);

    hub.broadcast("sync");
    for rx in &mut queues {
        let message = with_timeout(rx.recv()).await;
        assert_eq!(message.as_deref(), Some("sync"));
    }

    // Nothing else was queued.
    assert_eq!(hub.client_count().await, 3);
    for rx in &mut queues {
        assert!(rx.try_recv().is_err());
    }

    hub.stop().await;
    Ok(())
}

#[tokio::test]
async fn client_ids_are_distinct() -> TestResult {
    let (hub, _task) = Hub::spawn();
    let (a, _rx_a) = hub.register().ok_or("register a")?;
    let (b, _rx_b) = hub.register().ok_or("register b")?;
    assert_ne!(a, b);
    hub.stop().await;
    Ok(())
}

#[tokio::test]
async fn unregister_closes_the_queue() -> TestResult {
    let (hub, _task) = Hub::spawn();
    let (id, mut rx) = hub.register().ok_or("register")?;
    hub.unregister(id);

    assert_eq!(with_timeout(rx.recv()).await, None);
    assert_eq!(hub.client_count().await, 0);

    // Unknown ids are ignored.
    hub.unregister(id);
    hub.unregister(9999);
    assert_eq!(hub.client_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn slow_client_is_dropped_without_blocking_others() -> TestResult {
    init_tracing();
    let (hub, _task) = Hub::spawn();

    let (_, mut slow) = hub.register().ok_or("register slow")?;
    let (_, mut fast) = hub.register().ok_or("register fast")?;

    // Fill both queues exactly.
    for i in 0..OUTBOUND_CAPACITY {
        hub.broadcast(format!("m{i}"));
    }
    assert_eq!(hub.client_count().await, 2);

    // Only the fast client keeps up.
    for _ in 0..OUTBOUND_CAPACITY {
        assert!(fast.try_recv().is_ok());
    }

    hub.broadcast("overflow");
    assert_eq!(hub.client_count().await, 1);
    assert_eq!(with_timeout(fast.recv()).await.as_deref(), Some("overflow"));

    // The slow client keeps what it had queued, then sees its queue close.
    let mut drained = 0;
    while with_timeout(slow.recv()).await.is_some() {
        drained += 1;
    }
    assert_eq!(drained, OUTBOUND_CAPACITY);

    hub.stop().await;
    Ok(())
}

#[tokio::test]
async fn stop_closes_queues_and_refuses_new_clients() -> TestResult {
    let (hub, task) = Hub::spawn();
    let (_, mut rx) = hub.register().ok_or("register")?;

    with_timeout(hub.stop()).await;
    with_timeout(task).await?;

    assert_eq!(with_timeout(rx.recv()).await, None);
    assert!(hub.register().is_none());
    assert_eq!(hub.client_count().await, 0);

    // Broadcasting and stopping again are harmless.
    hub.broadcast("sync");
    with_timeout(hub.stop()).await;
    Ok(())
}
