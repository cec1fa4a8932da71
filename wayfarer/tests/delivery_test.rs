use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use wayfarer::models::{Domain, EventType, Navigation, StreamEvent};
use wayfarer::services::{DeadLetterQueue, DeadLetterReason, EventSink};

fn complete_event(n: usize) -> StreamEvent {
    StreamEvent::complete(
        format!("finisher {n}"),
        Navigation::for_domain(Domain::Itinerary, "s1", "Paris"),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_finalizers_emit_exactly_one_terminal_event() {
    for _ in 0..20 {
        let (dlq, _dlq_rx) = DeadLetterQueue::new(256);
        let (sink, mut rx) = EventSink::new(
            64,
            Duration::from_millis(200),
            2,
            dlq,
            CancellationToken::new(),
        );

        let winners = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for n in 0..16 {
            let sink = sink.clone();
            let winners = winners.clone();
            tasks.push(tokio::spawn(async move {
                let won = if n % 2 == 0 {
                    sink.finish([complete_event(n)]).await
                } else {
                    sink.fail(&wayfarer::error::WayfarerError::Internal(format!("racer {n}")))
                        .await
                };
                if won {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
                sink.close();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(events.len(), 1);
        assert!(events[0].event_type.is_terminal());
        assert!(sink.is_finished());
    }
}

#[tokio::test]
async fn test_stalled_consumer_bounds_producer_and_dead_letters_event() {
    let (dlq, mut dlq_rx) = DeadLetterQueue::new(8);
    let (sink, _rx) = EventSink::new(
        1,
        Duration::from_millis(40),
        3,
        dlq,
        CancellationToken::new(),
    );

    // Fills the only slot; the consumer never reads.
    assert!(sink.send(StreamEvent::progress("first")).await);

    let started = Instant::now();
    assert!(!sink.send(StreamEvent::progress("second")).await);
    let blocked = started.elapsed();

    assert!(blocked >= Duration::from_millis(120), "blocked {blocked:?}");
    assert!(blocked < Duration::from_secs(2), "blocked {blocked:?}");

    let letter = dlq_rx.try_recv().unwrap();
    assert_eq!(letter.event.message.as_deref(), Some("second"));
    assert_eq!(letter.reason, DeadLetterReason::TimedOut { attempts: 3 });
}

#[tokio::test]
async fn test_cancellation_stops_sends_immediately() {
    let (dlq, mut dlq_rx) = DeadLetterQueue::new(8);
    let cancel = CancellationToken::new();
    let (sink, _rx) = EventSink::new(1, Duration::from_secs(5), 3, dlq, cancel.clone());

    assert!(sink.send(StreamEvent::progress("fills the slot")).await);

    let pending = {
        let sink = sink.clone();
        tokio::spawn(async move { sink.send(StreamEvent::progress("blocked")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    cancel.cancel();
    assert!(!pending.await.unwrap());
    assert!(started.elapsed() < Duration::from_secs(1));

    let letter = dlq_rx.recv().await.unwrap();
    assert_eq!(letter.reason, DeadLetterReason::Cancelled);
    assert_eq!(letter.event.event_type, EventType::Progress);
}
