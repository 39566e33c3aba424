//! Tests for the bounded watermark queue

use prometheus_task_engine::infra::WatermarkQueue;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_queue_observers() {
    let queue = WatermarkQueue::new(4).unwrap();
    assert!(queue.is_empty());
    assert_eq!(queue.capacity(), 4);
    assert_eq!(queue.high_mark(), 4);
    assert_eq!(queue.low_mark(), 3);

    queue.enqueue("a").unwrap();
    queue.enqueue("b").unwrap();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.total_enqueued(), 2);
    assert_eq!(queue.try_dequeue(), Some("a"));
    assert_eq!(queue.total_enqueued(), 2);
}

#[test]
fn test_invalid_marks_rejected() {
    assert!(WatermarkQueue::<u8>::new(1).is_err());
    assert!(WatermarkQueue::<u8>::with_marks(4, 5, 2).is_err());
    assert!(WatermarkQueue::<u8>::with_marks(4, 2, 2).is_err());
    assert!(WatermarkQueue::<u8>::with_marks(4, 2, 1).is_ok());
}

#[test]
fn test_producer_waits_for_low_mark() {
    let queue = Arc::new(
        WatermarkQueue::with_marks(4, 4, 1)
            .unwrap()
            .with_poll_interval(Duration::from_millis(10)),
    );
    for i in 0..4 {
        queue.enqueue(i).unwrap();
    }

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for _ in 0..3 {
                thread::sleep(Duration::from_millis(30));
                queue.dequeue_timeout(Duration::from_millis(100));
            }
        })
    };

    let started = Instant::now();
    queue.enqueue(4).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(80));
    assert!(queue.len() <= 2);
    consumer.join().unwrap();
}

#[test]
fn test_dequeue_times_out_when_empty() {
    let queue = WatermarkQueue::<u32>::new(2).unwrap();
    let started = Instant::now();
    assert_eq!(queue.dequeue_timeout(Duration::from_millis(20)), None);
    assert!(started.elapsed() >= Duration::from_millis(15));
}
