//! Black-box tests against the tuple-FIFO's public surface: producer
//! and consumer on separate threads, exercising both the pure
//! in-memory path and the spill-to-disk path end to end.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dora_db::config::FifoConfig;
use dora_db::error::DbError;
use dora_db::fifo::{TupleFifo, Wait};

fn spill_config() -> FifoConfig {
    FifoConfig {
        capacity_pages: 2,
        wake_threshold_pages: 1,
        page_size: 64,
        flush_to_disk_on_full: true,
        use_direct_io: false,
        wait_for_unshared_to_drain: false,
        sync_after_writes: true,
    }
}

#[test]
fn producer_and_consumer_on_separate_threads_preserve_order() {
    let fifo = Arc::new(TupleFifo::new(8, spill_config()));
    let producer_fifo = fifo.clone();
    let producer = thread::spawn(move || {
        for i in 0..500u32 {
            producer_fifo.put_tuple(&i.to_le_bytes()).unwrap();
        }
        producer_fifo.send_eof();
    });

    let mut received = Vec::new();
    loop {
        match fifo.get_tuple(Wait::Forever) {
            Ok(bytes) => received.push(u32::from_le_bytes(bytes.try_into().unwrap())),
            Err(DbError::Eof) => break,
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    producer.join().unwrap();

    assert_eq!(received, (0..500u32).collect::<Vec<_>>());
    assert!(fifo.stats().pages_spilled > 0, "test should exercise spill");
}

#[test]
fn terminate_from_producer_unblocks_consumer_without_eof() {
    let fifo = Arc::new(TupleFifo::new(8, spill_config()));
    let consumer_fifo = fifo.clone();
    let consumer = thread::spawn(move || consumer_fifo.get_tuple(Wait::Forever));

    thread::sleep(Duration::from_millis(20));
    fifo.terminate();

    let outcome = consumer.join().unwrap();
    assert_eq!(outcome.unwrap_err(), DbError::Terminated);
}

#[test]
fn copy_page_hands_the_consumer_a_whole_page() {
    let cfg = FifoConfig {
        page_size: 32,
        ..spill_config()
    };
    let fifo = TupleFifo::new(8, cfg);
    for i in 0..4u8 {
        fifo.put_tuple(&[i; 8]).unwrap();
    }
    fifo.send_eof();
    let page = fifo.copy_page(Wait::Forever).unwrap();
    assert_eq!(page.tuple_count(), 4);
}
