#[cfg(test)]
mod tests {
    use conduit::{Connection, ConnectionKey, StreamReader, StreamWriter};
    use std::io::{Cursor, sink};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn connection() -> Arc<Connection> {
        let key = ConnectionKey::new(
            "10.0.0.1:40000".parse().unwrap(),
            "10.0.0.2:7000".parse().unwrap(),
        );
        let reader = StreamReader::from_source(Cursor::new(Vec::new()));
        let writer = StreamWriter::from_sink(sink());

        Arc::new(Connection::from_parts(key, reader, writer))
    }

    #[test]
    fn test_no_double_dispatch_under_contention() {
        let connection = connection();
        let reading = Arc::new(AtomicUsize::new(0));
        let writing = Arc::new(AtomicUsize::new(0));
        let claims = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let connection = connection.clone();
                let reading = reading.clone();
                let writing = writing.clone();
                let claims = claims.clone();

                thread::spawn(move || {
                    for _ in 0..5_000 {
                        let (guard, active) = if i % 2 == 0 {
                            (connection.try_claim_read(), &reading)
                        } else {
                            (connection.try_claim_write(), &writing)
                        };

                        let Some(guard) = guard else {
                            thread::yield_now();
                            continue;
                        };

                        let holders = active.fetch_add(1, Ordering::SeqCst) + 1;
                        assert_eq!(holders, 1, "two tasks held the same dispatch");
                        claims.fetch_add(1, Ordering::Relaxed);

                        thread::yield_now();

                        active.fetch_sub(1, Ordering::SeqCst);
                        drop(guard);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert!(claims.load(Ordering::Relaxed) > 0);
        assert!(!connection.is_reading());
        assert!(!connection.is_writing());
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let connection = connection();

        let read = connection.try_claim_read().expect("Failed to claim read");
        assert!(connection.is_reading());
        assert!(Arc::ptr_eq(read.connection(), &connection));

        let write = connection.try_claim_write().expect("Failed to claim write");
        assert!(connection.try_claim_write().is_none());

        drop(read);
        assert!(!connection.is_reading());
        assert!(connection.try_claim_read().is_some());

        drop(write);
        assert!(!connection.is_writing());
    }

    #[test]
    fn test_sending_data_tracks_writer() {
        let connection = connection();
        assert!(!connection.has_sending_data());

        connection.writer().print("queued");
        assert!(connection.has_sending_data());

        connection.writer().flush().expect("Failed to flush");
        assert!(!connection.has_sending_data());
    }
}
