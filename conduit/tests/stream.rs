#[cfg(test)]
mod tests {
    use conduit::{Charset, Connection, Error, StreamReader, StreamWriter};
    use std::io::{Cursor, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn reader(bytes: &[u8]) -> StreamReader {
        StreamReader::from_source(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn test_pushback_round_trip() {
        let mut reader = reader(b"hello world");

        let mut head = [0u8; 5];
        assert_eq!(reader.read(&mut head).expect("Failed to read"), 5);
        assert_eq!(&head, b"hello");

        reader.unread(&head).expect("Failed to push back");

        let mut all = [0u8; 32];
        let n = reader.read(&mut all).expect("Failed to read");
        assert_eq!(&all[..n], b"hello world");
    }

    #[test]
    fn test_peek_and_unread_byte() {
        let mut reader = reader(b"ab");

        assert_eq!(reader.peek().unwrap(), Some(b'a'));
        assert_eq!(reader.peek().unwrap(), Some(b'a'));
        assert_eq!(reader.read_byte().unwrap(), Some(b'a'));

        reader.unread_byte();
        assert_eq!(reader.read_byte().unwrap(), Some(b'a'));
        assert_eq!(reader.read_byte().unwrap(), Some(b'b'));
        assert_eq!(reader.read_byte().unwrap(), None);
        assert!(!reader.has_data().unwrap());
    }

    #[test]
    fn test_line_terminators() {
        let mut reader = reader(b"one\r\ntwo\nthree\rfour\r");

        for expected in ["one", "two", "three", "four"] {
            let line = reader.read_line(None).expect("Failed to read line");
            assert_eq!(line.as_deref(), Some(expected));
        }
        assert_eq!(reader.read_line(None).unwrap(), None);
    }

    #[test]
    fn test_trailing_cr_at_eof() {
        let mut reader = reader(b"abc\r");

        assert_eq!(reader.read_line(None).unwrap().as_deref(), Some("abc"));
        assert_eq!(reader.read_line(None).unwrap(), None);
    }

    #[test]
    fn test_latin1_lines() {
        let mut reader = reader(b"caf\xe9\r\n").with_charset(Charset::Latin1);
        assert_eq!(reader.read_line(None).unwrap().as_deref(), Some("café"));
    }

    #[test]
    fn test_delimiter_partial_match_is_rescanned() {
        let mut reader = reader(b"AABAAC");
        let mut buffer = [0u8; 16];

        let n = reader
            .read_until(&mut buffer, b"AAC", None)
            .expect("Failed to scan");
        assert_eq!(n, -3);
        assert_eq!(&buffer[..3], b"AAB");

        assert_eq!(reader.read_until(&mut buffer, b"AAC", None).unwrap(), 0);
    }

    #[test]
    fn test_delimiter_scan_with_full_buffer() {
        let mut reader = reader(b"abcdefg\n");
        let mut buffer = [0u8; 4];

        assert_eq!(reader.read_until(&mut buffer, b"\n", None).unwrap(), 4);
        assert_eq!(&buffer, b"abcd");

        assert_eq!(reader.read_until(&mut buffer, b"\n", None).unwrap(), -3);
        assert_eq!(&buffer[..3], b"efg");
    }

    #[test]
    fn test_delimiter_partial_match_at_eof() {
        let mut reader = reader(b"xyA");
        let mut buffer = [0u8; 8];

        assert_eq!(reader.read_until(&mut buffer, b"AB", None).unwrap(), 3);
        assert_eq!(&buffer[..3], b"xyA");
    }

    #[test]
    fn test_delimiter_argument_errors() {
        let mut reader = reader(b"data");
        let mut small = [0u8; 1];

        assert!(matches!(
            reader.read_until(&mut small, b"", None),
            Err(Error::EmptyDelimiter)
        ));
        assert!(matches!(
            reader.read_until(&mut small, b"\r\n", None),
            Err(Error::BufferTooSmall {
                len: 1,
                delimiter: 2
            })
        ));
    }

    #[test]
    fn test_sink_writer_flushes_text() {
        let mut writer = StreamWriter::from_sink(Vec::new()).with_charset(Charset::Latin1);

        writer.print("naïve ");
        writer.println("€");
        assert_eq!(writer.pending(), b"na\xefve ?\r\n");

        writer.flush().expect("Failed to flush");
        assert!(!writer.has_pending());
    }

    #[test]
    fn test_client_connection_timeouts() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local address");
        let (proceed_tx, proceed_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("Failed to accept connection");

            stream.write_all(b"partial").expect("Failed to write");
            proceed_rx.recv().expect("Test thread vanished");

            stream.write_all(b"rest\r\n").expect("Failed to write");
            drop(stream);
        });

        let connection = Connection::connect(addr, Some(Duration::from_secs(5)), Charset::Utf8)
            .expect("Failed to connect");
        assert_eq!(connection.key().destination(), addr);

        let mut reader = connection.reader();

        let line = reader
            .read_line(Some(Duration::from_millis(200)))
            .expect("Failed to read partial line");
        assert_eq!(line.as_deref(), Some("partial"));

        let err = reader
            .read_line(Some(Duration::from_millis(50)))
            .unwrap_err();
        assert!(err.is_timeout());

        let err = reader.wait_for_data(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));

        proceed_tx.send(()).expect("Server thread vanished");

        let line = reader
            .read_line(Some(Duration::from_secs(5)))
            .expect("Failed to read line");
        assert_eq!(line.as_deref(), Some("rest"));
        assert_eq!(reader.read_line(None).unwrap(), None);

        handle.join().expect("Thread panicked");
    }

    #[test]
    fn test_client_connection_writes() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local address");

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("Failed to accept connection");
            let mut received = Vec::new();
            stream
                .read_to_end(&mut received)
                .expect("Failed to read from stream");
            received
        });

        {
            let connection = Connection::connect(addr, None, Charset::Utf8).expect("Failed to connect");
            let mut writer = connection.writer();
            writer.println("ping");
            writer.write(&[0, 1, 2]);
            writer.flush().expect("Failed to flush");
        }

        let received = handle.join().expect("Thread panicked");
        assert_eq!(received, b"ping\r\n\x00\x01\x02");
    }

    #[test]
    fn test_full_buffer_returns_without_more_input() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local address");
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("Failed to accept connection");
            stream.write_all(b"abcd").expect("Failed to write");

            let _ = done_rx.recv_timeout(Duration::from_secs(3));
        });

        let connection = Connection::connect(addr, Some(Duration::from_secs(5)), Charset::Utf8)
            .expect("Failed to connect");
        let mut buffer = [0u8; 4];

        let start = Instant::now();
        let n = connection
            .reader()
            .read_until(&mut buffer, b"\n", None)
            .expect("Failed to scan");

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(n, 4);
        assert_eq!(&buffer, b"abcd");

        done_tx.send(()).expect("Server thread vanished");
        handle.join().expect("Thread panicked");
    }
}
