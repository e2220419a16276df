#[cfg(test)]
mod tests {
    use conduit::Error;
    use conduit::buffer::{InputBuffer, OutputBuffer};

    #[test]
    fn test_retain_keeps_unsent_tail() {
        let mut output = OutputBuffer::with_capacity(4);
        output.write(b"abcdef");
        assert!(output.capacity() >= 6);

        output.retain(4);
        assert_eq!(output.pending(), b"cdef");

        output.retain(4);
        assert_eq!(output.pending(), b"cdef");

        output.write(b"gh");
        output.retain(3);
        assert_eq!(output.pending(), b"fgh");

        output.retain(0);
        assert!(output.is_empty());
    }

    #[test]
    fn test_partial_writes_rebuild_original() {
        let original: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

        let mut output = OutputBuffer::new();
        output.write(&original);

        let mut sent = Vec::new();
        let mut step = 1;

        while !output.is_empty() {
            let limit = output.limit();
            let n = step.min(limit);

            output.retain(limit);
            assert_eq!(output.limit(), limit);

            sent.extend_from_slice(&output.pending()[..n]);
            output.retain(limit - n);

            step = step % 97 + 13;
        }

        assert_eq!(output.limit(), 0);
        assert_eq!(sent, original);
    }

    #[test]
    #[should_panic(expected = "cannot retain")]
    fn test_retain_more_than_pending() {
        let mut output = OutputBuffer::new();
        output.write(b"ab");
        output.retain(3);
    }

    #[test]
    fn test_append_reuses_consumed_space() {
        let mut input = InputBuffer::with_capacity(8);
        input.append(b"abcdef");

        for _ in 0..4 {
            input.take();
        }

        input.append(b"ghijkl");
        assert_eq!(input.capacity(), 8);
        assert_eq!(input.read_pos(), 0);
        assert_eq!(input.unread_bytes(), b"efghijkl");

        input.append(b"m");
        assert!(input.capacity() > 8);
        assert_eq!(input.unread_bytes(), b"efghijklm");
    }

    #[test]
    fn test_unread_shifts_then_overflows() {
        let mut input = InputBuffer::with_capacity(8);
        input.append(b"abcdefgh");

        input.take();
        input.take();

        input.unread(b"xyz").expect_err("pushback should not fit");
        assert_eq!(input.unread_bytes(), b"cdefgh");

        let err = input.unread(b"xyz").unwrap_err();
        assert!(matches!(
            err,
            Error::Overflow {
                pushed: 3,
                unread: 6,
                capacity: 8
            }
        ));

        input.unread(b"12").expect("Failed to push back");
        assert_eq!(input.unread_bytes(), b"12cdefgh");
        assert_eq!(input.capacity(), 8);
    }

    #[test]
    fn test_unread_byte_at_start() {
        let mut input = InputBuffer::new();
        assert!(!input.unread_byte());

        input.append(b"q");
        assert_eq!(input.take(), Some(b'q'));
        assert!(input.unread_byte());
        assert_eq!(input.take(), Some(b'q'));
        assert_eq!(input.take(), None);
    }
}
