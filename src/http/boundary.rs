//! Header block boundary detection.

/// Blank line separating an HTTP header block from its body.
pub const HEADER_TERMINATOR: &[u8; 4] = b"\r\n\r\n";

/// Find the end of the header block within `buf[..end]`.
///
/// Returns the offset immediately past the first `\r\n\r\n`, or `None` when
/// the window does not contain a complete terminator. A plain forward scan;
/// header blocks are small and bounded by the buffer limit.
pub fn end_of_header_block(buf: &[u8], end: usize) -> Option<usize> {
    let window = &buf[..end.min(buf.len())];
    if window.len() < HEADER_TERMINATOR.len() {
        return None;
    }

    window
        .windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .map(|offset| offset + HEADER_TERMINATOR.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_offset_past_terminator() {
        let buf = b"GET / HTTP/1.1\r\nHost: a\r\n\r\nbody";
        let k = 23;
        assert_eq!(&buf[k..k + 4], b"\r\n\r\n");
        assert_eq!(end_of_header_block(buf, buf.len()), Some(k + 4));
    }

    #[test]
    fn missing_terminator_is_not_found() {
        let buf = b"GET / HTTP/1.1\r\nHost: a\r\n";
        assert_eq!(end_of_header_block(buf, buf.len()), None);
    }

    #[test]
    fn only_scans_the_window() {
        let mut buf = vec![0u8; 64];
        buf[..20].copy_from_slice(b"HTTP/1.1 200 OK\r\n\r\n\0");
        // terminator ends at 19; a window cutting it short must not see it
        assert_eq!(end_of_header_block(&buf, 18), None);
        assert_eq!(end_of_header_block(&buf, 19), Some(19));
        assert_eq!(end_of_header_block(&buf, 64), Some(19));
    }

    #[test]
    fn short_windows() {
        assert_eq!(end_of_header_block(b"", 0), None);
        assert_eq!(end_of_header_block(b"\r\n\r", 3), None);
        assert_eq!(end_of_header_block(b"\r\n\r\n", 4), Some(4));
        assert_eq!(end_of_header_block(b"\r\n\r\n", 100), Some(4));
    }

    #[test]
    fn first_terminator_wins() {
        let buf = b"A\r\n\r\nB\r\n\r\n";
        assert_eq!(end_of_header_block(buf, buf.len()), Some(5));
    }
}
