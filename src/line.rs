use tinyvec::ArrayVec;

/// NMEA caps a sentence at 82 characters, leave some slack for chatty receivers.
pub const LINE_BUFSIZE: usize = 96;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("line does not fit the line buffer")]
    Overflow,
    #[error("line is not valid UTF-8")]
    NotUtf8,
    #[error("line has no checksum delimiter")]
    NoChecksumDelimiter,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum LineState {
    Collecting,
    /// Line was too long, waiting for the next newline
    Discarding,
    /// `buf` holds the line handed out last, cleared on the next byte
    Complete,
}
use LineState::*;

/// Cuts the receiver's byte stream into candidate sentences.
pub struct LineBuf {
    state: LineState,
    buf: ArrayVec<[u8; LINE_BUFSIZE]>,
}

impl Default for LineBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuf {
    pub fn new() -> Self {
        Self {
            state: Collecting,
            buf: ArrayVec::new(),
        }
    }

    /// Feeds one byte. Returns the trimmed line once a newline completes it.
    pub fn process_byte(&mut self, b: u8) -> Option<Result<&str, LineError>> {
        if self.state == Complete {
            self.buf.clear();
            self.state = Collecting;
        }
        match (self.state, b) {
            (_, b'$') => {
                // A sentence start always resyncs
                self.buf.clear();
                self.buf.push(b);
                self.state = Collecting;
                None
            }
            (_, b'\r') => None,
            (Discarding, b'\n') => {
                self.state = Collecting;
                Some(Err(LineError::Overflow))
            }
            (Discarding, _) => None,
            (_, b'\n') => {
                self.state = Complete;
                Self::finish(&self.buf)
            }
            (_, _) => {
                if self.buf.try_push(b).is_some() {
                    self.buf.clear();
                    self.state = Discarding;
                }
                None
            }
        }
    }

    /// Blank lines yield nothing.
    fn finish(bytes: &[u8]) -> Option<Result<&str, LineError>> {
        let line = match core::str::from_utf8(bytes) {
            Ok(line) => line.trim(),
            Err(_) => return Some(Err(LineError::NotUtf8)),
        };
        if line.is_empty() {
            None
        } else if line.contains('*') {
            Some(Ok(line))
        } else {
            Some(Err(LineError::NoChecksumDelimiter))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(buf: &mut LineBuf, bytes: &[u8]) -> Vec<Result<String, LineError>> {
        bytes
            .iter()
            .filter_map(|&b| buf.process_byte(b).map(|r| r.map(String::from)))
            .collect()
    }

    #[test]
    fn splits_crlf_lines() {
        let mut buf = LineBuf::new();
        let out = feed(
            &mut buf,
            b"$GPGGA,1,2*00\r\n$GPRMC,3,4*11\r\n",
        );
        assert_eq!(
            out,
            vec![Ok("$GPGGA,1,2*00".into()), Ok("$GPRMC,3,4*11".into())]
        );
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut buf = LineBuf::new();
        assert!(feed(&mut buf, b"\r\n\n\r\n").is_empty());
    }

    #[test]
    fn whitespace_only_lines_are_skipped() {
        let mut buf = LineBuf::new();
        let out = feed(&mut buf, b"  \t\n \r\n$GPGSA,A*1E\n");
        assert_eq!(out, vec![Ok("$GPGSA,A*1E".into())]);
    }

    #[test]
    fn dollar_resyncs_a_half_received_line() {
        let mut buf = LineBuf::new();
        let out = feed(&mut buf, b"GA,garbage$GPGSA,A*1E\n");
        assert_eq!(out, vec![Ok("$GPGSA,A*1E".into())]);
    }

    #[test]
    fn lines_without_checksum_are_rejected() {
        let mut buf = LineBuf::new();
        let out = feed(&mut buf, b"$GPGGA,1,2\n");
        assert_eq!(out, vec![Err(LineError::NoChecksumDelimiter)]);
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut buf = LineBuf::new();
        let out = feed(&mut buf, b"$GP\xff\xfe*00\n");
        assert_eq!(out, vec![Err(LineError::NotUtf8)]);
    }

    #[test]
    fn overlong_line_is_dropped_until_newline() {
        let mut buf = LineBuf::new();
        let mut long = vec![b'$'];
        long.extend(core::iter::repeat(b'A').take(LINE_BUFSIZE + 10));
        long.extend_from_slice(b"*00\n$GPGSA,A*1E\n");
        let out = feed(&mut buf, &long);
        assert_eq!(out, vec![Err(LineError::Overflow), Ok("$GPGSA,A*1E".into())]);
    }
}
