use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};

/// Longest accepted decimal in a `*` or `$` header line
pub const MAX_LENGTH_DIGITS: usize = 10;

/// Upper bound on arguments per request
pub const MAX_ARGS: usize = 1024 * 1024;

/// Upper bound on a single bulk string (512MB)
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Request decoder over an inbound byte accumulator
///
/// Bytes are fed as they arrive; complete requests are pulled out in
/// arrival order and any partial trailing frame stays buffered.
pub struct RespParser {
    buffer: BytesMut,
    position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    SimpleString(Bytes),
    Error(String),
    Integer(i64),
    BulkString(Option<Bytes>),
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn ok() -> Self {
        RespValue::SimpleString(Bytes::from_static(b"OK"))
    }

    /// Array of bulk strings, the request and log record shape
    pub fn request<I, B>(args: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        RespValue::Array(
            args.into_iter()
                .map(|arg| RespValue::BulkString(Some(arg.into())))
                .collect(),
        )
    }
}

impl RespParser {
    pub fn new() -> Self {
        Self::with_capacity(16 * 1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            position: 0,
        }
    }

    /// Feed data into the parser
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes received but not yet consumed by a complete request
    pub fn pending(&self) -> usize {
        self.buffer.len() - self.position
    }

    /// Parse next complete request
    ///
    /// `Ok(None)` means more bytes are needed and nothing was consumed.
    pub fn parse_next(&mut self) -> Result<Option<Vec<Bytes>>> {
        if self.position >= self.buffer.len() {
            return Ok(None);
        }

        let remaining = &self.buffer[self.position..];

        match parse_request(remaining)? {
            Some((args, consumed)) => {
                self.position += consumed;

                // Compact buffer if needed
                if self.position > self.buffer.len() / 2 {
                    let _ = self.buffer.split_to(self.position);
                    self.position = 0;
                }

                Ok(Some(args))
            }
            None => Ok(None), // Need more data
        }
    }
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one request: `*<argc>\r\n` then `argc` times `$<len>\r\n<bytes>\r\n`
///
/// Returns the arguments and the exact number of bytes the frame occupies.
pub fn parse_request(buf: &[u8]) -> Result<Option<(Vec<Bytes>, usize)>> {
    let Some(&lead) = buf.first() else {
        return Ok(None);
    };
    if lead != b'*' {
        return Err(Error::Protocol(format!(
            "expected '*', got {}",
            describe_byte(lead)
        )));
    }

    let (argc, mut pos) = match parse_length(buf, 1)? {
        Some(header) => header,
        None => return Ok(None),
    };
    if argc > MAX_ARGS {
        return Err(Error::Protocol(format!("invalid multibulk length {}", argc)));
    }

    let mut args = Vec::with_capacity(argc.min(16));
    for _ in 0..argc {
        let Some(&marker) = buf.get(pos) else {
            return Ok(None);
        };
        if marker != b'$' {
            return Err(Error::Protocol(format!(
                "expected '$', got {}",
                describe_byte(marker)
            )));
        }

        let (len, data_start) = match parse_length(buf, pos + 1)? {
            Some(header) => header,
            None => return Ok(None),
        };
        if len > MAX_BULK_LEN {
            return Err(Error::Protocol(format!("invalid bulk length {}", len)));
        }

        let data_end = data_start + len;
        if buf.len() < data_end + 2 {
            return Ok(None);
        }
        if &buf[data_end..data_end + 2] != b"\r\n" {
            return Err(Error::Protocol(
                "missing CRLF after bulk string".to_string(),
            ));
        }

        args.push(Bytes::copy_from_slice(&buf[data_start..data_end]));
        pos = data_end + 2;
    }

    Ok(Some((args, pos)))
}

/// Parse the non-negative decimal line starting at `start`
///
/// Returns the value and the offset just past its CRLF. Bad bytes are
/// reported as soon as they are seen, without waiting for the terminator.
fn parse_length(buf: &[u8], start: usize) -> Result<Option<(usize, usize)>> {
    let line = buf.get(start..).unwrap_or_default();
    let mut value: u64 = 0;

    for (i, &byte) in line.iter().enumerate() {
        match byte {
            b'0'..=b'9' => {
                if i >= MAX_LENGTH_DIGITS {
                    return Err(Error::Protocol("length line too long".to_string()));
                }
                value = value * 10 + u64::from(byte - b'0');
            }
            b'\r' if i > 0 => {
                return match line.get(i + 1) {
                    None => Ok(None),
                    Some(b'\n') => {
                        let value = usize::try_from(value).map_err(|_| {
                            Error::Protocol(format!("length {} out of range", value))
                        })?;
                        Ok(Some((value, start + i + 2)))
                    }
                    Some(&other) => Err(Error::Protocol(format!(
                        "expected LF after CR, got {}",
                        describe_byte(other)
                    ))),
                };
            }
            _ => {
                return Err(Error::Protocol(format!(
                    "invalid length byte {}",
                    describe_byte(byte)
                )));
            }
        }
    }

    Ok(None)
}

fn describe_byte(byte: u8) -> String {
    if byte.is_ascii_graphic() {
        format!("'{}'", byte as char)
    } else {
        format!("0x{:02x}", byte)
    }
}

/// Format response as RESP with pre-allocated buffer
pub fn format_resp_response(value: &RespValue) -> Vec<u8> {
    let mut result = Vec::with_capacity(estimate_resp_size(value));
    write_resp_value(&mut result, value);
    result
}

/// Write RESP value directly to buffer
pub fn write_resp_value(buf: &mut Vec<u8>, value: &RespValue) {
    match value {
        RespValue::SimpleString(s) => {
            buf.push(b'+');
            buf.extend_from_slice(s);
            buf.extend_from_slice(b"\r\n");
        }
        RespValue::Error(e) => {
            buf.push(b'-');
            buf.extend_from_slice(e.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        RespValue::Integer(n) => {
            buf.push(b':');
            let mut num_buf = itoa::Buffer::new();
            buf.extend_from_slice(num_buf.format(*n).as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        RespValue::BulkString(Some(s)) => {
            buf.push(b'$');
            let mut num_buf = itoa::Buffer::new();
            buf.extend_from_slice(num_buf.format(s.len()).as_bytes());
            buf.extend_from_slice(b"\r\n");
            buf.extend_from_slice(s);
            buf.extend_from_slice(b"\r\n");
        }
        RespValue::BulkString(None) => {
            buf.extend_from_slice(b"$-1\r\n");
        }
        RespValue::Array(arr) => {
            buf.push(b'*');
            let mut num_buf = itoa::Buffer::new();
            buf.extend_from_slice(num_buf.format(arr.len()).as_bytes());
            buf.extend_from_slice(b"\r\n");
            for item in arr {
                write_resp_value(buf, item);
            }
        }
    }
}

/// Estimate the size needed for a RESP value (for pre-allocation)
#[inline]
fn estimate_resp_size(value: &RespValue) -> usize {
    match value {
        RespValue::SimpleString(s) => s.len() + 3,
        RespValue::Error(e) => e.len() + 3,
        RespValue::Integer(_) => 24, // :number\r\n
        RespValue::BulkString(Some(s)) => s.len() + 20,
        RespValue::BulkString(None) => 5,
        RespValue::Array(arr) => 10 + arr.iter().map(estimate_resp_size).sum::<usize>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&[u8]]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::copy_from_slice(p)).collect()
    }

    #[test]
    fn decodes_set_request() {
        let frame = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
        let (parsed, consumed) = parse_request(frame).unwrap().unwrap();
        assert_eq!(parsed, args(&[b"SET", b"foo", b"bar"]));
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn reports_consumed_bytes_with_trailing_data() {
        let frame = b"*1\r\n$4\r\nPING\r\n*2\r\n$3\r\nGET\r\n";
        let (parsed, consumed) = parse_request(frame).unwrap().unwrap();
        assert_eq!(parsed, args(&[b"PING"]));
        assert_eq!(consumed, 14);
        // the rest is an incomplete GET
        assert!(parse_request(&frame[consumed..]).unwrap().is_none());
    }

    #[test]
    fn encode_then_decode_preserves_arguments() {
        let cases: Vec<Vec<Bytes>> = vec![
            args(&[b"PING"]),
            args(&[b"SET", b"key", b""]),
            args(&[b"SET", b"bin\0ary", b"line\r\nbreak"]),
            args(&[]),
        ];
        for case in cases {
            let encoded = format_resp_response(&RespValue::request(case.clone()));
            let (parsed, consumed) = parse_request(&encoded).unwrap().unwrap();
            assert_eq!(parsed, case);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn empty_array_is_a_complete_frame() {
        let (parsed, consumed) = parse_request(b"*0\r\n").unwrap().unwrap();
        assert!(parsed.is_empty());
        assert_eq!(consumed, 4);
    }

    #[test]
    fn incomplete_prefixes_consume_nothing() {
        let frame = b"*2\r\n$3\r\nGET\r\n$5\r\nhello\r\n";
        for end in 0..frame.len() {
            assert!(
                parse_request(&frame[..end]).unwrap().is_none(),
                "prefix of {} bytes decoded early",
                end
            );
        }
        assert!(parse_request(frame).unwrap().is_some());
    }

    #[test]
    fn rejects_wrong_leading_byte() {
        let err = parse_request(b"GET foo\r\n").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn rejects_negative_and_non_numeric_lengths() {
        assert!(parse_request(b"*-1\r\n").is_err());
        assert!(parse_request(b"*x\r\n").is_err());
        assert!(parse_request(b"*1\r\n$-1\r\n").is_err());
        assert!(parse_request(b"*1\r\n$3a").is_err());
        // empty length line
        assert!(parse_request(b"*\r\n").is_err());
    }

    #[test]
    fn rejects_non_bulk_argument() {
        assert!(parse_request(b"*1\r\n+PING\r\n").is_err());
    }

    #[test]
    fn rejects_missing_crlf_after_payload() {
        assert!(parse_request(b"*1\r\n$3\r\nGETxx").is_err());
    }

    #[test]
    fn rejects_oversized_headers() {
        assert!(parse_request(b"*12345678901\r\n").is_err());
        assert!(parse_request(b"*2000000\r\n").is_err());
        assert!(parse_request(b"*1\r\n$999999999\r\n").is_err());
    }

    #[test]
    fn byte_at_a_time_feeding() {
        let frame = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$5\r\nvalue\r\n*1\r\n$4\r\nPING\r\n";
        let first_len = frame.len() - 14;
        let mut parser = RespParser::new();
        let mut decoded = Vec::new();

        for (i, byte) in frame.iter().enumerate() {
            parser.feed(std::slice::from_ref(byte));
            while let Some(req) = parser.parse_next().unwrap() {
                decoded.push((i, req));
            }
        }

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].0, first_len - 1);
        assert_eq!(decoded[0].1, args(&[b"SET", b"k", b"value"]));
        assert_eq!(decoded[1].0, frame.len() - 1);
        assert_eq!(decoded[1].1, args(&[b"PING"]));
        assert_eq!(parser.pending(), 0);
    }

    #[test]
    fn pipelined_requests_come_out_in_order() {
        let mut parser = RespParser::new();
        let mut wire = Vec::new();
        for i in 0..50 {
            let req = RespValue::request([Bytes::from_static(b"GET"), Bytes::from(format!("k{i}"))]);
            write_resp_value(&mut wire, &req);
        }
        parser.feed(&wire);

        for i in 0..50 {
            let req = parser.parse_next().unwrap().unwrap();
            assert_eq!(req[1], Bytes::from(format!("k{i}")));
        }
        assert!(parser.parse_next().unwrap().is_none());
    }

    #[test]
    fn response_encodings() {
        assert_eq!(format_resp_response(&RespValue::ok()), b"+OK\r\n");
        assert_eq!(
            format_resp_response(&RespValue::Error("ERR boom".to_string())),
            b"-ERR boom\r\n"
        );
        assert_eq!(format_resp_response(&RespValue::Integer(1)), b":1\r\n");
        assert_eq!(
            format_resp_response(&RespValue::BulkString(Some(Bytes::from_static(b"bar")))),
            b"$3\r\nbar\r\n"
        );
        assert_eq!(format_resp_response(&RespValue::BulkString(None)), b"$-1\r\n");
    }
}
