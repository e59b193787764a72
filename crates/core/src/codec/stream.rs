//! Watch event decoding over chunk-framed bodies.
//!
//! JSON streams are framed by complete JSON values; chunk boundaries carry no
//! meaning and a value may span several chunks. YAML streams are framed by
//! `---` document separator lines.

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;

use super::{ByteStream, Codec, ContentType};
use crate::Error;
use crate::resource::{Object, ObjectMeta, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
    Bookmark,
    Error,
}

impl EventType {
    fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "ADDED" => Ok(EventType::Added),
            "MODIFIED" => Ok(EventType::Modified),
            "DELETED" => Ok(EventType::Deleted),
            "BOOKMARK" => Ok(EventType::Bookmark),
            "ERROR" => Ok(EventType::Error),
            other => Err(Error::Decode(format!("unknown watch event type: {other}"))),
        }
    }
}

/// A typed change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub event_type: EventType,
    pub object: Object,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    object: Value,
}

/// Splits a chunked body into decoded values, one per frame.
pub struct FrameReader {
    content_type: ContentType,
    body: ByteStream,
    buf: Vec<u8>,
    scan: JsonScan,
    finished: bool,
}

/// Resumable scan for the end of the leading JSON value in a buffer.
///
/// Only bytes appended since the last call are examined, so a value split
/// over many chunks is scanned once and parsed once.
#[derive(Debug, Default)]
struct JsonScan {
    pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    in_scalar: bool,
}

impl JsonScan {
    /// Length of the leading value once it is complete. `buf` must start
    /// at the value (no leading whitespace).
    fn frame_end(&mut self, buf: &[u8]) -> Option<usize> {
        while self.pos < buf.len() {
            let b = buf[self.pos];
            self.pos += 1;
            if self.in_string {
                match b {
                    _ if self.escaped => self.escaped = false,
                    b'\\' => self.escaped = true,
                    b'"' => {
                        self.in_string = false;
                        if self.depth == 0 {
                            return Some(self.pos);
                        }
                    }
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    // An unbalanced closer is handed to the parser to report.
                    if self.depth <= 1 {
                        return Some(self.pos);
                    }
                    self.depth -= 1;
                }
                _ if self.depth == 0 && b.is_ascii_whitespace() => {
                    if self.in_scalar {
                        return Some(self.pos - 1);
                    }
                }
                _ if self.depth == 0 => self.in_scalar = true,
                _ => {}
            }
        }
        None
    }
}

impl FrameReader {
    pub fn new(codec: &Codec, body: ByteStream) -> Self {
        Self { content_type: codec.content_type(), body, buf: Vec::new(), scan: JsonScan::default(), finished: false }
    }

    /// Next decoded frame, or `None` once the body ended cleanly.
    pub async fn next_value(&mut self, codec: &Codec) -> Result<Option<Value>, Error> {
        loop {
            if let Some(value) = self.next_frame(codec)? {
                return Ok(Some(value));
            }
            if self.finished {
                return Ok(None);
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(Error::Io(e)),
                None => self.finished = true,
            }
        }
    }

    fn next_frame(&mut self, codec: &Codec) -> Result<Option<Value>, Error> {
        match self.content_type {
            ContentType::Json => self.next_json_frame(),
            ContentType::Yaml => self.next_yaml_frame(codec),
        }
    }

    fn next_json_frame(&mut self) -> Result<Option<Value>, Error> {
        if self.scan.pos == 0 {
            let start = self.buf.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(self.buf.len());
            self.buf.drain(..start);
        }
        if self.buf.is_empty() {
            return Ok(None);
        }

        let end = match self.scan.frame_end(&self.buf) {
            Some(end) => end,
            None if self.finished => self.buf.len(),
            None => return Ok(None),
        };

        let value = serde_json::from_slice(&self.buf[..end]).map_err(|e| {
            if e.is_eof() {
                Error::Decode(format!("stream ended inside a frame: {e}"))
            } else {
                Error::Decode(e.to_string())
            }
        })?;
        self.buf.drain(..end);
        self.scan = JsonScan::default();
        Ok(Some(value))
    }

    fn next_yaml_frame(&mut self, codec: &Codec) -> Result<Option<Value>, Error> {
        loop {
            let frame = match find_document_separator(&self.buf) {
                Some((end, next)) => {
                    let frame = self.buf[..end].to_vec();
                    self.buf.drain(..next);
                    frame
                }
                None if self.finished && !self.buf.is_empty() => std::mem::take(&mut self.buf),
                None => return Ok(None),
            };
            if frame.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return codec.decode_value(&frame).map(Some);
        }
    }
}

/// Yields one [`WatchEvent`] per frame until the body ends or fails.
pub struct WatchDecoder {
    codec: Codec,
    frames: FrameReader,
    kind: Option<ResourceKind>,
}

impl WatchDecoder {
    pub fn new(codec: Codec, body: ByteStream) -> Self {
        let frames = FrameReader::new(&codec, body);
        Self { codec, frames, kind: None }
    }

    /// Stamp event objects that omit `kind` with the kind of `resource`.
    pub fn for_resource(mut self, resource: &str) -> Self {
        self.kind = Some(ResourceKind::resolve(resource));
        self
    }

    /// Next event, or `None` once the body ended cleanly.
    pub async fn decode(&mut self) -> Result<Option<WatchEvent>, Error> {
        match self.frames.next_value(&self.codec).await? {
            Some(value) => self.to_event(value).map(Some),
            None => Ok(None),
        }
    }

    fn to_event(&self, value: Value) -> Result<WatchEvent, Error> {
        let raw: RawEvent = serde_json::from_value(value).map_err(|e| Error::Decode(e.to_string()))?;
        let event_type = EventType::parse(&raw.event_type)?;
        let mut object = Object::from_value(raw.object)?;
        if matches!(event_type, EventType::Added | EventType::Modified | EventType::Deleted) {
            let api_version = self.codec.group_version().api_version();
            match &self.kind {
                Some(kind) => self.codec.stamp(&mut object, &kind.kind, &api_version),
                None if object.api_version().is_none_or(str::is_empty) => object.set_api_version(&api_version),
                None => {}
            }
        }
        Ok(WatchEvent { event_type, object })
    }
}

/// Locate the next `---` line: returns (end of current document, start of next).
fn find_document_separator(buf: &[u8]) -> Option<(usize, usize)> {
    let mut line_start = 0;
    while let Some(pos) = buf[line_start..].iter().position(|&b| b == b'\n') {
        let line_end = line_start + pos;
        let line = &buf[line_start..line_end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line == b"---" {
            return Some((line_start, line_end + 1));
        }
        line_start = line_end + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::stream_decoder;
    use crate::resource::GroupVersion;
    use bytes::Bytes;
    use futures_util::stream;

    fn body(chunks: Vec<&'static str>) -> ByteStream {
        Box::pin(stream::iter(chunks.into_iter().map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c.as_bytes())))))
    }

    #[tokio::test]
    async fn test_json_events_across_chunks() {
        let chunks = vec![
            "{\"type\":\"ADDED\",\"object\":{\"kind\":\"Pod\",\"metadata\":{\"name\":\"a\"}}}\n{\"type\":\"MOD",
            "IFIED\",\"object\":{\"metadata\":{\"name\":\"a\",\"resourceVersion\":\"2\"}}}\n",
            "{\"type\":\"DELETED\",\"object\":{\"metadata\":{\"name\":\"a\"}}}",
        ];
        let mut decoder = stream_decoder("application/json", &GroupVersion::new("", "v1"), body(chunks)).unwrap();

        let added = decoder.decode().await.unwrap().unwrap();
        assert_eq!(added.event_type, EventType::Added);
        assert_eq!(added.object.api_version(), Some("v1"));

        let modified = decoder.decode().await.unwrap().unwrap();
        assert_eq!(modified.event_type, EventType::Modified);
        assert_eq!(modified.object.resource_version(), Some("2"));

        let deleted = decoder.decode().await.unwrap().unwrap();
        assert_eq!(deleted.event_type, EventType::Deleted);

        assert!(decoder.decode().await.unwrap().is_none());
    }

    fn owned_body(chunks: Vec<Vec<u8>>) -> ByteStream {
        Box::pin(stream::iter(chunks.into_iter().map(|c| Ok::<_, std::io::Error>(Bytes::from(c)))))
    }

    #[test]
    fn test_scan_ignores_brackets_inside_strings() {
        let raw = br#"{"a":"}{\"]","b":[1,{"c":"\\"}]} {"next":1}"#;
        let mut scan = JsonScan::default();
        let end = scan.frame_end(raw).unwrap();
        let value: Value = serde_json::from_slice(&raw[..end]).unwrap();
        assert_eq!(value["a"], "}{\"]");
        assert_eq!(value["b"][1]["c"], "\\");
    }

    #[test]
    fn test_scan_resumes_where_it_stopped() {
        let raw = br#"{"items":[{"name":"a"},{"name":"b"}]}"#;
        let mut scan = JsonScan::default();
        assert_eq!(scan.frame_end(&raw[..10]), None);
        assert_eq!(scan.pos, 10);
        assert_eq!(scan.frame_end(&raw[..25]), None);
        assert_eq!(scan.frame_end(raw), Some(raw.len()));
    }

    #[tokio::test]
    async fn test_large_value_in_small_chunks() {
        let items: Vec<Value> =
            (0..2000).map(|i| serde_json::json!({"metadata": {"name": format!("p{i}")}, "data": "x{y}z\"q"})).collect();
        let raw = serde_json::to_vec(&serde_json::json!({"type": "ADDED", "object": {"metadata": {"name": "big"}, "items": items}}))
            .unwrap();
        let chunks = raw.chunks(64).map(<[u8]>::to_vec).collect();
        let mut decoder = stream_decoder("", &GroupVersion::new("", "v1"), owned_body(chunks)).unwrap();

        let event = decoder.decode().await.unwrap().unwrap();
        assert_eq!(event.object.name(), Some("big"));
        assert_eq!(event.object.into_value()["items"].as_array().map(Vec::len), Some(2000));
        assert!(decoder.decode().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_top_level_scalars_are_framed() {
        let codec = Codec::new(ContentType::Json, GroupVersion::new("", "v1"));
        let mut frames = FrameReader::new(&codec, body(vec!["1 tr", "ue\n\"s\" 2"]));
        let mut values = Vec::new();
        while let Some(value) = frames.next_value(&codec).await.unwrap() {
            values.push(value);
        }
        assert_eq!(values, vec![serde_json::json!(1), serde_json::json!(true), serde_json::json!("s"), serde_json::json!(2)]);
    }

    #[tokio::test]
    async fn test_truncated_json_frame() {
        let chunks = vec!["{\"type\":\"ADDED\",\"object\":{\"metadata\":"];
        let mut decoder = stream_decoder("", &GroupVersion::new("", "v1"), body(chunks)).unwrap();
        assert!(matches!(decoder.decode().await, Err(Error::Decode(_))));
    }

    #[tokio::test]
    async fn test_unknown_event_type() {
        let chunks = vec!["{\"type\":\"RENAMED\",\"object\":{}}"];
        let mut decoder = stream_decoder("", &GroupVersion::new("", "v1"), body(chunks)).unwrap();
        assert!(matches!(decoder.decode().await, Err(Error::Decode(_))));
    }

    #[tokio::test]
    async fn test_yaml_documents() {
        let chunks = vec![
            "---\ntype: ADDED\nobject:\n  metadata:\n    name: a\n---\n",
            "type: DELETED\nobject:\n  metadata:\n    name: a\n",
        ];
        let mut decoder = stream_decoder("application/yaml", &GroupVersion::new("", "v1"), body(chunks)).unwrap();

        let added = decoder.decode().await.unwrap().unwrap();
        assert_eq!(added.event_type, EventType::Added);
        assert_eq!(added.object.name(), Some("a"));

        let deleted = decoder.decode().await.unwrap().unwrap();
        assert_eq!(deleted.event_type, EventType::Deleted);

        assert!(decoder.decode().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stream_error_surfaces() {
        let failing: ByteStream = Box::pin(stream::iter(vec![Err::<Bytes, _>(std::io::Error::other("reset"))]));
        let mut decoder = stream_decoder("", &GroupVersion::new("", "v1"), failing).unwrap();
        assert!(matches!(decoder.decode().await, Err(Error::Io(_))));
    }
}
