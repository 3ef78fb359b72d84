use super::client::WireResponse;
use super::GenerationError;

/// Incremental decoder for a `text/event-stream` body whose `data:` lines
/// each carry one JSON response chunk.
#[derive(Default)]
pub(super) struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes; returns the fragments completed by this chunk, in order.
    /// Chunks may split lines (and UTF-8 sequences) anywhere.
    pub(super) fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, GenerationError>> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(item) = decode_line(&line) {
                out.push(item);
            }
        }
        out
    }

    /// Flush a final unterminated line at end of stream
    pub(super) fn finish(&mut self) -> Vec<Result<String, GenerationError>> {
        let line = std::mem::take(&mut self.buf);
        decode_line(&line).into_iter().collect()
    }
}

fn decode_line(line: &[u8]) -> Option<Result<String, GenerationError>> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    let decoded = serde_json::from_str::<WireResponse>(payload)
        .map_err(GenerationError::from)
        .and_then(WireResponse::into_text);
    match decoded {
        Ok(text) if text.is_empty() => None,
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(text: &str) -> String {
        format!(
            "data: {{\"candidates\":[{{\"content\":{{\"role\":\"model\",\"parts\":[{{\"text\":\"{text}\"}}]}}}}]}}\r\n\r\n"
        )
    }

    fn texts(items: Vec<Result<String, GenerationError>>) -> Vec<String> {
        items.into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_events_in_one_chunk() {
        let mut decoder = SseDecoder::default();
        let body = format!("{}{}", event("Hel"), event("lo"));
        assert_eq!(texts(decoder.push(body.as_bytes())), ["Hel", "lo"]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        let body = event("world");
        let (a, b) = body.as_bytes().split_at(17);
        assert!(decoder.push(a).is_empty());
        assert_eq!(texts(decoder.push(b)), ["world"]);
    }

    #[test]
    fn test_unterminated_tail_flushed() {
        let mut decoder = SseDecoder::default();
        let body = event("end");
        let body = body.trim_end();
        assert!(decoder.push(body.as_bytes()).is_empty());
        assert_eq!(texts(decoder.finish()), ["end"]);
    }

    #[test]
    fn test_ignores_comments_and_empty_chunks() {
        let mut decoder = SseDecoder::default();
        let body = ": keep-alive\n\ndata: {\"candidates\":[]}\n\n";
        assert!(decoder.push(body.as_bytes()).is_empty());
    }

    #[test]
    fn test_error_payload_surfaces() {
        let mut decoder = SseDecoder::default();
        let items = decoder.push(b"data: {\"error\":{\"message\":\"quota\"}}\n");
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Err(GenerationError::Service(m)) if m == "quota"));
    }

    #[test]
    fn test_garbage_payload_is_decode_error() {
        let mut decoder = SseDecoder::default();
        let items = decoder.push(b"data: {oops\n");
        assert!(matches!(&items[0], Err(GenerationError::Decode(_))));
    }
}
