//! Event text extraction
//!
//! Each decoded event record is classified into exactly one
//! [`EventShape`] by a fixed-priority set of recognizers, most specific
//! first:
//!
//! 1. content delta with an inline text payload
//! 2. tool-use stop signal (surfaced as a fixed status notice)
//! 3. generic structural payload searched for known text fields
//! 4. pure control events (message/content-block start and stop, ...)
//! 5. anything else is unrecognized
//!
//! At most one fragment comes out of a record. Malformed or unknown records
//! are logged and skipped; they never abort the stream.

use std::str::Chars;

use base64::Engine as _;
use serde_json::Value;

use crate::stream::payload::parse_structural;

/// Notice shown while the agent is running tools.
pub const TOOL_USE_NOTICE: &str = "\n\n_Using tools..._\n\n";

/// Field marker introducing a payload line.
const DATA_FIELD: &str = "data:";

/// Protocol control events that carry no displayable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Start of an agent message
    MessageStart,
    /// End of an agent message
    MessageStop,
    /// Start of a content block
    ContentBlockStart,
    /// End of a content block
    ContentBlockStop,
    /// Usage/latency metadata
    Metadata,
    /// Agent event-loop lifecycle marker
    EventLoop,
    /// Explicit end-of-stream sentinel
    Done,
}

/// Classification of one event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventShape {
    /// Inline content delta, already unescaped
    ContentDelta(String),
    /// The agent stopped to invoke a tool
    ToolUseStop,
    /// Structural payload that yielded a text field
    Structured(String),
    /// Control event with nothing to display
    Control(ControlEvent),
    /// Structural payload that failed to parse
    Malformed(String),
    /// Nothing recognizable
    Unrecognized,
}

impl EventShape {
    /// Displayable fragment for this shape, if any.
    pub fn into_fragment(self) -> Option<String> {
        match self {
            EventShape::ContentDelta(text) | EventShape::Structured(text) => {
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
            EventShape::ToolUseStop => Some(TOOL_USE_NOTICE.to_string()),
            EventShape::Control(_) | EventShape::Malformed(_) | EventShape::Unrecognized => None,
        }
    }
}

/// Turns event records into display fragments.
///
/// Keeps counters of skipped records for diagnostics.
///
/// # Examples
///
/// ```
/// use agentchat::stream::EventTextExtractor;
///
/// let mut extractor = EventTextExtractor::new();
/// let fragment = extractor.extract("data: {'contentBlockDelta': {'delta': {'text': 'Hi'}}}");
/// assert_eq!(fragment.as_deref(), Some("Hi"));
/// ```
#[derive(Debug, Default)]
pub struct EventTextExtractor {
    malformed: u64,
    unrecognized: u64,
}

impl EventTextExtractor {
    /// Create an extractor with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records whose structural payload failed to parse.
    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }

    /// Records that matched no recognizer.
    pub fn unrecognized_count(&self) -> u64 {
        self.unrecognized
    }

    /// Extract zero or one fragment from `record`.
    pub fn extract(&mut self, record: &str) -> Option<String> {
        let shape = classify_record(record);
        match &shape {
            EventShape::Malformed(reason) => {
                self.malformed += 1;
                tracing::debug!(reason = %reason, record = %record, "Skipping malformed event");
            }
            EventShape::Unrecognized => {
                self.unrecognized += 1;
                tracing::debug!(record = %record, "Skipping unrecognized event");
            }
            EventShape::Control(kind) => {
                tracing::trace!(?kind, "Control event");
            }
            _ => {}
        }
        shape.into_fragment()
    }
}

/// Classify one event record.
///
/// Pure function; the extractor wraps it with logging and counters.
pub fn classify_record(record: &str) -> EventShape {
    let Some(payload) = data_payload(record) else {
        return EventShape::Unrecognized;
    };

    if let Some(text) = recognize_content_delta(&payload) {
        return EventShape::ContentDelta(text);
    }

    if is_tool_use_stop(&payload) {
        return EventShape::ToolUseStop;
    }

    if looks_structural(&payload) {
        match parse_structural(&payload) {
            Ok(value) => {
                if let Some(text) = find_text(&value) {
                    return EventShape::Structured(text);
                }
            }
            Err(err) => {
                return match recognize_control(&payload) {
                    Some(kind) => EventShape::Control(kind),
                    None => EventShape::Malformed(err.to_string()),
                };
            }
        }
    }

    match recognize_control(&payload) {
        Some(kind) => EventShape::Control(kind),
        None => EventShape::Unrecognized,
    }
}

/// Payload carried by a record.
///
/// `data:` lines are joined with newlines. A record without any field
/// marker that starts like a structural value is taken whole, which is what
/// a non-streaming JSON response looks like once buffered.
fn data_payload(record: &str) -> Option<String> {
    let data_lines: Vec<&str> = record
        .lines()
        .filter_map(|line| line.strip_prefix(DATA_FIELD))
        .map(str::trim)
        .collect();

    if !data_lines.is_empty() {
        let joined = data_lines.join("\n");
        return if joined.is_empty() { None } else { Some(joined) };
    }

    let trimmed = record.trim();
    if looks_structural(trimmed) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

fn looks_structural(payload: &str) -> bool {
    matches!(payload.chars().next(), Some('{') | Some('[') | Some('"') | Some('\''))
}

/// Recognizer 1: the quoted `text` member of `contentBlockDelta.delta`.
///
/// Works on the raw payload so a delta survives even when the rest of the
/// record is not valid structure. Tool-use deltas carry no reply text, even
/// when their streamed input mentions a `text` key.
fn recognize_content_delta(payload: &str) -> Option<String> {
    let block = value_after_key(payload, "contentBlockDelta")?;
    let delta = member_value(block, "delta")?;
    if member_value(delta, "toolUse").is_some() {
        return None;
    }
    let value = member_value(delta, "text")?;
    let raw = read_quoted(value)?;
    Some(unescape(raw))
}

/// Recognizer 2: `stopReason` equal to `tool_use`.
fn is_tool_use_stop(payload: &str) -> bool {
    value_after_key(payload, "stopReason")
        .and_then(read_quoted)
        .map(|reason| reason == "tool_use")
        .unwrap_or(false)
}

/// Recognizer 4: control markers by key name.
fn recognize_control(payload: &str) -> Option<ControlEvent> {
    const MARKERS: &[(&str, ControlEvent)] = &[
        ("contentBlockStart", ControlEvent::ContentBlockStart),
        ("contentBlockStop", ControlEvent::ContentBlockStop),
        ("messageStart", ControlEvent::MessageStart),
        ("messageStop", ControlEvent::MessageStop),
        ("metadata", ControlEvent::Metadata),
        ("init_event_loop", ControlEvent::EventLoop),
        ("start_event_loop", ControlEvent::EventLoop),
        ("'start'", ControlEvent::EventLoop),
        ("\"start\"", ControlEvent::EventLoop),
        ("[DONE]", ControlEvent::Done),
    ];

    MARKERS
        .iter()
        .find(|(marker, _)| payload.contains(marker))
        .map(|(_, kind)| *kind)
}

/// Recognizer 3: known nested text fields of a parsed payload.
fn find_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => {
            if let Some(inner @ Value::Object(_)) = map.get("event") {
                if let Some(text) = find_text(inner) {
                    return Some(text);
                }
            }

            let delta_text = map
                .get("contentBlockDelta")
                .and_then(|d| d.get("delta"))
                .or_else(|| map.get("delta"))
                .and_then(|d| d.get("text"))
                .and_then(Value::as_str);
            if let Some(text) = delta_text {
                return Some(text.to_string());
            }

            let encoded = map
                .get("chunk")
                .and_then(|c| c.get("bytes"))
                .or_else(|| map.get("bytes"))
                .and_then(Value::as_str);
            if let Some(encoded) = encoded {
                return decode_bytes(encoded);
            }

            ["text", "content"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::to_string)
        }
        _ => None,
    }
}

fn decode_bytes(encoded: &str) -> Option<String> {
    match base64::engine::general_purpose::STANDARD.decode(encoded.trim()) {
        Ok(raw) => Some(String::from_utf8_lossy(&raw).into_owned()),
        Err(err) => {
            tracing::debug!("Ignoring undecodable bytes payload: {}", err);
            None
        }
    }
}

/// Slice starting at the value that follows `key` (in either quote style).
fn value_after_key<'a>(scope: &'a str, key: &str) -> Option<&'a str> {
    let single = format!("'{}'", key);
    let double = format!("\"{}\"", key);

    let mut search_from = 0;
    loop {
        let rest = &scope[search_from..];
        let hit = [rest.find(&single), rest.find(&double)]
            .into_iter()
            .flatten()
            .min()?;
        let after_key = &rest[hit + key.len() + 2..];
        let after_ws = after_key.trim_start();
        if let Some(value) = after_ws.strip_prefix(':') {
            return Some(value.trim_start());
        }
        search_from += hit + key.len() + 2;
    }
}

/// Slice starting at the value of `key` among the direct members of the
/// object that opens `object`.
///
/// Nested objects and string contents are skipped, so a key of the same
/// name deeper down is never matched.
fn member_value<'a>(object: &'a str, key: &str) -> Option<&'a str> {
    if !object.starts_with('{') {
        return None;
    }

    let mut depth = 0usize;
    let mut pos = 0;
    while let Some(c) = object[pos..].chars().next() {
        match c {
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return None;
                }
            }
            '\'' | '"' => {
                let literal = read_quoted(&object[pos..])?;
                let end = pos + literal.len() + 2;
                if depth == 1 && literal == key {
                    if let Some(value) = object[end..].trim_start().strip_prefix(':') {
                        return Some(value.trim_start());
                    }
                }
                pos = end;
                continue;
            }
            _ => {}
        }
        pos += c.len_utf8();
    }
    None
}

/// Contents of the quoted literal at the start of `s`, still escaped.
fn read_quoted(s: &str) -> Option<&str> {
    let mut chars = s.char_indices();
    let (_, quote) = chars.next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }

    let mut escaped = false;
    for (idx, c) in chars {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(&s[1..idx]);
        }
    }
    None
}

/// Resolve backslash escapes in an extracted literal.
///
/// `\uXXXX` pairs encoding a UTF-16 surrogate pair become one character; a
/// lone surrogate becomes U+FFFD.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some(kind @ ('u' | 'x')) => {
                let width = if kind == 'u' { 4 } else { 2 };
                let Some(code) = read_hex(&mut chars, width) else {
                    out.push('\\');
                    out.push(kind);
                    continue;
                };
                let decoded = match char::from_u32(code) {
                    Some(decoded) => decoded,
                    None if (0xD800..0xDC00).contains(&code) => low_surrogate(&mut chars)
                        .and_then(|low| {
                            char::from_u32(0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00))
                        })
                        .unwrap_or(char::REPLACEMENT_CHARACTER),
                    None => char::REPLACEMENT_CHARACTER,
                };
                out.push(decoded);
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// Consume exactly `width` hex digits, or nothing.
fn read_hex(chars: &mut Chars<'_>, width: usize) -> Option<u32> {
    let hex: String = chars.clone().take(width).collect();
    if hex.chars().count() != width || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let code = u32::from_str_radix(&hex, 16).ok()?;
    for _ in 0..width {
        chars.next();
    }
    Some(code)
}

/// Consume a following `\uXXXX` low surrogate, or nothing.
fn low_surrogate(chars: &mut Chars<'_>) -> Option<u32> {
    let mut ahead = chars.clone();
    if ahead.next()? != '\\' || ahead.next()? != 'u' {
        return None;
    }
    let low = read_hex(&mut ahead, 4)?;
    if !(0xDC00..0xE000).contains(&low) {
        return None;
    }
    *chars = ahead;
    Some(low)
}
