//! Chat messages and decoding of the `/api/chat` stream
//!
//! The daemon answers with newline-delimited JSON, one object per chunk.
//! Ollama-compatible servers do not agree on where the text lives in each
//! object, so [`extract_text`] tries the known layouts in a fixed order and
//! lines that are not JSON at all are passed through verbatim.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{OllamaError, Result};

/// A single message in a chat conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Body of a `POST /api/chat` request
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
}

/// Splits a byte stream into `\n`-terminated lines.
///
/// Network chunks do not respect line boundaries, so partial lines are
/// kept until the rest arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Next complete line, without its terminator
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buffer.iter().position(|b| *b == b'\n')?;
        let line = self.buffer[..pos].to_vec();
        self.buffer.drain(..=pos);
        Some(line)
    }

    /// Whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

/// Decode one line of the chat stream into the text it carries.
///
/// Blank lines yield `None`. A JSON object with a string `error` field is
/// an in-band failure. Anything else yields text: the extracted field when
/// one is found, otherwise the raw line.
pub fn decode_chat_line(raw: &[u8]) -> Result<Option<String>> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return Ok(None);
    }

    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return Ok(Some(line.to_string()));
    };

    if let Some(Value::String(message)) = value.get("error") {
        return Err(OllamaError::Stream(message.clone()));
    }

    Ok(Some(extract_text(&value).unwrap_or_else(|| line.to_string())))
}

/// Find the generated text in a decoded chunk.
///
/// Checked in order: a bare string; top-level `response`, `text`,
/// `generated_text`, `output_text` or `content`; `message` (or `msg`) with
/// `content`/`text` or a list of content parts; `delta`; and finally
/// OpenAI-style `choices`.
pub fn extract_text(obj: &Value) -> Option<String> {
    let map = match obj {
        Value::String(text) => return Some(text.clone()),
        Value::Object(map) => map,
        _ => return None,
    };

    for key in ["response", "text", "generated_text", "output_text", "content"] {
        if let Some(text) = string_field(map, key) {
            return Some(text.to_string());
        }
    }

    let message = map
        .get("message")
        .filter(|v| is_truthy(v))
        .or_else(|| map.get("msg"));
    if let Some(Value::Object(message)) = message {
        if let Some(text) = string_field(message, "content").or_else(|| string_field(message, "text"))
        {
            return Some(text.to_string());
        }
        if let Some(Value::Array(parts)) = message.get("content") {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|part| {
                    part.get("text")
                        .filter(|v| is_truthy(v))
                        .or_else(|| part.get("content"))
                        .and_then(Value::as_str)
                })
                .collect();
            if !texts.is_empty() {
                return Some(texts.concat());
            }
        }
    }

    if let Some(Value::Object(delta)) = map.get("delta") {
        if let Some(text) = string_field(delta, "content").or_else(|| string_field(delta, "text")) {
            return Some(text.to_string());
        }
    }

    if let Some(Value::Array(choices)) = map.get("choices") {
        let texts: Vec<&str> = choices
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|choice| {
                string_field(choice, "text")
                    .or_else(|| nested_content(choice, "message"))
                    .or_else(|| nested_content(choice, "delta"))
            })
            .collect();
        if !texts.is_empty() {
            return Some(texts.concat());
        }
    }

    None
}

fn string_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

fn nested_content<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    match map.get(key) {
        Some(Value::Object(inner)) => string_field(inner, "content"),
        _ => None,
    }
}

/// Empty strings, lists and objects count as missing, like `null`
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(_) => true,
        Value::String(s) => !s.is_empty(),
        Value::Array(list) => !list.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
