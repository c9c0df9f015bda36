//! Import of exported chat history.
//!
//! Two top-level shapes are accepted: an object holding a `conversations`
//! list, or the list itself. Each list item is either a conversation with a
//! `messages` list, or a flat `{date, user_input, gpt_response}` exchange.

use crate::error::{FormatError, RecallError, StorageError};
use crate::store::ChatStore;
use crate::utils::{format_epoch_seconds, now_timestamp};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Validated import source.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryDocument {
    Wrapped(Vec<HistoryEntry>),
    Bare(Vec<HistoryEntry>),
}

impl HistoryDocument {
    pub fn entries(&self) -> &[HistoryEntry] {
        match self {
            HistoryDocument::Wrapped(entries) | HistoryDocument::Bare(entries) => entries,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEntry {
    Conversation(Conversation),
    Exchange(Exchange),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub create_time: Option<Value>,
    pub messages: Vec<Message>,
}

/// Conversation as read, before its messages are checked one by one.
#[derive(Deserialize)]
struct RawConversation {
    #[serde(default)]
    create_time: Option<Value>,
    messages: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    pub author: Author,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(default)]
    pub create_time: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Author {
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts { parts: Vec<Value> },
    Typed { text: String },
}

impl MessageContent {
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) | MessageContent::Typed { text } => text.clone(),
            MessageContent::Parts { parts } => parts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Flat record as written by earlier exports of the chat table.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Exchange {
    #[serde(default)]
    pub date: Option<Value>,
    pub user_input: Option<String>,
    #[serde(default)]
    pub gpt_response: Option<String>,
}

/// One question/answer pair ready to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChat {
    pub timestamp: String,
    pub user_input: String,
    pub response: String,
}

impl HistoryEntry {
    /// Pairs extracted from this entry; empty inputs or responses are dropped.
    pub fn chats(&self) -> Vec<PendingChat> {
        let pairs = match self {
            HistoryEntry::Exchange(exchange) => match (&exchange.user_input, &exchange.gpt_response) {
                (Some(input), Some(response)) => vec![PendingChat {
                    timestamp: exchange
                        .date
                        .as_ref()
                        .and_then(timestamp_from)
                        .unwrap_or_else(now_timestamp),
                    user_input: input.clone(),
                    response: response.clone(),
                }],
                _ => Vec::new(),
            },
            HistoryEntry::Conversation(conversation) => conversation.pairs(),
        };

        pairs
            .into_iter()
            .filter(|chat| !chat.user_input.is_empty() && !chat.response.is_empty())
            .collect()
    }
}

impl Conversation {
    /// Each user message paired with the next assistant reply. A second user
    /// message before any reply replaces the pending one.
    fn pairs(&self) -> Vec<PendingChat> {
        let fallback = self.create_time.as_ref().and_then(timestamp_from);
        let mut pairs = Vec::new();
        let mut pending: Option<(String, Option<String>)> = None;

        for message in &self.messages {
            let text = message.content.as_ref().map(MessageContent::text).unwrap_or_default();
            let stamp = message.create_time.as_ref().and_then(timestamp_from);

            match message.author.role.as_str() {
                "user" => pending = Some((text, stamp)),
                "assistant" => {
                    if let Some((input, asked_at)) = pending.take() {
                        let timestamp = asked_at
                            .or_else(|| fallback.clone())
                            .unwrap_or_else(now_timestamp);
                        pairs.push(PendingChat {
                            timestamp,
                            user_input: input,
                            response: text,
                        });
                    }
                }
                _ => {}
            }
        }

        pairs
    }
}

/// Epoch seconds become local time; strings are kept as given.
fn timestamp_from(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n.as_f64().and_then(format_epoch_seconds),
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

impl HistoryEntry {
    /// Objects with a `messages` key are conversations, objects with a
    /// `user_input` key are flat exchanges. Anything else is logged and
    /// dropped, as are individual messages that fail to decode.
    fn from_value(index: usize, item: Value) -> Option<HistoryEntry> {
        let (has_messages, has_input) = match &item {
            Value::Object(map) => (map.contains_key("messages"), map.contains_key("user_input")),
            other => {
                warn!(index, found = shape_name(other), "skipping non-object history entry");
                return None;
            }
        };

        if has_messages {
            let raw: RawConversation = match serde_json::from_value(item) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(index, error = %e, "skipping malformed conversation");
                    return None;
                }
            };
            let messages = raw
                .messages
                .into_iter()
                .enumerate()
                .filter_map(|(position, message)| match serde_json::from_value(message) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        warn!(index, position, error = %e, "skipping malformed message");
                        None
                    }
                })
                .collect();
            return Some(HistoryEntry::Conversation(Conversation {
                create_time: raw.create_time,
                messages,
            }));
        }

        if has_input {
            return match serde_json::from_value(item) {
                Ok(exchange) => Some(HistoryEntry::Exchange(exchange)),
                Err(e) => {
                    warn!(index, error = %e, "skipping malformed exchange");
                    None
                }
            };
        }

        warn!(index, "skipping history entry with neither messages nor user_input");
        None
    }
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Validates the top-level shape and every entry. Entries matching neither
/// entry form are logged and dropped.
pub fn parse_value(value: Value) -> Result<HistoryDocument, FormatError> {
    let (items, wrapped) = match value {
        Value::Array(items) => (items, false),
        Value::Object(mut map) => match map.remove("conversations") {
            Some(Value::Array(items)) => (items, true),
            _ => {
                return Err(FormatError::UnrecognizedShape {
                    found: "an object without a 'conversations' list",
                });
            }
        },
        other => {
            return Err(FormatError::UnrecognizedShape {
                found: shape_name(&other),
            });
        }
    };

    let entries: Vec<HistoryEntry> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| HistoryEntry::from_value(index, item))
        .collect();

    Ok(if wrapped {
        HistoryDocument::Wrapped(entries)
    } else {
        HistoryDocument::Bare(entries)
    })
}

pub fn parse_document(text: &str) -> Result<HistoryDocument, FormatError> {
    parse_value(serde_json::from_str(text)?)
}

/// Appends every complete pair in `document`, returning how many were written.
/// No deduplication: importing the same history twice stores it twice.
pub fn ingest(store: &mut ChatStore, document: &HistoryDocument) -> Result<usize, StorageError> {
    let mut written = 0;
    for entry in document.entries() {
        for chat in entry.chats() {
            store.append(&chat.timestamp, &chat.user_input, &chat.response)?;
            written += 1;
        }
    }
    debug!(entries = document.entries().len(), written, "ingested history");
    Ok(written)
}

pub fn ingest_file(store: &mut ChatStore, path: impl AsRef<Path>) -> Result<usize, RecallError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| FormatError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let document = parse_document(&text)?;
    let written = ingest(store, &document)?;
    info!(path = %path.display(), written, "imported chat history");
    Ok(written)
}
