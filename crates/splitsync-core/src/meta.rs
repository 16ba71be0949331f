//! Key/value metadata embedded in pull request bodies and commit messages.
//!
//! A PR body carries metadata in an HTML comment opened with a `meta:`
//! marker:
//!
//! ```text
//! <!-- meta:
//! # lines starting with '#' are notes for humans
//! publicTitle: Fix the widget cache
//! publicBody: First line
//!   continues here
//! -->
//! ```
//!
//! Commit messages use single `meta:` lines of `;`-separated pairs:
//!
//! ```text
//! meta: publicMessage:Fix cache; private
//! ```
//!
//! Parsing never fails. Malformed input degrades to a partial or empty block.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Key holding the title to use for a PR mirrored into the parent repository.
pub const PUBLIC_TITLE_KEY: &str = "publicTitle";
/// Key holding the body to use for a PR mirrored into the parent repository.
pub const PUBLIC_BODY_KEY: &str = "publicBody";
/// Key recording the last primary head SHA replayed into a secondary.
pub const PRIMARY_SHA_KEY: &str = "primarySha";
/// Commit trailer key overriding the generic replay message.
pub const PUBLIC_MESSAGE_KEY: &str = "publicMessage";
/// Commit trailer flag excluding a commit from replay.
pub const PRIVATE_FLAG: &str = "private";

const BLOCK_OPEN: &str = "<!--";
const BLOCK_CLOSE: &str = "-->";
const MARKER: &str = "meta:";

static KEY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+):(.*)$").expect("key line pattern is valid"));

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Text(String),
    /// A commit-trailer key given without a value.
    Flag(bool),
}

/// Schemaless metadata mapping. Consumers look up the keys they know.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaBlock {
    entries: BTreeMap<String, MetaValue>,
}

impl MetaBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: MetaValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.get(key)
    }

    /// Text value for `key`; flags have no text.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(MetaValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    /// True when `key` is present as a `true` flag.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.entries.get(key), Some(MetaValue::Flag(true)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetaValue)> {
        self.entries.iter()
    }

    /// Render as a PR-body comment block that [`parse_pr_body_meta`] reads back.
    ///
    /// Each value is written on one line with `\\`, `\n`, `\r` and `--\>`
    /// escapes, so values may hold line breaks, key-like lines and the block
    /// terminator. Surrounding whitespace is not kept. Flags are written as
    /// `key: true`.
    pub fn render_comment(&self) -> String {
        let mut out = String::from("<!-- meta:\n");
        for (key, value) in &self.entries {
            match value {
                MetaValue::Text(text) if text.is_empty() => out.push_str(&format!("{key}:\n")),
                MetaValue::Text(text) => {
                    out.push_str(&format!("{key}: {}\n", escape_value(text)));
                }
                MetaValue::Flag(flag) => out.push_str(&format!("{key}: {flag}\n")),
            }
        }
        out.push_str(BLOCK_CLOSE);
        out
    }
}

fn escape_value(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out.replace(BLOCK_CLOSE, "--\\>")
}

/// Undo [`escape_value`]. Unknown escapes are kept as written.
fn unescape_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let decoded = match chars.peek() {
            Some('n') => '\n',
            Some('r') => '\r',
            Some('\\') => '\\',
            Some('>') => '>',
            _ => {
                out.push('\\');
                continue;
            }
        };
        chars.next();
        out.push(decoded);
    }
    out
}

/// Locate the first `<!-- ... -->` block containing the `meta:` marker.
///
/// Returns the byte range of the whole block (including delimiters) and the
/// text following the marker. An unterminated block runs to the end of `body`.
fn find_meta_block(body: &str) -> Option<(std::ops::Range<usize>, &str)> {
    let mut search_from = 0;
    while let Some(rel_open) = body[search_from..].find(BLOCK_OPEN) {
        let open = search_from + rel_open;
        let inner_start = open + BLOCK_OPEN.len();
        let (inner_end, block_end) = match body[inner_start..].find(BLOCK_CLOSE) {
            Some(rel_close) => (
                inner_start + rel_close,
                inner_start + rel_close + BLOCK_CLOSE.len(),
            ),
            None => (body.len(), body.len()),
        };
        let inner = &body[inner_start..inner_end];
        if let Some(marker) = inner.find(MARKER) {
            return Some((open..block_end, &inner[marker + MARKER.len()..]));
        }
        search_from = block_end;
    }
    None
}

/// Parse the metadata comment block out of a PR body.
pub fn parse_pr_body_meta(body: &str) -> MetaBlock {
    let mut block = MetaBlock::new();
    let Some((_, region)) = find_meta_block(body) else {
        return block;
    };

    let mut current: Option<(String, String)> = None;
    for raw in region.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(caps) = KEY_LINE.captures(line) {
            if let Some((key, value)) = current.take() {
                block.insert(key, MetaValue::Text(unescape_value(&value)));
            }
            current = Some((caps[1].to_string(), caps[2].trim().to_string()));
        } else if let Some((_, value)) = current.as_mut() {
            if !value.is_empty() {
                value.push('\n');
            }
            value.push_str(line);
        }
    }
    if let Some((key, value)) = current {
        block.insert(key, MetaValue::Text(unescape_value(&value)));
    }
    block
}

/// Parse every `meta:` line of a commit message into one block.
///
/// Later lines override duplicate keys; a key without a value is a `true` flag.
pub fn parse_commit_meta(message: &str) -> MetaBlock {
    let mut block = MetaBlock::new();
    for line in message.lines() {
        let Some(rest) = line.trim_start().strip_prefix(MARKER) else {
            continue;
        };
        for pair in rest.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = match pair.split_once(':') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => (pair, ""),
            };
            if key.is_empty() {
                continue;
            }
            let value = if value.is_empty() {
                MetaValue::Flag(true)
            } else {
                MetaValue::Text(value.to_string())
            };
            block.insert(key, value);
        }
    }
    block
}

/// Set `key` in the body's metadata block, appending a block when none exists.
///
/// Other keys of an existing block are preserved.
pub fn upsert_pr_body_meta(body: &str, key: &str, value: &str) -> String {
    let mut block = parse_pr_body_meta(body);
    block.insert(key, MetaValue::Text(value.to_string()));
    match find_meta_block(body) {
        Some((range, _)) => {
            let mut out = String::with_capacity(body.len() + value.len());
            out.push_str(&body[..range.start]);
            out.push_str(&block.render_comment());
            out.push_str(&body[range.end..]);
            out
        }
        None if body.is_empty() => block.render_comment(),
        None => format!("{}\n\n{}", body.trim_end(), block.render_comment()),
    }
}
