//! Hand-rolled feed document parser.
//!
//! Accepts RSS 2.0 (`<item>`), RSS 1.0 / RDF (`<item>`) and Atom
//! (`<entry>`) documents. The parser is deliberately shallow: it scans for
//! the handful of child elements the portal renders and ignores everything
//! else, so unknown extensions and namespaced noise pass through untouched.
//! A document with no recognizable feed root, or with an opened item that
//! never closes, is a hard parse error. A well-formed document with zero
//! items is not.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::debug;
use once_cell::sync::Lazy;

use crate::error::{PortalError, Result};
use crate::rss::FeedItem;

/// Named character references worth decoding outside a real XML parser.
/// Anything not listed here is left verbatim in the title.
static NAMED_ENTITIES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("amp", "&"),
        ("lt", "<"),
        ("gt", ">"),
        ("quot", "\""),
        ("apos", "'"),
        ("nbsp", " "),
    ])
});

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

/// Parse a feed document into normalized items, in document order.
///
/// Returns every item in the document; callers decide how many to keep.
pub fn parse_feed(raw: &str) -> Result<Vec<FeedItem>> {
    let doc = raw.trim();
    if doc.is_empty() {
        return Err(PortalError::FeedParseError(
            "document is empty".to_string(),
        ));
    }
    if !(doc.contains("<rss") || doc.contains("<feed") || doc.contains("<rdf")) {
        return Err(PortalError::FeedParseError(
            "no recognizable feed root (rss, feed or rdf)".to_string(),
        ));
    }

    let mut blocks = extract_blocks(doc, "item")?;
    blocks.extend(extract_blocks(doc, "entry")?);

    let items: Vec<FeedItem> = blocks.iter().map(|block| item_from_block(block)).collect();
    debug!("Parsed {} feed item(s)", items.len());
    Ok(items)
}

fn item_from_block(block: &str) -> FeedItem {
    let title = first_tag_text(block, "title")
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    // RSS puts the target in the element text, Atom in an href attribute.
    let (link_text, link_href) = first_link(block);
    let url = link_text
        .filter(|t| !t.is_empty())
        .or(link_href)
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "#".to_string());

    FeedItem {
        title,
        url,
        published_at: first_date(block),
    }
}

/// Collect the contents of every `<tag>...</tag>` block, left to right.
/// Self-closing forms (`<tag/>`) yield an empty block. An opening tag with
/// no matching close is a parse error.
fn extract_blocks<'a>(doc: &'a str, tag: &str) -> Result<Vec<&'a str>> {
    let close_marker = format!("</{}>", tag);
    let mut blocks = Vec::new();
    let mut cursor = 0;

    while let Some(open_start) = find_tag_open(doc, tag, cursor) {
        let open_end = match doc[open_start..].find('>') {
            Some(offset) => open_start + offset,
            None => {
                return Err(PortalError::FeedParseError(format!(
                    "unterminated <{}> opening tag",
                    tag
                )))
            }
        };
        if doc[open_start..open_end].ends_with('/') {
            blocks.push("");
            cursor = open_end + 1;
            continue;
        }
        let content_start = open_end + 1;
        let close = match doc[content_start..].find(&close_marker) {
            Some(offset) => content_start + offset,
            None => {
                return Err(PortalError::FeedParseError(format!(
                    "<{}> element is never closed",
                    tag
                )))
            }
        };
        blocks.push(&doc[content_start..close]);
        cursor = close + close_marker.len();
    }
    Ok(blocks)
}

/// Find the next `<tag` occurrence that is a real element open, not a
/// prefix of a longer name (`<link` must not match `<linkrel>`).
fn find_tag_open(doc: &str, tag: &str, from: usize) -> Option<usize> {
    let needle = format!("<{}", tag);
    let mut cursor = from;
    while let Some(offset) = doc[cursor..].find(&needle) {
        let start = cursor + offset;
        let after = start + needle.len();
        match doc[after..].chars().next() {
            Some(c) if c == '>' || c == '/' || c.is_whitespace() => return Some(start),
            Some(_) => cursor = after,
            None => return None,
        }
    }
    None
}

/// Trimmed text content of the first `<tag>` element, normalized through
/// `decode_text`. None when the element is absent, malformed or
/// self-closing.
fn first_tag_text(block: &str, tag: &str) -> Option<String> {
    let open_start = find_tag_open(block, tag, 0)?;
    let open_end = open_start + block[open_start..].find('>')?;
    if block[open_start..open_end].ends_with('/') {
        return None;
    }
    let content_start = open_end + 1;
    let close_marker = format!("</{}>", tag);
    let close = content_start + block[content_start..].find(&close_marker)?;
    Some(decode_text(&block[content_start..close]))
}

/// The first `<link>` element, split into its text content and its `href`
/// attribute. Either side may be None.
fn first_link(block: &str) -> (Option<String>, Option<String>) {
    let open_start = match find_tag_open(block, "link", 0) {
        Some(pos) => pos,
        None => return (None, None),
    };
    let open_end = match block[open_start..].find('>') {
        Some(offset) => open_start + offset,
        None => return (None, None),
    };
    let href = attr_value(&block[open_start..open_end], "href");
    if block[open_start..open_end].ends_with('/') {
        return (None, href);
    }
    let content_start = open_end + 1;
    let text = block[content_start..]
        .find("</link>")
        .map(|close| decode_text(&block[content_start..content_start + close]));
    (text, href)
}

/// Pull a quoted attribute value out of an opening-tag slice.
fn attr_value(open_tag: &str, name: &str) -> Option<String> {
    let needle = format!("{}=", name);
    let attr_start = open_tag.find(&needle)? + needle.len();
    let mut chars = open_tag[attr_start..].chars();
    let quote = chars.next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let value_start = attr_start + quote.len_utf8();
    let end = open_tag[value_start..].find(quote)?;
    Some(decode_text(&open_tag[value_start..value_start + end]))
}

/// Publication timestamp: the earliest of `<pubDate>` (RSS), `<published>`
/// or `<updated>` (Atom) in document order, parsed as RFC 2822 and then
/// RFC 3339. Unparsable dates degrade to None.
fn first_date(block: &str) -> Option<DateTime<Utc>> {
    let raw = ["pubDate", "published", "updated"]
        .iter()
        .filter_map(|tag| find_tag_open(block, tag, 0).map(|pos| (pos, *tag)))
        .min_by_key(|(pos, _)| *pos)
        .and_then(|(_, tag)| first_tag_text(block, tag))?;
    parse_date(&raw)
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    DateTime::parse_from_rfc2822(trimmed)
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed))
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Unwrap one CDATA section if present. CDATA content is already literal
/// character data and keeps its bytes; character references are decoded in
/// plain text only. Surrounding whitespace is trimmed either way.
fn decode_text(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_prefix(CDATA_OPEN) {
        Some(rest) => {
            let inner = rest.strip_suffix(CDATA_CLOSE).unwrap_or(rest);
            inner.trim().to_string()
        }
        None => decode_entities(trimmed).trim().to_string(),
    }
}

fn decode_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail[1..].find(';') {
            Some(semi) if semi > 0 && semi <= 8 => {
                let name = &tail[1..=semi];
                match decode_entity(name) {
                    Some(decoded) => out.push_str(&decoded),
                    None => out.push_str(&tail[..=semi + 1]),
                }
                rest = &tail[semi + 2..];
            }
            _ => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<String> {
    if let Some(replacement) = NAMED_ENTITIES.get(name) {
        return Some((*replacement).to_string());
    }
    let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse::<u32>().ok()?
    } else {
        return None;
    };
    char::from_u32(code).map(|c| c.to_string())
}
