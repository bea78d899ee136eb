//! Pure transformation functions for are.na API data
//!
//! This module contains zero I/O operations and is fully testable with
//! fixture data: the serde models for API payloads, the deduplicating
//! channel-membership index built during aggregation, and the normalization
//! pipeline that turns a raw block body into the persisted record.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

// ============================================================================
// Domain Models (Input from API)
// ============================================================================

/// Response from the user channels endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelListing {
    #[serde(default)]
    pub channels: Vec<ChannelSummary>,
}

/// One channel from the user channels listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSummary {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl ChannelSummary {
    /// Title shown in progress output and recorded against blocks.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled")
    }
}

/// One page of a channel's contents.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelPage {
    /// Total number of blocks the channel reports.
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub contents: Vec<ChannelItem>,
}

/// A connected item on a channel page. Only the id matters here; full block
/// bodies come from the blocks endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelItem {
    #[serde(default)]
    pub id: Option<u64>,
}

/// A raw block body from the blocks endpoint, with the channel membership
/// attached after aggregation. This is the record shape of the raw-fetch
/// boundary file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBlock {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub generated_title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image: Option<BlockImage>,
    #[serde(default)]
    pub source: Option<BlockSource>,
    #[serde(default)]
    pub user: Option<BlockUser>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub connected_at: Option<String>,
    #[serde(default)]
    pub channel_titles: Vec<String>,
}

/// Image descriptor on a raw block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockImage {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub original: Option<ImageOriginal>,
}

/// Original rendition of a block image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageOriginal {
    #[serde(default)]
    pub url: Option<String>,
}

/// Source descriptor on a raw block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockSource {
    #[serde(default)]
    pub url: Option<String>,
}

/// The user a block belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockUser {
    #[serde(default)]
    pub slug: Option<String>,
}

/// The raw-fetch boundary file: every block body collected during a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawData {
    #[serde(default)]
    pub blocks: Vec<RawBlock>,
}

// ============================================================================
// Channel membership index
// ============================================================================

/// Insertion-ordered mapping from block id to the channels that reference
/// it, built incrementally across paginated channel fetches.
///
/// Each (block, channel) pair is recorded at most once no matter how many
/// pages repeat it, and block ids keep first-seen order so output order is
/// stable across runs.
#[derive(Debug, Default)]
pub struct ChannelIndex {
    order: Vec<u64>,
    channels: HashMap<u64, Vec<String>>,
}

impl ChannelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `channel_title` references `block_id`. Repeated pairs are
    /// ignored.
    pub fn record(&mut self, block_id: u64, channel_title: &str) {
        if !self.channels.contains_key(&block_id) {
            self.order.push(block_id);
        }
        let titles = self.channels.entry(block_id).or_default();
        if !titles.iter().any(|t| t == channel_title) {
            titles.push(channel_title.to_string());
        }
    }

    /// Merge one page of channel contents, skipping items without an id.
    pub fn record_page(&mut self, channel_title: &str, items: &[ChannelItem]) {
        for item in items {
            if let Some(id) = item.id {
                self.record(id, channel_title);
            }
        }
    }

    /// Unique block ids in first-seen order.
    pub fn block_ids(&self) -> &[u64] {
        &self.order
    }

    /// Channel titles recorded for a block, in recording order.
    pub fn channels_for(&self, block_id: u64) -> &[String] {
        self.channels
            .get(&block_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Parse an are.na timestamp (RFC 3339; fractional seconds and a `Z` suffix
/// both accepted).
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).ok()
}

/// A block's effective date: the later of its updated and connected
/// timestamps, considering only the ones that parse. A block where neither
/// parses has no effective date and is never filtered.
pub fn effective_date(block: &RawBlock) -> Option<DateTime<FixedOffset>> {
    let updated = block.updated_at.as_deref().and_then(parse_timestamp);
    let connected = block.connected_at.as_deref().and_then(parse_timestamp);
    match (updated, connected) {
        (Some(u), Some(c)) => Some(u.max(c)),
        (Some(u), None) => Some(u),
        (None, Some(c)) => Some(c),
        (None, None) => None,
    }
}

/// Resolved title: explicit title, else generated title, with the are.na
/// default "Untitled" treated as no title at all.
fn resolve_title(block: &RawBlock) -> Option<String> {
    let raw = block
        .title
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| block.generated_title.as_deref().filter(|t| !t.is_empty()))?;
    if raw == "Untitled" {
        return None;
    }
    Some(html_escape::decode_html_entities(raw).into_owned())
}

/// An image the shell should try to download for a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub url: String,
    pub filename: String,
}

/// The pure half of normalization: everything decided from the raw block
/// alone. The shell resolves the image request (I/O) and then calls
/// [`PendingBlock::into_normalized`].
#[derive(Debug, Clone)]
pub struct PendingBlock {
    pub id: u64,
    pub channels: Vec<String>,
    pub author: String,
    pub title: Option<String>,
    pub source_url: Option<String>,
    pub content: Option<String>,
    pub image: Option<ImageSource>,
}

impl PendingBlock {
    /// Assemble the persisted record. `image_file` is the downloaded
    /// filename when the image request succeeded; an image always wins over
    /// text content.
    pub fn into_normalized(self, image_file: Option<String>) -> NormalizedBlock {
        let body = match (image_file, self.content) {
            (Some(file), _) => BlockBody::Image { file },
            (None, Some(content)) => BlockBody::Text { content },
            (None, None) => BlockBody::Empty,
        };
        NormalizedBlock {
            id: self.id,
            channels: self.channels,
            author: self.author,
            title: self.title,
            source_url: self.source_url,
            body,
        }
    }
}

/// Normalize a raw block, or return `None` when the block has no id or is
/// excluded by the minimum-date filter.
pub fn normalize_block(
    block: &RawBlock,
    min_date: Option<&DateTime<FixedOffset>>,
) -> Option<PendingBlock> {
    let id = block.id?;

    if let Some(min) = min_date {
        if let Some(date) = effective_date(block) {
            if date < *min {
                return None;
            }
        }
    }

    let image = block.image.as_ref().and_then(|img| {
        let url = img
            .original
            .as_ref()
            .and_then(|o| o.url.clone())
            .filter(|u| !u.is_empty())?;
        Some(ImageSource {
            url,
            filename: img.filename.clone().unwrap_or_else(|| "image".to_string()),
        })
    });

    Some(PendingBlock {
        id,
        channels: block.channel_titles.clone(),
        author: block
            .user
            .as_ref()
            .and_then(|u| u.slug.clone())
            .unwrap_or_default(),
        title: resolve_title(block),
        source_url: block
            .source
            .as_ref()
            .and_then(|s| s.url.clone())
            .filter(|u| !u.is_empty()),
        content: block
            .content
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(|c| html_escape::decode_html_entities(c).into_owned()),
        image,
    })
}

// ============================================================================
// Output Models (persisted record)
// ============================================================================

/// The processed boundary file holds a flat list of these records. The body
/// is a tagged union so an image and text content can never both be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBlock {
    pub id: u64,
    pub channels: Vec<String>,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(flatten)]
    pub body: BlockBody,
}

/// Card body contents: a downloaded image, decoded text, or nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockBody {
    Image { file: String },
    Text { content: String },
    Empty,
}

// ============================================================================
// Image payload sniffing
// ============================================================================

/// Image types recognised by magic-byte detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageKind {
    /// File extension (with leading dot) for the detected type.
    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Png => ".png",
            ImageKind::Jpeg => ".jpg",
            ImageKind::Gif => ".gif",
            ImageKind::Webp => ".webp",
        }
    }
}

/// Detect an image type from the payload's leading magic bytes. Undetected
/// formats return `None`; callers keep the source extension.
pub fn detect_image_kind(data: &[u8]) -> Option<ImageKind> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(ImageKind::Png)
    } else if data.starts_with(&[0xff, 0xd8, 0xff]) {
        Some(ImageKind::Jpeg)
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some(ImageKind::Gif)
    } else if data.starts_with(b"RIFF")
        && data[..data.len().min(20)].windows(4).any(|w| w == b"WEBP")
    {
        Some(ImageKind::Webp)
    } else {
        None
    }
}

/// Extension of a source filename, with the leading dot. Empty when the
/// filename has none.
pub fn extension_of(filename: &str) -> String {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => filename[idx..].to_string(),
        _ => String::new(),
    }
}

/// Destination filename for a block's image: the block id plus the source
/// extension, corrected when the payload's magic bytes disagree with it.
pub fn image_filename(block_id: u64, source_filename: &str, data: &[u8]) -> String {
    let ext = extension_of(source_filename);
    match detect_image_kind(data) {
        Some(kind) if !kind.extension().eq_ignore_ascii_case(&ext) => {
            format!("{block_id}{}", kind.extension())
        }
        _ => format!("{block_id}{ext}"),
    }
}
