//! Core Cache: a bounded, always-resident set of hot memory blocks with
//! compression and weighted eviction. See `spec.md` §4.2.

use std::collections::HashMap;
use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::constants::{DEFAULT_CACHE_MAX_TOTAL_BYTES, DEFAULT_COMPRESSION_THRESHOLD, MIN_COMPRESSION_SAVINGS};
use crate::error::{Error, Result};
use crate::types::MemoryId;

/// The only configuration knobs the core cache accepts.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Total byte budget across all resident blocks.
    pub max_total_bytes: u64,
    /// Fraction of `max_total_bytes` at which compression kicks in.
    pub compression_threshold: f64,
    /// Minimum fractional byte savings required to keep a compressed
    /// representation instead of the raw payload.
    pub min_compression_savings: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_total_bytes: DEFAULT_CACHE_MAX_TOTAL_BYTES,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            min_compression_savings: MIN_COMPRESSION_SAVINGS,
        }
    }
}

/// Exactly one of `raw`/`compressed` is materialized at any time.
#[derive(Debug, Clone)]
enum Payload {
    Raw(String),
    Compressed(Vec<u8>),
}

/// A single resident block. Mirrors `Memory` plus cache-local bookkeeping.
#[derive(Debug, Clone)]
pub struct Block {
    /// Identifier shared with the long-term `Memory` record, if any.
    pub id: MemoryId,
    payload: Payload,
    /// Eviction priority, 0-10.
    pub priority: u8,
    /// Tags carried for the query engine's tag-index prefilter.
    pub tags: std::collections::HashSet<String>,
    /// Read counter, incremented on every `get`.
    pub access_count: u64,
    /// Timestamp of the most recent write or read.
    pub last_modified: DateTime<Utc>,
    /// Original, uncompressed byte length (used for the compression-savings
    /// check even once compressed).
    uncompressed_len: u64,
}

impl Block {
    /// Resident byte footprint right now (compressed or raw, whichever is
    /// materialized).
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        match &self.payload {
            Payload::Raw(s) => s.len() as u64,
            Payload::Compressed(bytes) => bytes.len() as u64,
        }
    }

    /// True if the resident payload is gzip-compressed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        matches!(self.payload, Payload::Compressed(_))
    }

    fn eviction_score(&self, now: DateTime<Utc>) -> f64 {
        let days_since = (now - self.last_modified).num_seconds() as f64 / 86_400.0;
        f64::from(self.priority) * 10.0 + self.access_count as f64 * 2.0 - days_since * 5.0
    }

    fn decompress(&self) -> Result<String> {
        match &self.payload {
            Payload::Raw(s) => Ok(s.clone()),
            Payload::Compressed(bytes) => {
                let mut decoder = GzDecoder::new(&bytes[..]);
                let mut out = String::new();
                decoder
                    .read_to_string(&mut out)
                    .map_err(|e| Error::Internal(format!("cache decompression failed: {e}")))?;
                Ok(out)
            }
        }
    }
}

fn gzip(content: &str) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(content.as_bytes())
        .map_err(|e| Error::Internal(format!("cache compression failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| Error::Internal(format!("cache compression failed: {e}")))
}

/// Bounded, always-resident block store.
pub struct CoreCache {
    config: CacheConfig,
    blocks: HashMap<MemoryId, Block>,
    total_bytes: u64,
}

impl CoreCache {
    /// Construct an empty cache with the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            blocks: HashMap::new(),
            total_bytes: 0,
        }
    }

    /// Total bytes currently resident. Invariant: always `<= max_total_bytes`.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Number of resident blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True if no blocks are resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Iterate over resident `(id, decompressed content, tags)` — used by
    /// the query engine's bounded lexical substring scan and tag prefilter.
    ///
    /// # Errors
    ///
    /// Returns an error if any resident block fails to decompress.
    pub fn iter_contents(&self) -> Result<Vec<(MemoryId, String, std::collections::HashSet<String>)>> {
        self.blocks
            .values()
            .map(|b| Ok((b.id, b.decompress()?, b.tags.clone())))
            .collect()
    }

    /// Insert or replace a block.
    ///
    /// # Errors
    ///
    /// - `Error::TooLarge` if `content` alone exceeds `max_total_bytes`.
    /// - `Error::CacheFull` if eviction cannot free enough room.
    pub fn edit(
        &mut self,
        id: MemoryId,
        content: &str,
        priority: u8,
        tags: std::collections::HashSet<String>,
    ) -> Result<()> {
        let now = Utc::now();
        let raw_len = content.len() as u64;
        if raw_len > self.config.max_total_bytes {
            return Err(Error::TooLarge(format!(
                "content is {raw_len} bytes, cache budget is {} bytes",
                self.config.max_total_bytes
            )));
        }

        // Replacing an existing block frees its bytes first.
        let previous_access_count = if let Some(old) = self.blocks.remove(&id) {
            self.total_bytes -= old.size_bytes();
            old.access_count
        } else {
            0
        };

        self.make_room_for(raw_len)?;

        let block = Block {
            id,
            payload: Payload::Raw(content.to_string()),
            priority,
            tags,
            access_count: previous_access_count,
            last_modified: now,
            uncompressed_len: raw_len,
        };
        self.total_bytes += block.size_bytes();
        self.blocks.insert(id, block);

        self.compress_if_over_threshold()?;
        Ok(())
    }

    /// Make room for `needed_bytes`. Tries compression of existing raw
    /// blocks first — a block shrunk below its original size can stay
    /// resident rather than being evicted outright — and only evicts by
    /// ascending eviction score once compression alone can't close the
    /// gap.
    fn make_room_for(&mut self, needed_bytes: u64) -> Result<()> {
        if self.total_bytes + needed_bytes > self.config.max_total_bytes {
            self.compress_eligible_raw_blocks()?;
        }
        let now = Utc::now();
        while self.total_bytes + needed_bytes > self.config.max_total_bytes {
            let victim = self
                .blocks
                .values()
                .min_by(|a, b| {
                    a.eviction_score(now)
                        .partial_cmp(&b.eviction_score(now))
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.last_modified.cmp(&b.last_modified))
                })
                .map(|b| b.id);
            match victim {
                Some(id) => {
                    if let Some(b) = self.blocks.remove(&id) {
                        self.total_bytes -= b.size_bytes();
                        tracing::debug!(memory_id = %id, "evicted cache block to make room");
                    }
                }
                None => {
                    return Err(Error::CacheFull(
                        "no blocks available to evict and space is still required".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// If resident bytes still exceed `compression_threshold * max_total_bytes`
    /// after eviction, compress every raw block whose compression would
    /// save at least `min_compression_savings` of its bytes.
    fn compress_if_over_threshold(&mut self) -> Result<()> {
        let threshold = (self.config.max_total_bytes as f64) * self.config.compression_threshold;
        if (self.total_bytes as f64) <= threshold {
            return Ok(());
        }
        self.compress_eligible_raw_blocks()
    }

    /// Compress every raw block whose compression would save at least
    /// `min_compression_savings` of its bytes, regardless of current
    /// occupancy. Shared by the pre-eviction room-making pass and the
    /// post-insert over-threshold pass.
    fn compress_eligible_raw_blocks(&mut self) -> Result<()> {
        let ids: Vec<MemoryId> = self
            .blocks
            .iter()
            .filter(|(_, b)| matches!(b.payload, Payload::Raw(_)))
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            let Some(block) = self.blocks.get(&id) else { continue };
            let Payload::Raw(content) = &block.payload else { continue };
            let compressed = gzip(content)?;
            let savings = 1.0 - (compressed.len() as f64 / block.uncompressed_len.max(1) as f64);
            if savings >= self.config.min_compression_savings {
                let old_size = block.size_bytes();
                let new_size = compressed.len() as u64;
                if let Some(block) = self.blocks.get_mut(&id) {
                    block.payload = Payload::Compressed(compressed);
                }
                self.total_bytes = self.total_bytes - old_size + new_size;
            }
        }
        Ok(())
    }

    /// Read a block's content, decompressing on demand and recording the
    /// access. Returns `None` if the id is not resident.
    ///
    /// # Errors
    ///
    /// Returns an error if the resident payload fails to decompress.
    pub fn get(&mut self, id: MemoryId) -> Result<Option<String>> {
        let Some(block) = self.blocks.get_mut(&id) else {
            return Ok(None);
        };
        let content = block.decompress()?;
        block.access_count += 1;
        block.last_modified = Utc::now();
        Ok(Some(content))
    }

    /// Remove a block, reclaiming its bytes. Returns `true` if it was
    /// resident.
    pub fn delete(&mut self, id: MemoryId) -> bool {
        if let Some(block) = self.blocks.remove(&id) {
            self.total_bytes -= block.size_bytes();
            true
        } else {
            false
        }
    }

    /// Whether `id` is currently resident.
    #[must_use]
    pub fn contains(&self, id: MemoryId) -> bool {
        self.blocks.contains_key(&id)
    }

    /// Read-only access to a block's metadata (no decompression, no access
    /// bump) — used for stats and eviction-scenario tests.
    #[must_use]
    pub fn peek(&self, id: MemoryId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    /// Decompress a block's content without recording an access or
    /// bumping `last_modified` — used to stage candidates for ranking
    /// before the engine decides which results actually get a recorded
    /// access.
    ///
    /// # Errors
    ///
    /// Returns an error if the resident payload fails to decompress.
    pub fn peek_content(&self, id: MemoryId) -> Result<Option<String>> {
        self.blocks.get(&id).map(Block::decompress).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn cache_with_budget(bytes: u64) -> CoreCache {
        CoreCache::new(CacheConfig {
            max_total_bytes: bytes,
            ..CacheConfig::default()
        })
    }

    #[test]
    fn edit_then_get_round_trips_content() {
        let mut cache = cache_with_budget(1024);
        let id = MemoryId::new();
        cache.edit(id, "hello world", 5, HashSet::new()).unwrap();
        assert_eq!(cache.get(id).unwrap(), Some("hello world".to_string()));
    }

    #[test]
    fn content_exactly_at_budget_is_accepted() {
        let mut cache = cache_with_budget(11);
        let id = MemoryId::new();
        cache.edit(id, "hello world", 5, HashSet::new()).unwrap();
        assert!(cache.contains(id));
    }

    #[test]
    fn content_one_byte_over_budget_is_rejected() {
        let mut cache = cache_with_budget(10);
        let id = MemoryId::new();
        let err = cache.edit(id, "hello world", 5, HashSet::new()).unwrap_err();
        assert!(matches!(err, Error::TooLarge(_)));
    }

    #[test]
    fn total_bytes_never_exceeds_budget_after_eviction() {
        // Budget only fits two 40-byte raw blocks at once, but the gzip of a
        // 40-byte run of one repeated character compresses well past the
        // 20% savings floor, so the three highest-scored blocks end up
        // resident (compressed) rather than the priority-1 block surviving
        // on raw bytes alone.
        let mut cache = cache_with_budget(100);
        let a = MemoryId::new();
        let b = MemoryId::new();
        let c = MemoryId::new();
        cache.edit(a, &"a".repeat(40), 1, HashSet::new()).unwrap();
        cache.edit(b, &"b".repeat(40), 5, HashSet::new()).unwrap();
        cache.edit(c, &"c".repeat(40), 9, HashSet::new()).unwrap();

        let d = MemoryId::new();
        cache.edit(d, &"d".repeat(40), 7, HashSet::new()).unwrap();

        assert!(cache.total_bytes() <= 100);
        // Priority-1 block should have been evicted first.
        assert!(!cache.contains(a));
        assert!(cache.contains(b));
        assert!(cache.contains(c));
        assert!(cache.contains(d));
        assert!(cache.peek(b).unwrap().is_compressed());
        assert!(cache.peek(c).unwrap().is_compressed());
        assert!(cache.peek(d).unwrap().is_compressed());
    }

    #[test]
    fn cache_full_when_single_block_too_large_to_evict_for() {
        // Budget fits exactly one 40-byte block; a 100-byte block can never
        // fit regardless of eviction, so edit fails with TooLarge first.
        let mut cache = cache_with_budget(50);
        let a = MemoryId::new();
        cache.edit(a, &"a".repeat(40), 1, HashSet::new()).unwrap();
        let big = MemoryId::new();
        let err = cache.edit(big, &"b".repeat(100), 5, HashSet::new()).unwrap_err();
        assert!(matches!(err, Error::TooLarge(_)));
    }

    #[test]
    fn compression_triggers_past_threshold_and_saves_bytes() {
        // Highly compressible content, budget small enough that resident
        // bytes exceed 80% after insertion.
        let mut cache = cache_with_budget(200);
        let id = MemoryId::new();
        let content = "x".repeat(180);
        cache.edit(id, &content, 5, HashSet::new()).unwrap();
        let block = cache.peek(id).unwrap();
        assert!(block.is_compressed());
        assert!(block.size_bytes() < 180);
    }

    #[test]
    fn delete_reclaims_bytes() {
        let mut cache = cache_with_budget(1024);
        let id = MemoryId::new();
        cache.edit(id, "hello", 5, HashSet::new()).unwrap();
        assert!(cache.delete(id));
        assert_eq!(cache.total_bytes(), 0);
        assert!(!cache.delete(id));
    }

    #[test]
    fn get_increments_access_count() {
        let mut cache = cache_with_budget(1024);
        let id = MemoryId::new();
        cache.edit(id, "hello", 5, HashSet::new()).unwrap();
        cache.get(id).unwrap();
        cache.get(id).unwrap();
        assert_eq!(cache.peek(id).unwrap().access_count, 2);
    }
}
