//! Preview render cache.
//!
//! Rendering a crop at full oversampling is the expensive part of editing:
//! every drag event would otherwise re-filter and re-encode the source. This
//! module keeps the latest preview render per image and serves it back as
//! long as neither the source nor the render parameters changed.
//!
//! # Design
//!
//! The cache is **content-addressed**: lookups are by the combination of
//! `source_hash` and `params_hash`, not by image index. Reordering or
//! removing images does not invalidate anything; only actual pixel content
//! or render parameter changes do.
//!
//! - **`source_hash`**: SHA-256 of the encoded input blob, computed once at
//!   decode time and stored on the [`SourceImage`](crate::types::SourceImage).
//! - **`params_hash`**: SHA-256 of everything else the render depends on:
//!   crop rectangle, effect spec, resize target, output format and pixel
//!   ratio.
//!
//! Each image index additionally points at its *latest* entry. The
//! fingerprint of that entry is how a caller tells "no crop rendered yet"
//! (`None`) from "ready" (`Some(hash)`), and whether the preview changed.

use crate::effects::EffectSpec;
use crate::imaging::OutputFormat;
use crate::render::RenderOutput;
use crate::types::{CropRect, ImageIndex};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// SHA-256 of a byte buffer, as a lowercase hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 of the render parameters.
///
/// Inputs: crop rectangle, effect spec, resize target, output format and
/// oversampling ratio. If any of these change, the preview is re-rendered.
pub fn hash_render_params(
    rect: CropRect,
    effects: &EffectSpec,
    resize_target: Option<(u32, u32)>,
    format: OutputFormat,
    pixel_ratio: f64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"render\0");
    for v in [rect.x, rect.y, rect.width, rect.height, pixel_ratio] {
        hasher.update(v.to_le_bytes());
    }
    // serde_json output is stable for a given struct layout
    hasher.update(serde_json::to_vec(effects).unwrap_or_default());
    match resize_target {
        Some((w, h)) => {
            hasher.update(b"\x01");
            hasher.update(w.to_le_bytes());
            hasher.update(h.to_le_bytes());
        }
        None => {
            hasher.update(b"\x00");
        }
    }
    match format {
        OutputFormat::Png => hasher.update(b"png"),
        OutputFormat::Jpeg(q) => {
            hasher.update(b"jpeg");
            hasher.update(q.value().to_le_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}

fn content_key(source_hash: &str, params_hash: &str) -> String {
    format!("{}:{}", source_hash, params_hash)
}

/// In-memory cache of preview renders.
#[derive(Debug, Default)]
pub struct RenderCache {
    entries: HashMap<String, Arc<RenderOutput>>,
    latest: HashMap<ImageIndex, String>,
    stats: CacheStats,
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a render by content hashes. A hit also makes it the latest
    /// render for `index`.
    pub fn lookup(
        &mut self,
        index: ImageIndex,
        source_hash: &str,
        params_hash: &str,
    ) -> Option<Arc<RenderOutput>> {
        let key = content_key(source_hash, params_hash);
        match self.entries.get(&key).cloned() {
            Some(output) => {
                self.stats.hit();
                self.point(index, key);
                Some(output)
            }
            None => {
                self.stats.miss();
                None
            }
        }
    }

    /// Store a fresh render as the latest for `index`. Empty sentinels are
    /// not cached.
    pub fn insert(
        &mut self,
        index: ImageIndex,
        source_hash: &str,
        params_hash: &str,
        output: RenderOutput,
    ) -> Arc<RenderOutput> {
        let output = Arc::new(output);
        if output.is_empty() {
            self.forget(index);
            return output;
        }
        let key = content_key(source_hash, params_hash);
        self.entries.insert(key.clone(), Arc::clone(&output));
        self.point(index, key);
        output
    }

    /// Fingerprint of the latest render for `index`.
    pub fn fingerprint(&self, index: ImageIndex) -> Option<&str> {
        let key = self.latest.get(&index)?;
        self.entries.get(key).map(|o| o.fingerprint.as_str())
    }

    /// Drop the latest pointer for `index` (and its entry once unreferenced).
    pub fn forget(&mut self, index: ImageIndex) {
        if let Some(old) = self.latest.remove(&index) {
            self.evict_if_unreferenced(&old);
        }
    }

    /// Move latest pointers along with a reorder. Indices missing from the
    /// mapping are forgotten.
    pub fn reindex(&mut self, mapping: &HashMap<ImageIndex, ImageIndex>) {
        let old = std::mem::take(&mut self.latest);
        for (index, key) in old {
            if let Some(&new_index) = mapping.get(&index) {
                self.latest.insert(new_index, key);
            }
        }
        let live: std::collections::HashSet<&String> = self.latest.values().collect();
        self.entries.retain(|k, _| live.contains(k));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.latest.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn point(&mut self, index: ImageIndex, key: String) {
        if let Some(old) = self.latest.insert(index, key.clone())
            && old != key
        {
            self.evict_if_unreferenced(&old);
        }
    }

    fn evict_if_unreferenced(&mut self, key: &str) {
        if !self.latest.values().any(|k| k == key) {
            self.entries.remove(key);
        }
    }
}

/// Summary of cache performance.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} rendered ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} rendered", self.misses)
        }
    }
}
