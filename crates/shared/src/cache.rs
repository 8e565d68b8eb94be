//! Bounded LRU store of pre-scaled icon bitmaps.
//!
//! Two namespaces are kept side by side so that the base pointer icons and
//! the category badges never evict each other. A failed load is never
//! cached: the next request for the same key goes back to the source.
use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use lru::LruCache;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CAPACITY: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IconLayer {
    Base,
    Overlay,
}

/// A decoded, scaled RGBA bitmap, or the empty sentinel.
#[derive(Clone, Default)]
pub struct Bitmap(Option<Arc<RgbaImage>>);

impl Bitmap {
    pub fn empty() -> Self {
        Bitmap(None)
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Bitmap(Some(Arc::new(image)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn image(&self) -> Option<&RgbaImage> {
        self.0.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.0.as_ref().map_or(0, |img| img.width())
    }

    pub fn height(&self) -> u32 {
        self.0.as_ref().map_or(0, |img| img.height())
    }

    /// True when both bitmaps hold the same shared allocation.
    pub fn ptr_eq(&self, other: &Bitmap) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(img) => write!(f, "Bitmap({}x{})", img.width(), img.height()),
            None => write!(f, "Bitmap(empty)"),
        }
    }
}

/// Where source images come from.
pub trait ImageSource {
    fn load(&self, path: &str) -> Result<DynamicImage, String>;
}

/// Reads images from disk relative to an asset root.
pub struct FsImageSource {
    root: PathBuf,
}

impl FsImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsImageSource { root: root.into() }
    }
}

impl ImageSource for FsImageSource {
    /// `path` must stay inside the root: absolute paths and `..` or other
    /// non-plain components are refused.
    fn load(&self, path: &str) -> Result<DynamicImage, String> {
        let relative = Path::new(path);
        if relative.as_os_str().is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(format!("Refusing icon path outside the asset root: {}", path));
        }
        let full = self.root.join(relative);
        image::open(&full).map_err(|e| format!("Failed to load {}: {}", full.display(), e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: String,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub failures: u64,
}

struct Namespace {
    entries: LruCache<CacheKey, Bitmap>,
    stats: CacheStats,
}

impl Namespace {
    fn new(capacity: NonZeroUsize) -> Self {
        Namespace {
            entries: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }
}

pub struct AssetCache {
    source: Box<dyn ImageSource + Send>,
    base: Namespace,
    overlay: Namespace,
}

impl AssetCache {
    pub fn new(source: impl ImageSource + Send + 'static) -> Self {
        Self::with_capacity(source, DEFAULT_CAPACITY)
    }

    /// A capacity of 0 is treated as 1.
    pub fn with_capacity(source: impl ImageSource + Send + 'static, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        AssetCache {
            source: Box::new(source),
            base: Namespace::new(capacity),
            overlay: Namespace::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.base.entries.cap().get()
    }

    fn namespace_mut(&mut self, layer: IconLayer) -> &mut Namespace {
        match layer {
            IconLayer::Base => &mut self.base,
            IconLayer::Overlay => &mut self.overlay,
        }
    }

    fn namespace(&self, layer: IconLayer) -> &Namespace {
        match layer {
            IconLayer::Base => &self.base,
            IconLayer::Overlay => &self.overlay,
        }
    }

    /// Fetch `path` scaled to fit `width` x `height`, keeping its aspect
    /// ratio. Returns [`Bitmap::empty`] when the image cannot be produced.
    pub fn get(&mut self, layer: IconLayer, path: &str, width: u32, height: u32) -> Bitmap {
        let key = CacheKey {
            path: path.to_string(),
            width,
            height,
        };

        {
            let ns = self.namespace_mut(layer);
            if let Some(hit) = ns.entries.get(&key) {
                let hit = hit.clone();
                ns.stats.hits += 1;
                return hit;
            }
            ns.stats.misses += 1;
        }

        if width == 0 || height == 0 {
            tracing::warn!(path, width, height, "Refusing to scale icon to an empty size");
            self.namespace_mut(layer).stats.failures += 1;
            return Bitmap::empty();
        }

        let bitmap = match self.source.load(path) {
            Ok(img) => Bitmap::from_image(
                img.resize(width, height, FilterType::Triangle).into_rgba8(),
            ),
            Err(e) => {
                tracing::warn!(?layer, error = %e, "Icon load failed");
                self.namespace_mut(layer).stats.failures += 1;
                return Bitmap::empty();
            }
        };

        let ns = self.namespace_mut(layer);
        if let Some((evicted, _)) = ns.entries.push(key, bitmap.clone()) {
            ns.stats.evictions += 1;
            tracing::debug!(?layer, path = %evicted.path, "Evicted icon");
        }
        bitmap
    }

    /// Whether a key is cached, without touching its recency.
    pub fn contains(&self, layer: IconLayer, path: &str, width: u32, height: u32) -> bool {
        let key = CacheKey {
            path: path.to_string(),
            width,
            height,
        };
        self.namespace(layer).entries.contains(&key)
    }

    pub fn stats(&self, layer: IconLayer) -> CacheStats {
        let ns = self.namespace(layer);
        CacheStats {
            entries: ns.entries.len(),
            ..ns.stats
        }
    }
}
