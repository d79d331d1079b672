use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use image::ImageReader;
use tracing::{debug, warn};

use crate::events::{EventQueue, GameEvent};

/// Decoded RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl LoadedImage {
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let bytes = self.rgba.get(offset..offset + 4)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

/// Lazily decoded images under an asset root, keyed by normalized
/// relative path so `sprites/npc` and `sprites/npc.png` share an entry.
///
/// Failed loads are remembered and warned about once; callers draw a
/// placeholder instead.
#[derive(Debug)]
pub struct AssetStore {
    root: PathBuf,
    images: HashMap<String, Option<LoadedImage>>,
    warned: HashSet<String>,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            images: HashMap::new(),
            warned: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Registers an already decoded image under `key`.
    pub fn insert(&mut self, key: &str, image: LoadedImage) {
        self.images.insert(cache_key(key), Some(image));
    }

    pub fn image(&mut self, key: &str) -> Option<&LoadedImage> {
        let slot = cache_key(key);
        if !self.images.contains_key(&slot) {
            let loaded = self.load(key);
            self.images.insert(slot.clone(), loaded);
        }
        self.images.get(&slot).and_then(Option::as_ref)
    }

    pub fn is_loaded(&self, key: &str) -> bool {
        matches!(self.images.get(&cache_key(key)), Some(Some(_)))
    }

    /// Decodes every PNG directly under the given subdirectories of the
    /// root. Emits `AssetLoaded` per decoded image, then `AssetsComplete`.
    /// Returns how many decoded.
    pub fn preload(&mut self, dirs: &[String], events: &mut EventQueue) -> usize {
        let mut loaded = 0;
        for key in self.discover(dirs) {
            if self.image(&key).is_some() {
                events.emit(GameEvent::AssetLoaded { asset: key });
                loaded += 1;
            }
        }
        events.emit(GameEvent::AssetsComplete);
        loaded
    }

    fn discover(&self, dirs: &[String]) -> Vec<String> {
        let mut keys = Vec::new();
        for dir in dirs {
            let entries = match fs::read_dir(self.root.join(dir)) {
                Ok(entries) => entries,
                Err(error) => {
                    debug!(dir = %dir, error = %error, "asset_dir_skipped");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !path
                    .extension()
                    .is_some_and(|extension| extension.eq_ignore_ascii_case("png"))
                {
                    continue;
                }
                if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                    keys.push(format!("{dir}/{name}"));
                }
            }
        }
        keys.sort();
        keys
    }

    fn load(&mut self, key: &str) -> Option<LoadedImage> {
        let Some(relative) = normalize_key(key) else {
            self.warn_once(key, None, "key_escapes_asset_root");
            return None;
        };
        let path = self.root.join(relative);
        match decode_rgba(&path) {
            Ok(image) => {
                debug!(key, width = image.width, height = image.height, "image_loaded");
                Some(image)
            }
            Err(reason) => {
                self.warn_once(key, Some(&path), &reason);
                None
            }
        }
    }

    fn warn_once(&mut self, key: &str, path: Option<&Path>, reason: &str) {
        if !self.warned.insert(key.to_string()) {
            return;
        }
        let path = path.map_or_else(|| "<unresolved>".to_string(), |path| path.display().to_string());
        warn!(key, path = %path, reason, "image_load_failed_using_placeholder");
    }
}

fn cache_key(key: &str) -> String {
    normalize_key(key).map_or_else(|| key.to_string(), |path| path.to_string_lossy().into_owned())
}

/// Collapses `.` and `..` lexically and appends `.png` when the key has no
/// extension. `None` when the key is absolute or climbs above the root.
pub fn normalize_key(key: &str) -> Option<PathBuf> {
    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(key).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    let mut path: PathBuf = parts.iter().collect();
    if path.extension().is_none() {
        path.set_extension("png");
    }
    Some(path)
}

fn decode_rgba(path: &Path) -> Result<LoadedImage, String> {
    let reader = ImageReader::open(path).map_err(|error| format!("open_failed:{error}"))?;
    let decoded = reader
        .decode()
        .map_err(|error| format!("decode_failed:{error}"))?;
    let image = decoded.to_rgba8();
    Ok(LoadedImage {
        width: image.width(),
        height: image.height(),
        rgba: image.into_raw(),
    })
}
