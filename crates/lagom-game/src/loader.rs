//! Named, shared resources that load asynchronously
//!
//! Handles are registered up front and resolved together by
//! [`ResourceLoader::load_all`]. The frame loop never waits on them; a
//! resource that is not loaded yet simply reports `is_loaded() == false`.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::ResourceError;

pub type LoadFuture = Pin<Box<dyn Future<Output = Result<(), ResourceError>> + Send + 'static>>;

/// A shared handle the loader can resolve in the background.
pub trait Resource: Send + Sync + 'static {
    /// Load the resource's data. Relative paths resolve against `base`.
    fn load(self: Arc<Self>, base: PathBuf) -> LoadFuture;

    fn is_loaded(&self) -> bool;
}

struct Registered {
    resource: Arc<dyn Resource>,
    any: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

/// Registry of named resources
pub struct ResourceLoader {
    base_path: PathBuf,
    resources: HashMap<String, Registered>,
}

impl Default for ResourceLoader {
    fn default() -> Self {
        Self::new(".")
    }
}

impl ResourceLoader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        debug!("ResourceLoader created with base path: {}", base_path.display());
        Self {
            base_path,
            resources: HashMap::new(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Register `resource` under `name`, replacing any earlier entry.
    pub fn add_resource<R: Resource>(&mut self, name: impl Into<String>, resource: R) -> Arc<R> {
        let name = name.into();
        let handle = Arc::new(resource);
        let previous = self.resources.insert(
            name.clone(),
            Registered {
                resource: handle.clone(),
                any: handle.clone(),
                type_name: std::any::type_name::<R>(),
            },
        );
        if let Some(previous) = previous {
            warn!(name = %name, replaced = previous.type_name, "resource name reused");
        }
        handle
    }

    pub fn get<R: Resource>(&self, name: &str) -> Result<Arc<R>, ResourceError> {
        let entry = self.resources.get(name).ok_or_else(|| {
            warn!(name, "resource not defined");
            ResourceError::NotFound(name.to_string())
        })?;
        entry
            .any
            .clone()
            .downcast::<R>()
            .map_err(|_| ResourceError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<R>(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Whether every registered resource has finished loading.
    pub fn all_loaded(&self) -> bool {
        self.resources.values().all(|r| r.resource.is_loaded())
    }

    /// Load every registered resource concurrently.
    ///
    /// All loads run to completion; the first failure is returned.
    pub async fn load_all(&self) -> Result<(), ResourceError> {
        let start = Instant::now();
        let mut tasks = JoinSet::new();
        for (name, entry) in &self.resources {
            let name = name.clone();
            let load = entry.resource.clone().load(self.base_path.clone());
            tasks.spawn(async move { (name, load.await) });
        }

        let mut loaded = 0usize;
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    debug!(name = %name, "resource loaded");
                    loaded += 1;
                }
                Ok((name, Err(err))) => {
                    warn!(name = %name, error = %err, "resource failed to load");
                    first_error.get_or_insert(err);
                }
                Err(err) => {
                    warn!(error = %err, "resource load task failed");
                    first_error.get_or_insert(ResourceError::Task(err.to_string()));
                }
            }
        }

        info!(
            loaded,
            total = self.resources.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "resources loaded"
        );
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Decoded RGBA8 image data.
#[derive(Debug, Clone)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Image split into equally sized frames, read left to right, top to bottom.
#[derive(Debug)]
pub struct SpriteSheet {
    path: PathBuf,
    frame_width: u32,
    frame_height: u32,
    texture: RwLock<Option<Arc<Texture>>>,
}

impl SpriteSheet {
    pub fn new(path: impl Into<PathBuf>, frame_width: u32, frame_height: u32) -> Self {
        Self {
            path: path.into(),
            frame_width: frame_width.max(1),
            frame_height: frame_height.max(1),
            texture: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.frame_width, self.frame_height)
    }

    pub fn texture(&self) -> Option<Arc<Texture>> {
        self.texture.read().clone()
    }

    /// Frames per row and per column, once loaded.
    pub fn grid(&self) -> Option<(u32, u32)> {
        let texture = self.texture.read();
        texture.as_ref().map(|t| {
            (
                t.width / self.frame_width,
                t.height / self.frame_height,
            )
        })
    }

    pub fn frame_count(&self) -> usize {
        self.grid().map_or(0, |(cols, rows)| (cols * rows) as usize)
    }

    /// Pixel rectangle `(x, y, width, height)` of frame `index`.
    pub fn frame_rect(&self, index: usize) -> Option<(u32, u32, u32, u32)> {
        let (cols, rows) = self.grid()?;
        if index >= (cols * rows) as usize {
            return None;
        }
        let index = index as u32;
        Some((
            (index % cols) * self.frame_width,
            (index / cols) * self.frame_height,
            self.frame_width,
            self.frame_height,
        ))
    }

    fn resolve(&self, base: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            base.join(&self.path)
        }
    }

    async fn decode(&self, base: PathBuf) -> Result<(), ResourceError> {
        let full_path = self.resolve(&base);
        let bytes = tokio::fs::read(&full_path)
            .await
            .map_err(|e| ResourceError::Io(full_path.clone(), e))?;

        let decode_path = full_path.clone();
        let rgba = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&bytes)
                .map(|img| img.to_rgba8())
                .map_err(|e| ResourceError::Decode(decode_path, e.to_string()))
        })
        .await
        .map_err(|e| ResourceError::Task(e.to_string()))??;

        let (width, height) = rgba.dimensions();
        if width % self.frame_width != 0 || height % self.frame_height != 0 {
            return Err(ResourceError::FrameSize {
                path: full_path,
                width,
                height,
                frame_width: self.frame_width,
                frame_height: self.frame_height,
            });
        }

        *self.texture.write() = Some(Arc::new(Texture {
            width,
            height,
            data: rgba.into_raw(),
        }));
        Ok(())
    }
}

impl Resource for SpriteSheet {
    fn load(self: Arc<Self>, base: PathBuf) -> LoadFuture {
        Box::pin(async move { self.decode(base).await })
    }

    fn is_loaded(&self) -> bool {
        self.texture.read().is_some()
    }
}
