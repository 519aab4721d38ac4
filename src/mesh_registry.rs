use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::mesh::{Mesh, MeshBounds};
use crate::renderer::{GpuMesh, Renderer};

/// Keyed mesh store. CPU meshes are inserted eagerly; GPU buffers are
/// created on first draw and destroyed explicitly when the entry is
/// removed, so a rebuild never strands buffers on the device.
#[derive(Default)]
pub struct MeshRegistry {
    entries: HashMap<String, MeshEntry>,
}

struct MeshEntry {
    mesh: Mesh,
    gpu: Option<GpuMesh>,
}

impl MeshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, mesh: Mesh) {
        // Replacing an entry releases the old GPU buffers first.
        let key = key.into();
        if let Some(old) = self.entries.insert(key, MeshEntry { mesh, gpu: None }) {
            if let Some(gpu) = old.gpu {
                gpu.destroy();
            }
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn bounds(&self, key: &str) -> Option<&MeshBounds> {
        self.entries.get(key).map(|entry| &entry.mesh.bounds)
    }

    pub fn mesh(&self, key: &str) -> Option<&Mesh> {
        self.entries.get(key).map(|entry| &entry.mesh)
    }

    pub fn gpu_mesh(&self, key: &str) -> Option<&GpuMesh> {
        self.entries.get(key).and_then(|entry| entry.gpu.as_ref())
    }

    pub fn ensure_gpu<'a>(&'a mut self, key: &str, renderer: &Renderer) -> Result<&'a GpuMesh> {
        let entry =
            self.entries.get_mut(key).ok_or_else(|| anyhow!("Mesh '{key}' not registered in registry"))?;
        if entry.gpu.is_none() {
            let gpu = renderer.create_gpu_mesh(&entry.mesh)?;
            entry.gpu = Some(gpu);
        }
        entry.gpu.as_ref().ok_or_else(|| anyhow!("GPU mesh for '{key}' missing after upload"))
    }

    /// Removes an entry and destroys its GPU buffers, if any were created.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                if let Some(gpu) = entry.gpu {
                    gpu.destroy();
                }
                true
            }
            None => false,
        }
    }

    /// Drops every entry, destroying GPU buffers. Teardown path.
    pub fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            if let Some(gpu) = entry.gpu {
                gpu.destroy();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn insert_remove_round_trip() {
        let mut registry = MeshRegistry::new();
        registry.insert("card", Mesh::card(1.0, 0.6, 0.1));
        assert!(registry.has("card"));
        assert_eq!(registry.len(), 1);
        let bounds = registry.bounds("card").expect("bounds present");
        assert!(bounds.radius > 0.0);
        assert!(registry.remove("card"));
        assert!(!registry.remove("card"));
        assert!(registry.is_empty());
    }

    #[test]
    fn replacing_an_entry_keeps_a_single_slot() {
        let mut registry = MeshRegistry::new();
        registry.insert("card", Mesh::card(1.0, 0.6, 0.1));
        registry.insert("card", Mesh::card(2.0, 0.6, 0.1));
        assert_eq!(registry.len(), 1);
        let bounds = registry.bounds("card").expect("bounds present");
        assert!(bounds.max.distance(Vec3::new(1.0, 0.3, 0.05)) < 1e-6);
    }
}
