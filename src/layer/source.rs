use std::{collections::HashMap, path::PathBuf, sync::Arc};

use anyhow::{Context, Result, anyhow};

use crate::io::{geojson::{self, Feature}, shp};

/// Read-only access to the raw target features of a layer, by layer name.
/// Implementations are shared across worker threads.
pub trait TargetSource: Send + Sync {
    fn load(&self, layer: &str) -> Result<Vec<Feature>>;
}

/// Layers stored on disk as `<root>/<layer>.geojson`, or `<root>/<layer>.shp`
/// when no GeoJSON file exists.
pub struct DiskTargets {
    root: PathBuf,
    /// Attribute fields read from shapefiles; empty keeps every field. GeoJSON keeps every property.
    fields: Vec<String>,
}

impl DiskTargets {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into(), fields: Vec::new() } }

    /// Restrict the attribute fields kept when a layer is read from a shapefile.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

impl TargetSource for DiskTargets {
    fn load(&self, layer: &str) -> Result<Vec<Feature>> {
        let geojson = self.root.join(format!("{layer}.geojson"));
        if geojson.exists() {
            return geojson::read_features(&geojson);
        }

        let shapefile = self.root.join(format!("{layer}.shp"));
        if shapefile.exists() {
            let fields: Vec<&str> = self.fields.iter().map(String::as_str).collect();
            return shp::read_features(&shapefile, &fields);
        }

        Err(anyhow!("[layer::source] no geometry file for layer {layer:?} under {}", self.root.display()))
    }
}

/// In-memory layers, keyed by layer name.
#[derive(Default, Clone)]
pub struct MemTargets {
    pub(crate) layers: HashMap<String, Arc<[Feature]>>,
}

impl MemTargets {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, layer: impl Into<String>, features: Vec<Feature>) {
        self.layers.insert(layer.into(), Arc::from(features));
    }

    pub fn with_layer(mut self, layer: impl Into<String>, features: Vec<Feature>) -> Self {
        self.insert(layer, features);
        self
    }
}

impl TargetSource for MemTargets {
    fn load(&self, layer: &str) -> Result<Vec<Feature>> {
        self.layers.get(layer)
            .map(|features| features.to_vec())
            .with_context(|| format!("[layer::source] missing layer: {layer}"))
    }
}
