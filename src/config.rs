use std::{collections::HashSet, fmt, fs, path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Deserializer, de::{MapAccess, Visitor}};

/// NAD83 longitude/latitude, the coordinate system TIGER block geometries ship in.
pub const NAD83_LONLAT: &str = "+proj=longlat +datum=NAD83 +no_defs +type=crs";

/// California Albers (EPSG:3310), an equal-area system in meters.
pub const CALIFORNIA_ALBERS: &str =
    "+proj=aea +lat_0=0 +lon_0=-120 +lat_1=34 +lat_2=40.5 +x_0=0 +y_0=-4000000 +datum=NAD83 +units=m +no_defs +type=crs";

/// Run configuration. Built once per invocation and passed by reference to the orchestrator.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Enumeration snapshot the block counts belong to, e.g. "2020".
    pub vintage: String,
    /// Default conservation tolerance, as a fraction (0.01 = 1%).
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Worker threads for layer processing; rayon's default when absent.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Coarse per-layer timeout in seconds, checked between pipeline stages.
    #[serde(default)]
    pub layer_timeout_secs: Option<f64>,
    #[serde(default)]
    pub crs: CrsConfig,
    #[serde(default)]
    pub blocks: BlockConfig,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrsConfig {
    /// PROJ.4 definition of the coordinate system blocks and targets arrive in.
    #[serde(default = "default_source_crs")]
    pub source: String,
    /// PROJ.4 definition of the equal-area system used for every area computation.
    #[serde(default = "default_equal_area_crs")]
    pub equal_area: String,
}

impl Default for CrsConfig {
    fn default() -> Self {
        Self { source: default_source_crs(), equal_area: default_equal_area_crs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockConfig {
    /// Identifier field shared by the block geometries and the attribute table.
    #[serde(default = "default_block_id_field")]
    pub id_field: String,
    /// Provider column -> value column, in output order.
    #[serde(default, deserialize_with = "ordered_pairs")]
    pub column_mapping: Vec<(String, String)>,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self { id_field: default_block_id_field(), column_mapping: Vec::new() }
    }
}

impl BlockConfig {
    /// Value column names, in mapping order.
    pub fn value_columns(&self) -> Vec<String> {
        self.column_mapping.iter().map(|(_, name)| name.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryType {
    #[default]
    Polygon,
    Point,
    Line,
}

/// How a layer treats targets that overlap each other in area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapMode {
    /// Fail the layer if any two targets share more interior area than the
    /// layer's overlap tolerance allows.
    #[default]
    Prohibit,
    /// Every overlapping target receives its full share of each block.
    DoubleCount,
}

/// The per-block normalizing denominator used to turn fragment areas into weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenominatorMode {
    /// Area of the block covered by the layer: all of a block's value is redistributed.
    #[default]
    Covered,
    /// Full projected area of the block: uncovered parts of a block are lost.
    TrueArea,
}

/// An authoritative total to compare a layer's apportioned total against.
#[derive(Debug, Clone, Deserialize)]
pub struct Benchmark {
    pub column: String,
    pub total: f64,
    /// Overrides the layer tolerance for this benchmark only.
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    #[serde(default)]
    pub id_field: Option<String>,
    #[serde(default)]
    pub name_field: Option<String>,
    #[serde(default)]
    pub geometry_type: GeometryType,
    #[serde(default)]
    pub value_columns: Option<Vec<String>>,
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub overlap: OverlapMode,
    /// Shared area below this fraction of the smaller target's area is a
    /// digitizing sliver, not an overlap. Only used in `prohibit` mode.
    #[serde(default = "default_overlap_tolerance")]
    pub overlap_tolerance: f64,
    #[serde(default)]
    pub denominator: DenominatorMode,
    #[serde(default)]
    pub benchmarks: Vec<Benchmark>,
    /// Overrides the run's `layer_timeout_secs` for this layer.
    #[serde(default)]
    pub timeout_secs: Option<f64>,
}

impl LayerConfig {
    /// A polygon layer with every default setting.
    pub fn polygon(name: impl Into<String>, id_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_field: Some(id_field.into()),
            name_field: None,
            geometry_type: GeometryType::Polygon,
            value_columns: None,
            tolerance: None,
            overlap: OverlapMode::default(),
            overlap_tolerance: default_overlap_tolerance(),
            denominator: DenominatorMode::default(),
            benchmarks: Vec::new(),
            timeout_secs: None,
        }
    }

    /// Only polygon layers can receive apportioned counts.
    #[inline] pub fn is_apportionable(&self) -> bool { self.geometry_type == GeometryType::Polygon }

    /// Time this layer may spend before it fails at the next stage boundary.
    pub fn timeout(&self, config: &Config) -> Option<Duration> {
        self.timeout_secs.or(config.layer_timeout_secs).map(Duration::from_secs_f64)
    }

    /// Resolve this layer's schema against the run defaults.
    pub fn schema(&self, config: &Config) -> LayerSchema {
        let id_field = self.id_field.clone()
            .or_else(|| self.name_field.clone())
            .unwrap_or_else(|| "id".to_string());

        LayerSchema {
            layer_name: Arc::from(self.name.as_str()),
            id_field,
            value_columns: self.value_columns.clone().unwrap_or_else(|| config.blocks.value_columns()),
            tolerance: self.tolerance.unwrap_or(config.tolerance),
            overlap: self.overlap,
            overlap_tolerance: self.overlap_tolerance,
            denominator: self.denominator,
            benchmarks: self.benchmarks.clone(),
        }
    }
}

/// Everything the pipeline needs to know about one layer, resolved once at load time.
#[derive(Debug, Clone)]
pub struct LayerSchema {
    pub layer_name: Arc<str>,
    pub id_field: String,
    pub value_columns: Vec<String>,
    pub tolerance: f64,
    pub overlap: OverlapMode,
    pub overlap_tolerance: f64,
    pub denominator: DenominatorMode,
    pub benchmarks: Vec<Benchmark>,
}

impl Config {
    /// Minimal configuration: default CRS pair, no layers.
    pub fn new(vintage: impl Into<String>, column_mapping: Vec<(String, String)>) -> Self {
        Self {
            vintage: vintage.into(),
            tolerance: default_tolerance(),
            workers: None,
            layer_timeout_secs: None,
            crs: CrsConfig::default(),
            blocks: BlockConfig { id_field: default_block_id_field(), column_mapping },
            layers: Vec::new(),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .context("[config] Failed to parse YAML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("[config] Failed to read configuration: {}", path.display()))?;
        Self::from_yaml_str(&yaml)
            .with_context(|| format!("[config] Invalid configuration in {}", path.display()))
    }

    /// Check cross-field invariants the type system can't express.
    pub fn validate(&self) -> Result<()> {
        fn check_tolerance(what: &str, tol: f64) -> Result<()> {
            ensure!(tol.is_finite() && tol >= 0.0, "[config] {what}: tolerance must be a non-negative fraction, got {tol}");
            Ok(())
        }

        check_tolerance("run", self.tolerance)?;
        ensure!(self.workers != Some(0), "[config] workers must be at least 1");
        let timeouts = std::iter::once(self.layer_timeout_secs).chain(self.layers.iter().map(|l| l.timeout_secs));
        for secs in timeouts.flatten() {
            ensure!(secs.is_finite() && secs >= 0.0, "[config] timeout must be a non-negative number of seconds, got {secs}");
        }

        let mapped: HashSet<&str> = self.blocks.column_mapping.iter().map(|(_, name)| name.as_str()).collect();
        ensure!(mapped.len() == self.blocks.column_mapping.len(), "[config] column_mapping has duplicate value column names");

        let mut names = HashSet::new();
        for layer in &self.layers {
            if !names.insert(layer.name.as_str()) {
                bail!("[config] layer {:?} is declared twice", layer.name);
            }
            if let Some(tol) = layer.tolerance { check_tolerance(&layer.name, tol)?; }
            check_tolerance(&layer.name, layer.overlap_tolerance)?;
            for column in layer.value_columns.iter().flatten() {
                ensure!(mapped.contains(column.as_str()),
                    "[config] layer {:?} apportions unknown value column {column:?}", layer.name);
            }
            for benchmark in &layer.benchmarks {
                if let Some(tol) = benchmark.tolerance { check_tolerance(&layer.name, tol)?; }
                ensure!(benchmark.total.is_finite() && benchmark.total >= 0.0,
                    "[config] layer {:?}: benchmark total must be non-negative", layer.name);
            }
        }

        Ok(())
    }
}

fn default_tolerance() -> f64 { 0.01 }

fn default_overlap_tolerance() -> f64 { 1e-4 }

fn default_source_crs() -> String { NAD83_LONLAT.to_string() }

fn default_equal_area_crs() -> String { CALIFORNIA_ALBERS.to_string() }

fn default_block_id_field() -> String { "block_geoid".to_string() }

/// Deserialize a YAML mapping into (key, value) pairs, keeping document order.
fn ordered_pairs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<(String, String)>, D::Error> {
    struct PairVisitor;

    impl<'de> Visitor<'de> for PairVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a mapping of provider column to value column")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((k, v)) = map.next_entry::<String, String>()? {
                pairs.push((k, v));
            }
            Ok(pairs)
        }
    }

    deserializer.deserialize_map(PairVisitor)
}
