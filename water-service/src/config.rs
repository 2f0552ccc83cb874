use serde::Deserialize;
use std::{collections::BTreeMap, fs, path::PathBuf};

use water_client::{
    domain::{PeriodKey, TypeCategories, ZoneDirectory},
    PeriodCatalog,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Csv,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Pivoted monthly export; required when `kind = "csv"`.
    pub csv_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub first: PeriodKey,
    pub last: PeriodKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub excluded_meters: Vec<String>,
    #[serde(default = "default_alert_pct")]
    pub high_loss_alert_pct: f64,
}

fn default_alert_pct() -> f64 {
    20.0
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            excluded_meters: Vec::new(),
            high_loss_alert_pct: default_alert_pct(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub database: Option<DatabaseConfig>,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
    /// Category name to meter `type` values. Empty means the built-in
    /// grouping.
    #[serde(default)]
    pub type_categories: BTreeMap<String, Vec<String>>,
    pub http: HttpConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("WATER_CONFIG").unwrap_or_else(|_| "water-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{path}': {e}"))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        if cfg.source.kind == SourceKind::Csv && cfg.source.csv_path.is_none() {
            anyhow::bail!("source.csv_path is required when source.kind = \"csv\"");
        }
        if cfg.source.kind == SourceKind::Postgres && cfg.database.is_none() {
            anyhow::bail!("[database] is required when source.kind = \"postgres\"");
        }
        Ok(cfg)
    }

    pub fn period_catalog(&self) -> anyhow::Result<PeriodCatalog> {
        Ok(PeriodCatalog::monthly(self.catalog.first, self.catalog.last)?)
    }

    pub fn zone_directory(&self) -> ZoneDirectory {
        ZoneDirectory::new(self.zones.iter().map(|z| (z.code.clone(), z.name.clone())))
    }

    pub fn type_categories(&self) -> TypeCategories {
        if self.type_categories.is_empty() {
            return TypeCategories::default();
        }
        TypeCategories::new(
            self.type_categories
                .iter()
                .map(|(name, types)| (name.clone(), types.clone()))
                .collect(),
        )
    }
}
