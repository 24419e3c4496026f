//! Configuration file support for cinevec.
//!
//! Settings live in a `.cinevec/` directory:
//! - `.cinevec/config.toml` - Configuration file
//! - `.cinevec/logs/` - Log files, when file logging is enabled
//!
//! Config discovery searches for `.cinevec/config.toml` starting from the
//! current directory and walking up to parent directories.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use cinevec_embed::{VoyageConfig, voyage};
use cinevec_store::atlas::{self, AtlasConfig};
use cinevec_store::{Quantization, SimilarityFunction, VectorIndexDefinition};
use serde::{Deserialize, Serialize};

/// The cinevec data directory name.
pub const CINEVEC_DIR: &str = ".cinevec";
/// The config file name within the cinevec directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Output dimensions the Voyage 3 models support.
const VOYAGE_DIMENSIONS: [usize; 4] = [256, 512, 1024, 2048];

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Embedding provider settings.
    pub voyage: VoyageSection,
    /// Document store settings.
    pub store: StoreSection,
    /// Vector index declaration.
    pub index: IndexSection,
    /// Query defaults.
    pub search: SearchSection,
}

/// Voyage AI settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VoyageSection {
    /// API key. Falls back to `VOYAGE_API_KEY`.
    pub api_key: Option<String>,
    /// API base URL override.
    pub base_url: Option<String>,
    pub model: String,
    pub output_dimension: usize,
    pub truncation: bool,
    pub timeout_secs: u64,
}

impl Default for VoyageSection {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: voyage::DEFAULT_MODEL.to_string(),
            output_dimension: voyage::DEFAULT_OUTPUT_DIMENSION,
            truncation: true,
            timeout_secs: 60,
        }
    }
}

/// MongoDB settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSection {
    /// Connection string. Falls back to `MONGODB_URI`.
    pub uri: Option<String>,
    pub database: String,
    pub collection: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            uri: None,
            database: atlas::DEFAULT_DATABASE.to_string(),
            collection: atlas::DEFAULT_COLLECTION.to_string(),
        }
    }
}

/// Vector search index over the plot embeddings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexSection {
    pub name: String,
    /// Field holding the stored embeddings.
    pub path: String,
    /// "dotProduct", "cosine" or "euclidean".
    pub similarity: String,
    /// "none", "scalar" or "binary".
    pub quantization: String,
    /// Fields usable in pre-filters.
    pub filter_fields: Vec<String>,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            name: "vector_index".to_string(),
            path: "plot_embedding_voyage_3_large".to_string(),
            similarity: "dotProduct".to_string(),
            quantization: "scalar".to_string(),
            filter_fields: vec!["year".to_string()],
        }
    }
}

/// Query defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchSection {
    pub limit: usize,
    /// ANN candidate pool. Unset means ten times the limit.
    pub num_candidates: Option<usize>,
    pub exact: bool,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            limit: 10,
            num_candidates: None,
            exact: false,
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Find and load configuration from current or parent directories.
    pub fn find_and_load() -> Result<Option<(Self, PathBuf)>> {
        let current = std::env::current_dir()?;
        Self::find_and_load_from(&current)
    }

    /// Find and load configuration starting from a specific directory.
    ///
    /// Returns the config and the `.cinevec` directory it was found in.
    pub fn find_and_load_from(start: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start.to_path_buf();

        loop {
            let cinevec_dir = dir.join(CINEVEC_DIR);
            let config_path = cinevec_dir.join(CONFIG_FILE);
            if config_path.exists() {
                let config = Self::from_file(&config_path)?;
                return Ok(Some((config, cinevec_dir)));
            }

            if !dir.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Parsed similarity function.
    pub fn similarity(&self) -> Result<SimilarityFunction> {
        SimilarityFunction::parse(&self.index.similarity)
            .with_context(|| format!("Unknown similarity '{}'", self.index.similarity))
    }

    /// Parsed quantization setting.
    pub fn quantization(&self) -> Result<Quantization> {
        Quantization::parse(&self.index.quantization)
            .with_context(|| format!("Unknown quantization '{}'", self.index.quantization))
    }

    /// The index declaration. Its dimensionality is the embedding output
    /// dimension, so query and stored vectors always agree.
    pub fn index_definition(&self) -> Result<VectorIndexDefinition> {
        let mut definition = VectorIndexDefinition::new(
            &self.index.name,
            &self.index.path,
            self.voyage.output_dimension,
            self.similarity()?,
        )
        .with_quantization(self.quantization()?);
        for field in &self.index.filter_fields {
            definition = definition.with_filter_field(field);
        }
        Ok(definition)
    }

    /// Voyage client settings. `key_override` takes precedence over the file
    /// and the environment.
    pub fn voyage_config(&self, key_override: Option<&str>) -> Result<VoyageConfig> {
        let api_key = key_override
            .map(str::to_string)
            .or_else(|| self.voyage.api_key.clone())
            .or_else(|| std::env::var(voyage::API_KEY_ENV).ok())
            .with_context(|| {
                format!(
                    "Voyage API key required. Set [voyage] api_key or {}.",
                    voyage::API_KEY_ENV
                )
            })?;

        let mut config = VoyageConfig::new(api_key)
            .with_model(&self.voyage.model)
            .with_output_dimension(self.voyage.output_dimension)
            .with_truncation(self.voyage.truncation)
            .with_timeout(Duration::from_secs(self.voyage.timeout_secs));
        if let Some(url) = &self.voyage.base_url {
            config = config.with_base_url(url);
        }
        Ok(config)
    }

    /// MongoDB settings. `uri_override` takes precedence over the file and
    /// the environment.
    pub fn atlas_config(&self, uri_override: Option<&str>) -> Result<AtlasConfig> {
        let uri = uri_override
            .map(str::to_string)
            .or_else(|| self.store.uri.clone())
            .or_else(|| std::env::var(atlas::URI_ENV).ok())
            .with_context(|| {
                format!(
                    "MongoDB connection string required. Set [store] uri or {}.",
                    atlas::URI_ENV
                )
            })?;

        Ok(AtlasConfig::new(uri)
            .with_database(&self.store.database)
            .with_collection(&self.store.collection))
    }
}

/// Configuration validation error.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl ConfigValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigValidationError {}

impl Config {
    /// Validate the configuration.
    ///
    /// Credentials are not checked here; commands that need them fail when
    /// they resolve them.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.voyage.model.is_empty() {
            errors.push(ConfigValidationError::new(
                "voyage.model",
                "Embedding model cannot be empty.",
            ));
        }

        if !VOYAGE_DIMENSIONS.contains(&self.voyage.output_dimension) {
            errors.push(ConfigValidationError::new(
                "voyage.output_dimension",
                format!(
                    "Unsupported dimension {}. Expected one of: {:?}.",
                    self.voyage.output_dimension, VOYAGE_DIMENSIONS
                ),
            ));
        }

        if self.voyage.timeout_secs == 0 {
            errors.push(ConfigValidationError::new(
                "voyage.timeout_secs",
                "Timeout must be at least one second.",
            ));
        }

        if self.store.database.is_empty() {
            errors.push(ConfigValidationError::new(
                "store.database",
                "Database name cannot be empty.",
            ));
        }

        if self.store.collection.is_empty() {
            errors.push(ConfigValidationError::new(
                "store.collection",
                "Collection name cannot be empty.",
            ));
        }

        if self.index.name.is_empty() {
            errors.push(ConfigValidationError::new("index.name", "Index name cannot be empty."));
        }

        if self.index.path.is_empty() {
            errors.push(ConfigValidationError::new(
                "index.path",
                "Vector field path cannot be empty.",
            ));
        }

        if SimilarityFunction::parse(&self.index.similarity).is_none() {
            errors.push(ConfigValidationError::new(
                "index.similarity",
                format!(
                    "Invalid similarity '{}'. Expected 'dotProduct', 'cosine', or 'euclidean'.",
                    self.index.similarity
                ),
            ));
        }

        if Quantization::parse(&self.index.quantization).is_none() {
            errors.push(ConfigValidationError::new(
                "index.quantization",
                format!(
                    "Invalid quantization '{}'. Expected 'none', 'scalar', or 'binary'.",
                    self.index.quantization
                ),
            ));
        }

        if self.search.limit == 0 || self.search.limit > cinevec_store::backend::MAX_NUM_CANDIDATES {
            errors.push(ConfigValidationError::new(
                "search.limit",
                format!(
                    "Limit must be between 1 and {}.",
                    cinevec_store::backend::MAX_NUM_CANDIDATES
                ),
            ));
        }

        if let Some(candidates) = self.search.num_candidates {
            if candidates < self.search.limit {
                errors.push(ConfigValidationError::new(
                    "search.num_candidates",
                    "Candidate pool cannot be smaller than the limit.",
                ));
            }
        }

        errors
    }
}

/// Contents written by `cinevec init`.
pub const DEFAULT_CONFIG: &str = r#"# cinevec configuration

[voyage]
model = "voyage-3-large"
output_dimension = 2048  # Must match the stored embeddings
truncation = true
timeout_secs = 60
# api_key = "pa-..."  # Or use VOYAGE_API_KEY env var

[store]
database = "sample_mflix"
collection = "embedded_movies"
# uri = "mongodb+srv://..."  # Or use MONGODB_URI env var

[index]
name = "vector_index"
path = "plot_embedding_voyage_3_large"
similarity = "dotProduct"  # Options: "dotProduct", "cosine", "euclidean"
quantization = "scalar"    # Options: "none", "scalar", "binary"
filter_fields = ["year"]

[search]
limit = 10
exact = false
# num_candidates = 100  # Defaults to 10x the limit
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.voyage.model, "voyage-3-large");
        assert_eq!(config.voyage.output_dimension, 2048);
        assert_eq!(config.store.database, "sample_mflix");
        assert_eq!(config.store.collection, "embedded_movies");
        assert_eq!(config.index.path, "plot_embedding_voyage_3_large");
        assert_eq!(config.search.limit, 10);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_default_config_file_matches_defaults() {
        let parsed: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        let defaults = Config::default();
        assert_eq!(parsed.voyage.model, defaults.voyage.model);
        assert_eq!(parsed.voyage.output_dimension, defaults.voyage.output_dimension);
        assert_eq!(parsed.index.name, defaults.index.name);
        assert_eq!(parsed.index.filter_fields, defaults.index.filter_fields);
        assert_eq!(parsed.search.limit, defaults.search.limit);
        assert!(parsed.validate().is_empty());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[voyage]
output_dimension = 1024
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.voyage.output_dimension, 1024);
        // Defaults should still apply
        assert_eq!(config.voyage.model, "voyage-3-large");
        assert_eq!(config.index.similarity, "dotProduct");
    }

    #[test]
    fn test_index_definition_follows_output_dimension() {
        let toml = r#"
[voyage]
output_dimension = 512

[index]
name = "plots"
similarity = "cosine"
quantization = "none"
filter_fields = ["year", "genres"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let definition = config.index_definition().unwrap();
        assert_eq!(definition.name, "plots");
        assert_eq!(definition.dimensions, 512);
        assert_eq!(definition.similarity, SimilarityFunction::Cosine);
        assert_eq!(definition.quantization, Quantization::None);
        assert_eq!(definition.filter_fields, vec!["year", "genres"]);
    }

    #[test]
    fn test_validate_reports_fields() {
        let mut config = Config::default();
        config.voyage.output_dimension = 300;
        config.index.similarity = "manhattan".to_string();
        config.search.limit = 0;

        let errors = config.validate();
        assert!(errors.iter().any(|e| e.field == "voyage.output_dimension"));
        assert!(errors.iter().any(|e| e.field == "index.similarity"));
        assert!(errors.iter().any(|e| e.field == "search.limit"));
    }

    #[test]
    fn test_validate_candidate_pool() {
        let mut config = Config::default();
        config.search.num_candidates = Some(5);
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.field == "search.num_candidates"));
    }

    #[test]
    fn test_credential_overrides() {
        let mut config = Config::default();
        config.voyage.api_key = Some("from-file".to_string());
        config.store.uri = Some("mongodb://file".to_string());

        let voyage = config.voyage_config(Some("from-cli")).unwrap();
        assert_eq!(voyage.api_key, "from-cli");
        let voyage = config.voyage_config(None).unwrap();
        assert_eq!(voyage.api_key, "from-file");
        assert_eq!(voyage.output_dimension, 2048);

        let atlas = config.atlas_config(Some("mongodb://cli")).unwrap();
        assert_eq!(atlas.uri, "mongodb://cli");
        assert_eq!(atlas.collection, "embedded_movies");
    }

    #[test]
    fn test_find_and_load_walks_up() {
        let root = tempfile::tempdir().unwrap();
        let cinevec_dir = root.path().join(CINEVEC_DIR);
        std::fs::create_dir_all(&cinevec_dir).unwrap();
        std::fs::write(
            cinevec_dir.join(CONFIG_FILE),
            "[search]\nlimit = 25\n",
        )
        .unwrap();

        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, dir) = Config::find_and_load_from(&nested).unwrap().unwrap();
        assert_eq!(config.search.limit, 25);
        assert_eq!(dir, cinevec_dir);
    }

    #[test]
    fn test_find_and_load_none() {
        let root = tempfile::tempdir().unwrap();
        // A parent of the temp dir could in principle hold a config, so only
        // check that a direct lookup in an empty dir does not error.
        assert!(Config::find_and_load_from(root.path()).is_ok());
    }

    #[test]
    fn test_parse_error_names_file() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join(CONFIG_FILE);
        std::fs::write(&path, "[search]\nlimit = \"ten\"\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
