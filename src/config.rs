use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use vulnsentry_ml::{ForestConfig, TfidfConfig};
use vulnsentry_parser::DenyList;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct VulnsentryConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub training: TrainingConfig,

    #[serde(default)]
    pub features: FeaturesConfig,

    #[serde(default)]
    pub rules: RulesConfig,
}

/// Locations of the persisted state. Relative entries resolve against `data_dir`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_dataset")]
    pub dataset: PathBuf,

    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    #[serde(default = "default_signatures")]
    pub signatures: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".vulnsentry")
}

fn default_dataset() -> PathBuf {
    PathBuf::from("vulnerability_dataset.csv")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_signatures() -> PathBuf {
    PathBuf::from("signatures.json")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            dataset: default_dataset(),
            model_dir: default_model_dir(),
            signatures: default_signatures(),
        }
    }
}

impl PathsConfig {
    pub fn dataset_path(&self) -> PathBuf {
        self.data_dir.join(&self.dataset)
    }

    pub fn model_dir_path(&self) -> PathBuf {
        self.data_dir.join(&self.model_dir)
    }

    pub fn signatures_path(&self) -> PathBuf {
        self.data_dir.join(&self.signatures)
    }
}

/// Classifier training settings
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    /// Maximum tree depth, 0 for unlimited
    #[serde(default)]
    pub max_depth: usize,

    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,

    #[serde(default = "default_test_ratio")]
    pub test_ratio: f64,

    #[serde(default = "default_split_seed")]
    pub split_seed: u64,

    /// Seed for bootstrap sampling and feature selection; random when unset
    pub forest_seed: Option<u64>,

    /// Labels with fewer records are dropped before full training
    #[serde(default = "default_min_label_support")]
    pub min_label_support: usize,

    #[serde(default = "default_keep_runs")]
    pub keep_runs: usize,

    #[serde(default = "default_safe_label")]
    pub safe_label: String,
}

fn default_n_trees() -> usize {
    100
}

fn default_min_samples_split() -> usize {
    2
}

fn default_test_ratio() -> f64 {
    0.2
}

fn default_split_seed() -> u64 {
    42
}

fn default_min_label_support() -> usize {
    2
}

fn default_keep_runs() -> usize {
    3
}

fn default_safe_label() -> String {
    vulnsentry_core::DEFAULT_SAFE_LABEL.to_string()
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_trees: default_n_trees(),
            max_depth: 0,
            min_samples_split: default_min_samples_split(),
            test_ratio: default_test_ratio(),
            split_seed: default_split_seed(),
            forest_seed: None,
            min_label_support: default_min_label_support(),
            keep_runs: default_keep_runs(),
            safe_label: default_safe_label(),
        }
    }
}

impl TrainingConfig {
    pub fn to_forest_config(&self) -> ForestConfig {
        ForestConfig {
            n_trees: self.n_trees,
            max_depth: (self.max_depth > 0).then_some(self.max_depth),
            min_samples_split: self.min_samples_split,
            seed: self.forest_seed,
        }
    }
}

/// Tokenization settings for TF-IDF features
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FeaturesConfig {
    #[serde(default = "default_token_pattern")]
    pub token_pattern: String,

    #[serde(default = "default_lowercase")]
    pub lowercase: bool,
}

fn default_token_pattern() -> String {
    TfidfConfig::default().token_pattern
}

fn default_lowercase() -> bool {
    true
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            token_pattern: default_token_pattern(),
            lowercase: default_lowercase(),
        }
    }
}

impl FeaturesConfig {
    pub fn to_tfidf_config(&self) -> TfidfConfig {
        TfidfConfig {
            token_pattern: self.token_pattern.clone(),
            lowercase: self.lowercase,
        }
    }
}

/// Syntax rule settings
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RulesConfig {
    /// Called identifiers to flag, mapped to the finding description
    #[serde(default = "default_deny")]
    pub deny: BTreeMap<String, String>,
}

fn default_deny() -> BTreeMap<String, String> {
    DenyList::default().into()
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            deny: default_deny(),
        }
    }
}

impl RulesConfig {
    pub fn to_deny_list(&self) -> DenyList {
        DenyList::from(self.deny.clone())
    }
}

impl VulnsentryConfig {
    /// Merge another config into this one (other takes precedence for set values)
    pub fn merge(&mut self, other: &VulnsentryConfig) {
        if other.paths.data_dir != default_data_dir() {
            self.paths.data_dir = other.paths.data_dir.clone();
        }
        if other.paths.dataset != default_dataset() {
            self.paths.dataset = other.paths.dataset.clone();
        }
        if other.paths.model_dir != default_model_dir() {
            self.paths.model_dir = other.paths.model_dir.clone();
        }
        if other.paths.signatures != default_signatures() {
            self.paths.signatures = other.paths.signatures.clone();
        }

        if other.training.n_trees != default_n_trees() {
            self.training.n_trees = other.training.n_trees;
        }
        if other.training.max_depth != 0 {
            self.training.max_depth = other.training.max_depth;
        }
        if other.training.min_samples_split != default_min_samples_split() {
            self.training.min_samples_split = other.training.min_samples_split;
        }
        if other.training.test_ratio != default_test_ratio() {
            self.training.test_ratio = other.training.test_ratio;
        }
        if other.training.split_seed != default_split_seed() {
            self.training.split_seed = other.training.split_seed;
        }
        if other.training.forest_seed.is_some() {
            self.training.forest_seed = other.training.forest_seed;
        }
        if other.training.min_label_support != default_min_label_support() {
            self.training.min_label_support = other.training.min_label_support;
        }
        if other.training.keep_runs != default_keep_runs() {
            self.training.keep_runs = other.training.keep_runs;
        }
        if other.training.safe_label != default_safe_label() {
            self.training.safe_label = other.training.safe_label.clone();
        }

        if other.features.token_pattern != default_token_pattern() {
            self.features.token_pattern = other.features.token_pattern.clone();
        }
        if !other.features.lowercase {
            self.features.lowercase = other.features.lowercase;
        }

        if other.rules.deny != default_deny() {
            self.rules.deny = other.rules.deny.clone();
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Invalid range in {field}: {value} (valid range: {valid_range})")]
    InvalidRange {
        field: String,
        value: String,
        valid_range: String,
    },

    #[error("Invalid pattern in {field}: {message}")]
    InvalidPattern { field: String, message: String },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl VulnsentryConfig {
    pub fn generate_default_config() -> String {
        let default_config = Self::default();
        toml::to_string_pretty(&default_config).unwrap_or_else(|_| {
            r#"# vulnsentry configuration file

[paths]
data_dir = ".vulnsentry"
dataset = "vulnerability_dataset.csv"
model_dir = "models"
signatures = "signatures.json"

[training]
n_trees = 100
max_depth = 0
min_samples_split = 2
test_ratio = 0.2
split_seed = 42
# forest_seed = 7
min_label_support = 2
keep_runs = 3
safe_label = "safe"

[features]
token_pattern = '(?u)\b\w\w+\b'
lowercase = true

[rules.deny]
eval = "Use of eval(): evaluating dynamic input allows arbitrary code execution"
"#
            .to_string()
        })
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: VulnsentryConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Get the user config file path (~/.config/vulnsentry/config.toml)
    pub fn get_user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/vulnsentry/config.toml"))
    }

    /// Get the system config file path (/etc/vulnsentry/config.toml)
    pub fn get_system_config_path() -> PathBuf {
        PathBuf::from("/etc/vulnsentry/config.toml")
    }

    /// Get the current directory config file path (./vulnsentry.toml)
    pub fn get_current_config_path() -> PathBuf {
        PathBuf::from("./vulnsentry.toml")
    }

    /// Load and merge configs from all sources with priority:
    /// 1. User config (~/.config/vulnsentry/config.toml) - lowest priority (base)
    /// 2. Current directory (./vulnsentry.toml)
    /// 3. System config (/etc/vulnsentry/config.toml) - highest priority
    pub fn load_with_merged_configs() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let mut sources: Vec<PathBuf> = Vec::new();
        if let Some(user_path) = Self::get_user_config_path() {
            sources.push(user_path);
        }
        sources.push(Self::get_current_config_path());
        sources.push(Self::get_system_config_path());

        for path in sources {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(loaded) => {
                    config.merge(&loaded);
                    tracing::debug!("Loaded config from: {}", path.display());
                }
                Err(e) => tracing::warn!("Ignoring unreadable config {}: {}", path.display(), e),
            }
        }

        Ok(config)
    }

    pub fn apply_env_vars(&mut self, env_vars: &HashMap<String, String>) -> Result<()> {
        for (key, value) in env_vars {
            if let Some(config_key) = key.strip_prefix("VULNSENTRY_") {
                match config_key {
                    "PATHS_DATA_DIR" | "DATA_DIR" => self.paths.data_dir = PathBuf::from(value),
                    "PATHS_DATASET" => self.paths.dataset = PathBuf::from(value),
                    "PATHS_MODEL_DIR" => self.paths.model_dir = PathBuf::from(value),
                    "PATHS_SIGNATURES" => self.paths.signatures = PathBuf::from(value),
                    "TRAINING_N_TREES" => {
                        self.training.n_trees = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid n_trees value: {}", value))?;
                    }
                    "TRAINING_MAX_DEPTH" => {
                        self.training.max_depth = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid max_depth value: {}", value))?;
                    }
                    "TRAINING_MIN_SAMPLES_SPLIT" => {
                        self.training.min_samples_split = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid min_samples_split value: {}", value))?;
                    }
                    "TRAINING_TEST_RATIO" => {
                        self.training.test_ratio = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid test_ratio value: {}", value))?;
                    }
                    "TRAINING_SPLIT_SEED" => {
                        self.training.split_seed = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid split_seed value: {}", value))?;
                    }
                    "TRAINING_FOREST_SEED" => {
                        self.training.forest_seed = Some(
                            value
                                .parse()
                                .map_err(|_| anyhow!("Invalid forest_seed value: {}", value))?,
                        );
                    }
                    "TRAINING_MIN_LABEL_SUPPORT" => {
                        self.training.min_label_support = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid min_label_support value: {}", value))?;
                    }
                    "TRAINING_KEEP_RUNS" => {
                        self.training.keep_runs = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid keep_runs value: {}", value))?;
                    }
                    "TRAINING_SAFE_LABEL" => self.training.safe_label = value.clone(),
                    "FEATURES_TOKEN_PATTERN" => self.features.token_pattern = value.clone(),
                    "FEATURES_LOWERCASE" => {
                        self.features.lowercase = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid lowercase value: {}", value))?;
                    }
                    _ => {} // Ignore unknown environment variables
                }
            }
        }
        Ok(())
    }

    /// Load configuration with full precedence chain:
    /// 1. Default values (lowest)
    /// 2. User, current directory and system config files
    /// 3. Explicit `--config` file
    /// 4. Environment variables (VULNSENTRY_*)
    /// 5. `--data-dir` (highest)
    pub fn load_with_precedence(
        config_path: Option<&Path>,
        data_dir: Option<&Path>,
        env_vars: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut config = Self::load_with_merged_configs().unwrap_or_else(|_| Self::default());

        if let Some(path) = config_path {
            let explicit_config = Self::load_from_file(path)
                .map_err(|e| anyhow!("Failed to load config file {}: {}", path.display(), e))?;
            config.merge(&explicit_config);
        }

        config.apply_env_vars(env_vars)?;

        if let Some(dir) = data_dir {
            config.paths.data_dir = dir.to_path_buf();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let training = &self.training;

        if training.n_trees == 0 || training.n_trees > 10_000 {
            return Err(ConfigError::InvalidRange {
                field: "training.n_trees".to_string(),
                value: training.n_trees.to_string(),
                valid_range: "1-10000".to_string(),
            });
        }

        if training.min_samples_split < 2 {
            return Err(ConfigError::InvalidRange {
                field: "training.min_samples_split".to_string(),
                value: training.min_samples_split.to_string(),
                valid_range: ">= 2".to_string(),
            });
        }

        if !(training.test_ratio > 0.0 && training.test_ratio < 1.0) {
            return Err(ConfigError::InvalidRange {
                field: "training.test_ratio".to_string(),
                value: training.test_ratio.to_string(),
                valid_range: "0.0 < ratio < 1.0".to_string(),
            });
        }

        if training.min_label_support == 0 {
            return Err(ConfigError::InvalidRange {
                field: "training.min_label_support".to_string(),
                value: "0".to_string(),
                valid_range: ">= 1".to_string(),
            });
        }

        if training.keep_runs == 0 {
            return Err(ConfigError::InvalidRange {
                field: "training.keep_runs".to_string(),
                value: "0".to_string(),
                valid_range: ">= 1".to_string(),
            });
        }

        if training.safe_label.trim().is_empty() {
            return Err(ConfigError::InvalidRange {
                field: "training.safe_label".to_string(),
                value: format!("{:?}", training.safe_label),
                valid_range: "non-empty label".to_string(),
            });
        }

        if let Err(e) = regex::Regex::new(&self.features.token_pattern) {
            return Err(ConfigError::InvalidPattern {
                field: "features.token_pattern".to_string(),
                message: e.to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = VulnsentryConfig::default();
        assert_eq!(config.paths.data_dir, PathBuf::from(".vulnsentry"));
        assert_eq!(config.training.n_trees, 100);
        assert_eq!(config.training.min_label_support, 2);
        assert_eq!(config.training.safe_label, "safe");
        assert!(config.features.lowercase);
        assert!(config.rules.deny.contains_key("eval"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolved_paths() {
        let config = VulnsentryConfig::default();
        assert_eq!(
            config.paths.dataset_path(),
            PathBuf::from(".vulnsentry/vulnerability_dataset.csv")
        );
        assert_eq!(config.paths.model_dir_path(), PathBuf::from(".vulnsentry/models"));

        let mut config = config;
        config.paths.signatures = PathBuf::from("/var/lib/signatures.json");
        assert_eq!(
            config.paths.signatures_path(),
            PathBuf::from("/var/lib/signatures.json")
        );
    }

    #[test]
    fn test_toml_parsing() {
        let toml_content = r#"
[paths]
data_dir = "/tmp/vs"

[training]
n_trees = 25
max_depth = 8
forest_seed = 7

[rules.deny]
eval = "eval call"
exec = "exec call"
"#;

        let config: VulnsentryConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.paths.data_dir, PathBuf::from("/tmp/vs"));
        assert_eq!(config.paths.dataset, PathBuf::from("vulnerability_dataset.csv"));
        assert_eq!(config.training.n_trees, 25);

        let forest = config.training.to_forest_config();
        assert_eq!(forest.max_depth, Some(8));
        assert_eq!(forest.seed, Some(7));

        let deny = config.rules.to_deny_list();
        assert_eq!(deny.len(), 2);
        assert_eq!(deny.get("exec"), Some("exec call"));
    }

    #[test]
    fn test_unlimited_depth_maps_to_none() {
        let forest = TrainingConfig::default().to_forest_config();
        assert_eq!(forest.max_depth, None);
        assert_eq!(forest.n_trees, 100);
    }

    #[test]
    fn test_env_var_application() {
        let mut config = VulnsentryConfig::default();
        let mut env_vars = HashMap::new();
        env_vars.insert("VULNSENTRY_DATA_DIR".to_string(), "/data".to_string());
        env_vars.insert("VULNSENTRY_TRAINING_N_TREES".to_string(), "10".to_string());
        env_vars.insert("VULNSENTRY_TRAINING_FOREST_SEED".to_string(), "3".to_string());
        env_vars.insert("OTHER_VAR".to_string(), "ignored".to_string());

        config.apply_env_vars(&env_vars).unwrap();

        assert_eq!(config.paths.data_dir, PathBuf::from("/data"));
        assert_eq!(config.training.n_trees, 10);
        assert_eq!(config.training.forest_seed, Some(3));
    }

    #[test]
    fn test_env_var_invalid_value() {
        let mut config = VulnsentryConfig::default();
        let mut env_vars = HashMap::new();
        env_vars.insert("VULNSENTRY_TRAINING_N_TREES".to_string(), "many".to_string());

        assert!(config.apply_env_vars(&env_vars).is_err());
    }

    #[test]
    fn test_config_file_loading() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[training]
test_ratio = 0.25
safe_label = "benign"
"#
        )
        .unwrap();

        let config = VulnsentryConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.training.test_ratio, 0.25);
        assert_eq!(config.training.safe_label, "benign");
    }

    #[test]
    fn test_generate_default_config_parses_back() {
        let config_string = VulnsentryConfig::generate_default_config();
        assert!(config_string.contains("[paths]"));
        assert!(config_string.contains("[training]"));
        assert!(config_string.contains("n_trees = 100"));

        let parsed: VulnsentryConfig = toml::from_str(&config_string).unwrap();
        assert_eq!(parsed, VulnsentryConfig::default());
    }

    #[test]
    fn test_validation() {
        let mut config = VulnsentryConfig::default();
        config.training.n_trees = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRange { .. })
        ));

        let mut config = VulnsentryConfig::default();
        config.training.test_ratio = 1.0;
        assert!(config.validate().is_err());

        let mut config = VulnsentryConfig::default();
        config.training.safe_label = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = VulnsentryConfig::default();
        config.features.token_pattern = "(".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_config_merge() {
        let mut base = VulnsentryConfig::default();
        base.training.n_trees = 50;

        let mut other = VulnsentryConfig::default();
        other.paths.data_dir = PathBuf::from("/srv/vs");
        other.training.keep_runs = 5;

        base.merge(&other);

        assert_eq!(base.paths.data_dir, PathBuf::from("/srv/vs"));
        assert_eq!(base.training.keep_runs, 5);
        // Defaults in `other` do not reset values set earlier
        assert_eq!(base.training.n_trees, 50);
    }

    #[test]
    fn test_load_with_precedence_explicit_file_and_data_dir() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[training]\nn_trees = 12").unwrap();

        let config = VulnsentryConfig::load_with_precedence(
            Some(temp_file.path()),
            Some(Path::new("/override")),
            &HashMap::new(),
        )
        .unwrap();

        assert_eq!(config.training.n_trees, 12);
        assert_eq!(config.paths.data_dir, PathBuf::from("/override"));
    }

    #[test]
    fn test_get_config_paths() {
        assert_eq!(
            VulnsentryConfig::get_system_config_path(),
            PathBuf::from("/etc/vulnsentry/config.toml")
        );
        assert_eq!(
            VulnsentryConfig::get_current_config_path(),
            PathBuf::from("./vulnsentry.toml")
        );
        if let Some(path) = VulnsentryConfig::get_user_config_path() {
            assert!(path.ends_with(".config/vulnsentry/config.toml"));
        }
    }
}
