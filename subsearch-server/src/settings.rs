use std::path::PathBuf;
use std::str::FromStr;

use config::{Config, ConfigError, File, FileFormat, Source};
use serde::Deserialize;
use structopt::StructOpt;
use tantivy::merge_policy::*;

use crate::analyzers::AnalyzerConfig;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default sub-directories of the data path, one per index family
pub const SUBMISSIONS_DIR: &str = "submissions";
pub const FILES_DIR: &str = "files";
pub const PAGETAB_DIR: &str = "pagetab";

pub const DEFAULT_WRITER_MEMORY: usize = 200_000_000;

#[derive(PartialEq)]
pub enum MergePolicyType {
    Log,
    NoMerge,
}

const fn default_level_log_size() -> f64 {
    0.75
}
const fn default_min_layer_size() -> u32 {
    10_000
}
const fn default_min_merge_size() -> usize {
    8
}

pub fn settings() -> Settings {
    let options = Settings::from_args();
    if !&options.config.is_empty() {
        Settings::new(&options.config).expect("Invalid Configuration File")
    } else {
        options
    }
}

#[derive(Deserialize, Clone, Debug, StructOpt)]
pub struct ConfigMergePolicy {
    #[structopt(long, default_value = "log")]
    kind: String,
    #[structopt(long, default_value = "8")]
    #[serde(default = "default_min_merge_size")]
    min_merge_size: usize,
    #[structopt(long, default_value = "10000")]
    #[serde(default = "default_min_layer_size")]
    min_layer_size: u32,
    #[structopt(long, default_value = "0.75")]
    #[serde(default = "default_level_log_size")]
    level_log_size: f64,
}

impl Default for ConfigMergePolicy {
    fn default() -> Self {
        Self {
            kind: "log".into(),
            min_merge_size: default_min_merge_size(),
            min_layer_size: default_min_layer_size(),
            level_log_size: default_level_log_size(),
        }
    }
}

impl ConfigMergePolicy {
    pub fn get_kind(&self) -> MergePolicyType {
        match self.kind.to_ascii_lowercase().as_ref() {
            "log" => MergePolicyType::Log,
            "nomerge" => MergePolicyType::NoMerge,
            _ => panic!("Unknown Merge Typed Defined"),
        }
    }
}

#[derive(Deserialize, Clone, Debug, StructOpt)]
#[structopt(name = "subsearch", version = env!("CARGO_PKG_VERSION"))]
pub struct Settings {
    #[serde(skip)]
    #[structopt(short, long, default_value = "config/config.toml")]
    pub config: String,
    #[serde(default = "Settings::default_path")]
    #[structopt(short = "P", long, default_value = "data/")]
    pub path: String,
    #[serde(default = "Settings::default_level")]
    #[structopt(short, long, default_value = "info")]
    pub log_level: String,
    #[serde(default = "Settings::default_writer_memory")]
    #[structopt(short, long, default_value = "200000000")]
    pub writer_memory: usize,
    /// Seconds between background commits of caller-managed batches;
    /// zero disables the watcher
    #[serde(default = "Settings::default_auto_commit_duration")]
    #[structopt(short, long, default_value = "5")]
    pub auto_commit_duration: f32,
    #[serde(default = "Settings::default_registry_path")]
    #[structopt(short, long, default_value = "config/collections.json")]
    pub registry_path: String,
    #[serde(default = "Settings::default_ontology_path")]
    #[structopt(long, default_value = "data/efo.owl")]
    pub ontology_path: String,
    #[serde(default = "Settings::default_ontology_url")]
    #[structopt(long, default_value = "https://www.ebi.ac.uk/efo/efo.owl")]
    pub ontology_url: String,
    /// Connect timeout for the ontology download, seconds
    #[serde(default = "Settings::default_ontology_connect_timeout")]
    #[structopt(long, default_value = "10")]
    pub ontology_connect_timeout: u64,
    /// Read timeout for the ontology download, seconds
    #[serde(default = "Settings::default_ontology_read_timeout")]
    #[structopt(long, default_value = "120")]
    pub ontology_read_timeout: u64,
    /// IRIs stripped from the ontology model after loading
    #[serde(default = "Settings::default_ignored_classes")]
    #[structopt(long)]
    pub ignored_classes: Vec<String>,
    #[serde(default = "Settings::default_batch_size")]
    #[structopt(short, long, default_value = "250")]
    pub batch_size: usize,
    /// Concurrent manifest fetches and batch workers per submission
    #[serde(default = "Settings::default_manifest_concurrency")]
    #[structopt(short, long, default_value = "8")]
    pub manifest_concurrency: usize,
    /// Document types excluded from queries that do not constrain `type`
    #[serde(default = "Settings::default_excluded_types")]
    #[structopt(short, long)]
    pub excluded_types: Vec<String>,
    /// Total budget of synonym + ontology expansion terms per query
    #[serde(default = "Settings::default_expansion_limit")]
    #[structopt(long, default_value = "100")]
    pub expansion_limit: usize,
    /// Directory holding the view-count stats file, relative to `path`
    #[serde(default = "Settings::default_update_dir")]
    #[structopt(long, default_value = "updates")]
    pub update_dir: String,
    #[serde(default = "Settings::default_stats_file_name")]
    #[structopt(long, default_value = "views.csv")]
    pub stats_file_name: String,
    #[structopt(flatten)]
    #[serde(default = "Settings::default_merge_policy")]
    pub merge_policy: ConfigMergePolicy,
    /// Text analysis chain for tokenized submission fields
    #[structopt(skip)]
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config: "config/config.toml".into(),
            path: Settings::default_path(),
            log_level: Settings::default_level(),
            writer_memory: Settings::default_writer_memory(),
            auto_commit_duration: Settings::default_auto_commit_duration(),
            registry_path: Settings::default_registry_path(),
            ontology_path: Settings::default_ontology_path(),
            ontology_url: Settings::default_ontology_url(),
            ontology_connect_timeout: Settings::default_ontology_connect_timeout(),
            ontology_read_timeout: Settings::default_ontology_read_timeout(),
            ignored_classes: Settings::default_ignored_classes(),
            batch_size: Settings::default_batch_size(),
            manifest_concurrency: Settings::default_manifest_concurrency(),
            excluded_types: Settings::default_excluded_types(),
            expansion_limit: Settings::default_expansion_limit(),
            update_dir: Settings::default_update_dir(),
            stats_file_name: Settings::default_stats_file_name(),
            merge_policy: ConfigMergePolicy::default(),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(cfg: &str) -> Result<Self, ConfigError> {
        Self::from_config(File::from_str(cfg, FileFormat::Toml))
    }
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        Self::from_config(File::with_name(path))
    }

    pub fn from_config<T: Source + Send + Sync + 'static>(c: T) -> Result<Self, ConfigError> {
        let mut cfg = Config::new();
        match cfg.merge(c) {
            Ok(_) => {}
            Err(e) => panic!("Problem with config file: {}", e),
        };
        cfg.try_into()
    }

    pub fn default_path() -> String {
        "data/".to_string()
    }

    pub fn default_level() -> String {
        "info".to_string()
    }

    pub fn default_writer_memory() -> usize {
        DEFAULT_WRITER_MEMORY
    }

    pub fn default_auto_commit_duration() -> f32 {
        5.0
    }

    pub fn default_registry_path() -> String {
        "config/collections.json".to_string()
    }

    pub fn default_ontology_path() -> String {
        "data/efo.owl".to_string()
    }

    pub fn default_ontology_url() -> String {
        "https://www.ebi.ac.uk/efo/efo.owl".to_string()
    }

    pub fn default_ontology_connect_timeout() -> u64 {
        10
    }

    pub fn default_ontology_read_timeout() -> u64 {
        120
    }

    pub fn default_ignored_classes() -> Vec<String> {
        Vec::new()
    }

    pub fn default_batch_size() -> usize {
        250
    }

    pub fn default_manifest_concurrency() -> usize {
        8
    }

    pub fn default_excluded_types() -> Vec<String> {
        Vec::new()
    }

    pub fn default_expansion_limit() -> usize {
        100
    }

    pub fn default_update_dir() -> String {
        "updates".to_string()
    }

    pub fn default_stats_file_name() -> String {
        "views.csv".to_string()
    }

    pub fn default_merge_policy() -> ConfigMergePolicy {
        ConfigMergePolicy::default()
    }

    pub fn stats_file(&self) -> PathBuf {
        PathBuf::from(&self.path).join(&self.update_dir).join(&self.stats_file_name)
    }

    pub fn index_path(&self, dir: &str) -> PathBuf {
        PathBuf::from(&self.path).join(dir)
    }

    pub fn get_merge_policy(&self) -> Box<dyn MergePolicy> {
        match self.merge_policy.get_kind() {
            MergePolicyType::Log => {
                let mut mp = LogMergePolicy::default();
                mp.set_level_log_size(self.merge_policy.level_log_size);
                mp.set_min_layer_size(self.merge_policy.min_layer_size);
                mp.set_min_num_segments(self.merge_policy.min_merge_size);
                Box::new(mp)
            }
            MergePolicyType::NoMerge => Box::new(NoMergePolicy::default()),
        }
    }
}
