use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main configuration structure for Phylum
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Population, generation and timing parameters
    #[serde(default)]
    pub evolution: EvolutionConfig,

    /// Sandbox backend configuration
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Workflow engine selection
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Reasoning service used for decomposition and analysis
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// Default eval settings for runs
    #[serde(default)]
    pub eval: EvalDefaults,

    /// Default agent vendor
    #[serde(default)]
    pub vendor: VendorConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".phylum/phylum.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// `sqlx` connection URL for the configured path.
    pub fn url(&self) -> String {
        format!("sqlite:{}", self.path)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
            retention_days: default_retention_days(),
        }
    }
}

/// Evolution parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EvolutionConfig {
    /// Agents per generation (N)
    #[serde(default = "default_population_size")]
    pub population_size: u32,

    /// Generation cap per step (G)
    #[serde(default = "default_max_generations")]
    pub max_generations: u32,

    /// Minimum score that counts as a pass
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,

    /// Top and bottom scorers compared by the analysis engine (K)
    #[serde(default = "default_analysis_top_k")]
    pub analysis_top_k: usize,

    /// Per-agent wall clock limit
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,

    /// Interval between status polls while awaiting a generation
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

const fn default_population_size() -> u32 {
    5
}

const fn default_max_generations() -> u32 {
    3
}

const fn default_pass_threshold() -> f64 {
    1.0
}

const fn default_analysis_top_k() -> usize {
    2
}

const fn default_agent_timeout_secs() -> u64 {
    300
}

const fn default_poll_interval_ms() -> u64 {
    2000
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            max_generations: default_max_generations(),
            pass_threshold: default_pass_threshold(),
            analysis_top_k: default_analysis_top_k(),
            agent_timeout_secs: default_agent_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Sandbox backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SandboxConfig {
    /// Driver name: process or kubernetes
    #[serde(default = "default_sandbox_driver")]
    pub driver: String,

    /// Directory holding one workspace per agent task
    #[serde(default = "default_workspaces_dir")]
    pub workspaces_dir: String,

    /// Program that implements `sandbox-exec`; defaults to the running binary
    #[serde(default)]
    pub runner_program: Option<String>,

    /// Kubernetes-specific settings
    #[serde(default)]
    pub kubernetes: KubernetesConfig,
}

fn default_sandbox_driver() -> String {
    "process".to_string()
}

fn default_workspaces_dir() -> String {
    ".phylum/workspaces".to_string()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            driver: default_sandbox_driver(),
            workspaces_dir: default_workspaces_dir(),
            runner_program: None,
            kubernetes: KubernetesConfig::default(),
        }
    }
}

/// Kubernetes Job settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KubernetesConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Sandbox image containing phylum, git and the agent CLIs
    #[serde(default = "default_image")]
    pub image: String,

    #[serde(default = "default_kubectl_path")]
    pub kubectl_path: String,

    /// Node path of the workspaces directory, when it differs from the local path
    #[serde(default)]
    pub host_workspaces_dir: Option<String>,

    #[serde(default = "default_cpu_request")]
    pub cpu_request: String,

    #[serde(default = "default_memory_request")]
    pub memory_request: String,

    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: String,

    #[serde(default = "default_memory_limit")]
    pub memory_limit: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_image() -> String {
    "phylum-sandbox:latest".to_string()
}

fn default_kubectl_path() -> String {
    "kubectl".to_string()
}

fn default_cpu_request() -> String {
    "500m".to_string()
}

fn default_memory_request() -> String {
    "512Mi".to_string()
}

fn default_cpu_limit() -> String {
    "2".to_string()
}

fn default_memory_limit() -> String {
    "4Gi".to_string()
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            image: default_image(),
            kubectl_path: default_kubectl_path(),
            host_workspaces_dir: None,
            cpu_request: default_cpu_request(),
            memory_request: default_memory_request(),
            cpu_limit: default_cpu_limit(),
            memory_limit: default_memory_limit(),
        }
    }
}

/// Workflow engine selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkflowConfig {
    /// Engine name: polling or durable
    #[serde(default = "default_workflow_engine")]
    pub engine: String,

    /// Endpoint of an external durable workflow service
    #[serde(default)]
    pub durable_endpoint: Option<String>,
}

fn default_workflow_engine() -> String {
    "polling".to_string()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            engine: default_workflow_engine(),
            durable_endpoint: None,
        }
    }
}

/// Reasoning service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReasoningConfig {
    /// Backend: claude-cli, anthropic-api or none
    #[serde(default = "default_reasoning_backend")]
    pub backend: String,

    #[serde(default = "default_claude_path")]
    pub claude_path: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// API key for anthropic-api; falls back to `ANTHROPIC_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Retries after the first failed call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_reasoning_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_reasoning_backend() -> String {
    "claude-cli".to_string()
}

fn default_claude_path() -> String {
    "claude".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

const fn default_max_retries() -> u32 {
    1
}

const fn default_initial_backoff_ms() -> u64 {
    2000
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_reasoning_timeout_secs() -> u64 {
    180
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            backend: default_reasoning_backend(),
            claude_path: default_claude_path(),
            model: default_model(),
            api_key: None,
            api_url: default_api_url(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: default_reasoning_timeout_secs(),
        }
    }
}

/// Default eval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EvalDefaults {
    #[serde(default = "default_eval_timeout_secs")]
    pub timeout_secs: u64,

    /// exit-code or output-match
    #[serde(default = "default_success_criteria")]
    pub success_criteria: String,

    #[serde(default)]
    pub expected_output: Option<String>,

    #[serde(default)]
    pub protected_paths: Vec<String>,
}

const fn default_eval_timeout_secs() -> u64 {
    120
}

fn default_success_criteria() -> String {
    "exit-code".to_string()
}

impl Default for EvalDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: default_eval_timeout_secs(),
            success_criteria: default_success_criteria(),
            expected_output: None,
            protected_paths: Vec::new(),
        }
    }
}

/// Default agent vendor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VendorConfig {
    #[serde(default = "default_vendor_name")]
    pub name: String,

    /// Free-form settings passed through `task.json.agent_config`
    #[serde(default)]
    pub agent_config: BTreeMap<String, String>,
}

fn default_vendor_name() -> String {
    "claude-code".to_string()
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            name: default_vendor_name(),
            agent_config: BTreeMap::new(),
        }
    }
}

impl VendorConfig {
    /// Configured vendor settings as a JSON object.
    pub fn agent_config_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.agent_config
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}
