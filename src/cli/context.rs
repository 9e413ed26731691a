//! Shared wiring for project commands: configuration, state store, and the
//! orchestrator assembled from configured adapters.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::reasoners::create_reasoner;
use crate::adapters::sqlite::{initialize_database, PoolConfig, SqliteRunRepository};
use crate::adapters::vendors::VendorRegistry;
use crate::adapters::workflow::create_engine;
use crate::domain::models::{Config, Run};
use crate::domain::ports::RunRepository;
use crate::infrastructure::config::{ConfigLoader, PROJECT_DIR};
use crate::services::{EvolutionOrchestrator, OrchestratorSettings};

/// Loaded configuration and an open state store for the current project.
pub struct AppContext {
    pub config: Config,
    pub project_root: PathBuf,
    pub repository: Arc<SqliteRunRepository>,
    pub vendors: Arc<VendorRegistry>,
}

impl AppContext {
    /// Open the project in the current directory. Fails if `phylum init`
    /// has not been run there.
    pub async fn open() -> Result<Self> {
        let project_root = std::env::current_dir().context("Failed to get current directory")?;
        if !project_root.join(PROJECT_DIR).is_dir() {
            bail!("No {PROJECT_DIR}/ directory here. Run `phylum init` first.");
        }
        let config = ConfigLoader::load_from_dir(&project_root)?;
        Self::with_config(project_root, config).await
    }

    /// Build a context from an explicit configuration. Relative paths in
    /// `config` are resolved against `project_root`.
    pub async fn with_config(project_root: PathBuf, mut config: Config) -> Result<Self> {
        config.database.path = absolutize(&project_root, &config.database.path);
        config.sandbox.workspaces_dir = absolutize(&project_root, &config.sandbox.workspaces_dir);

        let pool = initialize_database(&config.database.url(), Some(PoolConfig::from(&config.database)))
            .await
            .context("Failed to open the state store")?;

        Ok(Self {
            config,
            project_root,
            repository: Arc::new(SqliteRunRepository::new(pool)),
            vendors: Arc::new(VendorRegistry::new()),
        })
    }

    /// Assemble an orchestrator from the configured engine and reasoner.
    pub fn orchestrator(&self) -> Result<EvolutionOrchestrator> {
        let engine = create_engine(&self.config)?;
        let reasoner = create_reasoner(&self.config.reasoning)?;
        Ok(EvolutionOrchestrator::new(
            self.repository.clone(),
            engine,
            self.vendors.clone(),
            reasoner,
            OrchestratorSettings::from(&self.config.evolution),
        ))
    }

    /// Resolve a run by id prefix, or the most recent run when none is given.
    pub async fn resolve_run(&self, id: Option<&str>) -> Result<Run> {
        let run = match id {
            Some(prefix) => {
                let run_id: Uuid = self
                    .repository
                    .resolve_run_id(prefix)
                    .await?
                    .with_context(|| format!("No run matches '{prefix}'"))?;
                self.repository.get_run(run_id).await?
            }
            None => self.repository.latest_run().await?,
        };
        run.context("No runs recorded yet")
    }
}

fn absolutize(root: &Path, path: &str) -> String {
    let path = Path::new(path);
    if path.is_absolute() {
        path.display().to_string()
    } else {
        root.join(path).display().to_string()
    }
}
