//! Service wiring: job store, generation client, lifecycle manager, billing.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use vidgen_infra::artifacts::{ArtifactError, ArtifactStore};
use vidgen_infra::billing::{BillingClient, BillingError};
use vidgen_infra::config::AppConfig;
use vidgen_infra::generation::{GenerationError, XaiGenerationClient};
use vidgen_infra::jobs::{JobStoreError, LifecycleManager, SqliteJobStore};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Artifacts(#[from] ArtifactError),
    #[error("job store unavailable: {0}")]
    Store(#[from] JobStoreError),
    #[error("generation client: {0}")]
    Generation(#[from] GenerationError),
    #[error("billing client: {0}")]
    Billing(#[from] BillingError),
}

/// Everything the handlers need, shared behind an `Arc`.
#[derive(Debug)]
pub struct AppServices {
    pub lifecycle: LifecycleManager,
    pub billing: Option<BillingClient>,
    pub static_dir: PathBuf,
}

impl AppServices {
    pub fn new(
        lifecycle: LifecycleManager,
        billing: Option<BillingClient>,
        static_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            lifecycle,
            billing,
            static_dir: static_dir.into(),
        }
    }
}

/// Create the data directories, open the database and build the clients.
pub async fn build_services(config: &AppConfig) -> Result<Arc<AppServices>, StartupError> {
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .map_err(|source| StartupError::CreateDir {
            path: config.data_dir.clone(),
            source,
        })?;
    let artifacts = ArtifactStore::new(config.videos_dir());
    artifacts.ensure_root().await?;

    let store = SqliteJobStore::connect(&config.database_path(), config.count_cache_ttl).await?;
    info!(path = %config.database_path().display(), "job store ready");

    let client = XaiGenerationClient::new(&config.xai_base_url, &config.xai_api_key)?;
    let lifecycle = LifecycleManager::new(
        Arc::new(client),
        Arc::new(store),
        artifacts,
        config.poll_policy,
    );

    let billing = match &config.management {
        Some(management) => Some(BillingClient::new(management.clone())?),
        None => {
            warn!("management key or team id not set; balance lookups disabled");
            None
        }
    };

    Ok(Arc::new(AppServices::new(
        lifecycle,
        billing,
        config.static_dir.clone(),
    )))
}
