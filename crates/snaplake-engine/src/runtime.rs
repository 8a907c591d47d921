//! Wiring from `AppConfig` to ready-to-use services

use snaplake_core::cipher::CredentialCipher;
use snaplake_core::clock::{Clock, SystemClock};
use snaplake_core::errors::{ExError, ExErrorKind};
use snaplake_core::model::StorageConfig;
use snaplake_core::AppConfig;
use snaplake_store::codec::{JsonListCodec, ListCodec};
use snaplake_store::lake::{build_storage_provider, StorageProvider};
use snaplake_store::repo::{
    DatasourceRepository, SnapshotRepository, SqliteDatasourceRepo, SqliteSnapshotRepo,
    SqliteStorageConfigRepo, SqliteUserRepo, StorageConfigRepository, UserRepository,
};
use snaplake_store::Database;
use std::sync::Arc;

use crate::datasources::DatasourceService;
use crate::dialect::DialectRegistry;
use crate::errors::Result;
use crate::query::QuerySandbox;
use crate::recovery::RecoverySweep;
use crate::scheduler::Scheduler;
use crate::setup::SystemSetup;
use crate::snapshot::SnapshotOrchestrator;
use crate::supervisor::Supervisor;

/// Database, cipher and repositories; enough for setup
pub struct Runtime {
    pub config: AppConfig,
    pub db: Database,
    pub cipher: Arc<CredentialCipher>,
    pub clock: Arc<dyn Clock>,
    pub datasources: Arc<dyn DatasourceRepository>,
    pub snapshots: Arc<dyn SnapshotRepository>,
    pub users: Arc<dyn UserRepository>,
    pub storage_configs: Arc<dyn StorageConfigRepository>,
    pub dialects: Arc<DialectRegistry>,
}

/// Everything that needs a configured lake
pub struct Services {
    pub storage_config: StorageConfig,
    pub storage: Arc<dyn StorageProvider>,
    pub orchestrator: Arc<SnapshotOrchestrator>,
    pub scheduler: Arc<Scheduler>,
    pub recovery: Arc<RecoverySweep>,
    pub datasources: DatasourceService,
    pub sandbox: QuerySandbox,
    pub supervisor: Supervisor,
}

impl Runtime {
    /// Open the metadata database and build the cipher
    ///
    /// # Errors
    /// `Configuration` when the production profile has no encryption key.
    pub fn open(config: AppConfig) -> Result<Self> {
        let cipher = CredentialCipher::from_config(config.encryption_key.as_ref(), config.profile)
            .map_err(ExError::from)?;
        let db = Database::open(&config.database_path)?;
        Ok(Self::with_database(config, db, Arc::new(cipher), Arc::new(SystemClock)))
    }

    pub fn with_database(
        config: AppConfig,
        db: Database,
        cipher: Arc<CredentialCipher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let codec: Arc<dyn ListCodec> = Arc::new(JsonListCodec);
        Self {
            datasources: Arc::new(SqliteDatasourceRepo::new(db.clone(), codec.clone())),
            snapshots: Arc::new(SqliteSnapshotRepo::new(db.clone(), codec)),
            users: Arc::new(SqliteUserRepo::new(db.clone())),
            storage_configs: Arc::new(SqliteStorageConfigRepo::new(db.clone())),
            dialects: Arc::new(DialectRegistry::with_defaults()),
            config,
            db,
            cipher,
            clock,
        }
    }

    pub fn setup(&self) -> SystemSetup {
        SystemSetup::new(
            self.users.clone(),
            self.storage_configs.clone(),
            self.clock.clone(),
        )
    }

    /// # Errors
    /// `Configuration` before `setup` has stored a storage configuration.
    pub fn storage_config(&self) -> Result<StorageConfig> {
        self.storage_configs.get()?.ok_or_else(|| {
            ExError::new(ExErrorKind::Configuration)
                .with_op("load_storage_config")
                .with_message("Storage is not configured; run `snaplake setup` first")
        })
    }

    pub fn services(&self) -> Result<Services> {
        let storage_config = self.storage_config()?;
        let storage =
            build_storage_provider(&storage_config, &self.cipher, &self.config.cache_dir)?;

        let orchestrator = Arc::new(SnapshotOrchestrator::new(
            self.datasources.clone(),
            self.snapshots.clone(),
            self.dialects.clone(),
            storage.clone(),
            self.cipher.clone(),
            self.clock.clone(),
        ));
        let scheduler = Arc::new(Scheduler::new(orchestrator.clone()));
        let recovery = Arc::new(RecoverySweep::new(
            self.snapshots.clone(),
            self.clock.clone(),
            self.config.stale_threshold(),
        ));
        let datasources = DatasourceService::new(
            self.datasources.clone(),
            self.snapshots.clone(),
            storage.clone(),
            self.cipher.clone(),
            self.dialects.clone(),
            self.clock.clone(),
        )
        .with_scheduler(scheduler.clone());
        let mut supervisor = Supervisor::new(
            self.db.clone(),
            self.cipher.clone(),
            self.datasources.clone(),
            scheduler.clone(),
            recovery.clone(),
            self.config.recovery_interval(),
        );
        if !self.config.scheduler.enabled {
            supervisor = supervisor.without_scheduler();
        }

        Ok(Services {
            storage_config,
            storage,
            orchestrator,
            scheduler,
            recovery,
            datasources,
            sandbox: QuerySandbox::new(self.cipher.clone()),
            supervisor,
        })
    }
}
