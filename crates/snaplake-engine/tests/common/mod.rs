#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use snaplake_core::cipher::CredentialCipher;
use snaplake_core::clock::{Clock, FixedClock};
use snaplake_core::model::{
    Datasource, NewDatasource, RetentionPolicy, SnapshotKind, SnapshotMeta, SourceType, TableMeta,
};
use snaplake_core_types::Sensitive;
use snaplake_engine::dialect::DialectRegistry;
use snaplake_engine::SnapshotOrchestrator;
use snaplake_store::codec::{JsonListCodec, ListCodec};
use snaplake_store::lake::{LocalStorageProvider, StorageProvider};
use snaplake_store::repo::{
    DatasourceRepository, SnapshotRepository, SqliteDatasourceRepo, SqliteSnapshotRepo,
};
use snaplake_store::Database;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

/// SQLite source with `customers` (3 rows) and `orders` (5 rows)
pub fn create_source_db(path: &Path) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE customers (
             id INTEGER PRIMARY KEY,
             name TEXT NOT NULL,
             balance REAL
         );
         INSERT INTO customers VALUES (1, 'ada', 10.5), (2, 'grace', NULL), (3, 'linus', 0.0);

         CREATE TABLE orders (
             customer_id INTEGER NOT NULL,
             line_no INTEGER NOT NULL,
             sku TEXT,
             quantity INTEGER,
             PRIMARY KEY (customer_id, line_no)
         );
         INSERT INTO orders VALUES
             (1, 1, 'A-1', 2), (1, 2, 'B-7', 1), (2, 1, 'A-1', 5),
             (3, 1, 'C-3', 1), (3, 2, 'A-1', 9);",
    )
    .unwrap();
}

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub db: Database,
    pub cipher: Arc<CredentialCipher>,
    pub clock: Arc<FixedClock>,
    pub datasources: Arc<SqliteDatasourceRepo>,
    pub snapshots: Arc<SqliteSnapshotRepo>,
    pub storage: Arc<LocalStorageProvider>,
    pub source_path: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("source.db");
        create_source_db(&source_path);

        let db = Database::open_in_memory().unwrap();
        let codec: Arc<dyn ListCodec> = Arc::new(JsonListCodec);
        let storage = Arc::new(LocalStorageProvider::new(dir.path().join("lake")).unwrap());

        Self {
            datasources: Arc::new(SqliteDatasourceRepo::new(db.clone(), codec.clone())),
            snapshots: Arc::new(SqliteSnapshotRepo::new(db.clone(), codec)),
            cipher: Arc::new(CredentialCipher::new(&Sensitive::from("engine-test-key")).unwrap()),
            clock: Arc::new(FixedClock::new(at(2024, 3, 9, 2))),
            storage,
            source_path,
            db,
            dir,
        }
    }

    pub fn input(&self, name: &str) -> NewDatasource {
        NewDatasource {
            name: name.to_string(),
            source_type: SourceType::Sqlite,
            host: "localhost".to_string(),
            port: 1,
            database: self.source_path.to_string_lossy().into_owned(),
            username: String::new(),
            password: Sensitive::from(""),
            schemas: vec!["main".to_string()],
            include_tables: None,
            cron: None,
            retention: RetentionPolicy::default(),
        }
    }

    pub fn save_datasource(&self, input: NewDatasource) -> Datasource {
        let ds = Datasource::create(input, self.clock.now()).unwrap();
        self.datasources.save(&ds).unwrap();
        ds
    }

    pub fn orchestrator(&self) -> SnapshotOrchestrator {
        self.orchestrator_with(DialectRegistry::with_defaults())
    }

    pub fn orchestrator_with(&self, dialects: DialectRegistry) -> SnapshotOrchestrator {
        SnapshotOrchestrator::new(
            self.datasources.clone(),
            self.snapshots.clone(),
            Arc::new(dialects),
            self.storage.clone(),
            self.cipher.clone(),
            self.clock.clone(),
        )
    }

    pub fn lake_path(&self, key: &str) -> PathBuf {
        self.dir.path().join("lake").join(key)
    }
}

/// A finished snapshot with one table stored under its prefix
pub async fn seed_completed(
    snapshots: &dyn SnapshotRepository,
    storage: &dyn StorageProvider,
    ds: &Datasource,
    kind: SnapshotKind,
    date: NaiveDate,
    started_at: DateTime<Utc>,
) -> SnapshotMeta {
    let mut snapshot = SnapshotMeta::start(ds, kind, date, started_at);
    let key = snapshot.table_key("main", "customers");
    storage.write(&key, b"PAR1".to_vec()).await.unwrap();
    snapshot
        .add_table(TableMeta {
            schema: "main".to_string(),
            table: "customers".to_string(),
            row_count: 1,
            byte_size: 4,
            storage_key: key,
            primary_keys: vec!["id".to_string()],
        })
        .unwrap();
    snapshot.complete(started_at).unwrap();
    snapshots.save(&snapshot).unwrap();
    snapshot
}
