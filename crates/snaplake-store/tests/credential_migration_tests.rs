mod common;

use chrono::Utc;
use snaplake_core::cipher::{is_sealed, CredentialCipher};
use snaplake_core::model::{StorageConfig, StorageKind};
use snaplake_core_types::Sensitive;
use snaplake_store::credentials::migrate_credentials;
use snaplake_store::repo::{
    DatasourceRepository, SqliteStorageConfigRepo, StorageConfigRepository,
};
use snaplake_store::Database;

fn cipher() -> CredentialCipher {
    CredentialCipher::new(&Sensitive::from("migration-test-key")).unwrap()
}

fn object_config(access: &str, secret: &str) -> StorageConfig {
    StorageConfig {
        kind: StorageKind::Object,
        local_path: None,
        bucket: Some("lake".to_string()),
        region: Some("eu-west-1".to_string()),
        endpoint: None,
        access_key: Some(Sensitive::from(access)),
        secret_key: Some(Sensitive::from(secret)),
        updated_at: Utc::now(),
    }
}

#[test]
fn test_legacy_values_are_sealed() {
    let db = Database::open_in_memory().unwrap();
    let (ds_repo, _) = common::repos(&db);
    let storage_repo = SqliteStorageConfigRepo::new(db.clone());
    let c = cipher();

    let ds = common::new_datasource("legacy");
    ds_repo.save(&ds).unwrap();
    storage_repo.save(&object_config("AKIA123", "topsecret")).unwrap();

    let report = migrate_credentials(&db, &c).unwrap();
    assert_eq!(report.datasource_passwords, 1);
    assert_eq!(report.storage_secrets, 2);

    let stored = ds_repo.get(ds.id()).unwrap().unwrap();
    let password = stored.connection().password.expose();
    assert!(is_sealed(password));
    assert_eq!(c.unseal(password).unwrap(), "plaintext-password");

    let config = storage_repo.get().unwrap().unwrap();
    assert_eq!(c.unseal(config.access_key.unwrap().expose()).unwrap(), "AKIA123");
    assert_eq!(c.unseal(config.secret_key.unwrap().expose()).unwrap(), "topsecret");
}

#[test]
fn test_migration_is_idempotent() {
    let db = Database::open_in_memory().unwrap();
    let (ds_repo, _) = common::repos(&db);
    let c = cipher();
    let ds = common::new_datasource("legacy");
    ds_repo.save(&ds).unwrap();

    migrate_credentials(&db, &c).unwrap();
    let once = ds_repo.get(ds.id()).unwrap().unwrap();

    let second = migrate_credentials(&db, &c).unwrap();
    let twice = ds_repo.get(ds.id()).unwrap().unwrap();

    assert_eq!(second.total(), 0);
    assert_eq!(once.connection().password, twice.connection().password);
}

#[test]
fn test_empty_secrets_untouched() {
    let db = Database::open_in_memory().unwrap();
    let storage_repo = SqliteStorageConfigRepo::new(db.clone());
    storage_repo.save(&StorageConfig::local("./lake", Utc::now())).unwrap();

    let report = migrate_credentials(&db, &cipher()).unwrap();

    assert_eq!(report.total(), 0);
    assert!(storage_repo.get().unwrap().unwrap().access_key.is_none());
}
