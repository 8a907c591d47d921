mod common;

use snaplake_core::errors::ExErrorKind;
use snaplake_store::repo::DatasourceRepository;
use snaplake_store::Database;

#[test]
fn test_save_and_get_round_trip() {
    let db = Database::open_in_memory().unwrap();
    let (repo, _) = common::repos(&db);
    let ds = common::new_datasource("shop");

    repo.save(&ds).unwrap();

    assert_eq!(repo.get(ds.id()).unwrap(), Some(ds.clone()));
    assert_eq!(repo.find_by_name("shop").unwrap(), Some(ds));
    assert_eq!(repo.get("missing").unwrap(), None);
}

#[test]
fn test_duplicate_name_is_already_exists() {
    let db = Database::open_in_memory().unwrap();
    let (repo, _) = common::repos(&db);

    repo.save(&common::new_datasource("shop")).unwrap();
    let err = repo.save(&common::new_datasource("shop")).unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::AlreadyExists);
}

#[test]
fn test_update_and_list_enabled() {
    let db = Database::open_in_memory().unwrap();
    let (repo, _) = common::repos(&db);

    let mut a = common::new_datasource("alpha");
    let b = common::new_datasource("beta");
    repo.save(&a).unwrap();
    repo.save(&b).unwrap();

    a.disable(a.updated_at() + chrono::Duration::seconds(1));
    repo.save(&a).unwrap();

    let names: Vec<_> = repo.list().unwrap().iter().map(|d| d.name().to_string()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);

    let enabled = repo.list_enabled().unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].name(), "beta");
}

#[test]
fn test_delete() {
    let db = Database::open_in_memory().unwrap();
    let (repo, _) = common::repos(&db);
    let ds = common::new_datasource("gone");
    repo.save(&ds).unwrap();

    assert!(repo.delete(ds.id()).unwrap());
    assert!(!repo.delete(ds.id()).unwrap());
    assert!(repo.get(ds.id()).unwrap().is_none());
}
