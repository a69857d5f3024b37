//! Cache store integration tests.
//!
//! These exercise the store the way the generator uses it: fill an entity
//! cache, persist it, and restore it into a fresh cache on the next run.

use glidegen_db::CacheDb;
use glidegen_schema::{
    ElementRecord, EntityCache, FieldTypeRecord, Fqdn, Name, PackageKind, PackageRecord, SysId,
    TableRecord,
};
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

fn source() -> Fqdn {
    Fqdn::parse("dev12345.service-now.com").unwrap()
}

fn name(value: &str) -> Name {
    Name::parse(value).unwrap()
}

fn populate(cache: &EntityCache) {
    cache
        .register_source(source(), Some("Development".to_string()), true)
        .unwrap();
    cache
        .upsert_package(
            &source(),
            &PackageRecord {
                sys_id: Some(SysId::new().to_string()),
                name: Some("x_acme_fleet".to_string()),
                kind: PackageKind::StoreApplication,
                short_description: Some("Fleet tracking".to_string()),
                scope: Some("x_acme_fleet".to_string()),
                version: Some("2.1.0".to_string()),
                plugin_id: None,
            },
        )
        .unwrap();
    cache
        .upsert_field_type(
            &source(),
            &FieldTypeRecord {
                sys_id: Some(SysId::new().to_string()),
                name: Some("string".to_string()),
                label: Some("String".to_string()),
                is_visible: true,
                ..FieldTypeRecord::default()
            },
        )
        .unwrap();
    cache
        .upsert_table(
            &source(),
            &TableRecord {
                sys_id: Some(SysId::new().to_string()),
                name: Some("x_acme_fleet_truck".to_string()),
                label: Some("Truck".to_string()),
                is_extendable: true,
                number_prefix: Some("TRK".to_string()),
                package: Some("x_acme_fleet".to_string()),
                ..TableRecord::default()
            },
        )
        .unwrap();
    for column in ["plate", "vin"] {
        cache
            .upsert_element(
                &source(),
                &ElementRecord {
                    sys_id: Some(SysId::new().to_string()),
                    table: Some("x_acme_fleet_truck".to_string()),
                    name: Some(column.to_string()),
                    label: Some(column.to_uppercase()),
                    is_active: true,
                    is_unique: column == "vin",
                    max_length: Some(40),
                    field_type: Some("string".to_string()),
                    ..ElementRecord::default()
                },
            )
            .unwrap();
    }
}

// ============================================================================
// Tests
// ============================================================================

/// A saved cache restores with every cross reference resolved.
#[tokio::test]
async fn test_save_and_restore_cache() {
    let tmp = TempDir::new().unwrap();
    let db = CacheDb::open(tmp.path().join("cache.sqlite3")).await.unwrap();

    let cache = EntityCache::new();
    populate(&cache);
    assert_eq!(db.save_from(&cache).await.unwrap(), 5);

    let restored = EntityCache::new();
    assert_eq!(db.load_into(&restored).await.unwrap(), 5);

    let truck = restored
        .get_table(&source(), &name("X_ACME_FLEET_TRUCK"))
        .unwrap()
        .unwrap();
    {
        let data = truck.read().unwrap();
        assert_eq!(data.number_prefix.as_deref(), Some("TRK"));
        let package = data.package.as_ref().unwrap().handle().unwrap();
        assert_eq!(package.read().unwrap().detail.scope(), Some("x_acme_fleet"));
    }

    let elements = restored.elements_of(&truck).unwrap();
    assert_eq!(elements.len(), 2);
    let vin = elements[1].read().unwrap();
    assert!(vin.flags.is_unique);
    assert!(vin.field_type.as_ref().unwrap().is_resolved());
    assert_eq!(restored.sources().unwrap()[0].label.as_deref(), Some("Development"));
}

/// Saving the same cache twice updates rows in place.
#[tokio::test]
async fn test_repeated_save_does_not_duplicate_rows() {
    let tmp = TempDir::new().unwrap();
    let db = CacheDb::open(tmp.path().join("cache.sqlite3")).await.unwrap();

    let cache = EntityCache::new();
    populate(&cache);
    db.save_from(&cache).await.unwrap();
    populate(&cache);
    db.save_from(&cache).await.unwrap();

    let tables = db.list_tables(None).await.unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "x_acme_fleet_truck");
    assert_eq!(tables[0].element_count, 2);
    assert_eq!(tables[0].package.as_deref(), Some("x_acme_fleet"));
}

/// Lookups by name ignore case and are scoped to the source.
#[tokio::test]
async fn test_get_table_and_elements_by_name() {
    let tmp = TempDir::new().unwrap();
    let db = CacheDb::open(tmp.path().join("cache.sqlite3")).await.unwrap();

    let cache = EntityCache::new();
    populate(&cache);
    db.save_from(&cache).await.unwrap();

    let stored = db
        .get_table(&source(), &name("X_Acme_Fleet_Truck"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.record.label.as_deref(), Some("Truck"));

    let other = Fqdn::parse("prod.service-now.com").unwrap();
    assert!(db
        .get_table(&other, &name("x_acme_fleet_truck"))
        .await
        .unwrap()
        .is_none());
    assert!(db.list_tables(Some(&other)).await.unwrap().is_empty());

    let columns: Vec<String> = db
        .elements_of(&source(), &name("x_acme_fleet_truck"))
        .await
        .unwrap()
        .into_iter()
        .filter_map(|stored| stored.record.name)
        .collect();
    assert_eq!(columns, vec!["plate", "vin"]);
}
