//! FixtureSource loaded from disk, driven through the RemoteSchemaSource lookups.

use glidegen_remote::{FixtureSource, RemoteError, RemoteSchemaSource};
use glidegen_schema::{PackageKind, SysId};
use serde_json::json;

const TASK_ID: &str = "8f1f1c4a1b7f5010a9c4a8f3b24bcb3a";
const PLUGIN_ID: &str = "4c2d9e1f0a3b4c5d6e7f8091a2b3c4d5";

fn write_fixture(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("instance.json");
    let body = json!({
        "fqdn": "dev.example.com",
        "tables": {
            "sys_db_object": [
                {
                    "sys_id": {"value": TASK_ID, "display_value": TASK_ID},
                    "name": {"value": "task", "display_value": "task"},
                    "label": {"value": "Task", "display_value": "Task"},
                    "is_extendable": {"value": "true", "display_value": "true"},
                    "number_ref": {"value": "a0b1c2d3e4f5061728394a5b6c7d8e9f", "display_value": "TASK"},
                    "sys_package": {"value": PLUGIN_ID, "display_value": "Task Engine"}
                },
                {
                    "sys_id": {"value": "9e8d7c6b5a4f30211f0e9d8c7b6a5f40", "display_value": "9e8d7c6b5a4f30211f0e9d8c7b6a5f40"},
                    "name": {"value": "problem", "display_value": "problem"},
                    "super_class": {"value": TASK_ID, "display_value": "Task"}
                }
            ],
            "v_plugin": [
                {"sys_id": PLUGIN_ID, "name": "Task Engine", "id": "com.glide.task"}
            ],
            "sys_glide_object": [
                {"sys_id": "5b6c7d8e9fa0b1c2d3e4f50617283940", "name": "journal", "label": "Journal", "visible": "true"}
            ]
        }
    });
    std::fs::write(&path, serde_json::to_vec_pretty(&body).unwrap()).unwrap();
    path
}

#[tokio::test]
async fn tables_resolve_by_name_and_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let source = FixtureSource::from_file(write_fixture(&dir)).unwrap();

    let task = source.get_table_by_name("task").await.unwrap().unwrap();
    assert!(task.is_extendable);
    assert_eq!(task.number_prefix.as_deref(), Some("TASK"));
    assert_eq!(task.package_id.as_deref(), Some(PLUGIN_ID));

    let problem = source.get_table_by_name("problem").await.unwrap().unwrap();
    let parent_id = SysId::parse(problem.super_class_id.as_deref().unwrap()).unwrap();
    let parent = source.get_table_by_id(&parent_id).await.unwrap().unwrap();
    assert_eq!(parent.name.as_deref(), Some("task"));
}

#[tokio::test]
async fn plugin_answers_first_for_sys_id_lookups() {
    let dir = tempfile::tempdir().unwrap();
    let source = FixtureSource::from_file(write_fixture(&dir)).unwrap();

    let id = SysId::parse(PLUGIN_ID).unwrap();
    let package = source
        .get_package_by_identifier(&id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(package.kind, PackageKind::Plugin);
    assert_eq!(package.plugin_id.as_deref(), Some("com.glide.task"));
    assert_eq!(source.request_count(), 1);

    let missing = source
        .get_package_by_identifier(&SysId::new())
        .await
        .unwrap();
    assert!(missing.is_none());
    // an unknown id is tried against every package table
    assert_eq!(source.request_count(), 1 + PackageKind::LOOKUP_ORDER.len());
}

#[tokio::test]
async fn field_types_and_empty_dictionaries() {
    let dir = tempfile::tempdir().unwrap();
    let source = FixtureSource::from_file(write_fixture(&dir)).unwrap();

    let journal = source.get_field_type_by_name("journal").await.unwrap().unwrap();
    assert_eq!(journal.label.as_deref(), Some("Journal"));
    assert!(journal.is_visible);
    assert!(source.get_elements_by_table_name("task").await.unwrap().is_empty());
}

#[test]
fn malformed_fixture_files_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        FixtureSource::from_file(&path),
        Err(RemoteError::Fixture(_))
    ));
    assert!(matches!(
        FixtureSource::from_file(dir.path().join("absent.json")),
        Err(RemoteError::Io(_))
    ));
}
