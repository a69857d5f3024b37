//! End-to-end rendering from a populated entity cache.

use glidegen_render::{
    capture_tables, render, ElementComparison, RenderError, RenderMode, RenderOptions,
};
use glidegen_schema::{
    CancellationToken, ElementRecord, EntityCache, FieldTypeRecord, Fqdn, PackageKind,
    PackageRecord, SysId, TableRecord,
};

fn fqdn() -> Fqdn {
    Fqdn::parse("dev.example.com").unwrap()
}

fn add_table(cache: &EntityCache, name: &str, label: &str, super_class: Option<&str>) {
    cache
        .upsert_table(
            &fqdn(),
            &TableRecord {
                sys_id: Some(SysId::new().to_string()),
                name: Some(name.into()),
                label: Some(label.into()),
                super_class: super_class.map(String::from),
                ..TableRecord::default()
            },
        )
        .unwrap();
}

fn add_column(cache: &EntityCache, table: &str, name: &str, label: &str, field_type: &str) {
    cache
        .upsert_element(
            &fqdn(),
            &ElementRecord {
                sys_id: Some(SysId::new().to_string()),
                table: Some(table.into()),
                name: Some(name.into()),
                label: Some(label.into()),
                is_active: true,
                field_type: Some(field_type.into()),
                ..ElementRecord::default()
            },
        )
        .unwrap();
}

fn render_all(cache: &EntityCache, mode: RenderMode) -> glidegen_render::RenderOutput {
    let (views, failed) = capture_tables(cache, &cache.tables().unwrap()).unwrap();
    assert!(failed.is_empty(), "{:?}", failed);
    render(
        views,
        &RenderOptions {
            mode,
            comparison: ElementComparison::default(),
        },
        &CancellationToken::new(),
    )
    .unwrap()
}

#[test]
fn incident_extends_the_base_record() {
    let cache = EntityCache::new();
    add_table(&cache, "incident", "Incident", None);
    add_column(&cache, "incident", "sys_id", "Sys ID", "GUID");
    add_column(&cache, "incident", "sys_created_on", "Created", "glide_date_time");
    add_column(&cache, "incident", "short_description", "Short description", "string");

    let output = render_all(&cache, RenderMode::Global);
    let expected = r#"declare namespace $$GlideRecord {
    /**
     * "Incident" glide record.
     */
    export type incident = $$tableFields.incident & GlideRecord;
}

declare namespace $$GlideElement {
    /**
     * Element that refers to a "Incident" glide record.
     */
    export type incident = Reference<$$tableFields.incident, $$GlideRecord.incident>;
}

declare namespace $$tableFields {
    /**
     * "Incident" glide record fields.
     * @see {@link $$GlideRecord.incident}
     * @see {@link $$GlideElement.incident}
     */
    export interface incident extends IBaseRecord {
        /**
         * "Short description" element.
         */
        short_description: GlideElement;
    }
}
"#;
    assert_eq!(output.text, expected);
    assert_eq!(output.rendered.len(), 1);
}

#[test]
fn problem_overrides_short_description_and_inherits_active() {
    let cache = EntityCache::new();
    add_table(&cache, "task", "Task", None);
    add_column(&cache, "task", "active", "Active", "boolean");
    add_column(&cache, "task", "short_description", "Short description", "script");
    add_table(&cache, "problem", "Problem", Some("task"));
    add_column(&cache, "problem", "active", "Active", "boolean");
    add_column(&cache, "problem", "short_description", "Short description", "journal");
    add_column(&cache, "problem", "known_error", "Known error", "boolean");

    let output = render_all(&cache, RenderMode::Global);
    let text = &output.text;

    assert!(text.contains("export type problem = $$tableFields.problem & $$GlideRecord.task;"));
    assert!(text.contains("export interface problem extends $$tableFields.task {"));

    let problem = &text[text.find("export interface problem").unwrap()..];
    let problem = &problem[..problem.find("\n    }\n").unwrap()];
    assert!(problem.contains(
        "        /**\n         * \"Active\" element.\n         * @see {@link $$tableFields.task#active}\n         */\n"
    ));
    assert!(!problem.contains("active: "));
    assert!(problem.contains("         * @override\n"));
    assert!(problem.contains("short_description: GlideElementGlideObject;"));
    assert!(problem.contains("known_error: GlideElementBoolean;"));
    // stubs come before declarations
    assert!(problem.find("#active}").unwrap() < problem.find("known_error:").unwrap());
}

#[test]
fn scoped_mode_uses_the_scoped_wrappers() {
    let cache = EntityCache::new();
    add_table(&cache, "task", "Task", None);
    add_column(&cache, "task", "due", "Due", "glide_date");
    add_column(&cache, "task", "notes", "Notes", "journal");
    add_column(&cache, "task", "cost", "Cost", "decimal");

    let text = render_all(&cache, RenderMode::Scoped).text;
    assert!(text.contains("due: GlideDateTimeElement;"));
    assert!(text.contains(" * Type: glide_date\n"));
    assert!(text.contains("notes: JournalGlideElement;"));
    assert!(text.contains("cost: GlideElement;"));
}

#[test]
fn explicit_types_use_the_cached_type_label() {
    let cache = EntityCache::new();
    cache
        .upsert_field_type(
            &fqdn(),
            &FieldTypeRecord {
                sys_id: Some(SysId::new().to_string()),
                name: Some("decimal".into()),
                label: Some("Decimal".into()),
                ..FieldTypeRecord::default()
            },
        )
        .unwrap();
    add_table(&cache, "cmdb_ci", "Configuration Item", None);
    add_column(&cache, "cmdb_ci", "cost", "Cost", "decimal");

    let text = render_all(&cache, RenderMode::Global).text;
    assert!(text.contains("         * Type: \"Decimal\"\n         */\n        cost: GlideElementNumeric;"));
}

#[test]
fn references_to_rendered_tables_use_their_alias() {
    let cache = EntityCache::new();
    add_table(&cache, "sys_user", "User", None);
    add_table(&cache, "incident", "Incident", None);
    cache
        .upsert_element(
            &fqdn(),
            &ElementRecord {
                sys_id: Some(SysId::new().to_string()),
                table: Some("incident".into()),
                name: Some("caller_id".into()),
                label: Some("Caller".into()),
                is_active: true,
                is_mandatory: true,
                field_type: Some("reference".into()),
                reference: Some("sys_user".into()),
                ..ElementRecord::default()
            },
        )
        .unwrap();
    cache
        .upsert_element(
            &fqdn(),
            &ElementRecord {
                sys_id: Some(SysId::new().to_string()),
                table: Some("incident".into()),
                name: Some("assignment_group".into()),
                label: Some("Assignment group".into()),
                is_active: true,
                field_type: Some("reference".into()),
                reference: Some("sys_user_group".into()),
                ..ElementRecord::default()
            },
        )
        .unwrap();

    let text = render_all(&cache, RenderMode::Global).text;
    assert!(text.contains(" * Reference: sys_user\n"));
    assert!(text.contains(" * Is Mandatory: true\n"));
    assert!(text.contains("caller_id: $$GlideElement.sys_user;"));
    assert!(text.contains("assignment_group: GlideElementReference;"));
    // sys_user has no columns but still gets an interface
    assert!(text.contains("export interface sys_user { }"));
    // no scopes, no re-exports
    assert!(!text.contains("$$global"));
}

#[test]
fn application_tables_nest_in_their_scope() {
    let cache = EntityCache::new();
    let package_id = SysId::new().to_string();
    cache
        .upsert_package(
            &fqdn(),
            &PackageRecord {
                sys_id: Some(package_id.clone()),
                name: Some("Fleet".into()),
                kind: PackageKind::StoreApplication,
                short_description: Some("Fleet management".into()),
                scope: Some("x_acme_fleet".into()),
                version: Some("1.0.0".into()),
                plugin_id: None,
            },
        )
        .unwrap();
    add_table(&cache, "task", "Task", None);
    cache
        .upsert_table(
            &fqdn(),
            &TableRecord {
                sys_id: Some(SysId::new().to_string()),
                name: Some("x_acme_fleet_vehicle".into()),
                label: Some("Vehicle".into()),
                super_class: Some("task".into()),
                package_id: Some(package_id),
                number_prefix: Some("VEH".into()),
                ..TableRecord::default()
            },
        )
        .unwrap();

    add_table(&cache, "sys_user", "User", None);
    cache
        .upsert_element(
            &fqdn(),
            &ElementRecord {
                sys_id: Some(SysId::new().to_string()),
                table: Some("x_acme_fleet_vehicle".into()),
                name: Some("driver".into()),
                label: Some("Driver".into()),
                is_active: true,
                field_type: Some("reference".into()),
                reference: Some("sys_user".into()),
                ..ElementRecord::default()
            },
        )
        .unwrap();

    let text = render_all(&cache, RenderMode::Scoped).text;
    let scoped = &text[text.find("declare namespace x_acme_fleet {").unwrap()..];
    assert!(scoped.starts_with("declare namespace x_acme_fleet {\n    export namespace $$GlideRecord {\n"));
    // Default tables are reached through $$global, never the scope's own sub-namespaces
    assert!(scoped.contains("        export type vehicle = $$tableFields.vehicle & $$global.records.task;"));
    assert!(scoped.contains("        export interface vehicle extends $$global.fields.task {"));
    assert!(scoped.contains("            driver: $$global.elements.sys_user;"));
    assert!(!scoped.contains("$$GlideRecord.task"));
    assert!(!scoped.contains("$$GlideElement.sys_user"));

    let shared = &text[text.find("declare namespace $$global {").unwrap()..];
    assert!(shared.starts_with(
        "declare namespace $$global {\n    export namespace records {\n        \
         export type sys_user = $$GlideRecord.sys_user;\n        \
         export type task = $$GlideRecord.task;\n    }\n"
    ));
    assert!(shared.contains("    export namespace fields {\n        export type sys_user = $$tableFields.sys_user;\n"));
    assert!(text.find("declare namespace $$tableFields").unwrap() < text.find("declare namespace $$global").unwrap());
    assert!(text.find("declare namespace $$global").unwrap() < text.find("x_acme_fleet {").unwrap());
    assert!(scoped.contains("         * Package: \"Fleet management\" (\"Fleet\")\n"));
    assert!(scoped.contains("         * Auto-number Prefix: VEH\n"));
    assert!(scoped.contains("\"Vehicle\" (x_acme_fleet_vehicle) glide record fields."));
    assert!(scoped.ends_with("    }\n}\n"));
    // default namespace first
    assert!(text.find("declare namespace $$GlideRecord").unwrap() < text.find("x_acme_fleet {").unwrap());
}

#[test]
fn rendering_is_deterministic() {
    let build = |order: &[&str]| {
        let cache = EntityCache::new();
        for name in order {
            add_table(&cache, name, name, None);
            add_column(&cache, name, "number", "Number", "string");
            add_column(&cache, name, "active", "Active", "boolean");
        }
        render_all(&cache, RenderMode::Global).text
    };
    let first = build(&["task", "incident", "change_request"]);
    let second = build(&["change_request", "task", "incident"]);
    assert_eq!(first, second);
    assert_eq!(first, build(&["task", "incident", "change_request"]));
}

#[test]
fn missing_superclass_skips_only_that_table() {
    let cache = EntityCache::new();
    add_table(&cache, "incident", "Incident", Some("task"));
    add_table(&cache, "problem", "Problem", None);
    cache
        .resolve_table(&fqdn(), &glidegen_schema::Name::parse("task").unwrap())
        .unwrap();

    // task was only ever named, so it is a stub and cannot be captured
    let (views, failed) = capture_tables(&cache, &cache.tables().unwrap()).unwrap();
    assert_eq!(failed.len(), 1);
    assert!(matches!(failed[0], RenderError::StubTable(_)));

    let output = render(views, &RenderOptions::default(), &CancellationToken::new()).unwrap();
    assert_eq!(output.rendered.len(), 1);
    assert!(output.rendered[0].matches("problem"));
    assert!(matches!(
        output.failed.as_slice(),
        [RenderError::MissingSuperClass { table, .. }] if table == "incident"
    ));
}

#[test]
fn cancellation_stops_rendering() {
    let cache = EntityCache::new();
    add_table(&cache, "task", "Task", None);
    let (views, _) = capture_tables(&cache, &cache.tables().unwrap()).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(matches!(
        render(views, &RenderOptions::default(), &cancel),
        Err(RenderError::Cancelled)
    ));
}
