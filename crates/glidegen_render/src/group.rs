//! Namespace grouping.

use crate::view::TableView;
use glidegen_schema::Name;
use std::collections::BTreeMap;
use std::fmt;

/// Scope value that means "no application scope".
pub const GLOBAL_SCOPE: &str = "global";

/// Namespace a table renders into. `Default` sorts before every scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NamespaceKey {
    Default,
    /// Lowercased application scope.
    Scope(String),
}

impl NamespaceKey {
    /// Application-owned tables render into their scope's namespace.
    /// Everything else, including the `global` scope, is default.
    pub fn of(table: &TableView) -> Self {
        table
            .package
            .as_ref()
            .filter(|package| package.kind.is_application())
            .and_then(|package| package.scope.as_deref())
            .map(|scope| scope.trim().to_ascii_lowercase())
            .filter(|scope| !scope.is_empty() && scope != GLOBAL_SCOPE)
            .map_or(NamespaceKey::Default, NamespaceKey::Scope)
    }

    pub fn is_default(&self) -> bool {
        matches!(self, NamespaceKey::Default)
    }

    /// Name a table's types get inside this namespace: the scope prefix is
    /// dropped from scoped table names.
    pub fn short_name(&self, table: &Name) -> String {
        let full = table.as_str();
        if let NamespaceKey::Scope(scope) = self {
            let prefix_len = scope.len() + 1;
            let has_prefix = full.len() > prefix_len
                && full
                    .get(..prefix_len)
                    .map_or(false, |prefix| prefix.eq_ignore_ascii_case(&format!("{}_", scope)));
            if has_prefix {
                if let Some(rest) = full.get(prefix_len..) {
                    return rest.to_string();
                }
            }
        }
        full.to_string()
    }
}

impl fmt::Display for NamespaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceKey::Default => f.write_str(GLOBAL_SCOPE),
            NamespaceKey::Scope(scope) => f.write_str(scope),
        }
    }
}

/// Group tables by namespace.
///
/// Groups iterate default first, then by scope. Tables within a group are
/// ordered by name ignoring case, ties broken by the exact name.
pub fn group(tables: &[TableView]) -> BTreeMap<NamespaceKey, Vec<&TableView>> {
    let mut groups: BTreeMap<NamespaceKey, Vec<&TableView>> = BTreeMap::new();
    for table in tables {
        groups.entry(NamespaceKey::of(table)).or_default().push(table);
    }
    for members in groups.values_mut() {
        members.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.name.as_str().cmp(b.name.as_str()))
        });
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::PackageView;
    use glidegen_schema::{Fqdn, PackageKind};

    fn table(name: &str, package: Option<(PackageKind, &str)>) -> TableView {
        TableView {
            source: Fqdn::parse("dev.example.com").unwrap(),
            name: Name::parse(name).unwrap(),
            label: String::new(),
            is_extendable: false,
            number_prefix: None,
            super_class: None,
            package: package.map(|(kind, scope)| PackageView {
                name: Name::parse("pkg").unwrap(),
                kind,
                short_description: None,
                scope: Some(scope.to_string()),
            }),
            elements: Vec::new(),
        }
    }

    #[test]
    fn application_scopes_get_their_own_namespace() {
        assert_eq!(NamespaceKey::of(&table("task", None)), NamespaceKey::Default);
        assert_eq!(
            NamespaceKey::of(&table("task", Some((PackageKind::Application, "global")))),
            NamespaceKey::Default
        );
        assert_eq!(
            NamespaceKey::of(&table("x_fleet_car", Some((PackageKind::StoreApplication, "X_Fleet")))),
            NamespaceKey::Scope("x_fleet".into())
        );
        assert_eq!(
            NamespaceKey::of(&table("cmdb", Some((PackageKind::Plugin, "x_fleet")))),
            NamespaceKey::Default
        );
    }

    #[test]
    fn groups_are_ordered_default_first() {
        let tables = vec![
            table("x_b_thing", Some((PackageKind::CustomApplication, "x_b"))),
            table("Task", None),
            table("x_a_thing", Some((PackageKind::Application, "x_a"))),
            table("incident", None),
            table("task", None),
        ];
        let groups = group(&tables);
        let keys: Vec<_> = groups.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["global", "x_a", "x_b"]);

        let default: Vec<_> = groups[&NamespaceKey::Default]
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(default, vec!["incident", "Task", "task"]);
    }

    #[test]
    fn scope_prefix_is_dropped_from_short_names() {
        let scope = NamespaceKey::Scope("x_fleet".into());
        assert_eq!(scope.short_name(&Name::parse("x_fleet_car").unwrap()), "car");
        assert_eq!(scope.short_name(&Name::parse("X_FLEET_car").unwrap()), "car");
        assert_eq!(scope.short_name(&Name::parse("x_fleet_").unwrap()), "x_fleet_");
        assert_eq!(scope.short_name(&Name::parse("cmdb_ci").unwrap()), "cmdb_ci");
        assert_eq!(NamespaceKey::Default.short_name(&Name::parse("task").unwrap()), "task");
    }
}
