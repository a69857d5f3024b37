//! TypeScript declaration rendering.
//!
//! Every namespace holds three sub-namespaces, always in this order:
//! record type aliases (`$$GlideRecord`), reference aliases
//! (`$$GlideElement`) and field interfaces (`$$tableFields`). The default
//! namespace declares them at top level; an application scope nests them
//! in `declare namespace <scope>`.
//!
//! Inside a scope the bare `$$GlideRecord` names resolve to the scope's own
//! sub-namespaces, so default tables used from a scope are re-exported under
//! `$$global` (`$$global.records`, `$$global.elements`, `$$global.fields`).

use crate::classify::{classify, RenderMode, WrapperCategory};
use crate::error::{RenderError, Result};
use crate::group::{group, NamespaceKey};
use crate::inherit::{partition, ElementComparison, Extends, Override, BASE_RECORD_INTERFACE};
use crate::view::{ElementView, TableView};
use crate::writer::{quote, IndentedWriter};
use glidegen_schema::{CancellationToken, ElementFlags, Name};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, warn};

pub const RECORD_NAMESPACE: &str = "$$GlideRecord";
pub const ELEMENT_NAMESPACE: &str = "$$GlideElement";
pub const FIELDS_NAMESPACE: &str = "$$tableFields";
pub const GLIDE_RECORD: &str = "GlideRecord";
/// Top-level namespace re-exporting default tables for scoped code.
pub const SHARED_NAMESPACE: &str = "$$global";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub mode: RenderMode,
    pub comparison: ElementComparison,
}

#[derive(Debug)]
pub struct RenderOutput {
    pub text: String,
    /// Tables that made it into `text`, in output order.
    pub rendered: Vec<Name>,
    /// Tables left out, one error each.
    pub failed: Vec<RenderError>,
}

/// Render declarations for `tables`.
///
/// Tables whose superclass is not among `tables` (directly or further up
/// the chain) are left out and reported in [`RenderOutput::failed`].
/// Identical input always produces identical text.
pub fn render(
    tables: Vec<TableView>,
    options: &RenderOptions,
    cancel: &CancellationToken,
) -> Result<RenderOutput> {
    let (tables, failed) = select_renderable(tables);
    let groups = group(&tables);

    let mut index = HashMap::new();
    for (key, members) in &groups {
        for table in members {
            index.insert(table.name.clone(), (*table, key.clone()));
        }
    }

    let shared = shared_defaults(&groups, &index, options.mode);
    let mut renderer = Renderer {
        options,
        cancel,
        index,
        writer: IndentedWriter::new(),
    };
    for (position, (key, members)) in groups.iter().enumerate() {
        if position > 0 {
            renderer.writer.blank_line();
        }
        renderer.namespace(key, members)?;
        if key.is_default() && !shared.is_empty() {
            renderer.writer.blank_line();
            renderer.shared_aliases(&shared)?;
        }
    }

    let rendered: Vec<Name> = groups
        .values()
        .flatten()
        .map(|table| table.name.clone())
        .collect();
    info!(
        mode = %options.mode,
        tables = rendered.len(),
        namespaces = groups.len(),
        failed = failed.len(),
        "Rendered declarations"
    );

    Ok(RenderOutput {
        text: renderer.writer.finish(),
        rendered,
        failed,
    })
}

// ============================================================================
// Render set validation
// ============================================================================

/// Drop duplicates, tables with a missing ancestor, and inheritance loops.
fn select_renderable(tables: Vec<TableView>) -> (Vec<TableView>, Vec<RenderError>) {
    let mut failed = Vec::new();
    let mut seen = HashSet::new();
    let mut remaining = Vec::with_capacity(tables.len());
    for table in tables {
        if seen.insert(table.name.clone()) {
            remaining.push(table);
        } else {
            warn!(table = %table.name, "Duplicate table in render set");
            failed.push(RenderError::DuplicateTable(table.name.to_string()));
        }
    }

    // Removing a table can orphan its children, so repeat until stable.
    loop {
        let available: HashSet<Name> = remaining.iter().map(|t| t.name.clone()).collect();
        let (keep, orphaned): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|t| {
            t.super_class
                .as_ref()
                .map_or(true, |parent| available.contains(parent))
        });
        remaining = keep;
        if orphaned.is_empty() {
            break;
        }
        for table in orphaned {
            let super_class = table
                .super_class
                .as_ref()
                .map(Name::to_string)
                .unwrap_or_default();
            warn!(table = %table.name, super_class = %super_class, "Superclass unavailable; skipping table");
            failed.push(RenderError::MissingSuperClass {
                table: table.name.to_string(),
                super_class,
            });
        }
    }

    let parents: HashMap<Name, Option<Name>> = remaining
        .iter()
        .map(|t| (t.name.clone(), t.super_class.clone()))
        .collect();
    let (remaining, cyclic): (Vec<_>, Vec<_>) = remaining
        .into_iter()
        .partition(|t| !reaches_cycle(&t.name, &parents));
    for table in cyclic {
        warn!(table = %table.name, "Inheritance loop; skipping table");
        failed.push(RenderError::CyclicInheritance(table.name.to_string()));
    }

    (remaining, failed)
}

fn reaches_cycle(start: &Name, parents: &HashMap<Name, Option<Name>>) -> bool {
    let mut visited = HashSet::new();
    let mut current = Some(start);
    while let Some(name) = current {
        if !visited.insert(name) {
            return true;
        }
        current = parents.get(name).and_then(Option::as_ref);
    }
    false
}

/// Default tables that scoped tables extend or reference, in output order.
fn shared_defaults<'a>(
    groups: &BTreeMap<NamespaceKey, Vec<&'a TableView>>,
    index: &HashMap<Name, (&'a TableView, NamespaceKey)>,
    mode: RenderMode,
) -> Vec<&'a TableView> {
    let is_default = |name: &Name| index.get(name).map_or(false, |(_, key)| key.is_default());
    let mut wanted = HashSet::new();
    let scoped = groups
        .iter()
        .filter(|(key, _)| !key.is_default())
        .flat_map(|(_, members)| members.iter());
    for table in scoped {
        if let Some(parent) = table.super_class.as_ref().filter(|p| is_default(*p)) {
            wanted.insert(parent.clone());
        }
        for element in &table.elements {
            let type_name = element.type_name.as_ref().map_or("", Name::as_str);
            if classify(type_name, mode).0 != WrapperCategory::Reference {
                continue;
            }
            if let Some(target) = element.reference.as_ref().filter(|t| is_default(*t)) {
                wanted.insert(target.clone());
            }
        }
    }

    groups
        .get(&NamespaceKey::Default)
        .map(|members| {
            members
                .iter()
                .copied()
                .filter(|table| wanted.contains(&table.name))
                .collect()
        })
        .unwrap_or_default()
}

/// Member of [`SHARED_NAMESPACE`] mirroring sub-namespace `sub`.
fn shared_member(sub: &str) -> &'static str {
    match sub {
        RECORD_NAMESPACE => "records",
        ELEMENT_NAMESPACE => "elements",
        _ => "fields",
    }
}

// ============================================================================
// Text generation
// ============================================================================

/// A column that gets a full property declaration.
enum Member<'a> {
    Declared(&'a ElementView),
    Overridden(Override<'a>),
}

impl<'a> Member<'a> {
    fn element(&self) -> &'a ElementView {
        match self {
            Member::Declared(element) => *element,
            Member::Overridden(o) => o.element,
        }
    }
}

struct Renderer<'a> {
    options: &'a RenderOptions,
    cancel: &'a CancellationToken,
    index: HashMap<Name, (&'a TableView, NamespaceKey)>,
    writer: IndentedWriter,
}

impl<'a> Renderer<'a> {
    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(RenderError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Path to a table's type in sub-namespace `sub`, as seen from `current`.
    fn type_path(&self, current: &NamespaceKey, sub: &str, table: &Name) -> String {
        match self.index.get(table) {
            Some((view, key)) => {
                let short = key.short_name(&view.name);
                if key == current {
                    format!("{}.{}", sub, short)
                } else if key.is_default() {
                    format!("{}.{}.{}", SHARED_NAMESPACE, shared_member(sub), short)
                } else {
                    format!("{}.{}.{}", key, sub, short)
                }
            }
            None => format!("{}.{}", sub, table),
        }
    }

    fn namespace(&mut self, key: &NamespaceKey, tables: &[&'a TableView]) -> Result<()> {
        let declaration = match key {
            NamespaceKey::Default => "declare namespace",
            NamespaceKey::Scope(scope) => {
                self.writer.line(format!("declare namespace {} {{", scope));
                self.writer.indent();
                "export namespace"
            }
        };

        self.records(key, declaration, tables)?;
        self.writer.blank_line();
        self.references(key, declaration, tables)?;
        self.writer.blank_line();
        self.fields(key, declaration, tables)?;

        if !key.is_default() {
            self.writer.outdent();
            self.writer.line("}");
        }
        Ok(())
    }

    fn shared_aliases(&mut self, tables: &[&'a TableView]) -> Result<()> {
        self.writer
            .doc_block(&["Default namespace types used by application scopes."]);
        self.writer
            .line(format!("declare namespace {} {{", SHARED_NAMESPACE));
        self.writer.indent();
        for (position, sub) in [RECORD_NAMESPACE, ELEMENT_NAMESPACE, FIELDS_NAMESPACE]
            .into_iter()
            .enumerate()
        {
            if position > 0 {
                self.writer.blank_line();
            }
            self.writer
                .line(format!("export namespace {} {{", shared_member(sub)));
            self.writer.indent();
            for table in tables {
                self.check_cancelled()?;
                let short = NamespaceKey::Default.short_name(&table.name);
                self.writer
                    .line(format!("export type {} = {}.{};", short, sub, short));
            }
            self.writer.outdent();
            self.writer.line("}");
        }
        self.writer.outdent();
        self.writer.line("}");
        Ok(())
    }

    fn records(&mut self, key: &NamespaceKey, declaration: &str, tables: &[&'a TableView]) -> Result<()> {
        self.writer.line(format!("{} {} {{", declaration, RECORD_NAMESPACE));
        self.writer.indent();
        for (position, table) in tables.iter().enumerate() {
            self.check_cancelled()?;
            if position > 0 {
                self.writer.blank_line();
            }
            let parent = match &table.super_class {
                Some(super_class) => self.type_path(key, RECORD_NAMESPACE, super_class),
                None => GLIDE_RECORD.to_string(),
            };
            let alias = format!(
                "export type {} = {} & {};",
                key.short_name(&table.name),
                self.type_path(key, FIELDS_NAMESPACE, &table.name),
                parent
            );
            self.writer.doc_block(&record_doc(table));
            self.writer.line(alias);
        }
        self.writer.outdent();
        self.writer.line("}");
        Ok(())
    }

    fn references(&mut self, key: &NamespaceKey, declaration: &str, tables: &[&'a TableView]) -> Result<()> {
        self.writer.line(format!("{} {} {{", declaration, ELEMENT_NAMESPACE));
        self.writer.indent();
        for (position, table) in tables.iter().enumerate() {
            self.check_cancelled()?;
            if position > 0 {
                self.writer.blank_line();
            }
            let alias = format!(
                "export type {} = Reference<{}, {}>;",
                key.short_name(&table.name),
                self.type_path(key, FIELDS_NAMESPACE, &table.name),
                self.type_path(key, RECORD_NAMESPACE, &table.name)
            );
            self.writer.doc_block(&[format!(
                "Element that refers to a {} glide record.",
                display_label(&table.label, table.name.as_str())
            )]);
            self.writer.line(alias);
        }
        self.writer.outdent();
        self.writer.line("}");
        Ok(())
    }

    fn fields(&mut self, key: &NamespaceKey, declaration: &str, tables: &[&'a TableView]) -> Result<()> {
        self.writer.line(format!("{} {} {{", declaration, FIELDS_NAMESPACE));
        self.writer.indent();
        for (position, table) in tables.iter().enumerate() {
            self.check_cancelled()?;
            if position > 0 {
                self.writer.blank_line();
            }
            self.table_fields(key, table)?;
        }
        self.writer.outdent();
        self.writer.line("}");
        Ok(())
    }

    fn table_fields(&mut self, key: &NamespaceKey, table: &'a TableView) -> Result<()> {
        let parent = table
            .super_class
            .as_ref()
            .and_then(|name| self.index.get(name))
            .map(|(view, _)| *view);
        let parts = partition(table, parent, self.options.mode, self.options.comparison);
        let short = key.short_name(&table.name);

        let label = display_label(&table.label, &short);
        let heading = if short == table.name.as_str() {
            format!("{} glide record fields.", label)
        } else {
            format!("{} ({}) glide record fields.", label, table.name)
        };
        let doc = [
            heading,
            format!("@see {{@link {}}}", self.type_path(key, RECORD_NAMESPACE, &table.name)),
            format!("@see {{@link {}}}", self.type_path(key, ELEMENT_NAMESPACE, &table.name)),
        ];
        self.writer.doc_block(&doc);

        let extends = match parts.extends {
            Extends::Nothing => String::new(),
            Extends::BaseRecord => format!(" extends {}", BASE_RECORD_INTERFACE),
            Extends::SuperClass(parent) => {
                format!(" extends {}", self.type_path(key, FIELDS_NAMESPACE, &parent.name))
            }
        };
        if parts.is_empty() {
            self.writer
                .line(format!("export interface {}{} {{ }}", short, extends));
            return Ok(());
        }

        self.writer
            .line(format!("export interface {}{} {{", short, extends));
        self.writer.indent();

        let parent_path = parent.map(|p| self.type_path(key, FIELDS_NAMESPACE, &p.name));
        let mut first = true;
        for inherited in &parts.inherited {
            self.check_cancelled()?;
            if !std::mem::take(&mut first) {
                self.writer.blank_line();
            }
            let doc = self.inherited_doc(inherited, parent_path.as_deref());
            self.writer.doc_block(&doc);
        }

        let mut members: Vec<Member<'a>> = parts
            .declared
            .iter()
            .copied()
            .map(Member::Declared)
            .chain(parts.overridden.iter().map(|o| Member::Overridden(*o)))
            .collect();
        members.sort_by(|a, b| {
            let (a, b) = (&a.element().name, &b.element().name);
            a.cmp(b).then_with(|| a.as_str().cmp(b.as_str()))
        });
        for member in &members {
            self.check_cancelled()?;
            if !std::mem::take(&mut first) {
                self.writer.blank_line();
            }
            self.property(key, member, parent_path.as_deref());
        }

        self.writer.outdent();
        self.writer.line("}");
        Ok(())
    }

    fn property(&mut self, key: &NamespaceKey, member: &Member<'a>, parent_path: Option<&str>) {
        let element = member.element();
        let type_name = element.type_name.as_ref().map_or("", Name::as_str);
        let (category, explicit) = classify(type_name, self.options.mode);

        let mut doc = vec![format!("{} element.", quote(element_label(element)))];
        if explicit {
            doc.push(type_line(element, type_name));
        }
        if let Some(reference) = &element.reference {
            doc.push(format!("Reference: {}", reference));
        }
        let flags = flag_labels(&element.flags);
        if !flags.is_empty() {
            doc.push(flags.join("; "));
        }
        if let Some(length) = element.max_length.filter(|n| *n > 0) {
            doc.push(format!("Max length: {}", length));
        }
        if let Some(default) = non_blank(element.default_value.as_deref()) {
            doc.push(format!("Default value: {}", quote(default)));
        }
        if let Member::Overridden(o) = member {
            doc.push("@override".to_string());
            if let Some(path) = parent_path {
                doc.push(format!("@see {{@link {}#{}}}", path, o.parent.name));
            }
        }

        let wrapper = self.wrapper_type(key, element, category);
        self.writer.doc_block(&doc);
        self.writer.line(format!("{}: {};", element.name, wrapper));
    }

    fn inherited_doc(&self, inherited: &Override<'a>, parent_path: Option<&str>) -> Vec<String> {
        let element = inherited.element;
        let mut doc = vec![format!("{} element.", quote(element_label(element)))];
        let flags = flag_labels(&element.flags);
        if !flags.is_empty() {
            doc.push(flags.join("; "));
        }
        if let Some(path) = parent_path {
            doc.push(format!("@see {{@link {}#{}}}", path, inherited.parent.name));
        }
        doc
    }

    /// Reference columns pointing at a rendered table use that table's
    /// reference alias; everything else uses the category's wrapper class.
    fn wrapper_type(&self, key: &NamespaceKey, element: &ElementView, category: WrapperCategory) -> String {
        match (&element.reference, category) {
            (Some(target), WrapperCategory::Reference) if self.index.contains_key(target) => {
                self.type_path(key, ELEMENT_NAMESPACE, target)
            }
            _ => category.wrapper_type().to_string(),
        }
    }
}

// ============================================================================
// Documentation text
// ============================================================================

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Quoted label, or the bare name when the label adds nothing.
fn display_label(label: &str, name: &str) -> String {
    if label.trim().is_empty() || label == name {
        name.to_string()
    } else {
        quote(label)
    }
}

fn element_label(element: &ElementView) -> &str {
    non_blank(Some(element.label.as_str())).unwrap_or(element.name.as_str())
}

fn record_doc(table: &TableView) -> Vec<String> {
    let mut lines = vec![format!(
        "{} glide record.",
        display_label(&table.label, table.name.as_str())
    )];
    if let Some(prefix) = non_blank(table.number_prefix.as_deref()) {
        lines.push(format!("Auto-number Prefix: {}", prefix));
    }
    if table.is_extendable {
        lines.push("IsExtendable: true".to_string());
    }
    if let Some(package) = &table.package {
        let name = package.name.as_str();
        match non_blank(package.short_description.as_deref()) {
            Some(description) if description != name => lines.push(format!(
                "Package: {} ({})",
                quote(description),
                quote(name)
            )),
            _ => lines.push(format!("Package: {}", quote(name))),
        }
    }
    lines
}

fn type_line(element: &ElementView, type_name: &str) -> String {
    match element.type_label.as_deref() {
        None => format!("Type: {}", type_name),
        Some(label) if label.eq_ignore_ascii_case(type_name) => format!("Type: {}", quote(label)),
        Some(label) => format!("Type: {} ({})", quote(label), type_name),
    }
}

fn flag_labels(flags: &ElementFlags) -> Vec<&'static str> {
    let mut labels = Vec::new();
    if flags.is_primary {
        labels.push("Is Primary: true");
    } else if flags.is_mandatory {
        labels.push("Is Mandatory: true");
    }
    if !flags.is_active {
        labels.push("Is Active: false");
    }
    if flags.is_array {
        labels.push("Is Array: true");
    }
    if flags.is_read_only {
        labels.push("Is Read-only: true");
    }
    if flags.is_display {
        labels.push("Is Display: true");
    }
    if flags.is_calculated {
        labels.push("Is Calculated: true");
    }
    if flags.is_unique {
        labels.push("Is Unique: true");
    }
    labels
}
