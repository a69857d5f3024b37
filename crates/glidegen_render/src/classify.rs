//! Scalar type to element wrapper classification.
//!
//! The platform exposes two client object models. Global scripts see a
//! dedicated `GlideElement*` class for most scalar types; scoped scripts
//! see a much smaller set. Each model gets its own mapping table over the
//! same type-name vocabulary, and anything not listed falls back to the
//! generic wrapper.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Which client object model declarations are written for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Global,
    Scoped,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::Global => "global",
            RenderMode::Scoped => "scoped",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" | "g" => Ok(RenderMode::Global),
            "scoped" | "s" => Ok(RenderMode::Scoped),
            other => Err(format!(
                "invalid render mode '{}', expected 'global' or 'scoped'",
                other
            )),
        }
    }
}

/// How client code reaches a column's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapperCategory {
    Generic,
    Boolean,
    Numeric,
    Reference,
    DateTime,
    Journal,
    Script,
    GlideObject,
    PhoneNumber,
    /// A global-only wrapper class dedicated to one type family.
    Dedicated(&'static str),
}

impl WrapperCategory {
    /// Declared type of a column in this category.
    pub fn wrapper_type(&self) -> &'static str {
        match self {
            WrapperCategory::Generic => "GlideElement",
            WrapperCategory::Boolean => "GlideElementBoolean",
            WrapperCategory::Numeric => "GlideElementNumeric",
            WrapperCategory::Reference => "GlideElementReference",
            WrapperCategory::DateTime => "GlideDateTimeElement",
            WrapperCategory::Journal => "JournalGlideElement",
            WrapperCategory::Script => "GlideElementScript",
            WrapperCategory::GlideObject => "GlideElementGlideObject",
            WrapperCategory::PhoneNumber => "GlideElementPhoneNumber",
            WrapperCategory::Dedicated(name) => *name,
        }
    }
}

use WrapperCategory::*;

/// `(type name, category, explicit)` for the global object model.
const GLOBAL_TYPES: &[(&str, WrapperCategory, bool)] = &[
    ("boolean", Boolean, false),
    ("integer", Numeric, false),
    ("decimal", Numeric, true),
    ("float", Numeric, true),
    ("percent_complete", Numeric, true),
    ("order_index", Numeric, true),
    ("longint", Numeric, true),
    ("sys_class_name", Dedicated("GlideElementSysClassName"), false),
    ("document_id", Dedicated("GlideElementDocumentId"), false),
    ("domain_id", Dedicated("GlideElementDomainId"), false),
    ("related_tags", Dedicated("GlideElementRelatedTags"), false),
    ("translated_field", Dedicated("GlideElementTranslatedField"), false),
    ("documentation_field", Dedicated("GlideElementDocumentation"), false),
    ("script", Script, false),
    ("script_plain", Script, true),
    ("xml", Script, true),
    ("conditions", Dedicated("GlideElementConditions"), false),
    ("variables", Dedicated("GlideElementVariables"), false),
    ("password", Dedicated("GlideElementPassword"), false),
    ("user_image", Dedicated("GlideElementUserImage"), false),
    ("translated_text", Dedicated("GlideElementTranslatedText"), false),
    ("counter", Dedicated("GlideElementCounter"), false),
    ("currency", Dedicated("GlideElementCurrency"), false),
    ("price", Dedicated("GlideElementPrice"), false),
    ("short_field_name", Dedicated("GlideElementShortFieldName"), false),
    ("audio", Dedicated("GlideElementAudio"), false),
    ("replication_payload", Dedicated("GlideElementReplicationPayload"), false),
    ("breakdown_element", Dedicated("GlideElementBreakdownElement"), false),
    ("compressed", Dedicated("GlideElementCompressed"), false),
    ("translated_html", Dedicated("GlideElementTranslatedHTML"), false),
    ("url", Dedicated("GlideElementURL"), false),
    ("template_value", Dedicated("GlideElementWorkflowConditions"), false),
    ("short_table_name", Dedicated("GlideElementShortTableName"), false),
    ("data_object", Dedicated("GlideElementDataObject"), false),
    ("string_full_utf8", Dedicated("GlideElementFullUTF8"), false),
    ("icon", Dedicated("GlideElementIcon"), false),
    ("glide_var", Dedicated("GlideElementGlideVar"), false),
    ("internal_type", Dedicated("GlideElementInternalType"), false),
    ("simple_name_values", Dedicated("GlideElementSimpleNameValue"), false),
    ("name_values", Dedicated("GlideElementNameValue"), false),
    ("source_name", Dedicated("GlideElementSourceName"), false),
    ("source_table", Dedicated("GlideElementSourceTable"), false),
    ("password2", Dedicated("GlideElementPassword2"), false),
    ("reference", Reference, false),
    ("wiki_text", Dedicated("GlideElementWikiText"), false),
    ("workflow", Dedicated("GlideElementWorkflow"), false),
    ("glide_date_time", GlideObject, false),
    ("glide_date", GlideObject, true),
    ("glide_time", GlideObject, true),
    ("timer", GlideObject, true),
    ("glide_duration", GlideObject, true),
    ("glide_utc_time", GlideObject, true),
    ("due_date", GlideObject, true),
    ("glide_precise_time", GlideObject, true),
    ("calendar_date_time", GlideObject, true),
    ("user_input", GlideObject, true),
    ("journal_input", GlideObject, true),
    ("journal_list", GlideObject, true),
    ("html", GlideObject, true),
    ("glide_list", GlideObject, true),
    ("journal", GlideObject, true),
    ("glide_action_list", GlideObject, true),
    ("date", GlideObject, true),
    ("day_of_week", GlideObject, true),
    ("month_of_year", GlideObject, true),
    ("week_of_month", GlideObject, true),
    ("phone_number", PhoneNumber, false),
    ("caller_phone_number", PhoneNumber, true),
    ("phone_number_e164", PhoneNumber, true),
    ("ip_addr", Dedicated("GlideElementIPAddress"), false),
];

/// `(type name, category, explicit)` for the scoped object model.
const SCOPED_TYPES: &[(&str, WrapperCategory, bool)] = &[
    ("journal", Journal, false),
    ("glide_list", Journal, true),
    ("glide_action_list", Journal, true),
    ("user_input", Journal, true),
    ("journal_input", Journal, true),
    ("journal_list", Journal, true),
    ("glide_date_time", DateTime, false),
    ("glide_date", DateTime, true),
    ("glide_time", DateTime, true),
    ("timer", DateTime, true),
    ("glide_duration", DateTime, true),
    ("glide_utc_time", DateTime, true),
    ("due_date", DateTime, true),
    ("glide_precise_time", DateTime, true),
    ("calendar_date_time", DateTime, true),
    ("reference", Reference, false),
    ("currency2", Reference, true),
    ("domain_id", Reference, true),
    ("document_id", Reference, true),
    ("source_id", Reference, true),
];

type TypeTable = HashMap<&'static str, (WrapperCategory, bool)>;

static GLOBAL: Lazy<TypeTable> = Lazy::new(|| build(GLOBAL_TYPES));
static SCOPED: Lazy<TypeTable> = Lazy::new(|| build(SCOPED_TYPES));

fn build(entries: &[(&'static str, WrapperCategory, bool)]) -> TypeTable {
    entries
        .iter()
        .map(|(name, category, explicit)| (*name, (*category, *explicit)))
        .collect()
}

/// Wrapper category of a scalar type, and whether its documentation must
/// name the type explicitly. Unknown names get the generic wrapper.
pub fn classify(type_name: &str, mode: RenderMode) -> (WrapperCategory, bool) {
    let table = match mode {
        RenderMode::Global => &*GLOBAL,
        RenderMode::Scoped => &*SCOPED,
    };
    let key = type_name.trim().to_ascii_lowercase();
    table.get(key.as_str()).copied().unwrap_or((Generic, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_is_explicit_numeric_in_global_mode() {
        assert_eq!(classify("decimal", RenderMode::Global), (Numeric, true));
        assert_eq!(classify("integer", RenderMode::Global), (Numeric, false));
    }

    #[test]
    fn string_is_generic() {
        assert_eq!(classify("string", RenderMode::Global), (Generic, false));
        assert_eq!(classify("string", RenderMode::Scoped), (Generic, false));
    }

    #[test]
    fn modes_disagree_on_journal_and_dates() {
        assert_eq!(classify("journal", RenderMode::Global), (GlideObject, true));
        assert_eq!(classify("journal", RenderMode::Scoped), (Journal, false));
        assert_eq!(classify("glide_date", RenderMode::Scoped), (DateTime, true));
        assert_eq!(classify("decimal", RenderMode::Scoped), (Generic, false));
        assert_eq!(classify("document_id", RenderMode::Scoped), (Reference, true));
    }

    #[test]
    fn unknown_and_oddly_cased_names() {
        assert_eq!(classify("no_such_type", RenderMode::Global), (Generic, false));
        assert_eq!(classify("", RenderMode::Scoped), (Generic, false));
        assert_eq!(classify(" Boolean ", RenderMode::Global), (Boolean, false));
    }

    #[test]
    fn mapping_tables_have_no_duplicates() {
        assert_eq!(GLOBAL.len(), GLOBAL_TYPES.len());
        assert_eq!(SCOPED.len(), SCOPED_TYPES.len());
    }

    #[test]
    fn wrapper_type_names() {
        assert_eq!(Reference.wrapper_type(), "GlideElementReference");
        assert_eq!(Dedicated("GlideElementURL").wrapper_type(), "GlideElementURL");
        assert_eq!("S".parse::<RenderMode>(), Ok(RenderMode::Scoped));
        assert!("local".parse::<RenderMode>().is_err());
    }
}
