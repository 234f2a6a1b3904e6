//! Typed schema for the collection registry: which fields exist, how each
//! is parsed out of a submission, and how it is indexed and faceted.

use serde::{Deserialize, Serialize};

/// How a field is written to the submission index
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Analyzed free text; indexed even when the value is missing
    TokenizedText,
    /// Exact string, skipped when missing
    UntokenizedString,
    /// Signed 64-bit numeric
    Long,
    /// Categorical dimension with counts and drill-down
    Facet,
}

/// Which facet family a facet descriptor belongs to. Blank values are
/// dropped for file/link/boolean facets and substituted for plain ones.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FacetKind {
    Plain,
    Boolean,
    FileType,
    LinkType,
}

/// The parser assigned to a descriptor. A registry entry naming a parser
/// outside this set fails deserialization, which fails startup.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    SimpleAttribute,
    JsonPathList,
    Date,
    Year,
    ReleaseDate,
    ReleaseYear,
    ModificationYear,
    CreationYear,
    Content,
    Type,
    Access,
    ViewCount,
    NodeCounting,
    FileType,
}

/// One field of the submission schema, as declared by the registry file
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub parser: ParserKind,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default)]
    pub to_lowercase: bool,
    #[serde(default)]
    pub private: bool,
    /// Regex with exactly one capture group; captures are pipe-joined
    #[serde(default)]
    pub match_pattern: Option<String>,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub facet_kind: Option<FacetKind>,
    /// JSON paths unioned by the json-path parsers
    #[serde(default)]
    pub json_paths: Vec<String>,
    /// Whether query-time synonym/ontology expansion applies to this field
    #[serde(default)]
    pub expandable: bool,
}

impl FieldDescriptor {
    pub fn is_facet(&self) -> bool {
        self.field_type == FieldType::Facet
    }

    pub fn is_boolean_facet(&self) -> bool {
        self.facet_kind == Some(FacetKind::Boolean)
    }

    /// Facet kinds whose blank values are skipped instead of defaulted
    pub fn skips_blank_facet(&self) -> bool {
        matches!(
            self.facet_kind,
            Some(FacetKind::Boolean) | Some(FacetKind::FileType) | Some(FacetKind::LinkType)
        )
    }
}

/// A named group of submissions sharing a field schema. The reserved name
/// `public` holds descriptors applied to every submission.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CollectionDescriptor {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    /// Direct child collections; drill-downs include the transitive set
    #[serde(default)]
    pub subcollections: Vec<String>,
}

/// The universal base collection name
pub const PUBLIC_COLLECTION: &str = "public";

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_descriptor_deserialize_defaults() {
        let json = r#"{ "name": "title", "field_type": "tokenized_text", "parser": "simple_attribute" }"#;
        let d: FieldDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.sortable, false);
        assert_eq!(d.private, false);
        assert_eq!(d.json_paths.len(), 0);
        assert_eq!(d.is_facet(), false);
    }

    #[test]
    fn test_unknown_parser_rejected() {
        let json = r#"{ "name": "title", "field_type": "tokenized_text", "parser": "no_such_parser" }"#;
        let d = serde_json::from_str::<FieldDescriptor>(json);
        assert_eq!(d.is_err(), true);
    }

    #[test]
    fn test_blank_facet_rules() {
        let json = r#"{ "name": "file_type", "field_type": "facet", "parser": "json_path_list", "facet_kind": "file_type" }"#;
        let d: FieldDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.skips_blank_facet(), true);
        assert_eq!(d.is_boolean_facet(), false);
    }
}
