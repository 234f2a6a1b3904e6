//! Tantivy schemas for the three index families. The submission schema is
//! derived from a registry snapshot at startup; the file and page-tab
//! schemas are fixed. Lucene-style dynamic per-document fields do not
//! exist in tantivy, so file attributes are encoded into the `attr`
//! field as exact `name:value` terms with a stored JSON companion.

use tantivy::schema::{
    Facet, FacetOptions, Field, IndexRecordOption, Schema, SchemaBuilder, TextFieldIndexing, TextOptions, FAST, INDEXED, STORED,
    STRING, TEXT,
};

use subsearch_types::{Error, FieldDescriptor, FieldType, Result};

use crate::analyzers::SUBMISSION_ANALYZER;
use crate::registry::PropertyRegistry;

/// Reserved submission-index fields, present regardless of the registry
pub mod reserved {
    /// Primary key of the submission and page-tab indices
    pub const ACCESSION: &str = "accession";
    /// Number of files across all of the submission's manifests
    pub const FILES: &str = "files";
    /// `"Name|Size|"` plus the discovered attribute columns, a pipe
    /// after each
    pub const FILE_ATTRIBUTE_NAMES: &str = "file_attribute_names";
    /// Searchable attribute tokens embedded from file metadata
    pub const FILE_ATT_KEY_VALUE: &str = "file_att_key_value";
    /// `"true"` when any file or manifest failed to process
    pub const HAS_FILE_PARSING_ERROR: &str = "has_file_parsing_error";
    /// Space-joined accessions of sections that carry file lists
    pub const SECTIONS_WITH_FILES: &str = "sections_with_files";
    /// The ontology facet dimension
    pub const EFO_FACET: &str = "efo";
    /// The collection facet dimension
    pub const COLLECTION_FACET: &str = "collection";
    /// Free-text body scanned for ontology terms; also the default query field
    pub const CONTENT: &str = "content";
    /// Document type field consulted by the exclusion filter
    pub const TYPE: &str = "type";
}

/// Suffix of the companion sort-key field emitted for sortable strings
pub const SORT_SUFFIX: &str = "_sort";

pub fn sort_field_name(name: &str) -> String {
    format!("{}{}", name, SORT_SUFFIX)
}

/// The submission schema plus handles to its reserved fields
#[derive(Clone)]
pub struct SubmissionSchema {
    pub schema: Schema,
    pub accession: Field,
    pub files: Field,
    pub file_attribute_names: Field,
    pub file_att_key_value: Field,
    pub has_file_parsing_error: Field,
    pub sections_with_files: Field,
    pub efo: Field,
}

impl SubmissionSchema {
    /// Build the schema from a registry snapshot. Every descriptor in the
    /// union of all collections contributes a field; a descriptor name
    /// clashing with a reserved field is a configuration error.
    pub fn for_registry(registry: &PropertyRegistry) -> Result<Self> {
        let mut builder = Schema::builder();

        let accession = builder.add_text_field(reserved::ACCESSION, STRING | STORED);
        let files = builder.add_i64_field(reserved::FILES, INDEXED | STORED | FAST);
        let file_attribute_names = builder.add_text_field(reserved::FILE_ATTRIBUTE_NAMES, STRING | STORED);
        let file_att_key_value = builder.add_text_field(reserved::FILE_ATT_KEY_VALUE, TEXT);
        let has_file_parsing_error = builder.add_text_field(reserved::HAS_FILE_PARSING_ERROR, STRING | STORED);
        let sections_with_files = builder.add_text_field(reserved::SECTIONS_WITH_FILES, TEXT | STORED);
        let efo = builder.add_facet_field(reserved::EFO_FACET, FacetOptions::default());

        for descriptor in registry.global_property_registry().values() {
            if is_reserved(&descriptor.name) {
                return Err(Error::InvalidConfig(format!(
                    "registry field '{}' clashes with a reserved field",
                    descriptor.name
                )));
            }
            add_descriptor_field(&mut builder, descriptor);
        }

        let schema = builder.build();
        Ok(Self {
            accession,
            files,
            file_attribute_names,
            file_att_key_value,
            has_file_parsing_error,
            sections_with_files,
            efo,
            schema,
        })
    }

    pub fn field(&self, name: &str) -> Result<Field> {
        self.schema.get_field(name).ok_or_else(|| Error::UnknownField(name.into()))
    }

    /// Primary-key term for one accession
    pub fn accession_term(&self, accession: &str) -> tantivy::Term {
        tantivy::Term::from_field_text(self.accession, accession)
    }
}

fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        reserved::ACCESSION
            | reserved::FILES
            | reserved::FILE_ATTRIBUTE_NAMES
            | reserved::FILE_ATT_KEY_VALUE
            | reserved::HAS_FILE_PARSING_ERROR
            | reserved::SECTIONS_WITH_FILES
            | reserved::EFO_FACET
    )
}

fn add_descriptor_field(builder: &mut SchemaBuilder, descriptor: &FieldDescriptor) {
    match descriptor.field_type {
        FieldType::TokenizedText => {
            let indexing = TextFieldIndexing::default()
                .set_tokenizer(SUBMISSION_ANALYZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions);
            builder.add_text_field(&descriptor.name, TextOptions::default().set_indexing_options(indexing).set_stored());
        }
        FieldType::UntokenizedString => {
            builder.add_text_field(&descriptor.name, STRING | STORED);
            if descriptor.sortable {
                builder.add_text_field(&sort_field_name(&descriptor.name), STRING);
            }
        }
        FieldType::Long => {
            builder.add_i64_field(&descriptor.name, INDEXED | STORED | FAST);
        }
        FieldType::Facet => {
            builder.add_facet_field(&descriptor.name, FacetOptions::default());
        }
    }
}

/// Fixed fields of the file index, one handle per schema field
#[derive(Clone)]
pub struct FileFields {
    pub schema: Schema,
    pub id: Field,
    pub owner: Field,
    pub position: Field,
    pub size: Field,
    pub path: Field,
    pub path_sort: Field,
    pub name: Field,
    pub name_lc: Field,
    pub name_sort: Field,
    pub entry_type: Field,
    pub is_directory: Field,
    pub section: Field,
    pub section_lc: Field,
    pub section_sort: Field,
    pub attr: Field,
    pub attr_json: Field,
}

impl FileFields {
    pub fn build() -> Self {
        let mut builder = Schema::builder();
        let id = builder.add_text_field("id", STRING);
        let owner = builder.add_text_field("owner", STRING | STORED);
        let position = builder.add_u64_field("position", INDEXED | STORED | FAST);
        let size = builder.add_u64_field("size", INDEXED | STORED | FAST);
        let path = builder.add_text_field("path", STRING | STORED);
        let path_sort = builder.add_text_field("path_sort", STRING);
        let name = builder.add_text_field("name", STRING | STORED);
        let name_lc = builder.add_text_field("name_lc", STRING);
        let name_sort = builder.add_text_field("name_sort", STRING);
        let entry_type = builder.add_text_field("type", STRING | STORED);
        let is_directory = builder.add_text_field("is_directory", STRING | STORED);
        let section = builder.add_text_field("section", STRING | STORED);
        let section_lc = builder.add_text_field("section_lc", STRING);
        let section_sort = builder.add_text_field("section_sort", STRING);
        let attr = builder.add_text_field("attr", STRING);
        let attr_json = builder.add_text_field("attr_json", STORED);
        let schema = builder.build();
        Self {
            schema,
            id,
            owner,
            position,
            size,
            path,
            path_sort,
            name,
            name_lc,
            name_sort,
            entry_type,
            is_directory,
            section,
            section_lc,
            section_sort,
            attr,
            attr_json,
        }
    }

    /// Primary-key term `"{accession}-{position}"` for one file document
    pub fn id_term(&self, accession: &str, position: u64) -> tantivy::Term {
        tantivy::Term::from_field_text(self.id, &format!("{}-{}", accession, position))
    }

    pub fn owner_term(&self, accession: &str) -> tantivy::Term {
        tantivy::Term::from_field_text(self.owner, accession)
    }
}

/// The page-tab schema: primary key plus the stored raw tabular body
#[derive(Clone)]
pub struct PageTabFields {
    pub schema: Schema,
    pub accession: Field,
    pub content: Field,
}

impl PageTabFields {
    pub fn build() -> Self {
        let mut builder = Schema::builder();
        let accession = builder.add_text_field("accession", STRING | STORED);
        let content = builder.add_text_field("content", STORED);
        let schema = builder.build();
        Self { schema, accession, content }
    }

    pub fn accession_term(&self, accession: &str) -> tantivy::Term {
        tantivy::Term::from_field_text(self.accession, accession)
    }
}

/// One facet path per strict prefix of the ancestry, root first. The
/// deepest element, the matched term itself, is never written; writing
/// every prefix above it keeps drill-down aggregation consistent across
/// branches.
pub fn ancestry_facets(ancestry: &[String]) -> Vec<Facet> {
    let labels: Vec<&str> = ancestry.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
    (0..labels.len().saturating_sub(1))
        .map(|depth| Facet::from_path(labels[..=depth].iter()))
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::registry::tests::tiny_registry;

    #[test]
    fn reserved_fields_present() {
        let registry = tiny_registry();
        let subs = SubmissionSchema::for_registry(&registry).unwrap();
        assert_eq!(subs.schema.get_field(reserved::ACCESSION).is_some(), true);
        assert_eq!(subs.schema.get_field(reserved::EFO_FACET).is_some(), true);
        assert_eq!(subs.schema.get_field(reserved::FILES).is_some(), true);
    }

    #[test]
    fn registry_fields_added() {
        let registry = tiny_registry();
        let subs = SubmissionSchema::for_registry(&registry).unwrap();
        assert_eq!(subs.schema.get_field("title").is_some(), true);
        assert_eq!(subs.schema.get_field(reserved::COLLECTION_FACET).is_some(), true);
    }

    #[test]
    fn sortable_string_gets_sort_field() {
        let registry = tiny_registry();
        let subs = SubmissionSchema::for_registry(&registry).unwrap();
        assert_eq!(subs.schema.get_field(&sort_field_name("author")).is_some(), true);
    }

    #[test]
    fn ancestry_prefixes_exclude_the_term() {
        let ancestry = vec!["experimental factor".to_string(), "cell type".to_string(), "leukocyte".to_string()];
        let facets = ancestry_facets(&ancestry);
        assert_eq!(facets.len(), 2);
        assert_eq!(facets[0], Facet::from_path(["experimental factor"].iter()));
        assert_eq!(facets[1], Facet::from_path(["experimental factor", "cell type"].iter()));
    }

    #[test]
    fn rootless_term_contributes_nothing() {
        let ancestry = vec!["leukocyte".to_string()];
        assert_eq!(ancestry_facets(&ancestry).len(), 0);
    }

    #[test]
    fn blank_segments_dropped() {
        let ancestry = vec!["".to_string(), "  ".to_string()];
        assert_eq!(ancestry_facets(&ancestry).len(), 0);
    }

    #[test]
    fn file_id_terms_are_per_position() {
        let fields = FileFields::build();
        let a = fields.id_term("S-TEST1", 0);
        let b = fields.id_term("S-TEST1", 1);
        assert_eq!(a == b, false);
    }
}
