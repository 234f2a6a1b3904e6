//! Assembles the submission document from the parsed value map, the file
//! context, and the ontology scan. Field routing follows the descriptor's
//! field type; facet values are materialized as tantivy facet paths with
//! every ancestry prefix written explicitly.

use std::collections::{BTreeSet, HashSet};

use log::warn;
use tantivy::schema::Facet;
use tantivy::Document;

use subsearch_types::{Error, FieldDescriptor, FieldType, Result};

use crate::documents::context::{FileIndexingContext, ValueMap};
use crate::documents::file_doc::{NAME_COLUMN, SIZE_COLUMN};
use crate::documents::Submission;
use crate::ontology::OntologyIndex;
use crate::registry::PropertyRegistry;
use crate::schema::{ancestry_facets, reserved, sort_field_name, SubmissionSchema};

/// Sentinel facet value substituted for blank plain facets without a default
pub const NA_FACET_VALUE: &str = "NA";

pub struct SubmissionDocumentBuilder<'a> {
    schema: &'a SubmissionSchema,
    registry: &'a PropertyRegistry,
    ontology: &'a OntologyIndex,
}

impl<'a> SubmissionDocumentBuilder<'a> {
    pub fn new(schema: &'a SubmissionSchema, registry: &'a PropertyRegistry, ontology: &'a OntologyIndex) -> Self {
        Self {
            schema,
            registry,
            ontology,
        }
    }

    pub fn build(&self, submission: &Submission, value_map: &mut ValueMap, ctx: &FileIndexingContext) -> Result<Document> {
        let collection = value_map
            .get(reserved::COLLECTION_FACET)
            .map(|v| v.split('|').next().unwrap_or("").trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::InvalidConfig("value map does not carry the collection facet".into()))?;

        let mut doc = Document::default();
        doc.add_text(self.schema.accession, &submission.accession);

        self.add_file_context_fields(&mut doc, value_map, ctx);

        let mut routed: HashSet<&str> = HashSet::new();
        let public = self.registry.public_properties();
        let specific = self.registry.collection_properties(&collection);
        for descriptor in public.iter().chain(specific.iter()) {
            if !routed.insert(descriptor.name.as_str()) {
                continue;
            }
            self.route_descriptor(&mut doc, descriptor, value_map.get(&descriptor.name).cloned())?;
        }

        self.add_ontology_facets(&mut doc, value_map);
        Ok(doc)
    }

    fn add_file_context_fields(&self, doc: &mut Document, value_map: &mut ValueMap, ctx: &FileIndexingContext) {
        // a pipe follows every column name
        let mut names = format!("{}|{}|", NAME_COLUMN, SIZE_COLUMN);
        for column in ctx.file_columns() {
            names.push_str(&column);
            names.push('|');
        }
        doc.add_text(self.schema.file_attribute_names, &names);
        value_map.insert(reserved::FILE_ATTRIBUTE_NAMES.into(), names);

        let file_count = ctx.file_count() as i64;
        doc.add_i64(self.schema.files, file_count);
        value_map.insert(reserved::FILES.into(), file_count.to_string());

        let metadata = ctx.searchable_metadata().into_iter().collect::<Vec<String>>().join(" ");
        if !metadata.is_empty() {
            doc.add_text(self.schema.file_att_key_value, &metadata);
            value_map.insert(reserved::FILE_ATT_KEY_VALUE.into(), metadata);
        }

        let sections = ctx.sections_with_files().into_iter().collect::<Vec<String>>().join(" ");
        if !sections.is_empty() {
            doc.add_text(self.schema.sections_with_files, &sections);
            value_map.insert(reserved::SECTIONS_WITH_FILES.into(), sections);
        }

        if ctx.has_indexing_error() {
            doc.add_text(self.schema.has_file_parsing_error, "true");
            value_map.insert(reserved::HAS_FILE_PARSING_ERROR.into(), "true".into());
        }
    }

    fn route_descriptor(&self, doc: &mut Document, descriptor: &FieldDescriptor, value: Option<String>) -> Result<()> {
        let field = self.schema.field(&descriptor.name)?;
        match descriptor.field_type {
            FieldType::TokenizedText => {
                // tokenized fields are always indexed; a missing value is
                // the literal `null` so field-presence queries stay uniform
                let text = value.unwrap_or_else(|| "null".to_string());
                doc.add_text(field, &text);
            }
            FieldType::UntokenizedString => {
                if let Some(text) = value.filter(|v| !v.is_empty()) {
                    doc.add_text(field, &text);
                    if descriptor.sortable {
                        let sort_field = self.schema.field(&sort_field_name(&descriptor.name))?;
                        doc.add_text(sort_field, &text.to_lowercase());
                    }
                }
            }
            FieldType::Long => {
                let text = match value {
                    Some(v) if !v.trim().is_empty() && v != "null" => v,
                    _ => return Ok(()),
                };
                match text.trim().parse::<i64>() {
                    Ok(number) => doc.add_i64(field, number),
                    Err(e) => warn!("skipping unparsable long '{}' for {}: {}", text, descriptor.name, e),
                }
            }
            FieldType::Facet => {
                let raw = match value {
                    Some(v) if !v.trim().is_empty() && v != "null" => v,
                    _ => {
                        if descriptor.skips_blank_facet() {
                            return Ok(());
                        }
                        descriptor.default_value.clone().unwrap_or_else(|| NA_FACET_VALUE.to_string())
                    }
                };
                for part in raw.split('|') {
                    let mut part = part.trim().to_string();
                    if descriptor.to_lowercase {
                        part = part.to_lowercase();
                    }
                    if part.is_empty() {
                        continue;
                    }
                    doc.add_facet(field, Facet::from_path([part.as_str()].iter()));
                }
            }
        }
        Ok(())
    }

    /// Scan the content field for ontology terms and write the ancestry
    /// prefixes of every hit, deduplicated across terms. The matched term
    /// itself is not written; a term with no ancestors contributes
    /// nothing.
    fn add_ontology_facets(&self, doc: &mut Document, value_map: &ValueMap) {
        let content = match value_map.get(reserved::CONTENT) {
            Some(c) => c,
            None => return,
        };
        let mut facets: BTreeSet<Facet> = BTreeSet::new();
        for term in self.ontology.matcher.find_terms(content) {
            let mut ancestry = self.ontology.model.ancestors_of(&term);
            ancestry.push(term);
            facets.extend(ancestry_facets(&ancestry));
        }
        for facet in facets {
            doc.add_facet(self.schema.efo, facet);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tantivy::schema::Value;

    use super::*;
    use crate::ontology::loader::OntologyIndex;
    use crate::ontology::lookup::EfoLookup;
    use crate::ontology::matcher::TermMatcher;
    use crate::ontology::model::tests::tiny_model;
    use crate::registry::tests::tiny_registry;
    use std::sync::Arc;

    fn ontology() -> OntologyIndex {
        let model = tiny_model();
        let matcher = TermMatcher::from_model(&model);
        let lookup = EfoLookup::from_model(&model);
        OntologyIndex {
            model: Arc::new(model),
            matcher: Arc::new(matcher),
            lookup: Arc::new(lookup),
        }
    }

    fn submission() -> Submission {
        Submission::from_value(json!({ "accNo": "S-TEST1" })).unwrap()
    }

    fn facet_values(doc: &Document, field: tantivy::schema::Field) -> Vec<String> {
        doc.get_all(field)
            .into_iter()
            .filter_map(|v| match v {
                Value::Facet(f) => Some(f.to_path_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_missing_collection_is_a_caller_error() {
        let registry = tiny_registry();
        let schema = SubmissionSchema::for_registry(&registry).unwrap();
        let ontology = ontology();
        let builder = SubmissionDocumentBuilder::new(&schema, &registry, &ontology);
        let mut values = ValueMap::new();
        let ctx = FileIndexingContext::new();
        assert_eq!(builder.build(&submission(), &mut values, &ctx).is_err(), true);
    }

    #[test]
    fn test_file_attribute_names_prefix() {
        let registry = tiny_registry();
        let schema = SubmissionSchema::for_registry(&registry).unwrap();
        let ontology = ontology();
        let builder = SubmissionDocumentBuilder::new(&schema, &registry, &ontology);
        let mut values = ValueMap::new();
        values.insert(reserved::COLLECTION_FACET.into(), "BioImages".into());
        let ctx = FileIndexingContext::new();
        builder.build(&submission(), &mut values, &ctx).unwrap();
        assert_eq!(values.get(reserved::FILE_ATTRIBUTE_NAMES), Some(&"Name|Size|".to_string()));
    }

    #[test]
    fn test_file_attribute_names_pipe_after_every_column() {
        let registry = tiny_registry();
        let schema = SubmissionSchema::for_registry(&registry).unwrap();
        let ontology = ontology();
        let builder = SubmissionDocumentBuilder::new(&schema, &registry, &ontology);
        let mut values = ValueMap::new();
        values.insert(reserved::COLLECTION_FACET.into(), "BioImages".into());
        let ctx = FileIndexingContext::new();
        ctx.add_file_column("Compound");
        ctx.add_file_column("Section");
        builder.build(&submission(), &mut values, &ctx).unwrap();
        assert_eq!(
            values.get(reserved::FILE_ATTRIBUTE_NAMES),
            Some(&"Name|Size|Compound|Section|".to_string())
        );
    }

    #[test]
    fn test_tokenized_null_literal() {
        let registry = tiny_registry();
        let schema = SubmissionSchema::for_registry(&registry).unwrap();
        let ontology = ontology();
        let builder = SubmissionDocumentBuilder::new(&schema, &registry, &ontology);
        let mut values = ValueMap::new();
        values.insert(reserved::COLLECTION_FACET.into(), "BioImages".into());
        let ctx = FileIndexingContext::new();
        let doc = builder.build(&submission(), &mut values, &ctx).unwrap();

        let title = schema.field("title").unwrap();
        let stored: Vec<&str> = doc
            .get_all(title)
            .into_iter()
            .filter_map(|v| match v {
                Value::Str(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(stored, vec!["null"]);
    }

    #[test]
    fn test_bad_long_is_skipped_not_fatal() {
        let registry = tiny_registry();
        let schema = SubmissionSchema::for_registry(&registry).unwrap();
        let ontology = ontology();
        let builder = SubmissionDocumentBuilder::new(&schema, &registry, &ontology);
        let mut values = ValueMap::new();
        values.insert(reserved::COLLECTION_FACET.into(), "BioImages".into());
        values.insert("release_time".into(), "not-a-number".into());
        let ctx = FileIndexingContext::new();
        let doc = builder.build(&submission(), &mut values, &ctx).unwrap();
        let release = schema.field("release_time").unwrap();
        assert_eq!(doc.get_first(release).is_none(), true);
    }

    #[test]
    fn test_ancestry_facets_with_all_prefixes() {
        let registry = tiny_registry();
        let schema = SubmissionSchema::for_registry(&registry).unwrap();
        let ontology = ontology();
        let builder = SubmissionDocumentBuilder::new(&schema, &registry, &ontology);
        let mut values = ValueMap::new();
        values.insert(reserved::COLLECTION_FACET.into(), "BioImages".into());
        values.insert(reserved::CONTENT.into(), "study of myeloid leukocyte counts".into());
        let ctx = FileIndexingContext::new();
        let doc = builder.build(&submission(), &mut values, &ctx).unwrap();

        let paths = facet_values(&doc, schema.efo);
        assert_eq!(paths.contains(&"/experimental factor".to_string()), true);
        assert_eq!(paths.contains(&"/experimental factor/cell type".to_string()), true);
        assert_eq!(paths.contains(&"/experimental factor/cell type/leukocyte".to_string()), true);
        // the matched term itself is never written, bare or as a path tail
        assert_eq!(
            paths.contains(&"/experimental factor/cell type/leukocyte/myeloid leukocyte".to_string()),
            false
        );
        assert_eq!(paths.contains(&"/myeloid leukocyte".to_string()), false);
    }

    #[test]
    fn test_error_flag_written() {
        let registry = tiny_registry();
        let schema = SubmissionSchema::for_registry(&registry).unwrap();
        let ontology = ontology();
        let builder = SubmissionDocumentBuilder::new(&schema, &registry, &ontology);
        let mut values = ValueMap::new();
        values.insert(reserved::COLLECTION_FACET.into(), "BioImages".into());
        let ctx = FileIndexingContext::new();
        ctx.mark_indexing_error();
        builder.build(&submission(), &mut values, &ctx).unwrap();
        assert_eq!(values.get(reserved::HAS_FILE_PARSING_ERROR), Some(&"true".to_string()));
    }

    #[test]
    fn test_collection_facet_written() {
        let registry = tiny_registry();
        let schema = SubmissionSchema::for_registry(&registry).unwrap();
        let ontology = ontology();
        let builder = SubmissionDocumentBuilder::new(&schema, &registry, &ontology);
        let mut values = ValueMap::new();
        values.insert(reserved::COLLECTION_FACET.into(), "BioImages|JCB".into());
        let ctx = FileIndexingContext::new();
        let doc = builder.build(&submission(), &mut values, &ctx).unwrap();
        let collection = schema.field(reserved::COLLECTION_FACET).unwrap();
        let paths = facet_values(&doc, collection);
        // the registry's collection facet lowercases its values
        assert_eq!(paths.contains(&"/bioimages".to_string()), true);
        assert_eq!(paths.contains(&"/jcb".to_string()), true);
    }
}
