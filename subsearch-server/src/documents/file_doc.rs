//! Builds one file-index document per manifest entry. Fixed contract
//! fields are schema fields; dynamic attributes become exact
//! `name:value` terms on `attr` plus a stored JSON companion.

use std::collections::{BTreeMap, HashSet};

use tantivy::Document;

use subsearch_types::FileEntry;

use crate::documents::FileIndexingContext;
use crate::schema::FileFields;

/// The manifest's owning section, as discovered by the file-list walk
#[derive(Debug, Clone, Default)]
pub struct SectionRef {
    pub acc_no: Option<String>,
    pub section_type: Option<String>,
}

impl SectionRef {
    /// Section accessions are normalized by stripping slashes and whitespace
    fn normalized_acc_no(&self) -> Option<String> {
        let normalized: String = self
            .acc_no
            .as_deref()?
            .chars()
            .filter(|c| *c != '/' && !c.is_whitespace())
            .collect();
        if normalized.is_empty() {
            None
        } else {
            Some(normalized)
        }
    }

    /// A section is only recorded when the parent carries an accession and
    /// is not the study root itself.
    fn indexable_acc_no(&self) -> Option<String> {
        if self.section_type.as_deref().map(|t| t.eq_ignore_ascii_case("study")).unwrap_or(false) {
            return None;
        }
        self.normalized_acc_no()
    }
}

/// Column names reported for the two columns every file table has
pub const NAME_COLUMN: &str = "Name";
pub const SIZE_COLUMN: &str = "Size";
/// Column reported when any file carries a section
pub const SECTION_COLUMN: &str = "Section";

pub struct FileDocumentFactory<'a> {
    fields: &'a FileFields,
    accession: &'a str,
}

impl<'a> FileDocumentFactory<'a> {
    pub fn new(fields: &'a FileFields, accession: &'a str) -> Self {
        Self { fields, accession }
    }

    pub fn build(
        &self,
        entry: &FileEntry,
        position: u64,
        section: Option<&SectionRef>,
        ctx: &FileIndexingContext,
    ) -> Document {
        let fields = self.fields;
        let mut doc = Document::default();
        let mut written: HashSet<String> = ["position", "size", "type", "is_directory", "owner"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        doc.add_text(fields.id, &format!("{}-{}", self.accession, position));
        doc.add_u64(fields.position, position);
        doc.add_u64(fields.size, entry.size_bytes());
        doc.add_text(fields.entry_type, "file");
        doc.add_text(fields.is_directory, if entry.is_directory() { "true" } else { "false" });
        doc.add_text(fields.owner, self.accession);

        if let Some(path) = entry.path() {
            doc.add_text(fields.path, path);
            doc.add_text(fields.path_sort, &path.to_lowercase());
            written.insert("path".into());
        }
        if let Some(name) = entry.name() {
            doc.add_text(fields.name, name);
            doc.add_text(fields.name_lc, &name.to_lowercase());
            doc.add_text(fields.name_sort, &name.to_lowercase());
            written.insert("name".into());
        }

        if let Some(acc_no) = section.and_then(SectionRef::indexable_acc_no) {
            doc.add_text(fields.section, &acc_no);
            doc.add_text(fields.section_lc, &acc_no.to_lowercase());
            doc.add_text(fields.section_sort, &acc_no.to_lowercase());
            written.insert("section".into());
            ctx.add_file_column(SECTION_COLUMN);
        }

        let mut attr_map: BTreeMap<String, String> = BTreeMap::new();
        let owner_is_epmc = self.accession.to_lowercase().contains("epmc");
        for attribute in &entry.attributes {
            let name = match attribute.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                Some(n) => n,
                None => continue,
            };
            let value = match attribute.value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                Some(v) => v,
                None => continue,
            };
            let name_lc = name.to_lowercase();
            if written.contains(&name_lc) {
                continue;
            }
            // EuropePMC submissions carry a `type` attribute that collides
            // with the document type marker
            if name_lc == "type" && owner_is_epmc {
                continue;
            }
            written.insert(name_lc.clone());
            doc.add_text(fields.attr, &format!("{}:{}", name_lc, value.to_lowercase()));
            attr_map.insert(name.to_string(), value.to_string());

            ctx.add_file_column(name);
            ctx.add_searchable_metadata(name);
            ctx.add_searchable_metadata(value);
        }
        if !attr_map.is_empty() {
            if let Ok(json) = serde_json::to_string(&attr_map) {
                doc.add_text(fields.attr_json, &json);
            }
        }

        doc
    }
}
