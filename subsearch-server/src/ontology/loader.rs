//! OWL loading: stream the RDF/XML class graph out of the ontology file,
//! downloading it first when absent. The resolver holds the built model
//! behind a lazily initialized, double-checked reference and swaps it
//! atomically on rebuild; readers in flight keep their own `Arc`.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{info, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use subsearch_types::{Error, Result};

use super::lookup::EfoLookup;
use super::matcher::TermMatcher;
use super::model::{OntologyModel, OntologyModelBuilder};
use crate::settings::Settings;

/// The model plus its derived read-side structures, built together so one
/// swap replaces all three consistently.
#[derive(Debug)]
pub struct OntologyIndex {
    pub model: Arc<OntologyModel>,
    pub matcher: Arc<TermMatcher>,
    pub lookup: Arc<EfoLookup>,
}

pub struct OntologyResolver {
    path: PathBuf,
    ignored: BTreeSet<String>,
    inner: RwLock<Option<Arc<OntologyIndex>>>,
}

impl OntologyResolver {
    pub fn new(path: PathBuf, ignored: BTreeSet<String>) -> Self {
        Self {
            path,
            ignored,
            inner: RwLock::new(None),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            PathBuf::from(&settings.ontology_path),
            settings.ignored_classes.iter().cloned().collect(),
        )
    }

    /// Lazy, double-checked access to the loaded ontology
    pub fn get(&self) -> Result<Arc<OntologyIndex>> {
        if let Some(loaded) = self.inner.read().expect("ontology lock poisoned").as_ref() {
            return Ok(loaded.clone());
        }
        let mut guard = self.inner.write().expect("ontology lock poisoned");
        if let Some(loaded) = guard.as_ref() {
            return Ok(loaded.clone());
        }
        let loaded = Arc::new(self.load()?);
        *guard = Some(loaded.clone());
        Ok(loaded)
    }

    /// Reload from disk and atomically replace the published reference
    pub fn rebuild(&self) -> Result<()> {
        let loaded = Arc::new(self.load()?);
        *self.inner.write().expect("ontology lock poisoned") = Some(loaded);
        Ok(())
    }

    /// Publish a pre-built index without touching the filesystem
    #[cfg(test)]
    pub(crate) fn install_for_tests(&self, index: OntologyIndex) {
        *self.inner.write().expect("ontology lock poisoned") = Some(Arc::new(index));
    }

    fn load(&self) -> Result<OntologyIndex> {
        if !self.path.exists() {
            return Err(Error::InvalidConfig(format!(
                "ontology file {} is missing; download it first (the service does this at startup \
                 when the configured URL is reachable) or place a copy there by hand",
                self.path.display()
            )));
        }
        let file = File::open(&self.path)?;
        let model = parse_owl(BufReader::new(file), &self.ignored)?;
        info!("loaded ontology: {} classes from {}", model.len(), self.path.display());
        let matcher = TermMatcher::from_model(&model);
        let lookup = EfoLookup::from_model(&model);
        Ok(OntologyIndex {
            model: Arc::new(model),
            matcher: Arc::new(matcher),
            lookup: Arc::new(lookup),
        })
    }
}

/// Download the ontology file when it is not already on disk. A partial
/// download never survives: the temp file is removed on any failure.
pub async fn ensure_ontology_file(settings: &Settings) -> Result<()> {
    let path = PathBuf::from(&settings.ontology_path);
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    info!("ontology file missing, downloading {}", settings.ontology_url);
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(settings.ontology_connect_timeout))
        .timeout(Duration::from_secs(settings.ontology_read_timeout))
        .build()?;

    let download = async {
        let response = client.get(&settings.ontology_url).send().await?;
        if !response.status().is_success() {
            return Err(Error::HttpError(format!(
                "ontology download returned {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(&path, &bytes).await?;
        Ok::<(), Error>(())
    };

    if let Err(e) = download.await {
        if path.exists() {
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                warn!("could not remove partial ontology download: {}", rm);
            }
        }
        return Err(Error::InvalidConfig(format!(
            "could not obtain the ontology: {}. Either make {} reachable or place the OWL file at {}",
            e,
            settings.ontology_url,
            path.display()
        )));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct RawClass {
    about: String,
    efo_uri: Option<String>,
    labels: Vec<String>,
    ae_label: Option<String>,
    synonyms: Vec<String>,
    parents: BTreeSet<String>,
    part_of: BTreeSet<String>,
    organizational: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TextTarget {
    Label,
    AeLabel,
    Synonym,
    Organizational,
    EfoUri,
}

/// Streaming extraction of the class graph. Only named classes at the top
/// nesting level contribute; anonymous class expressions are traversed for
/// their restriction targets and otherwise ignored.
pub fn parse_owl<R: BufRead>(reader: R, ignored: &BTreeSet<String>) -> Result<OntologyModel> {
    let mut xml = Reader::from_reader(reader);
    xml.trim_text(true);

    let mut builder = OntologyModelBuilder::default();
    let mut buf = Vec::new();

    let mut class_depth = 0usize;
    let mut current: Option<RawClass> = None;
    let mut text_target: Option<TextTarget> = None;
    let mut in_restriction = false;
    let mut restriction_property: Option<String> = None;
    let mut restriction_target: Option<String> = None;

    loop {
        match xml
            .read_event_into(&mut buf)
            .map_err(|e| Error::ParseError(format!("bad ontology XML: {}", e)))?
        {
            Event::Start(ref e) => {
                let local = local_name(e.name().as_ref());
                match local.as_str() {
                    "Class" => {
                        class_depth += 1;
                        if class_depth == 1 {
                            if let Some(about) = attribute(e, "about") {
                                current = Some(RawClass {
                                    about,
                                    ..RawClass::default()
                                });
                            }
                        }
                    }
                    "subClassOf" if class_depth == 1 && current.is_some() => {
                        if let Some(resource) = attribute(e, "resource") {
                            if let Some(class) = current.as_mut() {
                                class.parents.insert(resource);
                            }
                        } else {
                            in_restriction = true;
                            restriction_property = None;
                            restriction_target = None;
                        }
                    }
                    "onProperty" if in_restriction => {
                        restriction_property = attribute(e, "resource");
                    }
                    "someValuesFrom" if in_restriction => {
                        if let Some(resource) = attribute(e, "resource") {
                            restriction_target = Some(resource);
                        }
                    }
                    "label" if class_depth == 1 && current.is_some() => text_target = Some(TextTarget::Label),
                    "ArrayExpress_label" if class_depth == 1 && current.is_some() => text_target = Some(TextTarget::AeLabel),
                    "hasExactSynonym" if class_depth == 1 && current.is_some() => text_target = Some(TextTarget::Synonym),
                    "organizational_class" if class_depth == 1 && current.is_some() => {
                        text_target = Some(TextTarget::Organizational)
                    }
                    "EFO_URI" | "efo_uri" if class_depth == 1 && current.is_some() => text_target = Some(TextTarget::EfoUri),
                    _ => {}
                }
            }
            Event::Empty(ref e) => {
                let local = local_name(e.name().as_ref());
                match local.as_str() {
                    "subClassOf" if class_depth == 1 && current.is_some() => {
                        if let Some(resource) = attribute(e, "resource") {
                            if let Some(class) = current.as_mut() {
                                class.parents.insert(resource);
                            }
                        }
                    }
                    "onProperty" if in_restriction => {
                        restriction_property = attribute(e, "resource");
                    }
                    "someValuesFrom" if in_restriction => {
                        if let Some(resource) = attribute(e, "resource") {
                            restriction_target = Some(resource);
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if let (Some(target), Some(class)) = (text_target, current.as_mut()) {
                    let text = e
                        .unescape()
                        .map_err(|err| Error::ParseError(format!("bad ontology XML text: {}", err)))?
                        .trim()
                        .to_string();
                    if !text.is_empty() {
                        match target {
                            TextTarget::Label => class.labels.push(text),
                            TextTarget::AeLabel => class.ae_label = Some(text),
                            TextTarget::Synonym => class.synonyms.push(text),
                            TextTarget::Organizational => class.organizational = text.eq_ignore_ascii_case("true"),
                            TextTarget::EfoUri => class.efo_uri = Some(text),
                        }
                    }
                }
            }
            Event::End(ref e) => {
                let local = local_name(e.name().as_ref());
                match local.as_str() {
                    "Class" => {
                        if class_depth == 1 {
                            if let Some(class) = current.take() {
                                commit_class(&mut builder, class);
                            }
                        }
                        class_depth = class_depth.saturating_sub(1);
                    }
                    "subClassOf" if in_restriction => {
                        if let (Some(property), Some(target)) = (restriction_property.take(), restriction_target.take()) {
                            if is_part_of_property(&property) {
                                if let Some(class) = current.as_mut() {
                                    class.part_of.insert(target);
                                }
                            }
                        }
                        in_restriction = false;
                    }
                    "label" | "ArrayExpress_label" | "hasExactSynonym" | "organizational_class" | "EFO_URI" | "efo_uri" => {
                        text_target = None;
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(builder.build(ignored))
}

fn commit_class(builder: &mut OntologyModelBuilder, class: RawClass) {
    let mut labels = class.labels.into_iter();
    let first_label = match labels.next() {
        Some(l) => l,
        None => return, // unlabeled classes carry no searchable term
    };
    let mut alt_terms: BTreeSet<String> = labels.collect();
    alt_terms.extend(class.synonyms);

    // ArrayExpress label replaces the primary and demotes it to an alt
    let term = match class.ae_label {
        Some(ae) => {
            alt_terms.insert(first_label);
            ae
        }
        None => first_label,
    };
    alt_terms.remove(&term);

    let id = class.efo_uri.unwrap_or(class.about);
    builder.add_class(id, term, alt_terms, class.parents, class.part_of, class.organizational);
}

fn is_part_of_property(property: &str) -> bool {
    property.ends_with("BFO_0000050") || property.to_lowercase().ends_with("part_of")
}

fn local_name(qname: &[u8]) -> String {
    let name = match qname.iter().rposition(|&b| b == b':') {
        Some(idx) => &qname[idx + 1..],
        None => qname,
    };
    String::from_utf8_lossy(name).into_owned()
}

fn attribute(e: &BytesStart<'_>, local: &str) -> Option<String> {
    for attr in e.attributes().flatten() {
        if local_name(attr.key.as_ref()) == local {
            if let Ok(value) = attr.unescape_value() {
                return Some(value.into_owned());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:rdfs="http://www.w3.org/2000/01/rdf-schema#"
         xmlns:owl="http://www.w3.org/2002/07/owl#"
         xmlns:oboInOwl="http://www.geneontology.org/formats/oboInOwl#"
         xmlns:efo="http://www.ebi.ac.uk/efo/">
  <owl:Class rdf:about="http://www.ebi.ac.uk/efo/EFO_0000001">
    <rdfs:label>experimental factor</rdfs:label>
  </owl:Class>
  <owl:Class rdf:about="http://purl.obolibrary.org/obo/CL_0000000">
    <rdfs:label>cell</rdfs:label>
    <rdfs:subClassOf rdf:resource="http://www.ebi.ac.uk/efo/EFO_0000001"/>
  </owl:Class>
  <owl:Class rdf:about="http://purl.obolibrary.org/obo/CL_0000738">
    <rdfs:label>leucocyte</rdfs:label>
    <efo:ArrayExpress_label>leukocyte</efo:ArrayExpress_label>
    <oboInOwl:hasExactSynonym>white blood cell</oboInOwl:hasExactSynonym>
    <rdfs:subClassOf rdf:resource="http://purl.obolibrary.org/obo/CL_0000000"/>
  </owl:Class>
  <owl:Class rdf:about="http://purl.obolibrary.org/obo/GO_0005634">
    <rdfs:label>nucleus</rdfs:label>
    <rdfs:subClassOf>
      <owl:Restriction>
        <owl:onProperty rdf:resource="http://purl.obolibrary.org/obo/BFO_0000050"/>
        <owl:someValuesFrom rdf:resource="http://purl.obolibrary.org/obo/CL_0000000"/>
      </owl:Restriction>
    </rdfs:subClassOf>
  </owl:Class>
  <owl:Class rdf:about="http://www.ebi.ac.uk/efo/EFO_0009999">
    <rdfs:label>utility bucket</rdfs:label>
    <efo:organizational_class>true</efo:organizational_class>
    <rdfs:subClassOf rdf:resource="http://www.ebi.ac.uk/efo/EFO_0000001"/>
  </owl:Class>
</rdf:RDF>"#;

    fn parse() -> OntologyModel {
        parse_owl(std::io::Cursor::new(SAMPLE), &BTreeSet::new()).unwrap()
    }

    #[test]
    fn test_classes_parsed() {
        let model = parse();
        assert_eq!(model.len(), 5);
        assert_eq!(model.term_for("http://purl.obolibrary.org/obo/CL_0000000"), Some("cell"));
    }

    #[test]
    fn test_arrayexpress_label_wins() {
        let model = parse();
        let node = model.node("http://purl.obolibrary.org/obo/CL_0000738").unwrap();
        assert_eq!(node.term, "leukocyte");
        assert_eq!(node.alt_terms.contains("leucocyte"), true);
        assert_eq!(node.alt_terms.contains("white blood cell"), true);
    }

    #[test]
    fn test_subclass_linking() {
        let model = parse();
        assert_eq!(model.ancestors_of("leukocyte"), vec!["experimental factor".to_string(), "cell".to_string()]);
    }

    #[test]
    fn test_part_of_restriction() {
        let model = parse();
        let selector = super::super::model::TermSelector {
            part_of: true,
            ..Default::default()
        };
        let members = model.terms_for("http://purl.obolibrary.org/obo/CL_0000000", selector);
        assert_eq!(members.contains("nucleus"), true);
    }

    #[test]
    fn test_organizational_flag() {
        let model = parse();
        let node = model.node("http://www.ebi.ac.uk/efo/EFO_0009999").unwrap();
        assert_eq!(node.organizational, true);
    }

    #[test]
    fn test_ignored_classes() {
        let mut ignored = BTreeSet::new();
        ignored.insert("http://www.ebi.ac.uk/efo/EFO_0009999".to_string());
        let model = parse_owl(std::io::Cursor::new(SAMPLE), &ignored).unwrap();
        assert_eq!(model.len(), 4);
    }

    #[test]
    fn test_missing_file_error_is_actionable() {
        let resolver = OntologyResolver::new(PathBuf::from("/nonexistent/efo.owl"), BTreeSet::new());
        let err = resolver.get().unwrap_err();
        assert_eq!(err.to_string().contains("/nonexistent/efo.owl"), true);
    }
}
