//! The parser set (C2). Each registry descriptor names one parser; the
//! submission-document builder routes a descriptor here and never inspects
//! the JSON itself. Parsers extract a raw value, then shared post-processing
//! applies the regex extractor, boolean-facet collapsing and facet
//! normalization.

use std::collections::HashMap;

use log::debug;
use regex::Regex;
use serde_json::Value;

use subsearch_types::{Error, FieldDescriptor, FieldType, ParserKind, Result};

use crate::documents::Submission;
use crate::json_path::JsonPathService;
use crate::schema::reserved;

pub mod date;

use date::{epoch_millis, year_of};

/// Everything a parse call may consult
pub struct ParseContext<'a> {
    pub submission: &'a Submission,
    pub json_paths: &'a JsonPathService,
    pub view_counts: &'a HashMap<String, u64>,
}

/// Tagged parser variants; a descriptor's [`ParserKind`] selects one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parser {
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

impl From<ParserKind> for Parser {
    fn from(kind: ParserKind) -> Self {
        match kind {
            ParserKind::SimpleAttribute => Parser::SimpleAttribute,
            ParserKind::JsonPathList => Parser::JsonPathList,
            ParserKind::Date => Parser::Date,
            ParserKind::Year => Parser::Year,
            ParserKind::ReleaseDate => Parser::ReleaseDate,
            ParserKind::ReleaseYear => Parser::ReleaseYear,
            ParserKind::ModificationYear => Parser::ModificationYear,
            ParserKind::CreationYear => Parser::CreationYear,
            ParserKind::Content => Parser::Content,
            ParserKind::Type => Parser::Type,
            ParserKind::Access => Parser::Access,
            ParserKind::ViewCount => Parser::ViewCount,
            ParserKind::NodeCounting => Parser::NodeCounting,
            ParserKind::FileType => Parser::FileType,
        }
    }
}

impl Parser {
    pub fn parse(&self, ctx: &ParseContext<'_>, descriptor: &FieldDescriptor) -> Result<Option<String>> {
        let raw = self.extract(ctx, descriptor)?;
        post_process(raw, descriptor)
    }

    fn extract(&self, ctx: &ParseContext<'_>, descriptor: &FieldDescriptor) -> Result<Option<String>> {
        let submission = ctx.submission;
        match self {
            Parser::SimpleAttribute => {
                for path in &descriptor.json_paths {
                    for hit in ctx.json_paths.eval(path, &submission.raw)? {
                        if let Some(text) = scalar_string(hit) {
                            if !text.trim().is_empty() {
                                return Ok(Some(text));
                            }
                        }
                    }
                }
                Ok(None)
            }
            Parser::JsonPathList => {
                let mut hits = Vec::new();
                for path in &descriptor.json_paths {
                    for hit in ctx.json_paths.eval(path, &submission.raw)? {
                        if let Some(text) = scalar_string(hit) {
                            hits.push(text);
                        }
                    }
                }
                join_hits(hits, descriptor)
            }
            Parser::Date => {
                let millis = self.first_date(ctx, descriptor)?;
                Ok(Some(millis.unwrap_or(-1).to_string()))
            }
            Parser::Year => {
                let millis = self.first_date(ctx, descriptor)?;
                Ok(millis.and_then(year_of).map(|y| y.to_string()))
            }
            Parser::ReleaseDate => Ok(submission.resolved_release_time().map(|t| t.to_string())),
            Parser::ReleaseYear => Ok(submission.resolved_release_time().and_then(year_of).map(|y| y.to_string())),
            Parser::ModificationYear => Ok(submission.modification_time.and_then(year_of).map(|y| y.to_string())),
            Parser::CreationYear => Ok(submission.creation_time.and_then(year_of).map(|y| y.to_string())),
            Parser::Content => {
                let mut out = Vec::new();
                collect_content(&submission.raw, &mut out);
                if out.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(out.join(" ")))
                }
            }
            Parser::Type => {
                let type_value = submission
                    .raw
                    .get("type")
                    .and_then(Value::as_str)
                    .or_else(|| submission.raw.get("section").and_then(|s| s.get("type")).and_then(Value::as_str));
                Ok(type_value.map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()))
            }
            Parser::Access => {
                let mut grants = Vec::new();
                if let Some(owner) = &submission.owner {
                    if !owner.trim().is_empty() {
                        grants.push(owner.trim().to_lowercase());
                    }
                }
                if submission.released {
                    grants.push("public".to_string());
                }
                if grants.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(grants.join("|")))
                }
            }
            Parser::ViewCount => Ok(ctx.view_counts.get(&submission.accession).map(|c| c.to_string())),
            Parser::NodeCounting => {
                let mut total = 0usize;
                for path in &descriptor.json_paths {
                    total += ctx.json_paths.eval(path, &submission.raw)?.len();
                }
                Ok(Some(total.to_string()))
            }
            Parser::FileType => {
                let mut extensions = Vec::new();
                collect_file_extensions(&submission.raw, &mut extensions);
                Ok(normalize_facet_values(extensions, false))
            }
        }
    }

    fn first_date(&self, ctx: &ParseContext<'_>, descriptor: &FieldDescriptor) -> Result<Option<i64>> {
        for path in &descriptor.json_paths {
            let hits = ctx.json_paths.eval(path, &ctx.submission.raw)?;
            if let Some(first) = hits.first() {
                return epoch_millis(Some(first));
            }
        }
        Ok(None)
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn join_hits(hits: Vec<String>, descriptor: &FieldDescriptor) -> Result<Option<String>> {
    if hits.is_empty() {
        return Ok(None);
    }
    let hits: Vec<String> = if descriptor.to_lowercase {
        hits.into_iter().map(|h| h.to_lowercase()).collect()
    } else {
        hits
    };
    match descriptor.field_type {
        FieldType::Long => {
            let mut total: i64 = 0;
            for hit in &hits {
                total += hit
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| Error::ParseError(format!("bad numeric value '{}': {}", hit, e)))?;
            }
            Ok(Some(total.to_string()))
        }
        FieldType::Facet => Ok(normalize_facet_values(hits, descriptor.name == reserved::COLLECTION_FACET)),
        _ => Ok(Some(hits.join(" "))),
    }
}

/// Pipe-join a facet value list: trim, drop blanks, deduplicate
/// case-insensitively keeping the first spelling, and strip the reserved
/// `public` token when normalizing the collection facet.
pub fn normalize_facet_values(values: Vec<String>, is_collection: bool) -> Option<String> {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        if is_collection && trimmed.eq_ignore_ascii_case("public") {
            continue;
        }
        let lowered = trimmed.to_lowercase();
        if seen.contains(&lowered) {
            continue;
        }
        seen.push(lowered);
        out.push(trimmed.to_string());
    }
    if out.is_empty() {
        None
    } else {
        Some(out.join("|"))
    }
}

/// Extensions of files declared inline on sections, lowercased. Manifest
/// files are counted by the file-list indexer instead.
fn collect_file_extensions(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::Array(files)) = map.get("files") {
                for file in files {
                    let name = file
                        .get("path")
                        .or_else(|| file.get("fileName"))
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    if let Some(dot) = name.rfind('.') {
                        let extension = &name[dot + 1..];
                        if !extension.is_empty() && !extension.contains('/') {
                            out.push(extension.to_lowercase());
                        }
                    }
                }
            }
            for (key, child) in map {
                if key != "files" {
                    collect_file_extensions(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_file_extensions(item, out);
            }
        }
        _ => {}
    }
}

fn collect_content(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::Array(attributes)) = map.get("attributes") {
                for attribute in attributes {
                    for key in &["name", "value"] {
                        if let Some(text) = attribute.get(*key).and_then(Value::as_str) {
                            if !text.trim().is_empty() {
                                out.push(text.trim().to_string());
                            }
                        }
                    }
                }
            }
            for (key, child) in map {
                if key != "attributes" {
                    collect_content(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_content(item, out);
            }
        }
        _ => {}
    }
}

fn post_process(raw: Option<String>, descriptor: &FieldDescriptor) -> Result<Option<String>> {
    let extracted = match &descriptor.match_pattern {
        Some(pattern) if raw.is_some() => {
            let compiled = Regex::new(pattern)
                .map_err(|e| Error::InvalidConfig(format!("bad match pattern on '{}': {}", descriptor.name, e)))?;
            let input = raw.unwrap();
            let captures: Vec<String> = compiled
                .captures_iter(&input)
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .collect();
            if captures.is_empty() {
                debug!("match pattern on '{}' produced no captures", descriptor.name);
                None
            } else {
                Some(captures.join("|"))
            }
        }
        _ => raw,
    };

    if descriptor.is_boolean_facet() {
        let truthy = extracted.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false);
        // false boolean facets are omitted entirely so truthy drill-downs stay cheap
        return Ok(if truthy { Some("true".to_string()) } else { None });
    }
    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use subsearch_types::{FacetKind, ParserKind};

    use super::*;

    fn descriptor(name: &str, field_type: FieldType, parser: ParserKind) -> FieldDescriptor {
        FieldDescriptor {
            name: name.into(),
            field_type,
            parser,
            sortable: false,
            to_lowercase: false,
            private: false,
            match_pattern: None,
            default_value: None,
            facet_kind: None,
            json_paths: Vec::new(),
            expandable: false,
        }
    }

    fn submission() -> Submission {
        Submission::from_value(json!({
            "accNo": "S-TEST1",
            "owner": "Ada@Example.org",
            "released": true,
            "releaseTime": { "$date": "2020-01-31T10:00:00Z" },
            "modificationTime": 1580464800001i64,
            "attributes": [
                { "name": "Title", "value": "Leukocyte imaging" },
                { "name": "AttachTo", "value": "BioImages" },
                { "name": "AttachTo", "value": "bioimages" },
                { "name": "AttachTo", "value": "Public" }
            ],
            "section": { "type": "Study" }
        }))
        .unwrap()
    }

    fn ctx<'a>(sub: &'a Submission, paths: &'a JsonPathService, views: &'a HashMap<String, u64>) -> ParseContext<'a> {
        ParseContext {
            submission: sub,
            json_paths: paths,
            view_counts: views,
        }
    }

    #[test]
    fn simple_attribute_first_hit() {
        let sub = submission();
        let paths = JsonPathService::new();
        let views = HashMap::new();
        let mut d = descriptor("title", FieldType::TokenizedText, ParserKind::SimpleAttribute);
        d.json_paths = vec!["attributes[?name='Title'].value".into()];
        let value = Parser::SimpleAttribute.parse(&ctx(&sub, &paths, &views), &d).unwrap();
        assert_eq!(value, Some("Leukocyte imaging".to_string()));
    }

    #[test]
    fn collection_facet_normalization() {
        let sub = submission();
        let paths = JsonPathService::new();
        let views = HashMap::new();
        let mut d = descriptor(reserved::COLLECTION_FACET, FieldType::Facet, ParserKind::JsonPathList);
        d.facet_kind = Some(FacetKind::Plain);
        d.json_paths = vec!["attributes[?name='AttachTo'].value".into()];
        let value = Parser::JsonPathList.parse(&ctx(&sub, &paths, &views), &d).unwrap();
        // duplicates collapse case-insensitively and `Public` is stripped
        assert_eq!(value, Some("BioImages".to_string()));
    }

    #[test]
    fn boolean_facet_omits_false() {
        let sub = submission();
        let paths = JsonPathService::new();
        let views = HashMap::new();
        let mut d = descriptor("has_clinical_data", FieldType::Facet, ParserKind::JsonPathList);
        d.facet_kind = Some(FacetKind::Boolean);
        d.json_paths = vec!["attributes[?name='ClinicalData'].value".into()];
        let value = Parser::JsonPathList.parse(&ctx(&sub, &paths, &views), &d).unwrap();
        assert_eq!(value, None);

        d.json_paths = vec!["attributes[?name='Title'].value".into()];
        let value = Parser::JsonPathList.parse(&ctx(&sub, &paths, &views), &d).unwrap();
        assert_eq!(value, Some("true".to_string()));
    }

    #[test]
    fn regex_extractor_joins_captures() {
        let sub = submission();
        let paths = JsonPathService::new();
        let views = HashMap::new();
        let mut d = descriptor("title_words", FieldType::TokenizedText, ParserKind::SimpleAttribute);
        d.json_paths = vec!["attributes[?name='Title'].value".into()];
        d.match_pattern = Some(r"(\w+)".into());
        let value = Parser::SimpleAttribute.parse(&ctx(&sub, &paths, &views), &d).unwrap();
        assert_eq!(value, Some("Leukocyte|imaging".to_string()));
    }

    #[test]
    fn date_parser_defaults_to_minus_one() {
        let sub = submission();
        let paths = JsonPathService::new();
        let views = HashMap::new();
        let mut d = descriptor("some_date", FieldType::Long, ParserKind::Date);
        d.json_paths = vec!["attributes[?name='NoSuchDate'].value".into()];
        let value = Parser::Date.parse(&ctx(&sub, &paths, &views), &d).unwrap();
        assert_eq!(value, Some("-1".to_string()));
    }

    #[test]
    fn release_date_and_year() {
        let sub = submission();
        let paths = JsonPathService::new();
        let views = HashMap::new();
        let d = descriptor("release_time", FieldType::Long, ParserKind::ReleaseDate);
        let millis = Parser::ReleaseDate.parse(&ctx(&sub, &paths, &views), &d).unwrap();
        assert_eq!(millis, Some("1580464800000".to_string()));

        let y = descriptor("release_year", FieldType::UntokenizedString, ParserKind::ReleaseYear);
        let year = Parser::ReleaseYear.parse(&ctx(&sub, &paths, &views), &y).unwrap();
        assert_eq!(year, Some("2020".to_string()));
    }

    #[test]
    fn access_grants() {
        let sub = submission();
        let paths = JsonPathService::new();
        let views = HashMap::new();
        let d = descriptor("access", FieldType::UntokenizedString, ParserKind::Access);
        let value = Parser::Access.parse(&ctx(&sub, &paths, &views), &d).unwrap();
        assert_eq!(value, Some("ada@example.org|public".to_string()));
    }

    #[test]
    fn view_count_lookup() {
        let sub = submission();
        let paths = JsonPathService::new();
        let mut views = HashMap::new();
        views.insert("S-TEST1".to_string(), 17u64);
        let d = descriptor("views", FieldType::Long, ParserKind::ViewCount);
        let value = Parser::ViewCount.parse(&ctx(&sub, &paths, &views), &d).unwrap();
        assert_eq!(value, Some("17".to_string()));
    }

    #[test]
    fn node_counting_is_additive_across_paths() {
        let sub = submission();
        let paths = JsonPathService::new();
        let views = HashMap::new();
        let mut d = descriptor("attr_count", FieldType::Long, ParserKind::NodeCounting);
        d.json_paths = vec![
            "attributes[?name='AttachTo'].value".into(),
            "attributes[?name='Title'].value".into(),
        ];
        let value = Parser::NodeCounting.parse(&ctx(&sub, &paths, &views), &d).unwrap();
        assert_eq!(value, Some("4".to_string()));
    }

    #[test]
    fn file_type_extensions() {
        let sub = Submission::from_value(serde_json::json!({
            "accNo": "S-TEST2",
            "section": {
                "type": "study",
                "files": [
                    { "path": "raw/image.TIF" },
                    { "fileName": "table.csv" },
                    { "path": "no-extension" },
                    { "path": "dup/other.tif" }
                ]
            }
        }))
        .unwrap();
        let paths = JsonPathService::new();
        let views = HashMap::new();
        let mut d = descriptor("file_type", FieldType::Facet, ParserKind::FileType);
        d.facet_kind = Some(FacetKind::FileType);
        let value = Parser::FileType.parse(&ctx(&sub, &paths, &views), &d).unwrap();
        assert_eq!(value, Some("tif|csv".to_string()));
    }

    #[test]
    fn content_collects_attribute_text() {
        let sub = submission();
        let paths = JsonPathService::new();
        let views = HashMap::new();
        let d = descriptor(reserved::CONTENT, FieldType::TokenizedText, ParserKind::Content);
        let value = Parser::Content.parse(&ctx(&sub, &paths, &views), &d).unwrap().unwrap();
        assert_eq!(value.contains("Leukocyte imaging"), true);
        assert_eq!(value.contains("AttachTo"), true);
    }

    #[test]
    fn type_parser_lowercases() {
        let sub = submission();
        let paths = JsonPathService::new();
        let views = HashMap::new();
        let d = descriptor("type", FieldType::UntokenizedString, ParserKind::Type);
        let value = Parser::Type.parse(&ctx(&sub, &paths, &views), &d).unwrap();
        assert_eq!(value, Some("study".to_string()));
    }
}
