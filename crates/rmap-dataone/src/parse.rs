//! Response parsing for the DataONE REST API.
//!
//! System metadata is flat enough that the handful of fields resolution needs
//! can be read with a single element pattern. Resource maps are RDF/XML; the
//! members are the `dcterms:identifier` values of every description that is
//! `ore:isAggregatedBy` some aggregation. Descriptions nested inside another
//! description (striped RDF/XML) are read on their own; the outer one only
//! sees its own properties.

use std::sync::OnceLock;

use regex::Regex;
use rmap_state::{IndexDocument, ResourceMapModel, SystemMetadata};
use serde::Deserialize;

use crate::error::DataOneError;

/// Fields requested from Solr for every resolution query.
pub const SOLR_FIELDS: &str = "id,seriesId,formatId,formatType,resourceMap";

fn element_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<(?:[\w.-]+:)?([A-Za-z]+)(?:\s[^>]*)?>([^<]*)</").expect("valid regex")
    })
}

fn description_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<(/?)rdf:Description\b[^>]*?(/?)>").expect("valid regex"))
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<(?:dcterms|dc):identifier\b[^>]*>([^<]*)</(?:dcterms|dc):identifier>")
            .expect("valid regex")
    })
}

/// Solr query matching a PID as either an identifier or a series ID.
pub fn solr_query(pid: &str) -> String {
    let escaped = pid.replace('\\', "\\\\").replace('"', "\\\"");
    format!("id:\"{escaped}\" OR seriesId:\"{escaped}\"")
}

#[derive(Debug, Deserialize)]
struct SolrResponse {
    response: SolrBody,
}

#[derive(Debug, Deserialize)]
struct SolrBody {
    #[serde(rename = "numFound", default)]
    _num_found: usize,
    #[serde(default)]
    docs: Vec<IndexDocument>,
}

/// Documents from a Solr `wt=json` response.
pub fn parse_solr(body: &str) -> Result<Vec<IndexDocument>, DataOneError> {
    let parsed: SolrResponse = serde_json::from_str(body).map_err(|e| DataOneError::Parse {
        what: "solr response".to_string(),
        reason: e.to_string(),
    })?;
    Ok(parsed.response.docs)
}

/// The lineage fields of a `systemMetadata` document.
pub fn parse_sysmeta(xml: &str) -> Result<SystemMetadata, DataOneError> {
    if !xml.contains("systemMetadata") {
        return Err(DataOneError::Parse {
            what: "system metadata".to_string(),
            reason: "no systemMetadata element".to_string(),
        });
    }

    let mut sm = SystemMetadata::default();
    for caps in element_re().captures_iter(xml) {
        let value = unescape(caps[2].trim());
        if value.is_empty() {
            continue;
        }
        let slot = match &caps[1] {
            "identifier" => &mut sm.identifier,
            "seriesId" => &mut sm.series_id,
            "obsoletes" => &mut sm.obsoletes,
            "obsoletedBy" => &mut sm.obsoleted_by,
            "formatId" => &mut sm.format_id,
            _ => continue,
        };
        // first occurrence is the top-level field
        if slot.is_none() {
            *slot = Some(value);
        }
    }
    Ok(sm)
}

/// Members of the aggregation described by an OAI-ORE RDF/XML document.
pub fn parse_resource_map(rm: &str, xml: &str) -> Result<ResourceMapModel, DataOneError> {
    if !xml.contains("rdf:RDF") {
        return Err(DataOneError::Parse {
            what: format!("resource map {rm}"),
            reason: "not an RDF/XML document".to_string(),
        });
    }

    let members: Vec<String> = descriptions(xml)
        .iter()
        .filter(|body| body.contains("isAggregatedBy"))
        .filter_map(|body| identifier_re().captures(body))
        .map(|caps| unescape(caps[1].trim()))
        .filter(|id| !id.is_empty() && id != rm)
        .collect();

    Ok(ResourceMapModel::new(rm, members))
}

struct OpenDescription {
    tag_start: usize,
    body_start: usize,
    nested: Vec<(usize, usize)>,
}

/// Body of every closed `rdf:Description`, with nested descriptions cut out.
fn descriptions(xml: &str) -> Vec<String> {
    let mut open: Vec<OpenDescription> = Vec::new();
    let mut bodies = Vec::new();

    for caps in description_tag_re().captures_iter(xml) {
        let Some(tag) = caps.get(0) else { continue };
        if &caps[1] == "/" {
            let Some(node) = open.pop() else { continue };
            let mut body = String::new();
            let mut cursor = node.body_start;
            for (start, end) in &node.nested {
                body.push_str(&xml[cursor..*start]);
                cursor = *end;
            }
            body.push_str(&xml[cursor..tag.start()]);
            bodies.push(body);
            if let Some(parent) = open.last_mut() {
                parent.nested.push((node.tag_start, tag.end()));
            }
        } else if &caps[2] == "/" {
            if let Some(parent) = open.last_mut() {
                parent.nested.push((tag.start(), tag.end()));
            }
        } else {
            open.push(OpenDescription {
                tag_start: tag.start(),
                body_start: tag.end(),
                nested: Vec::new(),
            });
        }
    }
    bodies
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
