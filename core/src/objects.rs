//! ADT repository operations
//! Typed calls on top of `BridgeClient::request`: search, read and write
//! ABAP sources, create programs and classes

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::bridge::backend::adt::unescape_xml;
use crate::bridge::types::FieldList;
use crate::client::{BridgeClient, BridgeRequestError};

pub const DISCOVERY_PATH: &str = "/sap/bc/adt/discovery";
pub const SEARCH_PATH: &str = "/sap/bc/adt/repository/informationsystem/search";
pub const ACTIVATION_PATH: &str = "/sap/bc/adt/activation";
pub const PROGRAMS_PATH: &str = "/sap/bc/adt/programs/programs";
pub const CLASSES_PATH: &str = "/sap/bc/adt/oo/classes";

const LOCAL_PACKAGE: &str = "$TMP";
const PACKAGE_SEARCH_LIMIT: u32 = 100;

static OBJECT_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<adtcore:objectReference\b([^>]*)>").expect("static regex"));
static PACKAGE_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<pak:package\b([^>]*)>").expect("static regex"));
static ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([\w:.-]+)\s*=\s*"([^"]*)""#).expect("static regex"));
static LOCK_HANDLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<LOCK_HANDLE>(.*?)</LOCK_HANDLE>").expect("static regex"));

/// Object types whose source (or definition) can be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Class,
    Interface,
    Program,
    FunctionGroup,
    Table,
}

impl ObjectKind {
    /// Object URI; sources live below it at `/source/main`
    pub fn object_path(&self, name: &str) -> String {
        let name = name.to_lowercase();
        match self {
            Self::Class => format!("{}/{}", CLASSES_PATH, name),
            Self::Interface => format!("/sap/bc/adt/oo/interfaces/{}", name),
            Self::Program => format!("{}/{}", PROGRAMS_PATH, name),
            Self::FunctionGroup => format!("/sap/bc/adt/functions/groups/{}", name),
            Self::Table => format!("/sap/bc/adt/ddic/tables/{}", name),
        }
    }

    /// Tables carry a definition, not source code
    pub fn has_source(&self) -> bool {
        !matches!(self, Self::Table)
    }
}

impl FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "class" => Ok(Self::Class),
            "interface" => Ok(Self::Interface),
            "program" | "report" => Ok(Self::Program),
            "function" => Ok(Self::FunctionGroup),
            "table" => Ok(Self::Table),
            _ => Err(format!(
                "Unsupported object type: {}. Use: class, interface, program, function, table",
                s
            )),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Program => "program",
            Self::FunctionGroup => "function",
            Self::Table => "table",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub name: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub uri: String,
    pub description: String,
    pub package_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub count: usize,
    pub results: Vec<ObjectReference>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCheck {
    pub status: String,
    pub url: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub created_at: String,
    pub changed_by: String,
    pub changed_at: String,
    pub object_count: usize,
    pub objects: Vec<ObjectReference>,
}

#[derive(Debug, Clone, Default)]
pub struct NewProgram {
    pub name: String,
    pub description: String,
    pub package: Option<String>,
    pub transport: Option<String>,
    pub language: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewClass {
    pub name: String,
    pub description: Option<String>,
    pub package: Option<String>,
    pub transport: Option<String>,
    pub language: Option<String>,
    pub source: Option<String>,
    pub is_final: bool,
    pub visibility: String,
}

impl Default for NewClass {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            package: None,
            transport: None,
            language: None,
            source: None,
            is_final: true,
            visibility: "public".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CreateAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedObject {
    pub action: CreateAction,
    pub name: String,
    pub package: String,
    pub transport: Option<String>,
    pub description: String,
    pub source_written: bool,
}

impl BridgeClient {
    async fn get_text(&self, path: &str, accept: &str, params: &FieldList) -> anyhow::Result<String> {
        let headers = vec![("Accept".to_string(), accept.to_string())];
        let envelope = self.request("GET", path, &headers, params, None).await?;
        Ok(envelope.body)
    }

    async fn send_text(
        &self,
        method: &str,
        path: &str,
        body: &str,
        content_type: &str,
        accept: &str,
        params: &FieldList,
    ) -> anyhow::Result<String> {
        let headers = vec![
            ("Content-Type".to_string(), content_type.to_string()),
            ("Accept".to_string(), accept.to_string()),
        ];
        let envelope = self.request(method, path, &headers, params, Some(body)).await?;
        Ok(envelope.body)
    }

    /// Fetch the discovery document; failures are reported, not raised
    pub async fn check_connection(&self) -> ConnectionCheck {
        match self
            .get_text(DISCOVERY_PATH, "application/atomsvc+xml", &Vec::new())
            .await
        {
            Ok(discovery) => ConnectionCheck {
                status: "connected".to_string(),
                url: self.base_url().to_string(),
                message: "Connected via ADT bridge".to_string(),
                discovery_size: Some(discovery.len()),
            },
            Err(e) => ConnectionCheck {
                status: "error".to_string(),
                url: self.base_url().to_string(),
                message: e.to_string(),
                discovery_size: None,
            },
        }
    }

    pub async fn search(
        &self,
        query: &str,
        max_results: u32,
        object_type: Option<&str>,
    ) -> anyhow::Result<SearchResults> {
        let mut params = quick_search(query, max_results);
        if let Some(object_type) = object_type.filter(|t| !t.is_empty()) {
            params.push(("objectType".to_string(), object_type.to_string()));
        }

        let xml = self.get_text(SEARCH_PATH, "application/xml", &params).await?;
        let results = parse_object_references(&xml);
        Ok(SearchResults {
            query: query.to_string(),
            count: results.len(),
            results,
        })
    }

    /// Source code of an object, or the XML definition of a table
    pub async fn read_source(&self, kind: ObjectKind, name: &str) -> anyhow::Result<String> {
        if !kind.has_source() {
            return self.get_text(&kind.object_path(name), "*/*", &Vec::new()).await;
        }

        let path = format!("{}/source/main", kind.object_path(name));
        match self.get_text(&path, "text/plain", &Vec::new()).await {
            Err(e) if is_status(&e, 404) => anyhow::bail!("Object not found: {} {}", kind, name),
            other => other,
        }
    }

    pub async fn get_package(&self, name: &str) -> anyhow::Result<PackageInfo> {
        let metadata = self
            .get_text(&format!("/sap/bc/adt/packages/{}", name.to_lowercase()), "*/*", &Vec::new())
            .await?;

        let mut params = quick_search("*", PACKAGE_SEARCH_LIMIT);
        params.push(("packageName".to_string(), name.to_string()));
        let contents = self.get_text(SEARCH_PATH, "application/xml", &params).await?;
        let objects = parse_object_references(&contents);

        let attributes = PACKAGE_ELEMENT
            .captures(&metadata)
            .and_then(|cap| cap.get(1))
            .map(|m| parse_attributes(m.as_str()))
            .unwrap_or_default();
        let attr = |key: &str| attributes.get(key).cloned().unwrap_or_default();

        Ok(PackageInfo {
            name: attributes
                .get("adtcore:name")
                .cloned()
                .unwrap_or_else(|| name.to_string()),
            description: attr("adtcore:description"),
            created_by: attr("adtcore:createdBy"),
            created_at: attr("adtcore:createdAt"),
            changed_by: attr("adtcore:changedBy"),
            changed_at: attr("adtcore:changedAt"),
            object_count: objects.len(),
            objects,
        })
    }

    /// Raw metadata document of any ADT object URI
    pub async fn get_object_info(&self, uri: &str) -> anyhow::Result<String> {
        let uri = if uri.starts_with('/') {
            uri.to_string()
        } else {
            format!("/{}", uri)
        };
        self.get_text(&uri, "*/*", &Vec::new()).await
    }

    /// Replace the main source of an object: LOCK, PUT, then UNLOCK.
    ///
    /// The three calls are mutating, so the bridge runs them in the
    /// destination's enqueue session and the lock handle stays valid. The
    /// object is unlocked even when the write fails.
    pub async fn write_source(
        &self,
        object_path: &str,
        source: &str,
        transport: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut lock_params = vec![
            ("_action".to_string(), "LOCK".to_string()),
            ("accessMode".to_string(), "MODIFY".to_string()),
        ];
        if let Some(transport) = transport {
            lock_params.push(("corrNr".to_string(), transport.to_string()));
        }
        let lock_result = self
            .send_text(
                "POST",
                object_path,
                "",
                "application/xml",
                "application/vnd.sap.as+xml",
                &lock_params,
            )
            .await?;
        let lock_handle = lock_handle(&lock_result);
        if lock_handle.is_none() {
            tracing::warn!("No lock handle returned for {}", object_path);
        }

        let mut write_params = Vec::new();
        if let Some(handle) = &lock_handle {
            write_params.push(("lockHandle".to_string(), handle.clone()));
        }
        if let Some(transport) = transport {
            write_params.push(("corrNr".to_string(), transport.to_string()));
        }
        let written = self
            .send_text(
                "PUT",
                &format!("{}/source/main", object_path),
                source,
                "text/plain",
                "text/plain",
                &write_params,
            )
            .await;

        let mut unlock_params = vec![("_action".to_string(), "UNLOCK".to_string())];
        if let Some(handle) = lock_handle {
            unlock_params.push(("lockHandle".to_string(), handle));
        }
        let unlocked = self
            .send_text("POST", object_path, "", "application/xml", "*/*", &unlock_params)
            .await;

        match (written, unlocked) {
            (Err(e), Err(unlock_err)) => {
                tracing::warn!("Unlocking {} failed: {}", object_path, unlock_err);
                Err(e)
            }
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            (Ok(_), Ok(_)) => Ok(()),
        }
    }

    pub async fn activate(&self, object_path: &str, name: &str) -> anyhow::Result<()> {
        let body = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<adtcore:objectReferences xmlns:adtcore="http://www.sap.com/adt/core">
  <adtcore:objectReference adtcore:uri="{}" adtcore:name="{}"/>
</adtcore:objectReferences>"#,
            escape_xml(object_path),
            escape_xml(&name.to_uppercase())
        );
        let params = vec![
            ("method".to_string(), "activate".to_string()),
            ("preauditRequested".to_string(), "true".to_string()),
        ];
        self.send_text("POST", ACTIVATION_PATH, &body, "application/xml", "application/xml", &params)
            .await?;
        Ok(())
    }

    /// Create an executable program, then write its source if one is given.
    /// Without a transport the program goes to the local package.
    pub async fn create_program(&self, program: NewProgram) -> anyhow::Result<CreatedObject> {
        let name = customer_name(&program.name);
        let package = match &program.transport {
            Some(_) => program
                .package
                .as_deref()
                .unwrap_or(LOCAL_PACKAGE)
                .to_uppercase(),
            None => LOCAL_PACKAGE.to_string(),
        };
        let language = program.language.as_deref().unwrap_or("EN").to_uppercase();

        let body = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<program:abapProgram
    xmlns:program="http://www.sap.com/adt/programs/programs"
    xmlns:adtcore="http://www.sap.com/adt/core"
    adtcore:description="{}"
    adtcore:language="{}"
    adtcore:name="{}"
    adtcore:type="PROG/P"
    program:programType="1">
  <adtcore:packageRef adtcore:name="{}"/>
</program:abapProgram>"#,
            escape_xml(&program.description),
            escape_xml(&language),
            escape_xml(&name),
            escape_xml(&package)
        );

        let content_type = "application/vnd.sap.adt.programs.programs.v2+xml";
        self.send_text(
            "POST",
            PROGRAMS_PATH,
            &body,
            content_type,
            content_type,
            &transport_params(program.transport.as_deref()),
        )
        .await?;
        tracing::info!("Created program {} in {}", name, package);

        if let Some(source) = program.source.as_deref().filter(|s| !s.is_empty()) {
            self.write_source(
                &ObjectKind::Program.object_path(&name),
                source,
                program.transport.as_deref(),
            )
            .await?;
        }

        Ok(CreatedObject {
            action: CreateAction::Created,
            name,
            package,
            transport: program.transport,
            description: program.description,
            source_written: program.source.map(|s| !s.is_empty()).unwrap_or(false),
        })
    }

    /// Create and activate a class. An existing class is updated instead:
    /// its source is written and activated again.
    pub async fn create_class(&self, class: NewClass) -> anyhow::Result<CreatedObject> {
        let name = customer_name(&class.name);
        let package = class
            .package
            .as_deref()
            .unwrap_or(LOCAL_PACKAGE)
            .to_uppercase();
        let language = class.language.as_deref().unwrap_or("EN").to_uppercase();
        let description = class
            .description
            .clone()
            .unwrap_or_else(|| "Created by adt-bridge".to_string());
        let class_path = ObjectKind::Class.object_path(&name);

        let body = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<class:abapClass
    xmlns:class="http://www.sap.com/adt/oo/classes"
    xmlns:adtcore="http://www.sap.com/adt/core"
    adtcore:description="{}"
    adtcore:language="{}"
    adtcore:name="{}"
    adtcore:type="CLAS/OC"
    class:final="{}"
    class:visibility="{}">
  <adtcore:packageRef adtcore:name="{}"/>
</class:abapClass>"#,
            escape_xml(&description),
            escape_xml(&language),
            escape_xml(&name),
            class.is_final,
            escape_xml(&class.visibility),
            escape_xml(&package)
        );

        let content_type = "application/vnd.sap.adt.oo.classes.v4+xml";
        let created = self
            .send_text(
                "POST",
                CLASSES_PATH,
                &body,
                content_type,
                content_type,
                &transport_params(class.transport.as_deref()),
            )
            .await;

        // No existence check up front: the enqueue session would lock the
        // object on first access
        let action = match created {
            Ok(_) => {
                self.activate(&class_path, &name).await?;
                tracing::info!("Created class {} in {}", name, package);
                CreateAction::Created
            }
            Err(e) if already_exists(&e) => {
                tracing::info!("Class {} already exists, updating it", name);
                CreateAction::Updated
            }
            Err(e) => return Err(e),
        };

        let source_written = match class.source.as_deref().filter(|s| !s.is_empty()) {
            Some(source) => {
                self.write_source(&class_path, source, class.transport.as_deref())
                    .await?;
                // Activation fails while the object is still locked
                self.activate(&class_path, &name).await?;
                true
            }
            None => false,
        };

        Ok(CreatedObject {
            action,
            name,
            package,
            transport: class.transport,
            description,
            source_written,
        })
    }
}

fn quick_search(query: &str, max_results: u32) -> FieldList {
    vec![
        ("operation".to_string(), "quickSearch".to_string()),
        ("query".to_string(), query.to_string()),
        ("maxResults".to_string(), max_results.to_string()),
    ]
}

fn transport_params(transport: Option<&str>) -> FieldList {
    transport
        .map(|t| vec![("corrNr".to_string(), t.to_string())])
        .unwrap_or_default()
}

fn is_status(error: &anyhow::Error, status: u16) -> bool {
    error
        .downcast_ref::<BridgeRequestError>()
        .map(|e| e.status == status)
        .unwrap_or(false)
}

fn already_exists(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<BridgeRequestError>()
        .map(|e| e.status == 400 && e.detail.contains("AlreadyExists"))
        .unwrap_or(false)
}

/// Upper-case the name and put it in the customer namespace (Z or Y)
pub fn customer_name(name: &str) -> String {
    let name = name.trim().to_uppercase();
    if name.starts_with('Z') || name.starts_with('Y') {
        name
    } else {
        format!("Z{}", name)
    }
}

pub fn lock_handle(lock_result: &str) -> Option<String> {
    LOCK_HANDLE
        .captures(lock_result)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|h| !h.is_empty())
}

fn parse_attributes(raw: &str) -> HashMap<String, String> {
    ATTRIBUTE
        .captures_iter(raw)
        .map(|cap| (cap[1].to_string(), unescape_xml(&cap[2])))
        .collect()
}

/// Object references of a quick search result, in document order
pub fn parse_object_references(xml: &str) -> Vec<ObjectReference> {
    OBJECT_REFERENCE
        .captures_iter(xml)
        .map(|cap| {
            let mut attributes = parse_attributes(&cap[1]);
            let mut take = |key: &str| attributes.remove(key).unwrap_or_default();
            ObjectReference {
                name: take("adtcore:name"),
                object_type: take("adtcore:type"),
                uri: take("adtcore:uri"),
                description: take("adtcore:description"),
                package_name: take("adtcore:packageName"),
            }
        })
        .collect()
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
