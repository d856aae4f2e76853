//! Servable description builder

use super::datacite::{
    AlternateIdentifier, AwardNumber, Datacite, FundingReference, RelatedIdentifier, Rights,
};
use super::files::FileManifest;
use super::requirements::{PipVersionResolver, Requirement, VersionResolver};
use super::types::{ArgumentBlock, ArgumentType};
use crate::error::{DlhubError, DlhubResult};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the method every servable exposes
pub const RUN_METHOD: &str = "run";

/// Framework-specific part of a servable description
///
/// Implementations decide which remote execution shim runs the servable and
/// what that shim needs to know about the method it calls.
pub trait ServableAdapter: Send + Sync + std::fmt::Debug {
    /// Identifier of the remote execution adapter, e.g. `python.PythonStaticMethodServable`
    fn shim(&self) -> &str;

    /// Human-readable servable kind recorded as `servable.type`
    fn servable_type(&self) -> &str;

    /// The `method_details` block for the run method
    fn method_details(&self) -> Map<String, Value>;

    /// Extra fields merged into the `servable` section
    fn servable_fields(&self) -> Map<String, Value> {
        Map::new()
    }
}

/// In-memory description of a servable, built field by field
#[derive(Debug)]
pub struct ServableModel {
    datacite: Datacite,
    name: Option<String>,
    domains: Vec<String>,
    visible_to: Vec<String>,
    files: FileManifest,
    requirements: BTreeMap<String, Requirement>,
    input: Option<ArgumentBlock>,
    output: Option<ArgumentBlock>,
    parameters: Map<String, Value>,
    unpack_inputs: bool,
    adapter: Box<dyn ServableAdapter>,
    resolver: Arc<dyn VersionResolver>,
}

impl ServableModel {
    pub fn new(adapter: Box<dyn ServableAdapter>) -> Self {
        Self {
            datacite: Datacite::default(),
            name: None,
            domains: Vec::new(),
            visible_to: vec!["public".to_string()],
            files: FileManifest::new(),
            requirements: BTreeMap::new(),
            input: None,
            output: None,
            parameters: Map::new(),
            unpack_inputs: false,
            adapter,
            resolver: Arc::new(PipVersionResolver::default()),
        }
    }

    // ------------------------------------------------------------------
    // Publication metadata
    // ------------------------------------------------------------------

    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.datacite.set_title(title);
        self
    }

    /// Short name of the servable, unique among the owner's servables
    pub fn set_name(&mut self, name: &str) -> &mut Self {
        self.name = Some(name.to_string());
        self
    }

    /// Set the creators, as "Family, Given" names with optional affiliations
    pub fn set_authors(&mut self, authors: &[&str], affiliations: &[Vec<String>]) -> &mut Self {
        self.datacite.set_authors(authors, affiliations);
        self
    }

    pub fn set_abstract(&mut self, text: &str) -> &mut Self {
        self.datacite.set_abstract(text);
        self
    }

    pub fn set_publication_year(&mut self, year: u16) -> &mut Self {
        self.datacite.publication_year = year.to_string();
        self
    }

    pub fn set_doi(&mut self, doi: &str) -> &mut Self {
        self.datacite.identifier.identifier = doi.to_string();
        self
    }

    /// Link to a related resource, e.g. the paper describing the model
    pub fn add_related_identifier(
        &mut self,
        identifier: &str,
        identifier_type: &str,
        relation_type: &str,
    ) -> &mut Self {
        self.datacite.related_identifiers.push(RelatedIdentifier {
            related_identifier: identifier.to_string(),
            related_identifier_type: identifier_type.to_string(),
            relation_type: relation_type.to_string(),
        });
        self
    }

    pub fn add_alternate_identifier(&mut self, identifier: &str, identifier_type: &str) -> &mut Self {
        self.datacite
            .alternate_identifiers
            .push(AlternateIdentifier {
                alternate_identifier: identifier.to_string(),
                alternate_identifier_type: identifier_type.to_string(),
            });
        self
    }

    pub fn add_funding_reference(
        &mut self,
        funder_name: &str,
        award_number: Option<&str>,
        award_title: Option<&str>,
    ) -> &mut Self {
        self.datacite.funding_references.push(FundingReference {
            funder_name: funder_name.to_string(),
            award_number: award_number.map(|n| AwardNumber {
                award_number: n.to_string(),
            }),
            award_title: award_title.map(str::to_string),
        });
        self
    }

    pub fn add_rights(&mut self, rights: &str, uri: Option<&str>) -> &mut Self {
        self.datacite.rights_list.push(Rights {
            rights: rights.to_string(),
            rights_uri: uri.map(str::to_string),
        });
        self
    }

    /// Scientific domains, e.g. "materials science"
    pub fn set_domains(&mut self, domains: &[&str]) -> &mut Self {
        self.domains = domains.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Restrict visibility to the given identities and groups
    ///
    /// With both lists empty the servable is public.
    pub fn set_visibility(&mut self, users: &[&str], groups: &[&str]) -> &mut Self {
        if users.is_empty() && groups.is_empty() {
            self.visible_to = vec!["public".to_string()];
        } else {
            self.visible_to = users
                .iter()
                .map(|u| format!("urn:globus:auth:identity:{}", u))
                .chain(groups.iter().map(|g| format!("urn:globus:groups:id:{}", g)))
                .collect();
        }
        self
    }

    // ------------------------------------------------------------------
    // Method contract
    // ------------------------------------------------------------------

    pub fn set_inputs(&mut self, input: ArgumentBlock) -> DlhubResult<&mut Self> {
        input.validate()?;
        self.input = Some(input);
        Ok(self)
    }

    pub fn set_outputs(&mut self, output: ArgumentBlock) -> DlhubResult<&mut Self> {
        output.validate()?;
        self.output = Some(output);
        Ok(self)
    }

    /// Default keyword arguments passed to the method
    pub fn set_parameters(&mut self, parameters: Map<String, Value>) -> &mut Self {
        self.parameters = parameters;
        self
    }

    /// Call the method with the elements of a tuple input as positional arguments
    ///
    /// Only tuple inputs can be unpacked.
    pub fn set_unpack_inputs(&mut self, unpack: bool) -> DlhubResult<&mut Self> {
        if unpack {
            check_unpackable(self.input.as_ref())?;
        }
        self.unpack_inputs = unpack;
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Dependencies and files
    // ------------------------------------------------------------------

    /// Record a Python dependency; `detect` or `latest` resolve the installed version
    pub fn add_requirement(&mut self, name: &str, version: impl Into<Requirement>) -> &mut Self {
        self.requirements.insert(name.to_string(), version.into());
        self
    }

    pub fn set_version_resolver(&mut self, resolver: Arc<dyn VersionResolver>) -> &mut Self {
        self.resolver = resolver;
        self
    }

    pub fn add_file(&mut self, path: impl AsRef<Path>, name: Option<&str>) -> DlhubResult<&mut Self> {
        self.files.add(path, name)?;
        Ok(self)
    }

    pub fn add_directory(&mut self, dir: impl AsRef<Path>, recursive: bool) -> DlhubResult<&mut Self> {
        let added = self.files.add_directory(dir.as_ref(), recursive)?;
        tracing::debug!(dir = ?dir.as_ref(), files = added, "Added directory to servable");
        Ok(self)
    }

    pub fn list_files(&self) -> Vec<PathBuf> {
        self.files.list()
    }

    /// Package every referenced file into a ZIP archive
    pub fn write_zip(&self, dest: &Path) -> DlhubResult<()> {
        self.files.write_zip(dest)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn input(&self) -> Option<&ArgumentBlock> {
        self.input.as_ref()
    }

    pub fn output(&self) -> Option<&ArgumentBlock> {
        self.output.as_ref()
    }

    pub fn shim(&self) -> &str {
        self.adapter.shim()
    }

    pub fn files(&self) -> &FileManifest {
        &self.files
    }

    pub fn datacite(&self) -> &Datacite {
        &self.datacite
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Render the full description document
    ///
    /// Fails until both input and output are set. With `simplify_paths`, file
    /// paths are written relative to their common directory, matching the
    /// names used inside the archive produced by [`ServableModel::write_zip`].
    pub fn to_dict(&self, simplify_paths: bool) -> DlhubResult<Value> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| DlhubError::MissingField("input".to_string()))?;
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| DlhubError::MissingField("output".to_string()))?;

        let mut method_details = self.adapter.method_details();
        if self.unpack_inputs {
            check_unpackable(Some(input))?;
            method_details.insert("unpack".to_string(), Value::Bool(true));
        }

        let mut methods = Map::new();
        methods.insert(
            RUN_METHOD.to_string(),
            json!({
                "input": input,
                "output": output,
                "parameters": self.parameters,
                "method_details": method_details,
            }),
        );

        let mut servable = Map::new();
        servable.insert("type".to_string(), json!(self.adapter.servable_type()));
        servable.insert("shim".to_string(), json!(self.adapter.shim()));
        servable.insert("methods".to_string(), Value::Object(methods));
        servable.extend(self.adapter.servable_fields());

        let mut dlhub = Map::new();
        dlhub.insert("version".to_string(), json!(crate::VERSION));
        dlhub.insert("domains".to_string(), json!(self.domains));
        dlhub.insert("visible_to".to_string(), json!(self.visible_to));
        if let Some(name) = &self.name {
            dlhub.insert("name".to_string(), json!(name));
        }
        dlhub.insert("type".to_string(), json!("servable"));
        dlhub.insert("files".to_string(), self.files.to_json(simplify_paths));
        if !self.requirements.is_empty() {
            dlhub.insert(
                "dependencies".to_string(),
                json!({ "python": self.resolve_requirements()? }),
            );
        }

        Ok(json!({
            "datacite": self.datacite,
            "dlhub": dlhub,
            "servable": servable,
        }))
    }

    fn resolve_requirements(&self) -> DlhubResult<Map<String, Value>> {
        let mut resolved = Map::new();
        for (name, requirement) in &self.requirements {
            let version = match requirement {
                Requirement::Pinned(version) => version.clone(),
                Requirement::Detect => {
                    let version = self.resolver.installed_version(name)?;
                    tracing::debug!(package = %name, version = %version, "Detected installed version");
                    version
                }
            };
            resolved.insert(name.clone(), Value::String(version));
        }
        Ok(resolved)
    }
}

fn check_unpackable(input: Option<&ArgumentBlock>) -> DlhubResult<()> {
    match input {
        Some(block) if block.kind == ArgumentType::Tuple => Ok(()),
        Some(block) => Err(DlhubError::InvalidArgument(format!(
            "Inputs can only be unpacked for tuple inputs (declared type is '{}')",
            block.kind
        ))),
        None => Err(DlhubError::InvalidArgument(
            "Set a tuple input before marking inputs for unpacking".to_string(),
        )),
    }
}
