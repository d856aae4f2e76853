//! HTTP client for the DLHub service

use crate::auth::{Authorizer, authorizer_from_env_or_file};
use crate::config::ClientConfig;
use crate::error::{DlhubError, DlhubResult};
use crate::models::ServableModel;
use crate::schemas::{SchemaKind, SchemaRegistry, validate_against_dlhub_schema};
use crate::search::{GlobusSearchBackend, SEARCH_LIMIT, SearchBackend, SearchHelper, get_method_details};
use crate::task::{PollConfig, TaskFuture, TaskStatusSource};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

/// Environment variable holding the DLHub access token
pub const ACCESS_TOKEN_ENV: &str = "DLHUB_ACCESS_TOKEN";
/// Environment variable holding the search access token
pub const SEARCH_TOKEN_ENV: &str = "DLHUB_SEARCH_TOKEN";

/// How `run` sends inputs to a servable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEncoding {
    /// Serialized to a JSON string and wrapped as `{"python": ...}`
    Python,
    /// Sent as-is under `{"data": ...}`
    Json,
    /// Uploaded as files (not supported yet)
    Files,
}

impl std::str::FromStr for InputEncoding {
    type Err = DlhubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(Self::Python),
            "json" => Ok(Self::Json),
            "files" => Ok(Self::Files),
            other => Err(DlhubError::InvalidArgument(format!(
                "Input type not recognized: {}",
                other
            ))),
        }
    }
}

/// Authenticated client for listing, describing, running and publishing servables
#[derive(Debug, Clone)]
pub struct DlhubClient {
    http: reqwest::Client,
    base_url: String,
    authorizer: Arc<dyn Authorizer>,
    search: Arc<dyn SearchBackend>,
    schemas: Option<Arc<SchemaRegistry>>,
    poll: PollConfig,
}

impl DlhubClient {
    /// Create a client with explicit credentials and search backend
    pub fn new(
        config: &ClientConfig,
        authorizer: Arc<dyn Authorizer>,
        search: Arc<dyn SearchBackend>,
    ) -> DlhubResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.http_timeout() {
            builder = builder.timeout(timeout);
        }

        let schemas = match &config.schema_dir {
            Some(dir) => Some(Arc::new(SchemaRegistry::from_dir(dir)?)),
            None => None,
        };

        Ok(Self {
            http: builder.build()?,
            base_url: config.service_address.trim_end_matches('/').to_string(),
            authorizer,
            search,
            schemas,
            poll: PollConfig::from(config),
        })
    }

    /// Create a client from configuration, reading tokens from the environment or token files
    pub fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let authorizer = authorizer_from_env_or_file(ACCESS_TOKEN_ENV, config.token_file.as_deref())
            .context("Failed to load DLHub credentials")?;
        let search_authorizer =
            authorizer_from_env_or_file(SEARCH_TOKEN_ENV, config.search_token_file.as_deref())
                .context("Failed to load search credentials")?;

        let search = GlobusSearchBackend::new(
            &config.search_address,
            &config.search_index,
            search_authorizer,
            config.http_timeout(),
        )
        .context("Failed to create search backend")?;

        let client = Self::new(config, authorizer, Arc::new(search))
            .context("Failed to create DLHub client")?;

        tracing::info!(
            service = %config.service_address,
            search_index = %config.search_index,
            "DLHub client ready"
        );
        Ok(client)
    }

    /// A fresh query against the servable index
    pub fn query(&self) -> SearchHelper {
        SearchHelper::new(self.search.clone())
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn add_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.authorizer.authorization_header() {
            Some(header) => request.header(reqwest::header::AUTHORIZATION, header),
            None => request,
        }
    }

    async fn check_response(&self, endpoint: &str, response: reqwest::Response) -> DlhubResult<Value> {
        let status = response.status();
        crate::metrics::record_request(endpoint, status.as_u16());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                endpoint = endpoint,
                status = status.as_u16(),
                body = %body,
                "DLHub request failed"
            );
            return Err(DlhubError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    async fn get(&self, endpoint: &str, path: &str) -> DlhubResult<Value> {
        let url = self.api_url(path);
        tracing::debug!(url = %url, "GET");
        let response = self.add_auth(self.http.get(&url)).send().await?;
        self.check_response(endpoint, response).await
    }

    async fn post(&self, endpoint: &str, path: &str, body: &Value) -> DlhubResult<Value> {
        let url = self.api_url(path);
        tracing::debug!(url = %url, "POST");
        let response = self
            .add_auth(self.http.post(&url))
            .json(body)
            .send()
            .await?;
        self.check_response(endpoint, response).await
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Every servable in the index
    ///
    /// With `only_latest_version`, older versions of each servable are dropped.
    pub async fn get_servables(&self, only_latest_version: bool) -> DlhubResult<Vec<Value>> {
        let (results, info) = self
            .query()
            .match_field("dlhub.type", "servable")
            .add_sort("dlhub.owner", true)
            .add_sort("dlhub.name", false)
            .add_sort("dlhub.publication_date", false)
            .search_with_info(None)
            .await?;

        if info.total_query_matches > SEARCH_LIMIT as u64 {
            return Err(DlhubError::TooManyResults {
                total: info.total_query_matches,
                limit: SEARCH_LIMIT,
            });
        }

        if only_latest_version {
            Ok(select_latest_versions(results, |r| {
                r.pointer("/dlhub/shorthand_name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            }))
        } else {
            Ok(results)
        }
    }

    /// Names of all servables, in `owner/name` form
    pub async fn list_servables(&self) -> DlhubResult<Vec<String>> {
        let servables = self.get_servables(true).await?;
        Ok(servables
            .iter()
            .filter_map(|s| s.pointer("/dlhub/shorthand_name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// Full record of the newest version of `owner/name`
    pub async fn describe_servable(&self, owner: &str, name: &str) -> DlhubResult<Value> {
        let mut results = self
            .query()
            .match_servable(Some(name), None, None)?
            .match_owner(owner)
            .add_sort("dlhub.publication_date", false)
            .search(Some(1))
            .await?;

        if results.is_empty() {
            return Err(DlhubError::NotFound(format!(
                "No such servable: {}/{}",
                owner, name
            )));
        }
        Ok(results.swap_remove(0))
    }

    /// Description of one method of a servable, or of all of them when `method` is `None`
    pub async fn describe_methods(
        &self,
        owner: &str,
        name: &str,
        method: Option<&str>,
    ) -> DlhubResult<Value> {
        let metadata = self.describe_servable(owner, name).await?;
        get_method_details(&metadata, method)
    }

    /// Search by servable name, owner and/or version (publication date)
    ///
    /// With `only_latest`, only the newest publication of each owner/name pair is kept.
    pub async fn search_by_servable(
        &self,
        servable_name: Option<&str>,
        owner: Option<&str>,
        version: Option<&str>,
        only_latest: bool,
        limit: Option<usize>,
    ) -> DlhubResult<Vec<Value>> {
        let results = self
            .query()
            .match_servable(servable_name, owner, version)?
            .search(limit)
            .await?;

        if !only_latest {
            return Ok(results);
        }

        Ok(select_latest_versions(results, |r| {
            let owner = r.pointer("/dlhub/owner").and_then(Value::as_str)?;
            let name = r.pointer("/dlhub/name").and_then(Value::as_str)?;
            Some(format!("{}/{}", owner, name))
        }))
    }

    /// Search by creator names; with `match_all` every author must be listed
    pub async fn search_by_authors(
        &self,
        authors: &[&str],
        match_all: bool,
        limit: Option<usize>,
    ) -> DlhubResult<Vec<Value>> {
        self.query()
            .match_authors(authors, match_all)?
            .search(limit)
            .await
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Invoke a servable, `owner/name`, and return its output
    pub async fn run(&self, name: &str, inputs: &Value, encoding: InputEncoding) -> DlhubResult<Value> {
        let body = encode_inputs(inputs, encoding)?;
        tracing::info!(servable = %name, encoding = ?encoding, "Running servable");
        self.post("run", &format!("servables/{}/run", name), &body)
            .await
    }

    /// Invoke a servable without waiting, returning a handle to the remote task
    pub async fn run_async(
        &self,
        name: &str,
        inputs: &Value,
        encoding: InputEncoding,
    ) -> DlhubResult<TaskFuture> {
        let mut body = encode_inputs(inputs, encoding)?;
        body["asynchronous"] = Value::Bool(true);

        tracing::info!(servable = %name, encoding = ?encoding, "Submitting servable run");
        let reply = self
            .post("run", &format!("servables/{}/run", name), &body)
            .await?;
        let task_id = task_id_from(&reply)?;
        Ok(self.watch_task(&task_id))
    }

    /// Poll an existing task in the background
    pub fn watch_task(&self, task_id: &str) -> TaskFuture {
        TaskFuture::spawn(Arc::new(self.clone()), task_id, self.poll.clone())
    }

    /// Status document of a task, including a `status` field
    pub async fn get_task_status(&self, task_id: &str) -> DlhubResult<Value> {
        self.get("status", &format!("{}/status", task_id)).await
    }

    // ------------------------------------------------------------------
    // Publication
    // ------------------------------------------------------------------

    /// Submit a servable, returning the id of the publication task
    ///
    /// The description is validated before anything is sent. Files are
    /// uploaded as a temporary ZIP archive that is removed afterwards.
    pub async fn publish_servable(&self, model: &ServableModel) -> DlhubResult<String> {
        let result = self.upload_servable(model).await;
        crate::metrics::record_publish(result.is_ok());
        result
    }

    async fn upload_servable(&self, model: &ServableModel) -> DlhubResult<String> {
        let mut metadata = model.to_dict(true)?;
        metadata["dlhub"]["transfer_method"] = json!({"POST": "file"});
        self.validate(&metadata, SchemaKind::Servable)?;

        let archive = tempfile::Builder::new()
            .prefix("dlhub-servable-")
            .suffix(".zip")
            .tempfile()?;
        model.write_zip(archive.path())?;
        let payload = tokio::fs::read(archive.path()).await?;

        tracing::info!(
            servable = model.name().unwrap_or_default(),
            archive_bytes = payload.len(),
            files = model.list_files().len(),
            "Publishing servable"
        );

        let form = reqwest::multipart::Form::new()
            .part(
                "json",
                reqwest::multipart::Part::text(serde_json::to_string(&metadata)?)
                    .file_name("dlhub.json")
                    .mime_str("application/json")?,
            )
            .part(
                "file",
                reqwest::multipart::Part::bytes(payload)
                    .file_name("servable.zip")
                    .mime_str("application/octet-stream")?,
            );

        let response = self
            .add_auth(self.http.post(self.api_url("publish")))
            .multipart(form)
            .send()
            .await?;
        let reply = self.check_response("publish", response).await?;
        let task_id = task_id_from(&reply)?;

        tracing::info!(task_id = %task_id, "Servable submitted");
        Ok(task_id)
    }

    /// Submit a source repository for publication, returning the task id
    pub async fn publish_repository(&self, repository: &str) -> DlhubResult<String> {
        let reply = self
            .post("publish_repo", "publish_repo", &json!({"repository": repository}))
            .await?;
        let task_id = task_id_from(&reply)?;
        tracing::info!(repository = %repository, task_id = %task_id, "Repository submitted");
        Ok(task_id)
    }

    fn validate(&self, document: &Value, kind: SchemaKind) -> DlhubResult<()> {
        match &self.schemas {
            Some(registry) => registry.validate(document, kind),
            None => validate_against_dlhub_schema(document, kind),
        }
    }
}

#[async_trait]
impl TaskStatusSource for DlhubClient {
    async fn task_status(&self, task_id: &str) -> DlhubResult<Value> {
        self.get_task_status(task_id).await
    }
}

fn encode_inputs(inputs: &Value, encoding: InputEncoding) -> DlhubResult<Value> {
    match encoding {
        InputEncoding::Python => Ok(json!({"python": serde_json::to_string(inputs)?})),
        InputEncoding::Json => Ok(json!({"data": inputs})),
        InputEncoding::Files => Err(DlhubError::Unimplemented(
            "Files support is not yet implemented".to_string(),
        )),
    }
}

fn task_id_from(reply: &Value) -> DlhubResult<String> {
    reply
        .get("task_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DlhubError::MissingField("task_id".to_string()))
}

/// Comparable form of a record's `dlhub.publication_date`
///
/// Dates are epoch milliseconds, as numbers or numeric strings; anything
/// else compares as text, below every numeric date.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PublicationDate {
    Missing,
    Text(String),
    Epoch(u64),
}

fn publication_date(record: &Value) -> PublicationDate {
    match record.pointer("/dlhub/publication_date") {
        Some(Value::Number(n)) => n
            .as_u64()
            .map(PublicationDate::Epoch)
            .unwrap_or_else(|| PublicationDate::Text(n.to_string())),
        Some(Value::String(s)) => s
            .parse()
            .map(PublicationDate::Epoch)
            .unwrap_or_else(|_| PublicationDate::Text(s.clone())),
        _ => PublicationDate::Missing,
    }
}

/// Keep the newest record per key, in order of first appearance
///
/// Records without a key are all kept. Among records with the same key and
/// publication date the first one wins.
pub fn select_latest_versions<F>(records: Vec<Value>, key: F) -> Vec<Value>
where
    F: Fn(&Value) -> Option<String>,
{
    let mut selected: Vec<Value> = Vec::with_capacity(records.len());
    let mut slots: HashMap<String, usize> = HashMap::new();

    for record in records {
        let Some(k) = key(&record) else {
            selected.push(record);
            continue;
        };

        match slots.get(&k) {
            Some(&slot) => {
                if publication_date(&record) > publication_date(&selected[slot]) {
                    selected[slot] = record;
                }
            }
            None => {
                slots.insert(k, selected.len());
                selected.push(record);
            }
        }
    }

    selected
}
