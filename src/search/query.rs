//! Fluent query builder for the servable index

use super::SEARCH_LIMIT;
use super::backend::{SearchBackend, SearchRequest, SortField};
use crate::error::{DlhubError, DlhubResult};
use serde_json::Value;
use std::sync::Arc;

/// Information about an executed query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchInfo {
    /// Total number of records matching the query, including those not returned
    pub total_query_matches: u64,
    /// The query string sent to the index
    pub query: String,
    pub limit: usize,
}

/// Builds an advanced query term by term, then runs it
///
/// Terms are combined with `AND`. Each `match_*` call adds one term or one
/// parenthesized group.
#[derive(Debug, Clone)]
pub struct SearchHelper {
    backend: Arc<dyn SearchBackend>,
    terms: Vec<String>,
    sort: Vec<SortField>,
}

impl SearchHelper {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            backend,
            terms: Vec::new(),
            sort: Vec::new(),
        }
    }

    /// The query string built so far
    pub fn query(&self) -> String {
        self.terms.join(" AND ")
    }

    /// Require `field` to equal `value`
    pub fn match_field(mut self, field: &str, value: &str) -> Self {
        self.terms.push(format!("{}:{}", field, quote(value)));
        self
    }

    /// Match servables by name, owner, and/or publication date
    ///
    /// At least one of the three must be given.
    pub fn match_servable(
        mut self,
        name: Option<&str>,
        owner: Option<&str>,
        publication_date: Option<&str>,
    ) -> DlhubResult<Self> {
        fn present(value: Option<&str>) -> Option<&str> {
            value.filter(|v| !v.trim().is_empty())
        }
        let (name, owner, publication_date) =
            (present(name), present(owner), present(publication_date));
        if name.is_none() && owner.is_none() && publication_date.is_none() {
            return Err(DlhubError::InvalidArgument(
                "One of 'servable_name', 'owner', or 'publication_date' is required".to_string(),
            ));
        }

        if let Some(name) = name {
            self = self.match_field("dlhub.name", name);
        }
        if let Some(owner) = owner {
            self = self.match_owner(owner);
        }
        if let Some(date) = publication_date {
            self = self.match_field("dlhub.publication_date", date);
        }
        Ok(self)
    }

    pub fn match_owner(self, owner: &str) -> Self {
        self.match_field("dlhub.owner", owner)
    }

    /// Match servables by creator name
    ///
    /// With `match_all`, every author must appear; otherwise any one is enough.
    pub fn match_authors(self, authors: &[&str], match_all: bool) -> DlhubResult<Self> {
        if authors.is_empty() {
            return Err(DlhubError::InvalidArgument(
                "At least one author is required".to_string(),
            ));
        }
        if authors.iter().any(|a| a.trim().is_empty()) {
            return Err(DlhubError::InvalidArgument(
                "Author names must not be empty".to_string(),
            ));
        }
        Ok(self.match_any_of("datacite.creators.creatorName", authors, match_all))
    }

    /// Match servables in any of the given scientific domains
    pub fn match_domains(self, domains: &[&str]) -> DlhubResult<Self> {
        if domains.is_empty() {
            return Err(DlhubError::InvalidArgument(
                "At least one domain is required".to_string(),
            ));
        }
        Ok(self.match_any_of("dlhub.domains", domains, false))
    }

    pub fn match_doi(self, doi: &str) -> Self {
        self.match_field("datacite.identifier.identifier", doi)
    }

    /// Match publication years in an inclusive range; an open end is unbounded
    pub fn match_years(mut self, start: Option<u16>, stop: Option<u16>) -> DlhubResult<Self> {
        match (start, stop) {
            (None, None) => {
                return Err(DlhubError::InvalidArgument(
                    "A start or stop year is required".to_string(),
                ));
            }
            (Some(start), Some(stop)) if start > stop => {
                return Err(DlhubError::InvalidArgument(format!(
                    "Start year {} is after stop year {}",
                    start, stop
                )));
            }
            _ => {}
        }

        let bound = |year: Option<u16>| year.map_or_else(|| "*".to_string(), |y| y.to_string());
        self.terms.push(format!(
            "datacite.publicationYear:[{} TO {}]",
            bound(start),
            bound(stop)
        ));
        Ok(self)
    }

    pub fn add_sort(mut self, field: &str, ascending: bool) -> Self {
        self.sort.push(SortField {
            field_name: field.to_string(),
            order: if ascending { "asc" } else { "desc" }.to_string(),
        });
        self
    }

    /// Run the query, returning at most `limit` records (default and maximum `SEARCH_LIMIT`)
    pub async fn search(self, limit: Option<usize>) -> DlhubResult<Vec<Value>> {
        let (results, _) = self.search_with_info(limit).await?;
        Ok(results)
    }

    /// Run the query and report how many records matched in total
    pub async fn search_with_info(
        self,
        limit: Option<usize>,
    ) -> DlhubResult<(Vec<Value>, SearchInfo)> {
        let limit = limit.unwrap_or(SEARCH_LIMIT);
        if limit > SEARCH_LIMIT {
            return Err(DlhubError::InvalidArgument(format!(
                "Limit {} exceeds the maximum of {} results per search",
                limit, SEARCH_LIMIT
            )));
        }
        if self.terms.is_empty() {
            return Err(DlhubError::InvalidArgument(
                "No query terms have been added".to_string(),
            ));
        }

        let request = SearchRequest {
            q: self.query(),
            advanced: true,
            limit,
            offset: 0,
            sort: self.sort,
        };

        let response = self.backend.search(&request).await?;
        tracing::debug!(
            query = %request.q,
            returned = response.results.len(),
            total = response.total,
            "Search completed"
        );

        let info = SearchInfo {
            total_query_matches: response.total,
            query: request.q,
            limit,
        };
        Ok((response.results, info))
    }

    fn match_any_of(mut self, field: &str, values: &[&str], match_all: bool) -> Self {
        let joiner = if match_all { " AND " } else { " OR " };
        let group = values
            .iter()
            .map(|v| format!("{}:{}", field, quote(v)))
            .collect::<Vec<_>>()
            .join(joiner);
        self.terms.push(format!("({})", group));
        self
    }
}

/// Quote a value for an advanced query, escaping embedded quotes
fn quote(value: &str) -> String {
    if value == "*" {
        return value.to_string();
    }
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::backend::SearchResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingBackend {
        requests: Mutex<Vec<SearchRequest>>,
        response: SearchResponse,
    }

    #[async_trait]
    impl SearchBackend for RecordingBackend {
        async fn search(&self, request: &SearchRequest) -> DlhubResult<SearchResponse> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(self.response.clone())
        }
    }

    fn helper() -> (Arc<RecordingBackend>, SearchHelper) {
        let backend = Arc::new(RecordingBackend {
            requests: Mutex::new(Vec::new()),
            response: SearchResponse {
                results: vec![json!({"dlhub": {"name": "a"}})],
                total: 42,
            },
        });
        let helper = SearchHelper::new(backend.clone());
        (backend, helper)
    }

    #[test]
    fn test_query_composition() {
        let (_, helper) = helper();
        let helper = helper
            .match_field("dlhub.type", "servable")
            .match_owner("ward")
            .match_authors(&["Ward, Logan", "Chard, Ryan"], false)
            .unwrap()
            .match_years(Some(2018), None)
            .unwrap();

        assert_eq!(
            helper.query(),
            "dlhub.type:\"servable\" AND dlhub.owner:\"ward\" AND \
             (datacite.creators.creatorName:\"Ward, Logan\" OR datacite.creators.creatorName:\"Chard, Ryan\") AND \
             datacite.publicationYear:[2018 TO *]"
        );
    }

    #[test]
    fn test_match_servable_requires_an_argument() {
        let (_, helper) = helper();
        assert!(matches!(
            helper.clone().match_servable(None, None, None),
            Err(DlhubError::InvalidArgument(_))
        ));
        assert!(matches!(
            helper.clone().match_servable(Some(""), Some("  "), Some("")),
            Err(DlhubError::InvalidArgument(_))
        ));

        let helper = helper.match_servable(Some(""), Some("ward"), None).unwrap();
        assert_eq!(helper.query(), "dlhub.owner:\"ward\"");
    }

    #[test]
    fn test_match_authors_requires_an_author() {
        let (_, helper) = helper();
        assert!(helper.clone().match_authors(&[], true).is_err());
        assert!(matches!(
            helper.clone().match_authors(&[""], true),
            Err(DlhubError::InvalidArgument(_))
        ));
        assert!(helper.match_authors(&["Ward, Logan", " "], false).is_err());
    }

    #[test]
    fn test_match_years_rejects_inverted_range() {
        let (_, helper) = helper();
        assert!(helper.clone().match_years(Some(2020), Some(2019)).is_err());
        assert!(helper.match_years(None, None).is_err());
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(quote("*"), "*");
    }

    #[tokio::test]
    async fn test_search_request_shape() {
        let (backend, helper) = helper();
        let (results, info) = helper
            .match_servable(Some("sqrt"), Some("ward"), None)
            .unwrap()
            .add_sort("dlhub.publication_date", false)
            .search_with_info(Some(5))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(info.total_query_matches, 42);
        assert_eq!(info.limit, 5);

        let requests = backend.requests.lock().unwrap();
        let request = &requests[0];
        assert!(request.advanced);
        assert_eq!(request.limit, 5);
        assert_eq!(request.q, "dlhub.name:\"sqrt\" AND dlhub.owner:\"ward\"");
        assert_eq!(
            request.sort,
            vec![SortField {
                field_name: "dlhub.publication_date".to_string(),
                order: "desc".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_limit_above_maximum_rejected() {
        let (backend, helper) = helper();
        let result = helper
            .match_doi("10.1234/abc")
            .search(Some(SEARCH_LIMIT + 1))
            .await;
        assert!(matches!(result, Err(DlhubError::InvalidArgument(_))));
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let (_, helper) = helper();
        assert!(helper.search(None).await.is_err());
    }
}
