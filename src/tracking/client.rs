//! Thin typed client for the experiment-tracking GraphQL API.
//!
//! Only the two read operations this job consumes are implemented: resolving
//! the active session and listing a project's runs. The wire protocol itself
//! stays inside the service.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, trace, warn};
use url::Url;

use super::run::{FieldMap, Run, RunState};
use crate::config::{CONNECT_TIMEOUT, REQUEST_TIMEOUT};
use crate::error::TrackingError;

const DEFAULT_BASE_URL: &str = "https://api.wandb.ai/";
const GRAPHQL_PATH: &str = "graphql";
const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Username half of the basic-auth pair; the API key is the password.
const API_BASIC_USER: &str = "api";

/// Page size for the paginated run listing
const RUNS_PAGE_SIZE: usize = 200;

const VIEWER_QUERY: &str = r#"
query Viewer {
    viewer { entity username }
}"#;

const RUNS_QUERY: &str = r#"
query ProjectRuns($entity: String!, $project: String!, $first: Int!, $cursor: String) {
    project(entityName: $entity, name: $project) {
        runs(first: $first, after: $cursor) {
            edges { node { name state user { username } config summaryMetrics } }
            pageInfo { endCursor hasNextPage }
        }
    }
}"#;

/// Identity of the currently active tracking session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Team/entity uploads default to
    pub entity: String,
    pub username: String,
}

/// Read-side operations this job consumes from the tracking service.
#[async_trait]
pub trait TrackingClient: Send + Sync {
    /// Resolve the active session, failing when none is available.
    async fn active_session(&self) -> Result<SessionInfo, TrackingError>;

    /// List every run of the project, paginating through the full set.
    async fn list_runs(&self, team: &str, project: &str) -> Result<Vec<Run>, TrackingError>;
}

/// Live client backed by the tracking service's GraphQL endpoint.
pub struct HttpTrackingClient {
    base_url: Url,
    api_key: Option<String>,
    inner: reqwest::Client,
}

impl HttpTrackingClient {
    pub fn new(api_key: Option<String>) -> Result<Self, TrackingError> {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: Option<String>) -> Result<Self, TrackingError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TrackingError::Malformed(format!("invalid base url: {e}")))?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let inner = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .default_headers(default_headers)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url,
            api_key,
            inner,
        })
    }

    async fn execute<V, R>(&self, query: &str, variables: &V) -> Result<R, TrackingError>
    where
        V: Serialize,
        R: DeserializeOwned,
    {
        let url = self
            .base_url
            .join(GRAPHQL_PATH)
            .map_err(|e| TrackingError::Malformed(format!("invalid graphql url: {e}")))?;

        let mut req = self.inner.post(url).json(&GraphQlRequest { query, variables });
        if let Some(key) = &self.api_key {
            req = req.basic_auth(API_BASIC_USER, Some(key));
        }

        let res = req.send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(TrackingError::Status { status, body });
        }

        let body = res.text().await?;
        trace!(%body, "tracking response");

        let parsed: GraphQlResponse<R> =
            serde_json::from_str(&body).map_err(|e| TrackingError::Malformed(e.to_string()))?;

        if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(TrackingError::Api(messages.join("; ")));
        }

        parsed
            .data
            .ok_or_else(|| TrackingError::Malformed("response missing data".to_string()))
    }
}

#[async_trait]
impl TrackingClient for HttpTrackingClient {
    async fn active_session(&self) -> Result<SessionInfo, TrackingError> {
        let data: ViewerData = self.execute(VIEWER_QUERY, &serde_json::json!({})).await?;

        let viewer = data
            .viewer
            .ok_or_else(|| TrackingError::Api("no active session".to_string()))?;

        let username = viewer.username.unwrap_or_default();
        let entity = viewer
            .entity
            .filter(|e| !e.is_empty())
            .or_else(|| (!username.is_empty()).then(|| username.clone()))
            .ok_or_else(|| TrackingError::Api("session has no resolvable entity".to_string()))?;

        Ok(SessionInfo { entity, username })
    }

    async fn list_runs(&self, team: &str, project: &str) -> Result<Vec<Run>, TrackingError> {
        let mut runs = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let variables = RunsVariables {
                entity: team,
                project,
                first: RUNS_PAGE_SIZE,
                cursor: cursor.as_deref(),
            };
            let data: RunsData = self.execute(RUNS_QUERY, &variables).await?;

            let project_node = data
                .project
                .ok_or_else(|| TrackingError::Api(format!("project {team}/{project} not found")))?;

            let page = project_node.runs;
            runs.extend(page.edges.into_iter().map(|e| e.node.into_run()));

            match (page.page_info.has_next_page, page.page_info.end_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        debug!(team, project, count = runs.len(), "listed runs");
        Ok(runs)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct GraphQlRequest<'a, V> {
    query: &'a str,
    variables: &'a V,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct ViewerData {
    viewer: Option<ViewerNode>,
}

#[derive(Deserialize)]
struct ViewerNode {
    entity: Option<String>,
    username: Option<String>,
}

#[derive(Serialize)]
struct RunsVariables<'a> {
    entity: &'a str,
    project: &'a str,
    first: usize,
    cursor: Option<&'a str>,
}

#[derive(Deserialize)]
struct RunsData {
    project: Option<ProjectNode>,
}

#[derive(Deserialize)]
struct ProjectNode {
    runs: RunConnection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunConnection {
    #[serde(default)]
    edges: Vec<RunEdge>,
    page_info: PageInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    end_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Deserialize)]
struct RunEdge {
    node: RunNode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunNode {
    name: String,
    state: String,
    user: Option<UserNode>,
    config: Option<String>,
    summary_metrics: Option<String>,
}

#[derive(Deserialize)]
struct UserNode {
    username: Option<String>,
}

impl RunNode {
    fn into_run(self) -> Run {
        let config = parse_field_payload(&self.name, "config", self.config.as_deref());
        let summary = parse_field_payload(&self.name, "summary", self.summary_metrics.as_deref());
        Run {
            id: self.name,
            state: RunState::parse(&self.state),
            user: self.user.and_then(|u| u.username).unwrap_or_default(),
            config,
            summary,
        }
    }
}

/// Parse a JSON-encoded config/summary payload. A malformed payload degrades
/// to an empty map so a single bad run cannot abort the listing.
fn parse_field_payload(run_id: &str, kind: &str, raw: Option<&str>) -> FieldMap {
    let Some(raw) = raw else {
        return FieldMap::new();
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => FieldMap::from_json(&value),
        Err(e) => {
            warn!(run_id, kind, error = %e, "unparseable run payload, treating as empty");
            FieldMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::tracking::run::FieldValue;

    use super::*;

    #[test]
    fn test_run_node_conversion() {
        let node = RunNode {
            name: "abc123".to_string(),
            state: "finished".to_string(),
            user: Some(UserNode {
                username: Some("alice-ml".to_string()),
            }),
            config: Some(r#"{"lr": 0.01, "optimizer": "adam"}"#.to_string()),
            summary_metrics: Some(r#"{"acc": 0.93, "_timestamp": 1717200000}"#.to_string()),
        };

        let run = node.into_run();
        assert_eq!(run.id, "abc123");
        assert!(run.state.is_finished());
        assert_eq!(run.user, "alice-ml");
        assert_eq!(run.config.get("lr").unwrap(), FieldValue::Num(0.01));
        assert_eq!(
            run.summary.get("_timestamp").unwrap(),
            FieldValue::Num(1_717_200_000.0)
        );
    }

    #[test]
    fn test_malformed_payload_degrades_to_empty() {
        let node = RunNode {
            name: "bad1".to_string(),
            state: "finished".to_string(),
            user: None,
            config: Some("{broken".to_string()),
            summary_metrics: None,
        };

        let run = node.into_run();
        assert!(run.config.is_empty());
        assert!(run.summary.is_empty());
        assert_eq!(run.user, "");
    }

    #[test]
    fn test_graphql_response_parsing() {
        let body = r#"{
            "data": {
                "project": {
                    "runs": {
                        "edges": [
                            {"node": {"name": "r1", "state": "finished",
                                      "user": {"username": "bob"},
                                      "config": "{}", "summaryMetrics": "{}"}}
                        ],
                        "pageInfo": {"endCursor": "c1", "hasNextPage": false}
                    }
                }
            }
        }"#;

        let parsed: GraphQlResponse<RunsData> = serde_json::from_str(body).unwrap();
        let project = parsed.data.unwrap().project.unwrap();
        assert_eq!(project.runs.edges.len(), 1);
        assert!(!project.runs.page_info.has_next_page);
    }

    #[test]
    fn test_graphql_errors_parsing() {
        let body = r#"{"data": null, "errors": [{"message": "permission denied"}]}"#;
        let parsed: GraphQlResponse<RunsData> = serde_json::from_str(body).unwrap();
        assert!(parsed.data.is_none());
        assert_eq!(parsed.errors.unwrap()[0].message, "permission denied");
    }
}
