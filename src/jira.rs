use std::sync::Arc;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::Value;

use crate::adf::DocNode;
use crate::logging;
use crate::metrics::Metrics;

/// Fields requested for every issue page. `customfield_10016` is the default
/// story-points field on team-managed projects.
const ISSUE_FIELDS: &str =
    "summary,status,issuetype,parent,assignee,priority,timespent,timeestimate,customfield_10016";

/// Flat, normalized issue shape consumed by the tree builder and renderers.
/// `parent` is a weak reference: the key may or may not resolve within any
/// given batch.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRecord {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub issue_type: String,
    pub parent: Option<String>,
    pub assignee: Option<String>,
    pub priority: Option<String>,
    pub time_spent: Option<u64>,
    pub time_estimate: Option<u64>,
    pub story_points: Option<f64>,
}

impl IssueRecord {
    /// Normalizes one raw API record. Returns `None` when the record has no
    /// key; callers skip such records rather than failing the page.
    pub fn from_raw(raw: RawIssue) -> Option<Self> {
        let key = raw.key?;
        let fields = raw.fields.unwrap_or_default();

        Some(Self {
            key,
            summary: fields.summary.unwrap_or_default(),
            status: fields
                .status
                .and_then(|s| s.name)
                .unwrap_or_else(|| "Unknown".to_string()),
            issue_type: fields
                .issuetype
                .and_then(|t| t.name)
                .unwrap_or_else(|| "Task".to_string()),
            parent: fields.parent.and_then(|p| p.key),
            assignee: fields.assignee.and_then(|a| a.display_name),
            priority: fields.priority.and_then(|p| p.name),
            time_spent: fields.timespent,
            time_estimate: fields.timeestimate,
            story_points: fields.story_points,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Identity {
    pub account_id: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IssueComment {
    pub author_display_name: Option<String>,
    pub body: Value,
    pub created: Option<String>,
}

/// Full issue payload for the detail view: the normalized record plus the
/// raw structured description and comment bodies.
#[derive(Debug, Clone)]
pub struct IssueDetail {
    pub record: IssueRecord,
    pub description: Value,
    pub comments: Vec<IssueComment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Board {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sprint {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

/// One offset-paged slice of a sprint's issues.
#[derive(Debug, Deserialize)]
pub struct SprintIssuesPage {
    #[serde(default)]
    pub issues: Vec<RawIssue>,
    #[serde(default)]
    pub total: usize,
}

/// One token-paged slice of a search result.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub issues: Vec<RawIssue>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub is_last: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum JiraError {
    #[error("jira request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("jira returned HTTP {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to decode jira response: {source}; body: {body}")]
    Decode {
        source: serde_json::Error,
        body: String,
    },
    #[error("invalid jira base url '{0}'")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone)]
pub struct JiraClient {
    pub base_url: String,
    email: String,
    api_token: String,
    http: Client,
    max_retries: usize,
    metrics: Arc<Metrics>,
}

impl JiraClient {
    pub fn new(base_url: String, email: String, api_token: String) -> Result<Self, JiraError> {
        Self::new_with_metrics(base_url, email, api_token, Arc::new(Metrics::new()))
    }

    pub fn new_with_metrics(
        base_url: String,
        email: String,
        api_token: String,
        metrics: Arc<Metrics>,
    ) -> Result<Self, JiraError> {
        let http = Client::builder().build()?;
        let normalized_base_url = normalize_base_url(&base_url)?;
        Ok(Self {
            base_url: normalized_base_url,
            email,
            api_token,
            http,
            max_retries: 3,
            metrics,
        })
    }

    fn request_with_retry<F>(&self, mut send: F) -> Result<Response, JiraError>
    where
        F: FnMut() -> Result<Response, reqwest::Error>,
    {
        for attempt in 0..=self.max_retries {
            self.metrics.inc_api_request();
            let response = match send() {
                Ok(resp) => resp,
                Err(err) => {
                    logging::warn(format!(
                        "jira transport error on attempt {}: {}",
                        attempt + 1,
                        err
                    ));
                    return Err(JiraError::Request(err));
                }
            };

            if !is_retryable(response.status()) || attempt == self.max_retries {
                if !response.status().is_success() {
                    logging::warn(format!(
                        "jira request completed with status {} after {} attempt(s)",
                        response.status(),
                        attempt + 1
                    ));
                }
                return Ok(response);
            }

            let wait = retry_after_or_backoff(&response, attempt);
            logging::debug(format!(
                "jira retryable status {} attempt {} waiting {:?}",
                response.status(),
                attempt + 1,
                wait
            ));
            self.metrics.inc_retry();
            thread::sleep(wait);
        }

        unreachable!("retry loop should always return");
    }

    fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, JiraError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(JiraError::Http { status, body });
        }

        let body = response.text()?;
        serde_json::from_str(&body).map_err(|source| {
            let short_body = if body.len() > 1000 {
                // Cut must land on a char boundary or the slice panics on
                // multi-byte bodies.
                let mut cut = 1000;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                format!("{}...", &body[..cut])
            } else {
                body
            };
            JiraError::Decode {
                source,
                body: short_body,
            }
        })
    }

    pub fn get_myself(&self) -> Result<Identity, JiraError> {
        let url = format!("{}/rest/api/3/myself", self.base_url);
        let response = self.request_with_retry(|| {
            self.http
                .get(&url)
                .basic_auth(&self.email, Some(&self.api_token))
                .send()
        })?;

        let payload: MyselfResponse = Self::decode(response)?;
        Ok(Identity {
            account_id: payload.account_id,
            display_name: payload.display_name,
        })
    }

    pub fn get_boards(&self, project: &str) -> Result<Vec<Board>, JiraError> {
        let url = format!("{}/rest/agile/1.0/board", self.base_url);
        let response = self.request_with_retry(|| {
            self.http
                .get(&url)
                .basic_auth(&self.email, Some(&self.api_token))
                .query(&[("projectKeyOrId", project), ("maxResults", "50")])
                .send()
        })?;

        let payload: ValuesEnvelope<Board> = Self::decode(response)?;
        Ok(payload.values)
    }

    pub fn get_active_sprints(&self, board_id: u64) -> Result<Vec<Sprint>, JiraError> {
        let url = format!("{}/rest/agile/1.0/board/{}/sprint", self.base_url, board_id);
        let response = self.request_with_retry(|| {
            self.http
                .get(&url)
                .basic_auth(&self.email, Some(&self.api_token))
                .query(&[("state", "active")])
                .send()
        })?;

        let payload: ValuesEnvelope<Sprint> = Self::decode(response)?;
        Ok(payload.values)
    }

    pub fn get_sprint_issues(
        &self,
        sprint_id: u64,
        start_at: usize,
        max_results: usize,
    ) -> Result<SprintIssuesPage, JiraError> {
        let url = format!(
            "{}/rest/agile/1.0/sprint/{}/issue",
            self.base_url, sprint_id
        );
        let response = self.request_with_retry(|| {
            self.http
                .get(&url)
                .basic_auth(&self.email, Some(&self.api_token))
                .query(&[
                    ("startAt", start_at.to_string()),
                    ("maxResults", max_results.to_string()),
                    ("fields", ISSUE_FIELDS.to_string()),
                ])
                .send()
        })?;

        Self::decode(response)
    }

    pub fn search_issues(
        &self,
        jql: &str,
        page_token: Option<&str>,
        max_results: usize,
    ) -> Result<SearchPage, JiraError> {
        let url = format!("{}/rest/api/3/search/jql", self.base_url);
        let response = self.request_with_retry(|| {
            let mut query = vec![
                ("jql", jql.to_string()),
                ("fields", ISSUE_FIELDS.to_string()),
                ("maxResults", max_results.to_string()),
            ];
            if let Some(token) = page_token {
                query.push(("nextPageToken", token.to_string()));
            }

            self.http
                .get(&url)
                .basic_auth(&self.email, Some(&self.api_token))
                .query(&query)
                .send()
        })?;

        Self::decode(response)
    }

    pub fn get_issue(&self, issue_key: &str) -> Result<IssueDetail, JiraError> {
        let url = format!("{}/rest/api/3/issue/{}", self.base_url, issue_key);
        let fields = format!("{ISSUE_FIELDS},description,comment");
        let response = self.request_with_retry(|| {
            self.http
                .get(&url)
                .basic_auth(&self.email, Some(&self.api_token))
                .query(&[("fields", fields.as_str())])
                .send()
        })?;

        let raw: RawIssue = Self::decode(response)?;
        let description = raw
            .fields
            .as_ref()
            .and_then(|f| f.description.clone())
            .unwrap_or(Value::Null);
        let comments = raw
            .fields
            .as_ref()
            .and_then(|f| f.comment.as_ref())
            .map(|container| {
                container
                    .comments
                    .iter()
                    .map(|comment| IssueComment {
                        author_display_name: comment
                            .author
                            .as_ref()
                            .and_then(|a| a.display_name.clone()),
                        body: comment.body.clone(),
                        created: comment.created.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let record = IssueRecord::from_raw(raw).ok_or_else(|| JiraError::Decode {
            source: serde::de::Error::custom("issue payload missing key"),
            body: issue_key.to_string(),
        })?;

        Ok(IssueDetail {
            record,
            description,
            comments,
        })
    }

    /// Submits an edited comment body, already converted back to its
    /// structured form.
    pub fn add_comment(&self, issue_key: &str, body: &DocNode) -> Result<(), JiraError> {
        let url = format!("{}/rest/api/3/issue/{}/comment", self.base_url, issue_key);
        let payload = serde_json::json!({ "body": body });
        let response = self.request_with_retry(|| {
            self.http
                .post(&url)
                .basic_auth(&self.email, Some(&self.api_token))
                .json(&payload)
                .send()
        })?;

        Self::check_status(response)
    }

    pub fn update_description(&self, issue_key: &str, body: &DocNode) -> Result<(), JiraError> {
        let url = format!("{}/rest/api/3/issue/{}", self.base_url, issue_key);
        let payload = serde_json::json!({ "fields": { "description": body } });
        let response = self.request_with_retry(|| {
            self.http
                .put(&url)
                .basic_auth(&self.email, Some(&self.api_token))
                .json(&payload)
                .send()
        })?;

        Self::check_status(response)
    }

    fn check_status(response: Response) -> Result<(), JiraError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(JiraError::Http { status, body });
        }
        Ok(())
    }
}

fn normalize_base_url(raw: &str) -> Result<String, JiraError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(JiraError::InvalidBaseUrl(raw.to_string()));
    }

    let mut candidate = trimmed.to_string();

    if candidate.starts_with("https//") {
        candidate = format!("https://{}", candidate.trim_start_matches("https//"));
    } else if candidate.starts_with("http//") {
        candidate = format!("http://{}", candidate.trim_start_matches("http//"));
    } else if !candidate.starts_with("https://") && !candidate.starts_with("http://") {
        candidate = format!("https://{candidate}");
    }

    let parsed =
        reqwest::Url::parse(&candidate).map_err(|_| JiraError::InvalidBaseUrl(raw.to_string()))?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_after_or_backoff(response: &Response, attempt: usize) -> Duration {
    if let Some(header) = response.headers().get("Retry-After") {
        if let Ok(value) = header.to_str() {
            if let Ok(seconds) = value.parse::<u64>() {
                return Duration::from_secs(seconds.min(30));
            }
        }
    }

    let seconds = 1_u64 << attempt.min(4);
    Duration::from_secs(seconds)
}

// Raw wire shapes. Every nested field is optional so a JSON null decodes to
// None instead of failing the page.

#[derive(Debug, Default, Deserialize)]
pub struct RawIssue {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub fields: Option<RawFields>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawFields {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub status: Option<NamedObj>,
    #[serde(default)]
    pub issuetype: Option<NamedObj>,
    #[serde(default)]
    pub parent: Option<ParentObj>,
    #[serde(default)]
    pub assignee: Option<UserObj>,
    #[serde(default)]
    pub priority: Option<NamedObj>,
    #[serde(default)]
    pub timespent: Option<u64>,
    #[serde(default)]
    pub timeestimate: Option<u64>,
    #[serde(rename = "customfield_10016", default)]
    pub story_points: Option<f64>,
    #[serde(default)]
    pub description: Option<Value>,
    #[serde(default)]
    pub comment: Option<RawCommentContainer>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NamedObj {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ParentObj {
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserObj {
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawCommentContainer {
    #[serde(default)]
    pub comments: Vec<RawComment>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawComment {
    #[serde(default)]
    pub author: Option<UserObj>,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub created: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValuesEnvelope<T> {
    #[serde(default = "Vec::new")]
    values: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyselfResponse {
    account_id: Option<String>,
    display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;

    #[test]
    fn normalizes_common_base_url_typos() {
        let a = normalize_base_url("https//example.atlassian.net").expect("normalize");
        assert_eq!(a, "https://example.atlassian.net");

        let b = normalize_base_url("example.atlassian.net/").expect("normalize");
        assert_eq!(b, "https://example.atlassian.net");

        normalize_base_url("  ").expect_err("blank base url should fail");
    }

    #[test]
    fn decodes_boards_and_sprints() {
        let server = MockServer::start();

        let _boards = server.mock(|when, then| {
            when.method(GET)
                .path("/rest/agile/1.0/board")
                .query_param("projectKeyOrId", "PROJ");
            then.status(200).json_body_obj(&serde_json::json!({
                "values": [{"id": 7, "name": "PROJ board"}]
            }));
        });

        let _sprints = server.mock(|when, then| {
            when.method(GET)
                .path("/rest/agile/1.0/board/7/sprint")
                .query_param("state", "active");
            then.status(200).json_body_obj(&serde_json::json!({
                "values": [{"id": 31, "name": "Sprint 4", "state": "active"}]
            }));
        });

        let client = JiraClient::new(server.base_url(), "e".into(), "t".into()).expect("client");
        let boards = client.get_boards("PROJ").expect("boards");
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].id, 7);

        let sprints = client.get_active_sprints(7).expect("sprints");
        assert_eq!(sprints[0].id, 31);
    }

    #[test]
    fn surfaces_http_failures_with_body() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(GET).path("/rest/agile/1.0/board");
            then.status(404).body("no such project");
        });

        let client = JiraClient::new(server.base_url(), "e".into(), "t".into()).expect("client");
        let err = client.get_boards("NOPE").expect_err("should fail");
        match err {
            JiraError::Http { status, body } => {
                assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
                assert_eq!(body, "no such project");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn truncates_undecodable_multibyte_bodies_without_panicking() {
        let server = MockServer::start();
        // Invalid JSON sized so the 1000-byte cut lands inside a three-byte
        // character.
        let body = format!("{}日本語テスト", "x".repeat(999));
        let _mock = server.mock(|when, then| {
            when.method(GET).path("/rest/agile/1.0/board");
            then.status(200).body(&body);
        });

        let client = JiraClient::new(server.base_url(), "e".into(), "t".into()).expect("client");
        let err = client.get_boards("PROJ").expect_err("undecodable body");
        match err {
            JiraError::Decode { body, .. } => {
                assert!(body.ends_with("..."));
                assert!(body.len() <= 1003);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn retries_on_429_then_succeeds() {
        use tiny_http::{Header, Response, Server, StatusCode};

        let server = Server::http("127.0.0.1:0").expect("server start");
        let addr = format!("http://{}", server.server_addr());
        std::thread::spawn(move || {
            let mut requests = server.incoming_requests();

            if let Some(req) = requests.next() {
                let response = Response::empty(StatusCode(429))
                    .with_header(Header::from_bytes("Retry-After", "0").expect("header"));
                let _ = req.respond(response);
            }

            if let Some(req) = requests.next() {
                let body = serde_json::json!({"values": [{"id": 1}]}).to_string();
                let response = Response::from_string(body)
                    .with_status_code(StatusCode(200))
                    .with_header(
                        Header::from_bytes("Content-Type", "application/json").expect("header"),
                    );
                let _ = req.respond(response);
            }
        });

        let client = JiraClient::new(addr, "e".into(), "t".into()).expect("client");
        let boards = client.get_boards("PROJ").expect("eventually succeeds");
        assert_eq!(boards[0].id, 1);
    }

    #[test]
    fn normalizes_missing_nested_fields() {
        let raw: RawIssue = serde_json::from_value(serde_json::json!({
            "key": "PROJ-9",
            "fields": {
                "summary": "Fix it",
                "status": null,
                "issuetype": null,
                "assignee": null,
                "priority": null
            }
        }))
        .expect("decode");

        let record = IssueRecord::from_raw(raw).expect("has key");
        assert_eq!(record.status, "Unknown");
        assert_eq!(record.issue_type, "Task");
        assert_eq!(record.assignee, None);
        assert_eq!(record.priority, None);
        assert_eq!(record.parent, None);
    }

    #[test]
    fn keyless_record_is_rejected_not_fatal() {
        let raw: RawIssue =
            serde_json::from_value(serde_json::json!({"fields": {"summary": "x"}}))
                .expect("decode");
        assert!(IssueRecord::from_raw(raw).is_none());
    }

    #[test]
    fn submits_structured_bodies_on_the_write_path() {
        use crate::adf::{DocNode, Mark};
        use httpmock::Method::{POST, PUT};

        let server = MockServer::start();
        let comment = server.mock(|when, then| {
            when.method(POST)
                .path("/rest/api/3/issue/PROJ-5/comment")
                .json_body_partial(r#"{"body": {"type": "doc"}}"#);
            then.status(201);
        });
        let description = server.mock(|when, then| {
            when.method(PUT).path("/rest/api/3/issue/PROJ-5");
            then.status(204);
        });

        let doc = DocNode::doc(vec![DocNode::paragraph(vec![DocNode::marked_text(
            "done",
            vec![Mark::strong()],
        )])]);

        let client = JiraClient::new(server.base_url(), "e".into(), "t".into()).expect("client");
        client.add_comment("PROJ-5", &doc).expect("comment posted");
        client
            .update_description("PROJ-5", &doc)
            .expect("description updated");

        assert_eq!(comment.hits(), 1);
        assert_eq!(description.hits(), 1);
    }

    #[test]
    fn issue_detail_carries_description_and_comments() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(GET).path("/rest/api/3/issue/PROJ-3");
            then.status(200).json_body_obj(&serde_json::json!({
                "key": "PROJ-3",
                "fields": {
                    "summary": "S",
                    "status": {"name": "In Progress"},
                    "description": {"type": "doc", "content": []},
                    "comment": {"comments": [
                        {"author": {"displayName": "Ada"},
                         "body": {"type": "doc", "content": []},
                         "created": "2026-08-01T00:00:00.000+0000"}
                    ]}
                }
            }));
        });

        let client = JiraClient::new(server.base_url(), "e".into(), "t".into()).expect("client");
        let detail = client.get_issue("PROJ-3").expect("detail");
        assert_eq!(detail.record.key, "PROJ-3");
        assert_eq!(detail.record.status, "In Progress");
        assert!(!detail.description.is_null());
        assert_eq!(detail.comments.len(), 1);
        assert_eq!(detail.comments[0].author_display_name.as_deref(), Some("Ada"));
    }
}
