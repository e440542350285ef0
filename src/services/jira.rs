// src/services/jira.rs

//! Jira REST (v2) adapter for [`TicketService`].
//!
//! Endpoints used:
//! - `POST /rest/api/2/issue` (create)
//! - `GET  /rest/api/2/search` (JQL listing, paged)
//! - `GET  /rest/api/2/issue/{key}` (view)
//! - `PUT  /rest/api/2/issue/{key}` (edit description)
//! - `POST /rest/api/2/issue/{key}/comment`
//!
//! Every call carries its own timeout so a hung tracker cannot stall a run.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{HttpConfig, JiraConfig, NewTicket, TicketId, TicketQuery};
use crate::services::TicketService;
use crate::utils::http::{check_status, classify_send_error, create_client};

/// Page size for search requests.
const SEARCH_PAGE_SIZE: usize = 50;

/// Jira Cloud / Server REST client.
#[derive(Debug, Clone)]
pub struct JiraClient {
    client: Client,
    base_url: String,
    email: String,
    token: String,
    project: String,
    issue_type: String,
    write_timeout: Duration,
    search_timeout: Duration,
    view_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    key: String,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    issues: Vec<IssueKey>,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
struct IssueKey {
    key: String,
}

#[derive(Debug, Deserialize)]
struct Issue {
    fields: IssueFields,
}

#[derive(Debug, Deserialize)]
struct IssueFields {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl JiraClient {
    /// Build a client from configuration. `token` is the resolved API token.
    pub fn new(jira: &JiraConfig, http: &HttpConfig, token: impl Into<String>) -> Result<Self> {
        if jira.base_url.trim().is_empty() {
            return Err(AppError::config("jira.base_url is not set"));
        }
        if jira.email.trim().is_empty() {
            return Err(AppError::config("jira.email is not set"));
        }

        Ok(Self {
            client: create_client(http)?,
            base_url: jira.base_url.trim_end_matches('/').to_string(),
            email: jira.email.clone(),
            token: token.into(),
            project: jira.project.clone(),
            issue_type: jira.issue_type.clone(),
            write_timeout: Duration::from_secs(http.timeout_secs),
            search_timeout: Duration::from_secs(http.search_timeout_secs),
            view_timeout: Duration::from_secs(http.view_timeout_secs),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/rest/api/2/{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder, timeout: Duration) -> RequestBuilder {
        request
            .basic_auth(&self.email, Some(&self.token))
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(timeout)
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| classify_send_error(operation, e))?;
        check_status(operation, response).await
    }

    /// JQL for a ticket query.
    ///
    /// Jira reads JQL dates in the user's timezone; the cutoff is a whole day.
    fn jql(query: &TicketQuery) -> String {
        let mut jql = format!("project = {}", jql_string(&query.project));
        if let Some(label) = &query.label {
            jql.push_str(&format!(" AND labels = {}", jql_string(label)));
        }
        jql.push_str(&format!(
            " AND created >= \"{}\" ORDER BY created DESC",
            query.created_after.format("%Y-%m-%d")
        ));
        jql
    }
}

/// Quote a JQL string literal.
fn jql_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[async_trait]
impl TicketService for JiraClient {
    async fn create(&self, ticket: &NewTicket) -> Result<TicketId> {
        let payload = json!({
            "fields": {
                "project": { "key": self.project },
                "summary": ticket.title,
                "description": ticket.body,
                "issuetype": { "name": self.issue_type },
                "labels": ticket.labels,
            }
        });

        let request = self.authed(
            self.client.post(self.endpoint("issue")).json(&payload),
            self.write_timeout,
        );
        let response = self.send("create", request).await?;
        let created: CreatedIssue = response.json().await?;

        log::debug!("Jira created {}", created.key);
        Ok(TicketId::new(created.key))
    }

    async fn search(&self, query: &TicketQuery) -> Result<Vec<TicketId>> {
        let jql = Self::jql(query);
        let mut keys = Vec::new();
        let mut start_at = 0;

        let page_size = SEARCH_PAGE_SIZE.to_string();

        loop {
            let offset = start_at.to_string();
            let request = self.authed(
                self.client.get(self.endpoint("search")).query(&[
                    ("jql", jql.as_str()),
                    ("fields", "key"),
                    ("startAt", offset.as_str()),
                    ("maxResults", page_size.as_str()),
                ]),
                self.search_timeout,
            );
            let page: SearchPage = self.send("search", request).await?.json().await?;

            let fetched = page.issues.len();
            keys.extend(page.issues.into_iter().map(|i| TicketId::new(i.key)));
            start_at += fetched;

            if fetched == 0 || start_at >= page.total {
                break;
            }
        }

        log::debug!("Jira search returned {} tickets", keys.len());
        Ok(keys)
    }

    async fn view(&self, id: &TicketId) -> Result<String> {
        let request = self.authed(
            self.client
                .get(self.endpoint(&format!("issue/{id}")))
                .query(&[("fields", "summary,description")]),
            self.view_timeout,
        );
        let issue: Issue = self.send("view", request).await?.json().await?;

        Ok(format!(
            "{}\n\n{}",
            issue.fields.summary.unwrap_or_default(),
            issue.fields.description.unwrap_or_default()
        ))
    }

    async fn edit(&self, id: &TicketId, body: &str) -> Result<()> {
        let payload = json!({ "fields": { "description": body } });
        let request = self.authed(
            self.client
                .put(self.endpoint(&format!("issue/{id}")))
                .json(&payload),
            self.write_timeout,
        );
        self.send("edit", request).await?;
        Ok(())
    }

    async fn comment(&self, id: &TicketId, text: &str) -> Result<()> {
        let payload = json!({ "body": text });
        let request = self.authed(
            self.client
                .post(self.endpoint(&format!("issue/{id}/comment")))
                .json(&payload),
            self.write_timeout,
        );
        self.send("comment", request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{body_partial_json, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> JiraClient {
        let jira = JiraConfig {
            base_url: server.uri(),
            email: "bot@example.com".to_string(),
            ..JiraConfig::default()
        };
        JiraClient::new(&jira, &HttpConfig::default(), "secret").unwrap()
    }

    fn new_ticket() -> NewTicket {
        NewTicket {
            title: "Optimizely Blog: Shipping Rust".to_string(),
            body: "**Article URL:** https://x.io/a".to_string(),
            labels: vec!["Optimizely".to_string()],
        }
    }

    #[test]
    fn test_new_requires_base_url() {
        let err = JiraClient::new(&JiraConfig::default(), &HttpConfig::default(), "t");
        assert!(matches!(err, Err(AppError::Config(_))));
    }

    #[test]
    fn test_jql() {
        let query = TicketQuery {
            project: "GAT".to_string(),
            label: Some("Optimizely".to_string()),
            created_after: Utc.with_ymd_and_hms(2026, 1, 1, 22, 30, 0).unwrap(),
        };
        assert_eq!(
            JiraClient::jql(&query),
            "project = \"GAT\" AND labels = \"Optimizely\" AND created >= \"2026-01-01\" ORDER BY created DESC"
        );
    }

    #[test]
    fn test_jql_escapes_quotes() {
        let query = TicketQuery {
            project: "GAT".to_string(),
            label: Some(r#"Say "hi" \ bye"#.to_string()),
            created_after: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        };
        let jql = JiraClient::jql(&query);
        assert!(jql.contains(r#"labels = "Say \"hi\" \\ bye""#));
    }

    #[tokio::test]
    async fn test_create_returns_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/api/2/issue"))
            .and(header_exists("authorization"))
            .and(body_partial_json(json!({
                "fields": { "project": { "key": "GAT" }, "labels": ["Optimizely"] }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "1", "key": "GAT-42"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client_for(&server).create(&new_ticket()).await.unwrap();
        assert_eq!(id, TicketId::new("GAT-42"));
    }

    #[tokio::test]
    async fn test_rate_limit_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/api/2/issue"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client_for(&server).create(&new_ticket()).await.unwrap_err();
        assert!(matches!(err, AppError::TransientRemote { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_bad_request_is_permanent() {
        let server = MockServer::start().await;
        let long_body = "x".repeat(2000);
        Mock::given(method("POST"))
            .and(path("/rest/api/2/issue"))
            .respond_with(ResponseTemplate::new(400).set_body_string(long_body))
            .mount(&server)
            .await;

        match client_for(&server).create(&new_ticket()).await {
            Err(AppError::PermanentRemote { status, body, .. }) => {
                assert_eq!(status, 400);
                assert_eq!(body.len(), 500);
            }
            other => panic!("expected permanent error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_search_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("startAt", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "startAt": 0, "total": 3,
                "issues": [{"key": "GAT-3"}, {"key": "GAT-2"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("startAt", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "startAt": 2, "total": 3,
                "issues": [{"key": "GAT-1"}]
            })))
            .mount(&server)
            .await;

        let query = TicketQuery {
            project: "GAT".to_string(),
            label: None,
            created_after: Utc::now(),
        };
        let keys = client_for(&server).search(&query).await.unwrap();
        assert_eq!(
            keys,
            vec![TicketId::new("GAT-3"), TicketId::new("GAT-2"), TicketId::new("GAT-1")]
        );
    }

    #[tokio::test]
    async fn test_view_joins_summary_and_description() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/issue/GAT-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "key": "GAT-7",
                "fields": { "summary": "Post", "description": "See https://x.io/a" }
            })))
            .mount(&server)
            .await;

        let text = client_for(&server).view(&TicketId::new("GAT-7")).await.unwrap();
        assert!(text.starts_with("Post"));
        assert!(text.contains("https://x.io/a"));
    }

    #[tokio::test]
    async fn test_view_null_description() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/issue/GAT-8"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "fields": { "summary": "Post", "description": null }
            })))
            .mount(&server)
            .await;

        let text = client_for(&server).view(&TicketId::new("GAT-8")).await.unwrap();
        assert_eq!(text.trim(), "Post");
    }

    #[tokio::test]
    async fn test_edit_and_comment() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/rest/api/2/issue/GAT-9"))
            .and(body_partial_json(json!({"fields": {"description": "new body"}})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/api/2/issue/GAT-9/comment"))
            .and(body_partial_json(json!({"body": "note"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "100"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let id = TicketId::new("GAT-9");
        client.edit(&id, "new body").await.unwrap();
        client.comment(&id, "note").await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_on_view_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/issue/GAT-1"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).view(&TicketId::new("GAT-1")).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
