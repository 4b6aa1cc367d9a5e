//! HTTP client for Linear's GraphQL API.

use crate::RetryPolicy;
use reqwest::header::AUTHORIZATION;
use sentinel_types::{Actor, ClientError, Label, Record, RecordClient, RecordUpdate};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.linear.app/graphql";

const PAGE_SIZE: u32 = 100;

const ISSUE_FIELDS: &str = "id identifier title url priority \
    slaType slaStartedAt slaBreachesAt slaHighRiskAt slaMediumRiskAt \
    labels(first: 250) { nodes { id name parent { id } } }";

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorBody>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorBody {
    message: String,
    #[serde(default)]
    extensions: Option<ErrorExtensions>,
}

#[derive(Debug, Deserialize)]
struct ErrorExtensions {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    #[serde(default)]
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    nodes: Vec<T>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct LabelNode {
    id: String,
    name: String,
    #[serde(default)]
    parent: Option<IdRef>,
}

impl From<LabelNode> for Label {
    fn from(n: LabelNode) -> Self {
        Label {
            id: n.id,
            name: n.name,
            parent_id: n.parent.map(|p| p.id),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueNode {
    id: String,
    identifier: String,
    title: String,
    #[serde(default)]
    url: Option<String>,
    /// Linear types priority as Float.
    #[serde(default)]
    priority: f64,
    #[serde(default)]
    sla_type: Option<String>,
    #[serde(default)]
    sla_started_at: Option<String>,
    #[serde(default)]
    sla_breaches_at: Option<String>,
    #[serde(default)]
    sla_high_risk_at: Option<String>,
    #[serde(default)]
    sla_medium_risk_at: Option<String>,
    labels: Nodes<LabelNode>,
}

impl From<IssueNode> for Record {
    fn from(n: IssueNode) -> Self {
        Record {
            id: n.id,
            identifier: n.identifier,
            title: n.title,
            url: n.url,
            labels: n.labels.nodes.into_iter().map(Label::from).collect(),
            priority: n.priority.round().clamp(0.0, u8::MAX as f64) as u8,
            sla_type: n.sla_type,
            sla_started_at: n.sla_started_at,
            sla_breaches_at: n.sla_breaches_at,
            sla_high_risk_at: n.sla_high_risk_at,
            sla_medium_risk_at: n.sla_medium_risk_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MutationPayload {
    success: bool,
}

#[derive(Debug, Deserialize)]
struct IssueData {
    issue: Option<IssueNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueUpdateData {
    issue_update: MutationPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueLabelData {
    issue_label: Option<LabelNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueLabelsData {
    issue_labels: Nodes<LabelNode>,
}

#[derive(Debug, Deserialize)]
struct IssuesData {
    issues: Connection<IssueNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentCreateData {
    comment_create: MutationPayload,
}

#[derive(Debug, Deserialize)]
struct ViewerNode {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ViewerData {
    viewer: ViewerNode,
}

/// Record client backed by Linear's GraphQL endpoint.
pub struct LinearClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl LinearClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            retry,
        })
    }

    /// One request, no retry.
    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ClientError> {
        let body = json!({ "query": query, "variables": variables });
        let res = self
            .client
            .post(&self.api_url)
            .header(AUTHORIZATION, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        let parsed: GraphQlResponse<T> =
            serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))?;
        if let Some(err) = parsed.errors.into_iter().next() {
            return Err(ClientError::GraphQl {
                message: err.message,
                code: err.extensions.and_then(|x| x.code),
            });
        }
        parsed
            .data
            .ok_or_else(|| ClientError::Decode("response has no data".to_string()))
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        op_name: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ClientError> {
        self.retry
            .run(op_name, move || self.execute(query, variables.clone()))
            .await
    }
}

impl fmt::Debug for LinearClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearClient")
            .field("api_url", &self.api_url)
            .field("retry", &self.retry)
            .finish()
    }
}

fn ensure_success(op_name: &str, payload: MutationPayload) -> Result<(), ClientError> {
    if payload.success {
        Ok(())
    } else {
        Err(ClientError::GraphQl {
            message: format!("{} reported success=false", op_name),
            code: None,
        })
    }
}

#[async_trait::async_trait]
impl RecordClient for LinearClient {
    async fn get_record(&self, id: &str) -> Result<Record, ClientError> {
        let query = format!("query($id: String!) {{ issue(id: $id) {{ {} }} }}", ISSUE_FIELDS);
        let data: IssueData = self.graphql("issue", &query, json!({ "id": id })).await?;
        data.issue
            .map(Record::from)
            .ok_or_else(|| ClientError::NotFound(format!("issue {}", id)))
    }

    async fn update_record(&self, id: &str, update: &RecordUpdate) -> Result<(), ClientError> {
        let query = "mutation($id: String!, $input: IssueUpdateInput!) { \
                     issueUpdate(id: $id, input: $input) { success } }";
        let input =
            serde_json::to_value(update).map_err(|e| ClientError::Decode(e.to_string()))?;
        let data: IssueUpdateData = self
            .graphql("issueUpdate", query, json!({ "id": id, "input": input }))
            .await?;
        ensure_success("issueUpdate", data.issue_update)
    }

    async fn resolve_label_by_id(&self, id: &str) -> Result<Label, ClientError> {
        let query = "query($id: String!) { issueLabel(id: $id) { id name parent { id } } }";
        let data: IssueLabelData = self.graphql("issueLabel", query, json!({ "id": id })).await?;
        data.issue_label
            .map(Label::from)
            .ok_or_else(|| ClientError::NotFound(format!("label {}", id)))
    }

    async fn resolve_label_by_name(&self, name: &str) -> Result<Option<Label>, ClientError> {
        let query = "query($name: String!) { \
                     issueLabels(filter: { name: { eqIgnoreCase: $name } }, first: 50) { \
                     nodes { id name parent { id } } } }";
        let data: IssueLabelsData = self
            .graphql("issueLabels", query, json!({ "name": name }))
            .await?;
        Ok(data.issue_labels.nodes.into_iter().next().map(Label::from))
    }

    async fn list_records_with_label(&self, label_id: &str) -> Result<Vec<Record>, ClientError> {
        let query = format!(
            "query($filter: IssueFilter, $first: Int!, $after: String) {{ \
             issues(filter: $filter, first: $first, after: $after) {{ \
             nodes {{ {} }} pageInfo {{ hasNextPage endCursor }} }} }}",
            ISSUE_FIELDS
        );
        let filter = json!({ "labels": { "some": { "id": { "eq": label_id } } } });
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let vars = json!({ "filter": filter, "first": PAGE_SIZE, "after": cursor });
            let data: IssuesData = self.graphql("issues", &query, vars).await?;
            records.extend(data.issues.nodes.into_iter().map(Record::from));
            match (data.issues.page_info.has_next_page, data.issues.page_info.end_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }
        Ok(records)
    }

    async fn create_comment(&self, record_id: &str, body: &str) -> Result<(), ClientError> {
        let query = "mutation($input: CommentCreateInput!) { commentCreate(input: $input) { success } }";
        let data: CommentCreateData = self
            .graphql(
                "commentCreate",
                query,
                json!({ "input": { "issueId": record_id, "body": body } }),
            )
            .await?;
        ensure_success("commentCreate", data.comment_create)
    }

    async fn viewer(&self) -> Result<Actor, ClientError> {
        let data: ViewerData = self
            .graphql("viewer", "query { viewer { id name email } }", json!({}))
            .await?;
        Ok(Actor {
            id: data.viewer.id,
            email: data.viewer.email,
            name: data.viewer.name,
            is_integration: false,
        })
    }
}
