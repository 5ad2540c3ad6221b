//! Monday.com GraphQL sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info, warn};

use super::{SinkError, WorkItemSink};
use crate::config::MondayConfig;
use crate::resilience::{BreakerError, CircuitBreaker};
use crate::store::ExtractedTask;

const API_VERSION: &str = "2023-10";

// Board column ids the account's task board exposes.
const COL_ASSIGNEE_NAMES: &str = "text_assignees";
const COL_ASSIGNEE_EMAILS: &str = "text_emails";
const COL_PRIORITY: &str = "status_priority";
const COL_STATUS: &str = "status";
const COL_DESCRIPTION: &str = "long_text";
const COL_DUE_DATE: &str = "date_due";

const CREATE_ITEM_MUTATION: &str = r#"
mutation CreateItem($boardId: ID!, $groupId: String, $itemName: String!, $columnValues: JSON!) {
  create_item(
    board_id: $boardId,
    group_id: $groupId,
    item_name: $itemName,
    column_values: $columnValues
  ) {
    id
    name
  }
}
"#;

const BOARD_QUERY: &str = r#"
query GetBoard($boardId: [ID!]) {
  boards(ids: $boardId) {
    id
    name
    groups { id title }
    columns { id title type }
  }
}
"#;

const ME_QUERY: &str = "query { me { id name email } }";

/// Creates board items over the Monday.com GraphQL API.
pub struct MondayClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    board_id: i64,
    group_id: Option<String>,
    breaker: Arc<CircuitBreaker>,
}

impl MondayClient {
    pub fn new(config: &MondayConfig, breaker: Arc<CircuitBreaker>) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            token: config.api_token.clone(),
            board_id: config.board_id,
            group_id: config.group_id.clone(),
            breaker,
        })
    }

    /// Map a task onto the board's columns. The column values travel as a
    /// JSON string inside the GraphQL variables.
    fn column_values(task: &ExtractedTask) -> serde_json::Value {
        let mut values = serde_json::Map::new();
        if !task.assignee_names.is_empty() {
            values.insert(
                COL_ASSIGNEE_NAMES.to_string(),
                json!(task.assignee_names.join(", ")),
            );
        }
        if !task.assignee_emails.is_empty() {
            values.insert(
                COL_ASSIGNEE_EMAILS.to_string(),
                json!(task.assignee_emails.join(", ")),
            );
        }
        values.insert(
            COL_PRIORITY.to_string(),
            json!({ "label": task.priority.label() }),
        );
        values.insert(
            COL_STATUS.to_string(),
            json!({ "label": task.status.label() }),
        );
        if !task.brief_description.is_empty() {
            values.insert(COL_DESCRIPTION.to_string(), json!(task.brief_description));
        }
        if let Some(due) = task.due_date {
            values.insert(
                COL_DUE_DATE.to_string(),
                json!({ "date": due.format("%Y-%m-%d").to_string() }),
            );
        }
        serde_json::Value::Object(values)
    }

    async fn execute(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value, SinkError> {
        let payload = json!({ "query": query, "variables": variables });
        let response = self
            .http
            .post(&self.base_url)
            .header("Authorization", &self.token)
            .header("API-Version", API_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        if let Some(errors) = body.get("errors") {
            return Err(SinkError::Graphql(errors.to_string()));
        }
        Ok(body.get("data").cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn create_item_once(&self, task: &ExtractedTask) -> Result<String, SinkError> {
        let variables = json!({
            "boardId": self.board_id,
            "groupId": self.group_id,
            "itemName": task.task_item,
            "columnValues": Self::column_values(task).to_string(),
        });

        let data = self.execute(CREATE_ITEM_MUTATION, variables).await?;
        let item_id = data
            .get("create_item")
            .and_then(|i| i.get("id"))
            .and_then(|id| id.as_str().map(str::to_string).or_else(|| id.as_i64().map(|n| n.to_string())));
        match item_id {
            Some(id) => {
                info!(task = %task.id, item = %id, "created work item");
                Ok(id)
            }
            None => Err(SinkError::MissingItemId),
        }
    }

    /// Fetch board metadata, mostly useful for diagnosing column mappings.
    pub async fn board_info(&self) -> Result<serde_json::Value, SinkError> {
        let data = self
            .execute(BOARD_QUERY, json!({ "boardId": [self.board_id] }))
            .await?;
        data.get("boards")
            .and_then(|b| b.get(0))
            .cloned()
            .ok_or_else(|| SinkError::Graphql(format!("board {} not found", self.board_id)))
    }
}

#[async_trait]
impl WorkItemSink for MondayClient {
    async fn create_item(&self, task: &ExtractedTask) -> Result<String, SinkError> {
        self.breaker
            .execute(|| self.create_item_once(task))
            .await
            .map_err(|e| match e {
                BreakerError::Open { name } => SinkError::CircuitOpen(name),
                BreakerError::Operation(e) => e,
            })
    }

    async fn test_connection(&self) -> bool {
        match self.execute(ME_QUERY, json!({})).await {
            Ok(data) => match data.get("me").and_then(|m| m.get("name")).and_then(|n| n.as_str()) {
                Some(name) => {
                    info!(user = name, "work tracker connection verified");
                    true
                }
                None => {
                    warn!("work tracker connection test returned no user");
                    false
                }
            },
            Err(e) => {
                error!(error = %e, "work tracker connection test failed");
                false
            }
        }
    }
}
