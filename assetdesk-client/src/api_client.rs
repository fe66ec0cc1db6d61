//! REST client for the AssetDesk API.
//!
//! Paths are relative to `api_base_url`. Entity reads come wrapped as
//! `{data: ...}`; writes answer `{data: [row]}`. Relation endpoints answer
//! either a bare body or the same envelope, and user writes may nest the row
//! under a `user` key.

use crate::config::{AuthConfig, ClientConfig};
use crate::error::ClientError;
use crate::inventory::InventoryStore;
use crate::tickets::TicketStore;
use assetdesk_core::{
    ConflictError, CreateRelationRequest, DeskError, DeskResult, Device, DeviceId, DeviceInsert,
    DeviceUpdate, ListSource, NetworkError, OperatorTicketsStats, Relation, RelationId,
    RelationRepository, Ticket, TicketId, TicketInsert, TicketRecord, TicketUpdate, TicketsStats,
    User, UserId, UserInsert, UserUpdate, Worknote, WorknoteInsert,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_first(self) -> Option<T> {
        match self {
            OneOrMany::Many(rows) => rows.into_iter().next(),
            OneOrMany::One(row) => Some(row),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MaybeWrapped<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> MaybeWrapped<T> {
    fn into_inner(self) -> T {
        match self {
            MaybeWrapped::Wrapped { data } => data,
            MaybeWrapped::Bare(value) => value,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserField {
    user: User,
}

/// `{data: {user}}`, `{user}` or the usual row envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserWriteBody {
    Nested { data: UserField },
    Flat(UserField),
    Rows(DataEnvelope<OneOrMany<User>>),
}

impl UserWriteBody {
    fn into_user(self, path: &str) -> DeskResult<User> {
        match self {
            UserWriteBody::Nested { data } | UserWriteBody::Flat(data) => Ok(data.user),
            UserWriteBody::Rows(envelope) => first_row(path, envelope),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ActiveBody {
    active: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderMap,
    timeout_ms: u64,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let auth_header = build_auth_headers(&config.auth)?;
        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            auth_header,
            timeout_ms: config.request_timeout_ms,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    // === Plumbing ===

    async fn get_entity<T: DeserializeOwned>(
        &self,
        path: &str,
        entity: &'static str,
        id: impl Display,
    ) -> DeskResult<T> {
        let envelope: DataEnvelope<T> = self
            .get_json(path, &[])
            .await
            .map_err(|err| not_found_on_404(err, entity, &id))?;
        envelope
            .data
            .ok_or_else(|| DeskError::not_found(entity, id))
    }

    async fn post_row<T, B>(&self, path: &str, body: &B) -> DeskResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self.client.post(self.url(path)).json(body);
        let envelope: DataEnvelope<OneOrMany<T>> = self.execute(path, request).await?;
        first_row(path, envelope)
    }

    async fn put_row<T, B>(&self, path: &str, body: &B) -> DeskResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self.client.put(self.url(path)).json(body);
        let envelope: DataEnvelope<OneOrMany<T>> = self.execute(path, request).await?;
        first_row(path, envelope)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> DeskResult<T> {
        let mut request = self.client.get(self.url(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        self.execute(path, request).await
    }

    async fn delete(&self, path: &str) -> DeskResult<()> {
        let request = self.client.delete(self.url(path));
        self.send(path, request).await.map(|_| ())
    }

    async fn patch_empty(&self, path: &str) -> DeskResult<()> {
        let request = self.client.patch(self.url(path));
        self.send(path, request).await.map(|_| ())
    }

    async fn execute<T: DeserializeOwned>(&self, path: &str, request: RequestBuilder) -> DeskResult<T> {
        let response = self.send(path, request).await?;
        self.parse_response(path, response).await
    }

    async fn send(&self, path: &str, request: RequestBuilder) -> DeskResult<reqwest::Response> {
        tracing::debug!(endpoint = path, "Sending request");
        let response = request
            .headers(self.auth_header.clone())
            .send()
            .await
            .map_err(|err| self.transport_error(path, err))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = error_message(status, &text);
        tracing::debug!(endpoint = path, status = status.as_u16(), %message, "Request rejected");
        if status == StatusCode::CONFLICT {
            return Err(ConflictError::Rejected {
                operation: path.to_string(),
                message,
            }
            .into());
        }
        Err(NetworkError::Server {
            endpoint: path.to_string(),
            status: status.as_u16(),
            message,
        }
        .into())
    }

    async fn parse_response<T: DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> DeskResult<T> {
        let bytes = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(path, err))?;
        let body: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        serde_json::from_slice(body).map_err(|err| {
            NetworkError::InvalidResponse {
                endpoint: path.to_string(),
                reason: err.to_string(),
            }
            .into()
        })
    }

    fn transport_error(&self, path: &str, err: reqwest::Error) -> DeskError {
        if err.is_timeout() {
            return NetworkError::Timeout {
                endpoint: path.to_string(),
                timeout_ms: self.timeout_ms,
            }
            .into();
        }
        if err.is_decode() {
            return NetworkError::InvalidResponse {
                endpoint: path.to_string(),
                reason: err.to_string(),
            }
            .into();
        }
        NetworkError::Transport {
            endpoint: path.to_string(),
            reason: err.to_string(),
        }
        .into()
    }
}

fn first_row<T>(path: &str, envelope: DataEnvelope<OneOrMany<T>>) -> DeskResult<T> {
    envelope
        .data
        .and_then(OneOrMany::into_first)
        .ok_or_else(|| {
            NetworkError::InvalidResponse {
                endpoint: path.to_string(),
                reason: "write returned no row".to_string(),
            }
            .into()
        })
}

fn not_found_on_404(err: DeskError, entity: &'static str, id: impl Display) -> DeskError {
    match err {
        DeskError::Network(NetworkError::Server { status: 404, .. }) => DeskError::not_found(entity, id),
        other => other,
    }
}

fn error_message(status: StatusCode, text: &str) -> String {
    if let Ok(body) = serde_json::from_str::<ErrorBody>(text) {
        if let Some(message) = body.message.or(body.error) {
            return message;
        }
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl ListSource for RestClient {
    async fn fetch_list(&self, collection: &str, params: &[(String, String)]) -> DeskResult<Value> {
        self.get_json(collection, params).await
    }
}

#[async_trait]
impl RelationRepository for RestClient {
    async fn list_by_device(&self, device_id: DeviceId) -> DeskResult<Vec<Relation>> {
        let path = format!("relations/devices/{}/relations", device_id);
        let body: MaybeWrapped<Vec<Relation>> = self.get_json(&path, &[]).await?;
        Ok(body.into_inner())
    }

    async fn list_by_user(&self, user_id: UserId) -> DeskResult<Vec<Relation>> {
        let path = format!("relations/users/{}/relations", user_id);
        let body: MaybeWrapped<Vec<Relation>> = self.get_json(&path, &[]).await?;
        Ok(body.into_inner())
    }

    async fn has_active_relation(&self, device_id: DeviceId) -> DeskResult<bool> {
        let path = format!("relations/devices/{}/relations/active", device_id);
        let body: ActiveBody = self.get_json(&path, &[]).await?;
        Ok(body.active)
    }

    async fn create(&self, request: &CreateRelationRequest) -> DeskResult<Relation> {
        let http = self.client.post(self.url("relations")).json(request);
        let body: MaybeWrapped<Relation> = self.execute("relations", http).await?;
        Ok(body.into_inner())
    }

    async fn end(&self, relation_id: RelationId) -> DeskResult<()> {
        let path = format!("relations/{}/end", relation_id);
        self.patch_empty(&path)
            .await
            .map_err(|err| not_found_on_404(err, "relation", relation_id))
    }
}

#[async_trait]
impl InventoryStore for RestClient {
    async fn get_device(&self, id: DeviceId) -> DeskResult<Device> {
        self.get_entity(&format!("devices/{}", id), "device", id).await
    }

    async fn create_device(&self, insert: &DeviceInsert) -> DeskResult<Device> {
        self.post_row("devices", insert).await
    }

    async fn update_device(&self, id: DeviceId, update: &DeviceUpdate) -> DeskResult<Device> {
        let path = format!("devices/{}", id);
        self.put_row(&path, update)
            .await
            .map_err(|err| not_found_on_404(err, "device", id))
    }

    async fn delete_device(&self, id: DeviceId) -> DeskResult<()> {
        let path = format!("devices/{}", id);
        self.delete(&path)
            .await
            .map_err(|err| not_found_on_404(err, "device", id))
    }

    async fn get_user(&self, id: UserId) -> DeskResult<User> {
        self.get_entity(&format!("users/{}", id), "user", id).await
    }

    async fn create_user(&self, insert: &UserInsert) -> DeskResult<User> {
        let request = self.client.post(self.url("users")).json(insert);
        let body: UserWriteBody = self.execute("users", request).await?;
        body.into_user("users")
    }

    async fn update_user(&self, id: UserId, update: &UserUpdate) -> DeskResult<User> {
        let path = format!("users/{}", id);
        let request = self.client.put(self.url(&path)).json(update);
        let body: UserWriteBody = self
            .execute(&path, request)
            .await
            .map_err(|err| not_found_on_404(err, "user", id))?;
        body.into_user(&path)
    }

    async fn delete_user(&self, id: UserId) -> DeskResult<()> {
        let path = format!("users/{}", id);
        self.delete(&path)
            .await
            .map_err(|err| not_found_on_404(err, "user", id))
    }
}

#[async_trait]
impl TicketStore for RestClient {
    async fn get_ticket(&self, id: TicketId) -> DeskResult<Ticket> {
        self.get_entity(&format!("tickets/{}", id), "ticket", id).await
    }

    async fn create_ticket(&self, insert: &TicketInsert) -> DeskResult<TicketRecord> {
        self.post_row("tickets", insert).await
    }

    async fn update_ticket(&self, id: TicketId, update: &TicketUpdate) -> DeskResult<TicketRecord> {
        let path = format!("tickets/{}", id);
        self.put_row(&path, update)
            .await
            .map_err(|err| not_found_on_404(err, "ticket", id))
    }

    async fn delete_ticket(&self, id: TicketId) -> DeskResult<()> {
        let path = format!("tickets/{}", id);
        self.delete(&path)
            .await
            .map_err(|err| not_found_on_404(err, "ticket", id))
    }

    async fn list_worknotes(&self, ticket_id: TicketId) -> DeskResult<Vec<Worknote>> {
        let query = [("ticket_id".to_string(), ticket_id.to_string())];
        let body: MaybeWrapped<Vec<Worknote>> = self.get_json("worknotes", &query).await?;
        Ok(body.into_inner())
    }

    async fn add_worknote(&self, worknote: &WorknoteInsert) -> DeskResult<Worknote> {
        let http = self.client.post(self.url("worknotes")).json(worknote);
        let body: MaybeWrapped<Worknote> = self.execute("worknotes", http).await?;
        Ok(body.into_inner())
    }

    async fn resolved_stats(&self) -> DeskResult<Vec<TicketsStats>> {
        let envelope: DataEnvelope<Vec<TicketsStats>> =
            self.get_json("tickets/stats/resolved", &[]).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    async fn open_stats(&self) -> DeskResult<Vec<TicketsStats>> {
        let envelope: DataEnvelope<Vec<TicketsStats>> =
            self.get_json("tickets/stats/open", &[]).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    async fn operator_stats(&self) -> DeskResult<Vec<OperatorTicketsStats>> {
        let envelope: DataEnvelope<Vec<OperatorTicketsStats>> =
            self.get_json("tickets/stats/operators", &[]).await?;
        Ok(envelope.data.unwrap_or_default())
    }
}

fn build_auth_headers(auth: &AuthConfig) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    if let Some(api_key) = &auth.api_key {
        headers.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(api_key).map_err(|e| ClientError::AuthHeader(e.to_string()))?,
        );
    }
    if let Some(jwt) = &auth.jwt {
        let value = format!("Bearer {}", jwt);
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&value).map_err(|e| ClientError::AuthHeader(e.to_string()))?,
        );
    }
    Ok(headers)
}
