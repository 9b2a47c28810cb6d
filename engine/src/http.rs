//! `reqwest`-backed [`RemoteService`] for the threadline comment server.

use crate::{
    remote::{Created, Page, RemoteError, RemoteService, Removed},
    CorrelationToken, CreateRequest, EntityId, EntityPatch, ThreadRef,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

/// HTTP client for the comment API.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
    bearer: Option<String>,
}

#[derive(Serialize)]
struct CreateBody<'a> {
    #[serde(flatten)]
    request: &'a CreateRequest,
    client_tmp_id: CorrelationToken,
}

impl HttpRemote {
    /// Talk to the server at `base_url`, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer: None,
        }
    }

    /// Authenticate every request with `token`.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            Err(RemoteError::Rejected(body))
        } else {
            Err(RemoteError::Transport(format!("{status}: {body}")))
        }
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, RemoteError> {
        self.send(builder)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::UnexpectedResponse(e.to_string()))
    }
}

impl RemoteService for HttpRemote {
    async fn create(
        &self,
        request: &CreateRequest,
        token: CorrelationToken,
    ) -> Result<Created, RemoteError> {
        let body = CreateBody {
            request,
            client_tmp_id: token,
        };
        self.json(self.client.post(self.url("/comments")).json(&body))
            .await
    }

    async fn write(&self, id: EntityId, fields: &EntityPatch) -> Result<(), RemoteError> {
        self.send(self.client.patch(self.url(&format!("/comments/{id}"))).json(fields))
            .await
            .map(|_| ())
    }

    async fn remove(&self, id: EntityId) -> Result<Removed, RemoteError> {
        self.json(self.client.delete(self.url(&format!("/comments/{id}"))))
            .await
    }

    async fn call(&self, method: &str, args: Value) -> Result<Value, RemoteError> {
        let id = args
            .get(0)
            .and_then(Value::as_i64)
            .ok_or_else(|| RemoteError::Rejected(format!("{method}: first argument must be an id")))?;
        let path = format!("/comments/{id}/actions/{method}");
        self.json(self.client.post(self.url(&path)).json(&json!({ "args": args })))
            .await
    }

    async fn top_level_page(
        &self,
        thread: &ThreadRef,
        limit: usize,
        offset: usize,
    ) -> Result<Page, RemoteError> {
        let path = format!("/threads/{}/{}/comments", thread.res_model, thread.res_id);
        self.json(
            self.client
                .get(self.url(&path))
                .query(&[("limit", limit), ("offset", offset)]),
        )
        .await
    }

    async fn replies_page(
        &self,
        parent: EntityId,
        limit: usize,
        offset: usize,
    ) -> Result<Page, RemoteError> {
        let path = format!("/comments/{parent}/replies");
        self.json(
            self.client
                .get(self.url(&path))
                .query(&[("limit", limit), ("offset", offset)]),
        )
        .await
    }

    async fn reserved_words(&self) -> Result<Vec<String>, RemoteError> {
        self.json(self.client.get(self.url("/policy/reserved-words")))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_trailing_slash() {
        let remote = HttpRemote::new("http://localhost:3000/");
        assert_eq!(remote.url("/comments"), "http://localhost:3000/comments");
    }

    #[test]
    fn create_body_carries_token() {
        let thread = ThreadRef::new("listing", 7);
        let request = CreateRequest::new(&thread, "Hi", Some(3));
        let body = serde_json::to_value(CreateBody {
            request: &request,
            client_tmp_id: CorrelationToken(-12),
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "content": "Hi",
                "res_model": "listing",
                "res_id": 7,
                "parent_id": 3,
                "client_tmp_id": -12
            })
        );
    }
}
