//! Request gateway: attaches the access credential to every call and
//! recovers from a rejected credential through the refresh coordinator.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use shelf_core::{
    ApiRequest, ApiResponse, AuthError, ShelfError, ShelfResult, Transport, TransportError,
};

use crate::refresh::RefreshCoordinator;

/// How the gateway treats a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Ok,
    Unauthorized,
    OtherError,
}

impl ResponseClass {
    pub fn of(response: &ApiResponse) -> Self {
        if response.is_success() {
            ResponseClass::Ok
        } else if response.is_unauthorized() {
            ResponseClass::Unauthorized
        } else {
            ResponseClass::OtherError
        }
    }
}

/// Render an error body for a status error message.
pub(crate) fn body_text(body: &Value) -> String {
    match body {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn status_error(path: &str, response: &ApiResponse) -> TransportError {
    TransportError::Status {
        path: path.to_string(),
        status: response.status,
        body: body_text(&response.body),
    }
}

pub struct RequestGateway {
    transport: Arc<dyn Transport>,
    coordinator: Arc<RefreshCoordinator>,
    renewal_path: String,
}

impl RequestGateway {
    pub fn new(
        transport: Arc<dyn Transport>,
        coordinator: Arc<RefreshCoordinator>,
        renewal_path: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            coordinator,
            renewal_path: renewal_path.into(),
        }
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Requests to the renewal endpoint never trigger renewal themselves.
    pub fn is_renewal(&self, path: &str) -> bool {
        path.split('?').next() == Some(self.renewal_path.as_str())
    }

    /// Issue one logical call.
    ///
    /// A 401 on any path other than the renewal endpoint is handed to the
    /// refresh coordinator, and the call is retried exactly once with the
    /// credential it hands back. A second rejection is returned as an
    /// ordinary status error.
    pub async fn send(&self, request: ApiRequest) -> ShelfResult<ApiResponse> {
        let grant = self.coordinator.access_grant().await?;
        let had_token = grant.token.is_some();
        let response = self
            .transport
            .send(with_bearer(&request, grant.token))
            .await?;

        match ResponseClass::of(&response) {
            ResponseClass::Ok => return Ok(response),
            ResponseClass::Unauthorized if !self.is_renewal(&request.path) => {}
            _ => return Err(status_error(&request.path, &response).into()),
        }
        if !had_token {
            return Err(AuthError::NotSignedIn.into());
        }

        tracing::debug!(
            method = request.method.as_str(),
            path = %request.path,
            "Access credential rejected"
        );
        let token = self.coordinator.recover(grant.generation).await?;
        let retried = self
            .transport
            .send(with_bearer(&request, Some(token)))
            .await?;
        if retried.is_success() {
            Ok(retried)
        } else {
            Err(status_error(&request.path, &retried).into())
        }
    }

    // ------------------------------------------------------------------------
    // JSON helpers
    // ------------------------------------------------------------------------

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ShelfResult<T> {
        self.send_json(ApiRequest::get(path)).await
    }

    /// Like [`get_json`](Self::get_json) but maps a 404 to `None`.
    pub async fn get_optional_json<T: DeserializeOwned>(&self, path: &str) -> ShelfResult<Option<T>> {
        match self.send_json(ApiRequest::get(path)).await {
            Ok(value) => Ok(Some(value)),
            Err(ShelfError::Transport(e)) if e.status() == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> ShelfResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = encode(path, body)?;
        self.send_json(ApiRequest::post(path).with_body(body)).await
    }

    /// POST without a body.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> ShelfResult<T> {
        self.send_json(ApiRequest::post(path)).await
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> ShelfResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = encode(path, body)?;
        self.send_json(ApiRequest::patch(path).with_body(body)).await
    }

    pub async fn delete(&self, path: &str) -> ShelfResult<()> {
        self.send(ApiRequest::delete(path)).await?;
        Ok(())
    }

    pub async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> ShelfResult<T> {
        self.send_json(ApiRequest::delete(path)).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> ShelfResult<T> {
        let path = request.path.clone();
        let response = self.send(request).await?;
        serde_json::from_value(response.body).map_err(|e| {
            TransportError::Decode {
                path,
                reason: e.to_string(),
            }
            .into()
        })
    }
}

fn with_bearer(request: &ApiRequest, token: Option<secrecy::SecretString>) -> ApiRequest {
    let mut request = request.clone();
    request.bearer = token;
    request
}

fn encode<B: Serialize + ?Sized>(path: &str, body: &B) -> Result<Value, TransportError> {
    serde_json::to_value(body).map_err(|e| TransportError::Decode {
        path: path.to_string(),
        reason: format!("request body: {}", e),
    })
}
