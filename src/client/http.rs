//! `reqwest` implementation of [`VmApi`] over the control plane's JSON API.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{ApiFuture, ClientError, VmApi};
use crate::config::CrunchloopConfig;
use crate::model::{Host, Image, VirtualMachine, VmId};
use crate::request::{VmSpec, VmUpdate};

const API_PREFIX: &str = "api/v1";

#[derive(Deserialize)]
struct ListEnvelope<T> {
    data: Vec<T>,
}

/// Control-plane client speaking HTTP and JSON.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Clone, Debug)]
pub struct HttpVmApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpVmApi {
    /// Builds a client for the control plane rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when the HTTP stack cannot be
    /// initialised.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_owned(),
        })
    }

    /// Builds a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when the HTTP stack cannot be
    /// initialised.
    pub fn from_config(config: &CrunchloopConfig) -> Result<Self, ClientError> {
        Self::new(&config.url, config.http_timeout())
    }

    /// Base URL every endpoint is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{API_PREFIX}/{path}", self.base_url);
        debug!(%method, %url, "sending control plane request");
        self.http.request(method, url)
    }

    /// Sends the request and turns non-success statuses into errors. A 404
    /// on a machine-scoped path becomes [`ClientError::NotFound`].
    async fn send(
        request: RequestBuilder,
        vm_id: Option<VmId>,
    ) -> Result<Response, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if let (StatusCode::NOT_FOUND, Some(id)) = (status, vm_id) {
            return Err(ClientError::NotFound {
                resource: String::from("vm"),
                id: id.to_string(),
            });
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|err| format!("<unreadable body: {err}>"));
        Err(ClientError::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl VmApi for HttpVmApi {
    fn create_vm<'a>(&'a self, spec: &'a VmSpec) -> ApiFuture<'a, VirtualMachine> {
        Box::pin(async move {
            let response = Self::send(self.request(Method::POST, "vms").json(spec), None).await?;
            Self::decode(response).await
        })
    }

    fn get_vm(&self, id: VmId) -> ApiFuture<'_, VirtualMachine> {
        Box::pin(async move {
            let path = format!("vms/{id}");
            let response = Self::send(self.request(Method::GET, &path), Some(id)).await?;
            Self::decode(response).await
        })
    }

    fn update_vm<'a>(&'a self, id: VmId, update: &'a VmUpdate) -> ApiFuture<'a, VirtualMachine> {
        Box::pin(async move {
            let path = format!("vms/{id}");
            let request = self.request(Method::PATCH, &path).json(update);
            let response = Self::send(request, Some(id)).await?;
            Self::decode(response).await
        })
    }

    fn start_vm(&self, id: VmId) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let path = format!("vms/{id}/start");
            Self::send(self.request(Method::POST, &path), Some(id)).await?;
            Ok(())
        })
    }

    fn stop_vm(&self, id: VmId) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let path = format!("vms/{id}/stop");
            Self::send(self.request(Method::POST, &path), Some(id)).await?;
            Ok(())
        })
    }

    fn delete_vm(&self, id: VmId) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let path = format!("vms/{id}");
            Self::send(self.request(Method::DELETE, &path), Some(id)).await?;
            Ok(())
        })
    }

    fn list_hosts(&self) -> ApiFuture<'_, Vec<Host>> {
        Box::pin(async move {
            let response = Self::send(self.request(Method::GET, "hosts"), None).await?;
            let envelope: ListEnvelope<Host> = Self::decode(response).await?;
            Ok(envelope.data)
        })
    }

    fn list_images(&self) -> ApiFuture<'_, Vec<Image>> {
        Box::pin(async move {
            let response = Self::send(self.request(Method::GET, "vmis"), None).await?;
            let envelope: ListEnvelope<Image> = Self::decode(response).await?;
            Ok(envelope.data)
        })
    }
}
