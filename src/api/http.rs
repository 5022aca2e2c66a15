//! REST implementation of [`RemoteApi`].

use super::endpoints::{Endpoint, Method};
use super::{wire, RemoteApi};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::session::Session;
use crate::types::{CollectionKey, MutationAck, MutationKind, Notification, Page, UserId, UserProjection};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use url::Url;

/// Bearer-authenticated client for the photo service.
#[derive(Clone)]
pub struct HttpApi {
    http: Client,
    base_url: Url,
    session: Session,
}

impl HttpApi {
    pub fn new(config: &SyncConfig, session: Session) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            SyncError::InvalidOperation(format!("invalid base url {}: {}", config.base_url, e))
        })?;
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    /// Base url with the endpoint's segments appended, each one escaped.
    fn url_for(&self, endpoint: &Endpoint) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                SyncError::InvalidOperation(format!("base url {} cannot hold a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(&endpoint.segments);
        Ok(url)
    }

    /// Send a request and decode the JSON body (Null for empty bodies).
    async fn send(&self, endpoint: Endpoint) -> Result<Value> {
        let token = self.session.token()?.to_string();
        let url = self.url_for(&endpoint)?;

        let method = match endpoint.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .query(&endpoint.query);
        if let Some(body) = &endpoint.body {
            request = request.json(body);
        }

        tracing::debug!(method = ?endpoint.method, path = %endpoint.path(), "sending request");
        let res = request.send().await?;
        let status = res.status();
        let body = res.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Auth);
        }
        if !status.is_success() {
            let message = wire::error_message(&body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            });
            return Err(SyncError::Server {
                status: Some(status.as_u16()),
                message,
            });
        }

        if body.trim().is_empty() {
            Ok(Value::Null)
        } else {
            Ok(serde_json::from_str(&body)?)
        }
    }
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn fetch_page(&self, key: &CollectionKey, page: u32, limit: u32) -> Result<Page> {
        let body = self.send(Endpoint::page(key, page, limit)).await?;
        wire::parse_page(body, limit, Some(self.session.user_id()))
    }

    async fn apply_mutation(&self, kind: MutationKind, target: &str) -> Result<MutationAck> {
        let body = self.send(Endpoint::mutation(kind, target)).await?;
        Ok(wire::parse_ack(&body))
    }

    async fn fetch_notifications(&self) -> Result<Vec<Notification>> {
        let body = self.send(Endpoint::notifications()).await?;
        wire::parse_notifications(body)
    }

    async fn fetch_follow_status(&self, user: &UserId) -> Result<UserProjection> {
        let body = self.send(Endpoint::follow_status(user)).await?;
        Ok(wire::parse_follow_status(user, &body))
    }
}
