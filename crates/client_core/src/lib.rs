use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{ProjectId, Role, Shipment, ShipmentStatus},
    error::{ApiError, DetailError, ErrorCode},
    lifecycle::ShipmentAction,
    protocol::{
        CreateLabelRequest, QuoteRequest, ShippingQuote, StatusUpdateRequest, TokenObtainRequest,
        TokenPair, TokenRefreshRequest, TokenRefreshResponse,
    },
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

pub mod config;
pub mod events;
pub mod management;
pub mod session;
pub mod tracker;
pub mod wizard;

pub use config::ClientSettings;
pub use events::{ClientEvent, EventBus, Notice, NoticeLevel};
pub use management::{ManagementStatus, ManagementView, ShipmentManagement, TrackingInfo};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionError, SessionStore};
pub use tracker::{PollHandle, ShipmentTracker, TrackerState, TrackerView};
pub use wizard::{ShipmentFormState, ShipmentWizard, WizardOptions, WizardStep};

const TOKEN_PATH: &str = "token/";
const TOKEN_REFRESH_PATH: &str = "token/refresh/";
const QUOTE_PATH: &str = "projects/shipping/quote/";

fn shipment_path(project_id: ProjectId, suffix: &str) -> String {
    format!("projects/projects/{project_id}/shipment/{suffix}")
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("not signed in")]
    NotSignedIn,
    #[error("session expired; sign in again")]
    Unauthorized,
    #[error("resource not found")]
    NotFound,
    #[error("server rejected request ({status}): {message}")]
    Api {
        status: u16,
        code: Option<ErrorCode>,
        message: String,
    },
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Backend operations the shipment views depend on.
#[async_trait]
pub trait ShipmentApi: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<ShippingQuote, ClientError>;
    async fn create_label(
        &self,
        project_id: ProjectId,
        request: &CreateLabelRequest,
    ) -> Result<Shipment, ClientError>;
    /// `Ok(None)` when the project has no shipment yet.
    async fn shipment(&self, project_id: ProjectId) -> Result<Option<Shipment>, ClientError>;
    async fn update_status(
        &self,
        project_id: ProjectId,
        status: ShipmentStatus,
    ) -> Result<Shipment, ClientError>;
    async fn request_return(&self, project_id: ProjectId) -> Result<Shipment, ClientError>;
    async fn confirm_return(&self, project_id: ProjectId) -> Result<Shipment, ClientError>;
}

/// Routes a lifecycle action to the endpoint that performs it.
pub async fn perform_action(
    api: &dyn ShipmentApi,
    project_id: ProjectId,
    action: ShipmentAction,
) -> Result<Shipment, ClientError> {
    match action {
        ShipmentAction::ConfirmShipped | ShipmentAction::ConfirmReceived => {
            api.update_status(project_id, action.target_status()).await
        }
        ShipmentAction::StartReturn => api.request_return(project_id).await,
        ShipmentAction::ConfirmReturnReceived => api.confirm_return(project_id).await,
    }
}

pub struct ShipmentClient {
    http: Client,
    base_url: Url,
    session: Arc<dyn SessionStore>,
    events: EventBus,
    refresh_lock: Mutex<()>,
}

impl ShipmentClient {
    pub fn new(
        base_url: &str,
        session: Arc<dyn SessionStore>,
        events: EventBus,
    ) -> Result<Self, ClientError> {
        Self::with_http(Client::new(), base_url, session, events)
    }

    pub fn from_settings(
        settings: &ClientSettings,
        session: Arc<dyn SessionStore>,
        events: EventBus,
    ) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Self::with_http(http, &settings.base_url, session, events)
    }

    pub fn with_http(
        http: Client,
        base_url: &str,
        session: Arc<dyn SessionStore>,
        events: EventBus,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
            session,
            events,
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn current_session(&self) -> Result<Option<Session>, ClientError> {
        Ok(self.session.load()?)
    }

    /// Exchanges credentials for a token pair and stores the new session.
    pub async fn sign_in(&self, username: &str, role: Role) -> Result<Session, ClientError> {
        let response = self
            .http
            .post(self.endpoint(TOKEN_PATH)?)
            .json(&TokenObtainRequest {
                username: username.to_string(),
                role,
            })
            .send()
            .await?;
        let pair: TokenPair = decode(response).await?;
        let session = Session {
            access_token: pair.access,
            refresh_token: Some(pair.refresh),
            role,
            username: Some(username.to_string()),
        };
        self.session.save(&session)?;
        info!(%username, %role, "session: signed in");
        Ok(session)
    }

    pub fn sign_out(&self) -> Result<(), ClientError> {
        self.session.clear()?;
        info!("session: signed out");
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    async fn send_once<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        access_token: &str,
    ) -> Result<Response, ClientError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let url = self.endpoint(path)?;
        debug!(%method, %url, "shipment api request");
        let mut request = self.http.request(method, url).bearer_auth(access_token);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Sends with the stored access token; a 401 gets one refresh and one retry.
    async fn send_authorized<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ClientError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let session = self.session.load()?.ok_or(ClientError::NotSignedIn)?;
        let response = self
            .send_once(method.clone(), path, body, &session.access_token)
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let access_token = self.refresh_access_token(&session.access_token).await?;
        let retried = self.send_once(method, path, body, &access_token).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!(path, "session: request still unauthorized after refresh");
            self.expire_session()?;
            return Err(ClientError::Unauthorized);
        }
        Ok(retried)
    }

    async fn refresh_access_token(&self, rejected: &str) -> Result<String, ClientError> {
        let _refreshing = self.refresh_lock.lock().await;
        let Some(mut session) = self.session.load()? else {
            self.expire_session()?;
            return Err(ClientError::Unauthorized);
        };
        if session.access_token != rejected {
            // Another request refreshed while this one waited for the lock.
            return Ok(session.access_token);
        }
        let Some(refresh_token) = session.refresh_token.clone() else {
            self.expire_session()?;
            return Err(ClientError::Unauthorized);
        };

        match self.exchange_refresh_token(&refresh_token).await {
            Ok(refreshed) => {
                session.access_token = refreshed.access;
                if let Some(rotated) = refreshed.refresh {
                    session.refresh_token = Some(rotated);
                }
                self.session.save(&session)?;
                info!("session: access token refreshed");
                Ok(session.access_token)
            }
            Err(error) => {
                warn!(%error, "session: token refresh failed");
                self.expire_session()?;
                Err(ClientError::Unauthorized)
            }
        }
    }

    async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenRefreshResponse, ClientError> {
        let response = self
            .http
            .post(self.endpoint(TOKEN_REFRESH_PATH)?)
            .json(&TokenRefreshRequest {
                refresh: refresh_token.to_string(),
            })
            .send()
            .await?;
        decode(response).await
    }

    fn expire_session(&self) -> Result<(), ClientError> {
        self.session.clear()?;
        self.events.publish(ClientEvent::SessionExpired);
        Ok(())
    }
}

#[async_trait]
impl ShipmentApi for ShipmentClient {
    async fn quote(&self, request: &QuoteRequest) -> Result<ShippingQuote, ClientError> {
        let response = self
            .send_authorized(Method::POST, QUOTE_PATH, Some(request))
            .await?;
        decode(response).await
    }

    async fn create_label(
        &self,
        project_id: ProjectId,
        request: &CreateLabelRequest,
    ) -> Result<Shipment, ClientError> {
        let response = self
            .send_authorized(
                Method::POST,
                &shipment_path(project_id, "label/"),
                Some(request),
            )
            .await?;
        decode(response).await
    }

    async fn shipment(&self, project_id: ProjectId) -> Result<Option<Shipment>, ClientError> {
        let response = self
            .send_authorized::<()>(Method::GET, &shipment_path(project_id, ""), None)
            .await?;
        match decode(response).await {
            Ok(shipment) => Ok(Some(shipment)),
            Err(ClientError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn update_status(
        &self,
        project_id: ProjectId,
        status: ShipmentStatus,
    ) -> Result<Shipment, ClientError> {
        let response = self
            .send_authorized(
                Method::POST,
                &shipment_path(project_id, "status/"),
                Some(&StatusUpdateRequest { status }),
            )
            .await?;
        decode(response).await
    }

    async fn request_return(&self, project_id: ProjectId) -> Result<Shipment, ClientError> {
        let response = self
            .send_authorized::<()>(Method::POST, &shipment_path(project_id, "return/"), None)
            .await?;
        decode(response).await
    }

    async fn confirm_return(&self, project_id: ProjectId) -> Result<Shipment, ClientError> {
        let response = self
            .send_authorized::<()>(Method::POST, &shipment_path(project_id, "returned/"), None)
            .await?;
        decode(response).await
    }
}

fn normalize_base_url(raw: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(raw.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound);
    }
    let body = response.text().await.unwrap_or_default();
    Err(api_error(status, &body))
}

fn api_error(status: StatusCode, body: &str) -> ClientError {
    if let Ok(err) = serde_json::from_str::<ApiError>(body) {
        return ClientError::Api {
            status: status.as_u16(),
            code: Some(err.code),
            message: err.message,
        };
    }
    let message = match serde_json::from_str::<DetailError>(body) {
        Ok(detail) => detail.detail,
        Err(_) if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string(),
        Err(_) => body.trim().to_string(),
    };
    ClientError::Api {
        status: status.as_u16(),
        code: None,
        message,
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
