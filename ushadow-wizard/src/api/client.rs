// uShadow backend client
//
// Thin reqwest wrapper over the dashboard's REST and SSE endpoints. Every request carries
// the bearer token when one is configured and a fresh `X-Request-ID` for log correlation.

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use url::Url;

use crate::api::error::ApiError;
use crate::config::WizardConfig;
use crate::models::requests::{ApiKeys, EnabledRequest};
use crate::models::responses::{
    ApiKeysUpdateResponse, CertificateStatus, DashboardResponse, DetectedKeys, EnabledResponse,
    ErrorBody, HealthResponse, InstallResponse, MobileConnection, ServiceActionResponse,
    ServiceInfo, StatusMessage, TunnelAuthUrl, TunnelStatus, WizardStatusResponse,
};
use crate::reconciler::{EventByteStream, StatusBackend};
use crate::utils::logging::mask_url_credentials;
use crate::utils::validation::validate_service_name;
use crate::wizard::confirm::StatusCheck;

const SERVICES_PATH: &str = "/api/services";
const COMPOSE_SERVICES_PATH: &str = "/api/compose/services";
const WIZARD_PATH: &str = "/api/wizard";
const SETTINGS_CONFIG_PATH: &str = "/api/settings/config";
const TAILSCALE_PATH: &str = "/api/tailscale";
const HEALTH_PATH: &str = "/health";

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    /// No overall timeout: the event stream stays open indefinitely.
    stream_http: reqwest::Client,
    base_url: String,
    dashboard_path: String,
    events_path: String,
    token: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &mask_url_credentials(&self.base_url))
            .field("has_token", &self.has_token())
            .finish()
    }
}

impl ApiClient {
    pub fn new(cfg: &WizardConfig) -> Result<Self, ApiError> {
        Url::parse(&cfg.base_url)
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid base URL: {}", e)))?;
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let stream_http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            stream_http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            dashboard_path: cfg.dashboard_path.clone(),
            events_path: cfg.events_path.clone(),
            token: Arc::new(RwLock::new(cfg.token().map(str::to_string))),
        })
    }

    /// Replace the bearer token, e.g. after the user logged in again following a 401.
    pub fn set_token(&self, token: Option<String>) {
        let token = token.filter(|t| !t.trim().is_empty());
        match self.token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    pub fn has_token(&self) -> bool {
        self.current_token().is_some()
    }

    fn current_token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        let joined = format!("{}{}", self.base_url, path);
        Url::parse(&joined)
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid URL '{}': {}", path, e)))
    }

    fn service_path(&self, name: &str, action: &str) -> Result<Url, ApiError> {
        validate_service_name(name).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.endpoint(&format!("{}/{}/{}", SERVICES_PATH, name.trim(), action))
    }

    fn request(&self, client: &reqwest::Client, method: Method, url: Url) -> RequestBuilder {
        let request_id = uuid::Uuid::new_v4().to_string();
        debug!(
            "[PHASE: api] [STEP: request] {} {} (request_id={})",
            method,
            url.path(),
            request_id
        );
        let mut rb = client
            .request(method, url)
            .header("X-Request-ID", request_id);
        if let Some(token) = self.current_token() {
            rb = rb.bearer_auth(token);
        }
        rb
    }

    async fn send<T: DeserializeOwned>(&self, rb: RequestBuilder) -> Result<T, ApiError> {
        let resp = check_status(rb.send().await?).await?;
        let body = resp.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        self.send(self.request(&self.http, Method::GET, url)).await
    }

    async fn with_body<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(self.request(&self.http, method, url).json(body))
            .await
    }

    pub async fn health(&self) -> Result<HealthResponse, ApiError> {
        self.get(self.endpoint(HEALTH_PATH)?).await
    }

    pub async fn list_services(&self) -> Result<Vec<ServiceInfo>, ApiError> {
        self.get(self.endpoint(&format!("{}/", SERVICES_PATH))?)
            .await
    }

    pub async fn start_service(&self, name: &str) -> Result<ServiceActionResponse, ApiError> {
        let url = self.service_path(name, "start")?;
        info!("[PHASE: services] [STEP: start] Starting service {}", name);
        self.service_action(url).await
    }

    pub async fn stop_service(&self, name: &str) -> Result<ServiceActionResponse, ApiError> {
        let url = self.service_path(name, "stop")?;
        info!("[PHASE: services] [STEP: stop] Stopping service {}", name);
        self.service_action(url).await
    }

    // `success: false` with a message is a service-level failure, surfaced as an error.
    async fn service_action(&self, url: Url) -> Result<ServiceActionResponse, ApiError> {
        let resp: ServiceActionResponse = self
            .send(self.request(&self.http, Method::POST, url))
            .await?;
        if !resp.success {
            return Err(ApiError::Status {
                status: 200,
                detail: resp
                    .message
                    .clone()
                    .unwrap_or_else(|| "Service action failed".to_string()),
            });
        }
        Ok(resp)
    }

    pub async fn set_service_enabled(
        &self,
        name: &str,
        enabled: bool,
    ) -> Result<EnabledResponse, ApiError> {
        let url = self.service_path(name, "enabled")?;
        self.with_body(Method::PUT, url, &EnabledRequest { enabled })
            .await
    }

    pub async fn install_service(&self, service_id: &str) -> Result<InstallResponse, ApiError> {
        validate_service_name(service_id).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let url = self.endpoint(&format!(
            "{}/{}/install",
            COMPOSE_SERVICES_PATH,
            service_id.trim()
        ))?;
        self.send(self.request(&self.http, Method::POST, url))
            .await
    }

    pub async fn get_config(&self) -> Result<Value, ApiError> {
        self.get(self.endpoint(SETTINGS_CONFIG_PATH)?).await
    }

    /// Partial update: a map of dotted keys (`api_keys.openai_api_key`) or a nested map.
    pub async fn update_config(&self, updates: &Value) -> Result<Value, ApiError> {
        if !updates.is_object() {
            return Err(ApiError::InvalidRequest(
                "Config updates must be a JSON object".to_string(),
            ));
        }
        self.with_body(Method::PUT, self.endpoint(SETTINGS_CONFIG_PATH)?, updates)
            .await
    }

    pub async fn wizard_status(&self) -> Result<WizardStatusResponse, ApiError> {
        self.get(self.endpoint(&format!("{}/status", WIZARD_PATH))?)
            .await
    }

    pub async fn detect_keys(&self) -> Result<DetectedKeys, ApiError> {
        self.get(self.endpoint(&format!("{}/detect-keys", WIZARD_PATH))?)
            .await
    }

    /// Currently stored keys, masked by the backend.
    pub async fn get_api_keys(&self) -> Result<ApiKeys, ApiError> {
        self.get(self.endpoint(&format!("{}/api-keys", WIZARD_PATH))?)
            .await
    }

    pub async fn update_api_keys(&self, keys: ApiKeys) -> Result<ApiKeysUpdateResponse, ApiError> {
        let update = keys.into_update();
        self.with_body(
            Method::PUT,
            self.endpoint(&format!("{}/api-keys", WIZARD_PATH))?,
            &update,
        )
        .await
    }

    pub async fn complete_wizard(&self) -> Result<Value, ApiError> {
        let url = self.endpoint(&format!("{}/complete", WIZARD_PATH))?;
        self.send(self.request(&self.http, Method::POST, url))
            .await
    }

    pub async fn tunnel_start(&self) -> Result<StatusMessage, ApiError> {
        let url = self.endpoint(&format!("{}/container/start", TAILSCALE_PATH))?;
        info!("[PHASE: mobile] [STEP: tunnel_start] Starting Tailscale container");
        self.send(self.request(&self.http, Method::POST, url))
            .await
    }

    pub async fn tunnel_status(&self) -> Result<TunnelStatus, ApiError> {
        self.get(self.endpoint(&format!("{}/container/status", TAILSCALE_PATH))?)
            .await
    }

    pub async fn tunnel_auth_url(&self) -> Result<TunnelAuthUrl, ApiError> {
        self.get(self.endpoint(&format!("{}/container/auth-url", TAILSCALE_PATH))?)
            .await
    }

    pub async fn provision_certificate(&self, hostname: &str) -> Result<CertificateStatus, ApiError> {
        if hostname.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "Tailscale hostname is required".to_string(),
            ));
        }
        let mut url = self.endpoint(&format!("{}/container/provision-cert", TAILSCALE_PATH))?;
        url.query_pairs_mut().append_pair("hostname", hostname.trim());
        self.send(self.request(&self.http, Method::POST, url))
            .await
    }

    pub async fn mobile_connection(&self) -> Result<MobileConnection, ApiError> {
        self.get(self.endpoint(&format!("{}/mobile/connect-qr", TAILSCALE_PATH))?)
            .await
    }

    /// One confirmation check for a service that was just started.
    pub async fn check_service(&self, name: &str) -> StatusCheck {
        match self.list_services().await {
            Ok(services) => {
                let running = services
                    .iter()
                    .any(|s| s.service_name == name && s.is_running());
                if running {
                    StatusCheck::Running
                } else {
                    StatusCheck::Pending
                }
            }
            Err(e) if e.is_transient() => StatusCheck::Pending,
            Err(e) => StatusCheck::Failed(e.user_message()),
        }
    }
}

async fn check_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.message())
        .unwrap_or_else(|| text.trim().chars().take(200).collect());
    Err(ApiError::Status {
        status: status.as_u16(),
        detail,
    })
}

#[async_trait]
impl StatusBackend for ApiClient {
    async fn fetch_dashboard(
        &self,
        expanded_session_ids: &[String],
    ) -> Result<DashboardResponse, ApiError> {
        let mut url = self.endpoint(&self.dashboard_path)?;
        if !expanded_session_ids.is_empty() {
            url.query_pairs_mut()
                .append_pair("expanded_sessions", &expanded_session_ids.join(","));
        }
        self.get(url).await
    }

    async fn fetch_services(&self) -> Result<Vec<ServiceInfo>, ApiError> {
        self.list_services().await
    }

    async fn open_events(&self) -> Result<EventByteStream, ApiError> {
        let url = self.endpoint(&self.events_path)?;
        let resp = self
            .request(&self.stream_http, Method::GET, url)
            .header("Accept", "text/event-stream")
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(ApiError::from))
            .boxed())
    }
}
