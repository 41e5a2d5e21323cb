use std::future::Future;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{self, HeaderMap, HeaderValue};
use scraper::Html;
use tracing::{debug, info};
use url::Url;

use super::html::selector;
use super::types::HiddenFormFields;
use crate::config::PortalConfig;
use crate::error::PortalError;

/// Cookie carrying the ASP.NET session.
pub const SESSION_COOKIE: &str = "ASP.NET_SessionId";

const INVALID_CAPTCHA_MARKER: &str = "Invalid Captcha";
// Misspelled on the portal itself.
const INVALID_CREDENTIALS_MARKER: &str = "Ivalid Userid or Password";

/// Fetches an authenticated portal page. The seam the orchestrator is generic over.
pub trait PageFetcher: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        session_id: &str,
    ) -> impl Future<Output = Result<String, PortalError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: String,
    pub password: String,
    pub captcha: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    InvalidCaptcha,
    InvalidCredentials,
}

impl LoginOutcome {
    /// Classify the page the portal renders after a login POST.
    pub fn from_response(html: &str) -> Self {
        if html.contains(INVALID_CAPTCHA_MARKER) {
            LoginOutcome::InvalidCaptcha
        } else if html.contains(INVALID_CREDENTIALS_MARKER) {
            LoginOutcome::InvalidCredentials
        } else {
            LoginOutcome::Success
        }
    }
}

/// Captcha image as a `data:` URI, plus the session the portal bound it to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captcha {
    pub image_data_uri: String,
    pub session_id: Option<String>,
}

/// Browser-like HTTP client for the ERP portal.
///
/// Every authenticated request carries the `ASP.NET_SessionId` cookie; the
/// session itself is owned by the caller.
pub struct PortalClient {
    client: reqwest::Client,
    login_url: Url,
    dashboard_url: Url,
    captcha_url: Url,
    /// Sent on session-bound requests only. Captcha and login go without it.
    referer: HeaderValue,
    login_timeout: Duration,
}

impl PortalClient {
    /// Build a client from config: User-Agent, browser headers and timeouts.
    pub fn new(config: &PortalConfig) -> Result<Self, PortalError> {
        let login_url = config.login_url()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        let referer = HeaderValue::from_str(login_url.as_str())
            .map_err(|e| PortalError::Config(format!("Invalid login URL header: {}", e)))?;

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PortalError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            login_url,
            dashboard_url: config.dashboard_url()?,
            captcha_url: config.captcha_url()?,
            referer,
            login_timeout: Duration::from_secs(config.login_timeout_secs),
        })
    }

    pub fn dashboard_url(&self) -> &Url {
        &self.dashboard_url
    }

    /// GET a portal page as the given session.
    pub async fn fetch_page(&self, url: &str, session_id: &str) -> Result<String, PortalError> {
        info!("Fetching page: {}", url);
        let response = self
            .client
            .get(url)
            .header(header::COOKIE, session_cookie(session_id))
            .header(header::REFERER, self.referer.clone())
            .send()
            .await
            .map_err(|e| request_error("GET", url, e))?;
        read_body("GET", url, response).await
    }

    pub async fn fetch_dashboard(&self, session_id: &str) -> Result<String, PortalError> {
        self.fetch_page(self.dashboard_url.as_str(), session_id).await
    }

    /// Every named hidden input of the login page, in document order.
    pub async fn fetch_login_hidden_fields(&self) -> Result<Vec<(String, String)>, PortalError> {
        let url = self.login_url.as_str();
        let response = self
            .client
            .get(url)
            .timeout(self.login_timeout)
            .send()
            .await
            .map_err(|e| request_error("GET", url, e))?;
        let html = read_body("GET", url, response).await?;

        let fields = hidden_inputs(&html);
        if fields.is_empty() {
            return Err(PortalError::markup_with(
                "login hidden fields",
                "login page has no named hidden inputs",
            ));
        }
        debug!("Login page carries {} hidden fields", fields.len());
        Ok(fields)
    }

    /// POST credentials on top of the login page's hidden fields.
    pub async fn login(
        &self,
        credentials: &Credentials,
        session_id: &str,
    ) -> Result<LoginOutcome, PortalError> {
        let mut form = self.fetch_login_hidden_fields().await?;
        form.extend([
            ("txt_HTNO".to_string(), credentials.user_id.clone()),
            ("txt_Password".to_string(), credentials.password.clone()),
            ("btn_Login".to_string(), "Sign in".to_string()),
            ("txtCaptcha".to_string(), credentials.captcha.clone()),
        ]);

        let url = self.login_url.as_str();
        let response = self
            .client
            .post(url)
            .header(header::COOKIE, session_cookie(session_id))
            .form(&form)
            .send()
            .await
            .map_err(|e| request_error("POST", url, e))?;
        let html = read_body("POST", url, response).await?;

        let outcome = LoginOutcome::from_response(&html);
        info!("Login for {} finished: {:?}", credentials.user_id, outcome);
        Ok(outcome)
    }

    /// Fetch a fresh captcha. The portal starts a new session with it.
    pub async fn fetch_captcha(&self) -> Result<Captcha, PortalError> {
        let url = self.captcha_url.as_str();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error("GET", url, e))?;
        let response = check_status("GET", url, response)?;

        let session_id = session_from_set_cookie(response.headers());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| request_error("GET", url, e))?;

        Ok(Captcha {
            image_data_uri: format!("data:image/jpeg;base64,{}", STANDARD.encode(&bytes)),
            session_id,
        })
    }

    /// Post the dashboard's logout form for the session.
    pub async fn logout(&self, session_id: &str, hidden: &HiddenFormFields) -> Result<(), PortalError> {
        let form = [
            ("__VIEWSTATE", hidden.viewstate.as_str()),
            ("__VIEWSTATEGENERATOR", hidden.viewstate_generator.as_str()),
            ("__EVENTVALIDATION", hidden.event_validation.as_str()),
            ("btnLogOut", "Logout"),
        ];

        let url = self.dashboard_url.as_str();
        let response = self
            .client
            .post(url)
            .header(header::COOKIE, session_cookie(session_id))
            .header(header::REFERER, self.referer.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| request_error("POST", url, e))?;
        read_body("POST", url, response).await?;
        info!("Logged out session {}", session_id);
        Ok(())
    }
}

impl PageFetcher for PortalClient {
    fn fetch(
        &self,
        url: &str,
        session_id: &str,
    ) -> impl Future<Output = Result<String, PortalError>> + Send {
        self.fetch_page(url, session_id)
    }
}

fn session_cookie(session_id: &str) -> String {
    format!("{}={}", SESSION_COOKIE, session_id)
}

fn request_error(method: &str, url: &str, e: reqwest::Error) -> PortalError {
    let summary = if e.is_timeout() {
        "The ERP portal took too long to respond."
    } else {
        "Network error while connecting to the ERP portal."
    };
    PortalError::unreachable(summary, format!("{} {}: {}", method, url, e))
}

fn check_status(
    method: &str,
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, PortalError> {
    let status = response.status();
    if !status.is_success() {
        return Err(PortalError::unreachable(
            "The ERP portal returned an error.",
            format!(
                "{} {}: {} {}",
                method,
                url,
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ),
        ));
    }
    Ok(response)
}

async fn read_body(method: &str, url: &str, response: reqwest::Response) -> Result<String, PortalError> {
    check_status(method, url, response)?
        .text()
        .await
        .map_err(|e| request_error(method, url, e))
}

/// `name -> value` for every `<input type="hidden">` with a non-empty name.
fn hidden_inputs(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    document
        .select(&selector("input[type=\"hidden\"]"))
        .filter_map(|input| {
            let name = input.value().attr("name").filter(|n| !n.is_empty())?;
            let value = input.value().attr("value").unwrap_or("");
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

fn session_from_set_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie| {
            let pair = cookie.split(';').next()?.trim();
            let (name, value) = pair.split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
        })
}
