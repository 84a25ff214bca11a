use std::fmt;
use std::future::Future;
use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, COOKIE};
use reqwest::{Client, Url};
use tracing::{debug, info};

use crate::settings::Settings;
use crate::error::ScrapeError;
use crate::parser;

/// Account used to log in. Asked for once per run.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Something that can fetch page text for the orchestrator.
///
/// Implementations are shared read-only across concurrent fetches.
pub trait PageSource: Send + Sync + 'static {
    fn base_url(&self) -> &str;

    fn fetch(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> impl Future<Output = Result<String, ScrapeError>> + Send;
}

/// An authenticated session. The cookies obtained at login are frozen into
/// a header on a fresh client, so fetches never change the auth state.
#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
    base_url: String,
}

impl Session {
    /// Fetch the login form, pull its anti-forgery token and submit the
    /// credentials with it. Any failure here is fatal to the run.
    pub async fn login(settings: &Settings, creds: &Credentials) -> Result<Session, ScrapeError> {
        let base = Url::parse(&settings.base_url).map_err(|e| auth_error("invalid base url", e))?;
        let login_url = format!("{}/login.php", settings.base_url);
        let jar = Arc::new(Jar::default());
        let login_client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .user_agent(&settings.user_agent)
            .timeout(settings.timeout())
            .build()
            .map_err(|e| auth_error("could not build http client", e))?;

        let form_page = login_client
            .get(&login_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| auth_error("could not load login page", e))?
            .text()
            .await
            .map_err(|e| auth_error("could not read login page", e))?;

        let token = parser::csrf_token(&form_page).ok_or_else(|| {
            ScrapeError::Auth("anti-forgery token not found on login page".to_string())
        })?;
        debug!("Found login token");

        let landing = login_client
            .post(&login_url)
            .form(&[
                ("user_name", creds.username.as_str()),
                ("password", creds.password.as_str()),
                ("cookie", "1"),
                ("submit", "1"),
                ("sublogin", "Login"),
                ("csrf_token", token.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| auth_error("login request failed", e))?
            .text()
            .await
            .map_err(|e| auth_error("could not read login response", e))?;
        if parser::has_login_form(&landing) {
            return Err(ScrapeError::Auth(format!(
                "credentials for {} were rejected",
                creds.username
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(cookies) = jar.cookies(&base) {
            headers.insert(COOKIE, cookies);
        }
        let client = Client::builder()
            .default_headers(headers)
            .user_agent(&settings.user_agent)
            .timeout(settings.timeout())
            .build()
            .map_err(|e| auth_error("could not build http client", e))?;

        info!(user = %creds.username, "Logged in");
        Ok(Session {
            client,
            base_url: settings.base_url.clone(),
        })
    }
}

fn auth_error(what: &str, err: impl fmt::Display) -> ScrapeError {
    ScrapeError::Auth(format!("{}: {}", what, err))
}

impl PageSource for Session {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> Result<String, ScrapeError> {
        let resp = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ScrapeError::from_reqwest(url, e))?;
        resp.text()
            .await
            .map_err(|e| ScrapeError::from_reqwest(url, e))
    }
}
