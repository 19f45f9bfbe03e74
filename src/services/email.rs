pub use errors::EmailError;

use crate::model::EmailAddress;
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use secrecy::{ExposeSecret, SecretString};
use std::time;
use url::Url;

/// Outbound notification transport. The dispatch layer owns retry semantics;
/// a send here is one attempt.
#[async_trait]
pub trait EmailApi: Send + Sync {
    async fn send(
        &self, recipients: &[EmailAddress], subject: &str, html_body: &str, text_body: &str,
    ) -> Result<(), EmailError>;
}

#[derive(Debug, Clone)]
pub enum EmailServices {
    Http(HttpEmailApi),
    HappyPath(HappyPathEmailApi),
}

#[async_trait]
impl EmailApi for EmailServices {
    async fn send(
        &self, recipients: &[EmailAddress], subject: &str, html_body: &str, text_body: &str,
    ) -> Result<(), EmailError> {
        match self {
            Self::Http(svc) => svc.send(recipients, subject, html_body, text_body).await,
            Self::HappyPath(svc) => svc.send(recipients, subject, html_body, text_body).await,
        }
    }
}

/// JSON email-provider API wrapper: one POST per send, bearer-key auth.
#[derive(Debug, Clone)]
pub struct HttpEmailApi {
    client: ClientWithMiddleware,
    base_url: Url,
    api_key: SecretString,
    sender: EmailAddress,
}

impl HttpEmailApi {
    pub fn new(
        base_url: impl Into<Url>, api_key: SecretString, sender: EmailAddress,
    ) -> Result<Self, EmailError> {
        let base_url = base_url.into();
        if base_url.cannot_be_a_base() {
            return Err(EmailError::NotABaseUrl(base_url));
        }

        let client = Self::make_http_client()?;
        Ok(Self { client, base_url, api_key, sender })
    }

    fn make_http_client() -> Result<ClientWithMiddleware, EmailError> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(time::Duration::from_secs(60))
            .pool_max_idle_per_host(5)
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(
                time::Duration::from_millis(1_000),
                time::Duration::from_secs(300),
            )
            .build_with_max_retries(3);

        Ok(reqwest_middleware::ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build())
    }
}

#[async_trait]
impl EmailApi for HttpEmailApi {
    #[instrument(level = "debug", skip(self, html_body, text_body), err)]
    async fn send(
        &self, recipients: &[EmailAddress], subject: &str, html_body: &str, text_body: &str,
    ) -> Result<(), EmailError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut().unwrap().push("send");

        let payload = SendRequest {
            from: &self.sender,
            to: recipients,
            subject,
            html: html_body,
            text: text_body,
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected(format!("{status}: {body}")));
        }

        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'r> {
    from: &'r EmailAddress,
    to: &'r [EmailAddress],
    subject: &'r str,
    html: &'r str,
    text: &'r str,
}

#[derive(Debug, Copy, Clone, Default)]
pub struct HappyPathEmailApi;

#[async_trait]
impl EmailApi for HappyPathEmailApi {
    async fn send(
        &self, recipients: &[EmailAddress], subject: &str, _html_body: &str, _text_body: &str,
    ) -> Result<(), EmailError> {
        info!(?recipients, subject, "happy path email send");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use claims::{assert_matches, assert_ok};

    async fn spawn_provider(status: StatusCode, body: &'static str) -> Url {
        let app = Router::new().route("/send", post(move || async move { (status, body) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        Url::parse(&format!("http://{address}")).unwrap()
    }

    fn api_against(base_url: Url) -> HttpEmailApi {
        HttpEmailApi::new(
            base_url,
            SecretString::from("test-key".to_string()),
            EmailAddress::parse("updates@example.com").unwrap(),
        )
        .unwrap()
    }

    fn recipients() -> Vec<EmailAddress> {
        vec![EmailAddress::parse("drizzle@example.com").unwrap()]
    }

    #[tokio::test]
    async fn test_send_accepts_on_success_status() {
        once_cell::sync::Lazy::force(&crate::setup_tracing::TEST_TRACING);
        let base_url = spawn_provider(StatusCode::OK, r#"{"id":"msg-1"}"#).await;
        let api = api_against(base_url);

        assert_ok!(api.send(&recipients(), "daily weather", "<p>sunny</p>", "sunny").await);
    }

    #[tokio::test]
    async fn test_send_surfaces_provider_rejection() {
        once_cell::sync::Lazy::force(&crate::setup_tracing::TEST_TRACING);
        // 422 is not a transient status, so the retry middleware passes it straight through
        let base_url = spawn_provider(StatusCode::UNPROCESSABLE_ENTITY, "sender not verified").await;
        let api = api_against(base_url);

        let error = api
            .send(&recipients(), "daily weather", "<p>sunny</p>", "sunny")
            .await
            .unwrap_err();
        assert_matches!(&error, EmailError::Rejected(_));
        let report = error.to_string();
        assert!(report.contains("422"), "unexpected report: {report}");
        assert!(report.contains("sender not verified"), "unexpected report: {report}");
    }
}

mod errors {
    use thiserror::Error;
    use url::Url;

    #[derive(Debug, Error)]
    pub enum EmailError {
        #[error("supplied email API url is not a base url to query: {0}")]
        NotABaseUrl(Url),

        #[error("email API call failed: {0}")]
        HttpRequest(#[from] reqwest::Error),

        #[error("error occurred in HTTP middleware calling email API: {0}")]
        HttpMiddleware(#[from] reqwest_middleware::Error),

        #[error("email delivery rejected: {0}")]
        Rejected(String),
    }
}
