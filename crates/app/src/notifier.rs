use async_trait::async_trait;
use url::Url;

use common::notify::{Notifier, NotifyError, NotifyRequest};

const API_KEY_HEADER: &str = "x-api-key";

/// Presence notifications through the push relay's `POST /notify-online`
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpNotifier {
    pub fn new(relay_url: &Url, api_key: Option<String>) -> Result<Self, url::ParseError> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: notify_online_url(relay_url)?,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// `{relay}/notify-online`, keeping any path prefix of the relay URL
fn notify_online_url(relay_url: &Url) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{}/notify-online",
        relay_url.as_str().trim_end_matches('/')
    ))
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify_online(&self, request: NotifyRequest) -> Result<(), NotifyError> {
        let mut builder = self.client.post(self.endpoint.clone()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }

        tracing::debug!("notified {} that {} is online", request.to_uid, request.from_login);
        Ok(())
    }
}
