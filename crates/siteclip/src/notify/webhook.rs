use std::time::Duration;

use reqwest::blocking::Client;

use super::{JobNotification, Notifier};
use crate::error::NotifyError;

/// POSTs each notification as JSON to a fixed URL.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NotifyError::Config(format!(
                "webhook URL must use http or https: {}",
                url
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notification: &JobNotification) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(notification).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        tracing::debug!(job_id = %notification.job_id, url = %self.url, "webhook delivered");
        Ok(())
    }
}
