//! Report delivery for the `check` command.
//!
//! Every report is recorded for the command output. With delivery enabled it
//! is also POSTed to its endpoint on a background tokio task; the tasks are
//! awaited only once the check has finished.

use std::cell::RefCell;
use std::time::Duration;

use csp_core::{ReportTransport, REPORT_CONTENT_TYPE};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use url::Url;

/// Outcome of one POST.
#[derive(Debug, serde::Serialize)]
pub struct Delivery {
    pub endpoint: String,
    pub status: Option<u16>,
    pub error: Option<String>,
}

struct Sender {
    client: reqwest::Client,
    runtime: Handle,
    pending: RefCell<Vec<JoinHandle<Delivery>>>,
}

pub struct ReportSink {
    sent: RefCell<Vec<(Url, Vec<u8>)>>,
    sender: Option<Sender>,
}

impl ReportSink {
    /// Record reports without sending them.
    pub fn recording() -> Self {
        Self {
            sent: RefCell::default(),
            sender: None,
        }
    }

    /// Record reports and POST them on `runtime`.
    pub fn delivering(runtime: Handle) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            sent: RefCell::default(),
            sender: Some(Sender {
                client,
                runtime,
                pending: RefCell::default(),
            }),
        })
    }

    /// `(endpoint, JSON body)` in send order.
    pub fn reports(&self) -> Result<Vec<(String, serde_json::Value)>, String> {
        self.sent
            .borrow()
            .iter()
            .map(|(endpoint, body)| {
                serde_json::from_slice(body)
                    .map(|json| (endpoint.to_string(), json))
                    .map_err(|e| format!("Report body is not JSON: {}", e))
            })
            .collect()
    }

    /// Wait for every outstanding delivery.
    pub async fn finish(&self) -> Vec<Delivery> {
        let pending = match &self.sender {
            Some(sender) => sender.pending.take(),
            None => return Vec::new(),
        };

        let mut deliveries = Vec::with_capacity(pending.len());
        for handle in pending {
            match handle.await {
                Ok(delivery) => deliveries.push(delivery),
                Err(e) => log::warn!("report delivery task failed: {e}"),
            }
        }
        deliveries
    }
}

impl ReportTransport for ReportSink {
    fn send_violation_report(&self, endpoint: &Url, body: Vec<u8>) {
        if let Some(sender) = &self.sender {
            let task = post_report(sender.client.clone(), endpoint.clone(), body.clone());
            sender.pending.borrow_mut().push(sender.runtime.spawn(task));
        }
        self.sent.borrow_mut().push((endpoint.clone(), body));
    }
}

async fn post_report(client: reqwest::Client, endpoint: Url, body: Vec<u8>) -> Delivery {
    let result = client
        .post(endpoint.clone())
        .header(reqwest::header::CONTENT_TYPE, REPORT_CONTENT_TYPE)
        .body(body)
        .send()
        .await;

    match result {
        Ok(response) => {
            log::debug!("delivered report to {endpoint}: {}", response.status());
            Delivery {
                endpoint: endpoint.to_string(),
                status: Some(response.status().as_u16()),
                error: None,
            }
        }
        Err(e) => {
            log::warn!("failed to deliver report to {endpoint}: {e}");
            Delivery {
                endpoint: endpoint.to_string(),
                status: None,
                error: Some(e.to_string()),
            }
        }
    }
}
