use std::time::Duration;

use energy_store::ReconstructedRecord;
use reqwest::StatusCode;
use time::macros::format_description;

use super::publisher::{PublishTransport, TransportError};
use crate::{config::PublisherConfig, transform::LocalZone};

const STATUS_PATH: &str = "/service/r2/getstatus.jsp";
const ADD_STATUS_PATH: &str = "/service/r2/addstatus.jsp";

/// PVOutput status API client.
pub struct PvOutputClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    system_id: String,
    zone: LocalZone,
}

impl PvOutputClient {
    pub fn new(cfg: &PublisherConfig, zone: LocalZone) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            system_id: cfg.system_id.clone(),
            zone,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header("X-Pvoutput-Apikey", &self.api_key)
            .header("X-Pvoutput-SystemId", &self.system_id)
            .header("X-Rate-Limit", "1")
    }
}

#[async_trait::async_trait]
impl PublishTransport for PvOutputClient {
    async fn remaining_quota(&self) -> Result<Option<u32>, TransportError> {
        let resp = self.request(reqwest::Method::GET, STATUS_PATH).send().await?;

        let remaining = resp
            .headers()
            .get("X-Rate-Limit-Remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok());

        let status = resp.status();
        if remaining.is_none() {
            if status.is_server_error() {
                return Err(TransportError::Status(status.as_u16()));
            }
            tracing::debug!(status = %status, "status response carried no rate limit");
        }
        Ok(remaining)
    }

    async fn post(&self, record: &ReconstructedRecord) -> Result<bool, TransportError> {
        let params = status_params(record, self.zone)?;
        let resp = self
            .request(reqwest::Method::POST, ADD_STATUS_PATH)
            .form(&params)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::OK {
            return Ok(true);
        }

        let body = resp.text().await.unwrap_or_default();
        tracing::warn!(
            timestamp = record.timestamp,
            status = %status,
            body = %body.trim(),
            "PVOutput rejected status"
        );
        Ok(false)
    }
}

/// Form body for `addstatus.jsp`: local date and time, the non-empty slots, and
/// `c1=1` because energy values are lifetime counters.
pub fn status_params(
    record: &ReconstructedRecord,
    zone: LocalZone,
) -> Result<Vec<(&'static str, String)>, TransportError> {
    let local = zone
        .local(record.timestamp)
        .ok_or(TransportError::Timestamp(record.timestamp))?;
    let date = local
        .format(format_description!("[year][month][day]"))
        .map_err(|_| TransportError::Timestamp(record.timestamp))?;
    let time = local
        .format(format_description!("[hour]:[minute]"))
        .map_err(|_| TransportError::Timestamp(record.timestamp))?;

    let mut params = vec![("d", date), ("t", time)];
    for (i, (name, value)) in record.slots().into_iter().enumerate() {
        let Some(value) = value else { continue };
        let formatted = match i {
            0..=3 => format!("{value:.0}"),
            4..=7 => format!("{value:.1}"),
            _ => format!("{value:.2}"),
        };
        params.push((name, formatted));
    }
    params.push(("c1", "1".to_string()));

    Ok(params)
}
