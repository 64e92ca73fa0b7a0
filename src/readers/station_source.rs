use crate::error::{FetchFailure, HarvestError, Result};
use reqwest::Client;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Placeholder replaced by the station identifier in resource templates.
pub const STATION_PLACEHOLDER: &str = "{station}";

/// Retrieves the raw record table for one station.
///
/// Implementations must be cheap to share across tasks; the fetcher holds a
/// single instance behind an `Arc`.
pub trait StationSource: Send + Sync + 'static {
    /// Location the station's records are read from, used in logs and errors.
    fn locate(&self, station: &str) -> String;

    /// The payload exactly as served; callers decide how to decode it.
    fn fetch(&self, station: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// The client used for every NCEI download: identified, and bounded by `timeout`.
pub fn http_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .user_agent(concat!("ghcn-harvester/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Resource address parameterized solely by the station identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTemplate {
    template: String,
}

impl ResourceTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains(STATION_PLACEHOLDER) {
            return Err(HarvestError::InvalidConfig(format!(
                "resource template '{}' has no {} placeholder",
                template, STATION_PLACEHOLDER
            )));
        }
        Ok(Self { template })
    }

    pub fn render(&self, station: &str) -> String {
        self.template.replace(STATION_PLACEHOLDER, station)
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

/// Fetches station tables over HTTP(S).
pub struct HttpSource {
    client: Client,
    template: ResourceTemplate,
}

impl HttpSource {
    pub fn new(template: ResourceTemplate, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            template,
        })
    }

    pub fn with_client(template: ResourceTemplate, client: Client) -> Self {
        Self { client, template }
    }
}

impl StationSource for HttpSource {
    fn locate(&self, station: &str) -> String {
        self.template.render(station)
    }

    fn fetch(&self, station: &str) -> impl Future<Output = Result<Vec<u8>>> + Send {
        let url = self.locate(station);
        let station = station.to_string();
        let client = self.client.clone();

        async move {
            let failed = |reason: FetchFailure| HarvestError::StationFetchFailed {
                station: station.clone(),
                url: url.clone(),
                reason,
            };

            debug!(station = %station, "Downloading {}", url);
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| failed(FetchFailure::Transport(e.to_string())))?;

            let status = response.status();
            if !status.is_success() {
                return Err(failed(FetchFailure::Status(status.as_u16())));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| failed(FetchFailure::Transport(e.to_string())))?;
            Ok(body.to_vec())
        }
    }
}

/// Reads station tables from a local mirror, e.g. a previous `mirror` run.
pub struct LocalSource {
    root: PathBuf,
    template: ResourceTemplate,
}

impl LocalSource {
    /// `template` is relative to `root`, e.g. `{station}.csv`.
    pub fn new(root: impl Into<PathBuf>, template: ResourceTemplate) -> Self {
        Self {
            root: root.into(),
            template,
        }
    }
}

impl StationSource for LocalSource {
    fn locate(&self, station: &str) -> String {
        self.root
            .join(self.template.render(station))
            .to_string_lossy()
            .into_owned()
    }

    fn fetch(&self, station: &str) -> impl Future<Output = Result<Vec<u8>>> + Send {
        let path = self.locate(station);
        let station = station.to_string();

        async move {
            tokio::fs::read(&path)
                .await
                .map_err(|e| HarvestError::StationFetchFailed {
                    station,
                    url: path.clone(),
                    reason: FetchFailure::Transport(e.to_string()),
                })
        }
    }
}
