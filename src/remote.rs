use crate::engine::{Detector, PlateReader};
use crate::error::EngineError;
use crate::types::{Detection, PlateCandidate, Snapshot};
use futures::future::{BoxFuture, FutureExt};
use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

#[derive(Debug, Deserialize)]
struct DetectorResponse {
    #[serde(default)]
    detections: Vec<RemoteDetection>,
}

#[derive(Debug, Deserialize)]
struct RemoteDetection {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    label: String,
    #[serde(default)]
    attributes: Map<String, Value>,
}

impl From<RemoteDetection> for Detection {
    fn from(d: RemoteDetection) -> Self {
        Detection {
            center_x: d.x,
            center_y: d.y,
            width: d.width,
            height: d.height,
            confidence: d.confidence,
            class_label: d.label,
            attributes: d.attributes,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlateResponse {
    #[serde(default)]
    results: Vec<PlateResult>,
}

#[derive(Debug, Deserialize)]
struct PlateResult {
    plate: String,
    #[serde(rename = "box")]
    bbox: PlateBox,
}

#[derive(Debug, Deserialize)]
struct PlateBox {
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
}

impl From<PlateResult> for PlateCandidate {
    fn from(r: PlateResult) -> Self {
        PlateCandidate {
            text: r.plate.to_ascii_uppercase(),
            bounding_box: (r.bbox.xmin, r.bbox.ymin, r.bbox.xmax, r.bbox.ymax),
        }
    }
}

/// Posts the encoded upload to `url` and returns the response body.
async fn post_image(
    client: &reqwest::Client,
    url: &Url,
    token: Option<&str>,
    snapshot: &Snapshot,
) -> Result<Vec<u8>, EngineError> {
    let mut request = client
        .post(url.clone())
        .header("Content-Type", "application/octet-stream")
        .body(snapshot.encoded.clone());
    if let Some(token) = token {
        request = request.header("Authorization", format!("Token {}", token));
    }
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(EngineError::Status(status.as_u16()));
    }
    Ok(response.bytes().await?.to_vec())
}

fn parse<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, EngineError> {
    serde_json::from_slice(body).map_err(|e| EngineError::Malformed(e.to_string()))
}

/// Vehicle detector served over HTTP.
pub struct RemoteDetector {
    client: reqwest::Client,
    url: Url,
    token: Option<String>,
}

impl RemoteDetector {
    pub fn new(url: Url, token: Option<String>) -> Self {
        RemoteDetector {
            client: reqwest::Client::new(),
            url,
            token,
        }
    }
}

impl Detector for RemoteDetector {
    fn detect<'a>(
        &'a self,
        snapshot: &'a Snapshot,
    ) -> BoxFuture<'a, Result<Vec<Detection>, EngineError>> {
        async move {
            let body = post_image(&self.client, &self.url, self.token.as_deref(), snapshot).await?;
            let response: DetectorResponse = parse(&body)?;
            debug!("Detector returned {} detections", response.detections.len());
            Ok(response.detections.into_iter().map(Detection::from).collect())
        }
        .boxed()
    }
}

/// ALPR engine served over HTTP, answering with a `results` array of
/// plates and their boxes.
pub struct RemotePlateReader {
    client: reqwest::Client,
    url: Url,
    token: Option<String>,
}

impl RemotePlateReader {
    pub fn new(url: Url, token: Option<String>) -> Self {
        RemotePlateReader {
            client: reqwest::Client::new(),
            url,
            token,
        }
    }
}

impl PlateReader for RemotePlateReader {
    fn recognize<'a>(
        &'a self,
        snapshot: &'a Snapshot,
    ) -> BoxFuture<'a, Result<Vec<PlateCandidate>, EngineError>> {
        async move {
            let body = post_image(&self.client, &self.url, self.token.as_deref(), snapshot).await?;
            let response: PlateResponse = parse(&body)?;
            debug!("Plate reader returned {} results", response.results.len());
            Ok(response.results.into_iter().map(PlateCandidate::from).collect())
        }
        .boxed()
    }
}
