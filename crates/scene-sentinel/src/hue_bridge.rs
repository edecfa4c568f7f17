//! A `HubClient` backed by a Philips Hue bridge's CLIP v2 API: HTTPS REST
//! for reads and commands, the bridge's own SSE eventstream for scene
//! activation notifications. Grounded in the CLIP v2 resource shapes used
//! throughout the catalog/registry formats this workspace already parses
//! (on.on, dimming.brightness, color.xy, color_temperature.mirek).

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use scene_sentinel_core::actuator::DriveCommand;
use scene_sentinel_core::error::HubError;
use scene_sentinel_core::hub_client::{HubClient, SceneStateChange};
use scene_sentinel_core::model::{LightEntity, Xy};

pub struct HueBridgeClient {
    http: reqwest::Client,
    base_url: String,
    app_key: String,
}

impl HueBridgeClient {
    /// `base_url` is the bridge's `https://<ip>` root. Hue bridges present a
    /// certificate signed by Philips' own CA rather than a public one, so
    /// the client accepts it explicitly instead of failing closed on every
    /// local install.
    pub fn new(base_url: String, app_key: String) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            http,
            base_url,
            app_key,
        })
    }

    fn resource_url(&self, kind: &str, id: &str) -> String {
        format!("{}/clip/v2/resource/{kind}/{id}", self.base_url)
    }

    fn call_failed(&self, entity_id: &str, err: impl std::fmt::Display) -> HubError {
        HubError::CallFailed {
            entity_id: entity_id.to_string(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResourceEnvelope<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct LightResource {
    on: OnState,
    dimming: Option<DimmingState>,
    color: Option<ColorState>,
    color_temperature: Option<ColorTempState>,
}

#[derive(Debug, Deserialize)]
struct OnState {
    on: bool,
}

#[derive(Debug, Deserialize)]
struct DimmingState {
    brightness: f64,
}

#[derive(Debug, Deserialize)]
struct ColorState {
    xy: XyState,
}

#[derive(Debug, Deserialize)]
struct XyState {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct ColorTempState {
    mirek: Option<f64>,
}

#[async_trait]
impl HubClient for HueBridgeClient {
    async fn subscribe_scene_state_changes(&self) -> BoxStream<'static, SceneStateChange> {
        let url = format!("{}/eventstream/clip/v2", self.base_url);
        let response = match self
            .http
            .get(&url)
            .header("hue-application-key", &self.app_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "failed to open hue eventstream, scene activations will not be observed");
                return Box::pin(stream::empty());
            }
        };

        let last_active: StdMutex<std::collections::HashMap<String, String>> =
            StdMutex::new(std::collections::HashMap::new());

        Box::pin(
            response
                .bytes_stream()
                .filter_map(move |chunk| {
                    let changes = chunk.ok().map(|bytes| parse_sse_scene_events(&bytes));
                    async move { changes }
                })
                .flat_map(stream::iter)
                .filter_map(move |(scene_id, new_active)| {
                    let old_state = last_active
                        .lock()
                        .expect("last_active mutex poisoned")
                        .insert(scene_id.clone(), new_active.clone());
                    async move {
                        Some(SceneStateChange {
                            scene_entity_id: scene_id,
                            old_state,
                            new_state: new_active,
                        })
                    }
                }),
        )
    }

    async fn read_light_state(&self, entity_id: &str) -> Result<LightEntity, HubError> {
        let url = self.resource_url("light", entity_id);
        let response = self
            .http
            .get(&url)
            .header("hue-application-key", &self.app_key)
            .send()
            .await
            .map_err(|err| self.call_failed(entity_id, err))?;

        let envelope: ResourceEnvelope<LightResource> = response
            .json()
            .await
            .map_err(|err| self.call_failed(entity_id, err))?;

        let light = envelope
            .data
            .into_iter()
            .next()
            .ok_or_else(|| HubError::StateUnavailable {
                entity_id: entity_id.to_string(),
            })?;

        Ok(LightEntity {
            on: light.on.on,
            brightness: light
                .dimming
                .map(|d| ((d.brightness / 100.0) * 255.0).round() as u8),
            xy: light.color.map(|c| Xy {
                x: c.xy.x,
                y: c.xy.y,
            }),
            mirek: light.color_temperature.and_then(|c| c.mirek),
        })
    }

    async fn activate_scene(&self, scene_entity_id: &str) -> Result<(), HubError> {
        let url = self.resource_url("scene", scene_entity_id);
        let body = json!({ "recall": { "action": "active" } });
        self.http
            .put(&url)
            .header("hue-application-key", &self.app_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| self.call_failed(scene_entity_id, err))?
            .error_for_status()
            .map_err(|err| self.call_failed(scene_entity_id, err))?;
        Ok(())
    }

    async fn drive_light(
        &self,
        entity_id: &str,
        command: DriveCommand,
    ) -> Result<(), HubError> {
        let url = self.resource_url("light", entity_id);
        let mut body = json!({ "on": { "on": command.on } });
        if let Some(brightness) = command.brightness {
            body["dimming"] = json!({ "brightness": brightness as f64 / 255.0 * 100.0 });
        }
        if let Some((x, y)) = command.xy {
            body["color"] = json!({ "xy": { "x": x, "y": y } });
        }
        if let Some(mirek) = command.mirek {
            body["color_temperature"] = json!({ "mirek": mirek });
        }

        self.http
            .put(&url)
            .header("hue-application-key", &self.app_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| self.call_failed(entity_id, err))?
            .error_for_status()
            .map_err(|err| self.call_failed(entity_id, err))?;
        Ok(())
    }
}

/// The bridge eventstream sends newline-delimited `data: [...]` frames, each
/// holding a JSON array of resource events. Only scene activations carry a
/// `status.active` field; everything else is ignored here.
fn parse_sse_scene_events(bytes: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(bytes);
    let mut changes = Vec::new();

    for line in text.lines() {
        let Some(payload) = line.strip_prefix("data: ") else {
            continue;
        };
        let Ok(events) = serde_json::from_str::<Vec<SseEvent>>(payload) else {
            continue;
        };
        for event in events {
            for item in event.data {
                if let (Some(id), Some(active)) = (item.id, item.status.map(|s| s.active)) {
                    changes.push((id, active));
                }
            }
        }
    }

    changes
}

#[derive(Debug, Deserialize)]
struct SseEvent {
    #[serde(default)]
    data: Vec<SseResourceItem>,
}

#[derive(Debug, Deserialize)]
struct SseResourceItem {
    id: Option<String>,
    status: Option<SseSceneStatus>,
}

#[derive(Debug, Deserialize)]
struct SseSceneStatus {
    active: String,
}
