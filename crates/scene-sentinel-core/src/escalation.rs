//! Escalation Engine (C8): orchestrates the L1/L2/L3 validate/retry/drive
//! protocol described in SPEC_FULL.md §4.7. One `run` call handles exactly
//! one accepted activation end to end and reports its outcome back to the
//! gating layer's circuit breaker exactly once.

use std::sync::Arc;

use tracing::{info, warn};

use scene_sentinel_config::{TimingConfig, ToleranceConfig};

use crate::actuator::translate;
use crate::comparator::compare;
use crate::gating::GatingLayer;
use crate::hub_client::HubClient;
use crate::identity::IdentityMap;
use crate::model::{Action, FailureClass, FailureSet, Scene};
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    L1,
    L2,
    L3,
}

struct LightCheck {
    action: Action,
    entity_id: Option<String>,
    matched: bool,
}

impl LightCheck {
    /// A light is driven in L3 only if it has a resolved entity and its
    /// most recent comparison did not match (§4.7 "L3 drive scope").
    fn needs_drive(&self) -> bool {
        self.entity_id.is_some() && !self.matched
    }
}

struct ValidationPass {
    matched: bool,
    failures: FailureSet,
    checks: Vec<LightCheck>,
    /// True if any light hit an identity-unresolved or hub-I/O error this
    /// pass. Such a pass is never eligible for the color-temp-only adaptive
    /// delay, even if the comparator-level failure set happens to be empty
    /// or color-temp-only, because the error means the true attribute state
    /// of at least one light was never actually observed.
    had_error: bool,
}

pub struct EscalationEngine {
    hub: Arc<dyn HubClient>,
    identity: Arc<IdentityMap>,
    gating: Arc<GatingLayer>,
    scheduler: Arc<dyn Scheduler>,
    tolerances: ToleranceConfig,
    timing: TimingConfig,
}

impl EscalationEngine {
    pub fn new(
        hub: Arc<dyn HubClient>,
        identity: Arc<IdentityMap>,
        gating: Arc<GatingLayer>,
        scheduler: Arc<dyn Scheduler>,
        tolerances: ToleranceConfig,
        timing: TimingConfig,
    ) -> Self {
        Self {
            hub,
            identity,
            gating,
            scheduler,
            tolerances,
            timing,
        }
    }

    /// Run one escalation to completion. Intended to be spawned as its own
    /// task per activation so distinct scene-entities interleave freely
    /// while each individually suspends only at `scheduler.sleep` points
    /// (SPEC_FULL.md §5).
    pub async fn run(&self, scene: Arc<Scene>) {
        self.scheduler.sleep(self.timing.transition_delay).await;

        if scene.legacy {
            self.run_legacy(&scene).await;
            return;
        }

        let pass1 = self.validate(&scene).await;
        if pass1.matched {
            self.succeed(&scene, Level::L1);
            return;
        }

        let m1 = if only_color_temp_failure(&pass1) { 2 } else { 1 };

        if let Err(err) = self.hub.activate_scene(scene.entity_id()).await {
            warn!(scene_id = %scene.id, %err, "L2 re-activate call failed");
            self.fail(&scene, Level::L2, &pass1.failures);
            return;
        }
        self.scheduler
            .sleep(self.timing.validation_delay * m1)
            .await;

        let pass2 = self.validate(&scene).await;
        if pass2.matched {
            self.succeed(&scene, Level::L2);
            return;
        }

        let m3 = if m1 == 2 && only_color_temp_failure(&pass2) {
            3
        } else {
            1
        };
        self.scheduler
            .sleep(self.timing.validation_delay * m3)
            .await;

        for check in pass2.checks.iter().filter(|check| check.needs_drive()) {
            let entity_id = check
                .entity_id
                .as_deref()
                .expect("needs_drive implies entity_id is Some");
            let command = translate(&check.action);
            if let Err(err) = self.hub.drive_light(entity_id, command).await {
                warn!(scene_id = %scene.id, entity_id, %err, "L3 drive call failed");
            }
        }
        self.scheduler.sleep(self.timing.level3_settle_delay).await;

        let pass3 = self.validate(&scene).await;
        if pass3.matched {
            self.succeed(&scene, Level::L3);
        } else {
            warn!(
                scene_id = %scene.id,
                failures = ?pass3.failures,
                "L3 validation still failing, giving up"
            );
            self.fail(&scene, Level::L3, &pass3.failures);
        }
    }

    /// Legacy catalogs cannot be structurally compared; the re-activate call
    /// succeeding is the only signal available (§4.1, §4.7).
    async fn run_legacy(&self, scene: &Scene) {
        match self.hub.activate_scene(scene.entity_id()).await {
            Ok(()) => self.succeed(scene, Level::L2),
            Err(err) => {
                warn!(scene_id = %scene.id, %err, "legacy re-activate failed");
                self.fail(scene, Level::L2, &FailureSet::new());
            }
        }
    }

    async fn validate(&self, scene: &Scene) -> ValidationPass {
        let mut checks = Vec::with_capacity(scene.actions.len());
        let mut overall_matched = true;
        let mut failures = FailureSet::new();
        let mut had_error = false;

        for action in &scene.actions {
            let entity_id = self.identity.resolve(&action.target_rid).map(str::to_string);

            let Some(entity_id) = entity_id else {
                warn!(scene_id = %scene.id, rid = %action.target_rid, "identity unresolved");
                overall_matched = false;
                had_error = true;
                checks.push(LightCheck {
                    action: action.clone(),
                    entity_id: None,
                    matched: false,
                });
                continue;
            };

            match self.hub.read_light_state(&entity_id).await {
                Ok(observed) => {
                    let result = compare(action, &observed, &self.tolerances);
                    if !result.matched {
                        overall_matched = false;
                        failures.extend(result.failures.iter().copied());
                    }
                    checks.push(LightCheck {
                        action: action.clone(),
                        entity_id: Some(entity_id),
                        matched: result.matched,
                    });
                }
                Err(err) => {
                    warn!(scene_id = %scene.id, entity_id, %err, "state read failed");
                    overall_matched = false;
                    had_error = true;
                    checks.push(LightCheck {
                        action: action.clone(),
                        entity_id: Some(entity_id),
                        matched: false,
                    });
                }
            }
        }

        ValidationPass {
            matched: overall_matched,
            failures,
            checks,
            had_error,
        }
    }

    fn succeed(&self, scene: &Scene, level: Level) {
        info!(scene_id = %scene.id, ?level, "validation succeeded");
        self.gating.record_success(self.scheduler.now());
    }

    fn fail(&self, scene: &Scene, level: Level, failures: &FailureSet) {
        warn!(scene_id = %scene.id, ?level, ?failures, "validation failed");
        self.gating.record_failure(self.scheduler.now());
    }
}

fn only_color_temp_failure(pass: &ValidationPass) -> bool {
    !pass.had_error && pass.failures.len() == 1 && pass.failures.contains(&FailureClass::ColorTemp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub_client::SceneStateChange;
    use crate::model::LightEntity;
    use crate::scheduler::{Duration, TokioScheduler};
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use scene_sentinel_config::CircuitBreakerSettings;
    use scene_sentinel_config::{FilterConfig, RateLimitConfig};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// Each entity has a queue of scripted reads consumed one at a time;
    /// the last entry repeats once the queue is exhausted. This lets a test
    /// express "L1 sees a miss, L2 sees a recovered state" without racing
    /// real or virtual time against the engine's own sleeps.
    struct FakeHub {
        lights: StdMutex<HashMap<String, Vec<LightEntity>>>,
        activate_calls: StdMutex<u32>,
        drive_calls: StdMutex<Vec<(String, crate::actuator::DriveCommand)>>,
    }

    impl FakeHub {
        fn new(lights: Vec<(&str, Vec<LightEntity>)>) -> Self {
            Self {
                lights: StdMutex::new(
                    lights
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect(),
                ),
                activate_calls: StdMutex::new(0),
                drive_calls: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HubClient for FakeHub {
        async fn subscribe_scene_state_changes(&self) -> BoxStream<'static, SceneStateChange> {
            Box::pin(stream::empty())
        }

        async fn read_light_state(
            &self,
            entity_id: &str,
        ) -> Result<LightEntity, crate::error::HubError> {
            let mut lights = self.lights.lock().unwrap();
            let queue = lights
                .get_mut(entity_id)
                .ok_or_else(|| crate::error::HubError::StateUnavailable {
                    entity_id: entity_id.to_string(),
                })?;
            let next = if queue.len() > 1 {
                queue.remove(0)
            } else {
                queue[0].clone()
            };
            Ok(next)
        }

        async fn activate_scene(&self, _scene_entity_id: &str) -> Result<(), crate::error::HubError> {
            *self.activate_calls.lock().unwrap() += 1;
            Ok(())
        }

        async fn drive_light(
            &self,
            entity_id: &str,
            command: crate::actuator::DriveCommand,
        ) -> Result<(), crate::error::HubError> {
            self.drive_calls
                .lock()
                .unwrap()
                .push((entity_id.to_string(), command));
            Ok(())
        }
    }

    fn identity_map(pairs: &[(&str, &str)]) -> Arc<IdentityMap> {
        let json = format!(
            r#"{{"data":{{"entities":[{}]}}}}"#,
            pairs
                .iter()
                .map(|(rid, entity)| format!(
                    r#"{{"unique_id":"{rid}","entity_id":"{entity}","platform":"hue"}}"#
                ))
                .collect::<Vec<_>>()
                .join(",")
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, json).unwrap();
        Arc::new(IdentityMap::load_from_registry(&path).unwrap())
    }

    fn gating() -> Arc<GatingLayer> {
        Arc::new(
            GatingLayer::new(
                &TimingConfig {
                    transition_delay: Duration::from_secs(5),
                    validation_delay: Duration::from_secs(2),
                    level3_settle_delay: Duration::from_secs(2),
                    debounce_window: Duration::from_secs(30),
                },
                RateLimitConfig {
                    max_global_per_min: 100,
                    max_scene_per_min: 100,
                },
                CircuitBreakerSettings {
                    failure_threshold: 5,
                    success_threshold: 2,
                    timeout: Duration::from_secs(300),
                },
                &FilterConfig::default(),
            )
            .unwrap(),
        )
    }

    fn timing() -> TimingConfig {
        TimingConfig {
            transition_delay: Duration::from_secs(5),
            validation_delay: Duration::from_secs(2),
            level3_settle_delay: Duration::from_secs(2),
            debounce_window: Duration::from_secs(30),
        }
    }

    fn tolerances() -> ToleranceConfig {
        ToleranceConfig {
            brightness_tolerance: 5.0,
            color_tolerance: 0.01,
            color_temp_tolerance: 50.0,
        }
    }

    fn scene_with(actions: Vec<Action>) -> Arc<Scene> {
        Arc::new(Scene {
            id: "scene.s1".to_string(),
            name: "S1".to_string(),
            actions,
            labels: Vec::new(),
            legacy: false,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_no_actuator_calls() {
        let hub = Arc::new(FakeHub::new(vec![(
            "light.one",
            vec![LightEntity {
                on: true,
                brightness: Some(204),
                xy: None,
                mirek: None,
            }],
        )]));
        let identity = identity_map(&[("rid-1", "light.one")]);
        let gate = gating();
        let scheduler = Arc::new(TokioScheduler);
        let engine = EscalationEngine::new(
            hub.clone(),
            identity,
            gate.clone(),
            scheduler,
            tolerances(),
            timing(),
        );
        let scene = scene_with(vec![Action {
            target_rid: "rid-1".into(),
            on: true,
            brightness: Some(80.0),
            xy: None,
            mirek: None,
        }]);

        engine.run(scene).await;

        assert_eq!(*hub.activate_calls.lock().unwrap(), 0);
        assert!(hub.drive_calls.lock().unwrap().is_empty());
        assert_eq!(
            gate.breaker_state(),
            scene_sentinel_resilience::circuit_breaker::CircuitState::Closed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retrigger_recovers_at_l2() {
        // Scenario 2: L1 observes a low reading; by the time L2 reads again
        // (after the re-activate call), the light has recovered.
        let hub = Arc::new(FakeHub::new(vec![(
            "light.one",
            vec![
                LightEntity {
                    on: true,
                    brightness: Some(178), // ~69.8%, outside 80+-5
                    xy: None,
                    mirek: None,
                },
                LightEntity {
                    on: true,
                    brightness: Some(206), // ~80.8%, within tolerance
                    xy: None,
                    mirek: None,
                },
            ],
        )]));
        let identity = identity_map(&[("rid-1", "light.one")]);
        let gate = gating();
        let scheduler = Arc::new(TokioScheduler);
        let engine = EscalationEngine::new(
            hub.clone(),
            identity,
            gate.clone(),
            scheduler,
            tolerances(),
            timing(),
        );
        let scene = scene_with(vec![Action {
            target_rid: "rid-1".into(),
            on: true,
            brightness: Some(80.0),
            xy: None,
            mirek: None,
        }]);

        engine.run(scene).await;

        assert_eq!(*hub.activate_calls.lock().unwrap(), 1);
        assert!(hub.drive_calls.lock().unwrap().is_empty());
        assert_eq!(
            gate.breaker_state(),
            scene_sentinel_resilience::circuit_breaker::CircuitState::Closed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn legacy_scene_counts_reactivate_as_success() {
        let hub = Arc::new(FakeHub::new(vec![]));
        let identity = identity_map(&[]);
        let gate = gating();
        let scheduler = Arc::new(TokioScheduler);
        let engine = EscalationEngine::new(
            hub.clone(),
            identity,
            gate.clone(),
            scheduler,
            tolerances(),
            timing(),
        );
        let scene = Arc::new(Scene {
            id: "scene.legacy".to_string(),
            name: "Legacy".to_string(),
            actions: Vec::new(),
            labels: Vec::new(),
            legacy: true,
        });

        engine.run(scene).await;

        assert_eq!(*hub.activate_calls.lock().unwrap(), 1);
        assert_eq!(
            gate.breaker_state(),
            scene_sentinel_resilience::circuit_breaker::CircuitState::Closed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_failures_drive_only_failing_lights_at_l3() {
        let hub = Arc::new(FakeHub::new(vec![
            (
                "light.a",
                vec![LightEntity {
                    on: true,
                    brightness: Some(100), // wrong, stays wrong
                    xy: None,
                    mirek: None,
                }],
            ),
            (
                "light.b",
                vec![LightEntity {
                    on: false, // wrong, stays wrong
                    brightness: None,
                    xy: None,
                    mirek: None,
                }],
            ),
        ]));
        let identity = identity_map(&[("rid-a", "light.a"), ("rid-b", "light.b")]);
        let gate = gating();
        let scheduler = Arc::new(TokioScheduler);
        let engine = EscalationEngine::new(
            hub.clone(),
            identity,
            gate.clone(),
            scheduler,
            tolerances(),
            timing(),
        );
        let scene = scene_with(vec![
            Action {
                target_rid: "rid-a".into(),
                on: true,
                brightness: Some(80.0),
                xy: None,
                mirek: None,
            },
            Action {
                target_rid: "rid-b".into(),
                on: true,
                brightness: None,
                xy: None,
                mirek: None,
            },
        ]);

        engine.run(scene).await;

        assert_eq!(*hub.activate_calls.lock().unwrap(), 1);
        assert_eq!(hub.drive_calls.lock().unwrap().len(), 2);
        assert_eq!(
            gate.breaker_state(),
            scene_sentinel_resilience::circuit_breaker::CircuitState::Closed
        );
    }
}
