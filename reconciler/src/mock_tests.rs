use crate::{
    core::{HasSpec, HasStatus, ObjectMeta, Resource, ResourceExt},
    runtime::{
        async_trait,
        events::EventType,
        memory::{MemoryRecorder, MemoryStore},
        reflector::{self, reflector},
        trigger_self, Config, Controller, Outcome, ReconcileKind, Reconciler, ReconcilerEvent,
    },
};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Hack {
    metadata: ObjectMeta,
    spec: HackSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<HackStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct HackSpec {
    num: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HackStatus {
    observed_generation: i64,
    doubled: u32,
}

impl Resource for Hack {
    const KIND: &'static str = "Hack";
    const PLURAL: &'static str = "hacks";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl HasSpec for Hack {
    type Spec = HackSpec;

    fn spec(&self) -> &HackSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut HackSpec {
        &mut self.spec
    }
}

impl HasStatus for Hack {
    type Status = HackStatus;

    fn status(&self) -> Option<&HackStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut Option<HackStatus> {
        &mut self.status
    }
}

impl Hack {
    fn test(name: &str, num: u32) -> Self {
        Hack {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("default".into()),
                ..ObjectMeta::default()
            },
            spec: HackSpec { num },
            status: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("refusing to double {0}")]
struct TooBig(u32);

/// Doubles `spec.num` into the status, and counts cleanups of deleted objects
#[derive(Default)]
struct Doubler {
    cleanups: AtomicUsize,
}

#[async_trait]
impl ReconcileKind<Hack> for Doubler {
    type Error = TooBig;

    async fn reconcile_kind(&self, hack: &mut Hack) -> Outcome<TooBig> {
        if hack.is_deleting() {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            return ReconcilerEvent::normal("CleanedUp", format!("cleaned up {}", hack.name_any())).into();
        }
        let num = hack.spec.num;
        if num > 1000 {
            return Outcome::Failure(TooBig(num));
        }
        hack.status = Some(HackStatus {
            observed_generation: hack.generation(),
            doubled: num * 2,
        });
        Outcome::Success
    }
}

/// A spawned controller wired to an in-memory store
struct TestContext {
    store: MemoryStore<Hack>,
    recorder: MemoryRecorder,
    reconciler: Arc<Doubler>,
    stop: tokio::sync::oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestContext {
    fn start(store: MemoryStore<Hack>) -> Self {
        let config = Config::from_yaml("agentName: hack-controller\nfinalizerName: hacks.example.com/cleanup\nworkers: 2\n")
            .expect("valid config");
        let recorder = MemoryRecorder::new();
        let reconciler = Arc::new(Doubler::default());
        let (cache, writer) = reflector::store();
        let engine = Reconciler::new(
            Arc::new(store.clone()),
            Arc::new(cache),
            Arc::new(recorder.clone()),
            SharedDoubler(reconciler.clone()),
        )
        .with_config(&config);
        let controller = Controller::new(engine, &config);
        let triggers = trigger_self(reflector(writer, store.watch()));
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(controller.run(triggers, async move {
            let _ = stopped.await;
        }));
        Self {
            store,
            recorder,
            reconciler,
            stop,
            handle,
        }
    }

    async fn shutdown(self) {
        self.stop.send(()).expect("controller running");
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("timeout on controller shutdown")
            .expect("controller exited cleanly");
    }

    fn get(&self, name: &str) -> Option<Hack> {
        self.store.peek(Some("default"), name)
    }

    /// Poll until `check` passes, letting paused time run forward
    async fn eventually(&self, mut check: impl FnMut(&Self) -> Result<()>) {
        let mut last = Ok(());
        for _ in 0..200 {
            last = check(self);
            if last.is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("condition never held: {last:?}");
    }
}

struct SharedDoubler(Arc<Doubler>);

#[async_trait]
impl ReconcileKind<Hack> for SharedDoubler {
    type Error = TooBig;

    async fn reconcile_kind(&self, hack: &mut Hack) -> Outcome<TooBig> {
        self.0.reconcile_kind(hack).await
    }
}

fn status_of(ctx: &TestContext, name: &str) -> Result<HackStatus> {
    match ctx.get(name).and_then(|h| h.status) {
        Some(status) => Ok(status),
        None => bail!("{name} has no status yet"),
    }
}

#[tokio::test]
async fn controller_tracks_spec_and_releases_on_delete() {
    tokio::time::pause();
    let store = MemoryStore::new();
    store.create(Hack::test("h1", 2)).unwrap();
    let ctx = TestContext::start(store);

    ctx.eventually(|ctx| {
        let status = status_of(ctx, "h1")?;
        if status.doubled != 4 {
            bail!("unexpected status {status:?}");
        }
        Ok(())
    })
    .await;
    let h1 = ctx.get("h1").unwrap();
    assert_eq!(h1.finalizers(), ["hacks.example.com/cleanup"]);
    assert_eq!(h1.status.as_ref().unwrap().observed_generation, 1);

    let mut bumped = h1.clone();
    bumped.spec.num = 5;
    ctx.store.update(bumped).unwrap();
    ctx.eventually(|ctx| {
        let status = status_of(ctx, "h1")?;
        if status.observed_generation != 2 || status.doubled != 10 {
            bail!("unexpected status {status:?}");
        }
        Ok(())
    })
    .await;

    ctx.store.delete(Some("default"), "h1").unwrap();
    ctx.eventually(|ctx| match ctx.get("h1") {
        None => Ok(()),
        Some(h) => bail!("still present with finalizers {:?}", h.finalizers()),
    })
    .await;
    // a stale cache may replay the cleanup, which has to be idempotent anyway
    assert!(ctx.reconciler.cleanups.load(Ordering::SeqCst) >= 1);

    let reasons = ctx.recorder.reasons();
    assert!(reasons.contains(&(EventType::Normal, "FinalizerUpdate".to_string())));
    assert!(reasons.contains(&(EventType::Normal, "CleanedUp".to_string())));
    assert!(!reasons.contains(&(EventType::Warning, "InternalError".to_string())));
    ctx.shutdown().await;
}

#[tokio::test]
async fn failing_objects_are_retried_and_reported() {
    tokio::time::pause();
    let store = MemoryStore::new();
    store.create(Hack::test("big", 5000)).unwrap();
    let ctx = TestContext::start(store);

    ctx.eventually(|ctx| {
        let failures = ctx
            .recorder
            .reasons()
            .into_iter()
            .filter(|(ty, reason)| *ty == EventType::Warning && reason == "InternalError")
            .count();
        if failures < 3 {
            bail!("only {failures} failures so far");
        }
        Ok(())
    })
    .await;
    // the finalizer goes on before business logic, even when that logic fails
    let big = ctx.get("big").unwrap();
    assert_eq!(big.finalizers(), ["hacks.example.com/cleanup"]);
    assert!(big.status.is_none());

    let mut fixed = big.clone();
    fixed.spec.num = 7;
    ctx.store.update(fixed).unwrap();
    ctx.eventually(|ctx| {
        let status = status_of(ctx, "big")?;
        if status.doubled != 14 {
            bail!("unexpected status {status:?}");
        }
        Ok(())
    })
    .await;
    ctx.shutdown().await;
}
