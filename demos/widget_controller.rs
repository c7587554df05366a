use anyhow::Result;
use clap::Parser;
use reconciler::{
    core::{HasSpec, HasStatus, ObjectMeta, Resource, ResourceExt},
    runtime::{
        async_trait,
        memory::MemoryStore,
        reflector::{self, reflector},
        trigger_self, Config, Controller, Outcome, ReconcileKind, Reconciler, ReconcilerEvent,
        TracingRecorder,
    },
};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, path::PathBuf, sync::Arc, time::Duration};
use tracing::info;

/// Runs a widget controller against an in-memory store and plays through a few user edits
#[derive(Parser)]
struct App {
    /// Controller config (YAML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of widgets to create up front
    #[arg(long, default_value_t = 3)]
    widgets: usize,
    /// Largest size the controller agrees to provision
    #[arg(long, default_value_t = 10)]
    max_size: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Widget {
    metadata: ObjectMeta,
    spec: WidgetSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<WidgetStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct WidgetSpec {
    size: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WidgetStatus {
    observed_generation: i64,
    provisioned: u32,
}

impl Resource for Widget {
    const KIND: &'static str = "Widget";
    const PLURAL: &'static str = "widgets";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl HasSpec for Widget {
    type Spec = WidgetSpec;

    fn spec(&self) -> &WidgetSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut WidgetSpec {
        &mut self.spec
    }
}

impl HasStatus for Widget {
    type Status = WidgetStatus;

    fn status(&self) -> Option<&WidgetStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut Option<WidgetStatus> {
        &mut self.status
    }
}

struct Provisioner {
    max_size: u32,
}

#[async_trait]
impl ReconcileKind<Widget> for Provisioner {
    type Error = Infallible;

    async fn reconcile_kind(&self, widget: &mut Widget) -> Outcome<Infallible> {
        if widget.is_deleting() {
            info!(widget = %widget.name_any(), "releasing provisioned capacity");
            return ReconcilerEvent::normal("Released", "released provisioned capacity").into();
        }
        let size = widget.spec.size;
        if size > self.max_size {
            return ReconcilerEvent::warning(
                "TooLarge",
                format!("size {size} exceeds the limit of {}", self.max_size),
            )
            .into();
        }
        widget.status = Some(WidgetStatus {
            observed_generation: widget.generation(),
            provisioned: size,
        });
        Outcome::Success
    }
}

fn widget(name: &str, size: u32) -> Widget {
    Widget {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some("default".into()),
            ..ObjectMeta::default()
        },
        spec: WidgetSpec { size },
        status: None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let app = App::parse();
    let config = match &app.config {
        Some(path) => Config::from_file(path)?,
        None => Config {
            finalizer_name: Some("widgets.example.com/cleanup".into()),
            ..Config::default()
        },
    };

    let store = MemoryStore::<Widget>::new();
    for i in 0..app.widgets {
        store.create(widget(&format!("widget-{i}"), u32::try_from(i)? + 1))?;
    }

    let (cache, writer) = reflector::store();
    let engine = Reconciler::new(
        Arc::new(store.clone()),
        Arc::new(cache),
        Arc::new(TracingRecorder::new(config.agent_name.clone())),
        Provisioner {
            max_size: app.max_size,
        },
    )
    .with_config(&config);
    let controller = Controller::new(engine, &config);
    let triggers = trigger_self(reflector(writer, store.watch()));
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(controller.run(triggers, async move {
        let _ = stopped.await;
    }));

    tokio::time::sleep(Duration::from_millis(500)).await;
    if let Some(mut first) = store.peek(Some("default"), "widget-0") {
        info!("resizing widget-0 beyond the limit");
        first.spec.size = app.max_size + 1;
        // unconditional, like a user overwriting the object
        first.metadata.resource_version = None;
        store.update(first)?;
    }
    if app.widgets > 1 {
        info!("deleting widget-1");
        store.delete(Some("default"), "widget-1")?;
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    for w in store.list() {
        info!(
            widget = %w.name_any(),
            size = w.spec.size,
            finalizers = ?w.finalizers(),
            status = ?w.status,
            "final state"
        );
    }
    let _ = stop.send(());
    running.await?;
    Ok(())
}
