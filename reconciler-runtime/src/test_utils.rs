use reconciler_core::{HasSpec, HasStatus, ObjectMeta, Resource};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub metadata: ObjectMeta,
    pub spec: WidgetSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WidgetStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetSpec {
    pub size: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetStatus {
    pub observed_generation: i64,
    pub ready: bool,
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

/// An unpersisted widget; `MemoryStore::create` assigns version fields
pub fn widget(namespace: &str, name: &str) -> Widget {
    Widget {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            ..ObjectMeta::default()
        },
        spec: WidgetSpec { size: 1 },
        status: None,
    }
}
