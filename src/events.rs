use crate::task::TaskId;
use std::fmt;

#[derive(Debug, Clone)]
pub enum SceneEvent {
    TaskAdded { id: TaskId },
    TaskToggled { id: TaskId, completed: bool },
    TaskRemoved { id: TaskId },
    GlyphReady,
    GlyphFailed { message: String },
    SceneRebuilt { objects: usize },
}

impl fmt::Display for SceneEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneEvent::TaskAdded { id } => write!(f, "TaskAdded id={id}"),
            SceneEvent::TaskToggled { id, completed } => {
                write!(f, "TaskToggled id={id} completed={completed}")
            }
            SceneEvent::TaskRemoved { id } => write!(f, "TaskRemoved id={id}"),
            SceneEvent::GlyphReady => write!(f, "GlyphReady"),
            SceneEvent::GlyphFailed { message } => write!(f, "GlyphFailed {message}"),
            SceneEvent::SceneRebuilt { objects } => write!(f, "SceneRebuilt objects={objects}"),
        }
    }
}

#[derive(Default)]
pub struct EventBus {
    events: Vec<SceneEvent>,
}

impl EventBus {
    pub fn push(&mut self, event: SceneEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<SceneEvent> {
        self.events.drain(..).collect()
    }
}
