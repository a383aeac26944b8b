//! Process events.
//!
//! An optional observer surface: when a sender is attached, the engine emits
//! one event per run/phase/dimension milestone. Send failures are ignored so
//! a slow or dropped receiver never affects the run.

use tokio::sync::mpsc;

/// The five engine phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreProcess,
    Plan,
    Execute,
    Finalize,
    PostProcess,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PreProcess => "pre-process",
            Self::Plan => "plan",
            Self::Execute => "execute",
            Self::Finalize => "finalize",
            Self::PostProcess => "post-process",
        }
    }
}

/// Execution milestone emitted to the attached observer.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    ProcessStarted {
        process_id: String,
        section_count: usize,
    },
    PhaseStarted {
        process_id: String,
        phase: Phase,
    },
    DimensionStarted {
        process_id: String,
        dimension: String,
        section_index: Option<usize>,
    },
    DimensionCompleted {
        process_id: String,
        dimension: String,
        section_index: Option<usize>,
        success: bool,
    },
    SectionsTransformed {
        process_id: String,
        dimension: String,
        section_count: usize,
    },
    ProcessCompleted {
        process_id: String,
        duration_ms: u64,
    },
}

/// Fire-and-forget event emitter.
#[derive(Clone, Default)]
pub struct EventEmitter {
    sender: Option<mpsc::Sender<ProcessEvent>>,
}

impl EventEmitter {
    pub fn new(sender: Option<mpsc::Sender<ProcessEvent>>) -> Self {
        Self { sender }
    }

    pub async fn emit(&self, event: ProcessEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event).await;
        }
    }
}
