use crate::backend::LiveEvent;
use crate::core::effects::{Completion, Timer};
use crate::state::AppState;
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    // Realtime transport
    Live(LiveEvent),

    // Async results. `session` is the session generation the work was
    // dispatched under; anything from an earlier session is dropped.
    BackendCompleted { session: u64, completion: Completion },
    TimerFired { session: u64, timer: Timer },
}
