mod actions;
mod backend;
mod core;
mod error;
mod logging;
mod model;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use backend::*;
pub use crate::core::MuteDuration;
pub use error::*;
pub use model::*;
pub use state::*;
pub use updates::*;

/// Return the default `citadel_config.json` payload used when no config file exists.
pub fn default_config_json() -> String {
    core::default_app_config_json()
}

/// Parses the short labels used by settings screens ("8h", "24h", "always").
#[uniffi::export]
pub fn parse_mute_duration(input: &str) -> Option<MuteDuration> {
    input.parse().ok()
}

/// Whether the room should be presented as muted right now. An expired mute
/// reads as unmuted even if the stored flag is still set.
#[uniffi::export]
pub fn is_room_muted(room: ChatRoom) -> bool {
    core::is_effectively_muted(&room, now_seconds())
}

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

#[derive(uniffi::Object)]
pub struct FfiApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    chat_backend: SharedChatBackend,
}

#[uniffi::export]
impl FfiApp {
    #[uniffi::constructor]
    pub fn new(data_dir: String) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "FfiApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));
        let chat_backend: SharedChatBackend = Arc::new(RwLock::new(None));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let backend_for_core = chat_backend.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                backend_for_core,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            chat_backend,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    pub fn set_chat_backend(&self, backend: Box<dyn ChatBackend>) {
        let backend: Arc<dyn ChatBackend> = Arc::from(backend);
        match self.chat_backend.write() {
            Ok(mut slot) => {
                *slot = Some(backend);
            }
            Err(poison) => {
                *poison.into_inner() = Some(backend);
            }
        }
    }

    /// Entry point for the platform's realtime transport.
    pub fn push_live_event(&self, event: LiveEvent) {
        let _ = self
            .core_tx
            .send(CoreMsg::Internal(Box::new(InternalEvent::Live(event))));
    }
}

impl FfiApp {
    pub fn set_chat_backend_for_tests(&self, backend: Arc<dyn ChatBackend>) {
        match self.chat_backend.write() {
            Ok(mut slot) => {
                *slot = Some(backend);
            }
            Err(poison) => {
                *poison.into_inner() = Some(backend);
            }
        }
    }
}
