mod config;
mod conversation;
pub(crate) mod effects;
mod message_cache;
mod mute;
mod pagination;
mod room_list;
mod search;
mod selection;
mod typing;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use flume::Sender;

use crate::actions::AppAction;
use crate::backend::{current_backend, BackendError, BackendErrorKind, SharedChatBackend};
use crate::error::{CoreError, CoreResult};
use crate::model::User;
use crate::state::{now_seconds, AppState};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

pub(crate) use config::default_app_config_json;
pub use mute::{is_effectively_muted, MuteDuration};

use config::EngineLimits;
use conversation::ConversationController;

use effects::{Effect, Request, Timer};

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: config::AppConfig,
    limits: EngineLimits,
    runtime: tokio::runtime::Runtime,
    backend: SharedChatBackend,

    session: Option<ConversationController>,
    // Bumped on every login/logout; async results carry the value they were
    // dispatched under.
    session_generation: u64,
    // One live task per timer kind. Re-arming aborts the previous one.
    timers: HashMap<&'static str, tokio::task::JoinHandle<()>>,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        backend: SharedChatBackend,
    ) -> Self {
        let config = config::load_app_config(&data_dir);
        let limits = config.limits();
        tracing::info!(?limits, network = config.network_enabled(), "core config loaded");

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .build()
            .expect("tokio runtime");

        let this = Self {
            state: AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            limits,
            runtime,
            backend,
            session: None,
            session_generation: 0,
            timers: HashMap::new(),
        };

        // Ensure FfiApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    /// Re-projects the session into `state` and publishes it.
    fn emit_state(&mut self) {
        if let Some(session) = &self.session {
            session.project(&mut self.state, now_seconds());
        }
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                // Never log `?action` directly: it carries message bodies.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::Live(event) => {
                let Some(session) = self.session.as_mut() else {
                    tracing::debug!(event = event.tag(), "live event without session");
                    return;
                };
                tracing::debug!(event = event.tag(), room_id = %event.room_id(), "live event");
                let effects = session.receive(event);
                self.settle(Ok(effects));
            }
            InternalEvent::BackendCompleted {
                session,
                completion,
            } => {
                if session != self.session_generation {
                    tracing::debug!(session, "dropping completion from previous session");
                    return;
                }
                let Some(controller) = self.session.as_mut() else {
                    return;
                };
                let result = controller.complete(completion);
                self.settle(result);
            }
            InternalEvent::TimerFired { session, timer } => {
                if session != self.session_generation {
                    return;
                }
                let Some(controller) = self.session.as_mut() else {
                    return;
                };
                let effects = controller.on_timer(timer);
                self.settle(Ok(effects));
            }
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::Login { user } => {
                self.end_session();
                self.start_session(user);
            }
            AppAction::Logout => {
                self.end_session();
                self.emit_state();
            }
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_state();
                }
            }
            other => {
                let Some(session) = self.session.as_mut() else {
                    tracing::debug!(action = other.tag(), "ignored without session");
                    return;
                };
                let result = apply_action(session, other, now_seconds());
                self.settle(result);
            }
        }
    }

    /// Runs the effects of a successful step, or turns an error into a toast,
    /// then publishes the new state. Stale results change nothing.
    fn settle(&mut self, result: CoreResult<Vec<Effect>>) {
        match result {
            Ok(effects) => self.run_effects(effects),
            Err(CoreError::Stale) => {
                tracing::debug!("stale response dropped");
                return;
            }
            Err(e) => {
                match &e {
                    CoreError::Transport(err) => tracing::warn!(error = %err, "backend call failed"),
                    other => tracing::info!(error = %other, "rejected locally"),
                }
                if let Some(msg) = e.user_message() {
                    // Kept until the UI clears it so a rev-gap resync still shows it.
                    self.state.toast = Some(msg);
                }
            }
        }
        self.emit_state();
    }

    fn start_session(&mut self, user: User) {
        tracing::info!(user = %user.key(), "session started");
        let mut session = ConversationController::new(user, self.limits);
        let effects = session.refresh_rooms();
        self.session = Some(session);
        self.run_effects(effects);
        self.emit_state();
    }

    /// Drops the session and everything it owns. Work still in flight is
    /// orphaned by the generation bump.
    fn end_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            let effects = session.teardown();
            self.run_effects(effects);
            tracing::info!("session ended");
        }
        self.session_generation += 1;
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
        let toast = self.state.toast.take();
        self.state = AppState {
            rev: self.rev,
            toast,
            ..AppState::empty()
        };
    }

    fn run_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Request(request) => self.spawn_request(request),
                Effect::Schedule { timer, after } => self.schedule(timer, after),
            }
        }
    }

    fn spawn_request(&self, request: Request) {
        let tag = request.tag();
        let backend = if self.config.network_enabled() {
            current_backend(&self.backend)
        } else {
            None
        };
        if backend.is_none() {
            tracing::debug!(request = tag, "no chat backend, failing fast");
        }
        let session = self.session_generation;
        let tx = self.core_sender.clone();
        let fallback = request.clone();
        self.runtime.spawn(async move {
            let joined =
                tokio::task::spawn_blocking(move || effects::execute(backend.as_deref(), request))
                    .await;
            let completion = match joined {
                Ok(completion) => completion,
                Err(e) => {
                    tracing::error!(request = tag, %e, "backend call panicked");
                    effects::failed(
                        fallback,
                        BackendError {
                            kind: BackendErrorKind::Other,
                            message: e.to_string(),
                        },
                    )
                }
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::BackendCompleted {
                    session,
                    completion,
                },
            )));
        });
    }

    fn schedule(&mut self, timer: Timer, after: Duration) {
        let slot = match timer {
            Timer::SearchDebounce { .. } => "search_debounce",
            Timer::TypingIdle { .. } => "typing_idle",
        };
        let session = self.session_generation;
        let tx = self.core_sender.clone();
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::TimerFired {
                session,
                timer,
            })));
        });
        if let Some(previous) = self.timers.insert(slot, handle) {
            previous.abort();
        }
    }
}

fn apply_action(
    c: &mut ConversationController,
    action: AppAction,
    now: i64,
) -> CoreResult<Vec<Effect>> {
    let effects = match action {
        // Room list
        AppAction::RefreshRooms | AppAction::Foregrounded => c.refresh_rooms(),
        AppAction::LoadMoreRooms => c.load_more_rooms(),
        AppAction::SetRoomFilter { filter } => {
            c.set_filter(filter);
            vec![]
        }

        // Conversation
        AppAction::OpenRoom { room_id } => c.open_room(&room_id),
        AppAction::CloseRoom => c.close_room(),
        AppAction::LoadOlderMessages => c.load_older(),
        AppAction::SendMessage {
            room_id,
            content,
            message_type,
        } => c.send(&room_id, &content, message_type, now)?,
        AppAction::RetryMessage { message_id } => c.retry(&message_id)?,
        AppAction::DiscardMessage { message_id } => {
            c.discard(&message_id)?;
            vec![]
        }
        AppAction::ToggleReaction {
            room_id,
            message_id,
            emoji,
        } => c.toggle_reaction(&room_id, &message_id, &emoji)?,
        AppAction::DeleteForMe {
            room_id,
            message_id,
        } => c.delete_for_me(&room_id, vec![message_id])?,
        AppAction::DeleteForEveryone {
            room_id,
            message_id,
        } => c.delete_for_everyone(&room_id, vec![message_id], now)?,
        AppAction::ComposerInput => c.composer_input(),

        // Selection
        AppAction::LongPressMessage { message_id } => {
            c.long_press(&message_id)?;
            vec![]
        }
        AppAction::TapMessage { message_id } => {
            c.tap(&message_id)?;
            vec![]
        }
        AppAction::ClearSelection => {
            c.clear_selection();
            vec![]
        }
        AppAction::DismissQuickReaction => {
            c.dismiss_quick_reaction();
            vec![]
        }
        AppAction::ReactToSelection { emoji } => c.react_to_selection(&emoji)?,
        AppAction::DeleteSelectedForMe => c.delete_selected_for_me()?,
        AppAction::DeleteSelectedForEveryone => c.delete_selected_for_everyone(now)?,
        AppAction::ReplyToSelection => {
            c.reply_to_selection()?;
            vec![]
        }
        AppAction::SetReplyTarget { message_id } => {
            c.set_reply_target(&message_id)?;
            vec![]
        }
        AppAction::ClearReplyTarget => {
            c.clear_reply_target();
            vec![]
        }

        // Search
        AppAction::SearchQueryChanged { query } => c.search_query_changed(&query),
        AppAction::SearchLoadMore => c.search_load_more(),
        AppAction::CloseSearch => {
            c.close_search();
            vec![]
        }

        // Room settings
        AppAction::MuteRoom { room_id, duration } => c.mute(&room_id, duration, now),
        AppAction::UnmuteRoom { room_id } => c.unmute(&room_id),
        AppAction::SetRoomPinned { room_id, pinned } => c.set_pinned(&room_id, pinned),

        // Rooms and groups
        AppAction::CreateRoom { peer } => c.create_room(peer),
        AppAction::CreateGroup {
            name,
            description,
            members,
        } => c.create_group(&name, description, members)?,
        AppAction::AddGroupMembers { room_id, members } => c.add_members(&room_id, members)?,

        // Handled by the actor before a session is consulted.
        AppAction::Login { .. } | AppAction::Logout | AppAction::ClearToast => vec![],
    };
    Ok(effects)
}
