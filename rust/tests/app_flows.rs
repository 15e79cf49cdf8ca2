use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use citadel_core::{
    AckResult, AppAction, AppReconciler, AppState, AppUpdate, BackendError, BackendErrorKind,
    ChatBackend, ChatRoom, FfiApp, LastMessage, LiveEvent, Message, MessageDeliveryState,
    MessagePage, MessagePageResult, MessageResult, MessageType, MuteDuration, OutgoingMessage,
    ReceiptStatus, RoomKind, RoomPage, RoomPageResult, RoomResult, SearchPage, SearchPageResult,
    User, UserRef,
};
use tempfile::tempdir;

fn write_config(data_dir: &str, disable_network: bool) {
    let path = std::path::Path::new(data_dir).join("citadel_config.json");
    let v = serde_json::json!({
        "disable_network": disable_network,
        "search_debounce_ms": 80,
        "typing_idle_ms": 200,
    });
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

struct TestReconciler {
    updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl TestReconciler {
    fn new() -> (Self, Arc<Mutex<Vec<AppUpdate>>>) {
        let updates = Arc::new(Mutex::new(vec![]));
        (
            Self {
                updates: updates.clone(),
            },
            updates,
        )
    }
}

impl AppReconciler for TestReconciler {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

fn user(id: i64, first_name: &str) -> User {
    User {
        id: Some(id),
        employee_code: None,
        first_name: first_name.into(),
        last_name: None,
        avatar_url: None,
    }
}

fn me() -> User {
    user(1, "Ana")
}

fn bob() -> User {
    user(2, "Bob")
}

fn message(id: &str, room_id: &str, sender: User, content: &str, created_at: i64) -> Message {
    Message {
        id: id.into(),
        room_id: room_id.into(),
        sender,
        content: content.into(),
        message_type: MessageType::Text,
        created_at,
        is_edited: false,
        is_deleted: false,
        is_forwarded: false,
        parent: None,
        reactions: vec![],
        receipt: ReceiptStatus::None,
    }
}

fn direct_room(id: &str, last: Option<&Message>) -> ChatRoom {
    ChatRoom {
        id: id.into(),
        kind: RoomKind::Direct,
        name: None,
        description: None,
        members: vec![UserRef::Direct(me()), UserRef::Direct(bob())],
        last_message_at: last.map(|m| m.created_at).unwrap_or(0),
        is_pinned: false,
        is_muted: false,
        muted_until: None,
        unread_count: 0,
        last_message: last.map(LastMessage::of),
    }
}

fn unreachable() -> BackendError {
    BackendError {
        kind: BackendErrorKind::Network,
        message: "connection reset".into(),
    }
}

#[derive(Default)]
struct MockState {
    rooms: Vec<ChatRoom>,
    history: Vec<Message>,
    fail_sends: bool,
    next_server_id: u64,
    sent: Vec<OutgoingMessage>,
    searches: Vec<String>,
    mark_reads: Vec<String>,
    deletes_for_everyone: Vec<Vec<String>>,
    mutes: Vec<(String, Option<i64>)>,
}

#[derive(Clone, Default)]
struct MockBackend(Arc<Mutex<MockState>>);

impl MockBackend {
    fn with_rooms(rooms: Vec<ChatRoom>) -> Self {
        let backend = Self::default();
        backend.0.lock().unwrap().rooms = rooms;
        backend
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.0.lock().unwrap()
    }
}

impl ChatBackend for MockBackend {
    fn fetch_room_page(&self, _cursor: Option<String>) -> RoomPageResult {
        RoomPageResult {
            page: Some(RoomPage {
                rooms: self.state().rooms.clone(),
                next_cursor: None,
                has_more: false,
            }),
            error: None,
        }
    }

    fn fetch_message_page(
        &self,
        room_id: String,
        _before_cursor: Option<String>,
        _limit: u32,
    ) -> MessagePageResult {
        let messages = self
            .state()
            .history
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect();
        MessagePageResult {
            page: Some(MessagePage {
                messages,
                has_more: false,
            }),
            error: None,
        }
    }

    fn search_messages(
        &self,
        room_id: String,
        query: String,
        _offset: u32,
        _limit: u32,
    ) -> SearchPageResult {
        let mut st = self.state();
        st.searches.push(query.clone());
        let results = st
            .history
            .iter()
            .filter(|m| m.room_id == room_id && m.content.contains(&query))
            .cloned()
            .collect();
        SearchPageResult {
            page: Some(SearchPage {
                results,
                has_more: false,
            }),
            error: None,
        }
    }

    fn send_message(&self, room_id: String, payload: OutgoingMessage) -> MessageResult {
        let mut st = self.state();
        st.sent.push(payload.clone());
        if st.fail_sends {
            return MessageResult {
                message: None,
                error: Some(unreachable()),
            };
        }
        st.next_server_id += 1;
        let id = format!("srv-{}", st.next_server_id);
        MessageResult {
            message: Some(message(&id, &room_id, me(), &payload.content, now())),
            error: None,
        }
    }

    fn react_to_message(
        &self,
        _room_id: String,
        _message_id: String,
        _emoji: String,
        _add: bool,
    ) -> AckResult {
        AckResult::ok()
    }

    fn delete_for_me(&self, _room_id: String, _message_ids: Vec<String>) -> AckResult {
        AckResult::ok()
    }

    fn delete_for_everyone(&self, _room_id: String, message_ids: Vec<String>) -> AckResult {
        self.state().deletes_for_everyone.push(message_ids);
        AckResult::ok()
    }

    fn set_mute(&self, room_id: String, muted_until: Option<i64>) -> AckResult {
        self.state().mutes.push((room_id, muted_until));
        AckResult::ok()
    }

    fn unmute(&self, _room_id: String) -> AckResult {
        AckResult::ok()
    }

    fn set_pinned(&self, _room_id: String, _pinned: bool) -> AckResult {
        AckResult::ok()
    }

    fn mark_read(&self, room_id: String) -> AckResult {
        self.state().mark_reads.push(room_id);
        AckResult::ok()
    }

    fn send_typing(&self, _room_id: String, _is_typing: bool) -> AckResult {
        AckResult::ok()
    }

    fn create_room(&self, peer: User) -> RoomResult {
        let mut room = direct_room("r-new", None);
        room.members = vec![UserRef::Direct(me()), UserRef::Direct(peer)];
        RoomResult {
            room: Some(room),
            error: None,
        }
    }

    fn create_group(
        &self,
        name: String,
        description: Option<String>,
        members: Vec<User>,
    ) -> RoomResult {
        let mut room = direct_room("g-new", None);
        room.kind = RoomKind::Group;
        room.name = Some(name);
        room.description = description;
        room.members = members.into_iter().map(UserRef::Direct).collect();
        RoomResult {
            room: Some(room),
            error: None,
        }
    }

    fn add_group_members(&self, room_id: String, members: Vec<User>) -> RoomResult {
        let mut room = direct_room(&room_id, None);
        room.kind = RoomKind::Group;
        room.members.extend(members.into_iter().map(UserRef::Direct));
        RoomResult {
            room: Some(room),
            error: None,
        }
    }
}

fn start(backend: Option<&MockBackend>) -> (Arc<FfiApp>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap().to_string();
    write_config(&data_dir, false);
    let app = FfiApp::new(data_dir);
    if let Some(backend) = backend {
        app.set_chat_backend_for_tests(Arc::new(backend.clone()));
    }
    (app, dir)
}

fn login_and_open(app: &FfiApp, room_id: &str) {
    app.dispatch(AppAction::Login { user: me() });
    wait_until("rooms loaded", Duration::from_secs(2), || {
        !app.state().room_list.is_empty()
    });
    app.dispatch(AppAction::OpenRoom {
        room_id: room_id.into(),
    });
    wait_until("room opened", Duration::from_secs(2), || {
        app.state()
            .current_room
            .is_some_and(|r| r.room_id == room_id)
    });
}

fn open_messages(state: &AppState) -> Vec<(String, String, MessageDeliveryState)> {
    state
        .current_room
        .as_ref()
        .map(|r| {
            r.messages
                .iter()
                .map(|m| (m.id.clone(), m.content.clone(), m.delivery.clone()))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn login_loads_room_list_and_logout_clears_it() {
    let backend = MockBackend::with_rooms(vec![direct_room("r1", None), direct_room("r2", None)]);
    let (app, _dir) = start(Some(&backend));

    app.dispatch(AppAction::Login { user: me() });
    wait_until("rooms loaded", Duration::from_secs(2), || {
        app.state().room_list.len() == 2
    });
    let s = app.state();
    assert_eq!(s.current_user.as_ref().map(|u| u.key()), Some(me().key()));
    assert!(!s.busy.loading_rooms);
    assert!(!s.can_load_more_rooms);
    assert!(s.room_list.iter().all(|r| r.title == "Bob"));

    app.dispatch(AppAction::Logout);
    wait_until("logged out", Duration::from_secs(2), || {
        let s = app.state();
        s.current_user.is_none() && s.room_list.is_empty()
    });
}

#[test]
fn updates_are_full_state_with_increasing_rev() {
    let backend = MockBackend::with_rooms(vec![direct_room("r1", None)]);
    let (app, _dir) = start(Some(&backend));
    let (reconciler, updates) = TestReconciler::new();
    app.listen_for_updates(Box::new(reconciler));

    app.dispatch(AppAction::Login { user: me() });
    wait_until("rooms loaded", Duration::from_secs(2), || {
        !app.state().room_list.is_empty()
    });
    wait_until("updates delivered", Duration::from_secs(2), || {
        updates.lock().unwrap().len() >= 2
    });

    let revs: Vec<u64> = updates.lock().unwrap().iter().map(|u| u.rev()).collect();
    assert!(revs.windows(2).all(|w| w[1] > w[0]), "revs: {revs:?}");
    assert_eq!(*revs.last().unwrap(), app.state().rev);
}

#[test]
fn send_is_optimistic_then_promoted_to_server_id() {
    let backend = MockBackend::with_rooms(vec![direct_room("r1", None)]);
    let (app, _dir) = start(Some(&backend));
    login_and_open(&app, "r1");

    app.dispatch(AppAction::SendMessage {
        room_id: "r1".into(),
        content: "  hello there  ".into(),
        message_type: MessageType::Text,
    });
    wait_until("send confirmed", Duration::from_secs(2), || {
        open_messages(&app.state())
            == vec![(
                "srv-1".to_string(),
                "hello there".to_string(),
                MessageDeliveryState::Sent,
            )]
    });

    let sent = backend.state().sent.clone();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].client_id.starts_with("local-"));

    // The realtime echo of our own message must not duplicate it.
    let echo = message("srv-1", "r1", me(), "hello there", now());
    let rev = app.state().rev;
    app.push_live_event(LiveEvent::NewMessage { message: echo });
    wait_until("echo processed", Duration::from_secs(2), || {
        app.state().rev > rev
    });
    assert_eq!(open_messages(&app.state()).len(), 1);
}

#[test]
fn failed_send_can_be_retried_and_discarded() {
    let backend = MockBackend::with_rooms(vec![direct_room("r1", None)]);
    backend.state().fail_sends = true;
    let (app, _dir) = start(Some(&backend));
    login_and_open(&app, "r1");

    app.dispatch(AppAction::SendMessage {
        room_id: "r1".into(),
        content: "first".into(),
        message_type: MessageType::Text,
    });
    wait_until("send failed", Duration::from_secs(2), || {
        open_messages(&app.state())
            .iter()
            .any(|(_, _, d)| *d == MessageDeliveryState::Failed)
    });
    let toast = app.state().toast.expect("failure toast");
    assert!(!toast.contains("connection reset"));

    let (local_id, _, _) = open_messages(&app.state()).remove(0);
    backend.state().fail_sends = false;
    app.dispatch(AppAction::RetryMessage {
        message_id: local_id.clone(),
    });
    wait_until("retry confirmed", Duration::from_secs(2), || {
        open_messages(&app.state())
            .iter()
            .any(|(id, _, d)| id == "srv-1" && *d == MessageDeliveryState::Sent)
    });
    let sent = backend.state().sent.clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].client_id, sent[1].client_id);

    backend.state().fail_sends = true;
    app.dispatch(AppAction::SendMessage {
        room_id: "r1".into(),
        content: "second".into(),
        message_type: MessageType::Text,
    });
    wait_until("second send failed", Duration::from_secs(2), || {
        open_messages(&app.state())
            .iter()
            .any(|(_, c, d)| c == "second" && *d == MessageDeliveryState::Failed)
    });
    let failed_id = open_messages(&app.state())
        .into_iter()
        .find(|(_, c, _)| c == "second")
        .map(|(id, _, _)| id)
        .unwrap();
    app.dispatch(AppAction::DiscardMessage {
        message_id: failed_id,
    });
    wait_until("discarded", Duration::from_secs(2), || {
        open_messages(&app.state()).len() == 1
    });
}

#[test]
fn empty_message_is_rejected_without_backend_call() {
    let backend = MockBackend::with_rooms(vec![direct_room("r1", None)]);
    let (app, _dir) = start(Some(&backend));
    login_and_open(&app, "r1");

    app.dispatch(AppAction::SendMessage {
        room_id: "r1".into(),
        content: "   ".into(),
        message_type: MessageType::Text,
    });
    wait_until("policy toast", Duration::from_secs(2), || {
        app.state().toast.as_deref() == Some("Message can't be empty")
    });
    assert!(backend.state().sent.is_empty());

    app.dispatch(AppAction::ClearToast);
    wait_until("toast cleared", Duration::from_secs(2), || {
        app.state().toast.is_none()
    });
}

#[test]
fn opening_a_room_loads_history_and_marks_read() {
    let t = now();
    let backend = MockBackend::with_rooms(vec![direct_room("r1", None)]);
    backend.state().history = vec![
        message("m1", "r1", bob(), "hi", t - 60),
        message("m2", "r1", me(), "hey", t - 30),
    ];
    let (app, _dir) = start(Some(&backend));
    login_and_open(&app, "r1");

    wait_until("history loaded", Duration::from_secs(2), || {
        open_messages(&app.state()).len() == 2
    });
    let ids: Vec<String> = open_messages(&app.state())
        .into_iter()
        .map(|(id, _, _)| id)
        .collect();
    assert_eq!(ids, vec!["m1", "m2"]);
    let room = app.state().current_room.unwrap();
    assert!(!room.messages[0].is_mine);
    assert!(room.messages[1].is_mine);

    wait_until("mark read sent", Duration::from_secs(2), || {
        backend.state().mark_reads.contains(&"r1".to_string())
    });
}

#[test]
fn live_message_for_background_room_bumps_unread() {
    let t = now();
    let older = message("m0", "r2", bob(), "old", t - 600);
    let backend = MockBackend::with_rooms(vec![
        direct_room("r1", None),
        direct_room("r2", Some(&older)),
    ]);
    let (app, _dir) = start(Some(&backend));
    login_and_open(&app, "r1");

    app.push_live_event(LiveEvent::NewMessage {
        message: message("m9", "r2", bob(), "ping", t),
    });
    wait_until("unread bumped", Duration::from_secs(2), || {
        app.state()
            .room_list
            .iter()
            .any(|r| r.room_id == "r2" && r.unread_count == 1)
    });
    let s = app.state();
    assert_eq!(s.room_list[0].room_id, "r2");
    assert_eq!(s.room_list[0].preview_text.as_deref(), Some("ping"));

    // Same event again is ignored.
    app.push_live_event(LiveEvent::NewMessage {
        message: message("m9", "r2", bob(), "ping", t),
    });
    std::thread::sleep(Duration::from_millis(100));
    let r2 = app
        .state()
        .room_list
        .into_iter()
        .find(|r| r.room_id == "r2")
        .unwrap();
    assert_eq!(r2.unread_count, 1);
}

#[test]
fn delete_for_everyone_respects_the_window() {
    let t = now();
    let backend = MockBackend::with_rooms(vec![direct_room("r1", None)]);
    backend.state().history = vec![
        message("old", "r1", me(), "stale", t - 31 * 60),
        message("new", "r1", me(), "fresh", t - 60),
    ];
    let (app, _dir) = start(Some(&backend));
    login_and_open(&app, "r1");
    wait_until("history loaded", Duration::from_secs(2), || {
        open_messages(&app.state()).len() == 2
    });

    app.dispatch(AppAction::DeleteForEveryone {
        room_id: "r1".into(),
        message_id: "old".into(),
    });
    wait_until("window toast", Duration::from_secs(2), || {
        app.state()
            .toast
            .is_some_and(|t| t.contains("30 minutes"))
    });
    assert!(backend.state().deletes_for_everyone.is_empty());

    app.dispatch(AppAction::DeleteForEveryone {
        room_id: "r1".into(),
        message_id: "new".into(),
    });
    wait_until("tombstoned", Duration::from_secs(2), || {
        app.state()
            .current_room
            .is_some_and(|r| r.messages.iter().any(|m| m.id == "new" && m.is_deleted))
    });
    assert_eq!(
        backend.state().deletes_for_everyone,
        vec![vec!["new".to_string()]]
    );
}

#[test]
fn search_is_debounced_to_the_last_query() {
    let t = now();
    let backend = MockBackend::with_rooms(vec![direct_room("r1", None)]);
    backend.state().history = vec![
        message("m1", "r1", bob(), "abc one", t - 60),
        message("m2", "r1", bob(), "abd two", t - 30),
    ];
    let (app, _dir) = start(Some(&backend));
    login_and_open(&app, "r1");

    for q in ["a", "ab", "abc"] {
        app.dispatch(AppAction::SearchQueryChanged { query: q.into() });
    }
    wait_until("search results", Duration::from_secs(2), || {
        app.state()
            .current_room
            .and_then(|r| r.search)
            .is_some_and(|s| !s.loading && s.results.len() == 1)
    });
    assert_eq!(backend.state().searches, vec!["abc".to_string()]);

    app.dispatch(AppAction::CloseSearch);
    wait_until("search closed", Duration::from_secs(2), || {
        app.state()
            .current_room
            .is_some_and(|r| r.search.is_none())
    });
}

#[test]
fn mute_applies_after_backend_confirms() {
    let backend = MockBackend::with_rooms(vec![direct_room("r1", None)]);
    let (app, _dir) = start(Some(&backend));
    app.dispatch(AppAction::Login { user: me() });
    wait_until("rooms loaded", Duration::from_secs(2), || {
        !app.state().room_list.is_empty()
    });

    let before = now();
    app.dispatch(AppAction::MuteRoom {
        room_id: "r1".into(),
        duration: MuteDuration::EightHours,
    });
    wait_until("muted", Duration::from_secs(2), || {
        app.state().room_list[0].show_mute_badge
    });
    let mutes = backend.state().mutes.clone();
    assert_eq!(mutes.len(), 1);
    let until = mutes[0].1.unwrap();
    assert!(until >= before + 8 * 3600 && until <= now() + 8 * 3600);
}

#[test]
fn without_backend_requests_fail_with_a_toast() {
    let (app, _dir) = start(None);
    app.dispatch(AppAction::Login { user: me() });
    wait_until("failure toast", Duration::from_secs(2), || {
        app.state().toast.is_some()
    });
    let s = app.state();
    assert!(s.room_list.is_empty());
    assert!(!s.busy.loading_rooms);
}

#[test]
fn actions_before_login_are_ignored() {
    let backend = MockBackend::with_rooms(vec![direct_room("r1", None)]);
    let (app, _dir) = start(Some(&backend));
    app.dispatch(AppAction::OpenRoom {
        room_id: "r1".into(),
    });
    app.dispatch(AppAction::Login { user: me() });
    wait_until("rooms loaded", Duration::from_secs(2), || {
        !app.state().room_list.is_empty()
    });
    assert!(app.state().current_room.is_none());
    assert!(backend.state().mark_reads.is_empty());
}

#[test]
fn mute_labels_and_expiry_helpers() {
    assert_eq!(
        citadel_core::parse_mute_duration("24h"),
        Some(MuteDuration::OneDay)
    );
    assert_eq!(citadel_core::parse_mute_duration("forever"), None);

    let mut room = direct_room("r1", None);
    room.is_muted = true;
    room.muted_until = Some(now() - 10);
    assert!(!citadel_core::is_room_muted(room.clone()));
    room.muted_until = None;
    assert!(citadel_core::is_room_muted(room));
}
