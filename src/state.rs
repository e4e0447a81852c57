//! Session state and the store that owns it.
//!
//! All mutation goes through [`Action`]s applied by [`AppState::reduce`];
//! [`AppStore`] publishes each resulting snapshot on a `watch` channel so
//! views re-render from one consistent value.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::consent::ActiveTab;
use crate::db::GroupRow;
use crate::messaging::CachedMessage;
use crate::recipient::{Recipient, Resolution};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SideNav {
    #[default]
    Chats,
    Rooms,
}

/// The slice of a group the room list shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub group_id: String,
    pub users: Vec<String>,
}

impl From<GroupRow> for ChatRoom {
    fn from(row: GroupRow) -> Self {
        Self {
            group_id: row.group_id,
            users: row.users,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub active_tab: ActiveTab,
    pub side_nav: SideNav,
    pub side_nav_modal_open: bool,

    pub chat_rooms: Option<Vec<ChatRoom>>,
    pub selected_room: Option<String>,
    pub selected_room_members: Vec<String>,
    pub create_room_open: bool,
    /// Members picked for the room being created; the creator is always first.
    pub room_draft: Vec<String>,

    pub recipient: Recipient,
    pub conversation_topic: Option<String>,
    pub active_message: Option<CachedMessage>,
    pub started_first_message: bool,

    pub loading_conversations: bool,
    /// Bumped by every conversation-list load; only the latest may finish it.
    pub conversations_generation: u64,
    pub changed_consent_count: u64,
    pub client_name: Option<String>,
    pub client_avatar: Option<String>,
    pub attachment_error: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            active_tab: ActiveTab::Messages,
            side_nav: SideNav::Chats,
            side_nav_modal_open: false,
            chat_rooms: None,
            selected_room: None,
            selected_room_members: Vec::new(),
            create_room_open: false,
            room_draft: Vec::new(),
            recipient: Recipient::default(),
            conversation_topic: None,
            active_message: None,
            started_first_message: false,
            loading_conversations: true,
            conversations_generation: 0,
            changed_consent_count: 0,
            client_name: None,
            client_avatar: None,
            attachment_error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    SetActiveTab(ActiveTab),
    SelectSideNav(SideNav),
    SetSideNavModal(bool),

    SetChatRooms(Vec<ChatRoom>),
    SelectRoom { group_id: String, members: Vec<String> },
    ClearRoomSelection,
    SetCreateRoomOpen(bool),
    AddDraftMember(String),
    RemoveDraftMember(String),
    ResetRoomDraft { owner: String },
    /// Start a draft for `owner` unless one is already in progress.
    SeedRoomDraft { owner: String },

    RecipientInputChanged(String),
    RecipientResolved {
        generation: u64,
        outcome: Result<Resolution, String>,
    },
    ResetRecipient,
    /// Switching conversation drops whatever recipient was being resolved.
    SelectConversation(Option<String>),
    StartNewConversation,
    SetActiveMessage(Option<CachedMessage>),
    SetStartedFirstMessage(bool),

    SetLoadingConversations(bool),
    BeginConversationsLoad,
    FinishConversationsLoad { generation: u64 },
    ConsentChanged,
    SetClientProfile { name: Option<String>, avatar: Option<String> },
    SetAttachmentError(Option<String>),
    ResetSession,
}

impl AppState {
    pub fn reduce(&mut self, action: Action) {
        match action {
            Action::SetActiveTab(tab) => self.active_tab = tab,
            Action::SelectSideNav(nav) => self.side_nav = nav,
            Action::SetSideNavModal(open) => self.side_nav_modal_open = open,

            Action::SetChatRooms(rooms) => {
                if let Some(selected) = &self.selected_room {
                    match rooms.iter().find(|r| &r.group_id == selected) {
                        Some(room) => self.selected_room_members = room.users.clone(),
                        None => {
                            self.selected_room = None;
                            self.selected_room_members.clear();
                        }
                    }
                }
                self.chat_rooms = Some(rooms);
            }
            Action::SelectRoom { group_id, members } => {
                self.selected_room = Some(group_id);
                self.selected_room_members = members;
                self.active_message = None;
            }
            Action::ClearRoomSelection => {
                self.selected_room = None;
                self.selected_room_members.clear();
            }
            Action::SetCreateRoomOpen(open) => self.create_room_open = open,
            Action::AddDraftMember(member) => {
                if !member.trim().is_empty() && !self.room_draft.contains(&member) {
                    self.room_draft.push(member);
                }
            }
            Action::RemoveDraftMember(member) => {
                // index 0 is the creator
                if let Some(pos) = self.room_draft.iter().skip(1).position(|m| *m == member) {
                    self.room_draft.remove(pos + 1);
                }
            }
            Action::ResetRoomDraft { owner } => self.room_draft = vec![owner],
            Action::SeedRoomDraft { owner } => {
                if self.room_draft.is_empty() {
                    self.room_draft = vec![owner];
                }
            }

            Action::RecipientInputChanged(input) => {
                self.recipient.edit(&input);
            }
            Action::RecipientResolved { generation, outcome } => {
                self.recipient.complete(generation, outcome);
            }
            Action::ResetRecipient => self.recipient.reset(),
            Action::SelectConversation(topic) => {
                self.recipient.reset();
                self.conversation_topic = topic;
                self.active_message = None;
            }
            Action::StartNewConversation => {
                self.recipient.reset();
                self.conversation_topic = None;
                self.started_first_message = true;
            }
            Action::SetActiveMessage(message) => self.active_message = message,
            Action::SetStartedFirstMessage(started) => self.started_first_message = started,

            Action::SetLoadingConversations(loading) => self.loading_conversations = loading,
            Action::BeginConversationsLoad => {
                self.conversations_generation += 1;
                self.loading_conversations = true;
            }
            Action::FinishConversationsLoad { generation } => {
                if generation == self.conversations_generation {
                    self.loading_conversations = false;
                }
            }
            Action::ConsentChanged => self.changed_consent_count += 1,
            Action::SetClientProfile { name, avatar } => {
                self.client_name = name;
                self.client_avatar = avatar;
            }
            Action::SetAttachmentError(error) => self.attachment_error = error,
            Action::ResetSession => {
                // Keep the generations moving so in-flight work stays stale.
                let mut recipient = std::mem::take(&mut self.recipient);
                recipient.reset();
                *self = AppState {
                    recipient,
                    conversations_generation: self.conversations_generation + 1,
                    ..AppState::default()
                };
            }
        }
    }
}

/// Single owner of [`AppState`].
#[derive(Debug)]
pub struct AppStore {
    tx: watch::Sender<AppState>,
}

impl Default for AppStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AppStore {
    pub fn new() -> Self {
        Self::with_state(AppState::default())
    }

    pub fn with_state(state: AppState) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self { tx }
    }

    pub fn dispatch(&self, action: Action) {
        self.tx.send_modify(|state| state.reduce(action));
    }

    /// Dispatch and read from the resulting state without another writer
    /// slipping in between.
    pub fn dispatch_and_read<R>(&self, action: Action, read: impl FnOnce(&AppState) -> R) -> R {
        let mut out = None;
        self.tx.send_modify(|state| {
            state.reduce(action);
            out = Some(read(state));
        });
        match out {
            Some(value) => value,
            None => unreachable!("send_modify always runs its closure"),
        }
    }

    pub fn snapshot(&self) -> AppState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.tx.subscribe()
    }
}
