//! Rooms: locally tracked groups layered over peer-to-peer conversations.
//!
//! The messaging SDK indexes messages by peer topic, not by group, so a room's
//! history is rebuilt from its conversation links: link order first, then each
//! message fetched from the SDK's cache.

use std::sync::Arc;

use futures_util::future::try_join_all;
use rand::Rng;

use crate::conversations::{ConversationsService, NewConversation};
use crate::db::ConversationRow;
use crate::groups::{GroupsService, NewGroup};
use crate::messaging::{outgoing_content, CachedMessage, Conversation, MessagingClient};
use crate::state::{Action, AppStore, ChatRoom, SideNav};
use crate::CoreError;

/// Creator included.
pub const MIN_ROOM_MEMBERS: usize = 3;

const ROOM_ID_LEN: usize = 13;
const ROOM_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Random base-36 room token.
pub fn generate_room_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_ID_LEN)
        .map(|_| ROOM_ID_ALPHABET[rng.gen_range(0..ROOM_ID_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMessage {
    pub message: CachedMessage,
    /// Sender as recorded on the link.
    pub sender: String,
    /// Sent by the local identity.
    pub outgoing: bool,
}

#[derive(Clone)]
pub struct RoomsController {
    groups: GroupsService,
    conversations: ConversationsService,
    store: Arc<AppStore>,
    owner: String,
}

impl RoomsController {
    /// `owner` is the connected wallet address; it seeds the room draft when
    /// none is in progress.
    pub fn new(
        groups: GroupsService,
        conversations: ConversationsService,
        store: Arc<AppStore>,
        owner: impl Into<String>,
    ) -> Self {
        let owner = owner.into();
        store.dispatch(Action::SeedRoomDraft { owner: owner.clone() });
        Self {
            groups,
            conversations,
            store,
            owner,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub async fn refresh_rooms(&self) -> Result<Vec<ChatRoom>, CoreError> {
        let rooms: Vec<ChatRoom> = self
            .groups
            .get_by_user_id(&self.owner)
            .await?
            .into_iter()
            .map(ChatRoom::from)
            .collect();
        self.store.dispatch(Action::SetChatRooms(rooms.clone()));
        Ok(rooms)
    }

    pub fn open_create_room(&self) {
        self.store.dispatch(Action::ResetRoomDraft { owner: self.owner.clone() });
        self.store.dispatch(Action::SetCreateRoomOpen(true));
    }

    pub fn cancel_create_room(&self) {
        self.store.dispatch(Action::SetCreateRoomOpen(false));
        self.store.dispatch(Action::ResetRoomDraft { owner: self.owner.clone() });
    }

    pub fn add_draft_member(&self, member: &str) {
        self.store.dispatch(Action::AddDraftMember(member.to_string()));
    }

    pub fn remove_draft_member(&self, member: &str) {
        self.store.dispatch(Action::RemoveDraftMember(member.to_string()));
    }

    /// Creates a room from the current draft, then refreshes the room list.
    /// The refresh only starts once the insert has returned.
    pub async fn create_room(&self) -> Result<ChatRoom, CoreError> {
        let draft = self.store.snapshot().room_draft;
        if draft.len() < MIN_ROOM_MEMBERS {
            return Err(CoreError::InvalidInput(format!(
                "a room needs at least {MIN_ROOM_MEMBERS} members, draft has {}",
                draft.len()
            )));
        }

        let row = self.groups.create(NewGroup::new(generate_room_id(), draft)).await?;
        self.store.dispatch(Action::SetCreateRoomOpen(false));
        self.store.dispatch(Action::ResetRoomDraft { owner: self.owner.clone() });

        if let Err(e) = self.refresh_rooms().await {
            log::warn!("[rooms] created {} but refresh failed: {e}", row.group_id);
        }
        Ok(row.into())
    }

    pub fn select_room(&self, room: &ChatRoom) {
        self.store.dispatch(Action::SelectSideNav(SideNav::Rooms));
        self.store.dispatch(Action::SelectRoom {
            group_id: room.group_id.clone(),
            members: room.users.clone(),
        });
    }

    pub async fn add_member(&self, group_id: &str, user: &str) -> Result<ChatRoom, CoreError> {
        let row = self.groups.add_member(group_id, user).await?;
        self.refresh_rooms().await?;
        Ok(row.into())
    }

    pub async fn remove_member(&self, group_id: &str, user: &str) -> Result<ChatRoom, CoreError> {
        let row = self.groups.remove_member(group_id, user).await?;
        self.refresh_rooms().await?;
        Ok(row.into())
    }

    /// Deletes the room and its history in one step.
    pub async fn delete_room(&self, group_id: &str) -> Result<bool, CoreError> {
        let (removed, _) = self.groups.delete_with_conversations(group_id).await?;
        if self.store.snapshot().selected_room.as_deref() == Some(group_id) {
            self.store.dispatch(Action::ClearRoomSelection);
        }
        self.refresh_rooms().await?;
        Ok(removed)
    }

    /// A room's messages in link order. Links whose message is no longer in
    /// the SDK cache are skipped.
    pub async fn load_room_messages<C>(&self, client: &C, group_id: &str) -> Result<Vec<RoomMessage>, CoreError>
    where
        C: MessagingClient + ?Sized,
    {
        let links = self.conversations.get_conversation(group_id).await?;
        let fetched = try_join_all(links.iter().map(|l| client.get_message(&l.message_id))).await?;

        let messages: Vec<RoomMessage> = links
            .into_iter()
            .zip(fetched)
            .filter_map(|(link, message)| {
                let message = message?;
                Some(RoomMessage {
                    outgoing: message.sender_address.eq_ignore_ascii_case(&self.owner),
                    sender: link.sender,
                    message,
                })
            })
            .collect();
        log::debug!("[rooms] {group_id}: {} messages", messages.len());
        Ok(messages)
    }

    /// Send through the SDK on `conversation`, then record the message against
    /// the selected room.
    pub async fn send_room_message<C>(
        &self,
        client: &C,
        conversation: &Conversation,
        text: &str,
    ) -> Result<ConversationRow, CoreError>
    where
        C: MessagingClient + ?Sized,
    {
        if text.trim().is_empty() {
            return Err(CoreError::InvalidInput("message text is empty".into()));
        }
        let state = self.store.snapshot();
        let group_id = state
            .selected_room
            .ok_or_else(|| CoreError::InvalidInput("no room selected".into()))?;

        let content = outgoing_content(text, state.active_message.as_ref());
        let sent = client.send_message(conversation, content).await?;

        let link = self
            .conversations
            .save_conversation(NewConversation {
                group_id,
                message_id: sent.id,
                sender: self.owner.clone(),
            })
            .await?;
        Ok(link)
    }
}
