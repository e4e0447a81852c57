//! Peer-to-peer inbox flows: the tabbed conversation list, sending, consent
//! changes, signer checks and disconnect.

use crate::consent::{partition_for_tab, ConsentState};
use crate::messaging::{outgoing_content, Conversation, MessagingClient, SentMessage, Wallet};
use crate::state::{Action, AppStore, SideNav};
use crate::CoreError;

/// Conversations for the store's active tab.
///
/// The list is only published once every consent lookup has finished, and
/// `loading_conversations` stays true until the most recent load is done.
/// Returns `Ok(None)` when the result is stale: a newer load started or the
/// active tab changed while this one was running.
pub async fn load_active_conversations<C>(
    client: &C,
    store: &AppStore,
) -> Result<Option<Vec<Conversation>>, CoreError>
where
    C: MessagingClient + ?Sized,
{
    let (generation, tab) =
        store.dispatch_and_read(Action::BeginConversationsLoad, |s| (s.conversations_generation, s.active_tab));

    let result = async {
        let conversations = client.list_conversations().await?;
        Ok::<_, CoreError>(partition_for_tab(client, &conversations, tab).await?)
    }
    .await;

    let current = store.dispatch_and_read(Action::FinishConversationsLoad { generation }, |s| {
        s.conversations_generation == generation && s.active_tab == tab
    });
    if !current {
        log::debug!("[inbox] dropping stale {} tab load (gen {generation})", tab.as_str());
        return Ok(None);
    }
    if let Err(e) = &result {
        log::warn!("[inbox] loading {} tab failed: {e}", tab.as_str());
    }
    result.map(Some)
}

/// Send `text` to a peer conversation.
///
/// Returns `Ok(None)` without contacting the SDK when the recipient is not on
/// the network, unless the user is in the rooms view.
pub async fn send_message<C>(
    client: &C,
    store: &AppStore,
    conversation: &Conversation,
    text: &str,
) -> Result<Option<SentMessage>, CoreError>
where
    C: MessagingClient + ?Sized,
{
    let state = store.snapshot();
    if !state.recipient.on_network && state.side_nav != SideNav::Rooms {
        log::debug!("[inbox] recipient not on network, not sending");
        return Ok(None);
    }
    if text.trim().is_empty() {
        return Err(CoreError::InvalidInput("message text is empty".into()));
    }

    let content = outgoing_content(text, state.active_message.as_ref());
    let sent = client.send_message(conversation, content).await?;
    Ok(Some(sent))
}

/// Allow or block a peer, then bump the consent counter so tab views reload.
pub async fn update_consent<C>(client: &C, store: &AppStore, peer_address: &str, state: ConsentState) -> Result<(), CoreError>
where
    C: MessagingClient + ?Sized,
{
    client.set_consent(peer_address, state).await?;
    store.dispatch(Action::ConsentChanged);
    log::info!("[inbox] consent for {peer_address} set to {state:?}");
    Ok(())
}

/// Disconnect when the wallet and the messaging client belong to different
/// identities. Nothing happens while either address is unknown. Returns
/// whether the session was torn down.
pub async fn check_signers<C, W>(client: &C, wallet: &W, store: &AppStore) -> bool
where
    C: MessagingClient + ?Sized,
    W: Wallet + ?Sized,
{
    let (Some(wallet_address), Some(client_address)) = (wallet.address(), client.address()) else {
        return false;
    };
    if wallet_address.eq_ignore_ascii_case(&client_address) {
        return false;
    }
    log::warn!("[inbox] wallet {wallet_address} does not match messaging identity {client_address}, disconnecting");
    disconnect(client, wallet, store).await;
    true
}

/// Tear down the session. The state is reset even when the SDK or the wallet
/// fails to disconnect.
pub async fn disconnect<C, W>(client: &C, wallet: &W, store: &AppStore)
where
    C: MessagingClient + ?Sized,
    W: Wallet + ?Sized,
{
    if let Err(e) = client.disconnect().await {
        log::warn!("[inbox] messaging disconnect failed: {e}");
    }
    if let Err(e) = wallet.disconnect().await {
        log::warn!("[inbox] wallet disconnect failed: {e}");
    }
    store.dispatch(Action::ResetSession);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::ActiveTab;
    use crate::recipient::Resolution;
    use crate::testing::{FakeMessenger, FakeWallet};
    use futures_util::poll;

    fn on_network_store() -> AppStore {
        let store = AppStore::new();
        let generation = store.dispatch_and_read(Action::RecipientInputChanged("0xpeer".into()), |s| {
            s.recipient.generation()
        });
        store.dispatch(Action::RecipientResolved {
            generation,
            outcome: Ok(Resolution {
                address: "0xpeer".into(),
                name: None,
                avatar: None,
                on_network: true,
            }),
        });
        store
    }

    #[tokio::test]
    async fn tab_listing_follows_active_tab() {
        let messenger = FakeMessenger::new("0xme");
        messenger.add_conversation("p1", ConsentState::Allowed);
        messenger.add_conversation("p2", ConsentState::Denied);
        messenger.add_conversation("p3", ConsentState::Unknown);
        let store = AppStore::new();

        let listed = load_active_conversations(&messenger, &store).await.unwrap().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].peer_address, "p1");
        assert!(!store.snapshot().loading_conversations);

        store.dispatch(Action::SetActiveTab(ActiveTab::Requests));
        let listed = load_active_conversations(&messenger, &store).await.unwrap().unwrap();
        assert_eq!(listed[0].peer_address, "p3");
    }

    #[tokio::test]
    async fn load_for_a_tab_left_behind_is_dropped() {
        let messenger = FakeMessenger::new("0xme");
        messenger.add_conversation("p1", ConsentState::Allowed);
        messenger.add_conversation("p3", ConsentState::Unknown);
        let store = AppStore::new();

        let gate = messenger.hold_consent();
        let old = load_active_conversations(&messenger, &store);
        tokio::pin!(old);
        assert!(poll!(&mut old).is_pending());

        messenger.stop_holding_consent();
        store.dispatch(Action::SetActiveTab(ActiveTab::Requests));
        let requests = load_active_conversations(&messenger, &store).await.unwrap().unwrap();
        assert_eq!(requests[0].peer_address, "p3");
        assert!(!store.snapshot().loading_conversations);

        gate.send_replace(true);
        assert!(old.await.unwrap().is_none());
        assert!(!store.snapshot().loading_conversations);
    }

    #[tokio::test]
    async fn older_load_finishing_first_keeps_loading_set() {
        let messenger = FakeMessenger::new("0xme");
        messenger.add_conversation("p1", ConsentState::Allowed);
        let store = AppStore::new();

        let first_gate = messenger.hold_consent();
        let first = load_active_conversations(&messenger, &store);
        tokio::pin!(first);
        assert!(poll!(&mut first).is_pending());

        let second_gate = messenger.hold_consent();
        let second = load_active_conversations(&messenger, &store);
        tokio::pin!(second);
        assert!(poll!(&mut second).is_pending());

        first_gate.send_replace(true);
        assert!(first.await.unwrap().is_none());
        assert!(store.snapshot().loading_conversations);

        second_gate.send_replace(true);
        let listed = second.await.unwrap().unwrap();
        assert_eq!(listed[0].peer_address, "p1");
        assert!(!store.snapshot().loading_conversations);
    }

    #[tokio::test]
    async fn failed_listing_still_clears_loading() {
        let messenger = FakeMessenger::new("0xme");
        messenger.add_conversation("p1", ConsentState::Allowed);
        messenger.fail_consent_for("p1");
        let store = AppStore::new();

        assert!(load_active_conversations(&messenger, &store).await.is_err());
        assert!(!store.snapshot().loading_conversations);
    }

    #[tokio::test]
    async fn send_is_gated_on_recipient_reachability() {
        let messenger = FakeMessenger::new("0xme");
        let conversation = messenger.add_conversation("0xpeer", ConsentState::Allowed);

        let fresh = AppStore::new();
        assert!(send_message(&messenger, &fresh, &conversation, "hi").await.unwrap().is_none());
        assert!(messenger.sent().is_empty());

        fresh.dispatch(Action::SelectSideNav(SideNav::Rooms));
        assert!(send_message(&messenger, &fresh, &conversation, "hi").await.unwrap().is_some());

        let ready = on_network_store();
        let sent = send_message(&messenger, &ready, &conversation, "hello").await.unwrap();
        assert!(sent.is_some());
        assert_eq!(messenger.sent().len(), 2);
    }

    #[tokio::test]
    async fn blank_messages_are_rejected() {
        let messenger = FakeMessenger::new("0xme");
        let conversation = messenger.add_conversation("0xpeer", ConsentState::Allowed);
        let store = on_network_store();
        assert!(matches!(
            send_message(&messenger, &store, &conversation, "  ").await,
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn consent_update_bumps_counter() {
        let messenger = FakeMessenger::new("0xme");
        messenger.add_conversation("p1", ConsentState::Unknown);
        let store = AppStore::new();

        update_consent(&messenger, &store, "p1", ConsentState::Denied).await.unwrap();
        assert_eq!(messenger.consent_of("p1"), Some(ConsentState::Denied));
        assert_eq!(store.snapshot().changed_consent_count, 1);
    }

    #[tokio::test]
    async fn disconnect_resets_even_if_wallet_fails() {
        let messenger = FakeMessenger::new("0xme");
        let wallet = FakeWallet::failing("0xme");
        let store = on_network_store();
        store.dispatch(Action::SelectSideNav(SideNav::Rooms));

        disconnect(&messenger, &wallet, &store).await;
        assert!(messenger.is_disconnected());
        assert!(!wallet.is_disconnected());
        let state = store.snapshot();
        assert_eq!(state.side_nav, SideNav::Chats);
        assert!(!state.recipient.on_network);
    }

    #[tokio::test]
    async fn matching_signers_keep_the_session() {
        let messenger = FakeMessenger::new("0xAbC");
        let wallet = FakeWallet::new("0xabc");
        let store = AppStore::new();
        store.dispatch(Action::SelectSideNav(SideNav::Rooms));

        assert!(!check_signers(&messenger, &wallet, &store).await);
        assert!(!messenger.is_disconnected());
        assert!(!wallet.is_disconnected());
        assert_eq!(store.snapshot().side_nav, SideNav::Rooms);
    }

    #[tokio::test]
    async fn mismatched_signers_tear_down_the_session() {
        let messenger = FakeMessenger::new("0xme");
        let wallet = FakeWallet::new("0xsomeone-else");
        let store = on_network_store();
        store.dispatch(Action::SelectSideNav(SideNav::Rooms));

        assert!(check_signers(&messenger, &wallet, &store).await);
        assert!(messenger.is_disconnected());
        assert!(wallet.is_disconnected());
        let state = store.snapshot();
        assert_eq!(state.side_nav, SideNav::Chats);
        assert!(!state.recipient.on_network);
    }

    #[tokio::test]
    async fn disconnect_reaches_the_wallet() {
        let messenger = FakeMessenger::new("0xme");
        let wallet = FakeWallet::new("0xme");
        let store = AppStore::new();
        disconnect(&messenger, &wallet, &store).await;
        assert!(wallet.is_disconnected());
    }
}
