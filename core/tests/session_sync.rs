//! Session changes and the directory/view rebuild that follows them

mod common;

use ballot_core::{
    AdminPolicy, ClientError, DisconnectReason, ProviderError, ProviderEvent, SessionState,
};
use common::*;

#[tokio::test]
async fn test_connect_loads_directory_and_default_selection() {
    let chain = FakeChain::new();
    chain.seed("Board", ADMIN, false, &[("Alice", 0)], &[]);
    chain.seed("Treasury", ADMIN, true, &[("Bob", 2)], &[VOTER]);

    let (client, _provider) = connected(&chain, DEPLOYER).await;

    let state = client.directory().state();
    assert_eq!(state.elections.len(), 2);
    assert_eq!(state.deployer, Some(DEPLOYER));
    assert!(state.is_admin);
    assert_eq!(
        state.elections.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![1, 2]
    );

    // newest election is selected and hydrated
    assert_eq!(client.selected(), 2);
    assert_eq!(client.snapshot().unwrap().election.name, "Treasury");
}

#[tokio::test]
async fn test_no_stale_admin_flag_after_account_switch() {
    let chain = FakeChain::new();
    chain.seed("Board", ADMIN, false, &[], &[]);

    let (client, provider) = connected(&chain, DEPLOYER).await;
    assert!(client.is_admin());
    let epoch = client.session().epoch();

    provider.switch_account(VOTER);
    client.session().handle_event(ProviderEvent::AccountsChanged(vec![VOTER])).await;
    client.sync_session().await.unwrap();

    assert!(client.session().epoch() > epoch);
    assert_eq!(client.session().account(), Some(VOTER));
    assert!(!client.is_admin());
    assert_eq!(client.elections().len(), 1);
    assert_eq!(client.directory().deployer(), Some(DEPLOYER));
}

#[tokio::test]
async fn test_refresh_reflects_ledger_after_reconnects() {
    let chain = FakeChain::new();
    chain.seed("Board", ADMIN, false, &[], &[]);
    let (client, _provider) = connected(&chain, VOTER).await;
    assert_eq!(client.elections().len(), 1);

    chain.seed("Audit", ADMIN, false, &[], &[]);
    for _ in 0..3 {
        client.connect().await.unwrap();
    }
    assert_eq!(client.elections().len(), 2);
    assert_eq!(client.directory().deployer(), Some(DEPLOYER));
    assert!(!client.is_admin());
}

#[tokio::test]
async fn test_same_account_event_keeps_epoch() {
    let chain = FakeChain::new();
    let (client, _provider) = connected(&chain, VOTER).await;
    let epoch = client.session().epoch();

    client
        .session()
        .handle_event(ProviderEvent::AccountsChanged(vec![VOTER]))
        .await;
    assert_eq!(client.session().epoch(), epoch);
}

#[tokio::test]
async fn test_accounts_cleared_disconnects_and_clears_state() {
    let chain = FakeChain::new();
    chain.seed("Board", ADMIN, false, &[("Alice", 0)], &[]);
    let (client, _provider) = connected(&chain, VOTER).await;
    assert!(client.snapshot().is_some());

    client
        .session()
        .handle_event(ProviderEvent::AccountsChanged(Vec::new()))
        .await;
    client.sync_session().await.unwrap();

    assert_eq!(
        client.session().snapshot().state,
        SessionState::Disconnected {
            reason: DisconnectReason::AccountsCleared
        }
    );
    assert!(client.elections().is_empty());
    assert!(client.snapshot().is_none());
    assert!(matches!(
        client.session().require(),
        Err(ClientError::NotConnected)
    ));
}

#[tokio::test]
async fn test_single_listener_across_reconnects() {
    let chain = FakeChain::new();
    let (client, provider) = connected(&chain, VOTER).await;
    for _ in 0..4 {
        client.connect().await.unwrap();
    }
    // replaced listeners are aborted; give the runtime a turn to drop them
    settle(|| provider.listeners() == 1).await;
    assert!(client.session().is_listening());

    client.shutdown();
    settle(|| provider.listeners() == 0).await;
    assert!(!client.session().is_listening());
}

#[tokio::test]
async fn test_background_sync_follows_account_switch() {
    let chain = FakeChain::new();
    chain.seed("Board", ADMIN, false, &[], &[]);
    let (client, provider) = connected(&chain, DEPLOYER).await;
    client.spawn_sync();
    assert!(client.is_admin());

    provider.switch_account(ADMIN);
    settle(|| client.session().account() == Some(ADMIN) && client.elections().len() == 1).await;
    settle(|| !client.is_admin()).await;

    client.shutdown();
}

#[tokio::test]
async fn test_network_change_triggers_full_reload() {
    let chain = FakeChain::new();
    chain.seed("Board", ADMIN, false, &[], &[]);
    chain.seed("Audit", ADMIN, false, &[], &[]);
    let (client, provider) = connected(&chain, VOTER).await;
    client.spawn_sync();

    client.select(1).await.unwrap();
    let epoch = client.session().epoch();

    provider.switch_chain(5);
    settle(|| {
        client.session().epoch() >= epoch + 2 && client.session().snapshot().state.is_connected()
    })
    .await;
    // selection was reset and the default policy applied again
    settle(|| client.selected() == 2 && client.snapshot().is_some()).await;

    match client.session().snapshot().state {
        SessionState::Connected { chain_id, .. } => assert_eq!(chain_id, 5),
        other => panic!("expected connected session, got {:?}", other),
    }
    client.shutdown();
}

#[tokio::test]
async fn test_connect_failures_are_classified() {
    let chain = FakeChain::new();
    let provider = FakeProvider::new(VOTER);
    let client = client_with(&chain, &provider, AdminPolicy::default());

    provider.fail_next_connect(ProviderError::UserRejected);
    assert!(matches!(
        client.connect().await,
        Err(ClientError::UserRejected)
    ));

    provider.fail_next_connect(ProviderError::Unavailable);
    assert!(matches!(
        client.connect().await,
        Err(ClientError::ProviderUnavailable)
    ));
    assert!(!client.session().snapshot().state.is_connected());

    client.connect().await.unwrap();
    assert_eq!(client.session().account(), Some(VOTER));
}

#[tokio::test]
async fn test_wrong_network_refuses_connection() {
    use ballot_core::{ClientOptions, ElectionClient, Notifier};
    use std::sync::Arc;

    let chain = FakeChain::new();
    let provider = FakeProvider::new(VOTER);
    let client = ElectionClient::new(
        provider.clone(),
        Arc::new(FakeBinder {
            chain: chain.clone(),
        }),
        ClientOptions {
            expected_chain_id: Some(1),
            ..ClientOptions::default()
        },
        Arc::new(Notifier::default()),
    );

    match client.connect().await {
        Err(ClientError::Provider(msg)) => assert!(msg.contains("wrong network")),
        other => panic!("expected wrong network, got {:?}", other.err()),
    }
    assert_eq!(client.notifier().active().len(), 1);
}
