use carechat_server::models::Role;
use carechat_server::ws::events::ServerEvent;
use carechat_server::ws::gateway::GatewayState;
use tokio::sync::mpsc;

fn make_tx() -> (mpsc::UnboundedSender<String>, mpsc::UnboundedReceiver<String>) {
    mpsc::unbounded_channel()
}

#[tokio::test]
async fn register_and_unregister() {
    let gw = GatewayState::new();
    let (tx, _rx) = make_tx();
    let cid = gw.next_client_id().await;
    gw.register(cid, "u1".into(), Role::Patient, "room1".into(), tx)
        .await;

    assert!(gw.clients.read().await.contains_key(&cid));
    assert!(gw.rooms.read().await.get("room1").unwrap().contains(&cid));

    let removed = gw.unregister(cid).await;
    assert!(removed.is_some());
    assert!(!gw.clients.read().await.contains_key(&cid));
    // Last connection out removes the room entry entirely
    assert!(gw.rooms.read().await.get("room1").is_none());
}

#[tokio::test]
async fn next_client_id_increments() {
    let gw = GatewayState::new();
    let id1 = gw.next_client_id().await;
    let id2 = gw.next_client_id().await;
    let id3 = gw.next_client_id().await;
    assert_eq!(id1, 1);
    assert_eq!(id2, 2);
    assert_eq!(id3, 3);
}

#[tokio::test]
async fn unregister_keeps_the_room_while_others_remain() {
    let gw = GatewayState::new();
    let (tx1, _rx1) = make_tx();
    let (tx2, _rx2) = make_tx();

    let cid1 = gw.next_client_id().await;
    let cid2 = gw.next_client_id().await;
    gw.register(cid1, "u1".into(), Role::Patient, "room1".into(), tx1)
        .await;
    gw.register(cid2, "u2".into(), Role::Doctor, "room1".into(), tx2)
        .await;

    gw.unregister(cid1).await;

    let rooms = gw.rooms.read().await;
    let members = rooms.get("room1").unwrap();
    assert!(!members.contains(&cid1));
    assert!(members.contains(&cid2));
}

#[tokio::test]
async fn user_is_online_while_any_tab_lives() {
    let gw = GatewayState::new();
    let (tx1, _rx1) = make_tx();
    let (tx2, _rx2) = make_tx();

    let cid1 = gw.next_client_id().await;
    let cid2 = gw.next_client_id().await;
    gw.register(cid1, "u1".into(), Role::Patient, "room1".into(), tx1)
        .await;
    gw.register(cid2, "u1".into(), Role::Patient, "room1".into(), tx2)
        .await;

    assert!(gw.is_user_online("room1", "u1").await);

    gw.unregister(cid1).await;
    assert!(gw.is_user_online("room1", "u1").await);

    gw.unregister(cid2).await;
    assert!(!gw.is_user_online("room1", "u1").await);
}

#[tokio::test]
async fn online_presence_is_scoped_to_the_room() {
    let gw = GatewayState::new();
    let (tx, _rx) = make_tx();
    let cid = gw.next_client_id().await;
    gw.register(cid, "u1".into(), Role::Patient, "room1".into(), tx)
        .await;

    assert!(gw.is_user_online("room1", "u1").await);
    assert!(!gw.is_user_online("room2", "u1").await);
}

#[tokio::test]
async fn online_users_lists_each_user_once() {
    let gw = GatewayState::new();
    let (tx1, _rx1) = make_tx();
    let (tx2, _rx2) = make_tx();
    let (tx3, _rx3) = make_tx();

    let cid1 = gw.next_client_id().await;
    let cid2 = gw.next_client_id().await;
    let cid3 = gw.next_client_id().await;
    gw.register(cid1, "u1".into(), Role::Patient, "room1".into(), tx1)
        .await;
    gw.register(cid2, "u1".into(), Role::Patient, "room1".into(), tx2)
        .await;
    gw.register(cid3, "u2".into(), Role::Doctor, "room1".into(), tx3)
        .await;

    let mut users = gw.online_users("room1").await;
    users.sort();
    assert_eq!(users, vec!["u1".to_string(), "u2".to_string()]);
}

#[tokio::test]
async fn broadcast_room_reaches_every_member() {
    let gw = GatewayState::new();
    let (tx1, mut rx1) = make_tx();
    let (tx2, mut rx2) = make_tx();

    let cid1 = gw.next_client_id().await;
    let cid2 = gw.next_client_id().await;
    gw.register(cid1, "u1".into(), Role::Patient, "room1".into(), tx1)
        .await;
    gw.register(cid2, "u2".into(), Role::Doctor, "room1".into(), tx2)
        .await;

    let event = ServerEvent::Typing {
        user_id: "u1".into(),
        is_typing: true,
    };
    gw.broadcast_room("room1", &event, None).await;

    assert!(rx1.try_recv().is_ok());
    assert!(rx2.try_recv().is_ok());
}

#[tokio::test]
async fn broadcast_room_honors_the_exclusion() {
    let gw = GatewayState::new();
    let (tx1, mut rx1) = make_tx();
    let (tx2, mut rx2) = make_tx();

    let cid1 = gw.next_client_id().await;
    let cid2 = gw.next_client_id().await;
    gw.register(cid1, "u1".into(), Role::Patient, "room1".into(), tx1)
        .await;
    gw.register(cid2, "u2".into(), Role::Doctor, "room1".into(), tx2)
        .await;

    let event = ServerEvent::Typing {
        user_id: "u1".into(),
        is_typing: true,
    };
    gw.broadcast_room("room1", &event, Some(cid1)).await;

    assert!(rx1.try_recv().is_err());
    assert!(rx2.try_recv().is_ok());
}

#[tokio::test]
async fn broadcast_room_stays_inside_the_room() {
    let gw = GatewayState::new();
    let (tx1, mut rx1) = make_tx();
    let (tx2, mut rx2) = make_tx();

    let cid1 = gw.next_client_id().await;
    let cid2 = gw.next_client_id().await;
    gw.register(cid1, "u1".into(), Role::Patient, "room1".into(), tx1)
        .await;
    gw.register(cid2, "u2".into(), Role::Doctor, "room2".into(), tx2)
        .await;

    let event = ServerEvent::Presence {
        user_id: "u1".into(),
        online: true,
    };
    gw.broadcast_room("room1", &event, None).await;

    assert!(rx1.try_recv().is_ok());
    assert!(rx2.try_recv().is_err());
}

#[tokio::test]
async fn send_to_targets_one_connection() {
    let gw = GatewayState::new();
    let (tx1, mut rx1) = make_tx();
    let (tx2, mut rx2) = make_tx();

    let cid1 = gw.next_client_id().await;
    let cid2 = gw.next_client_id().await;
    gw.register(cid1, "u1".into(), Role::Patient, "room1".into(), tx1)
        .await;
    gw.register(cid2, "u2".into(), Role::Doctor, "room1".into(), tx2)
        .await;

    let event = ServerEvent::Error {
        message: "test".into(),
    };
    gw.send_to(cid1, &event).await;

    assert!(rx1.try_recv().is_ok());
    assert!(rx2.try_recv().is_err());
}

#[tokio::test]
async fn broadcast_survives_a_dropped_receiver() {
    let gw = GatewayState::new();
    let (tx1, rx1) = make_tx();
    let (tx2, mut rx2) = make_tx();

    let cid1 = gw.next_client_id().await;
    let cid2 = gw.next_client_id().await;
    gw.register(cid1, "u1".into(), Role::Patient, "room1".into(), tx1)
        .await;
    gw.register(cid2, "u2".into(), Role::Doctor, "room1".into(), tx2)
        .await;

    drop(rx1);

    let event = ServerEvent::Typing {
        user_id: "u1".into(),
        is_typing: false,
    };
    gw.broadcast_room("room1", &event, None).await;

    assert!(rx2.try_recv().is_ok());
}
