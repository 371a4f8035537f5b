//! End-to-end payload sync between services over loopback TCP

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_test::{assert_err, assert_ok};

use common::*;
use peerclip_core::clipboard::{ClipboardAccess, MemoryClipboard};
use peerclip_core::files::{DownloadDir, FileStore};
use peerclip_core::history::{HistoryStore, JsonHistory, MemoryHistory};
use peerclip_core::notify::SilentNotifier;
use peerclip_core::sync::Collaborators;
use peerclip_core::{
    ConnectionState, Error, ItemKind, Message, PeerclipService, ServiceEvent, SyncEvent, TransferItem,
};

struct Node {
    service: PeerclipService,
    events: mpsc::Receiver<ServiceEvent>,
    clipboard: Arc<MemoryClipboard>,
}

async fn node(name: &str, downloads: Option<&std::path::Path>) -> Node {
    node_with(name, downloads, Arc::new(MemoryHistory::new()), false).await
}

async fn node_with(
    name: &str,
    downloads: Option<&std::path::Path>,
    history: Arc<dyn HistoryStore>,
    watch_clipboard: bool,
) -> Node {
    let clipboard = Arc::new(MemoryClipboard::new());
    let collaborators = Collaborators {
        clipboard: clipboard.clone(),
        history,
        notifier: Arc::new(SilentNotifier),
        files: downloads.map(|dir| Arc::new(DownloadDir::new(dir)) as Arc<dyn FileStore>),
    };
    let mut service = PeerclipService::new(test_config(), identity(name), collaborators);
    let events = service.start(watch_clipboard).await.unwrap();
    Node {
        service,
        events,
        clipboard,
    }
}

async fn link(alpha: &Node, bravo: &Node) {
    let port = bravo.service.listen_addr().await.unwrap().port();
    assert!(alpha.service.connect(&loopback_peer("bravo", port)).await);
    wait_for_peer_named(bravo.service.manager(), "alpha").await;
}

async fn linked_pair(downloads: Option<&std::path::Path>) -> (Node, Node) {
    let alpha = node("alpha", None).await;
    let bravo = node("bravo", downloads).await;
    link(&alpha, &bravo).await;
    (alpha, bravo)
}

/// Wait for the first sync event matching `wanted`
async fn next_sync<F>(events: &mut mpsc::Receiver<ServiceEvent>, wanted: F) -> SyncEvent
where
    F: Fn(&SyncEvent) -> bool,
{
    timeout(PATIENCE, async {
        loop {
            match events.recv().await {
                Some(ServiceEvent::Sync(event)) if wanted(&event) => return event,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("sync event never arrived")
}

fn is_text_received(event: &SyncEvent) -> bool {
    matches!(event, SyncEvent::TextReceived(_))
}

#[tokio::test]
async fn test_text_is_applied_and_acknowledged() {
    let (mut alpha, mut bravo) = linked_pair(None).await;

    let sent = assert_ok!(alpha.service.send_text("hello").await);
    assert_eq!(sent.kind, ItemKind::Text);
    assert_eq!(sent.origin_device, "alpha");

    let SyncEvent::TextReceived(received) = next_sync(&mut bravo.events, is_text_received).await else {
        unreachable!()
    };
    assert_eq!(received.id, sent.id);
    assert_eq!(received.content, "hello");
    assert_eq!(bravo.clipboard.read_text().unwrap().as_deref(), Some("hello"));
    assert_eq!(bravo.clipboard.write_count(), 1);

    let ack = next_sync(&mut alpha.events, |e| matches!(e, SyncEvent::Acknowledged { .. })).await;
    match ack {
        SyncEvent::Acknowledged { item_id, kind } => {
            assert_eq!(item_id, sent.id);
            assert_eq!(kind, ItemKind::Text);
        }
        other => panic!("unexpected {:?}", other),
    }

    assert_eq!(alpha.service.history(10).unwrap()[0].id, sent.id);
    let bravo_history = bravo.service.history(10).unwrap();
    assert_eq!(bravo_history.len(), 1);
    assert_eq!(bravo_history[0].origin_device, "alpha");
}

#[tokio::test]
async fn test_file_arrives_byte_identical() {
    let downloads = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    let path = source.path().join("report.bin");
    let bytes: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();
    std::fs::write(&path, &bytes).unwrap();

    let (mut alpha, mut bravo) = linked_pair(Some(downloads.path())).await;

    let sent = assert_ok!(alpha.service.send_file(&path).await);
    assert_eq!(sent.kind, ItemKind::File);
    assert_eq!(sent.file_path.as_deref(), Some(path.as_path()));

    let event = next_sync(&mut bravo.events, |e| matches!(e, SyncEvent::FileReceived(_))).await;
    let SyncEvent::FileReceived(received) = event else { unreachable!() };
    assert_eq!(received.file_name.as_deref(), Some("report.bin"));
    assert_eq!(received.file_bytes().unwrap(), bytes);

    let saved = received.file_path.expect("file was not saved");
    assert_eq!(saved.parent(), Some(downloads.path()));
    assert_eq!(std::fs::read(&saved).unwrap(), bytes);

    let ack = next_sync(&mut alpha.events, |e| matches!(e, SyncEvent::Acknowledged { .. })).await;
    assert!(matches!(ack, SyncEvent::Acknowledged { kind: ItemKind::File, .. }));
}

#[tokio::test]
async fn test_local_copy_reaches_peer_without_echo() {
    let mut alpha = node_with("alpha", None, Arc::new(MemoryHistory::new()), true).await;
    let mut bravo = node_with("bravo", None, Arc::new(MemoryHistory::new()), true).await;
    link(&alpha, &bravo).await;
    sleep(Duration::from_millis(100)).await;

    alpha.clipboard.write_text("ping").unwrap();

    let SyncEvent::TextReceived(received) = next_sync(&mut bravo.events, is_text_received).await else {
        unreachable!()
    };
    assert_eq!(received.content, "ping");
    assert_eq!(received.origin_device, "alpha");

    // Several poll periods for either monitor to send it again
    sleep(Duration::from_millis(300)).await;
    let echoed = timeout(Duration::from_millis(200), next_sync(&mut alpha.events, is_text_received)).await;
    assert!(echoed.is_err(), "text came back to its origin");

    assert_eq!(bravo.clipboard.read_text().unwrap().as_deref(), Some("ping"));
    assert_eq!(bravo.clipboard.write_count(), 1);
    assert_eq!(alpha.clipboard.write_count(), 1);
    assert_eq!(alpha.service.history(10).unwrap().len(), 1);
    assert_eq!(bravo.service.history(10).unwrap().len(), 1);
}

#[tokio::test]
async fn test_received_file_bytes_stay_out_of_history() {
    let data = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    let path = source.path().join("photo.raw");
    let bytes = vec![0x5a_u8; 1024 * 1024];
    std::fs::write(&path, &bytes).unwrap();

    let history_path = data.path().join("history.json");
    let history = Arc::new(JsonHistory::open(&history_path).unwrap());
    let mut alpha = node("alpha", None).await;
    let mut bravo = node_with("bravo", Some(data.path()), history, false).await;
    link(&alpha, &bravo).await;

    assert_ok!(alpha.service.send_file(&path).await);
    let event = next_sync(&mut bravo.events, |e| matches!(e, SyncEvent::FileReceived(_))).await;
    let SyncEvent::FileReceived(received) = event else { unreachable!() };
    assert_eq!(received.file_bytes().unwrap(), bytes);

    let stored = bravo.service.history(10).unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].content.is_empty());
    assert_eq!(stored[0].file_path, received.file_path);
    assert!(std::fs::metadata(&history_path).unwrap().len() < 4096);

    let sent = alpha.service.history(10).unwrap();
    assert!(sent[0].content.is_empty());
    assert_eq!(sent[0].file_path.as_deref(), Some(path.as_path()));
    let _ = next_sync(&mut alpha.events, |e| matches!(e, SyncEvent::Acknowledged { .. })).await;
}

#[tokio::test]
async fn test_duplicate_delivery_applied_once_acked_twice() {
    let mut bravo = node("bravo", None).await;
    let addr = bravo.service.listen_addr().await.unwrap();
    let mut phone = pair_with(addr, "phone").await;

    let item = TransferItem::text("1".to_string(), "hello", "phone");
    let data = Message::data(item.clone()).unwrap();
    phone.send(&data).await.unwrap();
    phone.send(&data).await.unwrap();

    for _ in 0..2 {
        match recv_skipping_heartbeats(&mut phone).await {
            Message::ClipboardAck { item_id, .. } => assert_eq!(item_id, "1"),
            other => panic!("expected clipboard_ack, got {:?}", other),
        }
    }

    next_sync(&mut bravo.events, is_text_received).await;
    let again = timeout(Duration::from_millis(200), next_sync(&mut bravo.events, is_text_received)).await;
    assert!(again.is_err(), "duplicate was applied");

    assert_eq!(bravo.clipboard.write_count(), 1);
    assert_eq!(bravo.service.history(10).unwrap().len(), 1);
}

#[tokio::test]
async fn test_lost_ack_does_not_trigger_resend() {
    let (listener, port) = fake_listener().await;
    let mut alpha = node("alpha", None).await;

    let connecting = tokio::spawn({
        let peer = loopback_peer("phone", port);
        let manager = alpha.service.manager().clone();
        async move { manager.connect(&peer).await }
    });
    let (mut phone, _) = accept_pairing(&listener, "phone").await;
    assert!(connecting.await.unwrap());

    let sent = alpha.service.send_text("hello").await.unwrap();
    match recv_skipping_heartbeats(&mut phone).await {
        Message::ClipboardData { data, .. } => {
            assert_eq!(data.id, sent.id);
            assert_eq!(data.content, "hello");
            assert!(data.file_path.is_none());
        }
        other => panic!("expected clipboard_data, got {:?}", other),
    }

    // No ack yet, and none is waited for
    let resent = timeout(Duration::from_millis(300), phone.recv()).await;
    assert!(resent.is_err(), "item was sent again");

    phone
        .send(&Message::ClipboardAck {
            item_id: sent.id.clone(),
            timestamp: 0,
        })
        .await
        .unwrap();
    let ack = next_sync(&mut alpha.events, |e| matches!(e, SyncEvent::Acknowledged { .. })).await;
    assert!(matches!(ack, SyncEvent::Acknowledged { ref item_id, .. } if *item_id == sent.id));
    assert_eq!(alpha.service.state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn test_send_requires_connection_and_content() {
    let mut alpha = node("alpha", None).await;

    let result = alpha.service.send_text("hello").await;
    assert!(matches!(assert_err!(result), Error::NotConnected));

    let result = alpha.service.send_text("").await;
    assert!(matches!(result, Err(Error::InvalidContent(_))));

    assert!(matches!(alpha.service.start(false).await, Err(Error::AlreadyRunning)));
    assert!(alpha.service.history(10).unwrap().is_empty());
}
