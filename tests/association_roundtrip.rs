use std::sync::Arc;

use modality_emulator::association::{check_connection, AssociationClient, Capability, Connector};
use modality_emulator::common::status::DimseStatus;
use modality_emulator::receiver::StoreReceiver;
use modality_emulator::sender::{self, CancellationToken, SeriesOrchestrator};
use modality_emulator::worklist::{self, FindAnomaly, WorklistQuery};
use modality_emulator::{Modality, ObjectGenerator, RemoteNode, SopClassTable};

async fn start_receiver(receiver: StoreReceiver) -> (Arc<StoreReceiver>, u16) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let receiver = Arc::new(receiver);
    tokio::spawn(Arc::clone(&receiver).serve(listener));
    (receiver, port)
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_store_against_receiver() {
    let kept = tempfile::tempdir().unwrap();
    let (receiver, port) =
        start_receiver(StoreReceiver::new("MYSTORE", 4).output_dir(kept.path())).await;
    let node = RemoteNode::new("127.0.0.1", port, "MYSTORE");

    let outcome = tokio::task::spawn_blocking(move || {
        let client = AssociationClient::new("A_VERY_LONG_CALLING_AE_TITLE", node);
        let table = SopClassTable::new();
        let result = client.open(&[Capability::storage(Modality::Ct, &table)]);
        assert!(result.established(), "{:?}", result.error);

        let mut handle = result.handle.unwrap();
        let object = ObjectGenerator::new(table).generate(Modality::Ct);
        let outcome = sender::store(&mut handle, &object);
        client.close(handle);
        outcome
    })
    .await
    .unwrap();

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.status, DimseStatus::Success(0));
    assert!(outcome.bytes_sent > 0);
    assert_eq!(receiver.received_count(), 1);
    assert_eq!(std::fs::read_dir(kept.path()).unwrap().count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_series_against_receiver() {
    let (receiver, port) = start_receiver(StoreReceiver::new("MYSTORE", 4)).await;
    let work = tempfile::tempdir().unwrap();
    let work_dir = work.path().to_path_buf();

    let report = tokio::task::spawn_blocking(move || {
        let client = AssociationClient::new("EMULATOR", RemoteNode::new("127.0.0.1", port, "MYSTORE"));
        let mut series = SeriesOrchestrator::new(client, ObjectGenerator::new(SopClassTable::new()))
            .work_dir(work_dir);
        series.send_series(3, Modality::Pt, None, &CancellationToken::new())
    })
    .await
    .unwrap();

    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(receiver.received_count(), 3);
    assert!(std::fs::read_dir(work.path()).unwrap().next().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_find_not_negotiated_with_store_only_peer() {
    let (_receiver, port) = start_receiver(StoreReceiver::new("MYSTORE", 4)).await;

    let outcome = tokio::task::spawn_blocking(move || {
        let client = AssociationClient::new("EMULATOR", RemoteNode::new("127.0.0.1", port, "MYSTORE"));
        let result = client.open(&[Capability::verification(), Capability::worklist_find()]);
        assert!(result.established(), "{:?}", result.error);
        let mut handle = result.handle.unwrap();
        let outcome = worklist::find(&mut handle, &WorklistQuery::full());
        client.close(handle);
        outcome
    })
    .await
    .unwrap();

    assert!(outcome.items.is_empty());
    assert!(!outcome.used_fallback);
    assert_eq!(outcome.anomalies, vec![FindAnomaly::NoContext]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_receiver_refuses_worklist_only_association() {
    let (_receiver, port) = start_receiver(StoreReceiver::new("MYSTORE", 4)).await;

    let established = tokio::task::spawn_blocking(move || {
        let client = AssociationClient::new("EMULATOR", RemoteNode::new("127.0.0.1", port, "MYSTORE"));
        client.open(&[Capability::worklist_find()]).established()
    })
    .await
    .unwrap();

    assert!(!established);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_check_connection() {
    let (_receiver, port) = start_receiver(StoreReceiver::new("MYSTORE", 1)).await;
    let closed = free_port();

    let (up, down) = tokio::task::spawn_blocking(move || {
        let capabilities = [Capability::verification()];
        (
            check_connection("EMULATOR", &RemoteNode::new("127.0.0.1", port, "MYSTORE"), &capabilities),
            check_connection("EMULATOR", &RemoteNode::new("127.0.0.1", closed, "MYSTORE"), &capabilities),
        )
    })
    .await
    .unwrap();

    assert!(up);
    assert!(!down);
}

#[test]
fn test_open_closed_port_is_not_established() {
    let client = AssociationClient::new("EMULATOR", RemoteNode::new("127.0.0.1", free_port(), "NOBODY"));
    let result = client.open(&[Capability::worklist_find()]);
    assert!(!result.established());
    assert!(result.error.is_some());
}
