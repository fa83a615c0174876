mod common;

use common::*;
use quickplay_client::config::Tunables;
use quickplay_client::matchmaking::{
    Blacklist, ConnectLog, QuickplayService, SearchPhase, SearchResult,
};
use quickplay_client::transport::simulated::{generate_servers, SimulatedServer};
use quickplay_client::transport::{SearchEvent, SimulatedTransport};
use tokio::sync::mpsc;

fn good_servers() -> Vec<SimulatedServer> {
    (1..=3).map(|n| SimulatedServer::new(server(n, 19, 24, 0))).collect()
}

#[tokio::test]
async fn service_joins_simulated_server() {
    let service = QuickplayService::new(context());
    let (tx, rx) = mpsc::unbounded_channel();
    let transport = SimulatedTransport::new(good_servers(), 1, tx).with_latency_scale(0.0);

    let session = service
        .run_search(lucky(), transport, RecordingPresentation::default(), ConnectLog::default(), rx)
        .await;

    assert_eq!(session.phase(), SearchPhase::Joined);
    assert_eq!(session.connector().commands, vec!["connect 10.0.0.1:27015 quickplay_0"]);
    assert_eq!(session.presentation().results, vec![SearchResult::Connecting]);
    assert!(service.registry().lock().get(&addr(1)).is_some());
}

#[tokio::test]
async fn unresponsive_servers_exhaust_search() {
    let tunables = Tunables {
        ping_timeout_ms: 50,
        ..Tunables::default()
    };
    let service = QuickplayService::new(context_with(tunables, Blacklist::new()));
    let servers = good_servers()
        .into_iter()
        .map(|mut s| {
            s.responsive = false;
            s
        })
        .collect();
    let (tx, rx) = mpsc::unbounded_channel();
    let transport = SimulatedTransport::new(servers, 2, tx).with_latency_scale(0.0);

    let session = service
        .run_search(lucky(), transport, RecordingPresentation::default(), ConnectLog::default(), rx)
        .await;

    assert_eq!(session.result(), Some(SearchResult::FinalPingFailed));
    assert!(session.connector().commands.is_empty());
}

#[tokio::test]
async fn cancel_event_stops_search() {
    let service = QuickplayService::new(context());
    let (tx, rx) = mpsc::unbounded_channel();
    let transport = SimulatedTransport::new(Vec::new(), 3, tx.clone());
    tx.send(SearchEvent::UserCancelled).unwrap();

    let session = service
        .run_search(lucky(), transport, RecordingPresentation::default(), ConnectLog::default(), rx)
        .await;

    // Queued ahead of anything the transport sends
    assert_eq!(session.result(), Some(SearchResult::UserCancelled));
    assert_eq!(session.phase(), SearchPhase::Cancelled);
    assert_eq!(session.presentation().results.len(), 1);
}

#[test]
fn empty_server_list_finds_nothing() {
    let service = QuickplayService::new(context());
    let session = tokio_test::block_on(async {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = SimulatedTransport::new(Vec::new(), 4, tx);
        service
            .run_search(lucky(), transport, RecordingPresentation::default(), ConnectLog::default(), rx)
            .await
    });

    assert_eq!(session.result(), Some(SearchResult::NoServersFound));
}

#[tokio::test]
async fn generated_servers_reach_a_result() {
    let maps: Vec<String> = ["p2coop_intro", "p2coop_bridges", "p3coop_triangle"]
        .iter()
        .map(|m| m.to_string())
        .collect();
    let tunables = Tunables {
        ping_timeout_ms: 200,
        ..Tunables::default()
    };
    let service = QuickplayService::new(context_with(tunables, Blacklist::new()));
    let (tx, rx) = mpsc::unbounded_channel();
    let servers = generate_servers(42, 40, 620, &maps);
    let transport = SimulatedTransport::new(servers, 42, tx).with_latency_scale(0.0);

    let session = service
        .run_search(lucky(), transport, RecordingPresentation::default(), ConnectLog::default(), rx)
        .await;

    assert!(session.is_finished());
    let stats = session.stats(std::time::Instant::now());
    assert!(!stats.servers.is_empty());
    assert_eq!(stats.result_code, session.result().map(SearchResult::code));
    match session.result() {
        Some(SearchResult::Connecting) => assert_eq!(session.connector().commands.len(), 1),
        other => assert!(session.connector().commands.is_empty(), "{other:?}"),
    }
}
