use std::collections::HashMap;

use super::*;
use async_trait::async_trait;
use serde_json::json;
use shared::{domain::EntityId, protocol::AvatarUpdate};
use tokio::sync::mpsc;

use crate::{avatar::Pose, test_support::capture_logs, transport::ChannelPeer};

const WORLD: WorldId = WorldId(1);

fn session_with_peers(avatar: AvatarState) -> (WorldSession, ChannelPeer, ChannelPeer) {
    let (chat, chat_peer) = WorldChannel::pair(WORLD, ChannelKind::Chat);
    let (state, state_peer) = WorldChannel::pair(WORLD, ChannelKind::State);
    let session = WorldSession::new(WORLD, chat, state, avatar, PursuitParams::default());
    (session, chat_peer, state_peer)
}

fn chat_line(name: &str, id: i64, msg: &str) -> String {
    json!({"name": name, "msg": msg, "id": id, "role": "user"}).to_string()
}

fn spawn_avatar() -> AvatarState {
    AvatarState::new(Default::default(), Pose::at(0.0, 0.0, 0.0))
}

fn decode_pose(payload: &str) -> AvatarUpdate {
    serde_json::from_str(payload).expect("pose payload")
}

#[tokio::test]
async fn follow_command_replies_on_chat_channel() {
    let (mut session, mut chat_peer, _state_peer) = session_with_peers(spawn_avatar());
    session
        .on_chat(&chat_line("Ann", 5, "!f"))
        .await
        .expect("chat");
    assert_eq!(
        chat_peer.from_client.recv().await.as_deref(),
        Some("I will now follow you, Ann")
    );
    assert_eq!(session.avatar().target_id, EntityId(5));
}

#[tokio::test]
async fn plain_and_unknown_lines_send_nothing() {
    let (mut session, mut chat_peer, _state_peer) = session_with_peers(spawn_avatar());
    session
        .on_chat(&chat_line("Ann", 5, "hello"))
        .await
        .expect("chat");
    session
        .on_chat(&chat_line("Ann", 5, "!xyz"))
        .await
        .expect("chat");
    session
        .on_chat(&json!({"name": "Ann", "id": 5}).to_string())
        .await
        .expect("chat");
    assert!(chat_peer.from_client.try_recv().is_err());
    assert_eq!(session.avatar().target_id, EntityId::NONE);
}

#[tokio::test]
async fn every_chat_line_is_logged_with_world_and_sender() {
    let (logs, _guard) = capture_logs();
    let (mut session, _chat_peer, _state_peer) = session_with_peers(spawn_avatar());
    session
        .on_chat(&chat_line("Ann", 5, "hello there"))
        .await
        .expect("chat");
    session
        .on_chat(&chat_line("Ann", 5, "!xyz"))
        .await
        .expect("chat");

    assert!(logs.line_containing("[World#1] <Ann>: hello there").is_some());
    assert!(logs.line_containing("[World#1] <Ann>: !xyz").is_some());
    assert!(logs
        .line_containing("Error: ERR_INVALID_COMMAND for command: !xyz")
        .is_some());
}

#[tokio::test]
async fn malformed_chat_is_reported_without_reply() {
    let (mut session, mut chat_peer, _state_peer) = session_with_peers(spawn_avatar());
    let err = session.on_chat("{not json").await.expect_err("malformed");
    assert!(matches!(
        err,
        CompanionError::MalformedMessage {
            channel: ChannelKind::Chat,
            ..
        }
    ));
    assert!(chat_peer.from_client.try_recv().is_err());
}

#[tokio::test]
async fn tick_without_target_republishes_unchanged_pose() {
    let (mut session, _chat_peer, mut state_peer) = session_with_peers(spawn_avatar());
    let snapshot = json!([{"entityId": 8, "x": 5.0, "y": 0.0, "z": 5.0}]).to_string();
    session.on_state(&snapshot).await.expect("tick");

    let pose = decode_pose(&state_peer.from_client.recv().await.expect("pose"));
    assert_eq!(pose.entity_id, EntityId(3));
    assert_eq!((pose.x, pose.y, pose.z), (0.0, 0.0, 0.0));
    assert_eq!(session.avatar().pose, Pose::at(0.0, 0.0, 0.0));
}

#[tokio::test]
async fn tick_with_target_moves_and_publishes() {
    let mut avatar = spawn_avatar();
    avatar.target_id = EntityId(5);
    let (mut session, _chat_peer, mut state_peer) = session_with_peers(avatar);
    let snapshot = json!([{"entityId": 5, "x": 0.0, "y": 0.0, "z": 10.0}]).to_string();
    session.on_state(&snapshot).await.expect("tick");

    let pose = decode_pose(&state_peer.from_client.recv().await.expect("pose"));
    assert!((pose.z - 1.6).abs() < 1e-9);
    assert_eq!(pose.x, 0.0);
}

#[tokio::test]
async fn malformed_snapshot_still_sends_heartbeat() {
    let (mut session, _chat_peer, mut state_peer) = session_with_peers(spawn_avatar());
    let err = session.on_state("garbage").await.expect_err("malformed");
    assert!(matches!(
        err,
        CompanionError::MalformedMessage {
            channel: ChannelKind::State,
            ..
        }
    ));
    assert!(state_peer.from_client.recv().await.is_some());
}

#[tokio::test]
async fn degenerate_tick_publishes_finite_pose() {
    let mut avatar = spawn_avatar();
    avatar.target_id = EntityId(5);
    let (mut session, _chat_peer, mut state_peer) = session_with_peers(avatar);
    let snapshot = json!([{"entityId": 5, "x": 0.0, "y": 0.0, "z": 0.0}]).to_string();
    session.on_state(&snapshot).await.expect("tick");

    let pose = decode_pose(&state_peer.from_client.recv().await.expect("pose"));
    assert_eq!((pose.x, pose.y, pose.z), (0.0, 0.0, 0.0));
    assert!(session.avatar().pose.is_finite());
}

#[tokio::test]
async fn run_loop_survives_bad_packets_and_ends_on_close() {
    let (session, mut chat_peer, mut state_peer) = session_with_peers(spawn_avatar());
    let handle = tokio::spawn(session.run());

    chat_peer.to_client.send("%%%".into()).await.expect("send");
    state_peer.to_client.send("[".into()).await.expect("send");
    chat_peer
        .to_client
        .send(chat_line("Ann", 5, "!f"))
        .await
        .expect("send");
    assert_eq!(
        chat_peer.from_client.recv().await.as_deref(),
        Some("I will now follow you, Ann")
    );
    // heartbeat for the malformed tick
    assert!(state_peer.from_client.recv().await.is_some());

    state_peer
        .to_client
        .send(json!([{"entityId": 5, "x": 0.0, "y": 0.0, "z": 10.0}]).to_string())
        .await
        .expect("send");
    let pose = decode_pose(&state_peer.from_client.recv().await.expect("pose"));
    assert!(pose.z > 0.0 && pose.z < 10.0);

    drop(chat_peer);
    let end = handle.await.expect("session task");
    assert_eq!(end.world, WORLD);
    assert_eq!(end.closed, ChannelKind::Chat);
    assert_eq!(end.chat_lines, 1);
    assert_eq!(end.ticks, 2);
    assert_eq!(end.avatar.target_id, EntityId(5));
}

struct MemoryConnector {
    failing: Vec<WorldId>,
    panicking: Vec<WorldId>,
    peers: mpsc::UnboundedSender<(WorldId, ChannelKind, ChannelPeer)>,
}

#[async_trait]
impl WorldConnector for MemoryConnector {
    async fn connect(
        &self,
        world: WorldId,
        kind: ChannelKind,
    ) -> Result<WorldChannel, CompanionError> {
        if self.panicking.contains(&world) {
            panic!("connector exploded for world {world}");
        }
        if self.failing.contains(&world) {
            return Err(CompanionError::Connection {
                world,
                channel: kind,
                reason: "connection refused".into(),
            });
        }
        let (channel, peer) = WorldChannel::pair(world, kind);
        let _ = self.peers.send((world, kind, peer));
        Ok(channel)
    }
}

type PeerMap = HashMap<(WorldId, ChannelKind), ChannelPeer>;

async fn collect_peers(
    rx: &mut mpsc::UnboundedReceiver<(WorldId, ChannelKind, ChannelPeer)>,
    worlds: usize,
) -> PeerMap {
    let mut peers = HashMap::new();
    while peers.len() < worlds * 2 {
        let (world, kind, peer) = rx.recv().await.expect("peer");
        peers.insert((world, kind), peer);
    }
    peers
}

fn take(peers: &mut PeerMap, world: WorldId, kind: ChannelKind) -> ChannelPeer {
    peers.remove(&(world, kind)).expect("peer for world")
}

fn memory_connector(
    failing: Vec<WorldId>,
    panicking: Vec<WorldId>,
) -> (
    Arc<dyn WorldConnector>,
    mpsc::UnboundedReceiver<(WorldId, ChannelKind, ChannelPeer)>,
) {
    let (peers, rx) = mpsc::unbounded_channel();
    let connector = MemoryConnector {
        failing,
        panicking,
        peers,
    };
    (Arc::new(connector), rx)
}

#[tokio::test]
async fn failing_world_does_not_stop_healthy_world() {
    let (connector, mut rx) = memory_connector(vec![WorldId(2)], Vec::new());
    let template = spawn_avatar();
    let run = tokio::spawn(async move {
        run_worlds(
            connector,
            &[WorldId(1), WorldId(2)],
            &template,
            PursuitParams::default(),
        )
        .await
    });

    let mut peers = collect_peers(&mut rx, 1).await;
    let mut chat_peer = take(&mut peers, WorldId(1), ChannelKind::Chat);
    let mut state_peer = take(&mut peers, WorldId(1), ChannelKind::State);
    chat_peer
        .to_client
        .send(chat_line("Ann", 5, "!f"))
        .await
        .expect("send");
    assert_eq!(
        chat_peer.from_client.recv().await.as_deref(),
        Some("I will now follow you, Ann")
    );
    state_peer.to_client.send("[]".into()).await.expect("send");
    assert!(state_peer.from_client.recv().await.is_some());

    drop(state_peer);
    let reports = run.await.expect("orchestrator");
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].world, WorldId(1));
    match &reports[0].outcome {
        WorldOutcome::Closed(end) => assert_eq!(end.closed, ChannelKind::State),
        other => panic!("world 1 should close cleanly, got {other:?}"),
    }
    assert_eq!(reports[1].world, WorldId(2));
    assert!(matches!(
        reports[1].outcome,
        WorldOutcome::Failed(CompanionError::Connection { .. })
    ));
    drop(chat_peer);
}

#[tokio::test]
async fn failed_world_is_logged_while_sibling_is_still_running() {
    let (logs, _guard) = capture_logs();
    let (connector, mut rx) = memory_connector(vec![WorldId(2)], Vec::new());
    let template = spawn_avatar();
    let run = tokio::spawn(async move {
        run_worlds(
            connector,
            &[WorldId(1), WorldId(2)],
            &template,
            PursuitParams::default(),
        )
        .await
    });

    let mut peers = collect_peers(&mut rx, 1).await;
    let mut chat_peer = take(&mut peers, WorldId(1), ChannelKind::Chat);
    chat_peer
        .to_client
        .send(chat_line("Ann", 5, "!f"))
        .await
        .expect("send");
    chat_peer.from_client.recv().await.expect("reply");

    let failure = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            if let Some(line) = logs.line_containing("world session failed") {
                return line;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("failure logged before world 1 closes");
    assert!(failure.contains("ERROR"));
    assert!(failure.contains("world_id=2"));
    assert!(!run.is_finished());

    drop((chat_peer, peers));
    let reports = run.await.expect("orchestrator");
    assert!(matches!(reports[0].outcome, WorldOutcome::Closed(_)));
}

#[tokio::test]
async fn panicking_world_is_contained() {
    let (connector, mut rx) = memory_connector(Vec::new(), vec![WorldId(3)]);
    let template = spawn_avatar();
    let run = tokio::spawn(async move {
        run_worlds(
            connector,
            &[WorldId(3), WorldId(1)],
            &template,
            PursuitParams::default(),
        )
        .await
    });

    let peers = collect_peers(&mut rx, 1).await;
    drop(peers);

    let reports = run.await.expect("orchestrator");
    match &reports[0].outcome {
        WorldOutcome::Panicked(reason) => assert!(reason.contains("connector exploded")),
        other => panic!("world 3 should panic, got {other:?}"),
    }
    assert!(matches!(reports[1].outcome, WorldOutcome::Closed(_)));
}

#[tokio::test]
async fn worlds_keep_independent_follow_targets() {
    let (connector, mut rx) = memory_connector(Vec::new(), Vec::new());
    let template = spawn_avatar();
    let run = tokio::spawn(async move {
        run_worlds(
            connector,
            &[WorldId(1), WorldId(4)],
            &template,
            PursuitParams::default(),
        )
        .await
    });
    let mut peers = collect_peers(&mut rx, 2).await;

    let mut chat_a = take(&mut peers, WorldId(1), ChannelKind::Chat);
    chat_a
        .to_client
        .send(chat_line("Ann", 5, "!f"))
        .await
        .expect("send");
    chat_a.from_client.recv().await.expect("reply");

    let mut state_b = take(&mut peers, WorldId(4), ChannelKind::State);
    state_b
        .to_client
        .send(json!([{"entityId": 5, "x": 0.0, "y": 0.0, "z": 10.0}]).to_string())
        .await
        .expect("send");
    let pose = decode_pose(&state_b.from_client.recv().await.expect("pose"));
    assert_eq!(pose.z, 0.0);

    drop((chat_a, state_b, peers));
    let reports = run.await.expect("orchestrator");
    let targets: Vec<_> = reports
        .iter()
        .map(|report| match &report.outcome {
            WorldOutcome::Closed(end) => end.avatar.target_id,
            other => panic!("unexpected outcome {other:?}"),
        })
        .collect();
    assert_eq!(targets, vec![EntityId(5), EntityId::NONE]);
}
