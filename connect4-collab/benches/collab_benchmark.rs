use connect4_collab::broadcast::BroadcastGroup;
use connect4_collab::protocol::{ChatMessage, ClientMessage, ServerMessage, WireFormat};
use connect4_collab::registry::SessionRegistry;
use connect4_core::{GameSession, PlayerId};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::sync::Arc;

fn midgame_state() -> ServerMessage {
    let mut session = GameSession::standard();
    for col in [3, 3, 2, 4, 4, 2, 5, 1, 0, 6] {
        let player = session.current_player();
        let _ = session.apply_move(player, col);
    }
    ServerMessage::StateChange(session.snapshot())
}

fn bench_state_encode_json(c: &mut Criterion) {
    let msg = midgame_state();
    c.bench_function("state_change_encode_json", |b| {
        b.iter(|| black_box(msg.encode(black_box(WireFormat::Json)).unwrap()))
    });
}

fn bench_state_encode_binary(c: &mut Criterion) {
    let msg = midgame_state();
    c.bench_function("state_change_encode_bincode", |b| {
        b.iter(|| black_box(msg.encode(black_box(WireFormat::Binary)).unwrap()))
    });
}

fn bench_move_decode(c: &mut Criterion) {
    let frame = ClientMessage::make_move("a1b2c3", PlayerId::Player1, 3)
        .encode(WireFormat::Json)
        .unwrap();
    c.bench_function("move_decode_json", |b| {
        b.iter(|| black_box(ClientMessage::decode(black_box(&frame)).unwrap()))
    });
}

fn bench_broadcast_100_participants(c: &mut Criterion) {
    let group = BroadcastGroup::new(1024);
    let _receivers: Vec<_> = (0..100).map(|_| group.subscribe()).collect();
    let msg = Arc::new(midgame_state());

    c.bench_function("broadcast_state_100_participants", |b| {
        b.iter(|| black_box(group.broadcast_shared(black_box(msg.clone()))))
    });
}

fn bench_broadcast_1000_chats(c: &mut Criterion) {
    c.bench_function("broadcast_1000_chats_100_participants", |b| {
        b.iter(|| {
            let group = BroadcastGroup::new(2048);
            let receivers: Vec<_> = (0..100).map(|_| group.subscribe()).collect();
            for i in 0..1000 {
                group.broadcast(ServerMessage::Chat(ChatMessage::new("ann", i.to_string())));
            }
            black_box(receivers)
        })
    });
}

fn bench_registry_move(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("registry_join_and_move", |b| {
        b.iter(|| {
            rt.block_on(async {
                let registry = SessionRegistry::with_defaults();
                let p1 = registry.join("bench").await.unwrap();
                let p2 = registry.join("bench").await.unwrap();
                for col in 0..3 {
                    registry
                        .apply_move("bench", p1.participant, PlayerId::Player1, col)
                        .await
                        .unwrap();
                    registry
                        .apply_move("bench", p2.participant, PlayerId::Player2, col)
                        .await
                        .unwrap();
                }
                black_box(registry.snapshot("bench").await.unwrap())
            })
        })
    });
}

criterion_group!(
    benches,
    bench_state_encode_json,
    bench_state_encode_binary,
    bench_move_decode,
    bench_broadcast_100_participants,
    bench_broadcast_1000_chats,
    bench_registry_move,
);
criterion_main!(benches);
