use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use realtime_dispatch::core::message::{Message, MessageCodec, MessageEncoder};
use realtime_dispatch::core::serialization::SerializationFormat;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone)]
struct Move {
    player: u64,
    x: f32,
    y: f32,
    facing: String,
}

#[allow(clippy::unwrap_used)]
fn bench_message_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_envelope");
    let messages = vec![
        Message::request(1, "Room.Join", &b"{}"[..]),
        Message::notify("Room.Move", vec![7u8; 64]),
        Message::response(1, vec![1u8; 1024]),
        Message::request(u32::MAX as u64, "room.Room.Sync", "a".repeat(4096).into_bytes()),
    ];

    for (name, codec) in [
        ("plain", MessageCodec::new(false)),
        ("compressed", MessageCodec::new(true)),
        (
            "dictionary",
            MessageCodec::new(false)
                .with_dictionary([("Room.Join", 1u16), ("Room.Move", 2), ("room.Room.Sync", 3)])
                .unwrap(),
        ),
    ] {
        group.bench_function(format!("encode_{name}"), |b| {
            b.iter(|| {
                for m in &messages {
                    let _ = codec.encode(m).unwrap();
                }
            })
        });

        let encoded: Vec<Vec<u8>> = messages.iter().map(|m| codec.encode(m).unwrap()).collect();
        group.bench_function(format!("decode_{name}"), |b| {
            b.iter(|| {
                for bytes in &encoded {
                    let _ = codec.decode(bytes).unwrap();
                }
            })
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_body_serializers(c: &mut Criterion) {
    let mut group = c.benchmark_group("body_serializers");
    let body = Move {
        player: 42,
        x: 10.5,
        y: -3.25,
        facing: "north".into(),
    };

    for format in [
        SerializationFormat::Json,
        SerializationFormat::Bincode,
        SerializationFormat::MessagePack,
    ] {
        group.bench_function(format!("marshal_{}", format.name()), |b| {
            b.iter_batched(
                || body.clone(),
                |value| format.marshal(&value).unwrap(),
                BatchSize::SmallInput,
            )
        });
        let blob = format.marshal(&body).unwrap();
        group.bench_function(format!("unmarshal_{}", format.name()), |b| {
            b.iter(|| {
                let _: Move = format.unmarshal(&blob).unwrap();
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_message_envelope, bench_body_serializers);
criterion_main!(benches);
