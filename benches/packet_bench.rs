use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use realtime_dispatch::core::codec::{PacketCodec, PacketDecoder, PacketEncoder};
use realtime_dispatch::core::packet::PacketType;

#[allow(clippy::unwrap_used)]
fn bench_packet_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_encode_decode");
    let payload_sizes = [64usize, 512, 4096, 65536, 1024 * 1024];
    let codec = PacketCodec::default();

    for &size in &payload_sizes {
        let payload = vec![0u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter(|| codec.encode_packet(PacketType::Data, &payload).unwrap())
        });

        let frame = codec.encode_packet(PacketType::Data, &payload).unwrap();
        group.bench_function(format!("decode_{size}b"), |b| {
            b.iter_batched(
                || BytesMut::from(&frame[..]),
                |mut buf| {
                    let packets = codec.decode_packets(&mut buf).unwrap();
                    assert_eq!(packets.len(), 1);
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_small_frame_stream(c: &mut Criterion) {
    let codec = PacketCodec::default();
    let mut wire = BytesMut::new();
    for i in 0..256u32 {
        let kind = if i % 8 == 0 {
            PacketType::Heartbeat
        } else {
            PacketType::Data
        };
        wire.extend_from_slice(&codec.encode_packet(kind, &i.to_be_bytes()).unwrap());
    }

    let mut group = c.benchmark_group("packet_stream");
    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function("decode_256_small_frames", |b| {
        b.iter_batched(
            || wire.clone(),
            |mut buf| codec.decode_packets(&mut buf).unwrap(),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_packet_encode_decode, bench_small_frame_stream);
criterion_main!(benches);
