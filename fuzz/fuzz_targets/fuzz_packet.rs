#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use realtime_dispatch::core::codec::{PacketCodec, PacketDecoder};
use realtime_dispatch::core::packet::Packet;

fuzz_target!(|data: &[u8]| {
    let _ = Packet::from_bytes(data);

    // Feed the stream decoder in two reads, split on the first byte's value
    let codec = PacketCodec::new(64 * 1024);
    let cut = data.first().map_or(0, |b| *b as usize % (data.len() + 1));
    let mut buf = BytesMut::from(&data[..cut]);
    if codec.decode_packets(&mut buf).is_err() {
        return;
    }
    buf.extend_from_slice(&data[cut..]);
    let _ = codec.decode_packets(&mut buf);
});
