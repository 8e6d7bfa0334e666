#![no_main]

use libfuzzer_sys::fuzz_target;
use realtime_dispatch::core::message::{peek_id, MessageCodec, MessageEncoder};
use realtime_dispatch::protocol::handshake::parse_handshake;
use realtime_dispatch::protocol::route::Route;

fuzz_target!(|data: &[u8]| {
    let _ = parse_handshake(data);
    let _ = peek_id(data);

    let codec = MessageCodec::new(true);
    if let Ok(message) = codec.decode(data) {
        let _ = Route::decode(&message.route);
        if let Ok(encoded) = codec.encode(&message) {
            let _ = codec.decode(&encoded);
        }
    }
});
