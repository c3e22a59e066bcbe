#![no_main]
use libfuzzer_sys::fuzz_target;

use ferrotls_tls::handshake::codec;
use ferrotls_tls::handshake::codec12;

fuzz_target!(|data: &[u8]| {
    let _ = codec::parse_handshake_header(data);
    if data.len() >= 4 {
        let body = &data[4..];
        let _ = codec::decode_client_hello(body);
        let _ = codec::decode_server_hello(body);
        let _ = codec::decode_certificate(body);
        let _ = codec::decode_new_session_ticket(body);
        let _ = codec12::decode_server_key_exchange(body);
        let _ = codec12::decode_certificate12(body);
    }
});
