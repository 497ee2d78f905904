#![no_main]
use furrow_net::message::FarmMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = FarmMessage::decode(data) {
        // Anything that decodes must re-encode to the same bytes.
        let encoded = message.encode().expect("decoded message re-encodes");
        assert_eq!(encoded, data);
    }
});
