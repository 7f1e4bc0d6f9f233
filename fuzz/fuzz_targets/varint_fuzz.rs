#![no_main]
use bpstitch::bps::varint;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding must never panic, and anything that decodes must re-encode
    // to the exact consumed bytes (the scheme has no redundant encodings).
    if let Ok((value, consumed)) = varint::decode_u32(data) {
        let mut buf = [0u8; varint::MAX_VARINT_LEN];
        let len = varint::encode_u32(value, &mut buf);
        assert_eq!(&buf[..len], &data[..consumed]);

        let mut cursor = std::io::Cursor::new(data);
        assert_eq!(varint::stream_decode_u32(&mut cursor).unwrap(), value);
    }
});
