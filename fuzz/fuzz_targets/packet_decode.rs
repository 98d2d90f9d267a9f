//! Fuzz harness for the wire decoders.
//!
//! Arbitrary bytes are fed to the Data and signature-info decoders,
//! which must fail cleanly on truncated, oversized or garbage input.
//! Anything that does decode must re-encode to the bytes it came from.

#![no_main]
use libfuzzer_sys::fuzz_target;
use ndn_trust::{Certificate, Data, SignatureInfo};

fuzz_target!(|data: &[u8]| {
    if let Ok(decoded) = Data::decode(data) {
        assert_eq!(decoded.encode(), data);
        // A decoded packet may or may not be a certificate; either way
        // the check must not panic.
        let _ = Certificate::from_data(decoded);
    }

    let _ = SignatureInfo::decode(data);

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = ndn_trust::Name::from_uri(text);
    }
});
