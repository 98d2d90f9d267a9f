//! Fuzz harness for the NDN regex compiler and matcher.
//!
//! Arbitrary byte sequences become pattern expressions, expansion
//! templates and names. Compilation must reject bad input with an
//! error, never a panic, and matching plus back-reference expansion
//! must stay panic free on every pattern that does compile.

#![no_main]
use libfuzzer_sys::fuzz_target;
use ndn_trust::{Name, NamePattern};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Split the input into a pattern, an expansion template and a name.
    let mut parts = text.splitn(3, '\n');
    let expr = parts.next().unwrap_or("");
    let expand = parts.next().unwrap_or("\\1");
    let uri = parts.next().unwrap_or("/net/site/KEY/%01");

    let _ = NamePattern::new(expr);

    if let Ok(pattern) = NamePattern::with_expand(expr, expand) {
        let name = Name::from_uri(uri);
        let _ = pattern.is_match(&name);
        if let Some(found) = pattern.captures(&name) {
            let _ = found.expand(expand);
            let _ = found.group(0);
            let _ = found.group(usize::from(u8::MAX));
        }
    }

    // Every name has a pattern form, and that form must compile.
    let name = Name::from_uri(text);
    if let Ok(pattern) = NamePattern::from_name(&name, true) {
        assert!(pattern.is_match(&name));
    }
});
