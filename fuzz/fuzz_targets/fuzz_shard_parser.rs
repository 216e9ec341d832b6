#![no_main]

use dxi::index::{parse_shard, ShardName};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary payloads must parse or fail cleanly, never panic
    if let Ok(payload) = std::str::from_utf8(data) {
        let _ = parse_shard(ShardName::parse("all_0"), payload);
    }
});
