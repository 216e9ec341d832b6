#![no_main]

use arbitrary::Arbitrary;
use dxi::query::normalize;
use dxi::query::normalize::decode_search_key;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    token: &'a str,
    query: &'a str,
}

fuzz_target!(|input: Input| {
    let token = normalize(input.token);
    let query = normalize(input.query);
    assert!(!token.contains("  "));
    if !query.is_empty() {
        let _ = dxi::query::rank::classify(&token, &query);
    }
    let _ = decode_search_key(input.token);
});
