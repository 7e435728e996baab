//! Black-box coverage of the codec utilities (spec §4.1) through the
//! crate's public surface, complementing the unit tests colocated with
//! `codec.rs`.

use uhttp_engine::codec::{Headers, QueryValue, decode_percent_encoding, parse_query, percent_encode};

#[test]
fn percent_encode_then_decode_round_trips() {
    let original = b"a b/c?d=e&f";
    let encoded = percent_encode(std::str::from_utf8(original).unwrap());
    assert_eq!(decode_percent_encoding(encoded.as_bytes()), original);
}

#[test]
fn decode_percent_encoding_handles_plus_and_hex() {
    assert_eq!(decode_percent_encoding(b"a+b%20c"), b"a b c");
}

#[test]
fn repeated_query_keys_accumulate_in_arrival_order() {
    let mut query = uhttp_engine::codec::Query::new();
    parse_query(b"tag=a&tag=b&tag=c&solo=1", &mut query).unwrap();
    match query.get("tag").unwrap() {
        QueryValue::Many(values) => {
            assert_eq!(values, &vec![Some("a".to_string()), Some("b".to_string()), Some("c".to_string())]);
        }
        other => panic!("expected Many, got {other:?}"),
    }
    assert_eq!(query.get("solo").unwrap(), &QueryValue::One("1".to_string()));
}

#[test]
fn headers_are_case_insensitive_and_preserve_insertion_order() {
    let mut headers = Headers::new();
    headers.insert("Content-Type", "text/plain");
    headers.insert("X-Custom", "1");
    headers.insert("content-type", "application/json");
    assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
    let keys: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["Content-Type", "X-Custom"]);
}
