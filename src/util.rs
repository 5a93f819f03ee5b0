//! URL percent-encoding and query-string / cookie tokenizing.
//!
//! The query and cookie regexes are taken verbatim from the original
//! `Simple-Web-Server` reference this crate's routing model follows:
//! `([\w+%]+)=?([^&]*)` for query pairs, `([\w+%]+)=?([^;]*)` for cookies.

use std::sync::OnceLock;

use regex::Regex;

fn query_pair_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([\w+%]+)=?([^&]*)").unwrap())
}

fn cookie_pair_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([\w+%]+)=?([^;]*)").unwrap())
}

/// Percent-encode any byte outside `[A-Za-z0-9\-_.~]` as uppercase `%HH`.
pub fn url_encode(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Decode `+` as space and `%HH` as the byte with that hex value.
pub fn url_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok()
                    .and_then(|s| u8::from_str_radix(s, 16).ok());
                match hex {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

/// Parse the query string (everything after the first `?`, without the
/// leading `?`) into key/value pairs. Duplicate keys are preserved. Keys
/// keep `+`/`%` literally; values are percent-decoded and have `+`
/// converted to space.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query_pair_re().captures_iter(query)
        .map(|caps| {
            let key = caps.get(1).map_or("", |m| m.as_str()).to_string();
            let value = caps.get(2).map_or("", |m| m.as_str());
            let decoded = String::from_utf8_lossy(&url_decode(value)).into_owned();
            (key, decoded)
        })
        .collect()
}

/// Split a request path into `(path, query)`, where `query` is the part
/// after the first `?` (without the leading `?`), if any.
pub fn split_path_query(target: &str) -> (&str, Option<&str>) {
    match target.find('?') {
        Some(idx) => (&target[..idx], Some(&target[idx + 1..])),
        None => (target, None),
    }
}

/// Parse a `Cookie` request header value into key/value pairs. Values are
/// not decoded further, matching the original implementation.
pub fn parse_cookies(header: &str) -> Vec<(String, String)> {
    cookie_pair_re().captures_iter(header)
        .map(|caps| {
            let key = caps.get(1).map_or("", |m| m.as_str()).to_string();
            let value = caps.get(2).map_or("", |m| m.as_str()).to_string();
            (key, value)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_unreserved() {
        let raw = b"Hello-World_2024.txt~";
        assert_eq!(url_encode(raw), "Hello-World_2024.txt~");
        assert_eq!(url_decode(&url_encode(raw)), raw);
    }

    #[test]
    fn encode_then_decode_arbitrary_bytes() {
        let raw = b"a b/c?d=e&f";
        let encoded = url_encode(raw);
        assert_eq!(url_decode(&encoded), raw);
    }

    #[test]
    fn query_parsing_preserves_duplicates_and_decodes_values() {
        let pairs = parse_query("a=1&a=2&b=hello%20world&c=x%2By");
        assert_eq!(pairs, vec![
            ("a".to_string(), "1".to_string()),
            ("a".to_string(), "2".to_string()),
            ("b".to_string(), "hello world".to_string()),
            ("c".to_string(), "x+y".to_string()),
        ]);
    }

    #[test]
    fn split_path_query_without_question_mark() {
        assert_eq!(split_path_query("/hello"), ("/hello", None));
        assert_eq!(split_path_query("/hello?a=1"), ("/hello", Some("a=1")));
    }

    #[test]
    fn cookie_parsing_does_not_decode_values() {
        let pairs = parse_cookies("session=abc%20def; theme=dark");
        assert_eq!(pairs, vec![
            ("session".to_string(), "abc%20def".to_string()),
            ("theme".to_string(), "dark".to_string()),
        ]);
    }
}
