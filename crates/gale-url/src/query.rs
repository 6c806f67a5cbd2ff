//! Query-string codec
//!
//! `k1=v1&k2=v2` in both directions. Keys and values are taken and produced
//! verbatim: no percent-encoding or decoding is performed, so the caller must
//! hand in wire-ready text. A key or value containing `&` or `=` will not
//! survive a round trip.

use std::collections::BTreeMap;

/// Join pairs into `k1=v1&k2=v2`, without a leading `?`
///
/// # Example
/// ```
/// use std::collections::BTreeMap;
///
/// let mut query = BTreeMap::new();
/// query.insert("b", "2");
/// query.insert("a", "1");
/// assert_eq!(gale_url::encode_query(&query), "a=1&b=2");
/// ```
pub fn encode_query<I, K, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut query = String::new();
    for (key, value) in pairs {
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(key.as_ref());
        query.push('=');
        query.push_str(value.as_ref());
    }
    query
}

/// Like [`encode_query`], prefixed with `?` unless there are no pairs at all
pub fn encode_query_with_prefix<I, K, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let query = encode_query(pairs);
    if query.is_empty() {
        query
    } else {
        format!("?{}", query)
    }
}

/// Split a query string into a map.
///
/// - pairs are separated by `&`, key and value by the first `=`
/// - a pair without `=` maps to an empty value
/// - pairs with an empty key are dropped
/// - a repeated key keeps its last value
///
/// # Example
/// ```
/// let query = gale_url::decode_query("a=1&b=2&b=3&flag");
/// assert_eq!(query["a"], "1");
/// assert_eq!(query["b"], "3");
/// assert_eq!(query["flag"], "");
/// ```
pub fn decode_query(query: &str) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key.is_empty() {
            continue;
        }
        result.insert(key.to_string(), value.to_string());
    }
    result
}
