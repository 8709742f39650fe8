use serde_json::Value;

/// Lowercase keywords that mark a market question as crypto-related.
///
/// Matching is by substring, so short tickers ("eth", "sol", "ada") also hit
/// longer words that contain them.
pub const CRYPTO_KEYWORDS: &[&str] = &[
    "bitcoin", "btc", "ethereum", "eth", "crypto", "solana", "sol", "dogecoin", "doge", "xrp",
    "ripple", "cardano", "ada", "polygon", "matic", "arbitrum",
];

/// True if the payload's `question` mentions any crypto keyword.
/// Payloads without a string question never match.
pub fn is_crypto_market(payload: &Value) -> bool {
    let Some(question) = payload.get("question").and_then(Value::as_str) else {
        return false;
    };

    let question = question.to_lowercase();
    CRYPTO_KEYWORDS.iter().any(|kw| question.contains(kw))
}

/// Keep only crypto markets, preserving input order.
pub fn filter_crypto_markets(payloads: Vec<Value>) -> Vec<Value> {
    payloads.into_iter().filter(is_crypto_market).collect()
}
