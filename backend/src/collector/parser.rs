use market::Tick;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is not a number: {value}")]
    BadNumber { field: &'static str, value: String },
}

/// Normalize one Binance trade stream message.
///
/// `Ok(None)` for events that are not trades (subscription acks, other
/// streams). Price and quantity arrive as decimal strings but bare numbers
/// are accepted too.
pub fn normalize_trade(raw: &str, ingested_at: f64) -> Result<Option<Tick>, NormalizeError> {
    let v: Value = serde_json::from_str(raw)?;

    if v.get("e").and_then(Value::as_str) != Some("trade") {
        return Ok(None);
    }

    let symbol = v
        .get("s")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or(NormalizeError::MissingField("s"))?;
    let price = number(&v, "p")?;
    let size = number(&v, "q")?;
    let ts_ms = match v.get("T") {
        None | Some(Value::Null) => return Err(NormalizeError::MissingField("T")),
        Some(t) => t.as_u64().ok_or_else(|| NormalizeError::BadNumber {
            field: "T",
            value: t.to_string(),
        })?,
    };

    Ok(Some(Tick::new(ts_ms, symbol, price, size, ingested_at)))
}

fn number(v: &Value, field: &'static str) -> Result<f64, NormalizeError> {
    let raw = v.get(field).ok_or(NormalizeError::MissingField(field))?;
    let parsed = match raw {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed
        .filter(|x| x.is_finite())
        .ok_or_else(|| NormalizeError::BadNumber {
            field,
            value: raw.to_string(),
        })
}
