//! Inbound frame decoding
//!
//! The backend's payloads are loosely typed: numbers arrive as JSON numbers or
//! strings, field names differ between producers, and a price update may
//! contain entries without a price yet. Decoding is defensive. A bad entry in
//! an update frame is skipped on its own; only a frame that cannot be read at
//! all is a decode failure.

use portfolio_types::{
    EngineError, EngineResult, ExecutionEvent, ExecutionId, InstrumentId, LogicalTimestamp,
    PriceTick, Side,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::debug;

const UPDATE_TAG: &str = "update";
const EXECUTION_TAG: &str = "ORDER_EXECUTED";

/// Closed set of frames the engine understands
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Ticks for every instrument in the frame, sharing one timestamp
    PriceUpdate(Vec<PriceTick>),
    Execution(ExecutionEvent),
    /// Execution reported without an id. It cannot be deduplicated, so it is
    /// only a hint that holdings changed.
    UnidentifiedExecution { instrument_id: Option<InstrumentId> },
    /// Any other tag; carried so it can be logged
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    #[serde(default)]
    price: Value,
    #[serde(default, rename = "dayChangePercent", alias = "day_change")]
    day_change_percent: Value,
}

#[derive(Debug, Deserialize)]
struct RawExecution {
    #[serde(default, rename = "executionId", alias = "execution_id", alias = "trigger_id")]
    execution_id: Value,
    #[serde(default, rename = "instrumentId", alias = "stock_id")]
    instrument_id: Value,
    #[serde(default)]
    side: String,
    #[serde(default)]
    quantity: Value,
    #[serde(default, rename = "executedPrice", alias = "price")]
    executed_price: Value,
}

/// Decode one text frame, stamping price ticks with `observed_at`
pub fn decode_frame(text: &str, observed_at: LogicalTimestamp) -> EngineResult<InboundFrame> {
    let mut frame: Map<String, Value> = serde_json::from_str(text)?;

    let tag = match frame.get("type") {
        Some(Value::String(tag)) => tag.clone(),
        Some(other) => return Ok(InboundFrame::Unknown(other.to_string())),
        None => return Ok(InboundFrame::Unknown(String::new())),
    };

    match tag.as_str() {
        UPDATE_TAG => {
            let data = match frame.remove("data") {
                Some(Value::Object(data)) => data,
                Some(Value::Null) | None => Map::new(),
                Some(_) => {
                    return Err(EngineError::Decode("update frame data is not an object".into()))
                }
            };
            Ok(InboundFrame::PriceUpdate(decode_quotes(data, observed_at)))
        }
        EXECUTION_TAG => {
            let raw: RawExecution = serde_json::from_value(Value::Object(frame))?;
            decode_execution(raw)
        }
        _ => Ok(InboundFrame::Unknown(tag)),
    }
}

fn decode_quotes(data: Map<String, Value>, observed_at: LogicalTimestamp) -> Vec<PriceTick> {
    let mut ticks = Vec::with_capacity(data.len());
    for (key, entry) in data {
        let Ok(instrument_id) = InstrumentId::from_str(&key) else {
            debug!("Skipping quote with non-numeric instrument id {:?}", key);
            continue;
        };
        let quote: RawQuote = match serde_json::from_value(entry) {
            Ok(quote) => quote,
            Err(e) => {
                debug!("Skipping malformed quote for {}: {}", instrument_id, e);
                continue;
            }
        };
        let Some(price) = decimal(&quote.price) else {
            debug!("Skipping quote without price for {}", instrument_id);
            continue;
        };
        let day_change = decimal(&quote.day_change_percent).unwrap_or(Decimal::ZERO);
        ticks.push(PriceTick::new(instrument_id, price, day_change, observed_at));
    }
    ticks
}

fn decode_execution(raw: RawExecution) -> EngineResult<InboundFrame> {
    let instrument_id = instrument(&raw.instrument_id);
    let execution_id = match raw.execution_id {
        Value::String(id) if !id.trim().is_empty() => ExecutionId::new(id.trim()),
        Value::Number(id) => ExecutionId::new(id.to_string()),
        _ => return Ok(InboundFrame::UnidentifiedExecution { instrument_id }),
    };
    let instrument_id = instrument_id
        .ok_or_else(|| EngineError::Decode(format!("bad instrument id {}", raw.instrument_id)))?;
    let side = Side::parse(&raw.side)
        .ok_or_else(|| EngineError::Decode(format!("unknown side {:?}", raw.side)))?;
    let quantity = decimal(&raw.quantity)
        .ok_or_else(|| EngineError::Decode(format!("bad quantity {}", raw.quantity)))?;
    let executed_price = decimal(&raw.executed_price)
        .ok_or_else(|| EngineError::Decode(format!("bad executed price {}", raw.executed_price)))?;

    Ok(InboundFrame::Execution(ExecutionEvent {
        execution_id,
        instrument_id,
        side,
        quantity,
        executed_price,
    }))
}

fn instrument(value: &Value) -> Option<InstrumentId> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).map(InstrumentId),
        Value::String(s) => InstrumentId::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text)).ok()
}
