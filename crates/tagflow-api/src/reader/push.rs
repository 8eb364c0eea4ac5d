// Pushed read payloads
//
// Readers configured for HTTP/TCP push post their inventory as JSON,
// either a single event object or an array of them:
//
//   {"data": {"idHex": "...", "antenna": 1, "peakRssi": -52, "tidHex": "..."},
//    "hostName": "dock-1", "timestamp": "2024-05-10T12:34:56.789+0000"}

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::RawReadEvent;
use crate::error::{Error, body_preview};

#[derive(Deserialize)]
#[serde(untagged)]
enum PushBody {
    Many(Vec<PushEnvelope>),
    One(PushEnvelope),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushEnvelope {
    data: PushData,
    #[serde(default)]
    host_name: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushData {
    id_hex: String,
    #[serde(default)]
    antenna: Option<u16>,
    #[serde(default)]
    peak_rssi: Option<i16>,
    #[serde(default, alias = "TID", alias = "tid")]
    tid_hex: Option<String>,
}

/// Parse a pushed payload into raw read events.
///
/// `default_reader` is used for events that do not name their reader via
/// `hostName`. Events keep the payload order.
pub fn parse_push_payload(default_reader: &str, body: &[u8]) -> Result<Vec<RawReadEvent>, Error> {
    let parsed: PushBody = serde_json::from_slice(body).map_err(|e| {
        let text = String::from_utf8_lossy(body);
        Error::Deserialization {
            message: format!("{e} (body preview: {:?})", body_preview(&text)),
            body: text.into_owned(),
        }
    })?;

    let envelopes = match parsed {
        PushBody::Many(items) => items,
        PushBody::One(item) => vec![item],
    };

    Ok(envelopes
        .into_iter()
        .map(|env| RawReadEvent {
            raw_hex: env.data.id_hex,
            antenna: env.data.antenna.unwrap_or(0),
            signal_strength: env.data.peak_rssi,
            source_reader: env
                .host_name
                .filter(|h| !h.trim().is_empty())
                .unwrap_or_else(|| default_reader.to_owned()),
            secondary_hex: env.data.tid_hex.filter(|t| !t.trim().is_empty()),
            observed_at: env
                .timestamp
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now),
        })
        .collect())
}

/// Readers emit both RFC 3339 and `+0000`-style offsets.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
