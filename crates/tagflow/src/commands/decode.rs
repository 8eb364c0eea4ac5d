//! `decode`: show what the ingestion pipeline would make of raw hex.

use serde::Serialize;
use tabled::Tabled;
use tagflow_core::decode_identifier;

use crate::cli::{DecodeArgs, GlobalOpts};
use crate::output;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecodedIdentifier {
    hex: String,
    text: String,
    malformed: bool,
}

#[derive(Tabled)]
struct DecodeRow {
    #[tabled(rename = "Hex")]
    hex: String,
    #[tabled(rename = "Text")]
    text: String,
}

pub fn handle(args: &DecodeArgs, global: &GlobalOpts) {
    let decoded: Vec<DecodedIdentifier> = args
        .hex
        .iter()
        .map(|hex| {
            let result = decode_identifier(hex);
            DecodedIdentifier {
                hex: hex.trim().to_owned(),
                text: result.text().to_owned(),
                malformed: result.is_malformed(),
            }
        })
        .collect();

    let out = output::render_list(
        global.output,
        &decoded,
        |d| DecodeRow {
            hex: d.hex.clone(),
            text: d.text.clone(),
        },
        |d| d.text.clone(),
    );
    output::print_output(&out, global.quiet);
}
