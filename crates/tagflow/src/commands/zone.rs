//! `zone`: inspect the antenna-to-zone table.

use serde::Serialize;
use tabled::Tabled;
use tagflow_config::Config;
use tagflow_core::{ZoneClassifier, ZoneRule};

use crate::cli::{GlobalOpts, ZoneArgs};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "Reader")]
    reader: String,
    #[tabled(rename = "Antennas")]
    antennas: String,
    #[tabled(rename = "Zone")]
    zone: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Classification<'a> {
    reader: &'a str,
    antenna: u16,
    zone: &'a str,
}

pub fn handle(args: &ZoneArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    cfg.validate()?;
    let classifier = ZoneClassifier::new(tagflow_config::zone_rules(cfg));

    if let (Some(reader), Some(antenna)) = (args.reader.as_deref(), args.antenna) {
        let classification = Classification {
            reader,
            antenna,
            zone: classifier.classify(reader, antenna),
        };
        let out = output::render_single(
            global.output,
            &classification,
            |c| c.zone.to_owned(),
            |c| c.zone.to_owned(),
        );
        output::print_output(&out, global.quiet);
        return Ok(());
    }

    let out = output::render_list(
        global.output,
        classifier.rules(),
        |r: &ZoneRule| RuleRow {
            reader: r.reader.clone(),
            antennas: format!("{}-{}", r.first_antenna, r.last_antenna),
            zone: r.zone.clone(),
        },
        |r| r.zone.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
