use clap::builder::RangedU64ValueParser;
use clap::{arg, value_parser};

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

/// Everything else comes from `WIKISPIDER_*` environment variables; these
/// flags only override what was loaded.
pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("wikispider")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("wikispider")
        .about("Crawl an encyclopedia-style wiki from a seed article and record every page found")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-d --"max-depth" <DEPTH>)
                .required(false)
                .help("Maximum link depth from the seed page (overrides WIKISPIDER_SPIDER_MAX_DEPTH)")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            arg!(-s --"start-slug" <SLUG>)
                .required(false)
                .help("Path of the seed article, e.g. /wiki/Idaho (overrides WIKISPIDER_SPIDER_START_SLUG)"),
        )
        .arg(
            arg!(-w --"workers" <N>)
                .required(false)
                .help("Number of concurrent fetch workers (overrides WIKISPIDER_SPIDER_WORKERS)")
                .value_parser(RangedU64ValueParser::<usize>::new().range(1..)),
        )
        .arg(
            arg!(--"delay-ms" <MS>)
                .required(false)
                .help("Minimum delay between requests in milliseconds (overrides WIKISPIDER_SPIDER_DELAY_MS)")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            arg!(--"dry-run")
                .help("Keep discovered links in memory instead of writing them to the database")
                .required(false),
        )
}
