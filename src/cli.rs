use anyhow::Result;
use clap::{ArgMatches, builder::PossibleValuesParser, value_parser};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone)]
pub struct AppArgs {
    pub config_file: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub buffer_size: Option<usize>,
    pub batch: bool,
    pub log_level: String,
}

pub fn command() -> clap::Command {
    clap::Command::new("chunkcat")
        .version(crate::VERSION)
        .about("Copy a file or stdin through buffered chunk streams")
        .arg(
            clap::Arg::new("config")
                .short('c')
                .long("config")
                .help("Stream config filename")
                .value_parser(value_parser!(String))
                .num_args(1),
        )
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("Input file, stdin if omitted")
                .value_parser(value_parser!(String))
                .num_args(1),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("Output file, stdout if omitted")
                .value_parser(value_parser!(String))
                .num_args(1),
        )
        .arg(
            clap::Arg::new("buffer-size")
                .short('b')
                .long("buffer-size")
                .help("Output buffer size in bytes")
                .value_parser(value_parser!(usize))
                .num_args(1),
        )
        .arg(
            clap::Arg::new("batch")
                .long("batch")
                .help("Batch flushes through the flush poller")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("log-level")
                .short('l')
                .long("log")
                .help("Set log level")
                .value_parser(PossibleValuesParser::new([
                    "error", "warn", "info", "debug", "trace",
                ]))
                .num_args(1),
        )
}

pub fn args_from_matches(args: &ArgMatches) -> AppArgs {
    let string = |id: &str| args.get_one::<String>(id).cloned();
    AppArgs {
        config_file: string("config"),
        input: string("input"),
        output: string("output"),
        buffer_size: args.get_one::<usize>("buffer-size").copied(),
        batch: args.get_flag("batch"),
        log_level: string("log-level").unwrap_or_else(|| "info".to_string()),
    }
}

pub fn parse_args() -> Result<AppArgs> {
    let args = args_from_matches(&command().get_matches());
    init_logging(&args.log_level)?;
    Ok(args)
}

pub fn init_logging(log_level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.parse()?)
                .from_env()?,
        )
        .init();
    Ok(())
}
