//! Generate BSON ObjectIds, optionally with a caller-chosen embedded
//! timestamp.

use std::process::ExitCode;

use bson::oid::ObjectId;
use clap::error::ErrorKind;
use clap::Parser;
use tracing::info;

use docd::dates::parse_iso8601;
use docd::ids::object_id_at;
use docd::logging;

#[derive(Parser, Debug)]
#[command(name = "idgen", about = "Generate BSON ObjectIds")]
struct Cli {
    /// Generate an ObjectId at the specified timestamp, e.g.
    /// 2024-10-25T14:30:30.000Z.
    #[arg(short = 'a', long)]
    at: Option<String>,
    /// Log level to use [debug|info|warn|critical].
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
    /// Log directory.
    #[arg(short = 'o', long, default_value = "/tmp/")]
    log_dir: String,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let kind = error.kind();
            let _ = error.print();
            return if matches!(kind, ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            };
        }
    };

    let _guard = match logging::init(&cli.log_level, &cli.log_dir, "idgen") {
        Ok(guard) => guard,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::from(1);
        }
    };

    let Some(at) = cli.at else {
        println!("{}", ObjectId::new());
        return ExitCode::SUCCESS;
    };
    match parse_iso8601(&at) {
        Ok(instant) => {
            let id = object_id_at(instant);
            info!("ObjectId at {at}: {id}");
            println!("{id}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!(
                "error parsing date-time value ({error}); dates must use ISO-8601 (yyyy-MM-dd'T'HH:mm:ss.SSSZ)"
            );
            ExitCode::from(1)
        }
    }
}
