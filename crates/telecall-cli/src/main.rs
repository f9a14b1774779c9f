//! Command line lookups against AWS services.
//!
//! ```sh
//! telecall mediaconvert get-job 1234567890123-abc123
//! telecall -v lightsail get-region us-east-2
//! telecall --config telecall.toml dynamodb collect-garbage sessions --batch-delay-ms 5000
//! ```
use std::{path::PathBuf, process::ExitCode};

use call::{
    aws::{
        self,
        dynamodb::{SessionGc, COLLECT_GARBAGE},
        lightsail::{Lightsail, GET_REGION},
        mediaconvert::{MediaConvert, GET_JOB},
    },
    config::{Config, ServiceKind},
    ApiCommand, ClientConfig, ClientFactory,
};
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[clap(name = "telecall", author, version, about)]
struct Cli {
    /// Sets the verbosity level
    #[clap(short, action = clap::ArgAction::Count, global = true)]
    verbosity: u8,

    /// AWS region, overriding the config file.
    #[clap(long, env = "TELECALL_REGION", global = true)]
    region: Option<String>,

    /// TOML config file. Defaults to `telecall.toml` when present.
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    service: Service,
}

#[derive(Subcommand)]
enum Service {
    /// AWS Elemental MediaConvert.
    Mediaconvert {
        #[clap(subcommand)]
        op: MediaConvertOp,
    },
    /// Amazon Lightsail.
    Lightsail {
        #[clap(subcommand)]
        op: LightsailOp,
    },
    /// Amazon DynamoDB session tables.
    Dynamodb {
        #[clap(subcommand)]
        op: DynamoDbOp,
    },
}

#[derive(Subcommand)]
enum MediaConvertOp {
    /// Get information about a specific job.
    GetJob {
        /// The job id value.
        job_id: String,
    },
}

#[derive(Subcommand)]
enum LightsailOp {
    /// Check that a region is offered by Lightsail.
    GetRegion {
        /// The region name, eg "us-east-2".
        region_name: String,
    },
}

#[derive(Subcommand)]
enum DynamoDbOp {
    /// Delete expired sessions from a session table.
    CollectGarbage {
        /// Name of the session table.
        table: String,

        /// Milliseconds to wait before each batch of deletions.
        #[clap(long)]
        batch_delay_ms: Option<u64>,
    },
}

impl Service {
    /// Names of the subcommands that were invoked, used to find their usage.
    fn path(&self) -> [&'static str; 2] {
        match self {
            Service::Mediaconvert { .. } => ["mediaconvert", GET_JOB],
            Service::Lightsail { .. } => ["lightsail", GET_REGION],
            Service::Dynamodb { .. } => ["dynamodb", COLLECT_GARBAGE],
        }
    }
}

fn usage(path: [&str; 2]) -> String {
    let mut cmd = Cli::command();
    cmd.set_bin_name("telecall");
    cmd.build();
    path.iter()
        .try_fold(&mut cmd, |cmd, name| cmd.find_subcommand_mut(name))
        .map(|sub| sub.render_usage().to_string())
        .unwrap_or_else(|| Cli::command().render_usage().to_string())
}

async fn lookup<F: ClientFactory>(
    factory: F,
    region: String,
    operation: &str,
    identifier: &str,
) -> call::Result<String> {
    let mut command = ApiCommand::new(factory, ClientConfig::new(region));
    let response = command.execute(operation, identifier).await?;
    log::debug!("payload: {}", response.raw_payload());
    Ok(command.factory().report(identifier, &response))
}

async fn run(service: Service, region: Option<&str>, config: &Config) -> call::Result<String> {
    match service {
        Service::Mediaconvert {
            op: MediaConvertOp::GetJob { job_id },
        } => {
            let region = config.region_for(ServiceKind::MediaConvert, region);
            let sdk = aws::load_sdk_config(&region).await;
            lookup(MediaConvert::new(sdk), region, GET_JOB, &job_id).await
        }
        Service::Lightsail {
            op: LightsailOp::GetRegion { region_name },
        } => {
            let region = config.region_for(ServiceKind::Lightsail, region);
            let sdk = aws::load_sdk_config(&region).await;
            lookup(Lightsail::new(sdk), region, GET_REGION, &region_name).await
        }
        Service::Dynamodb {
            op:
                DynamoDbOp::CollectGarbage {
                    table,
                    batch_delay_ms,
                },
        } => {
            let settings = config.session_settings(batch_delay_ms)?;
            let region = config.region_for(ServiceKind::DynamoDb, region);
            let sdk = aws::load_sdk_config(&region).await;
            lookup(SessionGc::new(sdk, settings), region, COLLECT_GARBAGE, &table).await
        }
    }
}

#[::tokio::main]
async fn main() -> ExitCode {
    let Cli {
        verbosity,
        region,
        config,
        service,
    } = Cli::parse();

    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("call", level)
        .filter_module("telecall", level)
        .init();

    let path = service.path();
    let result = match Config::load_or_default(config.as_deref()) {
        Ok(config) => run(service, region.as_deref(), &config).await,
        Err(e) => Err(e),
    };

    let (line, code) = finish(result, path);
    println!("{line}");
    ExitCode::from(code)
}

/// The line to print and the exit status for the outcome of a command.
///
/// `0` on success, `2` for rejected input or configuration (with the
/// subcommand's usage when an argument was rejected), `1` for everything the
/// service or endpoint resolution reported.
fn finish(result: call::Result<String>, path: [&str; 2]) -> (String, u8) {
    match result {
        Ok(line) => (line, 0),
        Err(e @ call::Error::InvalidArgument { .. }) => {
            log::warn!("{e}");
            (usage(path), 2)
        }
        Err(e) if e.is_invalid_input() => (e.to_string(), 2),
        Err(e) => (e.to_string(), 1),
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn empty_identifier_prints_the_subcommand_usage() {
        let (line, code) = finish(
            Err(call::Error::InvalidArgument {
                reason: "identifier must not be empty".into(),
            }),
            ["mediaconvert", GET_JOB],
        );
        assert_eq!(2, code);
        assert!(
            line.starts_with("Usage: telecall mediaconvert get-job"),
            "{line}"
        );
        assert!(line.contains("<JOB_ID>"), "{line}");
        assert!(!line.contains("telecall-cli"), "{line}");

        let (line, _) = finish(
            Err(call::Error::InvalidArgument {
                reason: "identifier must not be empty".into(),
            }),
            ["dynamodb", COLLECT_GARBAGE],
        );
        assert!(
            line.starts_with("Usage: telecall dynamodb collect-garbage"),
            "{line}"
        );
        assert!(line.contains("<TABLE>"), "{line}");
    }

    #[test]
    fn invoked_subcommand_is_found_for_usage() {
        let cli = Cli::try_parse_from(["telecall", "lightsail", "get-region", ""]).unwrap();
        assert_eq!(["lightsail", GET_REGION], cli.service.path());
        assert!(usage(cli.service.path()).starts_with("Usage: telecall lightsail get-region"));
    }

    #[test]
    fn success_prints_the_report_line() {
        let line = "The ARN of the job is arn:aws:mediaconvert:us-west-2:123456789012:jobs/1.";
        assert_eq!(
            (line.to_string(), 0),
            finish(Ok(line.into()), ["mediaconvert", GET_JOB])
        );
    }

    #[test]
    fn service_failures_exit_with_one() {
        let message = "The specified job ID does not exist: job-404";
        assert_eq!(
            (message.to_string(), 1),
            finish(
                Err(call::Error::Service {
                    code: Some("NotFoundException".into()),
                    message: message.into(),
                }),
                ["mediaconvert", GET_JOB],
            )
        );
        assert_eq!(
            ("Cannot find MediaConvert service endpoint URL!".to_string(), 1),
            finish(
                Err(call::Error::EndpointUnavailable {
                    service: "MediaConvert".into(),
                }),
                ["mediaconvert", GET_JOB],
            )
        );
    }

    #[test]
    fn bad_configuration_exits_with_two() {
        let (line, code) = finish(
            Err(call::Error::ConfigInvalid {
                reason: "batch_size must be between 1 and 25, got 26".into(),
            }),
            ["dynamodb", COLLECT_GARBAGE],
        );
        assert_eq!(2, code);
        assert!(line.contains("batch_size must be between 1 and 25"), "{line}");
    }

    #[test]
    fn missing_identifier_is_a_usage_error() {
        let err = Cli::try_parse_from(["telecall", "mediaconvert", "get-job"])
            .err()
            .unwrap();
        assert_eq!(2, err.exit_code());
    }
}
