//! Binary entry point for the Gantry CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;

use gantry::{
    EngineConfig, JobExecutor, JobKind, JobSpec, LifecycleError, Resource, SshEndpoint,
    SshTransport, UnmanagedClusterError, UnmanagedClusterSpec, UnmanagedClusterService,
};

#[derive(Debug, Parser)]
#[command(
    name = "gantry",
    about = "Drive data-processing jobs against a cluster reached over SSH",
    arg_required_else_help = true
)]
enum Cli {
    #[command(name = "run", about = "Submit a job to a cluster and wait for it")]
    Run(RunCommand),
}

#[derive(Debug, Parser)]
struct RunCommand {
    /// Leader endpoint as user@host[:port].
    #[arg(long)]
    leader: String,
    /// Worker endpoints as user@host[:port]; repeatable.
    #[arg(long = "worker")]
    workers: Vec<String>,
    /// SSH identity file used for every endpoint.
    #[arg(long)]
    identity_file: Option<String>,
    /// Job kind to submit.
    #[arg(long, value_parser = ["hadoop", "spark", "pyspark"])]
    job_kind: String,
    /// Jar file for hadoop and spark jobs.
    #[arg(long)]
    jarfile: Option<String>,
    /// Main class for hadoop and spark jobs.
    #[arg(long)]
    classname: Option<String>,
    /// Script for pyspark jobs.
    #[arg(long)]
    script: Option<String>,
    /// Extra job properties as key=value; repeatable.
    #[arg(long = "property")]
    properties: Vec<String>,
    /// File receiving the job's standard output.
    #[arg(long)]
    stdout_file: Option<String>,
    /// Arguments passed to the driver application (use -- to separate).
    #[arg(trailing_var_arg = true)]
    arguments: Vec<String>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid endpoint '{0}': expected user@host[:port]")]
    InvalidEndpoint(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("resource error: {0}")]
    Lifecycle(#[from] LifecycleError<UnmanagedClusterError>),
    #[error("job failed: {0}")]
    Job(#[from] gantry::JobError),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Run(command) => run_command(command).await,
    }
}

async fn run_command(args: RunCommand) -> Result<(), CliError> {
    let config =
        EngineConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;

    let leader = build_transport(&args.leader, args.identity_file.as_deref())?;
    let workers = args
        .workers
        .iter()
        .map(|endpoint| build_transport(endpoint, args.identity_file.as_deref()))
        .collect::<Result<Vec<_>, _>>()?;
    let service = UnmanagedClusterService::new(leader, workers);

    let mut resource = Resource::new(
        service,
        config.resource_id(),
        UnmanagedClusterSpec::default(),
    )
    .user_managed(true)
    .with_runner(config.runner());
    resource.create().await?;

    let spec = build_job_spec(&args)?;
    let default_properties = config
        .default_job_properties()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let executor = JobExecutor::new(resource.backend(), config.retry_policy())
        .with_default_properties(default_properties);
    let result = executor.submit(&spec).await?;

    tracing::info!(
        run_time_secs = result.run_time.as_secs(),
        wall_time_secs = result.wall_time().as_secs(),
        "job completed"
    );
    resource.delete().await?;
    Ok(())
}

fn build_job_spec(args: &RunCommand) -> Result<JobSpec, CliError> {
    let kind = match args.job_kind.as_str() {
        "hadoop" => JobKind::Hadoop {
            jarfile: args.jarfile.clone(),
            classname: args.classname.clone(),
        },
        "spark" => JobKind::Spark {
            jarfile: args.jarfile.clone(),
            classname: args.classname.clone(),
        },
        _ => JobKind::PySpark {
            script: args.script.clone().unwrap_or_default(),
        },
    };

    let mut builder = JobSpec::builder(kind).arguments(args.arguments.iter().cloned());
    for entry in &args.properties {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(CliError::Config(format!(
                "malformed property entry: {entry:?} (expected key=value)"
            )));
        };
        builder = builder.property(key, value);
    }
    if let Some(path) = &args.stdout_file {
        builder = builder.stdout_path(path.as_str());
    }
    Ok(builder.build()?)
}

fn build_transport(
    endpoint: &str,
    identity_file: Option<&str>,
) -> Result<SshTransport, CliError> {
    let parsed = parse_endpoint(endpoint)?;
    let mut transport = SshTransport::new(parsed)
        .map_err(|err| CliError::Transport(err.to_string()))?;
    if let Some(path) = identity_file {
        transport = transport.identity_file(path);
    }
    Ok(transport)
}

fn parse_endpoint(value: &str) -> Result<SshEndpoint, CliError> {
    let Some((user, rest)) = value.split_once('@') else {
        return Err(CliError::InvalidEndpoint(value.to_owned()));
    };
    if user.is_empty() || rest.is_empty() {
        return Err(CliError::InvalidEndpoint(value.to_owned()));
    }

    let endpoint = rest.split_once(':').map_or_else(
        || Ok(SshEndpoint::new(user, rest)),
        |(host, port)| {
            port.parse::<u16>()
                .map(|port_number| SshEndpoint::new(user, host).with_port(port_number))
                .map_err(|_| CliError::InvalidEndpoint(value.to_owned()))
        },
    )?;
    Ok(endpoint)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_endpoint_accepts_user_host() {
        let endpoint = parse_endpoint("ubuntu@10.0.0.4").expect("endpoint should parse");
        assert_eq!(endpoint.user, "ubuntu");
        assert_eq!(endpoint.host, "10.0.0.4");
        assert_eq!(endpoint.port, 22);
    }

    #[test]
    fn parse_endpoint_accepts_explicit_port() {
        let endpoint = parse_endpoint("ops@cluster-1:2222").expect("endpoint should parse");
        assert_eq!(endpoint.port, 2222);
    }

    #[test]
    fn parse_endpoint_rejects_missing_user() {
        let err = parse_endpoint("cluster-1").expect_err("missing user should fail");
        assert!(matches!(err, CliError::InvalidEndpoint(_)));
    }

    #[test]
    fn parse_endpoint_rejects_bad_port() {
        let err = parse_endpoint("ops@cluster-1:notaport").expect_err("bad port should fail");
        assert!(matches!(err, CliError::InvalidEndpoint(_)));
    }

    #[test]
    fn build_job_spec_rejects_malformed_property() {
        let args = RunCommand {
            leader: String::from("ops@cluster-1"),
            workers: Vec::new(),
            identity_file: None,
            job_kind: String::from("hadoop"),
            jarfile: Some(String::from("job.jar")),
            classname: None,
            script: None,
            properties: vec![String::from("novalue")],
            stdout_file: None,
            arguments: Vec::new(),
        };
        let err = build_job_spec(&args).expect_err("malformed property should fail");
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn write_error_renders_cli_error() {
        let mut buf = Vec::new();
        write_error(&mut buf, &CliError::InvalidEndpoint(String::from("x")));
        let rendered = String::from_utf8(buf).expect("utf8");
        assert!(rendered.contains("invalid endpoint"), "rendered: {rendered}");
    }
}
