use std::{path::PathBuf, sync::Arc};

use clap::Parser;

use crate::{
    capabilities::{simulated::HostProfile, IceServer},
    diagnostics::ProbeKind,
};

#[derive(Debug)]
struct Manager {
    clap_matches: Args,
}

#[derive(Parser, Debug)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION")
)]
struct Args {
    /// Sets the settings file path, relative paths are resolved inside the user config folder.
    #[arg(long = "settings", value_name = "FILE", default_value = "settings.json")]
    settings_file: String,

    /// Deletes settings file before starting.
    #[arg(long)]
    reset: bool,

    /// Turns all log categories up to Debug, for more information check RUST_LOG env variable.
    #[arg(short, long)]
    verbose: bool,

    /// Specifies the path in which the logs will be stored.
    #[arg(long, value_name = "DIR", default_value = "./logs")]
    log_path: String,

    /// Stops the run at the first failed test, overriding the settings file.
    #[arg(long)]
    stop_on_failure: bool,

    /// ICE server URL to use, may be repeated. Replaces the servers stored in the settings file.
    #[arg(long = "ice-server", value_name = "URL")]
    ice_servers: Vec<String>,

    /// Gathers only relay candidates in the connectivity test.
    #[arg(long)]
    relay_only: bool,

    /// Comma separated list of tests to run, in order. Runs every test when omitted.
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    tests: Vec<ProbeKind>,

    /// Simulated host the tests run against.
    #[arg(long, value_name = "NAME", default_value = "healthy")]
    profile: HostProfile,

    /// Attaches the captured log lines to the JSON output.
    #[arg(long)]
    include_logs: bool,

    /// Writes the JSON output to a file instead of stdout.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

lazy_static! {
    static ref MANAGER: Arc<Manager> = Arc::new(Manager::new());
}

impl Manager {
    fn new() -> Self {
        Self {
            clap_matches: Args::parse(),
        }
    }
}

// Construct our manager, should be done inside main
pub fn init() {
    MANAGER.as_ref();
}

// Check if the verbosity parameter was used
pub fn is_verbose() -> bool {
    MANAGER.clap_matches.verbose
}

pub fn is_reset() -> bool {
    MANAGER.clap_matches.reset
}

pub fn settings_file() -> String {
    MANAGER.clap_matches.settings_file.clone()
}

pub fn log_path() -> String {
    MANAGER.clap_matches.log_path.clone()
}

pub fn stop_on_failure() -> bool {
    MANAGER.clap_matches.stop_on_failure
}

pub fn ice_servers() -> Vec<IceServer> {
    MANAGER
        .clap_matches
        .ice_servers
        .iter()
        .map(IceServer::new)
        .collect()
}

pub fn relay_only() -> bool {
    MANAGER.clap_matches.relay_only
}

pub fn tests() -> Vec<ProbeKind> {
    selected_tests(&MANAGER.clap_matches)
}

pub fn profile() -> HostProfile {
    MANAGER.clap_matches.profile
}

pub fn include_logs() -> bool {
    MANAGER.clap_matches.include_logs
}

pub fn output() -> Option<PathBuf> {
    MANAGER.clap_matches.output.clone()
}

// Return the command line used to start this application
pub fn command_line_string() -> String {
    std::env::args().collect::<Vec<String>>().join(" ")
}

// Return a clone of current Args struct
pub fn command_line() -> String {
    format!("{:#?}", MANAGER.clap_matches)
}

fn selected_tests(args: &Args) -> Vec<ProbeKind> {
    if args.tests.is_empty() {
        return ProbeKind::ALL.to_vec();
    }
    args.tests.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(arguments: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("rtc-diagnostics").chain(arguments.iter().copied()))
    }

    #[test]
    fn default_arguments() {
        let args = parse(&[]).unwrap();
        assert!(!args.verbose);
        assert!(!args.reset);
        assert_eq!(args.settings_file, "settings.json");
        assert_eq!(args.profile, HostProfile::Healthy);
        assert_eq!(selected_tests(&args), ProbeKind::ALL.to_vec());
        assert!(args.ice_servers.is_empty());
        assert!(!args.relay_only);
    }

    #[test]
    fn ice_servers_may_be_repeated() {
        let args = parse(&[
            "--ice-server",
            "stun:stun.example.org:3478",
            "--ice-server",
            "turn:turn.example.org:3478",
            "--relay-only",
        ])
        .unwrap();
        assert_eq!(
            args.ice_servers,
            ["stun:stun.example.org:3478", "turn:turn.example.org:3478"]
        );
        assert!(args.relay_only);
    }

    #[test]
    fn tests_keep_the_given_order() {
        let args = parse(&["--tests", "nat-type,microphone", "--profile", "symmetric-nat"]).unwrap();
        assert_eq!(
            selected_tests(&args),
            vec![ProbeKind::NatType, ProbeKind::Microphone]
        );
        assert_eq!(args.profile, HostProfile::SymmetricNat);
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(parse(&["--tests", "speaker"]).is_err());
        assert!(parse(&["--profile", "moon"]).is_err());
    }
}
