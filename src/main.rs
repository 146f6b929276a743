//! Binary entrypoint that launches the BigBikeBlitz assistant server.

use std::process::ExitCode;

use blitz_agent::start_blitz_agent;

fn main() -> ExitCode {
    start_blitz_agent::run()
}
