//! chatflow entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Build the stdio engine from process args
//!   3. Run it under the orchestrator (lifecycle events, shutdown)
//!   4. Exit with the engine's code

use chatflow::orchestrator;
use chatflow::pipeline::StdioEngine;

#[tokio::main]
async fn main() {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let engine = StdioEngine::from_env();
    let code = orchestrator::run(engine, env!("CARGO_PKG_VERSION")).await;
    if code != 0 {
        std::process::exit(code);
    }
}
