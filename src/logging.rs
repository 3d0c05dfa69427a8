//! Tracing subscriber setup for the `ragr` binary.
//!
//! Logs go to stderr so command output on stdout stays clean. `RUST_LOG`
//! wins when set; otherwise our crates log at `info` (`debug` with
//! `--verbose`) and everything else at `warn`.

use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,rag_router={level},rag_router_core={level},ragr={level}"
        ))
    });

    // A second init (e.g. from tests) is a no-op.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
