use std::fs;
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

/// The standard library ships in `etude_stdlib` next to the server
/// binary; the compiler finds it through the environment.
fn stdlib_path_from_argv() -> Option<PathBuf> {
    let exec = PathBuf::from(std::env::args().next()?);
    let exec = fs::canonicalize(&exec).unwrap_or(exec);
    Some(exec.parent()?.join("etude_stdlib"))
}

#[tokio::main]
async fn main() {
    // Stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    if std::env::var(etude::STDLIB_ENV).is_err() {
        match stdlib_path_from_argv() {
            Some(path) => std::env::set_var(etude::STDLIB_ENV, &path),
            None => {
                eprintln!("invalid usage: missing executable path in argv");
                std::process::exit(1);
            }
        }
    }

    etude_lsp::run().await;
}
