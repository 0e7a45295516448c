//! The `cascade` launcher: load a source file, open the store, serve.
//!
//! Exit codes: 0 on clean shutdown, 1 on a load error, 2 on a database
//! failure, 3 on a bind failure.

use cascade::{DatabaseIf, NullConn, Runtime};
use cascade_sqlite::SqliteConn;
use clap::{ArgAction, Parser};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

// `-h` is taken by --host, so the default help short flag is disabled
// and help re-added long-only.
#[derive(Debug, Parser)]
#[command(
    name = "cascade",
    version,
    about = "Serve an HTTP API declared in a CSS-shaped source file",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Cli {
    /// The source file to serve.
    source: PathBuf,

    /// Override the configured port.
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Override the configured host.
    #[arg(short = 'h', long, value_name = "HOST")]
    host: Option<String>,

    /// Print help.
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Print version.
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,
}

fn main() -> ExitCode {
    env_logger::init();
    ExitCode::from(run(Cli::parse()))
}

fn run(cli: Cli) -> u8 {
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("cascade: cannot read {}: {}", cli.source.display(), e);
            return 1;
        }
    };
    let mut program = match cascade::parse(&source) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("cascade: {}: {}", cli.source.display(), e);
            return 1;
        }
    };
    if let Some(port) = cli.port {
        program.config.port = port;
    }
    if let Some(host) = cli.host {
        program.config.host = host;
    }

    let db = match &program.config.database {
        Some(path) => match SqliteConn::open(Path::new(path)) {
            Ok(conn) => DatabaseIf::new(Arc::new(conn)),
            Err(e) => {
                eprintln!("cascade: cannot open database {}: {}", path, e);
                return 2;
            }
        },
        None => {
            if program.schema.is_some() {
                log::warn!(
                    "@database block present but no database configured; \
                     the schema is not executed",
                );
            }
            DatabaseIf::new(Arc::new(NullConn))
        }
    };
    let has_database = program.config.database.is_some();
    let (host, port) = (program.config.host.clone(), program.config.port);
    let runtime = Runtime::new(program, db);
    if has_database {
        if let Err(e) = runtime.bootstrap() {
            eprintln!("cascade: schema bootstrap failed: {}", e);
            return 2;
        }
    }

    log::info!(
        "serving {} route(s) on {}:{}",
        runtime.program().routes.len(),
        host,
        port,
    );
    match cascade_actix::serve(Arc::new(runtime), &host, port) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("cascade: cannot serve on {}:{}: {}", host, port, e);
            3
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "cascade", "api.css", "-p", "8080", "-h", "0.0.0.0",
        ])
        .unwrap();
        assert_eq!(cli.source, PathBuf::from("api.css"));
        assert_eq!(cli.port, Some(8080));
        assert_eq!(cli.host.as_deref(), Some("0.0.0.0"));
    }

    #[test]
    fn test_long_flags() {
        let cli = Cli::try_parse_from([
            "cascade",
            "api.css",
            "--port",
            "8080",
            "--host",
            "example.test",
        ])
        .unwrap();
        assert_eq!(cli.port, Some(8080));
        assert_eq!(cli.host.as_deref(), Some("example.test"));
    }

    #[test]
    fn test_source_is_required() {
        assert!(Cli::try_parse_from(["cascade"]).is_err());
    }

    #[test]
    fn test_short_h_is_host_not_help() {
        let cli =
            Cli::try_parse_from(["cascade", "api.css", "-h", "local"])
                .unwrap();
        assert_eq!(cli.host.as_deref(), Some("local"));
    }

    #[test]
    fn test_version_flag() {
        let err = Cli::try_parse_from(["cascade", "-v"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayVersion,
        );
    }

    #[test]
    fn test_help_flag() {
        let err = Cli::try_parse_from(["cascade", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
