use crate::infra::Backend;
use crate::server;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use keymaker::collection::ActionExecutor;
use keymaker::config::AppConfig;
use keymaker::error::AppError;
use keymaker::keys::{DecodedKey, KeyCodec, KeyGrammar, LinkAnalysis};
use keymaker::telemetry;
use serde::Serialize;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "keymaker",
    about = "Encode background-check keys and track individual collection",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Fire every scheduled action that is due, once, and print the report
    Sweep(SweepArgs),
    /// Work with requirement keys offline
    Key {
        #[command(subcommand)]
        command: KeyCommand,
    },
}

#[derive(Subcommand, Debug)]
enum KeyCommand {
    /// Encode a decoded key payload (`{"grammar": .., "requirements": ..}`)
    Encode {
        #[arg(long)]
        payload: String,
    },
    /// Decode a key, sniffing the grammar unless one is given
    Decode {
        key: String,
        #[arg(long, value_enum)]
        grammar: Option<GrammarArg>,
    },
    /// Recover key, spid and puid from a pasted link or bare key
    Analyze { input: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum GrammarArg {
    Facet,
    Bitstring,
}

impl From<GrammarArg> for KeyGrammar {
    fn from(value: GrammarArg) -> Self {
        match value {
            GrammarArg::Facet => KeyGrammar::Facet,
            GrammarArg::Bitstring => KeyGrammar::Bitstring,
        }
    }
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug, Default)]
struct SweepArgs {
    /// Evaluate due actions as of this RFC 3339 instant instead of now
    #[arg(long)]
    at: Option<DateTime<Utc>>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Sweep(args) => run_sweep(args).await,
        Command::Key { command } => run_key(command),
    }
}

async fn run_sweep(args: SweepArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let backend = Backend::from_config(&config)?;
    let executor = ActionExecutor::new(
        Arc::clone(&backend.customers),
        Arc::clone(&backend.dispatcher),
        config.sweep.item_timeout,
    );
    let at = args.at.unwrap_or_else(Utc::now);
    let report = executor.sweep(at).await?;

    tracing::info!(
        due = report.due,
        executed = report.executed(),
        skipped = report.skipped(),
        failed = report.failures.len(),
        "sweep finished"
    );
    print_json(&report)
}

fn run_key(command: KeyCommand) -> Result<(), AppError> {
    match command {
        KeyCommand::Encode { payload } => {
            let decoded: DecodedKey = serde_json::from_str(&payload)?;
            println!("{}", decoded.encode());
            Ok(())
        }
        KeyCommand::Decode { key, grammar } => {
            let config = AppConfig::load()?;
            let decoded = decode_key(KeyCodec::new(config.keys.language_policy), &key, grammar)?;
            print_json(&decoded)
        }
        KeyCommand::Analyze { input } => print_json(&LinkAnalysis::parse(&input)),
    }
}

fn decode_key(
    codec: KeyCodec,
    key: &str,
    grammar: Option<GrammarArg>,
) -> Result<DecodedKey, AppError> {
    let decoded = match grammar {
        Some(grammar) => codec.decode_with(key, grammar.into())?,
        None => codec.decode_any(key)?,
    };
    Ok(decoded)
}

fn print_json(value: &impl Serialize) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["keymaker"]).expect("parse");
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["keymaker", "serve", "--port", "8080"]).expect("parse");
        assert!(matches!(
            cli.command,
            Some(Command::Serve(ServeArgs { port: Some(8080), .. }))
        ));
    }

    #[test]
    fn sweep_accepts_an_rfc3339_instant() {
        let cli = Cli::try_parse_from(["keymaker", "sweep", "--at", "2025-03-10T09:00:00Z"])
            .expect("parse");
        let Some(Command::Sweep(args)) = cli.command else {
            panic!("expected sweep command");
        };
        assert_eq!(
            args.at,
            Some(Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap())
        );

        assert!(Cli::try_parse_from(["keymaker", "sweep", "--at", "next tuesday"]).is_err());
    }

    #[test]
    fn key_decode_takes_an_optional_grammar() {
        let cli = Cli::try_parse_from([
            "keymaker",
            "key",
            "decode",
            "en10100000000000",
            "--grammar",
            "bitstring",
        ])
        .expect("parse");
        let Some(Command::Key {
            command: KeyCommand::Decode { key, grammar },
        }) = cli.command
        else {
            panic!("expected key decode");
        };
        assert_eq!(key, "en10100000000000");
        assert_eq!(grammar, Some(GrammarArg::Bitstring));
    }

    #[test]
    fn decode_honours_an_explicit_grammar() {
        let codec = KeyCodec::strict();
        let decoded = decode_key(codec, "en-EPA-DTB-R5-E3-E-P-W", None).expect("facet key");
        assert_eq!(decoded.grammar(), KeyGrammar::Facet);

        let err = decode_key(codec, "en-EPA-DTB-R5-E3-E-P-W", Some(GrammarArg::Bitstring))
            .err()
            .expect("facet key is not a bitstring");
        assert!(matches!(err, AppError::Key(_)));
    }
}
