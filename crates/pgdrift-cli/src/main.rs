use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod env;
mod replicate;
mod runner;

use cli::{Cli, Commands};
use pgdrift_pg::{PgOutputDecoder, PgOutputMessage};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Rows and events go to stdout, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pgdrift=info")),
        )
        .init();

    match cli.command {
        Commands::Decode { hex } => {
            let msg = decode_hex(&hex)?;
            println!("{}", serde_json::to_string_pretty(&msg)?);
            Ok(())
        }
        Commands::Poll { tables } => {
            env::load_dotenv_from_ancestors(cli.env.as_deref())?;
            let config = config::load_config(&cli.config)?;
            runner::run_poll_loop(&config, &tables).await
        }
        Commands::Replicate {
            slot,
            publication,
            create_slot,
            tables,
        } => {
            env::load_dotenv_from_ancestors(cli.env.as_deref())?;
            let config = config::load_config(&cli.config)?;
            replicate::run_replication(&config, &slot, &publication, create_slot, &tables).await
        }
    }
}

fn decode_hex(input: &str) -> Result<PgOutputMessage> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let cleaned = cleaned
        .strip_prefix("\\x")
        .or_else(|| cleaned.strip_prefix("0x"))
        .unwrap_or(&cleaned);
    let bytes = hex::decode(cleaned).context("Input is not valid hex")?;

    let msg = PgOutputDecoder::new()
        .decode(&bytes)
        .context("Failed to decode pgoutput message")?;
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hex_commit() {
        // 'C', flags 0, commit_lsn 0/10, end_lsn 0/20, timestamp 0
        let hex = "43\
                   00\
                   0000000000000010\
                   0000000000000020\
                   0000000000000000";
        let msg = decode_hex(hex).unwrap();
        let PgOutputMessage::Commit(commit) = msg else {
            panic!("expected commit, got {:?}", msg);
        };
        assert_eq!(commit.commit_lsn, 0x10);
        assert_eq!(commit.end_lsn, 0x20);
    }

    #[test]
    fn test_decode_hex_accepts_prefixes_and_spaces() {
        let msg = PgOutputMessage::Truncate(pgdrift_pg::replication::pgoutput::TruncateMessage {
            options: 0,
            relation_ids: vec![16385],
        });
        let encoded = hex::encode(msg.encode());

        assert_eq!(decode_hex(&format!("\\x{}", encoded)).unwrap(), msg);
        assert_eq!(decode_hex(&format!("0x{}", encoded)).unwrap(), msg);
        let spaced: Vec<String> = encoded
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect();
        assert_eq!(decode_hex(&spaced.join(" ")).unwrap(), msg);
    }

    #[test]
    fn test_decode_hex_rejects_garbage() {
        let err = decode_hex("zz").unwrap_err();
        assert!(err.to_string().contains("not valid hex"));

        let err = decode_hex("5a").unwrap_err();
        assert!(err.to_string().contains("Failed to decode"));
    }
}
