//! Command-line front end for the hasher, the ciphers and the random helpers.
//! Passphrases are only ever read from a named environment variable so they
//! never show up in shell history or process listings.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zeroize::Zeroizing;

use cryptolib::config::{load_config, RuntimeConfig};
use cryptolib::crypto::random::{self, SALT_LENGTH};

/// Keyed hashing, authenticated encryption and secure random values
#[derive(Parser)]
#[command(name = "cryptolib")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, global = true, env = "CRYPTOLIB_CONFIG")]
    config: Option<PathBuf>,

    /// Environment variable holding the passphrase for encrypt/decrypt
    #[arg(long, global = true, default_value = "CRYPTOLIB_KEY")]
    key_env: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash input into a salt_digest record
    Hash {
        /// Input to hash (reads stdin when omitted)
        input: Option<String>,

        /// Reuse this salt instead of generating one
        #[arg(long)]
        salt: Option<String>,
    },

    /// Check input against a stored record
    Verify {
        /// Stored salt_digest record
        record: String,

        /// Candidate input (reads stdin when omitted)
        input: Option<String>,
    },

    /// Encrypt input under the passphrase from --key-env
    Encrypt {
        /// Plaintext (reads stdin when omitted)
        input: Option<String>,

        /// Use the legacy cascade format
        #[arg(long)]
        legacy: bool,
    },

    /// Decrypt a record under the passphrase from --key-env
    Decrypt {
        /// Cipher record
        record: String,

        /// Record uses the legacy cascade format
        #[arg(long)]
        legacy: bool,
    },

    /// Print a fresh salt
    Salt {
        #[arg(long, default_value_t = SALT_LENGTH)]
        length: usize,
    },

    /// Print a random alphanumeric string
    RandomString { length: usize },

    /// Print a random lowercase hex string
    RandomHex { length: usize },

    /// Print a uniform integer in [min, max]
    RandomInt { min: i64, max: i64 },
}

fn init_tracing(fallback: Option<&str>) {
    let fallback = fallback.unwrap_or("warn").to_string();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .init();
}

/// Argument bytes, or stdin with one trailing newline removed.
fn read_input(input: Option<String>) -> anyhow::Result<Zeroizing<Vec<u8>>> {
    if let Some(input) = input {
        return Ok(Zeroizing::new(input.into_bytes()));
    }
    let mut buffer = Zeroizing::new(Vec::new());
    io::stdin()
        .read_to_end(&mut buffer)
        .context("reading stdin")?;
    if buffer.last() == Some(&b'\n') {
        buffer.pop();
        if buffer.last() == Some(&b'\r') {
            buffer.pop();
        }
    }
    Ok(buffer)
}

fn read_key(var: &str) -> anyhow::Result<Zeroizing<String>> {
    let key = Zeroizing::new(
        std::env::var(var).with_context(|| format!("passphrase variable {var} is not set"))?,
    );
    if key.is_empty() {
        bail!("passphrase variable {var} is empty");
    }
    Ok(key)
}

fn run(command: Commands, config: &RuntimeConfig, key_env: &str) -> anyhow::Result<()> {
    match command {
        Commands::Hash { input, salt } => {
            let data = read_input(input)?;
            let record = config
                .keyed_hasher()
                .hash(&data, salt.as_deref())
                .context("hashing failed")?;
            println!("{record}");
        }
        Commands::Verify { record, input } => {
            let candidate = read_input(input)?;
            let matches = config
                .keyed_hasher()
                .validate(&record, &candidate)
                .context("verification failed")?;
            println!("{}", if matches { "match" } else { "no-match" });
        }
        Commands::Encrypt { input, legacy } => {
            let data = read_input(input)?;
            let key = read_key(key_env)?;
            let record = if legacy {
                config.cascade().encrypt(&data, key.as_bytes())
            } else {
                config.cipher().encrypt(&data, key.as_bytes())
            }
            .context("encryption failed")?;
            println!("{record}");
        }
        Commands::Decrypt { record, legacy } => {
            let key = read_key(key_env)?;
            let plaintext = Zeroizing::new(
                if legacy {
                    config.cascade().decrypt(record.trim(), key.as_bytes())
                } else {
                    config.cipher().decrypt(record.trim(), key.as_bytes())
                }
                .context("decryption failed")?,
            );
            let mut stdout = io::stdout().lock();
            stdout.write_all(&plaintext)?;
            stdout.write_all(b"\n")?;
        }
        Commands::Salt { length } => {
            let salt = random::SecureRandom::new().generate_salt_with_length(length)?;
            println!("{salt}");
        }
        Commands::RandomString { length } => println!("{}", random::random_string(length)?),
        Commands::RandomHex { length } => println!("{}", random::random_hex(length)?),
        Commands::RandomInt { min, max } => println!("{}", random::uniform_int(min, max)?),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RuntimeConfig::from_env()?,
    };
    init_tracing(config.log_level.as_deref());

    if config.pepper.is_builtin() {
        tracing::warn!("using the builtin pepper; configure a deployment pepper before storing hashes");
    }

    run(cli.command, &config, &cli.key_env)
}
