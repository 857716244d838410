//! notecrypt: envelope engine CLI
//!
//! Key material:
//!   keygen                  - generate a random key for a scheme
//!   derive                  - derive the stretched master key from a password
//!   verifier                - derive the password verifier sent to the server
//!
//! Envelopes:
//!   encrypt / decrypt       - seal or open data under a base64 key
//!   convert                 - rewrite an envelope between text and binary form
//!
//! Accounts:
//!   account init <file>     - create a key record with a wrapped content key
//!   account unlock <file>   - unwrap the content key with the account password
//!
//!   config show             - display current configuration

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use zeroize::Zeroizing;

use notecrypt_core::NotecryptConfig;
use notecrypt_crypto::{
    select_backend, AccountKeys, BackendKind, CryptoService, EncryptionScheme, Envelope,
    EnvelopeEncoding, KdfConfig, KdfScheme, SymmetricCryptoKey,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "notecrypt",
    version,
    about = "Zero-knowledge envelope encryption for notes",
    long_about = "Password-derived keys and AES-CBC + HMAC envelopes for notes"
)]
struct Cli {
    /// Path to notecrypt.toml configuration file
    #[arg(long, short = 'c', env = "NOTECRYPT_CONFIG", default_value = "notecrypt.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [logging] level
    #[arg(long, env = "NOTECRYPT_LOG")]
    log: Option<String>,

    /// Log format; overrides [logging] format
    #[arg(long, env = "NOTECRYPT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Crypto backend; overrides [crypto] backend
    #[arg(long, env = "NOTECRYPT_BACKEND")]
    backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a random key and print it as base64
    Keygen {
        /// Encryption scheme (default: [kdf] encryption)
        #[arg(long, short = 's')]
        scheme: Option<EncryptionScheme>,
    },

    /// Derive the stretched master key from a password and salt
    ///
    /// The password is read from NOTECRYPT_PASSWORD or prompted for.
    Derive {
        #[command(flatten)]
        kdf: KdfArgs,
    },

    /// Derive the password verifier (PBKDF2 over the raw master key)
    Verifier {
        #[command(flatten)]
        kdf: KdfArgs,
    },

    /// Encrypt stdin (or a file) and print the envelope
    Encrypt(EncryptArgs),

    /// Decrypt an envelope (text or base64 binary) and write the plaintext to stdout
    Decrypt {
        #[command(flatten)]
        key: KeyArgs,
        /// Read the envelope from this file instead of stdin
        #[arg(long, short = 'i')]
        input: Option<PathBuf>,
    },

    /// Rewrite an envelope in the other physical form
    Convert {
        /// Target form
        #[arg(long)]
        to: EnvelopeEncoding,
        /// Read the envelope from this file instead of stdin
        #[arg(long, short = 'i')]
        input: Option<PathBuf>,
    },

    /// Account key records
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
struct KdfArgs {
    /// Salt (UTF-8 string)
    #[arg(long)]
    salt: String,
    /// KDF (default: [kdf] kdf)
    #[arg(long)]
    kdf: Option<KdfScheme>,
    /// Encryption scheme the key is stretched for (default: [kdf] encryption)
    #[arg(long, short = 's')]
    scheme: Option<EncryptionScheme>,
    /// PBKDF2 iteration count (default: [kdf] iterations)
    #[arg(long)]
    iterations: Option<u32>,
}

#[derive(clap::Args, Debug)]
struct EncryptArgs {
    #[command(flatten)]
    key: KeyArgs,
    /// Envelope form (default: [crypto] encoding)
    #[arg(long, short = 'e')]
    encoding: Option<EnvelopeEncoding>,
    /// Read plaintext from this file instead of stdin
    #[arg(long, short = 'i')]
    input: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct KeyArgs {
    /// Base64 key
    #[arg(long, short = 'k', env = "NOTECRYPT_KEY", hide_env_values = true)]
    key: String,
    /// Scheme the key belongs to (default: [kdf] encryption)
    #[arg(long, short = 's')]
    scheme: Option<EncryptionScheme>,
}

#[derive(Subcommand, Debug)]
enum AccountAction {
    /// Create a new account key record
    Init(InitArgs),

    /// Unwrap and print the content key of an account record
    Unlock {
        /// Account record (JSON)
        record: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct InitArgs {
    /// Where to write the record (JSON)
    record: PathBuf,
    /// Overwrite an existing record
    #[arg(long)]
    force: bool,
    /// Also print the new content key
    #[arg(long)]
    show_key: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, found) = load_config(&cli.config).await?;

    let level = cli.log.as_deref().unwrap_or(&config.logging.level);
    let format = match &cli.log_format {
        Some(format) => format.clone(),
        None => parse_log_format(&config.logging.format)?,
    };
    init_logging(level, &format);

    if !found {
        tracing::warn!(path = %cli.config.display(), "config file not found, using defaults");
    }

    let backend = cli.backend.unwrap_or(config.crypto.backend);
    let svc = CryptoService::new(select_backend(backend));

    match cli.command {
        Commands::Keygen { scheme } => {
            let scheme = scheme.unwrap_or(config.kdf.encryption);
            cmd_keygen(&svc, scheme)
        }
        Commands::Derive { kdf } => cmd_derive(&svc, &config, &kdf).await,
        Commands::Verifier { kdf } => cmd_verifier(&svc, &config, &kdf).await,
        Commands::Encrypt(args) => cmd_encrypt(&svc, &config, &args).await,
        Commands::Decrypt { key, input } => {
            let input = input.as_deref();
            cmd_decrypt(&svc, &config, &key, input).await
        }
        Commands::Convert { to, input } => cmd_convert(to, input.as_deref()).await,
        Commands::Account { action } => match action {
            AccountAction::Init(args) => cmd_account_init(&svc, &config, &args).await,
            AccountAction::Unlock { record } => cmd_account_unlock(&svc, &record).await,
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(&config, &cli.config, found),
        },
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn parse_log_format(s: &str) -> Result<LogFormat> {
    <LogFormat as ValueEnum>::from_str(s, true)
        .map_err(|e| anyhow::anyhow!("invalid [logging] format {s:?}: {e}"))
}

async fn load_config(path: &Path) -> Result<(NotecryptConfig, bool)> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config = NotecryptConfig::from_toml_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((NotecryptConfig::default(), false))
    }
}

// ── Input helpers ─────────────────────────────────────────────────────────────

fn read_password(confirm: bool) -> Result<SecretString> {
    if let Ok(pw) = std::env::var("NOTECRYPT_PASSWORD") {
        return Ok(into_secret(pw));
    }
    let pw = prompt_secret("Password: ")?;
    if confirm {
        let again = prompt_secret("Confirm password: ")?;
        ensure_same_password(&pw, &again)?;
    }
    Ok(pw)
}

fn prompt_secret(prompt: &str) -> Result<SecretString> {
    match rpassword::prompt_password(prompt) {
        Ok(entered) => Ok(into_secret(entered)),
        Err(e) => Err(e).context("reading password"),
    }
}

/// Copy into a `SecretString` and wipe the original buffer.
fn into_secret(value: String) -> SecretString {
    let value = Zeroizing::new(value);
    SecretString::from(value.as_str())
}

fn ensure_same_password(first: &SecretString, second: &SecretString) -> Result<()> {
    if first.expose_secret() != second.expose_secret() {
        anyhow::bail!("passwords do not match");
    }
    Ok(())
}

async fn read_input(input: Option<&Path>) -> Result<Vec<u8>> {
    match input {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("reading input: {}", path.display())),
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .context("reading stdin")?;
            Ok(buf)
        }
    }
}

async fn read_envelope(input: Option<&Path>) -> Result<Envelope> {
    let raw = read_input(input).await?;
    let text = std::str::from_utf8(&raw).context("envelope is not UTF-8")?;
    Ok(Envelope::decode_any(text.trim())?)
}

fn kdf_config(config: &NotecryptConfig, args: &KdfArgs) -> Result<KdfConfig> {
    Ok(KdfConfig::new(
        args.kdf.unwrap_or(config.kdf.kdf),
        args.scheme.unwrap_or(config.kdf.encryption),
        args.iterations.unwrap_or(config.kdf.iterations),
    )?)
}

fn load_key(config: &NotecryptConfig, args: &KeyArgs) -> Result<SymmetricCryptoKey> {
    let scheme = args.scheme.unwrap_or(config.kdf.encryption);
    SymmetricCryptoKey::from_base64(args.key.trim(), scheme)
        .with_context(|| format!("loading {scheme} key"))
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn cmd_keygen(service: &CryptoService, scheme: EncryptionScheme) -> Result<()> {
    let key = service.create_key(scheme)?;
    println!("{}", key.to_base64());
    Ok(())
}

async fn cmd_derive(
    service: &CryptoService,
    config: &NotecryptConfig,
    args: &KdfArgs,
) -> Result<()> {
    let kdf = kdf_config(config, args)?;
    let password = read_password(false)?;
    let salt = args.salt.clone().into_bytes();
    let worker = service.clone();

    let key = tokio::task::spawn_blocking(move || {
        let pw = password.expose_secret().as_bytes();
        worker.derive_stretched_master_key(pw, &salt, &kdf)
    })
    .await
    .context("KDF worker failed")??;

    tracing::debug!(scheme = %key.scheme(), len = key.len(), "derived master key");
    println!("{}", key.to_base64());
    Ok(())
}

async fn cmd_verifier(
    service: &CryptoService,
    config: &NotecryptConfig,
    args: &KdfArgs,
) -> Result<()> {
    let kdf = kdf_config(config, args)?;
    let password = read_password(false)?;
    let salt = args.salt.clone().into_bytes();
    let worker = service.clone();

    let verifier = tokio::task::spawn_blocking(move || {
        let pw = password.expose_secret().as_bytes();
        let n = kdf.iterations();
        worker.derive_password_verifier(pw, &salt, n, kdf.kdf())
    })
    .await
    .context("KDF worker failed")??;

    println!("{}", STANDARD.encode(verifier));
    Ok(())
}

async fn cmd_encrypt(
    service: &CryptoService,
    config: &NotecryptConfig,
    args: &EncryptArgs,
) -> Result<()> {
    let key = load_key(config, &args.key)?;
    let encoding = args.encoding.unwrap_or(config.crypto.encoding);
    let plaintext = read_input(args.input.as_deref()).await?;
    let envelope = service.encrypt(&plaintext, &key)?;

    tracing::debug!(scheme = %envelope.scheme(), bytes = plaintext.len(), ?encoding, "encrypted");
    println!("{}", envelope.encode_as(encoding));
    Ok(())
}

async fn cmd_decrypt(
    service: &CryptoService,
    config: &NotecryptConfig,
    key: &KeyArgs,
    input: Option<&Path>,
) -> Result<()> {
    let key = load_key(config, key)?;
    let envelope = read_envelope(input).await?;
    let plaintext = service.decrypt(&envelope, &key).map_err(|e| {
        tracing::debug!(error = %e, "decrypt failed");
        anyhow::anyhow!(e.public_message())
    })?;

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(&plaintext)
        .await
        .context("writing plaintext")?;
    stdout.flush().await.context("writing plaintext")?;
    Ok(())
}

async fn cmd_convert(to: EnvelopeEncoding, input: Option<&Path>) -> Result<()> {
    let envelope = read_envelope(input).await?;
    println!("{}", envelope.encode_as(to));
    Ok(())
}

async fn cmd_account_init(
    service: &CryptoService,
    config: &NotecryptConfig,
    args: &InitArgs,
) -> Result<()> {
    let record = args.record.as_path();
    if record.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            record.display()
        );
    }
    let kdf = config.kdf_config()?;
    let password = read_password(true)?;
    let worker = service.clone();

    let (keys, content_key) = tokio::task::spawn_blocking(move || {
        AccountKeys::register(&worker, password.expose_secret().as_bytes(), kdf)
    })
    .await
    .context("KDF worker failed")??;

    tokio::fs::write(record, keys.to_bytes()?)
        .await
        .with_context(|| format!("writing account record: {}", record.display()))?;

    tracing::info!(path = %record.display(), "account record written");
    println!("Account record written to {}", record.display());
    let iterations = kdf.iterations();
    println!("  kdf:        {} ({iterations} iterations)", kdf.kdf());
    println!("  scheme:     {}", kdf.encryption());
    println!("  verifier:   {}", keys.password_verifier);
    if args.show_key {
        println!("  content key: {}", content_key.to_base64());
    }
    Ok(())
}

async fn cmd_account_unlock(service: &CryptoService, record: &Path) -> Result<()> {
    let data = tokio::fs::read(record)
        .await
        .with_context(|| format!("reading account record: {}", record.display()))?;
    let keys = AccountKeys::from_bytes(&data)?;
    let password = read_password(false)?;
    let worker = service.clone();

    let content_key = tokio::task::spawn_blocking(move || {
        keys.unlock(&worker, password.expose_secret().as_bytes())
    })
    .await
    .context("KDF worker failed")?
    .map_err(|e| anyhow::anyhow!("unlock failed: {}", e.public_message()))?;

    println!("{}", content_key.to_base64());
    Ok(())
}

fn cmd_config_show(config: &NotecryptConfig, config_path: &Path, found: bool) -> Result<()> {
    let path = config_path.display();
    if found {
        println!("# Configuration from: {path}");
    } else {
        println!("# Configuration: defaults (no file at {path})");
    }
    println!();
    let rendered = config.to_toml_string().context("serializing config")?;
    print!("{rendered}");
    Ok(())
}
