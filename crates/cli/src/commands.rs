//! The `encrypt`, `decrypt` and `reencrypt` commands.
//!
//! # Ordering
//!
//! A source file is only erased after the file that replaces it has been
//! written durably, and never when any earlier step failed. Plaintext from
//! `reencrypt` stays in memory.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing::info;
use zeroize::Zeroizing;

use envelope::{erase, EraseOutcome, EnvelopeEngine};

use crate::config::Settings;
use crate::output;

const BANNER_BEGIN: &str = "-----BEGIN (ENCRYPTED DATA + DEK) STRING-----";
const BANNER_END: &str = "-----END (ENCRYPTED DATA + DEK) STRING-----";

/// A subcommand of the `envelope` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Encrypt,
    Decrypt,
    Reencrypt,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Encrypt => "encrypt",
            Command::Decrypt => "decrypt",
            Command::Reencrypt => "reencrypt",
        }
    }

    pub fn default_source(self) -> &'static str {
        match self {
            Command::Encrypt => "./plain.txt",
            Command::Decrypt | Command::Reencrypt => "./cipher.txt",
        }
    }

    pub fn default_target(self) -> &'static str {
        match self {
            Command::Encrypt | Command::Reencrypt => "./cipher.txt",
            Command::Decrypt => "./plain.txt",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The first argument named no known command.
#[derive(Debug, thiserror::Error)]
#[error("unknown command {0:?} (expected encrypt, decrypt or reencrypt)")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "encrypt" => Ok(Command::Encrypt),
            "decrypt" => Ok(Command::Decrypt),
            "reencrypt" => Ok(Command::Reencrypt),
            _ => Err(UnknownCommand(s.to_owned())),
        }
    }
}

/// Run `command` with `cfg`, writing user-facing output to `out`.
///
/// # Errors
///
/// Returns the first failure. Engine failures carry an
/// [`envelope::EnvelopeError`] in the error chain.
pub fn run(
    command: Command,
    cfg: &Settings,
    engine: &EnvelopeEngine,
    out: &mut dyn Write,
) -> Result<()> {
    let key_id = cfg.key_identifier()?;
    let source = cfg.source_for(command);
    let target = cfg.target_for(command);
    info!(
        %command,
        source = %source.display(),
        target = %target.display(),
        key_id = %key_id,
        "running command"
    );

    match command {
        Command::Encrypt => encrypt(cfg, engine, &key_id, &source, &target, out),
        Command::Decrypt => decrypt(cfg, engine, &key_id, &source, &target, out),
        Command::Reencrypt => reencrypt(cfg, engine, &key_id, &source, &target, out),
    }
}

fn encrypt(
    cfg: &Settings,
    engine: &EnvelopeEngine,
    key_id: &str,
    source: &Path,
    target: &Path,
    out: &mut dyn Write,
) -> Result<()> {
    ensure_distinct(source, target)?;
    let plaintext = Zeroizing::new(
        fs::read(source).with_context(|| format!("failed to read {}", source.display()))?,
    );

    let envelope = engine.encrypt(&plaintext, key_id, cfg.single_line)?;

    writeln!(out, "{BANNER_BEGIN}")?;
    out.write_all(&envelope)?;
    writeln!(out)?;
    writeln!(out, "{BANNER_END}")?;

    output::write_durably(target, &envelope)?;
    writeln!(out, "Encryption successful, ciphertext available at {}", target.display())?;

    if !cfg.retain_source {
        erase_source(source, out)?;
    }
    Ok(())
}

fn decrypt(
    cfg: &Settings,
    engine: &EnvelopeEngine,
    key_id: &str,
    source: &Path,
    target: &Path,
    out: &mut dyn Write,
) -> Result<()> {
    let envelope =
        fs::read(source).with_context(|| format!("failed to read {}", source.display()))?;

    let plaintext = engine.decrypt(&envelope, key_id)?;

    if cfg.validate_only {
        writeln!(out, "Validation completed successfully, {} decrypts", source.display())?;
        return Ok(());
    }
    if cfg.to_stdout {
        out.write_all(&plaintext)?;
        out.flush()?;
        return Ok(());
    }

    ensure_distinct(source, target)?;
    output::write_durably(target, &plaintext)?;
    writeln!(out, "Decryption successful, plaintext available at {}", target.display())?;

    if !cfg.retain_source {
        erase_source(source, out)?;
    }
    Ok(())
}

fn reencrypt(
    cfg: &Settings,
    engine: &EnvelopeEngine,
    key_id: &str,
    source: &Path,
    target: &Path,
    out: &mut dyn Write,
) -> Result<()> {
    let envelope =
        fs::read(source).with_context(|| format!("failed to read {}", source.display()))?;

    let fresh = engine.reencrypt(&envelope, key_id, cfg.single_line)?;

    output::write_durably(target, &fresh)?;
    writeln!(out, "Reencryption successful, ciphertext available at {}", target.display())?;

    // In place the old envelope is already gone.
    if !cfg.retain_source && !same_file(source, target) {
        erase_source(source, out)?;
    }
    Ok(())
}

fn erase_source(path: &Path, out: &mut dyn Write) -> Result<()> {
    match erase(path)? {
        EraseOutcome::Erased { bytes } => {
            writeln!(out, "Wiped {bytes} bytes from {}", path.display())?;
        }
        EraseOutcome::SkippedNotAFile => {
            writeln!(
                out,
                "Did not zero-fill or delete {} as it is not a regular file",
                path.display()
            )?;
        }
    }
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn ensure_distinct(source: &Path, target: &Path) -> Result<()> {
    if same_file(source, target) {
        anyhow::bail!(
            "source and target are the same file ({}); refusing to overwrite the input",
            source.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use common::{EnvelopeError, KmsProvider, RejectionKind};
    use envelope::{EngineConfig, KeyManagementClient};

    use crate::config::test_settings;

    /// Wraps by reversing and padding to the GCP wrapped-key length.
    struct FakeKms;

    impl KeyManagementClient for FakeKms {
        fn wrap_key(&self, _key_id: &str, plaintext_key: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
            let mut wrapped: Vec<u8> = plaintext_key.iter().rev().copied().collect();
            wrapped.resize(KmsProvider::Gcp.nominal_wrapped_key_len(), 0xEE);
            Ok(wrapped)
        }

        fn unwrap_key(
            &self,
            _key_id: &str,
            wrapped_key: &[u8],
        ) -> Result<Zeroizing<Vec<u8>>, EnvelopeError> {
            if wrapped_key.len() != KmsProvider::Gcp.nominal_wrapped_key_len() {
                return Err(EnvelopeError::rejected(
                    RejectionKind::InvalidCiphertext,
                    "bad wrapped key",
                ));
            }
            Ok(Zeroizing::new(wrapped_key[..32].iter().rev().copied().collect()))
        }
    }

    fn engine() -> EnvelopeEngine {
        EnvelopeEngine::new(EngineConfig::from(KmsProvider::Gcp), Box::new(FakeKms))
    }

    fn settings(dir: &Path, source: &str, target: &str) -> Settings {
        Settings {
            source_path: Some(dir.join(source)),
            target_path: Some(dir.join(target)),
            ..test_settings()
        }
    }

    fn path(dir: &Path, name: &str) -> PathBuf {
        dir.join(name)
    }

    fn encrypt_fixture(dir: &Path, plaintext: &[u8]) -> Vec<u8> {
        fs::write(path(dir, "plain.txt"), plaintext).unwrap();
        let cfg = settings(dir, "plain.txt", "cipher.txt");
        run(Command::Encrypt, &cfg, &engine(), &mut Vec::new()).unwrap();
        fs::read(path(dir, "cipher.txt")).unwrap()
    }

    #[test]
    fn command_parsing() {
        assert_eq!("encrypt".parse::<Command>().unwrap(), Command::Encrypt);
        assert_eq!("Decrypt".parse::<Command>().unwrap(), Command::Decrypt);
        assert_eq!("REENCRYPT".parse::<Command>().unwrap(), Command::Reencrypt);
        let err = "rotate".parse::<Command>().unwrap_err();
        assert_eq!(err.0, "rotate");
        assert!(err.to_string().contains("expected encrypt, decrypt or reencrypt"));
    }

    #[test]
    fn encrypt_writes_envelope_and_erases_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(path(dir.path(), "plain.txt"), b"hello world").unwrap();
        let cfg = settings(dir.path(), "plain.txt", "cipher.txt");
        let mut out = Vec::new();

        run(Command::Encrypt, &cfg, &engine(), &mut out).unwrap();

        let envelope = fs::read(path(dir.path(), "cipher.txt")).unwrap();
        assert!(!path(dir.path(), "plain.txt").exists());

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.starts_with(BANNER_BEGIN));
        assert!(printed.contains(BANNER_END));
        assert!(printed.contains(std::str::from_utf8(&envelope).unwrap()));
        assert!(printed.contains("Wiped 11 bytes"));
    }

    #[test]
    fn encrypt_single_line_has_no_breaks() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(path(dir.path(), "plain.txt"), vec![b'x'; 200]).unwrap();
        let cfg = Settings {
            single_line: true,
            ..settings(dir.path(), "plain.txt", "cipher.txt")
        };

        run(Command::Encrypt, &cfg, &engine(), &mut Vec::new()).unwrap();
        assert!(!fs::read(path(dir.path(), "cipher.txt")).unwrap().contains(&b'\n'));
    }

    #[test]
    fn encrypt_retains_source_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(path(dir.path(), "plain.txt"), b"keep me").unwrap();
        let cfg = Settings {
            retain_source: true,
            ..settings(dir.path(), "plain.txt", "cipher.txt")
        };

        run(Command::Encrypt, &cfg, &engine(), &mut Vec::new()).unwrap();
        assert_eq!(fs::read(path(dir.path(), "plain.txt")).unwrap(), b"keep me");
        assert!(path(dir.path(), "cipher.txt").exists());
    }

    #[test]
    fn encrypt_missing_source_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = settings(dir.path(), "plain.txt", "cipher.txt");

        assert!(run(Command::Encrypt, &cfg, &engine(), &mut Vec::new()).is_err());
        assert!(!path(dir.path(), "cipher.txt").exists());
    }

    #[test]
    fn encrypt_refuses_same_source_and_target() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(path(dir.path(), "data.txt"), b"secret").unwrap();
        let cfg = settings(dir.path(), "data.txt", "data.txt");

        assert!(run(Command::Encrypt, &cfg, &engine(), &mut Vec::new()).is_err());
        assert_eq!(fs::read(path(dir.path(), "data.txt")).unwrap(), b"secret");
    }

    /// Refuses every wrap with a transient outage.
    struct UnavailableKms;

    impl KeyManagementClient for UnavailableKms {
        fn wrap_key(&self, _key_id: &str, _plaintext_key: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
            Err(EnvelopeError::KeyServiceUnavailable("deadline exceeded".into()))
        }

        fn unwrap_key(
            &self,
            _key_id: &str,
            _wrapped_key: &[u8],
        ) -> Result<Zeroizing<Vec<u8>>, EnvelopeError> {
            Err(EnvelopeError::KeyServiceUnavailable("deadline exceeded".into()))
        }
    }

    #[test]
    fn encrypt_wrap_failure_keeps_plaintext_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(path(dir.path(), "plain.txt"), b"hello world").unwrap();
        let cfg = settings(dir.path(), "plain.txt", "cipher.txt");
        let engine =
            EnvelopeEngine::new(EngineConfig::from(KmsProvider::Gcp), Box::new(UnavailableKms));
        let mut out = Vec::new();

        let err = run(Command::Encrypt, &cfg, &engine, &mut out).unwrap_err();

        let root = err.chain().find_map(|c| c.downcast_ref::<EnvelopeError>());
        assert!(matches!(root, Some(EnvelopeError::KeyServiceUnavailable(_))));
        assert_eq!(fs::read(path(dir.path(), "plain.txt")).unwrap(), b"hello world");
        assert!(!path(dir.path(), "cipher.txt").exists());
        assert!(!String::from_utf8(out).unwrap().contains(BANNER_BEGIN));
    }

    #[test]
    fn encrypt_write_failure_keeps_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(path(dir.path(), "plain.txt"), b"hello world").unwrap();
        let cfg = Settings {
            source_path: Some(path(dir.path(), "plain.txt")),
            target_path: Some(dir.path().join("absent").join("cipher.txt")),
            ..test_settings()
        };
        let mut out = Vec::new();

        assert!(run(Command::Encrypt, &cfg, &engine(), &mut out).is_err());

        assert_eq!(fs::read(path(dir.path(), "plain.txt")).unwrap(), b"hello world");
        assert!(!String::from_utf8(out).unwrap().contains("Wiped"));
    }

    #[test]
    fn decrypt_write_failure_keeps_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let envelope = encrypt_fixture(dir.path(), b"payload");
        let cfg = Settings {
            source_path: Some(path(dir.path(), "cipher.txt")),
            target_path: Some(dir.path().join("absent").join("plain.txt")),
            ..test_settings()
        };

        assert!(run(Command::Decrypt, &cfg, &engine(), &mut Vec::new()).is_err());
        assert_eq!(fs::read(path(dir.path(), "cipher.txt")).unwrap(), envelope);
    }

    #[test]
    fn decrypt_restores_plaintext_and_erases_envelope() {
        let dir = tempfile::tempdir().unwrap();
        encrypt_fixture(dir.path(), b"hello world");
        let cfg = settings(dir.path(), "cipher.txt", "plain.txt");
        let mut out = Vec::new();

        run(Command::Decrypt, &cfg, &engine(), &mut out).unwrap();

        assert_eq!(fs::read(path(dir.path(), "plain.txt")).unwrap(), b"hello world");
        assert!(!path(dir.path(), "cipher.txt").exists());
        assert!(String::from_utf8(out).unwrap().contains("Decryption successful"));
    }

    #[test]
    fn decrypt_to_stdout_keeps_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let envelope = encrypt_fixture(dir.path(), b"hello\ngo\n");
        let cfg = Settings {
            to_stdout: true,
            ..settings(dir.path(), "cipher.txt", "plain.txt")
        };
        let mut out = Vec::new();

        run(Command::Decrypt, &cfg, &engine(), &mut out).unwrap();

        assert_eq!(out, b"hello\ngo\n");
        assert_eq!(fs::read(path(dir.path(), "cipher.txt")).unwrap(), envelope);
        assert!(!path(dir.path(), "plain.txt").exists());
    }

    #[test]
    fn validate_only_writes_and_erases_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let envelope = encrypt_fixture(dir.path(), b"payload");
        let cfg = Settings {
            validate_only: true,
            ..settings(dir.path(), "cipher.txt", "plain.txt")
        };
        let mut out = Vec::new();

        run(Command::Decrypt, &cfg, &engine(), &mut out).unwrap();

        assert!(String::from_utf8(out).unwrap().contains("Validation completed successfully"));
        assert_eq!(fs::read(path(dir.path(), "cipher.txt")).unwrap(), envelope);
        assert!(!path(dir.path(), "plain.txt").exists());
    }

    #[test]
    fn failed_decrypt_keeps_envelope_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut envelope = encrypt_fixture(dir.path(), b"payload");
        // Flip a base64 character inside the ciphertext region.
        envelope[0] = if envelope[0] == b'A' { b'B' } else { b'A' };
        fs::write(path(dir.path(), "cipher.txt"), &envelope).unwrap();
        let cfg = settings(dir.path(), "cipher.txt", "plain.txt");

        let err = run(Command::Decrypt, &cfg, &engine(), &mut Vec::new()).unwrap_err();

        assert!(err.chain().any(|c| c.downcast_ref::<EnvelopeError>().is_some()));
        assert_eq!(fs::read(path(dir.path(), "cipher.txt")).unwrap(), envelope);
        assert!(!path(dir.path(), "plain.txt").exists());
    }

    #[test]
    fn reencrypt_replaces_envelope_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let original = encrypt_fixture(dir.path(), b"rotate me");
        let cfg = Settings {
            target_path: None,
            ..settings(dir.path(), "cipher.txt", "unused")
        };

        run(Command::Reencrypt, &cfg, &engine(), &mut Vec::new()).unwrap();

        let fresh = fs::read(path(dir.path(), "cipher.txt")).unwrap();
        assert_ne!(fresh, original);
        assert_eq!(engine().decrypt(&fresh, "k").unwrap().as_slice(), b"rotate me");
        assert!(!path(dir.path(), "plain.txt").exists());
    }

    #[test]
    fn reencrypt_to_new_target_erases_old_envelope() {
        let dir = tempfile::tempdir().unwrap();
        encrypt_fixture(dir.path(), b"move me");
        let cfg = settings(dir.path(), "cipher.txt", "cipher.new");

        run(Command::Reencrypt, &cfg, &engine(), &mut Vec::new()).unwrap();

        assert!(!path(dir.path(), "cipher.txt").exists());
        let fresh = fs::read(path(dir.path(), "cipher.new")).unwrap();
        assert_eq!(engine().decrypt(&fresh, "k").unwrap().as_slice(), b"move me");
    }

    #[test]
    fn reencrypt_of_bad_envelope_leaves_it_untouched() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(path(dir.path(), "cipher.txt"), b"not*an*envelope").unwrap();
        let cfg = Settings {
            target_path: None,
            ..settings(dir.path(), "cipher.txt", "unused")
        };

        assert!(run(Command::Reencrypt, &cfg, &engine(), &mut Vec::new()).is_err());
        assert_eq!(fs::read(path(dir.path(), "cipher.txt")).unwrap(), b"not*an*envelope");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_source_is_not_erased() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(path(dir.path(), "real.txt"), b"linked").unwrap();
        std::os::unix::fs::symlink(path(dir.path(), "real.txt"), path(dir.path(), "plain.txt"))
            .unwrap();
        let cfg = settings(dir.path(), "plain.txt", "cipher.txt");
        let mut out = Vec::new();

        run(Command::Encrypt, &cfg, &engine(), &mut out).unwrap();

        assert_eq!(fs::read(path(dir.path(), "real.txt")).unwrap(), b"linked");
        assert!(String::from_utf8(out).unwrap().contains("not a regular file"));
    }
}
