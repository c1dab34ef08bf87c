use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use age::secrecy::SecretString;
use age::{Decryptor, Encryptor};
use demoseed_core::write_bytes_atomic;
use tracing::debug;

use super::{WorkspaceError, WorkspacePaths, WorkspaceResult};

/// Unlocks `secrets/credentials.age`.
pub const PASSPHRASE_VAR: &str = "DEMOSEED_PASSPHRASE";

/// Credentials looked up by variable name.
///
/// Process environment wins over the workspace `.env` file, which wins over
/// the encrypted credentials file.
#[derive(Default)]
pub struct Secrets {
    env_file: BTreeMap<String, String>,
    vault: BTreeMap<String, String>,
}

impl Secrets {
    pub fn load(paths: &WorkspacePaths) -> WorkspaceResult<Self> {
        let env_path = paths.env_path();
        let env_file = if env_path.exists() {
            load_env_file(&env_path)?
        } else {
            BTreeMap::new()
        };

        let credentials = paths.credentials_path();
        let vault = match std::env::var(PASSPHRASE_VAR) {
            Ok(passphrase) if credentials.exists() => {
                let plaintext = decrypt_from_file(&credentials, &passphrase)?;
                parse_env(&plaintext)
            }
            _ => BTreeMap::new(),
        };
        debug!(
            env_file = env_file.len(),
            vault = vault.len(),
            "secrets loaded"
        );
        Ok(Self { env_file, vault })
    }

    pub fn get(&self, name: &str) -> Option<String> {
        std::env::var(name)
            .ok()
            .filter(|value| !value.is_empty())
            .or_else(|| self.env_file.get(name).cloned())
            .or_else(|| self.vault.get(name).cloned())
    }

    pub fn require(&self, name: &str) -> WorkspaceResult<String> {
        self.get(name).ok_or_else(|| WorkspaceError::MissingSecret {
            name: name.to_string(),
            hint: format!(
                "export {name}, add it to .env, or store it with `demoseed secrets store`"
            ),
        })
    }
}

/// Merge `values` into the encrypted credentials file, creating it when
/// absent. Returns the names now stored.
pub fn store_credentials(
    paths: &WorkspacePaths,
    passphrase: &str,
    values: BTreeMap<String, String>,
) -> WorkspaceResult<Vec<String>> {
    let path = paths.credentials_path();
    let mut stored = if path.exists() {
        parse_env(&decrypt_from_file(&path, passphrase)?)
    } else {
        BTreeMap::new()
    };
    stored.extend(values);

    let plaintext: String = stored
        .iter()
        .map(|(key, value)| format!("{key}=\"{value}\"\n"))
        .collect();
    encrypt_to_file(&path, passphrase, &plaintext)?;
    Ok(stored.into_keys().collect())
}

/// Names held in the encrypted credentials file.
pub fn stored_names(paths: &WorkspacePaths, passphrase: &str) -> WorkspaceResult<Vec<String>> {
    let path = paths.credentials_path();
    if !path.exists() {
        return Ok(Vec::new());
    }
    Ok(parse_env(&decrypt_from_file(&path, passphrase)?).into_keys().collect())
}

pub fn load_env_file(path: &Path) -> WorkspaceResult<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_env(&content))
}

fn parse_env(content: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|inner| inner.strip_suffix('"'))
            .unwrap_or(value);
        values.insert(key.to_string(), value.to_string());
    }
    values
}

pub fn encrypt_to_file(path: &Path, passphrase: &str, plaintext: &str) -> WorkspaceResult<()> {
    let secret = SecretString::from(passphrase.to_string());
    let encryptor = Encryptor::with_user_passphrase(secret);
    let mut output = Vec::new();
    {
        let mut writer = encryptor
            .wrap_output(&mut output)
            .map_err(|err| WorkspaceError::Crypto(err.to_string()))?;
        writer.write_all(plaintext.as_bytes())?;
        writer
            .finish()
            .map_err(|err| WorkspaceError::Crypto(err.to_string()))?;
    }
    write_bytes_atomic(path, &output)?;
    set_private_permissions(path)?;
    Ok(())
}

pub fn decrypt_from_file(path: &Path, passphrase: &str) -> WorkspaceResult<String> {
    let data = std::fs::read(path)?;
    let decryptor =
        Decryptor::new(&data[..]).map_err(|err| WorkspaceError::Crypto(err.to_string()))?;
    let identity = age::scrypt::Identity::new(SecretString::from(passphrase.to_string()));
    let mut reader = decryptor
        .decrypt(std::iter::once(&identity as &dyn age::Identity))
        .map_err(|err| WorkspaceError::Crypto(err.to_string()))?;
    let mut out = String::new();
    reader.read_to_string(&mut out)?;
    Ok(out)
}

fn set_private_permissions(path: &Path) -> WorkspaceResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parsing_skips_comments_and_strips_quotes() {
        let values = parse_env(
            "# llm\nexport DEMOSEED_TEST_KEY=\"abc=def\"\n\nBROKEN\nDEMOSEED_REMOTE_TOKEN = tok \n",
        );
        assert_eq!(values.get("DEMOSEED_TEST_KEY").map(String::as_str), Some("abc=def"));
        assert_eq!(values.get("DEMOSEED_REMOTE_TOKEN").map(String::as_str), Some("tok"));
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn credentials_round_trip_through_age() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.age");

        encrypt_to_file(&path, "correct horse", "DEMOSEED_REMOTE_PASSWORD=hunter2\n").unwrap();

        let plaintext = decrypt_from_file(&path, "correct horse").unwrap();
        assert_eq!(
            parse_env(&plaintext).get("DEMOSEED_REMOTE_PASSWORD").map(String::as_str),
            Some("hunter2")
        );
        assert!(decrypt_from_file(&path, "wrong").is_err());
    }

    #[test]
    fn storing_merges_with_existing_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::new(dir.path().to_path_buf());
        paths.ensure_dirs().unwrap();

        let first = BTreeMap::from([("DEMOSEED_REMOTE_PASSWORD".to_string(), "a b".to_string())]);
        store_credentials(&paths, "pass", first).unwrap();
        let second = BTreeMap::from([("ANTHROPIC_API_KEY".to_string(), "sk-1".to_string())]);
        let names = store_credentials(&paths, "pass", second).unwrap();

        assert_eq!(names, vec!["ANTHROPIC_API_KEY", "DEMOSEED_REMOTE_PASSWORD"]);
        assert_eq!(stored_names(&paths, "pass").unwrap(), names);
        let plaintext = decrypt_from_file(&paths.credentials_path(), "pass").unwrap();
        assert_eq!(
            parse_env(&plaintext).get("DEMOSEED_REMOTE_PASSWORD").map(String::as_str),
            Some("a b")
        );
        assert!(stored_names(&paths, "other").is_err());
    }

    #[test]
    fn env_file_values_are_found() {
        let dir = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::new(dir.path().to_path_buf());
        std::fs::write(paths.env_path(), "DEMOSEED_CLI_TEST_ONLY_SECRET=from-file\n").unwrap();

        let secrets = Secrets::load(&paths).unwrap();

        assert_eq!(
            secrets.get("DEMOSEED_CLI_TEST_ONLY_SECRET").as_deref(),
            Some("from-file")
        );
        assert!(secrets.require("DEMOSEED_CLI_TEST_MISSING").is_err());
    }
}
