use std::{fs, io, path::Path};

use envmap_core::EncryptionConfig;
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::{atomic, error::StoreError};

/// Domain-separation label binding derived keys to local store encryption.
const HKDF_INFO: &[u8] = b"envmap-local-encryption-v1";
const KEY_LEN: usize = 32;
/// Shortest key file accepted as key material.
pub const MIN_KEY_FILE_LEN: usize = 16;

/// Raw key material as read from the environment or a key file.
pub struct KeyMaterial(Zeroizing<Vec<u8>>);

impl KeyMaterial {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// 256-bit AES key derived from [`KeyMaterial`]. Wiped on drop.
#[derive(Clone)]
pub struct DerivedKey(Zeroizing<[u8; KEY_LEN]>);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// HKDF-SHA256 with no salt; per-encryption nonces supply the randomness.
pub fn derive_key(material: &KeyMaterial) -> Result<DerivedKey, StoreError> {
    let hk = Hkdf::<Sha256>::new(None, material.as_bytes());
    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    hk.expand(HKDF_INFO, &mut okm[..])
        .map_err(|e| StoreError::InvalidMaterial(e.to_string()))?;
    Ok(DerivedKey(okm))
}

/// Resolve key material: `key_env` wins when configured, otherwise a
/// sufficiently long, owner-only `key_file` is required.
#[instrument(skip_all)]
pub fn load_key_material(cfg: &EncryptionConfig) -> Result<KeyMaterial, StoreError> {
    if let Some(kind) = cfg.kind.as_deref() {
        if !matches!(kind, "" | "aes-gcm" | "aes-256-gcm") {
            return Err(StoreError::UnsupportedEncryption(kind.to_string()));
        }
    }

    if let Some(var) = cfg.key_env.as_deref().filter(|v| !v.is_empty()) {
        return match std::env::var(var) {
            Ok(value) if !value.is_empty() => {
                debug!(var, "using key material from environment");
                Ok(KeyMaterial::new(value.into_bytes()))
            }
            _ => Err(StoreError::EmptyKeyEnv(var.to_string())),
        };
    }

    let path = cfg.key_file.as_deref().ok_or(StoreError::MissingKeySource)?;
    check_owner_only(path)?;
    let data = fs::read(path).map_err(StoreError::io("read key file"))?;
    if data.len() < MIN_KEY_FILE_LEN {
        return Err(StoreError::KeyTooShort {
            path: path.to_path_buf(),
            len: data.len(),
            min: MIN_KEY_FILE_LEN,
        });
    }
    debug!(path = %path.display(), "using key material from file");
    Ok(KeyMaterial::new(data))
}

#[cfg(unix)]
fn check_owner_only(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    let meta = fs::metadata(path).map_err(StoreError::io("stat key file"))?;
    let mode = meta.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(StoreError::InsecurePermissions {
            path: path.to_path_buf(),
            mode,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_owner_only(path: &Path) -> Result<(), StoreError> {
    fs::metadata(path).map_err(StoreError::io("stat key file"))?;
    Ok(())
}

/// Write 32 fresh random bytes to `path` (0600, parent 0700).
/// Refuses to touch a target that already has content.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn generate_key_file(path: &Path) -> Result<(), StoreError> {
    let replace_empty = match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => return Err(StoreError::KeyFileExists(path.to_path_buf())),
        Ok(_) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => false,
        Err(err) => return Err(StoreError::io("stat key file")(err)),
    };

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    OsRng.fill_bytes(&mut key[..]);
    let staged = atomic::stage(path, &key[..])?;
    if replace_empty {
        staged.commit(path)?;
    } else {
        staged.commit_new(path).map_err(|err| match err.kind() {
            io::ErrorKind::AlreadyExists => StoreError::KeyFileExists(path.to_path_buf()),
            _ => StoreError::io("create key file")(err),
        })?;
    }
    debug!("generated key file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_key_file(dir: &Path, len: usize, mode: u32) -> std::path::PathBuf {
        let path = dir.join("key");
        let bytes: Vec<u8> = (0..len).map(|i| 1 + (i % 250) as u8).collect();
        fs::write(&path, bytes).expect("write key");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(mode)).expect("chmod");
        }
        #[cfg(not(unix))]
        let _ = mode;
        path
    }

    fn file_cfg(path: &Path) -> EncryptionConfig {
        EncryptionConfig {
            kind: Some("aes-gcm".into()),
            key_file: Some(path.to_path_buf()),
            key_env: None,
        }
    }

    #[test]
    fn derivation_is_deterministic_and_32_bytes() {
        let material = KeyMaterial::new(b"test-key-material-at-least-16-bytes".to_vec());
        let first = derive_key(&material).expect("derive");
        let second = derive_key(&material).expect("derive again");

        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_eq!(first.as_bytes().len(), 32);
    }

    #[test]
    fn derivation_separates_material() {
        let a = derive_key(&KeyMaterial::new(b"key1-must-be-16-bytes".to_vec())).expect("a");
        let b = derive_key(&KeyMaterial::new(b"key2-must-be-16-bytes".to_vec())).expect("b");
        assert_ne!(a.as_bytes(), b.as_bytes());

        // Raw 32-byte material is never used directly as the cipher key.
        let raw = [7u8; 32];
        let derived = derive_key(&KeyMaterial::new(raw.to_vec())).expect("derive");
        assert_ne!(derived.as_bytes(), &raw);
    }

    #[test]
    fn accepts_owner_only_key_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_key_file(dir.path(), 32, 0o600);
        let material = load_key_material(&file_cfg(&path)).expect("load");
        assert_eq!(material.as_bytes().len(), 32);
    }

    #[test]
    fn rejects_short_key_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_key_file(dir.path(), 15, 0o600);
        let err = load_key_material(&file_cfg(&path))
            .err()
            .expect("short key must fail");
        assert!(matches!(err, StoreError::KeyTooShort { len: 15, .. }));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_group_or_other_readable_key_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        for mode in [0o640, 0o604, 0o660, 0o644] {
            let path = write_key_file(dir.path(), 32, mode);
            let err = load_key_material(&file_cfg(&path))
                .err()
                .expect("permissive key must fail");
            assert!(
                matches!(err, StoreError::InsecurePermissions { mode: m, .. } if m == mode),
                "mode {mode:#o} gave {err}"
            );
            assert!(err.to_string().contains("chmod 600"));
        }
    }

    #[test]
    fn missing_source_is_a_configuration_error() {
        let err = load_key_material(&EncryptionConfig::default())
            .err()
            .expect("no source");
        assert!(matches!(err, StoreError::MissingKeySource));
        assert!(err.is_configuration());
    }

    #[test]
    fn env_source_wins_over_key_file() {
        let var = "ENVMAP_TEST_KEY_ENV_WINS";
        std::env::set_var(var, "passphrase-from-the-environment");
        let cfg = EncryptionConfig {
            kind: None,
            key_file: Some("/nonexistent/key".into()),
            key_env: Some(var.into()),
        };
        let material = load_key_material(&cfg).expect("env material");
        assert_eq!(material.as_bytes(), b"passphrase-from-the-environment");
        std::env::remove_var(var);
    }

    #[test]
    fn empty_env_var_is_rejected() {
        let var = "ENVMAP_TEST_KEY_ENV_EMPTY";
        std::env::set_var(var, "");
        let cfg = EncryptionConfig {
            kind: None,
            key_file: None,
            key_env: Some(var.into()),
        };
        let err = load_key_material(&cfg).err().expect("empty env");
        assert!(matches!(err, StoreError::EmptyKeyEnv(ref v) if v == var));
        std::env::remove_var(var);
    }

    #[test]
    fn rejects_unknown_encryption_type() {
        let cfg = EncryptionConfig {
            kind: Some("rot13".into()),
            ..EncryptionConfig::default()
        };
        let err = load_key_material(&cfg).err().expect("bad type");
        assert!(matches!(err, StoreError::UnsupportedEncryption(_)));
    }

    #[test]
    fn key_created_after_the_existence_check_is_not_replaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("key");
        let staged = atomic::stage(&path, &[1u8; KEY_LEN]).expect("stage");

        // Another writer wins the race between the check and the rename.
        fs::write(&path, b"key-written-by-someone-else").expect("competing key");
        let err = staged.commit_new(&path).expect_err("must not clobber");

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&path).expect("read"), b"key-written-by-someone-else");
    }

    #[test]
    fn empty_placeholder_key_file_is_filled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("key");
        fs::write(&path, b"").expect("touch");

        generate_key_file(&path).expect("generate over empty file");
        assert_eq!(fs::read(&path).expect("read").len(), KEY_LEN);
    }

    #[test]
    fn generated_key_is_usable_and_not_overwritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("key");
        generate_key_file(&path).expect("generate");

        let first = fs::read(&path).expect("read key");
        assert_eq!(first.len(), 32);
        load_key_material(&file_cfg(&path)).expect("generated key passes policy");

        let err = generate_key_file(&path).expect_err("second generate must fail");
        assert!(matches!(err, StoreError::KeyFileExists(_)));
        assert_eq!(fs::read(&path).expect("read again"), first);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
            let dir_mode = fs::metadata(path.parent().expect("parent"))
                .expect("dir meta")
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(dir_mode, 0o700);
        }
    }
}
