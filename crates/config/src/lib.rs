//! Layered configuration for camkeep.
//!
//! Values are resolved once, in increasing order of precedence:
//!
//! 1. Built-in defaults.
//! 2. A configuration file (TOML, YAML or JSON, chosen by extension). An
//!    explicitly given file must exist; the default one under the platform
//!    configuration directory is optional.
//! 3. Environment variables prefixed `CAMKEEP_`, with `__` separating nested
//!    keys (`CAMKEEP_RETENTION__MAX_AGE_DAYS=30`).
//! 4. Command line [`Overrides`].
//!
//! The result is validated and converted into the library's
//! [`Context`](camkeep_library::Context); the library itself never reads
//! configuration.

pub mod error;
mod settings;

pub use crate::settings::{Overrides, PatternSettings, RetentionSettings, RetrySettings, Settings};
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use std::path::{Path, PathBuf};

/// Prefix of environment variables read as configuration.
pub const ENV_PREFIX: &str = "CAMKEEP_";

/// `config.toml` in the platform configuration directory, when one can be
/// determined.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "camkeep").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Loads [`Settings`] from every layer and validates them.
///
/// # Errors
/// [`ErrorKind::Load`] if a source cannot be read or parsed,
/// [`ErrorKind::Invalid`] if the merged values fail [`Settings::validate`].
pub fn load(config_path: Option<&Path>, overrides: &Overrides) -> Result<Settings> {
    let mut figment = Figment::from(Serialized::defaults(Settings::default()));
    match config_path {
        Some(path) => {
            if !path.is_file() {
                exn::bail!(ErrorKind::Load(format!("configuration file {} does not exist", path.display())));
            }
            figment = merge_file(figment, path)?;
        },
        None => {
            if let Some(path) = default_config_path().filter(|p| p.is_file()) {
                figment = merge_file(figment, &path)?;
            }
        },
    }
    let figment = figment.merge(env_provider()).merge(Serialized::defaults(overrides));
    extract(&figment)
}

/// Top-level settings keys read from the environment.
const ENV_KEYS: [&str; 10] = [
    "root",
    "organize",
    "delete",
    "dry_run",
    "prune_empty_dirs",
    "layout",
    "lock_file",
    "retention",
    "pattern",
    "retry",
];

/// `CAMKEEP_*` variables whose first segment is a settings key. Other
/// variables sharing the prefix are ignored; typos below a known key are
/// still rejected.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).split("__").filter(|key| {
        let key = key.as_str();
        let top = key.split("__").next().unwrap_or(key);
        let top = top.split('.').next().unwrap_or(top);
        ENV_KEYS.iter().any(|known| top.eq_ignore_ascii_case(known))
    })
}

/// Extracts and validates settings from an already assembled [`Figment`].
pub fn extract(figment: &Figment) -> Result<Settings> {
    let settings: Settings = match figment.extract() {
        Ok(settings) => settings,
        Err(e) => exn::bail!(ErrorKind::Load(e.to_string())),
    };
    settings.validate()?;
    Ok(settings)
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    tracing::debug!(path = %path.display(), "Reading configuration file");
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::Load(format!(
            "unsupported configuration format for {} (expected .toml, .yaml or .json)",
            path.display()
        ))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("config.toml", "root = \"{root}\"\ndry_run = true\n[retention]\nmax_age_days = 14\n")]
    #[case("config.yaml", "root: \"{root}\"\ndry_run: true\nretention:\n  max_age_days: 14\n")]
    #[case("config.json", "{\"root\": \"{root}\", \"dry_run\": true, \"retention\": {\"max_age_days\": 14}}")]
    fn test_file_formats(#[case] name: &str, #[case] contents: &str) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(name);
        std::fs::write(&path, contents.replace("{root}", temp_dir.path().to_str().unwrap())).unwrap();

        let settings = load(Some(&path), &Overrides::default()).unwrap();
        assert_eq!(settings.root.as_deref(), Some(temp_dir.path()));
        assert!(settings.dry_run);
        assert_eq!(settings.retention.max_age_days, Some(14));
        // Untouched values keep their defaults.
        assert_eq!(settings.retention.grace_period_secs, 300);
        assert!(settings.organize);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "root = \"/does/not/exist\"\norganize = true\n").unwrap();
        let overrides = Overrides {
            root: Some(temp_dir.path().to_path_buf()),
            organize: Some(false),
            ..Default::default()
        };

        let settings = load(Some(&path), &overrides).unwrap();
        assert_eq!(settings.root.as_deref(), Some(temp_dir.path()));
        assert!(!settings.organize);
        assert!(settings.delete);
    }

    #[test]
    fn test_missing_explicit_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = load(Some(&temp_dir.path().join("absent.toml")), &Overrides::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Load(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.ini");
        std::fs::write(&path, "root=/").unwrap();
        let err = load(Some(&path), &Overrides::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Load(_)));
    }

    #[test]
    fn test_unrelated_environment_variables_are_ignored() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CAMKEEP_RETRY__ATTEMPTS", "5");
            jail.set_env("CAMKEEP_PRUNE_EMPTY_DIRS", "false");
            jail.set_env("CAMKEEP_LOG", "debug");
            jail.set_env("CAMKEEP_VERSION", "1.2.3");
            let overrides = Overrides { root: Some(jail.directory().to_path_buf()), ..Default::default() };
            let figment = Figment::from(Serialized::defaults(Settings::default()))
                .merge(env_provider())
                .merge(Serialized::defaults(&overrides));

            let settings = extract(&figment).unwrap();
            assert_eq!(settings.retry.attempts, 5);
            assert!(!settings.prune_empty_dirs);
            Ok(())
        });
    }

    #[rstest]
    #[case("[retention]\nmax_age_days = -3\n")]
    #[case("[pattern.extensions]\nmp4 = \"movie\"\n")]
    #[case("unknown_key = 1\n")]
    fn test_rejected_at_deserialization(#[case] contents: &str) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        let overrides = Overrides { root: Some(temp_dir.path().to_path_buf()), ..Default::default() };
        let err = load(Some(&path), &overrides).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Load(_)));
    }
}
