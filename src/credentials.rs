use crate::config::Config;
use crate::parsers::ini_parser::{parse_ini_from_file, Ini};
use crate::prelude::*;
use std::collections::HashMap;
use std::env::var;
use std::path::PathBuf;

pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Credential {
    pub profile: String,
    pub access_key: String,
    pub secret: String,
    pub token: String,
    pub region: String,
}

/// Contents of `~/.aws/credentials` and `~/.aws/config`. Missing files are empty.
#[derive(Debug, Default)]
pub struct SharedFiles {
    pub credentials: Ini,
    pub config: Ini,
}

impl SharedFiles {
    pub fn load(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let aws_dir = || Config::home_dir().map(|home| home.join(".aws"));
        let credentials_path = match env("AWS_SHARED_CREDENTIALS_FILE").not_empty() {
            Some(path) => PathBuf::from(path),
            None => aws_dir()?.join("credentials"),
        };
        let config_path = match env("AWS_CONFIG_FILE").not_empty() {
            Some(path) => PathBuf::from(path),
            None => aws_dir()?.join("config"),
        };
        let read = |path: PathBuf| -> Result<Ini> {
            if path.exists() {
                parse_ini_from_file(&path)
            } else {
                Ok(Ini::default())
            }
        };
        Ok(Self {
            credentials: read(credentials_path).wrap_err("Can't load aws credentials")?,
            config: read(config_path).wrap_err("Can't load aws config")?,
        })
    }

    fn config_section(&self, profile: &str) -> Option<&HashMap<String, String>> {
        if profile == DEFAULT_PROFILE {
            self.config.get(DEFAULT_PROFILE).or_else(|| self.config.get("profile default"))
        } else {
            self.config.get(&f!("profile {profile}"))
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    var(name).ok()
}

/// Resolves credentials and region the way an AWS SDK finds them without
/// explicit configuration: environment first, then the shared files.
pub fn resolve(profile: Option<&str>, region: Option<&str>) -> Result<Credential> {
    resolve_with(profile, region, env_var, || SharedFiles::load(env_var))
}

/// Shared files are only loaded when the environment does not already provide
/// both the keys and the region.
pub fn resolve_with(
    profile: Option<&str>,
    region: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
    shared_files: impl FnOnce() -> Result<SharedFiles>,
) -> Result<Credential> {
    let explicit_profile = profile.map(String::from).not_empty();
    let profile = explicit_profile
        .clone()
        .or_else(|| env("AWS_PROFILE").not_empty())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
    let env_region = region
        .map(String::from)
        .not_empty()
        .or_else(|| env("AWS_REGION").not_empty())
        .or_else(|| env("AWS_DEFAULT_REGION").not_empty());
    let env_keys = match (
        explicit_profile.is_none(),
        env("AWS_ACCESS_KEY_ID").not_empty(),
        env("AWS_SECRET_ACCESS_KEY").not_empty(),
    ) {
        (true, Some(access_key), Some(secret)) => Some((access_key, secret)),
        _ => None,
    };
    let from_env = |(access_key, secret): (String, String), region: String| Credential {
        profile: "environment".into(),
        access_key,
        secret,
        token: env("AWS_SESSION_TOKEN").unwrap_or_default(),
        region,
    };
    if let (Some(keys), Some(region)) = (env_keys.clone(), env_region.clone()) {
        return Ok(from_env(keys, region));
    }

    let files = shared_files()?;
    let config_section = files.config_section(&profile);
    let region = env_region
        .or_else(|| config_section.and_then(|c| c.get("region")).cloned().not_empty())
        .ok_or_else(|| eyre!("No region configured for profile {profile}"))?;
    if let Some(keys) = env_keys {
        return Ok(from_env(keys, region));
    }

    let keys = [files.credentials.get(&profile), config_section]
        .into_iter()
        .flatten()
        .find_map(|props| {
            let access_key = props.get("aws_access_key_id").cloned().not_empty()?;
            let secret = props.get("aws_secret_access_key").cloned().not_empty()?;
            let token = props.get("aws_session_token").cloned().unwrap_or_default();
            Some((access_key, secret, token))
        });
    let Some((access_key, secret, token)) = keys else {
        bail!("No credentials found for profile {profile}");
    };
    Ok(Credential { profile, access_key, secret, token, region })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::ini_parser::parse_ini;
    use std::io::Write;

    const CREDENTIALS: &str = r#"
[default]
aws_access_key_id = AKIDDEFAULT
aws_secret_access_key = default-secret

[prod]
aws_access_key_id = AKIDPROD
aws_secret_access_key = prod-secret
aws_session_token = prod-token
"#;

    const CONFIG: &str = r#"
[default]
region = eu-west-1

[profile prod]
region = us-east-2

[profile sso]
region = ap-south-1
aws_access_key_id = AKIDSSO
aws_secret_access_key = sso-secret
"#;

    fn files() -> SharedFiles {
        SharedFiles {
            credentials: parse_ini(CREDENTIALS).unwrap(),
            config: parse_ini(CONFIG).unwrap(),
        }
    }

    fn shared() -> Result<SharedFiles> {
        Ok(files())
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn default_profile_from_shared_files() {
        let cred = resolve_with(None, None, env(&[]), shared).unwrap();
        assert_eq!(
            cred,
            Credential {
                profile: "default".into(),
                access_key: "AKIDDEFAULT".into(),
                secret: "default-secret".into(),
                token: String::new(),
                region: "eu-west-1".into(),
            }
        );
    }

    #[test]
    fn environment_keys_win_without_explicit_profile() {
        let env = env(&[
            ("AWS_ACCESS_KEY_ID", "AKIDENV"),
            ("AWS_SECRET_ACCESS_KEY", "env-secret"),
            ("AWS_SESSION_TOKEN", "env-token"),
            ("AWS_REGION", "us-west-2"),
        ]);
        let cred = resolve_with(None, None, env, shared).unwrap();
        assert_eq!(cred.access_key, "AKIDENV");
        assert_eq!(cred.token, "env-token");
        assert_eq!(cred.region, "us-west-2");
    }

    #[test]
    fn explicit_profile_beats_environment_keys() {
        let env = env(&[("AWS_ACCESS_KEY_ID", "AKIDENV"), ("AWS_SECRET_ACCESS_KEY", "env-secret")]);
        let cred = resolve_with(Some("prod"), None, env, shared).unwrap();
        assert_eq!(cred.profile, "prod");
        assert_eq!(cred.access_key, "AKIDPROD");
        assert_eq!(cred.token, "prod-token");
        assert_eq!(cred.region, "us-east-2");
    }

    #[test]
    fn aws_profile_env_selects_profile() {
        let cred = resolve_with(None, None, env(&[("AWS_PROFILE", "prod")]), shared).unwrap();
        assert_eq!(cred.profile, "prod");
        assert_eq!(cred.access_key, "AKIDPROD");
    }

    #[test]
    fn keys_can_live_in_config_file() {
        let cred = resolve_with(Some("sso"), None, env(&[]), shared).unwrap();
        assert_eq!(cred.access_key, "AKIDSSO");
        assert_eq!(cred.region, "ap-south-1");
    }

    #[test]
    fn region_precedence() {
        let both = env(&[("AWS_REGION", "us-west-2"), ("AWS_DEFAULT_REGION", "us-west-1")]);
        let cred = resolve_with(None, Some("sa-east-1"), &both, shared).unwrap();
        assert_eq!(cred.region, "sa-east-1");
        let cred = resolve_with(None, None, &both, shared).unwrap();
        assert_eq!(cred.region, "us-west-2");
        let legacy = env(&[("AWS_DEFAULT_REGION", "us-west-1")]);
        let cred = resolve_with(None, None, legacy, shared).unwrap();
        assert_eq!(cred.region, "us-west-1");
    }

    #[test]
    fn environment_alone_skips_shared_files() {
        let env = env(&[
            ("AWS_ACCESS_KEY_ID", "AKIDENV"),
            ("AWS_SECRET_ACCESS_KEY", "env-secret"),
            ("AWS_DEFAULT_REGION", "eu-central-1"),
        ]);
        let cred = resolve_with(None, None, env, || bail!("can't get user dirs")).unwrap();
        assert_eq!(cred.access_key, "AKIDENV");
        assert_eq!(cred.region, "eu-central-1");
    }

    #[test]
    fn environment_keys_take_region_from_config_file() {
        let env = env(&[("AWS_ACCESS_KEY_ID", "AKIDENV"), ("AWS_SECRET_ACCESS_KEY", "env-secret")]);
        let cred = resolve_with(None, None, env, shared).unwrap();
        assert_eq!(cred.profile, "environment");
        assert_eq!(cred.access_key, "AKIDENV");
        assert_eq!(cred.region, "eu-west-1");
    }

    #[test]
    fn unknown_profile_fails() {
        let err = resolve_with(Some("nope"), Some("eu-west-1"), env(&[]), shared).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn missing_region_fails() {
        let files = SharedFiles { credentials: parse_ini(CREDENTIALS).unwrap(), config: Ini::default() };
        assert!(resolve_with(None, None, env(&[]), move || Ok(files)).is_err());
    }

    #[test]
    fn shared_files_honour_env_paths() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = dir.path().join("credentials");
        std::fs::File::create(&credentials).unwrap().write_all(CREDENTIALS.as_bytes()).unwrap();
        let credentials_str = credentials.to_string_lossy().to_string();
        let missing = dir.path().join("config").to_string_lossy().to_string();
        let files = SharedFiles::load(env(&[
            ("AWS_SHARED_CREDENTIALS_FILE", credentials_str.as_str()),
            ("AWS_CONFIG_FILE", missing.as_str()),
        ]))
        .unwrap();
        assert_eq!(files.credentials["prod"]["aws_access_key_id"], "AKIDPROD");
        assert!(files.config.is_empty());
    }
}
