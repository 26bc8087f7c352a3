use crate::prelude::*;
use clap::Parser;
use clap_complete::Shell;
use directories::UserDirs;
use serde::Deserialize;
use std::{
    fs::File,
    path::{Path, PathBuf},
};

pub const CONFIG_FILE_NAME: &str = "ec2-inventory.config.json";
pub const DEFAULT_OUTPUT: &str = "ec2.ini";

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Tag key holding the host name
    #[arg(long)]
    pub name_tag: Option<String>,
    /// Tag key used to group hosts
    #[arg(long)]
    pub group_tag: Option<String>,
    /// Pattern the name tag must match (e.g. '*apache*')
    #[arg(long)]
    pub name_filter: Option<String>,
    /// Pattern the group tag must match (e.g. 'stage*')
    #[arg(long)]
    pub group_filter: Option<String>,
    /// Inventory file to write [default: ec2.ini]
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// AWS profile
    #[arg(long)]
    pub profile: Option<String>,
    /// AWS region
    #[arg(long)]
    pub region: Option<String>,
    /// EC2 endpoint, e.g. https://ec2.eu-west-1.amazonaws.com/
    #[arg(long)]
    pub endpoint: Option<String>,
    /// Config file [default: ~/.config/ec2-inventory/ec2-inventory.config.json]
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Print the inventory to stdout instead of writing it
    #[arg(long, default_value_t)]
    pub print: bool,
    /// Verbose
    #[arg(short, long, default_value_t)]
    pub verbose: bool,
    /// Print a completion script for the given shell
    #[arg(long, value_enum)]
    pub completions: Option<Shell>,
}

/// Tag keys and the provider-side patterns they must match.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TagFilters {
    pub name_tag: String,
    pub group_tag: String,
    pub name_filter: String,
    pub group_filter: String,
}

impl Default for TagFilters {
    fn default() -> Self {
        Self {
            name_tag: "Name".into(),
            group_tag: "Environment".into(),
            name_filter: "*apache*".into(),
            group_filter: "stage*".into(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    #[serde(flatten)]
    pub tags: TagFilters,
    pub output: PathBuf,
    pub profile: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tags: TagFilters::default(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            profile: None,
            region: None,
            endpoint: None,
        }
    }
}

impl Config {
    pub fn user_dirs() -> Result<UserDirs> {
        UserDirs::new().ok_or_else(|| eyre!("can't get user dirs"))
    }

    pub fn home_dir() -> Result<PathBuf> {
        Ok(Self::user_dirs()?.home_dir().to_owned())
    }

    pub fn config_dir() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join(".config").join("ec2-inventory"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Loads the config file (if any) and applies command line overrides on top.
    pub fn load(args: &Args) -> Result<Config> {
        let config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => match Self::config_path() {
                Ok(path) if path.exists() => Self::from_file(&path)?,
                _ => Config::default(),
            },
        };
        Ok(config.with_args(args))
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let file = File::open(path).wrap_err_with(|| f!("can't find config: {path:?}"))?;
        serde_json::from_reader(file).wrap_err("Error deserializing config")
    }

    pub fn with_args(mut self, args: &Args) -> Config {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        set(&mut self.tags.name_tag, &args.name_tag);
        set(&mut self.tags.group_tag, &args.group_tag);
        set(&mut self.tags.name_filter, &args.name_filter);
        set(&mut self.tags.group_filter, &args.group_filter);
        set(&mut self.output, &args.output);
        if args.profile.is_some() {
            self.profile = args.profile.clone();
        }
        if args.region.is_some() {
            self.region = args.region.clone();
        }
        if args.endpoint.is_some() {
            self.endpoint = args.endpoint.clone();
        }
        self
    }
}
