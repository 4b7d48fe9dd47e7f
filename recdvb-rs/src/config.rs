//! Configuration loading for recdvb.
//!
//! The adapter list is read from an INI-style file. Adapters are declared
//! with the `isdbt.adapter` key, either inside an `[isdbt]` section or in
//! dotted form, and may be repeated:
//!
//! ```text
//! [isdbt]
//! adapter = /dev/dvb/adapter0
//! adapter = /dev/dvb/adapter1
//! ```
//!
//! The order of declaration is the scan order of the tuner.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use thiserror::Error;

use crate::channels::ChannelTable;

/// Default location of the adapter list.
pub const DEFAULT_ADAPTERS_CONFIG: &str = "/etc/recdvb/adapters.conf";

/// Default location of the channel table.
pub const DEFAULT_CHANNELS_CONFIG: &str = "/etc/recdvb/channels.conf";

const ADAPTER_KEY: &str = "isdbt.adapter";

/// Configuration errors. All of them abort startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("specify at least one adapter (isdbt.adapter) in {}", .0.display())]
    NoAdapters(PathBuf),
}

/// Ordered list of adapter path prefixes, e.g. `/dev/dvb/adapter0`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterList(Vec<String>);

impl AdapterList {
    pub fn new(adapters: Vec<String>) -> Self {
        Self(adapters)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for AdapterList {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Load the adapter list, failing when none is declared.
pub fn load_adapters(path: &Path) -> Result<AdapterList, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let adapters = parse_adapters(&content);
    if adapters.is_empty() {
        return Err(ConfigError::NoAdapters(path.to_path_buf()));
    }
    debug!("Loaded {} adapter(s) from {}", adapters.len(), path.display());
    Ok(adapters)
}

/// Load the channel table.
pub fn load_channels(path: &Path) -> Result<ChannelTable, ConfigError> {
    let table = ChannelTable::load(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if table.is_empty() {
        warn!("No valid channel in {}", path.display());
    }
    Ok(table)
}

/// Collect every `isdbt.adapter` value, in order of appearance.
pub fn parse_adapters(content: &str) -> AdapterList {
    let mut adapters = Vec::new();
    let mut section = String::new();

    for line in content.lines() {
        let line = strip_comment(line).trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            section = line[1..line.len() - 1].trim().to_string();
            continue;
        }

        let eq_pos = match line.find('=') {
            Some(pos) => pos,
            None => {
                warn!("Ignoring malformed config line: {}", line);
                continue;
            }
        };
        let key = line[..eq_pos].trim();
        let value = line[eq_pos + 1..].trim();

        let full_key = if section.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", section, key)
        };

        if full_key == ADAPTER_KEY {
            if value.is_empty() {
                warn!("Ignoring empty adapter entry");
            } else {
                adapters.push(value.to_string());
            }
        } else {
            warn!("Ignoring unknown option {}", full_key);
        }
    }

    AdapterList(adapters)
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}
