use crate::prelude::*;
use std::fs::{self, File, Permissions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

pub const HEADER: &str = "# Generated Ansible inventory";
pub const DEFAULT_GROUP: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub name: String,
    pub public_address: String,
    pub group: String,
}

impl InstanceRecord {
    pub fn group_name(&self) -> &str {
        if self.group.is_empty() {
            DEFAULT_GROUP
        } else {
            &self.group
        }
    }
}

/// Groups records by group name, keeping first-seen group order and the
/// original order of records inside each group.
pub fn group_records(records: &[InstanceRecord]) -> Vec<(&str, Vec<&InstanceRecord>)> {
    let mut groups: Vec<(&str, Vec<&InstanceRecord>)> = Vec::new();
    for record in records {
        let name = record.group_name();
        match groups.iter_mut().find(|(group, _)| *group == name) {
            Some((_, hosts)) => hosts.push(record),
            None => groups.push((name, vec![record])),
        }
    }
    groups
}

pub fn render(records: &[InstanceRecord], out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "{HEADER}")?;
    writeln!(out)?;
    for (group, hosts) in group_records(records) {
        writeln!(out, "[{group}]")?;
        for host in hosts {
            writeln!(out, "{} ansible_host={}", host.name, host.public_address)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Replaces `path` with the rendered inventory.
///
/// The content is written to a temporary file next to the resolved target and
/// renamed over it, so readers never observe a half written inventory. A
/// symlinked `path` is written through to its target. An existing target keeps
/// its permissions and a read-only one is refused.
pub fn write_inventory(records: &[InstanceRecord], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let target = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let existing = fs::metadata(&target).ok();
    if existing.as_ref().map_or(false, |meta| meta.permissions().readonly()) {
        bail!("permission denied: {target:?} is read-only");
    }
    let dir = match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir).wrap_err_with(|| f!("can't create temp file in {dir:?}"))?;
    let permissions = match existing {
        Some(meta) => meta.permissions(),
        None => new_file_permissions(tmp.as_file())?,
    };
    tmp.as_file().set_permissions(permissions)?;
    let mut writer = BufWriter::new(tmp);
    render(records, &mut writer)?;
    let tmp = writer.into_inner().map_err(|err| err.into_error())?;
    tmp.as_file().sync_all()?;
    tmp.persist(&target).map_err(|err| err.error).wrap_err_with(|| f!("can't replace {path:?}"))?;
    Ok(())
}

/// Mode of a freshly created inventory, the same a plain `File::create` gets
/// under the usual 022 umask.
#[cfg(unix)]
fn new_file_permissions(_: &File) -> std::io::Result<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Ok(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions(file: &File) -> std::io::Result<Permissions> {
    Ok(file.metadata()?.permissions())
}
