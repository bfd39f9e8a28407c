//! Typed builders for the tools the orchestrators drive
//!
//! Flags and tool choice here are the contract with the hosts the commands
//! run on; every builder returns an argument vector, never a shell string.

use std::path::{Path, PathBuf};

use crate::config::settings::{DatabaseSettings, SourceDir};
use crate::exec::CommandSpec;

/// `path` with a trailing slash, so symlinks to directories are followed
fn dir_arg(path: &Path) -> String {
    let s = path.to_string_lossy();
    if s.ends_with('/') {
        s.to_string()
    } else {
        format!("{}/", s)
    }
}

/// `ls -A path/`: succeeds only if `path` is a listable directory
pub fn list_all(path: &Path) -> CommandSpec {
    CommandSpec::new("ls").arg("-A").arg(dir_arg(path))
}

/// `ls -1Ap path/`: one entry per line, directories marked with `/`
pub fn list_entries(path: &Path) -> CommandSpec {
    CommandSpec::new("ls").arg("-1Ap").arg(dir_arg(path))
}

pub fn is_regular_file(path: &Path) -> CommandSpec {
    CommandSpec::new("test").arg("-f").path_arg(path)
}

pub fn disk_usage_bytes(path: &Path) -> CommandSpec {
    CommandSpec::new("du").args(["-s", "--bytes"]).path_arg(path)
}

pub fn disk_usage_human(path: &Path) -> CommandSpec {
    CommandSpec::new("du").arg("-sh").path_arg(path)
}

pub fn make_dir(path: &Path) -> CommandSpec {
    CommandSpec::new("mkdir").arg("-p").path_arg(path)
}

/// `rm -rf path`; on a symlink this removes the link, not its target
pub fn remove_tree(path: &Path) -> CommandSpec {
    CommandSpec::new("rm").arg("-rf").path_arg(path)
}

pub fn symlink(target: &Path, link: &Path) -> CommandSpec {
    CommandSpec::new("ln").arg("-s").path_arg(target).path_arg(link)
}

/// Quote a MySQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn mysql_client(program: &str, db: &DatabaseSettings) -> CommandSpec {
    let spec = CommandSpec::new(program).args(["-h", db.host.as_str(), "-u", db.user.as_str()]);
    if db.password.is_empty() {
        spec
    } else {
        spec.env("MYSQL_PWD", db.password.clone())
    }
}

/// Consistent single-transaction dump written to `output`
pub fn dump_database(db: &DatabaseSettings, output: &Path) -> CommandSpec {
    mysql_client("mysqldump", db)
        .args(["--single-transaction", "--column-statistics=0"])
        .arg(&db.name)
        .stdout_file(output)
}

pub fn drop_database(db: &DatabaseSettings) -> CommandSpec {
    mysql_client("mysql", db)
        .arg("-e")
        .arg(format!("DROP DATABASE {}", quote_ident(&db.name)))
}

pub fn create_database(db: &DatabaseSettings) -> CommandSpec {
    mysql_client("mysql", db)
        .arg("-e")
        .arg(format!("CREATE DATABASE {}", quote_ident(&db.name)))
}

pub fn load_database(db: &DatabaseSettings, input: &Path) -> CommandSpec {
    mysql_client("mysql", db).arg(&db.name).stdin_file(input)
}

/// Archive copy of `source` into `target`, hard-linking files unchanged
/// since `link_dest` when given
pub fn capture_tree(
    source: &Path,
    target: &Path,
    link_dest: Option<&Path>,
    excludes: &[String],
) -> CommandSpec {
    let mut spec = CommandSpec::new("rsync").arg("-az");
    for pattern in excludes {
        spec = spec.arg("--exclude").arg(pattern);
    }
    spec = spec.arg(dir_arg(source));
    if let Some(base) = link_dest {
        spec = spec.arg("--link-dest").path_arg(base);
    }
    spec.path_arg(target)
}

/// Exact mirror of `snapshot_tree` onto `live`, deleting extra files
pub fn mirror_tree(snapshot_tree: &Path, live: &Path, excludes: &[String]) -> CommandSpec {
    let mut spec = CommandSpec::new("rsync").args(["-az", "--delete"]);
    for pattern in excludes {
        spec = spec.arg("--exclude").arg(pattern);
    }
    spec.arg(dir_arg(snapshot_tree)).path_arg(live)
}

/// Anchored rsync excludes for managed trees nested inside `sources[index]`
pub fn nested_excludes(sources: &[SourceDir], index: usize) -> Vec<String> {
    let Some(outer) = sources.get(index) else {
        return Vec::new();
    };
    sources
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .filter_map(|(_, inner)| inner.path.strip_prefix(&outer.path).ok())
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(|rel| format!("/{}", rel.to_string_lossy()))
        .collect()
}

/// Path of the previous capture of `tag` under the `latest` pointer
pub fn link_base(latest: &Path, tag: &str) -> PathBuf {
    latest.join(tag)
}
