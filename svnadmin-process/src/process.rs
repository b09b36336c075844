//! Spawns and drives `svnadmin create`/`load`, generalizing the teacher's
//! `Process` (which manages `git fast-import`) from a git-fast-import
//! pipeline to an `svnadmin load` pipeline. Simplified to synchronous I/O:
//! the pass manager is single-threaded (§5), so there is no tokio runtime to
//! hand the child process's pipes to. Stdout/stderr are drained on plain
//! `std::thread`s instead of async tasks.

use std::{
    ffi::OsString,
    io::{BufRead, BufReader},
    path::Path,
    process::{Child, ChildStdin, Command, Stdio},
    thread::{self, JoinHandle},
};

use structopt::StructOpt;
use svn_dump::{DumpfileDelegate, Node, NodeKind, OutputDelegate, RevProps};

use crate::error::{Error, Result};

#[derive(Clone, Debug, StructOpt)]
pub struct Opt {
    #[structopt(
        long = "--svnadmin",
        default_value = "svnadmin",
        help = "path to the svnadmin command"
    )]
    pub svnadmin_command: OsString,

    #[structopt(
        long,
        help = "pass --bdb-txn-nosync to svnadmin create (BDB repositories only)"
    )]
    pub bdb_txn_nosync: bool,
}

/// Drives a live `svnadmin` repository: creates it if it doesn't exist, then
/// spawns `svnadmin load` once and streams every revision's dump nodes to
/// its stdin for the lifetime of the run.
pub struct SvnadminProcess {
    child: Child,
    delegate: DumpfileDelegate<ChildStdin>,
    stdout_log: JoinHandle<()>,
    stderr_log: JoinHandle<()>,
}

impl SvnadminProcess {
    pub fn new(opt: &Opt, repo_path: &Path) -> Result<Self> {
        if !repo_path.join("format").exists() {
            create(opt, repo_path)?;
        }

        let mut child = Command::new(&opt.svnadmin_command)
            .arg("load")
            .arg("--quiet")
            .arg(repo_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Spawn("svnadmin load", e))?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let stdout_log = thread::spawn(move || log_pipe(stdout, log::Level::Debug));
        let stderr_log = thread::spawn(move || log_pipe(stderr, log::Level::Warn));

        Ok(Self {
            child,
            delegate: DumpfileDelegate::new(stdin)?,
            stdout_log,
            stderr_log,
        })
    }

    /// Closes the load process's stdin and waits for it to exit, reaping the
    /// logging threads. Must be called exactly once, after the last commit.
    pub fn finish(self) -> Result<()> {
        let SvnadminProcess {
            mut child,
            delegate,
            stdout_log,
            stderr_log,
        } = self;

        drop(delegate.into_inner());

        let status = child.wait()?;
        let _ = stdout_log.join();
        let _ = stderr_log.join();

        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(Error::ExitStatus("svnadmin load", code)),
            None => Err(Error::ExitSignal("svnadmin load")),
        }
    }
}

impl OutputDelegate for SvnadminProcess {
    fn start_commit(&mut self, revnum: u64, revprops: &RevProps) -> svn_dump::Result<()> {
        self.delegate.start_commit(revnum, revprops)
    }

    fn mkdir(&mut self, path: &[u8]) -> svn_dump::Result<()> {
        self.delegate.mkdir(path)
    }

    fn add_node(&mut self, node: &Node) -> svn_dump::Result<()> {
        self.delegate.add_node(node)
    }

    fn change_node(&mut self, node: &Node) -> svn_dump::Result<()> {
        self.delegate.change_node(node)
    }

    fn delete_path(&mut self, path: &[u8], kind: NodeKind) -> svn_dump::Result<()> {
        self.delegate.delete_path(path, kind)
    }

    fn end_commit(&mut self) -> svn_dump::Result<()> {
        self.delegate.end_commit()
    }
}

/// Undoes `--bdb-txn-nosync` once the run completes (§6): `svnadmin create`
/// writes `set_flags DB_TXN_NOSYNC` into `db/DB_CONFIG` for a BDB
/// repository, which trades durability for speed during the bulk load.
/// Rewriting the file to drop that line restores normal fsync behavior. A
/// no-op for FSFS repositories, which have no `db/DB_CONFIG`.
pub fn reverse_bdb_txn_nosync(repo_path: &Path) -> Result<()> {
    let config_path = repo_path.join("db").join("DB_CONFIG");
    let contents = match std::fs::read_to_string(&config_path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::Io(e)),
    };

    let rewritten: String = contents
        .lines()
        .filter(|line| line.trim() != "set_flags DB_TXN_NOSYNC")
        .map(|line| format!("{}\n", line))
        .collect();

    if rewritten != contents {
        std::fs::write(&config_path, rewritten)?;
    }
    Ok(())
}

fn create(opt: &Opt, repo_path: &Path) -> Result<()> {
    let mut command = Command::new(&opt.svnadmin_command);
    command.arg("create");
    if opt.bdb_txn_nosync {
        command.arg("--bdb-txn-nosync");
    }
    command.arg(repo_path);

    let status = command.status().map_err(|e| Error::Spawn("svnadmin create", e))?;
    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(Error::ExitStatus("svnadmin create", code)),
        None => Err(Error::ExitSignal("svnadmin create")),
    }
}

fn log_pipe<R: std::io::Read>(reader: R, level: log::Level) {
    for line in BufReader::new(reader).lines().flatten() {
        log::log!(level, "svnadmin: {}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_bdb_txn_nosync_strips_the_flag_line() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("db");
        std::fs::create_dir_all(&db).unwrap();
        std::fs::write(
            db.join("DB_CONFIG"),
            "# comment\nset_flags DB_TXN_NOSYNC\nset_lg_max 1048576\n",
        )
        .unwrap();

        reverse_bdb_txn_nosync(dir.path()).unwrap();

        let contents = std::fs::read_to_string(db.join("DB_CONFIG")).unwrap();
        assert!(!contents.contains("DB_TXN_NOSYNC"));
        assert!(contents.contains("set_lg_max 1048576"));
    }

    #[test]
    fn reverse_bdb_txn_nosync_is_a_noop_without_db_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(reverse_bdb_txn_nosync(dir.path()).is_ok());
    }
}
