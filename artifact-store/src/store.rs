//! The artifact store itself: a directory of named, pass-scoped artifact
//! files, plus the bookkeeping that lets a pass declare its reads and writes
//! up front and have undeclared access rejected as a programmer error.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error::{Error, Result},
    index::{Index, IndexedWriter},
    record::{RecordReader, RecordWriter},
};

/// Whether an artifact survives to the end of the pipeline or may be deleted
/// once every pass that declared a read of it has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Temporary,
    Permanent,
}

/// A reference to an artifact produced by an earlier (or the same) pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactRef {
    pub producer: String,
    pub name: String,
}

impl ArtifactRef {
    pub fn new(producer: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            name: name.into(),
        }
    }
}

/// What a pass declares it will write.
#[derive(Debug, Clone)]
pub struct WriteDecl {
    pub name: String,
    pub kind: Kind,
    pub schema_version: u32,
    pub indexed: bool,
}

impl WriteDecl {
    pub fn new(name: impl Into<String>, kind: Kind, schema_version: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            schema_version,
            indexed: false,
        }
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
}

/// The full declaration of one pass's artifact usage.
#[derive(Debug, Clone, Default)]
pub struct PassDecl {
    pub name: String,
    pub reads: Vec<ArtifactRef>,
    pub writes: Vec<WriteDecl>,
}

impl PassDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    pub fn reads(mut self, refs: impl IntoIterator<Item = ArtifactRef>) -> Self {
        self.reads.extend(refs);
        self
    }

    pub fn writes(mut self, decls: impl IntoIterator<Item = WriteDecl>) -> Self {
        self.writes.extend(decls);
        self
    }
}

/// A whole pipeline's worth of pass declarations, validated so that every
/// read refers to an artifact written by a strictly earlier pass.
#[derive(Debug, Clone)]
pub struct Plan {
    passes: Vec<PassDecl>,
}

impl Plan {
    pub fn new(passes: Vec<PassDecl>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        let mut written_by = HashMap::new();

        for (idx, pass) in passes.iter().enumerate() {
            if !seen.insert(pass.name.clone()) {
                return Err(Error::DuplicatePass(pass.name.clone()));
            }

            for r in &pass.reads {
                match written_by.get(&(r.producer.clone(), r.name.clone())) {
                    Some(&written_idx) if written_idx < idx => {}
                    _ => {
                        return Err(Error::ReadBeforeWrite {
                            reader: pass.name.clone(),
                            producer: r.producer.clone(),
                            name: r.name.clone(),
                        })
                    }
                }
            }

            for w in &pass.writes {
                written_by.insert((pass.name.clone(), w.name.clone()), idx);
            }
        }

        Ok(Self { passes })
    }

    pub fn passes(&self) -> &[PassDecl] {
        &self.passes
    }

    /// How many later (or the same) passes declared a read of this artifact.
    /// Used to know when a temporary artifact may be deleted.
    fn remaining_consumers(&self, producer: &str, name: &str) -> usize {
        self.passes
            .iter()
            .flat_map(|p| p.reads.iter())
            .filter(|r| r.producer == producer && r.name == name)
            .count()
    }
}

pub struct Store {
    dir: PathBuf,
    plan: Plan,
    writes: HashMap<(String, String), WriteDecl>,
    remaining: HashMap<(String, String), usize>,
}

impl Store {
    pub fn open(dir: impl Into<PathBuf>, plan: Plan) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut writes = HashMap::new();
        let mut remaining = HashMap::new();
        for pass in plan.passes() {
            for w in &pass.writes {
                let key = (pass.name.clone(), w.name.clone());
                remaining.insert(key.clone(), plan.remaining_consumers(&pass.name, &w.name));
                writes.insert(key, w.clone());
            }
        }

        Ok(Self {
            dir,
            plan,
            writes,
            remaining,
        })
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    fn path(&self, producer: &str, name: &str) -> PathBuf {
        self.dir.join(format!("{}-{}.dat", producer, name))
    }

    fn write_decl(&self, producer: &str, name: &str) -> Result<&WriteDecl> {
        self.writes
            .get(&(producer.to_string(), name.to_string()))
            .ok_or_else(|| Error::UndeclaredWrite {
                pass: producer.to_string(),
                name: name.to_string(),
            })
    }

    fn check_read(&self, reading_pass: &str, artifact: &ArtifactRef) -> Result<()> {
        let declared = self
            .plan
            .passes()
            .iter()
            .find(|p| p.name == reading_pass)
            .map(|p| p.reads.contains(artifact))
            .unwrap_or(false);

        if declared {
            Ok(())
        } else {
            Err(Error::UndeclaredRead {
                pass: reading_pass.to_string(),
                producer: artifact.producer.clone(),
                name: artifact.name.clone(),
            })
        }
    }

    /// Opens a plain (non-indexed) writer for an artifact `producer` declared
    /// it would write.
    pub fn writer<T>(&self, producer: &str, name: &str) -> Result<RecordWriter<T>>
    where
        T: Serialize,
    {
        let decl = self.write_decl(producer, name)?;
        RecordWriter::create(&self.path(producer, name), decl.schema_version)
    }

    /// Opens an indexed writer; `producer` must have declared this write with
    /// [`WriteDecl::indexed`].
    pub fn indexed_writer<K, T>(&self, producer: &str, name: &str) -> Result<IndexedWriter<K, T>>
    where
        K: Ord + Serialize + DeserializeOwned + Clone,
        T: Serialize,
    {
        let decl = self.write_decl(producer, name)?;
        if !decl.indexed {
            return Err(Error::NotIndexed {
                pass: producer.to_string(),
                name: name.to_string(),
            });
        }
        IndexedWriter::create(&self.path(producer, name), decl.schema_version)
    }

    /// Opens a forward reader over an artifact. `reading_pass` must have
    /// declared a read of `artifact` in the pipeline plan.
    pub fn reader<T>(&self, reading_pass: &str, artifact: &ArtifactRef) -> Result<RecordReader<T>>
    where
        T: DeserializeOwned,
    {
        self.check_read(reading_pass, artifact)?;
        let decl = self.write_decl(&artifact.producer, &artifact.name)?;
        RecordReader::open(
            &self.path(&artifact.producer, &artifact.name),
            &artifact.producer,
            &artifact.name,
            decl.schema_version,
        )
    }

    /// Loads (or rebuilds) the index for an indexed artifact, for random
    /// access by primary key.
    pub fn index<K, T, F>(
        &self,
        reading_pass: &str,
        artifact: &ArtifactRef,
        key_of: F,
    ) -> Result<Index<K>>
    where
        K: Ord + Serialize + DeserializeOwned + Clone,
        T: DeserializeOwned,
        F: Fn(&T) -> K,
    {
        self.check_read(reading_pass, artifact)?;
        let decl = self.write_decl(&artifact.producer, &artifact.name)?;
        let path = self.path(&artifact.producer, &artifact.name);
        Index::load_or_rebuild::<T, F>(
            &path,
            &artifact.producer,
            &artifact.name,
            decl.schema_version,
            key_of,
        )
    }

    /// Returns a reader positioned to decode the record at `offset` (as
    /// returned by an indexed write), without iterating from the start.
    pub fn reader_at<T>(
        &self,
        reading_pass: &str,
        artifact: &ArtifactRef,
        offset: u64,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let mut reader = self.reader::<T>(reading_pass, artifact)?;
        reader.read_at(offset)
    }

    /// Call once a pass has finished. Any temporary artifact whose declared
    /// consumers (including passes earlier in the plan that already ran) have
    /// all completed their read is deleted from disk.
    pub fn complete_pass(&mut self, pass_name: &str) -> Result<()> {
        let pass = self
            .plan
            .passes()
            .iter()
            .find(|p| p.name == pass_name)
            .cloned()
            .ok_or_else(|| Error::UndeclaredWrite {
                pass: pass_name.to_string(),
                name: String::new(),
            })?;

        for artifact in &pass.reads {
            let key = (artifact.producer.clone(), artifact.name.clone());
            if let Some(count) = self.remaining.get_mut(&key) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    if let Some(decl) = self.writes.get(&key) {
                        if decl.kind == Kind::Temporary {
                            self.delete_artifact(&key.0, &key.1)?;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn delete_artifact(&self, producer: &str, name: &str) -> Result<()> {
        let path = self.path(producer, name);
        if path.exists() {
            log::trace!("removing temporary artifact {}/{}", producer, name);
            std::fs::remove_file(&path)?;
        }
        let sidecar = crate::index::sidecar_path(&path);
        if sidecar.exists() {
            std::fs::remove_file(&sidecar)?;
        }
        Ok(())
    }
}

pub fn artifact_path(dir: &Path, producer: &str, name: &str) -> PathBuf {
    dir.join(format!("{}-{}.dat", producer, name))
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use tempfile::tempdir;

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
    struct Widget {
        id: u64,
        label: String,
    }

    fn plan() -> Plan {
        Plan::new(vec![
            PassDecl::new("ingest").writes(vec![WriteDecl::new("widgets", Kind::Temporary, 1)]),
            PassDecl::new("summarize")
                .reads(vec![ArtifactRef::new("ingest", "widgets")])
                .writes(vec![WriteDecl::new("summary", Kind::Permanent, 1)]),
        ])
        .unwrap()
    }

    #[test]
    fn round_trips_through_two_passes() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path(), plan()).unwrap();

        let mut writer = store.writer::<Widget>("ingest", "widgets").unwrap();
        writer
            .append(&Widget {
                id: 1,
                label: "a".into(),
            })
            .unwrap();
        writer.finish().unwrap();
        store.complete_pass("ingest").unwrap();

        let widgets: Vec<Widget> = store
            .reader::<Widget>("summarize", &ArtifactRef::new("ingest", "widgets"))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(widgets.len(), 1);

        store.complete_pass("summarize").unwrap();
        assert!(!dir.path().join("ingest-widgets.dat").exists());
    }

    #[test]
    fn rejects_undeclared_read() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path(), plan()).unwrap();

        let err = store
            .reader::<Widget>("ingest", &ArtifactRef::new("ingest", "widgets"))
            .unwrap_err();
        assert!(matches!(err, Error::UndeclaredRead { .. }));
    }

    #[test]
    fn rejects_read_before_write_in_plan() {
        let bad = Plan::new(vec![PassDecl::new("only").reads(vec![ArtifactRef::new(
            "nobody", "nothing",
        )])]);
        assert!(matches!(bad, Err(Error::ReadBeforeWrite { .. })));
    }
}
