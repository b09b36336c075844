//! Length-prefixed, header-framed record files.
//!
//! Every artifact file starts with a fixed 16-byte header: a 4-byte magic
//! value, a 4-byte little-endian schema version, and 8 reserved bytes (kept
//! for future use, e.g. a record count or flags, without changing the header
//! size). Records themselves are `bincode`-encoded and length-prefixed with a
//! 4-byte little-endian length, so a reader can always skip a record it
//! doesn't understand without decoding it.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    marker::PhantomData,
    path::Path,
};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};

const MAGIC: [u8; 4] = *b"CSA1";
const HEADER_LEN: u64 = 16;

fn write_header<W: Write>(w: &mut W, schema_version: u32) -> io::Result<()> {
    w.write_all(&MAGIC)?;
    w.write_all(&schema_version.to_le_bytes())?;
    w.write_all(&[0u8; 8])
}

fn read_header<R: Read>(r: &mut R) -> Result<u32> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(Error::BadMagic {
            pass: String::new(),
            name: String::new(),
        });
    }

    let mut version = [0u8; 4];
    r.read_exact(&mut version)?;

    let mut reserved = [0u8; 8];
    r.read_exact(&mut reserved)?;

    Ok(u32::from_le_bytes(version))
}

/// Appends homogeneous records of type `T` to a single artifact file.
pub struct RecordWriter<T> {
    writer: BufWriter<File>,
    offset: u64,
    _marker: PhantomData<T>,
}

impl<T> RecordWriter<T>
where
    T: Serialize,
{
    pub(crate) fn create(path: &Path, schema_version: u32) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        write_header(&mut file, schema_version)?;

        Ok(Self {
            writer: BufWriter::new(file),
            offset: HEADER_LEN,
            _marker: PhantomData,
        })
    }

    /// Appends a record, returning the byte offset it was written at. This
    /// offset is only useful to callers building an index artifact.
    pub fn append(&mut self, record: &T) -> Result<u64> {
        let bytes = bincode::serialize(record)?;
        let offset = self.offset;

        self.writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
        self.writer.write_all(&bytes)?;

        self.offset += 4 + bytes.len() as u64;
        Ok(offset)
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// A forward iterator over the records of an artifact file.
pub struct RecordReader<T> {
    reader: BufReader<File>,
    pass: String,
    name: String,
    _marker: PhantomData<T>,
}

impl<T> RecordReader<T>
where
    T: DeserializeOwned,
{
    pub(crate) fn open(path: &Path, pass: &str, name: &str, expected_version: u32) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let found = read_header(&mut reader).map_err(|e| match e {
            Error::BadMagic { .. } => Error::BadMagic {
                pass: pass.to_string(),
                name: name.to_string(),
            },
            other => other,
        })?;
        if found != expected_version {
            return Err(Error::SchemaMismatch {
                pass: pass.to_string(),
                name: name.to_string(),
                expected: expected_version,
                found,
            });
        }

        Ok(Self {
            reader,
            pass: pass.to_string(),
            name: name.to_string(),
            _marker: PhantomData,
        })
    }

    /// Seeks directly to a byte offset (as previously returned by
    /// [`RecordWriter::append`]) and decodes exactly one record there,
    /// without disturbing the reader's forward iteration position.
    pub fn read_at(&mut self, offset: u64) -> Result<T> {
        let saved = self.reader.stream_position()?;
        self.reader.seek(SeekFrom::Start(offset))?;
        let record = self.read_one()?.ok_or_else(|| Error::BadMagic {
            pass: self.pass.clone(),
            name: self.name.clone(),
        })?;
        self.reader.seek(SeekFrom::Start(saved))?;
        Ok(record)
    }

    fn read_one(&mut self) -> Result<Option<T>> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;

        Ok(Some(bincode::deserialize(&buf)?))
    }
}

impl<T> Iterator for RecordReader<T>
where
    T: DeserializeOwned,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_one().transpose()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use tempfile::tempdir;

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Rec {
        id: u64,
        name: String,
    }

    #[test]
    fn round_trips_records_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dat");

        let mut writer = RecordWriter::<Rec>::create(&path, 1).unwrap();
        let offsets: Vec<u64> = (0..5)
            .map(|i| {
                writer
                    .append(&Rec {
                        id: i,
                        name: format!("rec-{}", i),
                    })
                    .unwrap()
            })
            .collect();
        writer.finish().unwrap();

        let reader = RecordReader::<Rec>::open(&path, "pass", "artifact", 1).unwrap();
        let got: Vec<Rec> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(
            got,
            (0..5)
                .map(|i| Rec {
                    id: i,
                    name: format!("rec-{}", i)
                })
                .collect::<Vec<_>>()
        );

        let mut reader = RecordReader::<Rec>::open(&path, "pass", "artifact", 1).unwrap();
        let third = reader.read_at(offsets[3]).unwrap();
        assert_eq!(
            third,
            Rec {
                id: 3,
                name: "rec-3".into()
            }
        );
    }

    #[test]
    fn rejects_schema_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dat");

        RecordWriter::<Rec>::create(&path, 2)
            .unwrap()
            .finish()
            .unwrap();

        let err = RecordReader::<Rec>::open(&path, "pass", "artifact", 1).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));
    }
}
