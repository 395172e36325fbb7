//! Artifact producers: turn a database and its filestore into a byte stream

pub mod mock;
pub mod pg_dump;

use crate::config::BackupScope;
use crate::utils::StreamingProcess;
use anyhow::Result;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

pub use pg_dump::PgDumpProducer;

/// Output format of a dump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DumpFormat {
    /// Zip archive with dump.sql, manifest.json and the filestore
    #[default]
    Zip,
    /// pg_dump custom format streamed straight from the process
    Raw,
}

impl fmt::Display for DumpFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpFormat::Zip => f.write_str("zip"),
            DumpFormat::Raw => f.write_str("raw"),
        }
    }
}

enum Source {
    /// Anonymous temporary file, removed when closed
    File(File),
    Process(Box<dyn StreamingProcess>),
    Memory(Cursor<Vec<u8>>),
    Reader(Box<dyn Read>),
}

/// A produced backup, read once by the transfer engine
pub struct Artifact {
    source: Source,
    size: Option<u64>,
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact").field("size", &self.size).finish_non_exhaustive()
    }
}

impl Artifact {
    /// Wrap a finished temporary file, rewinding it to the start
    pub fn from_file(mut file: File) -> io::Result<Self> {
        file.seek(SeekFrom::Start(0))?;
        let size = file.metadata()?.len();
        Ok(Self {
            source: Source::File(file),
            size: Some(size),
        })
    }

    /// Stream the stdout of a running process; its size is unknown
    pub fn from_process(process: Box<dyn StreamingProcess>) -> Self {
        Self {
            source: Source::Process(process),
            size: None,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        Self {
            source: Source::Memory(Cursor::new(bytes)),
            size: Some(size),
        }
    }

    /// Wrap any byte stream of unknown size
    pub fn from_reader(reader: Box<dyn Read>) -> Self {
        Self {
            source: Source::Reader(reader),
            size: None,
        }
    }

    pub fn size_hint(&self) -> Option<u64> {
        self.size
    }

    /// Release the artifact; for streamed dumps this waits for the process and
    /// reports a failed exit.
    pub fn finish(self) -> Result<()> {
        match self.source {
            Source::Process(process) => process.wait(),
            Source::File(_) | Source::Memory(_) | Source::Reader(_) => Ok(()),
        }
    }
}

impl Read for Artifact {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.source {
            Source::File(file) => file.read(buf),
            Source::Process(process) => process.read(buf),
            Source::Memory(cursor) => cursor.read(buf),
            Source::Reader(reader) => reader.read(buf),
        }
    }
}

/// Trait for artifact producers
pub trait ArtifactProducer {
    /// Dump `source` (a database name) according to `scope`
    fn produce(&self, source: &str, scope: BackupScope, format: DumpFormat) -> Result<Artifact>;

    /// Databases the producer can see
    fn list_databases(&self) -> Result<Vec<String>>;

    /// Get producer name (for logging)
    fn name(&self) -> &'static str;
}
