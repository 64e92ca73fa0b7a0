use crate::error::{HarvestError, Result};
use crate::processors::record_transformer::{canonical_header, ProcessedBlock};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One shared CSV file that every station appends its block to.
///
/// Each append writes the whole block and flushes while holding the lock, so
/// blocks from concurrent stations never interleave. A block whose write
/// fails is cut back off the file, so no partial row is left behind.
#[derive(Debug)]
pub struct SharedFileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl SharedFileSink {
    /// Create or truncate `path` and write the canonical header line.
    pub async fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await?;
        file.write_all(canonical_header().as_bytes()).await?;
        file.flush().await?;

        info!("Writing consolidated output to {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, station: &str, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        let failed = |source: io::Error| HarvestError::StationWriteFailed {
            station: station.to_string(),
            source,
        };

        let mut file = self.file.lock().await;
        let start = file.stream_position().await.map_err(failed)?;

        let written = match file.write_all(bytes).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(rollback) = truncate_to(&mut file, start).await {
                warn!(station = %station, "Could not discard partial block: {}", rollback);
            }
            return Err(failed(e));
        }
        Ok(())
    }
}

/// Cut `file` back to `len` bytes and continue writing from there.
async fn truncate_to(file: &mut File, len: u64) -> io::Result<()> {
    file.set_len(len).await?;
    file.seek(SeekFrom::Start(len)).await?;
    Ok(())
}

/// A directory holding one `<station>.csv` per station.
#[derive(Debug, Clone)]
pub struct StationDirectorySink {
    dir: PathBuf,
}

impl StationDirectorySink {
    pub async fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).await?;
        info!("Writing per-station output to {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn station_path(&self, station: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", station))
    }

    /// Write the station's file via a `.part` sibling and rename it into place.
    pub async fn write(&self, station: &str, bytes: &[u8]) -> Result<PathBuf> {
        let failed = |source: io::Error| HarvestError::StationWriteFailed {
            station: station.to_string(),
            source,
        };

        if station.is_empty() || station.contains(['/', '\\']) || station.contains("..") {
            return Err(failed(io::Error::new(
                io::ErrorKind::InvalidInput,
                "station identifier is not a valid file name",
            )));
        }

        let target = self.station_path(station);
        let partial = self.dir.join(format!("{}.csv.part", station));

        fs::write(&partial, bytes).await.map_err(failed)?;
        fs::rename(&partial, &target).await.map_err(failed)?;
        debug!(station = %station, "Wrote {}", target.display());

        Ok(target)
    }
}

/// Destination for transformed station blocks.
#[derive(Debug)]
pub enum OutputSink {
    Shared(SharedFileSink),
    PerStation(StationDirectorySink),
}

impl OutputSink {
    pub async fn shared(path: &Path) -> Result<Self> {
        Ok(OutputSink::Shared(SharedFileSink::create(path).await?))
    }

    pub async fn per_station(dir: &Path) -> Result<Self> {
        Ok(OutputSink::PerStation(StationDirectorySink::create(dir).await?))
    }

    /// Whether each station's canonical block should carry its own header line.
    pub fn wants_station_header(&self) -> bool {
        matches!(self, OutputSink::PerStation(_))
    }

    pub fn location(&self) -> &Path {
        match self {
            OutputSink::Shared(sink) => sink.path(),
            OutputSink::PerStation(sink) => sink.dir(),
        }
    }

    pub async fn write_station(&self, station: &str, block: &ProcessedBlock) -> Result<()> {
        match self {
            OutputSink::Shared(sink) => sink.append(station, &block.bytes).await,
            OutputSink::PerStation(sink) => {
                if block.bytes.is_empty() {
                    return Ok(());
                }
                sink.write(station, &block.bytes).await.map(|_| ())
            }
        }
    }
}
