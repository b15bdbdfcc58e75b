//! The geoprocessing collaborator injected into every pipeline stage.
//!
//! Stages never touch the filesystem directly. They read and write
//! datasets through a [`Geoprocessor`], which the caller constructs and
//! owns. [`FileGeoprocessor`] works against real files;
//! [`MemoryGeoprocessor`] keeps datasets in memory for tests and dry runs.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use urban_index_layer_models::{Layer, Table};

use crate::{LayerError, csv_table, geojson_layer};

/// Reads and writes vector layers and attribute tables.
pub trait Geoprocessor {
    /// Reads the vector layer at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] if the dataset is missing, unreadable, or of
    /// an unsupported format.
    fn read_layer(&self, path: &Path) -> Result<Layer, LayerError>;

    /// Writes `layer` to `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] if the dataset cannot be written.
    fn write_layer(&self, layer: &Layer, path: &Path) -> Result<(), LayerError>;

    /// Reads the attribute table at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] if the dataset is missing, unreadable, or of
    /// an unsupported format.
    fn read_table(&self, path: &Path) -> Result<Table, LayerError>;

    /// Writes `table` to `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] if the dataset cannot be written.
    fn write_table(&self, table: &Table, path: &Path) -> Result<(), LayerError>;
}

/// On-disk dataset formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    GeoJson,
    Csv,
}

impl Format {
    fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "geojson" | "json" => Some(Self::GeoJson),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

/// A [`Geoprocessor`] backed by the filesystem.
///
/// Layers are `GeoJSON` (`.geojson`, `.json`), tables are CSV (`.csv`).
/// A `GeoJSON` file can also be read as a table, in which case its
/// geometries are ignored.
#[derive(Debug, Clone, Copy)]
pub struct FileGeoprocessor {
    overwrite: bool,
}

impl Default for FileGeoprocessor {
    fn default() -> Self {
        Self { overwrite: true }
    }
}

impl FileGeoprocessor {
    /// Creates a file geoprocessor. When `overwrite` is false, writing to
    /// an existing path fails with [`LayerError::OutputExists`].
    #[must_use]
    pub const fn new(overwrite: bool) -> Self {
        Self { overwrite }
    }

    fn open(path: &Path) -> Result<File, LayerError> {
        File::open(path).map_err(|source| io_error(path, source))
    }

    fn create(&self, path: &Path) -> Result<File, LayerError> {
        if !self.overwrite && path.exists() {
            return Err(LayerError::OutputExists {
                path: path.to_path_buf(),
            });
        }
        File::create(path).map_err(|source| io_error(path, source))
    }
}

impl Geoprocessor for FileGeoprocessor {
    fn read_layer(&self, path: &Path) -> Result<Layer, LayerError> {
        if Format::of(path) != Some(Format::GeoJson) {
            return Err(unsupported(path, "a .geojson or .json layer"));
        }
        let text = std::fs::read_to_string(path).map_err(|source| io_error(path, source))?;
        let layer = geojson_layer::parse_layer(&text)?;
        log::info!("Read {} feature(s) from {}", layer.len(), path.display());
        Ok(layer)
    }

    fn write_layer(&self, layer: &Layer, path: &Path) -> Result<(), LayerError> {
        if Format::of(path) != Some(Format::GeoJson) {
            return Err(unsupported(path, "a .geojson or .json layer"));
        }
        let text = geojson_layer::to_geojson_string(layer)?;
        let mut file = BufWriter::new(self.create(path)?);
        std::io::Write::write_all(&mut file, text.as_bytes())
            .and_then(|()| std::io::Write::flush(&mut file))
            .map_err(|source| io_error(path, source))?;
        log::info!("Wrote {} feature(s) to {}", layer.len(), path.display());
        Ok(())
    }

    fn read_table(&self, path: &Path) -> Result<Table, LayerError> {
        let table = match Format::of(path) {
            Some(Format::Csv) => csv_table::read_table(BufReader::new(Self::open(path)?))?,
            Some(Format::GeoJson) => table_from_layer(self.read_layer(path)?),
            None => return Err(unsupported(path, "a .csv table or .geojson layer")),
        };
        log::info!("Read {} row(s) from {}", table.rows.len(), path.display());
        Ok(table)
    }

    fn write_table(&self, table: &Table, path: &Path) -> Result<(), LayerError> {
        if Format::of(path) != Some(Format::Csv) {
            return Err(unsupported(path, "a .csv table"));
        }
        csv_table::write_table(table, BufWriter::new(self.create(path)?))?;
        log::info!("Wrote {} row(s) to {}", table.rows.len(), path.display());
        Ok(())
    }
}

/// A stored dataset in a [`MemoryGeoprocessor`].
#[derive(Debug, Clone)]
enum Dataset {
    Layer(Layer),
    Table(Table),
}

/// A [`Geoprocessor`] that keeps datasets in memory, keyed by path.
///
/// Reading a stored layer as a table yields its attributes.
#[derive(Debug, Default)]
pub struct MemoryGeoprocessor {
    datasets: Mutex<BTreeMap<PathBuf, Dataset>>,
}

impl MemoryGeoprocessor {
    /// Creates an empty in-memory geoprocessor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `layer` at `path`, replacing any existing dataset.
    pub fn insert_layer(&self, path: impl Into<PathBuf>, layer: Layer) {
        self.lock().insert(path.into(), Dataset::Layer(layer));
    }

    /// Stores `table` at `path`, replacing any existing dataset.
    pub fn insert_table(&self, path: impl Into<PathBuf>, table: Table) {
        self.lock().insert(path.into(), Dataset::Table(table));
    }

    /// Returns a copy of the layer stored at `path`.
    #[must_use]
    pub fn layer(&self, path: impl AsRef<Path>) -> Option<Layer> {
        match self.lock().get(path.as_ref()) {
            Some(Dataset::Layer(layer)) => Some(layer.clone()),
            _ => None,
        }
    }

    /// Returns a copy of the table stored at `path`.
    #[must_use]
    pub fn table(&self, path: impl AsRef<Path>) -> Option<Table> {
        match self.lock().get(path.as_ref()) {
            Some(Dataset::Table(table)) => Some(table.clone()),
            _ => None,
        }
    }

    /// Returns `true` if any dataset is stored at `path`.
    #[must_use]
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.lock().contains_key(path.as_ref())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<PathBuf, Dataset>> {
        self.datasets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Geoprocessor for MemoryGeoprocessor {
    fn read_layer(&self, path: &Path) -> Result<Layer, LayerError> {
        match self.lock().get(path) {
            Some(Dataset::Layer(layer)) => Ok(layer.clone()),
            Some(Dataset::Table(_)) => Err(unsupported(path, "a layer, found a table")),
            None => Err(not_found(path)),
        }
    }

    fn write_layer(&self, layer: &Layer, path: &Path) -> Result<(), LayerError> {
        self.insert_layer(path, layer.clone());
        Ok(())
    }

    fn read_table(&self, path: &Path) -> Result<Table, LayerError> {
        match self.lock().get(path) {
            Some(Dataset::Table(table)) => Ok(table.clone()),
            Some(Dataset::Layer(layer)) => Ok(table_from_layer(layer.clone())),
            None => Err(not_found(path)),
        }
    }

    fn write_table(&self, table: &Table, path: &Path) -> Result<(), LayerError> {
        self.insert_table(path, table.clone());
        Ok(())
    }
}

fn table_from_layer(layer: Layer) -> Table {
    Table::new(
        layer.fields,
        layer.features.into_iter().map(|f| f.attributes).collect(),
    )
}

fn io_error(path: &Path, source: std::io::Error) -> LayerError {
    if source.kind() == ErrorKind::NotFound {
        not_found(path)
    } else {
        LayerError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn not_found(path: &Path) -> LayerError {
    LayerError::NotFound {
        path: path.to_path_buf(),
    }
}

fn unsupported(path: &Path, expected: &'static str) -> LayerError {
    LayerError::UnsupportedFormat {
        path: path.to_path_buf(),
        expected,
    }
}
