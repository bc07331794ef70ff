use std::fs;
use std::path::PathBuf;

use ahash::RandomState;
use common::{Column, DbError, DbResult, PageId, PageKey, Schema, TableId};
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use storage::{HeapFile, HeapPage, PageStore};
use tracing::info;

type Map<K, V> = HashMap<K, V, RandomState>;

const CATALOG_FILE: &str = "catalog.json";

/// Persistent registry of tables: name, identifier, schema, and the heap
/// file each one lives in.
///
/// Metadata is saved as JSON under the data directory; the heap files
/// themselves are opened eagerly so page access never touches the
/// filesystem namespace. The catalog doubles as the [`PageStore`] the
/// buffer pool loads and flushes through.
#[derive(Debug, Serialize, Deserialize)]
pub struct Catalog {
    tables: Vec<TableMeta>,
    next_table_id: u64,
    #[serde(skip)]
    data_dir: PathBuf,
    #[serde(skip)]
    name_index: Map<String, usize>,
    #[serde(skip)]
    id_index: Map<TableId, usize>,
    #[serde(skip)]
    files: Map<TableId, Mutex<HeapFile>>,
}

/// Metadata describing a registered table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableMeta {
    pub id: TableId,
    pub name: String,
    pub schema: Schema,
    /// Heap file name relative to the data directory.
    pub file_name: String,
}

impl Catalog {
    /// Open the catalog under `data_dir`, creating the directory and an
    /// empty catalog when none exists yet.
    pub fn open(data_dir: impl Into<PathBuf>) -> DbResult<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;

        let path = data_dir.join(CATALOG_FILE);
        let mut catalog = if path.exists() {
            let data = fs::read_to_string(&path)?;
            serde_json::from_str::<Catalog>(&data)
                .map_err(|err| DbError::Catalog(format!("invalid catalog file: {err}")))?
        } else {
            Catalog {
                tables: Vec::new(),
                next_table_id: 1,
                data_dir: PathBuf::new(),
                name_index: Map::default(),
                id_index: Map::default(),
                files: Map::default(),
            }
        };
        catalog.data_dir = data_dir;
        catalog.rebuild_indexes();
        catalog.open_files()?;
        info!(tables = catalog.tables.len(), dir = %catalog.data_dir.display(), "catalog opened");
        Ok(catalog)
    }

    /// Persist the table metadata as pretty JSON.
    pub fn save(&self) -> DbResult<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|err| DbError::Catalog(format!("serialize failed: {err}")))?;
        fs::write(self.data_dir.join(CATALOG_FILE), data)?;
        Ok(())
    }

    /// Register a table and create its backing heap file. Column names must
    /// be unique within the table.
    pub fn create_table(&mut self, name: &str, columns: Vec<Column>) -> DbResult<TableId> {
        if self.name_index.contains_key(name) {
            return Err(DbError::Catalog(format!("table '{name}' already exists")));
        }
        if columns.is_empty() {
            return Err(DbError::Catalog(
                "table must contain at least one column".into(),
            ));
        }
        {
            let mut seen: Map<&str, ()> = Map::default();
            for column in &columns {
                if seen.insert(column.name.as_str(), ()).is_some() {
                    return Err(DbError::Catalog(format!(
                        "duplicate column '{}' in table '{name}'",
                        column.name
                    )));
                }
            }
        }

        let id = TableId(self.next_table_id);
        self.next_table_id += 1;
        let schema = Schema::new(columns);
        let file_name = format!("{name}.tbl");
        let file = HeapFile::open(&self.data_dir.join(&file_name), id, schema.clone())?;

        self.tables.push(TableMeta {
            id,
            name: name.to_string(),
            schema,
            file_name,
        });
        self.files.insert(id, Mutex::new(file));
        self.rebuild_indexes();
        info!(table = name, id = id.0, "created table");
        Ok(id)
    }

    /// Remove a table's metadata and delete its heap file.
    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        let idx = self
            .name_index
            .get(name)
            .copied()
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))?;
        let meta = self.tables.remove(idx);
        self.files.remove(&meta.id);
        fs::remove_file(self.data_dir.join(&meta.file_name))?;
        self.rebuild_indexes();
        info!(table = name, "dropped table");
        Ok(())
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> DbResult<&TableMeta> {
        self.name_index
            .get(name)
            .and_then(|&idx| self.tables.get(idx))
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))
    }

    /// Look up a table by identifier.
    pub fn table_by_id(&self, id: TableId) -> DbResult<&TableMeta> {
        self.id_index
            .get(&id)
            .and_then(|&idx| self.tables.get(idx))
            .ok_or_else(|| DbError::UnknownTable(format!("id {}", id.0)))
    }

    /// Immutable iterator over all registered tables.
    pub fn tables(&self) -> impl Iterator<Item = &TableMeta> {
        self.tables.iter()
    }

    /// The opened heap file backing a table.
    pub fn file_of(&self, table: TableId) -> DbResult<&Mutex<HeapFile>> {
        self.files
            .get(&table)
            .ok_or_else(|| DbError::UnknownTable(format!("id {}", table.0)))
    }

    fn rebuild_indexes(&mut self) {
        self.name_index.clear();
        self.id_index.clear();
        for (idx, table) in self.tables.iter().enumerate() {
            self.name_index.insert(table.name.clone(), idx);
            self.id_index.insert(table.id, idx);
        }
    }

    /// Reopen every table's heap file. Called after deserialization, which
    /// leaves the file map empty.
    fn open_files(&mut self) -> DbResult<()> {
        for meta in &self.tables {
            let file = HeapFile::open(
                &self.data_dir.join(&meta.file_name),
                meta.id,
                meta.schema.clone(),
            )?;
            self.files.insert(meta.id, Mutex::new(file));
        }
        Ok(())
    }
}

impl PageStore for Catalog {
    fn schema_of(&self, table: TableId) -> DbResult<Schema> {
        Ok(self.table_by_id(table)?.schema.clone())
    }

    fn read_page(&self, key: PageKey) -> DbResult<HeapPage> {
        self.file_of(key.table)?.lock().read_page(key.page)
    }

    fn write_page(&self, page: &HeapPage) -> DbResult<()> {
        self.file_of(page.key().table)?.lock().write_page(page)
    }

    fn page_count(&self, table: TableId) -> DbResult<u64> {
        self.file_of(table)?.lock().page_count()
    }

    fn allocate_page(&self, table: TableId) -> DbResult<PageId> {
        let page = self.file_of(table)?.lock().allocate_page()?;
        Ok(page.key().page)
    }
}
