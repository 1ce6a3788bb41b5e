//! The table registry: table ids to heap files and schemas.

use crate::error::{DbError, DbResult};
use crate::heap_file::HeapFile;
use crate::tuple::TupleDesc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct CatalogEntry {
    file: Arc<HeapFile>,
    name: String,
}

/// Maps table ids to their backing heap files. Adding a table under an
/// existing name (or id) replaces the old entry.
#[derive(Default)]
pub struct Catalog {
    tables: Mutex<HashMap<u32, CatalogEntry>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `file` under `name` and returns its table id.
    pub fn add_table(&self, file: HeapFile, name: &str) -> u32 {
        let id = file.id();
        let mut tables = self.tables.lock().unwrap();
        tables.retain(|_, entry| entry.name != name);
        tables.insert(
            id,
            CatalogEntry {
                file: Arc::new(file),
                name: name.to_string(),
            },
        );
        id
    }

    pub fn db_file(&self, table_id: u32) -> DbResult<Arc<HeapFile>> {
        let tables = self.tables.lock().unwrap();
        tables
            .get(&table_id)
            .map(|e| Arc::clone(&e.file))
            .ok_or_else(|| DbError::invalid(format!("no table with id {}", table_id)))
    }

    pub fn tuple_desc(&self, table_id: u32) -> DbResult<TupleDesc> {
        Ok(self.db_file(table_id)?.desc().clone())
    }

    pub fn table_name(&self, table_id: u32) -> DbResult<String> {
        let tables = self.tables.lock().unwrap();
        tables
            .get(&table_id)
            .map(|e| e.name.clone())
            .ok_or_else(|| DbError::invalid(format!("no table with id {}", table_id)))
    }

    pub fn table_id(&self, name: &str) -> DbResult<u32> {
        let tables = self.tables.lock().unwrap();
        tables
            .iter()
            .find(|(_, e)| e.name == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| DbError::invalid(format!("no table named '{}'", name)))
    }

    pub fn table_ids(&self) -> Vec<u32> {
        self.tables.lock().unwrap().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::DataType;
    use serial_test::serial;
    use tempfile::tempdir;

    fn desc() -> TupleDesc {
        TupleDesc::new(vec![DataType::Int])
    }

    #[test]
    #[serial]
    fn lookup_by_id_and_name() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new();
        let file = HeapFile::open(dir.path().join("t.dat"), desc()).unwrap();
        let id = catalog.add_table(file, "widgets");

        assert_eq!(catalog.table_id("widgets").unwrap(), id);
        assert_eq!(catalog.table_name(id).unwrap(), "widgets");
        assert_eq!(catalog.tuple_desc(id).unwrap(), desc());
        assert_eq!(catalog.db_file(id).unwrap().id(), id);
        assert!(catalog.db_file(id + 1).is_err());
    }

    #[test]
    #[serial]
    fn same_name_replaces_the_old_table() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new();
        let old = HeapFile::open(dir.path().join("a.dat"), desc()).unwrap();
        let new = HeapFile::open(dir.path().join("b.dat"), desc()).unwrap();
        let old_id = catalog.add_table(old, "t");
        let new_id = catalog.add_table(new, "t");

        assert_ne!(old_id, new_id);
        assert!(catalog.db_file(old_id).is_err());
        assert_eq!(catalog.table_id("t").unwrap(), new_id);
    }
}
