use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use shipd::catalog::{
    CatalogError, CatalogRecord, CatalogResult, MetaCatalog, MetacatFileSpec, RucioCatalog,
    SamCatalog,
};

/// A scripted failure: `permanent` maps to `CatalogError::Rejected`.
#[derive(Debug, Clone)]
pub struct ScriptedFailure {
    pub permanent: bool,
    pub message: String,
}

impl ScriptedFailure {
    fn to_error(&self) -> CatalogError {
        if self.permanent {
            CatalogError::Rejected(self.message.clone())
        } else {
            CatalogError::Transient(self.message.clone())
        }
    }
}

fn maybe_fail(failure: &Mutex<Option<ScriptedFailure>>) -> CatalogResult<()> {
    match failure.lock().unwrap().as_ref() {
        Some(f) => Err(f.to_error()),
        None => Ok(()),
    }
}

/// In-memory SAM double.
#[derive(Default)]
pub struct FakeSam {
    /// Pre-existing records returned by `get_file`.
    pub existing: Mutex<HashMap<String, CatalogRecord>>,
    pub declared: Mutex<Vec<Value>>,
    pub locations: Mutex<Vec<(String, String)>>,
    pub fail_declare: Mutex<Option<ScriptedFailure>>,
}

impl FakeSam {
    pub fn with_existing(name: &str, record: CatalogRecord) -> Self {
        let fake = Self::default();
        fake.existing
            .lock()
            .unwrap()
            .insert(name.to_string(), record);
        fake
    }

    pub fn declared_count(&self) -> usize {
        self.declared.lock().unwrap().len()
    }
}

#[async_trait]
impl SamCatalog for FakeSam {
    async fn get_file(&self, name: &str) -> CatalogResult<Option<CatalogRecord>> {
        Ok(self.existing.lock().unwrap().get(name).cloned())
    }

    async fn declare(&self, metadata: &Value) -> CatalogResult<String> {
        maybe_fail(&self.fail_declare)?;
        let mut declared = self.declared.lock().unwrap();
        declared.push(metadata.clone());
        Ok(format!("fake-sam-id-{}", declared.len()))
    }

    async fn add_location(&self, file_id: &str, location: &str) -> CatalogResult<()> {
        self.locations
            .lock()
            .unwrap()
            .push((file_id.to_string(), location.to_string()));
        Ok(())
    }
}

/// In-memory MetaCat double.
#[derive(Default)]
pub struct FakeMetacat {
    /// Pre-existing records by DID.
    pub existing: Mutex<HashMap<String, CatalogRecord>>,
    pub declared: Mutex<Vec<MetacatFileSpec>>,
    pub fail_declare: Mutex<Option<ScriptedFailure>>,
}

impl FakeMetacat {
    pub fn with_existing(did: &str, record: CatalogRecord) -> Self {
        let fake = Self::default();
        fake.existing
            .lock()
            .unwrap()
            .insert(did.to_string(), record);
        fake
    }

    pub fn declared_count(&self) -> usize {
        self.declared.lock().unwrap().len()
    }
}

#[async_trait]
impl MetaCatalog for FakeMetacat {
    async fn get_file(&self, did: &str) -> CatalogResult<Option<CatalogRecord>> {
        Ok(self.existing.lock().unwrap().get(did).cloned())
    }

    async fn declare_file(&self, spec: &MetacatFileSpec) -> CatalogResult<()> {
        maybe_fail(&self.fail_declare)?;
        self.declared.lock().unwrap().push(spec.clone());
        Ok(())
    }
}

/// In-memory Rucio double.
#[derive(Default)]
pub struct FakeRucio {
    pub datasets: Mutex<Vec<(String, String)>>,
    pub rules: Mutex<Vec<(String, String, String)>>,
    pub replicas: Mutex<Vec<(String, String, String)>>,
    attached: Mutex<HashSet<(String, String)>>,
    pub fail_replica: Mutex<Option<ScriptedFailure>>,
}

impl FakeRucio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.lock().unwrap().len()
    }
}

#[async_trait]
impl RucioCatalog for FakeRucio {
    async fn ensure_dataset(&self, scope: &str, name: &str) -> CatalogResult<()> {
        self.datasets
            .lock()
            .unwrap()
            .push((scope.to_string(), name.to_string()));
        Ok(())
    }

    async fn ensure_replication_rule(
        &self,
        scope: &str,
        name: &str,
        rse: &str,
    ) -> CatalogResult<()> {
        self.rules
            .lock()
            .unwrap()
            .push((scope.to_string(), name.to_string(), rse.to_string()));
        Ok(())
    }

    async fn add_replica(
        &self,
        rse: &str,
        scope: &str,
        name: &str,
        _size: u64,
        _adler32: &str,
    ) -> CatalogResult<()> {
        maybe_fail(&self.fail_replica)?;
        self.replicas
            .lock()
            .unwrap()
            .push((rse.to_string(), scope.to_string(), name.to_string()));
        Ok(())
    }

    async fn attach(
        &self,
        _dataset_scope: &str,
        dataset_name: &str,
        file_scope: &str,
        file_name: &str,
    ) -> CatalogResult<bool> {
        let key = (dataset_name.to_string(), format!("{file_scope}:{file_name}"));
        Ok(self.attached.lock().unwrap().insert(key))
    }
}
