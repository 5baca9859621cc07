//! Shared mock collaborators for the shepherd integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use gridstore_catalog::{
    BartenderClient, CatalogError, ClientFactory, DirectoryClient, FileMetadata, LibrarianClient,
    LocationKey, ReplicaSlot, ReplicaState, ReportEntry, ServiceType,
};
use gridstore_shepherd::{
    BackendError, MemoryStore, ReplicaRecord, ReplicaStore, Shepherd, ShepherdConfig,
    TransferBackend,
};

pub const SERVICE_ID: &str = "shepherd-test";

/// Scriptable catalog client.
pub struct MockLibrarian {
    pub urls: Mutex<Vec<String>>,
    pub metadata: Mutex<HashMap<String, FileMetadata>>,
    pub reports: Mutex<Vec<(String, Vec<ReportEntry>)>>,
    pub next_report: Mutex<i64>,
    pub fail_reports: AtomicBool,
    pub fail_gets: AtomicBool,
}

impl MockLibrarian {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            urls: Mutex::new(Vec::new()),
            metadata: Mutex::new(HashMap::new()),
            reports: Mutex::new(Vec::new()),
            next_report: Mutex::new(0),
            fail_reports: AtomicBool::new(false),
            fail_gets: AtomicBool::new(false),
        })
    }

    pub fn set_metadata(&self, guid: &str, metadata: FileMetadata) {
        self.metadata.lock().insert(guid.to_string(), metadata);
    }

    pub fn reported_entries(&self) -> Vec<Vec<ReportEntry>> {
        self.reports.lock().iter().map(|(_, e)| e.clone()).collect()
    }
}

#[async_trait]
impl LibrarianClient for MockLibrarian {
    fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    async fn get(&self, guids: &[String]) -> Result<HashMap<String, FileMetadata>, CatalogError> {
        if self.fail_gets.load(Ordering::Relaxed) {
            return Err(CatalogError::Unavailable {
                msg: "mock librarian down".to_string(),
            });
        }
        let metadata = self.metadata.lock();
        Ok(guids
            .iter()
            .filter_map(|guid| metadata.get(guid).cloned().map(|m| (guid.clone(), m)))
            .collect())
    }

    async fn report(
        &self,
        service_id: &str,
        entries: Vec<ReportEntry>,
    ) -> Result<i64, CatalogError> {
        if self.fail_reports.load(Ordering::Relaxed) {
            return Err(CatalogError::Unavailable {
                msg: "mock librarian down".to_string(),
            });
        }
        self.reports.lock().push((service_id.to_string(), entries));
        Ok(*self.next_report.lock())
    }
}

/// Scriptable replication broker.
pub struct MockBartender {
    pub urls: Mutex<Vec<String>>,
    pub slot: Mutex<Option<ReplicaSlot>>,
    pub calls: Mutex<Vec<HashMap<String, String>>>,
}

impl MockBartender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            urls: Mutex::new(Vec::new()),
            slot: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn accept_with(&self, turl: &str, protocol: &str) {
        *self.slot.lock() = Some(ReplicaSlot {
            status: "done".to_string(),
            turl: turl.to_string(),
            protocol: protocol.to_string(),
        });
    }
}

#[async_trait]
impl BartenderClient for MockBartender {
    fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    async fn add_replica(
        &self,
        requests: &HashMap<String, String>,
        _protocols: &[String],
    ) -> Result<HashMap<String, ReplicaSlot>, CatalogError> {
        self.calls.lock().push(requests.clone());
        let slot = self.slot.lock().clone().unwrap_or(ReplicaSlot {
            status: "denied".to_string(),
            turl: String::new(),
            protocol: String::new(),
        });
        Ok(requests
            .keys()
            .map(|tag| (tag.clone(), slot.clone()))
            .collect())
    }
}

/// Directory service answering with fixed URL lists.
pub struct MockDirectory {
    pub librarian_urls: Mutex<Vec<String>>,
    pub bartender_urls: Mutex<Vec<String>>,
}

impl MockDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            librarian_urls: Mutex::new(Vec::new()),
            bartender_urls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl DirectoryClient for MockDirectory {
    async fn service_urls(&self, service_type: ServiceType) -> Result<Vec<String>, CatalogError> {
        Ok(match service_type {
            ServiceType::Librarian => self.librarian_urls.lock().clone(),
            ServiceType::Bartender => self.bartender_urls.lock().clone(),
        })
    }
}

/// Factory handing out the shared mocks, rebinding their URL lists.
pub struct MockFactory {
    pub librarian: Arc<MockLibrarian>,
    pub bartender: Arc<MockBartender>,
    pub directory: Arc<MockDirectory>,
}

impl ClientFactory for MockFactory {
    fn librarian(&self, urls: Vec<String>) -> Arc<dyn LibrarianClient> {
        *self.librarian.urls.lock() = urls;
        self.librarian.clone()
    }

    fn bartender(&self, urls: Vec<String>) -> Arc<dyn BartenderClient> {
        *self.bartender.urls.lock() = urls;
        self.bartender.clone()
    }

    fn directory(&self, _url: String) -> Arc<dyn DirectoryClient> {
        self.directory.clone()
    }
}

/// Scriptable transfer backend. Checksums are looked up per local ID, so a
/// "corrupt" replica is one whose stored checksum differs from the record's.
pub struct MockBackend {
    pub checksums: Mutex<HashMap<String, String>>,
    pub available: Mutex<Option<u64>>,
    pub removed: Mutex<Vec<String>>,
    pub copies: Mutex<Vec<(String, String, String)>>,
    pub protocols: Vec<String>,
    pub checksum_calls: AtomicUsize,
    pub fail_staging: AtomicBool,
    pub empty_turl: AtomicBool,
    next_local: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            checksums: Mutex::new(HashMap::new()),
            available: Mutex::new(Some(1 << 30)),
            removed: Mutex::new(Vec::new()),
            copies: Mutex::new(Vec::new()),
            protocols: vec!["byteio".to_string(), "http".to_string()],
            checksum_calls: AtomicUsize::new(0),
            fail_staging: AtomicBool::new(false),
            empty_turl: AtomicBool::new(false),
            next_local: AtomicUsize::new(0),
        })
    }

    pub fn store_bytes(&self, local_id: &str, checksum: &str) {
        self.checksums
            .lock()
            .insert(local_id.to_string(), checksum.to_string());
    }
}

#[async_trait]
impl TransferBackend for MockBackend {
    async fn available_space(&self) -> Option<u64> {
        *self.available.lock()
    }

    async fn checksum(&self, local_id: &str, _checksum_type: &str) -> Result<String, BackendError> {
        self.checksum_calls.fetch_add(1, Ordering::Relaxed);
        self.checksums
            .lock()
            .get(local_id)
            .cloned()
            .ok_or_else(|| BackendError::new(format!("no bytes under {local_id}")))
    }

    fn generate_local_id(&self) -> String {
        format!("local-{}", self.next_local.fetch_add(1, Ordering::Relaxed))
    }

    async fn prepare_to_get(
        &self,
        reference_id: &str,
        _local_id: &str,
        protocol: &str,
    ) -> Result<Option<String>, BackendError> {
        self.stage(reference_id, protocol)
    }

    async fn prepare_to_put(
        &self,
        reference_id: &str,
        _local_id: &str,
        protocol: &str,
    ) -> Result<Option<String>, BackendError> {
        self.stage(reference_id, protocol)
    }

    async fn copy_to(
        &self,
        local_id: &str,
        turl: &str,
        protocol: &str,
    ) -> Result<(), BackendError> {
        self.copies
            .lock()
            .push((local_id.to_string(), turl.to_string(), protocol.to_string()));
        Ok(())
    }

    async fn remove(&self, local_id: &str) -> bool {
        self.removed.lock().push(local_id.to_string());
        self.checksums.lock().remove(local_id).is_some()
    }

    fn match_protocols(&self, candidates: &[String]) -> Vec<String> {
        self.protocols
            .iter()
            .filter(|p| candidates.contains(*p))
            .cloned()
            .collect()
    }
}

impl MockBackend {
    fn stage(&self, reference_id: &str, protocol: &str) -> Result<Option<String>, BackendError> {
        if self.fail_staging.load(Ordering::Relaxed) {
            return Err(BackendError::new("staging unavailable"));
        }
        if self.empty_turl.load(Ordering::Relaxed) {
            return Ok(None);
        }
        Ok(Some(format!("mock://{protocol}/{reference_id}")))
    }
}

/// A shepherd wired to mock collaborators plus handles on all of them.
pub struct Fixture {
    pub shepherd: Arc<Shepherd>,
    pub store: Arc<MemoryStore>,
    pub backend: Arc<MockBackend>,
    pub librarian: Arc<MockLibrarian>,
    pub bartender: Arc<MockBartender>,
    pub directory: Arc<MockDirectory>,
}

pub fn test_config() -> ShepherdConfig {
    ShepherdConfig {
        service_id: SERVICE_ID.to_string(),
        check_period_ms: 1,
        min_check_interval_ms: 0,
        librarian_urls: vec!["http://librarian.test".to_string()],
        bartender_urls: vec!["http://bartender.test".to_string()],
        ..Default::default()
    }
}

pub async fn fixture() -> Fixture {
    fixture_with(test_config()).await
}

pub async fn fixture_with(config: ShepherdConfig) -> Fixture {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let store = Arc::new(MemoryStore::new());
    let backend = MockBackend::new();
    let librarian = MockLibrarian::new();
    let bartender = MockBartender::new();
    let directory = MockDirectory::new();
    let factory = Arc::new(MockFactory {
        librarian: librarian.clone(),
        bartender: bartender.clone(),
        directory: directory.clone(),
    });

    let shepherd = Shepherd::new(config, store.clone(), backend.clone(), factory)
        .await
        .expect("valid test config");

    Fixture {
        shepherd,
        store,
        backend,
        librarian,
        bartender,
        directory,
    }
}

/// A replica record with sensible test defaults.
pub fn record(guid: &str, local_id: &str, state: ReplicaState) -> ReplicaRecord {
    ReplicaRecord {
        guid: guid.to_string(),
        local_id: local_id.to_string(),
        state,
        checksum: "abc".to_string(),
        checksum_type: "md5".to_string(),
        last_checksum: None,
        last_checksum_time: None,
        size: 1024,
        acl: Vec::new(),
        created: gridstore_shepherd::record::unix_secs(),
    }
}

/// Catalog metadata for a file with the given locations.
pub fn metadata(
    checksum: &str,
    needed_replicas: u32,
    locations: &[(&str, &str, ReplicaState)],
) -> FileMetadata {
    let mut md = FileMetadata {
        entry_type: Some("file".to_string()),
        checksum: Some(checksum.to_string()),
        checksum_type: Some("md5".to_string()),
        needed_replicas: Some(needed_replicas),
        locations: HashMap::new(),
    };
    for (service_id, reference_id, state) in locations {
        md.record_location(LocationKey::new(*service_id, *reference_id), *state);
    }
    md
}

/// Seeds one replica into the store and its bytes into the backend.
pub async fn seed(fixture: &Fixture, reference_id: &str, rec: ReplicaRecord, bytes_checksum: &str) {
    fixture.backend.store_bytes(&rec.local_id, bytes_checksum);
    fixture.store.set(reference_id, Some(rec)).await;
}
