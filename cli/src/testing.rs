//! In-memory collaborators shared by the pipeline and batch tests.

use anyhow::{anyhow, bail};
use blackout_core::{BlobStage, PiiDetector, PiiInstance};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Returns the same instances for every call and remembers the payloads.
pub struct FixedDetector {
    instances: Vec<PiiInstance>,
    pub calls: Mutex<Vec<String>>,
}

impl FixedDetector {
    pub fn new(instances: Vec<PiiInstance>) -> Self {
        Self {
            instances,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl PiiDetector for FixedDetector {
    fn detect(&self, text: &str) -> anyhow::Result<Vec<PiiInstance>> {
        self.calls.lock().unwrap().push(text.to_string());
        Ok(self.instances.clone())
    }
}

pub struct FailingDetector;

impl PiiDetector for FailingDetector {
    fn detect(&self, _text: &str) -> anyhow::Result<Vec<PiiInstance>> {
        bail!("HTTP 429: quota exceeded")
    }
}

pub struct PanickingDetector;

impl PiiDetector for PanickingDetector {
    fn detect(&self, _text: &str) -> anyhow::Result<Vec<PiiInstance>> {
        panic!("detector exploded")
    }
}

/// Collections held in memory, listed in sorted order.
#[derive(Default)]
pub struct MemoryStage {
    files: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    pub read_only: bool,
}

impl MemoryStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn put(&self, collection: &str, id: &str, bytes: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert((collection.to_string(), id.to_string()), bytes);
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(&(collection.to_string(), id.to_string()))
            .cloned()
    }
}

impl BlobStage for MemoryStage {
    fn list(&self, collection: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, _)| c == collection)
            .map(|(_, id)| id.clone())
            .collect())
    }

    fn read(&self, collection: &str, id: &str) -> anyhow::Result<Vec<u8>> {
        self.get(collection, id)
            .ok_or_else(|| anyhow!("{collection}/{id}: no such file"))
    }

    fn write(&self, collection: &str, id: &str, bytes: &[u8]) -> anyhow::Result<()> {
        if self.read_only {
            bail!("{collection}: stage is read-only");
        }
        self.put(collection, id, bytes.to_vec());
        Ok(())
    }
}
