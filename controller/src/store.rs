use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use grow_common::{RuntimeConfig, SensorKind, SensorSettings, SettingsStore, StoreError};

/// Files under the data directory.
#[derive(Clone)]
pub struct AppStore {
    runtime_path: Arc<PathBuf>,
    settings_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl AppStore {
    pub fn new() -> Self {
        let data_dir = std::env::var("GROW_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.grow"));
        Self::at(data_dir)
    }

    pub fn at(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            settings_path: Arc::new(data_dir.join("store.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn settings_path(&self) -> &Path {
        self.settings_path.as_ref()
    }

    pub async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
                .with_context(|| format!("invalid {}", self.runtime_path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        let tmp = tmp_path(&path);
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    flags: BTreeMap<String, BTreeMap<String, bool>>,
    #[serde(default)]
    sensors: BTreeMap<String, SensorSettings>,
}

/// [`SettingsStore`] backed by one JSON file. Every write rewrites the file
/// through a temporary sibling and a rename, so a crash leaves either the
/// old or the new contents.
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    data: StoreFile,
}

impl FileSettingsStore {
    /// Opens the store. A missing file is an empty store; a file that does
    /// not parse is set aside and replaced by an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|err| {
                warn!("discarding unreadable store {}: {err}", path.display());
                if let Err(err) = std::fs::rename(&path, path.with_extension("json.bad")) {
                    warn!("failed to set aside {}: {err}", path.display());
                }
                StoreFile::default()
            }),
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    warn!("failed to read store {}: {err}", path.display());
                }
                StoreFile::default()
            }
        };
        Self { path, data }
    }

    fn persist(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| StoreError::Io(err.to_string()))?;
        }
        let payload = serde_json::to_vec_pretty(&self.data)
            .map_err(|err| StoreError::Encoding(err.to_string()))?;
        let tmp = tmp_path(&self.path);
        std::fs::write(&tmp, payload).map_err(|err| StoreError::Io(err.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|err| StoreError::Io(err.to_string()))
    }
}

impl SettingsStore for FileSettingsStore {
    fn get_bool(&self, namespace: &str, key: &str) -> Option<bool> {
        self.data.flags.get(namespace)?.get(key).copied()
    }

    fn set_bool(&mut self, namespace: &str, key: &str, value: bool) -> Result<(), StoreError> {
        let previous = self
            .data
            .flags
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);

        self.persist().inspect_err(|_| {
            let flags = self.data.flags.entry(namespace.to_string()).or_default();
            match previous {
                Some(previous) => flags.insert(key.to_string(), previous),
                None => flags.remove(key),
            };
        })
    }

    fn load_sensor_settings(&self, kind: SensorKind) -> Option<SensorSettings> {
        self.data.sensors.get(kind.settings_namespace()).cloned()
    }

    fn save_sensor_settings(
        &mut self,
        kind: SensorKind,
        settings: &SensorSettings,
    ) -> Result<(), StoreError> {
        let namespace = kind.settings_namespace().to_string();
        let previous = self.data.sensors.insert(namespace.clone(), settings.clone());

        self.persist().inspect_err(|_| {
            match previous {
                Some(previous) => self.data.sensors.insert(namespace, previous),
                None => self.data.sensors.remove(&namespace),
            };
        })
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
