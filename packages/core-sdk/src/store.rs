use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use crate::{error::Result, models::ProviderConfig};

/**
 * \brief Provider 配置存储：按 Provider 标识整体读写，后写者覆盖。
 */
pub trait ConfigStore: Send + Sync {
    fn get(&self, provider: &str) -> Option<ProviderConfig>;
    fn set(&self, config: ProviderConfig) -> Result<()>;
}

/**
 * \brief 进程内存储，重启后不保留。
 */
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<String, ProviderConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/**
 * \brief 锁中毒时记录告警并沿用最后写入的数据。
 */
fn recover<G>(poisoned: PoisonError<G>) -> G {
    tracing::warn!("config store lock poisoned, continuing with last written state");
    poisoned.into_inner()
}

impl ConfigStore for MemoryStore {
    fn get(&self, provider: &str) -> Option<ProviderConfig> {
        let map = self.inner.read().unwrap_or_else(recover);
        map.get(provider).cloned()
    }

    fn set(&self, config: ProviderConfig) -> Result<()> {
        let mut map = self.inner.write().unwrap_or_else(recover);
        map.insert(config.provider.clone(), config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(provider: &str, key: &str) -> ProviderConfig {
        ProviderConfig {
            provider: provider.to_string(),
            api_key: key.to_string(),
            base_url: "https://api.example.com".to_string(),
            model: "m".to_string(),
        }
    }

    #[test]
    fn test_last_writer_wins() {
        let store = MemoryStore::new();
        assert!(store.get("openai").is_none());
        store.set(cfg("openai", "sk-1")).expect("set 1");
        store.set(cfg("openai", "sk-2")).expect("set 2");
        store.set(cfg("anthropic", "sk-ant-1")).expect("set 3");
        assert_eq!(store.get("openai").expect("stored").api_key, "sk-2");
        assert_eq!(store.get("anthropic").expect("stored").api_key, "sk-ant-1");
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set(cfg("custom", &format!("key-{}", i))).expect("set");
            }));
        }
        for h in handles {
            h.await.expect("join");
        }
        let key = store.get("custom").expect("stored").api_key;
        assert!(key.starts_with("key-"));
    }

    #[test]
    fn test_poisoned_lock_keeps_stored_config() {
        let store = std::sync::Arc::new(MemoryStore::new());
        store.set(cfg("openai", "sk-1")).expect("set");

        let writer = store.clone();
        let joined = std::thread::spawn(move || {
            let _guard = writer.inner.write().expect("lock");
            panic!("writer died while holding the lock");
        })
        .join();
        assert!(joined.is_err());
        assert!(store.inner.is_poisoned());

        assert_eq!(store.get("openai").expect("stored").api_key, "sk-1");
        store.set(cfg("openai", "sk-2")).expect("set after poison");
        assert_eq!(store.get("openai").expect("stored").api_key, "sk-2");
    }
}
