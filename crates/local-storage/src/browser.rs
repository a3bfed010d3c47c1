use crate::storage::KeyValueStorage;
use presto_shared::{PrestoError, PrestoResult};
use wasm_bindgen::prelude::*;

fn js_error(err: JsValue) -> PrestoError {
    PrestoError::storage(err.as_string().unwrap_or_else(|| format!("{:?}", err)))
}

/// Browser storage backed by LocalStorage or SessionStorage
#[derive(Debug, Clone, Copy)]
pub struct BrowserStorage {
    use_session: bool,
}

impl BrowserStorage {
    /// Create storage using LocalStorage
    pub fn local() -> Self {
        Self { use_session: false }
    }

    /// Create storage using SessionStorage
    pub fn session() -> Self {
        Self { use_session: true }
    }

    fn get_storage(&self) -> PrestoResult<web_sys::Storage> {
        let window = web_sys::window().ok_or_else(|| PrestoError::storage("No window object"))?;

        if self.use_session {
            window
                .session_storage()
                .map_err(|_| PrestoError::storage("SessionStorage not available"))?
                .ok_or_else(|| PrestoError::storage("SessionStorage not supported"))
        } else {
            window
                .local_storage()
                .map_err(|_| PrestoError::storage("LocalStorage not available"))?
                .ok_or_else(|| PrestoError::storage("LocalStorage not supported"))
        }
    }
}

impl KeyValueStorage for BrowserStorage {
    fn get(&self, key: &str) -> PrestoResult<Option<String>> {
        self.get_storage()?.get_item(key).map_err(js_error)
    }

    fn set(&self, key: &str, value: &str) -> PrestoResult<()> {
        self.get_storage()?.set_item(key, value).map_err(js_error)
    }

    fn remove(&self, key: &str) -> PrestoResult<()> {
        self.get_storage()?.remove_item(key).map_err(js_error)
    }

    fn keys(&self) -> PrestoResult<Vec<String>> {
        let storage = self.get_storage()?;
        let mut keys = Vec::new();

        for i in 0..storage.length().map_err(js_error)? {
            if let Some(key) = storage.key(i).map_err(js_error)? {
                keys.push(key);
            }
        }

        Ok(keys)
    }
}
