use esp_idf_svc::nvs::{EspDefaultNvs, EspDefaultNvsPartition};
use esp_idf_sys::EspError;

use crate::store::KeyValueStore;

/// String values in one NVS namespace
pub struct NvsStore {
    nvs: EspDefaultNvs,
}

impl NvsStore {
    pub fn open(partition: EspDefaultNvsPartition, namespace: &str) -> Result<Self, EspError> {
        Ok(Self {
            nvs: EspDefaultNvs::new(partition, namespace, true)?,
        })
    }

    pub fn get_string(&self, key: &str) -> anyhow::Result<Option<String>> {
        let Some(len) = self.nvs.str_len(key)? else {
            return Ok(None);
        };
        let mut buf = vec![0u8; len];
        Ok(self
            .nvs
            .get_str(key, &mut buf)?
            .map(|s| s.trim_end_matches('\0').to_owned()))
    }

    pub fn set_string(&mut self, key: &str, value: Option<&str>) -> anyhow::Result<()> {
        match value {
            Some(v) => self.nvs.set_str(key, v)?,
            None => {
                self.nvs.remove(key)?;
            }
        }
        Ok(())
    }
}

impl KeyValueStore for NvsStore {
    fn get_str(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.get_string(key)
    }

    fn set_str(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.set_string(key, Some(value))
    }
}
