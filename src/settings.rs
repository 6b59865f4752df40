use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardSettings {
    /// Tokens credited for one completed read.
    pub read_reward: u64,
    /// Tokens granted when a profile is created.
    pub signup_bonus: u64,
}

impl Default for RewardSettings {
    fn default() -> Self {
        Self {
            read_reward: 50,
            signup_bonus: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PlatformSettings {
    #[serde(default)]
    rewards: RewardSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<PlatformSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            PlatformSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn rewards(&self) -> RewardSettings {
        self.data.read().unwrap().rewards.clone()
    }

    pub fn update_rewards(&self, rewards: RewardSettings) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            guard.rewards = rewards;
            self.persist(&guard)?;
        }
        Ok(())
    }

    fn persist(&self, data: &PlatformSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

impl SettingsStore {
    #[allow(dead_code)]
    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: PlatformSettings = serde_json::from_str(&contents)?;
        let mut guard = self.data.write().unwrap();
        *guard = data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_settings_path() -> PathBuf {
        std::env::temp_dir().join(format!("dadapay-settings-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn defaults_match_platform_amounts() {
        let store = SettingsStore::new(temp_settings_path()).unwrap();
        let rewards = store.rewards();
        assert_eq!(rewards.read_reward, 50);
        assert_eq!(rewards.signup_bonus, 100);
    }

    #[test]
    fn updates_survive_reload() {
        let path = temp_settings_path();
        let store = SettingsStore::new(path.clone()).unwrap();
        store
            .update_rewards(RewardSettings {
                read_reward: 75,
                signup_bonus: 10,
            })
            .unwrap();

        let reopened = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(reopened.rewards().read_reward, 75);
        assert_eq!(reopened.rewards().signup_bonus, 10);
        let _ = fs::remove_file(path);
    }
}
