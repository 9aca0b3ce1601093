use anyhow::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

/// Ajustes por servidor almacenados en JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildSettings {
    pub guild_id: u64,
    /// Prefijo de comandos del servidor.
    pub prefix: String,
    /// Cuántos elementos tomar de un mix autogenerado.
    pub mix_items: usize,
    /// Segundos con el canal vacío antes de salir.
    pub leave_delay_secs: u64,
    pub default_volume: f32,
}

pub const DEFAULT_PREFIX: &str = "$";
pub const DEFAULT_MIX_ITEMS: usize = 25;
pub const DEFAULT_LEAVE_DELAY_SECS: u64 = 300;
pub const DEFAULT_VOLUME: f32 = 1.0;

impl GuildSettings {
    fn for_guild(guild_id: u64) -> Self {
        Self {
            guild_id,
            prefix: DEFAULT_PREFIX.to_string(),
            mix_items: DEFAULT_MIX_ITEMS,
            leave_delay_secs: DEFAULT_LEAVE_DELAY_SECS,
            default_volume: DEFAULT_VOLUME,
        }
    }
}

/// Almacenamiento de ajustes basado en archivos JSON, uno por guild
pub struct JsonStorage {
    data_dir: PathBuf,
    cache: DashMap<u64, GuildSettings>,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        let guilds_dir = data_dir.join("guilds");
        fs::create_dir_all(&guilds_dir).await?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        let storage = Self {
            data_dir,
            cache: DashMap::new(),
        };
        storage.load_all().await?;

        Ok(storage)
    }

    /// Ajustes de un guild; los que no tienen archivo usan los por defecto.
    pub fn get(&self, guild_id: u64) -> GuildSettings {
        self.cache
            .get(&guild_id)
            .map(|s| s.clone())
            .unwrap_or_else(|| GuildSettings::for_guild(guild_id))
    }

    pub async fn set_prefix(&self, guild_id: u64, prefix: String) -> Result<()> {
        let mut settings = self.get(guild_id);
        settings.prefix = prefix;
        self.save(settings).await
    }

    pub async fn set_mix_items(&self, guild_id: u64, mix_items: usize) -> Result<()> {
        let mut settings = self.get(guild_id);
        settings.mix_items = mix_items;
        self.save(settings).await
    }

    pub async fn set_leave_delay(&self, guild_id: u64, secs: u64) -> Result<()> {
        let mut settings = self.get(guild_id);
        settings.leave_delay_secs = secs;
        self.save(settings).await
    }

    async fn save(&self, settings: GuildSettings) -> Result<()> {
        let path = self.guild_file(settings.guild_id);
        let content = serde_json::to_string_pretty(&settings)?;
        fs::write(&path, content).await?;

        info!("💾 Ajustes guardados para guild {}", settings.guild_id);
        self.cache.insert(settings.guild_id, settings);
        Ok(())
    }

    async fn load_all(&self) -> Result<()> {
        let guilds_dir = self.data_dir.join("guilds");
        let mut files = fs::read_dir(&guilds_dir).await?;
        let mut loaded = 0;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_stem().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(guild_id) = name
                .strip_prefix("guild_")
                .and_then(|id| id.parse::<u64>().ok())
            else {
                continue;
            };

            match fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<GuildSettings>(&content) {
                    Ok(settings) => {
                        self.cache.insert(guild_id, settings);
                        loaded += 1;
                    }
                    Err(e) => warn!("Ajustes ilegibles para guild {}: {}", guild_id, e),
                },
                Err(e) => warn!("Error leyendo {}: {}", path.display(), e),
            }
        }

        if loaded > 0 {
            info!("📂 Cargados ajustes de {} guilds", loaded);
        }
        Ok(())
    }

    fn guild_file(&self, guild_id: u64) -> PathBuf {
        self.data_dir
            .join("guilds")
            .join(format!("guild_{}.json", guild_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mixcord-storage-{}-{}", tag, std::process::id()))
    }

    #[tokio::test]
    async fn test_unknown_guild_gets_defaults() {
        let dir = temp_dir("defaults");
        let storage = JsonStorage::new(dir.clone()).await.unwrap();

        let settings = storage.get(42);
        assert_eq!(settings.prefix, DEFAULT_PREFIX);
        assert_eq!(settings.mix_items, DEFAULT_MIX_ITEMS);
        assert_eq!(settings.leave_delay_secs, DEFAULT_LEAVE_DELAY_SECS);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_settings_survive_reload() {
        let dir = temp_dir("reload");
        {
            let storage = JsonStorage::new(dir.clone()).await.unwrap();
            storage.set_prefix(7, "!".to_string()).await.unwrap();
            storage.set_mix_items(7, 40).await.unwrap();
        }

        let storage = JsonStorage::new(dir.clone()).await.unwrap();
        let settings = storage.get(7);
        assert_eq!(settings.prefix, "!");
        assert_eq!(settings.mix_items, 40);

        let _ = std::fs::remove_dir_all(dir);
    }
}
