use anyhow::Result;
use std::path::PathBuf;

/// Configuración de proceso, leída del entorno al arrancar.
///
/// Los ajustes por guild (prefijo, mix, salida diferida) viven en el
/// storage; aquí solo va lo global.
#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub data_dir: PathBuf,
    /// Ganancia inicial de cada sesión (1.0 = sin tocar).
    pub default_volume: f32,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN")?,
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "1.0".to_string())
                .parse()?,
        };

        std::fs::create_dir_all(&config.data_dir)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN no puede estar vacío");
        }

        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!(
                "El volumen por defecto debe estar entre 0.0 y 2.0, no: {}",
                self.default_volume
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_out_of_range_volume() {
        let config = Config {
            discord_token: "token".to_string(),
            data_dir: "/tmp".into(),
            default_volume: 3.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_token() {
        let config = Config {
            discord_token: "  ".to_string(),
            data_dir: "/tmp".into(),
            default_volume: 1.0,
        };
        assert!(config.validate().is_err());
    }
}
