//! INI file configuration adapter.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[panel]
source = csv
path = /data/panel

[backtest]
start_period = 2005
end_period = 2020
initial_capital = 1.0
rank_by = ratio:market_cap

[search]
population_size = 24
retain_fraction = 0.25
seed = 7
"#;

    #[test]
    fn from_string_parses_sections() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string("panel", "source"),
            Some("csv".to_string())
        );
        assert_eq!(
            adapter.get_string("backtest", "rank_by"),
            Some("ratio:market_cap".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_value_or_default() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_int("search", "population_size", 0), 24);
        assert_eq!(adapter.get_int("search", "generations", 10), 10);
    }

    #[test]
    fn get_int_returns_default_for_non_numeric() {
        let adapter =
            FileConfigAdapter::from_string("[search]\npopulation_size = lots\n").unwrap();
        assert_eq!(adapter.get_int("search", "population_size", 20), 20);
    }

    #[test]
    fn get_double_returns_value_or_default() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_double("search", "retain_fraction", 0.0), 0.25);
        assert_eq!(adapter.get_double("search", "missing", 0.5), 0.5);
    }

    #[test]
    fn get_bool_parses_common_spellings() {
        let adapter =
            FileConfigAdapter::from_string("[search]\na = true\nb = yes\nc = 1\nd = no\n")
                .unwrap();
        assert!(adapter.get_bool("search", "a", false));
        assert!(adapter.get_bool("search", "b", false));
        assert!(adapter.get_bool("search", "c", false));
        assert!(!adapter.get_bool("search", "d", true));
        assert!(adapter.get_bool("search", "missing", true));
    }

    #[test]
    fn from_file_reads_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{SAMPLE}").unwrap();
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.get_int("backtest", "start_period", 0), 2005);
        assert_eq!(adapter.get_int("search", "seed", 0), 7);
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        assert!(FileConfigAdapter::from_file("/nonexistent/quantscreen.ini").is_err());
    }
}
