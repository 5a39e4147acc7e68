use log::warn;
use serde::Deserialize;

/// Resolved monitor settings. Immutable once loaded; whatever needs a
/// value gets a reference, nothing reads configuration globally.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// WAN-side interface whose pf counters are metered
    #[serde(default = "default_wan_if")]
    pub wan_if: String,
    /// Day of month the ISP usage meter resets (1-31)
    #[serde(default = "default_reset_day")]
    pub reset_day: u32,
    /// Byte-unit conversion factor: 1000 (SI) or 1024 (IEC)
    #[serde(default = "default_conversion")]
    pub conversion: u64,
    /// Sampling cadence in seconds
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// ISP bandwidth cap in gigabytes
    #[serde(default = "default_isp_cap")]
    pub isp_cap: u64,
}

fn default_wan_if() -> String {
    "igb0".to_string()
}

fn default_reset_day() -> u32 {
    1
}

fn default_conversion() -> u64 {
    1000
}

fn default_interval() -> u64 {
    60
}

fn default_isp_cap() -> u64 {
    1000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wan_if: default_wan_if(),
            reset_day: default_reset_day(),
            conversion: default_conversion(),
            interval: default_interval(),
            isp_cap: default_isp_cap(),
        }
    }
}

impl Settings {
    /// Revert out-of-range fields to their defaults, with a warning.
    pub fn normalize(&mut self) {
        if !(1..=31).contains(&self.reset_day) {
            warn!("reset_day {} out of range (1-31), using 1", self.reset_day);
            self.reset_day = default_reset_day();
        }
        if self.conversion != 1000 && self.conversion != 1024 {
            warn!(
                "conversion {} is neither 1000 nor 1024, using 1000",
                self.conversion
            );
            self.conversion = default_conversion();
        }
        if self.interval == 0 {
            warn!("interval must be positive, using 60s");
            self.interval = default_interval();
        }
    }

    /// Byte total in gigabytes under the configured conversion factor.
    pub fn gigabytes(&self, bytes: u64) -> f64 {
        bytes as f64 / (self.conversion as f64).powi(3)
    }

    /// Byte total as a percentage of the ISP cap.
    pub fn percent_of_cap(&self, bytes: u64) -> f64 {
        100.0 * self.gigabytes(bytes) / self.isp_cap as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.wan_if, "igb0");
        assert_eq!(settings.reset_day, 1);
        assert_eq!(settings.conversion, 1000);
        assert_eq!(settings.interval, 60);
        assert_eq!(settings.isp_cap, 1000);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let settings: Settings =
            toml::from_str("wan_if = \"em0\"\nreset_day = 2\n").unwrap();
        assert_eq!(settings.wan_if, "em0");
        assert_eq!(settings.reset_day, 2);
        assert_eq!(settings.conversion, 1000);
        assert_eq!(settings.interval, 60);
    }

    #[test]
    fn test_normalize_rejects_bad_values() {
        let mut settings: Settings =
            toml::from_str("reset_day = 45\nconversion = 512\ninterval = 0\n").unwrap();
        settings.normalize();
        assert_eq!(settings.reset_day, 1);
        assert_eq!(settings.conversion, 1000);
        assert_eq!(settings.interval, 60);
    }

    #[test]
    fn test_gigabytes_si_and_iec() {
        let mut settings = Settings::default();
        assert_eq!(settings.gigabytes(1_000_000_000), 1.0);
        settings.conversion = 1024;
        assert_eq!(settings.gigabytes(1_073_741_824), 1.0);
    }

    #[test]
    fn test_percent_of_cap() {
        let settings = Settings {
            isp_cap: 500,
            ..Settings::default()
        };
        assert_eq!(settings.percent_of_cap(250_000_000_000), 50.0);
    }
}
