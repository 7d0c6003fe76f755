//! Configuration access port trait.

/// Accepted spellings for boolean values.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// Keys present in `section`, in no particular order.
    fn keys(&self, section: &str) -> Vec<String>;

    fn has_section(&self, section: &str) -> bool;

    /// `Ok(None)` when the key is absent; `Err` carries the raw text when it
    /// is present but not an integer.
    fn try_int(&self, section: &str, key: &str) -> Result<Option<i64>, String> {
        self.get_string(section, key)
            .map(|raw| raw.trim().parse().map_err(|_| raw))
            .transpose()
    }

    fn try_double(&self, section: &str, key: &str) -> Result<Option<f64>, String> {
        self.get_string(section, key)
            .map(|raw| raw.trim().parse().map_err(|_| raw))
            .transpose()
    }

    fn try_bool(&self, section: &str, key: &str) -> Result<Option<bool>, String> {
        self.get_string(section, key)
            .map(|raw| parse_bool(&raw).ok_or(raw))
            .transpose()
    }
}
