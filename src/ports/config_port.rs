//! Configuration access port trait.

use chrono::NaiveDate;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// A `YYYY-MM-DD` value; blank or malformed values read as absent.
    fn get_date(&self, section: &str, key: &str) -> Option<NaiveDate> {
        let raw = self.get_string(section, key)?;
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
    }
}
