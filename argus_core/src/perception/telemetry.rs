// argus_core/src/perception/telemetry.rs

//! Plain key/value diagnostics for external statistics tooling.

use std::fmt;

/// An insertion-ordered snapshot of `key -> f32` counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    entries: Vec<(&'static str, f32)>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing any earlier value.
    pub fn set(&mut self, key: &'static str, value: f32) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn with(mut self, key: &'static str, value: f32) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<f32> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value:.3}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order_and_replaces() {
        let mut telemetry = Telemetry::new().with("b", 1.0).with("a", 2.0);
        telemetry.set("b", 3.0);
        let keys: Vec<_> = telemetry.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(telemetry.get("b"), Some(3.0));
        assert_eq!(telemetry.get("missing"), None);
        assert_eq!(telemetry.to_string(), "b=3.000 a=2.000");
    }
}
