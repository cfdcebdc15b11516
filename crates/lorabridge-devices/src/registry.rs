/*!
 * Symbol and name registry for LoRaBridge.
 *
 * Fields and devices are both addressed two ways: by their single-byte wire
 * symbol when a packet arrives from the radio, and by their display name when
 * a JSON command arrives from the platform. A `Registry` keeps entries in
 * definition order and indexes them both ways. Membership is fixed once built.
 */
use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::error::{DeviceError, Result};

/// An entry that can be looked up by symbol and by name
pub trait Named {
    /// Display name
    fn name(&self) -> &str;

    /// Single-byte wire identifier
    fn symbol(&self) -> u8;
}

/// Fixed collection of named entries with symbol and name indices
pub struct Registry<T> {
    label: String,
    entries: Vec<T>,
    by_symbol: HashMap<u8, usize>,
    by_name: HashMap<String, usize>,
}

impl<T: Named> Registry<T> {
    /// Build a registry, rejecting duplicate symbols or names
    ///
    /// # Arguments
    ///
    /// * `label` - Used in error messages to say which registry was being built
    /// * `entries` - The entries, in definition order
    pub fn new<S: AsRef<str>>(label: S, entries: Vec<T>) -> Result<Self> {
        let label = label.as_ref().to_string();
        let mut by_symbol = HashMap::with_capacity(entries.len());
        let mut by_name = HashMap::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            if by_symbol.insert(entry.symbol(), index).is_some() {
                return Err(DeviceError::DuplicateSymbol {
                    registry: label,
                    symbol: entry.symbol(),
                });
            }
            if by_name.insert(entry.name().to_string(), index).is_some() {
                return Err(DeviceError::DuplicateName {
                    registry: label,
                    name: entry.name().to_string(),
                });
            }
        }

        debug!("Built registry '{}' with {} entries", label, entries.len());

        Ok(Self {
            label,
            entries,
            by_symbol,
            by_name,
        })
    }

    /// Look up an entry by its wire symbol
    pub fn find_by_symbol(&self, symbol: u8) -> Option<&T> {
        self.by_symbol.get(&symbol).map(|&index| &self.entries[index])
    }

    /// Look up an entry by its display name
    pub fn find_by_name(&self, name: &str) -> Option<&T> {
        self.by_name.get(name).map(|&index| &self.entries[index])
    }
}

impl<T> Registry<T> {
    /// Iterate entries in definition order
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The label given at construction
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<'a, T> IntoIterator for &'a Registry<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("label", &self.label)
            .field("entries", &self.entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Entry(&'static str, u8);

    impl Named for Entry {
        fn name(&self) -> &str {
            self.0
        }

        fn symbol(&self) -> u8 {
            self.1
        }
    }

    #[test]
    fn test_lookup_both_ways() {
        let registry = Registry::new(
            "test",
            vec![Entry("Temperature", b'T'), Entry("Humidity", b'H')],
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find_by_symbol(b'H').unwrap().name(), "Humidity");
        assert_eq!(registry.find_by_name("Temperature").unwrap().symbol(), b'T');
        assert!(registry.find_by_symbol(b'X').is_none());
        assert!(registry.find_by_name("temperature").is_none());
    }

    #[test]
    fn test_definition_order_is_kept() {
        let registry = Registry::new(
            "test",
            vec![Entry("c", 3), Entry("a", 1), Entry("b", 2)],
        )
        .unwrap();

        let symbols: Vec<u8> = registry.iter().map(|e| e.symbol()).collect();
        assert_eq!(symbols, vec![3, 1, 2]);
    }

    #[test]
    fn test_duplicate_symbol_rejected() {
        let result = Registry::new("fields", vec![Entry("One", 1), Entry("Two", 1)]);
        assert_eq!(
            result.unwrap_err(),
            DeviceError::DuplicateSymbol {
                registry: "fields".to_string(),
                symbol: 1
            }
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let result = Registry::new("fields", vec![Entry("One", 1), Entry("One", 2)]);
        assert!(matches!(result, Err(DeviceError::DuplicateName { .. })));
    }

    #[test]
    fn test_empty_registry() {
        let registry: Registry<Entry> = Registry::new("empty", Vec::new()).unwrap();
        assert!(registry.is_empty());
        assert!(registry.find_by_symbol(0).is_none());
    }
}
