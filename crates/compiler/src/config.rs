//! Compiler configuration
//!
//! Small knobs an embedding can turn without touching the compiler: the
//! pointer width handed to the parser and the memory image size the code
//! generator lays globals out against. Loadable from TOML for tooling.

use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Size of pointer types in bytes.
    pub pointer_size: u16,
    /// Size of the VM memory image in bytes; globals are laid out from its
    /// top. Limited to 2^16.
    pub memory_size: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            pointer_size: 4,
            memory_size: 1 << 16,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> CompilerConfig {
        CompilerConfig::default()
    }

    pub fn with_pointer_size(mut self, bytes: u16) -> Self {
        self.pointer_size = bytes;
        self
    }

    pub fn with_memory_size(mut self, bytes: usize) -> Self {
        self.memory_size = bytes;
        self
    }

    /// Load a configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<CompilerConfig, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config '{}': {}", path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config '{}': {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.pointer_size, 4);
        assert_eq!(config.memory_size, 65536);
    }

    #[test]
    fn test_builder() {
        let config = CompilerConfig::new()
            .with_pointer_size(2)
            .with_memory_size(4096);
        assert_eq!(config.pointer_size, 2);
        assert_eq!(config.memory_size, 4096);
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pointer_size = 2\nmemory_size = 32768").unwrap();
        let config = CompilerConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.pointer_size, 2);
        assert_eq!(config.memory_size, 32768);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "stack_size = 9").unwrap();
        assert!(CompilerConfig::from_toml_file(file.path()).is_err());
    }
}
