//! Declarative `name=implementation` mapping resources

use std::path::PathBuf;
use tracing::{debug, error, warn};

/// Directory prefix under which mapping resources live
pub const EXTENSION_DIRECTORY: &str = "META-INF/extensions";

/// Location of the mapping resource for a capability
pub fn location_for(capability: &str) -> String {
    format!("{}/{}", EXTENSION_DIRECTORY, capability)
}

/// One mapping resource found on the search path
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    /// Where the resource came from, for diagnostics
    pub origin: String,
    pub contents: String,
}

/// Ordered set of places mapping resources are read from.
///
/// Embedded resources come first, then directories in the order they were
/// added, so later entries override earlier ones for the same name.
#[derive(Clone, Debug, Default)]
pub struct ResourceSearchPath {
    embedded: Vec<(String, Resource)>,
    directories: Vec<PathBuf>,
}

impl ResourceSearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource compiled into the binary
    pub fn add_embedded(&mut self, location: String, origin: String, contents: &str) {
        self.embedded.push((
            location,
            Resource {
                origin,
                contents: contents.to_string(),
            },
        ));
    }

    /// Add a directory whose `META-INF/extensions` files are scanned
    pub fn add_directory(&mut self, dir: impl Into<PathBuf>) {
        self.directories.push(dir.into());
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Every resource at `location`. Unreadable files are logged and skipped.
    pub fn find(&self, location: &str) -> Vec<Resource> {
        let mut found: Vec<Resource> = self
            .embedded
            .iter()
            .filter(|(loc, _)| loc == location)
            .map(|(_, resource)| resource.clone())
            .collect();

        for dir in &self.directories {
            let path = dir.join(location);
            if !path.is_file() {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    debug!("Found extension resource {}", path.display());
                    found.push(Resource {
                        origin: path.display().to_string(),
                        contents,
                    });
                }
                Err(e) => {
                    error!("Failed to read extension resource {}: {}", path.display(), e);
                }
            }
        }

        found
    }
}

/// Parse `name=implementation` lines.
///
/// `#` truncates a line; blank lines are ignored; lines without `=` or with
/// an empty side are skipped with a warning.
pub fn parse_mappings(resource: &Resource) -> Vec<(String, String)> {
    let mut mappings = Vec::new();

    for (index, raw) in resource.contents.lines().enumerate() {
        let line = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once('=') {
            Some((name, type_name)) if !name.trim().is_empty() && !type_name.trim().is_empty() => {
                mappings.push((name.trim().to_string(), type_name.trim().to_string()));
            }
            _ => {
                warn!(
                    "Skipping malformed extension mapping at {}:{}: {:?}",
                    resource.origin,
                    index + 1,
                    raw
                );
            }
        }
    }

    mappings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(contents: &str) -> Resource {
        Resource {
            origin: "test".to_string(),
            contents: contents.to_string(),
        }
    }

    #[test]
    fn test_parse_mappings() {
        let text = "\
# routing strategies
random=rpc.loadbalance.RandomLoadBalance
  consistentHash = rpc.loadbalance.ConsistentHashLoadBalance   # default

";
        let mappings = parse_mappings(&resource(text));
        assert_eq!(
            mappings,
            vec![
                ("random".to_string(), "rpc.loadbalance.RandomLoadBalance".to_string()),
                (
                    "consistentHash".to_string(),
                    "rpc.loadbalance.ConsistentHashLoadBalance".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let text = "no-equals-sign\n=missing.Name\nmissing-type=\n ok = some.Type \n";
        let mappings = parse_mappings(&resource(text));
        assert_eq!(mappings, vec![("ok".to_string(), "some.Type".to_string())]);
    }

    #[test]
    fn test_find_merges_embedded_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let location = location_for("rpc.test.Capability");
        let file = dir.path().join(&location);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "b=test.B\n").unwrap();

        let mut search_path = ResourceSearchPath::new();
        search_path.add_embedded(location.clone(), "builtin".to_string(), "a=test.A\n");
        search_path.add_embedded("elsewhere".to_string(), "builtin".to_string(), "x=test.X\n");
        search_path.add_directory(dir.path());
        search_path.add_directory(dir.path().join("missing"));

        let found = search_path.find(&location);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].contents, "a=test.A\n");
        assert_eq!(found[1].contents, "b=test.B\n");
    }

    #[test]
    fn test_location_for() {
        assert_eq!(
            location_for("rpc.loadbalance.LoadBalance"),
            "META-INF/extensions/rpc.loadbalance.LoadBalance"
        );
    }
}
