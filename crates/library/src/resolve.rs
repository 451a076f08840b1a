//! Dependency closures.
//!
//! The walk is breadth-first from the roots (a content item's preloaded,
//! editor and dynamic dependencies) through each library's own preloaded
//! dependencies. Every library is visited once, so cycles terminate.

use crate::LibraryManager;
use crate::error::Result;
use parcel_model::{InstalledLibrary, LibraryName};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::instrument;

/// The transitive set of libraries reachable from some roots.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    order: Vec<LibraryName>,
    libraries: HashMap<LibraryName, InstalledLibrary>,
    /// `(dependent, dependency)` pairs, in discovery order.
    edges: Vec<(LibraryName, LibraryName)>,
}
impl DependencyGraph {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, name: &LibraryName) -> bool {
        self.libraries.contains_key(name)
    }

    pub fn get(&self, name: &LibraryName) -> Option<&InstalledLibrary> {
        self.libraries.get(name)
    }

    pub fn names(&self) -> &[LibraryName] {
        &self.order
    }

    pub fn edges(&self) -> &[(LibraryName, LibraryName)] {
        &self.edges
    }

    /// Libraries in the order the walk reached them.
    pub fn libraries(&self) -> impl Iterator<Item = &InstalledLibrary> {
        self.order.iter().filter_map(|name| self.libraries.get(name))
    }

    /// Libraries ordered so every dependency comes before its dependents.
    /// Members of a cycle keep their discovery order relative to each other.
    pub fn dependencies_first(&self) -> Vec<&InstalledLibrary> {
        let mut visited = HashSet::new();
        let mut sorted = Vec::with_capacity(self.order.len());
        for name in &self.order {
            self.visit(name, &mut visited, &mut sorted);
        }
        sorted
    }

    fn visit<'a>(&'a self, name: &LibraryName, visited: &mut HashSet<LibraryName>, sorted: &mut Vec<&'a InstalledLibrary>) {
        if !visited.insert(name.clone()) {
            return;
        }
        let Some(library) = self.libraries.get(name) else {
            return;
        };
        for dependency in &library.preloaded_dependencies {
            self.visit(dependency, visited, sorted);
        }
        sorted.push(library);
    }
}

impl LibraryManager {
    /// Compute the dependency closure of `roots`.
    ///
    /// Fails with [`NotInstalled`](crate::error::ErrorKind::NotInstalled) when
    /// any library in the closure is missing.
    #[instrument(skip_all, fields(libraries))]
    pub async fn resolve_dependencies<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a LibraryName>,
    ) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::default();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        for root in roots {
            if visited.insert(root.clone()) {
                queue.push_back(root.clone());
            }
        }
        while let Some(name) = queue.pop_front() {
            let library = self.get(&name).await?;
            for dependency in &library.preloaded_dependencies {
                graph.edges.push((name.clone(), dependency.clone()));
                if visited.insert(dependency.clone()) {
                    queue.push_back(dependency.clone());
                }
            }
            graph.order.push(name.clone());
            graph.libraries.insert(name, library);
        }
        tracing::Span::current().record("libraries", graph.len());
        Ok(graph)
    }
}
