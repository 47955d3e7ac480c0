//! Dependency graph resolution for the Service Supervisor
//!
//! Produces layers of service names where every service in layer N depends
//! only on services in layers `0..N`, so each layer can init in parallel.

use std::collections::{HashMap, HashSet};

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("unknown dependency: service {service:?} depends on unregistered service {dependency:?}")]
    UnknownDependency { service: String, dependency: String },
    #[error("dependency cycle detected among services: {0:?}")]
    Cycle(Vec<String>),
}

/// Kahn's algorithm, grouped into layers rather than a flat order so the
/// caller can run each layer's inits concurrently.
pub fn topological_layers(
    names: &[String],
    deps: &HashMap<String, Vec<String>>,
) -> Result<Vec<Vec<String>>, GraphError> {
    let known: HashSet<&str> = names.iter().map(String::as_str).collect();
    for (service, service_deps) in deps {
        for dep in service_deps {
            if !known.contains(dep.as_str()) {
                return Err(GraphError::UnknownDependency {
                    service: service.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let mut remaining_deps: HashMap<String, HashSet<String>> = names
        .iter()
        .map(|n| {
            (
                n.clone(),
                deps.get(n).map(|d| d.iter().cloned().collect()).unwrap_or_default(),
            )
        })
        .collect();

    let mut layers = Vec::new();
    let mut resolved: HashSet<String> = HashSet::new();

    while resolved.len() < names.len() {
        let ready: Vec<String> = remaining_deps
            .iter()
            .filter(|(name, deps)| !resolved.contains(*name) && deps.iter().all(|d| resolved.contains(d)))
            .map(|(name, _)| name.clone())
            .collect();

        if ready.is_empty() {
            let stuck: Vec<String> = names.iter().filter(|n| !resolved.contains(*n)).cloned().collect();
            return Err(GraphError::Cycle(stuck));
        }

        for name in &ready {
            resolved.insert(name.clone());
            remaining_deps.remove(name);
        }
        layers.push(ready);
    }

    Ok(layers)
}

/// Reverse of the init order: flatten the layers back-to-front so stop
/// proceeds service-after-dependents, never before.
pub fn reverse_order(layers: &[Vec<String>]) -> Vec<String> {
    layers.iter().rev().flatten().cloned().collect()
}
