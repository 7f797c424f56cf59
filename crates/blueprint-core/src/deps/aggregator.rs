//! Merge dependency facts into per-module manifests

use crate::condition::Expression;
use crate::error::DependencyConflict;
use crate::version::compare_releases;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One executed `{{require}}`, attributed to the module that owns its file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyFact {
    pub module_scope: String,
    pub package_path: String,
    pub version: String,
    /// Inclusion condition of the entry that produced the fact
    pub condition: Option<Expression>,
    /// Source template of that entry
    pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub package_path: String,
    pub version: String,
}

/// A module with its name and toolchain already rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub path: String,
    pub name: String,
    pub toolchain: Option<String>,
}

/// Deduplicated, version-resolved dependencies of one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateManifest {
    pub module: ModuleInfo,
    /// Sorted by package path
    pub dependencies: Vec<ResolvedDependency>,
}

/// A sibling module required by package path, served from its local directory
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PathOverride {
    pub package_path: String,
    pub module_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceIndex {
    pub toolchain: Option<String>,
    /// Module directories, sorted
    pub members: Vec<String>,
    pub overrides: Vec<PathOverride>,
}

/// Collects facts after the render barrier
#[derive(Debug)]
pub struct Aggregator {
    modules: BTreeMap<String, ModuleInfo>,
    resolved: BTreeMap<String, BTreeMap<String, String>>,
}

impl Aggregator {
    /// Start with the modules that produced at least one file
    pub fn new(modules: impl IntoIterator<Item = ModuleInfo>) -> Self {
        let modules: BTreeMap<String, ModuleInfo> =
            modules.into_iter().map(|m| (m.path.clone(), m)).collect();
        let resolved = modules.keys().map(|k| (k.clone(), BTreeMap::new())).collect();
        Self { modules, resolved }
    }

    pub fn push(&mut self, fact: DependencyFact) -> Result<(), DependencyConflict> {
        let Some(deps) = self.resolved.get_mut(&fact.module_scope) else {
            warn!(
                module = %fact.module_scope,
                package = %fact.package_path,
                origin = %fact.origin,
                "dropping dependency of a module that produced no files"
            );
            return Ok(());
        };

        match deps.get(&fact.package_path) {
            None => {
                deps.insert(fact.package_path, fact.version);
            }
            Some(existing) => {
                let chosen = resolve_version(&fact.module_scope, &fact.package_path, existing, &fact.version)?;
                if chosen != *existing {
                    debug!(
                        module = %fact.module_scope,
                        package = %fact.package_path,
                        from = %existing,
                        to = %chosen,
                        "raised dependency version"
                    );
                    deps.insert(fact.package_path, chosen);
                }
            }
        }
        Ok(())
    }

    /// One manifest per module, ordered by module path
    pub fn finish(self) -> Vec<AggregateManifest> {
        let mut resolved = self.resolved;
        self.modules
            .into_iter()
            .map(|(path, module)| {
                let dependencies = resolved
                    .remove(&path)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(package_path, version)| ResolvedDependency {
                        package_path,
                        version,
                    })
                    .collect();
                AggregateManifest {
                    module,
                    dependencies,
                }
            })
            .collect()
    }
}

/// Fold every fact into per-module manifests
pub fn aggregate(
    modules: impl IntoIterator<Item = ModuleInfo>,
    facts: impl IntoIterator<Item = DependencyFact>,
) -> Result<Vec<AggregateManifest>, DependencyConflict> {
    let mut aggregator = Aggregator::new(modules);
    for fact in facts {
        aggregator.push(fact)?;
    }
    Ok(aggregator.finish())
}

/// Pick the higher of two versions of the same package
///
/// Identical strings always agree. Otherwise both must be comparable
/// releases; pseudo-versions and non-semver strings conflict.
pub fn resolve_version(
    module: &str,
    package: &str,
    left: &str,
    right: &str,
) -> Result<String, DependencyConflict> {
    if left == right {
        return Ok(left.to_string());
    }
    match compare_releases(left, right) {
        Some(Ordering::Less) => Ok(right.to_string()),
        Some(_) => Ok(left.to_string()),
        None => Err(DependencyConflict {
            module: module.to_string(),
            package: package.to_string(),
            left: left.to_string(),
            right: right.to_string(),
        }),
    }
}

/// Build the workspace index over the emitted manifests
///
/// A dependency whose package path is the name of a sibling module becomes a
/// local path override.
pub fn workspace_index(manifests: &[AggregateManifest]) -> WorkspaceIndex {
    let mut members: Vec<String> = manifests.iter().map(|m| m.module.path.clone()).collect();
    members.sort();

    let mut overrides: Vec<PathOverride> = manifests
        .iter()
        .flat_map(|m| &m.dependencies)
        .filter_map(|dep| {
            manifests
                .iter()
                .find(|sibling| sibling.module.name == dep.package_path)
                .map(|sibling| PathOverride {
                    package_path: dep.package_path.clone(),
                    module_path: sibling.module.path.clone(),
                })
        })
        .collect();
    overrides.sort();
    overrides.dedup();

    let toolchain = manifests
        .iter()
        .filter_map(|m| m.module.toolchain.as_deref())
        .max_by(|a, b| compare_toolchains(a, b))
        .map(str::to_string);

    WorkspaceIndex {
        toolchain,
        members,
        overrides,
    }
}

/// Compare dotted toolchain versions such as "1.22" and "1.21.5" numerically
fn compare_toolchains(left: &str, right: &str) -> Ordering {
    let parts = |s: &str| -> Vec<u64> {
        s.trim_start_matches(|c: char| !c.is_ascii_digit())
            .split('.')
            .map(|p| p.parse().unwrap_or(0))
            .collect()
    };
    parts(left).cmp(&parts(right)).then_with(|| left.cmp(right))
}
