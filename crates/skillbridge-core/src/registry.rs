//! Skill registry: scan, dependency check, lookup and atomic reload.
//!
//! The catalog is an immutable [`Catalog`] snapshot published through an
//! `ArcSwap`. Readers take one snapshot for the duration of a turn; a reload
//! builds a complete replacement and swaps it in with a single store, so no
//! reader ever observes a half-updated catalog.

use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::cache::FingerprintCache;
use crate::error::RegistryError;
use crate::observability;
use crate::skill::dependency::{check_requirements, DependencyProbe};
use crate::skill::discovery::{bundle_dir_name, discover_bundles};
use crate::skill::fingerprint::compute_fingerprint;
use crate::skill::manifest::{self, HealthEntry};
use crate::skill::metadata::parse_skill_header;
use crate::skill::tags::extract_tags;
use crate::skill::{Readiness, SkillDescriptor};
use crate::validation::ParamValidator;

/// A bundle the scan refused to catalog.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedBundle {
    pub dir: PathBuf,
    pub reason: String,
}

/// One immutable view of the catalog.
#[derive(Debug, Default)]
pub struct Catalog {
    generation: u64,
    skills: Vec<Arc<SkillDescriptor>>,
    index: HashMap<String, usize>,
    rejected: Vec<RejectedBundle>,
}

impl Catalog {
    fn from_parts(
        generation: u64,
        skills: Vec<Arc<SkillDescriptor>>,
        rejected: Vec<RejectedBundle>,
    ) -> Self {
        let index = skills
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), i))
            .collect();
        Self {
            generation,
            skills,
            index,
            rejected,
        }
    }

    /// Build a catalog directly from descriptors (bypassing the filesystem).
    pub fn from_descriptors(descriptors: Vec<SkillDescriptor>) -> Self {
        Self::from_parts(0, descriptors.into_iter().map(Arc::new).collect(), Vec::new())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Descriptors in catalog order (lower-cased directory name).
    pub fn skills(&self) -> &[Arc<SkillDescriptor>] {
        &self.skills
    }

    pub fn rejected(&self) -> &[RejectedBundle] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Look up by canonical name. Hyphen and underscore spellings are
    /// interchangeable since some model APIs rewrite tool names.
    pub fn get(&self, name: &str) -> Option<&Arc<SkillDescriptor>> {
        let key = name.to_lowercase();
        if let Some(i) = self.index.get(&key) {
            return self.skills.get(*i);
        }
        let hyphens = key.replace('_', "-");
        let underscores = key.replace('-', "_");
        self.index
            .get(&hyphens)
            .or_else(|| self.index.get(&underscores))
            .and_then(|i| self.skills.get(*i))
    }
}

/// Parse one bundle into a descriptor. Performs the integrity check and the
/// dependency check; neither missing dependencies nor a missing script fail.
pub fn load_bundle(
    bundle_dir: &Path,
    probe: &dyn DependencyProbe,
) -> Result<SkillDescriptor, RegistryError> {
    let header = parse_skill_header(bundle_dir).map_err(|e| RegistryError::Metadata {
        dir: bundle_dir.to_path_buf(),
        message: format!("{:#}", e),
    })?;

    let dir_name = bundle_dir_name(bundle_dir);
    let declared = header.name.to_lowercase();
    if dir_name != declared {
        return Err(RegistryError::Integrity {
            dir_name,
            declared: header.name,
        });
    }

    let fingerprint =
        compute_fingerprint(bundle_dir, &header.version).map_err(|e| RegistryError::Metadata {
            dir: bundle_dir.to_path_buf(),
            message: format!("{:#}", e),
        })?;
    let readiness = check_requirements(&header.runtime_requirements, probe);
    if !readiness.ready {
        tracing::warn!(
            skill = %declared,
            missing = ?readiness.missing_deps,
            "Skill catalogued in degraded mode"
        );
    }
    let tags = extract_tags(&declared, &header.description, &header.declared_tags);
    let has_references = ["references", "References"]
        .iter()
        .any(|d| bundle_dir.join(d).is_dir());

    Ok(SkillDescriptor {
        name: declared,
        version: header.version,
        description: header.description,
        parameters: header.parameters,
        runtime_requirements: header.runtime_requirements,
        tags,
        category: header.category,
        readiness,
        fingerprint,
        risk_level: header.risk_level,
        network: header.network,
        estimated_tokens: header.estimated_tokens,
        bundle_dir: bundle_dir.to_path_buf(),
        entry_point: header.entry_point,
        language: header.language,
        guide: header.guide,
        has_references,
    })
}

fn scan_bundles(
    root: &Path,
    probe: &dyn DependencyProbe,
) -> (Vec<Arc<SkillDescriptor>>, Vec<RejectedBundle>) {
    let mut skills = Vec::new();
    let mut rejected = Vec::new();
    for dir in discover_bundles(root) {
        match load_bundle(&dir, probe) {
            Ok(d) => skills.push(Arc::new(d)),
            Err(e) => rejected.push(reject(&dir, e)),
        }
    }
    (skills, rejected)
}

fn reject(dir: &Path, err: RegistryError) -> RejectedBundle {
    match err {
        RegistryError::Integrity {
            ref dir_name,
            ref declared,
        } => observability::security_integrity_error(dir_name, declared),
        ref other => tracing::warn!(dir = %dir.display(), error = %other, "Skipping skill bundle"),
    }
    RejectedBundle {
        dir: dir.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Owns the catalog snapshot and the caches derived from it.
pub struct Registry {
    root: PathBuf,
    probe: Arc<dyn DependencyProbe>,
    snapshot: ArcSwap<Catalog>,
    validators: FingerprintCache<ParamValidator>,
    generation: AtomicU64,
    writer: Mutex<()>,
    manifest_path: Option<PathBuf>,
}

impl Registry {
    /// Scan `root` and build the first catalog snapshot.
    ///
    /// Individual bundle failures are recorded as rejects; only a missing
    /// root is an error.
    pub fn scan(root: &Path, probe: Arc<dyn DependencyProbe>) -> Result<Self, RegistryError> {
        if !root.is_dir() {
            return Err(RegistryError::RootMissing(root.to_path_buf()));
        }
        probe.refresh();
        let (skills, rejected) = scan_bundles(root, probe.as_ref());
        tracing::info!(
            root = %root.display(),
            skills = skills.len(),
            rejected = rejected.len(),
            "Skill registry scanned"
        );
        observability::audit_registry_reloaded("*", 1, skills.len(), rejected.len());
        Ok(Self {
            root: root.to_path_buf(),
            probe,
            snapshot: ArcSwap::from_pointee(Catalog::from_parts(1, skills, rejected)),
            validators: FingerprintCache::new(),
            generation: AtomicU64::new(1),
            writer: Mutex::new(()),
            manifest_path: None,
        })
    }

    /// Rewrite the catalog manifest at `path` after every scan or reload.
    pub fn with_manifest_path(mut self, path: Option<PathBuf>) -> Self {
        self.manifest_path = path;
        self.publish_manifest(&self.snapshot());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The current snapshot. Hold it for the duration of a turn.
    pub fn snapshot(&self) -> Arc<Catalog> {
        self.snapshot.load_full()
    }

    pub fn get(&self, name: &str) -> Result<Arc<SkillDescriptor>, RegistryError> {
        self.snapshot
            .load()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Like [`get`](Self::get), but a degraded skill is an error.
    pub fn get_ready(&self, name: &str) -> Result<Arc<SkillDescriptor>, RegistryError> {
        let d = self.get(name)?;
        if !d.readiness.ready {
            return Err(RegistryError::DependencyMissing {
                skill: d.name.clone(),
                missing: d.readiness.missing_deps.clone(),
            });
        }
        Ok(d)
    }

    /// Re-evaluate a descriptor's requirements against the environment.
    /// Never raises; unmet requirements are reported in the readiness record.
    pub fn dependency_check(&self, descriptor: &SkillDescriptor) -> Readiness {
        check_requirements(&descriptor.runtime_requirements, self.probe.as_ref())
    }

    /// Re-scan one bundle (`Some(name)`) or the whole root (`None`) and
    /// publish the result as a new snapshot.
    pub fn reload(&self, name: Option<&str>) -> Arc<Catalog> {
        let _guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        self.probe.refresh();
        let current = self.snapshot.load_full();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let next = match name {
            None => {
                let (skills, rejected) = scan_bundles(&self.root, self.probe.as_ref());
                Catalog::from_parts(generation, skills, rejected)
            }
            Some(name) => self.reload_one(&current, name, generation),
        };

        let live: HashSet<&str> =
            next.skills.iter().map(|d| d.name.as_str()).collect();
        self.validators.retain(|k| live.contains(k));

        let next = Arc::new(next);
        self.snapshot.store(Arc::clone(&next));
        let scope = name.unwrap_or("*");
        tracing::info!(
            scope = %scope,
            generation,
            skills = next.len(),
            rejected = next.rejected.len(),
            "Skill registry reloaded"
        );
        observability::audit_registry_reloaded(scope, generation, next.len(), next.rejected.len());
        self.publish_manifest(&next);
        next
    }

    fn reload_one(&self, current: &Catalog, name: &str, generation: u64) -> Catalog {
        let key = name.to_lowercase();
        let dir = discover_bundles(&self.root)
            .into_iter()
            .find(|d| bundle_dir_name(d) == key);
        let fresh = dir.as_ref().map(|d| load_bundle(d, self.probe.as_ref()));

        let mut skills: Vec<Arc<SkillDescriptor>> = current
            .skills
            .iter()
            .filter(|d| d.name != key)
            .cloned()
            .collect();
        let mut rejected: Vec<RejectedBundle> = current
            .rejected
            .iter()
            .filter(|r| bundle_dir_name(&r.dir) != key)
            .cloned()
            .collect();

        match (dir, fresh) {
            (Some(_), Some(Ok(d))) => skills.push(Arc::new(d)),
            (Some(dir), Some(Err(e))) => rejected.push(reject(&dir, e)),
            _ => tracing::info!(skill = %key, "Skill bundle removed from catalog"),
        }
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        Catalog::from_parts(generation, skills, rejected)
    }

    /// Compiled validator for a descriptor, pinned to its fingerprint.
    pub fn validator(&self, descriptor: &SkillDescriptor) -> Arc<ParamValidator> {
        self.validators
            .get_or_insert_with(&descriptor.name, &descriptor.fingerprint, || {
                ParamValidator::compile(&descriptor.parameters)
            })
    }

    pub fn health(&self) -> BTreeMap<String, HealthEntry> {
        manifest::health(&self.snapshot())
    }

    fn publish_manifest(&self, catalog: &Catalog) {
        if let Some(ref path) = self.manifest_path {
            if let Err(e) = manifest::write_manifest(catalog, path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to write catalog manifest");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::dependency::StaticProbe;
    use crate::skill::metadata::SKILL_FILE;
    use std::fs;

    fn write_bundle(root: &Path, dir: &str, header: &str) {
        let bundle = root.join(dir);
        fs::create_dir_all(bundle.join("scripts")).unwrap();
        fs::write(bundle.join(SKILL_FILE), header).unwrap();
        fs::write(bundle.join("scripts/main.py"), "print('ok')\n").unwrap();
    }

    const CONVERTER: &str = r#"---
name: sample-converter
version: 1.0.0
description: Convert text case or count words
parameters:
  input_text: string
  operation: enum[uppercase,lowercase,titlecase,wordcount]
---
Converts text.
"#;

    const ANALYZER: &str = r#"---
name: data-analyzer
description: Analyze CSV data with pandas
runtime_requirements: ["pandas>=2.0"]
---
"#;

    fn probe() -> Arc<dyn DependencyProbe> {
        Arc::new(StaticProbe::with_available(["python3"]))
    }

    #[test]
    fn test_scan_catalogs_bundles_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path(), "sample-converter", CONVERTER);
        write_bundle(tmp.path(), "data-analyzer", ANALYZER);

        let reg = Registry::scan(tmp.path(), probe()).unwrap();
        let snap = reg.snapshot();
        let names: Vec<&str> = snap.skills().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["data-analyzer", "sample-converter"]);
        assert_eq!(snap.generation(), 1);
    }

    #[test]
    fn test_missing_dependency_degrades_but_stays_enumerable() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path(), "data-analyzer", ANALYZER);

        let reg = Registry::scan(tmp.path(), probe()).unwrap();
        let d = reg.get("data-analyzer").unwrap();
        assert!(!d.readiness.ready);
        assert_eq!(d.readiness.missing_deps, vec!["pandas".to_string()]);
        assert_eq!(reg.snapshot().len(), 1);
        assert!(matches!(
            reg.get_ready("data-analyzer"),
            Err(RegistryError::DependencyMissing { .. })
        ));

        let health = reg.health();
        assert!(!health["data-analyzer"].ready);
    }

    #[test]
    fn test_dependency_check_reports_without_raising() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path(), "data-analyzer", ANALYZER);
        let reg = Registry::scan(tmp.path(), Arc::new(StaticProbe::with_available(["pandas"]))).unwrap();
        let d = reg.get("data-analyzer").unwrap();
        assert!(reg.dependency_check(&d).ready);
    }

    #[test]
    fn test_integrity_mismatch_rejected_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path(), "sample-converter", CONVERTER);
        write_bundle(tmp.path(), "renamed-dir", ANALYZER);

        let reg = Registry::scan(tmp.path(), probe()).unwrap();
        let snap = reg.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.rejected().len(), 1);
        assert!(snap.rejected()[0].reason.contains("integrity"));
        assert!(matches!(reg.get("data-analyzer"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_case_insensitive_identity() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(
            tmp.path(),
            "Sample-Converter",
            &CONVERTER.replace("name: sample-converter", "name: SAMPLE-converter"),
        );
        let reg = Registry::scan(tmp.path(), probe()).unwrap();
        assert_eq!(reg.get("sample-converter").unwrap().name, "sample-converter");
        assert!(reg.get("Sample_Converter").is_ok());
    }

    #[test]
    fn test_reload_swaps_snapshot_atomically() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path(), "sample-converter", CONVERTER);
        let reg = Registry::scan(tmp.path(), probe()).unwrap();
        let before = reg.snapshot();

        write_bundle(tmp.path(), "data-analyzer", ANALYZER);
        let after = reg.reload(None);

        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 2);
        assert_eq!(after.generation(), 2);
        assert_eq!(reg.snapshot().len(), 2);
    }

    #[test]
    fn test_targeted_reload_updates_fingerprint_and_validator() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path(), "sample-converter", CONVERTER);
        write_bundle(tmp.path(), "data-analyzer", ANALYZER);
        let reg = Registry::scan(tmp.path(), probe()).unwrap();
        let old = reg.get("sample-converter").unwrap();
        let old_validator = reg.validator(&old);

        fs::write(
            tmp.path().join("sample-converter/scripts/main.py"),
            "print('changed')\n",
        )
        .unwrap();
        reg.reload(Some("sample-converter"));

        let new = reg.get("sample-converter").unwrap();
        assert_ne!(old.fingerprint, new.fingerprint);
        assert_eq!(old.version, new.version);
        assert!(!Arc::ptr_eq(&old_validator, &reg.validator(&new)));
        let names: Vec<String> = reg.snapshot().skills().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["data-analyzer", "sample-converter"]);
    }

    #[test]
    fn test_targeted_reload_drops_removed_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        write_bundle(tmp.path(), "sample-converter", CONVERTER);
        let reg = Registry::scan(tmp.path(), probe()).unwrap();
        fs::remove_dir_all(tmp.path().join("sample-converter")).unwrap();
        let next = reg.reload(Some("sample-converter"));
        assert!(next.is_empty());
    }

    #[test]
    fn test_manifest_written_on_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let skills = tmp.path().join("skills");
        write_bundle(&skills, "sample-converter", CONVERTER);
        let manifest_path = tmp.path().join("out/manifest.json");
        let reg = Registry::scan(&skills, probe())
            .unwrap()
            .with_manifest_path(Some(manifest_path.clone()));
        reg.reload(None);

        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
        assert_eq!(doc["version"], "1.0.0");
        assert_eq!(doc["skills"][0]["id"], "sample-converter");
        assert_eq!(doc["skills"][0]["ready"], true);
    }

    #[test]
    fn test_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            Registry::scan(&tmp.path().join("nope"), probe()),
            Err(RegistryError::RootMissing(_))
        ));
    }
}
