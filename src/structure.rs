//! Local mirror of an experiment's directory taxonomy.
//!
//! Every experiment folder in a notebook is laid out the same way: one
//! folder per data kind (Behavior, Histology, Metadata, Photometry,
//! Surgeries), and below most of them one folder per cohort. Mirroring
//! first builds a plan of directories from the notebook tree, then creates
//! them.

use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::models::ExperimentTree;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown make method: {0} (expected existing or all)")]
    UnknownMethod(String),
}

// ============================================================================
// Data Kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataKind {
    Behavior,
    Histology,
    Metadata,
    Photometry,
    Surgeries,
}

impl DataKind {
    pub const ALL: [DataKind; 5] = [
        DataKind::Behavior,
        DataKind::Histology,
        DataKind::Metadata,
        DataKind::Photometry,
        DataKind::Surgeries,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            DataKind::Behavior => "Behavior",
            DataKind::Histology => "Histology",
            DataKind::Metadata => "Metadata",
            DataKind::Photometry => "Photometry",
            DataKind::Surgeries => "Surgeries",
        }
    }

    /// Match a notebook folder name, ignoring case and surrounding space.
    pub fn from_folder_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.dir_name().eq_ignore_ascii_case(name))
    }

    /// Folders created inside every cohort of this kind.
    pub fn cohort_subfolders(self) -> &'static [&'static str] {
        match self {
            DataKind::Behavior => &["Videos"],
            DataKind::Photometry => &["Tanks", "Analysis"],
            _ => &[],
        }
    }

    pub fn has_cohorts(self) -> bool {
        self != DataKind::Metadata
    }
}

/// Whether a folder name denotes a cohort: `Cohort 3` or a dated folder
/// such as `2024-01-31` or `01_31_2024 cohort`.
pub fn is_cohort_folder(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*cohort\b|\d{4}[-_]\d{1,2}[-_]\d{1,2}|\d{1,2}[-_]\d{1,2}[-_]\d{4}")
            .expect("cohort pattern is valid")
    });
    re.is_match(name)
}

// ============================================================================
// Planning
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MakeMethod {
    /// Only what already exists in the notebook.
    Existing,
    /// Every data kind, plus whatever cohorts the notebook has.
    All,
}

impl std::str::FromStr for MakeMethod {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "existing" => Ok(MakeMethod::Existing),
            "all" => Ok(MakeMethod::All),
            other => Err(MirrorError::UnknownMethod(other.to_string())),
        }
    }
}

/// Keep only path-safe characters of a notebook folder name. The result is
/// always a single normal path component under its parent.
fn sanitize(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return "_".to_string();
    }
    if name.chars().all(|c| c == '.') {
        return "_".repeat(name.len());
    }
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

/// Directories to create for an experiment, parents before children.
pub fn plan_experiment(root: &Path, tree: &ExperimentTree, method: MakeMethod) -> Vec<PathBuf> {
    let experiment_dir = root.join(sanitize(&tree.name));
    let mut planned: BTreeSet<PathBuf> = BTreeSet::new();
    planned.insert(experiment_dir.clone());

    let mut seen_kinds = BTreeSet::new();
    for (folder, children) in &tree.folders {
        let Some(kind) = DataKind::from_folder_name(folder) else {
            debug!("Skipping folder {} in {}", folder, tree.name);
            continue;
        };
        seen_kinds.insert(kind);
        let kind_dir = experiment_dir.join(kind.dir_name());
        planned.insert(kind_dir.clone());

        if !kind.has_cohorts() {
            continue;
        }
        for cohort in children.iter().filter(|c| is_cohort_folder(c)) {
            let cohort_dir = kind_dir.join(sanitize(cohort));
            for sub in kind.cohort_subfolders() {
                planned.insert(cohort_dir.join(sub));
            }
            planned.insert(cohort_dir);
        }
    }

    if method == MakeMethod::All {
        for kind in DataKind::ALL {
            if !seen_kinds.contains(&kind) {
                planned.insert(experiment_dir.join(kind.dir_name()));
            }
        }
    }

    // BTreeSet order puts every parent ahead of its children
    planned.into_iter().collect()
}

/// Create every planned directory. Existing ones are left alone.
pub fn apply_plan(plan: &[PathBuf]) -> Result<usize, MirrorError> {
    let mut created = 0;
    for dir in plan {
        if dir.is_dir() {
            continue;
        }
        fs::create_dir_all(dir).map_err(|source| MirrorError::Io {
            path: dir.clone(),
            source,
        })?;
        created += 1;
    }
    info!("Created {} of {} planned directories", created, plan.len());
    Ok(created)
}

/// Planned directories that are not on disk yet.
pub fn missing_locally(plan: &[PathBuf]) -> Vec<PathBuf> {
    // Walk only from the top-most planned directories
    let roots: Vec<&PathBuf> = plan
        .iter()
        .filter(|p| !plan.iter().any(|other| other != *p && p.starts_with(other)))
        .collect();

    let mut present: BTreeSet<PathBuf> = BTreeSet::new();
    for root in roots {
        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
        {
            present.insert(entry.into_path());
        }
    }

    plan.iter()
        .filter(|p| !present.contains(*p))
        .cloned()
        .collect()
}

// ============================================================================
// Static Template
// ============================================================================

/// A directory and its children.
struct TemplateDir {
    name: &'static str,
    children: &'static [TemplateDir],
}

const fn leaf(name: &'static str) -> TemplateDir {
    TemplateDir { name, children: &[] }
}

const LAB_TEMPLATE: &[TemplateDir] = &[
    TemplateDir {
        name: "Behavior",
        children: &[TemplateDir {
            name: "Cohort 1",
            children: &[TemplateDir {
                name: "Videos",
                children: &[leaf("subject id"), leaf("nomenclature"), leaf("run id")],
            }],
        }],
    },
    TemplateDir {
        name: "Histology",
        children: &[leaf("Cohort 1")],
    },
    leaf("Metadata"),
    TemplateDir {
        name: "Photometry",
        children: &[TemplateDir {
            name: "Cohort 1",
            children: &[
                TemplateDir {
                    name: "Tanks",
                    children: &[leaf("Day 1"), leaf("Day 2")],
                },
                leaf("Analysis"),
            ],
        }],
    },
    TemplateDir {
        name: "Surgeries",
        children: &[leaf("Cohort 1")],
    },
];

fn template_paths(base: &Path, dirs: &[TemplateDir], out: &mut Vec<PathBuf>) {
    for dir in dirs {
        let path = base.join(dir.name);
        out.push(path.clone());
        template_paths(&path, dir.children, out);
    }
}

/// Lay down the lab's standard experiment skeleton under `root`.
pub fn create_template(root: &Path) -> Result<Vec<PathBuf>, MirrorError> {
    let mut plan = vec![root.to_path_buf()];
    template_paths(root, LAB_TEMPLATE, &mut plan);
    apply_plan(&plan)?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> ExperimentTree {
        ExperimentTree {
            name: "Fear Conditioning".to_string(),
            folders: vec![
                (
                    "Behavior".to_string(),
                    vec!["Cohort 1".to_string(), "2024-03-05".to_string(), "scratch".to_string()],
                ),
                ("photometry ".to_string(), vec!["Cohort 1".to_string()]),
                ("Metadata".to_string(), vec!["Cohort 1".to_string()]),
                ("Lab Meeting".to_string(), vec!["Cohort 9".to_string()]),
            ],
        }
    }

    #[test]
    fn test_kind_from_folder_name() {
        assert_eq!(DataKind::from_folder_name(" behavior"), Some(DataKind::Behavior));
        assert_eq!(DataKind::from_folder_name("SURGERIES"), Some(DataKind::Surgeries));
        assert_eq!(DataKind::from_folder_name("Behaviors"), None);
    }

    #[test]
    fn test_cohort_pattern() {
        assert!(is_cohort_folder("Cohort 1"));
        assert!(is_cohort_folder("cohort A"));
        assert!(is_cohort_folder("2024-03-05"));
        assert!(is_cohort_folder("03_05_2024 pilot"));
        assert!(!is_cohort_folder("scratch"));
        assert!(!is_cohort_folder("Cohorts overview"));
    }

    #[test]
    fn test_plan_existing() {
        let root = Path::new("/data");
        let plan = plan_experiment(root, &tree(), MakeMethod::Existing);
        let exp = root.join("Fear Conditioning");

        assert!(plan.contains(&exp.join("Behavior/Cohort 1/Videos")));
        assert!(plan.contains(&exp.join("Behavior/2024-03-05/Videos")));
        assert!(plan.contains(&exp.join("Photometry/Cohort 1/Tanks")));
        assert!(plan.contains(&exp.join("Photometry/Cohort 1/Analysis")));
        assert!(plan.contains(&exp.join("Metadata")));
        assert!(!plan.contains(&exp.join("Metadata/Cohort 1")));
        assert!(!plan.contains(&exp.join("Behavior/scratch")));
        assert!(!plan.contains(&exp.join("Histology")));
        assert!(!plan.iter().any(|p| p.to_string_lossy().contains("Lab Meeting")));

        // Parents precede children
        for (i, p) in plan.iter().enumerate() {
            if let Some(parent) = p.parent() {
                if let Some(j) = plan.iter().position(|q| q == parent) {
                    assert!(j < i);
                }
            }
        }
    }

    #[test]
    fn test_plan_all_adds_every_kind() {
        let plan = plan_experiment(Path::new("/data"), &tree(), MakeMethod::All);
        for kind in DataKind::ALL {
            assert!(plan.contains(&Path::new("/data/Fear Conditioning").join(kind.dir_name())));
        }
    }

    #[test]
    fn test_make_method_parse() {
        assert_eq!("Existing".parse::<MakeMethod>().unwrap(), MakeMethod::Existing);
        assert_eq!("all".parse::<MakeMethod>().unwrap(), MakeMethod::All);
        assert!("some".parse::<MakeMethod>().is_err());
    }

    #[test]
    fn test_apply_and_check_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = plan_experiment(tmp.path(), &tree(), MakeMethod::Existing);

        assert_eq!(missing_locally(&plan).len(), plan.len());
        let created = apply_plan(&plan).unwrap();
        assert_eq!(created, plan.len());
        assert!(missing_locally(&plan).is_empty());

        // Second run is a no-op
        assert_eq!(apply_plan(&plan).unwrap(), 0);
    }

    #[test]
    fn test_create_template() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("lab");
        create_template(&root).unwrap();
        assert!(root.join("Behavior/Cohort 1/Videos/run id").is_dir());
        assert!(root.join("Photometry/Cohort 1/Tanks/Day 2").is_dir());
        assert!(root.join("Photometry/Cohort 1/Analysis").is_dir());
        assert!(root.join("Surgeries/Cohort 1").is_dir());
        assert!(root.join("Metadata").is_dir());
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize(" a/b:c "), "a_b_c");
        assert_eq!(sanitize(".."), "__");
        assert_eq!(sanitize(" . "), "_");
        assert_eq!(sanitize("   "), "_");
        assert_eq!(sanitize("v1.2"), "v1.2");
    }

    #[test]
    fn test_plan_stays_under_root_for_dot_names() {
        use std::path::Component;

        let root = Path::new("/data/lab");
        for name in ["..", ".", "", "../.."] {
            let tree = ExperimentTree {
                name: name.to_string(),
                folders: vec![("Behavior".to_string(), vec!["Cohort 1".to_string()])],
            };
            let plan = plan_experiment(root, &tree, MakeMethod::All);
            assert!(!plan.is_empty());
            for dir in &plan {
                assert!(dir.starts_with(root), "{} escapes the root", dir.display());
                assert_ne!(dir.as_path(), root);
                assert!(!dir.components().any(|c| matches!(c, Component::ParentDir | Component::CurDir)));
            }
        }
    }
}
