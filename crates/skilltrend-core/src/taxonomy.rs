use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("reading taxonomy {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing taxonomy: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("taxonomy category at position {0} has an empty name")]
    EmptyCategory(usize),
    #[error("taxonomy category {0:?} is declared more than once")]
    DuplicateCategory(String),
    #[error("taxonomy category {0:?} contains an empty skill label")]
    EmptySkill(String),
    #[error("compiling matcher for skill {skill:?}: {source}")]
    Pattern {
        skill: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub skills: Vec<String>,
}

/// Fixed mapping of category name to canonical skill labels, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    categories: Vec<Category>,
}

const BUILTIN: &[(&str, &[&str])] = &[
    (
        "Frontend",
        &[
            "React", "Vue.js", "Angular", "JavaScript", "TypeScript", "HTML5", "CSS3", "SCSS",
            "SASS", "Tailwind CSS", "Bootstrap", "jQuery", "Webpack", "Babel",
        ],
    ),
    (
        "Backend",
        &[
            "Node.js", "Express", "Python", "Django", "Flask", "Java", "Spring Boot", "Ruby",
            "Ruby on Rails", "PHP", "Laravel", "Go", "Rust", "C#", ".NET",
        ],
    ),
    (
        "Database",
        &[
            "PostgreSQL", "MySQL", "MongoDB", "Redis", "SQLite", "Oracle", "SQL Server",
            "Firebase", "DynamoDB", "Elasticsearch", "Cassandra",
        ],
    ),
    (
        "DevOps",
        &[
            "Docker", "Kubernetes", "AWS", "Azure", "GCP", "CI/CD", "Jenkins", "GitLab",
            "GitHub Actions", "Terraform", "Ansible", "Prometheus", "Grafana",
        ],
    ),
];

impl Taxonomy {
    pub fn builtin() -> Self {
        let categories = BUILTIN
            .iter()
            .map(|(name, skills)| Category {
                name: (*name).to_string(),
                skills: skills.iter().map(|s| (*s).to_string()).collect(),
            })
            .collect();
        Self { categories }
    }

    /// Validates categories and drops repeated skill labels within a category.
    pub fn new(categories: Vec<Category>) -> Result<Self, TaxonomyError> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(categories.len());
        for (idx, category) in categories.into_iter().enumerate() {
            let name = category.name.trim().to_string();
            if name.is_empty() {
                return Err(TaxonomyError::EmptyCategory(idx));
            }
            if !seen.insert(name.clone()) {
                return Err(TaxonomyError::DuplicateCategory(name));
            }

            let mut skills: Vec<String> = Vec::with_capacity(category.skills.len());
            for skill in category.skills {
                let skill = skill.trim().to_string();
                if skill.is_empty() {
                    return Err(TaxonomyError::EmptySkill(name));
                }
                if !skills.contains(&skill) {
                    skills.push(skill);
                }
            }
            out.push(Category { name, skills });
        }
        Ok(Self { categories: out })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, TaxonomyError> {
        let parsed: Self = serde_yaml::from_str(yaml)?;
        Self::new(parsed.categories)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TaxonomyError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| TaxonomyError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    /// Every (category, skill) pair in declaration order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.categories.iter().flat_map(|c| {
            c.skills
                .iter()
                .map(move |skill| (c.name.as_str(), skill.as_str()))
        })
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::builtin()
    }
}
