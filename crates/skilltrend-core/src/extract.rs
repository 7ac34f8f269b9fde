use regex::Regex;
use tracing::debug;

use crate::{SkillMatch, SkillSet, Taxonomy, TaxonomyError};

struct Matcher {
    pattern: Regex,
    skill: SkillMatch,
}

/// Keyword matcher over a fixed taxonomy.
///
/// A skill matches when its lower-cased label starts at a word boundary in the
/// lower-cased description. The right edge is not anchored, so "Go" also hits
/// "golang" and "Java" hits "javascript". Labels that begin with a non-word
/// character (".NET") only match when a word character precedes them.
pub struct SkillExtractor {
    matchers: Vec<Matcher>,
}

impl SkillExtractor {
    pub fn new(taxonomy: &Taxonomy) -> Result<Self, TaxonomyError> {
        let matchers = taxonomy
            .pairs()
            .map(|(category, skill)| {
                let pattern = format!(r"\b{}", regex::escape(&skill.to_lowercase()));
                Regex::new(&pattern)
                    .map(|pattern| Matcher {
                        pattern,
                        skill: SkillMatch::new(skill, category),
                    })
                    .map_err(|source| TaxonomyError::Pattern {
                        skill: skill.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { matchers })
    }

    pub fn extract(&self, description: &str) -> SkillSet {
        let haystack = description.to_lowercase();
        let mut found = SkillSet::new();
        for matcher in &self.matchers {
            if matcher.pattern.is_match(&haystack) && found.insert(matcher.skill.clone()) {
                debug!(skill = %matcher.skill.name, category = %matcher.skill.category, "matched skill");
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> SkillExtractor {
        SkillExtractor::new(&Taxonomy::builtin()).unwrap()
    }

    fn names(set: &SkillSet) -> Vec<&str> {
        set.iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn empty_description_yields_nothing() {
        assert!(extractor().extract("").is_empty());
    }

    #[test]
    fn unrelated_text_yields_nothing() {
        assert!(extractor()
            .extract("Friendly team, flexible hours, free snacks.")
            .is_empty());
    }

    #[test]
    fn repeated_mentions_are_reported_once() {
        let found = extractor().extract("Python, python and more PYTHON");
        assert_eq!(found.len(), 1);
        assert!(found.contains(&SkillMatch::new("Python", "Backend")));
    }

    #[test]
    fn matches_carry_their_category() {
        let found = extractor().extract("We use Python and PostgreSQL");
        let expected: SkillSet = [
            SkillMatch::new("Python", "Backend"),
            SkillMatch::new("PostgreSQL", "Database"),
        ]
        .into_iter()
        .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn right_edge_is_unanchored() {
        let found = extractor().extract("Golang services, some JavaScript");
        let names = names(&found);
        assert!(names.contains(&"Go"));
        assert!(names.contains(&"Java"));
        assert!(names.contains(&"JavaScript"));
    }

    #[test]
    fn left_edge_needs_a_word_boundary() {
        assert!(extractor().extract("mongodb-like cargo tooling").iter().all(|m| m.name != "Go"));
        assert!(extractor().extract("ergonomic").is_empty());
    }

    #[test]
    fn punctuated_labels_are_escaped() {
        let found = extractor().extract("Experience with Node.js, C# and CI/CD pipelines");
        let names = names(&found);
        assert!(names.contains(&"Node.js"));
        assert!(names.contains(&"C#"));
        assert!(names.contains(&"CI/CD"));
        assert!(!extractor().extract("nodexjs").iter().any(|m| m.name == "Node.js"));
    }

    #[test]
    fn multi_word_labels_match() {
        let found = extractor().extract("Ruby on Rails and GitHub Actions");
        let names = names(&found);
        assert!(names.contains(&"Ruby on Rails"));
        assert!(names.contains(&"Ruby"));
        assert!(names.contains(&"GitHub Actions"));
    }

    #[test]
    fn dotnet_needs_a_preceding_word_character() {
        assert!(extractor().extract("ASP.NET Core").iter().any(|m| m.name == ".NET"));
        assert!(!extractor().extract("we use .NET").iter().any(|m| m.name == ".NET"));
    }
}
