//! Skill discovery: `(name, description, path, frontmatter)` records found
//! by walking `skill/` directories. Scope is discovery and loading only; no
//! execution sandboxing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One discovered skill file.
#[derive(Debug, Clone)]
pub struct Skill {
	pub name: String,
	pub description: String,
	pub path: PathBuf,
	pub frontmatter: HashMap<String, String>,
}

/// The discovered skills, keyed by name. A project-scoped skill shadows a
/// global one with the same name.
#[derive(Debug, Clone, Default)]
pub struct SkillRegistry {
	skills: HashMap<String, Skill>,
}

impl SkillRegistry {
	/// Walks `global_dir` then `project_dir` (if present), reading every
	/// `*.md` file directly under a `skill/` subdirectory as a skill. Files
	/// that fail to parse are skipped with a warning rather than aborting
	/// discovery.
	pub async fn discover(project_dir: Option<&Path>, global_dir: Option<&Path>) -> Self {
		let mut skills = HashMap::new();
		for dir in [global_dir, project_dir].into_iter().flatten() {
			for skill in read_skill_dir(&dir.join("skill")).await {
				skills.insert(skill.name.clone(), skill);
			}
		}
		Self { skills }
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Skill> {
		self.skills.get(name)
	}

	#[must_use]
	pub fn names(&self) -> Vec<&str> {
		self.skills.keys().map(String::as_str).collect()
	}

	/// A one-line-per-skill summary for prompt assembly.
	#[must_use]
	pub fn catalogue_summary(&self) -> String {
		let mut names: Vec<&Skill> = self.skills.values().collect();
		names.sort_by(|a, b| a.name.cmp(&b.name));
		names.iter().map(|s| format!("- {}: {}", s.name, s.description)).collect::<Vec<_>>().join("\n")
	}
}

async fn read_skill_dir(dir: &Path) -> Vec<Skill> {
	let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
		return Vec::new();
	};

	let mut skills = Vec::new();
	while let Ok(Some(entry)) = entries.next_entry().await {
		let path = entry.path();
		if path.extension().and_then(|e| e.to_str()) != Some("md") {
			continue;
		}
		let Ok(content) = tokio::fs::read_to_string(&path).await else {
			continue;
		};
		let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
			continue;
		};
		let frontmatter = parse_frontmatter(&content);
		let description = frontmatter.get("description").cloned().unwrap_or_default();
		skills.push(Skill {
			name: name.to_string(),
			description,
			path,
			frontmatter,
		});
	}
	skills
}

/// Parses a leading `---\nkey: value\n...\n---` block into a flat map.
/// Anything beyond simple `key: value` lines (nested structures, lists) is
/// out of scope — skill frontmatter in practice is flat.
fn parse_frontmatter(content: &str) -> HashMap<String, String> {
	let mut lines = content.lines();
	if lines.next() != Some("---") {
		return HashMap::new();
	}

	let mut map = HashMap::new();
	for line in lines.by_ref() {
		if line == "---" {
			break;
		}
		if let Some((key, value)) = line.split_once(':') {
			map.insert(key.trim().to_string(), value.trim().to_string());
		}
	}
	map
}
