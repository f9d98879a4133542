//! Instruction files: the first of `AGENTS.md`, `CLAUDE.md` (plus any
//! config-declared extra names) found walking from the working directory
//! up to the worktree root, concatenated root-to-leaf.

use std::path::{Path, PathBuf};

const DEFAULT_NAMES: &[&str] = &["AGENTS.md", "CLAUDE.md"];

/// Walks from `directory` up to (and including) `worktree`, reading the
/// first matching instruction file in each directory, then concatenates
/// the results in root-to-leaf order (so the worktree root's instructions
/// come first and the most specific directory's come last).
pub async fn resolve(directory: &Path, worktree: &Path, extra_names: &[String]) -> String {
	let mut names: Vec<&str> = DEFAULT_NAMES.to_vec();
	names.extend(extra_names.iter().map(String::as_str));

	let mut chain: Vec<PathBuf> = Vec::new();
	let mut current = directory.to_path_buf();
	loop {
		chain.push(current.clone());
		if current == worktree || !current.pop() {
			break;
		}
	}
	chain.reverse();

	let mut sections = Vec::new();
	for dir in chain {
		for name in &names {
			let path = dir.join(name);
			if let Ok(content) = tokio::fs::read_to_string(&path).await {
				sections.push(content);
				break;
			}
		}
	}
	sections.join("\n\n")
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[tokio::test]
	async fn concatenates_root_to_leaf() {
		let root = tempdir().unwrap();
		let leaf = root.path().join("src");
		tokio::fs::create_dir_all(&leaf).await.unwrap();
		tokio::fs::write(root.path().join("AGENTS.md"), "root rules").await.unwrap();
		tokio::fs::write(leaf.join("AGENTS.md"), "leaf rules").await.unwrap();

		let resolved = resolve(&leaf, root.path(), &[]).await;
		let root_pos = resolved.find("root rules").unwrap();
		let leaf_pos = resolved.find("leaf rules").unwrap();
		assert!(root_pos < leaf_pos);
	}

	#[tokio::test]
	async fn prefers_agents_md_over_claude_md_in_the_same_directory() {
		let root = tempdir().unwrap();
		tokio::fs::write(root.path().join("AGENTS.md"), "agents").await.unwrap();
		tokio::fs::write(root.path().join("CLAUDE.md"), "claude").await.unwrap();

		let resolved = resolve(root.path(), root.path(), &[]).await;
		assert_eq!(resolved, "agents");
	}

	#[tokio::test]
	async fn missing_files_yield_empty_string() {
		let root = tempdir().unwrap();
		let resolved = resolve(root.path(), root.path(), &[]).await;
		assert_eq!(resolved, "");
	}
}
