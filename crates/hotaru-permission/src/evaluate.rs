//! Pure rule evaluation: `evaluate(permission, pattern, rulesets...)` walks
//! layered rulesets and returns the last matching rule's action.

use globset::Glob;

use crate::types::{Action, PermissionRule};

/// Consecutive same-`(permission, pattern)` failures within a turn before
/// the doom loop forces a fresh `ask` regardless of any `always` rule.
pub const DOOM_LOOP_THRESHOLD: u32 = 3;

fn glob_matches(glob: &str, value: &str) -> bool {
	Glob::new(glob)
		.map(|g| g.compile_matcher().is_match(value))
		.unwrap_or(false)
}

/// Scans every rule in `rulesets`, concatenated in precedence order
/// (earlier rulesets are lower precedence), and keeps the last whose
/// `permission` and `pattern` globs both match. Defaults to `Action::Ask`
/// when nothing matches.
#[must_use]
pub fn evaluate(permission: &str, pattern: &str, rulesets: &[&[PermissionRule]]) -> Action {
	evaluate_with_rule(permission, pattern, rulesets)
		.map(|(action, _)| action)
		.unwrap_or(Action::Ask)
}

/// Like [`evaluate`] but also returns the matching rule, for surfacing in
/// `AskError::Denied`.
#[must_use]
pub fn evaluate_with_rule<'a>(
	permission: &str,
	pattern: &str,
	rulesets: &[&'a [PermissionRule]],
) -> Option<(Action, &'a PermissionRule)> {
	let mut matched = None;
	for ruleset in rulesets {
		for rule in *ruleset {
			if glob_matches(&rule.permission, permission) && glob_matches(&rule.pattern, pattern) {
				matched = Some((rule.action, rule));
			}
		}
	}
	matched
}

/// The low-privilege baseline ruleset shipped as the bottom layer: deny
/// destructive root-wipe shaped globs, ask everything else (the "everything
/// else" half falls out of `evaluate`'s default, so this only needs to
/// enumerate the deny entries).
#[must_use]
pub fn builtin_defaults() -> Vec<PermissionRule> {
	vec![
		PermissionRule::new("bash", "rm -rf /*", Action::Deny),
		PermissionRule::new("bash", "rm -rf /", Action::Deny),
		PermissionRule::new("bash", "rm -rf ~*", Action::Deny),
		PermissionRule::new("bash", "mkfs*", Action::Deny),
		PermissionRule::new("bash", ":(){:|:&};:", Action::Deny),
	]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn no_matching_rule_defaults_to_ask() {
		let rules: &[PermissionRule] = &[];
		assert_eq!(evaluate("bash", "ls", &[rules]), Action::Ask);
	}

	#[test]
	fn last_matching_rule_in_precedence_order_wins() {
		let low = vec![PermissionRule::new("bash", "*", Action::Ask)];
		let high = vec![PermissionRule::new("bash", "*", Action::Allow)];
		assert_eq!(evaluate("bash", "ls -la", &[&low, &high]), Action::Allow);
	}

	#[test]
	fn wildcard_permission_and_pattern_both_match() {
		let rules = vec![PermissionRule::new("*", "*", Action::Deny)];
		assert_eq!(evaluate("edit", "/etc/passwd", &[&rules]), Action::Deny);
	}

	#[test]
	fn builtin_defaults_deny_destructive_globs() {
		let defaults = builtin_defaults();
		assert_eq!(evaluate("bash", "rm -rf /*", &[&defaults]), Action::Deny);
		assert_eq!(evaluate("bash", "ls -la", &[&defaults]), Action::Ask);
	}

	#[test]
	fn four_layer_precedence_session_approval_overrides_everything() {
		let builtin = builtin_defaults();
		let user_config = vec![PermissionRule::new("bash", "*", Action::Ask)];
		let per_agent = vec![PermissionRule::new("bash", "git *", Action::Ask)];
		let session = vec![PermissionRule::new("bash", "git *", Action::Allow)];
		assert_eq!(
			evaluate("bash", "git status", &[&builtin, &user_config, &per_agent, &session]),
			Action::Allow
		);
	}
}
